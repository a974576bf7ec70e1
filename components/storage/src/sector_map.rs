// Copyright 2024 regio
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    fmt::{Display, Formatter},
    ops::Range,
};

use rangemap::RangeSet;
use regio_common::{SectorNumber, HEADER_SECTORS};

/// Tracks which sectors of a region file are free.
///
/// Only the free runs are stored, ordered by start sector, so a first-fit
/// lookup walks runs instead of individual sectors. The header sectors are
/// never free.
#[derive(Debug, Clone)]
pub struct SectorMap {
    free:  RangeSet<SectorNumber>,
    total: SectorNumber,
}

impl SectorMap {
    /// A map over `total` sectors where everything past the header is free.
    pub fn new(total: SectorNumber) -> Self {
        let mut free = RangeSet::new();
        let reserved = HEADER_SECTORS as SectorNumber;
        if total > reserved {
            free.insert(reserved..total);
        }
        Self { free, total }
    }

    /// Number of sectors in the file.
    pub fn len(&self) -> SectorNumber { self.total }

    pub fn is_empty(&self) -> bool { self.total == 0 }

    pub fn free_count(&self) -> SectorNumber { self.free.iter().map(|r| r.end - r.start).sum() }

    pub fn is_free(&self, sector: SectorNumber) -> bool { self.free.contains(&sector) }

    /// Whether `range` lies inside the file and outside the header.
    pub fn in_bounds(&self, range: &Range<SectorNumber>) -> bool {
        range.start >= HEADER_SECTORS as SectorNumber && range.end <= self.total
    }

    pub fn mark_used(&mut self, range: Range<SectorNumber>) {
        debug_assert!(self.in_bounds(&range), "mark {:?} of {}", range, self.total);
        if !range.is_empty() {
            self.free.remove(range);
        }
    }

    pub fn mark_free(&mut self, range: Range<SectorNumber>) {
        debug_assert!(self.in_bounds(&range), "free {:?} of {}", range, self.total);
        if !range.is_empty() {
            self.free.insert(range);
        }
    }

    /// The start of the first free run holding at least `count` sectors.
    pub fn first_fit(&self, count: SectorNumber) -> Option<SectorNumber> {
        self.free
            .iter()
            .find(|run| run.end - run.start >= count)
            .map(|run| run.start)
    }

    /// Append `count` used sectors at the end and return the first of them.
    pub fn grow(&mut self, count: SectorNumber) -> SectorNumber {
        let start = self.total;
        self.total += count;
        start
    }

    pub fn free_runs(&self) -> impl Iterator<Item = &Range<SectorNumber>> { self.free.iter() }
}

impl Display for SectorMap {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SectorMap {{ total: {}, free: {}, runs: {} }}",
            self.total,
            self.free_count(),
            self.free.iter().count(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_reserved() {
        let map = SectorMap::new(2);
        assert_eq!(map.len(), 2);
        assert_eq!(map.free_count(), 0);
        assert!(!map.is_free(0));
        assert!(!map.is_free(1));
        assert_eq!(map.first_fit(1), None);
    }

    #[test]
    fn first_fit_not_best_fit() {
        let mut map = SectorMap::new(20);
        // free: 2..20
        map.mark_used(2..20);
        map.mark_free(3..8); // 5 sectors
        map.mark_free(10..12); // 2 sectors
        map.mark_free(15..20); // 5 sectors

        assert_eq!(map.first_fit(2), Some(3));
        assert_eq!(map.first_fit(5), Some(3));
        assert_eq!(map.first_fit(6), None);

        map.mark_used(3..8);
        assert_eq!(map.first_fit(2), Some(10));
        assert_eq!(map.first_fit(3), Some(15));
        assert_eq!(map.free_count(), 7);
    }

    #[test]
    fn adjacent_runs_coalesce() {
        let mut map = SectorMap::new(10);
        map.mark_used(2..10);
        map.mark_free(4..6);
        map.mark_free(6..9);
        assert_eq!(map.free_runs().count(), 1);
        assert_eq!(map.first_fit(5), Some(4));
    }

    #[test]
    fn grow() {
        let mut map = SectorMap::new(2);
        let start = map.grow(3);
        assert_eq!(start, 2);
        assert_eq!(map.len(), 5);
        assert_eq!(map.free_count(), 0);
        assert!(map.in_bounds(&(2..5)));
        assert!(!map.in_bounds(&(4..6)));
        assert!(!map.in_bounds(&(1..3)));
    }
}
