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

use std::path::PathBuf;

use snafu::{Location, Snafu};

use crate::codec::DecodeError;

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("chunk ({x}, {z}) is outside of the region"))]
    OutOfBounds {
        x:        i32,
        z:        i32,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("corrupt chunk ({x}, {z}) in {}: {reason}", path.display()))]
    Corrupt {
        path:     PathBuf,
        x:        i32,
        z:        i32,
        reason:   String,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("undecodable chunk ({x}, {z}) in {}", path.display()))]
    Decode {
        path:     PathBuf,
        x:        i32,
        z:        i32,
        source:   DecodeError,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("chunk ({x}, {z}) needs {sectors} sectors, at most 255 are allowed"))]
    ChunkTooLarge {
        x:        i32,
        z:        i32,
        sectors:  usize,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("region file {} is opened read-only", path.display()))]
    ReadOnly {
        path:     PathBuf,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("io error on region file {}", path.display()))]
    RegionIo {
        path:     PathBuf,
        #[snafu(implicit)]
        location: Location,
        source:   std::io::Error,
    },

    UnknownIOError {
        #[snafu(implicit)]
        location: Location,
        source:   std::io::Error,
    },
}

impl Error {
    pub fn is_out_of_bounds(&self) -> bool { matches!(self, Error::OutOfBounds { .. }) }

    /// Damaged stored data: a bad length field or a body that won't decode.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Error::Corrupt { .. } | Error::Decode { .. })
    }

    pub fn is_io(&self) -> bool {
        matches!(self, Error::RegionIo { .. } | Error::UnknownIOError { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
