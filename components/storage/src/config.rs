use regio_common::{DEFAULT_CACHE_CAPACITY, DEFAULT_REGION_EXTENSION};
use serde::{Deserialize, Serialize};

/// What a read does with a chunk that exists but cannot be decoded.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadPolicy {
    /// Corrupt data and io failures are returned to the caller.
    #[default]
    Strict,
    /// Corrupt data and io failures are logged and reported as an absent
    /// chunk, so a damaged region doesn't stop a bulk load.
    Lenient,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Max number of region files the cache keeps open.
    pub capacity:          usize,
    /// The region file extension, `mca` by default.
    pub extension:         String,
    pub read_policy:       ReadPolicy,
    /// zlib level used for new writes, 0..=9.
    pub compression_level: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity:          DEFAULT_CACHE_CAPACITY,
            extension:         DEFAULT_REGION_EXTENSION.to_string(),
            read_policy:       ReadPolicy::default(),
            compression_level: 6,
        }
    }
}

impl Config {
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = extension.to_string();
        self
    }

    pub fn with_read_policy(mut self, read_policy: ReadPolicy) -> Self {
        self.read_policy = read_policy;
        self
    }

    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }
}
