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

//! Chunk body compression, selected by the version byte that follows the
//! length field of every stored chunk.

use std::{
    fmt::{Display, Formatter},
    io::{Read, Write},
};

use snafu::{Location, ResultExt, Snafu};

use flate2::{
    read::{GzDecoder, ZlibDecoder},
    write::ZlibEncoder,
    Compression,
};

/// The version tag stored in front of every chunk body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChunkVersion {
    /// gzip, only ever read.
    Gzip = 1,
    /// zlib, used for every new write.
    Zlib = 2,
}

impl ChunkVersion {
    pub const CURRENT: ChunkVersion = ChunkVersion::Zlib;

    pub const fn tag(self) -> u8 { self as u8 }
}

impl TryFrom<u8> for ChunkVersion {
    type Error = u8;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            1 => Ok(ChunkVersion::Gzip),
            2 => Ok(ChunkVersion::Zlib),
            unknown => Err(unknown),
        }
    }
}

impl Display for ChunkVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkVersion::Gzip => write!(f, "gzip"),
            ChunkVersion::Zlib => write!(f, "zlib"),
        }
    }
}

/// The reason a chunk body could not be decoded.
#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum DecodeError {
    #[snafu(display("unknown chunk version {tag}"))]
    UnknownVersion {
        tag:      u8,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("malformed {version} body"))]
    Malformed {
        version:  ChunkVersion,
        source:   std::io::Error,
        #[snafu(implicit)]
        location: Location,
    },
}

/// Compresses new chunk bodies and decompresses stored ones.
#[derive(Debug, Clone, Copy)]
pub struct ChunkCodec {
    level: Compression,
}

impl Default for ChunkCodec {
    fn default() -> Self { Self::new(Compression::default().level()) }
}

impl ChunkCodec {
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }

    /// A streaming encoder in the current format over an in-memory buffer.
    pub fn encoder(&self) -> ZlibEncoder<Vec<u8>> {
        ZlibEncoder::new(Vec::with_capacity(8 << 10), self.level)
    }

    /// Compress `payload` in the current format.
    pub fn encode(&self, payload: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut encoder = self.encoder();
        encoder.write_all(payload)?;
        encoder.finish()
    }

    /// Decompress a stored body tagged with `tag`.
    pub fn decode(tag: u8, body: &[u8]) -> Result<Vec<u8>, DecodeError> {
        let version = ChunkVersion::try_from(tag)
            .map_err(|tag| UnknownVersionSnafu { tag }.build())?;
        let mut out = Vec::with_capacity(body.len() * 2);
        let read = match version {
            ChunkVersion::Gzip => GzDecoder::new(body).read_to_end(&mut out),
            ChunkVersion::Zlib => ZlibDecoder::new(body).read_to_end(&mut out),
        };
        read.context(MalformedSnafu { version })?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use flate2::write::GzEncoder;

    use super::*;

    #[test]
    fn zlib_is_current() {
        let codec = ChunkCodec::default();
        let payload = b"hello region".repeat(100);
        let body = codec.encode(&payload).unwrap();
        assert!(body.len() < payload.len());
        let decoded = ChunkCodec::decode(ChunkVersion::CURRENT.tag(), &body).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn legacy_gzip_still_decodes() {
        let payload = b"legacy chunk".repeat(20);
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&payload).unwrap();
        let body = encoder.finish().unwrap();

        let decoded = ChunkCodec::decode(1, &body).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn unknown_version() {
        let body = ChunkCodec::default().encode(b"x").unwrap();
        for tag in [0u8, 3, 255] {
            assert!(matches!(
                ChunkCodec::decode(tag, &body),
                Err(DecodeError::UnknownVersion { tag: t, .. }) if t == tag
            ));
        }
    }

    #[test]
    fn garbage_body() {
        let res = ChunkCodec::decode(2, &[0xde, 0xad, 0xbe, 0xef]);
        let err = res.unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Malformed {
                version: ChunkVersion::Zlib,
                ..
            }
        ));
        // the inflate failure stays reachable as the cause.
        assert!(std::error::Error::source(&err).is_some());
    }
}
