use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::io::{Read, Write};

pub fn compress(text: &str) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes()).map_err(Error::Compression)?;
    encoder.finish().map_err(Error::Compression)
}

pub fn decompress(bytes: &[u8]) -> Result<String> {
    let mut text = String::new();
    GzDecoder::new(bytes).read_to_string(&mut text).map_err(Error::Compression)?;
    Ok(text)
}

/// Stored document text, either as-is or gzip-compressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Body {
    Raw(String),
    Compressed(Vec<u8>),
}

impl Body {
    pub fn is_compressed(&self) -> bool {
        matches!(self, Body::Compressed(_))
    }

    pub fn text(&self) -> Result<Cow<'_, str>> {
        match self {
            Body::Raw(s) => Ok(Cow::Borrowed(s)),
            Body::Compressed(b) => decompress(b).map(Cow::Owned),
        }
    }

    /// Compressed bytes, encoding on the fly for raw bodies.
    pub fn compressed_bytes(&self) -> Result<Cow<'_, [u8]>> {
        match self {
            Body::Raw(s) => compress(s).map(Cow::Owned),
            Body::Compressed(b) => Ok(Cow::Borrowed(b)),
        }
    }

    /// Returns true when the body changed representation.
    pub fn compress_in_place(&mut self) -> Result<bool> {
        if let Body::Raw(s) = self {
            *self = Body::Compressed(compress(s)?);
            return Ok(true);
        }
        Ok(false)
    }

    pub fn decompress_in_place(&mut self) -> Result<bool> {
        if let Body::Compressed(b) = self {
            *self = Body::Raw(decompress(b)?);
            return Ok(true);
        }
        Ok(false)
    }
}
