//! Packaged trace payloads and the packaging seam.
//!
//! Raw flushed trace text is wrapped under a fixed logical entry name inside
//! a compressed container before storage. The container format belongs to a
//! collaborator behind [`PayloadPackager`]; the in-crate default is gzip with
//! the entry name recorded in the gzip filename header.

use flate2::read::GzDecoder;
use flate2::{Compression, GzBuilder};
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;

/// Logical filename the raw trace text is stored under inside the container.
pub const TRACE_ENTRY_NAME: &str = "tracing.json";

/// A packaged trace payload: immutable, reference-counted bytes.
///
/// Cloning is cheap and shares the underlying buffer. Once built, the bytes
/// are never mutated, so the store and any number of delivered consumers may
/// hold references concurrently.
#[derive(Clone)]
pub struct TracePayload {
    bytes: Arc<[u8]>,
}

impl TracePayload {
    /// Wraps packaged bytes into a shareable payload.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Returns the packaged bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the packaged size in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if the payload holds no bytes.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for TracePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracePayload")
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl AsRef<[u8]> for TracePayload {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Wraps raw trace bytes into the transportable container format.
///
/// The coordinator owns no container format of its own; it hands the raw
/// bytes plus the desired entry name to this seam and stores whatever comes
/// back.
pub trait PayloadPackager: Send + Sync {
    /// Packages `raw` under `entry_name`, returning the container bytes.
    fn package(&self, entry_name: &str, raw: &[u8]) -> io::Result<Vec<u8>>;
}

/// Gzip-based packager.
///
/// The entry name rides in the gzip filename header, so consumers unpacking
/// the container recover both the name and the original bytes.
#[derive(Debug, Clone, Copy)]
pub struct GzipPackager {
    level: Compression,
}

impl GzipPackager {
    /// Creates a packager with the default compression level.
    #[must_use]
    pub fn new() -> Self {
        Self {
            level: Compression::default(),
        }
    }

    /// Creates a packager with an explicit compression level.
    #[must_use]
    pub const fn with_level(level: Compression) -> Self {
        Self { level }
    }
}

impl Default for GzipPackager {
    fn default() -> Self {
        Self::new()
    }
}

impl PayloadPackager for GzipPackager {
    fn package(&self, entry_name: &str, raw: &[u8]) -> io::Result<Vec<u8>> {
        let mut encoder = GzBuilder::new()
            .filename(entry_name)
            .write(Vec::new(), self.level);
        encoder.write_all(raw)?;
        encoder.finish()
    }
}

/// Unpacks a gzip container produced by [`GzipPackager`], returning the
/// recorded entry name and the original bytes. Intended for consumers and
/// tests; the coordinator itself never unpacks.
pub fn unpackage_gzip(container: &[u8]) -> io::Result<(Option<String>, Vec<u8>)> {
    let mut decoder = GzDecoder::new(container);
    let mut raw = Vec::new();
    decoder.read_to_end(&mut raw)?;
    let entry_name = decoder
        .header()
        .and_then(|header| header.filename())
        .map(|name| String::from_utf8_lossy(name).into_owned());
    Ok((entry_name, raw))
}
