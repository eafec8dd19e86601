//! # Byte View
//!
//! Immutable byte container handed out by groups. Clones share the
//! underlying buffer, so fanning one loaded value out to many coalesced
//! callers costs a refcount bump, not a copy.

use std::fmt;

use bytes::Bytes;
use hive_engine::Measured;

/// An immutable view over cached bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteView {
    data: Bytes,
}

impl ByteView {
    /// Wraps raw bytes in a view.
    pub fn new(data: impl Into<Bytes>) -> Self {
        ByteView { data: data.into() }
    }

    /// Byte length of the view.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` when the view holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the data as an owned byte vector.
    ///
    /// Always copies, so callers can never reach the cached buffer.
    pub fn to_vec(&self) -> Vec<u8> {
        self.data.to_vec()
    }

    /// Consumes the view, handing back the shared buffer without copying.
    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

impl Measured for ByteView {
    fn size(&self) -> usize {
        self.data.len()
    }
}

impl fmt::Display for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.data))
    }
}

impl From<Vec<u8>> for ByteView {
    fn from(data: Vec<u8>) -> Self {
        ByteView::new(data)
    }
}

impl From<&[u8]> for ByteView {
    fn from(data: &[u8]) -> Self {
        ByteView::new(Bytes::copy_from_slice(data))
    }
}

impl From<&str> for ByteView {
    fn from(data: &str) -> Self {
        ByteView::new(Bytes::copy_from_slice(data.as_bytes()))
    }
}

impl From<Bytes> for ByteView {
    fn from(data: Bytes) -> Self {
        ByteView::new(data)
    }
}
