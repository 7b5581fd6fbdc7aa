//! Series identity and datapoint types

use crate::Timestamp;
use std::fmt;
use std::sync::Arc;

/// Opaque per-datapoint payload.
///
/// Owned bytes; never borrowed from a decode buffer.
pub type Annotation = Vec<u8>;

/// Immutable byte identifier.
///
/// Used for series IDs and namespace IDs. Cloning is cheap (reference
/// counted), so one resolved identity can be handed out for every datapoint
/// of a series without copying the bytes.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident(Arc<[u8]>);

impl Ident {
    /// Create an identifier by copying `bytes`.
    pub fn new(bytes: &[u8]) -> Self {
        Ident(Arc::from(bytes))
    }

    /// Raw bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the empty identifier.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&[u8]> for Ident {
    fn from(bytes: &[u8]) -> Self {
        Ident::new(bytes)
    }
}

impl From<&str> for Ident {
    fn from(s: &str) -> Self {
        Ident::new(s.as_bytes())
    }
}

impl From<Vec<u8>> for Ident {
    fn from(bytes: Vec<u8>) -> Self {
        Ident(Arc::from(bytes))
    }
}

impl AsRef<[u8]> for Ident {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => write!(f, "Ident({:?})", s),
            Err(_) => write!(f, "Ident({:?})", &self.0),
        }
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Resolved identity of one series within a single commit log.
///
/// A series is resolved once from the first metadata-bearing entry for its
/// unique index and is never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Series {
    /// Index identifying the series within the commit log file
    pub unique_index: u64,
    /// Series ID
    pub id: Ident,
    /// Namespace the series belongs to
    pub namespace: Ident,
    /// Shard the series is owned by
    pub shard: u32,
}

/// A single timestamped value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Datapoint {
    /// When the value was observed
    pub timestamp: Timestamp,
    /// Observed value
    pub value: f64,
}
