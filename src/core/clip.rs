//! Track identifiers, prepared clip handles and the fetch/prepare seam.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Counter for handle serials (unique per process)
static HANDLE_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Opaque key naming a playable clip (a URL in practice).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TrackId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for TrackId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug)]
struct ClipData {
    id: TrackId,
    location: String,
    duration: f64,
    size_bytes: Option<u64>,
    serial: u64,
}

/// Prepared clip, owned by the cache for the whole session.
///
/// Cheap to clone (shared). Two handles compare equal only when they come
/// from the same prepare call.
#[derive(Debug, Clone)]
pub struct ClipHandle {
    data: Arc<ClipData>,
}

impl ClipHandle {
    /// Create handle for a prepared clip
    ///
    /// # Arguments
    /// * `id` - Track the clip was prepared for
    /// * `location` - Resolved source (path or URL actually opened)
    /// * `duration` - Clip length in seconds (negative values clamp to 0)
    pub fn new(id: TrackId, location: impl Into<String>, duration: f64) -> Self {
        Self {
            data: Arc::new(ClipData {
                id,
                location: location.into(),
                duration: duration.max(0.0),
                size_bytes: None,
                serial: HANDLE_SERIAL.fetch_add(1, Ordering::Relaxed),
            }),
        }
    }

    /// Same as `new`, with the byte size reported by the source.
    pub fn with_size(id: TrackId, location: impl Into<String>, duration: f64, size: u64) -> Self {
        let mut handle = Self::new(id, location, duration);
        if let Some(data) = Arc::get_mut(&mut handle.data) {
            data.size_bytes = Some(size);
        }
        handle
    }

    pub fn id(&self) -> &TrackId {
        &self.data.id
    }

    pub fn location(&self) -> &str {
        &self.data.location
    }

    /// Clip length in seconds
    pub fn duration(&self) -> f64 {
        self.data.duration
    }

    pub fn size_bytes(&self) -> Option<u64> {
        self.data.size_bytes
    }

    pub fn serial(&self) -> u64 {
        self.data.serial
    }
}

impl PartialEq for ClipHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl Eq for ClipHandle {}

/// External fetch/prepare collaborator.
///
/// Called from a worker thread, at most once in flight per track. The error
/// is opaque to the pipeline and ends up as the `cause` of `LoadFailed`.
pub trait ClipSource: Send + Sync {
    fn fetch_and_prepare(&self, id: &TrackId) -> anyhow::Result<ClipHandle>;
}

impl<T: ClipSource + ?Sized> ClipSource for Arc<T> {
    fn fetch_and_prepare(&self, id: &TrackId) -> anyhow::Result<ClipHandle> {
        (**self).fetch_and_prepare(id)
    }
}
