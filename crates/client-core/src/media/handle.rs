//! Media handles and tracks
//!
//! A [`MediaHandle`] is a live, hardware-backed stream made of one or more
//! [`MediaTrack`]s. Whoever requested the handle owns it and must release it
//! before discarding it, otherwise the capture device stays busy.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of local media that can be requested from the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MediaKind {
    /// Camera plus microphone
    #[default]
    Camera,
    /// Screen capture plus system audio
    Screen,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Camera => write!(f, "camera"),
            MediaKind::Screen => write!(f, "screen"),
        }
    }
}

/// Where a handle came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaSource {
    /// Acquired locally through a [`MediaSourceProvider`](super::MediaSourceProvider)
    Local(MediaKind),
    /// Received from the remote peer once negotiation completed
    Remote,
}

/// Type of a single track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackKind {
    /// Audio track
    Audio,
    /// Video track
    Video,
}

/// A single capture track
///
/// Platform backends implement this for their native track type. `stop()` must
/// be idempotent.
pub trait MediaTrack: Send + Sync + fmt::Debug {
    /// Track identifier, unique within its handle
    fn id(&self) -> &str;

    /// Audio or video
    fn kind(&self) -> TrackKind;

    /// Human-readable device label
    fn label(&self) -> &str;

    /// Stop the track and release the underlying device
    fn stop(&self);

    /// Whether the track has been stopped
    fn is_stopped(&self) -> bool;
}

/// In-memory track used by the mock platform and the loopback rendezvous
#[derive(Debug)]
pub struct SyntheticTrack {
    id: String,
    kind: TrackKind,
    label: String,
    stopped: AtomicBool,
}

impl SyntheticTrack {
    /// Create a new live track
    pub fn new(kind: TrackKind, label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            label: label.into(),
            stopped: AtomicBool::new(false),
        }
    }
}

impl MediaTrack for SyntheticTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

struct HandleInner {
    id: Uuid,
    source: MediaSource,
    tracks: Vec<Arc<dyn MediaTrack>>,
    released: AtomicBool,
}

/// Acquired media stream
///
/// Cloning is cheap and every clone refers to the same stream: releasing any
/// clone releases them all.
#[derive(Clone)]
pub struct MediaHandle {
    inner: Arc<HandleInner>,
}

impl MediaHandle {
    /// Wrap a set of live tracks
    pub fn new(source: MediaSource, tracks: Vec<Arc<dyn MediaTrack>>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id: Uuid::new_v4(),
                source,
                tracks,
                released: AtomicBool::new(false),
            }),
        }
    }

    /// Build a handle of synthetic audio + video tracks
    pub fn synthetic(source: MediaSource) -> Self {
        let (video_label, audio_label) = match source {
            MediaSource::Local(MediaKind::Camera) => ("camera", "microphone"),
            MediaSource::Local(MediaKind::Screen) => ("screen", "system audio"),
            MediaSource::Remote => ("remote video", "remote audio"),
        };
        let tracks: Vec<Arc<dyn MediaTrack>> = vec![
            Arc::new(SyntheticTrack::new(TrackKind::Video, video_label)),
            Arc::new(SyntheticTrack::new(TrackKind::Audio, audio_label)),
        ];
        Self::new(source, tracks)
    }

    /// Unique handle identifier
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Origin of this handle
    pub fn source(&self) -> MediaSource {
        self.inner.source
    }

    /// Requested kind, `None` for remote handles
    pub fn kind(&self) -> Option<MediaKind> {
        match self.inner.source {
            MediaSource::Local(kind) => Some(kind),
            MediaSource::Remote => None,
        }
    }

    /// Tracks carried by this handle
    pub fn tracks(&self) -> &[Arc<dyn MediaTrack>] {
        &self.inner.tracks
    }

    /// Stop every track. Calling this more than once is a no-op.
    ///
    /// Returns `true` if this call performed the release.
    pub fn release(&self) -> bool {
        if self.inner.released.swap(true, Ordering::SeqCst) {
            return false;
        }
        for track in &self.inner.tracks {
            track.stop();
        }
        tracing::debug!(handle = %self.inner.id, source = ?self.inner.source, "Media handle released");
        true
    }

    /// Whether [`release`](Self::release) has run
    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::SeqCst)
    }

    /// Whether every track reports stopped
    pub fn all_tracks_stopped(&self) -> bool {
        self.inner.tracks.iter().all(|t| t.is_stopped())
    }

    /// Whether two handles refer to the same stream
    pub fn same_stream(&self, other: &MediaHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for MediaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaHandle")
            .field("id", &self.inner.id)
            .field("source", &self.inner.source)
            .field("tracks", &self.inner.tracks.len())
            .field("released", &self.is_released())
            .finish()
    }
}
