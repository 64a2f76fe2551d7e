//! Local media acquisition
//!
//! The connection manager never talks to capture devices directly. It asks a
//! [`MediaSourceProvider`] for a [`MediaHandle`] and releases it when the
//! attempt or call ends.
//!
//! ```text
//! ┌─────────────────────┐    ┌─────────────────────┐    ┌─────────────────────┐
//! │  ConnectionManager  │    │ MediaSourceProvider │    │   Platform capture  │
//! │                     │    │                     │    │                     │
//! │ connect()           │───▶│ acquire(kind)       │───▶│ camera / screen     │
//! │ disconnect()        │───▶│ release(handle)     │───▶│ stop tracks         │
//! └─────────────────────┘    └─────────────────────┘    └─────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use peerlink_client_core::media::{MediaKind, MediaSourceProvider, MockMediaProvider};
//!
//! # tokio_test::block_on(async {
//! let provider = MockMediaProvider::new();
//! let handle = provider.acquire(MediaKind::Camera).await.unwrap();
//! assert!(!handle.all_tracks_stopped());
//!
//! provider.release(&handle);
//! assert!(handle.all_tracks_stopped());
//! # })
//! ```

pub mod handle;
pub mod platform;
pub mod provider;

pub use handle::{MediaHandle, MediaKind, MediaSource, MediaTrack, SyntheticTrack, TrackKind};
pub use platform::create_platform_provider;
pub use platform::mock_impl::{MockMediaProvider, MockOutcome};
pub use provider::{MediaError, MediaResult, MediaSourceProvider};
