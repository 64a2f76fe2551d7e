//! # PeerLink Client Core
//!
//! Lifecycle management for one-to-one audio/video calls between peers that
//! find each other through a rendezvous service.
//!
//! The crate ties together three collaborators:
//! - a **media source provider** that captures camera or screen media,
//! - a **signaling identity** registered with the rendezvous service,
//! - at most one **call session** with a remote peer,
//!
//! and exposes a single observable [`ConnectionStatus`] plus local and remote
//! media handles to a presentation layer.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use peerlink_client_core::{ConnectionManagerBuilder, ConnectionEvent};
//! use peerlink_client_core::media::MockMediaProvider;
//! use peerlink_client_core::signaling::LoopbackRendezvous;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let rendezvous = LoopbackRendezvous::new();
//!     let alice = ConnectionManagerBuilder::new()
//!         .label("alice")
//!         .media_provider(Arc::new(MockMediaProvider::new()))
//!         .signaling(Arc::new(rendezvous.identity()))
//!         .build()?;
//!     let bob = ConnectionManagerBuilder::new()
//!         .label("bob")
//!         .media_provider(Arc::new(MockMediaProvider::new()))
//!         .signaling(Arc::new(rendezvous.identity()))
//!         .build()?;
//!
//!     alice.open().await?;
//!     let bob_id = bob.open().await?;
//!
//!     let mut events = alice.subscribe();
//!     alice.connect(bob_id.as_str()).await?;
//!     while let Ok(event) = events.recv().await {
//!         if let ConnectionEvent::RemoteStreamAvailable { .. } = event {
//!             break;
//!         }
//!     }
//!
//!     alice.disconnect();
//!     alice.dispose().await?;
//!     bob.dispose().await?;
//!     Ok(())
//! }
//! ```

pub mod call;
pub mod client;
pub mod error;
pub mod events;
pub mod media;
pub mod signaling;

pub use call::{CallDirection, CallId, CallInfo, CallSession, CallState, CloseReason};
pub use client::{ConnectionManager, ConnectionManagerBuilder, ConnectionStatus, ManagerConfig, ManagerStats};
pub use error::{ConnectionError, ConnectionResult, ErrorCategory};
pub use events::{ConnectionEvent, ConnectionEventHandler, EventStream};
pub use media::{MediaError, MediaHandle, MediaKind, MediaSourceProvider};
pub use signaling::{SessionIdentifier, SignalingError, SignalingIdentity};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
