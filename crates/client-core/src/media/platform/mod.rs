//! Platform-specific media backends
//!
//! Native capture backends plug in here by implementing
//! [`MediaSourceProvider`]. The mock backend is always available.

use std::sync::Arc;

use crate::media::provider::MediaSourceProvider;

pub mod mock_impl;

/// Create the default platform provider
pub fn create_platform_provider() -> Arc<dyn MediaSourceProvider> {
    Arc::new(mock_impl::MockMediaProvider::new())
}
