//! Connection manager and its configuration
//!
//! - **manager** - [`ConnectionManager`], the lifecycle controller
//! - **builder** - fluent construction
//! - **config** - [`ManagerConfig`]
//! - **types** - status and statistics
//! - **timeout** - bounded negotiation steps

pub mod builder;
pub mod config;
pub mod manager;
pub mod timeout;
pub mod types;


pub use builder::ConnectionManagerBuilder;
pub use config::ManagerConfig;
pub use manager::ConnectionManager;
pub use types::{ConnectionStatus, ManagerStats};
