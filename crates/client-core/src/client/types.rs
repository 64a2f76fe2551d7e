//! Type definitions for the connection manager
//!
//! - **ConnectionStatus** - the single authoritative status of a manager
//! - **ManagerStats** - counters describing what the manager has done so far

use std::fmt;

use serde::{Deserialize, Serialize};

/// Connection status exposed to the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ConnectionStatus {
    /// No call and no outbound attempt in progress
    #[default]
    Disconnected,
    /// Outbound attempt in progress
    Connecting,
    /// Remote media is flowing
    Connected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
        }
    }
}

/// Statistics about the manager's activity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerStats {
    /// Outbound plus inbound attempts started
    pub total_attempts: usize,
    /// `connect` calls that passed validation
    pub outbound_attempts: usize,
    /// Inbound offers the manager tried to answer
    pub inbound_calls: usize,
    /// Attempts that reached `Connected`
    pub connected_calls: usize,
    /// Attempts that ended with an error
    pub failed_attempts: usize,
    /// Attempts discarded because `disconnect()` ran first
    pub cancelled_attempts: usize,
    /// Inbound offers left unanswered
    pub ignored_offers: usize,
}
