//! Mock media backend
//!
//! Hands out synthetic tracks and lets callers script what the "user" does
//! with the permission prompt. Acquisitions can be held pending behind a gate
//! to reproduce a slow prompt.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::media::handle::{MediaHandle, MediaKind, MediaSource};
use crate::media::provider::{MediaError, MediaResult, MediaSourceProvider};

/// Scripted outcome for acquisitions of one kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
    /// Grant access and return a live handle
    Grant,
    /// Refuse with `PermissionDenied`
    Deny,
    /// Fail with `DeviceUnavailable` and the given reason
    Unavailable(String),
}

/// Mock media provider
pub struct MockMediaProvider {
    outcomes: Mutex<HashMap<MediaKind, MockOutcome>>,
    prompted: Mutex<HashSet<MediaKind>>,
    issued: Mutex<Vec<MediaHandle>>,
    gate: watch::Sender<bool>,
    started: watch::Sender<usize>,
}

impl MockMediaProvider {
    /// Provider that grants every request immediately
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        let (started, _) = watch::channel(0);
        Self {
            outcomes: Mutex::new(HashMap::new()),
            prompted: Mutex::new(HashSet::new()),
            issued: Mutex::new(Vec::new()),
            gate,
            started,
        }
    }

    /// Script the outcome for `kind`
    pub fn set_outcome(&self, kind: MediaKind, outcome: MockOutcome) {
        self.outcomes.lock().insert(kind, outcome);
    }

    /// Deny every future `kind` request
    pub fn deny(&self, kind: MediaKind) {
        self.set_outcome(kind, MockOutcome::Deny);
    }

    /// Report `kind` devices as unavailable
    pub fn make_unavailable(&self, kind: MediaKind, reason: impl Into<String>) {
        self.set_outcome(kind, MockOutcome::Unavailable(reason.into()));
    }

    /// Hold new and pending acquisitions until [`open_gate`](Self::open_gate)
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    /// Let held acquisitions resolve
    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    /// Number of acquisitions started so far
    pub fn acquisition_count(&self) -> usize {
        *self.started.borrow()
    }

    /// Wait until at least `count` acquisitions have started
    pub async fn wait_for_acquisitions(&self, count: usize) {
        let mut rx = self.started.subscribe();
        // sender lives in self, so the channel cannot close while we wait
        let _ = rx.wait_for(|started| *started >= count).await;
    }

    /// Whether a permission prompt was shown for `kind`
    pub fn prompted(&self, kind: MediaKind) -> bool {
        self.prompted.lock().contains(&kind)
    }

    /// Every handle this provider has granted, in order
    pub fn issued_handles(&self) -> Vec<MediaHandle> {
        self.issued.lock().clone()
    }

    /// Handles granted but not yet released
    pub fn live_handles(&self) -> Vec<MediaHandle> {
        self.issued
            .lock()
            .iter()
            .filter(|h| !h.is_released())
            .cloned()
            .collect()
    }
}

impl Default for MockMediaProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaSourceProvider for MockMediaProvider {
    async fn acquire(&self, kind: MediaKind) -> MediaResult<MediaHandle> {
        self.started.send_modify(|n| *n += 1);

        let first_prompt = self.prompted.lock().insert(kind);
        if first_prompt {
            tracing::debug!(%kind, "Showing permission prompt");
        }

        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        let outcome = self
            .outcomes
            .lock()
            .get(&kind)
            .cloned()
            .unwrap_or(MockOutcome::Grant);

        match outcome {
            MockOutcome::Grant => {
                let handle = MediaHandle::synthetic(MediaSource::Local(kind));
                self.issued.lock().push(handle.clone());
                Ok(handle)
            }
            MockOutcome::Deny => Err(MediaError::PermissionDenied { kind }),
            MockOutcome::Unavailable(reason) => Err(MediaError::DeviceUnavailable { kind, reason }),
        }
    }
}
