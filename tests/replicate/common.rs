// Shared helpers for replication tests

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Mutex;
use treemirror::sync::{Action, TargetReplicator, TargetStats};
use treemirror::transport::{LocalTransport, Transport};

/// Records every action, optionally applying it to an in-process target.
pub struct RecordingTransport {
    actions: Mutex<Vec<Action>>,
    forward: Option<LocalTransport>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            actions: Mutex::new(Vec::new()),
            forward: None,
        }
    }

    pub fn forwarding(target: TargetReplicator) -> Self {
        Self {
            actions: Mutex::new(Vec::new()),
            forward: Some(LocalTransport::new(target)),
        }
    }

    /// Drain the recorded actions.
    pub fn take(&self) -> Vec<Action> {
        std::mem::take(&mut *self.actions.lock().unwrap())
    }

    pub async fn target_stats(&self) -> TargetStats {
        self.forward.as_ref().unwrap().target_stats().await
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn call(&self, action: Action) -> Result<()> {
        self.actions.lock().unwrap().push(action.clone());
        match &self.forward {
            Some(target) => target.call(action).await,
            None => Ok(()),
        }
    }
}

/// `(action, path)` pairs, easier to compare than whole actions.
pub fn summary(actions: &[Action]) -> Vec<(&'static str, String)> {
    actions
        .iter()
        .map(|a| (a.name(), a.relative_path().to_string()))
        .collect()
}

pub fn set(items: &[&str]) -> std::collections::BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}
