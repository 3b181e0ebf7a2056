use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::sync::{Action, TargetReplicator, TargetStats};
use crate::transport::Transport;

/// Delivers actions to a target living in the same process.
pub struct LocalTransport {
    target: Mutex<TargetReplicator>,
}

impl LocalTransport {
    pub fn new(target: TargetReplicator) -> Self {
        Self {
            target: Mutex::new(target),
        }
    }

    pub async fn target_stats(&self) -> TargetStats {
        self.target.lock().await.stats().clone()
    }

    pub fn into_inner(self) -> TargetReplicator {
        self.target.into_inner()
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn call(&self, action: Action) -> Result<()> {
        self.target.lock().await.handle_request(action).await
    }
}
