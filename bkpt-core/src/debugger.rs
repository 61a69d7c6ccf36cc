// Debugger
//
// Owns every target and the event loop driving each one

use crate::error::{BkptResult, BreakpointError};
use crate::eventloop::{spawn_event_loop, EventLoopHandle};
use crate::settings::TargetSettings;
use crate::target::{SharedTarget, Target};
use crate::types::TargetId;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// A target together with the event loop feeding it
#[derive(Debug, Clone)]
pub struct TargetHandle {
    pub target: SharedTarget,
    pub events: EventLoopHandle,
}

#[derive(Debug)]
pub struct Debugger {
    targets: Arc<Mutex<BTreeMap<TargetId, TargetHandle>>>,
    next_id: AtomicU32,
}

impl Default for Debugger {
    fn default() -> Self {
        Self::new()
    }
}

impl Debugger {
    pub fn new() -> Self {
        Self {
            targets: Arc::new(Mutex::new(BTreeMap::new())),
            next_id: AtomicU32::new(1),
        }
    }

    /// Create a target and start its event loop. Must run inside a tokio runtime.
    pub async fn create_target(&self, name: &str, settings: TargetSettings) -> (TargetId, TargetHandle) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let target = Arc::new(Mutex::new(Target::new(id, name, settings)));
        let handle = TargetHandle {
            events: spawn_event_loop(target.clone()),
            target,
        };

        self.targets.lock().await.insert(id, handle.clone());
        info!("Created target {} ({})", id, name);
        (id, handle)
    }

    pub async fn get_target(&self, id: TargetId) -> BkptResult<TargetHandle> {
        self.targets
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(BreakpointError::UnknownTarget(id))
    }

    /// Drop a target; its event loop stops once the last handle is gone
    pub async fn remove_target(&self, id: TargetId) -> BkptResult<()> {
        self.targets
            .lock()
            .await
            .remove(&id)
            .map(|_| info!("Removed target {}", id))
            .ok_or(BreakpointError::UnknownTarget(id))
    }

    pub async fn targets(&self) -> Vec<TargetId> {
        self.targets.lock().await.keys().copied().collect()
    }

    /// Statistics for every target, in target order
    pub async fn statistics(&self) -> Value {
        let handles: Vec<TargetHandle> = self.targets.lock().await.values().cloned().collect();

        let mut targets = Vec::with_capacity(handles.len());
        for handle in handles {
            targets.push(handle.target.lock().await.statistics());
        }
        json!({ "targets": targets })
    }
}
