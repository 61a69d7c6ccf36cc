// Debug session management
//
// Tracks the targets created over MCP and which one tools act on

use bkpt_core::{Debugger, TargetHandle, TargetSettings};
use bkpt_core::types::TargetId;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct SessionManager {
    debugger: Debugger,
    current_target: Arc<Mutex<Option<TargetId>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            debugger: Debugger::new(),
            current_target: Arc::new(Mutex::new(None)),
        }
    }

    pub fn debugger(&self) -> &Debugger {
        &self.debugger
    }

    /// Create a target and make it current
    pub async fn create_target(&self, name: &str, settings: TargetSettings) -> (TargetId, TargetHandle) {
        let (id, handle) = self.debugger.create_target(name, settings).await;

        let mut current = self.current_target.lock().await;
        *current = Some(id);

        (id, handle)
    }

    /// Target named by `id`, else the current one
    pub async fn get_target(&self, id: Option<TargetId>) -> Result<TargetHandle, String> {
        let id = match id {
            Some(id) => id,
            None => self
                .current_target
                .lock()
                .await
                .ok_or_else(|| "No target. Use target.create first.".to_string())?,
        };

        self.debugger.get_target(id).await.map_err(|e| e.to_string())
    }

    pub async fn select_target(&self, id: TargetId) -> Result<(), String> {
        self.debugger.get_target(id).await.map_err(|e| e.to_string())?;
        *self.current_target.lock().await = Some(id);
        Ok(())
    }

    pub async fn remove_target(&self, id: TargetId) -> Result<(), String> {
        self.debugger.remove_target(id).await.map_err(|e| e.to_string())?;

        // Clear current if it was this target
        let mut current = self.current_target.lock().await;
        if *current == Some(id) {
            *current = None;
        }
        Ok(())
    }
}
