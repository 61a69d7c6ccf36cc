// Target Event Loop
//
// Serializes module and process events for one target. Each event is
// applied under the target lock and acknowledged to its sender; breakpoint
// stops are also published on a stop channel for observers.

use crate::error::{BkptResult, BreakpointError};
use crate::module::Module;
use crate::registry::LocationHit;
use crate::target::{ProcessState, SharedTarget, Target};
use crate::types::Address;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Events a running (or loading) process reports to its target
#[derive(Debug)]
pub enum TargetEvent {
    ModuleLoaded(Module),
    ModuleUnloaded(String),
    ProcessLaunched,
    BreakpointHit {
        address: Address,
        module: Option<String>,
    },
    ProcessExited { status: i32 },
}

/// What applying an event did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventReply {
    ModuleLoaded { locations_added: usize },
    ModuleUnloaded { locations_removed: usize },
    Launched { run: u32 },
    Stopped { hits: Vec<LocationHit> },
    Exited { status: i32 },
}

/// A stop at one or more breakpoint locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopNotification {
    pub run: u32,
    pub address: Address,
    pub hits: Vec<LocationHit>,
}

struct EventRequest {
    event: TargetEvent,
    reply_tx: Option<oneshot::Sender<BkptResult<EventReply>>>,
}

/// Handle to a target's event loop
#[derive(Clone, Debug)]
pub struct EventLoopHandle {
    event_tx: mpsc::Sender<EventRequest>,
    stop_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<StopNotification>>>,
}

impl std::fmt::Debug for EventRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRequest").field("event", &self.event).finish()
    }
}

impl EventLoopHandle {
    /// Send an event and wait until the target has applied it
    pub async fn send_event(&self, event: TargetEvent) -> BkptResult<EventReply> {
        let (reply_tx, reply_rx) = oneshot::channel();

        let request = EventRequest {
            event,
            reply_tx: Some(reply_tx),
        };

        self.event_tx
            .send(request)
            .await
            .map_err(|_| BreakpointError::EventLoopClosed)?;

        reply_rx.await.map_err(|_| BreakpointError::EventLoopClosed)?
    }

    /// Queue an event without waiting for it to be applied
    pub async fn post_event(&self, event: TargetEvent) -> BkptResult<()> {
        self.event_tx
            .send(EventRequest {
                event,
                reply_tx: None,
            })
            .await
            .map_err(|_| BreakpointError::EventLoopClosed)
    }

    /// Try to receive a stop (non-blocking)
    pub async fn try_recv_stop(&self) -> Option<StopNotification> {
        let mut rx = self.stop_rx.lock().await;
        rx.try_recv().ok()
    }

    /// Wait for the next stop
    pub async fn recv_stop(&self) -> Option<StopNotification> {
        let mut rx = self.stop_rx.lock().await;
        rx.recv().await
    }
}

/// Start the event loop task for `target`
pub fn spawn_event_loop(target: SharedTarget) -> EventLoopHandle {
    let (event_tx, event_rx) = mpsc::channel(32);
    let (stop_tx, stop_rx) = mpsc::channel(256);

    tokio::spawn(event_loop_task(target, event_rx, stop_tx));

    EventLoopHandle {
        event_tx,
        stop_rx: Arc::new(tokio::sync::Mutex::new(stop_rx)),
    }
}

async fn event_loop_task(
    target: SharedTarget,
    mut event_rx: mpsc::Receiver<EventRequest>,
    stop_tx: mpsc::Sender<StopNotification>,
) {
    info!("Event loop started");

    while let Some(request) = event_rx.recv().await {
        debug!("Applying event {:?}", request.event);

        let (result, stop) = {
            let mut target = target.lock().await;
            apply_event(&mut target, request.event)
        };

        if let Some(stop) = stop {
            match stop_tx.try_send(stop) {
                Ok(_) => {}
                Err(mpsc::error::TrySendError::Full(stop)) => {
                    error!(
                        "Stop channel full! Dropping stop at {:#x} with {} hits",
                        stop.address,
                        stop.hits.len()
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    warn!("Stop receiver dropped, future stops will be discarded");
                }
            }
        }

        if let Err(e) = &result {
            warn!("Event failed: {}", e);
        }
        if let Some(tx) = request.reply_tx {
            tx.send(result).ok();
        }
    }

    info!("Event loop shutting down");
}

fn apply_event(
    target: &mut Target,
    event: TargetEvent,
) -> (BkptResult<EventReply>, Option<StopNotification>) {
    let reply = match event {
        TargetEvent::ModuleLoaded(module) => target
            .add_module(module)
            .map(|locations_added| EventReply::ModuleLoaded { locations_added }),
        TargetEvent::ModuleUnloaded(name) => target
            .remove_module(&name)
            .map(|locations_removed| EventReply::ModuleUnloaded { locations_removed }),
        TargetEvent::ProcessLaunched => Ok(EventReply::Launched {
            run: target.launch(),
        }),
        TargetEvent::BreakpointHit { address, module } => {
            let hits = target.hit_in(address, module.as_deref());
            let stop = match target.process_state() {
                ProcessState::Running { run } if !hits.is_empty() => Some(StopNotification {
                    run,
                    address,
                    hits: hits.clone(),
                }),
                _ => None,
            };
            return (Ok(EventReply::Stopped { hits }), stop);
        }
        TargetEvent::ProcessExited { status } => {
            target.exit(status);
            Ok(EventReply::Exited { status })
        }
    };
    (reply, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breakpoint::BreakpointSpec;
    use crate::registry::CreateOptions;
    use crate::settings::TargetSettings;
    use tokio::sync::Mutex;

    const MODULE: &str = r#"{
        "name": "a.out",
        "symbols": [{"name": "main", "address": "0x1000", "size": "0x20"}],
        "compile_units": [{
            "name": "/src/main.c",
            "line_table": [
                {"file": "/src/main.c", "line": 3, "address": "0x1000"},
                {"file": "/src/main.c", "line": 4, "address": "0x1008"},
                {"file": "/src/main.c", "line": 4, "address": "0x1020", "end_sequence": true}
            ]
        }]
    }"#;

    fn shared() -> SharedTarget {
        Arc::new(Mutex::new(Target::new(1, "a.out", TargetSettings::default())))
    }

    #[tokio::test]
    async fn test_module_load_resolves_pending_breakpoint() {
        let target = shared();
        let id = target
            .lock()
            .await
            .create_breakpoint(BreakpointSpec::file_line("main.c", 4), CreateOptions::default())
            .unwrap();

        let handle = spawn_event_loop(target.clone());
        let reply = handle
            .send_event(TargetEvent::ModuleLoaded(Module::from_json_str(MODULE).unwrap()))
            .await
            .unwrap();
        assert_eq!(reply, EventReply::ModuleLoaded { locations_added: 1 });
        assert_eq!(target.lock().await.registry().get(id).unwrap().locations().len(), 1);
    }

    #[tokio::test]
    async fn test_hit_publishes_stop() {
        let target = shared();
        let handle = spawn_event_loop(target.clone());
        handle
            .send_event(TargetEvent::ModuleLoaded(Module::from_json_str(MODULE).unwrap()))
            .await
            .unwrap();
        target
            .lock()
            .await
            .create_breakpoint(BreakpointSpec::file_line("main.c", 4), CreateOptions::default())
            .unwrap();

        assert_eq!(
            handle.send_event(TargetEvent::ProcessLaunched).await.unwrap(),
            EventReply::Launched { run: 1 }
        );
        handle
            .send_event(TargetEvent::BreakpointHit {
                address: 0x1008,
                module: None,
            })
            .await
            .unwrap();

        let stop = handle.recv_stop().await.unwrap();
        assert_eq!(stop.run, 1);
        assert_eq!(stop.address, 0x1008);
        assert_eq!(stop.hits.len(), 1);
        assert_eq!(stop.hits[0].hit_count, 1);

        // A miss does not publish anything
        handle
            .send_event(TargetEvent::BreakpointHit {
                address: 0x1000,
                module: None,
            })
            .await
            .unwrap();
        assert!(handle.try_recv_stop().await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_module_unload_is_reported() {
        let handle = spawn_event_loop(shared());
        let result = handle
            .send_event(TargetEvent::ModuleUnloaded("libmissing.so".to_string()))
            .await;
        assert!(matches!(result, Err(BreakpointError::UnknownModule(_))));
    }

    #[tokio::test]
    async fn test_posted_events_apply_in_order() {
        let target = shared();
        let handle = spawn_event_loop(target.clone());
        handle
            .post_event(TargetEvent::ModuleLoaded(Module::from_json_str(MODULE).unwrap()))
            .await
            .unwrap();
        handle.post_event(TargetEvent::ProcessLaunched).await.unwrap();

        // Acknowledged events are applied after everything posted before them
        handle
            .send_event(TargetEvent::ProcessExited { status: 3 })
            .await
            .unwrap();
        let target = target.lock().await;
        assert_eq!(target.loaded_modules().len(), 1);
        assert_eq!(target.process_state(), ProcessState::Exited { status: 3 });
    }
}
