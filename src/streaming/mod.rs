//! Streaming module - WebSocket fan-out of readings, lifecycle events and changes

mod websocket;

pub use websocket::*;

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::{EventBus, LifecycleEvent};
use crate::sensors::MotionReading;
use crate::realtime::{ChangeFeed, ChangeFilter, ChangeSignal, Subscription, Table};

/// Streaming configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Enable WebSocket server
    pub websocket_enabled: bool,
    pub websocket_port: u16,
    pub websocket_max_clients: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            websocket_enabled: false,
            websocket_port: 8765,
            websocket_max_clients: 10,
        }
    }
}

/// Streaming manager
pub struct StreamingManager {
    config: StreamingConfig,
    websocket_server: Option<Arc<WebSocketServer>>,
    forwarder: Option<JoinHandle<()>>,
}

impl StreamingManager {
    pub fn new(config: StreamingConfig) -> Self {
        let websocket_server = if config.websocket_enabled {
            Some(Arc::new(WebSocketServer::new(
                config.websocket_port,
                config.websocket_max_clients,
            )))
        } else {
            None
        };

        Self {
            config,
            websocket_server,
            forwarder: None,
        }
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    /// Start the server and forward bus traffic to it
    ///
    /// Returns the bound address, or `None` when the server is disabled.
    pub async fn start(
        &mut self,
        bus: Arc<EventBus>,
        changes: &ChangeFeed,
        shutdown: &broadcast::Sender<()>,
    ) -> Result<Option<SocketAddr>> {
        let Some(ws) = self.websocket_server.clone() else {
            return Ok(None);
        };

        let addr = ws.start(shutdown.subscribe()).await?;
        let feeds = Feeds {
            readings: bus.subscribe_readings(),
            lifecycle: bus.subscribe_lifecycle(),
            emergencies: changes.subscribe(Table::FallEvents, ChangeFilter::ActiveEmergencies),
        };
        self.forwarder = Some(tokio::spawn(forward(ws, feeds, shutdown.subscribe())));
        Ok(Some(addr))
    }

    pub fn websocket(&self) -> Option<&Arc<WebSocketServer>> {
        self.websocket_server.as_ref()
    }
}

impl Drop for StreamingManager {
    fn drop(&mut self) {
        if let Some(task) = self.forwarder.take() {
            task.abort();
        }
    }
}

/// Sources taken before the forwarder starts, so nothing published after
/// `start` returns is missed
struct Feeds {
    readings: broadcast::Receiver<MotionReading>,
    lifecycle: broadcast::Receiver<LifecycleEvent>,
    emergencies: Subscription,
}

async fn forward(ws: Arc<WebSocketServer>, feeds: Feeds, mut shutdown: broadcast::Receiver<()>) {
    let Feeds {
        mut readings,
        mut lifecycle,
        mut emergencies,
    } = feeds;

    loop {
        let sent = tokio::select! {
            _ = shutdown.recv() => break,

            reading = readings.recv() => match reading {
                Ok(r) => ws.broadcast_reading(&r),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!("Streaming skipped {} readings", n);
                    Ok(())
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },

            event = lifecycle.recv() => match event {
                Ok(e) => ws.broadcast_lifecycle(&e),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Streaming skipped {} lifecycle events", n);
                    Ok(())
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },

            signal = emergencies.changed() => match signal {
                Ok(ChangeSignal::Change(change)) => ws.broadcast_change(&change),
                Ok(ChangeSignal::Resync) => {
                    ws.broadcast_system("resync");
                    Ok(())
                }
                Err(e) => {
                    warn!("Emergency change stream ended: {}", e);
                    break;
                }
            },
        };

        if let Err(e) = sent {
            warn!("Failed to stream message: {}", e);
        }
    }
}
