//! Engine - owns the shared services and tracks system state

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use anyhow::Result;
use tracing::{info, warn};

use crate::auth::AuthService;
use crate::config::Config;
use crate::db::Database;
use crate::lifecycle::FallLifecycle;
use crate::realtime::ChangeFeed;
use crate::sensors::{MotionSensor, SensorFeed};
use super::{EventBus, SystemState};

/// Main SafeFall engine
pub struct Engine {
    pub config: Arc<Config>,
    bus: Arc<EventBus>,
    changes: Arc<ChangeFeed>,
    db: Database,
    auth: Arc<AuthService>,
    lifecycle: FallLifecycle,
    feed: Option<SensorFeed>,
    state: Arc<RwLock<SystemState>>,
    stats_task: Option<JoinHandle<()>>,
    start_time: Option<Instant>,
}

impl Engine {
    /// Engine over the configured on-disk store
    pub async fn new(config: Config) -> Result<Self> {
        let changes = Arc::new(ChangeFeed::new(config.database.change_buffer));
        let db = if config.database.enabled {
            Database::open(&config.database, changes.clone())?
        } else {
            Database::open_in_memory(changes.clone())?
        };
        Ok(Self::assemble(config, changes, db))
    }

    /// Engine over a throwaway store
    pub fn in_memory(config: Config) -> Result<Self> {
        let changes = Arc::new(ChangeFeed::new(config.database.change_buffer));
        let db = Database::open_in_memory(changes.clone())?;
        Ok(Self::assemble(config, changes, db))
    }

    fn assemble(config: Config, changes: Arc<ChangeFeed>, db: Database) -> Self {
        let bus = Arc::new(EventBus::default());
        let auth = Arc::new(AuthService::new(db.clone(), &config.auth));
        let lifecycle = FallLifecycle::new(db.clone(), bus.clone(), &config.lifecycle);

        Self {
            config: Arc::new(config),
            bus,
            changes,
            db,
            auth,
            lifecycle,
            feed: None,
            state: Arc::new(RwLock::new(SystemState::default())),
            stats_task: None,
            start_time: None,
        }
    }

    pub async fn start(&mut self) -> Result<()> {
        info!("Starting SafeFall engine...");
        self.start_time = Some(Instant::now());
        self.state.write().await.running = true;

        let state = self.state.clone();
        let mut readings = self.bus.subscribe_readings();
        let mut lifecycle = self.bus.subscribe_lifecycle();

        self.stats_task = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    reading = readings.recv() => match reading {
                        Ok(_) => state.write().await.total_readings += 1,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            state.write().await.total_readings += n;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    event = lifecycle.recv() => match event {
                        Ok(event) => state.write().await.record(&event),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("State tracker missed {} lifecycle events", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        }));

        info!("SafeFall engine started");
        Ok(())
    }

    /// Start streaming from `sensor`, replacing any running feed
    pub async fn start_feed(&mut self, sensor: Box<dyn MotionSensor>) -> Result<&SensorFeed> {
        if let Some(previous) = self.feed.take() {
            previous.stop().await;
        }
        let feed = SensorFeed::start(sensor, &self.config.sensors, self.bus.clone()).await?;
        info!("Sensor feed {} running", feed.sensor_id());
        self.state.write().await.feeds_active = 1;
        Ok(self.feed.insert(feed))
    }

    pub async fn stop(&mut self) -> Result<()> {
        info!("Stopping SafeFall engine...");

        if let Some(feed) = self.feed.take() {
            feed.stop().await;
        }
        if let Some(task) = self.stats_task.take() {
            task.abort();
        }

        {
            let mut state = self.state.write().await;
            state.running = false;
            state.feeds_active = 0;
        }

        info!("SafeFall engine stopped");
        Ok(())
    }

    pub async fn state(&self) -> SystemState {
        let mut state = self.state.read().await.clone();
        state.uptime_seconds = self.uptime();
        state
    }

    pub fn uptime(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn changes(&self) -> &Arc<ChangeFeed> {
        &self.changes
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn auth(&self) -> &Arc<AuthService> {
        &self.auth
    }

    pub fn lifecycle(&self) -> &FallLifecycle {
        &self.lifecycle
    }

    pub fn feed(&self) -> Option<&SensorFeed> {
        self.feed.as_ref()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Some(task) = self.stats_task.take() {
            task.abort();
        }
    }
}
