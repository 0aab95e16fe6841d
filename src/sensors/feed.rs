// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/safefall-rs

//! Sensor feed - drives a motion sensor at a fixed tick and replays falls

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{Axis3, MotionReading, MotionSensor, SampleWindow, SensorKind};
use crate::config::SensorConfig;
use crate::core::EventBus;
use crate::error::Result;

enum FeedCommand {
    SimulateFall,
}

struct FeedShared {
    latest: RwLock<MotionReading>,
    window: RwLock<SampleWindow<MotionReading>>,
    falling: AtomicBool,
    sequence: AtomicU64,
    event_bus: Arc<EventBus>,
}

impl FeedShared {
    fn record(&self, mut reading: MotionReading) {
        reading.sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        *self.latest.write() = reading.clone();
        self.window.write().push(reading.clone());
        self.event_bus.publish_reading(reading);
    }
}

/// Live stream of motion samples for one sensor
///
/// Baseline samples are produced every tick. `simulate_fall` suspends them,
/// replays the sensor's fall sequence one step per step interval, then
/// resumes. Dropping the feed stops its task.
pub struct SensorFeed {
    sensor_id: String,
    shared: Arc<FeedShared>,
    commands: mpsc::UnboundedSender<FeedCommand>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SensorFeed {
    pub async fn start(
        mut sensor: Box<dyn MotionSensor>,
        config: &SensorConfig,
        event_bus: Arc<EventBus>,
    ) -> Result<Self> {
        let sensor_id = sensor.id().to_string();
        sensor.connect().await?;
        info!("Connected motion sensor: {}", sensor_id);

        let shared = Arc::new(FeedShared {
            latest: RwLock::new(MotionReading::resting(&sensor_id)),
            window: RwLock::new(SampleWindow::new(config.window_capacity)),
            falling: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
            event_bus,
        });

        let (commands, command_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(run_feed(
            sensor,
            shared.clone(),
            command_rx,
            shutdown_rx,
            config.tick_interval(),
            config.fall_step_interval(),
        ));

        Ok(Self {
            sensor_id,
            shared,
            commands,
            shutdown,
            task: Some(task),
        })
    }

    pub fn sensor_id(&self) -> &str {
        &self.sensor_id
    }

    /// Start replaying a fall. Returns false if one is already in progress.
    pub fn simulate_fall(&self) -> bool {
        if self
            .shared
            .falling
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Fall simulation already in progress on {}", self.sensor_id);
            return false;
        }

        if self.commands.send(FeedCommand::SimulateFall).is_err() {
            self.shared.falling.store(false, Ordering::Release);
            warn!("Sensor feed {} is no longer running", self.sensor_id);
            return false;
        }

        info!("Simulating fall on {}", self.sensor_id);
        true
    }

    pub fn is_falling(&self) -> bool {
        self.shared.falling.load(Ordering::Acquire)
    }

    /// Most recent sample
    pub fn latest(&self) -> MotionReading {
        self.shared.latest.read().clone()
    }

    /// Charting window, oldest first
    pub fn window(&self) -> Vec<MotionReading> {
        self.shared.window.read().to_vec()
    }

    /// One axis triple per sample in the window
    pub fn series(&self, kind: SensorKind) -> Vec<(DateTime<Utc>, Axis3)> {
        self.shared
            .window
            .read()
            .iter()
            .map(|r| (r.timestamp, r.axis(kind)))
            .collect()
    }

    pub fn readings_count(&self) -> u64 {
        self.shared.sequence.load(Ordering::Relaxed)
    }

    /// Stop the feed and wait for the sensor to disconnect
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Sensor feed task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for SensorFeed {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Sensor feed {} torn down", self.sensor_id);
        }
    }
}

async fn run_feed(
    mut sensor: Box<dyn MotionSensor>,
    shared: Arc<FeedShared>,
    mut commands: mpsc::UnboundedReceiver<FeedCommand>,
    mut shutdown: watch::Receiver<bool>,
    tick: Duration,
    step: Duration,
) {
    let mut ticker = interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if shared.falling.load(Ordering::Acquire) {
                    continue;
                }
                match sensor.read().await {
                    Ok(reading) => shared.record(reading),
                    Err(e) => debug!("Read error for {}: {}", sensor.id(), e),
                }
            }
            Some(command) = commands.recv() => match command {
                FeedCommand::SimulateFall => {
                    if !replay_fall(sensor.as_ref(), &shared, step, &mut shutdown).await {
                        break;
                    }
                }
            },
            _ = shutdown.changed() => break,
        }
    }

    if let Err(e) = sensor.disconnect().await {
        warn!("Error disconnecting {}: {}", sensor.id(), e);
    }
    info!("Sensor feed {} stopped", sensor.id());
}

/// Returns false if shutdown was requested mid-sequence
async fn replay_fall(
    sensor: &dyn MotionSensor,
    shared: &FeedShared,
    step: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    for fall_step in sensor.fall_sequence() {
        tokio::select! {
            _ = sleep(step) => {}
            _ = shutdown.changed() => return false,
        }
        debug!("Fall replay step: {}", fall_step.label);
        shared.record(MotionReading {
            sensor_id: sensor.id().to_string(),
            timestamp: Utc::now(),
            sequence: 0,
            accelerometer: fall_step.accelerometer,
            gyroscope: fall_step.gyroscope,
            simulated_fall: true,
        });
    }

    tokio::select! {
        _ = sleep(step) => {}
        _ = shutdown.changed() => return false,
    }
    shared.falling.store(false, Ordering::Release);
    true
}
