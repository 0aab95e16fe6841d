// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/safefall-rs

//! Geolocation provider over a permission-gated location source
//!
//! A denial clears the coordinates and is only retried when the caller asks
//! again through [`GeolocationProvider::request_permission`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::LocationConfig;
use crate::error::SafeFallError;
use crate::models::Coordinates;

pub const PERMISSION_DENIED_MESSAGE: &str =
    "Location permission denied. Please enable location access.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("position unavailable: {0}")]
    Unavailable(String),
    #[error("location request timed out")]
    Timeout,
}

impl From<LocationError> for SafeFallError {
    fn from(e: LocationError) -> Self {
        match e {
            LocationError::PermissionDenied => {
                SafeFallError::PermissionDenied(PERMISSION_DENIED_MESSAGE.to_string())
            }
            other => SafeFallError::LocationUnavailable(other.to_string()),
        }
    }
}

pub type PositionUpdate = std::result::Result<Coordinates, LocationError>;

/// Platform location API
#[async_trait]
pub trait LocationSource: Send + Sync {
    /// One-shot position request. Prompts for permission if needed.
    async fn request(&self) -> std::result::Result<Coordinates, LocationError>;

    /// Continuous updates while permission holds
    fn watch(&self) -> Option<watch::Receiver<PositionUpdate>>;
}

/// In-process location source with scriptable permission
pub struct SimulatedLocationSource {
    granted: AtomicBool,
    position: watch::Sender<PositionUpdate>,
}

impl SimulatedLocationSource {
    pub fn new(initial: Coordinates) -> Self {
        let (position, _) = watch::channel(Ok(initial));
        Self {
            granted: AtomicBool::new(true),
            position,
        }
    }

    /// Source whose permission prompt is refused
    pub fn denied(initial: Coordinates) -> Self {
        let source = Self::new(initial);
        source.granted.store(false, Ordering::Release);
        source
    }

    pub fn grant(&self) {
        self.granted.store(true, Ordering::Release);
    }

    /// Revoke permission; active watchers are told
    pub fn deny(&self) {
        self.granted.store(false, Ordering::Release);
        let _ = self.position.send_replace(Err(LocationError::PermissionDenied));
    }

    pub fn move_to(&self, coordinates: Coordinates) {
        if self.granted.load(Ordering::Acquire) {
            let _ = self.position.send_replace(Ok(coordinates));
        }
    }

    /// Report a transient fix failure to watchers
    pub fn fail(&self, message: &str) {
        let _ = self
            .position
            .send_replace(Err(LocationError::Unavailable(message.to_string())));
    }
}

#[async_trait]
impl LocationSource for SimulatedLocationSource {
    async fn request(&self) -> std::result::Result<Coordinates, LocationError> {
        if !self.granted.load(Ordering::Acquire) {
            return Err(LocationError::PermissionDenied);
        }
        let current = self.position.borrow().clone();
        match current {
            Ok(c) => Ok(c),
            Err(LocationError::PermissionDenied) => Err(LocationError::Unavailable(
                "no fix since permission was granted".to_string(),
            )),
            Err(e) => Err(e),
        }
    }

    fn watch(&self) -> Option<watch::Receiver<PositionUpdate>> {
        if self.granted.load(Ordering::Acquire) {
            Some(self.position.subscribe())
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationStatus {
    pub permission_denied: bool,
    pub error: Option<String>,
    pub loading: bool,
}

/// Current position, permission state and retry
pub struct GeolocationProvider {
    source: Arc<dyn LocationSource>,
    coordinates: Arc<watch::Sender<Option<Coordinates>>>,
    status: Arc<RwLock<LocationStatus>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl GeolocationProvider {
    pub fn new(source: Arc<dyn LocationSource>) -> Self {
        let (coordinates, _) = watch::channel(None);
        Self {
            source,
            coordinates: Arc::new(coordinates),
            status: Arc::new(RwLock::new(LocationStatus::default())),
            watcher: Mutex::new(None),
        }
    }

    /// Ask for a fix and, on success, follow the source's updates
    pub async fn request_permission(&self) -> crate::error::Result<Coordinates> {
        {
            let mut status = self.status.write();
            status.loading = true;
            status.error = None;
        }

        match self.source.request().await {
            Ok(coordinates) => {
                self.coordinates.send_replace(Some(coordinates));
                *self.status.write() = LocationStatus::default();
                info!("Location acquired: {}", coordinates);
                self.start_watching();
                Ok(coordinates)
            }
            Err(LocationError::PermissionDenied) => {
                self.stop_watching();
                self.coordinates.send_replace(None);
                *self.status.write() = LocationStatus {
                    permission_denied: true,
                    error: Some(PERMISSION_DENIED_MESSAGE.to_string()),
                    loading: false,
                };
                warn!("Location permission denied");
                Err(LocationError::PermissionDenied.into())
            }
            Err(e) => {
                let mut status = self.status.write();
                status.loading = false;
                status.error = Some(e.to_string());
                warn!("Location unavailable: {}", e);
                Err(e.into())
            }
        }
    }

    fn start_watching(&self) {
        let Some(mut updates) = self.source.watch() else {
            return;
        };
        let coordinates = self.coordinates.clone();
        let status = self.status.clone();

        let task = tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let update = updates.borrow_and_update().clone();
                match update {
                    Ok(c) => {
                        debug!("Location update: {}", c);
                        status.write().error = None;
                        coordinates.send_replace(Some(c));
                    }
                    Err(LocationError::PermissionDenied) => {
                        *status.write() = LocationStatus {
                            permission_denied: true,
                            error: Some(PERMISSION_DENIED_MESSAGE.to_string()),
                            loading: false,
                        };
                        coordinates.send_replace(None);
                        warn!("Location permission revoked");
                        break;
                    }
                    Err(e) => {
                        status.write().error = Some(e.to_string());
                    }
                }
            }
        });

        if let Some(previous) = self.watcher.lock().replace(task) {
            previous.abort();
        }
    }

    fn stop_watching(&self) {
        if let Some(task) = self.watcher.lock().take() {
            task.abort();
        }
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        *self.coordinates.borrow()
    }

    pub fn latitude(&self) -> Option<f64> {
        self.coordinates().map(|c| c.latitude)
    }

    pub fn longitude(&self) -> Option<f64> {
        self.coordinates().map(|c| c.longitude)
    }

    pub fn permission_denied(&self) -> bool {
        self.status.read().permission_denied
    }

    pub fn error(&self) -> Option<String> {
        self.status.read().error.clone()
    }

    pub fn loading(&self) -> bool {
        self.status.read().loading
    }

    pub fn status(&self) -> LocationStatus {
        self.status.read().clone()
    }

    /// Follow coordinate changes
    pub fn subscribe(&self) -> watch::Receiver<Option<Coordinates>> {
        self.coordinates.subscribe()
    }
}

impl Drop for GeolocationProvider {
    fn drop(&mut self) {
        self.stop_watching();
    }
}

/// Default position nudged by up to half the jitter on each axis
pub fn fallback_coordinates<R: Rng + ?Sized>(config: &LocationConfig, rng: &mut R) -> Coordinates {
    let base = config.default_coordinates();
    Coordinates {
        latitude: base.latitude + (rng.gen::<f64>() - 0.5) * config.jitter_degrees,
        longitude: base.longitude + (rng.gen::<f64>() - 0.5) * config.jitter_degrees,
    }
}

/// Where a fall event's position came from
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocationFix {
    Live(Coordinates),
    Fallback(Coordinates),
}

impl LocationFix {
    pub fn coordinates(&self) -> Coordinates {
        match self {
            LocationFix::Live(c) | LocationFix::Fallback(c) => *c,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, LocationFix::Live(_))
    }
}

/// Live coordinates if known, otherwise the jittered default
pub fn best_available<R: Rng + ?Sized>(
    provider: &GeolocationProvider,
    config: &LocationConfig,
    rng: &mut R,
) -> LocationFix {
    match provider.coordinates() {
        Some(c) => LocationFix::Live(c),
        None => LocationFix::Fallback(fallback_coordinates(config, rng)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn home() -> Coordinates {
        Coordinates::new(19.0760, 72.8777).unwrap()
    }

    #[tokio::test]
    async fn test_granted_provider_follows_updates() {
        let source = Arc::new(SimulatedLocationSource::new(home()));
        let provider = GeolocationProvider::new(source.clone());

        assert_eq!(provider.request_permission().await.unwrap(), home());
        assert_eq!(provider.latitude(), Some(19.0760));
        assert!(!provider.loading());

        let mut rx = provider.subscribe();
        rx.borrow_and_update();
        let moved = Coordinates::new(19.1, 72.9).unwrap();
        source.move_to(moved);
        rx.changed().await.unwrap();
        assert_eq!(provider.coordinates(), Some(moved));
    }

    #[tokio::test]
    async fn test_denied_permission_clears_coordinates() {
        let source = Arc::new(SimulatedLocationSource::denied(home()));
        let provider = GeolocationProvider::new(source.clone());

        let err = provider.request_permission().await.unwrap_err();
        assert!(matches!(err, SafeFallError::PermissionDenied(_)));
        assert!(provider.permission_denied());
        assert_eq!(provider.latitude(), None);
        assert_eq!(provider.longitude(), None);
        assert_eq!(provider.error().as_deref(), Some(PERMISSION_DENIED_MESSAGE));

        // Explicit retry after the user grants access
        source.grant();
        assert!(provider.request_permission().await.is_ok());
        assert!(!provider.permission_denied());
        assert!(provider.error().is_none());
    }

    #[tokio::test]
    async fn test_revocation_mid_watch() {
        let source = Arc::new(SimulatedLocationSource::new(home()));
        let provider = GeolocationProvider::new(source.clone());
        provider.request_permission().await.unwrap();

        let mut rx = provider.subscribe();
        rx.borrow_and_update();
        source.deny();
        rx.changed().await.unwrap();
        assert_eq!(provider.coordinates(), None);
        assert!(provider.permission_denied());
    }

    #[tokio::test]
    async fn test_source_scripts_failures_and_revocation() {
        let source = SimulatedLocationSource::new(home());
        let mut updates = source.watch().unwrap();
        updates.borrow_and_update();

        source.fail("GPS timeout");
        updates.changed().await.unwrap();
        assert_eq!(
            *updates.borrow_and_update(),
            Err(LocationError::Unavailable("GPS timeout".to_string()))
        );

        let moved = Coordinates::new(19.1, 72.9).unwrap();
        source.move_to(moved);
        assert_eq!(*updates.borrow_and_update(), Ok(moved));

        // Moves are ignored once permission is gone
        source.deny();
        source.move_to(home());
        assert_eq!(*updates.borrow(), Err(LocationError::PermissionDenied));
        assert!(source.watch().is_none());
    }

    #[test]
    fn test_fallback_stays_within_jitter() {
        let config = LocationConfig::default();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..1000 {
            let c = fallback_coordinates(&config, &mut rng);
            assert!((c.latitude - 28.6139).abs() <= 0.05);
            assert!((c.longitude - 77.2090).abs() <= 0.05);
        }
    }

    #[test]
    fn test_best_available_without_fix_uses_fallback() {
        let source = Arc::new(SimulatedLocationSource::denied(home()));
        let provider = GeolocationProvider::new(source);
        let mut rng = StdRng::seed_from_u64(2);
        let fix = best_available(&provider, &LocationConfig::default(), &mut rng);
        assert!(!fix.is_live());
        assert!((fix.coordinates().latitude - 28.6139).abs() <= 0.05);
    }
}
