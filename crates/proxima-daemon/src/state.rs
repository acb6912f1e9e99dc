//! Application state shared across daemon tasks.
//!
//! The proximity system and the alert driver sit behind one mutex, so a
//! scan batch, an evaluation and a stop-all command never interleave.

use std::sync::Arc;

use proxima_core::{
    AlertDriver, AlertEvent, BeaconObservation, Config, Millis, ProximitySystem, StatusSnapshot,
};
use tokio::sync::{Mutex, MutexGuard};

/// Proximity system plus the driver it commands.
pub struct Core {
    /// Registry, config store and state machine.
    pub system: ProximitySystem,
    /// Actuator output.
    pub driver: Box<dyn AlertDriver + Send>,
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Mutex<Core>>,
}

impl AppState {
    /// Create application state from a configuration and a driver.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: &Config, driver: Box<dyn AlertDriver + Send>) -> anyhow::Result<Self> {
        let system = ProximitySystem::new(config)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(Core { system, driver })),
        })
    }

    /// Exclusive access to the core.
    pub async fn lock(&self) -> MutexGuard<'_, Core> {
        self.inner.lock().await
    }

    /// Ingest a scan batch in arrival order.
    pub async fn ingest(&self, batch: Vec<BeaconObservation>) {
        if batch.is_empty() {
            return;
        }
        self.inner.lock().await.system.ingest_all(batch);
    }

    /// Sweep and evaluate at `now`.
    pub async fn tick(&self, now: Millis) -> Vec<AlertEvent> {
        let mut core = self.inner.lock().await;
        let Core { system, driver } = &mut *core;
        system.tick(now, driver.as_mut())
    }

    /// Stop every running alert.
    pub async fn stop_all(&self, now: Millis) -> Vec<AlertEvent> {
        let mut core = self.inner.lock().await;
        let Core { system, driver } = &mut *core;
        system.stop_all_alerts(now, driver.as_mut())
    }

    /// Apply a reloaded configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid; the running
    /// configuration is kept.
    pub async fn reload(&self, config: &Config, now: Millis) -> anyhow::Result<Vec<AlertEvent>> {
        let mut core = self.inner.lock().await;
        let Core { system, driver } = &mut *core;
        Ok(system.reload(config, now, driver.as_mut())?)
    }

    /// Detached status snapshot.
    pub async fn snapshot(&self, now: Millis) -> StatusSnapshot {
        self.inner.lock().await.system.snapshot(now)
    }
}
