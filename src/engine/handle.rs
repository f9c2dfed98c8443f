//! Hot-swappable engine slot shared by query handlers.
//!
//! Readers clone the current `Arc<Snapshot>` and drop the lock straight
//! away, so a query always runs against one consistent engine. Refits build
//! outside the read/write lock and replace the snapshot only when the fit
//! succeeds. Writers take turns on a separate mutex, so a reload always
//! starts from the latest published dataset.

use super::{Engine, EngineConfig};
use crate::data::{ColumnConfig, Dataset};
use crate::error::ConfigError;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A fitted engine together with the dataset it was fitted on
#[derive(Debug)]
pub struct Snapshot {
    pub engine: Engine,
    pub dataset: Arc<Dataset>,
    /// Increases by one on every successful swap
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Unconfigured,
    Fitting,
    Ready,
}

#[derive(Debug, Default)]
pub struct EngineHandle {
    current: RwLock<Option<Arc<Snapshot>>>,
    /// Held for the whole of a refit or reload
    writer: Mutex<()>,
    fits_in_progress: AtomicUsize,
}

/// Marks a fit in progress for as long as it lives
struct FittingGuard<'a>(&'a AtomicUsize);

impl<'a> FittingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for FittingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl EngineHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> EngineState {
        if self.fits_in_progress.load(Ordering::SeqCst) > 0 {
            EngineState::Fitting
        } else if self.current.read().is_some() {
            EngineState::Ready
        } else {
            EngineState::Unconfigured
        }
    }

    /// The engine currently being served, if any
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.current.read().clone()
    }

    pub fn generation(&self) -> u64 {
        self.current.read().as_ref().map_or(0, |s| s.generation)
    }

    /// Fit a new engine and swap it in. On failure the served engine is
    /// left untouched.
    pub fn refit(
        &self,
        dataset: Arc<Dataset>,
        columns: ColumnConfig,
        config: EngineConfig,
    ) -> Result<Arc<Snapshot>, ConfigError> {
        let _fitting = FittingGuard::enter(&self.fits_in_progress);
        let _writer = self.writer.lock();
        self.fit_and_swap(dataset, columns, config)
    }

    /// Refit the current dataset with a new error tolerance
    pub fn reload_tolerance(&self, error_tolerance_percent: f64) -> Result<Arc<Snapshot>, ConfigError> {
        let _fitting = FittingGuard::enter(&self.fits_in_progress);
        let _writer = self.writer.lock();

        let current = self.snapshot().ok_or_else(|| {
            ConfigError::InvalidParameter("no dataset has been loaded yet".into())
        })?;
        let config = current
            .engine
            .config()
            .clone()
            .with_tolerance_percent(error_tolerance_percent);
        self.fit_and_swap(
            Arc::clone(&current.dataset),
            current.engine.columns().clone(),
            config,
        )
    }

    // Caller holds `writer`
    fn fit_and_swap(
        &self,
        dataset: Arc<Dataset>,
        columns: ColumnConfig,
        config: EngineConfig,
    ) -> Result<Arc<Snapshot>, ConfigError> {
        let engine = match Engine::fit(&dataset, columns, config) {
            Ok(engine) => engine,
            Err(e) => {
                tracing::warn!(error = %e, "Refit failed, keeping current engine");
                return Err(e);
            }
        };

        let mut current = self.current.write();
        let generation = current.as_ref().map_or(0, |s| s.generation) + 1;
        let snapshot = Arc::new(Snapshot {
            engine,
            dataset,
            generation,
        });
        *current = Some(Arc::clone(&snapshot));
        drop(current);

        tracing::info!(
            generation,
            rows = snapshot.dataset.row_count(),
            error_tolerance_percent = snapshot.engine.tolerance().percent(),
            "Engine swapped"
        );
        Ok(snapshot)
    }
}
