//! SQLite-backed directive store.
//!
//! All writes go through [`GateDb`], which checks every mutation against the
//! [`ConstraintEnforcer`](crate::gates::ConstraintEnforcer) before touching a
//! row. Async callers reach it through [`DbHandle`].

pub mod activations;
pub mod db;
pub mod directives;
pub mod evidence;
pub mod handoffs;
pub mod models;

use std::sync::Arc;

use anyhow::Context;

pub use db::GateDb;
pub use evidence::Evidence;
pub use handoffs::AcceptResult;
pub use models::*;

/// Async-safe handle to the gate database.
///
/// Wraps `GateDb` behind `Arc<Mutex>` and runs every access on tokio's
/// blocking pool, so synchronous SQLite I/O never ties up async workers.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<GateDb>>,
}

impl DbHandle {
    pub fn new(db: GateDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R, E>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&GateDb) -> Result<R, E> + Send + 'static,
        R: Send + 'static,
        E: From<anyhow::Error> + Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || -> Result<R, E> {
            let guard = db
                .lock()
                .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }

    /// Acquire the database mutex synchronously. Only for startup and tests.
    pub fn lock_sync(&self) -> anyhow::Result<std::sync::MutexGuard<'_, GateDb>> {
        self.inner
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))
    }
}
