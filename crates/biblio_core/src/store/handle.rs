//! Lazily connected backend handles.
//!
//! # Responsibility
//! - Defer opening a backend until the first caller needs it.
//! - Hand out cheap clones of the one handle afterwards.
//!
//! # Invariants
//! - A backend is connected at most once per [`LazyHandle`].
//! - A failed connect leaves the handle uninitialized so a later call can retry.

use super::{DocumentStore, SessionStore, StoreResult};
use crate::config::StoreConfig;
use log::{error, info};
use once_cell::sync::OnceCell;
use std::time::Instant;

/// Storage engine a repository can sit on.
pub trait Backend: Clone + Send + Sync + Sized {
    const NAME: &'static str;

    fn connect(config: &StoreConfig) -> StoreResult<Self>;

    /// Clears every collection owned by this backend.
    fn reset_storage(&self) -> StoreResult<()>;
}

impl Backend for DocumentStore {
    const NAME: &'static str = "document";

    fn connect(config: &StoreConfig) -> StoreResult<Self> {
        DocumentStore::open(config)
    }

    fn reset_storage(&self) -> StoreResult<()> {
        DocumentStore::reset_storage(self)
    }
}

impl Backend for SessionStore {
    const NAME: &'static str = "session";

    fn connect(config: &StoreConfig) -> StoreResult<Self> {
        SessionStore::open(config)
    }

    fn reset_storage(&self) -> StoreResult<()> {
        SessionStore::reset_storage(self)
    }
}

/// Process-wide handle that connects on first use.
#[derive(Debug)]
pub struct LazyHandle<B> {
    config: StoreConfig,
    cell: OnceCell<B>,
}

impl<B: Backend> LazyHandle<B> {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            cell: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Returns the backend, connecting on the first call.
    pub fn acquire_handle(&self) -> StoreResult<B> {
        self.cell
            .get_or_try_init(|| {
                let started_at = Instant::now();
                B::connect(&self.config)
                    .map(|backend| {
                        info!(
                            "event=handle_init module=store status=ok backend={} duration_ms={}",
                            B::NAME,
                            started_at.elapsed().as_millis()
                        );
                        backend
                    })
                    .map_err(|err| {
                        error!(
                            "event=handle_init module=store status=error backend={} error={err}",
                            B::NAME
                        );
                        err
                    })
            })
            .cloned()
    }

    pub fn reset_storage(&self) -> StoreResult<()> {
        self.acquire_handle()?.reset_storage()
    }
}
