//! Gateway application state (shared). Same shape as the teacher's
//! `AppState`: one `Clone`-able struct of `Arc`s handed to every handler via
//! axum's `State` extractor, constructed once at startup.

use std::sync::Arc;

use crate::cache::ResponseCache;
use crate::log::PartitionedLog;
use crate::repository::Repository;
use crate::submitter::Submitter;

/// Handed to every handler via axum's `State` extractor. `submitter` owns
/// its own `Poller`, so handlers that submit a new request never touch the
/// log directly; `log` is only reached for the two in-place transitions
/// (confirm, cancel) that don't go through `Submitter::submit`.
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn Repository>,
    pub cache: Arc<ResponseCache>,
    pub submitter: Arc<Submitter>,
    pub log: Arc<PartitionedLog>,
}

impl AppState {
    pub fn new(
        repository: Arc<dyn Repository>,
        cache: Arc<ResponseCache>,
        submitter: Arc<Submitter>,
        log: Arc<PartitionedLog>,
    ) -> Self {
        Self {
            repository,
            cache,
            submitter,
            log,
        }
    }
}
