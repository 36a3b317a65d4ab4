//! Flash-sale reservation engine — process entry point.
//!
//! Wires the pieces `lib.rs` documents into a running process: connect to
//! Postgres and apply migrations, build the shared cache/log/repository,
//! spawn one `PartitionWorker` per partition plus the `ExpirySweeper`, then
//! serve the HTTP gateway. Mirrors the teacher's old CSV-batch `main` only in
//! spirit — config in, workers running, output the other end — the pipeline
//! itself is long-running rather than a single batch pass.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use zero_x_infinity::cache::ResponseCache;
use zero_x_infinity::config::AppConfig;
use zero_x_infinity::consumer::PartitionWorker;
use zero_x_infinity::db::Database;
use zero_x_infinity::gateway;
use zero_x_infinity::log::PartitionedLog;
use zero_x_infinity::logging;
use zero_x_infinity::outcome::OutcomeWriter;
use zero_x_infinity::repository::{PgRepository, Repository};
use zero_x_infinity::sweeper::ExpirySweeper;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env();
    let _logging_guard = logging::init_logging(&config);

    info!("starting flash-sale reservation engine");

    let db = Database::connect(&config.database_url).await?;
    db.migrate().await?;

    let repository: Arc<dyn Repository> = Arc::new(PgRepository::new(db.pool().clone()));
    let cache = Arc::new(ResponseCache::new(
        config.hold_duration,
        config.reject_cache_ttl,
        config.stock_cache_ttl,
    ));
    let log = Arc::new(PartitionedLog::new(config.partitions, config.partition_capacity));
    let outcomes = Arc::new(OutcomeWriter::new(cache.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut worker_handles = Vec::with_capacity(config.partitions);
    for partition_index in 0..config.partitions {
        let worker = PartitionWorker::new(
            partition_index,
            log.clone(),
            repository.clone(),
            outcomes.clone(),
            config.batch_size,
            config.batch_wait,
            config.hold_duration,
        );
        let rx = shutdown_rx.clone();
        worker_handles.push(tokio::spawn(worker.run(rx)));
    }

    let sweeper = ExpirySweeper::new(repository.clone(), log.clone(), config.sweeper_interval);
    tokio::spawn(async move {
        sweeper.run().await;
    });

    let result = gateway::serve(&config, repository, cache, log).await;

    let _ = shutdown_tx.send(true);
    for handle in worker_handles {
        let _ = handle.await;
    }

    result.map_err(anyhow::Error::from)
}
