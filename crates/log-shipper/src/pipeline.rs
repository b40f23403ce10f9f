// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::WatchError;
use crate::event_source::{EventStreams, Registrar};
use crate::inflight::InFlightSet;
use crate::processor::{spawn_workers, FileProcessor, Settle};
use crate::queue::{work_queue, BackpressurePolicy};
use crate::scanner::scan_and_register;
use crate::sink::Sink;

/// The subset of [`Config`] the ingestion pipeline needs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub watch_path: PathBuf,
    pub queue_capacity: usize,
    pub workers: usize,
    pub backpressure: BackpressurePolicy,
    pub settle: Settle,
    pub process_existing: bool,
}

impl From<&Config> for PipelineConfig {
    fn from(config: &Config) -> Self {
        PipelineConfig {
            watch_path: config.watch_path.clone(),
            queue_capacity: config.queue_capacity,
            workers: config.workers,
            backpressure: config.backpressure,
            settle: config.settle,
            process_existing: config.process_existing,
        }
    }
}

pub struct Pipeline;

impl Pipeline {
    /// Registers the watch tree with `registrar`, then starts the workers and
    /// the dispatch task. Must be called from within a Tokio runtime.
    ///
    /// Fails without starting anything if the tree cannot be fully watched.
    pub fn start<R>(
        config: PipelineConfig,
        sink: Arc<dyn Sink>,
        mut registrar: R,
        streams: EventStreams,
    ) -> Result<RunningPipeline, WatchError>
    where
        R: Registrar + Send + 'static,
    {
        let report = scan_and_register(&config.watch_path, &mut registrar)?;
        let backlog = if config.process_existing {
            report.files
        } else {
            debug!(
                "PIPELINE | Leaving {} existing files untouched",
                report.files.len()
            );
            Vec::new()
        };

        let inflight = InFlightSet::new();
        let (queue, receiver) = work_queue(config.queue_capacity, config.backpressure);
        let processor = Arc::new(FileProcessor::new(sink, config.settle));
        let workers = spawn_workers(config.workers, receiver, processor);

        let cancel_token = CancellationToken::new();
        let dispatcher = Dispatcher::new(
            registrar,
            streams,
            inflight.clone(),
            queue,
            cancel_token.clone(),
        )
        .with_backlog(backlog);
        let dispatch = tokio::spawn(dispatcher.spin());

        info!(
            "PIPELINE | Watching {} with {} workers (queue capacity {}, {:?} when full)",
            config.watch_path.display(),
            config.workers,
            config.queue_capacity,
            config.backpressure
        );

        Ok(RunningPipeline {
            cancel_token,
            dispatch,
            workers,
            inflight,
        })
    }
}

pub struct RunningPipeline {
    cancel_token: CancellationToken,
    dispatch: JoinHandle<()>,
    workers: JoinSet<()>,
    inflight: InFlightSet,
}

impl RunningPipeline {
    /// Paths currently queued or being processed.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    /// Stops reading events and waits for the workers to finish what was
    /// already queued.
    pub async fn shutdown(mut self) {
        self.cancel_token.cancel();
        if let Err(e) = self.dispatch.await {
            error!("PIPELINE | Dispatch task failed: {e}");
        }
        while let Some(result) = self.workers.join_next().await {
            if let Err(e) = result {
                error!("PIPELINE | Worker task failed: {e}");
            }
        }
        info!("PIPELINE | Stopped");
    }
}
