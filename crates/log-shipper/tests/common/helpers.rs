// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log_shipper::event_source::NotifyEventSource;
use log_shipper::pipeline::{Pipeline, PipelineConfig, RunningPipeline};
use log_shipper::processor::Settle;
use log_shipper::queue::BackpressurePolicy;
use log_shipper::sink::Sink;

/// Long enough for a notify round trip plus the settle delay.
pub const WAIT: Duration = Duration::from_secs(10);

/// Quiet period used to check that nothing else happens.
#[allow(dead_code)]
pub const QUIET: Duration = Duration::from_millis(500);

pub fn pipeline_config(root: &Path) -> PipelineConfig {
    PipelineConfig {
        watch_path: root.to_path_buf(),
        queue_capacity: 16,
        workers: 2,
        backpressure: BackpressurePolicy::Block,
        settle: Settle::Fixed(Duration::from_millis(50)),
        process_existing: false,
    }
}

/// Starts a pipeline on `root` backed by the real notify watcher.
pub fn start_pipeline(config: PipelineConfig, sink: Arc<dyn Sink>) -> RunningPipeline {
    let (source, streams) = NotifyEventSource::new().expect("Failed to create watcher");
    Pipeline::start(config, sink, source, streams).expect("Failed to start pipeline")
}

/// Polls `condition` until it holds or `WAIT` elapses.
pub async fn wait_until<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .is_ok()
}
