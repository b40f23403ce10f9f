// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, process, sync::Arc};

use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use log_shipper::{
    config::Config,
    event_source::NotifyEventSource,
    pipeline::{Pipeline, PipelineConfig},
    sink::{
        batch::BatchService,
        cloud_logging::{CloudLoggingClient, CloudLoggingConfig},
    },
};

#[tokio::main]
pub async fn main() {
    let log_level = env::var("LOG_SHIPPER_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());
    let env_filter = format!("h2=off,hyper=off,rustls=off,reqwest=off,{log_level}");

    let filter = match EnvFilter::try_new(&env_filter) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("Invalid LOG_SHIPPER_LOG_LEVEL {log_level:?}: {e}");
            process::exit(1);
        }
    };
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Setting default subscriber failed: {e}");
        process::exit(1);
    }
    debug!("Logging subsystem enabled");

    let config = match Config::new() {
        Ok(c) => c,
        Err(e) => {
            error!("Error creating config on log shipper startup: {e}");
            process::exit(1);
        }
    };

    let client = match CloudLoggingClient::new(CloudLoggingConfig::from(&config)) {
        Ok(client) => client,
        Err(e) => {
            error!("Error creating Cloud Logging client: {e}");
            process::exit(1);
        }
    };
    let (batch_service, batch_handle) = BatchService::new(client, config.batch_max_entries);
    let batch_task = tokio::spawn(batch_service.run());

    let (source, streams) = match NotifyEventSource::new() {
        Ok(source) => source,
        Err(e) => {
            error!("Error creating filesystem watcher: {e}");
            process::exit(1);
        }
    };

    let pipeline = match Pipeline::start(
        PipelineConfig::from(&config),
        Arc::new(batch_handle.clone()),
        source,
        streams,
    ) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("Error watching {}: {e}", config.watch_path.display());
            process::exit(1);
        }
    };
    info!(
        "Shipping files from {} to {}",
        config.watch_path.display(),
        config.log_name()
    );

    wait_for_shutdown().await;

    pipeline.shutdown().await;
    if batch_handle.shutdown().is_err() {
        debug!("Batch service already stopped");
    }
    if let Err(e) = batch_task.await {
        error!("Batch service task failed: {e}");
    }
    info!("Log shipper stopped");
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                wait_for_ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            () = wait_for_ctrl_c() => {}
            _ = sigterm.recv() => info!("Received SIGTERM, initiating shutdown"),
        }
    }

    #[cfg(not(unix))]
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, initiating shutdown"),
        Err(e) => error!("Failed to listen for Ctrl+C: {e}"),
    }
}
