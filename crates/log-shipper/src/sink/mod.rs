// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of parsed log records to the remote logging backend.
//!
//! The processor only sees [`Sink`]. A sink owns transport, batching,
//! retry and authentication; from the processor's point of view a call
//! either succeeded (the file may be removed) or failed (the file stays).
//!
//! - [`cloud_logging::CloudLoggingClient`]: writes entries over HTTP with
//!   retry on transient failures.
//! - [`batch::BatchService`] / [`batch::BatchHandle`]: actor that coalesces
//!   concurrent deliveries into one write and acknowledges each caller.
//! - [`credentials::Credentials`]: static or metadata-server bearer tokens.

use async_trait::async_trait;

use crate::entry::DeliveryRecord;
use crate::error::SinkError;

pub mod batch;
pub mod cloud_logging;
pub mod credentials;

#[async_trait]
pub trait Sink: Send + Sync {
    /// Delivers one record. Returns once the backend accepted or refused it.
    async fn deliver(&self, record: DeliveryRecord) -> Result<(), SinkError>;
}

/// Writes a group of records in a single backend call.
#[async_trait]
pub trait EntryWriter: Send + Sync {
    async fn write_entries(&self, records: &[DeliveryRecord]) -> Result<(), SinkError>;
}
