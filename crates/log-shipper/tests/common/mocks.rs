// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Sinks that stand in for the remote logging backend

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use log_shipper::entry::DeliveryRecord;
use log_shipper::error::SinkError;
use log_shipper::sink::Sink;

/// Accepts every record and keeps it for inspection.
#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<DeliveryRecord>>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn records(&self) -> Vec<DeliveryRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl Sink for RecordingSink {
    async fn deliver(&self, record: DeliveryRecord) -> Result<(), SinkError> {
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

/// Refuses every record and counts the attempts.
#[derive(Default)]
#[allow(dead_code)]
pub struct FailingSink {
    attempts: AtomicUsize,
}

#[allow(dead_code)]
impl FailingSink {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Sink for FailingSink {
    async fn deliver(&self, _record: DeliveryRecord) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(SinkError::Request("backend unavailable".to_string()))
    }
}
