// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Actor that coalesces concurrent deliveries into batched writes.
//!
//! ```text
//!    ┌──────────────┐
//!    │ BatchHandle  │ (one per worker, cloneable)
//!    └──────┬───────┘
//!           │ Deliver { record, ack }
//!           v
//!    ┌──────────────┐
//!    │ BatchService │ drains what is already queued, up to the bound
//!    └──────┬───────┘
//!           │ one write per batch
//!           v
//!    ┌──────────────┐
//!    │ EntryWriter  │
//!    └──────────────┘
//! ```
//!
//! A delivery resolves only after the write carrying it finished, so the
//! caller still knows whether its own record reached the backend. Nothing
//! waits for a batch to fill: a lone delivery is written immediately.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::entry::DeliveryRecord;
use crate::error::SinkError;
use crate::sink::{EntryWriter, Sink};

type Ack = oneshot::Sender<Result<(), SinkError>>;

#[derive(Debug)]
pub enum BatchCommand {
    Deliver { record: DeliveryRecord, ack: Ack },
    Shutdown,
}

#[derive(Clone, Debug)]
pub struct BatchHandle {
    tx: mpsc::UnboundedSender<BatchCommand>,
}

impl BatchHandle {
    /// Stops the service once the commands queued before this one are done.
    pub fn shutdown(&self) -> Result<(), mpsc::error::SendError<BatchCommand>> {
        self.tx.send(BatchCommand::Shutdown)
    }
}

#[async_trait]
impl Sink for BatchHandle {
    async fn deliver(&self, record: DeliveryRecord) -> Result<(), SinkError> {
        let (ack, response_rx) = oneshot::channel();
        self.tx
            .send(BatchCommand::Deliver { record, ack })
            .map_err(|_| SinkError::Closed)?;
        response_rx.await.map_err(|_| SinkError::Closed)?
    }
}

pub struct BatchService<W> {
    writer: W,
    max_entries: usize,
    rx: mpsc::UnboundedReceiver<BatchCommand>,
}

impl<W: EntryWriter> BatchService<W> {
    #[must_use]
    pub fn new(writer: W, max_entries: usize) -> (Self, BatchHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let service = Self {
            writer,
            max_entries: max_entries.max(1),
            rx,
        };
        (service, BatchHandle { tx })
    }

    pub async fn run(mut self) {
        debug!("SINK | Batch service started");

        while let Some(command) = self.rx.recv().await {
            match command {
                BatchCommand::Deliver { record, ack } => {
                    let mut records = vec![record];
                    let mut acks = vec![ack];
                    let mut shutdown = false;
                    while records.len() < self.max_entries {
                        match self.rx.try_recv() {
                            Ok(BatchCommand::Deliver { record, ack }) => {
                                records.push(record);
                                acks.push(ack);
                            }
                            Ok(BatchCommand::Shutdown) => {
                                shutdown = true;
                                break;
                            }
                            Err(_) => break,
                        }
                    }

                    flush(&self.writer, records, acks).await;
                    if shutdown {
                        break;
                    }
                }
                BatchCommand::Shutdown => break,
            }
        }

        debug!("SINK | Batch service stopped");
    }
}

async fn flush<W: EntryWriter>(writer: &W, records: Vec<DeliveryRecord>, acks: Vec<Ack>) {
    debug!("SINK | Writing batch of {} entries", records.len());
    let result = writer.write_entries(&records).await;

    match result {
        Ok(()) => {
            for ack in acks {
                if ack.send(Ok(())).is_err() {
                    error!("SINK | Failed to acknowledge delivery - receiver dropped");
                }
            }
        }
        Err(e) if acks.len() == 1 => {
            if let Some(ack) = acks.into_iter().next() {
                if ack.send(Err(e)).is_err() {
                    error!("SINK | Failed to acknowledge delivery - receiver dropped");
                }
            }
        }
        Err(e) => {
            let message = e.to_string();
            for ack in acks {
                if ack.send(Err(SinkError::Batch(message.clone()))).is_err() {
                    error!("SINK | Failed to acknowledge delivery - receiver dropped");
                }
            }
        }
    }
}
