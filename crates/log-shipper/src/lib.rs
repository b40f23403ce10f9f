// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Ingestion pipeline for shipping JSON log files to a remote logging sink.
//!
//! ```text
//!   scanner ──registers──> event_source ──events──> dispatch
//!                                                      │ inflight gate
//!                                                      v
//!                                                    queue
//!                                                      │
//!                                                      v
//!                                                  processor ──> sink
//! ```
//!
//! A file is delivered at most once per processing attempt and removed only
//! after the sink acknowledged it. Every per-file failure is logged and
//! contained to that file.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod dispatch;
pub mod entry;
pub mod error;
pub mod event_source;
pub mod inflight;
pub mod pipeline;
pub mod processor;
pub mod queue;
pub mod scanner;
pub mod sink;
