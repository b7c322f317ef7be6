// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! claw-daemon: webhook ingestion and routing onto the dispatch engine.

pub mod env;
pub mod http;
pub mod lifecycle;
pub mod router;

pub use http::{Ingested, MAX_BODY_BYTES, READ_TIMEOUT};
pub use lifecycle::{Config, DaemonEngine, DaemonRouter, LifecycleError};
pub use router::Router;
