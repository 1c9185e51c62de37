// Copyright 2026 DFM Platform Team

//! Pipeline IR, block scoping, response model, and error taxonomy for the DFM
//! distributed dataflow platform.
//!
//! This crate has no knowledge of streams, caches, or the network; it is the shared
//! vocabulary every other `dfm-*` crate builds on. See `dfm-runtime` for the dataflow
//! operator model, `dfm-cache` for the fingerprint cache substrate, and `dfm-services`
//! for the HTTP/pubsub coordinator services.

pub mod block;
pub mod error;
pub mod job;
pub mod process;
pub mod registry;
pub mod response;
pub mod well_known_id;

pub use block::{Block, BlockBuilder, FunctionCall, NodeHandle, NodeId, ParamValue};
pub use error::{DfmError, Error, Result};
pub use job::{Job, Package};
pub use process::{Execute, Process};
pub use registry::PolymorphicRegistry;
pub use response::{RequestState, Response, ResponseBody};
pub use well_known_id::well_known_id;
