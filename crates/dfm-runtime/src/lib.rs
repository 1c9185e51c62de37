// Copyright 2026 DFM Platform Team

//! Dataflow runtime: restartable multi-consumer streams, the Nullary/Unary/
//! BinaryZip adapter model, cancellation scopes, and the cache-aware
//! `get_or_create_stream` contract that ties them to the cache substrate.

pub mod adapter;
pub mod cancellation;
pub mod error;
pub mod get_or_create;
pub mod stream;

pub use adapter::{Adapter, BodyOutput};
pub use cancellation::CancellationScope;
pub use error::{Error, Result};
pub use get_or_create::StreamRegistry;
pub use stream::{Stream, StreamCursor, StreamItem};
