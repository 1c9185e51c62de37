// Copyright 2026 DFM Platform Team

//! Discovery engine: builds an advice tree describing legal parameter values for an
//! adapter, one field at a time, without requiring every field up front.
//!
//! Adapters opt in by implementing [`Discoverable`] and listing their
//! [`FieldAdvisor`]s explicitly; [`generate_advice`] drives them in order and
//! assembles the resulting [`FieldAdvice`] tree.

pub mod advice;
pub mod advisor;
pub mod builder;
pub mod error;

pub use advice::{AdvisedValue, AdviceTree, DictEntry, Edge, FieldAdvice, SerializedAdvice, SerializedEdge};
pub use advisor::{Discoverable, EdgeContext, FieldAdvisor};
pub use builder::generate_advice;
pub use error::{Error, Result};
