//! Core types for Quill
//!
//! This crate defines the series-level types shared by the storage crates:
//! - Ident: Immutable byte identifier (series IDs, namespace IDs)
//! - Series: Resolved series identity within one commit log
//! - Datapoint: Timestamped value
//! - Annotation: Opaque per-datapoint payload
//! - TimeUnit: Unit a datapoint was written in
//! - Timestamp: Nanosecond-precision point in time

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod series;
pub mod timestamp;
pub mod unit;

pub use series::{Annotation, Datapoint, Ident, Series};
pub use timestamp::Timestamp;
pub use unit::{InvalidTimeUnit, TimeUnit};
