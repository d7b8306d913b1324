// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rubric module - source rows and the records built from them
//!
//! Reads the two rubric tables, normalizes loosely typed cells into typed
//! rows, and turns each row into a [`VectorRecord`] or a skip.

pub mod record;
pub mod rows;
pub mod source;

pub use record::{
    BuildOutcome, RecordBuilder, SkipReason, VectorRecord, DEFAULT_BOILERPLATE_MARKER,
    DEFAULT_HEADER_LABEL, GRADING_MAP_TYPE,
};
pub use rows::{GradingMapEntry, RubricLineItem, SourceRow, SourceTable};
pub use source::{normalize_value, RowSource, SourceLayout, SqliteSource};
