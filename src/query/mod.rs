// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query module - semantic lookup over the rubric index

pub mod engine;

pub use engine::{DisplayResult, QueryEngine};
