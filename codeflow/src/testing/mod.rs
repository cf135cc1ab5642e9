//! Testing utilities for codeflow pipelines.
//!
//! This module provides:
//! - [`ScriptedCapabilities`], a deterministic stand-in for all four capabilities
//! - [`responses`], builders for the raw response shapes

mod scripted;

pub use scripted::{responses, ScriptStep, ScriptedCapabilities};
