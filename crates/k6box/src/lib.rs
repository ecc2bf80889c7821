//! k6box: a guarded harness for validating and running k6 load-test scripts.
//!
//! A caller hands over script text and gets back a structured verdict. The
//! harness screens the text, stages it in an owner-only temporary file, runs
//! `k6` under a deadline with a minimized environment, and turns the captured
//! output into a classified, sanitized report.
//!
//! The pattern screen in [`screen`] is an advisory control. It rejects
//! obviously host-reaching scripts but it is not an isolation boundary.

#![forbid(unsafe_code)]
// Internal helpers are documented where the behavior is not obvious.
#![allow(missing_docs)]

pub mod analysis;
pub mod classify;
pub mod command;
pub mod config;
pub mod error;
pub mod executor;
pub mod harness;
pub mod metrics;
pub mod model;
pub mod redact;
pub mod report;
pub mod screen;
pub mod script_file;

pub use crate::error::{ErrorCode, GateError, GateResult};
pub use crate::harness::Harness;
pub use crate::model::*;
