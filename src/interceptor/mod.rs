// SPDX-License-Identifier: Apache-2.0

//! SQL request interceptor
//!
//! - **Pipeline**: ordered validation gates in front of the executor
//! - **Audit Logging**: a record of every request, outcome and rejection

pub mod audit;
pub mod pipeline;
pub mod types;

pub use audit::{AuditStats, AuditStore};
pub use pipeline::{Analysis, Execution, PipelineError, PipelinePolicy, RequestPipeline};
pub use types::*;
