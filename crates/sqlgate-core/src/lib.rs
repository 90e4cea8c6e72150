// SPDX-License-Identifier: Apache-2.0

//! Core types shared by the sqlgate crates.
//!
//! - [`types`]: validation, complexity and result shapes
//! - [`traits`]: the [`SqlExecutor`] seam between the pipeline and a database
//! - [`error`]: the sanitized [`EngineError`] taxonomy
//! - [`sanitize`]: redaction and categorisation of raw driver messages

pub mod error;
pub mod limits;
pub mod sanitize;
pub mod traits;
pub mod types;

pub use error::{EngineError, EngineResult, ErrorCategory};
pub use traits::SqlExecutor;
pub use types::*;
