// SPDX-License-Identifier: Apache-2.0

//! Static analysis of untrusted SQL requests.
//!
//! Everything in this crate is pure: no I/O, no shared state, the same input
//! always yields the same output.

pub mod complexity;
pub mod params;
pub mod request;
pub mod tables;
pub mod validator;

pub use complexity::{assess, ComplexityPolicy, ComplexityVerdict};
pub use params::{sanitize_parameters, ParameterError};
pub use request::{parse_request, RequestError, SqlRequest};
pub use tables::extract_table_names;
pub use validator::validate;
