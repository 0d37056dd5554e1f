//! Domain models
//!
//! This module contains all domain models used throughout the application.

pub mod dataset;
pub mod execution;
pub mod result;
pub mod session;

pub use dataset::*;
pub use execution::*;
pub use result::*;
pub use session::*;
