//! # wfstx Testkit
//!
//! Test utilities for the wfstx engine.
//!
//! This crate provides:
//! - A feature service fixture over a seeded in-memory store and a manual
//!   clock
//! - Property-based test generators using proptest
//! - Multi-threaded lock contention and transaction stress harnesses
//!
//! ## Usage
//!
//! ```rust
//! use wfstx_testkit::prelude::*;
//!
//! let fixture = TestService::seeded(2);
//! let token = fixture.lock(&["roads.0"]);
//! assert!(fixture.locks().validate(&token, &seed_id(0)));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
