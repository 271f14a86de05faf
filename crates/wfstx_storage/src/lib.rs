//! # wfstx Storage
//!
//! The storage collaborator contract for the wfstx transaction engine.
//!
//! The engine never persists anything itself. It reads and mutates features
//! through a [`FeatureStore`], which owns filter evaluation and identifier
//! assignment.
//!
//! ## Available Stores
//!
//! - [`InMemoryFeatureStore`] - For tests, benchmarks and the scenario runner
//!
//! ## Example
//!
//! ```rust
//! use wfstx_storage::{Feature, FeatureStore, Filter, InMemoryFeatureStore, Property};
//!
//! let store = InMemoryFeatureStore::with_types(["roads"]);
//! let id = store.insert("roads", &Feature::new().property("lanes", 2), None).unwrap();
//! let changed = store
//!     .update("roads", &Filter::ids([id]), &[Property::set("lanes", 4)])
//!     .unwrap();
//! assert_eq!(changed, 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod feature;
mod filter;
mod memory;
mod store;

pub use error::{StoreError, StoreResult};
pub use feature::{Feature, FeatureId, Property};
pub use filter::Filter;
pub use memory::InMemoryFeatureStore;
pub use store::FeatureStore;
