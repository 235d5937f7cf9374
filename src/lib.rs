//! # Provcache
//!
//! Provcache is the node-caching core of a provenance graph store, written in Rust.
//! Every node gets a content hash; before a calculation is stored, an
//! equivalent stored node is looked up by that hash and, if caching is
//! enabled for the calculation, reused instead of computing it again.
//!
//! ## Core Features
//!
//! - **Content Hashing**: Deterministic hashes over normalized attributes, repository content and upstream inputs
//! - **Cache Policy**: Enable/disable patterns with wildcard support, resolved by specificity
//! - **Scoped Overrides**: Enable or disable caching for a block of code with a guard
//! - **Pluggable Storage**: In-memory backend with transactions behind a backend-agnostic store facade
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use provcache::{LinkType, ProfileBuilder};
//!
//! let profile = ProfileBuilder::new().build()?;
//! let _guard = profile.enable_caching(Some("aiida.calculations:core.arithmetic.add"), false)?;
//!
//! let mut calc = profile.new_node(provcache::CALCFUNCTION_NODE_TYPE);
//! calc.set_process_type(Some("aiida.calculations:core.arithmetic.add"))?;
//! calc.add_incoming(&x, LinkType::InputCalc, "x")?;
//! calc.store()?;
//!
//! if let Some(source) = calc.caching().get_cached_from() {
//!     println!("reused {}", source);
//! }
//! ```

mod builder;
pub mod caching;
mod common;
mod config;
mod error;
mod model;
mod plugins;
mod profile;
pub mod store;
mod utils;

use std::sync::{Arc, RwLock};

pub use builder::ProfileBuilder;
pub use caching::{CacheOptions, CachingContext, CachingGuard, HashErrors, NodeCaching};
pub use config::{CachingConfig, Config, ConfigOption, StoreConfig, StoreType};
pub use error::CacheError;
pub use model::*;
pub use plugins::*;
pub use profile::Profile;

/// Result type alias for caching operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Thread-safe shared lock wrapper using Arc<RwLock<T>>.
pub(crate) type ShareLock<T> = Arc<RwLock<T>>;
