//! Incremental LINcode assignment for cgMLST allelic profiles.
//!
//! The engine labels profiles with hierarchical lineage codes: pairwise
//! genetic distances with missing-aware semantics feed a Prim-style
//! traversal order, the order is anchored to the already-labeled set, and
//! each profile's code is derived from its nearest labeled neighbor at the
//! level set by the scheme's identity thresholds. Assignment is batched,
//! restartable, and single-writer per scheme directory.
//!
//! # Example
//!
//! ```no_run
//! use rlin_core::{Engine, EngineConfig};
//! use std::path::Path;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = EngineConfig::default();
//! let mut engine = Engine::open(Path::new("schemes"), 1, config)?;
//! let labeled = engine.run()?;
//! eprintln!("labeled {labeled} profiles");
//! # Ok(())
//! # }
//! ```

pub mod anchor;
pub mod assign;
pub mod distance;
pub mod engine;
pub mod lock;
pub mod matrix;
pub mod prim;
pub mod scheme;
pub mod store;

// Re-export commonly used types
pub use anchor::anchor_order;
pub use assign::{derive_code, Derivation, Provenance};
pub use distance::{compare_profiles, PairCounts};
pub use engine::{Engine, EngineConfig};
pub use lock::{LockContention, SchemeLock};
pub use matrix::DistanceMatrix;
pub use prim::prim_order;
pub use scheme::{load_loci, load_thresholds, SchemePaths};
pub use store::{LabeledEntry, LabeledSet, ProfileFilter, ProfileReader, ProfileStore};
