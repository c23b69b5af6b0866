// rlin common library
// Shared types, normalization, and the threshold model

pub mod profile;
pub mod thresholds;
pub mod types;

// Re-export commonly used types
pub use types::{format_lincode, parse_lincode, rlin_version};
pub use types::{LinCode, Profile, INF_DISTANCE, MISSING_ALLELE};
pub use types::{RLIN_VER_BUGFIX, RLIN_VER_MAJOR, RLIN_VER_MINOR};

// Re-export profile normalization helpers
pub use profile::{
    count_missing, format_profile, normalize_allele, normalize_tokens, parse_allele_field,
};

// Re-export threshold model
pub use thresholds::Thresholds;
