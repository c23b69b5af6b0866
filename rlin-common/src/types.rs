// Core types and constants for LINcode assignment

/// Version information
pub const RLIN_VER_MAJOR: u32 = 0;
pub const RLIN_VER_MINOR: u32 = 2;
pub const RLIN_VER_BUGFIX: u32 = 0;

/// Full version string
pub fn rlin_version() -> String {
    format!(
        "rlin (LINcode assigner for cgMLST profiles) v. {}.{}.{}",
        RLIN_VER_MAJOR, RLIN_VER_MINOR, RLIN_VER_BUGFIX
    )
}

/// A cgMLST allelic profile: one allele identifier per scheme locus.
/// Missing alleles are canonicalized to `MISSING_ALLELE`.
pub type Profile = Vec<u32>;

/// A hierarchical lineage code: one value per threshold level
pub type LinCode = Vec<u32>;

/// Missing-allele sentinel after normalization
pub const MISSING_ALLELE: u32 = 0;

/// Sentinel written into consumed distance-matrix cells during traversal.
/// Real distances are percentages in [0, 100], so this always loses a
/// minimum comparison against any live cell.
pub const INF_DISTANCE: f64 = 999.0;

/// Render a LINcode in its underscore-joined textual form ("0_1_2_0")
pub fn format_lincode(code: &[u32]) -> String {
    code.iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("_")
}

/// Parse an underscore-joined LINcode; returns None on any malformed field
pub fn parse_lincode(text: &str) -> Option<LinCode> {
    text.split('_')
        .map(|token| token.trim().parse::<u32>().ok())
        .collect()
}
