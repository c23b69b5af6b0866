// Allele token normalization and profile text handling
// Alleles arrive as strings ("N", "-", integers, semicolon forms); everything
// downstream operates on dense integer vectors with 0 = missing.

use crate::types::{Profile, MISSING_ALLELE};

/// Normalize a single allele token to its integer form.
///
/// The textual forms `N`, `-`, `0`, and the empty field all mean missing.
/// A semicolon-separated field (`a;b;c`) uses its first token, falling back
/// to missing when that token is empty. Anything that does not parse as a
/// non-negative integer is treated like `N`.
pub fn normalize_allele(token: &str) -> u32 {
    let token = token.trim();
    let token = match token.split_once(';') {
        Some((first, _)) => first.trim(),
        None => token,
    };
    match token {
        "" | "-" | "N" => MISSING_ALLELE,
        _ => token.parse::<u32>().unwrap_or(MISSING_ALLELE),
    }
}

/// Normalize a comma-separated allele field into a profile vector
pub fn parse_allele_field(field: &str) -> Profile {
    field.split(',').map(normalize_allele).collect()
}

/// Normalize a sequence of already-split allele tokens
pub fn normalize_tokens<'a, I>(tokens: I) -> Profile
where
    I: IntoIterator<Item = &'a str>,
{
    tokens.into_iter().map(normalize_allele).collect()
}

/// Render a profile in its normalized comma-separated form (missing as 0)
pub fn format_profile(profile: &[u32]) -> String {
    profile
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Count missing alleles in a normalized profile
pub fn count_missing(profile: &[u32]) -> usize {
    profile.iter().filter(|&&a| a == MISSING_ALLELE).count()
}
