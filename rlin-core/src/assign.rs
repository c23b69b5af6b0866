// LINcode derivation
// Finds the nearest labeled profile and either reuses its code (when the two
// agree at every locus known on both sides) or extends/branches it at the
// level set by the identity thresholds.

use crate::distance::{compare_profiles, PairCounts};
use crate::store::LabeledSet;
use rlin_common::{LinCode, Thresholds};

/// How a new code relates to the labeled set, kept for the debug log
#[derive(Debug, Clone)]
pub struct Provenance {
    pub closest_id: String,
    pub counts: PairCounts,
    pub identity: f64,
    pub distance: f64,
    /// Leading threshold levels met by the identity
    pub shared_levels: usize,
    /// Code prefix copied from the closest labeled profile; the full
    /// reused code when `diffs == 0` short-circuited the derivation
    pub prefix: LinCode,
}

/// Result of deriving a code for one profile
#[derive(Debug, Clone)]
pub struct Derivation {
    pub code: LinCode,
    pub reused: bool,
    /// None only for the very first assignment of an empty labeled set
    pub provenance: Option<Provenance>,
}

/// Derive the LINcode for `profile` against the current labeled set.
///
/// The labeled set is scanned in insertion order. The first entry with
/// `diffs == 0` over a non-empty shared locus set wins outright and its
/// code is reused verbatim; otherwise
/// the entry with the strictly smallest distance wins (first index on
/// ties). An empty labeled set yields the all-zeros code.
pub fn derive_code(labeled: &LabeledSet, profile: &[u32], thresholds: &Thresholds) -> Derivation {
    let levels = thresholds.levels();
    if labeled.is_empty() {
        return Derivation {
            code: vec![0; levels],
            reused: false,
            provenance: None,
        };
    }

    let mut closest = 0;
    let mut closest_counts = None;
    let mut min_distance = f64::INFINITY;
    for (slot, entry) in labeled.entries().iter().enumerate() {
        let counts = compare_profiles(profile, &entry.profile);
        if counts.diffs == 0 && counts.shared > 0 {
            // Agrees wherever both sides are known: no new code is minted.
            // A pair with no shared locus agrees only vacuously and counts
            // as maximally distant instead.
            let distance = counts.distance();
            return Derivation {
                code: entry.code.clone(),
                reused: true,
                provenance: Some(Provenance {
                    closest_id: entry.id.clone(),
                    counts,
                    identity: 100.0 - distance,
                    distance,
                    shared_levels: levels,
                    prefix: entry.code.clone(),
                }),
            };
        }
        let distance = counts.distance();
        if distance < min_distance {
            min_distance = distance;
            closest = slot;
            closest_counts = Some(counts);
        }
    }

    let counts = closest_counts.expect("labeled set is non-empty");
    let entry = &labeled.entries()[closest];
    let identity = 100.0 - min_distance;
    let shared_levels = thresholds.matching_levels(identity);

    // When every level is met the increment lands on the last position,
    // so the copied prefix is capped at K - 1.
    let cut = shared_levels.min(levels - 1);
    let prefix: LinCode = entry.code[..cut].to_vec();

    let mut next_value = 0;
    for candidate in labeled.entries() {
        if candidate.code[..cut] == prefix[..] {
            next_value = next_value.max(candidate.code[cut] + 1);
        }
    }

    let mut code = prefix.clone();
    code.push(next_value);
    code.resize(levels, 0);

    Derivation {
        code,
        reused: false,
        provenance: Some(Provenance {
            closest_id: entry.id.clone(),
            counts,
            identity,
            distance: min_distance,
            shared_levels,
            prefix,
        }),
    }
}
