// Threshold model
// Allelic-difference cut-offs and the identity percentages derived from them

use anyhow::{bail, Result};

/// Parsed threshold configuration for a scheme.
///
/// Holds the allelic-difference thresholds `t1 < t2 < … < tK` and the
/// derived identity cut-offs `I[k] = 100·(L − tk)/L`, where `L` is the
/// scheme's locus count. Immutable once parsed.
#[derive(Debug, Clone)]
pub struct Thresholds {
    diffs: Vec<u32>,
    identity: Vec<f64>,
}

impl Thresholds {
    /// Parse a semicolon-separated threshold line, e.g. `2;4;7;14;21;35`.
    ///
    /// Fails on an empty list, a non-integer token, or a sequence that is
    /// not strictly increasing.
    pub fn parse(line: &str, locus_count: usize) -> Result<Self> {
        let line = line.trim();
        if line.is_empty() {
            bail!("threshold list is empty");
        }

        let mut diffs = Vec::new();
        for token in line.split(';') {
            let token = token.trim();
            let value: u32 = match token.parse() {
                Ok(v) => v,
                Err(_) => bail!("invalid threshold value: {:?}", token),
            };
            if let Some(&last) = diffs.last() {
                if value <= last {
                    bail!(
                        "thresholds must be strictly increasing ({} follows {})",
                        value,
                        last
                    );
                }
            }
            diffs.push(value);
        }

        let identity = diffs
            .iter()
            .map(|&t| 100.0 * (locus_count as f64 - t as f64) / locus_count as f64)
            .collect();

        Ok(Thresholds { diffs, identity })
    }

    /// Number of hierarchy levels `K`
    pub fn levels(&self) -> usize {
        self.diffs.len()
    }

    /// Allelic-difference thresholds, strictly increasing
    pub fn diffs(&self) -> &[u32] {
        &self.diffs
    }

    /// Identity percentage cut-offs, one per level
    pub fn identity(&self) -> &[f64] {
        &self.identity
    }

    /// Count of leading levels whose identity cut-off is met.
    /// The scan stops at the first failing level, so a profile exactly on
    /// a cut-off (identity == I[k]) still shares that level.
    pub fn matching_levels(&self, identity_pct: f64) -> usize {
        let mut count = 0;
        for &cutoff in &self.identity {
            if identity_pct >= cutoff {
                count += 1;
            } else {
                break;
            }
        }
        count
    }
}
