// Assignment engine
// Owns the scheme state, the in-memory labeled set, the lock, and the
// private scratch directory, and drives the batched assignment loop.

use crate::anchor::anchor_order;
use crate::assign::{derive_code, Derivation};
use crate::lock::SchemeLock;
use crate::matrix::DistanceMatrix;
use crate::prim::prim_order;
use crate::scheme::{load_loci, load_thresholds, SchemePaths};
use crate::store::{LabeledSet, ProfileFilter, ProfileStore};
use anyhow::{Context, Result};
use rlin_common::{count_missing, format_lincode, Thresholds};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Engine configuration; field names follow the driver options
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum unlabeled profiles per inner iteration; bounds the
    /// quadratic distance-matrix footprint
    pub batch_size: usize,
    /// Per-profile missing-allele budget
    pub max_missing: usize,
    /// Inclusive id-range filter on the unlabeled queue
    pub min_id: Option<i64>,
    pub max_id: Option<i64>,
    /// Back the distance matrix with a memory-mapped scratch file
    pub mmap_matrix: bool,
    /// Optional per-assignment debug log (TSV)
    pub log_path: Option<PathBuf>,
    /// 0 = quiet, 1 = normal, 2 = debug
    pub verbosity: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            batch_size: 10_000,
            max_missing: 0,
            min_id: None,
            max_id: None,
            mmap_matrix: false,
            log_path: None,
            verbosity: 1,
        }
    }
}

/// The assignment engine for one scheme directory.
///
/// Holds the single-writer lock for its whole lifetime; the lock file and
/// the scratch directory are removed when the engine is dropped, on normal
/// exit or unwind alike.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    loci: Vec<String>,
    thresholds: Thresholds,
    store: ProfileStore,
    labeled: LabeledSet,
    scratch: TempDir,
    log: Option<DebugLog>,
    _lock: SchemeLock,
}

impl Engine {
    /// Acquire the lock and load the scheme. Fails fast on contention or
    /// on any missing or malformed scheme file.
    pub fn open(dir: &Path, scheme_id: u32, config: EngineConfig) -> Result<Self> {
        let paths = SchemePaths::new(dir, scheme_id);
        let lock = SchemeLock::acquire(&paths)?;

        let loci = load_loci(&paths.loci())?;
        let thresholds = load_thresholds(&paths.thresholds(), loci.len())?;
        let store = ProfileStore::open(paths, loci.len())?;
        let labeled = store.load_labeled(thresholds.levels())?;

        let scratch = tempfile::Builder::new()
            .prefix("rlin-")
            .tempdir()
            .context("failed to create scratch directory")?;

        let log = match &config.log_path {
            Some(path) => Some(DebugLog::create(path)?),
            None => None,
        };

        if config.verbosity > 1 {
            eprintln!(
                "Scheme {scheme_id}: {} loci, {} threshold level(s), {} profile(s) labeled",
                loci.len(),
                thresholds.levels(),
                labeled.len()
            );
        }

        Ok(Engine {
            config,
            loci,
            thresholds,
            store,
            labeled,
            scratch,
            log,
            _lock: lock,
        })
    }

    pub fn loci(&self) -> &[String] {
        &self.loci
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn labeled_count(&self) -> usize {
        self.labeled.len()
    }

    /// Append new profiles from an external TSV before assignment;
    /// duplicates by id are skipped without error.
    pub fn import_profiles(&mut self, input: &Path) -> Result<usize> {
        self.store.import_profiles(input, self.config.verbosity)
    }

    /// Run the batched assignment loop until the unlabeled queue is empty.
    /// Returns the number of profiles labeled.
    pub fn run(&mut self) -> Result<usize> {
        let filter = ProfileFilter {
            min_id: self.config.min_id,
            max_id: self.config.max_id,
            max_missing: self.config.max_missing,
        };
        let mut reader = self.store.iterate_profiles(filter)?;
        let mut assigned = 0;

        loop {
            // Next batch of unlabeled profiles, at most batch_size of them
            let mut ids = Vec::new();
            let mut profiles = Vec::new();
            while ids.len() < self.config.batch_size {
                match reader.next_profile()? {
                    Some((id, profile)) => {
                        if self.labeled.contains(&id) {
                            continue;
                        }
                        ids.push(id);
                        profiles.push(profile);
                    }
                    None => break,
                }
            }
            if ids.is_empty() {
                break;
            }
            if self.config.verbosity > 1 {
                eprintln!("Ordering batch of {} unlabeled profile(s)", ids.len());
            }

            let order = if ids.len() > 1 {
                let scratch_dir = if self.config.mmap_matrix {
                    Some(self.scratch.path())
                } else {
                    None
                };
                let mut matrix = DistanceMatrix::build(&profiles, scratch_dir)?;
                prim_order(&mut matrix)
            } else {
                vec![0]
            };
            let order = anchor_order(order, &profiles, &self.labeled);

            for member in order {
                let id = &ids[member];
                let profile = &profiles[member];
                let derivation = derive_code(&self.labeled, profile, &self.thresholds);
                self.store.append_labeled(id, profile, &derivation.code)?;
                if let Some(log) = self.log.as_mut() {
                    log.record(id, profile, &derivation)?;
                }
                if self.config.verbosity > 1 {
                    eprintln!("  {} -> {}", id, format_lincode(&derivation.code));
                }
                self.labeled
                    .push(id.clone(), profile.clone(), derivation.code);
                assigned += 1;
            }
        }

        if self.config.verbosity > 0 {
            eprintln!("Labeled {assigned} profile(s)");
        }
        Ok(assigned)
    }
}

const LOG_HEADER: &str = "profile_id\tclosest_profile_id\tcommon_alleles\tmissing_alleles\t\
                          missing_in_either\tidentity\tdistance\tchosen_prefix\tnew_lincode";

/// Per-assignment TSV debug log
#[derive(Debug)]
struct DebugLog {
    path: PathBuf,
    file: File,
}

impl DebugLog {
    fn create(path: &Path) -> Result<Self> {
        let mut file = File::create(path)
            .with_context(|| format!("failed to create debug log {}", path.display()))?;
        writeln!(file, "{LOG_HEADER}")
            .with_context(|| format!("failed to write debug log {}", path.display()))?;
        Ok(DebugLog {
            path: path.to_path_buf(),
            file,
        })
    }

    fn record(&mut self, id: &str, profile: &[u32], derivation: &Derivation) -> Result<()> {
        let missing = count_missing(profile);
        let line = match &derivation.provenance {
            Some(p) => format!(
                "{}\t{}\t{}\t{}\t{}\t{:.2}\t{:.2}\t{}\t{}",
                id,
                p.closest_id,
                p.counts.shared,
                missing,
                p.counts.missing_in_either,
                p.identity,
                p.distance,
                format_lincode(&p.prefix),
                format_lincode(&derivation.code)
            ),
            // First assignment ever: there is nothing to compare against
            None => format!(
                "{}\t-\t{}\t{}\t{}\t-\t-\t\t{}",
                id,
                profile.len() - missing,
                missing,
                missing,
                format_lincode(&derivation.code)
            ),
        };
        writeln!(self.file, "{line}")
            .with_context(|| format!("failed to write debug log {}", self.path.display()))?;
        self.file
            .flush()
            .with_context(|| format!("failed to flush debug log {}", self.path.display()))?;
        Ok(())
    }
}
