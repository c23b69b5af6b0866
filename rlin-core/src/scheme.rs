// Scheme file layout
// Every on-disk artifact for scheme S lives under one directory, with names
// derived here so the store, lock, and CLI agree on them.

use anyhow::{bail, Context, Result};
use rlin_common::Thresholds;
use std::fs;
use std::path::{Path, PathBuf};

/// Paths of the on-disk artifacts for one scheme
#[derive(Debug, Clone)]
pub struct SchemePaths {
    dir: PathBuf,
    scheme_id: u32,
}

impl SchemePaths {
    pub fn new<P: AsRef<Path>>(dir: P, scheme_id: u32) -> Self {
        SchemePaths {
            dir: dir.as_ref().to_path_buf(),
            scheme_id,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn scheme_id(&self) -> u32 {
        self.scheme_id
    }

    /// `scheme_<S>_profiles.tsv`: header line, then `id<TAB>a1,a2,…,aL`
    pub fn profiles(&self) -> PathBuf {
        self.dir
            .join(format!("scheme_{}_profiles.tsv", self.scheme_id))
    }

    /// `scheme_<S>_loci.txt`: one locus name per line
    pub fn loci(&self) -> PathBuf {
        self.dir.join(format!("scheme_{}_loci.txt", self.scheme_id))
    }

    /// `scheme_<S>_thresholds.txt`: one semicolon-separated line
    pub fn thresholds(&self) -> PathBuf {
        self.dir
            .join(format!("scheme_{}_thresholds.txt", self.scheme_id))
    }

    /// `scheme_<S>_lincodes.tsv`: append-only assignment log
    pub fn lincodes(&self) -> PathBuf {
        self.dir
            .join(format!("scheme_{}_lincodes.tsv", self.scheme_id))
    }

    /// Directory holding single-writer lock files
    pub fn lock_dir(&self) -> PathBuf {
        self.dir.join(".locks")
    }
}

/// Load the ordered locus list. `#` lines and blanks are ignored; the
/// resulting count establishes the profile width `L`.
pub fn load_loci(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read loci file {}", path.display()))?;

    let loci: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect();

    if loci.is_empty() {
        bail!("loci file {} defines no loci", path.display());
    }
    Ok(loci)
}

/// Load and validate the threshold configuration for a scheme
pub fn load_thresholds(path: &Path, locus_count: usize) -> Result<Thresholds> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read thresholds file {}", path.display()))?;

    Thresholds::parse(&content, locus_count)
        .with_context(|| format!("invalid thresholds file {}", path.display()))
}
