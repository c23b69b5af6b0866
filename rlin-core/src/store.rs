// Profile store
// Line-oriented TSV persistence: the profile table is read-shared, the
// lincodes table is an append-only log written one whole line at a time so
// concurrent readers never observe a partial record.

use crate::scheme::SchemePaths;
use ahash::{AHashMap, AHashSet};
use anyhow::{bail, Context, Result};
use rlin_common::{
    count_missing, format_lincode, format_profile, normalize_tokens, parse_allele_field,
    parse_lincode, LinCode, Profile,
};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// Header of the lincodes table
const LINCODES_HEADER: &str = "profile_id\tlincode\tprofile";

/// Range and missing-budget filter applied to the unlabeled queue.
///
/// The id range is an integer comparison, both bounds inclusive; an id that
/// does not parse as an integer fails any active range bound. The missing
/// budget counts missing alleles after normalization.
#[derive(Debug, Clone, Default)]
pub struct ProfileFilter {
    pub min_id: Option<i64>,
    pub max_id: Option<i64>,
    pub max_missing: usize,
}

impl ProfileFilter {
    fn admits(&self, id: &str, profile: &[u32]) -> bool {
        if self.min_id.is_some() || self.max_id.is_some() {
            let numeric = match id.trim().parse::<i64>() {
                Ok(v) => v,
                Err(_) => return false,
            };
            if let Some(min) = self.min_id {
                if numeric < min {
                    return false;
                }
            }
            if let Some(max) = self.max_id {
                if numeric > max {
                    return false;
                }
            }
        }
        count_missing(profile) <= self.max_missing
    }
}

/// One assigned entry of the labeled set
#[derive(Debug, Clone)]
pub struct LabeledEntry {
    pub id: String,
    pub profile: Profile,
    pub code: LinCode,
}

/// The in-memory labeled set: append-only, insertion-ordered, with an id
/// index for membership tests. Later codes are derived relative to earlier
/// ones, so the order is load-bearing.
#[derive(Debug, Default)]
pub struct LabeledSet {
    entries: Vec<LabeledEntry>,
    index: AHashMap<String, usize>,
}

impl LabeledSet {
    pub fn new() -> Self {
        LabeledSet::default()
    }

    pub fn push(&mut self, id: String, profile: Profile, code: LinCode) {
        let slot = self.entries.len();
        self.index.insert(id.clone(), slot);
        self.entries.push(LabeledEntry { id, profile, code });
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn entries(&self) -> &[LabeledEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Store for one scheme's profile and lincode tables
#[derive(Debug)]
pub struct ProfileStore {
    paths: SchemePaths,
    locus_count: usize,
    lincodes_out: Option<File>,
}

impl ProfileStore {
    /// Open the store; the profile table must already exist
    pub fn open(paths: SchemePaths, locus_count: usize) -> Result<Self> {
        let profiles = paths.profiles();
        if !profiles.exists() {
            bail!("profile file not found: {}", profiles.display());
        }
        Ok(ProfileStore {
            paths,
            locus_count,
            lincodes_out: None,
        })
    }

    pub fn locus_count(&self) -> usize {
        self.locus_count
    }

    /// Sequential reader over the profile table, applying the filter.
    /// Profiles come back in stored (id) order, normalized.
    pub fn iterate_profiles(&self, filter: ProfileFilter) -> Result<ProfileReader<BufReader<File>>> {
        let path = self.paths.profiles();
        let file = File::open(&path)
            .with_context(|| format!("failed to open profile file {}", path.display()))?;
        Ok(ProfileReader {
            lines: BufReader::new(file).lines(),
            source: path.display().to_string(),
            locus_count: self.locus_count,
            filter,
            line_no: 0,
        })
    }

    /// Whether an id already carries a lincode on disk
    pub fn has_label(&self, id: &str) -> Result<bool> {
        let labeled = self.load_labeled_raw()?;
        Ok(labeled.iter().any(|(entry_id, _, _)| entry_id == id))
    }

    /// Load the labeled set in file order, validating profile width and
    /// code length against the scheme.
    pub fn load_labeled(&self, levels: usize) -> Result<LabeledSet> {
        let mut set = LabeledSet::new();
        for (id, profile, code) in self.load_labeled_raw()? {
            let path = self.paths.lincodes();
            if profile.len() != self.locus_count {
                bail!(
                    "profile width {} for id {} in {} does not match locus count {}",
                    profile.len(),
                    id,
                    path.display(),
                    self.locus_count
                );
            }
            if code.len() != levels {
                bail!(
                    "lincode length {} for id {} in {} does not match threshold count {}",
                    code.len(),
                    id,
                    path.display(),
                    levels
                );
            }
            set.push(id, profile, code);
        }
        Ok(set)
    }

    fn load_labeled_raw(&self) -> Result<Vec<(String, Profile, LinCode)>> {
        let path = self.paths.lincodes();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&path)
            .with_context(|| format!("failed to open lincodes file {}", path.display()))?;

        let mut entries = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line =
                line.with_context(|| format!("failed to read lincodes file {}", path.display()))?;
            if line_no == 0 || line.trim().is_empty() {
                continue;
            }
            let mut fields = line.split('\t');
            let (id, code_text, profile_text) =
                match (fields.next(), fields.next(), fields.next()) {
                    (Some(id), Some(code), Some(profile)) => (id, code, profile),
                    _ => bail!(
                        "malformed record on line {} of {}",
                        line_no + 1,
                        path.display()
                    ),
                };
            let code = match parse_lincode(code_text) {
                Some(code) => code,
                None => bail!(
                    "malformed lincode {:?} on line {} of {}",
                    code_text,
                    line_no + 1,
                    path.display()
                ),
            };
            entries.push((id.to_string(), parse_allele_field(profile_text), code));
        }
        Ok(entries)
    }

    /// Append one assignment. The record (plus the header, on first use)
    /// goes out in a single write so readers of the log never see a
    /// partial line.
    pub fn append_labeled(&mut self, id: &str, profile: &[u32], code: &[u32]) -> Result<()> {
        let path = self.paths.lincodes();
        if self.lincodes_out.is_none() {
            let fresh = !path.exists();
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("failed to open lincodes file {}", path.display()))?;
            if fresh {
                file.write_all(format!("{LINCODES_HEADER}\n").as_bytes())
                    .with_context(|| format!("failed to write {}", path.display()))?;
            }
            self.lincodes_out = Some(file);
        }

        let record = format!(
            "{}\t{}\t{}\n",
            id,
            format_lincode(code),
            format_profile(profile)
        );
        let file = self.lincodes_out.as_mut().expect("writer opened above");
        file.write_all(record.as_bytes())
            .with_context(|| format!("failed to append to {}", path.display()))?;
        file.flush()
            .with_context(|| format!("failed to flush {}", path.display()))?;
        Ok(())
    }

    /// Append records from an external TSV into the profile table,
    /// normalizing tab- or comma-separated allele tokens to comma form.
    /// Ids already present are skipped without error. Returns the number
    /// of profiles added.
    pub fn import_profiles(&mut self, input: &Path, verbosity: u32) -> Result<usize> {
        let mut existing: AHashSet<String> = AHashSet::new();
        let mut reader = self.iterate_profiles(ProfileFilter {
            max_missing: usize::MAX,
            ..ProfileFilter::default()
        })?;
        while let Some((id, _)) = reader.next_profile()? {
            existing.insert(id);
        }

        let file = File::open(input)
            .with_context(|| format!("failed to open input profiles {}", input.display()))?;

        let path = self.paths.profiles();
        let mut out = OpenOptions::new()
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open profile file {}", path.display()))?;

        let mut added = 0;
        let mut skipped = 0;
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line
                .with_context(|| format!("failed to read input profiles {}", input.display()))?;
            if line_no == 0 || line.trim().is_empty() {
                continue;
            }
            let (id, profile) = parse_profile_record(&line, line_no, input, self.locus_count)?;
            if existing.contains(&id) {
                skipped += 1;
                continue;
            }
            let record = format!("{}\t{}\n", id, format_profile(&profile));
            out.write_all(record.as_bytes())
                .with_context(|| format!("failed to append to {}", path.display()))?;
            existing.insert(id);
            added += 1;
        }
        out.flush()
            .with_context(|| format!("failed to flush {}", path.display()))?;

        if verbosity > 0 {
            eprintln!(
                "Imported {added} profile(s) from {} ({skipped} duplicate(s) skipped)",
                input.display()
            );
        }
        Ok(added)
    }
}

/// Pull-based reader over a profile table
pub struct ProfileReader<R: BufRead> {
    lines: std::io::Lines<R>,
    source: String,
    locus_count: usize,
    filter: ProfileFilter,
    line_no: usize,
}

impl<R: BufRead> ProfileReader<R> {
    /// Next profile passing the filter, or None at end of file
    pub fn next_profile(&mut self) -> Result<Option<(String, Profile)>> {
        loop {
            let line = match self.lines.next() {
                Some(line) => {
                    line.with_context(|| format!("failed to read profile file {}", self.source))?
                }
                None => return Ok(None),
            };
            let line_no = self.line_no;
            self.line_no += 1;
            if line_no == 0 || line.trim().is_empty() {
                continue;
            }
            let (id, profile) =
                parse_profile_record(&line, line_no, Path::new(&self.source), self.locus_count)?;
            if self.filter.admits(&id, &profile) {
                return Ok(Some((id, profile)));
            }
        }
    }
}

/// Parse one `id<TAB>alleles` record. The allele side is either a single
/// comma-separated field or one token per tab column; both normalize to the
/// same dense vector. The width must match the scheme's locus count.
fn parse_profile_record(
    line: &str,
    line_no: usize,
    source: &Path,
    locus_count: usize,
) -> Result<(String, Profile)> {
    let mut fields = line.split('\t');
    let id = match fields.next() {
        Some(id) if !id.trim().is_empty() => id.trim().to_string(),
        _ => bail!(
            "missing profile id on line {} of {}",
            line_no + 1,
            source.display()
        ),
    };
    let rest: Vec<&str> = fields.collect();
    let profile = match rest.len() {
        0 => bail!(
            "missing alleles for id {} on line {} of {}",
            id,
            line_no + 1,
            source.display()
        ),
        1 => parse_allele_field(rest[0]),
        _ => normalize_tokens(rest),
    };
    if profile.len() != locus_count {
        bail!(
            "profile width {} for id {} in {} does not match locus count {}",
            profile.len(),
            id,
            source.display(),
            locus_count
        );
    }
    Ok((id, profile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scheme_with_profiles(records: &[&str]) -> (tempfile::TempDir, SchemePaths) {
        let dir = tempfile::tempdir().unwrap();
        let paths = SchemePaths::new(dir.path(), 1);
        let mut content = String::from("id\tprofile\n");
        for record in records {
            content.push_str(record);
            content.push('\n');
        }
        fs::write(paths.profiles(), content).unwrap();
        (dir, paths)
    }

    fn drain<R: BufRead>(mut reader: ProfileReader<R>) -> Vec<(String, Profile)> {
        let mut out = Vec::new();
        while let Some(item) = reader.next_profile().unwrap() {
            out.push(item);
        }
        out
    }

    #[test]
    fn test_iterate_in_stored_order() {
        let (_dir, paths) = scheme_with_profiles(&["1\t1,1,1,1", "2\t1,1,1,2", "3\t2,2,2,2"]);
        let store = ProfileStore::open(paths, 4).unwrap();
        let rows = drain(store.iterate_profiles(ProfileFilter::default()).unwrap());
        let ids: Vec<&str> = rows.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(rows[1].1, vec![1, 1, 1, 2]);
    }

    #[test]
    fn test_missing_budget_filters() {
        let (_dir, paths) = scheme_with_profiles(&["1\t1,1,1,1", "2\t1,1,1,N", "3\tN,N,1,1"]);
        let store = ProfileStore::open(paths, 4).unwrap();

        let strict = drain(store.iterate_profiles(ProfileFilter::default()).unwrap());
        assert_eq!(strict.len(), 1);

        let relaxed = drain(
            store
                .iterate_profiles(ProfileFilter {
                    max_missing: 1,
                    ..ProfileFilter::default()
                })
                .unwrap(),
        );
        assert_eq!(relaxed.len(), 2);
    }

    #[test]
    fn test_id_range_filter() {
        let (_dir, paths) =
            scheme_with_profiles(&["5\t1,1,1,1", "10\t1,1,1,2", "15\t1,1,2,2", "x9\t1,2,2,2"]);
        let store = ProfileStore::open(paths, 4).unwrap();
        let rows = drain(
            store
                .iterate_profiles(ProfileFilter {
                    min_id: Some(6),
                    max_id: Some(15),
                    max_missing: 0,
                })
                .unwrap(),
        );
        let ids: Vec<&str> = rows.iter().map(|(id, _)| id.as_str()).collect();
        // "x9" does not parse as an integer and fails the active range
        assert_eq!(ids, vec!["10", "15"]);
    }

    #[test]
    fn test_tab_separated_alleles_accepted() {
        let (_dir, paths) = scheme_with_profiles(&["1\t1\t2\tN\t4"]);
        let store = ProfileStore::open(paths, 4).unwrap();
        let rows = drain(
            store
                .iterate_profiles(ProfileFilter {
                    max_missing: 4,
                    ..ProfileFilter::default()
                })
                .unwrap(),
        );
        assert_eq!(rows[0].1, vec![1, 2, 0, 4]);
    }

    #[test]
    fn test_width_mismatch_is_fatal_and_names_file() {
        let (_dir, paths) = scheme_with_profiles(&["1\t1,2,3"]);
        let store = ProfileStore::open(paths, 4).unwrap();
        let mut reader = store.iterate_profiles(ProfileFilter::default()).unwrap();
        let err = reader.next_profile().unwrap_err();
        assert!(format!("{err:#}").contains("profiles.tsv"));
    }

    #[test]
    fn test_missing_profile_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let paths = SchemePaths::new(dir.path(), 1);
        let err = ProfileStore::open(paths, 4).unwrap_err();
        assert!(format!("{err:#}").contains("profiles.tsv"));
    }

    #[test]
    fn test_append_and_load_labeled() {
        let (_dir, paths) = scheme_with_profiles(&["1\t1,1,1,1"]);
        let mut store = ProfileStore::open(paths, 4).unwrap();
        store.append_labeled("1", &[1, 1, 1, 1], &[0, 0]).unwrap();
        store.append_labeled("2", &[1, 1, 1, 2], &[0, 1]).unwrap();

        let labeled = store.load_labeled(2).unwrap();
        assert_eq!(labeled.len(), 2);
        assert!(labeled.contains("1"));
        assert!(labeled.contains("2"));
        assert!(!labeled.contains("3"));
        assert_eq!(labeled.entries()[1].code, vec![0, 1]);
        assert_eq!(labeled.entries()[1].profile, vec![1, 1, 1, 2]);

        assert!(store.has_label("1").unwrap());
        assert!(!store.has_label("9").unwrap());
    }

    #[test]
    fn test_lincodes_header_written_once() {
        let (_dir, paths) = scheme_with_profiles(&["1\t1,1,1,1"]);
        let lincodes = paths.lincodes();
        let mut store = ProfileStore::open(paths, 4).unwrap();
        store.append_labeled("1", &[1, 1, 1, 1], &[0, 0]).unwrap();
        store.append_labeled("2", &[1, 1, 1, 2], &[0, 1]).unwrap();

        let content = fs::read_to_string(lincodes).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "profile_id\tlincode\tprofile");
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "1\t0_0\t1,1,1,1");
    }

    #[test]
    fn test_load_labeled_rejects_wrong_code_length() {
        let (_dir, paths) = scheme_with_profiles(&["1\t1,1,1,1"]);
        let mut store = ProfileStore::open(paths, 4).unwrap();
        store.append_labeled("1", &[1, 1, 1, 1], &[0, 0]).unwrap();
        assert!(store.load_labeled(3).is_err());
    }

    #[test]
    fn test_import_skips_duplicates_and_normalizes() {
        let (dir, paths) = scheme_with_profiles(&["1\t1,1,1,1"]);
        let input = dir.path().join("new_profiles.tsv");
        fs::write(
            &input,
            "id\tl1\tl2\tl3\tl4\n1\t9,9,9,9\n2\t1\t2\tN\t4\n3\t5,5,-,5\n",
        )
        .unwrap();

        let profiles_path = paths.profiles();
        let mut store = ProfileStore::open(paths, 4).unwrap();
        let added = store.import_profiles(&input, 0).unwrap();
        assert_eq!(added, 2);

        let content = fs::read_to_string(profiles_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        // Existing id 1 kept its original alleles
        assert_eq!(lines[1], "1\t1,1,1,1");
        assert_eq!(lines[2], "2\t1,2,0,4");
        assert_eq!(lines[3], "3\t5,5,0,5");
    }
}
