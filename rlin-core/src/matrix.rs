// Distance matrix for a batch of profiles
// Dense symmetric f64 storage, either in RAM or memory-mapped over a scratch
// file in the engine's private temp directory. The backing choice changes the
// memory footprint only; cell values are identical either way.

use crate::distance::compare_profiles;
use anyhow::{Context, Result};
use memmap2::MmapMut;
use rayon::prelude::*;
use rlin_common::Profile;
use std::path::Path;
use tempfile::NamedTempFile;

const CELL: usize = std::mem::size_of::<f64>();

enum Storage {
    Ram(Vec<f64>),
    // The scratch file is unlinked when the matrix is dropped
    Mapped { map: MmapMut, _file: NamedTempFile },
}

/// Symmetric pairwise distance matrix for one batch
pub struct DistanceMatrix {
    n: usize,
    storage: Storage,
}

impl DistanceMatrix {
    /// Build the matrix for a batch, computing the upper triangle (i < j)
    /// only and mirroring it into the lower triangle afterwards. The
    /// triangle build is row-parallel; results do not depend on thread
    /// scheduling.
    pub fn build(profiles: &[Profile], scratch_dir: Option<&Path>) -> Result<Self> {
        let n = profiles.len();
        let mut matrix = match scratch_dir {
            None => DistanceMatrix {
                n,
                storage: Storage::Ram(vec![0.0; n * n]),
            },
            Some(dir) => {
                let file = tempfile::Builder::new()
                    .prefix("dismat")
                    .suffix(".dismat")
                    .tempfile_in(dir)
                    .with_context(|| {
                        format!("failed to create matrix scratch file in {}", dir.display())
                    })?;
                file.as_file()
                    .set_len((n * n * CELL) as u64)
                    .context("failed to size matrix scratch file")?;
                let map = unsafe { MmapMut::map_mut(file.as_file()) }
                    .context("failed to map matrix scratch file")?;
                DistanceMatrix {
                    n,
                    storage: Storage::Mapped { map, _file: file },
                }
            }
        };
        matrix.fill_upper_triangle(profiles);
        matrix.mirror_lower_triangle();
        Ok(matrix)
    }

    fn fill_upper_triangle(&mut self, profiles: &[Profile]) {
        let n = self.n;
        if n < 2 {
            return;
        }
        match &mut self.storage {
            Storage::Ram(cells) => {
                cells.par_chunks_mut(n).enumerate().for_each(|(i, row)| {
                    for j in (i + 1)..n {
                        row[j] = compare_profiles(&profiles[i], &profiles[j]).distance();
                    }
                });
            }
            Storage::Mapped { map, .. } => {
                map.par_chunks_mut(n * CELL).enumerate().for_each(|(i, row)| {
                    for j in (i + 1)..n {
                        let d = compare_profiles(&profiles[i], &profiles[j]).distance();
                        row[j * CELL..(j + 1) * CELL].copy_from_slice(&d.to_ne_bytes());
                    }
                });
            }
        }
    }

    fn mirror_lower_triangle(&mut self) {
        for i in 0..self.n {
            for j in (i + 1)..self.n {
                let d = self.get(i, j);
                self.set(j, i, d);
            }
        }
    }

    /// Number of batch members (the matrix is n × n)
    pub fn size(&self) -> usize {
        self.n
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        let idx = row * self.n + col;
        match &self.storage {
            Storage::Ram(cells) => cells[idx],
            Storage::Mapped { map, .. } => {
                let mut bytes = [0u8; CELL];
                bytes.copy_from_slice(&map[idx * CELL..(idx + 1) * CELL]);
                f64::from_ne_bytes(bytes)
            }
        }
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        let idx = row * self.n + col;
        match &mut self.storage {
            Storage::Ram(cells) => cells[idx] = value,
            Storage::Mapped { map, .. } => {
                map[idx * CELL..(idx + 1) * CELL].copy_from_slice(&value.to_ne_bytes());
            }
        }
    }

    /// Test-only constructor from explicit row-major values
    #[cfg(test)]
    pub(crate) fn from_values(n: usize, values: Vec<f64>) -> Self {
        assert_eq!(values.len(), n * n);
        DistanceMatrix {
            n,
            storage: Storage::Ram(values),
        }
    }
}
