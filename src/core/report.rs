// Shelver - core/report.rs
//
// Read-only analysis of a set of scanned files: per-category counts and
// sizes, the largest files, and groups of byte-identical duplicates.

use crate::core::classifier::Classifier;
use crate::core::hasher::ContentHasher;
use crate::util::constants;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryStats {
    pub count: usize,
    pub total_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SizedFile {
    pub path: PathBuf,
    pub size: u64,
}

/// Files sharing one content fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateSet {
    pub hash: String,
    pub size: u64,
    /// At least two paths, in input order.
    pub files: Vec<PathBuf>,
}

impl DuplicateSet {
    /// Bytes reclaimable by keeping a single copy.
    pub fn wasted_bytes(&self) -> u64 {
        self.size * (self.files.len() as u64 - 1)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisReport {
    pub total_files: usize,
    pub total_size: u64,
    pub by_category: BTreeMap<String, CategoryStats>,
    /// Largest first.
    pub largest_files: Vec<SizedFile>,
    /// Ordered by wasted bytes, largest first.
    pub duplicate_sets: Vec<DuplicateSet>,
    pub warnings: Vec<String>,
}

/// Analyse `files`. Files whose metadata cannot be read are reported as
/// warnings and left out of every statistic.
///
/// Only files sharing a size with at least one other file are hashed, so
/// the cost stays proportional to the number of plausible duplicates.
/// Empty files and files above the hashing ceiling are never grouped.
pub fn analyze(
    files: &[PathBuf],
    classifier: &dyn Classifier,
    hasher: &ContentHasher,
) -> AnalysisReport {
    let mut report = AnalysisReport::default();
    let mut sized: Vec<SizedFile> = Vec::with_capacity(files.len());

    for path in files {
        let size = match std::fs::metadata(path) {
            Ok(meta) if meta.is_file() => meta.len(),
            Ok(_) => continue,
            Err(e) => {
                report
                    .warnings
                    .push(format!("Cannot read metadata for '{}': {e}", path.display()));
                continue;
            }
        };

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let category = classifier.classify(path, &file_name);
        let stats = report.by_category.entry(category).or_default();
        stats.count += 1;
        stats.total_size += size;

        report.total_files += 1;
        report.total_size += size;
        sized.push(SizedFile {
            path: path.clone(),
            size,
        });
    }

    report.duplicate_sets = find_duplicates(&sized, hasher);

    sized.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.path.cmp(&b.path)));
    sized.truncate(constants::REPORT_LARGEST_FILES);
    report.largest_files = sized;

    tracing::debug!(
        files = report.total_files,
        categories = report.by_category.len(),
        duplicate_sets = report.duplicate_sets.len(),
        "Analysis complete"
    );
    report
}

fn find_duplicates(files: &[SizedFile], hasher: &ContentHasher) -> Vec<DuplicateSet> {
    let mut by_size: HashMap<u64, Vec<&Path>> = HashMap::new();
    for f in files {
        if f.size > 0 && f.size <= hasher.size_limit() {
            by_size.entry(f.size).or_default().push(&f.path);
        }
    }

    let candidates: Vec<(&Path, u64)> = files
        .iter()
        .filter(|f| by_size.get(&f.size).is_some_and(|group| group.len() > 1))
        .map(|f| (f.path.as_path(), f.size))
        .collect();

    // Hash in parallel; collect keeps input order.
    let hashed: Vec<(&Path, u64, Option<String>)> = candidates
        .par_iter()
        .map(|(path, size)| (*path, *size, hasher.fingerprint(path)))
        .collect();

    let mut groups: Vec<DuplicateSet> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for (path, size, hash) in hashed {
        let Some(hash) = hash else { continue };
        match index.get(&hash) {
            Some(&i) => groups[i].files.push(path.to_path_buf()),
            None => {
                index.insert(hash.clone(), groups.len());
                groups.push(DuplicateSet {
                    hash,
                    size,
                    files: vec![path.to_path_buf()],
                });
            }
        }
    }

    groups.retain(|g| g.files.len() > 1);
    groups.sort_by(|a, b| b.wasted_bytes().cmp(&a.wasted_bytes()));
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classifier::RoutingPolicy;
    use std::fs;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let p = dir.join(name);
        fs::write(&p, content).unwrap();
        p
    }

    #[test]
    fn test_counts_and_sizes_by_category() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            write(dir.path(), "a.py", "print(1)"),
            write(dir.path(), "b.rs", "fn main() {}"),
            write(dir.path(), "c.pdf", "%PDF"),
        ];
        let report = analyze(&files, &RoutingPolicy::builtin(), &ContentHasher::default());

        assert_eq!(report.total_files, 3);
        assert_eq!(report.total_size, 8 + 12 + 4);
        assert_eq!(
            report.by_category["code"],
            CategoryStats {
                count: 2,
                total_size: 20
            }
        );
        assert_eq!(report.by_category["document"].count, 1);
        assert_eq!(report.largest_files[0].path, files[1]);
        assert!(report.duplicate_sets.is_empty());
    }

    #[test]
    fn test_duplicates_grouped() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.txt", "same");
        let b = write(dir.path(), "b.txt", "same");
        let c = write(dir.path(), "c.txt", "diff");
        let e1 = write(dir.path(), "e1.txt", "");
        let e2 = write(dir.path(), "e2.txt", "");
        let files = vec![a.clone(), b.clone(), c, e1, e2];

        let report = analyze(&files, &RoutingPolicy::builtin(), &ContentHasher::default());

        assert_eq!(report.duplicate_sets.len(), 1);
        let set = &report.duplicate_sets[0];
        assert_eq!(set.files, vec![a, b]);
        assert_eq!(set.size, 4);
        assert_eq!(set.wasted_bytes(), 4);
    }

    #[test]
    fn test_missing_file_becomes_warning() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![dir.path().join("ghost.txt")];
        let report = analyze(&files, &RoutingPolicy::builtin(), &ContentHasher::default());
        assert_eq!(report.total_files, 0);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_largest_files_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let files: Vec<PathBuf> = (0..constants::REPORT_LARGEST_FILES + 5)
            .map(|i| write(dir.path(), &format!("f{i}.bin"), &"x".repeat(i + 1)))
            .collect();
        let report = analyze(&files, &RoutingPolicy::builtin(), &ContentHasher::default());
        assert_eq!(report.largest_files.len(), constants::REPORT_LARGEST_FILES);
        assert_eq!(report.largest_files[0].path, *files.last().unwrap());
    }
}
