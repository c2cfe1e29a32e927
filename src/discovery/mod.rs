// Ignore & discovery: walks a project root to a deterministic, ordered list
// of file paths, applying hard-coded excludes, parser-provided ignore sets,
// `.gitignore`-style patterns and project overrides in one pass. Grounded
// on `ignore::WalkBuilder`'s layered-ignore semantics rather than a hand
// rolled glob matcher.

use crate::error::{FelixError, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Directories and file suffixes excluded regardless of `.gitignore`
/// content — VCS metadata, build outputs, WAL/SHM sidecars.
const HARD_CODED_EXCLUDES: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "target",
    "node_modules",
    "dist",
    "build",
    ".felix",
    "*.wal",
    "*.shm",
    "*.db-journal",
];

#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Additional ignore patterns contributed by parsers (spec §6.2
    /// `get_ignore_patterns`) and project-specific overrides, applied after
    /// the hard-coded set and any `.gitignore` files.
    pub extra_ignore_patterns: Vec<String>,
    /// Whether to traverse symlinked directories. Off by default: spec §4.1
    /// says "follows symlinks only when explicitly enabled".
    pub follow_symlinks: bool,
    /// Files larger than this are dropped with a warning rather than
    /// indexed.
    pub max_file_size_bytes: u64,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            extra_ignore_patterns: Vec::new(),
            follow_symlinks: false,
            max_file_size_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Walk `root` and return every file that survives the ignore pipeline, in
/// deterministic (lexicographically sorted) order.
pub fn discover(root: &Path, options: &DiscoveryOptions) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        return Err(FelixError::InvalidPath(root.to_path_buf()));
    }

    let extra_set = build_glob_set(&options.extra_ignore_patterns)
        .map_err(|e| FelixError::Store(anyhow::anyhow!(e)))?;
    let hard_excludes = build_hard_exclude_overrides(root).map_err(|e| FelixError::Store(anyhow::anyhow!(e)))?;

    let mut walker = WalkBuilder::new(root);
    walker
        .follow_links(options.follow_symlinks)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .hidden(false)
        .overrides(hard_excludes);

    let mut out = Vec::new();
    for entry in walker.build() {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                warn!(error = %err, "discovery walk entry skipped");
                continue;
            }
        };

        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }

        let path = entry.path();
        if is_hard_excluded(path, root) {
            continue;
        }
        if extra_set.is_match(path) {
            continue;
        }

        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > options.max_file_size_bytes => {
                warn!(path = %path.display(), size = meta.len(), "file exceeds max size, dropped");
                continue;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(path = %path.display(), error = %err, "could not stat discovered file");
                continue;
            }
        }

        out.push(path.to_path_buf());
    }

    out.sort();
    Ok(out)
}

fn is_hard_excluded(path: &Path, root: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.components().any(|component| {
        let s = component.as_os_str().to_string_lossy();
        HARD_CODED_EXCLUDES.iter().any(|pat| {
            if let Some(ext_pat) = pat.strip_prefix('*') {
                s.ends_with(ext_pat)
            } else {
                s == *pat
            }
        })
    })
}

/// Builds a whitelist-by-default override set whose negated entries prune
/// `HARD_CODED_EXCLUDES` directories and suffixes before the walker
/// descends into them, rather than filtering matched files out afterward.
fn build_hard_exclude_overrides(root: &Path) -> std::result::Result<ignore::overrides::Override, ignore::Error> {
    let mut builder = OverrideBuilder::new(root);
    for pattern in HARD_CODED_EXCLUDES {
        builder.add(&format!("!{pattern}"))?;
    }
    builder.build()
}

fn build_glob_set(patterns: &[String]) -> std::result::Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, contents: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn discovers_files_in_sorted_order() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "b.rs", "fn b() {}");
        write(tmp.path(), "a.rs", "fn a() {}");

        let found = discover(tmp.path(), &DiscoveryOptions::default()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.rs", "b.rs"]);
    }

    #[test]
    fn skips_hard_coded_excludes() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "src/main.rs", "fn main() {}");
        write(tmp.path(), "target/debug/build.log", "noise");
        write(tmp.path(), ".git/HEAD", "ref: refs/heads/main");

        let found = discover(tmp.path(), &DiscoveryOptions::default()).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("src/main.rs"));
    }

    #[test]
    fn honors_extra_ignore_patterns() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "keep.rs", "fn keep() {}");
        write(tmp.path(), "generated.pb.rs", "// generated");

        let options = DiscoveryOptions {
            extra_ignore_patterns: vec!["**/*.pb.rs".to_string()],
            ..Default::default()
        };
        let found = discover(tmp.path(), &options).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("keep.rs"));
    }

    #[test]
    fn drops_oversized_files() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "small.rs", "fn small() {}");
        write(tmp.path(), "huge.rs", &"x".repeat(2048));

        let options = DiscoveryOptions {
            max_file_size_bytes: 1024,
            ..Default::default()
        };
        let found = discover(tmp.path(), &options).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("small.rs"));
    }

    #[test]
    fn missing_root_is_an_error() {
        let missing = PathBuf::from("/nonexistent/felix-root-for-tests");
        assert!(discover(&missing, &DiscoveryOptions::default()).is_err());
    }
}
