// src/catalog.rs
// File discovery: walk the source root, apply ignore rules, return the
// ordered catalog of convertible files.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use ignore::gitignore::Gitignore;
use once_cell::sync::Lazy;
use walkdir::WalkDir;

use crate::state::FileUnit;

/// Source file extensions per language.
static LANGUAGE_EXTENSIONS: Lazy<HashMap<&'static str, &'static [&'static str]>> =
    Lazy::new(|| {
        let mut m: HashMap<&'static str, &'static [&'static str]> = HashMap::new();
        m.insert("python", &["py"]);
        m.insert("javascript", &["js", "jsx"]);
        m.insert("typescript", &["ts", "tsx"]);
        m.insert("java", &["java"]);
        m.insert("go", &["go"]);
        m.insert("rust", &["rs"]);
        m.insert("c", &["c", "h"]);
        m.insert("cpp", &["cpp", "cc", "hpp", "h"]);
        m.insert("csharp", &["cs"]);
        m.insert("ruby", &["rb"]);
        m.insert("php", &["php"]);
        m.insert("swift", &["swift"]);
        m.insert("kotlin", &["kt"]);
        m
    });

/// Directories never worth walking into.
const EXCLUDED_DIRS: &[&str] = &[
    "__pycache__",
    "node_modules",
    "venv",
    "env",
    "build",
    "dist",
    "vendor",
    "target",
    "coverage",
    "htmlcov",
];

/// Extensions that are binary regardless of content.
const BINARY_EXTENSIONS: &[&str] = &[
    "pyc", "pyo", "pyd", "so", "dylib", "dll", "class", "o", "a", "exe", "bin",
];

const SNIFF_BYTES: usize = 8192;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("source root does not exist: {0}")]
    RootMissing(PathBuf),

    #[error("source root is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("unsupported source language: {0}")]
    UnsupportedLanguage(String),

    #[error("failed to read source tree: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct CatalogOptions {
    pub language: String,
    /// Cap on catalog length, applied after sorting so it stays deterministic.
    pub max_files: usize,
}

/// Walk `root` and return the catalog, ordered lexicographically by relative
/// path so that repeated discovery over an unchanged tree assigns identical
/// indices. Oversize files are NOT filtered here; they enter the catalog and
/// the engine fails them individually.
pub fn discover(root: &Path, opts: &CatalogOptions) -> Result<Vec<FileUnit>, CatalogError> {
    let extensions = LANGUAGE_EXTENSIONS
        .get(opts.language.as_str())
        .copied()
        .ok_or_else(|| CatalogError::UnsupportedLanguage(opts.language.clone()))?;

    if !root.exists() {
        return Err(CatalogError::RootMissing(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(CatalogError::NotADirectory(root.to_path_buf()));
    }
    // Probe readability up front; an unreadable root is fatal to the run.
    std::fs::read_dir(root)?;

    let gitignore_path = root.join(".gitignore");
    let gitignore = if gitignore_path.exists() {
        Gitignore::new(&gitignore_path).0
    } else {
        Gitignore::empty()
    };

    let mut units = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_excluded_dir(e.path()))
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        if gitignore.matched_path_or_any_parents(path, false).is_ignore() {
            continue;
        }

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if BINARY_EXTENSIONS.contains(&ext) {
            continue;
        }
        if !extensions.contains(&ext) {
            continue;
        }

        if looks_binary(path)? {
            continue;
        }

        let metadata = entry.metadata().map_err(|e| {
            CatalogError::Io(e.into_io_error().unwrap_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::Other, "walk error")
            }))
        })?;

        let rel_path = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_path_buf();

        units.push(FileUnit {
            rel_path,
            abs_path: path.to_path_buf(),
            size_bytes: metadata.len(),
            language: opts.language.clone(),
        });
    }

    units.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    units.truncate(opts.max_files);

    Ok(units)
}

fn is_excluded_dir(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if !path.is_dir() {
        return false;
    }
    name.starts_with('.') || EXCLUDED_DIRS.contains(&name)
}

/// Null-byte sniff over the first 8 KiB.
fn looks_binary(path: &Path) -> Result<bool, CatalogError> {
    let mut file = std::fs::File::open(path)?;
    let mut buf = [0u8; SNIFF_BYTES];
    let n = file.read(&mut buf)?;
    Ok(buf[..n].contains(&0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn opts(language: &str) -> CatalogOptions {
        CatalogOptions {
            language: language.to_string(),
            max_files: 25,
        }
    }

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn discovery_is_deterministic_and_sorted() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "zeta.py", b"print('z')\n");
        write(dir.path(), "alpha.py", b"print('a')\n");
        write(dir.path(), "pkg/mid.py", b"print('m')\n");

        let first = discover(dir.path(), &opts("python")).unwrap();
        let second = discover(dir.path(), &opts("python")).unwrap();

        assert_eq!(first, second);
        let rels: Vec<_> = first
            .iter()
            .map(|u| u.rel_path.to_string_lossy().to_string())
            .collect();
        assert_eq!(rels, vec!["alpha.py", "pkg/mid.py", "zeta.py"]);
    }

    #[test]
    fn excludes_binary_and_foreign_files() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "ok.py", b"x = 1\n");
        write(dir.path(), "blob.py", b"head\0tail");
        write(dir.path(), "notes.txt", b"not source\n");
        write(dir.path(), "lib.pyc", b"x");

        let units = discover(dir.path(), &opts("python")).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].rel_path, PathBuf::from("ok.py"));
    }

    #[test]
    fn excludes_ignored_and_hidden_directories() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), ".gitignore", b"generated/\n");
        write(dir.path(), "keep.py", b"x = 1\n");
        write(dir.path(), "generated/gen.py", b"x = 2\n");
        write(dir.path(), "__pycache__/cached.py", b"x = 3\n");
        write(dir.path(), ".hidden/secret.py", b"x = 4\n");

        let units = discover(dir.path(), &opts("python")).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].rel_path, PathBuf::from("keep.py"));
    }

    #[test]
    fn missing_root_is_fatal() {
        let err = discover(Path::new("/no/such/dir"), &opts("python")).unwrap_err();
        assert!(matches!(err, CatalogError::RootMissing(_)));
    }

    #[test]
    fn unsupported_language_is_fatal() {
        let dir = TempDir::new().unwrap();
        let err = discover(dir.path(), &opts("cobol")).unwrap_err();
        assert!(matches!(err, CatalogError::UnsupportedLanguage(_)));
    }

    #[test]
    fn max_files_cap_applies_after_sort() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "c.py", b"3\n");
        write(dir.path(), "a.py", b"1\n");
        write(dir.path(), "b.py", b"2\n");

        let mut capped = opts("python");
        capped.max_files = 2;
        let units = discover(dir.path(), &capped).unwrap();
        let rels: Vec<_> = units
            .iter()
            .map(|u| u.rel_path.to_string_lossy().to_string())
            .collect();
        assert_eq!(rels, vec!["a.py", "b.py"]);
    }
}
