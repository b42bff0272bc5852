//! File system capability
//!
//! Loading never changes the process working directory. Every relative
//! path is resolved against an explicit base directory, so documents can be
//! loaded concurrently with release execution.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

use crate::error::{CoreError, Result};

/// File access used by the loader
pub trait FileSystem: Send + Sync {
    /// Read a whole file
    fn read_file(&self, path: &Path) -> Result<Vec<u8>>;

    /// Expand a glob pattern; results are sorted lexicographically
    fn glob(&self, pattern: &str) -> Result<Vec<PathBuf>>;

    /// Absolute, lexically normalized form of `path`
    fn abs(&self, path: &Path) -> Result<PathBuf>;

    /// Whether a regular file exists at `path`
    fn file_exists_at(&self, path: &Path) -> bool;

    /// Whether a directory exists at `path`
    fn directory_exists_at(&self, path: &Path) -> bool;

    /// Current working directory
    fn getwd(&self) -> Result<PathBuf>;

    /// Read a file as UTF-8
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let bytes = self.read_file(path)?;
        String::from_utf8(bytes).map_err(|e| {
            CoreError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{}: {}", path.display(), e),
            ))
        })
    }
}

/// Resolve `path` against `base_dir` unless it is already absolute
pub fn resolve_path(base_dir: &Path, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        clean_path(candidate)
    } else {
        clean_path(&base_dir.join(candidate))
    }
}

/// Lexically normalize a path: drop `.` components and fold `..`
pub fn clean_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = cleaned.pop();
                if !popped && !path.is_absolute() {
                    cleaned.push("..");
                }
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    if cleaned.as_os_str().is_empty() {
        cleaned.push(".");
    }
    cleaned
}

/// Whether a string contains glob metacharacters
pub fn is_glob_pattern(path: &str) -> bool {
    path.contains(['*', '?', '['])
}

/// The real file system
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl OsFileSystem {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for OsFileSystem {
    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CoreError::FileNotFound {
                path: path.display().to_string(),
            },
            _ => CoreError::Io(e),
        })
    }

    fn glob(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        let entries = glob::glob(pattern).map_err(|e| CoreError::Glob {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;

        let mut matches = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| CoreError::Glob {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })?;
            matches.push(path);
        }
        matches.sort();
        Ok(matches)
    }

    fn abs(&self, path: &Path) -> Result<PathBuf> {
        if path.is_absolute() {
            Ok(clean_path(path))
        } else {
            Ok(clean_path(&self.getwd()?.join(path)))
        }
    }

    fn file_exists_at(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn directory_exists_at(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn getwd(&self) -> Result<PathBuf> {
        Ok(std::env::current_dir()?)
    }
}

/// In-memory file system for tests and dry runs
///
/// Relative paths resolve against the configured working directory.
#[derive(Debug, Clone)]
pub struct MemoryFileSystem {
    cwd: PathBuf,
    files: BTreeMap<PathBuf, Vec<u8>>,
    dirs: BTreeSet<PathBuf>,
}

impl Default for MemoryFileSystem {
    fn default() -> Self {
        Self::new("/work")
    }
}

impl MemoryFileSystem {
    /// Create an empty file system rooted at `cwd`
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        let cwd = clean_path(&cwd.into());
        let mut dirs = BTreeSet::new();
        dirs.insert(cwd.clone());
        Self {
            cwd,
            files: BTreeMap::new(),
            dirs,
        }
    }

    /// Add a file (parent directories are implied)
    pub fn with_file(mut self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) -> Self {
        self.add_file(path, content);
        self
    }

    /// Add an empty directory
    pub fn with_dir(mut self, path: impl AsRef<Path>) -> Self {
        let path = self.absolute(path.as_ref());
        self.register_parents(&path);
        self.dirs.insert(path);
        self
    }

    /// Add or replace a file
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = self.absolute(path.as_ref());
        self.register_parents(&path);
        self.files.insert(path, content.into());
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            clean_path(path)
        } else {
            clean_path(&self.cwd.join(path))
        }
    }

    fn register_parents(&mut self, path: &Path) {
        let mut parent = path.parent();
        while let Some(dir) = parent {
            self.dirs.insert(dir.to_path_buf());
            parent = dir.parent();
        }
    }
}

impl FileSystem for MemoryFileSystem {
    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        self.files
            .get(&self.absolute(path))
            .cloned()
            .ok_or_else(|| CoreError::FileNotFound {
                path: path.display().to_string(),
            })
    }

    fn glob(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        let absolute = self.absolute(Path::new(pattern));
        let compiled = glob::Pattern::new(&absolute.to_string_lossy()).map_err(|e| CoreError::Glob {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        let options = glob::MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };

        // BTreeMap/BTreeSet iteration is already sorted
        let mut matches: Vec<PathBuf> = self
            .files
            .keys()
            .chain(self.dirs.iter())
            .filter(|p| compiled.matches_path_with(p, options))
            .cloned()
            .collect();
        matches.sort();
        matches.dedup();
        Ok(matches)
    }

    fn abs(&self, path: &Path) -> Result<PathBuf> {
        Ok(self.absolute(path))
    }

    fn file_exists_at(&self, path: &Path) -> bool {
        self.files.contains_key(&self.absolute(path))
    }

    fn directory_exists_at(&self, path: &Path) -> bool {
        self.dirs.contains(&self.absolute(path))
    }

    fn getwd(&self) -> Result<PathBuf> {
        Ok(self.cwd.clone())
    }
}
