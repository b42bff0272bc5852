//! Locating documents on disk

use std::path::{Path, PathBuf};

use sherpfile_core::{CoreError, FileSystem};

use crate::error::{EngineError, Result};

/// Default document file
pub const DEFAULT_FILE: &str = "helmfile.yaml";

/// Default document file when written as a template
pub const DEFAULT_TEMPLATE_FILE: &str = "helmfile.yaml.j2";

/// Legacy document file, still honoured with a warning
pub const LEGACY_FILE: &str = "charts.yaml";

/// Directory holding several documents
pub const DEFAULT_DIR: &str = "helmfile.d";

/// Find the documents to process
///
/// An explicit path may be a file or a directory. Without one, the working
/// directory is searched for the default file, the legacy file, then the
/// default directory. A default file next to a default directory is
/// ambiguous.
pub fn discover(fs: &dyn FileSystem, explicit: Option<&Path>) -> Result<Vec<PathBuf>> {
    if let Some(path) = explicit {
        let path = fs.abs(path)?;
        if fs.file_exists_at(&path) {
            return Ok(vec![path]);
        }
        if fs.directory_exists_at(&path) {
            return documents_in_dir(fs, &path);
        }
        return Err(CoreError::FileNotFound {
            path: path.display().to_string(),
        }
        .into());
    }

    let cwd = fs.getwd()?;
    let dir = cwd.join(DEFAULT_DIR);
    let has_dir = fs.directory_exists_at(&dir);

    let default_file = [DEFAULT_FILE, DEFAULT_TEMPLATE_FILE]
        .iter()
        .map(|name| cwd.join(name))
        .find(|path| fs.file_exists_at(path));

    if let Some(file) = default_file {
        if has_dir {
            return Err(EngineError::AmbiguousDocument { file, dir });
        }
        return Ok(vec![file]);
    }

    let legacy = cwd.join(LEGACY_FILE);
    if fs.file_exists_at(&legacy) {
        tracing::warn!(
            "{} is deprecated, rename it to {}",
            LEGACY_FILE,
            DEFAULT_FILE
        );
        return Ok(vec![legacy]);
    }

    if has_dir {
        return documents_in_dir(fs, &dir);
    }

    Err(EngineError::NoDocument { dir: cwd })
}

/// All documents directly inside `dir`, sorted
pub fn documents_in_dir(fs: &dyn FileSystem, dir: &Path) -> Result<Vec<PathBuf>> {
    let mut documents = Vec::new();
    for pattern in ["*.yaml", "*.yaml.j2"] {
        documents.extend(fs.glob(&dir.join(pattern).to_string_lossy())?);
    }
    documents.retain(|path| fs.file_exists_at(path));
    documents.sort();
    documents.dedup();

    if documents.is_empty() {
        return Err(EngineError::NoDocument { dir: dir.to_path_buf() });
    }
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sherpfile_core::MemoryFileSystem;

    #[test]
    fn test_default_file() {
        let fs = MemoryFileSystem::default().with_file("helmfile.yaml", "");
        assert_eq!(
            discover(&fs, None).unwrap(),
            vec![PathBuf::from("/work/helmfile.yaml")]
        );
    }

    #[test]
    fn test_template_default_file() {
        let fs = MemoryFileSystem::default().with_file("helmfile.yaml.j2", "");
        assert_eq!(
            discover(&fs, None).unwrap(),
            vec![PathBuf::from("/work/helmfile.yaml.j2")]
        );
    }

    #[test]
    fn test_legacy_file() {
        let fs = MemoryFileSystem::default().with_file("charts.yaml", "");
        assert_eq!(
            discover(&fs, None).unwrap(),
            vec![PathBuf::from("/work/charts.yaml")]
        );
    }

    #[test]
    fn test_directory_sorted() {
        let fs = MemoryFileSystem::default()
            .with_file("helmfile.d/20-apps.yaml", "")
            .with_file("helmfile.d/10-infra.yaml.j2", "")
            .with_file("helmfile.d/README.md", "");
        assert_eq!(
            discover(&fs, None).unwrap(),
            vec![
                PathBuf::from("/work/helmfile.d/10-infra.yaml.j2"),
                PathBuf::from("/work/helmfile.d/20-apps.yaml"),
            ]
        );
    }

    #[test]
    fn test_file_and_directory_is_ambiguous() {
        let fs = MemoryFileSystem::default()
            .with_file("helmfile.yaml", "")
            .with_file("helmfile.d/a.yaml", "");
        assert!(matches!(
            discover(&fs, None),
            Err(EngineError::AmbiguousDocument { .. })
        ));
    }

    #[test]
    fn test_nothing_found() {
        let fs = MemoryFileSystem::default();
        assert!(matches!(discover(&fs, None), Err(EngineError::NoDocument { .. })));

        let fs = MemoryFileSystem::default().with_dir("helmfile.d");
        assert!(matches!(discover(&fs, None), Err(EngineError::NoDocument { .. })));
    }

    #[test]
    fn test_explicit_paths() {
        let fs = MemoryFileSystem::default()
            .with_file("custom.yaml", "")
            .with_file("stack/b.yaml", "")
            .with_file("stack/a.yaml", "");

        assert_eq!(
            discover(&fs, Some(Path::new("custom.yaml"))).unwrap(),
            vec![PathBuf::from("/work/custom.yaml")]
        );
        assert_eq!(
            discover(&fs, Some(Path::new("stack"))).unwrap(),
            vec![PathBuf::from("/work/stack/a.yaml"), PathBuf::from("/work/stack/b.yaml")]
        );
        assert!(matches!(
            discover(&fs, Some(Path::new("missing.yaml"))),
            Err(EngineError::Core(CoreError::FileNotFound { .. }))
        ));
    }
}
