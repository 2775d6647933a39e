use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};

/// Resolve a configuration-supplied relative path and make sure it stays inside `root`.
/// Absolute paths and `..` segments are refused before the filesystem is touched.
pub fn normalize_under_root(root: &Path, candidate: &Path) -> Result<PathBuf> {
    if let Some(bad) = candidate
        .components()
        .find(|c| matches!(c, Component::RootDir | Component::Prefix(_) | Component::ParentDir))
    {
        let reason = match bad {
            Component::ParentDir => "path should not point to a parent directory",
            _ => "absolute paths are not allowed",
        };
        anyhow::bail!("{reason}: {}", candidate.display());
    }

    let root = root
        .canonicalize()
        .with_context(|| format!("unable to resolve root {}", root.display()))?;
    let resolved = root
        .join(candidate)
        .canonicalize()
        .with_context(|| format!("unable to resolve {}", candidate.display()))?;
    // Symlinks inside the root may still lead out of it.
    if !resolved.starts_with(&root) {
        anyhow::bail!(
            "{} resolves outside {}",
            candidate.display(),
            root.display()
        );
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_parent_segments_and_absolute_paths() {
        let root = std::env::temp_dir();
        let err = normalize_under_root(&root, Path::new("flows/../../main.json")).unwrap_err();
        assert!(err.to_string().contains("parent directory"));
        let err = normalize_under_root(&root, Path::new("/etc/passwd")).unwrap_err();
        assert!(err.to_string().contains("absolute"));
    }

    #[test]
    fn accepts_file_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("flows")).unwrap();
        std::fs::write(dir.path().join("flows/main.json"), "{}").unwrap();
        let resolved = normalize_under_root(dir.path(), Path::new("./flows/main.json")).unwrap();
        assert!(resolved.ends_with("flows/main.json"));
    }
}
