//! Isolated working copy of the target tree.
//!
//! Every run copies the target directory into a freshly named folder under
//! the configured sandbox root. All later file access goes through
//! [`Sandbox`], which rejects any path that does not resolve inside the copy.
//!
//! # Example
//!
//! ```rust,ignore
//! use refactor_swarm::sandbox::Sandbox;
//!
//! let sandbox = Sandbox::materialize("./project", "./sandbox")?;
//! let text = sandbox.read_file("app.py")?;
//! let files = BTreeMap::from([(PathBuf::from("app.py"), text.replace("\t", "    "))]);
//! sandbox.write_batch(&files)?;
//! ```

use crate::config::default_ignore_dirs;
use crate::error::{IntoSwarmError, Result, SwarmError};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Directory inside the sandbox holding run metadata (audit log).
pub const METADATA_DIR: &str = ".swarm";

/// Handle on a materialized sandbox.
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
    source: PathBuf,
}

impl Sandbox {
    /// Copy `target_dir` into a uniquely named directory under `sandbox_root`.
    ///
    /// # Errors
    ///
    /// Returns [`SwarmError::InvalidTarget`] if the target is not a directory
    /// and [`SwarmError::SandboxSetup`] if the copy cannot be created.
    pub fn materialize(target_dir: impl AsRef<Path>, sandbox_root: impl AsRef<Path>) -> Result<Self> {
        let target_dir = target_dir.as_ref();
        if !target_dir.is_dir() {
            return Err(SwarmError::InvalidTarget {
                path: target_dir.to_path_buf(),
            });
        }
        let source = target_dir.canonicalize().into_swarm_sandbox(target_dir)?;

        fs::create_dir_all(sandbox_root.as_ref()).into_swarm_sandbox(&source)?;
        let sandbox_root = sandbox_root
            .as_ref()
            .canonicalize()
            .into_swarm_sandbox(&source)?;

        let project_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string());
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let root = sandbox_root.join(format!("{}_{}", project_name, &run_id[..8]));

        if root.exists() {
            fs::remove_dir_all(&root).into_swarm_sandbox(&source)?;
        }

        // A sandbox root nested in the target must not be copied into itself.
        let skip = sandbox_root.starts_with(&source).then_some(sandbox_root.as_path());
        copy_tree(&source, &root, skip).into_swarm_sandbox(&source)?;
        info!("Mirrored {} -> {}", source.display(), root.display());

        Ok(Self { root, source })
    }

    /// Adopt an existing directory as a sandbox without copying.
    ///
    /// # Errors
    ///
    /// Returns [`SwarmError::SandboxSetup`] if the directory cannot be resolved.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root
            .as_ref()
            .canonicalize()
            .into_swarm_sandbox(root.as_ref())?;
        Ok(Self {
            source: root.clone(),
            root,
        })
    }

    /// Canonical sandbox root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Canonical directory the sandbox was copied from.
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Run metadata directory inside the sandbox.
    #[must_use]
    pub fn metadata_dir(&self) -> PathBuf {
        self.root.join(METADATA_DIR)
    }

    /// Resolve `path` (absolute, or relative to the root) and check containment.
    ///
    /// # Errors
    ///
    /// Returns [`SwarmError::PathViolation`] when the path escapes the root.
    pub fn resolve(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        if !is_within(&joined, &self.root) {
            return Err(SwarmError::path_violation(joined, &self.root));
        }
        canonicalize_lenient(&joined).ok_or_else(|| SwarmError::path_violation(joined, &self.root))
    }

    /// Read a file inside the sandbox.
    pub fn read_file(&self, path: impl AsRef<Path>) -> Result<String> {
        let resolved = self.resolve(path)?;
        Ok(fs::read_to_string(resolved)?)
    }

    /// Write several files as one unit.
    ///
    /// Every path is checked before anything touches disk. If any write
    /// fails, files already written are restored to their previous content
    /// (or removed if they did not exist) and the error is returned.
    pub fn write_batch(&self, files: &BTreeMap<PathBuf, String>) -> Result<Vec<PathBuf>> {
        let resolved: Vec<(PathBuf, &String)> = files
            .iter()
            .map(|(path, content)| self.resolve(path).map(|p| (p, content)))
            .collect::<Result<_>>()?;

        let mut previous: Vec<(PathBuf, Option<String>)> = Vec::with_capacity(resolved.len());
        for (path, content) in &resolved {
            let prior = fs::read_to_string(path).ok();
            if let Err(e) = write_replacing(path, content) {
                warn!("Write to {} failed, rolling back batch: {}", path.display(), e);
                rollback(&previous);
                return Err(e.into());
            }
            previous.push((path.clone(), prior));
        }

        Ok(resolved.into_iter().map(|(p, _)| p).collect())
    }

    /// All `.py` files in the sandbox, sorted, skipping tool and VCS directories.
    #[must_use]
    pub fn python_files(&self) -> Vec<PathBuf> {
        discover_python_files(&self.root)
    }
}

/// Check that `path` resolves strictly inside `root`.
///
/// Both paths are canonicalized; a path that does not exist yet is judged by
/// its deepest existing ancestor. `..` components in the non-existent part
/// are rejected.
#[must_use]
pub fn is_within(path: &Path, root: &Path) -> bool {
    let (Some(path), Ok(root)) = (canonicalize_lenient(path), root.canonicalize()) else {
        return false;
    };
    path.starts_with(&root) && path != root
}

fn canonicalize_lenient(path: &Path) -> Option<PathBuf> {
    if let Ok(canonical) = path.canonicalize() {
        return Some(canonical);
    }

    let mut missing = Vec::new();
    let mut current = path;
    loop {
        let name = current.file_name()?;
        missing.push(name.to_os_string());
        current = current.parent()?;
        if let Ok(base) = current.canonicalize() {
            let mut resolved = base;
            for part in missing.iter().rev() {
                resolved.push(part);
            }
            return Some(resolved);
        }
        if current
            .components()
            .last()
            .is_some_and(|c| matches!(c, Component::ParentDir))
        {
            return None;
        }
    }
}

fn write_replacing(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.swarm-tmp", file_name));
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path).inspect_err(|_| {
        let _ = fs::remove_file(&tmp);
    })
}

fn rollback(written: &[(PathBuf, Option<String>)]) {
    for (path, prior) in written.iter().rev() {
        let restored = match prior {
            Some(content) => write_replacing(path, content),
            None => fs::remove_file(path).or_else(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Ok(())
                } else {
                    Err(e)
                }
            }),
        };
        if let Err(e) = restored {
            warn!("Failed to restore {}: {}", path.display(), e);
        }
    }
}

fn copy_tree(source: &Path, dest: &Path, skip: Option<&Path>) -> std::io::Result<()> {
    fs::create_dir_all(dest)?;
    let walker = WalkDir::new(source)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| skip.is_none_or(|s| !e.path().starts_with(s)));

    for entry in walker {
        let entry = entry.map_err(std::io::Error::other)?;
        let relative = match entry.path().strip_prefix(source) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel,
            _ => continue,
        };
        let target = dest.join(relative);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target)?;
        } else if file_type.is_symlink() {
            // Linked files become plain copies; linked directories are left out.
            match fs::metadata(entry.path()) {
                Ok(meta) if meta.is_file() => {
                    fs::copy(entry.path(), &target)?;
                    debug!("Copied symlink target of {}", entry.path().display());
                }
                Ok(_) => warn!(
                    "Skipping symlinked directory {} in sandbox copy",
                    entry.path().display()
                ),
                Err(e) => warn!("Skipping broken symlink {}: {}", entry.path().display(), e),
            }
        } else {
            warn!("Skipping non-regular entry {}", entry.path().display());
        }
    }
    Ok(())
}

/// All `.py` files under `root`, sorted.
#[must_use]
pub fn discover_python_files(root: &Path) -> Vec<PathBuf> {
    let ignore = default_ignore_dirs();
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !e.file_type().is_dir()
                || !ignore.contains(&*e.file_name().to_string_lossy())
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "py"))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("app.py"), "import util\n").unwrap();
        fs::create_dir_all(temp.path().join("pkg")).unwrap();
        fs::write(temp.path().join("pkg/util.py"), "X = 1\n").unwrap();
        fs::write(temp.path().join("README.md"), "# demo\n").unwrap();
        temp
    }

    #[test]
    fn test_materialize_copies_tree() {
        let target = project();
        let roots = TempDir::new().unwrap();

        let sandbox = Sandbox::materialize(target.path(), roots.path()).unwrap();
        assert!(sandbox.root().starts_with(roots.path().canonicalize().unwrap()));
        assert!(sandbox.root().join("app.py").exists());
        assert!(sandbox.root().join("pkg/util.py").exists());
        assert!(sandbox.root().join("README.md").exists());

        let name = sandbox.root().file_name().unwrap().to_string_lossy().into_owned();
        let project_name = target.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(&format!("{}_", project_name)));
        assert_eq!(name.len(), project_name.len() + 9);
    }

    #[test]
    fn test_materialize_twice_gives_distinct_roots() {
        let target = project();
        let roots = TempDir::new().unwrap();
        let a = Sandbox::materialize(target.path(), roots.path()).unwrap();
        let b = Sandbox::materialize(target.path(), roots.path()).unwrap();
        assert_ne!(a.root(), b.root());
    }

    #[test]
    fn test_materialize_missing_target() {
        let roots = TempDir::new().unwrap();
        let err = Sandbox::materialize(roots.path().join("nope"), roots.path()).unwrap_err();
        assert!(matches!(err, SwarmError::InvalidTarget { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_materialize_sandbox_root_inside_target() {
        let target = project();
        let inner_root = target.path().join("sandbox");
        let sandbox = Sandbox::materialize(target.path(), &inner_root).unwrap();
        assert!(sandbox.root().join("app.py").exists());
        assert!(!sandbox.root().join("sandbox").exists());
    }

    #[test]
    fn test_originals_untouched_by_writes() {
        let target = project();
        let roots = TempDir::new().unwrap();
        let sandbox = Sandbox::materialize(target.path(), roots.path()).unwrap();

        let files = BTreeMap::from([(PathBuf::from("app.py"), "print('changed')\n".to_string())]);
        sandbox.write_batch(&files).unwrap();
        assert_eq!(sandbox.read_file("app.py").unwrap(), "print('changed')\n");
        assert_eq!(
            fs::read_to_string(target.path().join("app.py")).unwrap(),
            "import util\n"
        );
    }

    #[test]
    fn test_path_violations_rejected() {
        let target = project();
        let sandbox = Sandbox::open(target.path()).unwrap();

        let err = sandbox.read_file("../outside.py").unwrap_err();
        assert!(matches!(err, SwarmError::PathViolation { .. }));
        assert!(sandbox.resolve("/etc/passwd").is_err());
        assert!(sandbox.resolve("new/../../escape.py").is_err());
        assert!(sandbox.resolve(".").is_err());
        assert_eq!(
            sandbox.resolve("pkg/new.py").unwrap(),
            sandbox.root().join("pkg/new.py")
        );
    }

    #[test]
    fn test_is_within() {
        let target = project();
        let root = target.path();
        assert!(is_within(&root.join("app.py"), root));
        assert!(is_within(&root.join("not/yet/created.py"), root));
        assert!(!is_within(&root.join("../x.py"), root));
        assert!(!is_within(root, root));
        assert!(!is_within(Path::new("/"), root));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_rejected() {
        let target = project();
        let outside = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), target.path().join("link")).unwrap();
        let sandbox = Sandbox::open(target.path()).unwrap();
        let files = BTreeMap::from([(PathBuf::from("link/evil.py"), "x".to_string())]);
        assert!(sandbox.write_batch(&files).is_err());
        assert!(!outside.path().join("evil.py").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_materialize_copies_symlinked_files() {
        let target = project();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("shared.py"), "SHARED = True\n").unwrap();
        std::os::unix::fs::symlink(outside.path().join("shared.py"), target.path().join("shared.py"))
            .unwrap();
        std::os::unix::fs::symlink(outside.path(), target.path().join("vendor")).unwrap();
        std::os::unix::fs::symlink(target.path().join("gone.py"), target.path().join("dangling.py"))
            .unwrap();
        let roots = TempDir::new().unwrap();

        let sandbox = Sandbox::materialize(target.path(), roots.path()).unwrap();
        let copied = sandbox.root().join("shared.py");
        assert!(!fs::symlink_metadata(&copied).unwrap().file_type().is_symlink());
        assert_eq!(sandbox.read_file("shared.py").unwrap(), "SHARED = True\n");
        assert!(!sandbox.root().join("vendor").exists());
        assert!(!sandbox.root().join("dangling.py").exists());

        let files = BTreeMap::from([(PathBuf::from("shared.py"), "SHARED = False\n".to_string())]);
        sandbox.write_batch(&files).unwrap();
        assert_eq!(
            fs::read_to_string(outside.path().join("shared.py")).unwrap(),
            "SHARED = True\n"
        );
    }

    #[test]
    fn test_write_batch_writes_all() {
        let target = project();
        let sandbox = Sandbox::open(target.path()).unwrap();
        let files = BTreeMap::from([
            (PathBuf::from("app.py"), "A = 1\n".to_string()),
            (PathBuf::from("tests/test_app.py"), "def test_a(): pass\n".to_string()),
        ]);
        let written = sandbox.write_batch(&files).unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(sandbox.read_file("app.py").unwrap(), "A = 1\n");
        assert!(sandbox.root().join("tests/test_app.py").exists());
    }

    #[test]
    fn test_write_batch_rejects_before_writing() {
        let target = project();
        let sandbox = Sandbox::open(target.path()).unwrap();
        let files = BTreeMap::from([
            (PathBuf::from("app.py"), "A = 1\n".to_string()),
            (PathBuf::from("../escape.py"), "x".to_string()),
        ]);
        assert!(sandbox.write_batch(&files).is_err());
        assert_eq!(sandbox.read_file("app.py").unwrap(), "import util\n");
    }

    #[test]
    fn test_write_batch_rolls_back_on_io_failure() {
        let target = project();
        let sandbox = Sandbox::open(target.path()).unwrap();
        // A directory where a file should go makes the rename fail.
        fs::create_dir_all(target.path().join("zz_blocker.py/inner")).unwrap();
        let files = BTreeMap::from([
            (PathBuf::from("app.py"), "A = 1\n".to_string()),
            (PathBuf::from("zz_blocker.py"), "x".to_string()),
        ]);
        assert!(sandbox.write_batch(&files).is_err());
        assert_eq!(sandbox.read_file("app.py").unwrap(), "import util\n");
    }

    #[test]
    fn test_python_file_discovery() {
        let target = project();
        fs::create_dir_all(target.path().join("__pycache__")).unwrap();
        fs::write(target.path().join("__pycache__/app.py"), "").unwrap();
        fs::create_dir_all(target.path().join(".swarm")).unwrap();
        fs::write(target.path().join(".swarm/x.py"), "").unwrap();

        let sandbox = Sandbox::open(target.path()).unwrap();
        let files = sandbox.python_files();
        let root = sandbox.root();
        assert_eq!(files, vec![root.join("app.py"), root.join("pkg/util.py")]);
    }
}
