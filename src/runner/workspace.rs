//! Per-task workspace preparation.
//!
//! Each task gets its own directory `<datasets>/<task_id>/`. If a
//! `<task_id>.zip`, `<task_id>.tar.gz`, `<task_id>.tgz` or `<task_id>.tar`
//! archive sits next to it, the archive is unpacked into that directory;
//! otherwise the directory is created empty. No task ever touches another
//! task's directory.
//!
//! Zip archives usually carry a top-level `<task_id>/` folder. When every
//! entry is under that folder the archive is unpacked into the datasets
//! directory, so its contents land in the workspace without the extra level.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Archive suffixes tried for a task, in order.
const ARCHIVE_SUFFIXES: [&str; 4] = ["zip", "tar.gz", "tgz", "tar"];

/// Errors while preparing a workspace.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("Failed to create workspace '{path}': {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to unpack archive '{path}': {source}")]
    Unpack {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// An isolated working directory owned by one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    /// Task owning this workspace.
    pub task_id: String,
    /// Root directory of the workspace.
    pub root: PathBuf,
    /// Archive the workspace was seeded from, if any.
    pub archive: Option<PathBuf>,
}

impl Workspace {
    /// Materializes the workspace for `task_id` under `datasets_dir`.
    ///
    /// Idempotent: a missing archive yields an empty directory, and an
    /// existing directory is reused.
    pub fn prepare(datasets_dir: &Path, task_id: &str) -> Result<Self, WorkspaceError> {
        let root = datasets_dir.join(task_id);
        fs::create_dir_all(&root).map_err(|source| WorkspaceError::Create {
            path: root.clone(),
            source,
        })?;

        let archive = find_archive(datasets_dir, task_id);
        match &archive {
            Some(path) => {
                unpack(path, datasets_dir, task_id).map_err(|source| WorkspaceError::Unpack {
                    path: path.clone(),
                    source,
                })?;
                info!(task_id = %task_id, archive = %path.display(), "Unpacked task archive");
            }
            None => {
                debug!(task_id = %task_id, "No archive for task, using empty workspace");
            }
        }

        Ok(Self {
            task_id: task_id.to_string(),
            root,
            archive,
        })
    }

    /// Lists files in the workspace as sorted, workspace-relative paths.
    pub fn list_files(&self) -> Vec<String> {
        list_files(&self.root)
    }
}

/// Lists regular files under `root` as sorted, `/`-separated relative paths.
pub fn list_files(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            entry
                .path()
                .strip_prefix(root)
                .ok()
                .map(|rel| rel.to_string_lossy().replace('\\', "/"))
        })
        .collect();
    files.sort();
    files
}

/// Removes per-task directories left over from a previous run.
///
/// Archives and other plain files in `datasets_dir` are kept.
pub fn clean_datasets_dir(datasets_dir: &Path) -> Result<usize, WorkspaceError> {
    if !datasets_dir.exists() {
        fs::create_dir_all(datasets_dir)?;
        return Ok(0);
    }

    let mut removed = 0;
    for entry in fs::read_dir(datasets_dir)? {
        let path = entry?.path();
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
            removed += 1;
        }
    }
    if removed > 0 {
        info!(removed, dir = %datasets_dir.display(), "Removed previous task workspaces");
    }
    Ok(removed)
}

fn find_archive(datasets_dir: &Path, task_id: &str) -> Option<PathBuf> {
    ARCHIVE_SUFFIXES
        .iter()
        .map(|suffix| datasets_dir.join(format!("{task_id}.{suffix}")))
        .find(|path| path.is_file())
}

fn unpack(archive: &Path, datasets_dir: &Path, task_id: &str) -> io::Result<()> {
    let dest = datasets_dir.join(task_id);
    let file = fs::File::open(archive)?;
    let reader: Box<dyn Read> = match archive.extension().and_then(|e| e.to_str()) {
        Some("zip") => return unpack_zip(file, datasets_dir, task_id),
        Some("tar") => Box::new(file),
        _ => Box::new(GzDecoder::new(file)),
    };
    // `unpack` refuses entries escaping `dest` through `..` or absolute paths.
    tar::Archive::new(reader).unpack(dest)
}

fn unpack_zip(file: fs::File, datasets_dir: &Path, task_id: &str) -> io::Result<()> {
    let mut archive = zip::ZipArchive::new(file).map_err(io::Error::other)?;

    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let entry = archive.by_index(index).map_err(io::Error::other)?;
        let name = entry.enclosed_name().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("entry '{}' escapes the archive root", entry.name()),
            )
        })?;
        entries.push((index, name, entry.is_dir()));
    }

    let prefixed =
        !entries.is_empty() && entries.iter().all(|(_, name, _)| name.starts_with(task_id));
    let base = if prefixed {
        datasets_dir.to_path_buf()
    } else {
        datasets_dir.join(task_id)
    };

    for (index, name, is_dir) in entries {
        let target = base.join(&name);
        if is_dir {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut entry = archive.by_index(index).map_err(io::Error::other)?;
        let mut out = fs::File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::TempDir;

    fn write_archive(path: &Path, files: &[(&str, &str)]) {
        let file = fs::File::create(path).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, name, content.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_prepare_without_archive_creates_empty_dir() {
        let datasets = TempDir::new().unwrap();
        let ws = Workspace::prepare(datasets.path(), "task-1").unwrap();
        assert!(ws.root.is_dir());
        assert!(ws.archive.is_none());
        assert!(ws.list_files().is_empty());

        // Idempotent
        let again = Workspace::prepare(datasets.path(), "task-1").unwrap();
        assert_eq!(again.root, ws.root);
    }

    #[test]
    fn test_prepare_unpacks_archive() {
        let datasets = TempDir::new().unwrap();
        write_archive(
            &datasets.path().join("task-2.tar.gz"),
            &[("list.txt", "a\nb\n"), ("src/main.py", "print(1)")],
        );

        let ws = Workspace::prepare(datasets.path(), "task-2").unwrap();
        assert_eq!(ws.archive, Some(datasets.path().join("task-2.tar.gz")));
        assert_eq!(ws.list_files(), vec!["list.txt", "src/main.py"]);
        assert_eq!(
            fs::read_to_string(ws.root.join("list.txt")).unwrap(),
            "a\nb\n"
        );
    }

    fn write_zip(path: &Path, files: &[(&str, &str)]) {
        use std::io::Write;

        let mut writer = zip::ZipWriter::new(fs::File::create(path).unwrap());
        let options = zip::write::SimpleFileOptions::default();
        for (name, content) in files {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_prepare_unpacks_zip_with_task_folder() {
        let datasets = TempDir::new().unwrap();
        write_zip(
            &datasets.path().join("t1.zip"),
            &[("t1/list.txt", "a\nb\n"), ("t1/src/app.py", "print(1)")],
        );

        let ws = Workspace::prepare(datasets.path(), "t1").unwrap();
        assert_eq!(ws.archive, Some(datasets.path().join("t1.zip")));
        assert_eq!(ws.list_files(), vec!["list.txt", "src/app.py"]);
        assert!(!datasets.path().join("t1/t1").exists());
    }

    #[test]
    fn test_prepare_unpacks_flat_zip_into_workspace() {
        let datasets = TempDir::new().unwrap();
        write_zip(&datasets.path().join("t2.zip"), &[("notes.md", "# hi")]);

        let ws = Workspace::prepare(datasets.path(), "t2").unwrap();
        assert_eq!(ws.list_files(), vec!["notes.md"]);
        assert!(!datasets.path().join("notes.md").exists());
    }

    #[test]
    fn test_zip_does_not_leak_into_sibling_task() {
        let datasets = TempDir::new().unwrap();
        // `t10/` is not under `t1/`, so the archive is treated as flat.
        write_zip(
            &datasets.path().join("t1.zip"),
            &[("t1/a.txt", "a"), ("t10/b.txt", "b")],
        );

        let ws = Workspace::prepare(datasets.path(), "t1").unwrap();
        assert_eq!(ws.list_files(), vec!["t1/a.txt", "t10/b.txt"]);
        assert!(!datasets.path().join("t10").exists());
    }

    #[test]
    fn test_prepare_corrupt_zip_fails() {
        let datasets = TempDir::new().unwrap();
        fs::write(datasets.path().join("bad.zip"), b"not a zip").unwrap();
        let err = Workspace::prepare(datasets.path(), "bad").unwrap_err();
        assert!(matches!(err, WorkspaceError::Unpack { .. }));
    }

    #[test]
    fn test_prepare_corrupt_archive_fails() {
        let datasets = TempDir::new().unwrap();
        fs::write(datasets.path().join("bad.tgz"), b"not an archive").unwrap();
        let err = Workspace::prepare(datasets.path(), "bad").unwrap_err();
        assert!(matches!(err, WorkspaceError::Unpack { .. }));
    }

    #[test]
    fn test_clean_datasets_dir_keeps_archives() {
        let datasets = TempDir::new().unwrap();
        fs::create_dir_all(datasets.path().join("old-task/nested")).unwrap();
        fs::write(datasets.path().join("keep.tar.gz"), b"x").unwrap();

        let removed = clean_datasets_dir(datasets.path()).unwrap();
        assert_eq!(removed, 1);
        assert!(!datasets.path().join("old-task").exists());
        assert!(datasets.path().join("keep.tar.gz").exists());
    }

    #[test]
    fn test_clean_datasets_dir_creates_missing() {
        let root = TempDir::new().unwrap();
        let datasets = root.path().join("datasets");
        assert_eq!(clean_datasets_dir(&datasets).unwrap(), 0);
        assert!(datasets.is_dir());
    }
}
