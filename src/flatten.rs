//! Relocate the contents of a subdirectory into the repository root.
//!
//! Every entry is checked before anything moves, and moves that already
//! happened are undone if a later one fails. When the undo itself fails the
//! error names every entry left out of place.
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

const BACKUP_PREFIX: &str = ".reroot-backup-";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FlattenOutcome {
    /// The subdirectory was not present; nothing to do.
    Skipped { subdir: String },
    /// Entries moved to the root, sorted by name.
    Flattened {
        subdir: String,
        moved: Vec<String>,
        /// Root files that were replaced by an entry of the same name.
        #[serde(skip_serializing_if = "Vec::is_empty")]
        replaced: Vec<String>,
    },
}

impl FlattenOutcome {
    pub fn moved(&self) -> &[String] {
        match self {
            FlattenOutcome::Skipped { .. } => &[],
            FlattenOutcome::Flattened { moved, .. } => moved,
        }
    }

    pub fn replaced(&self) -> &[String] {
        match self {
            FlattenOutcome::Skipped { .. } => &[],
            FlattenOutcome::Flattened { replaced, .. } => replaced,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Conflict {
    SameNameAsSubdir(String),
    ExistsAtRoot(String),
    DirectoryAtRoot(String),
}

impl Conflict {
    fn describe(&self) -> String {
        match self {
            Conflict::SameNameAsSubdir(name) => {
                format!("{name}: has the same name as the directory being flattened")
            }
            Conflict::ExistsAtRoot(name) => {
                format!("{name}: already exists at the root (--overwrite replaces it)")
            }
            Conflict::DirectoryAtRoot(name) => {
                format!("{name}: a directory with this name already exists at the root")
            }
        }
    }
}

/// Result of checking every entry against the root before moving.
#[derive(Debug, Default)]
struct Preflight {
    conflicts: Vec<Conflict>,
    replace: Vec<OsString>,
}

/// Move every entry of `<repo_root>/<subdir>` (dotfiles included) to
/// `repo_root`, then remove the emptied directory.
///
/// With `overwrite`, a root file or symlink that shares a name with an entry
/// is moved into a backup directory first. The backup is restored if the
/// flatten is rolled back and deleted once it succeeds.
pub fn flatten_subdir(repo_root: &Path, subdir: &str, overwrite: bool) -> Result<FlattenOutcome> {
    let start = Instant::now();
    let source = repo_root.join(subdir);
    let metadata = match fs::symlink_metadata(&source) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(subdir, "subdirectory not found; skipping move");
            return Ok(FlattenOutcome::Skipped {
                subdir: subdir.to_string(),
            });
        }
        Err(err) => {
            return Err(err).with_context(|| format!("inspect {}", source.display()));
        }
    };
    if !metadata.is_dir() {
        return Err(anyhow!(
            "{} exists but is not a directory",
            source.display()
        ));
    }

    let entries = list_entries(&source)?;
    let preflight = check_entries(repo_root, subdir, &entries, overwrite);
    if !preflight.conflicts.is_empty() {
        let details = preflight
            .conflicts
            .iter()
            .map(Conflict::describe)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(anyhow!(
            "refusing to flatten {}: {details}",
            source.display()
        ));
    }

    let backup_dir = if preflight.replace.is_empty() {
        None
    } else {
        let dir = tempfile::Builder::new()
            .prefix(BACKUP_PREFIX)
            .tempdir_in(repo_root)
            .with_context(|| format!("create backup directory in {}", repo_root.display()))?;
        Some(dir)
    };

    // Every rename in order; a replaced root file contributes its backup
    // rename just before the entry that takes its place.
    let mut moved: Vec<(PathBuf, PathBuf)> = Vec::new();
    let mut failure = None;
    for name in &entries {
        let from = source.join(name);
        let to = repo_root.join(name);
        if let (Some(dir), true) = (&backup_dir, preflight.replace.contains(name)) {
            let backup = dir.path().join(name);
            if let Err(err) =
                fs::rename(&to, &backup).with_context(|| format!("back up {}", to.display()))
            {
                failure = Some(err);
                break;
            }
            tracing::debug!(
                path = %to.display(),
                backup = %backup.display(),
                "backed up root entry"
            );
            moved.push((to.clone(), backup));
        }
        if let Err(err) =
            fs::rename(&from, &to).with_context(|| format!("move {}", from.display()))
        {
            failure = Some(err);
            break;
        }
        tracing::debug!(from = %from.display(), to = %to.display(), "moved entry");
        moved.push((from, to));
    }
    if failure.is_none() {
        if let Err(err) =
            fs::remove_dir(&source).with_context(|| format!("remove {}", source.display()))
        {
            failure = Some(err);
        }
    }
    if let Some(err) = failure {
        let unrestored = rollback_moves(&moved);
        if unrestored.is_empty() {
            return Err(err);
        }
        let kept = backup_dir.map(|dir| dir.into_path());
        return Err(incomplete_rollback(err, &unrestored, kept.as_deref()));
    }

    let moved_names: Vec<String> = entries
        .iter()
        .map(|name| name.to_string_lossy().into_owned())
        .collect();
    let replaced: Vec<String> = preflight
        .replace
        .iter()
        .map(|name| name.to_string_lossy().into_owned())
        .collect();
    if let Some(dir) = backup_dir {
        let path = dir.path().to_path_buf();
        dir.close()
            .with_context(|| format!("remove backup directory {}", path.display()))?;
    }
    tracing::info!(
        elapsed_ms = start.elapsed().as_millis(),
        entries = moved_names.len(),
        replaced = replaced.len(),
        subdir,
        "flatten complete"
    );
    Ok(FlattenOutcome::Flattened {
        subdir: subdir.to_string(),
        moved: moved_names,
        replaced,
    })
}

/// `read_dir` never yields `.` or `..`, so this is every entry including
/// dotfiles.
fn list_entries(dir: &Path) -> Result<Vec<OsString>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
        names.push(entry.file_name());
    }
    names.sort();
    Ok(names)
}

fn check_entries(
    repo_root: &Path,
    subdir: &str,
    entries: &[OsString],
    overwrite: bool,
) -> Preflight {
    let mut preflight = Preflight::default();
    for name in entries {
        let display = name.to_string_lossy().into_owned();
        if name.as_os_str() == subdir {
            preflight.conflicts.push(Conflict::SameNameAsSubdir(display));
            continue;
        }
        // symlink_metadata so a symlink to a directory counts as a file.
        let Ok(existing) = fs::symlink_metadata(repo_root.join(name)) else {
            continue;
        };
        if existing.is_dir() {
            preflight.conflicts.push(Conflict::DirectoryAtRoot(display));
        } else if overwrite {
            preflight.replace.push(name.clone());
        } else {
            preflight.conflicts.push(Conflict::ExistsAtRoot(display));
        }
    }
    preflight
}

/// Undo `moved` in reverse order. Returns a description of every entry that
/// could not be put back.
fn rollback_moves(moved: &[(PathBuf, PathBuf)]) -> Vec<String> {
    let mut unrestored = Vec::new();
    for (from, to) in moved.iter().rev() {
        if let Some(parent) = from.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                unrestored.push(format!(
                    "{} (recreate {}: {err})",
                    to.display(),
                    parent.display()
                ));
                continue;
            }
        }
        if let Err(err) = fs::rename(to, from) {
            tracing::warn!(
                path = %to.display(),
                error = %err,
                "failed to restore entry during rollback"
            );
            unrestored.push(format!("{} -> {} ({err})", to.display(), from.display()));
        }
    }
    unrestored
}

fn incomplete_rollback(
    err: anyhow::Error,
    unrestored: &[String],
    backups: Option<&Path>,
) -> anyhow::Error {
    let mut message = format!("{err:#}; rollback incomplete: {}", unrestored.join("; "));
    if let Some(dir) = backups {
        message.push_str(&format!("; backups kept in {}", dir.display()));
    }
    anyhow!(message)
}
