use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, info_span, warn};
use walkdir::WalkDir;

use crate::db::{CacheIndex, CacheLookup, JobRunStatus};
use crate::model::{JobKey, OutputSet};
use crate::services::error::{PipelineError, PipelineResult};
use crate::services::runner::record_job_run;

pub const STAGE: &str = "import";

/// Output name of the imported directory.
pub const IMPORTED: &str = "imported";

/// Copy the tree at `src` into `dest`, once per (src, dest) pair.
///
/// Files are copied into a sibling `<dest>.partial` directory and synced; the
/// directory is renamed into place and only then recorded in the cache index.
/// A partial directory left by an interrupted run is discarded and the copy
/// restarts from scratch. `dest` and its partial sibling are skipped if they
/// sit inside `src`.
pub fn import_directory(cache: &CacheIndex, src: &Path, dest: &Path) -> PipelineResult<OutputSet> {
    let job_key = JobKey::new(STAGE, [src.display().to_string(), dest.display().to_string()]);
    let span = info_span!("stage", stage = STAGE);
    let _guard = span.enter();
    let started_at = Utc::now().to_rfc3339();

    match cache.lookup(&job_key)? {
        CacheLookup::Hit(outputs) => {
            info!(src = %src.display(), "Directory already imported");
            record_job_run(cache, &job_key, STAGE, JobRunStatus::Cached, None, &started_at);
            return Ok(outputs);
        }
        CacheLookup::Corrupt { reason } => {
            let err = PipelineError::CacheCorruption { job_key: job_key.to_string(), reason };
            warn!(error = %err, "Discarding import record and copying again");
            cache.remove(&job_key)?;
        }
        CacheLookup::Miss => {}
    }

    if let Err(e) = copy_into_place(src, dest) {
        record_job_run(cache, &job_key, STAGE, JobRunStatus::Failed, None, &started_at);
        return Err(e);
    }

    let mut outputs = OutputSet::new();
    outputs.insert(IMPORTED, dest);
    outputs.set_default(IMPORTED);
    cache.put(&job_key, &outputs)?;
    record_job_run(cache, &job_key, STAGE, JobRunStatus::Executed, None, &started_at);
    info!(src = %src.display(), dest = %dest.display(), "Imported directory");
    Ok(outputs)
}

fn copy_into_place(src: &Path, dest: &Path) -> PipelineResult<()> {
    if !src.is_dir() {
        return Err(PipelineError::StageExecutionFailure {
            stage: STAGE.to_string(),
            reason: format!("{} is not a directory", src.display()),
        });
    }

    let partial = partial_path(dest);
    if partial.exists() {
        debug!(path = %partial.display(), "Discarding interrupted import");
        fs::remove_dir_all(&partial)?;
    }
    fs::create_dir_all(&partial)?;

    let src = src.canonicalize()?;
    let skip: Vec<PathBuf> =
        [dest, partial.as_path()].iter().filter_map(|p| p.canonicalize().ok()).collect();
    copy_tree(&src, &partial, &skip)?;

    if dest.exists() {
        fs::remove_dir_all(dest)?;
    }
    fs::rename(&partial, dest)?;
    Ok(())
}

/// Links are copied as links, never followed.
fn copy_tree(from: &Path, to: &Path, skip: &[PathBuf]) -> PipelineResult<()> {
    let walker = WalkDir::new(from)
        .follow_links(false)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| !skip.iter().any(|s| s == entry.path()));

    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        let Ok(relative) = entry.path().strip_prefix(from) else {
            continue;
        };
        let target = to.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target)?;
            fs::File::open(&target)?.sync_all()?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            debug!(path = %entry.path().display(), "Skipping special file");
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(link: &Path, target: &Path) -> PipelineResult<()> {
    std::os::unix::fs::symlink(fs::read_link(link)?, target)?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, _target: &Path) -> PipelineResult<()> {
    debug!(path = %link.display(), "Skipping symbolic link");
    Ok(())
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(OsString::from).unwrap_or_else(|| OsString::from("import"));
    name.push(".partial");
    dest.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn seed_source(root: &Path) {
        fs::create_dir_all(root.join("specs")).unwrap();
        fs::write(root.join("main.c"), "int main() { return 0; }\n").unwrap();
        fs::write(root.join("specs/main.spec"), "Globals:\n").unwrap();
    }

    #[test]
    fn copies_tree_and_records_completion() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        seed_source(&src);
        let cache = CacheIndex::open(&dir.path().join("cache.db")).unwrap();
        let dest = dir.path().join("stage/source");

        let outputs = import_directory(&cache, &src, &dest).unwrap();
        assert_eq!(outputs.default_path(), Some(dest.as_path()));
        assert_eq!(fs::read_to_string(dest.join("specs/main.spec")).unwrap(), "Globals:\n");
        assert!(!partial_path(&dest).exists());
        assert_eq!(cache.job_keys().unwrap().len(), 1);
    }

    #[test]
    fn second_import_is_served_from_cache() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        seed_source(&src);
        let cache = CacheIndex::open(&dir.path().join("cache.db")).unwrap();
        let dest = dir.path().join("source");

        import_directory(&cache, &src, &dest).unwrap();
        fs::write(src.join("late.c"), "").unwrap();
        import_directory(&cache, &src, &dest).unwrap();

        assert!(!dest.join("late.c").exists());
        let runs = cache.list_job_runs(Some(STAGE)).unwrap();
        let statuses: Vec<_> = runs.iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![JobRunStatus::Executed, JobRunStatus::Cached]);
    }

    #[test]
    fn leftover_partial_directory_is_discarded() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        seed_source(&src);
        let cache = CacheIndex::open(&dir.path().join("cache.db")).unwrap();
        let dest = dir.path().join("source");

        let partial = partial_path(&dest);
        fs::create_dir_all(&partial).unwrap();
        fs::write(partial.join("torn.c"), "int ma").unwrap();

        import_directory(&cache, &src, &dest).unwrap();
        assert!(!dest.join("torn.c").exists());
        assert!(dest.join("main.c").is_file());
    }

    #[test]
    fn destination_inside_source_is_not_copied_into_itself() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("project");
        seed_source(&src);
        let cache = CacheIndex::open(&dir.path().join("cache.db")).unwrap();
        let dest = src.join("source");

        import_directory(&cache, &src, &dest).unwrap();
        assert!(dest.join("main.c").is_file());
        assert!(!dest.join("source").exists());
        assert!(!dest.join("source.partial").exists());
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_copied_without_being_followed() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        seed_source(&src);
        std::os::unix::fs::symlink("..", src.join("up")).unwrap();
        std::os::unix::fs::symlink("main.c", src.join("entry.c")).unwrap();
        let cache = CacheIndex::open(&dir.path().join("cache.db")).unwrap();
        let dest = dir.path().join("source");

        import_directory(&cache, &src, &dest).unwrap();
        assert_eq!(fs::read_link(dest.join("up")).unwrap(), PathBuf::from(".."));
        let entry = fs::read_to_string(dest.join("entry.c")).unwrap();
        assert_eq!(entry, "int main() { return 0; }\n");
        assert!(dest.join("specs/main.spec").is_file());
    }

    #[test]
    fn missing_source_fails_without_recording() {
        let dir = tempdir().unwrap();
        let cache = CacheIndex::open(&dir.path().join("cache.db")).unwrap();
        let err = import_directory(&cache, &dir.path().join("nope"), &dir.path().join("source"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::StageExecutionFailure { .. }));
        assert!(cache.job_keys().unwrap().is_empty());
    }
}
