use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Files directly under `dir` (and below it when `recursive`) that match
/// `predicate`, sorted by path. Fails only if `dir` itself cannot be read.
///
/// Unreadable entries and subdirectories are logged and skipped. Symlinked
/// files are listed; symlinked directories are not entered.
pub fn list_files<F>(dir: &Path, recursive: bool, predicate: &F) -> io::Result<Vec<PathBuf>>
where
    F: Fn(&Path) -> bool + ?Sized,
{
    let mut result = Vec::new();
    let entries = fs::read_dir(dir)?;
    collect_files(entries, recursive, predicate, &mut result);
    result.sort();
    Ok(result)
}

fn collect_files<F>(entries: fs::ReadDir, recursive: bool, predicate: &F, result: &mut Vec<PathBuf>)
where
    F: Fn(&Path) -> bool + ?Sized,
{
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable directory entry: {}", e);
                continue;
            }
        };
        let entry_path = entry.path();
        let is_symlink = entry.file_type().is_ok_and(|t| t.is_symlink());
        if entry_path.is_file() {
            if predicate(&entry_path) {
                result.push(entry_path);
            }
        } else if recursive && !is_symlink && entry_path.is_dir() {
            match fs::read_dir(&entry_path) {
                Ok(nested) => collect_files(nested, recursive, predicate, result),
                Err(e) => log::warn!("Skipping directory '{}': {}", entry_path.display(), e),
            }
        }
    }
}

/// Directory containing the running executable.
pub fn executable_dir() -> io::Result<PathBuf> {
    let exe = std::env::current_exe()?;
    exe.parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "executable has no parent directory"))
}
