// Timestamped zip backups of settings files, taken before overwriting them.
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::write::FileOptions;

use crate::error::{Error, Result};

/// Zip `target` (a single file, or every file under a directory) into
/// `<name>_<YYYYmmdd-HHMMSS>.zip` next to it. Returns the archive path.
pub fn backup_path(target: &Path) -> Result<PathBuf> {
    if !target.exists() {
        return Err(Error::io(
            target.display().to_string(),
            io::Error::from(io::ErrorKind::NotFound),
        ));
    }
    let parent = target.parent().unwrap_or(Path::new("."));
    let name = target
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("settings");
    let ts = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let dest = parent.join(format!("{}_{}.zip", name, ts));

    let file = fs::File::create(&dest).map_err(|e| Error::io(dest.display().to_string(), e))?;
    let mut zip = zip::ZipWriter::new(file);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    if target.is_dir() {
        for entry in WalkDir::new(target) {
            let entry = entry.map_err(|e| Error::Backup(e.to_string()))?;
            let path = entry.path();
            let Ok(rel) = path.strip_prefix(target) else {
                continue;
            };
            if rel.as_os_str().is_empty() {
                continue;
            }
            let entry_name = rel.to_string_lossy().replace('\\', "/");
            if path.is_dir() {
                zip.add_directory(entry_name, options)
                    .map_err(|e| Error::Backup(e.to_string()))?;
            } else {
                add_file(&mut zip, path, &entry_name, options)?;
            }
        }
    } else {
        add_file(&mut zip, target, name, options)?;
    }
    zip.finish().map_err(|e| Error::Backup(e.to_string()))?;
    info!(source = %target.display(), archive = %dest.display(), "wrote backup");
    Ok(dest)
}

/// Back up `target` if it exists; a missing file has nothing to preserve.
pub fn backup_if_exists(target: &Path) -> Result<Option<PathBuf>> {
    if !target.exists() {
        warn!(path = %target.display(), "nothing to back up");
        return Ok(None);
    }
    backup_path(target).map(Some)
}

fn add_file(
    zip: &mut zip::ZipWriter<fs::File>,
    path: &Path,
    entry_name: &str,
    options: FileOptions,
) -> Result<()> {
    let data = fs::read(path).map_err(|e| Error::io(path.display().to_string(), e))?;
    zip.start_file(entry_name, options)
        .map_err(|e| Error::Backup(e.to_string()))?;
    zip.write_all(&data)
        .map_err(|e| Error::Backup(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backs_up_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let f = dir.path().join("com.example.plist");
        fs::write(&f, b"bplist00").unwrap();
        let zip = backup_path(&f).unwrap();
        assert!(zip.exists());
        assert_eq!(zip.parent(), Some(dir.path()));
        let name = zip.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("com.example.plist_"), "{name}");
        assert!(name.ends_with(".zip"));
    }

    #[test]
    fn backs_up_directory_tree() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = dir.path().join("prefs");
        fs::create_dir_all(prefs.join("nested")).unwrap();
        fs::write(prefs.join("a.plist"), b"a").unwrap();
        fs::write(prefs.join("nested/b.json"), b"{}").unwrap();
        let zip = backup_path(&prefs).unwrap();
        assert!(zip.exists());
        assert!(fs::metadata(&zip).unwrap().len() > 0);
    }

    #[test]
    fn missing_target() {
        let dir = tempfile::tempdir().unwrap();
        let absent = dir.path().join("nope.plist");
        assert!(matches!(backup_path(&absent), Err(Error::Io { .. })));
        assert_eq!(backup_if_exists(&absent).unwrap(), None);
    }
}
