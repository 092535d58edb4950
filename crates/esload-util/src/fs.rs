use std::fs;
use std::io::{self, ErrorKind};
use std::path::Path;
use walkdir::WalkDir;

/// Hardlink every file under `from` into `to`, recreating the directory structure.
///
/// Directories are created, never linked, so the new tree can be listed and
/// extended independently of the source. Only regular files are hardlinked;
/// symlinks and special files are skipped.
///
/// Returns the number of files linked.
///
/// # Errors
/// Returns an error if a directory cannot be created or a file cannot be linked.
pub fn hard_link_dir_recursive(from: &Path, to: &Path) -> io::Result<usize> {
    fs::create_dir_all(to)?;

    let mut linked = 0;
    for entry in WalkDir::new(from).min_depth(1).follow_links(false) {
        let entry = entry.map_err(|e| {
            let msg = e.to_string();
            e.into_io_error()
                .unwrap_or_else(|| io::Error::new(ErrorKind::Other, msg))
        })?;

        let rel = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| io::Error::new(ErrorKind::Other, e))?;
        let dest = to.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&dest)?;
        } else if file_type.is_file() {
            hard_link_file(entry.path(), &dest)?;
            linked += 1;
        }
    }

    Ok(linked)
}

/// Hardlink a single file, replacing a stale destination if one exists.
fn hard_link_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::hard_link(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            match fs::remove_file(to) {
                Ok(()) => {}
                // Someone else removed it first; fall through and relink.
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
            match fs::hard_link(from, to) {
                Err(e) if e.kind() != ErrorKind::AlreadyExists => Err(e),
                _ => Ok(()),
            }
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_hard_link_tree() {
        let src = tempdir().unwrap();
        fs::create_dir_all(src.path().join("lib").join("deep")).unwrap();
        fs::write(src.path().join("package.json"), "{}").unwrap();
        fs::write(src.path().join("lib").join("index.js"), "export {}").unwrap();
        fs::create_dir(src.path().join("empty")).unwrap();

        let dst = tempdir().unwrap();
        let target = dst.path().join("out");
        let linked = hard_link_dir_recursive(src.path(), &target).unwrap();

        assert_eq!(linked, 2);
        assert!(target.join("package.json").is_file());
        assert!(target.join("lib").join("index.js").is_file());
        assert!(target.join("lib").join("deep").is_dir());
        assert!(target.join("empty").is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_hard_link_shares_inode() {
        use std::os::unix::fs::MetadataExt;

        let src = tempdir().unwrap();
        fs::write(src.path().join("a.js"), "1").unwrap();

        let dst = tempdir().unwrap();
        hard_link_dir_recursive(src.path(), dst.path()).unwrap();

        let a = fs::metadata(src.path().join("a.js")).unwrap();
        let b = fs::metadata(dst.path().join("a.js")).unwrap();
        assert_eq!(a.ino(), b.ino());
        assert_eq!(b.nlink(), 2);
    }

    #[test]
    fn test_hard_link_replaces_existing_file() {
        let src = tempdir().unwrap();
        fs::write(src.path().join("a.js"), "new").unwrap();

        let dst = tempdir().unwrap();
        fs::write(dst.path().join("a.js"), "old").unwrap();

        hard_link_dir_recursive(src.path(), dst.path()).unwrap();
        assert_eq!(fs::read_to_string(dst.path().join("a.js")).unwrap(), "new");
    }

    #[test]
    fn test_hard_link_missing_source_fails() {
        let dst = tempdir().unwrap();
        let result = hard_link_dir_recursive(Path::new("/nonexistent/dir"), dst.path());
        assert!(result.is_err());
    }
}
