//! npm tarball download and extraction.

use crate::error::{codes, LoaderError, Result};
use crate::fetch::{redirect_target, Transport, MAX_REDIRECTS};
use bytes::Bytes;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use tar::Archive;
use tracing::debug;
use url::Url;

/// Maximum tarball size (200 MB).
pub const MAX_TARBALL_SIZE: usize = 200 * 1024 * 1024;

/// Download a tarball through `transport`, following up to
/// [`MAX_REDIRECTS`] redirects.
///
/// # Errors
/// Returns an error on a non-success status, an invalid or excessive
/// redirect, or a body over [`MAX_TARBALL_SIZE`].
pub async fn download_tarball(transport: &dyn Transport, url: &Url) -> Result<Bytes> {
    let mut current = url.clone();

    for _ in 0..=MAX_REDIRECTS {
        let response = transport.get(&current).await?;

        match response.status {
            200..=299 => {
                if response.body.len() > MAX_TARBALL_SIZE {
                    return Err(LoaderError::fetch_failed(format!(
                        "Tarball too large: {} bytes (max: {MAX_TARBALL_SIZE}) for {current}",
                        response.body.len()
                    )));
                }
                return Ok(response.body);
            }
            300..=399 => {
                let target = redirect_target(&current, &response)?;
                debug!(from = %current, to = %target, status = response.status, "tarball redirect");
                current = target;
            }
            status => return Err(LoaderError::fetch_status(status, current.as_str())),
        }
    }

    Err(LoaderError::new(
        codes::REDIRECT_LIMIT,
        format!("Too many redirects while downloading {url}"),
    ))
}

/// Extract a `.tgz` into `dest` atomically.
///
/// Entries are unpacked into a temp directory beside `dest`, then the
/// single top-level directory (usually `package/`) is renamed to `dest`.
/// An existing `dest` is left untouched.
///
/// # Errors
/// Returns an error if the archive is invalid, contains absolute or
/// escaping paths, or the final rename fails without `dest` appearing.
pub fn extract_tgz_atomic(bytes: &[u8], dest: &Path) -> Result<()> {
    extract_tgz_atomic_with(bytes, dest, || {})
}

/// [`extract_tgz_atomic`] with a hook run just before the final rename.
fn extract_tgz_atomic_with(bytes: &[u8], dest: &Path, before_rename: impl FnOnce()) -> Result<()> {
    let parent = dest
        .parent()
        .ok_or_else(|| LoaderError::extract_failed(format!("{} has no parent", dest.display())))?;

    fs::create_dir_all(parent).map_err(|e| LoaderError::fs("create", parent, &e))?;

    if dest.exists() {
        return Ok(());
    }

    let temp = tempfile::Builder::new()
        .prefix(".tmp-extract-")
        .tempdir_in(parent)
        .map_err(|e| LoaderError::fs("create temp dir in", parent, &e))?;

    extract_tgz_to(bytes, temp.path())?;
    let root = find_extracted_root(temp.path())?;

    before_rename();
    match fs::rename(&root, dest) {
        Ok(()) => Ok(()),
        // Another extraction won the race.
        Err(e) if dest.exists() => {
            debug!(path = %dest.display(), error = %e, "package extracted concurrently");
            Ok(())
        }
        Err(e) => Err(LoaderError::extract_failed(format!(
            "Failed to move extracted package to {}: {e}",
            dest.display()
        ))),
    }
    // `temp` is removed on drop.
}

/// Find the single top-level directory of an extracted tarball.
///
/// Most packages use `package/`; some (e.g. `@types/*`) use the bare name.
fn find_extracted_root(dir: &Path) -> Result<PathBuf> {
    let package_dir = dir.join("package");
    if package_dir.is_dir() {
        return Ok(package_dir);
    }

    let entries: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| LoaderError::fs("read", dir, &e))?
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_ok_and(|ft| ft.is_dir()))
        .map(|e| e.path())
        .collect();

    match entries.as_slice() {
        [single] => Ok(single.clone()),
        [] => Err(LoaderError::extract_failed(
            "Tarball does not contain any top-level directory",
        )),
        many => Err(LoaderError::extract_failed(format!(
            "Tarball contains {} top-level directories, expected 1",
            many.len()
        ))),
    }
}

fn extract_tgz_to(bytes: &[u8], dest: &Path) -> Result<()> {
    let mut archive = Archive::new(GzDecoder::new(bytes));
    let bad_archive = |e: io::Error| LoaderError::extract_failed(format!("Invalid tarball: {e}"));

    for entry in archive.entries().map_err(bad_archive)? {
        let mut entry = entry.map_err(bad_archive)?;
        let path = entry.path().map_err(bad_archive)?.into_owned();

        if path.is_absolute() || path.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(LoaderError::extract_failed(format!(
                "Tarball entry escapes destination: {}",
                path.display()
            )));
        }

        let dest_path = dest.join(&path);
        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent).map_err(|e| LoaderError::fs("create", parent, &e))?;
        }

        let kind = entry.header().entry_type();
        if kind.is_dir() {
            fs::create_dir_all(&dest_path).map_err(|e| LoaderError::fs("create", &dest_path, &e))?;
        } else if kind.is_file() {
            let mut file =
                File::create(&dest_path).map_err(|e| LoaderError::fs("create", &dest_path, &e))?;
            io::copy(&mut entry, &mut file).map_err(|e| LoaderError::fs("write", &dest_path, &e))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Ok(mode) = entry.header().mode() {
                    if let Err(e) =
                        fs::set_permissions(&dest_path, fs::Permissions::from_mode(mode))
                    {
                        debug!(path = %dest_path.display(), error = %e, "could not set permissions");
                    }
                }
            }
        }
        // Symlinks and special entries are skipped.
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tar::Builder;
    use tempfile::tempdir;

    /// Build a gzipped tarball from `(path, contents)` entries.
    pub(crate) fn tgz(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut tar_bytes = Vec::new();
        {
            let mut builder = Builder::new(&mut tar_bytes);
            for (path, data) in entries {
                let mut header = tar::Header::new_gnu();
                header.set_path(path).unwrap();
                header.set_size(data.len() as u64);
                header.set_mode(0o644);
                header.set_cksum();
                builder.append(&header, *data).unwrap();
            }
            builder.finish().unwrap();
        }

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tar_bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_extract_tarball() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("preact").join("10.19.2");

        let bytes = tgz(&[
            ("package/package.json", br#"{"name":"preact"}"#),
            ("package/dist/preact.mjs", b"export {}"),
        ]);
        extract_tgz_atomic(&bytes, &dest).unwrap();

        assert!(dest.join("package.json").is_file());
        assert!(dest.join("dist/preact.mjs").is_file());
        // Only the final directory remains beside it.
        assert_eq!(fs::read_dir(dest.parent().unwrap()).unwrap().count(), 1);
    }

    #[test]
    fn test_extract_twice_is_idempotent() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("1.0.0");
        let bytes = tgz(&[("package/index.js", b"1")]);

        extract_tgz_atomic(&bytes, &dest).unwrap();
        extract_tgz_atomic(&bytes, &dest).unwrap();
        assert_eq!(fs::read_to_string(dest.join("index.js")).unwrap(), "1");
    }

    #[test]
    fn test_non_package_prefix() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("20.1.0");
        let bytes = tgz(&[("node/index.d.ts", b"export {}")]);

        extract_tgz_atomic(&bytes, &dest).unwrap();
        assert!(dest.join("index.d.ts").is_file());
    }

    #[test]
    fn test_reject_empty_tarball() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("1.0.0");

        assert!(extract_tgz_atomic(&tgz(&[]), &dest).is_err());
        assert!(!dest.exists());
        // The temp directory is cleaned up.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_reject_garbage() {
        let dir = tempdir().unwrap();
        let err = extract_tgz_atomic(b"not a tarball", &dir.path().join("x")).unwrap_err();
        assert_eq!(err.code(), codes::NPM_EXTRACT_FAILED);
    }

    /// Gzipped tar with one regular file whose header name is written
    /// verbatim, bypassing the builder's path checks.
    fn raw_tgz(name: &str, data: &[u8]) -> Vec<u8> {
        let mut header = tar::Header::new_old();
        header.as_old_mut().name[..name.len()].copy_from_slice(name.as_bytes());
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();

        let mut tar_bytes = Vec::new();
        {
            let mut builder = Builder::new(&mut tar_bytes);
            builder.append(&header, data).unwrap();
            builder.finish().unwrap();
        }

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tar_bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_reject_path_traversal() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("pkg").join("1.0.0");

        let bytes = raw_tgz("package/../../evil.js", b"pwned");
        let err = extract_tgz_atomic(&bytes, &dest).unwrap_err();
        assert_eq!(err.code(), codes::NPM_EXTRACT_FAILED);
        assert!(err.message().contains("escapes"));

        assert!(!dest.exists());
        assert!(!dir.path().join("evil.js").exists());
        assert!(!dir.path().join("pkg").join("evil.js").exists());
        // The temp directory is cleaned up.
        assert_eq!(fs::read_dir(dir.path().join("pkg")).unwrap().count(), 0);
    }

    #[test]
    fn test_reject_absolute_path() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("1.0.0");

        let err = extract_tgz_atomic(&raw_tgz("/tmp/evil.js", b"x"), &dest).unwrap_err();
        assert_eq!(err.code(), codes::NPM_EXTRACT_FAILED);
        assert!(!dest.exists());
    }

    #[test]
    fn test_lost_rename_race_keeps_winner() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("1.0.0");
        let bytes = tgz(&[("package/index.js", b"ours")]);

        extract_tgz_atomic_with(&bytes, &dest, || {
            fs::create_dir_all(&dest).unwrap();
            fs::write(dest.join("index.js"), "theirs").unwrap();
        })
        .unwrap();

        assert_eq!(fs::read_to_string(dest.join("index.js")).unwrap(), "theirs");
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(".tmp-"))
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }
}
