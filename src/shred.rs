//! Secure file and directory removal.
//!
//! Best-effort, by contract: the file is overwritten in place (random
//! noise on every pass but the last, zeros on the last so no entropy blob
//! advertises itself), synced to disk, renamed to a random string to bury
//! the original name in the directory entry, and finally unlinked. None of
//! this defeats wear-leveling flash or copy-on-write filesystems, which is
//! exactly why the contract stops at best-effort.

use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use rand::Rng;
use rand::TryRngCore;
use rand::rngs::OsRng;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::IO_CHUNK;
use crate::crypto::derive::fill_random;
use crate::error::{Error, Result};
use crate::status::{StatusEvent, StatusSender};

const OBFUSCATE_NAME_LEN: usize = 16;
const OBFUSCATE_ATTEMPTS: usize = 5;
const OBFUSCATE_ALPHABET: &[u8; 62] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Overwrites a regular file `passes` times, renames it to a random name,
/// and unlinks it.
///
/// With `passes = 0` the contents are left untouched and the file is only
/// renamed and unlinked.
///
/// # Errors
/// [`Error::NotFound`] if the file is missing; [`Error::Io`] on overwrite
/// or unlink failures.
pub fn wipe_file(path: &Path, passes: u32, status: &StatusSender) -> Result<()> {
    if !path.exists() {
        return Err(Error::NotFound { path: path.to_path_buf() });
    }

    let file_size = fs::metadata(path)?.len();

    {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let mut buf = vec![0u8; IO_CHUNK];

        for pass in 1..=passes {
            status.send(StatusEvent::WipePass { path: path.to_path_buf(), pass, total: passes });

            file.seek(SeekFrom::Start(0))?;
            let mut remaining = file_size;
            while remaining > 0 {
                let len = usize::try_from(remaining.min(IO_CHUNK as u64)).expect("bounded by IO_CHUNK");
                if pass == passes {
                    buf[..len].fill(0);
                } else {
                    fill_random(&mut buf[..len])?;
                }
                file.write_all(&buf[..len])?;
                remaining -= len as u64;
            }

            file.flush()?;
            file.sync_data()?;
        }
    }

    let final_path = obfuscate_name(path);
    fs::remove_file(&final_path)?;
    debug!(original = %path.display(), "file wiped");
    Ok(())
}

/// Recursively wipes a directory tree, bottom-up, then removes the root.
///
/// Regular files are overwritten and unlinked; symlinks are unlinked
/// without following; directories are renamed and removed once empty.
/// Per-entry failures are reported through `status` and do not stop the
/// sweep.
///
/// # Errors
/// [`Error::NotFound`] if the root is missing.
pub fn wipe_dir(path: &Path, passes: u32, status: &StatusSender) -> Result<()> {
    if !path.is_dir() {
        return Err(Error::NotFound { path: path.to_path_buf() });
    }

    for entry in WalkDir::new(path).follow_links(false).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "unreadable entry during wipe");
                continue;
            }
        };

        let target = entry.path();
        let outcome = if entry.file_type().is_dir() {
            fs::remove_dir(obfuscate_name(target))
        } else if entry.file_type().is_symlink() {
            // Overwriting would reach through to the link target.
            fs::remove_file(target)
        } else {
            match wipe_file(target, passes, status) {
                Ok(()) => Ok(()),
                Err(Error::Io(e)) => Err(e),
                Err(e) => Err(std::io::Error::other(e.to_string())),
            }
        };

        if let Err(e) = outcome {
            warn!(entry = %target.display(), error = %e, "failed to remove entry");
            status.send(StatusEvent::Warn { path: target.to_path_buf(), message: e.to_string() });
        }
    }

    Ok(())
}

/// Renames a path to a random alphanumeric name in the same directory,
/// returning whichever path the entry ends up under. A rename that fails
/// (busy file, permissions) keeps the original name; the caller removes
/// the entry either way.
fn obfuscate_name(path: &Path) -> PathBuf {
    let Some(parent) = path.parent() else {
        return path.to_path_buf();
    };

    let mut rng = OsRng.unwrap_err();
    for _ in 0..OBFUSCATE_ATTEMPTS {
        let name: String = (0..OBFUSCATE_NAME_LEN)
            .map(|_| char::from(OBFUSCATE_ALPHABET[rng.random_range(0..OBFUSCATE_ALPHABET.len())]))
            .collect();
        let candidate = parent.join(name);
        if candidate.exists() {
            continue;
        }
        if fs::rename(path, &candidate).is_ok() {
            return candidate;
        }
        return path.to_path_buf();
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status;
    use tempfile::tempdir;

    #[test]
    fn test_wipe_file_removes_and_reports_passes() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("secret.txt");
        fs::write(&target, vec![0xAAu8; 200_000]).unwrap();

        let (sender, receiver) = status::channel();
        wipe_file(&target, 3, &sender).unwrap();
        drop(sender);

        assert!(!target.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);

        let passes: Vec<_> = receiver
            .try_iter()
            .filter(|e| matches!(e, StatusEvent::WipePass { .. }))
            .collect();
        assert_eq!(passes.len(), 3);
    }

    #[test]
    fn test_wipe_missing_file() {
        let dir = tempdir().unwrap();
        let result = wipe_file(&dir.path().join("ghost"), 1, &StatusSender::disabled());
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_zero_passes_removes_without_overwriting() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("f");
        fs::write(&target, b"data").unwrap();

        let (sender, receiver) = status::channel();
        wipe_file(&target, 0, &sender).unwrap();
        drop(sender);

        assert!(!target.exists());
        // No overwrite pass ran, only the rename-and-unlink.
        assert!(receiver.try_iter().all(|e| !matches!(e, StatusEvent::WipePass { .. })));
    }

    #[test]
    fn test_wipe_dir_removes_tree() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("tree");
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::write(root.join("top.txt"), b"1").unwrap();
        fs::write(root.join("a/mid.txt"), b"22").unwrap();
        fs::write(root.join("a/b/leaf.txt"), b"333").unwrap();

        wipe_dir(&root, 1, &StatusSender::disabled()).unwrap();
        assert!(!root.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_wipe_dir_does_not_follow_symlinks() {
        let dir = tempdir().unwrap();
        let outside = dir.path().join("outside.txt");
        fs::write(&outside, b"must survive").unwrap();

        let root = dir.path().join("tree");
        fs::create_dir_all(&root).unwrap();
        std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();

        wipe_dir(&root, 1, &StatusSender::disabled()).unwrap();
        assert!(!root.exists());
        assert_eq!(fs::read(&outside).unwrap(), b"must survive");
    }
}
