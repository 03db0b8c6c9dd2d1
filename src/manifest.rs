//! Manifest-driven recursive archival and restoration.
//!
//! Building a vault walks a directory tree in a stable depth-first order,
//! streams every regular file through the streaming container into a flat
//! vault under a random name, and records `original → stored` pairs in an
//! external `manifest.json`. The manifest is written append-safely: each
//! entry is flushed and fsync'd on its own line right after its ciphertext
//! lands, so a build killed half-way leaves a file that parses again after
//! appending a single `]`.
//!
//! The manifest itself is NOT authenticated. Restoration therefore trusts
//! it only as far as the restoration root: any entry that would resolve
//! outside that root is skipped and reported as a security event, and
//! nothing is created for it.

use std::ffi::OsStr;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::header::FileMeta;
use crate::secret::Password;
use crate::status::{StatusEvent, StatusSender};
use crate::stream;

/// Base name of the manifest file inside its directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// One `original → stored` mapping in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Path relative to the archive root, separator preserved as written.
    pub original: String,
    /// Vault-local ciphertext basename.
    pub stored: String,
}

/// Enumerates the regular files under `root` as root-relative paths.
///
/// Symlinks are never followed and never listed. Directories and files
/// whose base name matches one of the `exclude` glob patterns are pruned.
/// The order is a stable depth-first traversal sorted by file name, so two
/// runs over the same tree enumerate identically.
///
/// # Errors
/// [`Error::NotFound`] if `root` is not a directory.
pub fn collect_files(root: &Path, exclude: &[String]) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(Error::NotFound { path: root.to_path_buf() });
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_excluded(entry.file_name(), exclude));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if entry.file_type().is_file() {
            let rel = entry.path().strip_prefix(root).expect("walker stays under root");
            files.push(rel.to_path_buf());
        }
    }

    Ok(files)
}

fn is_excluded(name: &OsStr, exclude: &[String]) -> bool {
    let name = name.to_string_lossy();
    exclude.iter().any(|pattern| fast_glob::glob_match(pattern.as_str(), name.as_ref()))
}

/// Sums the on-disk vault size the given root-relative files will need.
///
/// # Errors
/// [`Error::Io`] if a file's metadata cannot be read.
pub fn estimate_vault_size(root: &Path, files: &[PathBuf], chunk_size: u32) -> Result<u64> {
    let mut total = 0u64;
    for rel in files {
        let full = root.join(rel);
        let size = fs::metadata(&full)?.len();
        let header_len = FileMeta::from_path(&full)?.encoded_len();
        total = total.saturating_add(stream::encrypted_size(size, header_len, chunk_size));
    }
    Ok(total)
}

/// Free bytes on the filesystem the vault will land on. Probes the vault
/// directory itself, or its parent while it does not exist yet; an
/// unanswerable probe counts as zero so the space check fails closed.
fn free_space_for(vault: &Path) -> u64 {
    let abs = std::path::absolute(vault).unwrap_or_else(|_| vault.to_path_buf());
    let probe = if abs.exists() {
        abs
    } else {
        match abs.parent() {
            Some(parent) => parent.to_path_buf(),
            None => abs,
        }
    };
    fs4::available_space(&probe).unwrap_or(0)
}

/// Encrypts every regular file under `root` into `vault` and writes the
/// manifest mapping alongside.
///
/// The manifest lands in `manifest_dir`, or `vault/manifest/` by default,
/// and an existing `manifest.json` there is refused: it is the only
/// integrity handle the user has. Per-file failures are reported through
/// `status` and skipped; the failed file is simply absent from the
/// restoration set.
///
/// Returns the manifest path.
///
/// # Errors
/// [`Error::NotFound`] when `root` is missing or holds no eligible files,
/// [`Error::InsufficientSpace`] when the pre-flight space check fails,
/// [`Error::Conflict`] when a manifest already exists.
pub fn build_manifest(
    root: &Path,
    vault: &Path,
    password: &Password,
    config: &Config,
    exclude: &[String],
    manifest_dir: Option<&Path>,
    status: &StatusSender,
) -> Result<PathBuf> {
    config.validate()?;

    let files = collect_files(root, exclude)?;
    if files.is_empty() {
        return Err(Error::NotFound { path: root.to_path_buf() });
    }

    let needed = estimate_vault_size(root, &files, config.streaming_params.chunk_size)?;
    let available = free_space_for(vault);
    if available < needed {
        return Err(Error::InsufficientSpace { needed, available });
    }

    fs::create_dir_all(vault)?;
    let manifest_dir = match manifest_dir {
        Some(dir) => dir.to_path_buf(),
        None => vault.join("manifest"),
    };
    fs::create_dir_all(&manifest_dir)?;
    let manifest_path = manifest_dir.join(MANIFEST_FILE);

    // Create-exclusive: a manifest that appears between the check and the
    // open still loses.
    let mut manifest = match OpenOptions::new().write(true).create_new(true).open(&manifest_path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(Error::Conflict { path: manifest_path });
        }
        Err(e) => return Err(e.into()),
    };

    manifest.write_all(b"[")?;
    let total = files.len();
    let mut first = true;

    for (index, rel) in files.iter().enumerate() {
        status.send(StatusEvent::Started { path: rel.clone(), index: index + 1, total });

        match stream::encrypt_to_vault(&root.join(rel), vault, password, config) {
            Ok(stored) => {
                let entry =
                    ManifestEntry { original: rel.to_string_lossy().into_owned(), stored: stored.clone() };
                let line = serde_json::to_string(&entry).map_err(std::io::Error::other)?;

                // The ciphertext is already fsync'd; only now may the
                // entry become durable.
                if first {
                    manifest.write_all(b"\n")?;
                    first = false;
                } else {
                    manifest.write_all(b",\n")?;
                }
                manifest.write_all(line.as_bytes())?;
                manifest.flush()?;
                manifest.sync_data()?;

                debug!(original = %rel.display(), stored = %stored, "vault entry written");
                status.send(StatusEvent::Stored { original: rel.clone(), stored });
            }
            Err(e) => {
                warn!(file = %rel.display(), error = %e, "skipping file after encryption failure");
                status.send(StatusEvent::Warn { path: rel.clone(), message: e.to_string() });
            }
        }
    }

    manifest.write_all(b"\n]")?;
    manifest.flush()?;
    manifest.sync_data()?;
    Ok(manifest_path)
}

/// Decrypts every manifest entry from `vault` back under `output_dir`.
///
/// A manifest truncated mid-build (missing its closing `]`) is repaired in
/// memory before parsing. Entries that would escape `output_dir`, and
/// entries whose ciphertext is missing from the vault, are skipped with an
/// event; an authentication failure anywhere aborts the whole restore,
/// because one bad tag means the password or KDF settings are wrong for
/// every remaining file too.
///
/// # Errors
/// [`Error::CorruptManifest`] when the manifest does not parse,
/// [`Error::InvalidTag`] on authentication failure.
pub fn restore_from_manifest(
    manifest_path: &Path,
    vault: &Path,
    output_dir: &Path,
    password: &Password,
    config: &Config,
    status: &StatusSender,
) -> Result<()> {
    config.validate()?;

    if !manifest_path.is_file() {
        return Err(Error::NotFound { path: manifest_path.to_path_buf() });
    }

    let text = fs::read_to_string(manifest_path)?;
    let trimmed = text.trim_end();
    let repaired;
    let text = if trimmed.ends_with(']') {
        trimmed
    } else {
        repaired = format!("{trimmed}\n]");
        &repaired
    };
    let entries: Vec<ManifestEntry> =
        serde_json::from_str(text).map_err(|e| Error::CorruptManifest(e.to_string()))?;

    let root = std::path::absolute(output_dir)?;
    let total = entries.len();

    for (index, entry) in entries.iter().enumerate() {
        let rel = Path::new(&entry.original);
        status.send(StatusEvent::Started { path: rel.to_path_buf(), index: index + 1, total });

        let candidate = match resolve_entry_path(&root, rel) {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!(entry = %rel.display(), error = %e, "manifest entry rejected");
                status.send(StatusEvent::SecurityAlert { path: rel.to_path_buf() });
                continue;
            }
        };

        let stored = vault.join(&entry.stored);
        if !stored.is_file() {
            status.send(StatusEvent::Warn {
                path: rel.to_path_buf(),
                message: format!("missing from vault: {}", entry.stored),
            });
            continue;
        }

        match stream::decrypt_to_path(&stored, password, config, &candidate) {
            Ok(()) => status.send(StatusEvent::Restored { original: rel.to_path_buf() }),
            Err(Error::InvalidTag) => {
                status.send(StatusEvent::Fatal {
                    message: "authentication failed; aborting the restore".to_owned(),
                });
                return Err(Error::InvalidTag);
            }
            Err(e) => {
                warn!(file = %rel.display(), error = %e, "entry failed to restore");
                status.send(StatusEvent::Warn { path: rel.to_path_buf(), message: e.to_string() });
            }
        }
    }

    Ok(())
}

/// Resolves a manifest entry against the (absolute) restoration root.
///
/// # Errors
/// [`Error::PathTraversal`] when the entry would land outside the root,
/// whether through `..` segments, an absolute path, a different volume,
/// or a symlinked parent directory.
fn resolve_entry_path(root: &Path, rel: &Path) -> Result<PathBuf> {
    let candidate = lexical_normalize(&root.join(rel));
    if !candidate.starts_with(root) || escapes_through_symlink(root, &candidate) {
        return Err(Error::PathTraversal { path: rel.to_path_buf() });
    }
    Ok(candidate)
}

/// Collapses `.` and `..` segments without touching the filesystem, so a
/// `..` inside a manifest entry cannot hide behind a directory that does
/// not exist yet.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// After the lexical check, refuses candidates whose nearest existing
/// ancestor resolves (through symlinks) outside the restoration root.
fn escapes_through_symlink(root: &Path, candidate: &Path) -> bool {
    let Ok(canonical_root) = root.canonicalize() else {
        // Root not created yet: nothing inside it can be a symlink.
        return false;
    };

    let mut probe = candidate.parent();
    while let Some(dir) = probe {
        if dir.exists() {
            return match dir.canonicalize() {
                Ok(canonical) => !canonical.starts_with(&canonical_root),
                Err(_) => true,
            };
        }
        probe = dir.parent();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KdfParams;
    use crate::status;
    use tempfile::tempdir;

    fn test_config() -> Config {
        let mut config = Config {
            kdf_params: KdfParams { length: 32, iterations: 1, memory_cost: 8, lanes: 1 },
            ..Config::default()
        };
        config.streaming_params.chunk_size = 64;
        config
    }

    fn sample_tree(root: &Path) {
        fs::create_dir_all(root.join("docs")).unwrap();
        fs::create_dir_all(root.join("skipme")).unwrap();
        fs::write(root.join("a.txt"), b"alpha").unwrap();
        fs::write(root.join("docs/b.txt"), b"bravo").unwrap();
        fs::write(root.join("skipme/c.txt"), b"charlie").unwrap();
    }

    #[test]
    fn test_collect_files_is_sorted_and_prunes_excludes() {
        let dir = tempdir().unwrap();
        sample_tree(dir.path());

        let files = collect_files(dir.path(), &["skipme".to_owned()]).unwrap();
        assert_eq!(files, vec![PathBuf::from("a.txt"), PathBuf::from("docs/b.txt")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_collect_files_skips_symlinks() {
        let dir = tempdir().unwrap();
        sample_tree(dir.path());
        std::os::unix::fs::symlink(dir.path().join("a.txt"), dir.path().join("link.txt")).unwrap();

        let files = collect_files(dir.path(), &[]).unwrap();
        assert!(!files.contains(&PathBuf::from("link.txt")));
    }

    #[test]
    fn test_build_and_restore_roundtrip() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("tree");
        sample_tree(&root);

        let password = Password::new("vault pw");
        let config = test_config();
        let vault = dir.path().join("vault");
        let (sender, receiver) = status::channel();

        let manifest_path =
            build_manifest(&root, &vault, &password, &config, &[], None, &sender).unwrap();
        assert_eq!(manifest_path, vault.join("manifest").join(MANIFEST_FILE));

        let stored_events: Vec<_> = receiver
            .try_iter()
            .filter(|e| matches!(e, StatusEvent::Stored { .. }))
            .collect();
        assert_eq!(stored_events.len(), 3);

        let restore = dir.path().join("restore");
        restore_from_manifest(&manifest_path, &vault, &restore, &password, &config, &sender).unwrap();

        assert_eq!(fs::read(restore.join("a.txt")).unwrap(), b"alpha");
        assert_eq!(fs::read(restore.join("docs/b.txt")).unwrap(), b"bravo");
        assert_eq!(fs::read(restore.join("skipme/c.txt")).unwrap(), b"charlie");
    }

    #[test]
    fn test_existing_manifest_is_refused() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("tree");
        sample_tree(&root);
        let vault = dir.path().join("vault");
        fs::create_dir_all(vault.join("manifest")).unwrap();
        fs::write(vault.join("manifest").join(MANIFEST_FILE), b"[]").unwrap();

        let result = build_manifest(
            &root,
            &vault,
            &Password::new("pw"),
            &test_config(),
            &[],
            None,
            &StatusSender::disabled(),
        );
        assert!(matches!(result, Err(Error::Conflict { .. })));
    }

    #[test]
    fn test_manifest_is_append_safe() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("tree");
        sample_tree(&root);

        let password = Password::new("pw");
        let config = test_config();
        let vault = dir.path().join("vault");
        let manifest_path =
            build_manifest(&root, &vault, &password, &config, &[], None, &StatusSender::disabled())
                .unwrap();

        // Simulate a build killed right after its last durable entry.
        let text = fs::read_to_string(&manifest_path).unwrap();
        let truncated = text.strip_suffix("\n]").unwrap();
        fs::write(&manifest_path, truncated).unwrap();

        let restore = dir.path().join("restore");
        restore_from_manifest(&manifest_path, &vault, &restore, &password, &config, &StatusSender::disabled())
            .unwrap();
        assert!(restore.join("a.txt").is_file());
        assert!(restore.join("docs/b.txt").is_file());
    }

    #[test]
    fn test_garbage_manifest_is_corrupt() {
        let dir = tempdir().unwrap();
        let manifest = dir.path().join(MANIFEST_FILE);
        fs::write(&manifest, "{not json").unwrap();

        let result = restore_from_manifest(
            &manifest,
            dir.path(),
            dir.path(),
            &Password::new("pw"),
            &test_config(),
            &StatusSender::disabled(),
        );
        assert!(matches!(result, Err(Error::CorruptManifest(_))));
    }

    #[test]
    fn test_traversal_entry_is_skipped() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("tree");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("ok.bin"), b"legit").unwrap();

        let password = Password::new("pw");
        let config = test_config();
        let vault = dir.path().join("vault");
        let manifest_path =
            build_manifest(&root, &vault, &password, &config, &[], None, &StatusSender::disabled())
                .unwrap();

        // Re-point the single legitimate entry at an escape path too.
        let entries: Vec<ManifestEntry> =
            serde_json::from_str(&fs::read_to_string(&manifest_path).unwrap()).unwrap();
        let stored = entries[0].stored.clone();
        let tampered = serde_json::to_string(&vec![
            ManifestEntry { original: "ok.bin".to_owned(), stored: stored.clone() },
            ManifestEntry { original: "../../escape.bin".to_owned(), stored },
        ])
        .unwrap();
        fs::write(&manifest_path, tampered).unwrap();

        let restore = dir.path().join("outer").join("restore");
        let (sender, receiver) = status::channel();
        restore_from_manifest(&manifest_path, &vault, &restore, &password, &config, &sender).unwrap();
        drop(sender);

        assert_eq!(fs::read(restore.join("ok.bin")).unwrap(), b"legit");
        assert!(!dir.path().join("escape.bin").exists());
        assert!(!dir.path().join("outer").join("escape.bin").exists());

        let alerts = receiver
            .try_iter()
            .filter(|e| matches!(e, StatusEvent::SecurityAlert { .. }))
            .count();
        assert_eq!(alerts, 1);
    }

    #[test]
    fn test_wrong_password_aborts_restore() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("tree");
        sample_tree(&root);

        let config = test_config();
        let vault = dir.path().join("vault");
        let manifest_path = build_manifest(
            &root,
            &vault,
            &Password::new("right"),
            &config,
            &[],
            None,
            &StatusSender::disabled(),
        )
        .unwrap();

        let restore = dir.path().join("restore");
        let result = restore_from_manifest(
            &manifest_path,
            &vault,
            &restore,
            &Password::new("wrong"),
            &config,
            &StatusSender::disabled(),
        );
        assert!(matches!(result, Err(Error::InvalidTag)));
        assert!(!restore.exists(), "wrong password must not create the restore root");
    }

    #[test]
    fn test_missing_vault_file_is_skipped() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("tree");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("one.txt"), b"1").unwrap();
        fs::write(root.join("two.txt"), b"2").unwrap();

        let password = Password::new("pw");
        let config = test_config();
        let vault = dir.path().join("vault");
        let manifest_path =
            build_manifest(&root, &vault, &password, &config, &[], None, &StatusSender::disabled())
                .unwrap();

        let entries: Vec<ManifestEntry> =
            serde_json::from_str(&fs::read_to_string(&manifest_path).unwrap()).unwrap();
        fs::remove_file(vault.join(&entries[0].stored)).unwrap();

        let restore = dir.path().join("restore");
        let (sender, receiver) = status::channel();
        restore_from_manifest(&manifest_path, &vault, &restore, &password, &config, &sender).unwrap();
        drop(sender);

        assert!(!restore.join(&entries[0].original).exists());
        assert!(restore.join(&entries[1].original).is_file());
        assert!(receiver.try_iter().any(|e| matches!(e, StatusEvent::Warn { .. })));
    }

    #[test]
    fn test_empty_root_is_an_error() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("empty");
        fs::create_dir_all(&root).unwrap();

        let result = build_manifest(
            &root,
            &dir.path().join("vault"),
            &Password::new("pw"),
            &test_config(),
            &[],
            None,
            &StatusSender::disabled(),
        );
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_escaping_entries_are_path_traversal_errors() {
        let dir = tempdir().unwrap();
        let root = std::path::absolute(dir.path()).unwrap();

        let ok = resolve_entry_path(&root, Path::new("a/b.txt")).unwrap();
        assert_eq!(ok, root.join("a/b.txt"));

        for rel in ["../evil.txt", "a/../../evil.txt", "/etc/passwd"] {
            let result = resolve_entry_path(&root, Path::new(rel));
            assert!(matches!(result, Err(Error::PathTraversal { .. })), "{rel} not rejected");
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_parent_is_path_traversal() {
        let dir = tempdir().unwrap();
        let root = std::path::absolute(&dir.path().join("root")).unwrap();
        let outside = dir.path().join("outside");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();

        let result = resolve_entry_path(&root, Path::new("link/leaf.txt"));
        assert!(matches!(result, Err(Error::PathTraversal { .. })));
    }

    #[test]
    fn test_lexical_normalize() {
        assert_eq!(lexical_normalize(Path::new("/out/a/../b/./c")), PathBuf::from("/out/b/c"));
        assert_eq!(lexical_normalize(Path::new("/out/../../etc/passwd")), PathBuf::from("/etc/passwd"));
    }
}
