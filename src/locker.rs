//! Locking and unlocking files
//!
//! This module is the only place that touches output paths. Outputs are
//! staged in a temporary file next to the destination and renamed into
//! place only once every step succeeded, so a failed operation never
//! leaves a partial file behind.

use crate::cipher;
use crate::container::{self, Header};
use crate::error::{ErrorCategory, ErrorKind, LockerError, Result};
use crate::kdf;
use crate::policy::{LOCKED_SUFFIX, UNLOCKED_MARKER};
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Encrypt a file into a new container
///
/// Reads the file at `input_path`, derives a key from `password` and a fresh
/// salt, and writes header plus ciphertext to `output_path`.
///
/// The output file is created with mode 0o600 (read/write for owner only) on Unix systems.
pub fn lock_file(input_path: &Path, output_path: &Path, password: &[u8]) -> Result<()> {
    let metadata = fs::metadata(input_path)
        .map_err(|e| LockerError::io(format!("failed to stat {}", input_path.display()), e))?;
    if metadata.is_dir() {
        return Err(LockerError::with_kind(
            ErrorCategory::Usage,
            ErrorKind::IsDirectory,
            format!(
                "{} is a directory; only single files can be locked",
                input_path.display()
            ),
        ));
    }
    let original_filename = base_name(input_path)?;
    let original_size = stored_size(input_path, metadata.len())?;

    let salt = kdf::generate_salt()?;
    debug!(input = %input_path.display(), "deriving key");
    let key = kdf::derive_key(password, &salt)?;

    let mut input = File::open(input_path)
        .map_err(|e| LockerError::io(format!("failed to open {}", input_path.display()), e))?;
    let mut staged = StagedOutput::create(output_path)?;

    let header = Header {
        salt,
        original_filename,
        original_size,
    };
    container::write_header(staged.file_mut(), &header)?;
    let consumed = cipher::encrypt_stream(key.as_bytes(), &mut input, staged.file_mut())
        .map_err(|e| e.with_context(format!("failed to encrypt {}", input_path.display())))?;
    drop(key);

    if consumed != metadata.len() {
        return Err(LockerError::with_kind(
            ErrorCategory::Io,
            ErrorKind::InputChanged,
            format!(
                "{} changed while it was being locked ({} bytes expected, {} read)",
                input_path.display(),
                metadata.len(),
                consumed
            ),
        ));
    }

    staged.persist(output_path)?;
    info!(
        input = %input_path.display(),
        output = %output_path.display(),
        bytes = consumed,
        "locked file"
    );
    Ok(())
}

/// Decrypt a container into a plain file
///
/// Validates the header, derives the key from `password` and the stored salt,
/// and writes the recovered plaintext to `output_path`. A wrong password and a
/// damaged ciphertext are reported the same way.
///
/// The output file is created with mode 0o600 (read/write for owner only) on Unix systems.
pub fn unlock_file(container_path: &Path, output_path: &Path, password: &[u8]) -> Result<()> {
    let file = File::open(container_path)
        .map_err(|e| LockerError::io(format!("failed to open {}", container_path.display()), e))?;
    let mut reader = BufReader::new(file);

    let header = container::read_header(&mut reader).map_err(|e| {
        e.with_context(format!(
            "failed to read header of {}",
            container_path.display()
        ))
    })?;
    debug!(
        container = %container_path.display(),
        original = %header.original_filename,
        "deriving key"
    );
    let key = kdf::derive_key(password, &header.salt)?;

    let mut staged = StagedOutput::create(output_path)?;
    let written = cipher::decrypt_stream(key.as_bytes(), &mut reader, staged.file_mut())
        .map_err(|e| e.with_context(format!("failed to unlock {}", container_path.display())))?;
    drop(key);

    // The header is outside the AEAD seal; hold it to what was actually recovered.
    let expected = header.original_size as u64;
    if written != expected {
        return Err(LockerError::with_kind(
            ErrorCategory::Format,
            ErrorKind::SizeMismatch {
                expected,
                actual: written,
            },
            format!(
                "corrupt header: {} records {} bytes but {} were recovered",
                container_path.display(),
                expected,
                written
            ),
        ));
    }

    staged.persist(output_path)?;
    info!(
        container = %container_path.display(),
        output = %output_path.display(),
        bytes = written,
        "unlocked file"
    );
    Ok(())
}

/// Read only the header of a container. No password is needed.
pub fn peek_header(container_path: &Path) -> Result<Header> {
    let file = File::open(container_path)
        .map_err(|e| LockerError::io(format!("failed to open {}", container_path.display()), e))?;
    container::read_header(&mut BufReader::new(file)).map_err(|e| {
        e.with_context(format!(
            "failed to read header of {}",
            container_path.display()
        ))
    })
}

/// The original filename stored in a container's header.
pub fn peek_filename(container_path: &Path) -> Result<String> {
    Ok(peek_header(container_path)?.original_filename)
}

/// `<input>.locker`
pub fn default_locked_path(input_path: &Path) -> PathBuf {
    let mut path = input_path.as_os_str().to_os_string();
    path.push(LOCKED_SUFFIX);
    PathBuf::from(path)
}

/// Default output name for an unlocked file: `_unlocked` goes before the
/// extension, so `report.pdf` becomes `report_unlocked.pdf`.
///
/// Only the final path component of `original_filename` is used, since it
/// comes from an unauthenticated header.
pub fn default_unlocked_path(original_filename: &str) -> PathBuf {
    let base = Path::new(
        Path::new(original_filename)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(""),
    );
    let stem = base.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    match base.extension().and_then(|e| e.to_str()) {
        Some(ext) => PathBuf::from(format!("{}{}.{}", stem, UNLOCKED_MARKER, ext)),
        None => PathBuf::from(format!("{}{}", stem, UNLOCKED_MARKER)),
    }
}

fn stored_size(path: &Path, len: u64) -> Result<i64> {
    i64::try_from(len).map_err(|_| {
        LockerError::with_kind(
            ErrorCategory::Usage,
            ErrorKind::FileTooLarge(len),
            format!("{} is too large to lock ({} bytes)", path.display(), len),
        )
    })
}

fn base_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_owned)
        .ok_or_else(|| {
            LockerError::with_kind(
                ErrorCategory::Usage,
                ErrorKind::InvalidFilename,
                format!(
                    "{} does not end in a UTF-8 file name",
                    path.display()
                ),
            )
        })
}

/// An output file under construction. Dropping it without calling
/// `persist` deletes it.
struct StagedOutput {
    file: NamedTempFile,
}

impl StagedOutput {
    fn create(target: &Path) -> Result<Self> {
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let file = tempfile::Builder::new()
            .prefix(".locked-")
            .tempfile_in(dir)
            .map_err(|e| {
                LockerError::io(
                    format!("failed to create output next to {}", target.display()),
                    e,
                )
            })?;
        debug!(staged = %file.path().display(), target = %target.display(), "staging output");
        Ok(Self { file })
    }

    fn file_mut(&mut self) -> &mut File {
        self.file.as_file_mut()
    }

    /// Flush, fsync, restrict permissions, and atomically rename onto `target`.
    fn persist(mut self, target: &Path) -> Result<()> {
        self.file
            .flush()
            .map_err(|e| LockerError::io("failed to flush output", e))?;
        // fsync() such that the rename, if it succeeds, always points to a
        // complete file.
        self.file
            .as_file()
            .sync_all()
            .map_err(|e| LockerError::io("failed to sync output prior to rename", e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = self
                .file
                .as_file()
                .metadata()
                .map_err(|e| LockerError::io("failed to get output metadata", e))?
                .permissions();
            perms.set_mode(0o600);
            self.file
                .as_file()
                .set_permissions(perms)
                .map_err(|e| LockerError::io("failed to set output permissions", e))?;
        }

        self.file.persist(target).map_err(|e| {
            LockerError::io(
                format!("failed to rename to target file {}", target.display()),
                e.error,
            )
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::fs;
    use tempfile::TempDir;

    #[cfg(unix)]
    use std::os::unix::fs::PermissionsExt;

    fn leftovers(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with(".locked-"))
            .collect()
    }

    #[test]
    fn test_lock_unlock_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let plain_path = temp_dir.path().join("plain.txt");
        let locked_path = temp_dir.path().join("plain.txt.locker");
        let unlocked_path = temp_dir.path().join("unlocked.txt");

        let plaintext = b"Hello, locker!";
        fs::write(&plain_path, plaintext).unwrap();

        lock_file(&plain_path, &locked_path, b"test password").unwrap();
        assert!(locked_path.exists());

        unlock_file(&locked_path, &unlocked_path, b"test password").unwrap();
        assert_eq!(fs::read(&unlocked_path).unwrap(), plaintext);
        assert!(leftovers(temp_dir.path()).is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn test_file_permissions() {
        let temp_dir = TempDir::new().unwrap();
        let plain_path = temp_dir.path().join("plain.txt");
        let locked_path = temp_dir.path().join("plain.txt.locker");
        let unlocked_path = temp_dir.path().join("unlocked.txt");

        fs::write(&plain_path, b"test").unwrap();
        lock_file(&plain_path, &locked_path, b"test").unwrap();
        unlock_file(&locked_path, &unlocked_path, b"test").unwrap();

        for path in [&locked_path, &unlocked_path] {
            let mode = fs::metadata(path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_unlock_wrong_password_leaves_no_output() {
        let temp_dir = TempDir::new().unwrap();
        let plain_path = temp_dir.path().join("plain.txt");
        let locked_path = temp_dir.path().join("plain.txt.locker");
        let unlocked_path = temp_dir.path().join("unlocked.txt");

        fs::write(&plain_path, b"secret").unwrap();
        lock_file(&plain_path, &locked_path, b"correct").unwrap();

        let err = unlock_file(&locked_path, &unlocked_path, b"wrong")
            .expect_err("expected authentication failure");
        assert_eq!(err.kind, Some(ErrorKind::AuthenticationFailed));
        assert!(!unlocked_path.exists());
        assert!(leftovers(temp_dir.path()).is_empty());
    }

    #[test]
    fn test_lock_directory_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let locked_path = temp_dir.path().join("dir.locker");

        let err = lock_file(temp_dir.path(), &locked_path, b"pw").expect_err("expected usage error");
        assert_eq!(err.category, ErrorCategory::Usage);
        assert_eq!(err.kind, Some(ErrorKind::IsDirectory));
        assert!(!locked_path.exists());
    }

    #[test]
    fn test_lock_missing_input() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing.txt");
        let locked_path = temp_dir.path().join("missing.txt.locker");

        let err = lock_file(&missing, &locked_path, b"pw").expect_err("expected io error");
        assert_eq!(err.category, ErrorCategory::Io);
        assert!(!locked_path.exists());
    }

    #[test]
    fn test_lock_into_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let plain_path = temp_dir.path().join("plain.txt");
        fs::write(&plain_path, b"data").unwrap();
        let locked_path = temp_dir.path().join("no-such-dir").join("plain.txt.locker");

        let err = lock_file(&plain_path, &locked_path, b"pw").expect_err("expected io error");
        assert_eq!(err.category, ErrorCategory::Io);
        assert!(!locked_path.exists());
    }

    #[test]
    #[cfg(unix)]
    fn test_lock_input_growing_mid_read_leaves_no_output() {
        let temp_dir = TempDir::new().unwrap();
        let fifo = temp_dir.path().join("pipe");
        let locked_path = temp_dir.path().join("pipe.locker");

        let status = std::process::Command::new("mkfifo")
            .arg(&fifo)
            .status()
            .unwrap();
        assert!(status.success());

        // A FIFO stats as 0 bytes, but the writer delivers more than that.
        let writer_path = fifo.clone();
        let writer = std::thread::spawn(move || {
            let mut pipe = fs::OpenOptions::new().write(true).open(writer_path).unwrap();
            pipe.write_all(b"bytes the stat did not report").unwrap();
        });

        let err = lock_file(&fifo, &locked_path, b"pw").expect_err("expected input change");
        writer.join().unwrap();

        assert_eq!(err.category, ErrorCategory::Io);
        assert_eq!(err.kind, Some(ErrorKind::InputChanged));
        assert!(!locked_path.exists());
        assert!(leftovers(temp_dir.path()).is_empty());
    }

    #[test]
    fn test_oversized_input_reports_real_length() {
        let err = stored_size(Path::new("huge.bin"), u64::MAX).expect_err("expected usage error");
        assert_eq!(err.category, ErrorCategory::Usage);
        assert_eq!(err.kind, Some(ErrorKind::FileTooLarge(u64::MAX)));
        assert!(err.to_string().contains(&u64::MAX.to_string()));

        assert_eq!(stored_size(Path::new("ok.bin"), 42).unwrap(), 42);
        assert_eq!(stored_size(Path::new("max.bin"), i64::MAX as u64).unwrap(), i64::MAX);
    }

    #[test]
    fn test_peek_records_base_name_and_size() {
        let temp_dir = TempDir::new().unwrap();
        let plain_path = temp_dir.path().join("notes.md");
        let locked_path = temp_dir.path().join("out.locker");
        fs::write(&plain_path, b"twelve bytes").unwrap();

        lock_file(&plain_path, &locked_path, b"pw").unwrap();

        let header = peek_header(&locked_path).unwrap();
        assert_eq!(header.original_filename, "notes.md");
        assert_eq!(header.original_size, 12);
        assert_eq!(peek_filename(&locked_path).unwrap(), "notes.md");
    }

    #[test]
    fn test_existing_output_untouched_on_failure() {
        let temp_dir = TempDir::new().unwrap();
        let plain_path = temp_dir.path().join("plain.txt");
        let locked_path = temp_dir.path().join("plain.txt.locker");
        let unlocked_path = temp_dir.path().join("keep.txt");

        fs::write(&plain_path, b"secret").unwrap();
        fs::write(&unlocked_path, b"previous contents").unwrap();
        lock_file(&plain_path, &locked_path, b"correct").unwrap();

        unlock_file(&locked_path, &unlocked_path, b"wrong").expect_err("expected failure");
        assert_eq!(fs::read(&unlocked_path).unwrap(), b"previous contents");
    }

    #[test]
    fn test_default_locked_path() {
        assert_eq!(
            default_locked_path(Path::new("dir/report final.pdf")),
            PathBuf::from("dir/report final.pdf.locker")
        );
        assert_eq!(
            default_locked_path(Path::new("noext")),
            PathBuf::from("noext.locker")
        );
    }

    #[test]
    fn test_default_unlocked_path() {
        assert_eq!(
            default_unlocked_path("report final.pdf"),
            PathBuf::from("report final_unlocked.pdf")
        );
        assert_eq!(
            default_unlocked_path("archive.tar.gz"),
            PathBuf::from("archive.tar_unlocked.gz")
        );
        assert_eq!(default_unlocked_path("notes"), PathBuf::from("notes_unlocked"));
        assert_eq!(
            default_unlocked_path(".bashrc"),
            PathBuf::from(".bashrc_unlocked")
        );
    }

    #[test]
    fn test_default_unlocked_path_strips_directories() {
        assert_eq!(
            default_unlocked_path("../../etc/passwd"),
            PathBuf::from("passwd_unlocked")
        );
        assert_eq!(
            default_unlocked_path("/abs/secret.txt"),
            PathBuf::from("secret_unlocked.txt")
        );
        assert_eq!(default_unlocked_path(".."), PathBuf::from("_unlocked"));
        assert_eq!(default_unlocked_path(""), PathBuf::from("_unlocked"));
    }
}
