use std::error::Error as StdError;

use thiserror::Error;

/// Broad failure class. Callers branch on this to decide how to report an
/// error; it is always present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// The caller asked for something unsupported, such as locking a
    /// directory. Reported before any side effects.
    Usage,

    /// A path could not be opened, created, read or written.
    Io,

    /// The input is not a locker container, or its header is damaged or
    /// from an unsupported format version. Distinct from `Io` so callers can
    /// tell "not a container" from "disk problem".
    Format,

    /// The AEAD seal did not open. Covers a wrong password as well as
    /// tampered or truncated ciphertext; the two are deliberately not
    /// distinguished.
    Authentication,

    /// The operating system could not provide secure random bytes.
    Randomness,

    /// Any failure that cannot be attributed to another category.
    Internal,
}

/// Fine-grained condition tags for consumers that want to branch on error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A directory was given where a regular file is required.
    IsDirectory,
    /// The input filename is not valid UTF-8 or the stored filename does not decode.
    InvalidFilename,
    /// The filename does not fit the header's 32-bit length prefix.
    FilenameTooLong,
    /// The first four bytes are not the container magic tag.
    BadMagic,
    /// The header carries a format version this build does not read.
    UnsupportedVersion(u16),
    /// The input ended before a header field could be read in full.
    TruncatedHeader,
    /// The stored original size is negative.
    InvalidFileSize(i64),
    /// The input is larger than the header's signed 64-bit size field holds.
    FileTooLarge(u64),
    /// The decrypted payload length disagrees with the size stored in the header.
    SizeMismatch { expected: u64, actual: u64 },
    /// The ciphertext blob is shorter than a nonce.
    TruncatedCiphertext,
    /// AEAD authentication failed.
    AuthenticationFailed,
    /// A key of the wrong length was handed to the cipher.
    InvalidKeyLength { expected: usize, actual: usize },
    /// Argon2id rejected its parameters or inputs.
    KeyDerivation,
    /// The input file changed size while it was being locked.
    InputChanged,
    /// The operating system's random source returned an error.
    EntropyUnavailable,
    /// A password could not be obtained from the configured reader.
    PasswordUnavailable,
    /// Interaction with the filesystem, stdin/stdout, or other I/O failed.
    Io,
}

#[derive(Debug, Error)]
#[error("{msg}")]
pub struct LockerError {
    /// Broad error category, always provided.
    pub category: ErrorCategory,
    /// Optional specific condition tag. Any code consuming errors MUST
    /// handle the absence of a defined kind.
    pub kind: Option<ErrorKind>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    msg: String,
}

impl LockerError {
    /// Creates a new error with a required category and display message.
    pub fn new(category: ErrorCategory, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: None,
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that also tags the failure with a kind.
    pub fn with_kind(category: ErrorCategory, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that carries both a kind tag and the originating source error.
    pub fn with_kind_and_source(
        category: ErrorCategory,
        kind: ErrorKind,
        msg: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: Some(Box::new(source)),
            msg: msg.into(),
        }
    }

    /// Shorthand for an I/O failure that keeps the `io::Error` as its source.
    pub fn io(msg: impl Into<String>, source: std::io::Error) -> Self {
        Self::with_kind_and_source(ErrorCategory::Io, ErrorKind::Io, msg, source)
    }

    /// The user-facing message carried by the error.
    pub fn message(&self) -> &str {
        &self.msg
    }

    /// Returns the preserved source error if present.
    pub fn source_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// True if the AEAD seal failed to open, whatever the cause.
    pub fn is_authentication_failure(&self) -> bool {
        self.category == ErrorCategory::Authentication
    }

    /// Wraps the current error with a higher-level message while preserving the original as source.
    pub fn with_context(self, msg: impl Into<String>) -> Self {
        let category = self.category;
        let kind = self.kind;
        Self {
            category,
            kind,
            source: Some(Box::new(self)),
            msg: msg.into(),
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, LockerError>;
