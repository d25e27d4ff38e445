//! Container header codec
//!
//! Every locker file starts with a header, all integers little-endian:
//!
//! ```text
//! offset  size  field
//! 0       4     magic "LCKR"
//! 4       2     version (u16)
//! 6       16    Argon2id salt
//! 22      4     filename length N (u32)
//! 26      N     original filename, UTF-8
//! 26+N    8     original file size (i64)
//! ```
//!
//! The AEAD blob produced by the cipher module follows immediately.

use crate::error::{ErrorCategory, ErrorKind, LockerError, Result};
use crate::policy::{FORMAT_VERSION, MAGIC, SALT_LEN};
use std::io::{self, Read, Write};

/// Size of the header with an empty filename.
const FIXED_LEN: usize = MAGIC.len() + 2 + SALT_LEN + 4 + 8;

/// Metadata stored in front of the ciphertext.
///
/// Magic and version are not fields: they are always the current
/// constants on write and are validated away on read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub salt: [u8; SALT_LEN],
    pub original_filename: String,
    pub original_size: i64,
}

impl Header {
    /// Number of bytes `write_header` produces for this header.
    pub fn encoded_len(&self) -> usize {
        FIXED_LEN + self.original_filename.len()
    }
}

/// Serialize a header into a fresh buffer.
pub fn encode_header(header: &Header) -> Result<Vec<u8>> {
    let name = header.original_filename.as_bytes();
    let name_len = u32::try_from(name.len()).map_err(|_| {
        LockerError::with_kind(
            ErrorCategory::Usage,
            ErrorKind::FilenameTooLong,
            format!(
                "filename of {} bytes does not fit the container header",
                name.len()
            ),
        )
    })?;

    let mut buf = Vec::with_capacity(header.encoded_len());
    buf.extend_from_slice(&MAGIC);
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf.extend_from_slice(&header.salt);
    buf.extend_from_slice(&name_len.to_le_bytes());
    buf.extend_from_slice(name);
    buf.extend_from_slice(&header.original_size.to_le_bytes());
    Ok(buf)
}

/// Write a header to `sink` in a single `write_all`.
pub fn write_header<W: Write + ?Sized>(sink: &mut W, header: &Header) -> Result<()> {
    let buf = encode_header(header)?;
    sink.write_all(&buf)
        .map_err(|e| LockerError::io("failed to write header", e))
}

/// Read and validate a header from `source`.
///
/// Leaves `source` positioned at the first byte of the ciphertext blob.
pub fn read_header<R: Read + ?Sized>(source: &mut R) -> Result<Header> {
    let mut magic = [0u8; 4];
    source.read_exact(&mut magic).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            LockerError::with_kind(
                ErrorCategory::Format,
                ErrorKind::BadMagic,
                "invalid locker file format: input too short",
            )
        } else {
            LockerError::io("failed to read magic", e)
        }
    })?;
    if magic != MAGIC {
        return Err(LockerError::with_kind(
            ErrorCategory::Format,
            ErrorKind::BadMagic,
            "invalid locker file format",
        ));
    }

    let mut version = [0u8; 2];
    read_field(source, &mut version, "version")?;
    let version = u16::from_le_bytes(version);
    if version != FORMAT_VERSION {
        return Err(LockerError::with_kind(
            ErrorCategory::Format,
            ErrorKind::UnsupportedVersion(version),
            format!("unsupported locker version: {}", version),
        ));
    }

    let mut salt = [0u8; SALT_LEN];
    read_field(source, &mut salt, "salt")?;

    let mut name_len = [0u8; 4];
    read_field(source, &mut name_len, "filename length")?;
    let name_len = u32::from_le_bytes(name_len);

    // Grow with the bytes actually present rather than trusting the prefix
    // for the allocation size.
    let mut name = Vec::new();
    (&mut *source)
        .take(u64::from(name_len))
        .read_to_end(&mut name)
        .map_err(|e| LockerError::io("failed to read filename", e))?;
    if name.len() as u64 != u64::from(name_len) {
        return Err(truncated(format!(
            "filename (expected {} bytes, got {})",
            name_len,
            name.len()
        )));
    }
    let original_filename = String::from_utf8(name).map_err(|e| {
        LockerError::with_kind_and_source(
            ErrorCategory::Format,
            ErrorKind::InvalidFilename,
            "corrupt header: stored filename is not valid UTF-8",
            e,
        )
    })?;

    let mut size = [0u8; 8];
    read_field(source, &mut size, "file size")?;
    let original_size = i64::from_le_bytes(size);
    if original_size < 0 {
        return Err(LockerError::with_kind(
            ErrorCategory::Format,
            ErrorKind::InvalidFileSize(original_size),
            format!("corrupt header: negative file size {}", original_size),
        ));
    }

    Ok(Header {
        salt,
        original_filename,
        original_size,
    })
}

fn read_field<R: Read + ?Sized>(source: &mut R, buf: &mut [u8], field: &str) -> Result<()> {
    source.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            truncated(field)
        } else {
            LockerError::io(format!("failed to read {}", field), e)
        }
    })
}

fn truncated(field: impl std::fmt::Display) -> LockerError {
    LockerError::with_kind(
        ErrorCategory::Format,
        ErrorKind::TruncatedHeader,
        format!("corrupt header: truncated while reading {}", field),
    )
}
