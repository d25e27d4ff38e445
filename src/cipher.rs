//! Authenticated encryption using AES-256-GCM
//!
//! A ciphertext blob is laid out as:
//! - nonce: 12 bytes
//! - sealed box: variable length (ciphertext followed by the 16-byte GCM tag)
//!
//! No associated data is bound into the seal.
//!
//! The stream variants take `Read`/`Write` endpoints but still buffer the
//! whole payload: GCM cannot be opened incrementally without a chunked
//! framing, which this format does not define.

use crate::error::{ErrorCategory, ErrorKind, LockerError, Result};
use crate::policy::{KEY_LEN, NONCE_LEN};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use rand::rngs::OsRng;
use std::io::{self, Read, Write};
use tracing::debug;
use zeroize::Zeroizing;

const READ_CHUNK: usize = 8 * 1024;

fn new_cipher(key: &[u8]) -> Result<Aes256Gcm> {
    if key.len() != KEY_LEN {
        return Err(LockerError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::InvalidKeyLength {
                expected: KEY_LEN,
                actual: key.len(),
            },
            format!(
                "key must be {} bytes for AES-256, got {}",
                KEY_LEN,
                key.len()
            ),
        ));
    }
    Aes256Gcm::new_from_slice(key).map_err(|_| {
        LockerError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::InvalidKeyLength {
                expected: KEY_LEN,
                actual: key.len(),
            },
            "failed to initialize AES-256-GCM",
        )
    })
}

fn generate_nonce() -> Result<[u8; NONCE_LEN]> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.try_fill_bytes(&mut nonce).map_err(|e| {
        LockerError::with_kind_and_source(
            ErrorCategory::Randomness,
            ErrorKind::EntropyUnavailable,
            "failed to generate nonce",
            e,
        )
    })?;
    Ok(nonce)
}

fn authentication_failed() -> LockerError {
    LockerError::with_kind(
        ErrorCategory::Authentication,
        ErrorKind::AuthenticationFailed,
        "decryption failed (wrong password?)",
    )
}

/// Seal `plaintext` with a caller-chosen nonce.
///
/// Only `encrypt`, `encrypt_stream` and known-answer tests may call this; a
/// nonce must never be reused with the same key.
fn seal_with_nonce(
    cipher: &Aes256Gcm,
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    let sealed_box = cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|e| {
            LockerError::new(ErrorCategory::Internal, format!("encryption failed: {}", e))
        })?;

    let mut output = Vec::with_capacity(NONCE_LEN + sealed_box.len());
    output.extend_from_slice(nonce);
    output.extend_from_slice(&sealed_box);
    Ok(output)
}

fn open(cipher: &Aes256Gcm, blob: &[u8]) -> Result<Vec<u8>> {
    if blob.len() < NONCE_LEN {
        return Err(LockerError::with_kind(
            ErrorCategory::Authentication,
            ErrorKind::TruncatedCiphertext,
            "decryption failed: ciphertext too short",
        ));
    }
    let (nonce, sealed_box) = blob.split_at(NONCE_LEN);

    cipher
        .decrypt(Nonce::from_slice(nonce), sealed_box)
        .map_err(|_| authentication_failed())
}

/// Read `reader` to EOF into a buffer that never leaves an unwiped copy
/// behind: growth goes through a fresh `Zeroizing` allocation and the old
/// one is wiped on drop.
fn read_to_end_zeroizing<R: Read + ?Sized>(reader: &mut R) -> io::Result<Zeroizing<Vec<u8>>> {
    let mut buf = Zeroizing::new(Vec::with_capacity(READ_CHUNK));
    let mut chunk = Zeroizing::new([0u8; READ_CHUNK]);
    loop {
        let n = match reader.read(&mut chunk[..]) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if buf.len() + n > buf.capacity() {
            let mut grown = Zeroizing::new(Vec::with_capacity(
                (buf.capacity() * 2).max(buf.len() + n),
            ));
            grown.extend_from_slice(&buf);
            buf = grown;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Ok(buf)
}

/// Encrypt plaintext under a 32-byte key using a fresh random nonce
///
/// Returns nonce(12) + ciphertext + tag(16).
pub fn encrypt(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    // Fail on a bad key before spending entropy.
    let cipher = new_cipher(key)?;
    let nonce = generate_nonce()?;
    seal_with_nonce(&cipher, &nonce, plaintext)
}

/// Decrypt a nonce-prefixed blob produced by `encrypt`.
pub fn decrypt(key: &[u8], blob: &[u8]) -> Result<Vec<u8>> {
    let cipher = new_cipher(key)?;
    open(&cipher, blob)
}

/// Read all of `reader`, seal it, and write the blob to `writer`.
///
/// The plaintext buffer is wiped when this returns, including any
/// intermediate allocations made while reading. Returns the number of
/// plaintext bytes consumed.
pub fn encrypt_stream<R, W>(key: &[u8], reader: &mut R, writer: &mut W) -> Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let cipher = new_cipher(key)?;

    let plaintext = read_to_end_zeroizing(reader)
        .map_err(|e| LockerError::io("failed to read plaintext", e))?;

    let nonce = generate_nonce()?;
    let blob = seal_with_nonce(&cipher, &nonce, &plaintext)?;
    writer
        .write_all(&blob)
        .map_err(|e| LockerError::io("failed to write encrypted data", e))?;

    debug!(
        plaintext_len = plaintext.len(),
        blob_len = blob.len(),
        "sealed payload"
    );
    Ok(plaintext.len() as u64)
}

/// Read a blob from `reader`, open it, and write the plaintext to `writer`.
///
/// Nothing is written unless authentication succeeds. Returns the number
/// of plaintext bytes written.
pub fn decrypt_stream<R, W>(key: &[u8], reader: &mut R, writer: &mut W) -> Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let cipher = new_cipher(key)?;

    let mut blob = Vec::new();
    reader
        .read_to_end(&mut blob)
        .map_err(|e| LockerError::io("failed to read encrypted data", e))?;

    let plaintext = Zeroizing::new(open(&cipher, &blob)?);
    writer
        .write_all(&plaintext)
        .map_err(|e| LockerError::io("failed to write decrypted data", e))?;

    debug!(
        blob_len = blob.len(),
        plaintext_len = plaintext.len(),
        "opened payload"
    );
    Ok(plaintext.len() as u64)
}
