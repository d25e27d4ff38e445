//! locked - password-based file containers using Argon2id and AES-256-GCM

#![forbid(unsafe_code)]

pub mod cipher;
pub mod container;
pub mod error;
pub mod kdf;
pub mod locker;
pub mod password;
pub mod policy;

pub use error::{ErrorCategory, ErrorKind, LockerError, Result};
pub use locker::{
    default_locked_path, default_unlocked_path, lock_file, peek_filename, peek_header,
    unlock_file,
};
