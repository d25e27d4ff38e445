//! Fixed format and key-derivation policy
//!
//! Every container written by this crate uses exactly these values. None of
//! them are configurable at runtime: a container's resistance to offline
//! brute force must not depend on caller choices.

/// Magic tag at offset 0 of every container.
pub const MAGIC: [u8; 4] = *b"LCKR";

/// The only container format version this build reads or writes.
pub const FORMAT_VERSION: u16 = 1;

/// Length of the per-container Argon2id salt in bytes.
pub const SALT_LEN: usize = 16;

/// Length of the AES-256-GCM nonce in bytes.
pub const NONCE_LEN: usize = 12;

/// Length of the derived key in bytes.
pub const KEY_LEN: usize = 32;

/// Length of the GCM authentication tag in bytes.
pub const TAG_LEN: usize = 16;

/// Suffix appended to an input path to name its container by default.
pub const LOCKED_SUFFIX: &str = ".locker";

/// Marker inserted before the extension of a recovered filename.
pub const UNLOCKED_MARKER: &str = "_unlocked";

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfPolicy {
    /// Number of passes over memory.
    pub time_cost: u32,
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Degree of parallelism (lanes).
    pub lanes: u32,
    /// Output length in bytes.
    pub output_len: usize,
}

/// 3 passes, 64 MiB, 4 lanes, 32-byte output.
pub const KDF_POLICY: KdfPolicy = KdfPolicy {
    time_cost: 3,
    memory_kib: 64 * 1024,
    lanes: 4,
    output_len: KEY_LEN,
};
