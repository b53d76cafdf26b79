//! 128-bit identities for stored content and discovered directories.
//!
//! Files are identified by the bytes that end up in the store, directories by
//! their normalized absolute path. The two constructors are deliberately
//! separate: a directory has no content to hash.

use std::{
    fmt,
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::AppError;

/// Deterministic identity of an item in the archive.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ContentId(Uuid);

impl ContentId {
    /// Sentinel identity of the virtual root every top-level link hangs from.
    pub const ROOT: ContentId = ContentId(Uuid::nil());

    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_nil()
    }

    /// Lowercase 32 character hex form, used for record ids and store paths.
    pub fn to_hex(&self) -> String {
        self.0.simple().to_string()
    }

    pub fn from_hex(hex: &str) -> Result<Self, AppError> {
        if hex.len() != 32 {
            return Err(AppError::Validation(format!(
                "Invalid identity length: expected 32 hex characters, got {}",
                hex.len()
            )));
        }
        Uuid::try_parse(hex)
            .map(Self)
            .map_err(|err| AppError::Validation(format!("Invalid identity {hex}: {err}")))
    }

    /// Identity of an in-memory byte sequence.
    pub fn of_content(data: &[u8]) -> Self {
        truncate(Sha256::digest(data).as_slice())
    }

    /// Identity of everything readable from `reader`, streamed in 8KB chunks.
    pub fn of_reader<R: Read>(reader: R) -> Result<Self, AppError> {
        let mut reader = BufReader::new(reader);
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 8192];

        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(buffer.get(..n).unwrap_or_default());
        }

        Ok(truncate(hasher.finalize().as_slice()))
    }

    /// Identity of the bytes currently stored in the file at `path`.
    pub fn of_file(path: &Path) -> Result<Self, AppError> {
        Self::of_reader(File::open(path)?)
    }

    /// Identity of a directory, derived from its absolute path.
    ///
    /// Separators are normalized to `/` so the same tree hashes identically
    /// regardless of the platform that walked it. The path is hashed behind a
    /// domain tag, so no file content can collide with a directory.
    pub fn of_directory(absolute_path: &Path) -> Self {
        let normalized = absolute_path.to_string_lossy().replace('\\', "/");
        let mut hasher = Sha256::new();
        hasher.update(DIRECTORY_DOMAIN);
        hasher.update(normalized.as_bytes());
        truncate(hasher.finalize().as_slice())
    }
}

const DIRECTORY_DOMAIN: &[u8] = b"dir\0";

fn truncate(digest: &[u8]) -> ContentId {
    let mut bytes = [0u8; 16];
    for (slot, byte) in bytes.iter_mut().zip(digest) {
        *slot = *byte;
    }
    ContentId::from_bytes(bytes)
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({})", self.to_hex())
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
