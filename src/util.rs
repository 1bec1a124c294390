use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::constants::RANDOM_ID_LENGTH;

/// Generates a fresh random identifier of [`RANDOM_ID_LENGTH`] bytes.
#[must_use]
pub fn random_id() -> Vec<u8> {
    let bytes: [u8; RANDOM_ID_LENGTH] = Uuid::new_v4().into_bytes();
    bytes.to_vec()
}

/// Expands a leading `~` to the current user's home directory.
///
/// Paths without the shortcut, and systems without a resolvable home
/// directory, are returned unchanged.
#[must_use]
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs_next::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}
