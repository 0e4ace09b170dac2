//! Deployment generation id.
//!
//! The id is a decimal number stored in `<root>/data/generation` and names
//! the finalized asset bundle, so every deployment busts browser caches.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rand::Rng;

/// Task name that regenerates the id and exits.
pub const GENERATION_TASK: &str = "keystone:generation";

pub fn path(root: &Path) -> PathBuf {
    root.join("data").join("generation")
}

/// Read the current id, ignoring any non-digit characters.
///
/// Returns `None` when the file is absent or holds no digits.
pub fn read(root: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path(root)).ok()?;
    let digits: String = content.chars().filter(char::is_ascii_digit).collect();
    (!digits.is_empty()).then_some(digits)
}

/// Write a fresh id and return it.
pub fn regenerate(root: &Path) -> Result<String> {
    let id = rand::thread_rng().gen_range(0..1_000_000_000u64).to_string();
    let file = path(root);
    if let Some(parent) = file.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(&file, &id).with_context(|| format!("failed to write {}", file.display()))?;
    Ok(id)
}
