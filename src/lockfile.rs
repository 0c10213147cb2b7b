//! Golden digest lock: pins the bitstream every mode of a recipe produced so
//! later runs can be checked against it.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::harness::TestMode;
use crate::recipe::{CaptureSpec, Recipe, SourceSpec};
use crate::runner::ConformanceReport;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestLock {
    pub recipe_version: u32,
    pub recipe_hash: String,
    pub generated_at: DateTime<Utc>,
    pub modes: Vec<ModeLock>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeLock {
    pub mode: TestMode,
    pub frames: u32,
    pub bytes: u64,
    pub sha256: String,
}

pub fn build_lock(recipe: &Recipe, report: &ConformanceReport) -> Result<DigestLock> {
    let modes = recipe
        .modes
        .iter()
        .map(|mode| {
            let digest = report
                .outcome(*mode)
                .and_then(|outcome| outcome.final_digest())
                .ok_or_else(|| anyhow!("No digest recorded for mode '{mode}'"))?;
            Ok(ModeLock {
                mode: *mode,
                frames: digest.frames,
                bytes: digest.bytes,
                sha256: digest.sha256.clone(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(DigestLock {
        recipe_version: recipe.version,
        recipe_hash: hash_recipe(recipe)?,
        generated_at: Utc::now(),
        modes,
    })
}

pub fn generate_lock(recipe: &Recipe, report: &ConformanceReport, path: &Path) -> Result<()> {
    let lock = build_lock(recipe, report)?;
    let file = File::create(path)
        .with_context(|| format!("Failed to create lockfile: {}", path.display()))?;
    serde_yaml::to_writer(file, &lock)
        .with_context(|| format!("Failed to write lockfile: {}", path.display()))?;
    Ok(())
}

pub fn load_lock(path: &Path) -> Result<DigestLock> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read lockfile: {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse lockfile: {}", path.display()))
}

/// Compares a fresh run with a lock; returns one line per difference.
pub fn verify_lock(
    lock: &DigestLock,
    recipe: &Recipe,
    report: &ConformanceReport,
) -> Result<Vec<String>> {
    let mut problems = Vec::new();
    if lock.recipe_hash != hash_recipe(recipe)? {
        problems.push("Recipe changed since the lockfile was generated".to_string());
    }
    for locked in &lock.modes {
        let Some(digest) = report
            .outcome(locked.mode)
            .and_then(|outcome| outcome.final_digest())
        else {
            problems.push(format!("Mode '{}' was not run", locked.mode));
            continue;
        };
        if digest.sha256 != locked.sha256 {
            problems.push(format!(
                "Mode '{}' bitstream changed: expected {}, got {} ({} frames, {} bytes)",
                locked.mode, locked.sha256, digest.sha256, digest.frames, digest.bytes
            ));
        }
    }
    Ok(problems)
}

/// Hashes what determines the bitstream; capture settings and the directory
/// the recipe lives in do not take part.
fn hash_recipe(recipe: &Recipe) -> Result<String> {
    let mut normalized = recipe.clone();
    normalized.capture = CaptureSpec::default();
    if let SourceSpec::YuvFile { path, .. } = &mut normalized.source
        && let Some(name) = path.file_name()
    {
        *path = name.into();
    }
    let serialized =
        serde_json::to_vec(&normalized).context("Failed to serialize recipe for hashing")?;
    let mut hasher = Sha256::new();
    hasher.update(serialized);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presets::preset_recipe;
    use crate::runner::run_recipe;

    #[test]
    fn recipe_hash_ignores_capture_settings() {
        let recipe = preset_recipe("two-pass").unwrap();
        let mut moved = recipe.clone();
        moved.capture = CaptureSpec::default();
        assert_eq!(hash_recipe(&recipe).unwrap(), hash_recipe(&moved).unwrap());

        let mut changed = recipe.clone();
        changed.codec.lag_in_frames += 1;
        assert_ne!(hash_recipe(&recipe).unwrap(), hash_recipe(&changed).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn unhashable_recipe_fails_instead_of_sharing_a_hash() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let mut recipe = preset_recipe("smoke").unwrap();
        recipe.source = SourceSpec::YuvFile {
            path: OsStr::from_bytes(b"clip\xff.yuv").into(),
            width: 4,
            height: 4,
            frames: None,
            timebase: Default::default(),
        };

        let err = hash_recipe(&recipe).unwrap_err();
        assert!(err.to_string().contains("serialize recipe"), "{err:#}");

        let report = run_recipe(&preset_recipe("smoke").unwrap(), None).unwrap();
        let lock = build_lock(&preset_recipe("smoke").unwrap(), &report).unwrap();
        assert!(verify_lock(&lock, &recipe, &report).is_err());
    }
}
