use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::harness::TestMode;
use crate::recipe::{CaptureSpec, CodecSpec, FlagSpec, Recipe, SourceSpec};
use crate::source::ResizeStep;
use crate::video::{ImageFormat, Rational};

pub const PRESET_NAMES: [&str; 3] = ["smoke", "two-pass", "resize"];

pub fn preset_recipe(name: &str) -> Result<Recipe> {
    let recipe = match name {
        "smoke" => smoke_preset(),
        "two-pass" => two_pass_preset(),
        "resize" => resize_preset(),
        other => anyhow::bail!(
            "Unknown preset '{other}' (expected one of: {})",
            PRESET_NAMES.join(", ")
        ),
    };
    Ok(recipe)
}

pub fn generate_preset(name: &str, destination: &Path) -> Result<PathBuf> {
    let preset = preset_recipe(name)?;

    let rendered = serde_yaml::to_string(&preset)?;
    if let Some(parent) = destination.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(destination, rendered)
        .with_context(|| format!("Failed to write preset recipe: {}", destination.display()))?;

    Ok(destination.to_path_buf())
}

/// Every mode over a couple of tiny frames.
fn smoke_preset() -> Recipe {
    Recipe {
        version: 1,
        modes: TestMode::ALL.to_vec(),
        source: synthetic(16, 16, 2, Vec::new()),
        codec: CodecSpec::default(),
        flags: FlagSpec::default(),
        capture: CaptureSpec::default(),
    }
}

fn two_pass_preset() -> Recipe {
    Recipe {
        version: 1,
        modes: vec![TestMode::TwoPassGood, TestMode::TwoPassBest],
        source: synthetic(64, 48, 10, Vec::new()),
        codec: CodecSpec {
            lag_in_frames: 5,
            ..CodecSpec::default()
        },
        flags: FlagSpec::default(),
        capture: CaptureSpec {
            ivf_dir: Some(PathBuf::from("./out/ivf")),
            mismatch_dir: Some(PathBuf::from("./out/mismatch")),
        },
    }
}

fn resize_preset() -> Recipe {
    Recipe {
        version: 1,
        modes: vec![TestMode::Realtime, TestMode::OnePassGood],
        source: synthetic(
            32,
            32,
            9,
            vec![
                ResizeStep {
                    at_frame: 3,
                    width: 48,
                    height: 24,
                },
                ResizeStep {
                    at_frame: 6,
                    width: 16,
                    height: 40,
                },
            ],
        ),
        codec: CodecSpec {
            keyframe_interval: 4,
            ..CodecSpec::default()
        },
        flags: FlagSpec::default(),
        capture: CaptureSpec::default(),
    }
}

fn synthetic(width: u32, height: u32, frames: u32, resize: Vec<ResizeStep>) -> SourceSpec {
    SourceSpec::Synthetic {
        width,
        height,
        frames,
        format: ImageFormat::I420,
        timebase: Rational::new(1, 30),
        resize,
    }
}
