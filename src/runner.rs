//! Drives one [`EncoderTest`] per recipe mode with the reference codec and
//! the capture hooks, and collects the results into a serialisable report.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::capture::{CaptureHooks, PassDigest};
use crate::codec::EncodeFlags;
use crate::codec::reference::ReferenceCodec;
use crate::harness::{EncoderTest, RunReport, TestMode};
use crate::observability::{MetricsCollector, MetricsSnapshot};
use crate::recipe::Recipe;

#[derive(Debug, Serialize)]
pub struct ModeOutcome {
    pub mode: TestMode,
    pub run: RunReport,
    pub digests: Vec<PassDigest>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ivf_files: Vec<PathBuf>,
}

impl ModeOutcome {
    /// Digest of the bitstream the final pass produced.
    pub fn final_digest(&self) -> Option<&PassDigest> {
        self.digests.last()
    }
}

#[derive(Debug, Serialize)]
pub struct ConformanceReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipe: Option<PathBuf>,
    pub generated_at: DateTime<Utc>,
    pub metrics: MetricsSnapshot,
    pub modes: Vec<ModeOutcome>,
}

impl ConformanceReport {
    pub fn outcome(&self, mode: TestMode) -> Option<&ModeOutcome> {
        self.modes.iter().find(|outcome| outcome.mode == mode)
    }
}

/// Runs every mode of `recipe` in order, stopping at the first failure.
pub fn run_recipe(recipe: &Recipe, recipe_path: Option<&Path>) -> Result<ConformanceReport> {
    let metrics = MetricsCollector::new();
    let started = Instant::now();

    let mut modes = Vec::with_capacity(recipe.modes.len());
    for mode in &recipe.modes {
        modes.push(run_mode(recipe, *mode, &metrics)?);
    }
    metrics.record_total_duration(started.elapsed());

    Ok(ConformanceReport {
        recipe: recipe_path.map(Path::to_path_buf),
        generated_at: Utc::now(),
        metrics: metrics.snapshot(),
        modes,
    })
}

pub fn run_mode(recipe: &Recipe, mode: TestMode, metrics: &MetricsCollector) -> Result<ModeOutcome> {
    let factory = ReferenceCodec {
        with_decoder: recipe.codec.decoder,
    };
    let mut test = EncoderTest::new(factory)
        .with_config(recipe.encoder_config())
        .with_metrics(metrics.clone());
    test.set_mode(mode);
    if recipe.flags.force_keyframes {
        test.set_flags(EncodeFlags::FORCE_KEYFRAME);
    }

    let mut hooks = CaptureHooks::new(mode.as_str());
    if let Some(dir) = &recipe.capture.ivf_dir {
        hooks = hooks.with_ivf_dir(dir);
    }
    if let Some(dir) = &recipe.capture.mismatch_dir {
        hooks = hooks.with_mismatch_dir(dir);
    }

    let mut source = recipe.source.open();
    info!(mode = %mode, passes = mode.passes(), "Running conformance mode");
    let outcome = test.run_loop(&mut *source, &mut hooks);
    let capture = hooks.finish();

    let run = match outcome {
        Ok(run) => run,
        Err(err) => {
            if let Ok(capture) = &capture {
                for path in &capture.mismatch_files {
                    warn!(path = %path.display(), "Mismatching reconstruction written");
                }
            }
            return Err(err).with_context(|| format!("Mode '{mode}' failed"));
        }
    };
    let capture = capture.with_context(|| format!("Capture for mode '{mode}' failed"))?;

    Ok(ModeOutcome {
        mode,
        run,
        digests: capture.digests,
        ivf_files: capture.ivf_files,
    })
}

pub fn write_report(report: &ConformanceReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(report)?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write report: {}", path.display()))?;
    Ok(())
}
