use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::codec::EncoderConfig;
use crate::harness::TestMode;
use crate::source::{ResizeStep, SyntheticSource, VideoSource, YuvFileSource};
use crate::video::{ImageFormat, Rational};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Recipe {
    pub version: u32,
    pub modes: Vec<TestMode>,
    pub source: SourceSpec,
    #[serde(default)]
    pub codec: CodecSpec,
    #[serde(default)]
    pub flags: FlagSpec,
    #[serde(default)]
    pub capture: CaptureSpec,
}

impl Recipe {
    /// Loads a recipe; relative file paths inside it resolve against the
    /// recipe's own directory.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read recipe file: {}", path.display()))?;
        let mut recipe: Recipe = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse recipe YAML: {}", path.display()))?;
        if let Some(base) = path.parent() {
            recipe.resolve_paths(base);
        }
        Ok(recipe)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        if let SourceSpec::YuvFile { path, .. } = &mut self.source {
            resolve(path);
        }
        if let Some(dir) = self.capture.ivf_dir.as_mut() {
            resolve(dir);
        }
        if let Some(dir) = self.capture.mismatch_dir.as_mut() {
            resolve(dir);
        }
    }

    pub fn encoder_config(&self) -> EncoderConfig {
        EncoderConfig {
            timebase: self.source.timebase(),
            lag_in_frames: self.codec.lag_in_frames,
            keyframe_interval: self.codec.keyframe_interval,
            quantizer: self.codec.quantizer,
            ..EncoderConfig::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SourceSpec {
    Synthetic {
        width: u32,
        height: u32,
        frames: u32,
        #[serde(default = "default_format")]
        format: ImageFormat,
        #[serde(default)]
        timebase: Rational,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        resize: Vec<ResizeStep>,
    },
    YuvFile {
        path: PathBuf,
        width: u32,
        height: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        frames: Option<u32>,
        #[serde(default)]
        timebase: Rational,
    },
}

fn default_format() -> ImageFormat {
    ImageFormat::I420
}

impl SourceSpec {
    pub fn timebase(&self) -> Rational {
        match self {
            SourceSpec::Synthetic { timebase, .. } | SourceSpec::YuvFile { timebase, .. } => {
                *timebase
            }
        }
    }

    pub fn open(&self) -> Box<dyn VideoSource> {
        match self {
            SourceSpec::Synthetic {
                width,
                height,
                frames,
                format,
                timebase,
                resize,
            } => Box::new(
                SyntheticSource::new(*width, *height, *frames)
                    .with_format(*format)
                    .with_timebase(*timebase)
                    .with_resize_schedule(resize.clone()),
            ),
            SourceSpec::YuvFile {
                path,
                width,
                height,
                frames,
                timebase,
            } => Box::new(YuvFileSource::new(path, *width, *height, *frames).with_timebase(*timebase)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CodecSpec {
    pub lag_in_frames: u32,
    pub keyframe_interval: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantizer: Option<u8>,
    /// Decode every frame packet and compare it with the encoder preview.
    pub decoder: bool,
}

impl Default for CodecSpec {
    fn default() -> Self {
        Self {
            lag_in_frames: 0,
            keyframe_interval: 30,
            quantizer: None,
            decoder: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FlagSpec {
    pub force_keyframes: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ivf_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mismatch_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_recipe_with_defaults() {
        let recipe: Recipe = serde_yaml::from_str(
            "version: 1\nmodes: [one-pass-good, two-pass-best]\nsource:\n  kind: synthetic\n  width: 16\n  height: 16\n  frames: 2\n",
        )
        .unwrap();
        assert_eq!(recipe.modes, vec![TestMode::OnePassGood, TestMode::TwoPassBest]);
        assert_eq!(recipe.codec, CodecSpec::default());
        assert!(recipe.codec.decoder);
        assert_eq!(recipe.source.timebase(), Rational::new(1, 30));
        let cfg = recipe.encoder_config();
        assert_eq!(cfg.keyframe_interval, 30);
    }

    #[test]
    fn relative_paths_follow_the_recipe_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("clip.yaml");
        std::fs::write(
            &path,
            "version: 1\nmodes: [realtime]\nsource:\n  kind: yuv-file\n  path: clip.yuv\n  width: 4\n  height: 2\ncapture:\n  ivf_dir: out\n",
        )
        .unwrap();
        let recipe = Recipe::load(&path).unwrap();
        match &recipe.source {
            SourceSpec::YuvFile { path, frames, .. } => {
                assert_eq!(path, &temp.path().join("clip.yuv"));
                assert_eq!(*frames, None);
            }
            other => panic!("unexpected source {other:?}"),
        }
        assert_eq!(recipe.capture.ivf_dir, Some(temp.path().join("out")));
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let err = serde_yaml::from_str::<Recipe>(
            "version: 1\nmodes: [three-pass]\nsource:\n  kind: synthetic\n  width: 1\n  height: 1\n  frames: 1\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("three-pass"));
    }
}
