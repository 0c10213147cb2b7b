use std::collections::HashSet;

use serde::Serialize;

use crate::codec::reference::{MAX_LAG_IN_FRAMES, MAX_QUANTIZER};
use crate::recipe::{Recipe, SourceSpec};
use crate::video::Rational;

#[derive(Debug, Default, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

pub fn validate_recipe(recipe: &Recipe) -> ValidationReport {
    let mut report = ValidationReport::default();

    if recipe.version != 1 {
        report
            .errors
            .push(format!("Unsupported recipe version: {}", recipe.version));
    }

    if recipe.modes.is_empty() {
        report.errors.push("At least one test mode is required".into());
    }
    let mut seen = HashSet::new();
    for mode in &recipe.modes {
        if !seen.insert(*mode) {
            report
                .warnings
                .push(format!("Mode '{mode}' is listed more than once"));
        }
    }

    report.merge(validate_source(&recipe.source));

    if recipe.codec.lag_in_frames > MAX_LAG_IN_FRAMES {
        report.errors.push(format!(
            "lag_in_frames {} exceeds the maximum of {MAX_LAG_IN_FRAMES}",
            recipe.codec.lag_in_frames
        ));
    }
    if let Some(q) = recipe.codec.quantizer
        && q > MAX_QUANTIZER
    {
        report
            .errors
            .push(format!("quantizer {q} exceeds the maximum of {MAX_QUANTIZER}"));
    }
    if recipe.codec.keyframe_interval == 0 {
        report
            .errors
            .push("keyframe_interval must be at least 1".into());
    }
    if !recipe.codec.decoder && recipe.capture.mismatch_dir.is_some() {
        report.warnings.push(
            "capture.mismatch_dir has no effect while the decoder is disabled".into(),
        );
    }

    report
}

fn validate_source(source: &SourceSpec) -> ValidationReport {
    let mut report = ValidationReport::default();
    match source {
        SourceSpec::Synthetic {
            width,
            height,
            frames,
            timebase,
            resize,
            ..
        } => {
            check_dimensions(&mut report, "Source", *width, *height);
            check_timebase(&mut report, *timebase);
            if *frames == 0 {
                report.errors.push("Source must produce at least one frame".into());
            }
            let mut previous = None;
            for (idx, step) in resize.iter().enumerate() {
                check_dimensions(
                    &mut report,
                    &format!("Resize step {}", idx + 1),
                    step.width,
                    step.height,
                );
                if let Some(prev) = previous
                    && step.at_frame <= prev
                {
                    report.errors.push(format!(
                        "Resize step {} (frame {}) must come after frame {prev}",
                        idx + 1,
                        step.at_frame
                    ));
                }
                if step.at_frame >= *frames {
                    report.warnings.push(format!(
                        "Resize step {} at frame {} is never reached ({} frames)",
                        idx + 1,
                        step.at_frame,
                        frames
                    ));
                }
                previous = Some(step.at_frame);
            }
        }
        SourceSpec::YuvFile {
            path,
            width,
            height,
            frames,
            timebase,
        } => {
            check_dimensions(&mut report, "Source", *width, *height);
            check_timebase(&mut report, *timebase);
            if *frames == Some(0) {
                report.errors.push("Source must produce at least one frame".into());
            }
            if !path.is_file() {
                report
                    .errors
                    .push(format!("Source file not found: {}", path.display()));
            }
        }
    }
    report
}

fn check_dimensions(report: &mut ValidationReport, what: &str, width: u32, height: u32) {
    if width == 0 || height == 0 {
        report
            .errors
            .push(format!("{what} dimensions must be non-zero (got {width}x{height})"));
    } else if width > u32::from(u16::MAX) || height > u32::from(u16::MAX) {
        report
            .errors
            .push(format!("{what} dimensions {width}x{height} exceed 65535"));
    }
}

fn check_timebase(report: &mut ValidationReport, timebase: Rational) {
    if timebase.numerator == 0 || timebase.denominator == 0 {
        report
            .errors
            .push(format!("Time-base {timebase} must have a non-zero numerator and denominator"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::TestMode;
    use crate::recipe::{CaptureSpec, CodecSpec, FlagSpec};
    use crate::source::ResizeStep;
    use crate::video::ImageFormat;

    fn recipe(source: SourceSpec) -> Recipe {
        Recipe {
            version: 1,
            modes: vec![TestMode::Realtime],
            source,
            codec: CodecSpec::default(),
            flags: FlagSpec::default(),
            capture: CaptureSpec::default(),
        }
    }

    fn synthetic(width: u32, resize: Vec<ResizeStep>) -> SourceSpec {
        SourceSpec::Synthetic {
            width,
            height: 8,
            frames: 4,
            format: ImageFormat::I420,
            timebase: Rational::new(1, 30),
            resize,
        }
    }

    #[test]
    fn accepts_well_formed_recipe() {
        let report = validate_recipe(&recipe(synthetic(8, Vec::new())));
        assert!(report.is_ok(), "{:?}", report.errors);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn reports_every_problem() {
        let step = |at_frame| ResizeStep {
            at_frame,
            width: 4,
            height: 4,
        };
        let mut bad = recipe(synthetic(0, vec![step(2), step(2)]));
        bad.version = 2;
        bad.modes.clear();
        bad.codec.lag_in_frames = 40;
        bad.codec.quantizer = Some(9);

        let report = validate_recipe(&bad);
        let joined = report.errors.join("\n");
        for needle in [
            "Unsupported recipe version",
            "At least one test mode",
            "non-zero",
            "must come after",
            "lag_in_frames 40",
            "quantizer 9",
        ] {
            assert!(joined.contains(needle), "missing '{needle}' in:\n{joined}");
        }
    }

    #[test]
    fn missing_yuv_file_is_an_error() {
        let report = validate_recipe(&recipe(SourceSpec::YuvFile {
            path: "/definitely/not/here.yuv".into(),
            width: 4,
            height: 4,
            frames: None,
            timebase: Rational::default(),
        }));
        assert!(!report.is_ok());
        assert!(report.errors[0].contains("not found"));
    }
}
