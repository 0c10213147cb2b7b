//! Test orchestrator: runs one or two encoding passes over a frame source,
//! decodes every emitted frame and cross-checks the result against the
//! encoder's own reconstruction.

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, info_span};

use crate::codec::{
    CodecEngine, CodecError, CodecFactory, Deadline, Decoder, EncodeFlags, EncoderConfig,
    FramePacket, Packet, PassMode,
};
use crate::encoder::{Encoder, TwoPassStats};
use crate::observability::MetricsCollector;
use crate::source::VideoSource;
use crate::video::{Image, ImageDiff, diff_images};

/// Upper bound on loop iterations after the source is exhausted.
///
/// Each trailing iteration flushes the encoder; the loop keeps going only
/// while a flush still yields packets of any kind.
pub const MAX_TRAILING_FLUSHES: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecOp {
    Init,
    Reconfigure,
    Control,
    Encode,
    Flush,
    Decode,
}

impl fmt::Display for CodecOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CodecOp::Init => "encoder init",
            CodecOp::Reconfigure => "encoder reconfigure",
            CodecOp::Control => "encoder control",
            CodecOp::Encode => "encode",
            CodecOp::Flush => "flush",
            CodecOp::Decode => "decode",
        })
    }
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("{op} failed: {source}")]
    Codec {
        op: CodecOp,
        #[source]
        source: CodecError,
    },
    #[error("frame packet pts {pts} is earlier than previous pts {last_pts} (pass {pass})")]
    TimestampOrder { pass: u32, pts: i64, last_pts: i64 },
    #[error("Encoder/Decoder mismatch found in pass {pass} at pts {pts}: {diff}")]
    Mismatch { pass: u32, pts: i64, diff: ImageDiff },
    #[error("Unexpected mode '{0}'")]
    InvalidMode(String),
    #[error("encoder still emitting frames {0} iterations after end of stream")]
    FlushOverrun(u32),
    #[error("frame source failed: {0}")]
    Source(#[from] std::io::Error),
}

/// Symbolic test modes, each mapping to a deadline and a pass count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TestMode {
    Realtime,
    OnePassGood,
    OnePassBest,
    TwoPassGood,
    TwoPassBest,
}

impl TestMode {
    pub const ALL: [TestMode; 5] = [
        TestMode::Realtime,
        TestMode::OnePassGood,
        TestMode::OnePassBest,
        TestMode::TwoPassGood,
        TestMode::TwoPassBest,
    ];

    pub fn deadline(self) -> Deadline {
        match self {
            TestMode::Realtime => Deadline::Realtime,
            TestMode::OnePassGood | TestMode::TwoPassGood => Deadline::GoodQuality,
            TestMode::OnePassBest | TestMode::TwoPassBest => Deadline::BestQuality,
        }
    }

    pub fn passes(self) -> u32 {
        match self {
            TestMode::TwoPassGood | TestMode::TwoPassBest => 2,
            _ => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TestMode::Realtime => "realtime",
            TestMode::OnePassGood => "one-pass-good",
            TestMode::OnePassBest => "one-pass-best",
            TestMode::TwoPassGood => "two-pass-good",
            TestMode::TwoPassBest => "two-pass-best",
        }
    }
}

impl fmt::Display for TestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestMode {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        TestMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == name)
            .ok_or_else(|| HarnessError::InvalidMode(name.to_string()))
    }
}

/// Customisation points for specialised tests. Every method defaults to a no-op.
pub trait EncoderHooks<E: CodecEngine> {
    fn begin_pass(&mut self, _pass: u32, _cfg: &mut EncoderConfig) {}

    fn end_pass(&mut self) {}

    fn pre_encode_frame(&mut self, _video: &dyn VideoSource) {}

    fn pre_encode_frame_with_encoder(
        &mut self,
        _video: &dyn VideoSource,
        _encoder: &mut Encoder<'_, E>,
    ) -> Result<(), HarnessError> {
        Ok(())
    }

    fn frame_packet(&mut self, _packet: &FramePacket) {}

    /// Called with both images right before a mismatch aborts the run.
    fn mismatch(&mut self, _encoded: &Image, _decoded: &Image) {}

    /// Checked after every frame and after every pass.
    fn should_continue(&self) -> bool {
        true
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl<E: CodecEngine> EncoderHooks<E> for NoHooks {}

#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub index: u32,
    pub pass_mode: PassMode,
    pub frames_in: u32,
    pub frame_packets: u32,
    pub stats_packets: u32,
    pub other_packets: u32,
    pub compressed_bytes: u64,
    pub compared_frames: u32,
    pub reconfigurations: u32,
    pub last_pts: i64,
    /// Size of the statistics buffer when the pass started and when it ended.
    pub stats_bytes_in: usize,
    pub stats_bytes_out: usize,
}

impl PassReport {
    fn new(index: u32, pass_mode: PassMode, stats_bytes_in: usize) -> Self {
        Self {
            index,
            pass_mode,
            frames_in: 0,
            frame_packets: 0,
            stats_packets: 0,
            other_packets: 0,
            compressed_bytes: 0,
            compared_frames: 0,
            reconfigurations: 0,
            last_pts: 0,
            stats_bytes_in,
            stats_bytes_out: stats_bytes_in,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub mode: TestMode,
    pub deadline: Deadline,
    pub passes: Vec<PassReport>,
}

impl RunReport {
    pub fn final_pass(&self) -> Option<&PassReport> {
        self.passes.last()
    }
}

pub struct EncoderTest<F: CodecFactory> {
    factory: F,
    mode: TestMode,
    deadline: Deadline,
    passes: u32,
    flags: EncodeFlags,
    cfg: EncoderConfig,
    stats: TwoPassStats,
    metrics: MetricsCollector,
}

impl<F: CodecFactory> EncoderTest<F> {
    pub fn new(factory: F) -> Self {
        let mode = TestMode::OnePassGood;
        Self {
            factory,
            mode,
            deadline: mode.deadline(),
            passes: mode.passes(),
            flags: EncodeFlags::empty(),
            cfg: EncoderConfig::default(),
            stats: TwoPassStats::new(),
            metrics: MetricsCollector::new(),
        }
    }

    pub fn with_config(mut self, cfg: EncoderConfig) -> Self {
        self.cfg = cfg;
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn set_mode(&mut self, mode: TestMode) {
        self.mode = mode;
        self.deadline = mode.deadline();
        self.passes = mode.passes();
    }

    pub fn set_mode_name(&mut self, name: &str) -> Result<(), HarnessError> {
        self.set_mode(name.parse()?);
        Ok(())
    }

    pub fn set_flags(&mut self, flags: EncodeFlags) {
        self.flags = flags;
    }

    pub fn mode(&self) -> TestMode {
        self.mode
    }

    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    pub fn passes(&self) -> u32 {
        self.passes
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.cfg
    }

    pub fn config_mut(&mut self) -> &mut EncoderConfig {
        &mut self.cfg
    }

    pub fn stats(&self) -> &TwoPassStats {
        &self.stats
    }

    pub fn metrics(&self) -> MetricsCollector {
        self.metrics.clone()
    }

    /// Runs every pass of the current mode over `video`.
    ///
    /// Any codec failure, timestamp regression or reconstruction mismatch
    /// aborts the run and is returned as is.
    pub fn run_loop<H>(
        &mut self,
        video: &mut dyn VideoSource,
        hooks: &mut H,
    ) -> Result<RunReport, HarnessError>
    where
        H: EncoderHooks<F::Engine>,
    {
        let run_span = info_span!("run", mode = %self.mode);
        let _run_guard = run_span.enter();

        self.stats.reset();
        let mut report = RunReport {
            mode: self.mode,
            deadline: self.deadline,
            passes: Vec::with_capacity(self.passes as usize),
        };

        for pass in 0..self.passes {
            self.cfg.pass = if self.passes == 1 {
                PassMode::OnePass
            } else if pass == 0 {
                PassMode::FirstPass
            } else {
                PassMode::LastPass
            };
            let pass_span = info_span!("pass", pass, pass_mode = ?self.cfg.pass);
            let _pass_guard = pass_span.enter();

            hooks.begin_pass(pass, &mut self.cfg);

            let mut pass_report = PassReport::new(pass, self.cfg.pass, self.stats.len());
            let mut last_pts: i64 = 0;
            let mut encoder = Encoder::new(
                self.cfg.clone(),
                self.deadline,
                &mut self.stats,
                self.factory.new_engine(),
            );
            let mut decoder = self.factory.new_decoder();

            video.begin()?;
            let mut trailing_flushes = 0u32;
            loop {
                let has_image = video.img().is_some();
                if !has_image {
                    trailing_flushes += 1;
                    if trailing_flushes > MAX_TRAILING_FLUSHES {
                        return Err(HarnessError::FlushOverrun(MAX_TRAILING_FLUSHES));
                    }
                }
                let mut again = has_image;

                hooks.pre_encode_frame(&*video);
                hooks.pre_encode_frame_with_encoder(&*video, &mut encoder)?;
                {
                    let _timer = self.metrics.start_phase("encode");
                    encoder.encode_frame(&*video, self.flags)?;
                }
                if has_image {
                    pass_report.frames_in += 1;
                    self.metrics.record_frame_encoded();
                }

                let mut has_cxdata = false;
                for pkt in encoder.cx_data() {
                    // Any output, stats included, may be followed by more on the next flush.
                    again = true;
                    let frame = match pkt {
                        Packet::Frame(frame) => frame,
                        Packet::Stats(_) => {
                            pass_report.stats_packets += 1;
                            self.metrics.record_stats_packet();
                            continue;
                        }
                        Packet::Other { .. } => {
                            pass_report.other_packets += 1;
                            continue;
                        }
                    };
                    has_cxdata = true;

                    if let Some(decoder) = decoder.as_mut() {
                        let _timer = self.metrics.start_phase("decode");
                        decoder.decode(&frame.data).map_err(|source| HarnessError::Codec {
                            op: CodecOp::Decode,
                            source,
                        })?;
                    }

                    if frame.pts < last_pts {
                        error!(pts = frame.pts, last_pts, "Frame packet timestamp went backwards");
                        return Err(HarnessError::TimestampOrder {
                            pass,
                            pts: frame.pts,
                            last_pts,
                        });
                    }
                    last_pts = frame.pts;

                    pass_report.frame_packets += 1;
                    pass_report.compressed_bytes += frame.size() as u64;
                    self.metrics.record_frame_packet(frame.size());
                    debug!(pts = frame.pts, bytes = frame.size(), keyframe = frame.keyframe, "Frame packet");
                    hooks.frame_packet(frame);
                }

                if has_cxdata && let Some(decoder) = decoder.as_ref() {
                    let encoded = encoder.preview_frame();
                    let decoded = decoder.dx_data().next();
                    if let (Some(encoded), Some(decoded)) = (encoded, decoded) {
                        let _timer = self.metrics.start_phase("compare");
                        let diff = diff_images(encoded, decoded);
                        if !diff.is_match() {
                            error!(pts = last_pts, %diff, "Encoder/Decoder mismatch");
                            hooks.mismatch(encoded, decoded);
                            return Err(HarnessError::Mismatch {
                                pass,
                                pts: last_pts,
                                diff,
                            });
                        }
                        pass_report.compared_frames += 1;
                        self.metrics.record_compared_frame();
                    }
                }

                video.advance()?;
                if !hooks.should_continue() || !again {
                    break;
                }
            }

            pass_report.reconfigurations = encoder.reconfigurations();
            drop(encoder);
            pass_report.last_pts = last_pts;
            pass_report.stats_bytes_out = self.stats.len();
            info!(
                frames_in = pass_report.frames_in,
                frame_packets = pass_report.frame_packets,
                stats_bytes = pass_report.stats_bytes_out,
                compared = pass_report.compared_frames,
                "Pass complete"
            );
            report.passes.push(pass_report);

            hooks.end_pass();
            if !hooks.should_continue() {
                break;
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_table() {
        let table: Vec<_> = TestMode::ALL
            .iter()
            .map(|mode| (mode.as_str(), mode.deadline(), mode.passes()))
            .collect();
        assert_eq!(
            table,
            vec![
                ("realtime", Deadline::Realtime, 1),
                ("one-pass-good", Deadline::GoodQuality, 1),
                ("one-pass-best", Deadline::BestQuality, 1),
                ("two-pass-good", Deadline::GoodQuality, 2),
                ("two-pass-best", Deadline::BestQuality, 2),
            ]
        );
    }

    #[test]
    fn mode_names_round_trip_and_unknown_names_fail() {
        for mode in TestMode::ALL {
            assert_eq!(mode.to_string().parse::<TestMode>().unwrap(), mode);
        }
        let err = "three-pass".parse::<TestMode>().unwrap_err();
        assert!(matches!(err, HarnessError::InvalidMode(ref name) if name == "three-pass"));
        assert!(err.to_string().contains("Unexpected mode"));
    }
}
