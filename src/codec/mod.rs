//! Capabilities consumed by the harness: the codec engine, an independent
//! decoder, and the data they exchange.
//!
//! The harness never looks inside a codec. It drives an engine through
//! [`CodecEngine`], reads the engine's pending output as [`Packet`]s and feeds
//! compressed frames to a [`Decoder`] built by the same [`CodecFactory`].

pub mod packet;
pub mod reference;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::video::{Image, Rational};

pub use packet::{CxDataIter, DxDataIter};

/// Time budget handed to the engine for each encode call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Deadline {
    Realtime,
    GoodQuality,
    BestQuality,
}

impl Deadline {
    /// Per-frame budget in microseconds; zero means unlimited.
    pub fn as_micros(self) -> u64 {
        match self {
            Deadline::Realtime => 1,
            Deadline::GoodQuality => 1_000_000,
            Deadline::BestQuality => 0,
        }
    }
}

/// Rate-control pass the engine runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PassMode {
    #[default]
    OnePass,
    FirstPass,
    LastPass,
}

bitflags! {
    /// Per-frame encode flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EncodeFlags: u32 {
        const FORCE_KEYFRAME = 1;
    }
}

/// Codec configuration shared between the orchestrator and the encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderConfig {
    pub width: u32,
    pub height: u32,
    pub timebase: Rational,
    pub pass: PassMode,
    pub lag_in_frames: u32,
    pub keyframe_interval: u32,
    /// Overrides the deadline-derived quantiser when set.
    pub quantizer: Option<u8>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            timebase: Rational::default(),
            pass: PassMode::OnePass,
            lag_in_frames: 0,
            keyframe_interval: 30,
            quantizer: None,
        }
    }
}

/// Runtime controls accepted by an initialised engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EncoderControl {
    Quantizer(u8),
    KeyframeInterval(u32),
}

/// A compressed frame emitted by an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePacket {
    pub data: Vec<u8>,
    pub pts: i64,
    pub duration: u64,
    pub keyframe: bool,
}

impl FramePacket {
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Output unit of an encode or flush call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Frame(FramePacket),
    /// Fragment of first-pass statistics, appended verbatim to the stats buffer.
    Stats(Vec<u8>),
    /// Engine specific output the harness does not interpret.
    Other { kind: u32, data: Vec<u8> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CodecStatus {
    #[error("invalid parameter")]
    InvalidParam,
    #[error("bitstream is corrupt")]
    CorruptFrame,
    #[error("bitstream is not supported")]
    UnsupBitstream,
    #[error("codec does not implement the requested capability")]
    Incapable,
    #[error("unspecified error")]
    Error,
}

/// Failure reported by an engine or decoder, with the codec's own diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{status}: {detail}")]
pub struct CodecError {
    pub status: CodecStatus,
    pub detail: String,
}

impl CodecError {
    pub fn new(status: CodecStatus, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn invalid(detail: impl Into<String>) -> Self {
        Self::new(CodecStatus::InvalidParam, detail)
    }

    pub fn corrupt(detail: impl Into<String>) -> Self {
        Self::new(CodecStatus::CorruptFrame, detail)
    }
}

/// An encoder implementation driven by the harness.
///
/// After every [`encode`](CodecEngine::encode) call the packets it produced are
/// available from [`packets`](CodecEngine::packets) until the next call.
pub trait CodecEngine {
    fn name(&self) -> &'static str;

    /// `twopass_stats` is the run's statistics buffer; it is only meaningful
    /// when `cfg.pass` is [`PassMode::LastPass`].
    fn init(&mut self, cfg: &EncoderConfig, twopass_stats: &[u8]) -> Result<(), CodecError>;

    fn reconfigure(&mut self, cfg: &EncoderConfig) -> Result<(), CodecError>;

    fn control(&mut self, control: EncoderControl) -> Result<(), CodecError> {
        Err(CodecError::new(
            CodecStatus::Incapable,
            format!("{} does not support {control:?}", self.name()),
        ))
    }

    /// Encodes `frame`, or flushes buffered frames when `frame` is `None`.
    fn encode(
        &mut self,
        frame: Option<&Image>,
        pts: i64,
        duration: u64,
        flags: EncodeFlags,
        deadline: Deadline,
    ) -> Result<(), CodecError>;

    /// Output of the most recent encode call.
    fn packets(&self) -> &[Packet];

    /// Reconstruction of the most recently emitted frame.
    fn preview_frame(&self) -> Option<&Image>;
}

/// A decoder implemented independently of the engine it checks.
pub trait Decoder {
    fn decode(&mut self, data: &[u8]) -> Result<(), CodecError>;

    /// The most recently decoded image.
    fn output_frame(&self) -> Option<&Image>;

    fn dx_data(&self) -> DxDataIter<'_> {
        DxDataIter::new(self.output_frame())
    }
}

/// Builds fresh codec contexts; the orchestrator asks for a new pair every pass.
pub trait CodecFactory {
    type Engine: CodecEngine;
    type Decoder: Decoder;

    fn new_engine(&self) -> Self::Engine;

    /// `None` runs the harness without reconstruction checks.
    fn new_decoder(&self) -> Option<Self::Decoder>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_budgets_follow_speed() {
        assert_eq!(Deadline::BestQuality.as_micros(), 0);
        assert!(Deadline::Realtime.as_micros() < Deadline::GoodQuality.as_micros());
    }
}
