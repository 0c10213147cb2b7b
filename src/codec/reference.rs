//! Reference intra/delta run-length codec for 4:2:0 images.
//!
//! Small enough to read in one sitting, yet it has the properties the harness
//! cares about: frames are delayed by a lookahead queue and only leave the
//! engine on later calls or at flush, the first pass emits statistics instead
//! of frames, the last pass consumes them, and the reconstruction is lossy so
//! the encoder preview and the decoder output must agree bit for bit.
//!
//! Frame layout (little endian):
//!
//! ```text
//! "RLE4" | kind u8 | quantizer u8 | format u8 | 0u8 | width u16 | height u16
//!        | 3 x (payload_len u32 | run-length pairs (count u8, value u8))
//! ```
//!
//! Key frames carry quantised samples, inter frames carry the wrapping
//! difference against the previous reconstruction.

use std::collections::{HashMap, VecDeque};

use crate::codec::{
    CodecEngine, CodecError, CodecFactory, CodecStatus, Deadline, Decoder, EncodeFlags,
    EncoderConfig, EncoderControl, FramePacket, Packet, PassMode,
};
use crate::video::{Image, ImageFormat, PlaneKind};

const MAGIC: &[u8; 4] = b"RLE4";
const HEADER_LEN: usize = 12;
const KIND_KEY: u8 = 0;
const KIND_INTER: u8 = 1;

/// Largest accepted quantiser (number of low bits dropped per sample).
pub const MAX_QUANTIZER: u8 = 3;
/// Largest accepted lookahead depth.
pub const MAX_LAG_IN_FRAMES: u32 = 25;
/// Size of one first-pass statistics record.
pub const STATS_RECORD_LEN: usize = 16;

/// Stride alignment of decoder output images.
const DECODER_ALIGN: usize = 16;
const DECODER_PADDING: u8 = 0xA5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StatsRecord {
    pts: i64,
    activity: u32,
    flags: u32,
}

impl StatsRecord {
    fn to_bytes(self) -> [u8; STATS_RECORD_LEN] {
        let mut out = [0u8; STATS_RECORD_LEN];
        out[..8].copy_from_slice(&self.pts.to_le_bytes());
        out[8..12].copy_from_slice(&self.activity.to_le_bytes());
        out[12..].copy_from_slice(&self.flags.to_le_bytes());
        out
    }

    fn from_bytes(chunk: &[u8]) -> Self {
        let mut pts = [0u8; 8];
        pts.copy_from_slice(&chunk[..8]);
        let mut activity = [0u8; 4];
        activity.copy_from_slice(&chunk[8..12]);
        let mut flags = [0u8; 4];
        flags.copy_from_slice(&chunk[12..16]);
        Self {
            pts: i64::from_le_bytes(pts),
            activity: u32::from_le_bytes(activity),
            flags: u32::from_le_bytes(flags),
        }
    }
}

/// Per-frame activity gathered by the first pass, indexed by pts.
#[derive(Debug, Default)]
struct PassStats {
    activity: HashMap<i64, u32>,
    mean_activity: u32,
}

impl PassStats {
    fn parse(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.is_empty() {
            return Err(CodecError::invalid("two-pass stats buffer is empty"));
        }
        if buf.len() % STATS_RECORD_LEN != 0 {
            return Err(CodecError::invalid(format!(
                "two-pass stats buffer length {} is not a multiple of {STATS_RECORD_LEN}",
                buf.len()
            )));
        }
        let records: Vec<StatsRecord> = buf
            .chunks_exact(STATS_RECORD_LEN)
            .map(StatsRecord::from_bytes)
            .collect();
        let total: u64 = records.iter().map(|r| r.activity as u64).sum();
        let mean_activity = (total / records.len() as u64) as u32;
        Ok(Self {
            activity: records.iter().map(|r| (r.pts, r.activity)).collect(),
            mean_activity,
        })
    }
}

#[derive(Debug)]
struct PendingFrame {
    image: Image,
    pts: i64,
    duration: u64,
    flags: EncodeFlags,
}

/// Encoder side of the reference codec.
#[derive(Debug, Default)]
pub struct ReferenceEncoder {
    cfg: Option<EncoderConfig>,
    lookahead: VecDeque<PendingFrame>,
    reference: Option<Image>,
    previous_luma: Option<(u32, u32, Vec<u8>)>,
    frames_since_key: u32,
    force_keyframe: bool,
    last_pass_stats: Option<PassStats>,
    output: Vec<Packet>,
}

impl ReferenceEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn config(&self) -> Result<&EncoderConfig, CodecError> {
        self.cfg
            .as_ref()
            .ok_or_else(|| CodecError::new(CodecStatus::Error, "encoder is not initialised"))
    }

    fn quantizer_for(&self, cfg: &EncoderConfig, deadline: Deadline, pts: i64) -> u8 {
        let base = cfg.quantizer.unwrap_or(match deadline {
            Deadline::Realtime => 2,
            Deadline::GoodQuality => 1,
            Deadline::BestQuality => 0,
        });
        match &self.last_pass_stats {
            Some(stats) => match stats.activity.get(&pts) {
                Some(activity) if *activity > stats.mean_activity => base.saturating_sub(1),
                _ => base,
            },
            None => base,
        }
    }

    fn luma_activity(&mut self, image: &Image) -> u32 {
        let (w, h) = image.plane_dimensions(PlaneKind::Y);
        let luma = visible_samples(image, PlaneKind::Y);
        let activity = match &self.previous_luma {
            Some((pw, ph, prev)) if (*pw, *ph) == (image.width, image.height) && w * h > 0 => {
                let total: u64 = luma
                    .iter()
                    .zip(prev)
                    .map(|(a, b)| a.abs_diff(*b) as u64)
                    .sum();
                (total / (w * h) as u64) as u32
            }
            _ => u8::MAX as u32,
        };
        self.previous_luma = Some((image.width, image.height, luma));
        activity
    }

    fn emit(&mut self, frame: PendingFrame, deadline: Deadline) -> Result<(), CodecError> {
        let cfg = self.config()?.clone();

        let keyframe = match &self.reference {
            None => true,
            Some(reference) => {
                self.force_keyframe
                    || frame.flags.contains(EncodeFlags::FORCE_KEYFRAME)
                    || (cfg.keyframe_interval > 0 && self.frames_since_key >= cfg.keyframe_interval)
                    || reference.width != frame.image.width
                    || reference.height != frame.image.height
                    || reference.format != frame.image.format
            }
        };

        if cfg.pass == PassMode::FirstPass {
            let record = StatsRecord {
                pts: frame.pts,
                activity: self.luma_activity(&frame.image),
                flags: keyframe as u32,
            };
            self.output.push(Packet::Stats(record.to_bytes().to_vec()));
            return Ok(());
        }

        let quantizer = self.quantizer_for(&cfg, deadline, frame.pts);
        let recon = quantize(&frame.image, quantizer);

        let mut data = Vec::with_capacity(HEADER_LEN + recon.visible_len() / 2);
        data.extend_from_slice(MAGIC);
        data.push(if keyframe { KIND_KEY } else { KIND_INTER });
        data.push(quantizer);
        data.push(recon.format.tag());
        data.push(0);
        data.extend_from_slice(&dimension_u16(recon.width)?.to_le_bytes());
        data.extend_from_slice(&dimension_u16(recon.height)?.to_le_bytes());

        for kind in PlaneKind::ALL {
            let mut samples = visible_samples(&recon, kind);
            if !keyframe && let Some(reference) = &self.reference {
                let previous = visible_samples(reference, kind);
                for (sample, prev) in samples.iter_mut().zip(previous) {
                    *sample = sample.wrapping_sub(prev);
                }
            }
            let payload = rle_encode(&samples);
            data.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            data.extend_from_slice(&payload);
        }

        self.frames_since_key = if keyframe { 1 } else { self.frames_since_key + 1 };
        self.force_keyframe = false;
        self.reference = Some(recon);
        self.output.push(Packet::Frame(FramePacket {
            data,
            pts: frame.pts,
            duration: frame.duration,
            keyframe,
        }));
        Ok(())
    }
}

impl CodecEngine for ReferenceEncoder {
    fn name(&self) -> &'static str {
        "reference-rle"
    }

    fn init(&mut self, cfg: &EncoderConfig, twopass_stats: &[u8]) -> Result<(), CodecError> {
        if self.cfg.is_some() {
            return Err(CodecError::invalid("encoder is already initialised"));
        }
        validate_config(cfg)?;
        if cfg.pass == PassMode::LastPass {
            self.last_pass_stats = Some(PassStats::parse(twopass_stats)?);
        }
        self.cfg = Some(cfg.clone());
        Ok(())
    }

    fn reconfigure(&mut self, cfg: &EncoderConfig) -> Result<(), CodecError> {
        let current = self.config()?;
        if current.pass != cfg.pass {
            return Err(CodecError::invalid("pass mode cannot change after init"));
        }
        validate_config(cfg)?;
        if (current.width, current.height) != (cfg.width, cfg.height) {
            self.force_keyframe = true;
        }
        self.cfg = Some(cfg.clone());
        Ok(())
    }

    fn control(&mut self, control: EncoderControl) -> Result<(), CodecError> {
        let mut cfg = self.config()?.clone();
        match control {
            EncoderControl::Quantizer(q) => cfg.quantizer = Some(q),
            EncoderControl::KeyframeInterval(interval) => cfg.keyframe_interval = interval,
        }
        validate_config(&cfg)?;
        self.cfg = Some(cfg);
        Ok(())
    }

    fn encode(
        &mut self,
        frame: Option<&Image>,
        pts: i64,
        duration: u64,
        flags: EncodeFlags,
        deadline: Deadline,
    ) -> Result<(), CodecError> {
        let cfg = self.config()?.clone();
        self.output.clear();

        let Some(image) = frame else {
            while let Some(pending) = self.lookahead.pop_front() {
                self.emit(pending, deadline)?;
            }
            return Ok(());
        };

        if (image.width, image.height) != (cfg.width, cfg.height) {
            return Err(CodecError::invalid(format!(
                "frame size {}x{} does not match configured {}x{}",
                image.width, image.height, cfg.width, cfg.height
            )));
        }

        self.lookahead.push_back(PendingFrame {
            image: image.clone(),
            pts,
            duration,
            flags,
        });
        let lag = if deadline == Deadline::Realtime {
            0
        } else {
            cfg.lag_in_frames as usize
        };
        while self.lookahead.len() > lag {
            if let Some(pending) = self.lookahead.pop_front() {
                self.emit(pending, deadline)?;
            }
        }
        Ok(())
    }

    fn packets(&self) -> &[Packet] {
        &self.output
    }

    fn preview_frame(&self) -> Option<&Image> {
        self.reference.as_ref()
    }
}

/// Decoder side of the reference codec. Output images use a padded stride.
#[derive(Debug, Default)]
pub struct ReferenceDecoder {
    frame: Option<Image>,
}

impl ReferenceDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for ReferenceDecoder {
    fn decode(&mut self, data: &[u8]) -> Result<(), CodecError> {
        let mut reader = ByteReader::new(data);
        if reader.take(4)? != MAGIC {
            return Err(CodecError::new(
                CodecStatus::UnsupBitstream,
                "missing RLE4 frame marker",
            ));
        }
        let kind = reader.u8()?;
        let _quantizer = reader.u8()?;
        let format = ImageFormat::from_tag(reader.u8()?)
            .ok_or_else(|| CodecError::corrupt("unknown pixel format tag"))?;
        reader.u8()?;
        let width = reader.u16()? as u32;
        let height = reader.u16()? as u32;
        if width == 0 || height == 0 {
            return Err(CodecError::corrupt("zero frame dimension"));
        }

        let reference = match kind {
            KIND_KEY => None,
            KIND_INTER => match &self.frame {
                Some(prev) if (prev.width, prev.height, prev.format) == (width, height, format) => {
                    Some(prev)
                }
                _ => {
                    return Err(CodecError::corrupt(
                        "inter frame without a matching reference frame",
                    ));
                }
            },
            other => return Err(CodecError::corrupt(format!("unknown frame kind {other}"))),
        };

        let mut image =
            Image::with_alignment(format, width, height, DECODER_ALIGN, DECODER_PADDING);
        for kind in PlaneKind::ALL {
            let (w, h) = image.plane_dimensions(kind);
            let len = reader.u32()? as usize;
            let mut samples = rle_decode(reader.take(len)?, w * h)?;
            if let Some(prev) = reference {
                for (sample, base) in samples.iter_mut().zip(visible_samples(prev, kind)) {
                    *sample = sample.wrapping_add(base);
                }
            }
            let plane = image.plane_mut(kind);
            for (y, chunk) in samples.chunks_exact(w.max(1)).take(h).enumerate() {
                if let Some(row) = plane.row_mut(y, w) {
                    row.copy_from_slice(chunk);
                }
            }
        }
        if !reader.is_empty() {
            return Err(CodecError::corrupt("trailing bytes after last plane"));
        }

        self.frame = Some(image);
        Ok(())
    }

    fn output_frame(&self) -> Option<&Image> {
        self.frame.as_ref()
    }
}

/// Factory producing matched reference encoder/decoder pairs.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceCodec {
    pub with_decoder: bool,
}

impl Default for ReferenceCodec {
    fn default() -> Self {
        Self { with_decoder: true }
    }
}

impl CodecFactory for ReferenceCodec {
    type Engine = ReferenceEncoder;
    type Decoder = ReferenceDecoder;

    fn new_engine(&self) -> Self::Engine {
        ReferenceEncoder::new()
    }

    fn new_decoder(&self) -> Option<Self::Decoder> {
        self.with_decoder.then(ReferenceDecoder::new)
    }
}

fn validate_config(cfg: &EncoderConfig) -> Result<(), CodecError> {
    if cfg.width == 0 || cfg.height == 0 {
        return Err(CodecError::invalid(format!(
            "invalid frame size {}x{}",
            cfg.width, cfg.height
        )));
    }
    dimension_u16(cfg.width)?;
    dimension_u16(cfg.height)?;
    if cfg.timebase.numerator == 0 || cfg.timebase.denominator == 0 {
        return Err(CodecError::invalid(format!("invalid time-base {}", cfg.timebase)));
    }
    if cfg.lag_in_frames > MAX_LAG_IN_FRAMES {
        return Err(CodecError::invalid(format!(
            "lag_in_frames {} exceeds {MAX_LAG_IN_FRAMES}",
            cfg.lag_in_frames
        )));
    }
    if let Some(q) = cfg.quantizer
        && q > MAX_QUANTIZER
    {
        return Err(CodecError::invalid(format!(
            "quantizer {q} exceeds {MAX_QUANTIZER}"
        )));
    }
    Ok(())
}

fn dimension_u16(value: u32) -> Result<u16, CodecError> {
    u16::try_from(value).map_err(|_| CodecError::invalid(format!("dimension {value} too large")))
}

fn quantize(image: &Image, quantizer: u8) -> Image {
    let mut out = Image::new(image.format, image.width, image.height);
    let mask = !((1u8 << quantizer) - 1);
    let bias = if quantizer > 0 { 1u8 << (quantizer - 1) } else { 0 };
    for kind in PlaneKind::ALL {
        let (w, h) = image.plane_dimensions(kind);
        for y in 0..h {
            let src = image.plane(kind).row(y, w);
            let (Some(src), Some(dst)) = (src, out.plane_mut(kind).row_mut(y, w)) else {
                continue;
            };
            for (d, s) in dst.iter_mut().zip(src) {
                *d = (s & mask) | bias;
            }
        }
    }
    out
}

fn visible_samples(image: &Image, kind: PlaneKind) -> Vec<u8> {
    let (w, h) = image.plane_dimensions(kind);
    let plane = image.plane(kind);
    let mut out = Vec::with_capacity(w * h);
    for y in 0..h {
        match plane.row(y, w) {
            Some(row) => out.extend_from_slice(row),
            None => out.resize(out.len() + w, 0),
        }
    }
    out
}

fn rle_encode(samples: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut iter = samples.iter().copied().peekable();
    while let Some(value) = iter.next() {
        let mut run = 1u8;
        while run < u8::MAX && iter.peek() == Some(&value) {
            iter.next();
            run += 1;
        }
        out.push(run);
        out.push(value);
    }
    out
}

fn rle_decode(payload: &[u8], expected: usize) -> Result<Vec<u8>, CodecError> {
    if payload.len() % 2 != 0 {
        return Err(CodecError::corrupt("odd run-length payload"));
    }
    let mut out = Vec::with_capacity(expected);
    for pair in payload.chunks_exact(2) {
        let (run, value) = (pair[0] as usize, pair[1]);
        if run == 0 {
            return Err(CodecError::corrupt("zero-length run"));
        }
        if out.len() + run > expected {
            return Err(CodecError::corrupt("plane payload overruns plane size"));
        }
        out.resize(out.len() + run, value);
    }
    if out.len() != expected {
        return Err(CodecError::corrupt(format!(
            "plane payload holds {} samples, expected {expected}",
            out.len()
        )));
    }
    Ok(out)
}

struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| CodecError::corrupt("truncated frame"))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn is_empty(&self) -> bool {
        self.pos == self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::{Rational, compare_images};

    fn config(pass: PassMode) -> EncoderConfig {
        EncoderConfig {
            width: 6,
            height: 5,
            timebase: Rational::new(1, 30),
            pass,
            ..EncoderConfig::default()
        }
    }

    fn frame(seed: u8) -> Image {
        let mut image = Image::new(ImageFormat::I420, 6, 5);
        for kind in PlaneKind::ALL {
            let (w, h) = image.plane_dimensions(kind);
            for y in 0..h {
                for (x, px) in image.plane_mut(kind).row_mut(y, w).unwrap().iter_mut().enumerate() {
                    *px = seed.wrapping_mul(17).wrapping_add((x * 3 + y * 11) as u8);
                }
            }
        }
        image
    }

    fn frames(engine: &ReferenceEncoder) -> Vec<FramePacket> {
        engine
            .packets()
            .iter()
            .filter_map(|pkt| match pkt {
                Packet::Frame(frame) => Some(frame.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn rle_handles_long_runs() {
        let samples = vec![7u8; 600];
        let encoded = rle_encode(&samples);
        assert_eq!(encoded, vec![255, 7, 255, 7, 90, 7]);
        assert_eq!(rle_decode(&encoded, 600).unwrap(), samples);
        assert!(rle_decode(&encoded, 599).is_err());
        assert!(rle_decode(&[0, 1], 0).is_err());
    }

    #[test]
    fn decoder_matches_encoder_preview_across_inter_frames() {
        let mut encoder = ReferenceEncoder::new();
        encoder.init(&config(PassMode::OnePass), &[]).unwrap();
        let mut decoder = ReferenceDecoder::new();

        for seed in 0..4u8 {
            encoder
                .encode(Some(&frame(seed)), seed as i64, 1, EncodeFlags::empty(), Deadline::GoodQuality)
                .unwrap();
            let emitted = frames(&encoder);
            assert_eq!(emitted.len(), 1);
            assert_eq!(emitted[0].keyframe, seed == 0);
            decoder.decode(&emitted[0].data).unwrap();
            let decoded = decoder.output_frame().unwrap();
            assert_ne!(decoded.plane(PlaneKind::Y).stride, 6);
            assert!(compare_images(encoder.preview_frame().unwrap(), decoded));
        }
    }

    #[test]
    fn lookahead_delays_frames_until_flush() {
        let mut cfg = config(PassMode::OnePass);
        cfg.lag_in_frames = 2;
        let mut encoder = ReferenceEncoder::new();
        encoder.init(&cfg, &[]).unwrap();

        for pts in 0..2 {
            encoder
                .encode(Some(&frame(pts as u8)), pts, 1, EncodeFlags::empty(), Deadline::BestQuality)
                .unwrap();
            assert!(encoder.packets().is_empty());
        }
        encoder
            .encode(Some(&frame(2)), 2, 1, EncodeFlags::empty(), Deadline::BestQuality)
            .unwrap();
        assert_eq!(frames(&encoder).iter().map(|f| f.pts).collect::<Vec<_>>(), vec![0]);

        encoder.encode(None, 0, 0, EncodeFlags::empty(), Deadline::BestQuality).unwrap();
        assert_eq!(frames(&encoder).iter().map(|f| f.pts).collect::<Vec<_>>(), vec![1, 2]);

        encoder.encode(None, 0, 0, EncodeFlags::empty(), Deadline::BestQuality).unwrap();
        assert!(encoder.packets().is_empty());
    }

    #[test]
    fn realtime_ignores_lag() {
        let mut cfg = config(PassMode::OnePass);
        cfg.lag_in_frames = 5;
        let mut encoder = ReferenceEncoder::new();
        encoder.init(&cfg, &[]).unwrap();
        encoder
            .encode(Some(&frame(1)), 0, 1, EncodeFlags::empty(), Deadline::Realtime)
            .unwrap();
        assert_eq!(frames(&encoder).len(), 1);
    }

    #[test]
    fn first_pass_emits_stats_only_and_last_pass_requires_them() {
        let mut first = ReferenceEncoder::new();
        first.init(&config(PassMode::FirstPass), &[]).unwrap();
        let mut stats = Vec::new();
        for pts in 0..3 {
            first
                .encode(Some(&frame(pts as u8)), pts, 1, EncodeFlags::empty(), Deadline::GoodQuality)
                .unwrap();
            for pkt in first.packets() {
                match pkt {
                    Packet::Stats(bytes) => stats.extend_from_slice(bytes),
                    other => panic!("unexpected first-pass packet {other:?}"),
                }
            }
        }
        assert!(first.preview_frame().is_none());
        assert_eq!(stats.len(), 3 * STATS_RECORD_LEN);

        let err = ReferenceEncoder::new()
            .init(&config(PassMode::LastPass), &[])
            .unwrap_err();
        assert!(err.detail.contains("empty"));
        let err = ReferenceEncoder::new()
            .init(&config(PassMode::LastPass), &stats[..5])
            .unwrap_err();
        assert!(err.detail.contains("multiple"));
        ReferenceEncoder::new()
            .init(&config(PassMode::LastPass), &stats)
            .unwrap();
    }

    #[test]
    fn mismatched_frame_size_is_rejected_until_reconfigured() {
        let mut encoder = ReferenceEncoder::new();
        let mut cfg = config(PassMode::OnePass);
        encoder.init(&cfg, &[]).unwrap();
        let big = Image::new(ImageFormat::I420, 8, 8);
        let err = encoder
            .encode(Some(&big), 0, 1, EncodeFlags::empty(), Deadline::GoodQuality)
            .unwrap_err();
        assert!(err.detail.contains("does not match"));

        cfg.width = 8;
        cfg.height = 8;
        encoder.reconfigure(&cfg).unwrap();
        encoder
            .encode(Some(&big), 0, 1, EncodeFlags::empty(), Deadline::GoodQuality)
            .unwrap();
        assert!(frames(&encoder)[0].keyframe);
    }

    #[test]
    fn decoder_rejects_inter_frame_without_reference() {
        let mut encoder = ReferenceEncoder::new();
        encoder.init(&config(PassMode::OnePass), &[]).unwrap();
        let mut packets = Vec::new();
        for pts in 0..2 {
            encoder
                .encode(Some(&frame(pts as u8)), pts, 1, EncodeFlags::empty(), Deadline::GoodQuality)
                .unwrap();
            packets.extend(frames(&encoder));
        }
        let err = ReferenceDecoder::new().decode(&packets[1].data).unwrap_err();
        assert_eq!(err.status, CodecStatus::CorruptFrame);
        assert!(ReferenceDecoder::new().decode(b"nope").is_err());
    }
}
