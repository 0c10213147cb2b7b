//! Encoder adapter: owns one codec context for the duration of a pass.

use tracing::debug;

use crate::codec::{
    CodecEngine, CodecError, CxDataIter, Deadline, EncodeFlags, EncoderConfig, EncoderControl,
    Packet,
};
use crate::harness::{CodecOp, HarnessError};
use crate::source::VideoSource;
use crate::video::Image;

/// Append-only first-pass statistics, shared by both passes of a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TwoPassStats {
    buf: Vec<u8>,
}

impl TwoPassStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, fragment: &[u8]) {
        self.buf.extend_from_slice(fragment);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Drops all statistics. Only called between runs.
    pub(crate) fn reset(&mut self) {
        self.buf.clear();
    }
}

pub struct Encoder<'a, E: CodecEngine> {
    cfg: EncoderConfig,
    deadline: Deadline,
    stats: &'a mut TwoPassStats,
    engine: E,
    initialized: bool,
    pending_controls: Vec<EncoderControl>,
    reconfigurations: u32,
}

impl<'a, E: CodecEngine> Encoder<'a, E> {
    pub fn new(
        cfg: EncoderConfig,
        deadline: Deadline,
        stats: &'a mut TwoPassStats,
        engine: E,
    ) -> Self {
        Self {
            cfg,
            deadline,
            stats,
            engine,
            initialized: false,
            pending_controls: Vec::new(),
            reconfigurations: 0,
        }
    }

    /// Encodes the source's current frame, or flushes when the source is
    /// exhausted, then appends any statistics packets to the shared buffer.
    pub fn encode_frame(
        &mut self,
        video: &dyn VideoSource,
        flags: EncodeFlags,
    ) -> Result<(), HarnessError> {
        match video.img() {
            Some(img) => self.encode_frame_internal(video, img, flags)?,
            None => self.flush()?,
        }

        for pkt in CxDataIter::new(self.engine.packets()) {
            if let Packet::Stats(fragment) = pkt {
                self.stats.append(fragment);
            }
        }
        Ok(())
    }

    fn encode_frame_internal(
        &mut self,
        video: &dyn VideoSource,
        img: &Image,
        flags: EncodeFlags,
    ) -> Result<(), HarnessError> {
        if !self.initialized {
            self.cfg.width = img.width;
            self.cfg.height = img.height;
            self.cfg.timebase = video.timebase();
            self.engine
                .init(&self.cfg, self.stats.as_bytes())
                .map_err(|err| fatal(CodecOp::Init, err))?;
            self.initialized = true;
            debug!(
                engine = self.engine.name(),
                width = self.cfg.width,
                height = self.cfg.height,
                pass = ?self.cfg.pass,
                deadline_us = self.deadline.as_micros(),
                stats_bytes = self.stats.len(),
                "Encoder initialised"
            );
            for control in std::mem::take(&mut self.pending_controls) {
                self.engine
                    .control(control)
                    .map_err(|err| fatal(CodecOp::Control, err))?;
            }
        }

        if self.cfg.width != img.width || self.cfg.height != img.height {
            debug!(
                from_width = self.cfg.width,
                from_height = self.cfg.height,
                to_width = img.width,
                to_height = img.height,
                "Reconfiguring encoder for resized input"
            );
            self.cfg.width = img.width;
            self.cfg.height = img.height;
            self.engine
                .reconfigure(&self.cfg)
                .map_err(|err| fatal(CodecOp::Reconfigure, err))?;
            self.reconfigurations += 1;
        }

        self.engine
            .encode(Some(img), video.pts(), video.duration(), flags, self.deadline)
            .map_err(|err| fatal(CodecOp::Encode, err))
    }

    pub fn flush(&mut self) -> Result<(), HarnessError> {
        if !self.initialized {
            // Nothing was ever submitted, so there is nothing to drain.
            return Ok(());
        }
        self.engine
            .encode(None, 0, 0, EncodeFlags::empty(), self.deadline)
            .map_err(|err| fatal(CodecOp::Flush, err))
    }

    /// Applies a codec control, deferring it until the engine is initialised.
    pub fn control(&mut self, control: EncoderControl) -> Result<(), HarnessError> {
        if !self.initialized {
            self.pending_controls.push(control);
            return Ok(());
        }
        self.engine
            .control(control)
            .map_err(|err| fatal(CodecOp::Control, err))
    }

    /// Output of the most recent encode or flush call.
    pub fn cx_data(&self) -> CxDataIter<'_> {
        CxDataIter::new(self.engine.packets())
    }

    pub fn preview_frame(&self) -> Option<&Image> {
        self.engine.preview_frame()
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.cfg
    }

    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn reconfigurations(&self) -> u32 {
        self.reconfigurations
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }
}

fn fatal(op: CodecOp, source: CodecError) -> HarnessError {
    HarnessError::Codec { op, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{FramePacket, PassMode};
    use crate::source::{ResizeStep, SyntheticSource};

    #[derive(Default)]
    struct MockEngine {
        init_stats: Option<Vec<u8>>,
        init_config: Option<EncoderConfig>,
        reconfigures: Vec<(u32, u32)>,
        controls: Vec<EncoderControl>,
        encodes: Vec<(bool, i64)>,
        output: Vec<Packet>,
        fail_init: bool,
    }

    impl CodecEngine for MockEngine {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn init(&mut self, cfg: &EncoderConfig, stats: &[u8]) -> Result<(), CodecError> {
            if self.fail_init {
                return Err(CodecError::invalid("mock refuses to start"));
            }
            self.init_config = Some(cfg.clone());
            self.init_stats = Some(stats.to_vec());
            Ok(())
        }

        fn reconfigure(&mut self, cfg: &EncoderConfig) -> Result<(), CodecError> {
            self.reconfigures.push((cfg.width, cfg.height));
            Ok(())
        }

        fn control(&mut self, control: EncoderControl) -> Result<(), CodecError> {
            self.controls.push(control);
            Ok(())
        }

        fn encode(
            &mut self,
            frame: Option<&Image>,
            pts: i64,
            _duration: u64,
            _flags: EncodeFlags,
            _deadline: Deadline,
        ) -> Result<(), CodecError> {
            self.encodes.push((frame.is_some(), pts));
            self.output = vec![
                Packet::Stats(vec![pts as u8]),
                Packet::Frame(FramePacket {
                    data: vec![1],
                    pts,
                    duration: 1,
                    keyframe: false,
                }),
                Packet::Stats(vec![0xEE]),
            ];
            Ok(())
        }

        fn packets(&self) -> &[Packet] {
            &self.output
        }

        fn preview_frame(&self) -> Option<&Image> {
            None
        }
    }

    fn drive(source: &mut SyntheticSource, encoder: &mut Encoder<'_, MockEngine>) {
        source.begin().unwrap();
        while source.img().is_some() {
            encoder.encode_frame(&*source, EncodeFlags::empty()).unwrap();
            source.advance().unwrap();
        }
    }

    #[test]
    fn first_frame_initialises_from_source() {
        let mut stats = TwoPassStats::new();
        stats.append(b"pass-one");
        let cfg = EncoderConfig {
            pass: PassMode::LastPass,
            ..EncoderConfig::default()
        };
        let mut encoder = Encoder::new(cfg, Deadline::GoodQuality, &mut stats, MockEngine::default());
        let mut source = SyntheticSource::new(10, 6, 1);
        drive(&mut source, &mut encoder);

        let engine = encoder.engine();
        let init = engine.init_config.as_ref().unwrap();
        assert_eq!((init.width, init.height), (10, 6));
        assert_eq!(init.timebase, source.timebase());
        assert_eq!(engine.init_stats.as_deref(), Some(&b"pass-one"[..]));
        assert!(engine.reconfigures.is_empty());
    }

    #[test]
    fn resize_triggers_exactly_one_reconfigure() {
        let mut stats = TwoPassStats::new();
        let mut encoder = Encoder::new(
            EncoderConfig::default(),
            Deadline::Realtime,
            &mut stats,
            MockEngine::default(),
        );
        let mut source = SyntheticSource::new(8, 8, 5).with_resize_schedule(vec![ResizeStep {
            at_frame: 3,
            width: 16,
            height: 8,
        }]);
        drive(&mut source, &mut encoder);

        assert_eq!(encoder.engine().reconfigures, vec![(16, 8)]);
        assert_eq!(encoder.reconfigurations(), 1);
        assert_eq!((encoder.config().width, encoder.config().height), (16, 8));
    }

    #[test]
    fn stats_packets_are_appended_in_emission_order() {
        let mut stats = TwoPassStats::new();
        {
            let mut encoder = Encoder::new(
                EncoderConfig::default(),
                Deadline::GoodQuality,
                &mut stats,
                MockEngine::default(),
            );
            let mut source = SyntheticSource::new(4, 4, 2);
            drive(&mut source, &mut encoder);
        }
        assert_eq!(stats.as_bytes(), &[0, 0xEE, 1, 0xEE]);
    }

    #[test]
    fn exhausted_source_flushes_and_controls_wait_for_init() {
        let mut stats = TwoPassStats::new();
        let mut encoder = Encoder::new(
            EncoderConfig::default(),
            Deadline::GoodQuality,
            &mut stats,
            MockEngine::default(),
        );
        encoder.control(EncoderControl::Quantizer(2)).unwrap();
        assert!(encoder.engine().controls.is_empty());
        assert!(!encoder.is_initialized());

        let mut source = SyntheticSource::new(4, 4, 1);
        source.begin().unwrap();
        encoder.encode_frame(&source, EncodeFlags::empty()).unwrap();
        assert!(encoder.is_initialized());
        assert_eq!(encoder.engine().controls, vec![EncoderControl::Quantizer(2)]);

        source.advance().unwrap();
        encoder.encode_frame(&source, EncodeFlags::empty()).unwrap();
        assert_eq!(encoder.engine().encodes, vec![(true, 0), (false, 0)]);
    }

    #[test]
    fn init_failure_carries_engine_diagnostic() {
        let mut stats = TwoPassStats::new();
        let engine = MockEngine {
            fail_init: true,
            ..MockEngine::default()
        };
        let mut encoder =
            Encoder::new(EncoderConfig::default(), Deadline::GoodQuality, &mut stats, engine);
        let mut source = SyntheticSource::new(4, 4, 1);
        source.begin().unwrap();
        let err = encoder.encode_frame(&source, EncodeFlags::empty()).unwrap_err();
        assert!(matches!(err, HarnessError::Codec { op: CodecOp::Init, .. }));
        assert!(err.to_string().contains("mock refuses to start"));
        assert!(!encoder.is_initialized());
    }

    #[test]
    fn flush_before_first_frame_leaves_engine_untouched() {
        let mut stats = TwoPassStats::new();
        let mut encoder = Encoder::new(
            EncoderConfig::default(),
            Deadline::Realtime,
            &mut stats,
            MockEngine::default(),
        );
        let mut source = SyntheticSource::new(4, 4, 0);
        source.begin().unwrap();

        encoder.encode_frame(&source, EncodeFlags::empty()).unwrap();

        assert!(!encoder.is_initialized());
        assert!(encoder.engine().encodes.is_empty());
        assert_eq!(encoder.cx_data().count(), 0);
    }
}
