//! Built-in hook set: IVF bitstream capture, per-pass digests of the emitted
//! frame packets and PNG dumps of mismatching reconstructions.

use std::fs::{self, File};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::codec::{CodecEngine, EncoderConfig, FramePacket};
use crate::harness::EncoderHooks;
use crate::source::VideoSource;
use crate::video::{Image, PlaneKind, Rational};

pub const IVF_SIGNATURE: &[u8; 4] = b"DKIF";
pub const IVF_HEADER_LEN: u16 = 32;
pub const IVF_FRAME_HEADER_LEN: usize = 12;

/// Writes compressed frames into an IVF container.
///
/// The frame count in the file header is patched by [`IvfWriter::finish`].
pub struct IvfWriter<W: Write + Seek> {
    inner: W,
    frames: u32,
}

impl<W: Write + Seek> IvfWriter<W> {
    pub fn new(
        mut inner: W,
        fourcc: [u8; 4],
        width: u32,
        height: u32,
        timebase: Rational,
    ) -> io::Result<Self> {
        let mut header = Vec::with_capacity(IVF_HEADER_LEN as usize);
        header.extend_from_slice(IVF_SIGNATURE);
        header.extend_from_slice(&0u16.to_le_bytes());
        header.extend_from_slice(&IVF_HEADER_LEN.to_le_bytes());
        header.extend_from_slice(&fourcc);
        header.extend_from_slice(&clamp_u16(width).to_le_bytes());
        header.extend_from_slice(&clamp_u16(height).to_le_bytes());
        header.extend_from_slice(&timebase.denominator.to_le_bytes());
        header.extend_from_slice(&timebase.numerator.to_le_bytes());
        header.extend_from_slice(&0u32.to_le_bytes());
        header.extend_from_slice(&0u32.to_le_bytes());
        inner.write_all(&header)?;
        Ok(Self { inner, frames: 0 })
    }

    pub fn write_frame(&mut self, packet: &FramePacket) -> io::Result<()> {
        let size = u32::try_from(packet.size()).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "frame packet exceeds 4 GiB")
        })?;
        self.inner.write_all(&size.to_le_bytes())?;
        self.inner.write_all(&packet.pts.to_le_bytes())?;
        self.inner.write_all(&packet.data)?;
        self.frames += 1;
        Ok(())
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }

    pub fn finish(mut self) -> io::Result<W> {
        self.inner.seek(SeekFrom::Start(24))?;
        self.inner.write_all(&self.frames.to_le_bytes())?;
        self.inner.seek(SeekFrom::End(0))?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

fn clamp_u16(value: u32) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}

/// Digest of every frame packet one pass emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassDigest {
    pub pass: u32,
    pub frames: u32,
    pub bytes: u64,
    pub sha256: String,
}

#[derive(Debug, Default)]
pub struct CaptureSummary {
    pub digests: Vec<PassDigest>,
    pub ivf_files: Vec<PathBuf>,
    pub mismatch_files: Vec<PathBuf>,
}

impl CaptureSummary {
    /// Digest of the last pass, the one that produced the bitstream.
    pub fn final_digest(&self) -> Option<&PassDigest> {
        self.digests.last()
    }
}

struct PassState {
    pass: u32,
    hasher: Sha256,
    frames: u32,
    bytes: u64,
    frame_size: Option<(u32, u32)>,
    timebase: Rational,
    last_pts: i64,
    ivf: Option<(PathBuf, IvfWriter<BufWriter<File>>)>,
}

impl PassState {
    fn new(pass: u32) -> Self {
        Self {
            pass,
            hasher: Sha256::new(),
            frames: 0,
            bytes: 0,
            frame_size: None,
            timebase: Rational::default(),
            last_pts: 0,
            ivf: None,
        }
    }
}

/// Hooks that record what a run produced. I/O failures stop the run through
/// [`EncoderHooks::should_continue`] and are reported by [`CaptureHooks::finish`].
pub struct CaptureHooks {
    label: String,
    ivf_dir: Option<PathBuf>,
    mismatch_dir: Option<PathBuf>,
    current: Option<PassState>,
    summary: CaptureSummary,
    failure: Option<anyhow::Error>,
}

impl CaptureHooks {
    /// `label` prefixes every file written, usually the mode name.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ivf_dir: None,
            mismatch_dir: None,
            current: None,
            summary: CaptureSummary::default(),
            failure: None,
        }
    }

    pub fn with_ivf_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.ivf_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn with_mismatch_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.mismatch_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn digests(&self) -> &[PassDigest] {
        &self.summary.digests
    }

    pub fn finish(mut self) -> Result<CaptureSummary> {
        self.close_pass();
        match self.failure {
            Some(err) => Err(err),
            None => Ok(self.summary),
        }
    }

    fn fail(&mut self, err: anyhow::Error) {
        warn!(error = %err, "Capture failed; stopping run");
        if self.failure.is_none() {
            self.failure = Some(err);
        }
    }

    fn close_pass(&mut self) {
        let Some(state) = self.current.take() else {
            return;
        };
        let digest = PassDigest {
            pass: state.pass,
            frames: state.frames,
            bytes: state.bytes,
            sha256: format!("{:x}", state.hasher.finalize()),
        };
        info!(
            pass = digest.pass,
            frames = digest.frames,
            sha256 = digest.sha256.as_str(),
            "Pass digest"
        );
        self.summary.digests.push(digest);

        if let Some((path, writer)) = state.ivf {
            match writer.finish() {
                Ok(_) => self.summary.ivf_files.push(path),
                Err(err) => {
                    let err = anyhow!(err).context(format!("Failed to finish {}", path.display()));
                    self.fail(err);
                }
            }
        }
    }

    fn write_ivf(&mut self, packet: &FramePacket) -> Result<()> {
        let Some(dir) = self.ivf_dir.as_ref() else {
            return Ok(());
        };
        let Some(state) = self.current.as_mut() else {
            return Ok(());
        };
        if state.ivf.is_none() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create capture dir {}", dir.display()))?;
            let path = dir.join(format!("{}-pass{}.ivf", self.label, state.pass));
            let file = File::create(&path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let (width, height) = state.frame_size.unwrap_or((0, 0));
            let writer =
                IvfWriter::new(BufWriter::new(file), *b"RLE4", width, height, state.timebase)
                    .with_context(|| format!("Failed to write IVF header to {}", path.display()))?;
            state.ivf = Some((path, writer));
        }
        if let Some((path, writer)) = state.ivf.as_mut() {
            writer
                .write_frame(packet)
                .with_context(|| format!("Failed to append frame to {}", path.display()))?;
        }
        Ok(())
    }

    fn dump_mismatch(&mut self, encoded: &Image, decoded: &Image) -> Result<()> {
        let Some(dir) = self.mismatch_dir.as_ref() else {
            return Ok(());
        };
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create mismatch dir {}", dir.display()))?;
        let (pass, pts) = self
            .current
            .as_ref()
            .map(|state| (state.pass, state.last_pts))
            .unwrap_or_default();
        for (side, image) in [("encoded", encoded), ("decoded", decoded)] {
            let path = dir.join(format!("{}-pass{pass}-pts{pts}-{side}.png", self.label));
            let luma = luma_image(image)
                .ok_or_else(|| anyhow!("Image {}x{} has no luma data", image.width, image.height))?;
            luma.save(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            self.summary.mismatch_files.push(path);
        }
        Ok(())
    }
}

/// Copies the visible luma plane into a grayscale bitmap.
pub fn luma_image(image: &Image) -> Option<GrayImage> {
    let (width, height) = image.plane_dimensions(PlaneKind::Y);
    let plane = image.plane(PlaneKind::Y);
    let mut buf = Vec::with_capacity(width * height);
    for y in 0..height {
        buf.extend_from_slice(plane.row(y, width)?);
    }
    GrayImage::from_raw(image.width, image.height, buf)
}

impl<E: CodecEngine> EncoderHooks<E> for CaptureHooks {
    fn begin_pass(&mut self, pass: u32, _cfg: &mut EncoderConfig) {
        self.close_pass();
        self.current = Some(PassState::new(pass));
    }

    fn end_pass(&mut self) {
        self.close_pass();
    }

    fn pre_encode_frame(&mut self, video: &dyn VideoSource) {
        if let Some(state) = self.current.as_mut()
            && state.frame_size.is_none()
            && let Some(img) = video.img()
        {
            state.frame_size = Some((img.width, img.height));
            state.timebase = video.timebase();
        }
    }

    fn frame_packet(&mut self, packet: &FramePacket) {
        if let Some(state) = self.current.as_mut() {
            state.hasher.update(packet.pts.to_le_bytes());
            state.hasher.update((packet.size() as u64).to_le_bytes());
            state.hasher.update(&packet.data);
            state.frames += 1;
            state.bytes += packet.size() as u64;
            state.last_pts = packet.pts;
        }
        if let Err(err) = self.write_ivf(packet) {
            self.fail(err);
        }
    }

    fn mismatch(&mut self, encoded: &Image, decoded: &Image) {
        if let Err(err) = self.dump_mismatch(encoded, decoded) {
            self.fail(err);
        }
    }

    fn should_continue(&self) -> bool {
        self.failure.is_none()
    }
}
