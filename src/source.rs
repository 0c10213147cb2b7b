//! Frame sources consumed by the harness.
//!
//! A source is rewindable: [`VideoSource::begin`] positions it on the first
//! frame and [`VideoSource::advance`] moves to the next one. Once the source
//! is exhausted [`VideoSource::img`] returns `None`.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::video::{Image, ImageFormat, PlaneKind, Rational, chroma_dimensions};

pub trait VideoSource {
    fn begin(&mut self) -> io::Result<()>;
    fn advance(&mut self) -> io::Result<()>;

    /// The current frame, or `None` once the source is exhausted.
    fn img(&self) -> Option<&Image>;
    fn pts(&self) -> i64;
    fn duration(&self) -> u64;
    fn timebase(&self) -> Rational;

    /// Index of the current frame.
    fn frame(&self) -> u32;
    fn limit(&self) -> u32;
}

/// Changes the synthetic frame size starting at `at_frame`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeStep {
    pub at_frame: u32,
    pub width: u32,
    pub height: u32,
}

/// Deterministic moving-gradient frames.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    format: ImageFormat,
    width: u32,
    height: u32,
    limit: u32,
    timebase: Rational,
    schedule: Vec<ResizeStep>,
    frame: u32,
    img: Option<Image>,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32, limit: u32) -> Self {
        Self {
            format: ImageFormat::I420,
            width,
            height,
            limit,
            timebase: Rational::new(1, 30),
            schedule: Vec::new(),
            frame: 0,
            img: None,
        }
    }

    pub fn with_format(mut self, format: ImageFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_timebase(mut self, timebase: Rational) -> Self {
        self.timebase = timebase;
        self
    }

    pub fn with_resize_schedule(mut self, mut schedule: Vec<ResizeStep>) -> Self {
        schedule.sort_by_key(|step| step.at_frame);
        self.schedule = schedule;
        self
    }

    fn size_at(&self, frame: u32) -> (u32, u32) {
        self.schedule
            .iter()
            .take_while(|step| step.at_frame <= frame)
            .last()
            .map(|step| (step.width, step.height))
            .unwrap_or((self.width, self.height))
    }

    fn fill(&mut self) {
        if self.frame >= self.limit {
            self.img = None;
            return;
        }
        let (width, height) = self.size_at(self.frame);
        let mut image = Image::new(self.format, width, height);
        let t = self.frame as usize;
        for kind in PlaneKind::ALL {
            let (w, h) = image.plane_dimensions(kind);
            let offset = kind.index() * 64;
            let plane = image.plane_mut(kind);
            for y in 0..h {
                if let Some(row) = plane.row_mut(y, w) {
                    for (x, px) in row.iter_mut().enumerate() {
                        *px = ((x * 4 + y * 2 + t * 3 + offset) & 0xFF) as u8;
                    }
                }
            }
        }
        self.img = Some(image);
    }
}

impl VideoSource for SyntheticSource {
    fn begin(&mut self) -> io::Result<()> {
        self.frame = 0;
        self.fill();
        Ok(())
    }

    fn advance(&mut self) -> io::Result<()> {
        self.frame = self.frame.saturating_add(1);
        self.fill();
        Ok(())
    }

    fn img(&self) -> Option<&Image> {
        self.img.as_ref()
    }

    fn pts(&self) -> i64 {
        self.frame as i64
    }

    fn duration(&self) -> u64 {
        1
    }

    fn timebase(&self) -> Rational {
        self.timebase
    }

    fn frame(&self) -> u32 {
        self.frame
    }

    fn limit(&self) -> u32 {
        self.limit
    }
}

/// Raw planar I420 frames read back to back from a file.
#[derive(Debug)]
pub struct YuvFileSource {
    path: PathBuf,
    reader: Option<BufReader<File>>,
    width: u32,
    height: u32,
    limit: u32,
    timebase: Rational,
    frame: u32,
    img: Option<Image>,
}

impl YuvFileSource {
    /// `limit` caps the number of frames read; `None` reads to end of file.
    pub fn new(path: impl AsRef<Path>, width: u32, height: u32, limit: Option<u32>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            reader: None,
            width,
            height,
            limit: limit.unwrap_or(u32::MAX),
            timebase: Rational::new(1, 30),
            frame: 0,
            img: None,
        }
    }

    pub fn with_timebase(mut self, timebase: Rational) -> Self {
        self.timebase = timebase;
        self
    }

    /// Bytes per I420 frame, or `None` if that does not fit in memory.
    pub fn frame_size(&self) -> Option<usize> {
        let (cw, ch) = chroma_dimensions(self.width, self.height);
        let luma = (self.width as usize).checked_mul(self.height as usize)?;
        let chroma = cw.checked_mul(ch)?.checked_mul(2)?;
        luma.checked_add(chroma)
    }

    fn fill(&mut self) -> io::Result<()> {
        self.img = None;
        if self.frame >= self.limit {
            return Ok(());
        }
        let frame_size = self.frame_size().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "{}: {}x{} frames are too large to buffer",
                    self.path.display(),
                    self.width,
                    self.height
                ),
            )
        })?;
        let Some(reader) = self.reader.as_mut() else {
            return Ok(());
        };

        let mut buf = vec![0u8; frame_size];
        let mut filled = 0;
        while filled < frame_size {
            match reader.read(&mut buf[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        if filled == 0 {
            return Ok(());
        }
        if filled < frame_size {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "{}: frame {} is truncated ({filled} of {frame_size} bytes)",
                    self.path.display(),
                    self.frame
                ),
            ));
        }

        let mut image = Image::new(ImageFormat::I420, self.width, self.height);
        let mut offset = 0;
        for kind in PlaneKind::ALL {
            let (w, h) = image.plane_dimensions(kind);
            let plane = image.plane_mut(kind);
            for y in 0..h {
                if let Some(row) = plane.row_mut(y, w) {
                    row.copy_from_slice(&buf[offset..offset + w]);
                }
                offset += w;
            }
        }
        self.img = Some(image);
        Ok(())
    }
}

impl VideoSource for YuvFileSource {
    fn begin(&mut self) -> io::Result<()> {
        match self.reader.as_mut() {
            Some(reader) => {
                reader.seek(SeekFrom::Start(0))?;
            }
            None => {
                let file = File::open(&self.path).map_err(|err| {
                    io::Error::new(err.kind(), format!("{}: {err}", self.path.display()))
                })?;
                self.reader = Some(BufReader::new(file));
            }
        }
        self.frame = 0;
        self.fill()
    }

    fn advance(&mut self) -> io::Result<()> {
        self.frame = self.frame.saturating_add(1);
        self.fill()
    }

    fn img(&self) -> Option<&Image> {
        self.img.as_ref()
    }

    fn pts(&self) -> i64 {
        self.frame as i64
    }

    fn duration(&self) -> u64 {
        1
    }

    fn timebase(&self) -> Rational {
        self.timebase
    }

    fn frame(&self) -> u32 {
        self.frame
    }

    fn limit(&self) -> u32 {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn synthetic_source_ends_after_limit_and_rewinds() {
        let mut source = SyntheticSource::new(4, 4, 2);
        source.begin().unwrap();
        assert_eq!(source.pts(), 0);
        assert!(source.img().is_some());
        source.advance().unwrap();
        assert!(source.img().is_some());
        source.advance().unwrap();
        assert!(source.img().is_none());
        source.advance().unwrap();
        assert!(source.img().is_none());

        source.begin().unwrap();
        assert_eq!(source.frame(), 0);
        assert!(source.img().is_some());
    }

    #[test]
    fn resize_schedule_applies_from_its_frame() {
        let mut source = SyntheticSource::new(8, 8, 4).with_resize_schedule(vec![ResizeStep {
            at_frame: 2,
            width: 12,
            height: 6,
        }]);
        source.begin().unwrap();
        let mut sizes = Vec::new();
        while let Some(img) = source.img() {
            sizes.push((img.width, img.height));
            source.advance().unwrap();
        }
        assert_eq!(sizes, vec![(8, 8), (8, 8), (12, 6), (12, 6)]);
    }

    #[test]
    fn yuv_file_source_reads_whole_frames() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("clip.yuv");
        let mut file = File::create(&path).unwrap();
        // 4x2 I420 frame: 8 luma + 2 + 2 chroma bytes.
        let frame: Vec<u8> = (0u8..12).collect();
        file.write_all(&frame).unwrap();
        file.write_all(&frame).unwrap();
        drop(file);

        let mut source = YuvFileSource::new(&path, 4, 2, None);
        assert_eq!(source.frame_size(), Some(12));
        source.begin().unwrap();
        let img = source.img().unwrap();
        assert_eq!(img.plane(PlaneKind::Y).row(1, 4), Some(&[4u8, 5, 6, 7][..]));
        assert_eq!(img.plane(PlaneKind::V).data, vec![10, 11]);
        source.advance().unwrap();
        assert!(source.img().is_some());
        source.advance().unwrap();
        assert!(source.img().is_none());
    }

    #[test]
    fn truncated_yuv_frame_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("short.yuv");
        std::fs::write(&path, [0u8; 5]).unwrap();
        let mut source = YuvFileSource::new(&path, 4, 2, None);
        let err = source.begin().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn oversized_yuv_frames_are_rejected_instead_of_wrapping() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("huge.yuv");
        std::fs::write(&path, [0u8; 16]).unwrap();

        let odd = YuvFileSource::new(&path, 5, 3, None);
        assert_eq!(odd.frame_size(), Some(15 + 2 * 3 * 2));

        let mut huge = YuvFileSource::new(&path, u32::MAX, u32::MAX, None);
        assert_eq!(huge.frame_size(), None);
        let err = huge.begin().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(err.to_string().contains("too large"), "{err}");
    }
}
