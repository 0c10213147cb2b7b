//! Planar image model shared by sources, codec engines and the comparator.
//!
//! Images are 4:2:0 planar: a full resolution luma plane followed by two
//! chroma planes of `(width + 1) / 2 x (height + 1) / 2` samples. Every plane
//! carries its own stride, which may be larger than the visible row width.

pub mod compare;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use compare::{ImageDiff, compare_images, diff_images};

/// Supported planar buffer layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// Y plane followed by U and V planes.
    I420,
    /// Y plane followed by V and U planes in memory order; planes are still
    /// addressed as Y/U/V.
    Yv12,
}

impl ImageFormat {
    pub fn tag(self) -> u8 {
        match self {
            ImageFormat::I420 => 0,
            ImageFormat::Yv12 => 1,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(ImageFormat::I420),
            1 => Some(ImageFormat::Yv12),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlaneKind {
    Y,
    U,
    V,
}

impl PlaneKind {
    pub const ALL: [PlaneKind; 3] = [PlaneKind::Y, PlaneKind::U, PlaneKind::V];

    pub fn index(self) -> usize {
        match self {
            PlaneKind::Y => 0,
            PlaneKind::U => 1,
            PlaneKind::V => 2,
        }
    }
}

impl fmt::Display for PlaneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PlaneKind::Y => "Y",
            PlaneKind::U => "U",
            PlaneKind::V => "V",
        })
    }
}

/// One colour channel's pixel buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    pub stride: usize,
    pub data: Vec<u8>,
}

impl Plane {
    fn filled(stride: usize, rows: usize, value: u8) -> Self {
        Self {
            stride,
            data: vec![value; stride * rows],
        }
    }

    /// The first `width` bytes of row `y`, or `None` when the buffer is too short.
    pub fn row(&self, y: usize, width: usize) -> Option<&[u8]> {
        let start = y.checked_mul(self.stride)?;
        self.data.get(start..start.checked_add(width)?)
    }

    pub fn row_mut(&mut self, y: usize, width: usize) -> Option<&mut [u8]> {
        let start = y.checked_mul(self.stride)?;
        self.data.get_mut(start..start.checked_add(width)?)
    }
}

/// A planar 4:2:0 image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub planes: [Plane; 3],
}

impl Image {
    /// Allocates a zeroed image whose strides equal the visible row widths.
    pub fn new(format: ImageFormat, width: u32, height: u32) -> Self {
        Self::with_alignment(format, width, height, 1, 0)
    }

    /// Allocates an image whose strides are rounded up to `align` bytes, with
    /// every byte (padding included) set to `fill`.
    pub fn with_alignment(
        format: ImageFormat,
        width: u32,
        height: u32,
        align: usize,
        fill: u8,
    ) -> Self {
        let align = align.max(1);
        let stride_for = |w: usize| w.div_ceil(align) * align;
        let (w, h) = (width as usize, height as usize);
        let (cw, ch) = chroma_dimensions(width, height);
        Self {
            format,
            width,
            height,
            planes: [
                Plane::filled(stride_for(w), h, fill),
                Plane::filled(stride_for(cw), ch, fill),
                Plane::filled(stride_for(cw), ch, fill),
            ],
        }
    }

    pub fn plane(&self, kind: PlaneKind) -> &Plane {
        &self.planes[kind.index()]
    }

    pub fn plane_mut(&mut self, kind: PlaneKind) -> &mut Plane {
        &mut self.planes[kind.index()]
    }

    /// Visible `(width, height)` of a plane in samples.
    pub fn plane_dimensions(&self, kind: PlaneKind) -> (usize, usize) {
        match kind {
            PlaneKind::Y => (self.width as usize, self.height as usize),
            PlaneKind::U | PlaneKind::V => chroma_dimensions(self.width, self.height),
        }
    }

    /// Number of bytes of visible samples across all three planes.
    pub fn visible_len(&self) -> usize {
        PlaneKind::ALL
            .iter()
            .map(|kind| {
                let (w, h) = self.plane_dimensions(*kind);
                w * h
            })
            .sum()
    }
}

pub fn chroma_dimensions(width: u32, height: u32) -> (usize, usize) {
    (width.div_ceil(2) as usize, height.div_ceil(2) as usize)
}

/// A rational number used as a stream time-base (seconds per tick).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rational {
    pub numerator: u32,
    pub denominator: u32,
}

impl Rational {
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }
}

impl Default for Rational {
    fn default() -> Self {
        Self::new(1, 30)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}
