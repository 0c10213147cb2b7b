use std::fmt;

use serde::Serialize;

use crate::video::{Image, PlaneKind, chroma_dimensions};

/// Row-level comparison of two images.
///
/// Rows are located through each image's own stride and only the visible
/// `width` bytes of a row take part in the comparison. Plane dimensions are
/// taken from the first image.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImageDiff {
    pub format_match: bool,
    pub size_match: bool,
    /// Mismatching row count per plane, indexed Y, U, V.
    pub mismatched_rows: [usize; 3],
    pub first_mismatch: Option<(PlaneKind, usize)>,
}

impl ImageDiff {
    pub fn is_match(&self) -> bool {
        self.format_match && self.size_match && self.mismatched_rows.iter().all(|rows| *rows == 0)
    }
}

impl fmt::Display for ImageDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_match() {
            return f.write_str("images match");
        }
        let mut parts = Vec::new();
        if !self.format_match {
            parts.push("pixel format differs".to_string());
        }
        if !self.size_match {
            parts.push("dimensions differ".to_string());
        }
        for kind in PlaneKind::ALL {
            let rows = self.mismatched_rows[kind.index()];
            if rows > 0 {
                parts.push(format!("{rows} {kind} row(s) differ"));
            }
        }
        if let Some((kind, row)) = self.first_mismatch {
            parts.push(format!("first at {kind} row {row}"));
        }
        f.write_str(&parts.join(", "))
    }
}

/// Returns true iff both images have the same format and size and every
/// visible row of every plane is byte-identical.
pub fn compare_images(lhs: &Image, rhs: &Image) -> bool {
    diff_images(lhs, rhs).is_match()
}

/// Compares every row of every plane. The walk never stops early: all rows
/// are read even after a mismatch has been found.
pub fn diff_images(lhs: &Image, rhs: &Image) -> ImageDiff {
    let mut diff = ImageDiff {
        format_match: lhs.format == rhs.format,
        size_match: lhs.width == rhs.width && lhs.height == rhs.height,
        ..ImageDiff::default()
    };

    let (chroma_w, chroma_h) = chroma_dimensions(lhs.width, lhs.height);
    for kind in PlaneKind::ALL {
        let (width, height) = match kind {
            PlaneKind::Y => (lhs.width as usize, lhs.height as usize),
            PlaneKind::U | PlaneKind::V => (chroma_w, chroma_h),
        };
        let (a, b) = (lhs.plane(kind), rhs.plane(kind));
        for y in 0..height {
            let same = match (a.row(y, width), b.row(y, width)) {
                (Some(row_a), Some(row_b)) => row_a == row_b,
                _ => false,
            };
            if !same {
                diff.mismatched_rows[kind.index()] += 1;
                if diff.first_mismatch.is_none() {
                    diff.first_mismatch = Some((kind, y));
                }
            }
        }
    }

    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::ImageFormat;

    fn gradient(width: u32, height: u32, align: usize) -> Image {
        let mut image = Image::with_alignment(ImageFormat::I420, width, height, align, 0);
        for kind in PlaneKind::ALL {
            let (w, h) = image.plane_dimensions(kind);
            let plane = image.plane_mut(kind);
            for y in 0..h {
                let row = plane.row_mut(y, w).unwrap();
                for (x, px) in row.iter_mut().enumerate() {
                    *px = (x * 7 + y * 13 + kind.index() * 31) as u8;
                }
            }
        }
        image
    }

    #[test]
    fn strides_do_not_matter() {
        let tight = gradient(13, 7, 1);
        let padded = gradient(13, 7, 32);
        assert!(compare_images(&tight, &padded));
        assert!(compare_images(&padded, &tight));
    }

    #[test]
    fn every_row_is_visited_after_first_mismatch() {
        let reference = gradient(8, 8, 1);
        let mut candidate = reference.clone();
        for y in [1, 5] {
            candidate.plane_mut(PlaneKind::Y).row_mut(y, 8).unwrap()[0] ^= 0xFF;
        }
        candidate.plane_mut(PlaneKind::V).row_mut(3, 4).unwrap()[2] ^= 0x01;

        let diff = diff_images(&reference, &candidate);
        assert!(!diff.is_match());
        assert_eq!(diff.mismatched_rows, [2, 0, 1]);
        assert_eq!(diff.first_mismatch, Some((PlaneKind::Y, 1)));
    }

    #[test]
    fn size_and_format_are_part_of_the_result() {
        let a = gradient(8, 8, 1);
        let mut b = a.clone();
        b.format = ImageFormat::Yv12;
        assert!(!compare_images(&a, &b));

        let smaller = gradient(8, 6, 1);
        let diff = diff_images(&a, &smaller);
        assert!(!diff.size_match);
        // Rows missing from the second image count as mismatches rather than panicking.
        assert_eq!(diff.mismatched_rows[0], 2);
    }
}
