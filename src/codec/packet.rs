use std::iter::FusedIterator;
use std::slice;

use crate::codec::Packet;
use crate::video::Image;

/// Walks the output of one encode or flush call.
///
/// Each packet is yielded at most once and the iterator cannot be rewound;
/// packets produced by a later call need a new iterator.
#[derive(Debug)]
pub struct CxDataIter<'a> {
    pending: slice::Iter<'a, Packet>,
}

impl<'a> CxDataIter<'a> {
    pub fn new(packets: &'a [Packet]) -> Self {
        Self {
            pending: packets.iter(),
        }
    }
}

impl<'a> Iterator for CxDataIter<'a> {
    type Item = &'a Packet;

    fn next(&mut self) -> Option<Self::Item> {
        self.pending.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.pending.size_hint()
    }
}

impl FusedIterator for CxDataIter<'_> {}

/// Yields the decoder's current output image, once.
#[derive(Debug)]
pub struct DxDataIter<'a> {
    frame: Option<&'a Image>,
}

impl<'a> DxDataIter<'a> {
    pub fn new(frame: Option<&'a Image>) -> Self {
        Self { frame }
    }
}

impl<'a> Iterator for DxDataIter<'a> {
    type Item = &'a Image;

    fn next(&mut self) -> Option<Self::Item> {
        self.frame.take()
    }
}

impl FusedIterator for DxDataIter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FramePacket;
    use crate::video::ImageFormat;

    #[test]
    fn packets_are_yielded_once_in_order() {
        let packets = vec![
            Packet::Stats(vec![1, 2]),
            Packet::Frame(FramePacket {
                data: vec![9],
                pts: 4,
                duration: 1,
                keyframe: true,
            }),
            Packet::Other {
                kind: 7,
                data: Vec::new(),
            },
        ];
        let mut iter = CxDataIter::new(&packets);
        assert_eq!(iter.next(), Some(&packets[0]));
        assert_eq!(iter.next(), Some(&packets[1]));
        assert_eq!(iter.next(), Some(&packets[2]));
        assert_eq!(iter.next(), None);
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn decoder_output_is_yielded_once() {
        let image = Image::new(ImageFormat::I420, 2, 2);
        let mut iter = DxDataIter::new(Some(&image));
        assert!(iter.next().is_some());
        assert!(iter.next().is_none());
        assert!(DxDataIter::new(None).next().is_none());
    }
}
