//! The MMR (ITU-T T.6) collaborator.
//!
//! "An invocation of the generic region decoding procedure with MMR equal to
//! 1 shall consume an integral number of bytes, beginning and ending on a
//! byte boundary." (6.2.6)
//!
//! The actual two-dimensional Modified-Modified READ decoding is done by
//! `hayro-ccitt`; this module only adapts its packed-byte sink to the
//! byte-packed [`Bitmap`] rows and fixes the settings JBIG2 mandates.

use crate::bitmap::Bitmap;
use crate::error::{RegionError, Result};

/// An MMR decoder for one region's worth of encoded data.
pub(crate) struct MmrDecoder<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
}

/// Writes decoded bytes straight into the packed rows of a [`Bitmap`].
struct RowSink<'a> {
    bitmap: &'a mut Bitmap,
    x: usize,
    y: u32,
}

impl hayro_ccitt::Decoder for RowSink<'_> {
    fn push_byte(&mut self, byte: u8) {
        if self.y < self.bitmap.height() && self.x < self.bitmap.row_stride() {
            let index = self.bitmap.byte_index(0, self.y) + self.x;
            self.bitmap.set_byte(index, byte);
        }
        self.x += 1;
    }

    fn push_bytes(&mut self, byte: u8, count: usize) {
        for _ in 0..count {
            self.push_byte(byte);
        }
    }

    fn next_line(&mut self) {
        self.x = 0;
        self.y += 1;
    }
}

impl<'a> MmrDecoder<'a> {
    pub(crate) fn new(data: &'a [u8], width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
        }
    }

    /// Decode one `width` × `height` bitmap, returning it together with the
    /// number of encoded bytes consumed.
    pub(crate) fn uncompress(&self) -> Result<(Bitmap, usize)> {
        let mut bitmap = Bitmap::new(self.width, self.height);

        let settings = hayro_ccitt::DecodeSettings {
            columns: self.width,
            rows: self.height,
            // "If the number of bytes contained in the encoded bitmap is
            // known in advance, then it is permissible for the data stream
            // not to contain an EOFB" (6.2.6). It may still contain one.
            end_of_block: true,
            end_of_line: false,
            rows_are_byte_aligned: false,
            encoding: hayro_ccitt::EncodingMode::Group4,
            // "Pixels decoded by the MMR decoder having the value 'black'
            // shall be treated as having the value 1." (6.2.6)
            // hayro-ccitt uses 1 for white by default, so invert.
            invert_black: true,
        };

        let mut sink = RowSink {
            bitmap: &mut bitmap,
            x: 0,
            y: 0,
        };

        let consumed = hayro_ccitt::decode(self.data, &mut sink, &settings)
            .ok_or(RegionError::MmrFailed)?;

        // The packer pads partial trailing bytes; keep row padding zero.
        if self.width & 7 != 0 {
            let mask = 0xFF << (8 - (self.width & 7));
            for y in 0..self.height {
                let index = bitmap.byte_index(self.width - 1, y);
                let byte = bitmap.get_byte(index);
                bitmap.set_byte(index, byte & mask);
            }
        }

        Ok((bitmap, consumed))
    }
}
