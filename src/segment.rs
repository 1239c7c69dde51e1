//! Segment header parsing (7.2) and segment types (7.3).

use smallvec::SmallVec;

use crate::error::{ParseError, Result, SegmentError, bail, err};
use crate::reader::Reader;

/// "The segment type is a number between 0 and 63, inclusive. Not all values
/// are allowed." (7.3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SegmentType {
    /// Symbol dictionary – see 7.4.2. (type 0)
    SymbolDictionary,
    /// Intermediate text region – see 7.4.3. (type 4)
    IntermediateTextRegion,
    /// Immediate text region – see 7.4.3. (type 6)
    ImmediateTextRegion,
    /// Immediate lossless text region – see 7.4.3. (type 7)
    ImmediateLosslessTextRegion,
    /// Pattern dictionary – see 7.4.4. (type 16)
    PatternDictionary,
    /// Intermediate halftone region – see 7.4.5. (type 20)
    IntermediateHalftoneRegion,
    /// Immediate halftone region – see 7.4.5. (type 22)
    ImmediateHalftoneRegion,
    /// Immediate lossless halftone region – see 7.4.5. (type 23)
    ImmediateLosslessHalftoneRegion,
    /// Intermediate generic region – see 7.4.6. (type 36)
    IntermediateGenericRegion,
    /// Immediate generic region – see 7.4.6. (type 38)
    ImmediateGenericRegion,
    /// Immediate lossless generic region – see 7.4.6. (type 39)
    ImmediateLosslessGenericRegion,
    /// Intermediate generic refinement region – see 7.4.7. (type 40)
    IntermediateGenericRefinementRegion,
    /// Immediate generic refinement region – see 7.4.7. (type 42)
    ImmediateGenericRefinementRegion,
    /// Immediate lossless generic refinement region – see 7.4.7. (type 43)
    ImmediateLosslessGenericRefinementRegion,
    /// Page information – see 7.4.8. (type 48)
    PageInformation,
    /// End of page – see 7.4.9. (type 49)
    EndOfPage,
    /// End of stripe – see 7.4.10. (type 50)
    EndOfStripe,
    /// End of file – see 7.4.11. (type 51)
    EndOfFile,
    /// Profiles – see 7.4.12. (type 52)
    Profiles,
    /// Tables – see 7.4.13. (type 53)
    Tables,
    /// Colour palette – see 7.4.16. (type 54)
    ColourPalette,
    /// Extension – see 7.4.14. (type 62)
    Extension,
}

impl SegmentType {
    /// "All other segment types are reserved and must not be used." (7.3)
    fn from_value(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::SymbolDictionary),
            4 => Ok(Self::IntermediateTextRegion),
            6 => Ok(Self::ImmediateTextRegion),
            7 => Ok(Self::ImmediateLosslessTextRegion),
            16 => Ok(Self::PatternDictionary),
            20 => Ok(Self::IntermediateHalftoneRegion),
            22 => Ok(Self::ImmediateHalftoneRegion),
            23 => Ok(Self::ImmediateLosslessHalftoneRegion),
            36 => Ok(Self::IntermediateGenericRegion),
            38 => Ok(Self::ImmediateGenericRegion),
            39 => Ok(Self::ImmediateLosslessGenericRegion),
            40 => Ok(Self::IntermediateGenericRefinementRegion),
            42 => Ok(Self::ImmediateGenericRefinementRegion),
            43 => Ok(Self::ImmediateLosslessGenericRefinementRegion),
            48 => Ok(Self::PageInformation),
            49 => Ok(Self::EndOfPage),
            50 => Ok(Self::EndOfStripe),
            51 => Ok(Self::EndOfFile),
            52 => Ok(Self::Profiles),
            53 => Ok(Self::Tables),
            54 => Ok(Self::ColourPalette),
            62 => Ok(Self::Extension),
            _ => err!(SegmentError::UnknownType),
        }
    }

    /// Segment types whose bitmap is composed onto the page directly.
    pub(crate) fn is_immediate_region(self) -> bool {
        matches!(
            self,
            Self::ImmediateTextRegion
                | Self::ImmediateLosslessTextRegion
                | Self::ImmediateHalftoneRegion
                | Self::ImmediateLosslessHalftoneRegion
                | Self::ImmediateGenericRegion
                | Self::ImmediateLosslessGenericRegion
                | Self::ImmediateGenericRefinementRegion
                | Self::ImmediateLosslessGenericRefinementRegion
        )
    }
}

/// A parsed segment header (7.2.1).
#[derive(Debug, Clone)]
pub(crate) struct SegmentHeader {
    /// "This four-byte field contains the segment's segment number." (7.2.2)
    pub(crate) segment_number: u32,
    /// "Bits 0-5: Segment type." (7.2.3)
    pub(crate) segment_type: SegmentType,
    /// "This field encodes the number of the page to which this segment
    /// belongs ... a value of zero indicates that this segment is not
    /// associated with any page." (7.2.6)
    pub(crate) page_association: u32,
    /// "This field contains the segment numbers of the segments that this
    /// segment refers to, if any." (7.2.5)
    pub(crate) referred_to_segments: SmallVec<[u32; 4]>,
    /// "This 4-byte field contains the length of the segment's segment data
    /// part, in bytes." (7.2.7) `None` for the unknown length 0xFFFFFFFF.
    pub(crate) data_length: Option<u32>,
}

/// A segment header together with its data.
#[derive(Debug, Clone)]
pub(crate) struct Segment<'a> {
    pub(crate) header: SegmentHeader,
    pub(crate) data: &'a [u8],
    /// The data length was unknown and recovered by scanning (7.2.7).
    pub(crate) had_unknown_length: bool,
}

/// Parse a segment header (7.2).
pub(crate) fn parse_segment_header(reader: &mut Reader<'_>) -> Result<SegmentHeader> {
    // 7.2.2: Segment number.
    let segment_number = reader.read_u32().ok_or(ParseError::UnexpectedEof)?;

    // 7.2.3: Segment header flags.
    let flags = reader.read_byte().ok_or(ParseError::UnexpectedEof)?;
    let segment_type = SegmentType::from_value(flags & 0x3F)?;

    // "Bit 6: Page association field size." (7.2.3)
    let page_association_long = flags & 0x40 != 0;

    // 7.2.4: Referred-to segment count and retention flags.
    //
    // "The three most significant bits of the first byte in this field
    // determine the length of the field. If the value of this three-bit
    // subfield is between 0 and 4, then the field is one byte long. If the
    // value is 7, then the field is at least five bytes long. This subfield
    // must not contain values of 5 and 6."
    let count_byte = reader.read_byte().ok_or(ParseError::UnexpectedEof)?;
    let short_count = count_byte >> 5;

    let referred_count = match short_count {
        0..=4 => short_count as u32,
        7 => {
            let rest = reader.read_bytes(3).ok_or(ParseError::UnexpectedEof)?;
            let count = u32::from_be_bytes([count_byte & 0x1F, rest[0], rest[1], rest[2]]);

            // "The first one-byte field following ... Bit 0: Retain bit for
            // this segment. Bits 1-7: Retain bits for referred-to segments."
            let retention_bytes = (count as usize + 1).div_ceil(8);
            reader
                .skip_bytes(retention_bytes)
                .ok_or(ParseError::UnexpectedEof)?;

            count
        }
        _ => bail!(SegmentError::InvalidReferredCount),
    };

    // 7.2.5: Referred-to segment numbers.
    //
    // "When the current segment's number is 256 or less, then each
    // referred-to segment number is one byte long. Otherwise, when the
    // current segment's number is 65536 or less, each referred-to segment
    // number is two bytes long. Otherwise, four bytes long."
    let mut referred_to_segments = SmallVec::with_capacity(referred_count as usize);
    for _ in 0..referred_count {
        let referred = if segment_number <= 256 {
            reader.read_byte().ok_or(ParseError::UnexpectedEof)? as u32
        } else if segment_number <= 65536 {
            reader.read_u16().ok_or(ParseError::UnexpectedEof)? as u32
        } else {
            reader.read_u32().ok_or(ParseError::UnexpectedEof)?
        };

        referred_to_segments.push(referred);
    }

    // 7.2.6: Segment page association.
    let page_association = if page_association_long {
        reader.read_u32().ok_or(ParseError::UnexpectedEof)?
    } else {
        reader.read_byte().ok_or(ParseError::UnexpectedEof)? as u32
    };

    // 7.2.7: Segment data length.
    let data_length_raw = reader.read_u32().ok_or(ParseError::UnexpectedEof)?;
    let data_length = if data_length_raw == 0xFFFF_FFFF {
        // "If the segment's type is 'Immediate generic region', then the
        // length field may contain the value 0xFFFFFFFF." (7.2.7)
        if !matches!(
            segment_type,
            SegmentType::ImmediateGenericRegion | SegmentType::ImmediateLosslessGenericRegion
        ) {
            bail!(SegmentError::MissingEndMarker);
        }
        None
    } else {
        Some(data_length_raw)
    };

    Ok(SegmentHeader {
        segment_number,
        segment_type,
        page_association,
        referred_to_segments,
        data_length,
    })
}

/// Attach the data part to a parsed header, scanning for the end of
/// unknown-length segments.
pub(crate) fn parse_segment_data<'a>(
    reader: &mut Reader<'a>,
    header: SegmentHeader,
) -> Result<Segment<'a>> {
    let (data, had_unknown_length) = if let Some(length) = header.data_length {
        let data = reader
            .read_bytes(length as usize)
            .ok_or(ParseError::UnexpectedEof)?;
        (data, false)
    } else {
        let length = scan_unknown_length_region(reader)?;
        let data = reader
            .read_bytes(length)
            .ok_or(ParseError::UnexpectedEof)?;
        (data, true)
    };

    Ok(Segment {
        header,
        data,
        had_unknown_length,
    })
}

/// Find the end of an immediate generic region with unknown data length.
///
/// "In order for the decoder to correctly decode the segment, it needs to
/// read the four-byte row count field, which is stored in the last four
/// bytes of the segment's data part. These four bytes can be detected
/// without knowing the length of the data part in advance: if MMR is 1,
/// they are preceded by the two-byte sequence 0x00 0x00; if MMR is 0, they
/// are preceded by the two-byte sequence 0xFF 0xAC." (7.2.7)
fn scan_unknown_length_region(reader: &Reader<'_>) -> Result<usize> {
    let mut scan = reader.clone();
    let start = scan.byte_pos();

    // The generic region data header is the 17-byte region segment
    // information field followed by the flags byte; the end sequence can
    // occur anywhere after it.
    scan.skip_bytes(17).ok_or(ParseError::UnexpectedEof)?;
    let flags = scan.read_byte().ok_or(ParseError::UnexpectedEof)?;
    let mmr = flags & 1 != 0;

    let end_marker: [u8; 2] = if mmr { [0x00, 0x00] } else { [0xFF, 0xAC] };

    while let Some(window) = scan.tail() {
        if window.len() < 6 {
            break;
        }
        if window[..2] == end_marker {
            // Marker plus the four-byte row count.
            return Ok(scan.byte_pos() - start + 2 + 4);
        }
        scan.skip_bytes(1).ok_or(ParseError::UnexpectedEof)?;
    }

    err!(SegmentError::MissingEndMarker)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_header_short_form() {
        // 7.2.8, EXAMPLE 1: "A segment header consisting of the sequence of
        // bytes: 0x00 0x00 0x00 0x20 0x86 0x6B 0x02 0x1E 0x05 0x04", with a
        // data length field appended.
        let data = [
            0x00, 0x00, 0x00, 0x20, // segment number 32
            0x86, // type 6, one-byte page association
            0x6B, // refers to three segments
            0x02, 0x1E, 0x05, // referred segments 2, 30, 5
            0x04, // page association 4
            0x00, 0x00, 0x00, 0x10, // data length 16
        ];

        let mut reader = Reader::new(&data);
        let header = parse_segment_header(&mut reader).unwrap();

        assert_eq!(header.segment_number, 32);
        assert_eq!(header.segment_type, SegmentType::ImmediateTextRegion);
        assert_eq!(header.referred_to_segments.as_slice(), &[2, 30, 5]);
        assert_eq!(header.page_association, 4);
        assert_eq!(header.data_length, Some(16));
    }

    #[test]
    fn segment_header_long_form() {
        // 7.2.8, EXAMPLE 2: a long-form referred-to count with two-byte
        // referred segment numbers and a four-byte page association.
        #[rustfmt::skip]
        let data = [
            0x00, 0x00, 0x02, 0x34, // segment number 564
            0x40,                   // type 0, four-byte page association
            0xE0, 0x00, 0x00, 0x09, // long form, nine referred segments
            0x02, 0xFD,             // retention flags
            0x01, 0x00,             // referred segment 256
            0x00, 0x02,             // referred segment 2
            0x00, 0x1E,             // referred segment 30
            0x00, 0x05,             // referred segment 5
            0x02, 0x00,             // referred segment 512
            0x02, 0x01,             // referred segment 513
            0x02, 0x02,             // referred segment 514
            0x02, 0x03,             // referred segment 515
            0x02, 0x04,             // referred segment 516
            0x00, 0x00, 0x04, 0x01, // page association 1025
            0x00, 0x00, 0x00, 0x20, // data length 32
        ];

        let mut reader = Reader::new(&data);
        let header = parse_segment_header(&mut reader).unwrap();

        assert_eq!(header.segment_number, 564);
        assert_eq!(header.segment_type, SegmentType::SymbolDictionary);
        assert_eq!(
            header.referred_to_segments.as_slice(),
            &[256, 2, 30, 5, 512, 513, 514, 515, 516]
        );
        assert_eq!(header.page_association, 1025);
        assert_eq!(header.data_length, Some(32));
    }

    #[test]
    fn reserved_referred_count_is_rejected() {
        // A referred-to count subfield of 5 is reserved.
        let data = [
            0x00, 0x00, 0x00, 0x01, // segment number 1
            0x30, // type 48
            0xA0, // referred-to count 5 (reserved)
            0x01, // page association
            0x00, 0x00, 0x00, 0x00, // data length
        ];

        let mut reader = Reader::new(&data);
        assert!(parse_segment_header(&mut reader).is_err());
    }

    #[test]
    fn unknown_length_region_is_scanned() {
        // An immediate generic region with unknown data length: 17 bytes of
        // region information, an arithmetic flags byte, some coded bytes,
        // the 0xFF 0xAC end sequence, and a row count of 1.
        #[rustfmt::skip]
        let data = [
            0x00, 0x00, 0x00, 0x01, // segment number
            0x26,                   // type 38
            0x00,                   // no referred segments
            0x01,                   // page association
            0xFF, 0xFF, 0xFF, 0xFF, // unknown data length
            // Data part:
            0x00, 0x00, 0x00, 0x08, // region width 8
            0x00, 0x00, 0x00, 0x01, // region height 1
            0x00, 0x00, 0x00, 0x00, // x location
            0x00, 0x00, 0x00, 0x00, // y location
            0x00,                   // region flags
            0x00,                   // generic flags: arithmetic, template 0
            0x03, 0xFF, 0x02, 0xFE, 0x02, 0xFE, 0x02, 0xFE, // AT pixels
            0x51, 0x22,             // coded data
            0xFF, 0xAC,             // end sequence
            0x00, 0x00, 0x00, 0x01, // row count 1
        ];

        let mut reader = Reader::new(&data);
        let header = parse_segment_header(&mut reader).unwrap();
        assert_eq!(header.data_length, None);

        let segment = parse_segment_data(&mut reader, header).unwrap();
        assert!(segment.had_unknown_length);
        assert_eq!(segment.data.len(), 34);
        assert_eq!(&segment.data[segment.data.len() - 4..], &[0, 0, 0, 1]);
        assert!(reader.at_end());
    }
}
