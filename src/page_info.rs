//! Page information segment parsing (7.4.8).

use crate::bitmap::CombinationOperator;
use crate::error::{ParseError, Result};
use crate::reader::Reader;

/// Parsed page information segment (7.4.8).
#[derive(Debug, Clone)]
pub(crate) struct PageInformation {
    /// "This is a four-byte value containing the width in pixels of the
    /// page's bitmap." (7.4.8.1)
    pub(crate) width: u32,
    /// "This is a four-byte value containing the height in pixels of the
    /// page's bitmap. ... a value of 0xFFFFFFFF indicates that the height is
    /// unknown." (7.4.8.2)
    pub(crate) height: u32,
    /// Resolution in pixels/metre, 0 when unknown (7.4.8.3, 7.4.8.4).
    pub(crate) x_resolution: u32,
    pub(crate) y_resolution: u32,
    /// "Bit 2: Page default pixel value. This bit contains the initial value
    /// for every pixel in the page, before any region segments are decoded
    /// or drawn." (7.4.8.5)
    pub(crate) default_pixel: u8,
    /// "Bits 3-4: Page default combination operator." (7.4.8.5)
    pub(crate) default_combination_operator: CombinationOperator,
    /// "Bit 6: Page combination operator overridden. If this bit is 1, then
    /// direct region segments associated with this page may use any
    /// combination operators." (7.4.8.5)
    pub(crate) combination_operator_overridden: bool,
    /// "Bit 15: Page is striped. If the 'page is striped' bit is 1, then the
    /// page may have end of stripe segments associated with it." (7.4.8.6)
    pub(crate) is_striped: bool,
    /// "Bits 0-14: Maximum stripe size." (7.4.8.6)
    pub(crate) max_stripe_size: u16,
}

/// Parse a page information segment (7.4.8).
pub(crate) fn parse_page_information(reader: &mut Reader<'_>) -> Result<PageInformation> {
    let width = reader.read_u32().ok_or(ParseError::UnexpectedEof)?;
    let height = reader.read_u32().ok_or(ParseError::UnexpectedEof)?;
    let x_resolution = reader.read_u32().ok_or(ParseError::UnexpectedEof)?;
    let y_resolution = reader.read_u32().ok_or(ParseError::UnexpectedEof)?;

    let flags = reader.read_byte().ok_or(ParseError::UnexpectedEof)?;
    let default_pixel = (flags >> 2) & 0x01;
    let default_combination_operator = match (flags >> 3) & 0x03 {
        0 => CombinationOperator::Or,
        1 => CombinationOperator::And,
        2 => CombinationOperator::Xor,
        _ => CombinationOperator::Xnor,
    };
    let combination_operator_overridden = flags & 0x40 != 0;

    let striping = reader.read_u16().ok_or(ParseError::UnexpectedEof)?;

    Ok(PageInformation {
        width,
        height,
        x_resolution,
        y_resolution,
        default_pixel,
        default_combination_operator,
        combination_operator_overridden,
        is_striped: striping & 0x8000 != 0,
        max_stripe_size: striping & 0x7FFF,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_basic_page_information() {
        let data = [
            0x00, 0x00, 0x00, 0x40, // width 64
            0x00, 0x00, 0x00, 0x38, // height 56
            0x00, 0x00, 0x00, 0x00, // x resolution unknown
            0x00, 0x00, 0x00, 0x00, // y resolution unknown
            0b0000_0100, // default pixel 1, default operator OR
            0x00, 0x00, // not striped
        ];

        let mut reader = Reader::new(&data);
        let info = parse_page_information(&mut reader).unwrap();

        assert_eq!(info.width, 64);
        assert_eq!(info.height, 56);
        assert_eq!(info.default_pixel, 1);
        assert_eq!(
            info.default_combination_operator,
            CombinationOperator::Or
        );
        assert!(!info.combination_operator_overridden);
        assert!(!info.is_striped);
    }

    #[test]
    fn parse_striped_page_information() {
        let data = [
            0x00, 0x00, 0x00, 0x10, // width 16
            0xFF, 0xFF, 0xFF, 0xFF, // height unknown
            0x00, 0x00, 0x00, 0x00, // x resolution
            0x00, 0x00, 0x00, 0x00, // y resolution
            0b0101_0000, // operator XOR, override allowed
            0x80, 0x20, // striped, maximum stripe size 32
        ];

        let mut reader = Reader::new(&data);
        let info = parse_page_information(&mut reader).unwrap();

        assert_eq!(info.height, 0xFFFF_FFFF);
        assert_eq!(
            info.default_combination_operator,
            CombinationOperator::Xor
        );
        assert!(info.combination_operator_overridden);
        assert!(info.is_striped);
        assert_eq!(info.max_stripe_size, 32);
    }
}
