//! Document structure: the file header (Annex D), the segment arena, and
//! page composition (7.4.8.5).
//!
//! A document owns every parsed segment; pages are composed on demand by
//! walking the page's segments (plus the global, page-0 segments) in
//! segment-number order, decoding dictionaries and tables as they appear and
//! combining region bitmaps into the page bitmap.

use std::panic::{AssertUnwindSafe, catch_unwind};

use log::{debug, error, warn};

use crate::bitmap::{Bitmap, CombinationOperator};
use crate::blit::blit;
use crate::decode::pattern::PatternDictionary;
use crate::decode::symbol::SymbolDictionary;
use crate::decode::{RegionBitmap, generic, halftone, pattern, refinement, symbol, text};
use crate::error::{
    DecodeError, FormatError, ParseError, RegionError, Result, SegmentError, bail,
};
use crate::huffman::HuffmanTable;
use crate::page_info::{PageInformation, parse_page_information};
use crate::reader::Reader;
use crate::segment::{Segment, SegmentType, parse_segment_data, parse_segment_header};

/// "This is an 8-byte sequence containing 0x97 0x4A 0x42 0x32 0x0D 0x0A 0x1A
/// 0x0A." (D.4.1)
const FILE_HEADER_ID: [u8; 8] = [0x97, 0x4A, 0x42, 0x32, 0x0D, 0x0A, 0x1A, 0x0A];

/// "There are two standalone file organizations possible for a JBIG2
/// bitstream." (Annex D)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileOrganization {
    Sequential,
    RandomAccess,
}

/// Global segments supplied out of band, e.g. from a PDF `/JBIG2Globals`
/// stream. Such a stream is a headerless sequence of segments.
#[derive(Debug, Clone)]
pub struct Globals<'a> {
    pub(crate) segments: Vec<Segment<'a>>,
}

impl<'a> Globals<'a> {
    /// Parse a globals stream.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let mut reader = Reader::new(data);
        let segments = parse_segments_sequential(&mut reader)?;
        Ok(Self { segments })
    }
}

/// A parsed JBIG2 document: all segments, indexed by page.
pub struct Document<'a> {
    segments: Vec<Segment<'a>>,
    page_numbers: Vec<u32>,
    number_of_pages: Option<u32>,
}

/// One composed page.
#[derive(Debug, Clone)]
pub struct DecodedPage {
    /// The composed page bitmap.
    pub bitmap: Bitmap,
    /// Horizontal resolution in pixels/metre, if declared.
    pub x_resolution: Option<u32>,
    /// Vertical resolution in pixels/metre, if declared.
    pub y_resolution: Option<u32>,
}

impl<'a> Document<'a> {
    /// Parse a document from a standalone or embedded JBIG2 stream.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        Self::build(data, &[])
    }

    /// Parse a document whose stream refers to segments supplied out of
    /// band.
    pub fn with_globals(data: &'a [u8], globals: &Globals<'a>) -> Result<Self> {
        Self::build(data, &globals.segments)
    }

    fn build(data: &'a [u8], globals: &[Segment<'a>]) -> Result<Self> {
        let mut reader = Reader::new(data);

        let mut organization = FileOrganization::Sequential;
        let mut number_of_pages = None;

        // The file header is absent for streams embedded in another format;
        // those are sequentially organised (Annex D.3).
        if probe_file_header(&mut reader) {
            reader.skip_bytes(8).ok_or(ParseError::UnexpectedEof)?;

            // D.4.2: File header flags.
            let flags = reader.read_byte().ok_or(ParseError::UnexpectedEof)?;

            // "Bits 4-7: Reserved; must be 0." (D.4.2)
            if flags & 0xF0 != 0 {
                bail!(FormatError::ReservedBits);
            }

            // "Bit 0: File organisation type." (D.4.2)
            organization = if flags & 0x01 != 0 {
                FileOrganization::Sequential
            } else {
                FileOrganization::RandomAccess
            };

            // "Bit 1: Unknown number of pages." (D.4.3)
            if flags & 0x02 == 0 {
                number_of_pages = Some(reader.read_u32().ok_or(ParseError::UnexpectedEof)?);
            }
        }

        let mut segments = globals.to_vec();
        let parsed = match organization {
            FileOrganization::Sequential => parse_segments_sequential(&mut reader)?,
            FileOrganization::RandomAccess => parse_segments_random(&mut reader)?,
        };
        segments.extend(parsed);

        let mut page_numbers: Vec<u32> = segments
            .iter()
            .map(|segment| segment.header.page_association)
            .filter(|&page| page != 0)
            .collect();
        page_numbers.sort_unstable();
        page_numbers.dedup();

        debug!(
            "parsed {} segments across {} pages",
            segments.len(),
            page_numbers.len()
        );

        Ok(Self {
            segments,
            page_numbers,
            number_of_pages,
        })
    }

    /// The number of pages: the declared count when the file header carries
    /// one, otherwise the number of pages segments are associated with.
    pub fn page_count(&self) -> u32 {
        match self.number_of_pages {
            Some(count) if count != 0 => count,
            _ => self.page_numbers.len() as u32,
        }
    }

    /// The page numbers segments are associated with, ascending.
    pub fn page_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.page_numbers.iter().copied()
    }

    /// Compose the bitmap of the given page.
    ///
    /// Any panic in a sub-decoder is caught here and reported as
    /// [`DecodeError::Internal`]; other pages of the document stay
    /// decodable.
    pub fn decode_page(&self, page_number: u32) -> Result<DecodedPage> {
        if !self.page_numbers.contains(&page_number) {
            bail!(FormatError::MissingPage);
        }

        match catch_unwind(AssertUnwindSafe(|| self.compose_page(page_number))) {
            Ok(result) => result,
            Err(_) => {
                error!("page {page_number} composition panicked");
                Err(DecodeError::Internal)
            }
        }
    }

    /// The page composition procedure (7.4.8.5 and 8.2).
    fn compose_page(&self, page_number: u32) -> Result<DecodedPage> {
        // Global segments first, then the page's own, each in segment-number
        // order.
        let mut walk: Vec<&Segment<'a>> = self
            .segments
            .iter()
            .filter(|segment| segment.header.page_association == 0)
            .collect();
        let globals_len = walk.len();
        walk.extend(
            self.segments
                .iter()
                .filter(|segment| segment.header.page_association == page_number),
        );
        walk[..globals_len].sort_by_key(|segment| segment.header.segment_number);
        walk[globals_len..].sort_by_key(|segment| segment.header.segment_number);

        let info = walk
            .iter()
            .find(|segment| segment.header.segment_type == SegmentType::PageInformation)
            .map(|segment| parse_page_information(&mut Reader::new(segment.data)))
            .ok_or(FormatError::MissingPageInfo)??;

        // "A page's bitmap height may be declared in its page information
        // segment to be unknown. In this case, the page must be striped."
        // (7.4.8.2)
        let striped = info.is_striped && info.height == 0xFFFF_FFFF;
        let height = if info.height == 0xFFFF_FFFF {
            stripe_height(&walk).ok_or(FormatError::UnknownPageHeight)?
        } else {
            info.height
        };
        if striped {
            debug!(
                "striped page of height {height}, maximum stripe size {}",
                info.max_stripe_size
            );
        }

        if info.width as u64 * height as u64 > 1 << 31 {
            bail!(RegionError::InvalidDimension);
        }

        let mut page = Bitmap::new(info.width, height);
        if info.default_pixel != 0 {
            page.set_default_pixel();
        }

        let single_region = walk
            .iter()
            .filter(|segment| segment.header.segment_type.is_immediate_region())
            .count()
            == 1;

        let mut state = ComposeState::default();
        let mut start_line: u32 = 0;

        for segment in &walk {
            let header = &segment.header;
            let mut reader = Reader::new(segment.data);
            debug!(
                "segment {}: {:?}, {} bytes",
                header.segment_number,
                header.segment_type,
                segment.data.len()
            );

            match header.segment_type {
                SegmentType::SymbolDictionary => {
                    let input_symbols = state.collect_symbols(&header.referred_to_segments);
                    let inherited = header
                        .referred_to_segments
                        .iter()
                        .rev()
                        .find_map(|&number| state.symbol_dictionary(number));
                    let tables = state.collect_tables(&header.referred_to_segments);

                    let dictionary =
                        symbol::decode(&mut reader, &input_symbols, inherited, &tables)?;
                    state
                        .symbol_dicts
                        .push((header.segment_number, dictionary));
                }
                SegmentType::PatternDictionary => {
                    let dictionary = pattern::decode(&mut reader)?;
                    state
                        .pattern_dicts
                        .push((header.segment_number, dictionary));
                }
                SegmentType::Tables => {
                    let table = HuffmanTable::read_custom(&mut reader)?;
                    state.tables.push((header.segment_number, table));
                }
                SegmentType::ImmediateGenericRegion
                | SegmentType::ImmediateLosslessGenericRegion => {
                    let region = generic::decode(&mut reader, segment.had_unknown_length)?;
                    place_region(
                        &mut page,
                        region,
                        &info,
                        striped,
                        start_line,
                        single_region,
                    );
                }
                SegmentType::IntermediateGenericRegion => {
                    let region = generic::decode(&mut reader, segment.had_unknown_length)?;
                    state.regions.push((header.segment_number, region));
                }
                SegmentType::ImmediateTextRegion | SegmentType::ImmediateLosslessTextRegion => {
                    let symbols = state.collect_symbols(&header.referred_to_segments);
                    let tables = state.collect_tables(&header.referred_to_segments);
                    let region = text::decode(&mut reader, &symbols, &tables)?;
                    place_region(
                        &mut page,
                        region,
                        &info,
                        striped,
                        start_line,
                        single_region,
                    );
                }
                SegmentType::IntermediateTextRegion => {
                    let symbols = state.collect_symbols(&header.referred_to_segments);
                    let tables = state.collect_tables(&header.referred_to_segments);
                    let region = text::decode(&mut reader, &symbols, &tables)?;
                    state.regions.push((header.segment_number, region));
                }
                SegmentType::ImmediateHalftoneRegion
                | SegmentType::ImmediateLosslessHalftoneRegion => {
                    let dictionary = state
                        .pattern_dictionary(&header.referred_to_segments)
                        .ok_or(SegmentError::MissingPatternDictionary)?;
                    let region = halftone::decode(&mut reader, dictionary)?;
                    place_region(
                        &mut page,
                        region,
                        &info,
                        striped,
                        start_line,
                        single_region,
                    );
                }
                SegmentType::IntermediateHalftoneRegion => {
                    let dictionary = state
                        .pattern_dictionary(&header.referred_to_segments)
                        .ok_or(SegmentError::MissingPatternDictionary)?;
                    let region = halftone::decode(&mut reader, dictionary)?;
                    state.regions.push((header.segment_number, region));
                }
                SegmentType::ImmediateGenericRefinementRegion
                | SegmentType::ImmediateLosslessGenericRefinementRegion => {
                    // "If there are no referred-to segments, then use the
                    // page bitmap as the reference buffer." (7.4.7.5)
                    let (reference, ref_x, ref_y) =
                        state.refinement_reference(&header.referred_to_segments, &page);
                    let region = refinement::decode(&mut reader, reference, ref_x, ref_y)?;
                    place_region(
                        &mut page,
                        region,
                        &info,
                        striped,
                        start_line,
                        single_region,
                    );
                }
                SegmentType::IntermediateGenericRefinementRegion => {
                    let (reference, ref_x, ref_y) =
                        state.refinement_reference(&header.referred_to_segments, &page);
                    let region = refinement::decode(&mut reader, reference, ref_x, ref_y)?;
                    state.regions.push((header.segment_number, region));
                }
                SegmentType::EndOfStripe => {
                    // "The segment data of an end of stripe segment consists
                    // of one four-byte value, indicating the Y coordinate of
                    // the end row of the stripe." (7.4.10)
                    let line = reader.read_u32().ok_or(ParseError::UnexpectedEof)?;
                    start_line = line.wrapping_add(1);
                }
                SegmentType::PageInformation
                | SegmentType::EndOfPage
                | SegmentType::EndOfFile => {}
                SegmentType::Profiles | SegmentType::ColourPalette | SegmentType::Extension => {
                    debug!(
                        "skipping segment {} of type {:?}",
                        header.segment_number, header.segment_type
                    );
                }
            }
        }

        Ok(DecodedPage {
            bitmap: page,
            x_resolution: (info.x_resolution != 0).then_some(info.x_resolution),
            y_resolution: (info.y_resolution != 0).then_some(info.y_resolution),
        })
    }
}

/// Dictionaries, tables and intermediate regions decoded so far during one
/// page composition.
#[derive(Default)]
struct ComposeState {
    symbol_dicts: Vec<(u32, SymbolDictionary)>,
    pattern_dicts: Vec<(u32, PatternDictionary)>,
    tables: Vec<(u32, HuffmanTable)>,
    regions: Vec<(u32, RegionBitmap)>,
}

impl ComposeState {
    fn symbol_dictionary(&self, number: u32) -> Option<&SymbolDictionary> {
        self.symbol_dicts
            .iter()
            .find(|(n, _)| *n == number)
            .map(|(_, dictionary)| dictionary)
    }

    /// "Concatenate all the input symbol dictionaries to form SDINSYMS."
    /// (6.5.5, step 1) — also SBSYMS for text regions (7.4.3.1.5).
    fn collect_symbols(&self, referred: &[u32]) -> Vec<&Bitmap> {
        referred
            .iter()
            .filter_map(|&number| self.symbol_dictionary(number))
            .flat_map(|dictionary| dictionary.exported.iter())
            .collect()
    }

    /// The custom code tables among the referred segments, in referral
    /// order (7.4.3.1.6).
    fn collect_tables(&self, referred: &[u32]) -> Vec<&HuffmanTable> {
        referred
            .iter()
            .filter_map(|&number| {
                self.tables
                    .iter()
                    .find(|(n, _)| *n == number)
                    .map(|(_, table)| table)
            })
            .collect()
    }

    fn pattern_dictionary(&self, referred: &[u32]) -> Option<&PatternDictionary> {
        referred.iter().find_map(|&number| {
            self.pattern_dicts
                .iter()
                .find(|(n, _)| *n == number)
                .map(|(_, dictionary)| dictionary)
        })
    }

    /// The reference buffer of a refinement region (7.4.7.5).
    fn refinement_reference<'s>(
        &'s self,
        referred: &[u32],
        page: &'s Bitmap,
    ) -> (&'s Bitmap, u32, u32) {
        for &number in referred {
            if let Some((_, region)) = self.regions.iter().find(|(n, _)| *n == number) {
                return (
                    &region.bitmap,
                    region.info.x_location,
                    region.info.y_location,
                );
            }
        }
        (page, 0, 0)
    }
}

/// Combine a decoded region into the page bitmap (8.2, step 4).
fn place_region(
    page: &mut Bitmap,
    region: RegionBitmap,
    info: &PageInformation,
    striped: bool,
    start_line: u32,
    single_region: bool,
) {
    // "If the page's combination operator override flag is 0, then every
    // direct region segment must use the page's default combination
    // operator." (7.4.8.5)
    let operator = if info.combination_operator_overridden {
        region.info.combination_operator
    } else {
        info.default_combination_operator
    };

    // When the page consists of exactly one region of exactly the page's
    // size over a white background, the region bitmap is the page bitmap.
    if single_region
        && !striped
        && info.default_pixel == 0
        && region.bitmap.width() == page.width()
        && region.bitmap.height() == page.height()
        && matches!(
            operator,
            CombinationOperator::Or | CombinationOperator::Xor | CombinationOperator::Replace
        )
    {
        *page = region.bitmap;
        return;
    }

    // Striped pages place each region at the running stripe start row.
    let y = if striped {
        start_line
    } else {
        region.info.y_location
    };

    blit(
        &region.bitmap,
        page,
        region.info.x_location as i32,
        y as i32,
        operator,
    );
}

/// The page height of a striped page: one past the largest end-of-stripe row
/// (7.4.10).
fn stripe_height(walk: &[&Segment<'_>]) -> Option<u32> {
    let mut max = None;

    for segment in walk {
        if segment.header.segment_type == SegmentType::EndOfStripe {
            let line = u32::from_be_bytes(segment.data.get(..4)?.try_into().ok()?);
            let height = line.checked_add(1)?;
            max = Some(max.map_or(height, |m: u32| m.max(height)));
        }
    }

    max
}

fn probe_file_header(reader: &mut Reader<'_>) -> bool {
    reader.mark();

    let mut matches = true;
    for &expected in &FILE_HEADER_ID {
        match reader.read_byte() {
            Some(byte) if byte == expected => {}
            _ => {
                matches = false;
                break;
            }
        }
    }

    reader.reset();
    matches
}

/// The smallest possible segment header: number, flags, referred-to count,
/// page association and data length.
const MIN_SEGMENT_HEADER_LEN: usize = 11;

/// Parse segments stored header-then-data (D.1).
fn parse_segments_sequential<'a>(reader: &mut Reader<'a>) -> Result<Vec<Segment<'a>>> {
    let mut segments = Vec::new();

    loop {
        let remaining = reader.len() - reader.byte_pos();
        if remaining < MIN_SEGMENT_HEADER_LEN {
            if remaining > 0 {
                warn!("{remaining} trailing bytes after the last segment");
            }
            break;
        }

        let header = parse_segment_header(reader)?;
        let segment = parse_segment_data(reader, header)?;

        // "If a file contains an end of file segment, it must be the last
        // segment." (7.4.11)
        let done = segment.header.segment_type == SegmentType::EndOfFile;
        segments.push(segment);

        if done {
            break;
        }
    }

    Ok(segments)
}

/// Parse segments with all headers up front (D.2): the data offsets are
/// recovered by accumulating the declared lengths behind the header block.
fn parse_segments_random<'a>(reader: &mut Reader<'a>) -> Result<Vec<Segment<'a>>> {
    let mut headers = Vec::new();

    loop {
        if reader.at_end() {
            break;
        }

        let header = parse_segment_header(reader)?;

        // The data offset pre-pass needs every length; an unknown length is
        // only meaningful sequentially.
        if header.data_length.is_none() {
            bail!(SegmentError::MissingEndMarker);
        }

        let done = header.segment_type == SegmentType::EndOfFile;
        headers.push(header);

        if done {
            break;
        }
    }

    // Second pass: the data parts follow the header block back to back, so
    // each segment's data offset is the accumulated length of its
    // predecessors.
    let mut segments = Vec::with_capacity(headers.len());
    let mut offset = reader.byte_pos();
    for header in headers {
        let length = header.data_length.unwrap_or(0) as usize;
        reader.seek(offset);
        segments.push(parse_segment_data(reader, header)?);
        offset += length;
    }

    Ok(segments)
}
