//! The adaptive binary arithmetic decoder (Annex E) and the integer decoding
//! procedures built on it (Annex A).
//!
//! "The arithmetic decoding procedure receives an arithmetically coded bit
//! sequence and an associated sequence of context labels, and reconstructs
//! the original string of binary symbols." (E.1.1)
//!
//! The code register is kept in complemented form: initialisation loads
//! `(B ^ 0xFF) << 16` and BYTEIN adds the complement of each new byte, so the
//! MPS sub-interval test becomes a plain `C < A` comparison against the
//! 32-bit interval register. The probability estimates of Table E.1 are
//! stored pre-shifted by 16 bits to match.

use crate::reader::Reader;

/// An entry of "Table E.1 – Qe values and probability estimation process".
#[derive(Debug, Clone, Copy)]
struct QeEntry {
    /// "`Qe_Value`" - The probability estimate, as 32-bit fixed point.
    qe: u32,
    /// "NMPS" - Next index if MPS is coded.
    nmps: u8,
    /// "NLPS" - Next index if LPS is coded.
    nlps: u8,
    /// "SWITCH" - MPS/LPS symbol switch.
    switch: bool,
}

macro_rules! qe {
    ($($qe:expr, $nmps:expr, $nlps:expr, $switch:expr),+ $(,)?) => {
        [
            $(
                QeEntry {
                    qe: $qe,
                    nmps: $nmps,
                    nlps: $nlps,
                    switch: $switch,
                }
            ),+
        ]
    };
}

/// "Table E.1 – Qe values and probability estimation process"
#[rustfmt::skip]
static QE_TABLE: [QeEntry; 47] = qe!(
    // Index   Qe_Value      NMPS  NLPS  SWITCH
    /*  0 */ 0x5601_0000,    1,    1,    true,
    /*  1 */ 0x3401_0000,    2,    6,    false,
    /*  2 */ 0x1801_0000,    3,    9,    false,
    /*  3 */ 0x0AC1_0000,    4,    12,   false,
    /*  4 */ 0x0521_0000,    5,    29,   false,
    /*  5 */ 0x0221_0000,    38,   33,   false,
    /*  6 */ 0x5601_0000,    7,    6,    true,
    /*  7 */ 0x5401_0000,    8,    14,   false,
    /*  8 */ 0x4801_0000,    9,    14,   false,
    /*  9 */ 0x3801_0000,    10,   14,   false,
    /* 10 */ 0x3001_0000,    11,   17,   false,
    /* 11 */ 0x2401_0000,    12,   18,   false,
    /* 12 */ 0x1C01_0000,    13,   20,   false,
    /* 13 */ 0x1601_0000,    29,   21,   false,
    /* 14 */ 0x5601_0000,    15,   14,   true,
    /* 15 */ 0x5401_0000,    16,   14,   false,
    /* 16 */ 0x5101_0000,    17,   15,   false,
    /* 17 */ 0x4801_0000,    18,   16,   false,
    /* 18 */ 0x3801_0000,    19,   17,   false,
    /* 19 */ 0x3401_0000,    20,   18,   false,
    /* 20 */ 0x3001_0000,    21,   19,   false,
    /* 21 */ 0x2801_0000,    22,   19,   false,
    /* 22 */ 0x2401_0000,    23,   20,   false,
    /* 23 */ 0x2201_0000,    24,   21,   false,
    /* 24 */ 0x1C01_0000,    25,   22,   false,
    /* 25 */ 0x1801_0000,    26,   23,   false,
    /* 26 */ 0x1601_0000,    27,   24,   false,
    /* 27 */ 0x1401_0000,    28,   25,   false,
    /* 28 */ 0x1201_0000,    29,   26,   false,
    /* 29 */ 0x1101_0000,    30,   27,   false,
    /* 30 */ 0x0AC1_0000,    31,   28,   false,
    /* 31 */ 0x09C1_0000,    32,   29,   false,
    /* 32 */ 0x08A1_0000,    33,   30,   false,
    /* 33 */ 0x0521_0000,    34,   31,   false,
    /* 34 */ 0x0441_0000,    35,   32,   false,
    /* 35 */ 0x02A1_0000,    36,   33,   false,
    /* 36 */ 0x0221_0000,    37,   34,   false,
    /* 37 */ 0x0141_0000,    38,   35,   false,
    /* 38 */ 0x0111_0000,    39,   36,   false,
    /* 39 */ 0x0085_0000,    40,   37,   false,
    /* 40 */ 0x0049_0000,    41,   38,   false,
    /* 41 */ 0x0025_0000,    42,   39,   false,
    /* 42 */ 0x0015_0000,    43,   40,   false,
    /* 43 */ 0x0009_0000,    44,   41,   false,
    /* 44 */ 0x0005_0000,    45,   42,   false,
    /* 45 */ 0x0001_0000,    45,   43,   false,
    /* 46 */ 0x5601_0000,    46,   46,   false,
);

/// One adaptive probability estimator table, keyed by context.
///
/// Each entry packs `(index << 1) | mps`, where `index` selects a row of
/// Table E.1 and `mps` is the current more-probable-symbol sense for that
/// context (E.2.4). A whole table is used for one coding role: one per
/// generic template, one per refinement template, one per arithmetic integer
/// decoding procedure.
#[derive(Debug, Clone)]
pub(crate) struct DecoderStats {
    table: Vec<u8>,
    /// The context register seeding the next [`ArithmeticDecoder::decode_bit`].
    context: usize,
}

impl DecoderStats {
    pub(crate) fn new(context_size: usize) -> Self {
        Self {
            table: vec![0; context_size],
            context: 0,
        }
    }

    #[inline(always)]
    pub(crate) fn len(&self) -> usize {
        self.table.len()
    }

    /// Zero every entry: index 0, MPS 0 for all contexts.
    pub(crate) fn reset(&mut self) {
        self.table.fill(0);
    }

    /// Replace this table's entries with another's. Both must be equal-sized.
    pub(crate) fn overwrite(&mut self, other: &DecoderStats) {
        debug_assert_eq!(self.table.len(), other.table.len());
        self.table.copy_from_slice(&other.table);
    }

    /// Select the context used by the next `decode_bit`.
    #[inline(always)]
    pub(crate) fn set_index(&mut self, context: usize) {
        self.context = context;
    }

    /// Reset to a table of `context_size` entries, adopting `previous` when
    /// it is present and sized for the same template, and zeroing otherwise.
    ///
    /// This is how symbol dictionaries inherit the estimator state of an
    /// input dictionary (7.4.2.1.1, bits 8 and 9).
    pub(crate) fn reset_or_adopt(&mut self, context_size: usize, previous: Option<&DecoderStats>) {
        match previous {
            Some(previous) if previous.len() == context_size => {
                if self.len() == context_size {
                    self.overwrite(previous);
                } else {
                    *self = previous.clone();
                }
            }
            _ => {
                if self.len() == context_size {
                    self.reset();
                } else {
                    *self = DecoderStats::new(context_size);
                }
            }
        }
    }
}

/// The arithmetic decoder state (E.3.1) over one segment's data.
pub(crate) struct ArithmeticDecoder<'a> {
    data: &'a [u8],
    /// Index of the next byte to fetch.
    next: usize,
    /// The two lookahead bytes, `B` and `B1`.
    b0: u8,
    b1: u8,
    /// The complemented code register.
    c: u32,
    /// "A-register" (E.3.1), scaled to 32 bits.
    a: u32,
    /// "CT - The bit counter" until the next byte fetch.
    ct: i32,
}

impl<'a> ArithmeticDecoder<'a> {
    /// Initialise the decoder over the given data (the INITDEC procedure,
    /// E.3.5).
    pub(crate) fn new(data: &'a [u8]) -> Self {
        let mut decoder = ArithmeticDecoder {
            data,
            next: 0,
            b0: 0,
            b1: 0,
            c: 0,
            a: 0,
            ct: 0,
        };

        decoder.b0 = decoder.fetch();
        decoder.b1 = decoder.fetch();

        decoder.c = ((decoder.b0 ^ 0xFF) as u32) << 16;
        decoder.byte_in();
        decoder.c <<= 7;
        decoder.ct -= 7;
        decoder.a = 0x8000_0000;

        decoder
    }

    /// Initialise the decoder over the remaining data of `reader`.
    pub(crate) fn from_reader(reader: &Reader<'a>) -> Self {
        Self::new(reader.tail().unwrap_or(&[]))
    }

    /// Reads past the end of the segment feed 0xFF, which drives the decoder
    /// into its terminating-marker state: it stops consuming bytes and keeps
    /// yielding the more probable symbol (E.3.4 note on marker codes).
    #[inline(always)]
    fn fetch(&mut self) -> u8 {
        let byte = self.data.get(self.next).copied().unwrap_or(0xFF);
        self.next += 1;
        byte
    }

    /// The BYTEIN procedure (E.3.4).
    ///
    /// "This procedure reads in one byte of data, compensating for any stuff
    /// bits following the 0xFF byte in the process."
    #[inline(always)]
    fn byte_in(&mut self) {
        if self.b0 == 0xFF {
            // "If B1 exceeds 0x8F, then B1 must be one of the marker codes."
            if self.b1 > 0x8F {
                // Marker found: stop consuming input.
                self.ct = 8;
            } else {
                self.b0 = self.b1;
                self.b1 = self.fetch();
                self.c = self
                    .c
                    .wrapping_add(0xFE00)
                    .wrapping_sub((self.b0 as u32) << 9);
                self.ct = 7;
            }
        } else {
            self.b0 = self.b1;
            self.b1 = self.fetch();
            self.c = self
                .c
                .wrapping_add(0xFF00)
                .wrapping_sub((self.b0 as u32) << 8);
            self.ct = 8;
        }
    }

    /// The RENORMD procedure (E.3.3).
    #[inline(always)]
    fn renormalize(&mut self) {
        while self.a & 0x8000_0000 == 0 {
            if self.ct == 0 {
                self.byte_in();
            }
            self.a <<= 1;
            self.c <<= 1;
            self.ct -= 1;
        }
    }

    /// The DECODE procedure (E.3.2): decode one bit against the context
    /// previously selected on `stats` via [`DecoderStats::set_index`].
    pub(crate) fn decode_bit(&mut self, stats: &mut DecoderStats) -> u8 {
        let context = stats.context;
        let entry = stats.table[context];
        let icx = (entry >> 1) as usize & 0x7F;
        let mps = entry & 1;
        let qe = QE_TABLE[icx].qe;

        self.a -= qe;

        let bit;
        if self.c < self.a {
            if self.a & 0x8000_0000 != 0 {
                // The MPS sub-interval still fills the register: no
                // renormalisation, no estimator transition.
                bit = mps;
            } else {
                // "For the MPS path the conditional exchange procedure is
                // shown in Figure E.16." (E.3.2)
                if self.a < qe {
                    bit = 1 - mps;
                    stats.table[context] = if QE_TABLE[icx].switch {
                        (QE_TABLE[icx].nlps << 1) | (1 - mps)
                    } else {
                        (QE_TABLE[icx].nlps << 1) | mps
                    };
                } else {
                    bit = mps;
                    stats.table[context] = (QE_TABLE[icx].nmps << 1) | mps;
                }
                self.renormalize();
            }
        } else {
            self.c -= self.a;

            // "For the LPS path of the decoder the conditional exchange
            // procedure is given in Figure E.17." (E.3.2)
            if self.a < qe {
                bit = mps;
                stats.table[context] = (QE_TABLE[icx].nmps << 1) | mps;
            } else {
                bit = 1 - mps;
                stats.table[context] = if QE_TABLE[icx].switch {
                    (QE_TABLE[icx].nlps << 1) | (1 - mps)
                } else {
                    (QE_TABLE[icx].nlps << 1) | mps
                };
            }
            self.a = qe;
            self.renormalize();
        }

        bit
    }

    /// The IAx integer arithmetic decoding procedure (A.2).
    ///
    /// Returns `Some(value)` on success, or `None` for the out-of-band value:
    ///
    /// "The result of the integer arithmetic decoding procedure is equal to:
    /// - V if S = 0
    /// - -V if S = 1 and V > 0
    /// - OOB if S = 1 and V = 0" (A.2)
    pub(crate) fn decode_int(&mut self, stats: &mut DecoderStats) -> Option<i32> {
        // "1) Set: PREV = 1" (A.2)
        let mut prev: u32 = 1;

        let mut next_bit = || {
            // "Decode each bit with CX equal to 'IAx + PREV' ... the
            // rightmost 9 bits of PREV are used." (A.2)
            stats.set_index((prev & 0x1FF) as usize);
            let bit = self.decode_bit(stats) as u32;

            // "If PREV < 256 set: PREV = (PREV << 1) OR D. Otherwise set:
            // PREV = (((PREV << 1) OR D) AND 511) OR 256" (A.2)
            prev = if prev < 0x100 {
                (prev << 1) | bit
            } else {
                (((prev << 1) | bit) & 0x1FF) | 0x100
            };

            bit
        };

        decode_int_value(&mut next_bit)
    }

    /// The IAID decoding procedure (A.3): read `code_len` bits, tree-coded
    /// through `stats`, and return the symbol ID.
    pub(crate) fn decode_iaid(&mut self, code_len: u32, stats: &mut DecoderStats) -> u32 {
        // "1) Set: PREV = 1" (A.3)
        let mut prev: u32 = 1;

        for _ in 0..code_len {
            stats.set_index(prev as usize);
            let bit = self.decode_bit(stats) as u32;
            prev = (prev << 1) | bit;
        }

        // "3) ... decoded value is PREV - 2^SBSYMCODELEN" (A.3)
        prev - (1 << code_len)
    }
}

/// Decode the prefix/payload shape of Figure A.1 from a bit source.
///
/// The prefix selects the payload length and bias: 0 → 2 bits, 10 → 4 bits
/// biased by 4, 110 → 6 bits biased by 20, 1110 → 8 bits biased by 84,
/// 11110 → 12 bits biased by 340, 11111 → 32 bits biased by 4436.
fn decode_int_value(next_bit: &mut impl FnMut() -> u32) -> Option<i32> {
    let sign = next_bit();

    let value = if next_bit() == 0 {
        read_bits(next_bit, 2)
    } else if next_bit() == 0 {
        read_bits(next_bit, 4) + 4
    } else if next_bit() == 0 {
        read_bits(next_bit, 6) + 20
    } else if next_bit() == 0 {
        read_bits(next_bit, 8) + 84
    } else if next_bit() == 0 {
        read_bits(next_bit, 12) + 340
    } else {
        read_bits(next_bit, 32).wrapping_add(4436)
    };

    if sign == 0 {
        Some(value as i32)
    } else if value > 0 {
        Some((value as i32).wrapping_neg())
    } else {
        // "OOB if S = 1 and V = 0"
        None
    }
}

fn read_bits(next_bit: &mut impl FnMut() -> u32, count: u32) -> u32 {
    let mut value = 0_u32;
    for _ in 0..count {
        value = (value << 1) | next_bit();
    }
    value
}

/// The estimator tables of the arithmetic integer decoding procedures.
///
/// "Each arithmetic integer decoding procedure requires 512 bytes of storage
/// for its context memory." (A.2) The IAID procedure instead requires
/// `2^(SBSYMCODELEN + 1)` entries (A.3).
pub(crate) struct IntStats {
    /// Difference in height between two height classes.
    pub(crate) iadh: DecoderStats,
    /// Difference in width between two symbols in a height class.
    pub(crate) iadw: DecoderStats,
    /// Export run lengths.
    pub(crate) iaex: DecoderStats,
    /// Number of symbol instances in an aggregation.
    pub(crate) iaai: DecoderStats,
    /// Strip delta T.
    pub(crate) iadt: DecoderStats,
    /// Symbol instance T coordinate within a strip.
    pub(crate) iait: DecoderStats,
    /// S coordinate of the first symbol instance in a strip.
    pub(crate) iafs: DecoderStats,
    /// S coordinate deltas of subsequent symbol instances.
    pub(crate) iads: DecoderStats,
    /// Refinement delta X.
    pub(crate) iardx: DecoderStats,
    /// Refinement delta Y.
    pub(crate) iardy: DecoderStats,
    /// Refinement delta width.
    pub(crate) iardw: DecoderStats,
    /// Refinement delta height.
    pub(crate) iardh: DecoderStats,
    /// Refinement indicator bit.
    pub(crate) iari: DecoderStats,
    /// Symbol IDs.
    pub(crate) iaid: DecoderStats,
}

impl IntStats {
    pub(crate) fn new(symbol_code_length: u32) -> Self {
        Self {
            iadh: DecoderStats::new(512),
            iadw: DecoderStats::new(512),
            iaex: DecoderStats::new(512),
            iaai: DecoderStats::new(512),
            iadt: DecoderStats::new(512),
            iait: DecoderStats::new(512),
            iafs: DecoderStats::new(512),
            iads: DecoderStats::new(512),
            iardx: DecoderStats::new(512),
            iardy: DecoderStats::new(512),
            iardw: DecoderStats::new(512),
            iardh: DecoderStats::new(512),
            iari: DecoderStats::new(512),
            iaid: DecoderStats::new(1 << (symbol_code_length + 1)),
        }
    }

    /// Reset all integer stats, reallocating the IAID table when the symbol
    /// code length changed.
    pub(crate) fn reset(&mut self, symbol_code_length: u32) {
        self.iadh.reset();
        self.iadw.reset();
        self.iaex.reset();
        self.iaai.reset();
        self.iadt.reset();
        self.iait.reset();
        self.iafs.reset();
        self.iads.reset();
        self.iardx.reset();
        self.iardy.reset();
        self.iardw.reset();
        self.iardh.reset();
        self.iari.reset();

        let iaid_size = 1_usize << (symbol_code_length + 1);
        if self.iaid.len() == iaid_size {
            self.iaid.reset();
        } else {
            self.iaid = DecoderStats::new(iaid_size);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The software conformance test of Annex H: decoding the encoded test
    /// data of H.2 with a single context must reproduce the 256-bit test
    /// sequence.
    #[test]
    fn annex_h_test_sequence() {
        let encoded = [
            0x84, 0xC7, 0x3B, 0xFC, 0xE1, 0xA1, 0x43, 0x04, 0x02, 0x20, 0x00, 0x00, 0x41, 0x0D,
            0xBB, 0x86, 0xF4, 0x31, 0x7F, 0xFF, 0x88, 0xFF, 0x37, 0x47, 0x1A, 0xDB, 0x6A, 0xDF,
            0xFF, 0xAC,
        ];
        let expected = [
            0x00, 0x02, 0x00, 0x51, 0x00, 0x00, 0x00, 0xC0, 0x03, 0x52, 0x87, 0x2A, 0xAA, 0xAA,
            0xAA, 0xAA, 0x82, 0xC0, 0x20, 0x00, 0xFC, 0xD7, 0x9E, 0xF6, 0xBF, 0x7F, 0xED, 0x90,
            0x4F, 0x46, 0xA3, 0xBF,
        ];

        let mut decoder = ArithmeticDecoder::new(&encoded);
        let mut stats = DecoderStats::new(512);
        stats.set_index(0);

        let mut decoded = [0_u8; 32];
        for i in 0..256 {
            let bit = decoder.decode_bit(&mut stats);
            decoded[i / 8] |= bit << (7 - (i & 7));
        }

        assert_eq!(decoded, expected);
    }

    #[test]
    fn int_value_shapes() {
        let from = |bits: &[u32]| {
            let mut iter = bits.iter().copied();
            decode_int_value(&mut move || iter.next().unwrap())
        };

        // Prefix 0: two payload bits.
        assert_eq!(from(&[0, 0, 1, 0]), Some(2));
        assert_eq!(from(&[1, 0, 1, 1]), Some(-3));

        // Prefix 10: four payload bits biased by 4.
        assert_eq!(from(&[0, 1, 0, 0, 0, 0, 0]), Some(4));
        assert_eq!(from(&[0, 1, 0, 1, 1, 1, 1]), Some(19));

        // Prefix 110: six payload bits biased by 20.
        assert_eq!(from(&[0, 1, 1, 0, 0, 0, 0, 0, 0, 1]), Some(21));

        // Prefix 1110: eight payload bits biased by 84.
        assert_eq!(
            from(&[0, 1, 1, 1, 0, 1, 1, 1, 1, 1, 1, 1, 1]),
            Some(84 + 255)
        );

        // S = 1 with V = 0 is the out-of-band value.
        assert_eq!(from(&[1, 0, 0, 0]), None);
    }

    #[test]
    fn stats_adoption() {
        let mut previous = DecoderStats::new(512);
        previous.table[3] = 0x17;

        let mut stats = DecoderStats::new(512);
        stats.reset_or_adopt(512, Some(&previous));
        assert_eq!(stats.table[3], 0x17);

        // Size mismatch with the previous stats falls back to a zero table.
        let mut stats = DecoderStats::new(512);
        stats.table[1] = 0xFF;
        stats.reset_or_adopt(1024, Some(&previous));
        assert_eq!(stats.len(), 1024);
        assert!(stats.table.iter().all(|&entry| entry == 0));

        // No previous stats resets in place.
        let mut stats = DecoderStats::new(512);
        stats.table[1] = 0xFF;
        stats.reset_or_adopt(512, None);
        assert_eq!(stats.table[1], 0);
    }
}
