/*!
A memory-safe, pure-Rust JBIG2 decoder.

`sumi-jbig2` decodes JBIG2 images as specified in ITU-T T.88 (also known as
ISO/IEC 14492). JBIG2 is a bi-level image compression standard commonly used
in PDF documents for compressing scanned text documents.

The crate exposes the document structure of a JBIG2 stream: a [`Document`]
parses the segment headers up front and composes page bitmaps on demand.
Global segments provided out of band — the `/JBIG2Globals` stream of a PDF
image — are supplied through [`Globals`].

# Example
```rust,no_run
use sumi_jbig2::Document;

let data = std::fs::read("image.jb2").unwrap();
let document = Document::new(&data).unwrap();
let page = document.decode_page(1).unwrap();

println!("{}x{} page", page.bitmap.width(), page.bitmap.height());
```

Decoded bitmaps are byte-packed, one bit per pixel, bit 7 of each byte being
the leftmost pixel and a set bit meaning black.

# Safety
This crate forbids unsafe code via a crate-level attribute.
*/

#![forbid(unsafe_code)]
#![allow(missing_docs)]

mod arithmetic;
mod bitmap;
mod blit;
mod decode;
mod document;
mod error;
mod gray_scale;
mod huffman;
mod mmr;
mod page_info;
mod reader;
mod segment;

pub use bitmap::{Bitmap, CombinationOperator};
pub use document::{DecodedPage, Document, Globals};
pub use error::{
    DecodeError, FormatError, HuffmanError, ParseError, RegionError, Result, SegmentError,
    SymbolError,
};

/// Decode the first page of a JBIG2 stream.
///
/// This is a convenience wrapper for the common single-page case; use
/// [`Document`] to address individual pages or to supply global segments.
pub fn decode(data: &[u8]) -> Result<Bitmap> {
    let document = Document::new(data)?;
    let page_number = document
        .page_numbers()
        .next()
        .ok_or(FormatError::MissingPageInfo)?;

    Ok(document.decode_page(page_number)?.bitmap)
}
