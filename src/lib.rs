#![crate_name = "halfbeak"]
//! Halfbeak is a crate to parse FASTQ out of streams/files without choking
//! on the format's sharp edges, to handle the three ASCII quality
//! encodings, and to parse GTF annotation tables with the same streaming
//! discipline.
//!
//! The FASTQ entry point samples the input and picks between a strict
//! 4-line reader and a length-driven state machine that copes with wrapped
//! records (where `@` and `+` can legally appear inside quality strings):
//!
//! ```
//! use halfbeak::{FastqParser, Encoding};
//!
//! let mut parser = FastqParser::with_defaults();
//! let mut n_bases = 0;
//! for record in parser.parse_str("@r1\nACGT\n+\n!!!!") {
//!     let record = record.expect("invalid record");
//!     n_bases += record.len();
//!     assert_eq!(record.encoding(), Encoding::Phred33);
//! }
//! assert_eq!(n_bases, 4);
//! ```
//!
//! Quality handling lives in [`quality`]: the character/score codec with
//! explicit clamping on conversion, statistical encoding detection,
//! per-read statistics and vendor-style score binning. Paired-end streams
//! are zipped or repaired in [`paired`], and [`gtf`] parses the 9-field
//! annotation format with a lazy query builder on top.

pub mod errors;
pub mod gtf;
pub mod paired;
pub mod parser;
pub mod quality;
pub mod validation;
pub mod writer;

pub use errors::{Error, ErrorAction, ErrorHandler, ErrorKind, Severity, Warning};
pub use paired::{PairRepairer, PairedReader, ReadPair, Repaired};
pub use parser::{
    FastqParser, FastqRecord, FastqSource, Metrics, ParserOptions, ParsingStrategy, Records,
};
pub use quality::Encoding;
pub use validation::{Platform, PlatformInfo, ValidationLevel, ValidationResult};
pub use writer::{FastqWriter, OutputStrategy, WriterOptions};
