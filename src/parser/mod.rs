//! Handles all the FASTQ parsing: strategy selection, option validation and
//! the record iterator the rest of the crate consumes.
//!
//! Two concrete readers implement [`FastqSource`]: the strict 4-line
//! [`FourLineReader`] and the length-driven [`MultiLineReader`]. On
//! [`ParsingStrategy::Auto`] a small prefix of the input is sampled and the
//! complexity detector picks between them; the sampled bytes are replayed in
//! front of the remaining stream so nothing is lost.

use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::Path;

#[cfg(feature = "compression")]
use std::io::{Seek, SeekFrom};

#[cfg(feature = "compression")]
use bzip2::read::BzDecoder;
#[cfg(feature = "compression")]
use flate2::read::MultiGzDecoder;
#[cfg(feature = "compression")]
use xz2::read::XzDecoder;

use crate::errors::{Error, ErrorAction, ErrorHandler, ErrorKind, LogHandler, Warning};
use crate::quality::stats::QualityStats;
use crate::quality::{decode_scores, Encoding};
use crate::validation::{self, ValidationLevel};

pub mod complexity;
pub mod fourline;
pub(crate) mod lines;
pub mod multiline;
mod record;

pub use complexity::{assess, Complexity, ComplexityReport};
pub use fourline::FourLineReader;
pub use lines::{LineEnding, LineReader, Position};
pub use multiline::MultiLineReader;
pub use record::{
    extract_description, extract_id, is_valid_header, is_valid_separator, lengths_match,
    FastqRecord,
};

/// How many bytes the auto-strategy sampler reads before parsing starts.
const SAMPLE_BYTES: usize = 10 * 1024;

/// The main trait, iterator-like, that both parsing strategies implement.
pub trait FastqSource {
    /// Gets the next record in the stream, `None` once EOF is reached.
    fn next_record(&mut self) -> Option<Result<FastqRecord, Error>>;
    /// Number of the line most recently consumed from the input
    fn line_number(&self) -> u64;
    /// `None` until the first terminated line has been read
    fn line_ending(&self) -> Option<LineEnding>;
    /// Non-fatal findings collected since the last call
    fn drain_warnings(&mut self) -> Vec<Warning> {
        Vec::new()
    }
}

/// Which reader implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParsingStrategy {
    /// Sample the input and decide
    #[default]
    Auto,
    /// Strict 4-line reader, no sampling
    Fast,
    /// Multi-line state machine, no sampling
    StateMachine,
}

/// Every recognized parser option, validated at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ParserOptions {
    /// Route per-record failures to the error handler instead of
    /// terminating the iterator
    pub skip_validation: bool,
    /// Hard cap on a single line's length
    pub max_line_length: usize,
    /// Attach the header's line number to each record
    pub track_line_numbers: bool,
    /// `None` detects the encoding per record
    pub encoding: Option<Encoding>,
    /// Decode scores and precompute statistics on each record
    pub parse_quality_scores: bool,
    pub validation_level: ValidationLevel,
    pub strategy: ParsingStrategy,
    /// Below this sampling confidence, fall back to the state machine
    pub confidence_threshold: f64,
    /// Log strategy decisions at debug level
    pub debug_strategy: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            skip_validation: false,
            max_line_length: 1_000_000,
            track_line_numbers: false,
            encoding: None,
            parse_quality_scores: false,
            validation_level: ValidationLevel::Quick,
            strategy: ParsingStrategy::Auto,
            confidence_threshold: 0.8,
            debug_strategy: false,
        }
    }
}

impl ParserOptions {
    /// Rejects pathological combinations; returns the non-fatal findings.
    pub fn validate(&self) -> Result<Vec<Warning>, Error> {
        if self.max_line_length < 1000 {
            return Err(Error::new_invalid_options(format!(
                "max_line_length of {} is below the minimum of 1000",
                self.max_line_length
            )));
        }
        if self.parse_quality_scores && self.max_line_length > 50_000_000 {
            return Err(Error::new_invalid_options(
                "parse_quality_scores with max_line_length above 50000000 would buffer \
                 score vectors of the same size",
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(Error::new_invalid_options(format!(
                "confidence_threshold {} is outside [0, 1]",
                self.confidence_threshold
            )));
        }
        let mut warnings = Vec::new();
        if !self.skip_validation && self.max_line_length > 10_000_000 {
            warnings.push(Warning::new(
                crate::errors::Severity::Medium,
                "max_line_length above 10000000 with validation enabled may be slow",
            ));
        }
        Ok(warnings)
    }
}

/// Read-only counters snapshot, per parser instance.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Metrics {
    pub fast_path_uses: u64,
    pub state_machine_uses: u64,
    pub auto_detections: u64,
    pub total_records: u64,
    pub last_strategy: Option<ParsingStrategy>,
    pub last_format: Option<Complexity>,
    pub last_confidence: Option<f64>,
}

/// The parsing entry point: owns the options, metrics and error handler.
///
/// One instance serves one consumer at a time; each `parse_*` call borrows
/// the parser for the lifetime of the returned iterator.
pub struct FastqParser {
    options: ParserOptions,
    metrics: Metrics,
    handler: Box<dyn ErrorHandler>,
}

impl FastqParser {
    pub fn new(options: ParserOptions) -> Result<Self, Error> {
        let warnings = options.validate()?;
        for w in &warnings {
            log::warn!("{w}");
        }
        Ok(Self {
            options,
            metrics: Metrics::default(),
            handler: Box::new(LogHandler),
        })
    }

    pub fn with_defaults() -> Self {
        Self {
            options: ParserOptions::default(),
            metrics: Metrics::default(),
            handler: Box::new(LogHandler),
        }
    }

    /// Replace the default logging handler.
    pub fn set_handler(&mut self, handler: Box<dyn ErrorHandler>) {
        self.handler = handler;
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    pub fn metrics(&self) -> Metrics {
        self.metrics.clone()
    }

    pub fn reset_metrics(&mut self) {
        self.metrics = Metrics::default();
    }

    /// Parses an in-memory string. The whole input is available, so auto
    /// strategy selection samples it directly.
    pub fn parse_str<'p>(&'p mut self, data: &str) -> Records<'p> {
        self.records_from(io::empty(), data.as_bytes().to_vec(), true)
    }

    /// Parses any byte stream. Auto strategy selection reads a ~10 KiB
    /// prefix and replays it in front of the stream.
    pub fn parse_reader<'p, R: Read + 'p>(&'p mut self, mut reader: R) -> Result<Records<'p>, Error> {
        let (prefix, at_eof) = if self.options.strategy == ParsingStrategy::Auto {
            read_prefix(&mut reader, SAMPLE_BYTES)?
        } else {
            (Vec::new(), false)
        };
        Ok(self.records_from(reader, prefix, at_eof))
    }

    /// Parses a file, transparently decompressing gzip, bzip2 and xz input
    /// when the `compression` feature is enabled.
    pub fn parse_file<'p, P: AsRef<Path>>(&'p mut self, path: P) -> Result<Records<'p>, Error> {
        let reader = open_path(path.as_ref())?;
        self.parse_reader(reader)
    }

    fn resolve_strategy(&mut self, prefix: &[u8], prefix_is_whole_input: bool) -> ParsingStrategy {
        match self.options.strategy {
            ParsingStrategy::Fast => ParsingStrategy::Fast,
            ParsingStrategy::StateMachine => ParsingStrategy::StateMachine,
            ParsingStrategy::Auto => {
                // the detector looks at 100 non-empty lines at most; no
                // point collecting more than a blank-heavy multiple of that
                let limit = 4 * complexity::DEFAULT_SAMPLE_LINES + 1;
                let mut sampled: Vec<&[u8]> = prefix
                    .split(|&b| b == b'\n')
                    .map(lines::trim_cr)
                    .take(limit)
                    .collect();
                if !prefix_is_whole_input && sampled.len() < limit {
                    // the last element is an incomplete line fragment
                    sampled.pop();
                }
                let report = complexity::assess(sampled);
                self.metrics.auto_detections += 1;
                self.metrics.last_format = Some(report.format);
                self.metrics.last_confidence = Some(report.confidence);
                let chosen = if report.format == Complexity::Complex
                    || report.confidence < self.options.confidence_threshold
                {
                    ParsingStrategy::StateMachine
                } else {
                    ParsingStrategy::Fast
                };
                if self.options.debug_strategy {
                    log::debug!(
                        "sampled {} lines: {:?} with confidence {:.2}, choosing {:?}",
                        report.lines_sampled,
                        report.format,
                        report.confidence,
                        chosen
                    );
                }
                chosen
            }
        }
    }

    fn records_from<'p, R: Read + 'p>(
        &'p mut self,
        reader: R,
        prefix: Vec<u8>,
        prefix_is_whole_input: bool,
    ) -> Records<'p> {
        let strategy = self.resolve_strategy(&prefix, prefix_is_whole_input);
        let chained = Cursor::new(prefix).chain(reader);
        let source: Box<dyn FastqSource + 'p> = match strategy {
            ParsingStrategy::StateMachine => {
                self.metrics.state_machine_uses += 1;
                self.metrics.last_strategy = Some(ParsingStrategy::StateMachine);
                Box::new(MultiLineReader::new(
                    chained,
                    self.options.encoding,
                    self.options.max_line_length,
                ))
            }
            _ => {
                self.metrics.fast_path_uses += 1;
                self.metrics.last_strategy = Some(ParsingStrategy::Fast);
                Box::new(FourLineReader::new(
                    chained,
                    self.options.encoding,
                    self.options.max_line_length,
                ))
            }
        };
        let Self {
            metrics,
            handler,
            options,
        } = self;
        Records {
            source,
            metrics,
            handler: handler.as_mut(),
            options: options.clone(),
            finished: false,
        }
    }
}

enum Disposition {
    Yield(Error),
    Drop,
    KeepRecord,
}

/// Lazy, single-pass record iterator. Dropping it mid-stream releases the
/// byte source; partial output up to that point is valid.
pub struct Records<'p> {
    source: Box<dyn FastqSource + 'p>,
    metrics: &'p mut Metrics,
    handler: &'p mut dyn ErrorHandler,
    options: ParserOptions,
    finished: bool,
}

impl Records<'_> {
    pub fn line_ending(&self) -> Option<LineEnding> {
        self.source.line_ending()
    }

    pub fn line_number(&self) -> u64 {
        self.source.line_number()
    }

    fn bad_record(&mut self, err: Error) -> Disposition {
        if self.options.skip_validation {
            match self.handler.on_error(&err) {
                ErrorAction::Abort => {
                    self.finished = true;
                    Disposition::Yield(err)
                }
                ErrorAction::Skip => Disposition::Drop,
                ErrorAction::Keep => Disposition::KeepRecord,
            }
        } else {
            self.finished = true;
            Disposition::Yield(err)
        }
    }
}

impl Iterator for Records<'_> {
    type Item = Result<FastqRecord, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            let fetched = self.source.next_record();
            for w in self.source.drain_warnings() {
                self.handler.on_warning(&w);
            }
            let mut rec = match fetched {
                None => {
                    self.finished = true;
                    return None;
                }
                Some(Err(e)) => match self.bad_record(e) {
                    Disposition::Yield(e) => return Some(Err(e)),
                    _ => continue,
                },
                Some(Ok(rec)) => rec,
            };

            self.metrics.total_records += 1;
            if !self.options.track_line_numbers {
                rec.set_line_number(None);
            }

            if self.options.parse_quality_scores {
                match decode_scores(rec.qual(), rec.encoding()) {
                    Ok(scores) => {
                        let stats = QualityStats::from_scores(&scores);
                        rec.set_scores(scores, stats);
                    }
                    Err(e) => match self.bad_record(e) {
                        Disposition::Yield(e) => return Some(Err(e)),
                        Disposition::Drop => continue,
                        Disposition::KeepRecord => {}
                    },
                }
            }

            if self.options.validation_level != ValidationLevel::None {
                let result = validation::validate(&rec, self.options.validation_level);
                for w in &result.warnings {
                    self.handler.on_warning(w);
                }
                if !result.valid {
                    let err = result.errors.into_iter().next().unwrap_or_else(|| {
                        Error::new(ErrorKind::ValidationFailed, "record failed validation")
                    });
                    match self.bad_record(err) {
                        Disposition::Yield(e) => return Some(Err(e)),
                        Disposition::Drop => continue,
                        Disposition::KeepRecord => {}
                    }
                }
            }

            return Some(Ok(rec));
        }
    }
}

/// Reads up to `limit` bytes; the bool reports whether EOF was reached.
fn read_prefix<R: Read>(reader: &mut R, limit: usize) -> Result<(Vec<u8>, bool), Error> {
    let mut buf = vec![0u8; limit];
    let mut filled = 0;
    let mut at_eof = false;
    while filled < limit {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                at_eof = true;
                break;
            }
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::new_io(e)),
        }
    }
    buf.truncate(filled);
    Ok((buf, at_eof))
}

// Magic bytes for each compression format
#[cfg(feature = "compression")]
const GZ_MAGIC: [u8; 2] = [0x1F, 0x8B];
#[cfg(feature = "compression")]
const BZ_MAGIC: [u8; 2] = [0x42, 0x5A];
#[cfg(feature = "compression")]
const XZ_MAGIC: [u8; 2] = [0xFD, 0x37];

/// Opens a file for reading, sniffing compression magic bytes when the
/// `compression` feature is enabled.
#[cfg(feature = "compression")]
pub(crate) fn open_path(path: &Path) -> Result<Box<dyn Read + Send>, Error> {
    let mut f = File::open(path)?;
    let mut first = [0u8; 2];
    f.read_exact(&mut first)
        .map_err(|_| Error::new_empty_file())?;
    f.seek(SeekFrom::Start(0))?;
    Ok(match first {
        GZ_MAGIC => Box::new(MultiGzDecoder::new(f)),
        BZ_MAGIC => Box::new(BzDecoder::new(f)),
        XZ_MAGIC => Box::new(XzDecoder::new(f)),
        _ => Box::new(f),
    })
}

/// Opens a file for reading.
#[cfg(not(feature = "compression"))]
pub(crate) fn open_path(path: &Path) -> Result<Box<dyn Read + Send>, Error> {
    let mut f = File::open(path)?;
    let mut first = [0u8; 1];
    use std::io::Seek;
    f.read_exact(&mut first)
        .map_err(|_| Error::new_empty_file())?;
    f.seek(std::io::SeekFrom::Start(0))?;
    Ok(Box::new(f))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::errors::Severity;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn strict_four_line_string() {
        let mut parser = FastqParser::with_defaults();
        let records: Vec<_> = parser.parse_str("@r1\nACGT\n+\n!!!!").collect();
        assert_eq!(records.len(), 1);
        let rec = records[0].as_ref().unwrap();
        assert_eq!(rec.id(), "r1");
        assert_eq!(rec.seq(), b"ACGT");
        assert_eq!(rec.qual(), b"!!!!");
        assert_eq!(rec.encoding(), Encoding::Phred33);
        assert_eq!(rec.len(), 4);

        let metrics = parser.metrics();
        assert_eq!(metrics.fast_path_uses, 1);
        assert_eq!(metrics.state_machine_uses, 0);
        assert_eq!(metrics.auto_detections, 1);
        assert_eq!(metrics.total_records, 1);
        assert_eq!(metrics.last_strategy, Some(ParsingStrategy::Fast));
        assert_eq!(metrics.last_format, Some(Complexity::Simple));
    }

    #[test]
    fn quality_contaminated_input_needs_state_machine() {
        let data = "@r1\nACGTACGT\n+\n@!@!\n+!+!\n";
        let mut parser = FastqParser::new(ParserOptions {
            strategy: ParsingStrategy::StateMachine,
            ..ParserOptions::default()
        })
        .unwrap();
        let records: Vec<_> = parser.parse_str(data).collect();
        assert_eq!(records.len(), 1);
        let rec = records[0].as_ref().unwrap();
        assert_eq!(rec.id(), "r1");
        assert_eq!(rec.seq(), b"ACGTACGT");
        assert_eq!(rec.qual(), b"@!@!+!+!");
        assert_eq!(parser.metrics().state_machine_uses, 1);
    }

    #[test]
    fn auto_falls_back_on_wrapped_input() {
        let data = "@r1\nACGT\nACGT\n+\nIIIIIIII\n";
        let mut parser = FastqParser::with_defaults();
        let records: Vec<_> = parser.parse_str(data).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].as_ref().unwrap().seq(), b"ACGTACGT");
        assert_eq!(parser.metrics().last_strategy, Some(ParsingStrategy::StateMachine));
        assert_eq!(parser.metrics().last_format, Some(Complexity::Complex));
    }

    #[test]
    fn option_combinations_rejected() {
        assert!(FastqParser::new(ParserOptions {
            max_line_length: 500,
            ..ParserOptions::default()
        })
        .is_err());
        assert!(FastqParser::new(ParserOptions {
            parse_quality_scores: true,
            max_line_length: 60_000_000,
            ..ParserOptions::default()
        })
        .is_err());
        assert!(FastqParser::new(ParserOptions {
            confidence_threshold: 1.5,
            ..ParserOptions::default()
        })
        .is_err());
        let warnings = ParserOptions {
            max_line_length: 20_000_000,
            ..ParserOptions::default()
        }
        .validate()
        .unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].severity, Severity::Medium);
    }

    #[test]
    fn tracked_line_numbers() {
        let mut parser = FastqParser::new(ParserOptions {
            track_line_numbers: true,
            ..ParserOptions::default()
        })
        .unwrap();
        let records: Vec<_> = parser
            .parse_str("@a\nAC\n+\nII\n@b\nGG\n+\nJJ\n")
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(records[0].line_number(), Some(1));
        assert_eq!(records[1].line_number(), Some(5));

        let mut parser = FastqParser::with_defaults();
        let records: Vec<_> = parser
            .parse_str("@a\nAC\n+\nII\n")
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(records[0].line_number(), None);
    }

    #[test]
    fn scores_and_stats_attached() {
        let mut parser = FastqParser::new(ParserOptions {
            parse_quality_scores: true,
            ..ParserOptions::default()
        })
        .unwrap();
        let records: Vec<_> = parser
            .parse_str("@a\nACGT\n+\n!#%'\n")
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(records[0].scores(), Some(&[0i8, 2, 4, 6][..]));
        let stats = records[0].stats().unwrap();
        assert_eq!(stats.mean, 3.0);
        assert_eq!(stats.min, 0);
        assert_eq!(stats.max, 6);
    }

    #[test]
    fn error_terminates_without_skip_validation() {
        let mut parser = FastqParser::new(ParserOptions {
            strategy: ParsingStrategy::Fast,
            ..ParserOptions::default()
        })
        .unwrap();
        let results: Vec<_> = parser.parse_str("@a\nACGT\n+\nII\n@b\nAC\n+\nII\n").collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap_err().kind, ErrorKind::UnequalLengths);
    }

    struct Collecting {
        errors: Rc<RefCell<Vec<Error>>>,
        warnings: Rc<RefCell<Vec<Warning>>>,
    }

    impl ErrorHandler for Collecting {
        fn on_error(&mut self, error: &Error) -> ErrorAction {
            self.errors.borrow_mut().push(error.clone());
            ErrorAction::Skip
        }

        fn on_warning(&mut self, warning: &Warning) {
            self.warnings.borrow_mut().push(warning.clone());
        }
    }

    #[test]
    fn skip_validation_routes_errors_and_continues() {
        let errors = Rc::new(RefCell::new(Vec::new()));
        let warnings = Rc::new(RefCell::new(Vec::new()));
        let mut parser = FastqParser::new(ParserOptions {
            skip_validation: true,
            strategy: ParsingStrategy::StateMachine,
            ..ParserOptions::default()
        })
        .unwrap();
        parser.set_handler(Box::new(Collecting {
            errors: errors.clone(),
            warnings: warnings.clone(),
        }));
        // middle record has a garbage line before it; reader resyncs
        let data = "@a\nAC\n+\nII\ngarbage\n@b\nGG\n+\nJJ\n";
        let records: Vec<_> = parser.parse_str(data).collect::<Result<_, _>>().unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(errors.borrow().len(), 1);
        assert_eq!(errors.borrow()[0].kind, ErrorKind::InvalidHeader);
    }

    #[test]
    fn reset_metrics_clears_counters() {
        let mut parser = FastqParser::with_defaults();
        let _ = parser.parse_str("@a\nAC\n+\nII\n").count();
        assert_ne!(parser.metrics(), Metrics::default());
        parser.reset_metrics();
        assert_eq!(parser.metrics(), Metrics::default());
    }

    #[test]
    fn parse_reader_replays_sampled_prefix() {
        // more than SAMPLE_BYTES of strict records; every record must come through
        let mut data = String::new();
        for i in 0..600 {
            data.push_str(&format!("@r{i}\nACGTACGTACGTACGT\n+\nIIIIIIIIIIIIIIII\n"));
        }
        assert!(data.len() > SAMPLE_BYTES);
        let mut parser = FastqParser::with_defaults();
        let records: Vec<_> = parser
            .parse_reader(io::Cursor::new(data.into_bytes()))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(records.len(), 600);
        assert_eq!(parser.metrics().total_records, 600);
        assert_eq!(parser.metrics().last_strategy, Some(ParsingStrategy::Fast));
    }

    #[test]
    fn empty_string_yields_nothing() {
        let mut parser = FastqParser::with_defaults();
        assert_eq!(parser.parse_str("").count(), 0);
    }
}
