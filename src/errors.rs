//! The errors halfbeak can return, plus the non-fatal warning channel.

use std::error::Error as StdError;
use std::fmt;
use std::io;

/// Represents where we were in the input when an error occurred.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorPosition {
    /// Line number where the error occurred (starting with 1, 0 when unknown)
    pub line: u64,
    /// ID of record if available
    pub id: Option<String>,
}

impl ErrorPosition {
    pub fn new(line: u64, id: Option<String>) -> Self {
        Self { line, id }
    }
}

impl fmt::Display for ErrorPosition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(id) = self.id.as_ref() {
            write!(f, "record '{id}' at ")?;
        }
        write!(f, "line {}", self.line)
    }
}

/// The kind of error that occurred, grouped by the subsystem that raises it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// An error happened during file/stream input/output
    Io,
    /// A header line did not start with `@` followed by an ID
    InvalidHeader,
    /// The separator line is not valid (no `+`, or the repeated ID differs)
    InvalidSeparator,
    /// Sequence and quality lengths are not equal
    UnequalLengths,
    /// Truncated record found at the end of the input
    UnexpectedEnd,
    /// A single line exceeded the configured maximum length
    LineTooLong,
    /// The input appears to be empty
    EmptyFile,
    /// A quality character falls outside the encoding's ASCII range
    InvalidCharacter,
    /// A quality score falls outside the encoding's score range
    ScoreOutOfRange,
    /// The quality encoding could not be determined
    UnknownEncoding,
    /// An error probability outside (0, 1] was supplied
    InvalidProbability,
    /// Binning boundaries are empty, unsorted or out of range
    InvalidBoundaries,
    /// The sequence is empty or contains characters it must not
    InvalidSequence,
    /// A rejected option combination was supplied at construction
    InvalidOptions,
    /// A record failed quick or full validation
    ValidationFailed,
    /// Paired streams have unequal lengths or mismatched base IDs
    PairOutOfSync,
    /// A read was left without its mate at end of input
    UnpairedRead,
    /// The pair-repair buffer limit was exceeded
    BufferLimit,
    /// A GTF line could not be parsed
    GtfSyntax,
}

/// The only error type that halfbeak returns.
#[derive(Clone, Debug, PartialEq)]
pub struct Error {
    /// A description of what went wrong
    pub msg: String,
    /// The kind of error that occurred
    pub kind: ErrorKind,
    /// Position within the input
    pub position: ErrorPosition,
    /// A short sample of the offending data, truncated to 50 characters
    pub sample: Option<String>,
}

/// Truncate a data sample for error messages (50 chars plus length marker).
pub(crate) fn truncate_sample(data: &[u8]) -> String {
    let text = String::from_utf8_lossy(data);
    let total = text.chars().count();
    if total <= 50 {
        text.into_owned()
    } else {
        let head: String = text.chars().take(50).collect();
        format!("{head}... ({total} chars)")
    }
}

impl Error {
    pub fn new(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            kind,
            position: ErrorPosition::default(),
            sample: None,
        }
    }

    pub fn at(mut self, position: ErrorPosition) -> Self {
        self.position = position;
        self
    }

    pub fn with_sample(mut self, data: &[u8]) -> Self {
        self.sample = Some(truncate_sample(data));
        self
    }

    pub fn new_io(err: io::Error) -> Self {
        Self::new(ErrorKind::Io, err.to_string())
    }

    pub fn new_invalid_header(line: &[u8], position: ErrorPosition) -> Self {
        Self::new(ErrorKind::InvalidHeader, "expected '@' followed by a record ID")
            .at(position)
            .with_sample(line)
    }

    pub fn new_invalid_separator(line: &[u8], position: ErrorPosition) -> Self {
        Self::new(ErrorKind::InvalidSeparator, "expected '+' separator line")
            .at(position)
            .with_sample(line)
    }

    pub fn new_separator_mismatch(sep_id: &[u8], header_id: &str, position: ErrorPosition) -> Self {
        Self::new(
            ErrorKind::InvalidSeparator,
            format!(
                "separator ID '{}' does not repeat the header ID '{}'",
                String::from_utf8_lossy(sep_id),
                header_id
            ),
        )
        .at(position)
    }

    pub fn new_unequal_lengths(seq_len: usize, qual_len: usize, position: ErrorPosition) -> Self {
        Self::new(
            ErrorKind::UnequalLengths,
            format!("sequence length is {seq_len} but quality length is {qual_len}"),
        )
        .at(position)
    }

    pub fn new_unexpected_end(position: ErrorPosition) -> Self {
        Self::new(ErrorKind::UnexpectedEnd, String::new()).at(position)
    }

    pub fn new_line_too_long(len: usize, max: usize, position: ErrorPosition) -> Self {
        Self::new(
            ErrorKind::LineTooLong,
            format!("line of {len} bytes exceeds the configured maximum of {max}"),
        )
        .at(position)
    }

    pub fn new_empty_file() -> Self {
        Self::new(
            ErrorKind::EmptyFile,
            "failed to read the first bytes, is the file empty?",
        )
    }

    pub fn new_invalid_character(ch: u8, encoding_name: &str, range: (u8, u8)) -> Self {
        Self::new(
            ErrorKind::InvalidCharacter,
            format!(
                "quality character '{}' (ASCII {}) outside the {}-{} range of {}",
                (ch as char).escape_default(),
                ch,
                range.0,
                range.1,
                encoding_name
            ),
        )
    }

    pub fn new_score_out_of_range(score: i8, encoding_name: &str, range: (i8, i8)) -> Self {
        Self::new(
            ErrorKind::ScoreOutOfRange,
            format!(
                "score {score} outside the {}..={} range of {}",
                range.0, range.1, encoding_name
            ),
        )
    }

    pub fn new_unknown_encoding(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownEncoding, msg)
    }

    pub fn new_invalid_probability(p: f64) -> Self {
        Self::new(
            ErrorKind::InvalidProbability,
            format!("error probability {p} must lie in (0, 1]"),
        )
    }

    pub fn new_invalid_boundaries(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidBoundaries, msg)
    }

    pub fn new_invalid_options(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidOptions, msg)
    }

    pub fn new_pair_out_of_sync(msg: impl Into<String>, pair_index: u64) -> Self {
        Self::new(ErrorKind::PairOutOfSync, msg).at(ErrorPosition::new(pair_index, None))
    }

    pub fn new_unpaired(id: &str) -> Self {
        Self::new(
            ErrorKind::UnpairedRead,
            format!("read '{id}' has no mate at end of input"),
        )
        .at(ErrorPosition::new(0, Some(id.to_string())))
    }

    pub fn new_buffer_limit(buffered: usize, max: usize) -> Self {
        Self::new(
            ErrorKind::BufferLimit,
            format!("{buffered} buffered reads exceed the limit of {max}"),
        )
    }

    pub fn new_gtf(msg: impl Into<String>, line: u64) -> Self {
        Self::new(ErrorKind::GtfSyntax, msg).at(ErrorPosition::new(line, None))
    }

    /// An actionable hint keyed off the error kind, shown alongside the message.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self.kind {
            ErrorKind::InvalidCharacter | ErrorKind::UnknownEncoding => Some(
                "the file may use a legacy encoding, try Encoding::Phred64 or Encoding::Solexa",
            ),
            ErrorKind::UnequalLengths => Some(
                "the record may be truncated or use multi-line quality, try ParsingStrategy::StateMachine",
            ),
            ErrorKind::InvalidHeader => {
                Some("check for stray blank lines or a FASTA file passed as FASTQ")
            }
            ErrorKind::LineTooLong => {
                Some("raise ParserOptions::max_line_length for long-read data")
            }
            ErrorKind::BufferLimit => {
                Some("raise RepairOptions::max_buffered or pre-sort the input by read ID")
            }
            ErrorKind::UnexpectedEnd => Some("the input ends mid-record, the file may be truncated"),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            ErrorKind::Io => write!(f, "I/O error: {}", self.msg)?,
            ErrorKind::UnexpectedEnd => write!(f, "unexpected end of input ({})", self.position)?,
            _ if self.position == ErrorPosition::default() => write!(f, "{}", self.msg)?,
            _ => write!(f, "{} ({})", self.msg, self.position)?,
        }
        if let Some(sample) = self.sample.as_ref() {
            write!(f, " near '{sample}'")?;
        }
        if let Some(hint) = self.suggestion() {
            write!(f, "; {hint}")?;
        }
        Ok(())
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::new_io(err)
    }
}

impl StdError for Error {}

/// How serious a non-fatal finding is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        })
    }
}

/// A non-fatal finding surfaced through the warning channel.
#[derive(Clone, Debug, PartialEq)]
pub struct Warning {
    pub msg: String,
    pub severity: Severity,
    /// ID of record if available
    pub id: Option<String>,
    /// Line number if tracked
    pub line: Option<u64>,
}

impl Warning {
    pub fn new(severity: Severity, msg: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            severity,
            id: None,
            line: None,
        }
    }

    pub fn for_record(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn at_line(mut self, line: u64) -> Self {
        self.line = Some(line);
        self
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.msg)?;
        if let Some(id) = self.id.as_ref() {
            write!(f, " (record '{id}')")?;
        }
        Ok(())
    }
}

/// What the consumer wants done after a recoverable error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorAction {
    /// Terminate the producer, surfacing the error
    Abort,
    /// Drop the offending record and keep streaming
    Skip,
    /// Accept the record despite the finding
    Keep,
}

/// Injected handler for the error and warning channels.
///
/// Parsers consult `on_error` only for per-record failures when
/// `skip_validation` is set; structural failures without that escape hatch
/// terminate the producer directly.
pub trait ErrorHandler {
    fn on_error(&mut self, error: &Error) -> ErrorAction {
        log::warn!("skipping record: {error}");
        ErrorAction::Skip
    }

    fn on_warning(&mut self, warning: &Warning) {
        log::warn!("{warning}");
    }
}

/// Default handler: skips bad records, logs everything through `log`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHandler;

impl ErrorHandler for LogHandler {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn position_display() {
        let pos = ErrorPosition::new(12, Some("read7".to_string()));
        assert_eq!(pos.to_string(), "record 'read7' at line 12");
        assert_eq!(ErrorPosition::new(3, None).to_string(), "line 3");
    }

    #[test]
    fn sample_is_truncated() {
        let long = vec![b'A'; 80];
        let sample = truncate_sample(&long);
        assert!(sample.starts_with(&"A".repeat(50)));
        assert!(sample.ends_with("(80 chars)"));
        assert_eq!(truncate_sample(b"short"), "short");
    }

    #[test]
    fn unequal_lengths_message() {
        let err = Error::new_unequal_lengths(8, 4, ErrorPosition::new(4, Some("r1".into())));
        assert_eq!(err.kind, ErrorKind::UnequalLengths);
        let text = err.to_string();
        assert!(text.contains("sequence length is 8"));
        assert!(text.contains("record 'r1' at line 4"));
        assert!(text.contains("StateMachine"));
    }

    #[test]
    fn suggestion_mentions_legacy_encoding() {
        let err = Error::new_invalid_character(31, "Phred+33", (33, 126));
        assert!(err.suggestion().unwrap().contains("Phred64"));
    }
}
