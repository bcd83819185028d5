//! The multi-line FASTQ reader: a length-driven state machine for
//! Sanger-style wrapped records.
//!
//! Since quality strings can legally contain `@` and `+`, record boundaries
//! are found by matching the accumulated quality length against the sequence
//! length, never by looking for marker characters. A quality line that
//! overshoots the sequence length is truncated to exactly fit; whatever its
//! surplus was is discarded.

use std::io;
use std::mem;

use crate::errors::{Error, ErrorKind, ErrorPosition, Severity, Warning};
use crate::parser::lines::{is_blank, trim_ws, LineEnding, LineReader};
use crate::parser::record::{
    extract_description, extract_id, is_valid_header, is_valid_separator, FastqRecord,
};
use crate::parser::FastqSource;
use crate::quality::{detect, Encoding};

/// IDs longer than this draw a warning.
const LONG_ID: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    WaitingHeader,
    ReadingSequence,
    ReadingQuality,
}

/// Accumulation state of the record under construction; owned by one parse
/// and reset between records.
#[derive(Debug, Default)]
struct RecordContext {
    header: Vec<u8>,
    start_line: u64,
    seq: Vec<u8>,
    qual: Vec<u8>,
    seq_len: usize,
}

impl RecordContext {
    fn id(&self) -> Option<String> {
        extract_id(&self.header).map(|id| String::from_utf8_lossy(id).into_owned())
    }
}

/// State-machine reader for multi-line records.
pub struct MultiLineReader<R: io::Read> {
    lines: LineReader<R>,
    encoding: Option<Encoding>,
    state: State,
    ctx: RecordContext,
    warnings: Vec<Warning>,
    finished: bool,
}

impl<R: io::Read> MultiLineReader<R> {
    /// `encoding: None` detects the encoding per record from the quality
    /// string.
    pub fn new(reader: R, encoding: Option<Encoding>, max_line_length: usize) -> Self {
        Self {
            lines: LineReader::new(reader, max_line_length),
            encoding,
            state: State::WaitingHeader,
            ctx: RecordContext::default(),
            warnings: Vec::new(),
            finished: false,
        }
    }

    /// Abandon the current record so iteration can resume at the next
    /// header if the consumer keeps pulling.
    fn reset(&mut self) {
        self.ctx = RecordContext::default();
        self.state = State::WaitingHeader;
    }

    fn error(&mut self, err: Error) -> Option<Result<FastqRecord, Error>> {
        self.reset();
        Some(Err(err))
    }

    fn emit(&mut self) -> Option<Result<FastqRecord, Error>> {
        let ctx = mem::take(&mut self.ctx);
        self.state = State::WaitingHeader;

        let start_line = ctx.start_line;
        let id = match extract_id(&ctx.header) {
            Some(id) => String::from_utf8_lossy(id).into_owned(),
            None => {
                return Some(Err(Error::new_invalid_header(
                    &ctx.header,
                    ErrorPosition::new(start_line, None),
                )))
            }
        };
        let desc = extract_description(&ctx.header).map(|d| String::from_utf8_lossy(d).into_owned());

        if id.len() > LONG_ID {
            self.warnings.push(
                Warning::new(
                    Severity::Low,
                    format!("record ID is {} characters long", id.len()),
                )
                .for_record(&id)
                .at_line(start_line),
            );
        }

        let mut qual = ctx.qual;
        qual.truncate(ctx.seq_len);

        let encoding = match self.encoding {
            Some(enc) => enc,
            None => match detect::detect(&qual) {
                Ok(enc) => enc,
                Err(e) => {
                    return Some(Err(e.at(ErrorPosition::new(start_line, Some(id)))));
                }
            },
        };

        match FastqRecord::new(id, desc, ctx.seq, qual, encoding) {
            Ok(mut rec) => {
                rec.set_line_number(Some(start_line));
                Some(Ok(rec))
            }
            Err(e) => Some(Err(e)),
        }
    }

    /// EOF handling: a record under construction must never be dropped
    /// silently.
    fn finish(&mut self) -> Option<Result<FastqRecord, Error>> {
        self.finished = true;
        match self.state {
            State::WaitingHeader => None,
            State::ReadingSequence => {
                let pos = ErrorPosition::new(self.ctx.start_line, self.ctx.id());
                self.reset();
                Some(Err(Error::new_unexpected_end(pos)))
            }
            State::ReadingQuality => {
                let err = Error::new_unequal_lengths(
                    self.ctx.seq_len,
                    self.ctx.qual.len(),
                    ErrorPosition::new(self.lines.line_number(), self.ctx.id()),
                );
                self.reset();
                Some(Err(err))
            }
        }
    }
}

impl<R: io::Read> FastqSource for MultiLineReader<R> {
    fn next_record(&mut self) -> Option<Result<FastqRecord, Error>> {
        if self.finished {
            return None;
        }
        loop {
            let line = match self.lines.next_line() {
                None => return self.finish(),
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e));
                }
                Some(Ok(line)) => line,
            };

            match self.state {
                State::WaitingHeader => {
                    if is_blank(&line) {
                        continue;
                    }
                    if !is_valid_header(&line) {
                        let err = Error::new_invalid_header(
                            &line,
                            ErrorPosition::new(self.lines.line_number(), None),
                        );
                        return self.error(err);
                    }
                    self.ctx.header = line;
                    self.ctx.start_line = self.lines.line_number();
                    self.state = State::ReadingSequence;
                }
                State::ReadingSequence => {
                    if line.first() == Some(&b'+') {
                        if self.ctx.seq.is_empty() {
                            let err = Error::new(
                                ErrorKind::InvalidSequence,
                                "sequence is empty",
                            )
                            .at(ErrorPosition::new(self.ctx.start_line, self.ctx.id()));
                            return self.error(err);
                        }
                        let header_id = extract_id(&self.ctx.header).map(|id| id.to_vec());
                        if !is_valid_separator(&line, header_id.as_deref()) {
                            let id = self.ctx.id().unwrap_or_default();
                            let err = Error::new_separator_mismatch(
                                &line[1..],
                                &id,
                                ErrorPosition::new(self.lines.line_number(), self.ctx.id()),
                            );
                            return self.error(err);
                        }
                        self.ctx.seq_len = self.ctx.seq.len();
                        self.state = State::ReadingQuality;
                    } else {
                        self.ctx.seq.extend_from_slice(trim_ws(&line));
                    }
                }
                State::ReadingQuality => {
                    self.ctx.qual.extend_from_slice(trim_ws(&line));
                    if self.ctx.qual.len() >= self.ctx.seq_len {
                        return self.emit();
                    }
                }
            }
        }
    }

    fn line_number(&self) -> u64 {
        self.lines.line_number()
    }

    fn line_ending(&self) -> Option<LineEnding> {
        self.lines.line_ending()
    }

    fn drain_warnings(&mut self) -> Vec<Warning> {
        mem::take(&mut self.warnings)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    fn reader(data: &str) -> MultiLineReader<Cursor<Vec<u8>>> {
        MultiLineReader::new(Cursor::new(data.as_bytes().to_vec()), None, 1_000_000)
    }

    #[test]
    fn single_line_record() {
        let mut r = reader("@r1\nACGT\n+\n!!!!\n");
        let rec = r.next_record().unwrap().unwrap();
        assert_eq!(rec.id(), "r1");
        assert_eq!(rec.seq(), b"ACGT");
        assert_eq!(rec.qual(), b"!!!!");
        assert!(r.next_record().is_none());
    }

    #[test]
    fn wrapped_sequence_and_quality() {
        let mut r = reader("@id\nSEQU\nENCE\n+\nII\n@EI\nIII\n");
        let rec = r.next_record().unwrap().unwrap();
        assert_eq!(rec.seq(), b"SEQUENCE");
        assert_eq!(rec.qual(), b"II@EIIII");
        assert!(r.next_record().is_none());
    }

    #[test]
    fn markers_inside_quality_do_not_split_records() {
        let mut r = reader("@r1\nACGTACGT\n+\n@!@!\n+!+!\n");
        let rec = r.next_record().unwrap().unwrap();
        assert_eq!(rec.id(), "r1");
        assert_eq!(rec.seq(), b"ACGTACGT");
        assert_eq!(rec.qual(), b"@!@!+!+!");
        assert!(r.next_record().is_none());
    }

    #[test]
    fn surplus_quality_is_truncated() {
        // final quality line overshoots by two characters
        let mut r = reader("@r1\nACGT\n+\nIII\nJJJ\n@r2\nAC\n+\nII\n");
        let rec = r.next_record().unwrap().unwrap();
        assert_eq!(rec.qual(), b"IIIJ");
        let rec2 = r.next_record().unwrap().unwrap();
        assert_eq!(rec2.id(), "r2");
    }

    #[test]
    fn eof_during_sequence_is_an_error() {
        let mut r = reader("@r1\nACGT\n");
        let err = r.next_record().unwrap().unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnexpectedEnd);
        assert_eq!(err.position.line, 1);
        assert_eq!(err.position.id.as_deref(), Some("r1"));
        assert!(r.next_record().is_none());
    }

    #[test]
    fn eof_with_short_quality_is_an_error() {
        let mut r = reader("@r1\nACGTACGT\n+\nIII\n");
        let err = r.next_record().unwrap().unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnequalLengths);
        assert_eq!(err.position.id.as_deref(), Some("r1"));
    }

    #[test]
    fn blank_lines_between_records() {
        let mut r = reader("\n@a\nAC\n+\nII\n\n\n@b\nGG\n+\nJJ\n");
        assert_eq!(r.next_record().unwrap().unwrap().id(), "a");
        assert_eq!(r.next_record().unwrap().unwrap().id(), "b");
        assert!(r.next_record().is_none());
    }

    #[test]
    fn empty_sequence_rejected() {
        let mut r = reader("@r1\n+\nII\n");
        let err = r.next_record().unwrap().unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidSequence);
    }

    #[test]
    fn long_id_draws_a_warning() {
        let id = "x".repeat(60);
        let data = format!("@{id}\nAC\n+\nII\n");
        let mut r = reader(&data);
        let rec = r.next_record().unwrap().unwrap();
        assert_eq!(rec.id().len(), 60);
        let warnings = r.drain_warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].severity, Severity::Low);
        assert!(r.drain_warnings().is_empty());
    }

    #[test]
    fn resyncs_after_error() {
        let mut r = reader("garbage\n@r1\nAC\n+\nII\n");
        assert!(r.next_record().unwrap().is_err());
        let rec = r.next_record().unwrap().unwrap();
        assert_eq!(rec.id(), "r1");
    }

    #[test]
    fn separator_with_matching_id() {
        let mut r = reader("@r1\nAC\n+r1\nII\n");
        assert!(r.next_record().unwrap().is_ok());
        let mut r = reader("@r1\nAC\n+other\nII\n");
        let err = r.next_record().unwrap().unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidSeparator);
    }
}
