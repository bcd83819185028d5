//! The strict 4-line FASTQ reader: one header, one sequence line, one
//! separator, one quality line. This is the fast path chosen when sampling
//! shows the input keeps to that shape.

use std::io;

use crate::errors::{Error, ErrorPosition};
use crate::parser::lines::{is_blank, trim_ws, LineEnding, LineReader};
use crate::parser::record::{
    extract_description, extract_id, is_valid_header, is_valid_separator, FastqRecord,
};
use crate::parser::FastqSource;
use crate::quality::{detect, Encoding};

/// Reads strict 4-line records in a single pass. Any deviation from the
/// 4-line shape fails fast; an incomplete trailing record is an error, not
/// a silent drop.
pub struct FourLineReader<R: io::Read> {
    lines: LineReader<R>,
    encoding: Option<Encoding>,
    finished: bool,
}

impl<R: io::Read> FourLineReader<R> {
    /// `encoding: None` detects the encoding per record from the quality
    /// string.
    pub fn new(reader: R, encoding: Option<Encoding>, max_line_length: usize) -> Self {
        Self {
            lines: LineReader::new(reader, max_line_length),
            encoding,
            finished: false,
        }
    }

    fn fail(&mut self, err: Error) -> Option<Result<FastqRecord, Error>> {
        self.finished = true;
        Some(Err(err))
    }

    /// The next non-header line of the current record; EOF here means the
    /// record is truncated.
    fn expect_line(&mut self, id: &str) -> Result<Vec<u8>, Error> {
        match self.lines.next_line() {
            Some(line) => line,
            None => Err(Error::new_unexpected_end(ErrorPosition::new(
                self.lines.line_number(),
                Some(id.to_string()),
            ))),
        }
    }
}

impl<R: io::Read> FastqSource for FourLineReader<R> {
    fn next_record(&mut self) -> Option<Result<FastqRecord, Error>> {
        if self.finished {
            return None;
        }

        // blank lines are tolerated between records only
        let header = loop {
            match self.lines.next_line()? {
                Ok(line) if is_blank(&line) => continue,
                Ok(line) => break line,
                Err(e) => return self.fail(e),
            }
        };
        let start_line = self.lines.line_number();
        if !is_valid_header(&header) {
            return self.fail(Error::new_invalid_header(
                &header,
                ErrorPosition::new(start_line, None),
            ));
        }
        let id = match extract_id(&header) {
            Some(id) => String::from_utf8_lossy(id).into_owned(),
            None => {
                return self.fail(Error::new_invalid_header(
                    &header,
                    ErrorPosition::new(start_line, None),
                ))
            }
        };
        let desc = extract_description(&header).map(|d| String::from_utf8_lossy(d).into_owned());

        let seq_line = match self.expect_line(&id) {
            Ok(line) => line,
            Err(e) => return self.fail(e),
        };
        let seq = trim_ws(&seq_line).to_vec();

        let sep_line = match self.expect_line(&id) {
            Ok(line) => line,
            Err(e) => return self.fail(e),
        };
        if !is_valid_separator(&sep_line, Some(id.as_bytes())) {
            let pos = ErrorPosition::new(self.lines.line_number(), Some(id.clone()));
            let err = if sep_line.first() == Some(&b'+') {
                Error::new_separator_mismatch(&sep_line[1..], &id, pos)
            } else {
                Error::new_invalid_separator(&sep_line, pos)
            };
            return self.fail(err);
        }

        let qual_line = match self.expect_line(&id) {
            Ok(line) => line,
            Err(e) => return self.fail(e),
        };
        let qual = trim_ws(&qual_line).to_vec();
        if qual.len() != seq.len() {
            return self.fail(Error::new_unequal_lengths(
                seq.len(),
                qual.len(),
                ErrorPosition::new(self.lines.line_number(), Some(id)),
            ));
        }

        let encoding = match self.encoding {
            Some(enc) => enc,
            None => match detect::detect(&qual) {
                Ok(enc) => enc,
                Err(e) => {
                    return self.fail(e.at(ErrorPosition::new(self.lines.line_number(), Some(id))))
                }
            },
        };

        match FastqRecord::new(id, desc, seq, qual, encoding) {
            Ok(mut rec) => {
                rec.set_line_number(Some(start_line));
                Some(Ok(rec))
            }
            Err(e) => self.fail(e),
        }
    }

    fn line_number(&self) -> u64 {
        self.lines.line_number()
    }

    fn line_ending(&self) -> Option<LineEnding> {
        self.lines.line_ending()
    }
}
