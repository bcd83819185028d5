//! Buffered line iteration over any byte source.
//!
//! Both FASTQ readers and the GTF reader pull lines from here, so line
//! accounting, `\r\n` handling and the max-line-length guard live in one
//! place. Lines are returned without their terminator.

use std::io::{self, BufRead};

use memchr::memchr;

use crate::errors::{Error, ErrorPosition};

pub(crate) const BUFSIZE: usize = 64 * 1024;

/// Remove a final '\r' from a byte slice
#[inline]
pub(crate) fn trim_cr(line: &[u8]) -> &[u8] {
    if let Some((&b'\r', remaining)) = line.split_last() {
        remaining
    } else {
        line
    }
}

#[inline]
pub(crate) fn is_blank(line: &[u8]) -> bool {
    line.iter().all(|b| b.is_ascii_whitespace())
}

/// Strip ASCII whitespace from both ends of a line.
pub(crate) fn trim_ws(line: &[u8]) -> &[u8] {
    let start = line
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(line.len());
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map(|i| i + 1)
        .unwrap_or(start);
    &line[start..end]
}

/// Holds line number and byte offset of our current state in a parser
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Position {
    pub(crate) line: u64,
    pub(crate) byte: u64,
}

impl Position {
    pub fn new(line: u64, byte: u64) -> Self {
        Self { line, byte }
    }

    /// Line number (starting with 1)
    pub fn line(&self) -> u64 {
        self.line
    }

    /// Byte offset within the input
    pub fn byte(&self) -> u64 {
        self.byte
    }
}

/// Whether the input uses \r\n or only \n
#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone)]
pub enum LineEnding {
    Windows,
    Unix,
}

impl LineEnding {
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Windows => vec![b'\r', b'\n'],
            Self::Unix => vec![b'\n'],
        }
    }
}

enum Step {
    Eof,
    Terminated(usize),
    Partial(usize),
}

/// Pull-based line reader over any `io::Read`, tracking position and the
/// input's line-ending style.
pub struct LineReader<R: io::Read> {
    reader: buffer_redux::BufReader<R>,
    position: Position,
    max_line_length: usize,
    line_ending: Option<LineEnding>,
    eof: bool,
}

impl<R: io::Read> LineReader<R> {
    pub fn new(reader: R, max_line_length: usize) -> Self {
        Self::with_capacity(reader, max_line_length, BUFSIZE)
    }

    pub fn with_capacity(reader: R, max_line_length: usize, capacity: usize) -> Self {
        Self {
            reader: buffer_redux::BufReader::with_capacity(capacity, reader),
            position: Position::new(0, 0),
            max_line_length,
            line_ending: None,
            eof: false,
        }
    }

    /// Number of the line most recently returned (starting with 1).
    pub fn line_number(&self) -> u64 {
        self.position.line
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    /// `None` until a terminated line has been seen.
    pub fn line_ending(&self) -> Option<LineEnding> {
        self.line_ending
    }

    /// The next line without its terminator, or `None` at EOF. A final line
    /// without a terminator is still returned.
    pub fn next_line(&mut self) -> Option<Result<Vec<u8>, Error>> {
        if self.eof {
            return None;
        }
        let mut line: Vec<u8> = Vec::new();
        loop {
            let step = {
                let available = match self.reader.fill_buf() {
                    Ok(buf) => buf,
                    Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Some(Err(Error::new_io(e))),
                };
                if available.is_empty() {
                    Step::Eof
                } else {
                    match memchr(b'\n', available) {
                        Some(i) => {
                            line.extend_from_slice(&available[..i]);
                            Step::Terminated(i + 1)
                        }
                        None => {
                            line.extend_from_slice(available);
                            Step::Partial(available.len())
                        }
                    }
                }
            };
            match step {
                Step::Eof => {
                    self.eof = true;
                    if line.is_empty() {
                        return None;
                    }
                    break;
                }
                Step::Terminated(consumed) => {
                    self.reader.consume(consumed);
                    self.position.byte += consumed as u64;
                    if self.line_ending.is_none() {
                        self.line_ending = Some(if line.last() == Some(&b'\r') {
                            LineEnding::Windows
                        } else {
                            LineEnding::Unix
                        });
                    }
                    break;
                }
                Step::Partial(consumed) => {
                    self.reader.consume(consumed);
                    self.position.byte += consumed as u64;
                    // bail out before an unterminated monster line is
                    // buffered whole
                    if line.len() > self.max_line_length {
                        self.position.line += 1;
                        return Some(Err(Error::new_line_too_long(
                            line.len(),
                            self.max_line_length,
                            ErrorPosition::new(self.position.line, None),
                        )));
                    }
                }
            }
        }

        if line.last() == Some(&b'\r') {
            line.pop();
        }
        self.position.line += 1;
        if line.len() > self.max_line_length {
            return Some(Err(Error::new_line_too_long(
                line.len(),
                self.max_line_length,
                ErrorPosition::new(self.position.line, None),
            )));
        }
        Some(Ok(line))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    fn collect_lines(data: &[u8]) -> Vec<Vec<u8>> {
        let mut reader = LineReader::new(Cursor::new(data.to_vec()), 1_000_000);
        let mut lines = Vec::new();
        while let Some(line) = reader.next_line() {
            lines.push(line.unwrap());
        }
        lines
    }

    #[test]
    fn unix_lines() {
        assert_eq!(
            collect_lines(b"a\nbb\nccc\n"),
            vec![b"a".to_vec(), b"bb".to_vec(), b"ccc".to_vec()]
        );
    }

    #[test]
    fn windows_lines_and_ending_detection() {
        let mut reader = LineReader::new(Cursor::new(b"a\r\nb\r\n".to_vec()), 1000);
        assert_eq!(reader.next_line().unwrap().unwrap(), b"a".to_vec());
        assert_eq!(reader.line_ending(), Some(LineEnding::Windows));
        assert_eq!(reader.next_line().unwrap().unwrap(), b"b".to_vec());
        assert!(reader.next_line().is_none());
    }

    #[test]
    fn final_line_without_terminator() {
        assert_eq!(collect_lines(b"a\nb"), vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn line_numbers_start_at_one() {
        let mut reader = LineReader::new(Cursor::new(b"x\ny\n".to_vec()), 1000);
        assert_eq!(reader.line_number(), 0);
        reader.next_line().unwrap().unwrap();
        assert_eq!(reader.line_number(), 1);
        reader.next_line().unwrap().unwrap();
        assert_eq!(reader.line_number(), 2);
    }

    #[test]
    fn empty_lines_are_preserved() {
        assert_eq!(
            collect_lines(b"\n\nx\n"),
            vec![b"".to_vec(), b"".to_vec(), b"x".to_vec()]
        );
    }

    #[test]
    fn overlong_line_is_rejected() {
        let mut reader = LineReader::new(Cursor::new(b"aaaaaaaaaa\n".to_vec()), 5);
        let err = reader.next_line().unwrap().unwrap_err();
        assert_eq!(err.kind, crate::errors::ErrorKind::LineTooLong);
    }

    #[test]
    fn blank_detection() {
        assert!(is_blank(b""));
        assert!(is_blank(b" \t"));
        assert!(!is_blank(b" a"));
    }
}
