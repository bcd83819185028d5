//! FASTQ output: single-line or wrapped records, optional re-encoding of
//! quality strings and optional round-trip validation.
//!
//! The writer always emits `\n` regardless of what the input used.

use std::io::Write;

use crate::errors::Error;
use crate::parser::FastqRecord;
use crate::quality::{convert_quality, Encoding};
use crate::validation::{self, Platform, ValidationLevel};

/// How sequence and quality lines are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputStrategy {
    /// One line each for sequence and quality
    #[default]
    Simple,
    /// Chunk sequence and quality at `line_length`
    Wrapped,
    /// Wrap only long reads, or long-read platforms (PacBio, Nanopore)
    Auto,
}

/// Every recognized writer option, validated at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct WriterOptions {
    pub strategy: OutputStrategy,
    /// Wrap width; 0 disables wrapping
    pub line_length: usize,
    /// Re-encode quality to this encoding when it differs from the record's
    pub target_encoding: Option<Encoding>,
    /// Repeat the record ID on the `+` separator line
    pub separator_with_id: bool,
    /// Validate each record as it would read back
    pub validate_output: bool,
    pub validation_level: ValidationLevel,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            strategy: OutputStrategy::Simple,
            line_length: 0,
            target_encoding: None,
            separator_with_id: false,
            validate_output: false,
            validation_level: ValidationLevel::None,
        }
    }
}

impl WriterOptions {
    /// Rejects inconsistent combinations.
    pub fn validate(&self) -> Result<(), Error> {
        if self.strategy == OutputStrategy::Wrapped && self.line_length == 0 {
            return Err(Error::new_invalid_options(
                "wrapped output needs line_length above 0",
            ));
        }
        if self.validation_level != ValidationLevel::None && !self.validate_output {
            return Err(Error::new_invalid_options(
                "validation_level is set but validate_output is off",
            ));
        }
        if self.line_length > 0 && self.line_length < 50 {
            log::warn!(
                "line_length of {} produces very short lines",
                self.line_length
            );
        }
        Ok(())
    }
}

/// Streaming FASTQ writer over any `io::Write`.
pub struct FastqWriter<W: Write> {
    writer: W,
    options: WriterOptions,
    written: u64,
}

impl<W: Write> FastqWriter<W> {
    pub fn new(writer: W, options: WriterOptions) -> Result<Self, Error> {
        options.validate()?;
        Ok(Self {
            writer,
            options,
            written: 0,
        })
    }

    pub fn with_defaults(writer: W) -> Self {
        Self {
            writer,
            options: WriterOptions::default(),
            written: 0,
        }
    }

    pub fn records_written(&self) -> u64 {
        self.written
    }

    /// Writes one record. The record itself is never mutated; re-encoding
    /// happens on a scratch copy of the quality string.
    pub fn write_record(&mut self, record: &FastqRecord) -> Result<(), Error> {
        let qual: Vec<u8> = match self.options.target_encoding {
            Some(target) if target != record.encoding() => {
                convert_quality(record.qual(), record.encoding(), target)?
            }
            _ => record.qual().to_vec(),
        };

        if self.options.validate_output {
            let level = match self.options.validation_level {
                ValidationLevel::None => ValidationLevel::Quick,
                level => level,
            };
            let encoding = self.options.target_encoding.unwrap_or_else(|| record.encoding());
            let round_trip = FastqRecord::new(
                record.id().to_string(),
                record.description().map(str::to_string),
                record.seq().to_vec(),
                qual.clone(),
                encoding,
            )?;
            let result = validation::validate(&round_trip, level);
            if let Some(err) = result.errors.into_iter().next() {
                return Err(err);
            }
        }

        let width = self.wrap_width(record);

        self.writer.write_all(b"@")?;
        self.writer.write_all(record.id().as_bytes())?;
        if let Some(desc) = record.description() {
            self.writer.write_all(b" ")?;
            self.writer.write_all(desc.as_bytes())?;
        }
        self.writer.write_all(b"\n")?;

        write_chunked(&mut self.writer, record.seq(), width)?;

        self.writer.write_all(b"+")?;
        if self.options.separator_with_id {
            self.writer.write_all(record.id().as_bytes())?;
        }
        self.writer.write_all(b"\n")?;

        write_chunked(&mut self.writer, &qual, width)?;

        self.written += 1;
        Ok(())
    }

    /// Writes every record of an iterator, returning how many were written.
    pub fn write_all<'a, I>(&mut self, records: I) -> Result<u64, Error>
    where
        I: IntoIterator<Item = &'a FastqRecord>,
    {
        let mut n = 0;
        for record in records {
            self.write_record(record)?;
            n += 1;
        }
        Ok(n)
    }

    pub fn flush(&mut self) -> Result<(), Error> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// 0 means a single line.
    fn wrap_width(&self, record: &FastqRecord) -> usize {
        let len = record.len();
        let width = self.options.line_length;
        match self.options.strategy {
            OutputStrategy::Simple => 0,
            OutputStrategy::Wrapped => width,
            OutputStrategy::Auto => {
                if width == 0 || len <= width {
                    return 0;
                }
                if len > 100 {
                    return width;
                }
                let platform = validation::platform_from_id(record.id()).platform;
                if matches!(platform, Platform::PacBio | Platform::Nanopore) {
                    width
                } else {
                    0
                }
            }
        }
    }
}

fn write_chunked<W: Write>(writer: &mut W, data: &[u8], width: usize) -> Result<(), Error> {
    if width == 0 {
        writer.write_all(data)?;
        writer.write_all(b"\n")?;
        return Ok(());
    }
    for chunk in data.chunks(width) {
        writer.write_all(chunk)?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}
