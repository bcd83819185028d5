//! Paired-end handling: lockstep iteration over two record streams with
//! sync checking, and bounded-memory repair of shuffled pairs.

use std::collections::VecDeque;
use std::io::Write;

use indexmap::IndexMap;

use crate::errors::Error;
use crate::parser::FastqRecord;
use crate::writer::FastqWriter;

/// A mate pair in `(r1, r2)` order.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadPair {
    pub r1: FastqRecord,
    pub r2: FastqRecord,
}

impl ReadPair {
    pub fn total_len(&self) -> usize {
        self.r1.len() + self.r2.len()
    }

    /// The shared base ID of the pair.
    pub fn pair_id(&self) -> &str {
        extract_base_id(self.r1.id())
    }
}

/// Strips a trailing mate suffix: `/1`, `_2`, `.R1`, `_r2` and the like.
/// IDs without such a suffix are returned unchanged.
pub fn extract_base_id(id: &str) -> &str {
    let bytes = id.as_bytes();
    let n = bytes.len();
    if n < 2 || !matches!(bytes[n - 1], b'1' | b'2') {
        return id;
    }
    let mut cut = n - 1;
    if cut >= 2 && matches!(bytes[cut - 1], b'R' | b'r') {
        cut -= 1;
    }
    if cut >= 1 && matches!(bytes[cut - 1], b'/' | b'.' | b'_') {
        &id[..cut - 1]
    } else {
        id
    }
}

/// Base-ID extractor signature; swap in your own for unusual naming schemes.
pub type BaseIdFn = fn(&str) -> &str;

/// What to do when the two streams disagree on a pair's base ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MismatchAction {
    /// Fail the iteration
    #[default]
    Raise,
    /// Log and yield the pair anyway
    Warn,
    /// Drop the pair silently
    Skip,
}

/// What to do with reads left without a mate at end of input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnpairedAction {
    /// Log and yield them as orphans
    #[default]
    Warn,
    /// Drop them
    Skip,
    /// Fail the iteration
    Raise,
}

/// Options for the lockstep [`PairedReader`].
#[derive(Debug, Clone)]
pub struct PairedOptions {
    pub check_pair_sync: bool,
    pub on_mismatch: MismatchAction,
    pub base_id: BaseIdFn,
}

impl Default for PairedOptions {
    fn default() -> Self {
        Self {
            check_pair_sync: true,
            on_mismatch: MismatchAction::Raise,
            base_id: extract_base_id,
        }
    }
}

/// Iterates two record streams in lockstep: the N-th yielded pair holds the
/// N-th record of each stream. A stream ending before the other is an
/// error, not a shorter output.
pub struct PairedReader<A, B> {
    r1: A,
    r2: B,
    options: PairedOptions,
    index: u64,
    finished: bool,
}

impl<A, B> PairedReader<A, B>
where
    A: Iterator<Item = Result<FastqRecord, Error>>,
    B: Iterator<Item = Result<FastqRecord, Error>>,
{
    pub fn new(r1: A, r2: B, options: PairedOptions) -> Self {
        Self {
            r1,
            r2,
            options,
            index: 0,
            finished: false,
        }
    }

    /// Pairs yielded so far.
    pub fn pairs_read(&self) -> u64 {
        self.index
    }

    fn fail(&mut self, err: Error) -> Option<Result<ReadPair, Error>> {
        self.finished = true;
        Some(Err(err))
    }
}

impl<A, B> Iterator for PairedReader<A, B>
where
    A: Iterator<Item = Result<FastqRecord, Error>>,
    B: Iterator<Item = Result<FastqRecord, Error>>,
{
    type Item = Result<ReadPair, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            let (a, b) = match (self.r1.next(), self.r2.next()) {
                (None, None) => {
                    self.finished = true;
                    return None;
                }
                (Some(a), Some(b)) => (a, b),
                (Some(_), None) => {
                    let err = Error::new_pair_out_of_sync(
                        format!(
                            "r2 ended after {} pairs while r1 still has records",
                            self.index
                        ),
                        self.index,
                    );
                    return self.fail(err);
                }
                (None, Some(_)) => {
                    let err = Error::new_pair_out_of_sync(
                        format!(
                            "r1 ended after {} pairs while r2 still has records",
                            self.index
                        ),
                        self.index,
                    );
                    return self.fail(err);
                }
            };
            let r1 = match a {
                Ok(rec) => rec,
                Err(e) => return self.fail(e),
            };
            let r2 = match b {
                Ok(rec) => rec,
                Err(e) => return self.fail(e),
            };

            if self.options.check_pair_sync {
                let base1 = (self.options.base_id)(r1.id());
                let base2 = (self.options.base_id)(r2.id());
                if base1 != base2 {
                    match self.options.on_mismatch {
                        MismatchAction::Raise => {
                            let err = Error::new_pair_out_of_sync(
                                format!(
                                    "pair {}: r1 base ID '{base1}' does not match r2 base ID '{base2}'",
                                    self.index
                                ),
                                self.index,
                            );
                            return self.fail(err);
                        }
                        MismatchAction::Warn => {
                            log::warn!(
                                "pair {}: base IDs '{base1}' and '{base2}' differ",
                                self.index
                            );
                        }
                        MismatchAction::Skip => {
                            self.index += 1;
                            continue;
                        }
                    }
                }
            }

            self.index += 1;
            return Some(Ok(ReadPair { r1, r2 }));
        }
    }
}

/// Options for the [`PairRepairer`].
#[derive(Debug, Clone)]
pub struct RepairOptions {
    /// Hard cap on records buffered across both sides
    pub max_buffered: usize,
    pub on_unpaired: UnpairedAction,
    pub base_id: BaseIdFn,
}

impl Default for RepairOptions {
    fn default() -> Self {
        Self {
            max_buffered: 100_000,
            on_unpaired: UnpairedAction::Warn,
            base_id: extract_base_id,
        }
    }
}

/// An item yielded by the repair engine.
#[derive(Debug, Clone, PartialEq)]
pub enum Repaired {
    Pair(ReadPair),
    /// A read whose mate never showed up (only with [`UnpairedAction::Warn`])
    Orphan(FastqRecord),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    R1,
    R2,
}

enum Source<A, B> {
    Dual {
        r1: A,
        r2: B,
        done1: bool,
        done2: bool,
    },
    Single {
        stream: A,
        done: bool,
    },
}

/// Re-pairs shuffled reads with bounded memory.
///
/// Records are buffered per side until their mate appears in the opposite
/// buffer; a match is yielded immediately, r1 first. Output order is the
/// earliest point at which both mates were available. The combined buffer
/// size is capped; crossing 80% of the cap logs one warning, exceeding it
/// fails.
pub struct PairRepairer<A, B = A> {
    source: Source<A, B>,
    buf1: IndexMap<String, FastqRecord>,
    buf2: IndexMap<String, FastqRecord>,
    pending: VecDeque<Repaired>,
    terminal_error: Option<Error>,
    options: RepairOptions,
    warned_buffer: bool,
    drained: bool,
    finished: bool,
}

impl<A, B> PairRepairer<A, B>
where
    A: Iterator<Item = Result<FastqRecord, Error>>,
    B: Iterator<Item = Result<FastqRecord, Error>>,
{
    /// Repair from two streams read in lockstep.
    pub fn dual(r1: A, r2: B, options: RepairOptions) -> Self {
        Self::with_source(
            Source::Dual {
                r1,
                r2,
                done1: false,
                done2: false,
            },
            options,
        )
    }

    fn with_source(source: Source<A, B>, options: RepairOptions) -> Self {
        Self {
            source,
            buf1: IndexMap::new(),
            buf2: IndexMap::new(),
            pending: VecDeque::new(),
            terminal_error: None,
            options,
            warned_buffer: false,
            drained: false,
            finished: false,
        }
    }

    /// Records currently buffered across both sides.
    pub fn buffered(&self) -> usize {
        self.buf1.len() + self.buf2.len()
    }

    fn exhausted(&self) -> bool {
        match &self.source {
            Source::Dual { done1, done2, .. } => *done1 && *done2,
            Source::Single { done, .. } => *done,
        }
    }

    /// Pull one record from each active sub-stream, then buffer or match
    /// them. Records are pulled first so the source borrow ends before any
    /// buffer work.
    fn fetch(&mut self) -> Result<(), Error> {
        let mut first: Option<(FastqRecord, Option<Side>)> = None;
        let mut second: Option<(FastqRecord, Side)> = None;
        match &mut self.source {
            Source::Dual {
                r1,
                r2,
                done1,
                done2,
            } => {
                if !*done1 {
                    match r1.next() {
                        None => *done1 = true,
                        Some(rec) => first = Some((rec?, Some(Side::R1))),
                    }
                }
                if !*done2 {
                    match r2.next() {
                        None => *done2 = true,
                        Some(rec) => second = Some((rec?, Side::R2)),
                    }
                }
            }
            Source::Single { stream, done } => match stream.next() {
                None => *done = true,
                Some(rec) => first = Some((rec?, None)),
            },
        }
        if let Some((rec, side)) = first {
            let side = side.unwrap_or_else(|| self.classify(&rec));
            self.process(rec, side)?;
        }
        if let Some((rec, side)) = second {
            self.process(rec, side)?;
        }
        Ok(())
    }

    /// R1 or R2 for a single-stream record: mate suffix first, then which
    /// buffer already holds the base ID, then default R1.
    fn classify(&self, rec: &FastqRecord) -> Side {
        let id = rec.id();
        let base = (self.options.base_id)(id);
        if base.len() < id.len() {
            return match id.as_bytes()[id.len() - 1] {
                b'2' => Side::R2,
                _ => Side::R1,
            };
        }
        if self.buf1.contains_key(base) {
            Side::R2
        } else if self.buf2.contains_key(base) {
            Side::R1
        } else {
            Side::R1
        }
    }

    fn process(&mut self, rec: FastqRecord, side: Side) -> Result<(), Error> {
        let base = (self.options.base_id)(rec.id()).to_string();
        let mate = match side {
            Side::R1 => self.buf2.swap_remove(&base),
            Side::R2 => self.buf1.swap_remove(&base),
        };
        if let Some(mate) = mate {
            let pair = match side {
                Side::R1 => ReadPair { r1: rec, r2: mate },
                Side::R2 => ReadPair { r1: mate, r2: rec },
            };
            self.pending.push_back(Repaired::Pair(pair));
            return Ok(());
        }

        // reject before inserting so the buffers never exceed the cap
        if self.buffered() >= self.options.max_buffered {
            return Err(Error::new_buffer_limit(
                self.buffered() + 1,
                self.options.max_buffered,
            ));
        }
        match side {
            Side::R1 => self.buf1.insert(base, rec),
            Side::R2 => self.buf2.insert(base, rec),
        };
        let buffered = self.buffered();
        if !self.warned_buffer && buffered * 5 >= self.options.max_buffered * 4 {
            self.warned_buffer = true;
            log::warn!(
                "pair-repair buffer at {buffered} of {} records",
                self.options.max_buffered
            );
        }
        Ok(())
    }

    /// After both sources end: match leftovers across buffers, then apply
    /// the unpaired policy.
    fn drain(&mut self) {
        self.drained = true;

        let keys: Vec<String> = self.buf1.keys().cloned().collect();
        for key in keys {
            if self.buf2.contains_key(&key) {
                if let (Some(r1), Some(r2)) =
                    (self.buf1.swap_remove(&key), self.buf2.swap_remove(&key))
                {
                    self.pending.push_back(Repaired::Pair(ReadPair { r1, r2 }));
                }
            }
        }

        match self.options.on_unpaired {
            UnpairedAction::Skip => {
                self.buf1.clear();
                self.buf2.clear();
            }
            UnpairedAction::Warn => {
                for (_, rec) in self.buf1.drain(..).chain(self.buf2.drain(..)) {
                    log::warn!("read '{}' has no mate", rec.id());
                    self.pending.push_back(Repaired::Orphan(rec));
                }
            }
            UnpairedAction::Raise => {
                let first = self
                    .buf1
                    .first()
                    .or_else(|| self.buf2.first())
                    .map(|(_, rec)| rec.id().to_string());
                if let Some(id) = first {
                    self.terminal_error = Some(Error::new_unpaired(&id));
                }
                self.buf1.clear();
                self.buf2.clear();
            }
        }
    }
}

impl<A, B> Iterator for PairRepairer<A, B>
where
    A: Iterator<Item = Result<FastqRecord, Error>>,
    B: Iterator<Item = Result<FastqRecord, Error>>,
{
    type Item = Result<Repaired, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(Ok(item));
            }
            if let Some(err) = self.terminal_error.take() {
                self.finished = true;
                return Some(Err(err));
            }
            if self.finished {
                return None;
            }
            if self.exhausted() {
                if self.drained {
                    self.finished = true;
                    continue;
                }
                self.drain();
                continue;
            }
            if let Err(e) = self.fetch() {
                self.finished = true;
                return Some(Err(e));
            }
        }
    }
}

impl<A> PairRepairer<A, A>
where
    A: Iterator<Item = Result<FastqRecord, Error>>,
{
    /// Repair from one interleaved-but-shuffled stream; sides are inferred
    /// per record.
    pub fn single(stream: A, options: RepairOptions) -> Self {
        Self::with_source(
            Source::Single {
                stream,
                done: false,
            },
            options,
        )
    }
}

/// Writes pairs as `r1, r2, r1, r2, ...` through a FASTQ writer, returning
/// the number of pairs written.
pub fn interleave<I, W>(pairs: I, writer: &mut FastqWriter<W>) -> Result<u64, Error>
where
    I: IntoIterator<Item = Result<ReadPair, Error>>,
    W: Write,
{
    let mut n = 0;
    for pair in pairs {
        let pair = pair?;
        writer.write_record(&pair.r1)?;
        writer.write_record(&pair.r2)?;
        n += 1;
    }
    Ok(n)
}
