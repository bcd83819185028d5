//! Record validation tiers and sequencing-platform detection.
//!
//! `Quick` is a constant-time structural check; `Full` adds content scans
//! (encoding range, homopolymers, adapters, N content) and platform
//! detection. Full-tier findings that don't invalidate the record flow
//! through the warning channel with a severity.

use lazy_static::lazy_static;
use memchr::memmem;
use regex_lite::Regex;

use crate::errors::{Error, ErrorKind, ErrorPosition, Severity, Warning};
use crate::parser::FastqRecord;
use crate::quality::ascii_extrema;

/// How much scrutiny a record gets after parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationLevel {
    /// Trust the input entirely
    None,
    /// Structural invariants only, constant time
    #[default]
    Quick,
    /// Quick plus content scans and platform detection
    Full,
}

/// Sequencing platform families this crate recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Illumina,
    PacBio,
    Nanopore,
    Unknown,
}

/// A platform guess with its supporting evidence. Never modifies the record.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformInfo {
    pub platform: Platform,
    /// In [0, 1]
    pub confidence: f64,
    /// Free-form key/value observations (instrument, run, read type, ...)
    pub characteristics: Vec<(String, String)>,
}

impl PlatformInfo {
    fn unknown() -> Self {
        Self {
            platform: Platform::Unknown,
            confidence: 0.0,
            characteristics: Vec::new(),
        }
    }
}

/// The outcome of validating one record.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<Error>,
    pub warnings: Vec<Warning>,
    pub platform: Option<PlatformInfo>,
}

lazy_static! {
    // instrument:run:flowcell:lane:tile:x:y, optionally with a pair suffix
    static ref ILLUMINA_ID: Regex = Regex::new(
        r"^([A-Za-z0-9_.-]+):(\d+):([A-Za-z0-9_.-]+):(\d+):(\d+):(\d+):(\d+)"
    )
    .unwrap();
    // movie/zmw/start_end or movie/zmw/ccs
    static ref PACBIO_ID: Regex =
        Regex::new(r"^(m[A-Za-z0-9_.-]+)/(\d+)/(\d+_\d+|ccs)").unwrap();
    // MinKNOW read UUIDs
    static ref NANOPORE_ID: Regex = Regex::new(
        r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$"
    )
    .unwrap();
}

/// Known adapter sequences worth flagging in read content.
const ADAPTERS: &[(&str, &[u8])] = &[
    ("Illumina Universal", b"AGATCGGAAGAG"),
    ("TruSeq", b"AGATCGGAAGAGCACACGTCTGAACTCCAGTCA"),
    ("Nextera", b"CTGTCTCTTATACACATCT"),
];

const SHELL_META: &[u8] = b";|&$`<>(){}*?";

/// A homopolymer run at least this long draws a warning.
const HOMOPOLYMER_MIN: usize = 10;

/// Validates a record at the given tier.
pub fn validate(record: &FastqRecord, level: ValidationLevel) -> ValidationResult {
    match level {
        ValidationLevel::None => ValidationResult {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            platform: None,
        },
        ValidationLevel::Quick => {
            let errors = quick_errors(record);
            ValidationResult {
                valid: errors.is_empty(),
                errors,
                warnings: Vec::new(),
                platform: None,
            }
        }
        ValidationLevel::Full => full_validate(record),
    }
}

/// The constant-time structural checks of the quick tier.
pub fn quick_errors(record: &FastqRecord) -> Vec<Error> {
    let mut errors = Vec::new();
    let pos = || ErrorPosition::new(record.line_number().unwrap_or(0), Some(record.id().to_string()));
    if record.id().is_empty() {
        errors.push(Error::new(ErrorKind::InvalidHeader, "record ID is empty"));
    }
    if record.seq().is_empty() {
        errors.push(Error::new(ErrorKind::InvalidSequence, "sequence is empty").at(pos()));
    }
    if record.qual().is_empty() {
        errors.push(Error::new(ErrorKind::UnequalLengths, "quality is empty").at(pos()));
    }
    if record.seq().len() != record.qual().len() {
        errors.push(Error::new_unequal_lengths(
            record.seq().len(),
            record.qual().len(),
            pos(),
        ));
    }
    errors
}

fn full_validate(record: &FastqRecord) -> ValidationResult {
    let mut errors = quick_errors(record);
    let mut warnings = Vec::new();
    let id = record.id();

    // encoding range scan
    let (lo, hi) = record.encoding().ascii_range();
    if let Some(&bad) = record.qual().iter().find(|&&q| q < lo || q > hi) {
        errors.push(
            Error::new_invalid_character(bad, record.encoding().name(), (lo, hi))
                .at(ErrorPosition::new(
                    record.line_number().unwrap_or(0),
                    Some(id.to_string()),
                )),
        );
    }

    // ID compliance
    if id.len() > 50 {
        warnings.push(
            Warning::new(Severity::Low, format!("record ID is {} characters long", id.len()))
                .for_record(id),
        );
    }
    if id.bytes().any(|b| SHELL_META.contains(&b)) {
        warnings.push(
            Warning::new(
                Severity::Medium,
                "record ID contains shell metacharacters",
            )
            .for_record(id),
        );
    }

    if let Some((base, len)) = homopolymer_run(record.seq()) {
        warnings.push(
            Warning::new(
                Severity::Low,
                format!("homopolymer run of {} '{}' bases", len, base as char),
            )
            .for_record(id),
        );
    }

    for (name, adapter) in ADAPTERS {
        if memmem::find(record.seq(), adapter).is_some() {
            warnings.push(
                Warning::new(Severity::Medium, format!("{name} adapter sequence found"))
                    .for_record(id),
            );
        }
    }

    if !record.seq().is_empty() {
        let n_count = bytecount::count(record.seq(), b'N') + bytecount::count(record.seq(), b'n');
        let n_frac = n_count as f64 / record.seq().len() as f64;
        if n_frac > 0.25 {
            warnings.push(
                Warning::new(
                    Severity::High,
                    format!("{:.0}% of the sequence is N", n_frac * 100.0),
                )
                .for_record(id),
            );
        } else if n_frac > 0.10 {
            warnings.push(
                Warning::new(
                    Severity::Medium,
                    format!("{:.0}% of the sequence is N", n_frac * 100.0),
                )
                .for_record(id),
            );
        }
    }

    if record.qual().len() >= 20 {
        let first = record.qual()[0];
        if record.qual().iter().all(|&q| q == first) {
            warnings.push(
                Warning::new(
                    Severity::Low,
                    "quality is perfectly uniform, possibly synthetic or heavily binned",
                )
                .for_record(id),
            );
        }
    }

    let platform = detect_platform(record);

    ValidationResult {
        valid: errors.is_empty(),
        errors,
        warnings,
        platform: Some(platform),
    }
}

fn homopolymer_run(seq: &[u8]) -> Option<(u8, usize)> {
    let mut run_start = 0;
    for i in 1..=seq.len() {
        if i == seq.len() || seq[i] != seq[run_start] {
            if i - run_start >= HOMOPOLYMER_MIN {
                return Some((seq[run_start], i - run_start));
            }
            run_start = i;
        }
    }
    None
}

/// Platform guess from the record ID alone.
pub fn platform_from_id(id: &str) -> PlatformInfo {
    if let Some(caps) = ILLUMINA_ID.captures(id) {
        let characteristics = vec![
            ("instrument".to_string(), caps[1].to_string()),
            ("run".to_string(), caps[2].to_string()),
            ("flowcell".to_string(), caps[3].to_string()),
            ("lane".to_string(), caps[4].to_string()),
        ];
        return PlatformInfo {
            platform: Platform::Illumina,
            confidence: 0.9,
            characteristics,
        };
    }
    if let Some(caps) = PACBIO_ID.captures(id) {
        let characteristics = vec![
            ("movie".to_string(), caps[1].to_string()),
            ("zmw".to_string(), caps[2].to_string()),
            ("read_type".to_string(), caps[3].to_string()),
        ];
        return PlatformInfo {
            platform: Platform::PacBio,
            confidence: 0.9,
            characteristics,
        };
    }
    if NANOPORE_ID.is_match(id) {
        return PlatformInfo {
            platform: Platform::Nanopore,
            confidence: 0.85,
            characteristics: vec![("read_uuid".to_string(), id.to_string())],
        };
    }
    PlatformInfo::unknown()
}

/// Platform guess from the full record: the ID dispatch of
/// [`platform_from_id`] plus quality- and length-based confidence boosts.
pub fn detect_platform(record: &FastqRecord) -> PlatformInfo {
    let mut info = platform_from_id(record.id());
    match info.platform {
        Platform::Illumina => {
            // binned NovaSeq output: narrow uniform high-quality band
            if let Some((min, max)) = ascii_extrema(record.qual()) {
                if min >= 70 && max <= 93 && max - min <= 5 {
                    info.confidence = 0.95;
                    info.characteristics
                        .push(("quality_profile".to_string(), "binned".to_string()));
                }
            }
        }
        Platform::PacBio => {
            let is_ccs = info
                .characteristics
                .iter()
                .any(|(k, v)| k == "read_type" && v == "ccs");
            if record.len() > 1000 || is_ccs {
                info.confidence = 0.95;
            }
            info.characteristics
                .push(("read_length".to_string(), record.len().to_string()));
        }
        Platform::Nanopore => {
            if record.len() > 50_000 {
                info.confidence = 0.95;
                info.characteristics
                    .push(("read_class".to_string(), "ultra-long".to_string()));
            }
        }
        Platform::Unknown => {}
    }
    info
}
