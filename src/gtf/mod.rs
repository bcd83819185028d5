//! GTF annotation parsing: the 9-field tabular line model, attribute maps,
//! cross-database normalization and a lazy query builder.

pub mod query;

pub use query::{GtfQuery, Region};

use std::fmt;
use std::io::{Read, Write};
use std::path::Path;

use indexmap::IndexMap;

use crate::errors::Error;
use crate::parser::lines::LineReader;
use crate::parser::open_path;

/// Coordinates above this are rejected as corrupt input.
pub const MAX_COORDINATE: u64 = 2_500_000_000;

/// Reasonable cap for annotation lines; some GENCODE attribute blocks get
/// long, but nowhere near this.
const GTF_MAX_LINE: usize = 1_000_000;

/// Strand column of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strand {
    Forward,
    Reverse,
    Unspecified,
}

impl Strand {
    fn parse(field: &str, line: u64) -> Result<Self, Error> {
        match field {
            "+" => Ok(Strand::Forward),
            "-" => Ok(Strand::Reverse),
            "." => Ok(Strand::Unspecified),
            other => Err(Error::new_gtf(
                format!("strand must be '+', '-' or '.', found '{other}'"),
                line,
            )),
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            Strand::Forward => '+',
            Strand::Reverse => '-',
            Strand::Unspecified => '.',
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// An attribute value: single, or a list when the key repeats on the line.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Single(String),
    Multi(Vec<String>),
}

impl AttrValue {
    /// The first (or only) value.
    pub fn first(&self) -> &str {
        match self {
            AttrValue::Single(v) => v,
            AttrValue::Multi(list) => list.first().map(String::as_str).unwrap_or(""),
        }
    }

    /// All values in line order.
    pub fn values(&self) -> Vec<&str> {
        match self {
            AttrValue::Single(v) => vec![v.as_str()],
            AttrValue::Multi(list) => list.iter().map(String::as_str).collect(),
        }
    }

    fn push(&mut self, value: String) {
        match self {
            AttrValue::Single(existing) => {
                let old = std::mem::take(existing);
                *self = AttrValue::Multi(vec![old, value]);
            }
            AttrValue::Multi(list) => list.push(value),
        }
    }
}

/// Attribute map in line order.
pub type AttrMap = IndexMap<String, AttrValue>;

/// Which annotation database a feature's attribute keys point to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceDb {
    Gencode,
    Ensembl,
    RefSeq,
    Unknown,
}

/// Database-agnostic view of the most-used attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedAnnotation {
    pub gene_type: Option<String>,
    pub transcript_type: Option<String>,
    pub version: Option<String>,
    pub tags: Vec<String>,
    pub source_db: SourceDb,
}

/// One parsed GTF line. Coordinates are 1-based inclusive; a single-base
/// feature has `start == end`.
#[derive(Debug, Clone, PartialEq)]
pub struct GtfFeature {
    pub seqname: String,
    pub source: String,
    pub feature: String,
    pub start: u64,
    pub end: u64,
    pub score: Option<f64>,
    pub strand: Strand,
    pub frame: Option<u8>,
    pub attributes: AttrMap,
    pub normalized: Option<NormalizedAnnotation>,
}

impl GtfFeature {
    /// Feature length in bases (inclusive coordinates, so never zero).
    pub fn length(&self) -> u64 {
        self.end - self.start + 1
    }

    /// First value of an attribute, if present.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(AttrValue::first)
    }

    /// Whether the feature overlaps `[start, end]` (1-based inclusive).
    pub fn overlaps(&self, start: u64, end: u64) -> bool {
        self.start <= end && self.end >= start
    }
}

/// Comment (`#`, `//`) and blank lines carry no features.
pub fn should_skip(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("//")
}

/// Parses one content line into a feature. The caller is expected to have
/// filtered comments and blanks with [`should_skip`].
pub fn parse_gtf_line(line: &str, line_number: u64) -> Result<GtfFeature, Error> {
    let trimmed = line.trim_end_matches(['\n', '\r']);
    let fields: Vec<&str> = trimmed.split('\t').collect();
    if fields.len() != 9 {
        return Err(Error::new_gtf(
            format!("expected 9 tab-separated fields, found {}", fields.len()),
            line_number,
        )
        .with_sample(trimmed.as_bytes()));
    }

    let start: u64 = fields[3].parse().map_err(|_| {
        Error::new_gtf(format!("start '{}' is not a positive integer", fields[3]), line_number)
    })?;
    let end: u64 = fields[4].parse().map_err(|_| {
        Error::new_gtf(format!("end '{}' is not a positive integer", fields[4]), line_number)
    })?;
    if start < 1 {
        return Err(Error::new_gtf("start must be at least 1", line_number));
    }
    if end < start {
        return Err(Error::new_gtf(
            format!("end ({end}) must not precede start ({start})"),
            line_number,
        ));
    }
    if end > MAX_COORDINATE {
        return Err(Error::new_gtf(
            format!("end ({end}) exceeds the coordinate limit of {MAX_COORDINATE}"),
            line_number,
        ));
    }

    let score = match fields[5] {
        "." => None,
        raw => Some(raw.parse::<f64>().map_err(|_| {
            Error::new_gtf(format!("score '{raw}' is not a number or '.'"), line_number)
        })?),
    };
    let strand = Strand::parse(fields[6], line_number)?;
    let frame = match fields[7] {
        "." => None,
        "0" => Some(0),
        "1" => Some(1),
        "2" => Some(2),
        other => {
            return Err(Error::new_gtf(
                format!("frame must be 0, 1, 2 or '.', found '{other}'"),
                line_number,
            ))
        }
    };
    let attributes = parse_attributes(fields[8], line_number)?;

    Ok(GtfFeature {
        seqname: fields[0].to_string(),
        source: fields[1].to_string(),
        feature: fields[2].to_string(),
        start,
        end,
        score,
        strand,
        frame,
        attributes,
        normalized: None,
    })
}

/// Parses the semicolon-separated attribute column. Both `key "value"` and
/// `key value` forms are accepted; repeated keys collapse into a list.
fn parse_attributes(raw: &str, line_number: u64) -> Result<AttrMap, Error> {
    let mut map = AttrMap::new();
    for entry in raw.split(';') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (key, value) = entry.split_once(char::is_whitespace).ok_or_else(|| {
            Error::new_gtf(
                format!("attribute entry '{entry}' has no value"),
                line_number,
            )
        })?;
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        match map.entry(key.to_string()) {
            indexmap::map::Entry::Occupied(mut slot) => slot.get_mut().push(value.to_string()),
            indexmap::map::Entry::Vacant(slot) => {
                slot.insert(AttrValue::Single(value.to_string()));
            }
        }
    }
    Ok(map)
}

/// GENCODE, Ensembl and RefSeq mark their GTFs with distinctive attribute
/// keys; project the most-used ones into one shape.
pub fn normalize(feature: &GtfFeature) -> NormalizedAnnotation {
    let has = |key: &str| feature.attributes.contains_key(key);

    let source_db = if has("gene_type") || has("level") || has("havana_gene") {
        SourceDb::Gencode
    } else if has("gene_biotype") || has("gene_version") || has("gene_source") {
        SourceDb::Ensembl
    } else if has("locus_tag") || has("product") || has("Dbxref") {
        SourceDb::RefSeq
    } else {
        SourceDb::Unknown
    };

    let gene_type = feature
        .attr("gene_type")
        .or_else(|| feature.attr("gene_biotype"))
        .map(str::to_string);
    let transcript_type = feature
        .attr("transcript_type")
        .or_else(|| feature.attr("transcript_biotype"))
        .map(str::to_string);
    let version = feature
        .attr("gene_version")
        .or_else(|| feature.attr("version"))
        .map(str::to_string);
    let tags = feature
        .attributes
        .get("tag")
        .map(|v| v.values().iter().map(|s| s.to_string()).collect())
        .unwrap_or_default();

    NormalizedAnnotation {
        gene_type,
        transcript_type,
        version,
        tags,
        source_db,
    }
}

/// Options for [`GtfReader`].
#[derive(Debug, Clone, Default)]
pub struct GtfOptions {
    /// Attach a [`NormalizedAnnotation`] to every feature
    pub normalize: bool,
}

/// Streaming GTF reader over any byte source.
pub struct GtfReader<R: Read> {
    lines: LineReader<R>,
    options: GtfOptions,
    finished: bool,
}

impl<R: Read> GtfReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_options(reader, GtfOptions::default())
    }

    pub fn with_options(reader: R, options: GtfOptions) -> Self {
        Self {
            lines: LineReader::new(reader, GTF_MAX_LINE),
            options,
            finished: false,
        }
    }

    /// Number of the line most recently consumed.
    pub fn line_number(&self) -> u64 {
        self.lines.line_number()
    }
}

impl GtfReader<Box<dyn Read + Send>> {
    /// Opens a file, transparently decompressing gzip, bzip2 and xz input
    /// when the `compression` feature is enabled.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Ok(Self::new(open_path(path.as_ref())?))
    }

    pub fn from_path_with_options<P: AsRef<Path>>(
        path: P,
        options: GtfOptions,
    ) -> Result<Self, Error> {
        Ok(Self::with_options(open_path(path.as_ref())?, options))
    }
}

impl<R: Read> Iterator for GtfReader<R> {
    type Item = Result<GtfFeature, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            let line = match self.lines.next_line() {
                None => {
                    self.finished = true;
                    return None;
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e));
                }
                Some(Ok(line)) => line,
            };
            let text = match std::str::from_utf8(&line) {
                Ok(text) => text,
                Err(_) => {
                    self.finished = true;
                    return Some(Err(Error::new_gtf(
                        "line is not valid UTF-8",
                        self.lines.line_number(),
                    )));
                }
            };
            if should_skip(text) {
                continue;
            }
            let mut parsed = parse_gtf_line(text, self.lines.line_number());
            if self.options.normalize {
                if let Ok(feature) = parsed.as_mut() {
                    let norm = normalize(feature);
                    feature.normalized = Some(norm);
                }
            }
            return Some(parsed);
        }
    }
}

/// Writes a feature as one GTF line, `\n` terminated, with the trailing
/// `;` after the last attribute.
pub fn write_gtf_line<W: Write>(writer: &mut W, feature: &GtfFeature) -> Result<(), Error> {
    let score = feature
        .score
        .map(|s| s.to_string())
        .unwrap_or_else(|| ".".to_string());
    let frame = feature
        .frame
        .map(|f| f.to_string())
        .unwrap_or_else(|| ".".to_string());
    write!(
        writer,
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t",
        feature.seqname,
        feature.source,
        feature.feature,
        feature.start,
        feature.end,
        score,
        feature.strand,
        frame
    )?;
    let mut first = true;
    for (key, value) in &feature.attributes {
        for v in value.values() {
            if !first {
                writer.write_all(b" ")?;
            }
            write!(writer, "{key} \"{v}\";")?;
            first = false;
        }
    }
    writer.write_all(b"\n")?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::errors::ErrorKind;

    const GENE_LINE: &str = "chr1\tHAVANA\tgene\t1000\t2000\t.\t+\t.\tgene_id \"ENSG001\"; gene_type \"protein_coding\";";

    #[test]
    fn parses_a_gene_line() {
        let f = parse_gtf_line(GENE_LINE, 1).unwrap();
        assert_eq!(f.seqname, "chr1");
        assert_eq!(f.source, "HAVANA");
        assert_eq!(f.feature, "gene");
        assert_eq!(f.start, 1000);
        assert_eq!(f.end, 2000);
        assert_eq!(f.length(), 1001);
        assert_eq!(f.score, None);
        assert_eq!(f.strand, Strand::Forward);
        assert_eq!(f.frame, None);
        assert_eq!(f.attr("gene_id"), Some("ENSG001"));
        assert_eq!(f.attr("gene_type"), Some("protein_coding"));
    }

    #[test]
    fn single_base_feature() {
        let line = "chr1\tsrc\tSNV\t500\t500\t1.5\t-\t0\tid \"x\";";
        let f = parse_gtf_line(line, 1).unwrap();
        assert_eq!(f.length(), 1);
        assert_eq!(f.score, Some(1.5));
        assert_eq!(f.strand, Strand::Reverse);
        assert_eq!(f.frame, Some(0));
    }

    #[test]
    fn field_count_enforced() {
        let err = parse_gtf_line("chr1\tsrc\tgene\t1\t2", 7).unwrap_err();
        assert_eq!(err.kind, ErrorKind::GtfSyntax);
        assert_eq!(err.position.line, 7);
    }

    #[test]
    fn coordinate_validation() {
        assert!(parse_gtf_line("c\ts\tg\t0\t10\t.\t+\t.\tk \"v\";", 1).is_err());
        assert!(parse_gtf_line("c\ts\tg\t10\t5\t.\t+\t.\tk \"v\";", 1).is_err());
        assert!(parse_gtf_line("c\ts\tg\tx\t5\t.\t+\t.\tk \"v\";", 1).is_err());
        let big = format!("c\ts\tg\t1\t{}\t.\t+\t.\tk \"v\";", MAX_COORDINATE + 1);
        assert!(parse_gtf_line(&big, 1).is_err());
    }

    #[test]
    fn strand_and_frame_validation() {
        assert!(parse_gtf_line("c\ts\tg\t1\t2\t.\tx\t.\tk \"v\";", 1).is_err());
        assert!(parse_gtf_line("c\ts\tg\t1\t2\t.\t+\t5\tk \"v\";", 1).is_err());
    }

    #[test]
    fn unquoted_attribute_values() {
        let f = parse_gtf_line("c\ts\tg\t1\t2\t.\t+\t.\tlevel 2; gene_id \"G\";", 1).unwrap();
        assert_eq!(f.attr("level"), Some("2"));
    }

    #[test]
    fn repeated_keys_collapse_to_list() {
        let f = parse_gtf_line(
            "c\ts\tg\t1\t2\t.\t+\t.\ttag \"basic\"; tag \"CCDS\"; gene_id \"G\";",
            1,
        )
        .unwrap();
        match f.attributes.get("tag").unwrap() {
            AttrValue::Multi(tags) => assert_eq!(tags, &vec!["basic".to_string(), "CCDS".to_string()]),
            other => panic!("expected Multi, got {other:?}"),
        }
        // single-valued keys stay Single
        assert!(matches!(
            f.attributes.get("gene_id").unwrap(),
            AttrValue::Single(_)
        ));
    }

    #[test]
    fn attribute_entry_without_value_is_an_error() {
        assert!(parse_gtf_line("c\ts\tg\t1\t2\t.\t+\t.\torphankey;", 1).is_err());
    }

    #[test]
    fn comments_and_blanks_skip() {
        assert!(should_skip("# comment"));
        assert!(should_skip("//vim hint"));
        assert!(should_skip("   "));
        assert!(!should_skip(GENE_LINE));
    }

    #[test]
    fn reader_streams_features() {
        let data = format!("# header\n\n{GENE_LINE}\n{GENE_LINE}\n");
        let features: Vec<_> = GtfReader::new(data.as_bytes())
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].seqname, "chr1");
    }

    #[test]
    fn gencode_normalization() {
        let line = "chr1\tHAVANA\tgene\t1\t2\t.\t+\t.\tgene_id \"G.5\"; gene_type \"lncRNA\"; level 2; tag \"basic\";";
        let features: Vec<_> = GtfReader::with_options(
            line.as_bytes(),
            GtfOptions { normalize: true },
        )
        .collect::<Result<_, _>>()
        .unwrap();
        let norm = features[0].normalized.as_ref().unwrap();
        assert_eq!(norm.source_db, SourceDb::Gencode);
        assert_eq!(norm.gene_type.as_deref(), Some("lncRNA"));
        assert_eq!(norm.tags, vec!["basic".to_string()]);
    }

    #[test]
    fn ensembl_normalization() {
        let line = "1\tensembl\tgene\t1\t2\t.\t+\t.\tgene_id \"ENSG\"; gene_biotype \"protein_coding\"; gene_version \"3\";";
        let f = parse_gtf_line(line, 1).unwrap();
        let norm = normalize(&f);
        assert_eq!(norm.source_db, SourceDb::Ensembl);
        assert_eq!(norm.gene_type.as_deref(), Some("protein_coding"));
        assert_eq!(norm.version.as_deref(), Some("3"));
    }

    #[test]
    fn refseq_normalization() {
        let line = "NC_1\tRefSeq\tgene\t1\t2\t.\t+\t.\tgene_id \"trpA\"; locus_tag \"b1260\"; product \"synthase\";";
        let norm = normalize(&parse_gtf_line(line, 1).unwrap());
        assert_eq!(norm.source_db, SourceDb::RefSeq);
    }

    #[test]
    fn round_trips_through_the_writer() {
        let f = parse_gtf_line(GENE_LINE, 1).unwrap();
        let mut out = Vec::new();
        write_gtf_line(&mut out, &f).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, format!("{GENE_LINE}\n"));
        let again = parse_gtf_line(text.trim_end(), 1).unwrap();
        assert_eq!(again, f);
    }

    #[test]
    fn writer_repeats_multi_valued_keys() {
        let f = parse_gtf_line(
            "c\ts\tg\t1\t2\t.\t+\t.\ttag \"a\"; tag \"b\";",
            1,
        )
        .unwrap();
        let mut out = Vec::new();
        write_gtf_line(&mut out, &f).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "c\ts\tg\t1\t2\t.\t+\t.\ttag \"a\"; tag \"b\";\n");
    }
}
