//! File-level parsing behavior: plain and compressed input, empty files,
//! and the GTF reader over real paths.

use std::io::Write;

use halfbeak::gtf::GtfReader;
use halfbeak::{Encoding, ErrorKind, FastqParser, ParserOptions, ParsingStrategy};

const TWO_RECORDS: &str = "@r1 first\nACGT\n+\nIIII\n@r2 second\nGGCC\n+\nJJJJ\n";

fn temp_file_with(content: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn parse_plain_file() {
    let file = temp_file_with(TWO_RECORDS.as_bytes());
    let mut parser = FastqParser::with_defaults();
    let records: Vec<_> = parser
        .parse_file(file.path())
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id(), "r1");
    assert_eq!(records[0].description(), Some("first"));
    assert_eq!(records[1].seq(), b"GGCC");
    assert_eq!(records[1].encoding(), Encoding::Phred33);
    assert_eq!(parser.metrics().total_records, 2);
}

#[cfg(feature = "compression")]
#[test]
fn parse_gzip_file() {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(TWO_RECORDS.as_bytes()).unwrap();
    let file = temp_file_with(&encoder.finish().unwrap());

    let mut parser = FastqParser::with_defaults();
    let records: Vec<_> = parser
        .parse_file(file.path())
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].qual(), b"IIII");
}

#[test]
fn empty_file_is_an_error() {
    let file = temp_file_with(b"");
    let mut parser = FastqParser::with_defaults();
    let err = match parser.parse_file(file.path()) {
        Err(e) => e,
        Ok(_) => panic!("expected an error for an empty file"),
    };
    assert_eq!(err.kind, ErrorKind::EmptyFile);
}

#[test]
fn truncated_final_record_in_file() {
    let file = temp_file_with(b"@r1\nACGT\n+\nIIII\n@r2\nGGCC\n");
    let mut parser = FastqParser::new(ParserOptions {
        strategy: ParsingStrategy::StateMachine,
        ..ParserOptions::default()
    })
    .unwrap();
    let results: Vec<_> = parser.parse_file(file.path()).unwrap().collect();
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    let err = results[1].as_ref().unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnexpectedEnd);
    assert_eq!(err.position.id.as_deref(), Some("r2"));
}

#[test]
fn gtf_from_path() {
    let gtf = "# annotation\n\
chr1\tHAVANA\tgene\t1000\t2000\t.\t+\t.\tgene_id \"G1\"; gene_type \"protein_coding\";\n\
chr1\tHAVANA\texon\t1000\t1200\t.\t+\t.\tgene_id \"G1\";\n";
    let file = temp_file_with(gtf.as_bytes());
    let features: Vec<_> = GtfReader::from_path(file.path())
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(features.len(), 2);
    assert_eq!(features[0].attr("gene_id"), Some("G1"));
    assert_eq!(features[0].length(), 1001);
}

#[cfg(feature = "compression")]
#[test]
fn gtf_from_gzip_path() {
    let gtf = "chr1\tsrc\tgene\t1\t10\t.\t+\t.\tgene_id \"G\";\n";
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(gtf.as_bytes()).unwrap();
    let file = temp_file_with(&encoder.finish().unwrap());
    let features: Vec<_> = GtfReader::from_path(file.path())
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(features.len(), 1);
}
