//! Byte-level round trips: whatever the writer emits, the parsers read
//! back unchanged (up to configured encoding reconversion).

use halfbeak::paired::{PairRepairer, RepairOptions, Repaired};
use halfbeak::{
    Encoding, FastqParser, FastqRecord, FastqWriter, OutputStrategy, ParserOptions,
    ParsingStrategy, WriterOptions,
};

fn record(id: &str, seq: &[u8], qual: &[u8]) -> FastqRecord {
    FastqRecord::new(
        id.to_string(),
        None,
        seq.to_vec(),
        qual.to_vec(),
        Encoding::Phred33,
    )
    .unwrap()
}

fn write_all(records: &[FastqRecord], options: WriterOptions) -> String {
    let mut writer = FastqWriter::new(Vec::new(), options).unwrap();
    writer.write_all(records).unwrap();
    String::from_utf8(writer.into_inner()).unwrap()
}

#[test]
fn simple_write_then_fast_parse() {
    let records = vec![
        record("r1", b"ACGTACGT", b"IIIIJJJJ"),
        record("r2", b"GG", b"!~"),
    ];
    let text = write_all(&records, WriterOptions::default());

    let mut parser = FastqParser::new(ParserOptions {
        strategy: ParsingStrategy::Fast,
        ..ParserOptions::default()
    })
    .unwrap();
    let parsed: Vec<_> = parser.parse_str(&text).collect::<Result<_, _>>().unwrap();
    assert_eq!(parsed.len(), 2);
    for (before, after) in records.iter().zip(&parsed) {
        assert_eq!(before.id(), after.id());
        assert_eq!(before.seq(), after.seq());
        assert_eq!(before.qual(), after.qual());
        assert_eq!(before.encoding(), after.encoding());
    }
}

#[test]
fn wrapped_write_then_state_machine_parse() {
    // quality deliberately full of '@' and '+' so wrapped lines can start
    // with record markers
    let seq: Vec<u8> = b"ACGTACGTACGTACGTACGTACGTACGT".to_vec();
    let qual: Vec<u8> = b"@+@+@+@+@+@+@+@+@+@+@+@+@+@+".to_vec();
    let records = vec![record("r1", &seq, &qual), record("r2", &seq, &qual)];
    let text = write_all(
        &records,
        WriterOptions {
            strategy: OutputStrategy::Wrapped,
            line_length: 10,
            ..WriterOptions::default()
        },
    );

    let mut parser = FastqParser::new(ParserOptions {
        strategy: ParsingStrategy::StateMachine,
        encoding: Some(Encoding::Phred33),
        ..ParserOptions::default()
    })
    .unwrap();
    let parsed: Vec<_> = parser.parse_str(&text).collect::<Result<_, _>>().unwrap();
    assert_eq!(parsed.len(), 2);
    for (before, after) in records.iter().zip(&parsed) {
        assert_eq!(before.seq(), after.seq());
        assert_eq!(before.qual(), after.qual());
    }
}

#[test]
fn auto_strategy_handles_wrapped_output_too() {
    let seq = vec![b'A'; 120];
    let qual = vec![b'I'; 120];
    let records = vec![record("r1", &seq, &qual)];
    let text = write_all(
        &records,
        WriterOptions {
            strategy: OutputStrategy::Auto,
            line_length: 50,
            ..WriterOptions::default()
        },
    );
    // three wrapped lines each for sequence and quality
    let mut parser = FastqParser::with_defaults();
    let parsed: Vec<_> = parser.parse_str(&text).collect::<Result<_, _>>().unwrap();
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed[0].seq(), &seq[..]);
    assert_eq!(parsed[0].qual(), &qual[..]);
}

#[test]
fn encoding_reconversion_round_trip() {
    // scores all within Phred+64's range, so the conversion is loss-free
    let original = record("r1", b"ACGT", b"5:?D");
    let text = write_all(
        std::slice::from_ref(&original),
        WriterOptions {
            target_encoding: Some(Encoding::Phred64),
            ..WriterOptions::default()
        },
    );

    let mut parser = FastqParser::new(ParserOptions {
        encoding: Some(Encoding::Phred64),
        ..ParserOptions::default()
    })
    .unwrap();
    let parsed: Vec<_> = parser.parse_str(&text).collect::<Result<_, _>>().unwrap();
    assert_eq!(parsed[0].encoding(), Encoding::Phred64);

    let back = write_all(
        std::slice::from_ref(&parsed[0]),
        WriterOptions {
            target_encoding: Some(Encoding::Phred33),
            ..WriterOptions::default()
        },
    );
    let mut parser = FastqParser::with_defaults();
    let restored: Vec<_> = parser.parse_str(&back).collect::<Result<_, _>>().unwrap();
    assert_eq!(restored[0].qual(), original.qual());
}

#[test]
fn shuffled_stream_repairs_and_interleaves() {
    let shuffled = "@a/1\nAAAA\n+\nIIII\n@b/1\nCCCC\n+\nIIII\n@a/2\nGGGG\n+\nIIII\n@b/2\nTTTT\n+\nIIII\n";
    let mut parser = FastqParser::with_defaults();
    let records = parser.parse_str(shuffled);
    let repaired: Vec<_> = PairRepairer::single(records, RepairOptions::default())
        .collect::<Result<_, _>>()
        .unwrap();

    let pairs: Vec<_> = repaired
        .into_iter()
        .map(|r| match r {
            Repaired::Pair(p) => p,
            Repaired::Orphan(rec) => panic!("unexpected orphan {}", rec.id()),
        })
        .collect();
    assert_eq!(pairs.len(), 2);

    let mut writer = FastqWriter::with_defaults(Vec::new());
    halfbeak::paired::interleave(pairs.into_iter().map(Ok), &mut writer).unwrap();
    let out = String::from_utf8(writer.into_inner()).unwrap();
    let headers: Vec<&str> = out.lines().filter(|l| l.starts_with('@')).collect();
    assert_eq!(headers, vec!["@a/1", "@a/2", "@b/1", "@b/2"]);
}
