//! Integration tests for the synchronous reader.

mod common;

use common::*;
use lineflow::{FileKind, ReaderOptions, TextError, TextReader, CHUNK_SIZE};
use tempfile::TempDir;

/// Drain a reader through `next_line`, returning all lines as owned vectors.
fn collect_lines(reader: &mut TextReader) -> Vec<Vec<u8>> {
    let mut lines = Vec::new();
    while let Some(line) = reader.next_line().expect("read line") {
        lines.push(line.to_vec());
    }
    lines
}

#[test]
fn plain_file_without_trailing_newline() -> lineflow::Result<()> {
    let dir = TempDir::new().unwrap();
    let path = write_fixture(&dir, "plain.txt", b"a\nbb\nccc");

    let opts = ReaderOptions {
        max_line_len: CHUNK_SIZE,
        ..Default::default()
    };
    let mut reader = TextReader::open_with(&path, &opts)?;
    assert_eq!(reader.file_kind(), FileKind::Uncompressed);

    let lines = collect_lines(&mut reader);
    assert_eq!(lines, vec![b"a\n".to_vec(), b"bb\n".to_vec(), b"ccc\n".to_vec()]);
    assert!(reader.is_eof());
    assert_eq!(reader.line_idx(), 3);

    // EOF is sticky.
    assert!(reader.next_line()?.is_none());
    reader.close()
}

#[test]
fn empty_file_reports_eof_immediately() -> lineflow::Result<()> {
    let dir = TempDir::new().unwrap();
    let path = write_fixture(&dir, "empty.txt", b"");

    let mut reader = TextReader::open(&path)?;
    assert!(!reader.advance()?);
    assert!(reader.is_eof());
    Ok(())
}

#[test]
fn gzip_hundred_thousand_lines() -> lineflow::Result<()> {
    let dir = TempDir::new().unwrap();
    let data = b"x\n".repeat(100_000);
    let path = write_fixture(&dir, "many.txt.gz", &gzip_bytes(&data));

    let mut reader = TextReader::open(&path)?;
    assert_eq!(reader.file_kind(), FileKind::Gzip);

    let mut count = 0u64;
    while let Some(line) = reader.next_line()? {
        assert_eq!(line, b"x\n");
        count += 1;
    }
    assert_eq!(count, 100_000);
    Ok(())
}

#[test]
fn gzip_with_name_field_in_header() -> lineflow::Result<()> {
    // `gzip file` writes FNAME; make sure the header parser skips it.
    let dir = TempDir::new().unwrap();
    let mut bytes = gzip_bytes(b"hello\nworld\n");
    // Splice an FNAME field in: set the flag and insert the name after the
    // 10-byte fixed header.
    bytes[3] |= 0x08;
    let mut with_name = bytes[..10].to_vec();
    with_name.extend_from_slice(b"orig.txt\0");
    with_name.extend_from_slice(&bytes[10..]);
    let path = write_fixture(&dir, "named.gz", &with_name);

    let mut reader = TextReader::open(&path)?;
    let lines = collect_lines(&mut reader);
    assert_eq!(lines, vec![b"hello\n".to_vec(), b"world\n".to_vec()]);
    Ok(())
}

#[test]
fn zstd_roundtrip() -> lineflow::Result<()> {
    let dir = TempDir::new().unwrap();
    let data: Vec<u8> = (0..50_000)
        .flat_map(|i| format!("chr1\t{}\trs{}\n", i * 100, i).into_bytes())
        .collect();
    let path = write_fixture(&dir, "vars.tsv.zst", &zstd_bytes(&data));

    let mut reader = TextReader::open(&path)?;
    assert_eq!(reader.file_kind(), FileKind::Zstd);

    let mut all = Vec::new();
    while let Some(line) = reader.next_line()? {
        all.extend_from_slice(line);
    }
    assert_eq!(all, data);
    Ok(())
}

#[test]
fn bgzf_block_boundary_mid_line() -> lineflow::Result<()> {
    // Two full blocks with the first one ending mid-line: the reported lines
    // must concatenate to the original content with no boundary artifacts.
    let dir = TempDir::new().unwrap();
    let mut data = Vec::new();
    for i in 0..130 {
        let mut line = format!("read_{i}\t").into_bytes();
        line.resize(999, b'A');
        line.push(b'\n');
        data.extend_from_slice(&line);
    }
    let compressed = bgzf_bytes_with_blocks(&data, 65536);
    assert_ne!(data[65535], b'\n'); // first block really ends mid-line
    let path = write_fixture(&dir, "reads.tsv.bgz", &compressed);

    let mut reader = TextReader::open(&path)?;
    assert_eq!(reader.file_kind(), FileKind::Bgzf);

    let mut all = Vec::new();
    let mut lines = 0;
    while let Some(line) = reader.next_line()? {
        assert_eq!(*line.last().unwrap(), b'\n');
        all.extend_from_slice(line);
        lines += 1;
    }
    assert_eq!(all, data);
    assert_eq!(lines as usize, data.iter().filter(|&&b| b == b'\n').count());
    Ok(())
}

#[test]
fn pathologically_long_line_rejected() {
    let dir = TempDir::new().unwrap();
    let mut data = vec![b'A'; 5 * CHUNK_SIZE];
    data.push(b'\n');
    let path = write_fixture(&dir, "wide.txt.zst", &zstd_bytes(&data));

    let opts = ReaderOptions {
        max_line_len: 4 * CHUNK_SIZE,
        ..Default::default()
    };
    let mut reader = TextReader::open_with(&path, &opts).unwrap();
    let err = loop {
        match reader.advance() {
            Ok(true) => reader.consume(reader.block().len()),
            Ok(false) => panic!("expected long-line failure"),
            Err(e) => break e,
        }
    };
    assert_eq!(
        err,
        TextError::MalformedInput("Pathologically long line".to_string())
    );
    // The error is latched.
    assert_eq!(reader.advance().unwrap_err(), err);
}

#[test]
fn truncated_gzip_reports_decompress_failure() {
    let dir = TempDir::new().unwrap();
    let data = vec![b'q'; 600_000];
    let mut bytes = gzip_bytes(&data);
    bytes.truncate(bytes.len() / 2);
    let path = write_fixture(&dir, "cut.gz", &bytes);

    let mut reader = TextReader::open(&path).unwrap();
    let err = loop {
        match reader.advance() {
            Ok(true) => reader.consume(reader.block().len()),
            Ok(false) => panic!("expected truncation failure"),
            Err(e) => break e,
        }
    };
    assert_eq!(
        err,
        TextError::Decompress("gzipped file appears to be truncated".to_string())
    );
}

#[test]
fn rewind_reproduces_identical_lines() -> lineflow::Result<()> {
    let dir = TempDir::new().unwrap();
    let data: Vec<u8> = (0..20_000)
        .flat_map(|i| format!("line_{i}\n").into_bytes())
        .collect();

    for (name, bytes) in [
        ("r.txt", data.clone()),
        ("r.txt.gz", gzip_bytes(&data)),
        ("r.txt.zst", zstd_bytes(&data)),
        ("r.txt.bgz", bgzf_bytes(&data)),
    ] {
        let path = write_fixture(&dir, name, &bytes);
        let mut reader = TextReader::open(&path)?;
        let first = collect_lines(&mut reader);
        reader.rewind()?;
        let second = collect_lines(&mut reader);
        assert_eq!(first, second, "rewind mismatch for {name}");
    }
    Ok(())
}

#[test]
fn skip_and_nonempty_lines() -> lineflow::Result<()> {
    let dir = TempDir::new().unwrap();
    let path = write_fixture(
        &dir,
        "mixed.txt",
        b"# header\n\n   \n\t\nfirst real\n\n  second real\nthird\n",
    );

    let mut reader = TextReader::open(&path)?;
    assert!(reader.skip_lines(1)?);
    let line = reader.next_nonempty_line()?.unwrap().to_vec();
    assert_eq!(line, b"first real\n");
    assert_eq!(reader.line_idx(), 5);
    let line = reader.next_nonempty_line()?.unwrap().to_vec();
    assert_eq!(line, b"second real\n");
    assert!(reader.next_nonempty_line()?.is_some()); // "third"
    assert!(reader.next_nonempty_line()?.is_none());
    Ok(())
}

#[test]
fn open_rejects_bad_sizes() {
    let dir = TempDir::new().unwrap();
    let path = write_fixture(&dir, "x.txt", b"x\n");

    // max_line_len below the chunk size
    let opts = ReaderOptions {
        max_line_len: CHUNK_SIZE - 1,
        ..Default::default()
    };
    assert!(matches!(
        TextReader::open_with(&path, &opts),
        Err(TextError::Usage(_))
    ));

    // fixed buffer smaller than the 2 MiB floor
    let opts = ReaderOptions {
        capacity: CHUNK_SIZE,
        fixed_buffer: true,
        ..Default::default()
    };
    assert!(matches!(
        TextReader::open_with(&path, &opts),
        Err(TextError::Usage(_))
    ));

    // fixed buffer larger than max_line_len + chunk
    let opts = ReaderOptions {
        max_line_len: CHUNK_SIZE,
        capacity: 4 * CHUNK_SIZE,
        fixed_buffer: true,
        ..Default::default()
    };
    assert!(matches!(
        TextReader::open_with(&path, &opts),
        Err(TextError::Usage(_))
    ));
}

#[test]
fn fixed_buffer_line_overflow_is_nomem() {
    let dir = TempDir::new().unwrap();
    let mut data = vec![b'B'; 3 * CHUNK_SIZE];
    data.push(b'\n');
    let path = write_fixture(&dir, "wide.txt", &data);

    let opts = ReaderOptions {
        max_line_len: 8 * CHUNK_SIZE,
        capacity: 2 * CHUNK_SIZE,
        fixed_buffer: true,
        ..Default::default()
    };
    let mut reader = TextReader::open_with(&path, &opts).unwrap();
    let err = loop {
        match reader.advance() {
            Ok(true) => reader.consume(reader.block().len()),
            Ok(false) => panic!("expected overflow failure"),
            Err(e) => break e,
        }
    };
    assert!(matches!(err, TextError::Nomem(_)));
}

#[test]
fn missing_file_is_open_error() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.txt");
    assert!(matches!(
        TextReader::open(&missing),
        Err(TextError::Open { .. })
    ));
}

#[test]
fn crlf_lines_pass_through_untouched() -> lineflow::Result<()> {
    let dir = TempDir::new().unwrap();
    let path = write_fixture(&dir, "dos.txt", b"one\r\ntwo\r\n");
    let mut reader = TextReader::open(&path)?;
    let lines = collect_lines(&mut reader);
    assert_eq!(lines, vec![b"one\r\n".to_vec(), b"two\r\n".to_vec()]);
    Ok(())
}
