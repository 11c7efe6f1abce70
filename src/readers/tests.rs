use super::*;
use crate::error::{ErrorKind, IngestError};
use crate::model::{MetaValue, ReadType};
use std::fs;
use tempfile::tempdir;

fn lines(data: &[&str]) -> Vec<String> {
    data.iter().map(|s| s.to_string()).collect()
}

// ==================== Delimited Files ====================

#[test]
fn test_read_csv_skips_lines_and_keeps_ragged_rows() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stacked.csv");
    fs::write(
        &path,
        "Some preamble, with a comma\nPMC, x, y\n1, 2.5, 3\n\nA_1,A_2\n7,8\n",
    )
    .unwrap();

    let rows = read_csv(&path, 1, b',').unwrap();
    assert_eq!(
        rows,
        vec![
            vec!["PMC", "x", "y"],
            vec!["1", "2.5", "3"],
            vec!["A_1", "A_2"],
            vec!["7", "8"],
        ]
    );
}

#[test]
fn test_read_csv_empty_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.csv");
    fs::write(&path, "only header\n").unwrap();

    let err = read_csv(&path, 1, b',').unwrap_err();
    assert!(matches!(err, IngestError::EmptyFile(_)));
    assert_eq!(err.kind(), ErrorKind::Parse);
}

#[test]
fn test_read_csv_missing_file() {
    let dir = tempdir().unwrap();
    let err = read_csv(&dir.path().join("nope.csv"), 0, b',').unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingInput);
}

#[test]
fn test_read_csv_from_offset() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tables.csv");
    let first = "Name,Value\nalpha,1\n";
    fs::write(&path, format!("{first}PMC,SCLK\n10,200\n")).unwrap();

    let rows = read_csv_from_offset(&path, first.len() as u64, b',').unwrap();
    assert_eq!(rows, vec![vec!["PMC", "SCLK"], vec!["10", "200"]]);
}

#[test]
fn test_read_file_lines() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("list.txt");
    fs::write(&path, "one\r\ntwo\n\nthree").unwrap();

    let read = read_file_lines(&path).unwrap();
    assert_eq!(read, vec!["one", "two", "", "three"]);
}

// ==================== MSA Header Lines ====================

#[test]
fn test_parse_meta_line_variants() {
    let cases = [
        ("#LIVETIME    :  25.09,  25.08", "LIVETIME", "25.09, 25.08"),
        ("#OFFSET      :  0.3,   0.1    eV of first channel", "OFFSET", "0.3, 0.1"),
        ("#XPERCHAN    :  10.0, 10.0    eV per channel", "XPERCHAN", "10.0, 10.0"),
        ("#NCOLUMNS    : 2     Number of data columns", "NCOLUMNS", "2"),
        ("#FIELD:1234", "FIELD", "1234"),
        ("##THE FIELD:12.34", "THE FIELD", "12.34"),
        ("#ANOTHER FIELD  :  999", "ANOTHER FIELD", "999"),
        ("#NCOLUMNS    : 2 ", "NCOLUMNS", "2"),
        (
            "#DATE        :       Date in the format DD-MMM-YYYY, for example 07-JUL-2010",
            "DATE",
            "",
        ),
        ("#LIVETIME    :   9.87332058 ", "LIVETIME", "9.87332058"),
        ("#XPERCHAN    : 7.9226, 7.9273   eV per channel", "XPERCHAN", "7.9226, 7.9273"),
    ];

    for (line, key, value) in cases {
        let (k, v) = parse_meta_line(line).unwrap();
        assert_eq!((k.as_str(), v.as_str()), (key, value), "{line}");
    }

    assert!(matches!(
        parse_meta_line("#SOME TEXT HERE"),
        Err(MsaError::BadMetaLine(_))
    ));
}

// ==================== MSA Files ====================

#[test]
fn test_msa_dual_detector_split() {
    let data = lines(&[
        "#FORMAT      : EMSA/MAS Spectral Data File",
        "#NPOINTS     : 3",
        "#NCOLUMNS    : 2",
        "#XPERCHAN    : 10.30, 11.30    eV per channel",
        "#OFFSET      :  3.30,   5.30   eV of first channel",
        "#LIVETIME    : 25.09, 25.08",
        "#REALTIME    :  25.11,  25.12",
        "##TRIGGERS   : 45993, 43902",
        "#SIGNALTYPE  : XRF",
        "#DATATYPE    : YY",
        "#PMC         : 3001",
        "#SPECTRUM    :",
        "0, 0",
        "23, 0",
        "48, 991231",
        "#ENDOFDATA   :",
    ]);

    let samples = read_msa_lines(&data, false, true, false).unwrap();
    assert_eq!(samples.len(), 2);

    let (a, b) = (&samples[0], &samples[1]);
    assert_eq!(a.meta_str("DETECTOR_ID"), Some("A"));
    assert_eq!(b.meta_str("DETECTOR_ID"), Some("B"));
    assert_eq!(a.meta["XPERCHAN"], MetaValue::Float(10.30));
    assert_eq!(b.meta["XPERCHAN"], MetaValue::Float(11.30));
    assert_eq!(a.meta["LIVETIME"], MetaValue::Float(25.09));
    assert_eq!(b.meta["LIVETIME"], MetaValue::Float(25.08));
    assert_eq!(a.meta["OFFSET"], MetaValue::Float(3.30));
    assert_eq!(b.meta["OFFSET"], MetaValue::Float(5.30));
    assert_eq!(a.meta["TRIGGERS"], MetaValue::from("45993"));
    assert_eq!(b.meta["TRIGGERS"], MetaValue::from("43902"));
    assert_eq!(a.meta["SIGNALTYPE"], MetaValue::from("XRF"));
    assert_eq!(b.meta["SIGNALTYPE"], MetaValue::from("XRF"));
    assert_eq!(a.pmc(), Some(3001));
    assert_eq!(b.pmc(), Some(3001));

    assert_eq!(a.spectrum, vec![0, 23, 48]);
    assert_eq!(b.spectrum, vec![0, 0, 991231]);
}

#[test]
fn test_msa_dual_detector_mode_errors() {
    let wrong_datatype = lines(&[
        "#SOMETHING:123", "#PMC: 3001", "#DATATYPE: Y", "#NCOLUMNS: 2", "#NPOINTS : 3",
        "#SPECTRUM", "0", "23", "991231",
    ]);
    assert_eq!(
        read_msa_lines(&wrong_datatype, false, true, false).unwrap_err(),
        MsaError::DatatypeMismatch("YY")
    );

    let wrong_columns = lines(&[
        "#SOMETHING:123", "#PMC: 3001", "#DATATYPE: YY", "#NCOLUMNS: 1", "#NPOINTS : 3",
        "#SPECTRUM", "0", "23", "991231",
    ]);
    assert!(matches!(
        read_msa_lines(&wrong_columns, false, true, false).unwrap_err(),
        MsaError::NColumnsMismatch { expected: 2, found: 1, .. }
    ));

    let with_detector = lines(&[
        "#SOMETHING:123", "#PMC: 3001", "#DATATYPE: YY", "#NCOLUMNS: 2", "#DETECTOR_ID: A",
        "#NPOINTS : 3", "#SPECTRUM", "0, 0", "23, 0", "48, 991231",
    ]);
    assert_eq!(
        read_msa_lines(&with_detector, false, true, false).unwrap_err(),
        MsaError::UnexpectedDetectorId
    );

    let lone_value = lines(&[
        "#PMC: 3001", "#DATATYPE: YY", "#NCOLUMNS: 2", "#NPOINTS : 2", "#SPECTRUM", "0, 0", "23",
    ]);
    assert!(matches!(
        read_msa_lines(&lone_value, false, true, false).unwrap_err(),
        MsaError::NColumnsMismatch { expected: 2, found: 1, .. }
    ));

    let unsplittable = lines(&[
        "#LIVETIME: 25.09", "#DATATYPE: YY", "#NCOLUMNS: 2", "#NPOINTS : 1", "#SPECTRUM", "1, 2",
    ]);
    assert_eq!(
        read_msa_lines(&unsplittable, false, false, false).unwrap_err(),
        MsaError::CannotSplitMeta("LIVETIME".to_string())
    );
}

#[test]
fn test_msa_duplicate_a_as_b() {
    let data = lines(&[
        "#LIVETIME: 25.09", "#DATATYPE: YY", "#NCOLUMNS: 1", "#NPOINTS : 2", "#SPECTRUM", "5", "6",
    ]);
    let samples = read_msa_lines(&data, false, false, true).unwrap();
    assert_eq!(samples.len(), 2);
    assert_eq!(samples[0].spectrum, vec![5, 6]);
    assert_eq!(samples[1].spectrum, vec![5, 6]);
    assert_eq!(samples[1].meta["LIVETIME"], MetaValue::Float(25.09));
    assert_eq!(samples[1].meta_str("DETECTOR_ID"), Some("B"));
}

#[test]
fn test_msa_single_detector() {
    let data = lines(&[
        "#SOMETHING:123", "#PMC: 3001", "#COMMENT: one", "#COMMENT: two", "#DATATYPE: Y",
        "#NCOLUMNS: 1", "#DETECTOR_ID: B", "#NPOINTS : 5", "#SPECTRUM", "0", "23", "991231", "0",
        "44", "#ENDOFDATA here", "78", "#SOME COMMENT!",
    ]);

    let samples = read_msa_lines(&data, true, true, false).unwrap();
    assert_eq!(samples.len(), 1);
    let s = &samples[0];
    assert_eq!(s.spectrum, vec![0, 23, 991231, 0, 44]);
    assert_eq!(s.meta_str("COMMENT"), Some("one two"));
    assert_eq!(s.meta_str("DETECTOR_ID"), Some("B"));
    assert_eq!(s.meta_str("NPOINTS"), Some("5"));
    assert_eq!(s.meta_str("SOMETHING"), Some("123"));
    assert_eq!(s.pmc(), Some(3001));
    assert_eq!(s.read_type(), None);
}

#[test]
fn test_msa_single_detector_errors() {
    let cases: Vec<(Vec<&str>, bool, MsaError)> = vec![
        (
            vec!["#PMC: 3001", "#DATATYPE: YY", "#NCOLUMNS: 1", "#DATATYPE: YY", "#DETECTOR_ID: A",
                 "#NPOINTS : 3", "#SPECTRUM", "0", "23", "991231"],
            true,
            MsaError::DuplicateMeta("DATATYPE".to_string()),
        ),
        (
            vec!["#PMC: 3001", "#DATATYPE: YY", "#NCOLUMNS: 1", "#DETECTOR_ID: A", "#NPOINTS : 3",
                 "#SPECTRUM", "0", "23", "991231"],
            true,
            MsaError::DatatypeMismatch("Y"),
        ),
        (
            vec!["#PMC: 3001", "#DATATYPE: Y", "#NCOLUMNS: 1", "#DETECTOR_ID: B", "#NPOINTS : 2",
                 "#SPECTRUM", "0", "23"],
            false,
            MsaError::UnexpectedPmc,
        ),
        (
            vec!["#PMC: 3001", "#DATATYPE: Y", "#NCOLUMNS: 1", "#DETECTOR_ID: B", "#NPOINTS : 4",
                 "#SPECTRUM", "0", "23", "991231"],
            true,
            MsaError::WrongPointCount { expected: 4, found: 3 },
        ),
        (
            vec!["#SOMETHING:123", "#DATATYPE: Y", "#NCOLUMNS: 1", "#DETECTOR_ID: B",
                 "#NPOINTS : 3", "99", "23", "991231"],
            true,
            MsaError::UnexpectedSpectra { line: 6, text: "99".to_string() },
        ),
        (
            vec!["#DATATYPE: Y", "#NCOLUMNS: 1", "#DETECTOR_ID: B", "#NPOINTS : 2", "#SPECTRUM",
                 "0", "23"],
            true,
            MsaError::MissingPmc,
        ),
        (
            vec!["#PMC: 3001", "#DATATYPE: Y", "#NCOLUMNS: 1", "#NPOINTS : 2", "#SPECTRUM", "0",
                 "23"],
            true,
            MsaError::MissingRequiredMeta("DETECTOR_ID"),
        ),
        (
            vec!["#PMC: 3001", "#DATATYPE: Y", "#NCOLUMNS: 1", "#DETECTOR_ID: B", "#SPECTRUM", "0"],
            true,
            MsaError::MissingRequiredMeta("NPOINTS"),
        ),
        (vec![""], true, MsaError::EmptyInput),
        (vec![], true, MsaError::EmptyInput),
    ];

    for (data, expect_pmc, expected) in cases {
        let err = read_msa_lines(&data, true, expect_pmc, false).unwrap_err();
        assert_eq!(err, expected, "{data:?}");
    }
}

#[test]
fn test_msa_spectrum_values() {
    let header = ["#DATATYPE: Y", "#NCOLUMNS: 1", "#DETECTOR_ID: A", "#NPOINTS : 1", "#SPECTRUM"];

    for bad in ["Waffles", "1.6", "-34"] {
        let mut data: Vec<&str> = header.to_vec();
        data.push(bad);
        let err = read_msa_lines(&data, true, false, false).unwrap_err();
        assert!(matches!(err, MsaError::BadValue { .. }), "{bad}: {err}");
    }

    let mut inside: Vec<&str> = header.to_vec();
    inside.extend(["12", "#XPERCHAN: 10"]);
    assert!(matches!(
        read_msa_lines(&inside, true, false, false).unwrap_err(),
        MsaError::BadMetaLine(_)
    ));
}

#[test]
fn test_msa_integer_meta_bases() {
    let data = lines(&[
        "#PMC: 0x1F", "#SCLK: 012", "#DATATYPE: Y", "#NCOLUMNS: 1", "#DETECTOR_ID: A",
        "#NPOINTS : 1", "#SPECTRUM", "3",
    ]);
    let samples = read_msa_lines(&data, true, true, false).unwrap();
    assert_eq!(samples[0].pmc(), Some(31));
    assert_eq!(samples[0].meta["SCLK"], MetaValue::Int(10));

    let bad = lines(&[
        "#PMC: twelve", "#DATATYPE: Y", "#NCOLUMNS: 1", "#DETECTOR_ID: A", "#NPOINTS : 1",
        "#SPECTRUM", "3",
    ]);
    assert!(matches!(
        read_msa_lines(&bad, true, true, false).unwrap_err(),
        MsaError::BadValue { .. }
    ));
}

#[test]
fn test_msa_read_type_is_caller_supplied() {
    let data = lines(&[
        "#DATATYPE: Y", "#NCOLUMNS: 1", "#DETECTOR_ID: A", "#NPOINTS : 1", "#SPECTRUM", "3",
    ]);
    let mut samples = read_msa_lines(&data, true, false, false).unwrap();
    samples[0].set_meta("READTYPE", ReadType::Dwell.as_str());
    assert_eq!(samples[0].read_type(), Some(ReadType::Dwell));
}
