use super::*;
use crate::error::ErrorKind;
use proptest::prelude::*;

#[test]
fn test_parse_fields() {
    let meta =
        FileNameMeta::parse("PS__D077T0637741109_000RPM_N001003600098356100640__J01.CSV").unwrap();

    assert_eq!(meta.instrument, "PS");
    assert_eq!(meta.colour_filter, "_");
    assert_eq!(meta.special, "_");
    assert_eq!(meta.primary_timestamp, "D077");
    assert_eq!(meta.venue, "T");
    assert_eq!(meta.secondary_timestamp, "0637741109");
    assert_eq!(meta.ternary_timestamp, "000");
    assert_eq!(meta.prod_type, "RPM");
    assert_eq!(meta.geometry, "_");
    assert_eq!(meta.thumbnail, "N");
    assert_eq!(meta.site, "001");
    assert_eq!(meta.drive, "0036");
    assert_eq!(meta.seq_rtt, "000983561");
    assert_eq!(meta.cam_specific, "0064");
    assert_eq!(meta.downsample, "0");
    assert_eq!(meta.compression, "__");
    assert_eq!(meta.producer, "J");
    assert_eq!(meta.version_str, "01");
    assert_eq!(meta.extension, "CSV");

    assert_eq!(meta.pmc().unwrap(), 64);
    assert_eq!(meta.rtt(), "000983561");
    assert_eq!(meta.rtt_number().unwrap(), 983561);
    assert_eq!(meta.sclk().unwrap(), 637741109);
    assert_eq!(meta.sol(), "D077");
    assert_eq!(meta.site_id().unwrap(), 1);
    assert_eq!(meta.drive_id().unwrap(), 36);
    assert_eq!(meta.version().unwrap(), 1);

    assert_eq!(
        meta.to_string(),
        "PS__D077T0637741109_000RPM_N001003600098356100640__J01"
    );
    assert_eq!(
        meta.to_file_name(),
        "PS__D077T0637741109_000RPM_N001003600098356100640__J01.CSV"
    );
}

#[test]
fn test_parse_uses_base_name() {
    let meta = FileNameMeta::parse(
        "some/dir/PCR_D077T0637741562_000EDR_N00100360009835610066000J01.PNG",
    )
    .unwrap();
    assert_eq!(meta.pmc().unwrap(), 66);
    assert_eq!(meta.colour_filter, "R");
}

#[test]
fn test_pmc_per_product() {
    let cases = [
        ("PS__D077T0637746318_000RBS_N001003600098356103760__J01.MSA", 376),
        ("PE__D077T0637741109_000RSI_N001003600098356100660__J01.CSV", 66),
    ];
    for (name, pmc) in cases {
        assert_eq!(FileNameMeta::parse(name).unwrap().pmc().unwrap(), pmc, "{name}");
    }
}

#[test]
fn test_pmc_requires_pixl_instrument() {
    let meta =
        FileNameMeta::parse("SC__D077T0637741109_000RPM_N001003600098356100640__J01.CSV").unwrap();
    assert!(meta.pmc().is_err());
}

#[test]
fn test_numeric_sol() {
    let meta =
        FileNameMeta::parse("PS__1033_0012345678_000RFS_N001003600098356100640__J01.CSV").unwrap();
    assert_eq!(meta.sclk().unwrap(), 12345678);
    assert_eq!(meta.sol(), "1033");
}

#[test]
fn test_parse_wrong_length() {
    let err = FileNameMeta::parse("hello.txt").unwrap_err();
    assert!(matches!(err, FileNameError::ParseFail { .. }));
}

#[test]
fn test_site_decoding() {
    let ok = [
        ("123", 123),
        ("B01", 1101),
        ("AA9", 3609),
        ("AB8", 3618),
        ("ZZ9", 10359),
        ("AAZ", 10385),
        ("ZZZ", 27935),
        ("0AA", 27936),
        ("0BZ", 27987),
        ("7CZ", 32745),
        ("7DV", 32767),
    ];
    for (code, value) in ok {
        assert_eq!(decode_site_id(code).unwrap(), value, "{code}");
    }

    assert!(matches!(
        decode_site_id("7DW"),
        Err(FileNameError::RangeFail { .. })
    ));
    assert!(matches!(
        decode_site_id("6"),
        Err(FileNameError::ParseFail { .. })
    ));
    assert!(decode_site_id("HELLO").is_err());
}

#[test]
fn test_drive_decoding() {
    let ok = [
        ("0000", 0),
        ("1234", 1234),
        ("9999", 9999),
        ("A000", 10000),
        ("B001", 11001),
        ("Z000", 35000),
        ("AZ99", 38599),
        ("BB99", 38799),
        ("LJ00", 65500),
        ("LJ35", 65535),
    ];
    for (code, value) in ok {
        assert_eq!(decode_drive_id(code).unwrap(), value, "{code}");
    }

    assert!(matches!(
        decode_drive_id("LJ36"),
        Err(FileNameError::RangeFail { .. })
    ));
    for bad in ["300", "A00", "ZAZA"] {
        assert!(
            matches!(decode_drive_id(bad), Err(FileNameError::ParseFail { .. })),
            "{bad}"
        );
    }
}

#[test]
fn test_version_decoding() {
    let ok = [
        ("01", 1),
        ("55", 55),
        ("99", 99),
        ("A0", 100),
        ("AZ", 135),
        ("BA", 146),
        ("BZ", 171),
        ("Z0", 1000),
        ("Z9", 1009),
        ("ZZ", 1035),
    ];
    for (code, value) in ok {
        assert_eq!(decode_version(code).unwrap(), value, "{code}");
    }

    assert!(decode_version("Test").is_err());
    assert!(decode_version("3").is_err());
}

#[test]
fn test_make_comparable_name() {
    let a = make_comparable_name("PE__D140_0654321402_000RXL_N001000011000045300330__J02.CSV");
    let b = make_comparable_name("PE__D140_0654321402_000RXI_N001000011000045300330__J07.CSV");
    assert!(a.is_some());
    assert_eq!(a, b);
    assert_eq!(
        a.unwrap(),
        "PE__D140_0654321402_000____N00100001100004530033___J__.___"
    );
    assert!(make_comparable_name("short.csv").is_none());
}

#[test]
fn test_make_comparable_name_requires_sclk_separator() {
    let name = "PE__D140_0654321402X000RXL_N001000011000045300330__J02.CSV";
    assert_eq!(name.len(), GDS_FILE_NAME_LENGTH);
    assert!(make_comparable_name(name).is_none());
}

#[test]
fn test_latest_file_versions() {
    let files = [
        "PE__D140_0654321406_000RXL_N001000011000045300330__J01.LBL",
        "PE__D140_0654321406_000RXL_N001000011000045300330__J03.LBL",
        "PE__D140_0654321403_000RXL_N001000011000045300330__J01.LBL",
        "PE__D140_0654321408_000RXL_N001000011000045300330__J03.LBL",
        "PE__D140_0654321402_000RXL_N001000011000045300330__J02.CSV",
        "PE__D140_0654321405_000RXL_N001000011000045300330__J01.CSV",
        "PE__D140_0654321404_000RXL_N001000011000045300331__J04.CSV",
        "PE__D140_0654321407_000RXL_N001000011000045300331__J02.CSV",
        "PE__D140_0654321409_000RXL_N001000011000045300331__J04.CSV",
        "PE__D140_0654321401_000RXL_N001000011000045300331__J01.CSV",
    ];

    let latest = latest_file_versions(&files).unwrap();
    let chosen: Vec<&str> = latest.keys().map(String::as_str).collect();
    assert_eq!(
        chosen,
        vec![
            "PE__D140_0654321402_000RXL_N001000011000045300330__J02.CSV",
            "PE__D140_0654321404_000RXL_N001000011000045300331__J04.CSV",
            "PE__D140_0654321406_000RXL_N001000011000045300330__J03.LBL",
        ]
    );
}

#[test]
fn test_latest_file_versions_groups_by_extension() {
    let files = [
        "PS__D077T0637741109_000RFS_N001003600098356100640__J01.CSV",
        "PS__D077T0637741100_000RFS_N001003600098356100640__J01.CSV",
        "PS__D077T0637741050_000RFS_N001003600098356100640__J01.MSA",
        "notes.txt",
    ];

    let latest = latest_file_versions(&files).unwrap();
    assert_eq!(latest.len(), 2);
    assert!(latest.contains_key("PS__D077T0637741100_000RFS_N001003600098356100640__J01.CSV"));
    assert!(latest.contains_key("PS__D077T0637741050_000RFS_N001003600098356100640__J01.MSA"));
}

#[test]
fn test_latest_file_versions_all_unparseable() {
    let err = latest_file_versions(&["a.csv", "b.csv"]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::VersionAmbiguity);

    let empty: [&str; 0] = [];
    assert!(latest_file_versions(&empty).unwrap().is_empty());
}

#[test]
fn test_lowest_sclk() {
    let files = [
        "PS__D077T0637741109_000RFS_N001003600098356100640__J01.CSV",
        "PS__D077T0637741050_000RXL_N001003600098356100640__J01.CSV",
    ];
    let latest = latest_file_versions(&files).unwrap();
    assert_eq!(
        lowest_sclk(&latest).as_deref(),
        Some("PS__D077T0637741050_000RXL_N001003600098356100640__J01.CSV")
    );
    assert_eq!(lowest_sclk(&Default::default()), None);
}

fn versioned_name(sclk: u32, version: u8) -> String {
    format!("PS__D077T{sclk:010}_000RFS_N001003600098356100640__J{version:02}.CSV")
}

proptest! {
    #[test]
    fn prop_latest_picks_highest_version_then_lowest_sclk(
        entries in prop::collection::vec((0u32..1_000_000, 0u8..100), 1..12)
    ) {
        let names: Vec<String> = entries
            .iter()
            .map(|(sclk, version)| versioned_name(*sclk, *version))
            .collect();

        let latest = latest_file_versions(&names).unwrap();
        prop_assert_eq!(latest.len(), 1);

        let max_version = entries.iter().map(|(_, v)| *v).max().unwrap();
        let min_sclk = entries
            .iter()
            .filter(|(_, v)| *v == max_version)
            .map(|(s, _)| *s)
            .min()
            .unwrap();

        let chosen = latest.values().next().unwrap();
        prop_assert_eq!(chosen.version().unwrap(), max_version as i32);
        prop_assert_eq!(chosen.sclk().unwrap(), min_sclk as i32);
    }
}
