//! Integration tests for pixl-ingest
//!
//! These tests run deliveries on disk through the full pipeline and read the
//! published outputs back.

use pixl_ingest::error::{ErrorKind, Result};
use pixl_ingest::importer::ImportFormat;
use pixl_ingest::output::{
    codec, AutoShareEntry, CatalogStore, ImageConverter, InsertOutcome, JsonFileCatalog,
    MemoryCatalog, UserGroupList, DATASET_FILE_NAME,
};
use pixl_ingest::pipeline::{ingest, IngestRequest, ScanOverrides};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tempfile::tempdir;

const RTT: &str = "208601602";
const NOW: i64 = 1_700_000_000;

/// Copies instead of converting, so tests need no external program
struct CopyConverter;

impl ImageConverter for CopyConverter {
    fn convert_to_png(&self, src: &Path, dst: &Path) -> Result<()> {
        fs::copy(src, dst)?;
        Ok(())
    }
}

fn gds_name(prefix: &str, prod: &str, pmc: &str, ext: &str) -> String {
    format!("{prefix}0125_0637741562_000{prod}_N0010036{RTT}{pmc}000J01.{ext}")
}

fn write(dir: &Path, relative: &str, content: &str) {
    let path = dir.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

const BEAM_CSV: &str = "Beam location export
PMC,x,y,z,PMC_66_MCC_i,PMC_66_MCC_j
7,0.1,0.2,0.3,10.5,20.5
9,0.4,0.5,0.6,11.5,21.5
";

const SPECTRA_CSV: &str = "SCLK_A,SCLK_B,PMC,real_time_A,real_time_B,live_time_A,live_time_B,XPERCHAN_A,XPERCHAN_B,OFFSET_A,OFFSET_B
100,101,7,1.5,1.6,1.1,1.2,10.0,11.0,5.0,6.0
200,201,9,2.5,2.6,2.1,2.2,10.0,11.0,5.0,6.0
PMC,x,y,z
7,0.1,0.2,0.3
9,0.4,0.5,0.6
A_1,A_2,A_3,A_4,A_5,A_6
1,2,3,4,5,6
0,0,0,0,0,9
B_1,B_2,B_3,B_4,B_5,B_6
6,5,4,3,2,1
9,0,0,0,0,0
";

const BULK_MSA: &str = "#FORMAT      : EMSA/MAS Spectral Data File
#NPOINTS     : 3
#NCOLUMNS    : 2
#XPERCHAN    : 10.0, 11.0
#OFFSET      : 0.5, 0.6
#LIVETIME    : 100.0, 101.0
#REALTIME    : 110.0, 111.0
#DATATYPE    : YY
#SPECTRUM    :
1, 4
2, 5
3, 6
#ENDOFDATA   :
";

const HOUSEKEEPING_CSV: &str = "Housekeeping frame
PMC,temp
7,21.5
9,22
";

/// (relative path, content) of a complete data drive delivery
fn data_drive_files() -> Vec<(String, &'static str)> {
    vec![
        (format!("RXL/{}", gds_name("PE__", "RXL", "0000", "CSV")), BEAM_CSV),
        (format!("RFS/{}", gds_name("PS__", "RFS", "0000", "CSV")), SPECTRA_CSV),
        (format!("RBS/{}", gds_name("PS__", "RBS", "0376", "MSA")), BULK_MSA),
        (format!("RMS/{}", gds_name("PS__", "RMS", "0376", "MSA")), BULK_MSA),
        (format!("RSI/{}", gds_name("PE__", "RSI", "0000", "CSV")), HOUSEKEEPING_CSV),
        (format!("RCM/{}", gds_name("PCW_", "RCM", "0066", "tif")), "context image"),
    ]
}

fn write_data_drive(dir: &Path) {
    for (path, content) in data_drive_files() {
        write(dir, &path, content);
    }
}

fn shared_catalog() -> MemoryCatalog {
    let mut catalog = MemoryCatalog::new();
    catalog
        .upsert_auto_share(AutoShareEntry {
            id: "PIXL_FM".to_string(),
            viewers: UserGroupList::default(),
            editors: UserGroupList {
                user_ids: Vec::new(),
                group_ids: vec!["pixl-science".to_string()],
            },
        })
        .unwrap();
    catalog
}

// ==================== End To End ====================

/// Ingest a flight model delivery and read every output back
#[test]
fn test_ingest_data_drive() {
    let input = tempdir().unwrap();
    write_data_drive(input.path());
    let output = tempdir().unwrap();
    let mut catalog = shared_catalog();

    let request = IngestRequest::new(input.path(), RTT, output.path());
    let report = ingest(&request, &mut catalog, &CopyConverter, NOW).unwrap();

    assert_eq!(report.format.to_string(), "PIXL FM (data drive)");
    assert_eq!(
        report.dataset_path,
        output.path().join("datasets").join(RTT).join(DATASET_FILE_NAME)
    );
    assert_eq!(report.image_count, 1);
    assert_eq!(report.default_image, InsertOutcome::Inserted);

    // Artifact decodes to what was imported
    let bytes = fs::read(&report.dataset_path).unwrap();
    assert_eq!(bytes.len(), report.dataset_bytes);
    let artifact = codec::decode(&bytes).unwrap();
    assert_eq!(artifact.scan_id, RTT);
    assert_eq!(artifact.counts.normal, 4);
    assert_eq!(artifact.counts.bulk, 2);
    let pmcs: Vec<i32> = artifact.locations.iter().map(|l| l.pmc).collect();
    assert_eq!(pmcs, vec![7, 9, 66, 376]);

    // Context image converted under its PNG name
    let png = gds_name("PCW_", "RCM", "0066", "png");
    let published = output.path().join("images").join(RTT).join(&png);
    assert_eq!(fs::read_to_string(published).unwrap(), "context image");
    assert_eq!(artifact.default_context_image, png);

    // Catalog rows
    let summary = catalog.get_scan(RTT).unwrap().unwrap();
    assert_eq!(summary, report.summary);
    assert_eq!(summary.timestamp_unix_sec, NOW);
    assert_eq!(summary.content_count("NormalSpectra"), 4);
    let ownership = catalog.get_ownership(RTT).unwrap().unwrap();
    assert_eq!(ownership.editors.group_ids, vec!["pixl-science"]);
    assert_eq!(catalog.get_default_image(RTT).unwrap(), Some(png.clone()));
    assert!(catalog.get_image(&format!("{RTT}/{png}")).unwrap().is_some());

    // Scratch space is gone
    let leftovers: Vec<_> = fs::read_dir(output.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(leftovers.len(), 2, "unexpected entries: {leftovers:?}");
}

/// A zip delivery with a single root directory imports like the directory
#[test]
fn test_ingest_zip_input() {
    let work = tempdir().unwrap();
    let archive = work.path().join("delivery.zip");
    {
        let mut zip = zip::ZipWriter::new(File::create(&archive).unwrap());
        let options = zip::write::SimpleFileOptions::default();
        for (path, content) in data_drive_files() {
            zip.start_file(format!("delivery/{path}"), options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    let output = work.path().join("out");
    let mut catalog = shared_catalog();
    let report = ingest(
        &IngestRequest::new(&archive, RTT, &output),
        &mut catalog,
        &CopyConverter,
        NOW,
    )
    .unwrap();

    assert!(matches!(report.format, ImportFormat::PixlFm(_)));
    assert!(report.dataset_path.is_file());
}

/// The same delivery always produces the same dataset.bin
#[test]
fn test_ingest_is_deterministic() {
    let input = tempdir().unwrap();
    write_data_drive(input.path());

    let mut outputs = Vec::new();
    for now in [NOW, NOW + 3600] {
        let output = tempdir().unwrap();
        let mut catalog = shared_catalog();
        let request = IngestRequest::new(input.path(), RTT, output.path());
        let report = ingest(&request, &mut catalog, &CopyConverter, now).unwrap();
        outputs.push(fs::read(report.dataset_path).unwrap());
    }
    assert_eq!(outputs[0], outputs[1]);
}

/// Re-ingesting replaces outputs and keeps the scan's history
#[test]
fn test_reingest_replaces_outputs() {
    let input = tempdir().unwrap();
    write_data_drive(input.path());
    let output = tempdir().unwrap();
    let mut catalog = shared_catalog();
    let request = IngestRequest::new(input.path(), RTT, output.path());

    ingest(&request, &mut catalog, &CopyConverter, NOW).unwrap();
    let stale = output.path().join("images").join(RTT).join("stale.png");
    fs::write(&stale, b"old").unwrap();

    let report = ingest(&request, &mut catalog, &CopyConverter, NOW + 60).unwrap();
    assert!(!stale.exists());
    assert_eq!(report.default_image, InsertOutcome::AlreadyPresent);
    assert_eq!(report.summary.timestamp_unix_sec, NOW + 60);
    assert_eq!(report.summary.previous_import_times_unix_sec, vec![NOW]);
}

// ==================== Overrides ====================

#[test]
fn test_overrides_reach_outputs() {
    let input = tempdir().unwrap();
    write_data_drive(input.path());
    let output = tempdir().unwrap();
    let mut catalog = shared_catalog();

    let overrides = ScanOverrides {
        title: Some("Bellegarde".to_string()),
        description: Some("Abrasion patch".to_string()),
        detector_config: Some("PIXL-EM-E2E".to_string()),
        ..Default::default()
    };
    let request = IngestRequest::new(input.path(), RTT, output.path()).with_overrides(overrides);
    let report = ingest(&request, &mut catalog, &CopyConverter, NOW).unwrap();

    let artifact = codec::decode(&fs::read(&report.dataset_path).unwrap()).unwrap();
    assert_eq!(artifact.title, "Bellegarde");
    assert_eq!(artifact.detector_config, "PIXL-EM-E2E");

    let summary = catalog.get_scan(RTT).unwrap().unwrap();
    assert_eq!(summary.title, "Bellegarde");
    assert_eq!(summary.description, "Abrasion patch");
    assert_eq!(summary.instrument_config, "PIXL-EM-E2E");
}

#[test]
fn test_unknown_default_image_fails() {
    let input = tempdir().unwrap();
    write_data_drive(input.path());
    let output = tempdir().unwrap();
    let mut catalog = shared_catalog();

    let overrides = ScanOverrides {
        default_image: Some("missing.png".to_string()),
        ..Default::default()
    };
    let request = IngestRequest::new(input.path(), RTT, output.path()).with_overrides(overrides);
    let err = ingest(&request, &mut catalog, &CopyConverter, NOW).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Integrity);
    assert!(!request.dataset_dir().exists());
}

// ==================== Failures ====================

/// A failed import publishes nothing
#[test]
fn test_failed_import_publishes_nothing() {
    let input = tempdir().unwrap();
    write_data_drive(input.path());
    fs::remove_dir_all(input.path().join("RSI")).unwrap();
    fs::create_dir(input.path().join("RSI")).unwrap();
    let output = tempdir().unwrap();
    let mut catalog = shared_catalog();

    let request = IngestRequest::new(input.path(), RTT, output.path());
    let err = ingest(&request, &mut catalog, &CopyConverter, NOW).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingInput);
    assert!(!output.path().join("datasets").exists());
    assert!(!output.path().join("images").exists());
    assert!(catalog.get_scan(RTT).unwrap().is_none());
}

/// Without an auto-share entry or creator the scan cannot be shared
#[test]
fn test_unshareable_scan_writes_nothing() {
    let input = tempdir().unwrap();
    write_data_drive(input.path());
    let output = tempdir().unwrap();
    let mut catalog = MemoryCatalog::new();

    let request = IngestRequest::new(input.path(), RTT, output.path());
    let err = ingest(&request, &mut catalog, &CopyConverter, NOW).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SideEffect);
    assert_eq!(catalog.scan_count(), 0);
    assert_eq!(catalog.image_count(), 0);
    assert!(!request.dataset_dir().exists());
}

/// A failed move into the output tree leaves the catalog untouched
#[test]
fn test_failed_publish_writes_no_catalog_rows() {
    let input = tempdir().unwrap();
    write_data_drive(input.path());
    let output = tempdir().unwrap();
    fs::write(output.path().join("datasets"), "not a directory").unwrap();
    let mut catalog = shared_catalog();

    let request = IngestRequest::new(input.path(), RTT, output.path());
    let err = ingest(&request, &mut catalog, &CopyConverter, NOW).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SideEffect);
    assert_eq!(catalog.scan_count(), 0);
    assert_eq!(catalog.image_count(), 0);
    assert!(catalog.get_ownership(RTT).unwrap().is_none());
    assert_eq!(catalog.get_default_image(RTT).unwrap(), None);
    assert!(!output.path().join("images").exists());
}

#[test]
fn test_creator_without_auto_share_becomes_editor() {
    let input = tempdir().unwrap();
    write_data_drive(input.path());
    let output = tempdir().unwrap();
    let mut catalog = MemoryCatalog::new();

    let overrides = ScanOverrides {
        creator_user_id: Some("alice".to_string()),
        ..Default::default()
    };
    let request = IngestRequest::new(input.path(), RTT, output.path()).with_overrides(overrides);
    ingest(&request, &mut catalog, &CopyConverter, NOW).unwrap();

    let ownership = catalog.get_ownership(RTT).unwrap().unwrap();
    assert_eq!(ownership.editors.user_ids, vec!["alice"]);
}

#[test]
fn test_wrong_scan_id_is_rejected() {
    let input = tempdir().unwrap();
    write_data_drive(input.path());
    let output = tempdir().unwrap();
    let mut catalog = shared_catalog();

    let request = IngestRequest::new(input.path(), "123", output.path());
    let err = ingest(&request, &mut catalog, &CopyConverter, NOW).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Integrity);
}

// ==================== JSON Catalog ====================

#[test]
fn test_json_catalog_persists_across_runs() {
    let input = tempdir().unwrap();
    write_data_drive(input.path());
    let output = tempdir().unwrap();
    let catalog_path = output.path().join("catalog.json");

    {
        let mut catalog = JsonFileCatalog::open(&catalog_path).unwrap();
        catalog
            .upsert_auto_share(AutoShareEntry {
                id: "PIXL_FM".to_string(),
                ..Default::default()
            })
            .unwrap();
        let request = IngestRequest::new(input.path(), RTT, output.path());
        ingest(&request, &mut catalog, &CopyConverter, NOW).unwrap();
        assert!(!catalog.rev().is_empty());
    }

    let reopened = JsonFileCatalog::open(&catalog_path).unwrap();
    assert!(reopened.get_scan(RTT).unwrap().is_some());
    assert_eq!(reopened.data().scan_count(), 1);
}
