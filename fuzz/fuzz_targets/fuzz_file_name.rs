#![no_main]

use libfuzzer_sys::fuzz_target;
use pixl_ingest::gds::FileNameMeta;

fuzz_target!(|name: &str| {
    let Ok(meta) = FileNameMeta::parse(name) else {
        return;
    };

    // Field accessors decode sub-fields and may fail, but must not panic
    let _ = meta.pmc();
    let _ = meta.sclk();
    let _ = meta.site_id();
    let _ = meta.drive_id();
    let _ = meta.version();

    // A bare name always re-parses to the same fields
    if name.contains('/') {
        return;
    }
    let rebuilt = meta.to_file_name();
    let reparsed = FileNameMeta::parse(&rebuilt).expect("rebuilt name parses");
    assert_eq!(reparsed, meta);
});
