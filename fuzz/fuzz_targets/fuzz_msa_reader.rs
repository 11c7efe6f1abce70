#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // MSA files are text; anything that isn't UTF-8 is rejected before parsing
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let lines: Vec<&str> = text.lines().collect();

    // Every mode must either parse or return an error, never panic
    for (single_detector, expect_pmc, duplicate_a_as_b) in [
        (false, false, false),
        (true, false, false),
        (false, true, false),
        (false, false, true),
    ] {
        let _ = pixl_ingest::readers::read_msa_lines(
            &lines,
            single_detector,
            expect_pmc,
            duplicate_a_as_b,
        );
    }
});
