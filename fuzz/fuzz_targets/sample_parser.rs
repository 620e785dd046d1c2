#![no_main]

use fibbench::sample::parse_samples;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Must not panic; a successful parse returns exactly the rows asked for
        for offsets in [1, 3, 100] {
            if let Ok(rows) = parse_samples(input, offsets) {
                assert_eq!(rows.len(), offsets);
            }
        }
    }
});
