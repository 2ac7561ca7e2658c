#![no_main]

use libfuzzer_sys::fuzz_target;
use tally_core::backup::parse_backup;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = parse_backup(text);
    }
});
