//! Fuzz target for the marker JSON reader.

#![no_main]

use cellcount::model::io_json::from_json_str;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    if let Ok(text) = std::str::from_utf8(data) {
        let _ = from_json_str(text);
    }
});
