//! Fuzz target for marker XML write/read cycles.
//!
//! Any input the parser accepts must be written and read back unchanged.

#![no_main]

use cellcount::error::CellCountError;
use cellcount::model::io_marker_xml::fuzz_roundtrip;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 1024 * 1024 {
        return;
    }

    if let Err(CellCountError::InvalidState(message)) = fuzz_roundtrip(data) {
        panic!("{message}");
    }
});
