//! Fuzz target for marker XML parsing.
//!
//! This fuzzer feeds arbitrary byte sequences to the marker XML parser,
//! checking for panics, crashes, or hangs.

#![no_main]

use cellcount::model::io_marker_xml::from_marker_xml_slice;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Cap input size to avoid excessive memory usage.
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let _ = from_marker_xml_slice(data);
});
