#![no_main]

//! Fuzz target for SearchProgress::from_cbor()
//!
//! Run with: cargo +nightly fuzz run fuzz_progress_cbor

use libfuzzer_sys::fuzz_target;
use smriti_core::SearchProgress;

fuzz_target!(|data: &[u8]| {
    // Malformed snapshots must come back as errors, never panics
    if let Ok(progress) = SearchProgress::from_cbor(data) {
        let _ = progress.percent_complete();
        let _ = progress.next_slice(8);
        let _ = progress.remaining();
    }
});
