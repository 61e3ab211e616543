#![no_main]

//! Fuzz target for SearchProgress::from_token()

use libfuzzer_sys::fuzz_target;
use smriti_core::SearchProgress;

fuzz_target!(|data: &[u8]| {
    if let Ok(token) = std::str::from_utf8(data) {
        let _ = SearchProgress::from_token(token);
    }
});
