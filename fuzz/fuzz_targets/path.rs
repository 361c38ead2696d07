#![no_main]
#[macro_use] extern crate libfuzzer_sys;
extern crate novuspack_core;

use novuspack_core::path;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(canonical) = path::normalize(text) {
            assert_eq!(path::normalize(&canonical).ok().as_deref(), Some(canonical.as_str()));
        }
    }
});
