#![no_main]
#[macro_use] extern crate libfuzzer_sys;
extern crate novuspack_core;

fuzz_target!(|data: &[u8]| {
    if let Ok(header) = novuspack_core::Header::from_bytes(data) {
        let _result = header.validate_offsets(data.len() as u64);
    }
});
