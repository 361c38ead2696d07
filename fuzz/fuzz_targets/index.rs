#![no_main]
#[macro_use] extern crate libfuzzer_sys;
extern crate novuspack_core;

fuzz_target!(|data: &[u8]| {
    if let Ok(index) = novuspack_core::FileIndex::from_bytes(data) {
        assert_eq!(index.to_bytes().ok().map(|b| b.len() as u64), Some(index.encoded_size()));
    }
});
