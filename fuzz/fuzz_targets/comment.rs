#![no_main]
#[macro_use] extern crate libfuzzer_sys;
extern crate novuspack_core;

fuzz_target!(|data: &[u8]| {
    let _result = novuspack_core::Comment::parse(data);
});
