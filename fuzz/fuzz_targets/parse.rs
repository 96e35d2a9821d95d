#![no_main]
use hbskit::{parser, Delimiters};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let _ = parser::parse(data, &Delimiters::default());
});
