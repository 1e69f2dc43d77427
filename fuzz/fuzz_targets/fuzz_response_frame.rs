#![no_main]

use arbitrary::Arbitrary;
use jnge_link::codec::decode_raw;
use jnge_link::frame::{exception_of, validate_response};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    address: u8,
    start: u16,
    target: u16,
    frame: Vec<u8>,
}

fuzz_target!(|input: Input| {
    // Validation and decoding must never panic, whatever comes off the wire
    let _ = validate_response(&input.frame, input.address);
    let _ = exception_of(&input.frame);
    let decoded = decode_raw(&input.frame, input.start, input.target);
    if decoded.is_clean() {
        assert!(input.frame.len() >= 9);
    }
});
