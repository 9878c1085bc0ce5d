#![no_main]

//! Fuzz target for the CBOR decoder.
//!
//! Arbitrary bytes must decode or fail with a `CborError`, never panic or
//! recurse past the depth limit. Decoded values must render in diagnostic
//! notation.
//!
//! Run with: cargo +nightly fuzz run fuzz_cbor_decode

use libfuzzer_sys::fuzz_target;
use passgate_core::cbor::decode_one;

fuzz_target!(|data: &[u8]| {
    if let Ok(value) = decode_one(data) {
        let _ = value.to_string();
    }
});
