#![no_main]

//! Fuzz target for `PublicKeyCredentialLoader::load`.
//!
//! Run with: cargo +nightly fuzz run fuzz_credential_loader

use libfuzzer_sys::fuzz_target;
use passgate_core::PublicKeyCredentialLoader;

fuzz_target!(|data: &[u8]| {
    if let Ok(json) = std::str::from_utf8(data) {
        let _ = PublicKeyCredentialLoader::default().load(json);
    }
});
