#![no_main]

//! Fuzz target for authenticator data and attestation objects.
//!
//! Run with: cargo +nightly fuzz run fuzz_authenticator_data

use libfuzzer_sys::fuzz_target;
use passgate_core::{AttestationObjectLoader, AuthenticatorData};

fuzz_target!(|data: &[u8]| {
    if let Ok(auth_data) = AuthenticatorData::parse(data) {
        // A successful parse accounts for every input byte.
        assert_eq!(auth_data.raw(), data);
        if let Some(attested) = auth_data.attested_credential_data() {
            let _ = attested.public_key();
        }
    }

    let _ = AttestationObjectLoader::default().load_bytes(data);
});
