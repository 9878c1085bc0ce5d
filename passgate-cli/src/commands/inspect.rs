//! Inspect command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use passgate_core::metadata::lookup_authenticator;
use passgate_core::{AttestationObject, AttestationObjectLoader, AuthenticatorData, CoseKey};
use serde_json::{json, Value};
use tracing::debug;

use crate::utils::{describe_flags, read_binary};
use crate::{InputEncoding, Output};

/// Execute the inspect command.
pub fn execute(file: PathBuf, encoding: InputEncoding, output: Output) -> Result<()> {
    let bytes = read_binary(&file, encoding)?;

    let summary = match AttestationObjectLoader::default().load_bytes(&bytes) {
        Ok(object) => {
            debug!(fmt = object.fmt(), "Input is an attestation object");
            attestation_summary(&object)
        }
        Err(object_err) => match AuthenticatorData::parse(&bytes) {
            Ok(auth_data) => {
                debug!("Input is authenticator data");
                json!({ "authenticatorData": auth_data_summary(&auth_data) })
            }
            Err(_) => {
                return Err(object_err)
                    .context("Failed to parse input as attestation object or authenticator data")
            }
        },
    };

    if output.json {
        println!("{summary}");
    } else if !output.quiet {
        print_summary(&summary);
    }

    Ok(())
}

fn attestation_summary(object: &AttestationObject) -> Value {
    json!({
        "fmt": object.fmt(),
        "attestationType": object.statement.attestation_type.as_str(),
        "certificates": object.statement.trust_path.certificates().len(),
        "authenticatorData": auth_data_summary(&object.auth_data),
    })
}

fn auth_data_summary(auth_data: &AuthenticatorData) -> Value {
    let mut summary = json!({
        "rpIdHash": hex::encode(auth_data.rp_id_hash()),
        "flags": describe_flags(auth_data.flags()),
        "signCount": auth_data.sign_count(),
    });

    if let Some(attested) = auth_data.attested_credential_data() {
        let key = CoseKey::from_slice(&attested.credential_public_key).ok();
        summary["attestedCredential"] = json!({
            "aaguid": attested.aaguid.hyphenated().to_string(),
            "authenticator": lookup_authenticator(&attested.aaguid).map(|d| d.description),
            "credentialId": passgate_core::base64url::encode(&attested.credential_id),
            "algorithm": key.as_ref().map(|k| k.algorithm),
            "keyType": key.as_ref().map(CoseKey::key_type),
        });
    }
    if let Some(extensions) = auth_data.extensions() {
        summary["extensions"] = json!(extensions.to_string());
    }
    summary
}

fn print_summary(summary: &Value) {
    println!();
    if let Some(fmt) = summary["fmt"].as_str() {
        println!("{}", "Attestation object".cyan().bold());
        println!("   {} {}", "Format:".dimmed(), fmt);
        println!(
            "   {} {}",
            "Attestation type:".dimmed(),
            summary["attestationType"].as_str().unwrap_or("-")
        );
        println!(
            "   {} {}",
            "Certificates:".dimmed(),
            summary["certificates"]
        );
        println!();
    }

    let auth_data = &summary["authenticatorData"];
    println!("{}", "Authenticator data".cyan().bold());
    println!(
        "   {} {}",
        "RP ID hash:".dimmed(),
        auth_data["rpIdHash"].as_str().unwrap_or("-")
    );
    println!(
        "   {} {}",
        "Flags:".dimmed(),
        auth_data["flags"].as_str().unwrap_or("-")
    );
    println!("   {} {}", "Sign count:".dimmed(), auth_data["signCount"]);

    let attested = &auth_data["attestedCredential"];
    if attested.is_object() {
        println!(
            "   {} {}",
            "AAGUID:".dimmed(),
            attested["aaguid"].as_str().unwrap_or("-")
        );
        if let Some(name) = attested["authenticator"].as_str() {
            println!("   {} {}", "Authenticator:".dimmed(), name.green());
        }
        println!(
            "   {} {}",
            "Credential ID:".dimmed(),
            attested["credentialId"].as_str().unwrap_or("-")
        );
        println!("   {} {}", "Algorithm:".dimmed(), attested["algorithm"]);
    }
    if let Some(extensions) = auth_data["extensions"].as_str() {
        println!("   {} {}", "Extensions:".dimmed(), extensions);
    }
}
