//! Register command implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use passgate_core::{
    InMemoryCredentialRepository, PublicKeyCredentialCreationOptions, PublicKeyCredentialSource,
    RelyingParty, RelyingPartyConfig, RequestInfo,
};
use tracing::{error, info};

use crate::utils::{emit_json, read_json, read_text};
use crate::Output;

/// Execute the register command.
pub fn execute(
    options_path: PathBuf,
    credential_path: PathBuf,
    host: Option<String>,
    out: Option<PathBuf>,
    output: Output,
) -> Result<()> {
    let options: PublicKeyCredentialCreationOptions = read_json(&options_path, "options")?;
    let credential = read_text(&credential_path, "credential")?;

    let mut config = RelyingPartyConfig::from_env().context("Invalid argument in environment")?;
    if let Some(rp_id) = &options.rp.id {
        config.rp_id = rp_id.clone();
    }
    let host = host.unwrap_or_else(|| config.rp_id.clone());
    let rp = RelyingParty::new(
        config,
        Arc::new(InMemoryCredentialRepository::with_sources(Vec::new())),
    );

    let source = rp
        .finish_registration(&credential, &options, &RequestInfo::new(host))
        .map_err(|err| {
            error!(code = err.error_code(), error = %err, "Registration rejected");
            if !output.quiet && !output.json {
                print_rejected(&err.to_string());
            }
            err
        })
        .context("Registration rejected")?;

    info!(
        credential_id = %source.credential_id_base64url(),
        attestation_type = %source.attestation_type,
        "Registration verified"
    );
    report(&source, out.as_deref(), output)
}

fn report(source: &PublicKeyCredentialSource, out: Option<&Path>, output: Output) -> Result<()> {
    if output.json || out.is_some() {
        emit_json(source, out)?;
    }
    if output.quiet || output.json {
        return Ok(());
    }

    println!();
    println!("{}", "Registration verified".green().bold());
    println!();
    println!(
        "   {} {}",
        "Credential ID:".dimmed(),
        source.credential_id_base64url()
    );
    println!("   {} {}", "Attestation:".dimmed(), source.attestation_type);
    println!("   {} {}", "AAGUID:".dimmed(), source.aaguid.hyphenated());
    if let Some(ui) = &source.other_ui {
        println!("   {} {}", "Authenticator:".dimmed(), ui.description);
    }
    println!("   {} {}", "Sign count:".dimmed(), source.counter);
    match out {
        Some(path) => println!("   {} {}", "Source saved:".dimmed(), path.display()),
        None => {
            println!();
            emit_json(source, None)?;
        }
    }
    Ok(())
}

pub(crate) fn print_rejected(reason: &str) {
    println!();
    println!("{}", "REJECTED".red().bold());
    println!("   {} {}", "Reason:".dimmed(), reason.red());
}
