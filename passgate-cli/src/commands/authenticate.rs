//! Authenticate command implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use passgate_core::{
    base64url, InMemoryCredentialRepository, PublicKeyCredentialRequestOptions,
    PublicKeyCredentialSource, RelyingParty, RelyingPartyConfig, RequestInfo,
};
use tracing::{error, info};

use super::register::print_rejected;
use crate::utils::{emit_json, read_json, read_text};
use crate::Output;

/// Files and flags naming one captured assertion.
#[derive(Debug)]
pub struct Inputs {
    pub options: PathBuf,
    pub credential: PathBuf,
    pub source: PathBuf,
    pub user_handle: Option<String>,
    pub host: Option<String>,
}

/// Execute the authenticate command.
pub fn execute(inputs: Inputs, out: Option<PathBuf>, output: Output) -> Result<()> {
    let options: PublicKeyCredentialRequestOptions = read_json(&inputs.options, "options")?;
    let credential = read_text(&inputs.credential, "credential")?;
    let stored: PublicKeyCredentialSource = read_json(&inputs.source, "source")?;
    let user_handle = inputs
        .user_handle
        .as_deref()
        .map(base64url::decode)
        .transpose()
        .context("Invalid argument --user-handle")?;

    let mut config = RelyingPartyConfig::from_env().context("Invalid argument in environment")?;
    if let Some(rp_id) = &options.rp_id {
        config.rp_id = rp_id.clone();
    }
    let host = inputs.host.unwrap_or_else(|| config.rp_id.clone());

    let repository = Arc::new(InMemoryCredentialRepository::with_sources([stored.clone()]));
    let rp = RelyingParty::new(config, repository);

    let updated = rp
        .finish_authentication(
            &credential,
            &options,
            &RequestInfo::new(host),
            user_handle.as_deref(),
        )
        .map_err(|err| {
            error!(code = err.error_code(), error = %err, "Authentication rejected");
            if !output.quiet && !output.json {
                print_rejected(&err.to_string());
            }
            err
        })
        .context("Authentication rejected")?;

    info!(
        credential_id = %updated.credential_id_base64url(),
        previous = stored.counter,
        counter = updated.counter,
        "Assertion verified"
    );
    report(&stored, &updated, out.as_deref(), output)
}

fn report(
    stored: &PublicKeyCredentialSource,
    updated: &PublicKeyCredentialSource,
    out: Option<&Path>,
    output: Output,
) -> Result<()> {
    if output.json || out.is_some() {
        emit_json(updated, out)?;
    }
    if output.quiet || output.json {
        return Ok(());
    }

    println!();
    println!("{}", "Assertion verified".green().bold());
    println!();
    println!(
        "   {} {}",
        "Credential ID:".dimmed(),
        updated.credential_id_base64url()
    );
    println!(
        "   {} {} -> {}",
        "Sign count:".dimmed(),
        stored.counter,
        updated.counter
    );
    if updated.is_legacy_u2f() {
        println!("   {} {}", "Key:".dimmed(), "legacy U2F".yellow());
    }
    match out {
        Some(path) => println!("   {} {}", "Source saved:".dimmed(), path.display()),
        None => {
            println!();
            emit_json(updated, None)?;
        }
    }
    Ok(())
}
