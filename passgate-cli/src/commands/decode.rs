//! Decode command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use passgate_core::cbor::decode_one;
use passgate_core::WebauthnError;
use serde_json::json;
use tracing::info;

use crate::utils::read_binary;
use crate::{InputEncoding, Output};

/// Execute the decode command.
pub fn execute(file: PathBuf, encoding: InputEncoding, output: Output) -> Result<()> {
    let bytes = read_binary(&file, encoding)?;

    let value = decode_one(&bytes)
        .map_err(WebauthnError::from)
        .context("Failed to decode CBOR")?;
    info!(bytes = bytes.len(), kind = value.type_name(), "Decoded CBOR item");

    if output.json {
        println!(
            "{}",
            json!({
                "type": value.type_name(),
                "bytes": bytes.len(),
                "diagnostic": value.to_string(),
            })
        );
    } else if !output.quiet {
        println!(
            "{} {} ({} bytes)",
            "CBOR".cyan().bold(),
            value.type_name(),
            bytes.len()
        );
        println!("{value}");
    }

    Ok(())
}
