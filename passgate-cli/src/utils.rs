//! Common utility functions shared across CLI commands.

use std::path::Path;

use anyhow::{bail, Context, Result};
use passgate_core::base64url;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::InputEncoding;

/// Read a binary artifact stored as hex, base64url or raw bytes.
pub fn read_binary(path: &Path, encoding: InputEncoding) -> Result<Vec<u8>> {
    let content =
        std::fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
    info!(path = %path.display(), bytes = content.len(), "Read file");
    decode_binary(&content, encoding)
}

pub fn decode_binary(content: &[u8], encoding: InputEncoding) -> Result<Vec<u8>> {
    let text = || {
        std::str::from_utf8(content)
            .map(|s| s.split_whitespace().collect::<String>())
            .context("Failed to parse input: not text")
    };

    match encoding {
        InputEncoding::Raw => Ok(content.to_vec()),
        InputEncoding::Hex => {
            hex::decode(text()?).context("Failed to parse input as hex")
        }
        InputEncoding::Base64url => {
            base64url::decode(&text()?).context("Failed to parse input as base64url")
        }
        InputEncoding::Auto => {
            let Ok(text) = text() else {
                debug!(encoding = "raw", "Detected input encoding");
                return Ok(content.to_vec());
            };
            if text.is_empty() {
                bail!("Failed to parse input: file is empty");
            }
            if let Ok(bytes) = hex::decode(&text) {
                debug!(encoding = "hex", "Detected input encoding");
                return Ok(bytes);
            }
            if let Ok(bytes) = base64url::decode(&text) {
                debug!(encoding = "base64url", "Detected input encoding");
                return Ok(bytes);
            }
            debug!(encoding = "raw", "Detected input encoding");
            Ok(content.to_vec())
        }
    }
}

pub fn read_text(path: &Path, what: &str) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {what} file: {}", path.display()))
}

pub fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let text = read_text(path, what)?;
    serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse {what} file: {}", path.display()))
}

/// Write pretty JSON to `output`, or to stdout when no path is given.
pub fn emit_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    match output {
        Some(path) => {
            std::fs::write(path, format!("{json}\n"))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "Wrote output");
        }
        None => println!("{json}"),
    }
    Ok(())
}

/// Authenticator data flags in the order they appear in the byte.
pub fn describe_flags(flags: u8) -> String {
    const NAMES: [(u8, &str); 6] = [
        (0x01, "UP"),
        (0x04, "UV"),
        (0x08, "BE"),
        (0x10, "BS"),
        (0x40, "AT"),
        (0x80, "ED"),
    ];
    let set: Vec<&str> = NAMES
        .iter()
        .filter(|(bit, _)| flags & bit != 0)
        .map(|(_, name)| *name)
        .collect();
    if set.is_empty() {
        "none".to_string()
    } else {
        set.join(" ")
    }
}
