//! Exit codes following sysexits.h conventions.
//!
//! Scripts can tell a failed security check apart from a missing file or
//! an unwritable output path.

use passgate_core::WebauthnError;
use serde_json::json;

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// General error (catch-all).
pub const GENERAL_ERROR: i32 = 1;

/// Command line usage error (invalid arguments).
/// Maps to EX_USAGE from sysexits.h.
pub const USAGE_ERROR: i32 = 64;

/// Ceremony rejected or ceremony data malformed.
/// Maps to EX_DATAERR from sysexits.h.
pub const VERIFICATION_FAILED: i32 = 65;

/// Cannot open input file.
/// Maps to EX_NOINPUT from sysexits.h.
pub const INPUT_ERROR: i32 = 66;

/// I/O error (cannot write output file).
/// Maps to EX_IOERR from sysexits.h.
pub const IO_ERROR: i32 = 74;

/// Represents an exit code with optional error context.
#[derive(Debug)]
pub struct ExitCode {
    pub code: i32,
    /// Stable identifier of the failure kind, when one is known.
    pub error_code: Option<&'static str>,
    pub message: Option<String>,
}

impl ExitCode {
    pub const fn success() -> Self {
        Self {
            code: SUCCESS,
            error_code: None,
            message: None,
        }
    }

    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");

        if message.starts_with("Invalid argument") {
            return Self {
                code: USAGE_ERROR,
                error_code: None,
                message: Some(message),
            };
        }

        if let Some(webauthn) = err
            .chain()
            .find_map(|cause| cause.downcast_ref::<WebauthnError>())
        {
            return Self {
                code: VERIFICATION_FAILED,
                error_code: Some(webauthn.error_code()),
                message: Some(message),
            };
        }

        let code = if message.contains("Failed to read") {
            INPUT_ERROR
        } else if message.contains("Failed to write") {
            IO_ERROR
        } else if message.contains("Failed to parse") {
            VERIFICATION_FAILED
        } else {
            GENERAL_ERROR
        };

        Self {
            code,
            error_code: None,
            message: Some(message),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "ok": self.code == SUCCESS,
            "exitCode": self.code,
            "error": self.error_code,
            "message": self.message,
        })
    }
}
