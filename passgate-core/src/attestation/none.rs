//! `none` attestation: the authenticator offers no statement at all.

use crate::cbor::CborValue;
use crate::error::{Result, WebauthnError};

use super::AttestationStatement;

pub(super) fn load(att_stmt: CborValue) -> Result<AttestationStatement> {
    if att_stmt.as_map().is_some_and(|m| !m.is_empty()) {
        return Err(WebauthnError::attestation(
            "none attestation statement must be empty",
        ));
    }
    Ok(AttestationStatement::none())
}

pub(super) fn is_valid(statement: &AttestationStatement) -> bool {
    statement.att_stmt.as_map().is_some_and(<[_]>::is_empty)
}
