//! Subcommand implementations.

pub mod authenticate;
pub mod decode;
pub mod inspect;
pub mod register;
