//! Base types and error handling.
//!
//! Provides the foundational types shared by every subsystem:
//! - [`CtError`](cterror::CtError): the engine's error taxonomy
//! - [`DerResultExt`](context::DerResultExt): context helpers for DER parsing

pub mod context;
pub mod cterror;

#[cfg(test)]
mod tests;
