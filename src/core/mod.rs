//! Core types shared across the update engine.
//!
//! Currently this is the error taxonomy; everything else lives in the
//! domain modules ([`crate::feed`], [`crate::lock`], [`crate::ledger`],
//! [`crate::installer`]).

pub mod error;

pub use error::{StagerError, exit_code_for};
