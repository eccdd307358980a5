//! stager - staged-update installer for a managed product distribution.
//!
//! stager keeps one product installation current against a remote version
//! feed. It supports two ways of updating:
//!
//! - **Direct install**: resolve a version from the feed, download and
//!   verify its archive, optionally move the previous tree to a backup,
//!   and extract the new tree into place.
//! - **Staged update cycle**: an unattended `check-for-update` stages a
//!   newer build next to an update ledger without touching the live tree;
//!   a later `apply-upgrade` performs the swap. A cross-process lock with
//!   zombie recovery keeps concurrent runs out of each other's way.
//!
//! # Core Modules
//!
//! - [`feed`] - Feed parsing (hosted-release JSON, JSON Lines, HTML
//!   listings) and the version catalog
//! - [`installer`] - The staging pipeline, the update session, and the
//!   transport/extractor seams
//! - [`ledger`] - The `update.status` ledger recording check outcomes
//! - [`lock`] - The cross-process update lock
//! - [`config`] - The `~/.stager/config.toml` configuration
//! - [`cli`] - clap-based command-line surface
//! - [`core`] - Error types and exit-code mapping
//! - [`utils`] - Platform paths and filesystem helpers

pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod feed;
pub mod installer;
pub mod ledger;
pub mod lock;
pub mod utils;
