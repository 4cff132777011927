//! Shared core for the mixctl control plane: configuration plus the
//! stateless now-playing reconciliation logic.
//!
//! Everything in here is a pure function over already-fetched inputs (log
//! tails, metadata snapshots, container facts). The daemon crate owns the
//! collaborators that produce those inputs; this crate never performs I/O
//! beyond loading its own config file, so it can be tested entirely with
//! fake text.

pub mod config;
pub mod logscan;
pub mod normalize;
pub mod reconcile;
pub mod runtime;
