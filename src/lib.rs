//! Purpose: Library crate for indexed batch submission to a ledger service.
//! Exports: `api` (client, transport, item specs, batch results, errors).
//! Role: Backs the `ledgerbatch` CLI and its mock ledger server.
//! Invariants: Batch results are keyed by original request position.
//! Invariants: Core modules are pure transformations; no state survives a call.
pub mod api;
pub(crate) mod core;
