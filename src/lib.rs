//! Purpose: Library crate behind the `diskpart` shell binary and its tests.
//! Exports: `api` (public surface), `core` (entities, tables, engine), `shell`, `notice`.
//! Role: Everything except argument parsing and process setup lives here.
//! Invariants: One `shell::Session` owns an entity store; nothing here is global state.
pub mod api;
pub mod core;
pub mod notice;
pub mod shell;
