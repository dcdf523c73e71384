//! # Profiled - Player and Server Profile Persistence
//!
//! Profiled keeps per-player and server-wide keyed data in memory and persists
//! it through a pluggable storage backend. Switching backends is an online
//! operation: with migration enabled, the next start copies everything from
//! the old backend to the new one and asks the host to restart.
//!
//! ## Features
//!
//! - **Typed Keys**: namespaced keys with a declared value type, default and scope.
//! - **Three Backends**: flat JSON file, SQLite, and sled documents behind one trait.
//! - **Profile Cache**: one live profile per entity, lazily populated, explicitly persisted.
//! - **Backend Migration**: manifest-driven full copy between backends at startup.
//! - **Config Trees**: nested key-value trees with dotted paths, typed getters and
//!   placeholder injection, encoded as JSON or TOML.
//!
//! ## Module Organization
//!
//! - [`config`] - application settings and the dynamic config tree
//! - [`data`] - keys, data handlers, profiles, profile handler and migration
//! - [`errors`] - the shared [`DataError`] type
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │  ProfileHandler  │ ← profile cache, manifest, migration
//! └──────────────────┘
//!          │
//! ┌──────────────────┐
//! │     Profile      │ ← per-entity value cache
//! └──────────────────┘
//!          │
//! ┌──────────────────┐
//! │   DataHandler    │ ← json | sqlite | sled
//! └──────────────────┘
//! ```

pub mod config;
pub mod data;
pub mod errors;

pub use errors::DataError;
