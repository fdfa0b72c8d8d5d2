//! # colloquy-store
//!
//! Memory collaborator for Colloquy.
//!
//! Conversations are purely in-memory; anything that must outlive one goes
//! through a [`MemoryStore`]:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Memory component (action leaves)       │
//! ├─────────────────────────────────────────┤
//! │  MemoryStore trait                      │
//! │    InMemoryStore  (DashMap)             │
//! │    JsonFileStore  (JSON file, auto-dump)│
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use colloquy_store::{JsonFileStore, Memory};
//!
//! let store = JsonFileStore::open("data/memory.json").await?;
//! let memory = Memory::new(Arc::new(store));
//! let remember = memory.set_user_var("name", name_expr)?;
//! ```

pub mod component;
pub mod error;
pub mod memory;

// ── re-exports ───────────────────────────────────────────────────────

pub use component::Memory;
pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryStore, JsonFileStore, MemoryStore};
