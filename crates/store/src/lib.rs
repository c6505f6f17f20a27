//! Corner Shop Store - persistence and business rules for a small shop.
//!
//! # Architecture
//!
//! ```text
//! services  (orders, accounts, verification codes, notifications)
//!    |
//! db        (typed repositories, per-collection write locks)
//!    |
//! backend   (remote key-value store or local JSON files)
//! ```
//!
//! [`state::AppState`] is built once at startup from [`config::StoreConfig`]
//! and owns the selected backend. The [`settings`] module evaluates delivery
//! fees and promo codes from the stored settings; it does no I/O itself.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod config;
pub mod db;
pub mod models;
pub mod rate_limit;
pub mod services;
pub mod settings;
pub mod state;

pub use backend::{Backend, BackendKind, Collection, StoreError};
pub use config::{ConfigError, StoreConfig};
pub use db::{Collections, RepositoryError};
pub use state::AppState;
