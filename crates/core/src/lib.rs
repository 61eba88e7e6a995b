//! Shared building blocks for cloudsync
//!
//! This crate provides:
//! - Change records (raw notifications and debounced logical events)
//! - Sync configuration (TOML, with JSON accepted for older files)
//! - BLAKE3 content fingerprints for idempotent uploads

pub mod config;
pub mod event;
pub mod fingerprint;

// Re-exports
pub use config::{DestinationConfig, SyncConfig};
pub use event::{ChangeKind, LogicalEvent, RawChange};
pub use fingerprint::{fingerprint_bytes, fingerprint_file, fingerprint_file_stable, Fingerprint};
