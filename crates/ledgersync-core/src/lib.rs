//! LedgerSync Core - Domain model, ports and configuration
//!
//! This crate contains the hexagonal core of the offline sync subsystem:
//! - **Domain entities** - `Record`, `SyncOperation`, `CacheEntry`, `SyncEvent`
//! - **Port definitions** - Traits for adapters: `ILocalStore`, `IRemoteApi`
//! - **Configuration** - YAML-backed [`config::Config`] with validation
//!
//! # Architecture
//!
//! The domain module holds pure data types and their invariants, with no I/O.
//! Ports define the trait interfaces that adapter crates implement
//! (`ledgersync-store` for persistence, `ledgersync-remote` for the REST API).
//! The sync machinery in `ledgersync-sync` only talks to those ports.

pub mod config;
pub mod domain;
pub mod ports;
