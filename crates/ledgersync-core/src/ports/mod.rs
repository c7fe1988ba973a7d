//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! offline sync core. Ports are interfaces that the sync machinery depends
//! on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`ILocalStore`] - Durable, collection-partitioned persistence and the sync queue
//! - [`IRemoteApi`] - REST calls against the ERP backend

pub mod local_store;
pub mod remote_api;

pub use local_store::{ILocalStore, StorageEstimate};
pub use remote_api::IRemoteApi;
