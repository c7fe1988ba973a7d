//! Integration tests for ledgersync-remote
//!
//! Uses wiremock to simulate the ERP backend and verifies end-to-end
//! behavior of the REST client and the connectivity check.

mod common;

mod test_client;
mod test_health;
