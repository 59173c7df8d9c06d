//! Testing support
//!
//! Mock broker implementations used by unit and integration tests.

pub mod mocks;

pub use mocks::MockBroker;
