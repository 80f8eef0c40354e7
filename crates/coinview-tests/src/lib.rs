//! Scenario and property tests for the coinview ledger.
//!
//! Tests drive the reorg engine over generated chains and forks and check
//! that disconnecting is the exact inverse of connecting.

pub mod helpers;
