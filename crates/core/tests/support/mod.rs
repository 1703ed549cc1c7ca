//! Shared test helpers for `outpost-core` integration tests.
//!
//! In-memory mocks for every port plus a harness that wires them into a
//! ready-to-use engine.

#![allow(dead_code)]

pub mod harness;
pub mod mocks;
