//! Helpers shared by the engine context

pub mod health;
pub mod logging;
