//! Platform adapters
//!
//! The engine never talks to OS networking APIs directly. The host forwards
//! its platform callbacks into [`ManualConnectivityProbe`].

pub mod connectivity;

pub use connectivity::ManualConnectivityProbe;
