//! # Quantum-Chain Test Suite
//!
//! Unified test crate for the provider bridge.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/      # End-to-end bridge flows
//!     └── provider_bridge_flows.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p qc-tests
//!
//! # Bridge flows only
//! cargo test -p qc-tests integration::provider_bridge_flows
//! ```

#![allow(unused_variables)]
#![allow(unused_imports)]
#![allow(dead_code)]

pub mod integration;
