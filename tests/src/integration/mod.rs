//! Cross-component flows: page connections through the bridge to the engine.

pub mod provider_bridge_flows;
