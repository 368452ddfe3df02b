// Shelver - platform/mod.rs
//
// Platform abstraction layer: filesystem durability primitives and
// configuration / data directory resolution.
// Must NOT depend on: app.

pub mod config;
pub mod fs;
