// Shelver - app/mod.rs
//
// Application layer: the engine facade and organize orchestration.
// Dependencies: core and platform layers.

pub mod engine;
pub mod organize;
