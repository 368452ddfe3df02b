// Shelver - core/mod.rs
//
// Core relocation logic: hashing, the transaction log, the safe mover,
// recovery, scanning, classification, and reporting.
// Must NOT depend on: app.

pub mod classifier;
pub mod export;
pub mod hasher;
pub mod journal;
pub mod model;
pub mod mover;
pub mod recovery;
pub mod report;
pub mod scanner;
