//! OTAFlow - over-the-air firmware updates for LED controllers
//!
//! The library holds the update engine; `otaflow-cli` is a thin terminal
//! front end over it.

pub mod engine;
