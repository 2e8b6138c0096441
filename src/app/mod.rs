//! Application module containing the headless simulation loop
//!
//! Drives the GI scene core with a synthetic scene and a moving viewer so
//! the resource management can be observed without a renderer.

mod headless;

pub use headless::run_headless;
