// src/hal/mod.rs
//! Hardware abstraction for the opened streaming session

pub mod traits;
pub mod types;
pub mod simulator;


pub use traits::*;
pub use types::*;
