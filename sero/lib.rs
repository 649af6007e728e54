#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod assemble;
pub mod associate;
pub mod config;
pub mod cutoff;
pub mod io;
pub mod pipeline;
pub mod transform;
pub mod types;

#[path = "../stats/mod.rs"]
pub mod stats;

#[path = "../report/mod.rs"]
pub mod report;
