//! Backend pipeline driver for the Opal compiler
//!
//! Takes a finished SSA module from the front-end and drives it through
//! lowering, the machine-pass pipeline, and assembly emission. The whole
//! pipeline is single-threaded and linear: one SSA module in, one assembly
//! text out.

pub mod pipeline;

pub use pipeline::{build_machine_module, compile_module, CompileOptions, PassRunner};
