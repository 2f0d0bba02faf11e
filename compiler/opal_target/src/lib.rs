//! Target implementations for the Opal compiler backend
//!
//! Each architecture provides instruction selection, calling conventions,
//! a register analyzer for the allocator, and optional machine passes.

pub mod aarch64;
pub mod description;
pub mod target;
pub mod x86_64;

pub use description::{Architecture, CodeModel, Environment, OperatingSystem, TargetDescription};
pub use target::Target;
