//! Emitters for the Opal compiler backend
//!
//! Assembly text is the primary portable interface: NASM syntax for x86-64,
//! GAS syntax for AArch64. The debug emitter renders machine modules for
//! pass-by-pass diagnostics. Object-file emission (ELF/PE) consumes the same
//! machine modules but lives outside this workspace.

pub mod debug_emitter;
pub mod emitter;
pub mod gas_emitter;
pub mod nasm_emitter;

pub use debug_emitter::DebugEmitter;
pub use emitter::Emitter;
pub use gas_emitter::GasEmitter;
pub use nasm_emitter::NasmEmitter;
