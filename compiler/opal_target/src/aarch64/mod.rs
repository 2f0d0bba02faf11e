//! The AArch64 target.

pub mod aapcs_calling_conv;
pub mod encoding_info;
pub mod immediate;
pub mod opcode;
pub mod reg_analyzer;
pub mod register;
pub mod ssa_lowerer;

pub use aapcs_calling_conv::AapcsCallingConv;
pub use reg_analyzer::AArch64RegAnalyzer;
pub use ssa_lowerer::AArch64SsaLowerer;
