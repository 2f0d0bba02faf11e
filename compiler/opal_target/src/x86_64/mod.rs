//! The x86-64 target.

pub mod addr_lowering;
pub mod const_lowering;
pub mod ms_abi_calling_conv;
pub mod opcode;
pub mod peephole_pass;
pub mod reg_analyzer;
pub mod register;
pub mod ssa_lowerer;
pub mod sys_v_calling_conv;

pub use ms_abi_calling_conv::MsAbiCallingConv;
pub use peephole_pass::X64PeepholePass;
pub use reg_analyzer::X64RegAnalyzer;
pub use ssa_lowerer::X64SsaLowerer;
pub use sys_v_calling_conv::SysVCallingConv;
