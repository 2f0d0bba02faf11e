//! Machine-code representation (MIR) for the Opal compiler backend
//!
//! A target-neutral container for per-target instructions: functions, basic
//! blocks, operands, stack frames, symbols and relocations. Instructions use
//! numeric opcodes defined by the targets; virtual registers survive until
//! register allocation rewrites them to physical registers or stack slots.

pub mod basic_block;
pub mod calling_convention;
pub mod function;
pub mod global;
pub mod instruction;
pub mod module;
pub mod operand;
pub mod register;
pub mod stack_frame;

pub use basic_block::{BasicBlock, BlockId};
pub use calling_convention::{ArgStorage, CallingConvention, ReturnMethod};
pub use function::{Function, ParamStorage, Parameter, UnwindInfo};
pub use global::{Global, GlobalValue};
pub use instruction::{
    pseudo_opcode, InstrFlags, InstrId, Instruction, Opcode, RegOp, RegUsage,
};
pub use module::{AddrTable, Module};
pub use operand::{
    AArch64Address, AArch64Condition, AddrOffset, Directive, IndirectAddress, Operand,
    OperandKind, Relocation, Symbol,
};
pub use stack_frame::{
    ArgStoreStackRegion, CallArgStackRegion, GenericStackRegion, ImplicitStackRegion, StackFrame,
    StackRegions, StackSlot, StackSlotKind,
};
pub use register::{PhysicalReg, Register, StackSlotId, VirtualReg};
