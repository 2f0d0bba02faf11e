//! Machine instructions.

use bitflags::bitflags;
use smallvec::SmallVec;

use crate::operand::Operand;
use crate::register::Register;

/// A numeric target opcode. Each target defines its own enumeration;
/// pseudo-opcodes are negative and shared across targets.
pub type Opcode = i32;

pub type InstrId = opal_common::NodeId;

/// Pseudo-opcodes understood by all targets. Assembly emitters skip them;
/// they feed unwind-info derivation.
pub mod pseudo_opcode {
    use super::Opcode;

    pub const EH_PUSHREG: Opcode = -1;
    pub const EH_ALLOCSTACK: Opcode = -2;
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InstrFlags: u8 {
        /// Stores an incoming argument into its stack slot.
        const ARG_STORE = 1 << 0;
        /// Allocates the stack frame in the prolog.
        const ALLOCA = 1 << 1;
        /// Moves an outgoing argument (call or branch) into place.
        const CALL_ARG = 1 << 2;
        const CALL = 1 << 3;
        const FLOAT = 1 << 4;
    }
}

/// How an instruction accesses a register, as seen by the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegUsage {
    Use,
    Def,
    UseDef,
    /// The register is clobbered at this point without a meaningful value
    /// (caller-saved registers at a call site).
    Kill,
}

/// Register access attached to an instruction by the register analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegOp {
    pub reg: Register,
    pub usage: RegUsage,
}

/// A single machine instruction. Operand 0 is the destination for
/// instructions that have one.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operands: SmallVec<[Operand; 3]>,
    pub flags: InstrFlags,
    /// Extra register accesses not visible in the operands (e.g. return
    /// registers defined by a call).
    pub reg_ops: Vec<RegOp>,
}

impl Instruction {
    pub fn new(opcode: Opcode, operands: Vec<Operand>) -> Self {
        Self {
            opcode,
            operands: operands.into(),
            flags: InstrFlags::empty(),
            reg_ops: Vec::new(),
        }
    }

    pub fn with_flags(opcode: Opcode, operands: Vec<Operand>, flags: InstrFlags) -> Self {
        Self {
            opcode,
            operands: operands.into(),
            flags,
            reg_ops: Vec::new(),
        }
    }

    pub fn operand(&self, index: usize) -> &Operand {
        &self.operands[index]
    }

    pub fn operand_mut(&mut self, index: usize) -> &mut Operand {
        &mut self.operands[index]
    }

    pub fn has_dest(&self) -> bool {
        !self.operands.is_empty()
    }

    pub fn dest(&self) -> &Operand {
        &self.operands[0]
    }

    pub fn is_flag(&self, flag: InstrFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn add_reg_op(&mut self, reg: Register, usage: RegUsage) {
        self.reg_ops.push(RegOp { reg, usage });
    }
}
