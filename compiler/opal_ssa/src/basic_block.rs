//! SSA basic blocks.

use serde::{Deserialize, Serialize};

use opal_common::{LinkedList, NodeId};

use crate::function::VirtualRegister;
use crate::instruction::{InstrId, Instruction};
use crate::types::Type;

pub type BlockId = NodeId;

/// A basic block: a label, typed block parameters, and an instruction list.
///
/// Block parameters are the only way values cross block boundaries; a branch
/// to this block carries exactly as many arguments as there are parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicBlock {
    /// Empty for the entry block.
    pub label: String,
    pub param_regs: Vec<VirtualRegister>,
    pub param_types: Vec<Type>,
    pub instrs: LinkedList<Instruction>,
}

impl BasicBlock {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            param_regs: Vec::new(),
            param_types: Vec::new(),
            instrs: LinkedList::new(),
        }
    }

    pub fn with_params(label: impl Into<String>, params: Vec<(VirtualRegister, Type)>) -> Self {
        let mut block = Self::new(label);
        for (reg, ty) in params {
            block.param_regs.push(reg);
            block.param_types.push(ty);
        }
        block
    }

    pub fn append(&mut self, instr: Instruction) -> InstrId {
        self.instrs.push_back(instr)
    }

    pub fn last_instr(&self) -> Option<&Instruction> {
        self.instrs.last().map(|id| self.instrs.get(id))
    }
}
