//! Machine basic blocks.

use opal_common::{LinkedList, NodeId};

use crate::instruction::{InstrId, Instruction};
use crate::register::VirtualReg;

pub type BlockId = NodeId;

/// A machine basic block: label, block-parameter registers carried over
/// from SSA, an instruction list, and CFG/dominator edges projected from
/// the SSA function.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    /// Empty for the entry block.
    pub label: String,
    pub params: Vec<VirtualReg>,
    pub instrs: LinkedList<Instruction>,
    pub predecessors: Vec<BlockId>,
    pub successors: Vec<BlockId>,
    pub domtree_parent: Option<BlockId>,
    pub domtree_children: Vec<BlockId>,
}

impl BasicBlock {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            params: Vec::new(),
            instrs: LinkedList::new(),
            predecessors: Vec::new(),
            successors: Vec::new(),
            domtree_parent: None,
            domtree_children: Vec::new(),
        }
    }

    pub fn append(&mut self, instr: Instruction) -> InstrId {
        self.instrs.push_back(instr)
    }

    pub fn get(&self, id: InstrId) -> &Instruction {
        self.instrs.get(id)
    }

    pub fn get_mut(&mut self, id: InstrId) -> &mut Instruction {
        self.instrs.get_mut(id)
    }
}
