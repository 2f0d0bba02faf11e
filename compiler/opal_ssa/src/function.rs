//! SSA functions and declarations.

use serde::{Deserialize, Serialize};

use opal_common::LinkedList;

use crate::basic_block::{BasicBlock, BlockId};
use crate::instruction::{InstrId, Instruction};
use crate::types::Type;

pub type VirtualRegister = u32;

/// Calling conventions known to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallingConv {
    None,
    X86_64SysV,
    X86_64MsAbi,
    AArch64Aapcs,
}

/// A function definition: signature, linkage, and a list of basic blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub calling_conv: CallingConv,
    pub params: Vec<Type>,
    pub return_type: Type,
    /// Whether the symbol is visible outside the module.
    pub global: bool,
    pub blocks: LinkedList<BasicBlock>,
    /// Monotonic counter backing `new_virtual_reg`.
    pub next_virtual_reg: VirtualRegister,
}

impl Function {
    pub fn new(
        name: impl Into<String>,
        calling_conv: CallingConv,
        params: Vec<Type>,
        return_type: Type,
    ) -> Self {
        Self {
            name: name.into(),
            calling_conv,
            params,
            return_type,
            global: false,
            blocks: LinkedList::new(),
            next_virtual_reg: 0,
        }
    }

    pub fn new_virtual_reg(&mut self) -> VirtualRegister {
        let reg = self.next_virtual_reg;
        self.next_virtual_reg += 1;
        reg
    }

    pub fn append_block(&mut self, block: BasicBlock) -> BlockId {
        self.blocks.push_back(block)
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        self.blocks.get(id)
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        self.blocks.get_mut(id)
    }

    pub fn entry(&self) -> BlockId {
        self.blocks.first().expect("function has no basic blocks")
    }

    pub fn append_instr(&mut self, block: BlockId, instr: Instruction) -> InstrId {
        self.blocks.get_mut(block).append(instr)
    }

    /// Finds a block by label. The entry block has an empty label.
    pub fn block_by_label(&self, label: &str) -> Option<BlockId> {
        self.blocks
            .iter()
            .find(|(_, block)| block.label == label)
            .map(|(id, _)| id)
    }
}

/// Declaration of an external function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    pub calling_conv: CallingConv,
    pub params: Vec<Type>,
    pub return_type: Type,
}
