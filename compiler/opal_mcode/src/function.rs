//! Machine functions.

use opal_common::LinkedList;
use opal_ssa::Type;

use crate::basic_block::{BasicBlock, BlockId};
use crate::calling_convention::CallingConvention;
use crate::register::{Register, StackSlotId};
use crate::stack_frame::StackFrame;

/// Where a lowered parameter lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamStorage {
    Reg(Register),
    Slot(StackSlotId),
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub ty: Type,
    pub storage: ParamStorage,
}

/// Minimal unwind information derived from the prolog.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnwindInfo {
    pub alloc_size: u32,
}

/// A machine function under construction and transformation.
pub struct Function {
    pub name: String,
    pub calling_conv: &'static dyn CallingConvention,
    pub parameters: Vec<Parameter>,
    /// Whether the return value travels through a hidden pointer argument.
    pub uses_sret: bool,
    pub blocks: LinkedList<BasicBlock>,
    pub stack_frame: StackFrame,
    pub unwind_info: UnwindInfo,
}

impl Function {
    pub fn new(name: impl Into<String>, calling_conv: &'static dyn CallingConvention) -> Self {
        Self {
            name: name.into(),
            calling_conv,
            parameters: Vec::new(),
            uses_sret: false,
            blocks: LinkedList::new(),
            stack_frame: StackFrame::new(),
            unwind_info: UnwindInfo::default(),
        }
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
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .field("blocks", &self.blocks.len())
            .finish_non_exhaustive()
    }
}
