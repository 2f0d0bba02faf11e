//! The target-specific register knowledge the allocator consumes.

use opal_mcode as mcode;
use opal_mcode::{BlockId, InstrId, PhysicalReg, RegOp, RegUsage, StackSlotId};

use crate::reg_alloc_func::{LiveRangeGroup, RaFunc};

/// A spilled register access the target must patch with a scratch register.
#[derive(Debug, Clone, Copy)]
pub struct SpilledRegUse {
    pub instr: InstrId,
    pub stack_slot: StackSlotId,
    /// How many scratch registers this instruction has consumed already, so
    /// nested spills at one site pick distinct scratches.
    pub spill_tmp_regs: u32,
    pub usage: RegUsage,
}

/// Target-specific operand roles and register classes.
pub trait TargetRegAnalyzer {
    /// Derives every register access of the instruction: uses, defs,
    /// use-defs and kill points.
    fn collect_operands(
        &self,
        func: &mcode::Function,
        block: BlockId,
        instr: InstrId,
    ) -> Vec<RegOp>;

    /// The allocation candidates for the instruction's destination class.
    fn candidates(&self, instr: &mcode::Instruction) -> &'static [PhysicalReg];

    /// Registers that would make adjacent moves trivially removable.
    fn suggest_regs(
        &self,
        func: &mcode::Function,
        ra_func: &RaFunc,
        group: &LiveRangeGroup,
    ) -> Vec<PhysicalReg>;

    /// Whether the instruction clobbers the given physical register.
    fn is_reg_overridden(
        &self,
        func: &mcode::Function,
        instr: &mcode::Instruction,
        reg: PhysicalReg,
    ) -> bool;

    /// Inserts the load/store sequence for a spilled access and returns the
    /// scratch register it used.
    fn insert_spill_reload(
        &self,
        func: &mut mcode::Function,
        block: BlockId,
        spill: SpilledRegUse,
    ) -> PhysicalReg;

    /// Moves whose source equals their destination, removed after
    /// allocation.
    fn is_instr_removable(&self, instr: &mcode::Instruction) -> bool;
}
