//! Last-resort register allocation for post-layout fix-ups.
//!
//! Picks a scratch register that is free across a short instruction range,
//! after the main allocator has already run. Used by calling-convention
//! fix-ups that must materialise out-of-range stack offsets.

use opal_mcode as mcode;
use opal_mcode::{BlockId, InstrFlags, InstrId, PhysicalReg};

use crate::reg_analyzer::TargetRegAnalyzer;

#[derive(Debug, Clone, Copy)]
pub struct Range {
    pub block: BlockId,
    pub start: InstrId,
    pub end: InstrId,
}

pub struct LateRegAlloc<'a> {
    func: &'a mcode::Function,
    range: Range,
    analyzer: &'a dyn TargetRegAnalyzer,
}

impl<'a> LateRegAlloc<'a> {
    pub fn new(
        func: &'a mcode::Function,
        range: Range,
        analyzer: &'a dyn TargetRegAnalyzer,
    ) -> Self {
        Self {
            func,
            range,
            analyzer,
        }
    }

    /// Returns a register that nothing in the range touches.
    ///
    /// Running out here means the spill reservation is broken; that is a
    /// compiler bug and not recoverable.
    pub fn alloc(&self) -> PhysicalReg {
        let block = self.func.block(self.range.block);
        let producer = block.get(self.range.start);

        for &candidate in self.analyzer.candidates(producer) {
            if self.check_alloc(candidate) {
                return candidate;
            }
        }

        panic!(
            "register allocator is out of registers in function {}",
            self.func.name
        );
    }

    fn check_alloc(&self, reg: PhysicalReg) -> bool {
        let block = self.func.block(self.range.block);

        let mut cursor = Some(self.range.start);
        while let Some(id) = cursor {
            let instr = block.get(id);

            if self.analyzer.is_reg_overridden(self.func, instr, reg) {
                return false;
            }

            // Argument moves reserve their register until the call.
            if instr.is_flag(InstrFlags::CALL_ARG)
                && instr.has_dest()
                && instr.dest().is_physical_reg()
                && instr.dest().physical_reg() == reg
            {
                return false;
            }

            if id == self.range.end {
                break;
            }
            cursor = block.instrs.next(id);
        }

        // Walk backwards: a pending argument move before the range start
        // also reserves its register, until the preceding call boundary.
        let mut cursor = Some(self.range.end);
        while let Some(id) = cursor {
            let instr = block.get(id);

            if instr.is_flag(InstrFlags::CALL_ARG)
                && instr.has_dest()
                && instr.dest().is_physical_reg()
                && instr.dest().physical_reg() == reg
            {
                return false;
            }

            if instr.flags == InstrFlags::CALL {
                break;
            }

            if id == self.range.start {
                break;
            }
            cursor = block.instrs.prev(id);
        }

        true
    }
}
