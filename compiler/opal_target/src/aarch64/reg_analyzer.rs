//! Operand roles and register classes for the AArch64 allocator.

use opal_codegen::{LiveRangeGroup, RaFunc, SpilledRegUse, TargetRegAnalyzer};
use opal_mcode as mcode;
use opal_mcode::{
    BlockId, InstrFlags, InstrId, Instruction, Operand, OperandKind, PhysicalReg, RegOp,
    RegUsage, Register,
};

use crate::aarch64::opcode;
use crate::aarch64::register::*;

pub struct AArch64RegAnalyzer;

/// X18 is the platform register, X27/X28 are spill scratches, X29/X30 hold
/// the frame pointer and link register.
const GENERAL_PURPOSE_CANDIDATES: [PhysicalReg; 25] = [
    R0, R1, R2, R3, R4, R5, R6, R7, R9, R10, R11, R12, R13, R14, R15, R16, R17, R19, R20, R21,
    R22, R23, R24, R25, R26,
];

/// V30/V31 are spill scratches.
const FLOAT_CANDIDATES: [PhysicalReg; 30] = [
    V0, V1, V2, V3, V4, V5, V6, V7, V8, V9, V10, V11, V12, V13, V14, V15, V16, V17, V18, V19,
    V20, V21, V22, V23, V24, V25, V26, V27, V28, V29,
];

impl AArch64RegAnalyzer {
    pub const INSTANCE: AArch64RegAnalyzer = AArch64RegAnalyzer;

    fn is_move_opcode(machine_opcode: mcode::Opcode) -> bool {
        machine_opcode == opcode::MOV || machine_opcode == opcode::FMOV
    }

    fn is_float_instr(instr: &Instruction, usage: RegUsage) -> bool {
        match instr.opcode {
            opcode::FMOV
            | opcode::FADD
            | opcode::FSUB
            | opcode::FMUL
            | opcode::FDIV
            | opcode::FCVT
            | opcode::FCSEL
            | opcode::FCMP => true,
            opcode::SCVTF | opcode::UCVTF => {
                matches!(usage, RegUsage::Def | RegUsage::UseDef)
            }
            opcode::FCVTZS | opcode::FCVTZU => usage == RegUsage::Use,
            opcode::LDR | opcode::STR => instr.is_flag(InstrFlags::FLOAT),
            _ => false,
        }
    }
}

impl TargetRegAnalyzer for AArch64RegAnalyzer {
    fn collect_operands(
        &self,
        func: &mcode::Function,
        block: BlockId,
        instr_id: InstrId,
    ) -> Vec<RegOp> {
        use opcode::*;

        let basic_block = func.block(block);
        let instr = basic_block.get(instr_id);
        let mut operands = Vec::new();

        if instr.opcode == BL || instr.opcode == BLR {
            for &reg in func.calling_conv.volatile_regs() {
                operands.push(RegOp {
                    reg: Register::Physical(reg),
                    usage: RegUsage::Kill,
                });
            }

            let mut cursor = basic_block.instrs.prev(instr_id);
            while let Some(prev_id) = cursor {
                let prev = basic_block.get(prev_id);
                if prev.opcode == BL || prev.opcode == BLR {
                    break;
                }

                if prev.has_dest() && prev.dest().is_physical_reg() {
                    operands.push(RegOp {
                        reg: prev.dest().register(),
                        usage: RegUsage::Use,
                    });
                }

                cursor = basic_block.instrs.prev(prev_id);
            }
        }

        match instr.opcode {
            MOV | FMOV | MOVZ | SXTW | FCVT | SCVTF | UCVTF | FCVTZS | FCVTZU | ADRP => {
                collect_regs(instr.operand(0), RegUsage::Def, &mut operands);
                if instr.operands.len() > 1 {
                    collect_regs(instr.operand(1), RegUsage::Use, &mut operands);
                }
            }

            MOVK => {
                collect_regs(instr.operand(0), RegUsage::UseDef, &mut operands);
            }

            LDR | LDRB | LDRH => {
                collect_regs(instr.operand(0), RegUsage::Def, &mut operands);
                collect_regs(instr.operand(1), RegUsage::Use, &mut operands);
            }

            STR | STRB | STRH => {
                collect_regs(instr.operand(0), RegUsage::Use, &mut operands);
                collect_regs(instr.operand(1), RegUsage::Use, &mut operands);
            }

            LDP => {
                collect_regs(instr.operand(0), RegUsage::Def, &mut operands);
                collect_regs(instr.operand(1), RegUsage::Def, &mut operands);
                collect_regs(instr.operand(2), RegUsage::Use, &mut operands);
            }

            STP => {
                collect_regs(instr.operand(0), RegUsage::Use, &mut operands);
                collect_regs(instr.operand(1), RegUsage::Use, &mut operands);
                collect_regs(instr.operand(2), RegUsage::Use, &mut operands);
            }

            ADD | SUB | MUL | SDIV | UDIV | AND | ORR | EOR | LSL | ASR | CSEL | FADD | FSUB
            | FMUL | FDIV | FCSEL => {
                collect_regs(instr.operand(0), RegUsage::Def, &mut operands);
                for operand in instr.operands.iter().skip(1) {
                    collect_regs(operand, RegUsage::Use, &mut operands);
                }
            }

            CMP | FCMP => {
                collect_regs(instr.operand(0), RegUsage::Use, &mut operands);
                collect_regs(instr.operand(1), RegUsage::Use, &mut operands);
            }

            BLR => {
                collect_regs(instr.operand(0), RegUsage::Use, &mut operands);
            }

            _ => {}
        }

        operands
    }

    fn candidates(&self, instr: &Instruction) -> &'static [PhysicalReg] {
        if Self::is_float_instr(instr, RegUsage::Def) {
            &FLOAT_CANDIDATES
        } else {
            &GENERAL_PURPOSE_CANDIDATES
        }
    }

    fn suggest_regs(
        &self,
        func: &mcode::Function,
        ra_func: &RaFunc,
        group: &LiveRangeGroup,
    ) -> Vec<PhysicalReg> {
        let mut suggestions = Vec::new();

        let first_range = group.ranges.first().unwrap();
        let last_range = group.ranges.last().unwrap();

        let first_block = &ra_func.blocks[first_range.block];
        let first_def = func
            .block(first_block.block)
            .get(first_block.instrs[first_range.start as usize].id);

        let last_block = &ra_func.blocks[last_range.block];
        let last_use = func
            .block(last_block.block)
            .get(last_block.instrs[last_range.end as usize].id);

        if Self::is_move_opcode(first_def.opcode)
            && first_def.operands.len() > 1
            && first_def.operand(1).is_physical_reg()
        {
            suggestions.push(first_def.operand(1).physical_reg());
        }

        if Self::is_move_opcode(last_use.opcode)
            && last_use.has_dest()
            && last_use.dest().is_physical_reg()
        {
            suggestions.push(last_use.dest().physical_reg());
        }

        suggestions
    }

    fn is_reg_overridden(
        &self,
        func: &mcode::Function,
        instr: &Instruction,
        reg: PhysicalReg,
    ) -> bool {
        if instr.opcode == opcode::BL || instr.opcode == opcode::BLR {
            return func.calling_conv.is_volatile(reg);
        }

        if let Some(operand) = instr.operands.first() {
            if operand.is_physical_reg() {
                return operand.physical_reg() == reg;
            }
        }

        false
    }

    fn insert_spill_reload(
        &self,
        func: &mut mcode::Function,
        block: BlockId,
        spill: SpilledRegUse,
    ) -> PhysicalReg {
        let instr = func.block(block).get(spill.instr);
        let size = instr.operands.first().map(|op| op.size).unwrap_or(8).max(4);

        let is_float = Self::is_float_instr(instr, spill.usage);
        let tmp_reg = if is_float {
            V31 - spill.spill_tmp_regs
        } else {
            R28 - spill.spill_tmp_regs
        };

        let load = Instruction::new(
            opcode::LDR,
            vec![
                Operand::from_physical_reg(tmp_reg, size),
                Operand::from_stack_slot(spill.stack_slot, size),
            ],
        );
        let store = Instruction::new(
            opcode::STR,
            vec![
                Operand::from_physical_reg(tmp_reg, size),
                Operand::from_stack_slot(spill.stack_slot, size),
            ],
        );

        let instrs = &mut func.block_mut(block).instrs;
        match spill.usage {
            RegUsage::Use => {
                instrs.insert_before(spill.instr, load);
            }
            RegUsage::Def => {
                instrs.insert_after(spill.instr, store);
            }
            RegUsage::UseDef => {
                instrs.insert_before(spill.instr, load);
                instrs.insert_after(spill.instr, store);
            }
            RegUsage::Kill => {}
        }

        tmp_reg
    }

    fn is_instr_removable(&self, instr: &Instruction) -> bool {
        if !Self::is_move_opcode(instr.opcode) || instr.operands.len() < 2 {
            return false;
        }

        let dst = instr.operand(0);
        let src = instr.operand(1);
        dst.is_register() && src.is_register() && dst.register() == src.register()
    }
}

fn collect_regs(operand: &Operand, usage: RegUsage, out: &mut Vec<RegOp>) {
    match &operand.kind {
        OperandKind::Register(reg) => {
            if !reg.is_stack_slot() && *reg != Register::Physical(SP) {
                out.push(RegOp { reg: *reg, usage });
            }
        }
        OperandKind::AArch64Addr(addr) => {
            let base = addr.base();
            if !base.is_stack_slot() && base != Register::Physical(SP) {
                out.push(RegOp {
                    reg: base,
                    usage: RegUsage::Use,
                });
            }

            if let mcode::AArch64Address::BaseOffsetReg { offset, .. } = addr {
                if !offset.is_stack_slot() && *offset != Register::Physical(SP) {
                    out.push(RegOp {
                        reg: *offset,
                        usage: RegUsage::Use,
                    });
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_registers_are_not_candidates() {
        assert!(!GENERAL_PURPOSE_CANDIDATES.contains(&R27));
        assert!(!GENERAL_PURPOSE_CANDIDATES.contains(&R28));
        assert!(!GENERAL_PURPOSE_CANDIDATES.contains(&R18));
        assert!(!GENERAL_PURPOSE_CANDIDATES.contains(&R29));
        assert!(!GENERAL_PURPOSE_CANDIDATES.contains(&R30));
        assert!(!FLOAT_CANDIDATES.contains(&V30));
        assert!(!FLOAT_CANDIDATES.contains(&V31));
    }
}
