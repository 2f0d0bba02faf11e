//! Operand roles and register classes for the x86-64 allocator.

use opal_codegen::{LiveRangeGroup, RaFunc, SpilledRegUse, TargetRegAnalyzer};
use opal_mcode as mcode;
use opal_mcode::{
    BlockId, InstrId, Instruction, Operand, PhysicalReg, RegOp, RegUsage, Register,
};

use crate::x86_64::opcode;
use crate::x86_64::register::*;

pub struct X64RegAnalyzer;

/// R14/R15 and XMM14/XMM15 are held back as spill scratch registers.
const GENERAL_PURPOSE_CANDIDATES: [PhysicalReg; 12] =
    [RAX, RCX, RDX, R8, R9, R10, R11, RBX, RSI, RDI, R12, R13];
const FLOAT_CANDIDATES: [PhysicalReg; 14] = [
    XMM0, XMM1, XMM2, XMM3, XMM4, XMM5, XMM6, XMM7, XMM8, XMM9, XMM10, XMM11, XMM12, XMM13,
];

impl X64RegAnalyzer {
    pub const INSTANCE: X64RegAnalyzer = X64RegAnalyzer;

    fn is_float_operand(machine_opcode: mcode::Opcode, usage: RegUsage) -> bool {
        if (opcode::MOVSS..=opcode::MOVUPS).contains(&machine_opcode)
            || (opcode::ADDSS..=opcode::UCOMISD).contains(&machine_opcode)
            || machine_opcode == opcode::CVTSS2SD
            || machine_opcode == opcode::CVTSD2SS
        {
            return true;
        }

        match usage {
            RegUsage::Def | RegUsage::UseDef => {
                machine_opcode == opcode::CVTSI2SS || machine_opcode == opcode::CVTSI2SD
            }
            RegUsage::Use => {
                machine_opcode == opcode::CVTSS2SI || machine_opcode == opcode::CVTSD2SI
            }
            RegUsage::Kill => false,
        }
    }

    fn add_du_ops(instr: &Instruction, out: &mut Vec<RegOp>) {
        collect_regs(instr.operand(0), RegUsage::Def, out);
        collect_regs(instr.operand(1), RegUsage::Use, out);
    }

    fn add_udu_ops(instr: &Instruction, out: &mut Vec<RegOp>) {
        collect_regs(instr.operand(0), RegUsage::UseDef, out);
        collect_regs(instr.operand(1), RegUsage::Use, out);
    }
}

impl TargetRegAnalyzer for X64RegAnalyzer {
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

        if instr.opcode == CALL {
            // A call clobbers every caller-saved register and consumes the
            // argument registers set up since the previous call.
            for &reg in func.calling_conv.volatile_regs() {
                operands.push(RegOp {
                    reg: Register::Physical(reg),
                    usage: RegUsage::Kill,
                });
            }

            let mut cursor = basic_block.instrs.prev(instr_id);
            while let Some(prev_id) = cursor {
                let prev = basic_block.get(prev_id);
                if prev.opcode == CALL {
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
            MOV | MOVSX | MOVZX | MOVSS | MOVSD | MOVAPS | MOVUPS | MOVD | MOVQ | LEA
            | CVTSS2SD | CVTSD2SS | CVTSI2SS | CVTSI2SD | CVTSS2SI | CVTSD2SI => {
                Self::add_du_ops(instr, &mut operands);
            }

            PUSH | CALL | RET => {
                if let Some(operand) = instr.operands.first() {
                    if operand.is_register() {
                        collect_regs(operand, RegUsage::Use, &mut operands);
                    } else if operand.is_addr() {
                        collect_addr_regs(operand, &mut operands);
                    }
                }
            }

            POP => {
                operands.push(RegOp {
                    reg: instr.operand(0).register(),
                    usage: RegUsage::Def,
                });
            }

            ADD | SUB | IMUL | AND | OR | SHL | SHR | ADDSS | ADDSD | SUBSS | SUBSD | MULSS
            | MULSD | DIVSS | DIVSD | MINSS | MINSD | MAXSS | MAXSD | SQRTSS | SQRTSD => {
                Self::add_udu_ops(instr, &mut operands);
            }

            op if (CMOVCC..CMOVCC + 10).contains(&op) => {
                Self::add_udu_ops(instr, &mut operands);
            }

            CDQ | CQO => {
                operands.push(RegOp {
                    reg: Register::Physical(RAX),
                    usage: RegUsage::Use,
                });
                operands.push(RegOp {
                    reg: Register::Physical(RDX),
                    usage: RegUsage::Def,
                });
            }

            IDIV | DIV => {
                collect_regs(instr.operand(0), RegUsage::Use, &mut operands);
                operands.push(RegOp {
                    reg: Register::Physical(RAX),
                    usage: RegUsage::UseDef,
                });
                operands.push(RegOp {
                    reg: Register::Physical(RDX),
                    usage: RegUsage::UseDef,
                });
            }

            CMP | UCOMISS | UCOMISD => {
                collect_regs(instr.operand(0), RegUsage::Use, &mut operands);
                collect_regs(instr.operand(1), RegUsage::Use, &mut operands);
            }

            XOR | XORPS | XORPD => {
                if instr.operand(0) == instr.operand(1) {
                    // Zeroing idiom: the register is only written.
                    collect_regs(instr.operand(0), RegUsage::Def, &mut operands);
                } else {
                    Self::add_udu_ops(instr, &mut operands);
                }
            }

            _ => {}
        }

        operands
    }

    fn candidates(&self, instr: &Instruction) -> &'static [PhysicalReg] {
        if Self::is_float_operand(instr.opcode, RegUsage::Def) {
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

        // Biasing towards the physical register of an adjacent move makes
        // that move trivially removable after allocation.
        if opcode::is_move(first_def.opcode)
            && first_def.operands.len() > 1
            && first_def.operand(1).is_physical_reg()
        {
            suggestions.push(first_def.operand(1).physical_reg());
        }

        if opcode::is_move(last_use.opcode) && last_use.has_dest() && last_use.dest().is_physical_reg()
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
        if instr.opcode == opcode::CALL {
            return func.calling_conv.is_volatile(reg);
        }

        if instr.opcode == opcode::IDIV || instr.opcode == opcode::DIV {
            return reg == RAX || reg == RDX;
        }

        if let Some(operand) = instr.operands.first() {
            if operand.is_physical_reg() {
                return operand.physical_reg() == reg;
            }
        }
        if let Some(operand) = instr.operands.get(1) {
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
        let basic_block = func.block(block);
        let instr = basic_block.get(spill.instr);

        let dst_size = instr.operands.first().map(|op| op.size).unwrap_or(8);
        let src_size = instr.operands.get(1).map(|op| op.size).unwrap_or(dst_size);

        let is_float = Self::is_float_operand(instr.opcode, spill.usage);
        let move_opcode = if is_float {
            if src_size == 4 {
                opcode::MOVSS
            } else {
                opcode::MOVSD
            }
        } else {
            opcode::MOV
        };

        let tmp_reg = if is_float {
            XMM15 - spill.spill_tmp_regs
        } else {
            R15 - spill.spill_tmp_regs
        };

        let slot_reg = Register::StackSlot(spill.stack_slot);
        let load = Instruction::new(
            move_opcode,
            vec![
                Operand::from_physical_reg(tmp_reg, src_size),
                Operand::from_register(slot_reg, src_size),
            ],
        );
        let store = Instruction::new(
            move_opcode,
            vec![
                Operand::from_register(slot_reg, dst_size),
                Operand::from_physical_reg(tmp_reg, dst_size),
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
        if !opcode::is_move(instr.opcode) {
            return false;
        }

        let dst = instr.operand(0);
        let src = instr.operand(1);
        dst.is_register() && src.is_register() && dst.register() == src.register()
    }
}

fn collect_regs(operand: &Operand, usage: RegUsage, out: &mut Vec<RegOp>) {
    if operand.is_register() && !operand.is_stack_slot() {
        out.push(RegOp {
            reg: operand.register(),
            usage,
        });
    } else if operand.is_addr() {
        collect_addr_regs(operand, out);
    }
}

fn collect_addr_regs(operand: &Operand, out: &mut Vec<RegOp>) {
    let addr = operand.addr();

    if !addr.base.is_stack_slot() {
        out.push(RegOp {
            reg: addr.base,
            usage: RegUsage::Use,
        });
    }

    if let Some(offset_reg) = addr.reg_offset() {
        if !offset_reg.is_stack_slot() {
            out.push(RegOp {
                reg: offset_reg,
                usage: RegUsage::Use,
            });
        }
    }
}
