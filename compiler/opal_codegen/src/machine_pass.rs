//! The machine-pass interface and shared pass utilities.

use opal_mcode as mcode;
use opal_mcode::{OperandKind, PhysicalReg, Register};

/// A transformation over a whole machine module, run in place.
pub trait MachinePass {
    fn run(&mut self, module: &mut mcode::Module);
}

pub mod utils {
    use super::*;

    /// Rewrites every use of a virtual register inside the block, including
    /// address bases and offsets.
    pub fn replace_virtual_reg(
        block: &mut mcode::BasicBlock,
        old_reg: mcode::VirtualReg,
        new_reg: mcode::VirtualReg,
    ) {
        for id in block.instrs.ids() {
            replace_reg(
                block.instrs.get_mut(id),
                Register::Virtual(old_reg),
                Register::Virtual(new_reg),
            );
        }
    }

    /// Rewrites every occurrence of a register in the instruction's
    /// operands.
    pub fn replace_reg(instr: &mut mcode::Instruction, old_reg: Register, new_reg: Register) {
        for operand in &mut instr.operands {
            match &mut operand.kind {
                OperandKind::Register(reg) if *reg == old_reg => *reg = new_reg,
                OperandKind::Addr(addr) => {
                    if addr.base == old_reg {
                        addr.base = new_reg;
                    }
                    if let mcode::AddrOffset::Reg(reg) = &mut addr.offset {
                        if *reg == old_reg {
                            *reg = new_reg;
                        }
                    }
                }
                OperandKind::AArch64Addr(addr) => {
                    if addr.base() == old_reg {
                        addr.set_base(new_reg);
                    }
                    if let mcode::AArch64Address::BaseOffsetReg { offset, .. } = addr {
                        if *offset == old_reg {
                            *offset = new_reg;
                        }
                    }
                }
                _ => {}
            }
        }
    }

    /// Replaces operands equal to `old_operand` throughout the block.
    pub fn replace_operand(
        block: &mut mcode::BasicBlock,
        old_operand: &mcode::Operand,
        new_operand: &mcode::Operand,
    ) {
        for id in block.instrs.ids() {
            let instr = block.instrs.get_mut(id);
            for operand in &mut instr.operands {
                if operand == old_operand {
                    *operand = new_operand.clone();
                }
            }
        }
    }

    /// Collects the physical registers the function writes that its calling
    /// convention does not treat as volatile; these are the registers the
    /// prolog must save.
    pub fn get_modified_volatile_regs(func: &mcode::Function) -> Vec<PhysicalReg> {
        let mut result = Vec::new();

        for (_, block) in &func.blocks {
            for instr in block.instrs.values() {
                if !instr.has_dest() || !instr.dest().is_physical_reg() {
                    continue;
                }

                let reg = instr.dest().physical_reg();
                if !func.calling_conv.is_volatile(reg) && !result.contains(&reg) {
                    result.push(reg);
                }
            }
        }

        result
    }
}
