//! The Microsoft x64 calling convention.
//!
//! Stack layout:
//!
//! ```text
//! +--------------------------+
//! | Callee argument storage  |
//! +--------------------------+
//! | Return address (8 bytes) |
//! +--------------------------+
//! | Pushed regs              |
//! +--------------------------+
//! | Generic region (RSP)     |
//! +--------------------------+
//! | Caller argument storage  |
//! +--------------------------+
//! ```
//!
//! The stack pointer is aligned to 16 bytes. A non-leaf function reserves at
//! least 32 bytes of argument storage; callees spill their register
//! arguments into it.

use opal_codegen::machine_pass::utils::get_modified_volatile_regs;
use opal_codegen::LowerCtx;
use opal_common::utils::align_up;
use opal_mcode as mcode;
use opal_mcode::{
    ArgStorage, CallingConvention, InstrFlags, Instruction, Operand, PhysicalReg, StackRegions,
    StackSlot, StackSlotKind,
};
use opal_ssa as ssa;
use opal_ssa::Type;

use crate::x86_64::opcode;
use crate::x86_64::register::*;
use crate::x86_64::ssa_lowerer::X64SsaLowerer;
use crate::x86_64::sys_v_calling_conv::lower_x86_64_call;

pub struct MsAbiCallingConv;

const ARG_REGS_INT: [PhysicalReg; 4] = [RCX, RDX, R8, R9];
const ARG_REGS_FLOAT: [PhysicalReg; 4] = [XMM0, XMM1, XMM2, XMM3];

const VOLATILE_REGS: [PhysicalReg; 15] = [
    RAX, RCX, RDX, RSP, RBP, R8, R9, R10, R11, XMM0, XMM1, XMM2, XMM3, XMM4, XMM5,
];

/// Shadow space the caller always reserves for the four register arguments.
const SHADOW_SPACE_BYTES: i32 = 32;

impl MsAbiCallingConv {
    pub const INSTANCE: MsAbiCallingConv = MsAbiCallingConv;

    pub fn lower_call(lowerer: &mut X64SsaLowerer, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        lower_x86_64_call(&Self::INSTANCE, lowerer, ctx, instr);
    }
}

impl CallingConvention for MsAbiCallingConv {
    fn volatile_regs(&self) -> &'static [PhysicalReg] {
        &VOLATILE_REGS
    }

    fn arg_storage(&self, types: &[Type]) -> Vec<ArgStorage> {
        let mut result = Vec::with_capacity(types.len());

        for (i, ty) in types.iter().enumerate() {
            let storage = if i < ARG_REGS_INT.len() {
                if ty.is_floating_point() {
                    ArgStorage::InReg(ARG_REGS_FLOAT[i])
                } else {
                    ArgStorage::InReg(ARG_REGS_INT[i])
                }
            } else {
                ArgStorage::OnStack {
                    arg_slot_index: (i - ARG_REGS_INT.len()) as u32,
                    sp_offset: 8 * i as i32,
                }
            };

            result.push(storage);
        }

        result
    }

    fn create_implicit_region(&self, func: &mut mcode::Function, regions: &mut StackRegions) {
        let modified_regs = get_modified_volatile_regs(func);

        let mut saved_reg_size = 0;
        for reg in modified_regs {
            if is_general_purpose(reg) {
                saved_reg_size += 8;
            } else {
                let slot = func
                    .stack_frame
                    .new_stack_slot(StackSlot::new(StackSlotKind::Generic, 8, 8));
                func.stack_frame.reg_save_slot_indices.push(slot);
            }
        }

        regions.implicit_region.saved_reg_size = saved_reg_size;
        regions.implicit_region.size = self.implicit_stack_bytes(func) + saved_reg_size;
    }

    fn create_arg_store_region(&self, frame: &mut mcode::StackFrame, regions: &mut StackRegions) {
        let region = &mut regions.arg_store_region;
        region.size = 0;

        // Incoming arguments are spilled into the caller's shadow space,
        // which sits above our implicitly allocated region.
        let mut arg_store_offset = regions.implicit_region.size;

        for index in 0..frame.slots().len() {
            let slot = &frame.slots()[index];
            if !slot.is_defined() && slot.kind == StackSlotKind::ArgStore {
                region.offsets.insert(index as u32, arg_store_offset);
                arg_store_offset += 8;
            }
        }
    }

    fn create_call_arg_region(&self, func: &mut mcode::Function, regions: &mut StackRegions) {
        let region = &mut regions.call_arg_region;

        let mut has_call_instr = false;
        'outer: for (_, block) in &func.blocks {
            for instr in block.instrs.values() {
                if instr.opcode == opcode::CALL {
                    has_call_instr = true;
                    break 'outer;
                }
            }
        }

        if !has_call_instr {
            region.size = 0;
            return;
        }
        region.size = SHADOW_SPACE_BYTES;

        for index in func.stack_frame.call_arg_slot_indices.clone() {
            let slot = func.stack_frame.slot_mut(index);
            slot.set_offset(SHADOW_SPACE_BYTES + 8 * slot.call_arg_index as i32);
            region.size += 8;
        }
    }

    fn alloca_size(&self, regions: &StackRegions) -> i32 {
        let arg_store_bytes = regions.arg_store_region.size;
        let generic_bytes = regions.generic_region.size;
        let call_arg_bytes = regions.call_arg_region.size;
        let implicit_bytes = regions.implicit_region.size;

        let minimum_size = arg_store_bytes + generic_bytes + call_arg_bytes;

        // Leaf functions don't require alignment.
        if call_arg_bytes == 0 {
            return minimum_size;
        }

        align_up(minimum_size + implicit_bytes, 16) - implicit_bytes
    }

    fn implicit_stack_bytes(&self, _func: &mcode::Function) -> i32 {
        // Return address pushed by CALL.
        8
    }

    fn prolog(&self, func: &mcode::Function) -> Vec<Instruction> {
        let mut prolog = Vec::new();
        let modified_regs = get_modified_volatile_regs(func);

        for &reg in &modified_regs {
            if is_general_purpose(reg) {
                let operand = Operand::from_physical_reg(reg, 8);
                prolog.push(Instruction::new(opcode::PUSH, vec![operand.clone()]));
                prolog.push(Instruction::new(
                    mcode::pseudo_opcode::EH_PUSHREG,
                    vec![operand],
                ));
            }
        }

        if func.stack_frame.size() > 0 {
            prolog.push(Instruction::with_flags(
                opcode::SUB,
                vec![
                    Operand::from_physical_reg(RSP, 8),
                    Operand::from_int_immediate(func.stack_frame.size() as i64, 0),
                ],
                InstrFlags::ALLOCA,
            ));
            prolog.push(Instruction::new(
                mcode::pseudo_opcode::EH_ALLOCSTACK,
                vec![Operand::from_int_immediate(func.stack_frame.size() as i64, 0)],
            ));
        }

        let mut sse_slot_index = 0;
        for &reg in &modified_regs {
            if is_sse(reg) {
                let slot = func.stack_frame.reg_save_slot_indices[sse_slot_index];
                sse_slot_index += 1;

                prolog.push(Instruction::new(
                    opcode::MOVSD,
                    vec![
                        Operand::from_stack_slot(slot, 8),
                        Operand::from_physical_reg(reg, 8),
                    ],
                ));
            }
        }

        prolog
    }

    fn epilog(&self, func: &mcode::Function) -> Vec<Instruction> {
        let mut epilog = Vec::new();
        let modified_regs = get_modified_volatile_regs(func);

        let mut sse_slot_index = 0;
        for &reg in &modified_regs {
            if is_sse(reg) {
                let slot = func.stack_frame.reg_save_slot_indices[sse_slot_index];
                sse_slot_index += 1;

                epilog.push(Instruction::new(
                    opcode::MOVSD,
                    vec![
                        Operand::from_physical_reg(reg, 8),
                        Operand::from_stack_slot(slot, 8),
                    ],
                ));
            }
        }

        if func.stack_frame.size() > 0 {
            epilog.push(Instruction::new(
                opcode::ADD,
                vec![
                    Operand::from_physical_reg(RSP, 8),
                    Operand::from_int_immediate(func.stack_frame.size() as i64, 0),
                ],
            ));
        }

        for &reg in modified_regs.iter().rev() {
            if is_general_purpose(reg) {
                epilog.push(Instruction::new(
                    opcode::POP,
                    vec![Operand::from_physical_reg(reg, 8)],
                ));
            }
        }

        epilog
    }

    fn is_func_exit(&self, machine_opcode: mcode::Opcode) -> bool {
        machine_opcode == opcode::RET
    }

    fn sret_reg(&self) -> PhysicalReg {
        RCX
    }
}
