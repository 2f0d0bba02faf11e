//! The System V AMD64 calling convention.

use opal_codegen::machine_pass::utils::get_modified_volatile_regs;
use opal_codegen::LowerCtx;
use opal_common::utils::align_up;
use opal_mcode as mcode;
use opal_mcode::{
    ArgStorage, CallingConvention, InstrFlags, Instruction, Operand, PhysicalReg, Register,
    ReturnMethod, StackRegions, StackSlot, StackSlotKind,
};
use opal_ssa as ssa;
use opal_ssa::Type;

use crate::x86_64::opcode;
use crate::x86_64::register::*;
use crate::x86_64::ssa_lowerer::X64SsaLowerer;

pub struct SysVCallingConv;

const ARG_REGS_INT: [PhysicalReg; 6] = [RDI, RSI, RDX, RCX, R8, R9];
const ARG_REGS_FLOAT: [PhysicalReg; 9] =
    [XMM0, XMM1, XMM2, XMM3, XMM4, XMM5, XMM6, XMM7, XMM8];

const VOLATILE_REGS: [PhysicalReg; 27] = [
    RAX, RDI, RSI, RDX, RCX, RSP, RBP, R8, R9, R10, R11, XMM0, XMM1, XMM2, XMM3, XMM4, XMM5,
    XMM6, XMM7, XMM8, XMM9, XMM10, XMM11, XMM12, XMM13, XMM14, XMM15,
];

impl SysVCallingConv {
    pub const INSTANCE: SysVCallingConv = SysVCallingConv;

    pub fn lower_call(lowerer: &mut X64SsaLowerer, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        lower_x86_64_call(&Self::INSTANCE, lowerer, ctx, instr);
    }
}

impl CallingConvention for SysVCallingConv {
    fn volatile_regs(&self) -> &'static [PhysicalReg] {
        &VOLATILE_REGS
    }

    fn arg_storage(&self, types: &[Type]) -> Vec<ArgStorage> {
        let mut result = Vec::with_capacity(types.len());

        let mut general_reg_index = 0;
        let mut float_reg_index = 0;
        let mut arg_slot_index = 0u32;

        for ty in types {
            let is_fp = ty.is_floating_point();

            let storage = if is_fp && float_reg_index < ARG_REGS_FLOAT.len() {
                float_reg_index += 1;
                ArgStorage::InReg(ARG_REGS_FLOAT[float_reg_index - 1])
            } else if !is_fp && general_reg_index < ARG_REGS_INT.len() {
                general_reg_index += 1;
                ArgStorage::InReg(ARG_REGS_INT[general_reg_index - 1])
            } else {
                let storage = ArgStorage::OnStack {
                    arg_slot_index,
                    sp_offset: 8 * arg_slot_index as i32,
                };
                arg_slot_index += 1;
                storage
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
                // SSE registers are saved through dedicated slots instead of
                // pushes.
                let slot = func
                    .stack_frame
                    .new_stack_slot(StackSlot::new(StackSlotKind::Generic, 8, 1));
                func.stack_frame.reg_save_slot_indices.push(slot);
            }
        }

        regions.implicit_region.saved_reg_size = saved_reg_size;
        regions.implicit_region.size = self.implicit_stack_bytes(func) + saved_reg_size;
    }

    fn create_arg_store_region(&self, frame: &mut mcode::StackFrame, regions: &mut StackRegions) {
        let region = &mut regions.arg_store_region;
        region.size = 0;

        for index in 0..frame.slots().len() {
            let slot = &frame.slots()[index];
            if !slot.is_defined() && slot.kind == StackSlotKind::ArgStore {
                region.size -= 8;
                region.offsets.insert(index as u32, region.size);
            }
        }
    }

    fn create_call_arg_region(&self, func: &mut mcode::Function, regions: &mut StackRegions) {
        let region = &mut regions.call_arg_region;
        region.size = 0;

        for index in func.stack_frame.call_arg_slot_indices.clone() {
            let slot = func.stack_frame.slot_mut(index);
            slot.set_offset(8 * slot.call_arg_index as i32);
            region.size += 8;
        }
    }

    fn alloca_size(&self, regions: &StackRegions) -> i32 {
        let arg_store_bytes = regions.arg_store_region.size;
        let generic_bytes = regions.generic_region.size;
        let call_arg_bytes = regions.call_arg_region.size;
        let saved_reg_bytes = regions.implicit_region.saved_reg_size;

        let minimum_size = arg_store_bytes + generic_bytes + call_arg_bytes;
        align_up(minimum_size + saved_reg_bytes, 16) - saved_reg_bytes
    }

    fn implicit_stack_bytes(&self, _func: &mcode::Function) -> i32 {
        // Return address pushed by CALL, plus the saved frame pointer.
        16
    }

    fn prolog(&self, func: &mcode::Function) -> Vec<Instruction> {
        let mut prolog = Vec::new();
        let modified_regs = get_modified_volatile_regs(func);

        // Push the callee-saved general-purpose registers this function
        // touches.
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

        prolog.push(Instruction::new(
            opcode::PUSH,
            vec![Operand::from_physical_reg(RBP, 8)],
        ));
        prolog.push(Instruction::new(
            opcode::MOV,
            vec![
                Operand::from_physical_reg(RBP, 8),
                Operand::from_physical_reg(RSP, 8),
            ],
        ));

        prolog.push(Instruction::with_flags(
            opcode::SUB,
            vec![
                Operand::from_physical_reg(RSP, 8),
                Operand::from_int_immediate(func.stack_frame.size() as i64, 0),
            ],
            InstrFlags::ALLOCA,
        ));

        // Save the callee-saved SSE registers into their reserved slots.
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

        epilog.push(Instruction::new(
            opcode::ADD,
            vec![
                Operand::from_physical_reg(RSP, 8),
                Operand::from_int_immediate(func.stack_frame.size() as i64, 0),
            ],
        ));

        epilog.push(Instruction::new(
            opcode::POP,
            vec![Operand::from_physical_reg(RBP, 8)],
        ));

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
        RDI
    }
}

/// Argument and return-value lowering shared by both x86-64 conventions;
/// only the register tables and regions differ.
pub(super) fn lower_x86_64_call(
    conv: &'static dyn CallingConvention,
    lowerer: &mut X64SsaLowerer,
    ctx: &mut LowerCtx,
    instr: &ssa::Instruction,
) {
    let callee = instr.operand(0);
    let return_size = ctx.size(callee.ty);
    let return_method = conv.return_method(return_size);
    let uses_sret = return_method == ReturnMethod::ViaPointerArg;

    let mut types: Vec<Type> = instr.operands[1..].iter().map(|arg| arg.ty).collect();
    if uses_sret {
        types.insert(0, Type::Addr);
    }
    let storage = conv.arg_storage(&types);

    // The hidden return buffer travels as the first integer argument.
    let mut sret_slot = None;
    if uses_sret {
        let alignment = ctx.alignment(callee.ty);
        let slot = ctx.machine_func.stack_frame.new_stack_slot(StackSlot::new(
            StackSlotKind::Generic,
            return_size,
            alignment,
        ));
        sret_slot = Some(slot);

        let ArgStorage::InReg(reg) = storage[0] else {
            unreachable!("hidden return pointer must go in a register")
        };

        ctx.emit(Instruction::with_flags(
            opcode::LEA,
            vec![
                Operand::from_physical_reg(reg, 8),
                Operand::from_stack_slot(slot, 8),
            ],
            InstrFlags::CALL_ARG,
        ));
    }

    let storage_base = usize::from(uses_sret);
    for (index, arg) in instr.operands[1..].iter().enumerate() {
        let arg_reg = match storage[storage_base + index] {
            ArgStorage::InReg(reg) => Register::Physical(reg),
            ArgStorage::OnStack { arg_slot_index, .. } => {
                Register::StackSlot(ctx.machine_func.stack_frame.call_arg_slot(arg_slot_index))
            }
        };

        ctx.with_flag(InstrFlags::CALL_ARG, |ctx| {
            lowerer.lower_as_move_into_reg(ctx, arg_reg, arg);
        });
    }

    lowerer.append_call(ctx, callee);

    if let Some(slot) = sret_slot {
        if instr.dest.is_some() {
            let m_dst = ctx.map_vreg_dst(instr, 8);
            ctx.emit(Instruction::new(
                opcode::LEA,
                vec![m_dst, Operand::from_stack_slot(slot, 8)],
            ));
        }
    } else if instr.dest.is_some() {
        lowerer.append_ret_val_move(ctx, instr);
    }
}
