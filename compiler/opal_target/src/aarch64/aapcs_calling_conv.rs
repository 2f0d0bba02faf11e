//! The AArch64 procedure call standard (AAPCS).

use opal_codegen::late_reg_alloc::{LateRegAlloc, Range};
use opal_codegen::machine_pass::utils::get_modified_volatile_regs;
use opal_codegen::LowerCtx;
use opal_common::utils::align_up;
use opal_mcode as mcode;
use opal_mcode::{
    AArch64Address, ArgStorage, BlockId, CallingConvention, InstrFlags, InstrId, Instruction,
    Operand, PhysicalReg, Register, ReturnMethod, StackRegions, StackSlot, StackSlotKind,
};
use opal_ssa as ssa;
use opal_ssa::Type;

use crate::aarch64::encoding_info;
use crate::aarch64::opcode;
use crate::aarch64::reg_analyzer::AArch64RegAnalyzer;
use crate::aarch64::register::*;
use crate::aarch64::ssa_lowerer::AArch64SsaLowerer;

pub struct AapcsCallingConv;

const GENERAL_ARG_REGS: [PhysicalReg; 8] = [R0, R1, R2, R3, R4, R5, R6, R7];
const FLOAT_ARG_REGS: [PhysicalReg; 8] = [V0, V1, V2, V3, V4, V5, V6, V7];

const VOLATILE_REGS: [PhysicalReg; 28] = [
    R0, R1, R2, R3, R4, R5, R6, R7, R8, R9, R10, R11, R12, R13, R14, R15, R16, R17, R18, V0,
    V1, V2, V3, V4, V5, V6, V7, SP,
];

impl AapcsCallingConv {
    pub const INSTANCE: AapcsCallingConv = AapcsCallingConv;

    pub fn lower_call(
        lowerer: &mut AArch64SsaLowerer,
        ctx: &mut LowerCtx,
        instr: &ssa::Instruction,
    ) {
        let conv: &'static dyn CallingConvention = &Self::INSTANCE;

        let callee = instr.operand(0);
        let return_size = ctx.size(callee.ty);
        let uses_sret = conv.return_method(return_size) == ReturnMethod::ViaPointerArg;

        let types: Vec<Type> = instr.operands[1..].iter().map(|arg| arg.ty).collect();
        let storage = conv.arg_storage(&types);

        // The hidden return buffer address travels in X8, not in the
        // ordinary argument registers.
        let mut sret_slot = None;
        if uses_sret {
            let alignment = ctx.alignment(callee.ty);
            let slot = ctx.machine_func.stack_frame.new_stack_slot(StackSlot::new(
                StackSlotKind::Generic,
                return_size,
                alignment,
            ));
            sret_slot = Some(slot);

            ctx.emit(Instruction::with_flags(
                opcode::ADD,
                vec![
                    Operand::from_physical_reg(conv.sret_reg(), 8),
                    Operand::from_physical_reg(SP, 8),
                    Operand::from_stack_slot_offset(slot, 0),
                ],
                InstrFlags::CALL_ARG,
            ));
        }

        for (index, arg) in instr.operands[1..].iter().enumerate() {
            let size = ctx.size(arg.ty) as u8;
            let is_float = arg.ty.is_floating_point();

            let reg = match storage[index] {
                ArgStorage::InReg(reg) => Register::Physical(reg),
                ArgStorage::OnStack { .. } => ctx.new_vreg(),
            };

            let src = lowerer.lower_value(ctx, arg);
            ctx.emit(Instruction::with_flags(
                if is_float { opcode::FMOV } else { opcode::MOV },
                vec![Operand::from_register(reg, size), src],
                InstrFlags::CALL_ARG,
            ));

            // Stack arguments are stored into their outgoing slots.
            if let ArgStorage::OnStack { arg_slot_index, .. } = storage[index] {
                let slot = ctx.machine_func.stack_frame.call_arg_slot(arg_slot_index);
                ctx.emit(Instruction::new(
                    opcode::STR,
                    vec![
                        Operand::from_register(reg, size),
                        Operand::from_stack_slot(slot, 8),
                    ],
                ));
            }
        }

        let (call_opcode, call_operand) = if callee.is_symbol() {
            (
                opcode::BL,
                Operand::from_symbol(mcode::Symbol::new(callee.symbol_name()), 8),
            )
        } else if callee.is_register() {
            (
                opcode::BLR,
                Operand::from_register(ctx.map_vreg(callee.register()), 8),
            )
        } else {
            unreachable!("call target is neither a symbol nor a register")
        };

        let id = ctx.emit(Instruction::with_flags(
            call_opcode,
            vec![call_operand],
            InstrFlags::CALL,
        ));
        let call = ctx.emitted_instr_mut(id);
        call.add_reg_op(Register::Physical(R0), mcode::RegUsage::Def);
        call.add_reg_op(Register::Physical(V0), mcode::RegUsage::Def);

        if let Some(slot) = sret_slot {
            if instr.dest.is_some() {
                let dst = ctx.map_vreg_dst(instr, 8);
                ctx.emit(Instruction::new(
                    opcode::ADD,
                    vec![
                        dst,
                        Operand::from_physical_reg(SP, 8),
                        Operand::from_stack_slot_offset(slot, 0),
                    ],
                ));
            }
        } else if let Some(dest) = instr.dest {
            let is_fp = callee.ty.is_floating_point();
            let return_reg = if is_fp { V0 } else { R0 };
            let size = return_size as u8;

            ctx.emit(Instruction::new(
                if is_fp { opcode::FMOV } else { opcode::MOV },
                vec![
                    Operand::from_virtual_reg(dest, size),
                    Operand::from_physical_reg(return_reg, size),
                ],
            ));
        }
    }
}

impl CallingConvention for AapcsCallingConv {
    fn volatile_regs(&self) -> &'static [PhysicalReg] {
        &VOLATILE_REGS
    }

    fn arg_storage(&self, types: &[Type]) -> Vec<ArgStorage> {
        let mut result = Vec::with_capacity(types.len());

        let mut general_reg_index = 0;
        let mut float_reg_index = 0;
        let mut arg_slot_index = 0u32;
        let mut stack_offset = 0i32;

        for ty in types {
            let is_fp = ty.is_floating_point();

            let storage = if is_fp && float_reg_index < FLOAT_ARG_REGS.len() {
                float_reg_index += 1;
                ArgStorage::InReg(FLOAT_ARG_REGS[float_reg_index - 1])
            } else if !is_fp && general_reg_index < GENERAL_ARG_REGS.len() {
                general_reg_index += 1;
                ArgStorage::InReg(GENERAL_ARG_REGS[general_reg_index - 1])
            } else {
                let storage = ArgStorage::OnStack {
                    arg_slot_index,
                    sp_offset: stack_offset,
                };
                arg_slot_index += 1;
                stack_offset += 8;
                storage
            };

            result.push(storage);
        }

        result
    }

    fn create_implicit_region(&self, func: &mut mcode::Function, regions: &mut StackRegions) {
        let saved_reg_size = 8 * get_modified_volatile_regs(func).len() as i32;
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

        let minimum_size = arg_store_bytes + generic_bytes + call_arg_bytes;

        // The extra 16 bytes hold the frame pointer / link register pair.
        align_up(minimum_size, 16) + 16
    }

    fn implicit_stack_bytes(&self, _func: &mcode::Function) -> i32 {
        0
    }

    fn prolog(&self, func: &mcode::Function) -> Vec<Instruction> {
        let fp = Operand::from_physical_reg(R29, 8);
        let lr = Operand::from_physical_reg(R30, 8);
        let sp = Register::Physical(SP);
        let size = func.stack_frame.size();

        let mut prolog = Vec::new();

        for reg in get_modified_volatile_regs(func) {
            if reg == R29 || reg == R30 {
                continue;
            }

            prolog.push(Instruction::new(
                opcode::STR,
                vec![
                    Operand::from_physical_reg(reg, 8),
                    Operand::from_aarch64_addr(
                        AArch64Address::BaseOffsetImmWrite {
                            base: sp,
                            offset: -16,
                        },
                        8,
                    ),
                ],
            ));
        }

        prolog.push(Instruction::new(
            opcode::STP,
            vec![
                fp,
                lr,
                Operand::from_aarch64_addr(
                    AArch64Address::BaseOffsetImmWrite {
                        base: sp,
                        offset: -16,
                    },
                    8,
                ),
            ],
        ));

        prolog.push(Instruction::with_flags(
            opcode::SUB,
            vec![
                Operand::from_register(sp, 8),
                Operand::from_register(sp, 8),
                Operand::from_int_immediate(size as i64, 0),
            ],
            InstrFlags::ALLOCA,
        ));

        prolog
    }

    fn epilog(&self, func: &mcode::Function) -> Vec<Instruction> {
        let fp = Operand::from_physical_reg(R29, 8);
        let lr = Operand::from_physical_reg(R30, 8);
        let sp = Register::Physical(SP);
        let size = func.stack_frame.size();

        let mut epilog = Vec::new();

        epilog.push(Instruction::new(
            opcode::ADD,
            vec![
                Operand::from_register(sp, 8),
                Operand::from_register(sp, 8),
                Operand::from_int_immediate(size as i64, 0),
            ],
        ));

        // Post-indexed LDP pops the frame pointer / link register pair.
        epilog.push(Instruction::new(
            opcode::LDP,
            vec![
                fp,
                lr,
                Operand::from_aarch64_addr(AArch64Address::Base(sp), 8),
                Operand::from_int_immediate(16, 0),
            ],
        ));

        for reg in get_modified_volatile_regs(func).into_iter().rev() {
            if reg == R29 || reg == R30 {
                continue;
            }

            epilog.push(Instruction::new(
                opcode::LDR,
                vec![
                    Operand::from_physical_reg(reg, 8),
                    Operand::from_aarch64_addr(AArch64Address::Base(sp), 8),
                    Operand::from_int_immediate(16, 0),
                ],
            ));
        }

        epilog
    }

    fn fix_up_instr(&self, func: &mut mcode::Function, block: BlockId, instr: InstrId) -> InstrId {
        // LDR immediate offsets have a restricted range; once slot offsets
        // are final, out-of-range ones are rebuilt through a scratch
        // register.
        {
            let instruction = func.block(block).get(instr);
            if instruction.opcode != opcode::LDR {
                return instr;
            }

            let address = instruction.operand(1);
            if !address.is_stack_slot() {
                return instr;
            }

            let offset = func.stack_frame.slot(address.stack_slot()).offset();
            if encoding_info::is_addr_offset_encodable(offset, instruction.operand(0).size) {
                return instr;
            }
        }

        let (dest, offset) = {
            let instruction = func.block(block).get(instr);
            let offset = func.stack_frame.slot(instruction.operand(1).stack_slot()).offset();
            (instruction.operand(0).clone(), offset)
        };

        // Replace `ldr dst, [slot]` with `mov tmp, #offset` followed by
        // `ldr dst, [sp, tmp]`.
        let mov_id = instr;
        func.block_mut(block).instrs.replace(
            mov_id,
            Instruction::new(
                opcode::MOV,
                vec![
                    Operand::from_register(Register::Virtual(u32::MAX), 8),
                    Operand::from_int_immediate(offset as i64, 8),
                ],
            ),
        );

        let ldr_id = func.block_mut(block).instrs.insert_after(
            mov_id,
            Instruction::new(
                opcode::LDR,
                vec![
                    dest,
                    Operand::from_aarch64_addr(
                        AArch64Address::BaseOffsetReg {
                            base: Register::Physical(SP),
                            offset: Register::Virtual(u32::MAX),
                        },
                        8,
                    ),
                ],
            ),
        );

        let scratch = LateRegAlloc::new(
            func,
            Range {
                block,
                start: mov_id,
                end: ldr_id,
            },
            &AArch64RegAnalyzer::INSTANCE,
        )
        .alloc();

        let mov = func.block_mut(block).get_mut(mov_id);
        *mov.operand_mut(0) = Operand::from_physical_reg(scratch, 8);

        let ldr = func.block_mut(block).get_mut(ldr_id);
        *ldr.operand_mut(1) = Operand::from_aarch64_addr(
            AArch64Address::BaseOffsetReg {
                base: Register::Physical(SP),
                offset: Register::Physical(scratch),
            },
            8,
        );

        ldr_id
    }

    fn is_func_exit(&self, machine_opcode: mcode::Opcode) -> bool {
        machine_opcode == opcode::RET
    }

    fn sret_reg(&self) -> PhysicalReg {
        R8
    }

    fn sret_uses_first_arg_reg(&self) -> bool {
        false
    }
}
