//! AArch64 instruction selection.

use opal_codegen::{LowerCtx, TargetSsaLowerer};
use opal_mcode as mcode;
use opal_mcode::{
    AArch64Address, AArch64Condition, CallingConvention, Directive, InstrFlags, Instruction,
    Operand, Register, Relocation, StackSlotId, Symbol,
};
use opal_ssa as ssa;
use opal_ssa::{Comparison, DataLayout, LargeInt, Type};

use crate::aarch64::aapcs_calling_conv::AapcsCallingConv;
use crate::aarch64::immediate;
use crate::aarch64::opcode;
use crate::aarch64::register::{R0, SP, V0};
use crate::description::{CodeModel, TargetDescription};

pub struct AArch64SsaLowerer {
    pub descr: TargetDescription,
    pub code_model: CodeModel,
    next_const_index: u32,
}

impl AArch64SsaLowerer {
    pub fn new(descr: TargetDescription, code_model: CodeModel) -> Self {
        Self {
            descr,
            code_model,
            next_const_index: 0,
        }
    }

    /// Lowers any value into an operand, materialising constants and
    /// symbols into registers.
    pub fn lower_value(&mut self, ctx: &mut LowerCtx, value: &ssa::Value) -> Operand {
        let size = ctx.size(value.ty) as u8;

        match &value.kind {
            ssa::ValueKind::IntImmediate(imm) => self.move_int_into_register(ctx, *imm, size),
            ssa::ValueKind::FpImmediate(imm) => self.move_float_into_register(ctx, *imm, size),
            ssa::ValueKind::Register(reg) => self.lower_reg_val(ctx, *reg, size),
            ssa::ValueKind::Symbol { .. } => {
                self.move_symbol_into_register(ctx, value.symbol_name())
            }
            _ => unreachable!("value cannot be lowered"),
        }
    }

    fn lower_reg_val(
        &mut self,
        ctx: &mut LowerCtx,
        vreg: ssa::VirtualRegister,
        size: u8,
    ) -> Operand {
        let reg = ctx.map_vreg(vreg);

        if let Register::StackSlot(slot) = reg {
            // Allocas decay to an SP-relative address.
            let tmp = ctx.new_vreg();
            ctx.emit(Instruction::new(
                opcode::ADD,
                vec![
                    Operand::from_register(tmp, size),
                    Operand::from_physical_reg(SP, size),
                    Operand::from_stack_slot_offset(slot, 0),
                ],
            ));
            return Operand::from_register(tmp, size);
        }

        Operand::from_register(reg, size)
    }

    pub fn lower_address(&mut self, ctx: &mut LowerCtx, operand: &ssa::Value) -> Operand {
        match &operand.kind {
            ssa::ValueKind::Register(vreg) => {
                let reg = ctx.map_vreg(*vreg);
                if reg.is_stack_slot() {
                    Operand::from_register(reg, 8)
                } else {
                    Operand::from_aarch64_addr(AArch64Address::Base(reg), 0)
                }
            }
            ssa::ValueKind::Symbol { .. } => {
                let addr_reg = self.move_symbol_into_register(ctx, operand.symbol_name());
                Operand::from_aarch64_addr(AArch64Address::Base(addr_reg.register()), 0)
            }
            _ => unreachable!("operand is not an address"),
        }
    }

    fn move_int_into_register(
        &mut self,
        ctx: &mut LowerCtx,
        value: LargeInt,
        size: u8,
    ) -> Operand {
        let bits = value.to_bits();
        let result = Operand::from_register(ctx.new_vreg(), size);

        // Zero moves directly; MOV of an immediate clears the upper bits.
        if bits == 0 {
            ctx.emit(Instruction::new(
                opcode::MOV,
                vec![result.clone(), Operand::from_int_immediate(0, 0)],
            ));
            return result;
        }

        match size {
            1 | 2 => {
                ctx.emit(Instruction::new(
                    opcode::MOV,
                    vec![result.clone(), Operand::from_int_immediate(bits as i64, 0)],
                ));
            }
            4 => {
                let elements = opal_common::bits::decompose_u32_u16(bits as u32);
                self.move_elements_into_register(ctx, &result, &elements);
            }
            8 => {
                let elements = opal_common::bits::decompose_u64_u16(bits);
                self.move_elements_into_register(ctx, &result, &elements);
            }
            _ => unreachable!("integer immediate of size {}", size),
        }

        result
    }

    fn move_elements_into_register(
        &mut self,
        ctx: &mut LowerCtx,
        value: &Operand,
        elements: &[u16],
    ) {
        let non_zero: Vec<usize> = (0..elements.len())
            .filter(|&i| elements[i] != 0)
            .collect();

        // A single MOVZ covers values with one non-zero 16-bit chunk.
        if non_zero.len() == 1 {
            let index = non_zero[0];
            ctx.emit(Instruction::new(
                opcode::MOVZ,
                vec![
                    value.clone(),
                    Operand::from_int_immediate(elements[index] as i64, 0),
                    Operand::from_aarch64_left_shift(16 * index as u32),
                ],
            ));
            return;
        }

        // Move the lowest chunk and zero the rest, then patch the non-zero
        // chunks in with MOVK.
        ctx.emit(Instruction::new(
            opcode::MOVZ,
            vec![
                value.clone(),
                Operand::from_int_immediate(elements[0] as i64, 0),
            ],
        ));

        for (index, &element) in elements.iter().enumerate().skip(1) {
            if element == 0 {
                continue;
            }

            ctx.emit(Instruction::new(
                opcode::MOVK,
                vec![
                    value.clone(),
                    Operand::from_int_immediate(element as i64, 0),
                    Operand::from_aarch64_left_shift(16 * index as u32),
                ],
            ));
        }
    }

    fn move_float_into_register(&mut self, ctx: &mut LowerCtx, value: f64, size: u8) -> Operand {
        let result = Operand::from_register(ctx.new_vreg(), size);

        // FMOV covers values representable in its 8-bit immediate.
        if immediate::is_float_encodable(value) {
            ctx.emit(Instruction::new(
                opcode::FMOV,
                vec![result.clone(), Operand::from_fp_immediate(value)],
            ));
            return result;
        }

        if size == 4 {
            // Build the bit pattern in a general-purpose register, then
            // move it across to the vector register.
            let bits = opal_common::bits::bits_of_f32(value as f32);
            let elements = opal_common::bits::decompose_u32_u16(bits);

            let bits_value = Operand::from_register(ctx.new_vreg(), size);
            self.move_elements_into_register(ctx, &bits_value, &elements);
            ctx.emit(Instruction::new(
                opcode::FMOV,
                vec![result.clone(), bits_value],
            ));
        } else {
            let label = format!("double.{}", self.next_const_index);
            self.next_const_index += 1;

            ctx.machine_module.add_global(mcode::Global {
                name: label.clone(),
                size: 8,
                alignment: 8,
                value: mcode::GlobalValue::Fp(value),
            });

            let addr = self.move_symbol_into_register(ctx, &label);
            ctx.emit(Instruction::new(
                opcode::LDR,
                vec![
                    result.clone(),
                    Operand::from_aarch64_addr(AArch64Address::Base(addr.register()), 0),
                ],
            ));
        }

        result
    }

    /// Materialises a symbol's address with the ADRP + ADD page idiom.
    pub fn move_symbol_into_register(&mut self, ctx: &mut LowerCtx, symbol: &str) -> Operand {
        let result = Operand::from_register(ctx.new_vreg(), 8);
        let is_darwin = self.descr.is_darwin();

        let symbol_page = if is_darwin {
            Symbol::with_directive(symbol, Directive::Page)
        } else {
            Symbol::new(symbol)
        };

        let symbol_pageoff = if is_darwin {
            Symbol::with_directive(symbol, Directive::PageOff)
        } else {
            Symbol::with_reloc(symbol, Relocation::Lo12)
        };

        ctx.emit(Instruction::new(
            opcode::ADRP,
            vec![result.clone(), Operand::from_symbol(symbol_page, 8)],
        ));
        ctx.emit(Instruction::new(
            opcode::ADD,
            vec![
                result.clone(),
                result.clone(),
                Operand::from_symbol(symbol_pageoff, 8),
            ],
        ));

        result
    }

    fn calculate_address(
        &mut self,
        ctx: &mut LowerCtx,
        dst: Operand,
        base: Operand,
        reg_offset: Option<(Register, u32)>,
        imm_offset: i64,
    ) {
        if let Some((offset_reg, scale)) = reg_offset {
            let offset = Operand::from_register(offset_reg, 8);

            let shift_amount = match scale {
                1 => Some(0),
                2 => Some(1),
                4 => Some(2),
                8 => Some(3),
                _ => None,
            };

            match shift_amount {
                Some(shift) => {
                    ctx.emit(Instruction::new(
                        opcode::ADD,
                        vec![dst, base, offset, Operand::from_aarch64_left_shift(shift)],
                    ));
                }
                None => {
                    let scale_value =
                        self.move_int_into_register(ctx, LargeInt::from(scale as u64), 8);
                    ctx.emit(Instruction::new(
                        opcode::MUL,
                        vec![offset.clone(), offset.clone(), scale_value],
                    ));
                    ctx.emit(Instruction::new(opcode::ADD, vec![dst, base, offset]));
                }
            }
        } else if (0..4096).contains(&imm_offset) {
            ctx.emit(Instruction::new(
                opcode::ADD,
                vec![dst, base, Operand::from_int_immediate(imm_offset, 8)],
            ));
        } else {
            let offset = self.move_int_into_register(ctx, LargeInt::from(imm_offset), 8);
            ctx.emit(Instruction::new(opcode::ADD, vec![dst, base, offset]));
        }
    }

    pub fn lower_condition(cmp: Comparison) -> AArch64Condition {
        match cmp {
            Comparison::Eq | Comparison::Feq => AArch64Condition::Eq,
            Comparison::Ne | Comparison::Fne => AArch64Condition::Ne,
            Comparison::Ugt => AArch64Condition::Hi,
            Comparison::Uge => AArch64Condition::Hs,
            Comparison::Ult => AArch64Condition::Lo,
            Comparison::Ule => AArch64Condition::Ls,
            Comparison::Sgt | Comparison::Fgt => AArch64Condition::Gt,
            Comparison::Sge | Comparison::Fge => AArch64Condition::Ge,
            Comparison::Slt | Comparison::Flt => AArch64Condition::Lt,
            Comparison::Sle | Comparison::Fle => AArch64Condition::Le,
        }
    }

    fn move_branch_args(&mut self, ctx: &mut LowerCtx, target: &ssa::BranchTarget) {
        for (i, arg) in target.args.iter().enumerate() {
            let param_reg = ctx.func.block(target.block).param_regs[i];
            let size = ctx.size(arg.ty) as u8;
            let dst = Operand::from_virtual_reg(param_reg, size);

            let move_opcode = if arg.ty.is_floating_point() {
                opcode::FMOV
            } else {
                opcode::MOV
            };

            let src = self.lower_value(ctx, arg);
            ctx.emit(Instruction::with_flags(
                move_opcode,
                vec![dst, src],
                InstrFlags::CALL_ARG,
            ));
        }
    }

    fn lower_fp_operation(
        &mut self,
        ctx: &mut LowerCtx,
        fp_opcode: mcode::Opcode,
        instr: &ssa::Instruction,
    ) {
        let size = ctx.size(instr.operand(0).ty) as u8;

        let lhs = self.lower_value(ctx, instr.operand(0));
        let rhs = self.lower_value(ctx, instr.operand(1));
        let dst = ctx.map_vreg_dst(instr, size);
        ctx.emit(Instruction::new(fp_opcode, vec![dst, lhs, rhs]));
    }

    fn lower_int_operation(
        &mut self,
        ctx: &mut LowerCtx,
        int_opcode: mcode::Opcode,
        instr: &ssa::Instruction,
    ) {
        let size = ctx.size(instr.operand(0).ty) as u8;

        let lhs = self.lower_value(ctx, instr.operand(0));
        let rhs = self.lower_value(ctx, instr.operand(1));
        let dst = ctx.map_vreg_dst(instr, size);
        ctx.emit(Instruction::new(int_opcode, vec![dst, lhs, rhs]));
    }

    /// SDIV/UDIV followed by MUL and SUB recovers the remainder.
    fn lower_remainder(
        &mut self,
        ctx: &mut LowerCtx,
        div_opcode: mcode::Opcode,
        instr: &ssa::Instruction,
    ) {
        let size = ctx.size(instr.operand(0).ty) as u8;

        let dividend = self.lower_value(ctx, instr.operand(0));
        let divisor = self.lower_value(ctx, instr.operand(1));
        let quotient = Operand::from_register(ctx.new_vreg(), size);
        let scaled = Operand::from_register(ctx.new_vreg(), size);
        let remainder = ctx.map_vreg_dst(instr, size);

        ctx.emit(Instruction::new(
            div_opcode,
            vec![quotient.clone(), dividend.clone(), divisor.clone()],
        ));
        ctx.emit(Instruction::new(
            opcode::MUL,
            vec![scaled.clone(), quotient, divisor],
        ));
        ctx.emit(Instruction::new(
            opcode::SUB,
            vec![remainder, dividend, scaled],
        ));
    }

    fn emit_cond_branch(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction, cmp_opcode: mcode::Opcode) {
        let comparison = instr.operand(1).comparison();
        let true_target = instr.operand(3).branch_target();
        let false_target = instr.operand(4).branch_target();

        self.move_branch_args(ctx, true_target);
        self.move_branch_args(ctx, false_target);

        let lhs = self.lower_value(ctx, instr.operand(0));
        let rhs = self.lower_value(ctx, instr.operand(2));
        ctx.emit(Instruction::new(cmp_opcode, vec![lhs, rhs]));

        let next_block = ctx.next_block_in_layout();
        let true_label = ctx.func.block(true_target.block).label.clone();
        let false_label = ctx.func.block(false_target.block).label.clone();

        if Some(true_target.block) == next_block {
            let condition = Self::lower_condition(comparison.invert());
            ctx.emit(Instruction::new(
                opcode::branch_for_condition(condition),
                vec![Operand::from_label(false_label)],
            ));
        } else {
            let condition = Self::lower_condition(comparison);
            ctx.emit(Instruction::new(
                opcode::branch_for_condition(condition),
                vec![Operand::from_label(true_label)],
            ));

            if Some(false_target.block) != next_block {
                ctx.emit(Instruction::new(
                    opcode::B,
                    vec![Operand::from_label(false_label)],
                ));
            }
        }
    }

    fn copy_block_using_loads(
        &mut self,
        ctx: &mut LowerCtx,
        dst_base: Register,
        src_base: Register,
        mut size: u32,
    ) {
        let mut offset = 0i32;

        for (load_opcode, store_opcode, chunk) in [
            (opcode::LDR, opcode::STR, 8u32),
            (opcode::LDR, opcode::STR, 4),
            (opcode::LDRH, opcode::STRH, 2),
            (opcode::LDRB, opcode::STRB, 1),
        ] {
            while size >= chunk {
                let tmp = Operand::from_register(ctx.new_vreg(), chunk as u8);
                let src_addr = AArch64Address::BaseOffsetImm {
                    base: src_base,
                    offset,
                };
                let dst_addr = AArch64Address::BaseOffsetImm {
                    base: dst_base,
                    offset,
                };

                ctx.emit(Instruction::new(
                    load_opcode,
                    vec![tmp.clone(), Operand::from_aarch64_addr(src_addr, chunk as u8)],
                ));
                ctx.emit(Instruction::new(
                    store_opcode,
                    vec![tmp, Operand::from_aarch64_addr(dst_addr, chunk as u8)],
                ));

                size -= chunk;
                offset += chunk as i32;
            }
        }
    }
}

impl TargetSsaLowerer for AArch64SsaLowerer {
    fn data_layout(&self) -> DataLayout {
        DataLayout::default()
    }

    fn calling_convention(&self, conv: ssa::CallingConv) -> &'static dyn CallingConvention {
        match conv {
            ssa::CallingConv::AArch64Aapcs => &AapcsCallingConv::INSTANCE,
            _ => unreachable!("calling convention is not available on AArch64"),
        }
    }

    fn store_sret_pointer(&mut self, ctx: &mut LowerCtx, slot: StackSlotId) {
        let sret_reg = ctx.machine_func.calling_conv.sret_reg();

        let mut instr = Instruction::new(
            opcode::STR,
            vec![
                Operand::from_physical_reg(sret_reg, 8),
                Operand::from_stack_slot(slot, 8),
            ],
        );
        instr.flags |= InstrFlags::ARG_STORE;
        ctx.emit(instr);
    }

    fn lower_load(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let ty = instr.operand(0).ty;
        let size = ctx.size(ty) as u8;

        let load_opcode = match size {
            1 => opcode::LDRB,
            2 => opcode::LDRH,
            _ => opcode::LDR,
        };

        let m_dst = ctx.map_vreg_dst(instr, size);
        let m_src = self.lower_address(ctx, instr.operand(1)).with_size(size);

        let mut m_instr = Instruction::new(load_opcode, vec![m_dst, m_src]);
        if ty.is_floating_point() {
            m_instr.flags |= InstrFlags::FLOAT;
        }
        ctx.emit(m_instr);
    }

    fn lower_store(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let size = ctx.size(instr.operand(0).ty) as u8;

        let store_opcode = match size {
            1 => opcode::STRB,
            2 => opcode::STRH,
            _ => opcode::STR,
        };

        let m_src = self.lower_value(ctx, instr.operand(0));
        let m_dst = self.lower_address(ctx, instr.operand(1)).with_size(size);

        let id = ctx.emit(Instruction::new(store_opcode, vec![m_src, m_dst]));
        if instr.attrs.contains(ssa::InstrAttrs::SAVE_ARG) {
            ctx.emitted_instr_mut(id).flags |= InstrFlags::ARG_STORE;
        }
    }

    fn lower_loadarg(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let ty = instr.operand(0).ty;
        let param_index = instr.operand(1).int_immediate().to_u64() as usize;
        let size = ctx.size(ty) as u8;
        let is_fp = ty.is_floating_point();

        let storage = ctx.arg_storage()[param_index];
        let src_reg = match storage {
            mcode::ArgStorage::InReg(reg) => Register::Physical(reg),
            mcode::ArgStorage::OnStack { .. } => {
                let mcode::ParamStorage::Slot(slot) = ctx.machine_func.parameters[param_index].storage
                else {
                    unreachable!("stack parameter without a stack slot")
                };
                Register::StackSlot(slot)
            }
        };

        let move_opcode = if is_fp { opcode::FMOV } else { opcode::MOV };
        let m_dst = ctx.map_vreg_dst(instr, size);

        let mut m_instr = Instruction::new(
            move_opcode,
            vec![m_dst, Operand::from_register(src_reg, size)],
        );
        m_instr.flags |= InstrFlags::ARG_STORE;
        ctx.emit(m_instr);
    }

    fn lower_add(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        self.lower_int_operation(ctx, opcode::ADD, instr);
    }

    fn lower_sub(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        self.lower_int_operation(ctx, opcode::SUB, instr);
    }

    fn lower_mul(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        // MUL takes no immediate operand.
        self.lower_int_operation(ctx, opcode::MUL, instr);
    }

    fn lower_sdiv(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        self.lower_int_operation(ctx, opcode::SDIV, instr);
    }

    fn lower_srem(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        self.lower_remainder(ctx, opcode::SDIV, instr);
    }

    fn lower_udiv(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        self.lower_int_operation(ctx, opcode::UDIV, instr);
    }

    fn lower_urem(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        self.lower_remainder(ctx, opcode::UDIV, instr);
    }

    fn lower_fadd(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        self.lower_fp_operation(ctx, opcode::FADD, instr);
    }

    fn lower_fsub(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        self.lower_fp_operation(ctx, opcode::FSUB, instr);
    }

    fn lower_fmul(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        self.lower_fp_operation(ctx, opcode::FMUL, instr);
    }

    fn lower_fdiv(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        self.lower_fp_operation(ctx, opcode::FDIV, instr);
    }

    fn lower_and(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        self.lower_int_operation(ctx, opcode::AND, instr);
    }

    fn lower_or(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        self.lower_int_operation(ctx, opcode::ORR, instr);
    }

    fn lower_xor(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        self.lower_int_operation(ctx, opcode::EOR, instr);
    }

    fn lower_shl(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        self.lower_int_operation(ctx, opcode::LSL, instr);
    }

    fn lower_shr(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        self.lower_int_operation(ctx, opcode::ASR, instr);
    }

    fn lower_jmp(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let target = instr.operand(0).branch_target();
        self.move_branch_args(ctx, target);

        if Some(target.block) != ctx.next_block_in_layout() {
            let label = ctx.func.block(target.block).label.clone();
            ctx.emit(Instruction::new(opcode::B, vec![Operand::from_label(label)]));
        }
    }

    fn lower_cjmp(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        self.emit_cond_branch(ctx, instr, opcode::CMP);
    }

    fn lower_fcjmp(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        self.emit_cond_branch(ctx, instr, opcode::FCMP);
    }

    fn lower_select(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let size = ctx.size(instr.operand(0).ty) as u8;
        let is_fp = instr.operand(0).ty.is_floating_point();

        let lhs = self.lower_value(ctx, instr.operand(0));
        let rhs = self.lower_value(ctx, instr.operand(2));
        ctx.emit(Instruction::new(
            if is_fp { opcode::FCMP } else { opcode::CMP },
            vec![lhs, rhs],
        ));

        let condition = Self::lower_condition(instr.operand(1).comparison());
        let val_true = self.lower_value(ctx, instr.operand(3));
        let val_false = self.lower_value(ctx, instr.operand(4));
        let dst = ctx.map_vreg_dst(instr, size);

        ctx.emit(Instruction::new(
            if is_fp { opcode::FCSEL } else { opcode::CSEL },
            vec![
                dst,
                val_true,
                val_false,
                Operand::from_aarch64_condition(condition),
            ],
        ));
    }

    fn lower_call(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        AapcsCallingConv::lower_call(self, ctx, instr);
    }

    fn lower_ret(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        if let Some(sret_slot) = ctx.sret_slot {
            let return_size = ctx.size(ctx.func.return_type);

            let dst = Operand::from_register(ctx.new_vreg(), 8);
            ctx.emit(Instruction::new(
                opcode::LDR,
                vec![dst.clone(), Operand::from_stack_slot(sret_slot, 8)],
            ));

            let src = self.lower_value(ctx, instr.operand(0));
            self.copy_block_using_loads(ctx, dst.register(), src.register(), return_size);

            ctx.emit(Instruction::new(
                opcode::MOV,
                vec![Operand::from_physical_reg(R0, 8), dst],
            ));
            ctx.emit(Instruction::new(opcode::RET, vec![]));
            return;
        }

        if !instr.operands.is_empty() {
            let ty = instr.operand(0).ty;
            let is_fp = ty.is_floating_point();

            let move_opcode = if is_fp { opcode::FMOV } else { opcode::MOV };
            let return_reg = if is_fp { V0 } else { R0 };

            let src = self.lower_value(ctx, instr.operand(0));
            let dst = Operand::from_physical_reg(return_reg, src.size);
            ctx.emit(Instruction::new(move_opcode, vec![dst, src]));
        }

        ctx.emit(Instruction::new(opcode::RET, vec![]));
    }

    fn lower_uextend(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let m_dst = ctx.map_vreg_dst(instr, 4);
        let m_src = self.lower_value(ctx, instr.operand(0));
        ctx.emit(Instruction::new(opcode::MOV, vec![m_dst, m_src]));
    }

    fn lower_sextend(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let m_dst = ctx.map_vreg_dst(instr, 8);
        let m_src = self.lower_value(ctx, instr.operand(0));
        ctx.emit(Instruction::new(opcode::SXTW, vec![m_dst, m_src]));
    }

    fn lower_truncate(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let dst_size = ctx.size(instr.operand(1).ty) as u8;

        let m_dst = ctx.map_vreg_dst(instr, dst_size);
        let m_src = self.lower_value(ctx, instr.operand(0)).with_size(dst_size);
        ctx.emit(Instruction::new(opcode::MOV, vec![m_dst, m_src]));
    }

    fn lower_fpromote(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let m_dst = ctx.map_vreg_dst(instr, 8);
        let m_src = self.lower_value(ctx, instr.operand(0));
        ctx.emit(Instruction::new(opcode::FCVT, vec![m_dst, m_src]));
    }

    fn lower_fdemote(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let m_dst = ctx.map_vreg_dst(instr, 4);
        let m_src = self.lower_value(ctx, instr.operand(0));
        ctx.emit(Instruction::new(opcode::FCVT, vec![m_dst, m_src]));
    }

    fn lower_utof(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let size = ctx.size(instr.operand(1).ty) as u8;
        let m_dst = ctx.map_vreg_dst(instr, size);
        let m_src = self.lower_value(ctx, instr.operand(0));
        ctx.emit(Instruction::new(opcode::UCVTF, vec![m_dst, m_src]));
    }

    fn lower_stof(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let size = ctx.size(instr.operand(1).ty) as u8;
        let m_dst = ctx.map_vreg_dst(instr, size);
        let m_src = self.lower_value(ctx, instr.operand(0));
        ctx.emit(Instruction::new(opcode::SCVTF, vec![m_dst, m_src]));
    }

    fn lower_ftou(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let size = ctx.size(instr.operand(1).ty) as u8;
        let m_dst = ctx.map_vreg_dst(instr, size);
        let m_src = self.lower_value(ctx, instr.operand(0));
        ctx.emit(Instruction::new(opcode::FCVTZU, vec![m_dst, m_src]));
    }

    fn lower_ftos(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let size = ctx.size(instr.operand(1).ty) as u8;
        let m_dst = ctx.map_vreg_dst(instr, size);
        let m_src = self.lower_value(ctx, instr.operand(0));
        ctx.emit(Instruction::new(opcode::FCVTZS, vec![m_dst, m_src]));
    }

    fn lower_offsetptr(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let index = instr.operand(1);
        let base_type = instr.operand(2).ty;
        let elem_size = ctx.size(base_type);

        let base = self.lower_value(ctx, instr.operand(0));
        let dst = ctx.map_vreg_dst(instr, 8);

        if index.is_int_immediate() {
            let imm_offset = index.int_immediate().to_i64() * elem_size as i64;
            self.calculate_address(ctx, dst, base, None, imm_offset);
        } else {
            let offset_reg = ctx.map_vreg_as_reg(index.register());
            self.calculate_address(ctx, dst, base, Some((offset_reg, elem_size)), 0);
        }
    }

    fn lower_memberptr(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let struct_id = instr
            .operand(0)
            .ty
            .struct_id()
            .expect("memberptr aggregate operand is not a struct");
        let member_index = instr.operand(2).int_immediate().to_u64() as usize;

        let byte_offset = ctx.member_offset(struct_id, member_index) as i64;
        let base = self.lower_value(ctx, instr.operand(1));
        let dst = ctx.map_vreg_dst(instr, 8);

        self.calculate_address(ctx, dst, base, None, byte_offset);
    }

    fn lower_copy(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let size = ctx.size(instr.operand(2).ty);

        if size <= 64 {
            let dst_base = self.lower_value(ctx, instr.operand(0));
            let src_base = self.lower_value(ctx, instr.operand(1));
            self.copy_block_using_loads(ctx, dst_base.register(), src_base.register(), size);
            return;
        }

        let call = ssa::Instruction::new(
            ssa::Opcode::Call,
            vec![
                ssa::Value::from_extern_func("memcpy", Type::Void),
                instr.operand(0).clone(),
                instr.operand(1).clone(),
                ssa::Value::from_int_immediate(size as i64, Type::I64),
            ],
        );
        self.lower_call(ctx, &call);
    }
}
