//! x86-64 instruction selection.

use opal_codegen::{LowerCtx, TargetSsaLowerer};
use opal_mcode as mcode;
use opal_mcode::{
    CallingConvention, IndirectAddress, InstrFlags, Instruction, Operand, Register, Relocation,
    StackSlotId, Symbol,
};
use opal_ssa as ssa;
use opal_ssa::{Comparison, DataLayout, LargeInt, Type};

use crate::description::{CodeModel, TargetDescription};
use crate::x86_64::const_lowering::ConstLowering;
use crate::x86_64::ms_abi_calling_conv::MsAbiCallingConv;
use crate::x86_64::opcode;
use crate::x86_64::register::{RAX, RCX, RDX, XMM0};
use crate::x86_64::sys_v_calling_conv::SysVCallingConv;

pub const PTR_SIZE: u8 = 8;

/// Tweaks how a value is turned into an operand.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueLowerFlags {
    /// Allow folding a single-use load into an address operand.
    pub allow_addrs: bool,
    /// The value is a call target.
    pub is_callee: bool,
}

pub struct X64SsaLowerer {
    pub descr: TargetDescription,
    pub code_model: CodeModel,
    pub(super) const_lowering: ConstLowering,
}

impl X64SsaLowerer {
    pub fn new(descr: TargetDescription, code_model: CodeModel) -> Self {
        Self {
            descr,
            code_model,
            const_lowering: ConstLowering::new(),
        }
    }

    pub fn get_move_opcode(ty: Type) -> mcode::Opcode {
        match ty {
            Type::F32 => opcode::MOVSS,
            Type::F64 => opcode::MOVSD,
            _ => opcode::MOV,
        }
    }

    fn condition_code(cmp: Comparison) -> i32 {
        use opcode::condition_code as cc;

        match cmp {
            Comparison::Eq | Comparison::Feq => cc::E,
            Comparison::Ne | Comparison::Fne => cc::NE,
            Comparison::Ugt | Comparison::Fgt => cc::A,
            Comparison::Uge | Comparison::Fge => cc::AE,
            Comparison::Ult | Comparison::Flt => cc::B,
            Comparison::Ule | Comparison::Fle => cc::BE,
            Comparison::Sgt => cc::G,
            Comparison::Sge => cc::GE,
            Comparison::Slt => cc::L,
            Comparison::Sle => cc::LE,
        }
    }

    fn jcc_opcode(cmp: Comparison) -> mcode::Opcode {
        opcode::JCC + Self::condition_code(cmp)
    }

    fn cmovcc_opcode(cmp: Comparison) -> mcode::Opcode {
        opcode::CMOVCC + Self::condition_code(cmp)
    }

    /// "mov lhs into the destination, then op destination, rhs".
    fn append_mov_and_operation(
        &mut self,
        ctx: &mut LowerCtx,
        machine_opcode: mcode::Opcode,
        dst: ssa::VirtualRegister,
        lhs: &ssa::Value,
        rhs: &ssa::Value,
    ) {
        let size = ctx.size(lhs.ty) as u8;
        let m_dst = ctx.map_vreg_as_operand(dst, size);

        self.lower_as_move(ctx, m_dst.clone(), lhs);
        let m_rhs = self.lower_as_operand_with(
            ctx,
            rhs,
            ValueLowerFlags {
                allow_addrs: !m_dst.is_stack_slot(),
                ..Default::default()
            },
        );
        ctx.emit(Instruction::new(machine_opcode, vec![m_dst, m_rhs]));
    }

    pub fn lower_as_move_into_reg(
        &mut self,
        ctx: &mut LowerCtx,
        reg: Register,
        value: &ssa::Value,
    ) -> Operand {
        let size = ctx.size(value.ty) as u8;
        let m_dst = Operand::from_register(reg, size);
        self.lower_as_move(ctx, m_dst, value)
    }

    pub fn lower_as_move(&mut self, ctx: &mut LowerCtx, m_dst: Operand, value: &ssa::Value) -> Operand {
        match &value.kind {
            ssa::ValueKind::IntImmediate(imm) => self.lower_int_imm_as_move(ctx, m_dst, *imm),
            ssa::ValueKind::FpImmediate(imm) => self.lower_fp_imm_as_move(ctx, m_dst, *imm),
            ssa::ValueKind::Register(reg) => self.lower_reg_as_move(ctx, m_dst, *reg, value.ty),
            ssa::ValueKind::Symbol { .. } => {
                let m_src = self.lower_as_operand(ctx, value);
                ctx.emit(Instruction::new(opcode::MOV, vec![m_dst.clone(), m_src]));
                m_dst
            }
            _ => unreachable!("value cannot be moved"),
        }
    }

    fn lower_int_imm_as_move(
        &mut self,
        ctx: &mut LowerCtx,
        mut m_dst: Operand,
        value: LargeInt,
    ) -> Operand {
        // `XOR dst, dst` for zeroing saves code size and modern CPUs
        // recognize the idiom.
        if value.is_zero() && (m_dst.is_virtual_reg() || m_dst.is_physical_reg()) {
            // The 32-bit form zero-extends, so the REX prefix can often be
            // omitted.
            m_dst.size = m_dst.size.min(4);

            ctx.emit(Instruction::new(
                opcode::XOR,
                vec![m_dst.clone(), m_dst.clone()],
            ));
            return m_dst;
        }

        let m_src = Operand::from_int_immediate(value.to_i64(), m_dst.size);
        ctx.emit(Instruction::new(opcode::MOV, vec![m_dst.clone(), m_src]));
        m_dst
    }

    fn lower_fp_imm_as_move(
        &mut self,
        ctx: &mut LowerCtx,
        m_dst: Operand,
        value: f64,
    ) -> Operand {
        // `XORP[S,D] dst, dst` generates a floating-point zero without a
        // memory load.
        if value == 0.0 {
            let m_opcode = if m_dst.size == 4 {
                opcode::XORPS
            } else {
                opcode::XORPD
            };

            if m_dst.is_register() && !m_dst.is_stack_slot() {
                ctx.emit(Instruction::new(m_opcode, vec![m_dst.clone(), m_dst.clone()]));
            } else {
                let m_tmp = Operand::from_register(ctx.new_vreg(), m_dst.size);
                let m_mov = if m_dst.size == 4 {
                    opcode::MOVSS
                } else {
                    opcode::MOVSD
                };

                ctx.emit(Instruction::new(m_opcode, vec![m_tmp.clone(), m_tmp.clone()]));
                ctx.emit(Instruction::new(m_mov, vec![m_dst.clone(), m_tmp]));
            }

            return m_dst;
        }

        let m_opcode = if m_dst.size == 4 {
            opcode::MOVSS
        } else {
            opcode::MOVSD
        };
        let m_src = self.create_fp_const_load(ctx, value, m_dst.size);

        if m_src.is_symbol_deref() && !m_dst.is_register() {
            // Memory-to-memory moves need an intermediate register.
            let m_tmp = Operand::from_register(ctx.new_vreg(), m_dst.size);
            ctx.emit(Instruction::new(m_opcode, vec![m_tmp.clone(), m_src]));
            ctx.emit(Instruction::new(m_opcode, vec![m_dst.clone(), m_tmp]));
        } else {
            ctx.emit(Instruction::new(m_opcode, vec![m_dst.clone(), m_src]));
        }

        m_dst
    }

    fn lower_reg_as_move(
        &mut self,
        ctx: &mut LowerCtx,
        m_dst: Operand,
        src_reg: ssa::VirtualRegister,
        ty: Type,
    ) -> Operand {
        let m_src = ctx.map_vreg_as_operand(src_reg, m_dst.size);

        if m_src.is_stack_slot() {
            // Allocas decay to their address.
            if m_dst.is_register() && !m_dst.is_stack_slot() {
                ctx.emit(Instruction::new(opcode::LEA, vec![m_dst.clone(), m_src]));
            } else {
                let m_tmp = Operand::from_register(ctx.new_vreg(), m_dst.size);
                ctx.emit(Instruction::new(opcode::LEA, vec![m_tmp.clone(), m_src]));
                ctx.emit(Instruction::new(opcode::MOV, vec![m_dst.clone(), m_tmp]));
            }
        } else if ty.is_floating_point() {
            let m_opcode = if m_dst.size == 4 {
                opcode::MOVSS
            } else {
                opcode::MOVSD
            };
            ctx.emit(Instruction::new(m_opcode, vec![m_dst.clone(), m_src]));
        } else {
            ctx.emit(Instruction::new(opcode::MOV, vec![m_dst.clone(), m_src]));
        }

        m_dst
    }

    pub fn lower_as_operand(&mut self, ctx: &mut LowerCtx, value: &ssa::Value) -> Operand {
        self.lower_as_operand_with(ctx, value, ValueLowerFlags::default())
    }

    pub fn lower_as_operand_with(
        &mut self,
        ctx: &mut LowerCtx,
        value: &ssa::Value,
        flags: ValueLowerFlags,
    ) -> Operand {
        let size = ctx.size(value.ty) as u8;

        match &value.kind {
            ssa::ValueKind::IntImmediate(imm) => self.lower_int_imm_as_operand(ctx, *imm, size),
            ssa::ValueKind::FpImmediate(imm) => self.lower_fp_imm_as_operand(ctx, *imm, size),
            ssa::ValueKind::Register(reg) => self.lower_reg_as_operand(ctx, *reg, size, flags),
            ssa::ValueKind::Symbol { .. } => self.lower_symbol_as_operand(ctx, value, size, flags),
            _ => unreachable!("value cannot be lowered as an operand"),
        }
    }

    fn lower_int_imm_as_operand(
        &mut self,
        ctx: &mut LowerCtx,
        value: LargeInt,
        size: u8,
    ) -> Operand {
        // Immediates wider than 32 bits cannot be encoded directly; route
        // them through a register with an extra `MOV`.
        if size == 8 && value.to_bits() >= (1u64 << 32) {
            let m_dst = Operand::from_register(ctx.new_vreg(), 8);
            let m_src = Operand::from_int_immediate(value.to_i64(), 8);
            ctx.emit(Instruction::new(opcode::MOV, vec![m_dst.clone(), m_src]));
            return m_dst;
        }

        Operand::from_int_immediate(value.to_i64(), size)
    }

    fn lower_fp_imm_as_operand(&mut self, ctx: &mut LowerCtx, value: f64, size: u8) -> Operand {
        let m_dst = Operand::from_register(ctx.new_vreg(), size);

        if value == 0.0 {
            let m_opcode = if size == 4 { opcode::XORPS } else { opcode::XORPD };
            ctx.emit(Instruction::new(m_opcode, vec![m_dst.clone(), m_dst.clone()]));
            return m_dst;
        }

        let m_opcode = if size == 4 { opcode::MOVSS } else { opcode::MOVSD };
        let m_src = self.create_fp_const_load(ctx, value, size);
        ctx.emit(Instruction::new(m_opcode, vec![m_dst.clone(), m_src]));
        m_dst
    }

    fn lower_reg_as_operand(
        &mut self,
        ctx: &mut LowerCtx,
        src_reg: ssa::VirtualRegister,
        size: u8,
        flags: ValueLowerFlags,
    ) -> Operand {
        let m_src = ctx.map_vreg_as_operand(src_reg, size);

        if m_src.is_stack_slot() {
            let m_dst = Operand::from_register(ctx.new_vreg(), size);
            ctx.emit(Instruction::new(opcode::LEA, vec![m_dst.clone(), m_src]));
            return m_dst;
        }

        if flags.allow_addrs {
            // A value produced by a single-use load can be read from memory
            // directly instead of passing through a register first.
            if let Some(producer) = ctx.producer(src_reg) {
                if producer.opcode == ssa::Opcode::Load && ctx.num_uses(src_reg) == 1 {
                    let m_load_src = self.lower_address(ctx, producer.operand(1));
                    ctx.discard_use(src_reg);
                    return m_load_src.with_size(size);
                }
            }
        }

        m_src
    }

    fn lower_symbol_as_operand(
        &mut self,
        ctx: &mut LowerCtx,
        value: &ssa::Value,
        size: u8,
        flags: ValueLowerFlags,
    ) -> Operand {
        let name = value.symbol_name();

        let mut reloc = Relocation::None;
        if self.descr.is_unix() {
            if value.is_extern_func() {
                reloc = Relocation::Plt;
            } else if value.is_extern_global() {
                reloc = Relocation::Got;
            }
        }

        let symbol = Symbol::with_reloc(name, reloc);

        if self.descr.is_darwin() && (value.is_func() || value.is_extern_func()) {
            return Operand::from_symbol(symbol, PTR_SIZE);
        }

        if flags.is_callee {
            return self.read_symbol_addr(ctx, symbol);
        }

        match self.code_model {
            CodeModel::Small => {
                let m_src = Operand::from_symbol_deref(symbol, size);
                let m_dst = Operand::from_register(ctx.new_vreg(), PTR_SIZE);
                ctx.emit(Instruction::new(opcode::LEA, vec![m_dst.clone(), m_src]));
                m_dst
            }
            CodeModel::Large => self.read_symbol_addr(ctx, symbol),
        }
    }

    pub fn read_symbol_addr(&mut self, ctx: &mut LowerCtx, symbol: Symbol) -> Operand {
        match self.code_model {
            CodeModel::Small => Operand::from_symbol(symbol, PTR_SIZE),
            CodeModel::Large => {
                let m_dst = Operand::from_register(ctx.new_vreg(), PTR_SIZE);
                let m_src = Operand::from_symbol(symbol, PTR_SIZE);
                ctx.emit(Instruction::new(opcode::MOV, vec![m_dst.clone(), m_src]));
                m_dst
            }
        }
    }

    pub fn deref_symbol_addr(&mut self, ctx: &mut LowerCtx, symbol: Symbol, size: u8) -> Operand {
        match self.code_model {
            CodeModel::Small => Operand::from_symbol_deref(symbol, size),
            CodeModel::Large => {
                let addr_reg = ctx.new_vreg();
                let m_dst = Operand::from_register(addr_reg, PTR_SIZE);
                let m_src = Operand::from_symbol(symbol, PTR_SIZE);
                ctx.emit(Instruction::new(opcode::MOV, vec![m_dst, m_src]));
                Operand::from_addr(IndirectAddress::base_only(addr_reg), size)
            }
        }
    }

    fn create_fp_const_load(&mut self, ctx: &mut LowerCtx, value: f64, size: u8) -> Operand {
        match size {
            4 => self.load_f32(ctx, value as f32),
            8 => self.load_f64(ctx, value),
            _ => unreachable!("floating-point operand of size {}", size),
        }
    }

    fn emit_shift(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction, shift_opcode: mcode::Opcode) {
        let size = ctx.size(instr.operand(0).ty) as u8;

        let op0 = Operand::from_register(ctx.new_vreg(), size);
        let m_lhs = self.lower_as_operand(ctx, instr.operand(0));
        ctx.emit(Instruction::new(opcode::MOV, vec![op0.clone(), m_lhs]));

        // The shift count must be an immediate or CL.
        let op1 = if instr.operand(1).is_int_immediate() {
            Operand::from_int_immediate(instr.operand(1).int_immediate().to_i64(), 1)
        } else {
            let rcx = Register::Physical(RCX);
            let m_count = self.lower_as_operand(ctx, instr.operand(1)).with_size(8);
            ctx.emit(Instruction::new(
                opcode::MOV,
                vec![Operand::from_register(rcx, 8), m_count],
            ));
            Operand::from_register(rcx, 1)
        };

        ctx.emit(Instruction::new(shift_opcode, vec![op0.clone(), op1]));

        let dst = ctx.map_vreg_dst(instr, size);
        ctx.emit(Instruction::new(opcode::MOV, vec![dst, op0]));
    }

    fn emit_division(
        &mut self,
        ctx: &mut LowerCtx,
        instr: &ssa::Instruction,
        signed: bool,
        result_reg: mcode::PhysicalReg,
    ) {
        let size = ctx.size(instr.operand(0).ty) as u8;

        let m_lhs = self.lower_as_operand(ctx, instr.operand(0));
        ctx.emit(Instruction::new(
            opcode::MOV,
            vec![Operand::from_physical_reg(RAX, size), m_lhs],
        ));

        if signed {
            // Sign-extend the dividend into RDX.
            let extend = if size == 8 { opcode::CQO } else { opcode::CDQ };
            ctx.emit(Instruction::new(extend, vec![]));
        } else {
            // Unsigned division zero-extends through RDX.
            let rdx = Operand::from_physical_reg(RDX, 4);
            ctx.emit(Instruction::new(opcode::XOR, vec![rdx.clone(), rdx]));
        }

        let divisor = Operand::from_register(ctx.new_vreg(), size);
        let m_rhs = self.lower_as_operand(ctx, instr.operand(1));
        ctx.emit(Instruction::new(opcode::MOV, vec![divisor.clone(), m_rhs]));

        let div_opcode = if signed { opcode::IDIV } else { opcode::DIV };
        ctx.emit(Instruction::new(div_opcode, vec![divisor]));

        let dst = ctx.map_vreg_dst(instr, size);
        ctx.emit(Instruction::new(
            opcode::MOV,
            vec![dst, Operand::from_physical_reg(result_reg, size)],
        ));
    }

    fn emit_jcc(
        &mut self,
        ctx: &mut LowerCtx,
        instr: &ssa::Instruction,
        emit_comparison: impl FnOnce(&mut Self, &mut LowerCtx),
    ) {
        let comparison = instr.operand(1).comparison();
        let true_target = instr.operand(3).branch_target();
        let false_target = instr.operand(4).branch_target();

        let next_block = ctx.next_block_in_layout();
        let true_label = ctx.func.block(true_target.block).label.clone();
        let false_label = ctx.func.block(false_target.block).label.clone();

        if Some(true_target.block) == next_block {
            // Invert the branch and fall through into the true target.
            self.move_branch_args(ctx, false_target);

            emit_comparison(&mut *self, ctx);
            ctx.emit(Instruction::new(
                Self::jcc_opcode(comparison.invert()),
                vec![Operand::from_label(false_label)],
            ));

            self.move_branch_args(ctx, true_target);
        } else {
            self.move_branch_args(ctx, true_target);

            emit_comparison(&mut *self, ctx);
            ctx.emit(Instruction::new(
                Self::jcc_opcode(comparison),
                vec![Operand::from_label(true_label)],
            ));

            self.move_branch_args(ctx, false_target);

            if Some(false_target.block) != next_block {
                ctx.emit(Instruction::new(
                    opcode::JMP,
                    vec![Operand::from_label(false_label)],
                ));
            }
        }
    }

    /// Moves branch arguments into the target block's parameter registers.
    fn move_branch_args(&mut self, ctx: &mut LowerCtx, target: &ssa::BranchTarget) {
        for (i, arg) in target.args.iter().enumerate() {
            let param_reg = ctx.func.block(target.block).param_regs[i];
            let size = ctx.size(arg.ty) as u8;
            let dst = Operand::from_virtual_reg(param_reg, size);

            if arg.is_int_immediate() && arg.int_immediate().is_zero() {
                ctx.emit(Instruction::with_flags(
                    opcode::XOR,
                    vec![dst.clone(), dst],
                    InstrFlags::CALL_ARG,
                ));
            } else if arg.is_fp_immediate() && arg.fp_immediate() == 0.0 {
                ctx.emit(Instruction::with_flags(
                    opcode::XORPS,
                    vec![dst.clone(), dst],
                    InstrFlags::CALL_ARG,
                ));
            } else {
                let move_opcode = Self::get_move_opcode(arg.ty);
                let src = self.lower_as_operand(ctx, arg);
                if src != dst {
                    ctx.emit(Instruction::with_flags(
                        move_opcode,
                        vec![dst, src],
                        InstrFlags::CALL_ARG,
                    ));
                }
            }
        }
    }

    fn copy_block_using_movs(
        &mut self,
        ctx: &mut LowerCtx,
        dst_base: Register,
        src_base: Register,
        mut size: u32,
    ) {
        let mut offset = 0i32;

        for mov_size in [8u32, 4, 2, 1] {
            while size >= mov_size {
                let dst_addr = IndirectAddress::with_int_offset(dst_base, offset);
                let src_addr = IndirectAddress::with_int_offset(src_base, offset);
                let tmp = Operand::from_register(ctx.new_vreg(), mov_size as u8);

                ctx.emit(Instruction::new(
                    opcode::MOV,
                    vec![tmp.clone(), Operand::from_addr(src_addr, mov_size as u8)],
                ));
                ctx.emit(Instruction::new(
                    opcode::MOV,
                    vec![Operand::from_addr(dst_addr, mov_size as u8), tmp],
                ));

                size -= mov_size;
                offset += mov_size as i32;
            }
        }
    }

    /// Emits the call instruction itself and marks the return registers as
    /// defined so the allocator keeps live values out of them.
    pub fn append_call(&mut self, ctx: &mut LowerCtx, callee: &ssa::Value) {
        let m_callee = if callee.is_symbol() {
            self.lower_as_operand_with(
                ctx,
                callee,
                ValueLowerFlags {
                    is_callee: true,
                    ..Default::default()
                },
            )
        } else if callee.is_register() {
            let reg = callee.register();
            match ctx.producer(reg) {
                Some(producer) if producer.opcode == ssa::Opcode::Load => {
                    let address = self.lower_address(ctx, producer.operand(1));
                    ctx.discard_use(reg);
                    address
                }
                _ => ctx.map_vreg_as_operand(reg, PTR_SIZE),
            }
        } else {
            unreachable!("call target is neither a symbol nor a register")
        };

        let id = ctx.emit(Instruction::with_flags(
            opcode::CALL,
            vec![m_callee],
            InstrFlags::CALL,
        ));

        let call = ctx.emitted_instr_mut(id);
        call.add_reg_op(Register::Physical(RAX), mcode::RegUsage::Def);
        call.add_reg_op(Register::Physical(XMM0), mcode::RegUsage::Def);
    }

    /// Moves the return value out of RAX/XMM0 into the destination.
    pub fn append_ret_val_move(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let return_type = instr.operand(0).ty;
        let return_size = ctx.size(return_type) as u8;

        let (move_opcode, src_reg) = if return_type.is_floating_point() {
            (Self::get_move_opcode(return_type), XMM0)
        } else {
            (opcode::MOV, RAX)
        };

        let dest = instr.dest.expect("call has a destination");
        ctx.emit(Instruction::new(
            move_opcode,
            vec![
                Operand::from_virtual_reg(dest, return_size),
                Operand::from_physical_reg(src_reg, return_size),
            ],
        ));
    }
}

impl TargetSsaLowerer for X64SsaLowerer {
    fn data_layout(&self) -> DataLayout {
        DataLayout::default()
    }

    fn calling_convention(&self, conv: ssa::CallingConv) -> &'static dyn CallingConvention {
        match conv {
            ssa::CallingConv::X86_64SysV => &SysVCallingConv::INSTANCE,
            ssa::CallingConv::X86_64MsAbi => &MsAbiCallingConv::INSTANCE,
            _ => unreachable!("calling convention is not available on x86-64"),
        }
    }

    fn store_sret_pointer(&mut self, ctx: &mut LowerCtx, slot: StackSlotId) {
        let sret_reg = ctx.machine_func.calling_conv.sret_reg();

        let mut instr = Instruction::new(
            opcode::MOV,
            vec![
                Operand::from_stack_slot(slot, 8),
                Operand::from_physical_reg(sret_reg, 8),
            ],
        );
        instr.flags |= InstrFlags::ARG_STORE;
        ctx.emit(instr);
    }

    fn lower_load(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let ty = instr.operand(0).ty;
        let size = ctx.size(ty) as u8;

        let move_opcode = Self::get_move_opcode(ty);
        let m_dst = ctx.map_vreg_dst(instr, size);
        let m_src = self.lower_address(ctx, instr.operand(1)).with_size(size);
        ctx.emit(Instruction::new(move_opcode, vec![m_dst, m_src]));
    }

    fn lower_store(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let mut dst = self.lower_address(ctx, instr.operand(1));
        let value = instr.operand(0);

        let m_instr = if value.is_fp_immediate()
            && value.ty == Type::F32
            && (dst.is_addr() || dst.is_stack_slot())
        {
            // Store the bit pattern as an integer; no constant load needed.
            let bits = opal_common::bits::bits_of_f32(value.fp_immediate() as f32);
            let src = Operand::from_int_immediate(bits as i64, 4);
            dst.size = 4;
            Instruction::new(opcode::MOV, vec![dst, src])
        } else {
            let mut src = self.lower_as_operand(ctx, value);
            dst.size = src.size;

            if src.is_symbol() {
                let tmp = Operand::from_register(ctx.new_vreg(), src.size);
                ctx.emit(Instruction::new(opcode::MOV, vec![tmp.clone(), src]));
                src = tmp;
            }

            Instruction::new(Self::get_move_opcode(value.ty), vec![dst, src])
        };

        let id = ctx.emit(m_instr);
        if instr.attrs.contains(ssa::InstrAttrs::SAVE_ARG) {
            ctx.emitted_instr_mut(id).flags |= InstrFlags::ARG_STORE;
        }
    }

    fn lower_loadarg(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let ty = instr.operand(0).ty;
        let param_index = instr.operand(1).int_immediate().to_u64() as usize;
        let size = ctx.size(ty) as u8;

        let storage = ctx.arg_storage()[param_index];
        let m_src = match storage {
            mcode::ArgStorage::InReg(reg) => Operand::from_physical_reg(reg, size),
            mcode::ArgStorage::OnStack { .. } => {
                let mcode::ParamStorage::Slot(slot) = ctx.machine_func.parameters[param_index].storage
                else {
                    unreachable!("stack parameter without a stack slot")
                };
                Operand::from_stack_slot(slot, size)
            }
        };

        let m_dst = ctx.map_vreg_dst(instr, size);
        let mut m_instr = Instruction::new(Self::get_move_opcode(ty), vec![m_dst, m_src]);
        m_instr.flags |= InstrFlags::ARG_STORE;
        ctx.emit(m_instr);
    }

    fn lower_add(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let dest = instr.dest.expect("add has a destination");
        self.append_mov_and_operation(ctx, opcode::ADD, dest, instr.operand(0), instr.operand(1));
    }

    fn lower_sub(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let dest = instr.dest.expect("sub has a destination");
        self.append_mov_and_operation(ctx, opcode::SUB, dest, instr.operand(0), instr.operand(1));
    }

    fn lower_mul(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let lhs = instr.operand(0);
        let rhs = instr.operand(1);

        // `x * 3` becomes `lea dst, [x + 2*x]`.
        if lhs.is_register() && rhs.is_int_immediate() {
            let size = ctx.size(lhs.ty);

            if (size == 4 || size == 8) && rhs.int_immediate() == 3 {
                let lhs_reg = ctx.map_vreg_as_reg(lhs.register());
                let addr = IndirectAddress::with_reg_offset(lhs_reg, lhs_reg, 2);

                let m_dst = ctx.map_vreg_dst(instr, size as u8);
                let m_src = Operand::from_addr(addr, size as u8);
                ctx.emit(Instruction::new(opcode::LEA, vec![m_dst, m_src]));
                return;
            }
        }

        let dest = instr.dest.expect("mul has a destination");
        self.append_mov_and_operation(ctx, opcode::IMUL, dest, lhs, rhs);
    }

    fn lower_sdiv(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        self.emit_division(ctx, instr, true, RAX);
    }

    fn lower_srem(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        self.emit_division(ctx, instr, true, RDX);
    }

    fn lower_udiv(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        self.emit_division(ctx, instr, false, RAX);
    }

    fn lower_urem(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        self.emit_division(ctx, instr, false, RDX);
    }

    fn lower_fadd(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let op = if instr.operand(0).ty == Type::F64 {
            opcode::ADDSD
        } else {
            opcode::ADDSS
        };
        let dest = instr.dest.expect("fadd has a destination");
        self.append_mov_and_operation(ctx, op, dest, instr.operand(0), instr.operand(1));
    }

    fn lower_fsub(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let op = if instr.operand(0).ty == Type::F64 {
            opcode::SUBSD
        } else {
            opcode::SUBSS
        };
        let dest = instr.dest.expect("fsub has a destination");
        self.append_mov_and_operation(ctx, op, dest, instr.operand(0), instr.operand(1));
    }

    fn lower_fmul(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let op = if instr.operand(0).ty == Type::F64 {
            opcode::MULSD
        } else {
            opcode::MULSS
        };
        let dest = instr.dest.expect("fmul has a destination");
        self.append_mov_and_operation(ctx, op, dest, instr.operand(0), instr.operand(1));
    }

    fn lower_fdiv(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let op = if instr.operand(0).ty == Type::F64 {
            opcode::DIVSD
        } else {
            opcode::DIVSS
        };
        let dest = instr.dest.expect("fdiv has a destination");
        self.append_mov_and_operation(ctx, op, dest, instr.operand(0), instr.operand(1));
    }

    fn lower_and(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let dest = instr.dest.expect("and has a destination");
        self.append_mov_and_operation(ctx, opcode::AND, dest, instr.operand(0), instr.operand(1));
    }

    fn lower_or(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let dest = instr.dest.expect("or has a destination");
        self.append_mov_and_operation(ctx, opcode::OR, dest, instr.operand(0), instr.operand(1));
    }

    fn lower_xor(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let dest = instr.dest.expect("xor has a destination");
        self.append_mov_and_operation(ctx, opcode::XOR, dest, instr.operand(0), instr.operand(1));
    }

    fn lower_shl(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        self.emit_shift(ctx, instr, opcode::SHL);
    }

    fn lower_shr(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        self.emit_shift(ctx, instr, opcode::SHR);
    }

    fn lower_jmp(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let target = instr.operand(0).branch_target();
        self.move_branch_args(ctx, target);

        if Some(target.block) != ctx.next_block_in_layout() {
            let label = ctx.func.block(target.block).label.clone();
            ctx.emit(Instruction::new(opcode::JMP, vec![Operand::from_label(label)]));
        }
    }

    fn lower_cjmp(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        self.emit_jcc(ctx, instr, |lowerer, ctx| {
            let tmp = ctx.new_vreg().virtual_reg();
            lowerer.append_mov_and_operation(
                ctx,
                opcode::CMP,
                tmp,
                instr.operand(0),
                instr.operand(2),
            );
        });
    }

    fn lower_fcjmp(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        self.emit_jcc(ctx, instr, |lowerer, ctx| {
            let cmp_opcode = if instr.operand(0).ty == Type::F64 {
                opcode::UCOMISD
            } else {
                opcode::UCOMISS
            };
            let m_lhs = lowerer.lower_as_operand(ctx, instr.operand(0));
            let m_rhs = lowerer.lower_as_operand(ctx, instr.operand(2));
            ctx.emit(Instruction::new(cmp_opcode, vec![m_lhs, m_rhs]));
        });
    }

    fn lower_select(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let cmp_lhs = instr.operand(0);
        let comparison = instr.operand(1).comparison();
        let cmp_rhs = instr.operand(2);
        let val_true = instr.operand(3);
        let val_false = instr.operand(4);

        let size = ctx.size(cmp_lhs.ty).max(4) as u8;
        let m_dst = ctx.map_vreg_dst(instr, size);

        if cmp_lhs.ty.is_floating_point() {
            let move_opcode = if size == 4 { opcode::MOVSS } else { opcode::MOVSD };

            // `a > b ? a : b` and `a < b ? a : b` are MAX and MIN.
            if cmp_lhs == val_true && cmp_rhs == val_false {
                let peephole = match comparison {
                    Comparison::Fgt => Some(if size == 4 { opcode::MAXSS } else { opcode::MAXSD }),
                    Comparison::Flt => Some(if size == 4 { opcode::MINSS } else { opcode::MINSD }),
                    _ => None,
                };

                if let Some(minmax_opcode) = peephole {
                    let m_lhs = self.lower_as_operand(ctx, cmp_lhs);
                    let m_rhs = self.lower_as_operand(ctx, cmp_rhs);
                    ctx.emit(Instruction::new(move_opcode, vec![m_dst.clone(), m_lhs]));
                    ctx.emit(Instruction::new(minmax_opcode, vec![m_dst, m_rhs]));
                    return;
                }
            }

            log::warn!("cannot lower this floating-point select");
            return;
        }

        let tmp = Operand::from_register(ctx.new_vreg(), size);

        let m_lhs = self.lower_as_operand(ctx, cmp_lhs);
        let m_rhs = self.lower_as_operand(ctx, cmp_rhs);
        ctx.emit(Instruction::new(opcode::CMP, vec![m_lhs, m_rhs]));

        let m_true = self.lower_as_operand(ctx, val_true);
        ctx.emit(Instruction::new(opcode::MOV, vec![tmp.clone(), m_true]));

        let m_false = self.lower_as_operand(ctx, val_false);
        ctx.emit(Instruction::new(opcode::MOV, vec![m_dst.clone(), m_false]));

        ctx.emit(Instruction::new(
            Self::cmovcc_opcode(comparison),
            vec![m_dst, tmp],
        ));
    }

    fn lower_call(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        match ctx.func.calling_conv {
            ssa::CallingConv::X86_64MsAbi => MsAbiCallingConv::lower_call(self, ctx, instr),
            _ => SysVCallingConv::lower_call(self, ctx, instr),
        }
    }

    fn lower_ret(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        if let Some(sret_slot) = ctx.sret_slot {
            // Copy the value through the hidden buffer; the buffer address
            // is also the return value.
            let return_size = ctx.size(ctx.func.return_type);

            let dst_reg = ctx.new_vreg();
            ctx.emit(Instruction::new(
                opcode::MOV,
                vec![
                    Operand::from_register(dst_reg, 8),
                    Operand::from_stack_slot(sret_slot, 8),
                ],
            ));

            let src = self.lower_as_operand(ctx, instr.operand(0));
            self.copy_block_using_movs(ctx, dst_reg, src.register(), return_size);

            ctx.emit(Instruction::new(
                opcode::MOV,
                vec![
                    Operand::from_physical_reg(RAX, 8),
                    Operand::from_register(dst_reg, 8),
                ],
            ));
            ctx.emit(Instruction::new(opcode::RET, vec![]));
            return;
        }

        if !instr.operands.is_empty() {
            let ty = instr.operand(0).ty;
            let dest_reg = if ty.is_floating_point() { XMM0 } else { RAX };
            let size = ctx.size(ty) as u8;

            let m_src = self.lower_as_operand(ctx, instr.operand(0));
            ctx.emit(Instruction::new(
                Self::get_move_opcode(ty),
                vec![Operand::from_physical_reg(dest_reg, size), m_src],
            ));
        }

        ctx.emit(Instruction::new(opcode::RET, vec![]));
    }

    fn lower_uextend(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let m_dst = ctx.map_vreg_dst(instr, 4);
        let m_src = self.lower_as_operand(ctx, instr.operand(0));
        let m_opcode = if m_src.size < 4 { opcode::MOVZX } else { opcode::MOV };
        ctx.emit(Instruction::new(m_opcode, vec![m_dst, m_src]));
    }

    fn lower_sextend(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let m_dst = ctx.map_vreg_dst(instr, 8);
        let m_src = self.lower_as_operand(ctx, instr.operand(0));
        ctx.emit(Instruction::new(opcode::MOVSX, vec![m_dst, m_src]));
    }

    fn lower_truncate(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        debug_assert!(ctx.size(instr.operand(1).ty) != 8);

        let m_dst = ctx.map_vreg_dst(instr, 4);
        let mut m_src = self.lower_as_operand(ctx, instr.operand(0));

        if m_src.size == 8 {
            m_src.size = 4;
        }

        ctx.emit(Instruction::new(opcode::MOV, vec![m_dst, m_src]));
    }

    fn lower_fpromote(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let m_dst = ctx.map_vreg_dst(instr, 8);
        let m_src = self.lower_as_operand(ctx, instr.operand(0));
        ctx.emit(Instruction::new(opcode::CVTSS2SD, vec![m_dst, m_src]));
    }

    fn lower_fdemote(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let m_dst = ctx.map_vreg_dst(instr, 4);
        let m_src = self.lower_as_operand(ctx, instr.operand(0));
        ctx.emit(Instruction::new(opcode::CVTSD2SS, vec![m_dst, m_src]));
    }

    fn lower_utof(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        self.lower_stof(ctx, instr);
    }

    fn lower_stof(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let target_ty = instr.operand(1).ty;

        let (convert_opcode, dst_size) = if target_ty == Type::F64 {
            (opcode::CVTSI2SD, 8)
        } else {
            (opcode::CVTSI2SS, 4)
        };

        let m_dst = ctx.map_vreg_dst(instr, dst_size);
        let m_src = self.lower_as_operand(ctx, instr.operand(0));

        ctx.emit(Instruction::new(
            opcode::XORPS,
            vec![m_dst.clone(), m_dst.clone()],
        ));
        ctx.emit(Instruction::new(convert_opcode, vec![m_dst, m_src]));
    }

    fn lower_ftou(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        self.lower_ftos(ctx, instr);
    }

    fn lower_ftos(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let is_double = instr.operand(0).ty == Type::F64;
        let dst_size = if ctx.size(instr.operand(1).ty) == 8 { 8 } else { 4 };

        let convert_opcode = if is_double { opcode::CVTSD2SI } else { opcode::CVTSS2SI };
        let m_dst = ctx.map_vreg_dst(instr, dst_size);
        let m_src = self.lower_as_operand(ctx, instr.operand(0));
        ctx.emit(Instruction::new(convert_opcode, vec![m_dst, m_src]));
    }

    fn lower_offsetptr(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        if !instr.operand(0).is_register() {
            let m_dst = ctx.map_vreg_dst(instr, 8);
            let m_src = self.lower_as_operand(ctx, instr.operand(0));
            ctx.emit(Instruction::new(opcode::MOV, vec![m_dst, m_src]));
            return;
        }

        let m_dst = ctx.map_vreg_dst(instr, 8);
        let addr = self.calc_offsetptr_addr(ctx, instr);
        ctx.emit(Instruction::new(
            opcode::LEA,
            vec![m_dst, Operand::from_addr(addr, 8)],
        ));
    }

    fn lower_memberptr(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let m_dst = ctx.map_vreg_dst(instr, 8);
        let addr = self.calc_memberptr_addr(ctx, instr);
        ctx.emit(Instruction::new(
            opcode::LEA,
            vec![m_dst, Operand::from_addr(addr, 8)],
        ));
    }

    fn lower_copy(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let size = ctx.size(instr.operand(2).ty);

        if size <= 64 {
            let dst_base = ctx.map_vreg(instr.operand(0).register());
            let src_base = ctx.map_vreg(instr.operand(1).register());
            self.copy_block_using_movs(ctx, dst_base, src_base, size);
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

    fn lower_sqrt(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let m_src = self.lower_as_operand(ctx, instr.operand(0));
        let m_dst = ctx.map_vreg_dst(instr, m_src.size);
        let sqrt_opcode = if m_src.size == 4 { opcode::SQRTSS } else { opcode::SQRTSD };

        ctx.emit(Instruction::new(
            opcode::XORPS,
            vec![m_dst.clone(), m_dst.clone()],
        ));
        ctx.emit(Instruction::new(sqrt_opcode, vec![m_dst, m_src]));
    }
}
