//! x86-64 address-mode synthesis.
//!
//! Pointer chains built from `memberptr`/`offsetptr` collapse into a single
//! `[base + index * scale + disp]` operand where the encoding allows it.

use opal_codegen::LowerCtx;
use opal_mcode::{IndirectAddress, Instruction, Operand, Register, Relocation, Symbol};
use opal_ssa as ssa;

use crate::x86_64::opcode;
use crate::x86_64::ssa_lowerer::X64SsaLowerer;

impl X64SsaLowerer {
    /// Lowers a pointer operand into a memory operand.
    pub fn lower_address(&mut self, ctx: &mut LowerCtx, operand: &ssa::Value) -> Operand {
        match &operand.kind {
            ssa::ValueKind::Register(reg) => self.lower_reg_addr(ctx, *reg),
            ssa::ValueKind::Symbol { .. } => self.lower_symbol_addr(ctx, operand),
            _ => unreachable!("operand is not an address"),
        }
    }

    fn lower_reg_addr(&mut self, ctx: &mut LowerCtx, vreg: ssa::VirtualRegister) -> Operand {
        let reg = ctx.map_vreg(vreg);

        match reg {
            Register::Virtual(_) => self.lower_vreg_addr(ctx, vreg),
            _ => Operand::from_addr(IndirectAddress::base_only(reg), 8),
        }
    }

    fn lower_vreg_addr(&mut self, ctx: &mut LowerCtx, vreg: ssa::VirtualRegister) -> Operand {
        match ctx.producer(vreg) {
            Some(producer) if producer.opcode == ssa::Opcode::MemberPtr => {
                ctx.discard_use(vreg);
                let addr = self.calc_memberptr_addr(ctx, producer);
                Operand::from_addr(addr, 8)
            }
            Some(producer) if producer.opcode == ssa::Opcode::OffsetPtr => {
                ctx.discard_use(vreg);
                let addr = self.calc_offsetptr_addr(ctx, producer);
                Operand::from_addr(addr, 8)
            }
            _ => Operand::from_addr(
                IndirectAddress::base_only(Register::Virtual(vreg)),
                8,
            ),
        }
    }

    fn lower_symbol_addr(&mut self, ctx: &mut LowerCtx, operand: &ssa::Value) -> Operand {
        let mut reloc = Relocation::None;
        if self.descr.is_unix() {
            if operand.is_extern_func() {
                reloc = Relocation::Plt;
            } else if operand.is_extern_global() {
                reloc = Relocation::Got;
            }
        }

        let symbol = Symbol::with_reloc(operand.symbol_name(), reloc);
        let size = ctx.size(operand.ty) as u8;
        Operand::from_symbol_deref(symbol, size)
    }

    pub(super) fn calc_offsetptr_addr(
        &mut self,
        ctx: &mut LowerCtx,
        instr: &ssa::Instruction,
    ) -> IndirectAddress {
        let base = ctx.map_vreg(instr.operand(0).register());
        let index = instr.operand(1);
        let base_type = instr.operand(2).ty;
        let elem_size = ctx.size(base_type);

        let mut addr = IndirectAddress::with_int_offset(base, 0);
        if index.is_int_immediate() {
            addr =
                IndirectAddress::with_int_offset(base, index.int_immediate().to_i32() * elem_size as i32);
        } else if index.is_register() {
            let offset_reg = ctx.map_vreg_as_reg(index.register());
            addr = IndirectAddress::with_reg_offset(base, offset_reg, elem_size as u8);
        }

        if let Some(offset_reg) = addr.reg_offset() {
            let scale = addr.scale as u32;

            // Only 1, 2, 4 and 8 are encodable scales; legalise the rest
            // with an explicit multiply.
            if scale != 1 && scale != 2 && scale != 4 && scale != 8 {
                let offset_tmp = ctx.new_vreg();
                let base_tmp = ctx.new_vreg();

                ctx.emit(Instruction::new(
                    opcode::MOV,
                    vec![
                        Operand::from_register(base_tmp, 8),
                        Operand::from_register(addr.base, 8),
                    ],
                ));
                ctx.emit(Instruction::new(
                    opcode::MOV,
                    vec![
                        Operand::from_register(offset_tmp, 8),
                        Operand::from_register(offset_reg, 8),
                    ],
                ));
                ctx.emit(Instruction::new(
                    opcode::IMUL,
                    vec![
                        Operand::from_register(offset_tmp, 8),
                        Operand::from_int_immediate(scale as i64, 8),
                    ],
                ));
                ctx.emit(Instruction::new(
                    opcode::ADD,
                    vec![
                        Operand::from_register(base_tmp, 8),
                        Operand::from_register(offset_tmp, 8),
                    ],
                ));

                return IndirectAddress::base_only(base_tmp);
            }
        }

        addr
    }

    pub(super) fn calc_memberptr_addr(
        &mut self,
        ctx: &mut LowerCtx,
        instr: &ssa::Instruction,
    ) -> IndirectAddress {
        let struct_id = instr
            .operand(0)
            .ty
            .struct_id()
            .expect("memberptr aggregate operand is not a struct");
        let base_operand = instr.operand(1);
        let member_index = instr.operand(2).int_immediate().to_u64() as usize;

        let byte_offset = ctx.member_offset(struct_id, member_index) as i32;

        // Merge with a preceding memberptr on the same chain.
        if let Some(base_producer) = ctx.producer(base_operand.register()) {
            if base_producer.opcode == ssa::Opcode::MemberPtr {
                ctx.discard_use(base_operand.register());

                let mut addr = self.calc_memberptr_addr(ctx, base_producer);
                let merged = addr.int_offset().unwrap_or(0) + byte_offset;
                addr.offset = opal_mcode::AddrOffset::Int(merged);
                return addr;
            }
        }

        let base = ctx.map_vreg(base_operand.register());
        IndirectAddress::with_int_offset(base, byte_offset)
    }
}
