//! Floating-point constant materialisation on x86-64.
//!
//! Non-zero f32 literals live in module-level globals, deduplicated per bit
//! pattern. Within a basic block, a literal used more than once is hoisted
//! into a register at its first use; the plan is precomputed per block
//! because lowering itself walks the block backwards.

use hashbrown::HashMap;

use opal_codegen::LowerCtx;
use opal_mcode as mcode;
use opal_mcode::{Instruction, Operand, Register, Symbol};
use opal_ssa as ssa;

use crate::x86_64::opcode;
use crate::x86_64::ssa_lowerer::X64SsaLowerer;

/// At most this many hoisted constants are kept in registers per block.
const MAX_CONSTS_IN_REGS: usize = 4;

#[derive(Clone)]
enum ConstStorage {
    /// Read the constant from memory at every use.
    Load { label: String },
    /// Load into a register here, reuse it later in the block.
    LoadIntoReg { label: String, reg: Register },
    /// The constant is already in a register.
    ReadReg { reg: Register },
}

pub(super) struct ConstLowering {
    next_label_id: u32,
    /// Deduplicated f32 globals, keyed by bit pattern.
    f32_globals: HashMap<u32, String>,
    last_block: Option<ssa::BlockId>,
    /// Per-(instruction, bit-pattern) storage plan for the current block.
    f32_storage: HashMap<(ssa::InstrId, u32), ConstStorage>,
}

impl ConstLowering {
    pub fn new() -> Self {
        Self {
            next_label_id: 0,
            f32_globals: HashMap::new(),
            last_block: None,
            f32_storage: HashMap::new(),
        }
    }
}

impl X64SsaLowerer {
    pub(super) fn load_f32(&mut self, ctx: &mut LowerCtx, value: f32) -> Operand {
        debug_assert!(value != 0.0);

        if self.const_lowering.last_block != Some(ctx.block) {
            self.const_lowering.last_block = Some(ctx.block);
            self.const_lowering.f32_storage.clear();
            self.process_block(ctx);
        }

        let key = (
            ctx.instr.expect("constant load outside an instruction"),
            value.to_bits(),
        );
        let storage = self.const_lowering.f32_storage[&key].clone();

        match storage {
            ConstStorage::Load { label } => Operand::from_symbol_deref(Symbol::new(label), 4),
            ConstStorage::LoadIntoReg { label, reg } => {
                let dst = Operand::from_register(reg, 4);
                let src = Operand::from_symbol_deref(Symbol::new(label), 4);
                ctx.emit(Instruction::new(opcode::MOVSS, vec![dst.clone(), src]));
                dst
            }
            ConstStorage::ReadReg { reg } => Operand::from_register(reg, 4),
        }
    }

    pub(super) fn load_f64(&mut self, ctx: &mut LowerCtx, value: f64) -> Operand {
        let label = format!("float.{}", self.const_lowering.next_label_id);
        self.const_lowering.next_label_id += 1;

        ctx.machine_module.add_global(mcode::Global {
            name: label.clone(),
            size: 8,
            alignment: 8,
            value: mcode::GlobalValue::Fp(value),
        });

        Operand::from_symbol_deref(Symbol::new(label), 8)
    }

    /// Scans the block forward and decides, for every f32 literal use, how
    /// the value will be accessed.
    fn process_block(&mut self, ctx: &mut LowerCtx) {
        let mut consts_in_regs: HashMap<u32, Register> = HashMap::new();
        let block = ctx.current_block();

        let instr_ids = block.instrs.ids();
        for (position, &instr_id) in instr_ids.iter().enumerate() {
            let instr = block.instrs.get(instr_id);

            // Calls and block copies clobber the hoisted registers.
            if is_discarding_instr(instr.opcode) {
                consts_in_regs.clear();
            }

            let mut literals = Vec::new();
            collect_f32_literals(&instr.operands, &mut literals);

            for bits in literals {
                let label = match self.const_lowering.f32_globals.get(&bits) {
                    Some(label) => label.clone(),
                    None => {
                        let label = format!("float.{}", self.const_lowering.next_label_id);
                        self.const_lowering.next_label_id += 1;

                        ctx.machine_module.add_global(mcode::Global {
                            name: label.clone(),
                            size: 4,
                            alignment: 4,
                            value: mcode::GlobalValue::Fp(f32::from_bits(bits) as f64),
                        });
                        self.const_lowering.f32_globals.insert(bits, label.clone());
                        label
                    }
                };

                let storage = if let Some(reg) = consts_in_regs.get(&bits) {
                    ConstStorage::ReadReg { reg: *reg }
                } else if consts_in_regs.len() < MAX_CONSTS_IN_REGS
                    && is_f32_used_later_on(block, &instr_ids[position + 1..], bits)
                {
                    let reg = ctx.new_vreg();
                    consts_in_regs.insert(bits, reg);
                    ConstStorage::LoadIntoReg { label, reg }
                } else {
                    ConstStorage::Load { label }
                };

                self.const_lowering
                    .f32_storage
                    .insert((instr_id, bits), storage);
            }
        }
    }
}

fn is_discarding_instr(opcode: ssa::Opcode) -> bool {
    opcode == ssa::Opcode::Call || opcode == ssa::Opcode::Copy
}

fn collect_f32_literals(operands: &[ssa::Value], out: &mut Vec<u32>) {
    for operand in operands {
        match &operand.kind {
            ssa::ValueKind::FpImmediate(value) if operand.ty == ssa::Type::F32 => {
                let bits = (*value as f32).to_bits();
                if f32::from_bits(bits) != 0.0 {
                    out.push(bits);
                }
            }
            ssa::ValueKind::BranchTarget(target) => collect_f32_literals(&target.args, out),
            _ => {}
        }
    }
}

fn is_f32_used_later_on(
    block: &ssa::BasicBlock,
    later_instrs: &[ssa::InstrId],
    bits: u32,
) -> bool {
    for &instr_id in later_instrs {
        let instr = block.instrs.get(instr_id);

        if is_discarding_instr(instr.opcode) {
            return false;
        }

        let mut literals = Vec::new();
        collect_f32_literals(&instr.operands, &mut literals);
        if literals.contains(&bits) {
            return true;
        }
    }

    false
}
