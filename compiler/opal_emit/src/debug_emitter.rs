//! Target-independent machine-code dumps.
//!
//! Used for pass-by-pass diagnostics; prints each function's stack frame
//! summary, block parameters, sized operands and instruction flags.

use std::io::{self, Write};

use opal_mcode as mcode;
use opal_mcode::{InstrFlags, OperandKind, Register, StackSlotKind};
use opal_target::{aarch64, x86_64, Architecture};

use crate::emitter::Emitter;

pub struct DebugEmitter {
    arch: Architecture,
}

impl DebugEmitter {
    pub fn new(arch: Architecture) -> Self {
        Self { arch }
    }

    pub fn instr_to_string(
        &self,
        func: &mcode::Function,
        instr: &mcode::Instruction,
    ) -> String {
        let mut line = format!("  {}", self.opcode_name(instr.opcode));

        for (i, operand) in instr.operands.iter().enumerate() {
            line.push_str(if i == 0 { " " } else { ", " });

            if operand.size != 0 && !operand.is_physical_reg() {
                line.push_str(&format!("{}b ", operand.size));
            }

            line.push_str(&self.operand_name(func, operand));
        }

        if instr.flags.contains(InstrFlags::ARG_STORE) {
            line.push_str(" !arg_store");
        }
        if instr.flags.contains(InstrFlags::ALLOCA) {
            line.push_str(" !alloca");
        }
        if instr.flags.contains(InstrFlags::CALL_ARG) {
            line.push_str(" !call_arg");
        }
        if instr.flags.contains(InstrFlags::CALL) {
            line.push_str(" !call");
        }
        if instr.flags.contains(InstrFlags::FLOAT) {
            line.push_str(" !float");
        }

        line
    }

    fn opcode_name(&self, machine_opcode: mcode::Opcode) -> &'static str {
        match self.arch {
            Architecture::X86_64 => x86_64::opcode::mnemonic(machine_opcode),
            Architecture::AArch64 => aarch64::opcode::mnemonic(machine_opcode),
        }
    }

    fn operand_name(&self, func: &mcode::Function, operand: &mcode::Operand) -> String {
        match &operand.kind {
            OperandKind::IntImmediate(value) => value.to_string(),
            OperandKind::FpImmediate(value) => value.to_string(),
            OperandKind::Register(reg) => self.reg_name(func, *reg, operand.size),
            OperandKind::Symbol(symbol) => symbol.name.clone(),
            OperandKind::Label(label) => label.clone(),
            OperandKind::SymbolDeref(symbol) => format!("[{}]", symbol.name),
            OperandKind::Addr(addr) => {
                let base = self.reg_name(func, addr.base, 8);

                if let Some(offset_reg) = addr.reg_offset() {
                    let offset = self.reg_name(func, offset_reg, 8);
                    if addr.scale == 1 {
                        format!("[{} + {}]", base, offset)
                    } else {
                        format!("[{} + {} * {}]", base, addr.scale, offset)
                    }
                } else if let Some(offset) = addr.int_offset() {
                    format!("[{} + {}]", base, offset)
                } else {
                    format!("[{}]", base)
                }
            }
            OperandKind::AArch64Addr(addr) => match addr {
                mcode::AArch64Address::Base(base) => {
                    format!("[{}]", self.reg_name(func, *base, 8))
                }
                mcode::AArch64Address::BaseOffsetImm { base, offset } => {
                    format!("[{}, #{}]", self.reg_name(func, *base, 8), offset)
                }
                mcode::AArch64Address::BaseOffsetImmWrite { base, offset } => {
                    format!("[{}, #{}]!", self.reg_name(func, *base, 8), offset)
                }
                mcode::AArch64Address::BaseOffsetReg { base, offset } => format!(
                    "[{}, {}]",
                    self.reg_name(func, *base, 8),
                    self.reg_name(func, *offset, 8)
                ),
            },
            OperandKind::StackSlotOffset { slot, addend } => {
                if func.stack_frame.slot(*slot).is_defined() {
                    format!("#{}", func.stack_frame.slot(*slot).offset() + addend)
                } else {
                    format!("#s{}+{}", slot, addend)
                }
            }
            OperandKind::AArch64LeftShift(shift) => format!("lsl #{}", shift),
            OperandKind::AArch64Condition(condition) => format!("{:?}", condition).to_lowercase(),
        }
    }

    fn reg_name(&self, func: &mcode::Function, reg: Register, size: u8) -> String {
        match reg {
            Register::Virtual(reg) => format!("%{}", reg),
            Register::Physical(reg) => match self.arch {
                Architecture::X86_64 => x86_64::register::name(reg, size),
                Architecture::AArch64 => aarch64::register::name(reg, size),
            },
            Register::StackSlot(slot) => {
                if !func.stack_frame.slot(slot).is_defined() {
                    return format!("s{}", slot);
                }

                let offset = func.stack_frame.slot(slot).offset();
                match self.arch {
                    Architecture::X86_64 if offset >= 0 => format!("[rsp + {}]", offset),
                    Architecture::X86_64 => format!("[rsp - {}]", -offset),
                    Architecture::AArch64 => format!("[sp, #{}]", offset),
                }
            }
        }
    }
}

impl Emitter for DebugEmitter {
    fn generate(&mut self, module: &mcode::Module, out: &mut dyn io::Write) -> io::Result<()> {
        for symbol in &module.external_symbols {
            writeln!(out, "extern {}", symbol)?;
        }
        writeln!(out)?;

        for symbol in &module.global_symbols {
            writeln!(out, "global {}", symbol)?;
        }
        writeln!(out)?;

        for func in &module.functions {
            self.generate_func(func, out)?;
        }

        for global in &module.globals {
            write!(out, "data {}: {}b = ", global.name, global.size)?;

            match &global.value {
                mcode::GlobalValue::Int(value) => writeln!(out, "{}", value)?,
                mcode::GlobalValue::Fp(value) => writeln!(out, "{}", value)?,
                mcode::GlobalValue::Bytes(bytes) => writeln!(out, "{:?}", bytes)?,
                mcode::GlobalValue::Str(string) => writeln!(out, "{:?}", string)?,
                mcode::GlobalValue::SymbolRef(name) => writeln!(out, "@{}", name)?,
                mcode::GlobalValue::None => writeln!(out, "undefined")?,
            }
        }

        Ok(())
    }
}

impl DebugEmitter {
    fn generate_func(&self, func: &mcode::Function, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "func {}:", func.name)?;

        if !func.stack_frame.slots().is_empty() {
            for (i, slot) in func.stack_frame.slots().iter().enumerate() {
                let offset = if slot.is_defined() {
                    format!("{:+}", slot.offset())
                } else {
                    "?".to_string()
                };

                let kind = match slot.kind {
                    StackSlotKind::Generic => "generic",
                    StackSlotKind::ArgStore => "arg_store",
                    StackSlotKind::CallArg => "call_arg",
                };

                writeln!(out, "    s{}: {}, {}, {}", i, offset, slot.size, kind)?;
            }
            writeln!(out)?;
        }

        for (_, block) in &func.blocks {
            if !block.label.is_empty() {
                write!(out, "{}", block.label)?;

                if !block.params.is_empty() {
                    let params: Vec<String> =
                        block.params.iter().map(|reg| format!("%{}", reg)).collect();
                    write!(out, "({})", params.join(", "))?;
                }

                writeln!(out, ":")?;
            }

            for instr in block.instrs.values() {
                writeln!(out, "{}", self.instr_to_string(func, instr))?;
            }
        }

        writeln!(out)
    }
}
