//! GAS assembly emission for AArch64.

use std::io::{self, Write};

use opal_common::timing::ScopeTimer;
use opal_mcode as mcode;
use opal_mcode::{
    AArch64Address, AArch64Condition, Directive, GlobalValue, OperandKind, Register, Relocation,
};
use opal_target::aarch64::{opcode, register};
use opal_target::TargetDescription;

use crate::emitter::Emitter;

pub struct GasEmitter {
    target: TargetDescription,
}

impl GasEmitter {
    pub fn new(target: TargetDescription) -> Self {
        Self { target }
    }

    fn symbol_prefix(&self) -> &'static str {
        if self.target.is_darwin() {
            "_"
        } else {
            ""
        }
    }

    fn emit_func(&self, func: &mcode::Function, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "{}{}:", self.symbol_prefix(), func.name)?;

        for (_, block) in &func.blocks {
            if !block.label.is_empty() {
                writeln!(out, "{}:", block.label)?;
            }

            for instr in block.instrs.values() {
                if instr.opcode < 0 {
                    continue;
                }

                self.emit_instr(func, instr, out)?;
            }
        }

        writeln!(out)
    }

    fn emit_instr(
        &self,
        func: &mcode::Function,
        instr: &mcode::Instruction,
        out: &mut dyn Write,
    ) -> io::Result<()> {
        write!(out, "  {}", opcode::mnemonic(instr.opcode))?;

        for (i, operand) in instr.operands.iter().enumerate() {
            write!(out, "{}", if i == 0 { " " } else { ", " })?;
            write!(out, "{}", self.operand_name(func, operand))?;
        }

        writeln!(out)
    }

    fn operand_name(&self, func: &mcode::Function, operand: &mcode::Operand) -> String {
        match &operand.kind {
            OperandKind::IntImmediate(value) => format!("#{}", value),
            OperandKind::FpImmediate(value) => format!("#{}", value),
            OperandKind::Register(Register::Virtual(reg)) => format!("%{}", reg),
            OperandKind::Register(Register::Physical(reg)) => register::name(*reg, operand.size),
            OperandKind::Register(Register::StackSlot(slot)) => {
                format!("[sp, #{}]", func.stack_frame.slot(*slot).offset())
            }
            OperandKind::Symbol(symbol) => self.symbol_name(symbol),
            OperandKind::Label(label) => label.clone(),
            OperandKind::AArch64Addr(addr) => self.addr_name(addr),
            OperandKind::StackSlotOffset { slot, addend } => {
                format!("#{}", func.stack_frame.slot(*slot).offset() + addend)
            }
            OperandKind::AArch64LeftShift(shift) => format!("lsl #{}", shift),
            OperandKind::AArch64Condition(condition) => condition_name(*condition).to_string(),
            _ => unreachable!("operand form has no GAS rendering"),
        }
    }

    fn addr_name(&self, addr: &AArch64Address) -> String {
        let reg = |r: Register| match r {
            Register::Physical(reg) => register::name(reg, 8),
            Register::Virtual(reg) => format!("%{}", reg),
            Register::StackSlot(_) => unreachable!("stack slot inside an AArch64 address"),
        };

        match addr {
            AArch64Address::Base(base) => format!("[{}]", reg(*base)),
            AArch64Address::BaseOffsetImm { base, offset } => {
                format!("[{}, #{}]", reg(*base), offset)
            }
            AArch64Address::BaseOffsetImmWrite { base, offset } => {
                format!("[{}, #{}]!", reg(*base), offset)
            }
            AArch64Address::BaseOffsetReg { base, offset } => {
                format!("[{}, {}]", reg(*base), reg(*offset))
            }
        }
    }

    fn symbol_name(&self, symbol: &mcode::Symbol) -> String {
        let full_name = format!("{}{}", self.symbol_prefix(), symbol.name);

        match (symbol.reloc, symbol.directive) {
            (Relocation::Lo12, _) => format!(":lo12:{}", full_name),
            (Relocation::Got, Directive::Page) => format!("{}@GOTPAGE", full_name),
            (Relocation::Got, Directive::PageOff) => format!("{}@GOTPAGEOFF", full_name),
            (_, Directive::Page) => format!("{}@PAGE", full_name),
            (_, Directive::PageOff) => format!("{}@PAGEOFF", full_name),
            _ => full_name,
        }
    }
}

impl Emitter for GasEmitter {
    fn generate(&mut self, module: &mcode::Module, out: &mut dyn io::Write) -> io::Result<()> {
        let _timer = ScopeTimer::new("gas code emitter");

        for symbol in &module.external_symbols {
            writeln!(out, ".extern {}{}", self.symbol_prefix(), symbol)?;
        }
        writeln!(out)?;

        for symbol in &module.global_symbols {
            writeln!(out, ".global {}{}", self.symbol_prefix(), symbol)?;
        }
        writeln!(out)?;

        writeln!(out, ".text")?;
        for func in &module.functions {
            self.emit_func(func, out)?;
        }

        writeln!(out, ".data")?;
        for global in &module.globals {
            self.emit_global(global, out)?;
        }

        Ok(())
    }
}

impl GasEmitter {
    fn emit_global(&self, global: &mcode::Global, out: &mut dyn Write) -> io::Result<()> {
        write!(out, "{}{}: ", self.symbol_prefix(), global.name)?;

        match &global.value {
            GlobalValue::Int(value) => {
                write!(out, "{} {}", int_directive(global.size), value)?;
            }
            GlobalValue::Fp(value) => {
                let directive = if global.size == 4 { ".float" } else { ".double" };
                write!(out, "{} {}", directive, value)?;
            }
            GlobalValue::Bytes(bytes) => {
                write!(out, ".ascii \"")?;
                for byte in bytes {
                    write!(out, "\\x{:02x}", byte)?;
                }
                write!(out, "\"")?;
            }
            GlobalValue::Str(string) => {
                write!(out, ".string \"")?;
                for c in string.chars() {
                    match c {
                        '\0' => write!(out, "\\0")?,
                        '\n' => write!(out, "\\n")?,
                        '\r' => write!(out, "\\r")?,
                        '"' => write!(out, "\\\"")?,
                        '\\' => write!(out, "\\\\")?,
                        _ => write!(out, "{}", c)?,
                    }
                }
                write!(out, "\"")?;
            }
            GlobalValue::SymbolRef(name) => {
                write!(
                    out,
                    "{} {}{}",
                    int_directive(global.size),
                    self.symbol_prefix(),
                    name
                )?;
            }
            GlobalValue::None => {
                write!(out, ".zero {}", global.size)?;
            }
        }

        writeln!(out)
    }
}

fn int_directive(size: u32) -> &'static str {
    match size {
        1 => ".byte",
        2 => ".hword",
        4 => ".word",
        8 => ".xword",
        _ => unreachable!("no data directive for size {}", size),
    }
}

fn condition_name(condition: AArch64Condition) -> &'static str {
    match condition {
        AArch64Condition::Eq => "eq",
        AArch64Condition::Ne => "ne",
        AArch64Condition::Hs => "hs",
        AArch64Condition::Lo => "lo",
        AArch64Condition::Hi => "hi",
        AArch64Condition::Ls => "ls",
        AArch64Condition::Ge => "ge",
        AArch64Condition::Lt => "lt",
        AArch64Condition::Gt => "gt",
        AArch64Condition::Le => "le",
    }
}
