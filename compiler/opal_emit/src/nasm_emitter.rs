//! NASM assembly emission for x86-64.

use std::io::{self, Write};

use opal_common::timing::ScopeTimer;
use opal_mcode as mcode;
use opal_mcode::{GlobalValue, OperandKind, Register, Relocation};
use opal_target::x86_64::{opcode, register};
use opal_target::TargetDescription;

use crate::emitter::Emitter;

pub struct NasmEmitter {
    target: TargetDescription,
}

impl NasmEmitter {
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
            self.emit_basic_block(func, block, out)?;
        }

        writeln!(out)
    }

    fn emit_basic_block(
        &self,
        func: &mcode::Function,
        block: &mcode::BasicBlock,
        out: &mut dyn Write,
    ) -> io::Result<()> {
        if !block.label.is_empty() {
            writeln!(out, "{}:", block.label)?;
        }

        for instr in block.instrs.values() {
            // Pseudo-opcodes carry unwind info, not machine code.
            if instr.opcode < 0 {
                continue;
            }

            writeln!(out, "    {}", self.instr_to_string(func, instr))?;
        }

        Ok(())
    }

    fn instr_to_string(&self, func: &mcode::Function, instr: &mcode::Instruction) -> String {
        let mut line = opcode::mnemonic(instr.opcode).to_string();

        let has_reg_operand = instr
            .operands
            .iter()
            .any(|operand| operand.is_physical_reg());

        let is_control_flow = instr.opcode == opcode::CALL
            || instr.opcode == opcode::JMP
            || (opcode::JCC..opcode::JCC + 10).contains(&instr.opcode);

        // Memory-only instructions need an explicit operand size.
        if !has_reg_operand && !is_control_flow && instr.has_dest() && instr.dest().size != 0 {
            line.push(' ');
            line.push_str(size_specifier(instr.dest().size));
        }

        let requires_size = matches!(
            instr.opcode,
            opcode::MOVSX
                | opcode::MOVZX
                | opcode::SHL
                | opcode::SHR
                | opcode::CVTSI2SS
                | opcode::CVTSI2SD
        );

        for (i, operand) in instr.operands.iter().enumerate() {
            line.push_str(if i == 0 { " " } else { ", " });

            if requires_size && !operand.is_register() {
                line.push_str(size_specifier(operand.size));
                line.push(' ');
            }

            line.push_str(&self.operand_name(func, operand));
        }

        line
    }

    fn operand_name(&self, func: &mcode::Function, operand: &mcode::Operand) -> String {
        match &operand.kind {
            OperandKind::IntImmediate(value) => value.to_string(),
            OperandKind::FpImmediate(value) => value.to_string(),
            OperandKind::Register(reg) => self.reg_name(func, *reg, operand.size),
            OperandKind::Symbol(symbol) => self.symbol_name(symbol),
            OperandKind::Label(label) => label.clone(),
            OperandKind::SymbolDeref(symbol) => format!("[{}]", self.symbol_name(symbol)),
            OperandKind::Addr(addr) => {
                let base = if addr.base.is_stack_slot() {
                    stack_slot_address(func, addr.base.stack_slot())
                } else {
                    self.reg_name(func, addr.base, 8)
                };

                if let Some(offset_reg) = addr.reg_offset() {
                    let offset = if offset_reg.is_stack_slot() {
                        stack_slot_address(func, offset_reg.stack_slot())
                    } else {
                        self.reg_name(func, offset_reg, 8)
                    };

                    if addr.scale == 1 {
                        format!("[{} + {}]", base, offset)
                    } else {
                        format!("[{} + {} * {}]", base, addr.scale, offset)
                    }
                } else if let Some(offset) = addr.int_offset() {
                    if offset == 0 {
                        format!("[{}]", base)
                    } else if offset > 0 {
                        format!("[{} + {}]", base, offset)
                    } else {
                        format!("[{} - {}]", base, -offset)
                    }
                } else {
                    format!("[{}]", base)
                }
            }
            _ => unreachable!("operand form has no NASM rendering"),
        }
    }

    fn reg_name(&self, func: &mcode::Function, reg: Register, size: u8) -> String {
        match reg {
            Register::Virtual(reg) => format!("%{}", reg),
            Register::Physical(reg) => register::name(reg, size),
            Register::StackSlot(slot) => format!("[{}]", stack_slot_address(func, slot)),
        }
    }

    fn symbol_name(&self, symbol: &mcode::Symbol) -> String {
        let mut name = format!("{}{}", self.symbol_prefix(), symbol.name);

        match symbol.reloc {
            Relocation::Got => name.push_str(" wrt ..got"),
            Relocation::Plt => name.push_str(" wrt ..plt"),
            _ => {}
        }

        name
    }
}

impl Emitter for NasmEmitter {
    fn generate(&mut self, module: &mcode::Module, out: &mut dyn io::Write) -> io::Result<()> {
        let _timer = ScopeTimer::new("nasm code emitter");

        writeln!(out, "default rel")?;
        writeln!(out)?;

        for symbol in &module.external_symbols {
            writeln!(out, "extern {}{}", self.symbol_prefix(), symbol)?;
        }
        writeln!(out)?;

        for symbol in &module.global_symbols {
            writeln!(out, "global {}{}", self.symbol_prefix(), symbol)?;
        }
        writeln!(out)?;

        writeln!(out, "section .text")?;
        for func in &module.functions {
            self.emit_func(func, out)?;
        }

        writeln!(out)?;
        writeln!(out, "section .data")?;

        for global in &module.globals {
            write!(out, "{}{} ", self.symbol_prefix(), global.name)?;

            match &global.value {
                GlobalValue::Int(value) => {
                    write!(out, "{} {}", size_declaration(global.size), value)?;
                }
                GlobalValue::Fp(value) => {
                    let mut text = value.to_string();
                    if !text.contains('.') && !text.contains('e') {
                        text.push_str(".0");
                    }

                    match global.size {
                        4 => write!(out, "dd __float32__({})", text)?,
                        8 => write!(out, "dq __float64__({})", text)?,
                        _ => unreachable!("float global of size {}", global.size),
                    }
                }
                GlobalValue::Bytes(bytes) => {
                    let parts: Vec<String> = bytes.iter().map(|b| b.to_string()).collect();
                    write!(out, "db {}", parts.join(", "))?;
                }
                GlobalValue::Str(string) => {
                    write!(out, "db {}", nasm_string(string))?;
                }
                GlobalValue::SymbolRef(name) => {
                    write!(
                        out,
                        "{} {}{}",
                        size_declaration(global.size),
                        self.symbol_prefix(),
                        name
                    )?;
                }
                GlobalValue::None => {
                    write!(out, "times {} db 0", global.size)?;
                }
            }

            writeln!(out)?;
        }

        if !module.dll_exports.is_empty() {
            writeln!(out)?;
            writeln!(out, "section .drectve info")?;

            write!(out, "db '")?;
            for export in &module.dll_exports {
                write!(out, "/EXPORT:{} ", export)?;
            }
            writeln!(out, "'")?;
        }

        Ok(())
    }
}

fn size_specifier(size: u8) -> &'static str {
    match size {
        1 => "byte",
        2 => "word",
        4 => "dword",
        8 => "qword",
        16 => "oword",
        _ => "???",
    }
}

fn size_declaration(size: u32) -> &'static str {
    match size {
        1 => "db",
        2 => "dw",
        4 => "dd",
        8 => "dq",
        _ => unreachable!("no data declaration for size {}", size),
    }
}

/// Renders a string initializer as quoted runs with escapes spelled as raw
/// bytes, NUL-terminated.
fn nasm_string(value: &str) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut run = String::new();

    for c in value.chars() {
        if c.is_ascii_graphic() && c != '\'' || c == ' ' {
            run.push(c);
        } else {
            if !run.is_empty() {
                parts.push(format!("'{}'", run));
                run.clear();
            }
            let mut buffer = [0u8; 4];
            for byte in c.encode_utf8(&mut buffer).as_bytes() {
                parts.push(format!("0x{:02X}", byte));
            }
        }
    }

    if !run.is_empty() {
        parts.push(format!("'{}'", run));
    }
    parts.push("0x00".to_string());

    parts.join(", ")
}

fn stack_slot_address(func: &mcode::Function, slot: u32) -> String {
    let offset = func.stack_frame.slot(slot).offset();
    if offset >= 0 {
        format!("rsp + {}", offset)
    } else {
        format!("rsp - {}", -offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_nasm_string_escapes() {
        assert_eq!(nasm_string("hi"), "'hi', 0x00");
        assert_eq!(nasm_string("a\nb"), "'a', 0x0A, 'b', 0x00");
        assert_eq!(nasm_string(""), "0x00");
    }

    #[test]
    fn test_size_specifiers() {
        assert_eq!(size_specifier(1), "byte");
        assert_eq!(size_specifier(8), "qword");
        assert_eq!(size_declaration(4), "dd");
    }
}
