//! Text dump of SSA modules.
//!
//! The format is line-oriented and parsed back by [`crate::reader`]:
//!
//! ```text
//! struct @pair {
//!     i32
//!     i64
//! }
//!
//! decl func sysv void @memcpy(addr, addr, i64)
//!
//! def global i32 @counter = 0
//!
//! def func sysv i32 @add(i32, i32) global
//!     %2 = loadarg i32, 0
//!     %3 = loadarg i32, 1
//!     %4 = add i32 %2, i32 %3
//!     ret i32 %4
//! ```

use std::fmt::Write;

use crate::basic_block::BasicBlock;
use crate::function::{CallingConv, Function, FunctionDecl};
use crate::instruction::{InstrAttrs, Instruction};
use crate::module::{GlobalValue, Module};
use crate::types::Type;
use crate::value::{Value, ValueKind};

pub fn write_module(module: &Module) -> String {
    let mut out = String::new();

    for structure in &module.structures {
        writeln!(out, "struct @{} {{", structure.name).unwrap();
        for member in &structure.members {
            writeln!(out, "    {}", type_to_str(module, *member)).unwrap();
        }
        out.push_str("}\n\n");
    }

    for decl in &module.external_functions {
        writeln!(out, "{}", func_decl_to_str(module, decl)).unwrap();
    }
    if !module.external_functions.is_empty() {
        out.push('\n');
    }

    for decl in &module.external_globals {
        writeln!(
            out,
            "decl global {} @{}",
            type_to_str(module, decl.ty),
            decl.name
        )
        .unwrap();
    }
    if !module.external_globals.is_empty() {
        out.push('\n');
    }

    for global in &module.globals {
        writeln!(
            out,
            "def global {} @{} = {}{}",
            type_to_str(module, global.ty),
            global.name,
            global_value_to_str(&global.initial_value),
            if global.external { " export" } else { "" }
        )
        .unwrap();
    }
    if !module.globals.is_empty() {
        out.push('\n');
    }

    for export in &module.dll_exports {
        writeln!(out, "def dllexport @{}", export).unwrap();
    }
    if !module.dll_exports.is_empty() {
        out.push('\n');
    }

    for func in &module.functions {
        write_func_def(&mut out, module, func);
        out.push('\n');
    }

    out
}

fn write_func_def(out: &mut String, module: &Module, func: &Function) {
    write!(
        out,
        "def func {} {} @{}(",
        calling_conv_to_str(func.calling_conv),
        type_to_str(module, func.return_type),
        func.name
    )
    .unwrap();

    for (i, param) in func.params.iter().enumerate() {
        if i != 0 {
            out.push_str(", ");
        }
        out.push_str(&type_to_str(module, *param));
    }
    out.push(')');

    if func.global {
        out.push_str(" global");
    }
    out.push('\n');

    for (_, block) in &func.blocks {
        write_basic_block(out, module, func, block);
    }
}

fn write_basic_block(out: &mut String, module: &Module, func: &Function, block: &BasicBlock) {
    if !block.label.is_empty() {
        out.push_str(&block.label);

        if !block.param_regs.is_empty() {
            out.push('(');
            for i in 0..block.param_regs.len() {
                if i != 0 {
                    out.push_str(", ");
                }
                write!(
                    out,
                    "{} %{}",
                    type_to_str(module, block.param_types[i]),
                    block.param_regs[i]
                )
                .unwrap();
            }
            out.push(')');
        }

        out.push_str(":\n");
    }

    for instr in block.instrs.values() {
        writeln!(out, "    {}", instr_to_str(module, func, instr)).unwrap();
    }
}

pub fn instr_to_str(module: &Module, func: &Function, instr: &Instruction) -> String {
    let mut s = String::new();

    if let Some(dest) = instr.dest {
        write!(s, "%{} = ", dest).unwrap();
    }

    write!(s, "{}", instr.opcode).unwrap();

    for (i, operand) in instr.operands.iter().enumerate() {
        s.push_str(if i == 0 { " " } else { ", " });
        s.push_str(&value_to_str(module, func, operand));
    }

    if instr.attrs.contains(InstrAttrs::ARG_STORE) {
        s.push_str(" !arg_store");
    }
    if instr.attrs.contains(InstrAttrs::SAVE_ARG) {
        s.push_str(" !save_arg");
    }
    if instr.attrs.contains(InstrAttrs::VARIADIC) {
        s.push_str(" !variadic");
    }

    s
}

pub fn value_to_str(module: &Module, func: &Function, value: &Value) -> String {
    match &value.kind {
        ValueKind::IntImmediate(imm) => format!("{} {}", type_to_str(module, value.ty), imm),
        ValueKind::FpImmediate(imm) => format!("{} {}", type_to_str(module, value.ty), imm),
        ValueKind::Register(reg) => format!("{} %{}", type_to_str(module, value.ty), reg),
        ValueKind::Symbol { name, .. } => format!("{} @{}", type_to_str(module, value.ty), name),
        ValueKind::BranchTarget(target) => {
            let label = &func.block(target.block).label;
            if target.args.is_empty() {
                format!("^{}", label)
            } else {
                let args: Vec<String> = target
                    .args
                    .iter()
                    .map(|arg| value_to_str(module, func, arg))
                    .collect();
                format!("^{}({})", label, args.join(", "))
            }
        }
        ValueKind::Comparison(cmp) => cmp.to_string(),
        ValueKind::TypeMarker => type_to_str(module, value.ty),
    }
}

pub fn type_to_str(module: &Module, ty: Type) -> String {
    match ty {
        Type::Struct(id) => format!("@{}", module.structure(id).name),
        _ => ty.to_string(),
    }
}

pub fn calling_conv_to_str(conv: CallingConv) -> &'static str {
    match conv {
        CallingConv::None => "none",
        CallingConv::X86_64SysV => "sysv",
        CallingConv::X86_64MsAbi => "ms",
        CallingConv::AArch64Aapcs => "aapcs",
    }
}

fn func_decl_to_str(module: &Module, decl: &FunctionDecl) -> String {
    let params: Vec<String> = decl
        .params
        .iter()
        .map(|param| type_to_str(module, *param))
        .collect();

    format!(
        "decl func {} {} @{}({})",
        calling_conv_to_str(decl.calling_conv),
        type_to_str(module, decl.return_type),
        decl.name,
        params.join(", ")
    )
}

fn global_value_to_str(value: &GlobalValue) -> String {
    match value {
        GlobalValue::None => "undefined".to_string(),
        GlobalValue::Int(imm) => imm.to_string(),
        GlobalValue::Fp(imm) => {
            let s = imm.to_string();
            if s.contains('.') || s.contains('e') || s.contains("inf") || s.contains("NaN") {
                s
            } else {
                format!("{}.0", s)
            }
        }
        GlobalValue::Bytes(bytes) => {
            let parts: Vec<String> = bytes.iter().map(|b| b.to_string()).collect();
            format!("[{}]", parts.join(", "))
        }
        GlobalValue::Str(s) => {
            let mut escaped = String::with_capacity(s.len() + 2);
            escaped.push('"');
            for c in s.chars() {
                match c {
                    '\0' => escaped.push_str("\\0"),
                    '\n' => escaped.push_str("\\n"),
                    '\r' => escaped.push_str("\\r"),
                    '"' => escaped.push_str("\\\""),
                    '\\' => escaped.push_str("\\\\"),
                    _ => escaped.push(c),
                }
            }
            escaped.push('"');
            escaped
        }
        GlobalValue::SymbolRef(name) => format!("@{}", name),
    }
}
