//! Parses the text format produced by [`crate::writer`].

use std::str::FromStr;

use opal_common::{BackendError, BackendResult};

use crate::basic_block::{BasicBlock, BlockId};
use crate::comparison::Comparison;
use crate::function::{CallingConv, Function, FunctionDecl, VirtualRegister};
use crate::instruction::{InstrAttrs, Instruction, Opcode};
use crate::large_int::LargeInt;
use crate::module::{Global, GlobalDecl, GlobalValue, Module, Structure};
use crate::types::Type;
use crate::value::{SymbolKind, Value};

pub fn read_module(text: &str) -> BackendResult<Module> {
    Reader::new(text).read()
}

struct Reader<'t> {
    lines: Vec<&'t str>,
    pos: usize,
    module: Module,
}

impl<'t> Reader<'t> {
    fn new(text: &'t str) -> Self {
        Self {
            lines: text.lines().collect(),
            pos: 0,
            module: Module::new(),
        }
    }

    fn read(mut self) -> BackendResult<Module> {
        while self.pos < self.lines.len() {
            let line = self.lines[self.pos].trim_end();

            if line.trim().is_empty() {
                self.pos += 1;
            } else if let Some(rest) = line.strip_prefix("struct @") {
                self.read_struct(rest)?;
            } else if let Some(rest) = line.strip_prefix("decl func ") {
                let decl = self.read_func_decl(rest)?;
                self.module.external_functions.push(decl);
                self.pos += 1;
            } else if let Some(rest) = line.strip_prefix("decl global ") {
                self.read_global_decl(rest)?;
                self.pos += 1;
            } else if let Some(rest) = line.strip_prefix("def global ") {
                self.read_global_def(rest)?;
                self.pos += 1;
            } else if let Some(rest) = line.strip_prefix("def dllexport @") {
                self.module.dll_exports.push(rest.trim().to_string());
                self.pos += 1;
            } else if let Some(rest) = line.strip_prefix("def func ") {
                self.read_func_def(rest.to_string())?;
            } else {
                return Err(self.error(format!("unexpected line: {}", line)));
            }
        }

        resolve_symbol_kinds(&mut self.module);
        Ok(self.module)
    }

    fn read_struct(&mut self, header_rest: &str) -> BackendResult<()> {
        let name = header_rest
            .strip_suffix('{')
            .ok_or_else(|| self.error("expected '{' after struct name"))?
            .trim()
            .to_string();

        self.pos += 1;
        let mut members = Vec::new();

        loop {
            let line = self
                .lines
                .get(self.pos)
                .ok_or_else(|| self.error("unterminated struct definition"))?
                .trim();
            self.pos += 1;

            if line == "}" {
                break;
            }
            members.push(self.parse_type(line)?);
        }

        self.module.add_structure(Structure { name, members });
        Ok(())
    }

    fn read_func_decl(&mut self, rest: &str) -> BackendResult<FunctionDecl> {
        let (conv, rest) = split_token(rest);
        let (ret, rest) = split_token(rest);
        let calling_conv = self.parse_calling_conv(conv)?;
        let return_type = self.parse_type(ret)?;

        let (name, params) = self.parse_signature(rest)?;
        Ok(FunctionDecl {
            name,
            calling_conv,
            params,
            return_type,
        })
    }

    fn read_global_decl(&mut self, rest: &str) -> BackendResult<()> {
        let (ty, rest) = split_token(rest);
        let ty = self.parse_type(ty)?;
        let name = rest
            .trim()
            .strip_prefix('@')
            .ok_or_else(|| self.error("expected '@' before global name"))?
            .to_string();

        self.module.external_globals.push(GlobalDecl { name, ty });
        Ok(())
    }

    fn read_global_def(&mut self, rest: &str) -> BackendResult<()> {
        let (ty, rest) = split_token(rest);
        let ty = self.parse_type(ty)?;

        let (name_part, value_part) = rest
            .split_once(" = ")
            .ok_or_else(|| self.error("expected '=' in global definition"))?;
        let name = name_part
            .trim()
            .strip_prefix('@')
            .ok_or_else(|| self.error("expected '@' before global name"))?
            .to_string();

        let mut value_text = value_part.trim();
        let mut external = false;
        if !value_text.starts_with('"') {
            if let Some(stripped) = value_text.strip_suffix(" export") {
                value_text = stripped.trim_end();
                external = true;
            }
        }

        let initial_value = self.parse_global_value(value_text, ty)?;
        self.module.globals.push(Global {
            name,
            ty,
            initial_value,
            external,
        });
        Ok(())
    }

    fn read_func_def(&mut self, header: String) -> BackendResult<()> {
        let (conv, rest) = split_token(&header);
        let (ret, rest) = split_token(rest);
        let calling_conv = self.parse_calling_conv(conv)?;
        let return_type = self.parse_type(ret)?;

        let (sig, global) = match rest.trim_end().strip_suffix(" global") {
            Some(sig) => (sig, true),
            None => (rest, false),
        };
        let (name, params) = self.parse_signature(sig)?;

        let mut func = Function::new(name, calling_conv, params, return_type);
        func.global = global;
        self.pos += 1;

        // Collect the body: indented instruction lines and block headers.
        let start = self.pos;
        while self.pos < self.lines.len() {
            let line = self.lines[self.pos];
            let is_instr = line.starts_with("    ") && !line.trim().is_empty();
            let is_header = !line.starts_with(' ') && line.trim_end().ends_with(':');
            if !is_instr && !is_header {
                break;
            }
            self.pos += 1;
        }
        let body: Vec<(usize, &str)> = (start..self.pos)
            .map(|index| (index, self.lines[index]))
            .collect();

        // First pass: create the blocks so branch targets can be resolved.
        let mut max_reg: VirtualRegister = 0;

        for &(index, line) in &body {
            if line.starts_with("    ") {
                if index == start && func.blocks.is_empty() {
                    func.append_block(BasicBlock::new(""));
                }
            } else {
                let header = line.trim_end().strip_suffix(':').unwrap();
                let block = self.parse_block_header(header, &mut max_reg)?;
                func.append_block(block);
            }
        }

        // Second pass: parse instructions into their blocks.
        let mut current = func.blocks.first();
        for &(_, line) in &body {
            if line.starts_with("    ") {
                let block = current.ok_or_else(|| self.error("instruction outside of a block"))?;
                let instr = self.parse_instr(line.trim(), &func, &mut max_reg)?;
                func.block_mut(block).append(instr);
            } else {
                let header = line.trim_end().strip_suffix(':').unwrap();
                let label = header.split('(').next().unwrap_or(header);
                current = func.block_by_label(label);
            }
        }

        func.next_virtual_reg = max_reg + 1;
        self.module.functions.push(func);
        Ok(())
    }

    fn parse_block_header(
        &self,
        header: &str,
        max_reg: &mut VirtualRegister,
    ) -> BackendResult<BasicBlock> {
        match header.split_once('(') {
            None => Ok(BasicBlock::new(header)),
            Some((label, params)) => {
                let params = params
                    .strip_suffix(')')
                    .ok_or_else(|| self.error("unterminated block parameter list"))?;

                let mut block = BasicBlock::new(label);
                for param in split_operands(params) {
                    let (ty, reg) = split_token(param.trim());
                    let ty = self.parse_type(ty)?;
                    let reg = self.parse_reg(reg.trim())?;
                    *max_reg = (*max_reg).max(reg);
                    block.param_types.push(ty);
                    block.param_regs.push(reg);
                }
                Ok(block)
            }
        }
    }

    fn parse_instr(
        &self,
        line: &str,
        func: &Function,
        max_reg: &mut VirtualRegister,
    ) -> BackendResult<Instruction> {
        let (dest, rest) = match line.split_once(" = ") {
            Some((dest, rest)) if dest.starts_with('%') => {
                let reg = self.parse_reg(dest)?;
                *max_reg = (*max_reg).max(reg);
                (Some(reg), rest)
            }
            _ => (None, line),
        };

        let mut attrs = InstrAttrs::empty();
        let mut rest = rest.trim_end();
        loop {
            if let Some(stripped) = rest.strip_suffix(" !arg_store") {
                attrs |= InstrAttrs::ARG_STORE;
                rest = stripped;
            } else if let Some(stripped) = rest.strip_suffix(" !save_arg") {
                attrs |= InstrAttrs::SAVE_ARG;
                rest = stripped;
            } else if let Some(stripped) = rest.strip_suffix(" !variadic") {
                attrs |= InstrAttrs::VARIADIC;
                rest = stripped;
            } else {
                break;
            }
        }

        let (opcode, operands_str) = split_token(rest);
        let opcode = Opcode::from_str(opcode)
            .map_err(|_| self.error(format!("unknown opcode: {}", opcode)))?;

        let mut operands = Vec::new();
        if !operands_str.trim().is_empty() {
            for operand in split_operands(operands_str) {
                operands.push(self.parse_value(operand.trim(), func, max_reg)?);
            }
        }

        let mut instr = Instruction::new(opcode, operands);
        instr.dest = dest;
        instr.attrs = attrs;
        Ok(instr)
    }

    fn parse_value(
        &self,
        text: &str,
        func: &Function,
        max_reg: &mut VirtualRegister,
    ) -> BackendResult<Value> {
        if let Some(target) = text.strip_prefix('^') {
            let (label, args) = match target.split_once('(') {
                None => (target, Vec::new()),
                Some((label, args)) => {
                    let args = args
                        .strip_suffix(')')
                        .ok_or_else(|| self.error("unterminated branch argument list"))?;
                    let mut parsed = Vec::new();
                    for arg in split_operands(args) {
                        parsed.push(self.parse_value(arg.trim(), func, max_reg)?);
                    }
                    (label, parsed)
                }
            };

            let block = self.resolve_label(func, label)?;
            return Ok(Value::from_branch_target(block, args));
        }

        match text.split_once(' ') {
            None => {
                if let Ok(cmp) = Comparison::from_str(text) {
                    Ok(Value::from_comparison(cmp))
                } else {
                    Ok(Value::from_type(self.parse_type(text)?))
                }
            }
            Some((ty, payload)) => {
                let ty = self.parse_type(ty)?;
                let payload = payload.trim();

                if let Some(reg) = payload.strip_prefix('%') {
                    let reg = reg
                        .parse()
                        .map_err(|_| self.error("malformed register operand"))?;
                    *max_reg = (*max_reg).max(reg);
                    Ok(Value::from_register(reg, ty))
                } else if let Some(name) = payload.strip_prefix('@') {
                    // Kind gets resolved after the whole module is parsed.
                    Ok(Value::from_symbol(name, SymbolKind::Function, ty))
                } else if ty.is_floating_point() {
                    let value = payload
                        .parse::<f64>()
                        .map_err(|_| self.error("malformed floating-point immediate"))?;
                    Ok(Value::from_fp_immediate(value, ty))
                } else {
                    let value = self.parse_int(payload)?;
                    Ok(Value::from_int_immediate(value, ty))
                }
            }
        }
    }

    fn resolve_label(&self, func: &Function, label: &str) -> BackendResult<BlockId> {
        func.block_by_label(label)
            .ok_or_else(|| self.error(format!("branch to unknown block: {}", label)))
    }

    fn parse_reg(&self, text: &str) -> BackendResult<VirtualRegister> {
        text.strip_prefix('%')
            .and_then(|reg| reg.parse().ok())
            .ok_or_else(|| self.error(format!("malformed register: {}", text)))
    }

    fn parse_int(&self, text: &str) -> BackendResult<LargeInt> {
        if let Some(negative) = text.strip_prefix('-') {
            negative
                .parse::<u64>()
                .map(|magnitude| LargeInt::new(true, magnitude))
        } else {
            text.parse::<u64>().map(LargeInt::from)
        }
        .map_err(|_| self.error(format!("malformed integer: {}", text)))
    }

    fn parse_type(&self, text: &str) -> BackendResult<Type> {
        Ok(match text {
            "void" => Type::Void,
            "i8" => Type::I8,
            "i16" => Type::I16,
            "i32" => Type::I32,
            "i64" => Type::I64,
            "f32" => Type::F32,
            "f64" => Type::F64,
            "addr" => Type::Addr,
            _ => {
                let name = text
                    .strip_prefix('@')
                    .ok_or_else(|| self.error(format!("unknown type: {}", text)))?;
                let id = self
                    .module
                    .structure_by_name(name)
                    .ok_or_else(|| self.error(format!("unknown struct type: @{}", name)))?;
                Type::Struct(id)
            }
        })
    }

    fn parse_calling_conv(&self, text: &str) -> BackendResult<CallingConv> {
        Ok(match text {
            "none" => CallingConv::None,
            "sysv" => CallingConv::X86_64SysV,
            "ms" => CallingConv::X86_64MsAbi,
            "aapcs" => CallingConv::AArch64Aapcs,
            _ => return Err(self.error(format!("unknown calling convention: {}", text))),
        })
    }

    fn parse_signature(&self, text: &str) -> BackendResult<(String, Vec<Type>)> {
        let text = text.trim();
        let (name, params) = text
            .split_once('(')
            .ok_or_else(|| self.error("expected '(' in function signature"))?;
        let name = name
            .strip_prefix('@')
            .ok_or_else(|| self.error("expected '@' before function name"))?
            .to_string();
        let params_str = params
            .trim_end()
            .strip_suffix(')')
            .ok_or_else(|| self.error("unterminated parameter list"))?;

        let mut params = Vec::new();
        if !params_str.trim().is_empty() {
            for param in params_str.split(',') {
                params.push(self.parse_type(param.trim())?);
            }
        }
        Ok((name, params))
    }

    fn parse_global_value(&self, text: &str, ty: Type) -> BackendResult<GlobalValue> {
        if text == "undefined" {
            Ok(GlobalValue::None)
        } else if let Some(name) = text.strip_prefix('@') {
            Ok(GlobalValue::SymbolRef(name.to_string()))
        } else if let Some(quoted) = text.strip_prefix('"') {
            let quoted = quoted
                .strip_suffix('"')
                .ok_or_else(|| self.error("unterminated string literal"))?;
            Ok(GlobalValue::Str(unescape(quoted)))
        } else if let Some(list) = text.strip_prefix('[') {
            let list = list
                .strip_suffix(']')
                .ok_or_else(|| self.error("unterminated byte list"))?;
            let mut bytes = Vec::new();
            for part in list.split(',') {
                let part = part.trim();
                if part.is_empty() {
                    continue;
                }
                bytes.push(
                    part.parse()
                        .map_err(|_| self.error(format!("malformed byte: {}", part)))?,
                );
            }
            Ok(GlobalValue::Bytes(bytes))
        } else if ty.is_floating_point() {
            text.parse()
                .map(GlobalValue::Fp)
                .map_err(|_| self.error("malformed floating-point initializer"))
        } else {
            self.parse_int(text).map(GlobalValue::Int)
        }
    }

    fn error(&self, message: impl Into<String>) -> BackendError {
        BackendError::parse(self.pos + 1, message)
    }
}

/// Splits a comma-separated operand list, ignoring commas inside parentheses
/// (branch-target argument lists).
fn split_operands(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    if !text[start..].trim().is_empty() {
        parts.push(&text[start..]);
    }
    parts
}

fn split_token(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.split_once(' ') {
        Some((token, rest)) => (token, rest),
        None => (text, ""),
    }
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }

        match chars.next() {
            Some('0') => out.push('\0'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => out.push(other),
            None => break,
        }
    }

    out
}

/// Rewrites symbol operand kinds after parsing, once all definitions and
/// declarations are known.
fn resolve_symbol_kinds(module: &mut Module) {
    let func_names: Vec<String> = module.functions.iter().map(|f| f.name.clone()).collect();
    let extern_func_names: Vec<String> = module
        .external_functions
        .iter()
        .map(|f| f.name.clone())
        .collect();
    let extern_global_names: Vec<String> = module
        .external_globals
        .iter()
        .map(|g| g.name.clone())
        .collect();

    let kind_of = |name: &str| {
        if extern_func_names.iter().any(|n| n == name) {
            SymbolKind::ExternFunction
        } else if func_names.iter().any(|n| n == name) {
            SymbolKind::Function
        } else if extern_global_names.iter().any(|n| n == name) {
            SymbolKind::ExternGlobal
        } else {
            SymbolKind::Global
        }
    };

    for func in &mut module.functions {
        for block_id in func.blocks.ids() {
            for instr_id in func.blocks.get(block_id).instrs.ids() {
                let instr = func.blocks.get_mut(block_id).instrs.get_mut(instr_id);
                for operand in &mut instr.operands {
                    fix_symbol_kind(operand, &kind_of);
                }
            }
        }
    }
}

fn fix_symbol_kind(value: &mut Value, kind_of: &impl Fn(&str) -> SymbolKind) {
    match &mut value.kind {
        crate::value::ValueKind::Symbol { name, kind } => *kind = kind_of(name),
        crate::value::ValueKind::BranchTarget(target) => {
            for arg in &mut target.args {
                fix_symbol_kind(arg, kind_of);
            }
        }
        _ => {}
    }
}
