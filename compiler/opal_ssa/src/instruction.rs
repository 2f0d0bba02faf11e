//! SSA instructions.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::function::VirtualRegister;
use crate::value::Value;

pub type InstrId = opal_common::NodeId;

/// The closed set of SSA opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    Alloca,
    Load,
    Store,
    LoadArg,
    Add,
    Sub,
    Mul,
    SDiv,
    SRem,
    UDiv,
    URem,
    FAdd,
    FSub,
    FMul,
    FDiv,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Jmp,
    CJmp,
    FCJmp,
    Select,
    Call,
    Ret,
    UExtend,
    SExtend,
    Truncate,
    FPromote,
    FDemote,
    UToF,
    SToF,
    FToU,
    FToS,
    OffsetPtr,
    MemberPtr,
    Copy,
    Sqrt,
}

impl Opcode {
    pub fn is_terminator(&self) -> bool {
        matches!(self, Opcode::Jmp | Opcode::CJmp | Opcode::FCJmp | Opcode::Ret)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Opcode::Alloca => "alloca",
            Opcode::Load => "load",
            Opcode::Store => "store",
            Opcode::LoadArg => "loadarg",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::SDiv => "sdiv",
            Opcode::SRem => "srem",
            Opcode::UDiv => "udiv",
            Opcode::URem => "urem",
            Opcode::FAdd => "fadd",
            Opcode::FSub => "fsub",
            Opcode::FMul => "fmul",
            Opcode::FDiv => "fdiv",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Xor => "xor",
            Opcode::Shl => "shl",
            Opcode::Shr => "shr",
            Opcode::Jmp => "jmp",
            Opcode::CJmp => "cjmp",
            Opcode::FCJmp => "fcjmp",
            Opcode::Select => "select",
            Opcode::Call => "call",
            Opcode::Ret => "ret",
            Opcode::UExtend => "uextend",
            Opcode::SExtend => "sextend",
            Opcode::Truncate => "truncate",
            Opcode::FPromote => "fpromote",
            Opcode::FDemote => "fdemote",
            Opcode::UToF => "utof",
            Opcode::SToF => "stof",
            Opcode::FToU => "ftou",
            Opcode::FToS => "ftos",
            Opcode::OffsetPtr => "offsetptr",
            Opcode::MemberPtr => "memberptr",
            Opcode::Copy => "copy",
            Opcode::Sqrt => "sqrt",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Opcode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "alloca" => Opcode::Alloca,
            "load" => Opcode::Load,
            "store" => Opcode::Store,
            "loadarg" => Opcode::LoadArg,
            "add" => Opcode::Add,
            "sub" => Opcode::Sub,
            "mul" => Opcode::Mul,
            "sdiv" => Opcode::SDiv,
            "srem" => Opcode::SRem,
            "udiv" => Opcode::UDiv,
            "urem" => Opcode::URem,
            "fadd" => Opcode::FAdd,
            "fsub" => Opcode::FSub,
            "fmul" => Opcode::FMul,
            "fdiv" => Opcode::FDiv,
            "and" => Opcode::And,
            "or" => Opcode::Or,
            "xor" => Opcode::Xor,
            "shl" => Opcode::Shl,
            "shr" => Opcode::Shr,
            "jmp" => Opcode::Jmp,
            "cjmp" => Opcode::CJmp,
            "fcjmp" => Opcode::FCJmp,
            "select" => Opcode::Select,
            "call" => Opcode::Call,
            "ret" => Opcode::Ret,
            "uextend" => Opcode::UExtend,
            "sextend" => Opcode::SExtend,
            "truncate" => Opcode::Truncate,
            "fpromote" => Opcode::FPromote,
            "fdemote" => Opcode::FDemote,
            "utof" => Opcode::UToF,
            "stof" => Opcode::SToF,
            "ftou" => Opcode::FToU,
            "ftos" => Opcode::FToS,
            "offsetptr" => Opcode::OffsetPtr,
            "memberptr" => Opcode::MemberPtr,
            "copy" => Opcode::Copy,
            "sqrt" => Opcode::Sqrt,
            _ => return Err(()),
        })
    }
}

bitflags! {
    /// Attributes attached to individual instructions by the front-end.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InstrAttrs: u8 {
        /// The alloca backs the storage of an incoming argument.
        const ARG_STORE = 1 << 0;
        /// The store saves an incoming argument into its storage.
        const SAVE_ARG = 1 << 1;
        /// The call site is variadic.
        const VARIADIC = 1 << 2;
    }
}

impl Serialize for InstrAttrs {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.bits())
    }
}

impl<'de> Deserialize<'de> for InstrAttrs {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = u8::deserialize(deserializer)?;
        Ok(InstrAttrs::from_bits_truncate(bits))
    }
}

/// A single SSA instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: Opcode,
    pub dest: Option<VirtualRegister>,
    pub operands: Vec<Value>,
    pub attrs: InstrAttrs,
}

impl Instruction {
    pub fn new(opcode: Opcode, operands: Vec<Value>) -> Self {
        Self {
            opcode,
            dest: None,
            operands,
            attrs: InstrAttrs::empty(),
        }
    }

    pub fn with_dest(opcode: Opcode, dest: VirtualRegister, operands: Vec<Value>) -> Self {
        Self {
            opcode,
            dest: Some(dest),
            operands,
            attrs: InstrAttrs::empty(),
        }
    }

    pub fn with_attrs(mut self, attrs: InstrAttrs) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn operand(&self, index: usize) -> &Value {
        &self.operands[index]
    }
}
