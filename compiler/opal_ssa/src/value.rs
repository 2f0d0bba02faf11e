//! SSA operands.

use serde::{Deserialize, Serialize};

use crate::basic_block::BlockId;
use crate::comparison::Comparison;
use crate::function::VirtualRegister;
use crate::large_int::LargeInt;
use crate::types::Type;

/// What kind of symbol a symbol operand refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolKind {
    Function,
    ExternFunction,
    Global,
    ExternGlobal,
}

/// A branch edge: the target block plus the values flowing into its
/// parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchTarget {
    pub block: BlockId,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValueKind {
    IntImmediate(LargeInt),
    FpImmediate(f64),
    Register(VirtualRegister),
    Symbol { name: String, kind: SymbolKind },
    BranchTarget(BranchTarget),
    Comparison(Comparison),
    /// A bare type used as a marker operand (e.g. the first operand of
    /// `alloca` or a conversion's destination type).
    TypeMarker,
}

/// A typed instruction operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    pub kind: ValueKind,
    pub ty: Type,
}

impl Value {
    pub fn from_int_immediate(value: impl Into<LargeInt>, ty: Type) -> Value {
        Value {
            kind: ValueKind::IntImmediate(value.into()),
            ty,
        }
    }

    pub fn from_fp_immediate(value: f64, ty: Type) -> Value {
        Value {
            kind: ValueKind::FpImmediate(value),
            ty,
        }
    }

    pub fn from_register(reg: VirtualRegister, ty: Type) -> Value {
        Value {
            kind: ValueKind::Register(reg),
            ty,
        }
    }

    pub fn from_symbol(name: impl Into<String>, kind: SymbolKind, ty: Type) -> Value {
        Value {
            kind: ValueKind::Symbol {
                name: name.into(),
                kind,
            },
            ty,
        }
    }

    pub fn from_extern_func(name: impl Into<String>, return_type: Type) -> Value {
        Value::from_symbol(name, SymbolKind::ExternFunction, return_type)
    }

    pub fn from_func(name: impl Into<String>, return_type: Type) -> Value {
        Value::from_symbol(name, SymbolKind::Function, return_type)
    }

    pub fn from_branch_target(block: BlockId, args: Vec<Value>) -> Value {
        Value {
            kind: ValueKind::BranchTarget(BranchTarget { block, args }),
            ty: Type::Void,
        }
    }

    pub fn from_comparison(cmp: Comparison) -> Value {
        Value {
            kind: ValueKind::Comparison(cmp),
            ty: Type::Void,
        }
    }

    pub fn from_type(ty: Type) -> Value {
        Value {
            kind: ValueKind::TypeMarker,
            ty,
        }
    }

    pub fn is_int_immediate(&self) -> bool {
        matches!(self.kind, ValueKind::IntImmediate(_))
    }

    pub fn is_fp_immediate(&self) -> bool {
        matches!(self.kind, ValueKind::FpImmediate(_))
    }

    pub fn is_immediate(&self) -> bool {
        self.is_int_immediate() || self.is_fp_immediate()
    }

    pub fn is_register(&self) -> bool {
        matches!(self.kind, ValueKind::Register(_))
    }

    pub fn is_symbol(&self) -> bool {
        matches!(self.kind, ValueKind::Symbol { .. })
    }

    pub fn is_branch_target(&self) -> bool {
        matches!(self.kind, ValueKind::BranchTarget(_))
    }

    pub fn int_immediate(&self) -> LargeInt {
        match self.kind {
            ValueKind::IntImmediate(value) => value,
            _ => unreachable!("operand is not an integer immediate"),
        }
    }

    pub fn fp_immediate(&self) -> f64 {
        match self.kind {
            ValueKind::FpImmediate(value) => value,
            _ => unreachable!("operand is not a floating-point immediate"),
        }
    }

    pub fn register(&self) -> VirtualRegister {
        match self.kind {
            ValueKind::Register(reg) => reg,
            _ => unreachable!("operand is not a register"),
        }
    }

    pub fn symbol_name(&self) -> &str {
        match &self.kind {
            ValueKind::Symbol { name, .. } => name,
            _ => unreachable!("operand is not a symbol"),
        }
    }

    pub fn symbol_kind(&self) -> SymbolKind {
        match &self.kind {
            ValueKind::Symbol { kind, .. } => *kind,
            _ => unreachable!("operand is not a symbol"),
        }
    }

    pub fn is_func(&self) -> bool {
        self.is_symbol() && self.symbol_kind() == SymbolKind::Function
    }

    pub fn is_extern_func(&self) -> bool {
        self.is_symbol() && self.symbol_kind() == SymbolKind::ExternFunction
    }

    pub fn is_extern_global(&self) -> bool {
        self.is_symbol() && self.symbol_kind() == SymbolKind::ExternGlobal
    }

    pub fn branch_target(&self) -> &BranchTarget {
        match &self.kind {
            ValueKind::BranchTarget(target) => target,
            _ => unreachable!("operand is not a branch target"),
        }
    }

    pub fn branch_target_mut(&mut self) -> &mut BranchTarget {
        match &mut self.kind {
            ValueKind::BranchTarget(target) => target,
            _ => unreachable!("operand is not a branch target"),
        }
    }

    pub fn comparison(&self) -> Comparison {
        match self.kind {
            ValueKind::Comparison(cmp) => cmp,
            _ => unreachable!("operand is not a comparison"),
        }
    }
}
