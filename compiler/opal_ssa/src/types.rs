//! SSA type representation.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::module::StructureId;

/// A value type. Types are small and copied freely; sizes, alignments and
/// field offsets are computed by the per-target data layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Void,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    /// Opaque pointer.
    Addr,
    /// Handle to a structure defined in the module.
    Struct(StructureId),
}

impl Type {
    pub fn is_floating_point(&self) -> bool {
        matches!(self, Type::F32 | Type::F64)
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::I8 | Type::I16 | Type::I32 | Type::I64)
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, Type::Struct(_))
    }

    pub fn struct_id(&self) -> Option<StructureId> {
        match self {
            Type::Struct(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::I8 => write!(f, "i8"),
            Type::I16 => write!(f, "i16"),
            Type::I32 => write!(f, "i32"),
            Type::I64 => write!(f, "i64"),
            Type::F32 => write!(f, "f32"),
            Type::F64 => write!(f, "f64"),
            Type::Addr => write!(f, "addr"),
            Type::Struct(id) => write!(f, "@struct.{}", id),
        }
    }
}
