//! SSA modules and globals.

use serde::{Deserialize, Serialize};

use crate::function::{Function, FunctionDecl};
use crate::large_int::LargeInt;
use crate::types::Type;

pub type StructureId = u32;

/// An aggregate type definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Structure {
    pub name: String,
    pub members: Vec<Type>,
}

/// The initial value of a global definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GlobalValue {
    None,
    Int(LargeInt),
    Fp(f64),
    Bytes(Vec<u8>),
    /// NUL-terminated when emitted.
    Str(String),
    SymbolRef(String),
}

/// A global variable definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Global {
    pub name: String,
    pub ty: Type,
    pub initial_value: GlobalValue,
    /// Whether the symbol is visible outside the module.
    pub external: bool,
}

/// Declaration of an external global.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalDecl {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddrTable {
    pub entries: Vec<String>,
}

/// A compilation unit. Owns its functions, globals and structure types.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Module {
    pub functions: Vec<Function>,
    pub external_functions: Vec<FunctionDecl>,
    pub globals: Vec<Global>,
    pub external_globals: Vec<GlobalDecl>,
    pub structures: Vec<Structure>,
    pub dll_exports: Vec<String>,
    pub addr_table: Option<AddrTable>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_structure(&mut self, structure: Structure) -> StructureId {
        let id = self.structures.len() as StructureId;
        self.structures.push(structure);
        id
    }

    pub fn structure(&self, id: StructureId) -> &Structure {
        &self.structures[id as usize]
    }

    pub fn structure_by_name(&self, name: &str) -> Option<StructureId> {
        self.structures
            .iter()
            .position(|s| s.name == name)
            .map(|index| index as StructureId)
    }

    pub fn add_function(&mut self, function: Function) -> &mut Function {
        self.functions.push(function);
        self.functions.last_mut().unwrap()
    }

    pub fn external_function(&self, name: &str) -> Option<&FunctionDecl> {
        self.external_functions.iter().find(|decl| decl.name == name)
    }
}
