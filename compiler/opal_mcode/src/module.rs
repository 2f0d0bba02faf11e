//! Machine modules.

use std::collections::BTreeSet;

use crate::function::Function;
use crate::global::Global;

#[derive(Debug, Clone, Default)]
pub struct AddrTable {
    pub entries: Vec<String>,
}

/// The unit handed from the lowerer through the pass pipeline to an emitter.
#[derive(Default)]
pub struct Module {
    pub functions: Vec<Function>,
    pub globals: Vec<Global>,
    pub external_symbols: Vec<String>,
    pub global_symbols: BTreeSet<String>,
    pub dll_exports: Vec<String>,
    pub addr_table: Option<AddrTable>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_global(&mut self, global: Global) {
        self.globals.push(global);
    }

    pub fn add_external_symbol(&mut self, symbol: impl Into<String>) {
        self.external_symbols.push(symbol.into());
    }

    pub fn add_global_symbol(&mut self, symbol: impl Into<String>) {
        self.global_symbols.insert(symbol.into());
    }

    pub fn add_dll_export(&mut self, export: impl Into<String>) {
        self.dll_exports.push(export.into());
    }
}
