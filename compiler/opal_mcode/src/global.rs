//! Lowered globals.

use opal_ssa::LargeInt;

/// The initializer of a lowered global.
#[derive(Debug, Clone, PartialEq)]
pub enum GlobalValue {
    None,
    Int(LargeInt),
    Fp(f64),
    Bytes(Vec<u8>),
    Str(String),
    SymbolRef(String),
}

/// A global as the emitters see it: name, raw size/alignment, initializer.
#[derive(Debug, Clone)]
pub struct Global {
    pub name: String,
    pub size: u32,
    pub alignment: u32,
    pub value: GlobalValue,
}
