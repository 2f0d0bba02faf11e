//! Sizes, alignments and field offsets of SSA types.

use opal_common::utils::align_up;
use serde::{Deserialize, Serialize};

use crate::module::{Module, StructureId};
use crate::types::Type;

/// Computes the in-memory layout of SSA types.
///
/// Both supported targets are 64-bit LP64-style machines, so a single layout
/// with 8-byte pointers serves them all.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DataLayout {
    usize_size: u32,
}

impl DataLayout {
    pub fn new(usize_size: u32) -> Self {
        Self { usize_size }
    }

    pub fn usize_type(&self) -> Type {
        Type::I64
    }

    pub fn size(&self, module: &Module, ty: Type) -> u32 {
        match ty {
            Type::Void => 0,
            Type::I8 => 1,
            Type::I16 => 2,
            Type::I32 => 4,
            Type::I64 => 8,
            Type::F32 => 4,
            Type::F64 => 8,
            Type::Addr => self.usize_size,
            Type::Struct(id) => self.struct_size(module, id),
        }
    }

    pub fn alignment(&self, module: &Module, ty: Type) -> u32 {
        match ty {
            Type::Struct(id) => module
                .structure(id)
                .members
                .iter()
                .map(|member| self.alignment(module, *member))
                .max()
                .unwrap_or(1),
            _ => self.size(module, ty).max(1),
        }
    }

    pub fn member_offset(&self, module: &Module, struct_id: StructureId, index: usize) -> u32 {
        let members = &module.structure(struct_id).members;

        let mut offset = 0;
        for member in &members[..index] {
            let size = self.size(module, *member);
            let alignment = self.alignment(module, *member);
            offset = align_up(offset as i32, alignment as i32) as u32 + size;
        }

        let alignment = self.alignment(module, members[index]);
        align_up(offset as i32, alignment as i32) as u32
    }

    fn struct_size(&self, module: &Module, id: StructureId) -> u32 {
        let structure = module.structure(id);

        let mut offset = 0;
        for member in &structure.members {
            let size = self.size(module, *member);
            let alignment = self.alignment(module, *member);
            offset = align_up(offset as i32, alignment as i32) as u32 + size;
        }

        let alignment = self.alignment(module, Type::Struct(id));
        align_up(offset as i32, alignment as i32) as u32
    }
}

impl Default for DataLayout {
    fn default() -> Self {
        Self::new(8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Structure;
    use test_case::test_case;

    #[test_case(Type::I8, 1 ; "i8")]
    #[test_case(Type::I16, 2 ; "i16")]
    #[test_case(Type::I32, 4 ; "i32")]
    #[test_case(Type::I64, 8 ; "i64")]
    #[test_case(Type::F32, 4 ; "f32")]
    #[test_case(Type::F64, 8 ; "f64")]
    #[test_case(Type::Addr, 8 ; "addr")]
    #[test_case(Type::Void, 0 ; "void")]
    fn test_primitive_sizes(ty: Type, expected: u32) {
        let module = Module::new();
        assert_eq!(DataLayout::default().size(&module, ty), expected);
    }

    #[test]
    fn test_struct_layout_with_padding() {
        let mut module = Module::new();
        let id = module.add_structure(Structure {
            name: "pair".to_string(),
            members: vec![Type::I32, Type::I64],
        });

        let layout = DataLayout::default();
        assert_eq!(layout.size(&module, Type::Struct(id)), 16);
        assert_eq!(layout.alignment(&module, Type::Struct(id)), 8);
        assert_eq!(layout.member_offset(&module, id, 0), 0);
        assert_eq!(layout.member_offset(&module, id, 1), 8);
    }

    #[test]
    fn test_nested_struct() {
        let mut module = Module::new();
        let inner = module.add_structure(Structure {
            name: "inner".to_string(),
            members: vec![Type::I8, Type::I8],
        });
        let outer = module.add_structure(Structure {
            name: "outer".to_string(),
            members: vec![Type::Struct(inner), Type::I32],
        });

        let layout = DataLayout::default();
        assert_eq!(layout.size(&module, Type::Struct(outer)), 8);
        assert_eq!(layout.member_offset(&module, outer, 1), 4);
    }
}
