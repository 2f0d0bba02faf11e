//! Stack frame layout.
//!
//! Runs after register allocation, when spill slots and the final slot
//! inventory are known. Composes the implicit, arg-store, generic and
//! call-arg regions into final SP-relative offsets, then lets the calling
//! convention rewrite instructions whose offsets no longer encode.

use std::collections::BTreeMap;

use opal_common::timing::ScopeTimer;
use opal_mcode as mcode;
use opal_mcode::{StackRegions, StackSlotId, StackSlotKind};

use crate::machine_pass::MachinePass;
use crate::ssa_lowerer::func_arg_storage;

pub struct StackFramePass;

impl StackFramePass {
    pub fn new() -> Self {
        Self
    }

    pub fn run_func(&mut self, func: &mut mcode::Function) {
        let conv = func.calling_conv;

        let mut regions = StackRegions::default();
        conv.create_implicit_region(func, &mut regions);
        conv.create_arg_store_region(&mut func.stack_frame, &mut regions);

        // Offsets are relative to the stack pointer before the prolog's
        // allocation; they get shifted up by the allocation size below.
        let mut pre_alloca_offsets: BTreeMap<StackSlotId, i32> =
            regions.arg_store_region.offsets.clone();

        regions.generic_region.size = create_generic_region(
            func,
            &mut pre_alloca_offsets,
            regions.arg_store_region.size,
        );

        conv.create_call_arg_region(func, &mut regions);

        let alloca_size = conv.alloca_size(&regions);
        let total_size = alloca_size + regions.implicit_region.size;

        for (slot, pre_alloca_offset) in pre_alloca_offsets {
            func.stack_frame
                .slot_mut(slot)
                .set_offset(pre_alloca_offset + alloca_size);
        }

        func.stack_frame.set_size(alloca_size);
        func.stack_frame.set_total_size(total_size);

        for block_id in func.blocks.ids() {
            let mut cursor = func.block(block_id).instrs.first();
            while let Some(instr_id) = cursor {
                let continue_from = conv.fix_up_instr(func, block_id, instr_id);
                cursor = func.block(block_id).instrs.next(continue_from);
            }
        }

        // Stack-based parameters live in the caller's frame, above our
        // total size.
        let param_types: Vec<opal_ssa::Type> =
            func.parameters.iter().map(|param| param.ty).collect();
        let storage = func_arg_storage(conv, &param_types, func.uses_sret);

        for (param_index, storage) in storage.into_iter().enumerate() {
            let mcode::ArgStorage::OnStack { sp_offset, .. } = storage else {
                continue;
            };

            let mcode::ParamStorage::Slot(slot) = func.parameters[param_index].storage else {
                continue;
            };

            let offset = func.stack_frame.total_size() + sp_offset;
            func.stack_frame.slot_mut(slot).set_offset(offset);
        }

        func.unwind_info.alloc_size = func.stack_frame.size().max(0) as u32;
    }
}

impl Default for StackFramePass {
    fn default() -> Self {
        Self::new()
    }
}

impl MachinePass for StackFramePass {
    fn run(&mut self, module: &mut mcode::Module) {
        let _timer = ScopeTimer::new("stack frame builder");

        for func in &mut module.functions {
            self.run_func(func);
        }
    }
}

/// Assigns descending pre-alloca offsets to every still-undefined generic
/// slot, below the arg-store region, and returns the region size.
fn create_generic_region(
    func: &mut mcode::Function,
    pre_alloca_offsets: &mut BTreeMap<StackSlotId, i32>,
    top: i32,
) -> i32 {
    let frame = &mut func.stack_frame;
    let mut generic_slot_offset = top;

    for index in 0..frame.slots().len() {
        let slot = &frame.slots()[index];
        if !slot.is_defined() && slot.kind == StackSlotKind::Generic {
            generic_slot_offset -= slot.size as i32;
            pre_alloca_offsets.insert(index as StackSlotId, generic_slot_offset);
        }
    }

    -(generic_slot_offset + top)
}
