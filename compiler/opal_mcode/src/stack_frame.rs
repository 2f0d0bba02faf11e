//! Stack frames, slots and layout regions.

use std::collections::BTreeMap;

use crate::register::StackSlotId;

/// What a stack slot is used for. The stack-frame pass assigns offsets per
/// kind: arg-store slots hold spilled incoming arguments, call-arg slots hold
/// outgoing stack arguments, everything else is generic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackSlotKind {
    Generic,
    ArgStore,
    CallArg,
}

/// A named region of the stack frame. The offset is relative to SP after the
/// prolog once the stack-frame pass has run.
#[derive(Debug, Clone)]
pub struct StackSlot {
    pub kind: StackSlotKind,
    pub size: u32,
    pub alignment: u32,
    offset: Option<i32>,
    pub call_arg_index: u32,
}

impl StackSlot {
    pub fn new(kind: StackSlotKind, size: u32, alignment: u32) -> Self {
        Self {
            kind,
            size,
            alignment,
            offset: None,
            call_arg_index: 0,
        }
    }

    pub fn is_defined(&self) -> bool {
        self.offset.is_some()
    }

    pub fn offset(&self) -> i32 {
        self.offset.expect("stack slot offset is not defined yet")
    }

    pub fn set_offset(&mut self, offset: i32) {
        self.offset = Some(offset);
    }
}

/// All stack slots of a function, plus the bookkeeping the calling
/// convention and the stack-frame pass share.
#[derive(Debug, Clone, Default)]
pub struct StackFrame {
    slots: Vec<StackSlot>,
    pub call_arg_slot_indices: Vec<StackSlotId>,
    pub reg_save_slot_indices: Vec<StackSlotId>,
    /// Bytes subtracted from SP by the prolog.
    size: i32,
    /// Allocation plus the implicit region (return address, saved registers).
    total_size: i32,
}

impl StackFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_stack_slot(&mut self, slot: StackSlot) -> StackSlotId {
        let id = self.slots.len() as StackSlotId;
        let is_call_arg = slot.kind == StackSlotKind::CallArg;
        self.slots.push(slot);

        if is_call_arg {
            self.call_arg_slot_indices.push(id);
        }
        id
    }

    /// The slot backing outgoing stack argument `arg_slot_index`, created on
    /// first use and shared between call sites.
    pub fn call_arg_slot(&mut self, arg_slot_index: u32) -> StackSlotId {
        if (self.call_arg_slot_indices.len() as u32) <= arg_slot_index {
            let mut slot = StackSlot::new(StackSlotKind::CallArg, 8, 1);
            slot.call_arg_index = arg_slot_index;
            self.new_stack_slot(slot)
        } else {
            self.call_arg_slot_indices[arg_slot_index as usize]
        }
    }

    pub fn slot(&self, id: StackSlotId) -> &StackSlot {
        &self.slots[id as usize]
    }

    pub fn slot_mut(&mut self, id: StackSlotId) -> &mut StackSlot {
        &mut self.slots[id as usize]
    }

    pub fn slots(&self) -> &[StackSlot] {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut [StackSlot] {
        &mut self.slots
    }

    pub fn size(&self) -> i32 {
        self.size
    }

    pub fn total_size(&self) -> i32 {
        self.total_size
    }

    pub fn set_size(&mut self, size: i32) {
        self.size = size;
    }

    pub fn set_total_size(&mut self, total_size: i32) {
        self.total_size = total_size;
    }
}

/// The implicit region holds the return address and saved callee-saved
/// registers; its size is target-dependent.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImplicitStackRegion {
    pub size: i32,
    pub saved_reg_size: i32,
}

/// Spill area for incoming-argument storage. Offsets are relative to SP
/// before the frame allocation and get shifted afterwards.
#[derive(Debug, Clone, Default)]
pub struct ArgStoreStackRegion {
    pub size: i32,
    pub offsets: BTreeMap<StackSlotId, i32>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GenericStackRegion {
    pub size: i32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CallArgStackRegion {
    pub size: i32,
}

/// The four sub-regions composed into the final frame layout.
#[derive(Debug, Clone, Default)]
pub struct StackRegions {
    pub implicit_region: ImplicitStackRegion,
    pub arg_store_region: ArgStoreStackRegion,
    pub generic_region: GenericStackRegion,
    pub call_arg_region: CallArgStackRegion,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_arg_slots_are_shared_between_call_sites() {
        let mut frame = StackFrame::new();

        let first = frame.call_arg_slot(0);
        let second = frame.call_arg_slot(1);
        // A later call site with fewer stack arguments reuses slot 0.
        let reused = frame.call_arg_slot(0);

        assert_eq!(first, reused);
        assert_ne!(first, second);
        assert_eq!(frame.call_arg_slot_indices, vec![first, second]);
        assert_eq!(frame.slot(second).call_arg_index, 1);
    }

    #[test]
    fn test_slot_offsets_start_undefined() {
        let mut frame = StackFrame::new();
        let slot = frame.new_stack_slot(StackSlot::new(StackSlotKind::Generic, 8, 1));

        assert!(!frame.slot(slot).is_defined());
        frame.slot_mut(slot).set_offset(24);
        assert_eq!(frame.slot(slot).offset(), 24);
    }
}
