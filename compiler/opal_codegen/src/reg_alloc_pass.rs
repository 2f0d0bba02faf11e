//! Register allocation.
//!
//! Priority-queue-driven assignment over live-range groups: ranges already
//! pinned to physical registers are reserved first, then virtual groups are
//! allocated longest-range-first against the reserved ranges, spilling to
//! stack slots when no candidate fits.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use hashbrown::HashMap;

use opal_common::timing::ScopeTimer;
use opal_mcode as mcode;
use opal_mcode::{OperandKind, PhysicalReg, Register, StackSlotId, VirtualReg};

use crate::liveness::LivenessAnalysis;
use crate::machine_pass::MachinePass;
use crate::reg_alloc_func::{LiveRangeGroup, RaBlock, RaFunc, RaInstr};
use crate::reg_analyzer::{SpilledRegUse, TargetRegAnalyzer};

pub struct RegAllocPass<'a> {
    analyzer: &'a dyn TargetRegAnalyzer,
}

#[derive(Clone, Copy)]
enum AllocKind {
    Physical(PhysicalReg),
    Spill(StackSlotId),
}

struct Alloc {
    kind: AllocKind,
    group: LiveRangeGroup,
}

/// Max-heap entry; ties on weight go to the lowest virtual register so the
/// allocation order is deterministic.
struct QueueEntry {
    weight: u32,
    vreg: VirtualReg,
    group: LiveRangeGroup,
}

impl QueueEntry {
    fn new(group: LiveRangeGroup) -> Self {
        // Longer ranges are allocated first as they tend to be more
        // constrained.
        let weight = group
            .ranges
            .iter()
            .map(|range| range.end - range.start)
            .max()
            .unwrap_or(0);

        Self {
            weight,
            vreg: group.reg.virtual_reg(),
            group,
        }
    }
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.weight == other.weight && self.vreg == other.vreg
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.weight
            .cmp(&other.weight)
            .then(other.vreg.cmp(&self.vreg))
    }
}

impl<'a> RegAllocPass<'a> {
    pub fn new(analyzer: &'a dyn TargetRegAnalyzer) -> Self {
        Self { analyzer }
    }

    pub fn run_func(&mut self, func: &mut mcode::Function) {
        let mut ra_func = self.create_reg_alloc_func(func);
        let liveness = LivenessAnalysis::compute(&ra_func);
        log::trace!("liveness for {}:\n{}", func.name, liveness.dump());

        // Ranges that already name a physical register (division, calls,
        // argument moves) are fixed; reserve them before anything else.
        for (reg, group) in &liveness.range_groups {
            if reg.is_physical() {
                reserve_ranges(&mut ra_func, group, reg.physical_reg());
            }
        }

        // A kill occupies only the clobbering instruction's def point, so
        // argument registers read by the same instruction stay assignable.
        for kill_point in &liveness.kill_points {
            let range = crate::reg_alloc_func::LiveRange {
                block: kill_point.block,
                start: kill_point.instr,
                start_stage: 1,
                end: kill_point.instr,
                end_stage: 1,
            };
            ra_func.blocks[kill_point.block]
                .allocated_ranges
                .push(range.to_ra_range(kill_point.reg));
        }

        let mut queue = BinaryHeap::new();
        for (reg, group) in &liveness.range_groups {
            if reg.is_virtual() {
                queue.push(QueueEntry::new(group.clone()));
            }
        }

        let mut allocs: Vec<Alloc> = Vec::new();
        while let Some(entry) = queue.pop() {
            let alloc = self.alloc_group(func, &ra_func, entry.group);

            if let AllocKind::Physical(reg) = alloc.kind {
                reserve_ranges(&mut ra_func, &alloc.group, reg);
            }
            allocs.push(alloc);
        }

        for alloc in &allocs {
            self.apply_alloc(func, &mut ra_func, alloc);
        }

        for block_id in func.blocks.ids() {
            self.remove_useless_instrs(func, block_id);
        }
    }

    fn create_reg_alloc_func(&self, func: &mcode::Function) -> RaFunc {
        let mut block_indices = HashMap::new();
        for (index, id) in func.blocks.ids().into_iter().enumerate() {
            block_indices.insert(id, index);
        }

        let mut blocks = Vec::new();
        for (block_id, block) in &func.blocks {
            let preds = block
                .predecessors
                .iter()
                .filter_map(|pred| block_indices.get(pred).copied())
                .collect();
            let succs = block
                .successors
                .iter()
                .filter_map(|succ| block_indices.get(succ).copied())
                .collect();

            blocks.push(RaBlock {
                block: block_id,
                instrs: self.collect_instrs(func, block_id),
                preds,
                succs,
                allocated_ranges: Vec::new(),
            });
        }

        RaFunc { blocks }
    }

    fn collect_instrs(&self, func: &mcode::Function, block_id: mcode::BlockId) -> Vec<RaInstr> {
        let mut instrs = Vec::new();

        for (index, instr_id) in func.block(block_id).instrs.ids().into_iter().enumerate() {
            let mut regs = self.analyzer.collect_operands(func, block_id, instr_id);
            regs.extend_from_slice(&func.block(block_id).get(instr_id).reg_ops);

            instrs.push(RaInstr {
                index: index as u32,
                id: instr_id,
                regs,
                spill_tmp_regs: 0,
            });
        }

        instrs
    }

    fn alloc_group(
        &self,
        func: &mut mcode::Function,
        ra_func: &RaFunc,
        group: LiveRangeGroup,
    ) -> Alloc {
        for candidate in self.analyzer.suggest_regs(func, ra_func, &group) {
            if is_alloc_possible(ra_func, &group, candidate) {
                return Alloc {
                    kind: AllocKind::Physical(candidate),
                    group,
                };
            }
        }

        let first_range = group.ranges[0];
        let first_instr_id = ra_func.blocks[first_range.block].instrs[first_range.start as usize].id;
        let first_instr = func.block(ra_func.blocks[first_range.block].block).get(first_instr_id);

        for &candidate in self.analyzer.candidates(first_instr) {
            if is_alloc_possible(ra_func, &group, candidate) {
                return Alloc {
                    kind: AllocKind::Physical(candidate),
                    group,
                };
            }
        }

        let slot = func.stack_frame.new_stack_slot(mcode::StackSlot::new(
            mcode::StackSlotKind::Generic,
            8,
            1,
        ));
        Alloc {
            kind: AllocKind::Spill(slot),
            group,
        }
    }

    fn apply_alloc(&self, func: &mut mcode::Function, ra_func: &mut RaFunc, alloc: &Alloc) {
        let vreg = alloc.group.reg.virtual_reg();

        for range in &alloc.group.ranges {
            let block_index = range.block;
            let block_id = ra_func.blocks[block_index].block;

            for index in range.start..=range.end {
                match alloc.kind {
                    AllocKind::Physical(reg) => {
                        let instr_id = ra_func.blocks[block_index].instrs[index as usize].id;
                        let instr = func.block_mut(block_id).get_mut(instr_id);
                        for operand in &mut instr.operands {
                            try_replace(operand, vreg, reg);
                        }
                    }
                    AllocKind::Spill(slot) => {
                        let ra_instr = &mut ra_func.blocks[block_index].instrs[index as usize];
                        self.insert_spilled_load_store(func, block_id, ra_instr, vreg, slot);
                    }
                }
            }
        }
    }

    fn insert_spilled_load_store(
        &self,
        func: &mut mcode::Function,
        block_id: mcode::BlockId,
        ra_instr: &mut RaInstr,
        vreg: VirtualReg,
        slot: StackSlotId,
    ) {
        let reg_ops = ra_instr.regs.clone();

        for operand in reg_ops {
            if !operand.reg.is_virtual_reg(vreg) {
                continue;
            }

            let tmp_reg = self.analyzer.insert_spill_reload(
                func,
                block_id,
                SpilledRegUse {
                    instr: ra_instr.id,
                    stack_slot: slot,
                    spill_tmp_regs: ra_instr.spill_tmp_regs,
                    usage: operand.usage,
                },
            );

            let instr = func.block_mut(block_id).get_mut(ra_instr.id);
            for operand in &mut instr.operands {
                try_replace(operand, vreg, tmp_reg);
            }

            ra_instr.spill_tmp_regs += 1;
        }
    }

    fn remove_useless_instrs(&self, func: &mut mcode::Function, block_id: mcode::BlockId) {
        let block = func.block_mut(block_id);

        for id in block.instrs.ids() {
            if self.analyzer.is_instr_removable(block.instrs.get(id)) {
                block.instrs.remove(id);
            }
        }
    }
}

impl MachinePass for RegAllocPass<'_> {
    fn run(&mut self, module: &mut mcode::Module) {
        let _timer = ScopeTimer::new("register allocation");

        // Two ideas for later: feed currently-assigned registers back into
        // the analyzer's suggestions, and allow two intersecting ranges to
        // share a register when it is only read during the intersection.
        for func in &mut module.functions {
            self.run_func(func);
        }
    }
}

fn reserve_ranges(ra_func: &mut RaFunc, group: &LiveRangeGroup, reg: PhysicalReg) {
    for range in &group.ranges {
        ra_func.blocks[range.block]
            .allocated_ranges
            .push(range.to_ra_range(reg));
    }
}

fn is_alloc_possible(ra_func: &RaFunc, group: &LiveRangeGroup, reg: PhysicalReg) -> bool {
    for range in &group.ranges {
        let ra_range = range.to_ra_range(reg);

        for allocated in &ra_func.blocks[range.block].allocated_ranges {
            if allocated.intersects(&ra_range) {
                return false;
            }
        }
    }

    true
}

/// Rewrites a virtual register to its assigned physical register inside an
/// operand, including address bases and offsets.
fn try_replace(operand: &mut mcode::Operand, vreg: VirtualReg, reg: PhysicalReg) {
    let old = Register::Virtual(vreg);
    let new = Register::Physical(reg);

    match &mut operand.kind {
        OperandKind::Register(r) if *r == old => *r = new,
        OperandKind::Addr(addr) => {
            if addr.base == old {
                addr.base = new;
            }
            if let mcode::AddrOffset::Reg(r) = &mut addr.offset {
                if *r == old {
                    *r = new;
                }
            }
        }
        OperandKind::AArch64Addr(addr) => {
            if addr.base() == old {
                addr.set_base(new);
            }
            if let mcode::AArch64Address::BaseOffsetReg { offset, .. } = addr {
                if *offset == old {
                    *offset = new;
                }
            }
        }
        _ => {}
    }
}
