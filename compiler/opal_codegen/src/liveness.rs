//! Liveness analysis over the register-allocation view of a function.

use std::collections::BTreeMap;
use std::fmt::Write;

use hashbrown::HashSet;

use opal_mcode::{PhysicalReg, RegUsage, Register};

use crate::reg_alloc_func::{LiveRange, LiveRangeGroup, RaBlock, RaFunc};

/// Per-block data-flow sets.
#[derive(Debug, Clone, Default)]
pub struct BlockLiveness {
    pub defs: HashSet<Register>,
    pub uses: HashSet<Register>,
    pub ins: HashSet<Register>,
    pub outs: HashSet<Register>,
}

/// A point where a physical register is clobbered without carrying a value
/// (caller-saved registers at a call site).
#[derive(Debug, Clone, Copy)]
pub struct KillPoint {
    pub reg: PhysicalReg,
    pub block: usize,
    pub instr: u32,
}

/// Live-in/live-out sets plus precise per-register live ranges.
pub struct LivenessAnalysis {
    pub block_liveness: Vec<BlockLiveness>,
    /// Ordered so allocation visits groups deterministically.
    pub range_groups: BTreeMap<Register, LiveRangeGroup>,
    pub kill_points: Vec<KillPoint>,
}

impl LivenessAnalysis {
    pub fn compute(func: &RaFunc) -> Self {
        let mut analysis = Self {
            block_liveness: vec![BlockLiveness::default(); func.blocks.len()],
            range_groups: BTreeMap::new(),
            kill_points: Vec::new(),
        };

        for (i, block) in func.blocks.iter().enumerate() {
            collect_uses_and_defs(block, &mut analysis.block_liveness[i]);
        }

        compute_ins_and_outs(func, &mut analysis);
        compute_precise_live_ranges(func, &mut analysis);

        for (reg, group) in &mut analysis.range_groups {
            group.reg = *reg;
        }

        analysis
    }

    /// Compact textual dump for allocator debugging.
    pub fn dump(&self) -> String {
        let mut out = String::new();

        for (reg, group) in &self.range_groups {
            match reg {
                Register::Virtual(reg) => write!(out, "%{}:", reg).unwrap(),
                Register::Physical(reg) => write!(out, "${}:", reg).unwrap(),
                Register::StackSlot(slot) => write!(out, "s{}:", slot).unwrap(),
            }

            for range in &group.ranges {
                write!(out, " b{}[{}..{}]", range.block, range.start, range.end).unwrap();
            }
            out.push('\n');
        }

        for kill in &self.kill_points {
            writeln!(out, "kill ${} at b{}[{}]", kill.reg, kill.block, kill.instr).unwrap();
        }

        out
    }
}

fn collect_uses_and_defs(block: &RaBlock, liveness: &mut BlockLiveness) {
    for instr in &block.instrs {
        for operand in &instr.regs {
            match operand.usage {
                RegUsage::Def => {
                    liveness.defs.insert(operand.reg);
                }
                RegUsage::Use => {
                    if !liveness.defs.contains(&operand.reg) {
                        liveness.uses.insert(operand.reg);
                    }
                }
                _ => {}
            }
        }
    }
}

fn compute_ins_and_outs(func: &RaFunc, analysis: &mut LivenessAnalysis) {
    let mut post_order = Vec::with_capacity(func.blocks.len());
    let mut visited = HashSet::new();
    collect_blocks_post_order(func, 0, &mut post_order, &mut visited);

    let mut changes = true;
    while changes {
        changes = false;

        for &block_index in post_order.iter().rev() {
            let block = &func.blocks[block_index];

            let prev_num_ins = analysis.block_liveness[block_index].ins.len();
            let prev_num_outs = analysis.block_liveness[block_index].outs.len();

            // Everything live into a successor is live out of this block.
            for &succ in &block.succs {
                let succ_ins: Vec<Register> =
                    analysis.block_liveness[succ].ins.iter().copied().collect();
                analysis.block_liveness[block_index].outs.extend(succ_ins);
            }

            let liveness = &mut analysis.block_liveness[block_index];

            for use_reg in liveness.uses.clone() {
                if use_reg.is_virtual() {
                    liveness.ins.insert(use_reg);
                }
            }

            for out_reg in liveness.outs.clone() {
                if !liveness.defs.contains(&out_reg) {
                    liveness.ins.insert(out_reg);
                }
            }

            changes = changes
                || liveness.ins.len() != prev_num_ins
                || liveness.outs.len() != prev_num_outs;
        }
    }
}

fn collect_blocks_post_order(
    func: &RaFunc,
    block_index: usize,
    order: &mut Vec<usize>,
    visited: &mut HashSet<usize>,
) {
    visited.insert(block_index);

    for &succ in &func.blocks[block_index].succs {
        if !visited.contains(&succ) {
            collect_blocks_post_order(func, succ, order, visited);
        }
    }

    order.push(block_index);
}

fn compute_precise_live_ranges(func: &RaFunc, analysis: &mut LivenessAnalysis) {
    for (block_index, block) in func.blocks.iter().enumerate() {
        if block.instrs.is_empty() {
            continue;
        }

        let last_index = (block.instrs.len() - 1) as u32;
        let mut live_regs: HashSet<Register> = HashSet::new();

        // Live-out registers start covered for the whole block; a def found
        // on the backward walk trims the range's start.
        let outs: Vec<Register> = analysis.block_liveness[block_index]
            .outs
            .iter()
            .copied()
            .collect();
        for out_reg in outs {
            push_range(
                analysis,
                out_reg,
                LiveRange {
                    block: block_index,
                    start: 0,
                    start_stage: 0,
                    end: last_index,
                    end_stage: 1,
                },
            );
            live_regs.insert(out_reg);
        }

        for instr in block.instrs.iter().rev() {
            let index = instr.index;

            for operand in &instr.regs {
                match operand.usage {
                    RegUsage::Use => {
                        if !live_regs.contains(&operand.reg) {
                            push_range(
                                analysis,
                                operand.reg,
                                LiveRange {
                                    block: block_index,
                                    start: index,
                                    start_stage: 0,
                                    end: index,
                                    end_stage: 0,
                                },
                            );
                            live_regs.insert(operand.reg);
                        }
                    }
                    RegUsage::Def => {
                        if live_regs.contains(&operand.reg) {
                            let range = last_range_mut(analysis, operand.reg);
                            range.start = index;
                            range.start_stage = 1;
                            live_regs.remove(&operand.reg);
                        } else {
                            // A def nobody reads still occupies the register
                            // at its def point.
                            push_range(
                                analysis,
                                operand.reg,
                                LiveRange {
                                    block: block_index,
                                    start: index,
                                    start_stage: 1,
                                    end: index,
                                    end_stage: 1,
                                },
                            );
                        }
                    }
                    RegUsage::UseDef => {
                        if !live_regs.contains(&operand.reg) {
                            push_range(
                                analysis,
                                operand.reg,
                                LiveRange {
                                    block: block_index,
                                    start: index,
                                    start_stage: 0,
                                    end: index,
                                    end_stage: 1,
                                },
                            );
                            live_regs.insert(operand.reg);
                        }
                    }
                    RegUsage::Kill => {
                        analysis.kill_points.push(KillPoint {
                            reg: operand.reg.physical_reg(),
                            block: block_index,
                            instr: index,
                        });
                        live_regs.remove(&operand.reg);
                    }
                }
            }
        }

        // Live-in registers reach back to the block entry.
        let ins: Vec<Register> = analysis.block_liveness[block_index]
            .ins
            .iter()
            .copied()
            .collect();
        for in_reg in ins {
            if analysis.range_groups.contains_key(&in_reg) {
                let range = last_range_mut(analysis, in_reg);
                range.start = 0;
                range.start_stage = 0;
            }
        }
    }
}

fn push_range(analysis: &mut LivenessAnalysis, reg: Register, range: LiveRange) {
    analysis
        .range_groups
        .entry(reg)
        .or_insert_with(|| LiveRangeGroup {
            reg,
            ranges: Vec::new(),
        })
        .ranges
        .push(range);
}

fn last_range_mut(analysis: &mut LivenessAnalysis, reg: Register) -> &mut LiveRange {
    analysis
        .range_groups
        .get_mut(&reg)
        .and_then(|group| group.ranges.last_mut())
        .expect("register has no live range yet")
}
