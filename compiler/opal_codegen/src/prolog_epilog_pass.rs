//! Prolog/epilog insertion.

use opal_common::timing::ScopeTimer;
use opal_mcode as mcode;

use crate::machine_pass::MachinePass;

pub struct PrologEpilogPass;

impl PrologEpilogPass {
    pub fn new() -> Self {
        Self
    }

    pub fn run_func(&mut self, func: &mut mcode::Function) {
        insert_prolog(func);
        insert_epilog(func);
    }
}

impl Default for PrologEpilogPass {
    fn default() -> Self {
        Self::new()
    }
}

impl MachinePass for PrologEpilogPass {
    fn run(&mut self, module: &mut mcode::Module) {
        let _timer = ScopeTimer::new("prolog/epilog insertion");

        for func in &mut module.functions {
            self.run_func(func);
        }
    }
}

fn insert_prolog(func: &mut mcode::Function) {
    let prolog = func.calling_conv.prolog(func);
    let entry = func.entry();
    let block = func.block_mut(entry);

    match block.instrs.first() {
        Some(first) => {
            for instr in prolog {
                block.instrs.insert_before(first, instr);
            }
        }
        None => {
            for instr in prolog {
                block.instrs.push_back(instr);
            }
        }
    }
}

fn insert_epilog(func: &mut mcode::Function) {
    let conv = func.calling_conv;

    for block_id in func.blocks.ids() {
        for instr_id in func.block(block_id).instrs.ids() {
            // Only insert epilogs before exit instructions.
            let opcode = func.block(block_id).get(instr_id).opcode;
            if !conv.is_func_exit(opcode) {
                continue;
            }

            let epilog = conv.epilog(func);
            let block = func.block_mut(block_id);
            for instr in epilog {
                block.instrs.insert_before(instr_id, instr);
            }
        }
    }
}
