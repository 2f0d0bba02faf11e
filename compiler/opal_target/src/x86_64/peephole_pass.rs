//! Post-allocation peepholes for x86-64.

use opal_codegen::MachinePass;
use opal_common::timing::ScopeTimer;
use opal_mcode as mcode;

use crate::x86_64::opcode;

/// Rewrites register-to-register `movss` into `movaps`, which avoids a
/// partial-register dependency on the destination.
pub struct X64PeepholePass;

impl X64PeepholePass {
    pub fn new() -> Self {
        Self
    }

    fn run_func(&self, func: &mut mcode::Function) {
        for block_id in func.blocks.ids() {
            for instr_id in func.block(block_id).instrs.ids() {
                let instr = func.block_mut(block_id).get_mut(instr_id);

                if instr.opcode == opcode::MOVSS
                    && is_reg(instr.operand(0))
                    && is_reg(instr.operand(1))
                {
                    instr.opcode = opcode::MOVAPS;
                }
            }
        }
    }
}

impl Default for X64PeepholePass {
    fn default() -> Self {
        Self::new()
    }
}

impl MachinePass for X64PeepholePass {
    fn run(&mut self, module: &mut mcode::Module) {
        let _timer = ScopeTimer::new("x86-64 peephole opt");

        for func in &mut module.functions {
            self.run_func(func);
        }
    }
}

fn is_reg(operand: &mcode::Operand) -> bool {
    operand.is_virtual_reg() || operand.is_physical_reg()
}
