//! Pipeline invariants: what must hold for every module after the passes.

use pretty_assertions::assert_eq;

use opal_driver::pipeline::build_machine_module;
use opal_driver::{compile_module, CompileOptions};
use opal_mcode::{OperandKind, Register};
use opal_ssa::{
    BasicBlock, CallingConv, Comparison, Function, Instruction, Module, Opcode, Type, Value,
};
use opal_target::{Architecture, CodeModel, Environment, OperatingSystem, TargetDescription};

fn linux_target() -> TargetDescription {
    TargetDescription::new(
        Architecture::X86_64,
        OperatingSystem::Linux,
        Environment::Gnu,
    )
}

/// A two-block function with a conditional branch, enough to exercise
/// cross-block liveness.
fn branching_module() -> Module {
    let mut module = Module::new();

    let mut func = Function::new("pick", CallingConv::X86_64SysV, vec![Type::I32], Type::I32);
    func.next_virtual_reg = 20;

    let entry = func.append_block(BasicBlock::new(""));
    let low = func.append_block(BasicBlock::new("low"));
    let high = func.append_block(BasicBlock::new("high"));

    func.append_instr(
        entry,
        Instruction::with_dest(
            Opcode::LoadArg,
            0,
            vec![
                Value::from_type(Type::I32),
                Value::from_int_immediate(0, Type::I32),
            ],
        ),
    );
    func.append_instr(
        entry,
        Instruction::new(
            Opcode::CJmp,
            vec![
                Value::from_register(0, Type::I32),
                Value::from_comparison(Comparison::Slt),
                Value::from_int_immediate(10, Type::I32),
                Value::from_branch_target(low, vec![]),
                Value::from_branch_target(high, vec![]),
            ],
        ),
    );
    func.append_instr(
        low,
        Instruction::new(Opcode::Ret, vec![Value::from_int_immediate(0, Type::I32)]),
    );
    func.append_instr(
        high,
        Instruction::new(Opcode::Ret, vec![Value::from_int_immediate(1, Type::I32)]),
    );
    module.functions.push(func);

    module
}

fn assert_operand_not_virtual(operand: &opal_mcode::Operand) {
    match &operand.kind {
        OperandKind::Register(reg) => {
            assert!(!reg.is_virtual(), "virtual register survived allocation");
        }
        OperandKind::Addr(addr) => {
            assert!(!addr.base.is_virtual(), "virtual base survived allocation");
            if let Some(offset) = addr.reg_offset() {
                assert!(!offset.is_virtual(), "virtual offset survived allocation");
            }
        }
        OperandKind::AArch64Addr(addr) => {
            assert!(!addr.base().is_virtual(), "virtual base survived allocation");
        }
        _ => {}
    }
}

#[test]
fn test_no_virtual_registers_after_allocation() {
    let module = branching_module();
    let machine_module = build_machine_module(
        &module,
        linux_target(),
        CodeModel::Small,
        &CompileOptions::default(),
    )
    .unwrap();

    for func in &machine_module.functions {
        for (_, block) in &func.blocks {
            for instr in block.instrs.values() {
                for operand in &instr.operands {
                    assert_operand_not_virtual(operand);
                }
            }
        }
    }
}

#[test]
fn test_every_stack_slot_has_an_offset() {
    let module = branching_module();
    let machine_module = build_machine_module(
        &module,
        linux_target(),
        CodeModel::Small,
        &CompileOptions::default(),
    )
    .unwrap();

    for func in &machine_module.functions {
        for slot in func.stack_frame.slots() {
            assert!(slot.is_defined(), "stack slot without an offset");
        }
        assert!(func.stack_frame.total_size() >= func.stack_frame.size());
    }
}

#[test]
fn test_epilog_precedes_every_exit() {
    use opal_target::x86_64::opcode;
    use opal_target::x86_64::register::RBP;

    let module = branching_module();
    let machine_module = build_machine_module(
        &module,
        linux_target(),
        CodeModel::Small,
        &CompileOptions::default(),
    )
    .unwrap();

    let mut exits = 0;
    for func in &machine_module.functions {
        for (_, block) in &func.blocks {
            let ids = block.instrs.ids();
            for (position, &id) in ids.iter().enumerate() {
                if block.instrs.get(id).opcode != opcode::RET {
                    continue;
                }
                exits += 1;

                // The SysV epilog ends by popping the frame pointer.
                assert!(position > 0, "exit without an epilog before it");
                let prev = block.instrs.get(ids[position - 1]);
                assert_eq!(prev.opcode, opcode::POP);
                assert_eq!(prev.operand(0).register(), Register::Physical(RBP));
            }
        }
    }

    assert_eq!(exits, 2, "both return paths should survive");
}

#[test]
fn test_pass_dumps_are_written() {
    let dir = tempfile::tempdir().unwrap();
    let module = branching_module();

    let options = CompileOptions {
        dump_dir: Some(dir.path().to_path_buf()),
    };
    compile_module(&module, linux_target(), CodeModel::Small, &options).unwrap();

    assert!(dir.path().join("lir_input.opalasm").exists());
    // Register allocation, stack frame, prolog/epilog, peephole.
    for index in 0..4 {
        let path = dir.path().join(format!("lir_pass{}.opalasm", index));
        assert!(path.exists(), "missing dump {}", path.display());
    }

    let input_dump = std::fs::read_to_string(dir.path().join("lir_input.opalasm")).unwrap();
    assert!(input_dump.contains("func pick:"));
}

#[test]
fn test_compilation_is_deterministic() {
    let _ = env_logger::builder().is_test(true).try_init();
    let module = branching_module();

    let first = compile_module(
        &module,
        linux_target(),
        CodeModel::Small,
        &CompileOptions::default(),
    )
    .unwrap();
    let second = compile_module(
        &module,
        linux_target(),
        CodeModel::Small,
        &CompileOptions::default(),
    )
    .unwrap();

    assert_eq!(first, second);
}
