//! End-to-end AArch64 codegen tests: SSA module in, GAS text out.

use opal_driver::{compile_module, CompileOptions};
use opal_ssa::{
    BasicBlock, CallingConv, Function, FunctionDecl, Instruction, Module, Opcode, Type, Value,
};
use opal_target::{Architecture, CodeModel, Environment, OperatingSystem, TargetDescription};

fn linux_target() -> TargetDescription {
    TargetDescription::new(
        Architecture::AArch64,
        OperatingSystem::Linux,
        Environment::Gnu,
    )
}

fn macos_target() -> TargetDescription {
    TargetDescription::new(
        Architecture::AArch64,
        OperatingSystem::MacOs,
        Environment::None,
    )
}

fn compile(module: &Module, descr: TargetDescription) -> String {
    compile_module(module, descr, CodeModel::Small, &CompileOptions::default())
        .expect("compilation should succeed")
}

#[test]
fn test_branch_with_block_args_moves_then_falls_through() {
    let mut module = Module::new();

    let mut func = Function::new("forward", CallingConv::AArch64Aapcs, vec![], Type::I32);
    func.next_virtual_reg = 10;

    let entry = func.append_block(BasicBlock::new(""));
    let next = func.append_block(BasicBlock::with_params("next", vec![(0, Type::I32)]));

    func.append_instr(
        entry,
        Instruction::new(
            Opcode::Jmp,
            vec![Value::from_branch_target(
                next,
                vec![Value::from_int_immediate(42, Type::I32)],
            )],
        ),
    );
    func.append_instr(
        next,
        Instruction::new(Opcode::Ret, vec![Value::from_register(0, Type::I32)]),
    );
    module.functions.push(func);

    let asm = compile(&module, linux_target());

    // The argument lands in the parameter register; the jump to the next
    // block in layout is elided.
    assert!(asm.contains("movz w0, #42"), "asm was:\n{}", asm);
    assert!(!asm.contains("  b next"), "asm was:\n{}", asm);
    assert!(asm.contains("next:"), "asm was:\n{}", asm);
    assert!(asm.contains("  ret"), "asm was:\n{}", asm);
    assert!(!asm.contains('%'), "asm was:\n{}", asm);
}

#[test]
fn test_sqrt_lowers_to_libm_call() {
    let mut module = Module::new();
    module.external_functions.push(FunctionDecl {
        name: "sqrt".to_string(),
        calling_conv: CallingConv::AArch64Aapcs,
        params: vec![Type::F64],
        return_type: Type::F64,
    });

    let mut func = Function::new("root", CallingConv::AArch64Aapcs, vec![Type::F64], Type::F64);
    func.next_virtual_reg = 10;

    let entry = func.append_block(BasicBlock::new(""));
    func.append_instr(
        entry,
        Instruction::with_dest(
            Opcode::LoadArg,
            0,
            vec![
                Value::from_type(Type::F64),
                Value::from_int_immediate(0, Type::I32),
            ],
        ),
    );
    func.append_instr(
        entry,
        Instruction::with_dest(Opcode::Sqrt, 1, vec![Value::from_register(0, Type::F64)]),
    );
    func.append_instr(
        entry,
        Instruction::new(Opcode::Ret, vec![Value::from_register(1, Type::F64)]),
    );
    module.functions.push(func);

    let asm = compile(&module, linux_target());

    // No scalar sqrt selection here; the lowerer routes through libm.
    assert!(asm.contains(".extern sqrt"), "asm was:\n{}", asm);
    assert!(asm.contains("bl sqrt"), "asm was:\n{}", asm);
}

#[test]
fn test_remainder_uses_divide_multiply_subtract() {
    let mut module = Module::new();

    let mut func = Function::new(
        "rem",
        CallingConv::AArch64Aapcs,
        vec![Type::I32, Type::I32],
        Type::I32,
    );
    func.next_virtual_reg = 10;

    let entry = func.append_block(BasicBlock::new(""));
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
        Instruction::with_dest(
            Opcode::LoadArg,
            1,
            vec![
                Value::from_type(Type::I32),
                Value::from_int_immediate(1, Type::I32),
            ],
        ),
    );
    func.append_instr(
        entry,
        Instruction::with_dest(
            Opcode::SRem,
            2,
            vec![
                Value::from_register(0, Type::I32),
                Value::from_register(1, Type::I32),
            ],
        ),
    );
    func.append_instr(
        entry,
        Instruction::new(Opcode::Ret, vec![Value::from_register(2, Type::I32)]),
    );
    module.functions.push(func);

    let asm = compile(&module, linux_target());

    assert!(asm.contains("sdiv"), "asm was:\n{}", asm);
    assert!(asm.contains("mul"), "asm was:\n{}", asm);
    assert!(asm.contains("sub"), "asm was:\n{}", asm);
}

#[test]
fn test_global_address_uses_page_idiom() {
    let mut module = Module::new();
    module.globals.push(opal_ssa::Global {
        name: "counter".to_string(),
        ty: Type::I64,
        initial_value: opal_ssa::GlobalValue::Int(0i64.into()),
        external: false,
    });

    let mut func = Function::new("read_counter", CallingConv::AArch64Aapcs, vec![], Type::I64);
    func.next_virtual_reg = 10;

    let entry = func.append_block(BasicBlock::new(""));
    func.append_instr(
        entry,
        Instruction::with_dest(
            Opcode::Load,
            0,
            vec![
                Value::from_type(Type::I64),
                Value::from_symbol("counter", opal_ssa::SymbolKind::Global, Type::Addr),
            ],
        ),
    );
    func.append_instr(
        entry,
        Instruction::new(Opcode::Ret, vec![Value::from_register(0, Type::I64)]),
    );
    module.functions.push(func);

    let elf_asm = compile(&module, linux_target());
    assert!(elf_asm.contains("adrp"), "asm was:\n{}", elf_asm);
    assert!(elf_asm.contains(":lo12:counter"), "asm was:\n{}", elf_asm);
    assert!(elf_asm.contains("counter: .xword 0"), "asm was:\n{}", elf_asm);

    let darwin_asm = compile(&module, macos_target());
    assert!(darwin_asm.contains("_counter@PAGE"), "asm was:\n{}", darwin_asm);
    assert!(
        darwin_asm.contains("_counter@PAGEOFF"),
        "asm was:\n{}",
        darwin_asm
    );
}
