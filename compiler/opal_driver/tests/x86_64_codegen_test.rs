//! End-to-end x86-64 codegen tests: SSA module in, NASM text out.

use opal_driver::{compile_module, CompileOptions};
use opal_ssa::{
    BasicBlock, CallingConv, Comparison, Function, FunctionDecl, Instruction, Module, Opcode,
    Structure, Type, Value,
};
use opal_target::{Architecture, CodeModel, Environment, OperatingSystem, TargetDescription};

fn linux_target() -> TargetDescription {
    TargetDescription::new(
        Architecture::X86_64,
        OperatingSystem::Linux,
        Environment::Gnu,
    )
}

fn windows_target() -> TargetDescription {
    TargetDescription::new(
        Architecture::X86_64,
        OperatingSystem::Windows,
        Environment::Msvc,
    )
}

fn compile(module: &Module, descr: TargetDescription) -> String {
    compile_module(module, descr, CodeModel::Small, &CompileOptions::default())
        .expect("compilation should succeed")
}

#[test]
fn test_identity_add_returns_in_eax() {
    let mut module = Module::new();

    let mut func = Function::new(
        "add",
        CallingConv::X86_64SysV,
        vec![Type::I32, Type::I32],
        Type::I32,
    );
    func.global = true;
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
            Opcode::Add,
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

    assert!(asm.contains("global add"), "asm was:\n{}", asm);
    // Arguments arrive in edi/esi; the move biasing keeps them there and
    // the result lands in eax.
    assert!(asm.contains("mov eax, edi"), "asm was:\n{}", asm);
    assert!(asm.contains("add eax, esi"), "asm was:\n{}", asm);
    assert!(asm.contains("ret"), "asm was:\n{}", asm);
    // No virtual registers survive allocation.
    assert!(!asm.contains('%'), "asm was:\n{}", asm);
}

#[test]
fn test_struct_field_store_folds_addressing() {
    let mut module = Module::new();
    let pair = module.add_structure(Structure {
        name: "pair".to_string(),
        members: vec![Type::I32, Type::I64],
    });

    let mut func = Function::new("store_field", CallingConv::X86_64MsAbi, vec![], Type::Void);
    func.next_virtual_reg = 10;

    let entry = func.append_block(BasicBlock::new(""));
    func.append_instr(
        entry,
        Instruction::with_dest(Opcode::Alloca, 0, vec![Value::from_type(Type::Struct(pair))]),
    );
    func.append_instr(
        entry,
        Instruction::with_dest(
            Opcode::MemberPtr,
            1,
            vec![
                Value::from_type(Type::Struct(pair)),
                Value::from_register(0, Type::Addr),
                Value::from_int_immediate(1, Type::I32),
            ],
        ),
    );
    func.append_instr(
        entry,
        Instruction::new(
            Opcode::Store,
            vec![
                Value::from_int_immediate(7, Type::I64),
                Value::from_register(1, Type::Addr),
            ],
        ),
    );
    func.append_instr(entry, Instruction::new(Opcode::Ret, vec![]));
    module.functions.push(func);

    let asm = compile(&module, windows_target());

    // The member pointer folds into a single displaced store, with the
    // field offset merged onto the slot offset.
    assert!(
        asm.contains("mov qword [rsp + 0 + 8], 7"),
        "asm was:\n{}",
        asm
    );
    assert!(asm.contains("sub rsp, 16"), "asm was:\n{}", asm);
    assert!(!asm.contains('%'), "asm was:\n{}", asm);
}

#[test]
fn test_aggregate_return_goes_through_hidden_pointer() {
    let mut module = Module::new();
    let big = module.add_structure(Structure {
        name: "big".to_string(),
        members: vec![Type::I64, Type::I64, Type::I64],
    });

    // Callee: returns a 24-byte aggregate.
    let mut callee = Function::new("make", CallingConv::X86_64MsAbi, vec![], Type::Struct(big));
    callee.next_virtual_reg = 10;
    let entry = callee.append_block(BasicBlock::new(""));
    callee.append_instr(
        entry,
        Instruction::with_dest(Opcode::Alloca, 0, vec![Value::from_type(Type::Struct(big))]),
    );
    callee.append_instr(
        entry,
        Instruction::new(Opcode::Ret, vec![Value::from_register(0, Type::Addr)]),
    );
    module.functions.push(callee);

    // Caller: reads a field out of the returned aggregate.
    let mut caller = Function::new("use_make", CallingConv::X86_64MsAbi, vec![], Type::I64);
    caller.next_virtual_reg = 10;
    let entry = caller.append_block(BasicBlock::new(""));
    caller.append_instr(
        entry,
        Instruction::with_dest(
            Opcode::Call,
            1,
            vec![Value::from_func("make", Type::Struct(big))],
        ),
    );
    caller.append_instr(
        entry,
        Instruction::with_dest(
            Opcode::MemberPtr,
            2,
            vec![
                Value::from_type(Type::Struct(big)),
                Value::from_register(1, Type::Addr),
                Value::from_int_immediate(0, Type::I32),
            ],
        ),
    );
    caller.append_instr(
        entry,
        Instruction::with_dest(
            Opcode::Load,
            3,
            vec![
                Value::from_type(Type::I64),
                Value::from_register(2, Type::Addr),
            ],
        ),
    );
    caller.append_instr(
        entry,
        Instruction::new(Opcode::Ret, vec![Value::from_register(3, Type::I64)]),
    );
    module.functions.push(caller);

    let asm = compile(&module, windows_target());

    // The callee spills the hidden pointer from rcx and returns it in rax.
    assert!(asm.contains("], rcx"), "asm was:\n{}", asm);
    assert!(asm.contains("mov rax"), "asm was:\n{}", asm);
    // The caller passes a buffer address in rcx.
    assert!(asm.contains("lea rcx, [rsp"), "asm was:\n{}", asm);
    assert!(asm.contains("call make"), "asm was:\n{}", asm);
}

#[test]
fn test_f32_zero_store_uses_integer_immediate() {
    let mut module = Module::new();

    let mut func = Function::new("zero_out", CallingConv::X86_64SysV, vec![], Type::Void);
    func.next_virtual_reg = 10;

    let entry = func.append_block(BasicBlock::new(""));
    func.append_instr(
        entry,
        Instruction::with_dest(Opcode::Alloca, 0, vec![Value::from_type(Type::F32)]),
    );
    func.append_instr(
        entry,
        Instruction::new(
            Opcode::Store,
            vec![
                Value::from_fp_immediate(0.0, Type::F32),
                Value::from_register(0, Type::Addr),
            ],
        ),
    );
    func.append_instr(entry, Instruction::new(Opcode::Ret, vec![]));
    module.functions.push(func);

    let asm = compile(&module, linux_target());

    // The zero bit pattern is stored directly; no constant pool load.
    assert!(asm.contains("mov dword [rsp + 8], 0"), "asm was:\n{}", asm);
    assert!(!asm.contains("movss"), "asm was:\n{}", asm);
}

#[test]
fn test_unsigned_division_zero_extends_rdx() {
    let mut module = Module::new();

    let mut func = Function::new(
        "udiv32",
        CallingConv::X86_64SysV,
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
            Opcode::UDiv,
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

    assert!(asm.contains("xor edx, edx"), "asm was:\n{}", asm);
    assert!(!asm.contains("idiv"), "asm was:\n{}", asm);
    assert!(asm.contains("div"), "asm was:\n{}", asm);
    assert!(!asm.contains("cdq"), "asm was:\n{}", asm);
}

#[test]
fn test_loop_with_block_args_branches_backwards() {
    let mut module = Module::new();

    let mut func = Function::new("sum_to", CallingConv::X86_64SysV, vec![Type::I32], Type::I32);
    func.next_virtual_reg = 20;

    let entry = func.append_block(BasicBlock::new(""));
    let loop_block = func.append_block(BasicBlock::with_params(
        "loop",
        vec![(1, Type::I32), (2, Type::I32)],
    ));
    let exit = func.append_block(BasicBlock::with_params("exit", vec![(3, Type::I32)]));

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
            Opcode::Jmp,
            vec![Value::from_branch_target(
                loop_block,
                vec![
                    Value::from_register(0, Type::I32),
                    Value::from_int_immediate(0, Type::I32),
                ],
            )],
        ),
    );

    func.append_instr(
        loop_block,
        Instruction::with_dest(
            Opcode::Add,
            4,
            vec![
                Value::from_register(2, Type::I32),
                Value::from_register(1, Type::I32),
            ],
        ),
    );
    func.append_instr(
        loop_block,
        Instruction::with_dest(
            Opcode::Sub,
            5,
            vec![
                Value::from_register(1, Type::I32),
                Value::from_int_immediate(1, Type::I32),
            ],
        ),
    );
    func.append_instr(
        loop_block,
        Instruction::new(
            Opcode::CJmp,
            vec![
                Value::from_register(5, Type::I32),
                Value::from_comparison(Comparison::Sgt),
                Value::from_int_immediate(0, Type::I32),
                Value::from_branch_target(
                    loop_block,
                    vec![
                        Value::from_register(5, Type::I32),
                        Value::from_register(4, Type::I32),
                    ],
                ),
                Value::from_branch_target(exit, vec![Value::from_register(4, Type::I32)]),
            ],
        ),
    );

    func.append_instr(
        exit,
        Instruction::new(Opcode::Ret, vec![Value::from_register(3, Type::I32)]),
    );
    module.functions.push(func);

    let asm = compile(&module, linux_target());

    // The backward branch is conditional; the fall-through into the exit
    // block needs no jump.
    assert!(asm.contains("jg loop"), "asm was:\n{}", asm);
    assert!(!asm.contains("jmp exit"), "asm was:\n{}", asm);
    assert!(asm.contains("loop:"), "asm was:\n{}", asm);
    assert!(asm.contains("exit:"), "asm was:\n{}", asm);
    assert!(!asm.contains('%'), "asm was:\n{}", asm);
}

#[test]
fn test_register_pressure_spills_through_scratch_registers() {
    let mut module = Module::new();

    let mut func = Function::new("pressure", CallingConv::X86_64SysV, vec![Type::I64], Type::I64);

    let entry = func.append_block(BasicBlock::new(""));
    func.append_instr(
        entry,
        Instruction::with_dest(
            Opcode::LoadArg,
            0,
            vec![
                Value::from_type(Type::I64),
                Value::from_int_immediate(0, Type::I64),
            ],
        ),
    );

    // Twenty values that all stay live until the summation chain below.
    let count: u32 = 20;
    for i in 0..count {
        func.append_instr(
            entry,
            Instruction::with_dest(
                Opcode::Add,
                1 + i,
                vec![
                    Value::from_register(0, Type::I64),
                    Value::from_int_immediate(i as i64 + 1, Type::I64),
                ],
            ),
        );
    }

    let mut acc = 1;
    for i in 1..count {
        let dest = count + 1 + i;
        func.append_instr(
            entry,
            Instruction::with_dest(
                Opcode::Add,
                dest,
                vec![
                    Value::from_register(acc, Type::I64),
                    Value::from_register(1 + i, Type::I64),
                ],
            ),
        );
        acc = dest;
    }

    func.append_instr(
        entry,
        Instruction::new(Opcode::Ret, vec![Value::from_register(acc, Type::I64)]),
    );
    func.next_virtual_reg = 100;
    module.functions.push(func);

    let asm = compile(&module, linux_target());

    // More live values than candidate registers: some go to stack slots and
    // are accessed through the reserved scratch register.
    assert!(asm.contains("r15"), "asm was:\n{}", asm);
    assert!(asm.contains("[rsp"), "asm was:\n{}", asm);
    assert!(!asm.contains('%'), "asm was:\n{}", asm);
    assert!(asm.contains("ret"), "asm was:\n{}", asm);
}

#[test]
fn test_large_copy_calls_memcpy() {
    let mut module = Module::new();
    let blob = module.add_structure(Structure {
        name: "blob".to_string(),
        members: vec![Type::I64; 16],
    });

    module.external_functions.push(FunctionDecl {
        name: "memcpy".to_string(),
        calling_conv: CallingConv::X86_64SysV,
        params: vec![Type::Addr, Type::Addr, Type::I64],
        return_type: Type::Void,
    });

    let mut func = Function::new("clone_blob", CallingConv::X86_64SysV, vec![], Type::Void);
    func.next_virtual_reg = 10;

    let entry = func.append_block(BasicBlock::new(""));
    func.append_instr(
        entry,
        Instruction::with_dest(Opcode::Alloca, 0, vec![Value::from_type(Type::Struct(blob))]),
    );
    func.append_instr(
        entry,
        Instruction::with_dest(Opcode::Alloca, 1, vec![Value::from_type(Type::Struct(blob))]),
    );
    func.append_instr(
        entry,
        Instruction::new(
            Opcode::Copy,
            vec![
                Value::from_register(0, Type::Addr),
                Value::from_register(1, Type::Addr),
                Value::from_type(Type::Struct(blob)),
            ],
        ),
    );
    func.append_instr(entry, Instruction::new(Opcode::Ret, vec![]));
    module.functions.push(func);

    let asm = compile(&module, linux_target());

    // 128 bytes exceeds the inline-copy limit.
    assert!(asm.contains("extern memcpy"), "asm was:\n{}", asm);
    assert!(asm.contains("call memcpy wrt ..plt"), "asm was:\n{}", asm);
    assert!(asm.contains("mov rdx, 128"), "asm was:\n{}", asm);
}
