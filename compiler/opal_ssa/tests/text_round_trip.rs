//! Round-trip tests for the SSA text format.

use pretty_assertions::assert_eq;

use opal_ssa::{
    BasicBlock, CallingConv, Comparison, Function, Global, GlobalDecl, GlobalValue, Instruction,
    InstrAttrs, Module, Opcode, Structure, Type, Value,
};

fn sample_module() -> Module {
    let mut module = Module::new();

    let pair = module.add_structure(Structure {
        name: "pair".to_string(),
        members: vec![Type::I32, Type::I64],
    });

    module.external_functions.push(opal_ssa::FunctionDecl {
        name: "memcpy".to_string(),
        calling_conv: CallingConv::X86_64SysV,
        params: vec![Type::Addr, Type::Addr, Type::I64],
        return_type: Type::Void,
    });

    module.external_globals.push(GlobalDecl {
        name: "ext_counter".to_string(),
        ty: Type::I64,
    });

    module.globals.push(Global {
        name: "counter".to_string(),
        ty: Type::I32,
        initial_value: GlobalValue::Int((-7i64).into()),
        external: true,
    });
    module.globals.push(Global {
        name: "ratio".to_string(),
        ty: Type::F64,
        initial_value: GlobalValue::Fp(0.5),
        external: false,
    });
    module.globals.push(Global {
        name: "greeting".to_string(),
        ty: Type::Addr,
        initial_value: GlobalValue::Str("hi\n".to_string()),
        external: false,
    });
    module.globals.push(Global {
        name: "blob".to_string(),
        ty: Type::Addr,
        initial_value: GlobalValue::Bytes(vec![1, 2, 255]),
        external: false,
    });

    module.dll_exports.push("counter".to_string());

    let mut func = Function::new(
        "sum_to",
        CallingConv::X86_64SysV,
        vec![Type::I32],
        Type::I32,
    );
    func.global = true;

    let entry = func.append_block(BasicBlock::new(""));
    let loop_block = func.append_block(BasicBlock::with_params(
        "loop",
        vec![(1, Type::I32), (2, Type::I32)],
    ));
    let exit = func.append_block(BasicBlock::with_params("exit", vec![(3, Type::I32)]));
    func.next_virtual_reg = 10;

    func.append_instr(
        entry,
        Instruction::with_dest(
            Opcode::LoadArg,
            0,
            vec![
                Value::from_type(Type::I32),
                Value::from_int_immediate(0, Type::I32),
            ],
        )
        .with_attrs(InstrAttrs::ARG_STORE),
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
        Instruction::with_dest(Opcode::Alloca, 6, vec![Value::from_type(Type::Struct(pair))]),
    );
    func.append_instr(
        exit,
        Instruction::with_dest(
            Opcode::MemberPtr,
            7,
            vec![
                Value::from_type(Type::Struct(pair)),
                Value::from_register(6, Type::Addr),
                Value::from_int_immediate(1, Type::I32),
            ],
        ),
    );
    func.append_instr(
        exit,
        Instruction::new(
            Opcode::Store,
            vec![
                Value::from_int_immediate(7, Type::I64),
                Value::from_register(7, Type::Addr),
            ],
        ),
    );
    func.append_instr(
        exit,
        Instruction::new(Opcode::Ret, vec![Value::from_register(3, Type::I32)]),
    );

    module.functions.push(func);
    module
}

#[test]
fn test_write_read_write_is_stable() {
    let module = sample_module();

    let first = opal_ssa::writer::write_module(&module);
    let reparsed = opal_ssa::reader::read_module(&first).expect("reader should accept writer output");
    let second = opal_ssa::writer::write_module(&reparsed);

    assert_eq!(first, second);
}

#[test]
fn test_reader_recovers_structure() {
    let module = sample_module();
    let text = opal_ssa::writer::write_module(&module);
    let reparsed = opal_ssa::reader::read_module(&text).unwrap();

    assert_eq!(reparsed.structures.len(), 1);
    assert_eq!(reparsed.structures[0].members, vec![Type::I32, Type::I64]);
    assert_eq!(reparsed.external_functions.len(), 1);
    assert_eq!(reparsed.globals.len(), 4);
    assert!(reparsed.globals[0].external);
    assert_eq!(reparsed.dll_exports, vec!["counter".to_string()]);

    let func = &reparsed.functions[0];
    assert_eq!(func.name, "sum_to");
    assert!(func.global);
    assert_eq!(func.blocks.len(), 3);
    assert_eq!(func.next_virtual_reg, 8);

    // Branch arguments must match the target block's parameters pairwise.
    for (_, block) in &func.blocks {
        for instr in block.instrs.values() {
            for operand in &instr.operands {
                if operand.is_branch_target() {
                    let target = operand.branch_target();
                    let target_block = func.block(target.block);
                    assert_eq!(target.args.len(), target_block.param_regs.len());
                }
            }
        }
    }
}

#[test]
fn test_each_register_assigned_once() {
    let module = sample_module();

    for func in &module.functions {
        let mut defs = std::collections::HashSet::new();
        for (_, block) in &func.blocks {
            for reg in &block.param_regs {
                assert!(defs.insert(*reg), "register %{} defined twice", reg);
            }
            for instr in block.instrs.values() {
                if let Some(dest) = instr.dest {
                    assert!(defs.insert(dest), "register %{} defined twice", dest);
                }
            }
        }
    }
}

#[test]
fn test_module_serde_round_trip() {
    let module = sample_module();
    let json = serde_json::to_string(&module).unwrap();
    let reparsed: Module = serde_json::from_str(&json).unwrap();

    assert_eq!(
        opal_ssa::writer::write_module(&module),
        opal_ssa::writer::write_module(&reparsed)
    );
}
