//! Benchmarks the full backend pipeline on a register-pressure-heavy
//! function.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use opal_driver::{compile_module, CompileOptions};
use opal_ssa::{BasicBlock, CallingConv, Function, Instruction, Module, Opcode, Type, Value};
use opal_target::{Architecture, CodeModel, Environment, OperatingSystem, TargetDescription};

fn pressure_module(values: u32) -> Module {
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

    for i in 0..values {
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
    for i in 1..values {
        let dest = values + 1 + i;
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
    func.next_virtual_reg = 2 * values + 2;
    module.functions.push(func);

    module
}

fn bench_backend(c: &mut Criterion) {
    let descr = TargetDescription::new(
        Architecture::X86_64,
        OperatingSystem::Linux,
        Environment::Gnu,
    );

    let small = pressure_module(16);
    let large = pressure_module(128);

    c.bench_function("compile_16_live_values", |b| {
        b.iter(|| {
            compile_module(
                black_box(&small),
                descr,
                CodeModel::Small,
                &CompileOptions::default(),
            )
            .unwrap()
        })
    });

    c.bench_function("compile_128_live_values", |b| {
        b.iter(|| {
            compile_module(
                black_box(&large),
                descr,
                CodeModel::Small,
                &CompileOptions::default(),
            )
            .unwrap()
        })
    });
}

criterion_group!(benches, bench_backend);
criterion_main!(benches);
