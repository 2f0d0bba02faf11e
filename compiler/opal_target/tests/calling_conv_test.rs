//! Argument-storage assignment tests for the calling conventions.

use opal_mcode::{ArgStorage, CallingConvention};
use opal_ssa::Type;
use test_case::test_case;

use opal_target::aarch64::AapcsCallingConv;
use opal_target::x86_64::{MsAbiCallingConv, SysVCallingConv};

fn reg(storage: ArgStorage) -> u32 {
    match storage {
        ArgStorage::InReg(reg) => reg,
        ArgStorage::OnStack { .. } => panic!("expected a register, got a stack slot"),
    }
}

#[test]
fn test_sysv_integer_args_use_rdi_rsi_chain() {
    use opal_target::x86_64::register::*;

    let conv = &SysVCallingConv::INSTANCE;
    let storage = conv.arg_storage(&[Type::I32; 7]);

    assert_eq!(reg(storage[0]), RDI);
    assert_eq!(reg(storage[1]), RSI);
    assert_eq!(reg(storage[2]), RDX);
    assert_eq!(reg(storage[3]), RCX);
    assert_eq!(reg(storage[4]), R8);
    assert_eq!(reg(storage[5]), R9);
    assert_eq!(
        storage[6],
        ArgStorage::OnStack {
            arg_slot_index: 0,
            sp_offset: 0
        }
    );
}

#[test]
fn test_sysv_float_args_use_separate_register_file() {
    use opal_target::x86_64::register::*;

    let conv = &SysVCallingConv::INSTANCE;
    let storage = conv.arg_storage(&[Type::F64, Type::I64, Type::F32]);

    assert_eq!(reg(storage[0]), XMM0);
    assert_eq!(reg(storage[1]), RDI);
    assert_eq!(reg(storage[2]), XMM1);
}

#[test]
fn test_ms_abi_argument_positions_are_shared() {
    use opal_target::x86_64::register::*;

    // MS x64 assigns by position: a float in slot 1 consumes XMM1, not XMM0.
    let conv = &MsAbiCallingConv::INSTANCE;
    let storage = conv.arg_storage(&[Type::I32, Type::F64, Type::I32, Type::I32, Type::I64]);

    assert_eq!(reg(storage[0]), RCX);
    assert_eq!(reg(storage[1]), XMM1);
    assert_eq!(reg(storage[2]), R8);
    assert_eq!(reg(storage[3]), R9);
    assert_eq!(
        storage[4],
        ArgStorage::OnStack {
            arg_slot_index: 0,
            sp_offset: 32
        }
    );
}

#[test]
fn test_aapcs_uses_eight_registers_per_class() {
    use opal_target::aarch64::register::*;

    let conv = &AapcsCallingConv::INSTANCE;
    let storage = conv.arg_storage(&[Type::I64; 9]);

    assert_eq!(reg(storage[0]), R0);
    assert_eq!(reg(storage[7]), R7);
    assert_eq!(
        storage[8],
        ArgStorage::OnStack {
            arg_slot_index: 0,
            sp_offset: 0
        }
    );
}

#[test_case(0, opal_mcode::ReturnMethod::NoReturnValue ; "void")]
#[test_case(4, opal_mcode::ReturnMethod::InRegister ; "word")]
#[test_case(8, opal_mcode::ReturnMethod::InRegister ; "quadword")]
#[test_case(24, opal_mcode::ReturnMethod::ViaPointerArg ; "aggregate")]
fn test_return_method_by_size(size: u32, expected: opal_mcode::ReturnMethod) {
    let conv = &SysVCallingConv::INSTANCE;
    assert_eq!(conv.return_method(size), expected);
}

#[test]
fn test_volatile_sets_disagree_on_callee_saved_gprs() {
    use opal_target::x86_64::register::*;

    let sysv = &SysVCallingConv::INSTANCE;
    let ms = &MsAbiCallingConv::INSTANCE;

    // RSI/RDI are caller-saved under SysV but callee-saved under MS x64.
    assert!(sysv.is_volatile(RSI));
    assert!(sysv.is_volatile(RDI));
    assert!(!ms.is_volatile(RSI));
    assert!(!ms.is_volatile(RDI));

    assert!(!sysv.is_volatile(RBX));
    assert!(!ms.is_volatile(RBX));
}
