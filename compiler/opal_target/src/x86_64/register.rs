//! x86-64 registers.

use opal_mcode::PhysicalReg;

pub const RAX: PhysicalReg = 0;
pub const RDX: PhysicalReg = 1;
pub const RCX: PhysicalReg = 2;
pub const RBX: PhysicalReg = 3;
pub const RSP: PhysicalReg = 4;
pub const RBP: PhysicalReg = 5;
pub const RSI: PhysicalReg = 6;
pub const RDI: PhysicalReg = 7;
pub const R8: PhysicalReg = 8;
pub const R9: PhysicalReg = 9;
pub const R10: PhysicalReg = 10;
pub const R11: PhysicalReg = 11;
pub const R12: PhysicalReg = 12;
pub const R13: PhysicalReg = 13;
pub const R14: PhysicalReg = 14;
pub const R15: PhysicalReg = 15;

pub const XMM0: PhysicalReg = 16;
pub const XMM1: PhysicalReg = 17;
pub const XMM2: PhysicalReg = 18;
pub const XMM3: PhysicalReg = 19;
pub const XMM4: PhysicalReg = 20;
pub const XMM5: PhysicalReg = 21;
pub const XMM6: PhysicalReg = 22;
pub const XMM7: PhysicalReg = 23;
pub const XMM8: PhysicalReg = 24;
pub const XMM9: PhysicalReg = 25;
pub const XMM10: PhysicalReg = 26;
pub const XMM11: PhysicalReg = 27;
pub const XMM12: PhysicalReg = 28;
pub const XMM13: PhysicalReg = 29;
pub const XMM14: PhysicalReg = 30;
pub const XMM15: PhysicalReg = 31;

pub fn is_general_purpose(reg: PhysicalReg) -> bool {
    reg <= R15
}

pub fn is_sse(reg: PhysicalReg) -> bool {
    (XMM0..=XMM15).contains(&reg)
}

/// Register name as it appears in assembly, for the given access size.
pub fn name(reg: PhysicalReg, size: u8) -> String {
    let size = if size == 0 { 4 } else { size };

    if reg <= RBX {
        let letter = match reg {
            RAX => 'a',
            RDX => 'd',
            RCX => 'c',
            _ => 'b',
        };
        match size {
            1 => format!("{}l", letter),
            2 => format!("{}x", letter),
            4 => format!("e{}x", letter),
            _ => format!("r{}x", letter),
        }
    } else if reg == RSP || reg == RBP {
        let letters = if reg == RSP { "sp" } else { "bp" };
        match size {
            1 => format!("{}l", letters),
            2 => letters.to_string(),
            4 => format!("e{}", letters),
            _ => format!("r{}", letters),
        }
    } else if reg == RSI || reg == RDI {
        let letters = if reg == RSI { "si" } else { "di" };
        match size {
            1 => format!("{}l", letters),
            2 => letters.to_string(),
            4 => format!("e{}", letters),
            _ => format!("r{}", letters),
        }
    } else if reg <= R15 {
        let number = reg - R8 + 8;
        match size {
            1 => format!("r{}b", number),
            2 => format!("r{}w", number),
            4 => format!("r{}d", number),
            _ => format!("r{}", number),
        }
    } else if is_sse(reg) {
        format!("xmm{}", reg - XMM0)
    } else {
        unreachable!("unknown x86-64 register {}", reg)
    }
}
