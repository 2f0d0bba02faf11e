//! AArch64 registers.

use opal_mcode::PhysicalReg;

/// General-purpose registers X0..X30.
pub const R0: PhysicalReg = 0;
pub const R1: PhysicalReg = 1;
pub const R2: PhysicalReg = 2;
pub const R3: PhysicalReg = 3;
pub const R4: PhysicalReg = 4;
pub const R5: PhysicalReg = 5;
pub const R6: PhysicalReg = 6;
pub const R7: PhysicalReg = 7;
pub const R8: PhysicalReg = 8;
pub const R9: PhysicalReg = 9;
pub const R10: PhysicalReg = 10;
pub const R11: PhysicalReg = 11;
pub const R12: PhysicalReg = 12;
pub const R13: PhysicalReg = 13;
pub const R14: PhysicalReg = 14;
pub const R15: PhysicalReg = 15;
pub const R16: PhysicalReg = 16;
pub const R17: PhysicalReg = 17;
pub const R18: PhysicalReg = 18;
pub const R19: PhysicalReg = 19;
pub const R20: PhysicalReg = 20;
pub const R21: PhysicalReg = 21;
pub const R22: PhysicalReg = 22;
pub const R23: PhysicalReg = 23;
pub const R24: PhysicalReg = 24;
pub const R25: PhysicalReg = 25;
pub const R26: PhysicalReg = 26;
pub const R27: PhysicalReg = 27;
pub const R28: PhysicalReg = 28;
/// Frame pointer.
pub const R29: PhysicalReg = 29;
/// Link register.
pub const R30: PhysicalReg = 30;
pub const R_LAST: PhysicalReg = R30;

pub const SP: PhysicalReg = 31;

/// Vector registers V0..V31.
pub const V0: PhysicalReg = 32;
pub const V1: PhysicalReg = 33;
pub const V2: PhysicalReg = 34;
pub const V3: PhysicalReg = 35;
pub const V4: PhysicalReg = 36;
pub const V5: PhysicalReg = 37;
pub const V6: PhysicalReg = 38;
pub const V7: PhysicalReg = 39;
pub const V8: PhysicalReg = 40;
pub const V9: PhysicalReg = 41;
pub const V10: PhysicalReg = 42;
pub const V11: PhysicalReg = 43;
pub const V12: PhysicalReg = 44;
pub const V13: PhysicalReg = 45;
pub const V14: PhysicalReg = 46;
pub const V15: PhysicalReg = 47;
pub const V16: PhysicalReg = 48;
pub const V17: PhysicalReg = 49;
pub const V18: PhysicalReg = 50;
pub const V19: PhysicalReg = 51;
pub const V20: PhysicalReg = 52;
pub const V21: PhysicalReg = 53;
pub const V22: PhysicalReg = 54;
pub const V23: PhysicalReg = 55;
pub const V24: PhysicalReg = 56;
pub const V25: PhysicalReg = 57;
pub const V26: PhysicalReg = 58;
pub const V27: PhysicalReg = 59;
pub const V28: PhysicalReg = 60;
pub const V29: PhysicalReg = 61;
pub const V30: PhysicalReg = 62;
pub const V31: PhysicalReg = 63;
pub const V_LAST: PhysicalReg = V31;

pub fn is_general_purpose(reg: PhysicalReg) -> bool {
    reg <= R_LAST
}

pub fn is_vector(reg: PhysicalReg) -> bool {
    (V0..=V_LAST).contains(&reg)
}

/// Register name as it appears in assembly, for the given access size.
pub fn name(reg: PhysicalReg, size: u8) -> String {
    if is_general_purpose(reg) {
        let prefix = if size == 8 { 'x' } else { 'w' };
        format!("{}{}", prefix, reg)
    } else if reg == SP {
        "sp".to_string()
    } else if is_vector(reg) {
        let prefix = match size {
            1 => 'b',
            2 => 'h',
            4 => 's',
            16 => 'q',
            _ => 'd',
        };
        format!("{}{}", prefix, reg - V0)
    } else {
        unreachable!("unknown AArch64 register {}", reg)
    }
}
