//! Raw opcodes and the rules for decoding instruction lengths
//!
//! See <https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-6.html#jvms-6.5>

use crate::jvm::Error;
use byteorder::{BigEndian, ByteOrder};

pub const NOP: u8 = 0x00;
pub const ACONST_NULL: u8 = 0x01;
pub const ICONST_M1: u8 = 0x02;
pub const ICONST_0: u8 = 0x03;
pub const ICONST_1: u8 = 0x04;
pub const LCONST_0: u8 = 0x09;
pub const FCONST_0: u8 = 0x0b;
pub const DCONST_0: u8 = 0x0e;
pub const BIPUSH: u8 = 0x10;
pub const SIPUSH: u8 = 0x11;
pub const LDC: u8 = 0x12;
pub const LDC_W: u8 = 0x13;
pub const LDC2_W: u8 = 0x14;

pub const ILOAD: u8 = 0x15;
pub const LLOAD: u8 = 0x16;
pub const FLOAD: u8 = 0x17;
pub const DLOAD: u8 = 0x18;
pub const ALOAD: u8 = 0x19;
pub const ILOAD_0: u8 = 0x1a;
pub const LLOAD_0: u8 = 0x1e;
pub const FLOAD_0: u8 = 0x22;
pub const DLOAD_0: u8 = 0x26;
pub const ALOAD_0: u8 = 0x2a;

pub const ISTORE: u8 = 0x36;
pub const LSTORE: u8 = 0x37;
pub const FSTORE: u8 = 0x38;
pub const DSTORE: u8 = 0x39;
pub const ASTORE: u8 = 0x3a;
pub const ISTORE_0: u8 = 0x3b;
pub const LSTORE_0: u8 = 0x3f;
pub const FSTORE_0: u8 = 0x43;
pub const DSTORE_0: u8 = 0x47;
pub const ASTORE_0: u8 = 0x4b;

pub const POP: u8 = 0x57;
pub const POP2: u8 = 0x58;
pub const DUP: u8 = 0x59;
pub const DUP_X1: u8 = 0x5a;
pub const DUP_X2: u8 = 0x5b;
pub const DUP2: u8 = 0x5c;
pub const DUP2_X2: u8 = 0x5e;
pub const SWAP: u8 = 0x5f;
pub const IADD: u8 = 0x60;

pub const IINC: u8 = 0x84;

pub const IFEQ: u8 = 0x99;
pub const IFNE: u8 = 0x9a;
pub const IF_ICMPEQ: u8 = 0x9f;
pub const IF_ACMPNE: u8 = 0xa6;
pub const GOTO: u8 = 0xa7;
pub const JSR: u8 = 0xa8;
pub const RET: u8 = 0xa9;
pub const TABLESWITCH: u8 = 0xaa;
pub const LOOKUPSWITCH: u8 = 0xab;

pub const IRETURN: u8 = 0xac;
pub const LRETURN: u8 = 0xad;
pub const FRETURN: u8 = 0xae;
pub const DRETURN: u8 = 0xaf;
pub const ARETURN: u8 = 0xb0;
pub const RETURN: u8 = 0xb1;

pub const GETSTATIC: u8 = 0xb2;
pub const PUTSTATIC: u8 = 0xb3;
pub const GETFIELD: u8 = 0xb4;
pub const PUTFIELD: u8 = 0xb5;
pub const INVOKEVIRTUAL: u8 = 0xb6;
pub const INVOKESPECIAL: u8 = 0xb7;
pub const INVOKESTATIC: u8 = 0xb8;
pub const INVOKEINTERFACE: u8 = 0xb9;
pub const INVOKEDYNAMIC: u8 = 0xba;
pub const NEW: u8 = 0xbb;
pub const NEWARRAY: u8 = 0xbc;
pub const ANEWARRAY: u8 = 0xbd;
pub const ARRAYLENGTH: u8 = 0xbe;
pub const ATHROW: u8 = 0xbf;
pub const CHECKCAST: u8 = 0xc0;
pub const INSTANCEOF: u8 = 0xc1;
pub const MONITORENTER: u8 = 0xc2;
pub const MONITOREXIT: u8 = 0xc3;
pub const WIDE: u8 = 0xc4;
pub const MULTIANEWARRAY: u8 = 0xc5;
pub const IFNULL: u8 = 0xc6;
pub const IFNONNULL: u8 = 0xc7;
pub const GOTO_W: u8 = 0xc8;
pub const JSR_W: u8 = 0xc9;

/// Fixed instruction lengths, indexed by opcode (0 for invalid or variable-length opcodes)
const LENGTHS: [u8; 202] = [
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, // 0x00
    2, 3, 2, 3, 3, 2, 2, 2, 2, 2, 1, 1, 1, 1, 1, 1, // 0x10
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, // 0x20
    1, 1, 1, 1, 1, 1, 2, 2, 2, 2, 2, 1, 1, 1, 1, 1, // 0x30
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, // 0x40
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, // 0x50
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, // 0x60
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, // 0x70
    1, 1, 1, 1, 3, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, // 0x80
    1, 1, 1, 1, 1, 1, 1, 1, 1, 3, 3, 3, 3, 3, 3, 3, // 0x90
    3, 3, 3, 3, 3, 3, 3, 3, 3, 2, 0, 0, 1, 1, 1, 1, // 0xa0
    1, 1, 3, 3, 3, 3, 3, 3, 3, 5, 5, 3, 2, 3, 1, 1, // 0xb0
    3, 3, 1, 1, 0, 4, 3, 3, 5, 5, // 0xc0
];

/// Bytes of padding after a switch opcode at `position`, aligning its operands to 4 bytes
pub fn switch_padding(position: usize) -> usize {
    3 - position % 4
}

/// Length in bytes of the instruction starting at `position`
pub fn instruction_length(code: &[u8], position: usize) -> Result<usize, Error> {
    let opcode = *code.get(position).ok_or_else(|| Error::BadBytecode {
        position,
        message: String::from("instruction starts past the end of the code"),
    })?;

    let length = match opcode {
        TABLESWITCH => {
            let operands = position + 1 + switch_padding(position);
            let low = read_s32(code, operands + 4)? as i64;
            let high = read_s32(code, operands + 8)? as i64;
            if high < low {
                return Err(Error::BadBytecode {
                    position,
                    message: format!("tableswitch with low {} and high {}", low, high),
                });
            }
            operands - position + 12 + 4 * (high - low + 1) as usize
        }
        LOOKUPSWITCH => {
            let operands = position + 1 + switch_padding(position);
            let pairs = read_s32(code, operands + 4)?;
            if pairs < 0 {
                return Err(Error::BadBytecode {
                    position,
                    message: format!("lookupswitch with {} pairs", pairs),
                });
            }
            operands - position + 8 + 8 * pairs as usize
        }
        WIDE => match code.get(position + 1).copied() {
            Some(IINC) => 6,
            Some(ILOAD..=ALOAD | ISTORE..=ASTORE | RET) => 4,
            _ => {
                return Err(Error::BadBytecode {
                    position,
                    message: String::from("wide prefix on an instruction that can't be widened"),
                })
            }
        },
        _ => match LENGTHS.get(opcode as usize) {
            Some(&length) if length > 0 => length as usize,
            _ => {
                return Err(Error::BadBytecode {
                    position,
                    message: format!("invalid opcode 0x{:02x}", opcode),
                })
            }
        },
    };

    if position + length > code.len() {
        Err(Error::BadBytecode {
            position,
            message: format!("instruction of length {} is truncated", length),
        })
    } else {
        Ok(length)
    }
}

/// Does the instruction carry a 16-bit constant pool index right after its opcode?
///
/// `ldc` (with its single-byte index) is not included.
pub fn has_constant_operand(opcode: u8) -> bool {
    matches!(
        opcode,
        LDC_W
            | LDC2_W
            | GETSTATIC..=INVOKEDYNAMIC
            | NEW
            | ANEWARRAY
            | CHECKCAST
            | INSTANCEOF
            | MULTIANEWARRAY
    )
}

/// Branch with a signed 16-bit offset following the opcode
pub fn is_short_branch(opcode: u8) -> bool {
    matches!(opcode, IFEQ..=JSR | IFNULL | IFNONNULL)
}

/// Branch with a signed 32-bit offset following the opcode
pub fn is_wide_branch(opcode: u8) -> bool {
    matches!(opcode, GOTO_W | JSR_W)
}

pub fn is_switch(opcode: u8) -> bool {
    matches!(opcode, TABLESWITCH | LOOKUPSWITCH)
}

fn truncated(position: usize) -> Error {
    Error::BadBytecode {
        position,
        message: String::from("operand runs past the end of the code"),
    }
}

pub fn read_u16(code: &[u8], position: usize) -> Result<u16, Error> {
    code.get(position..position + 2)
        .map(BigEndian::read_u16)
        .ok_or_else(|| truncated(position))
}

pub fn read_s16(code: &[u8], position: usize) -> Result<i16, Error> {
    code.get(position..position + 2)
        .map(BigEndian::read_i16)
        .ok_or_else(|| truncated(position))
}

pub fn read_s32(code: &[u8], position: usize) -> Result<i32, Error> {
    code.get(position..position + 4)
        .map(BigEndian::read_i32)
        .ok_or_else(|| truncated(position))
}

pub fn write_u16(code: &mut [u8], position: usize, value: u16) -> Result<(), Error> {
    let bytes = code
        .get_mut(position..position + 2)
        .ok_or_else(|| truncated(position))?;
    BigEndian::write_u16(bytes, value);
    Ok(())
}

pub fn write_s32(code: &mut [u8], position: usize, value: i32) -> Result<(), Error> {
    let bytes = code
        .get_mut(position..position + 4)
        .ok_or_else(|| truncated(position))?;
    BigEndian::write_i32(bytes, value);
    Ok(())
}
