//! Opening gaps in method bodies
//!
//! Inserting bytes into the middle of a method body moves every instruction after the insertion
//! point. Anything that refers to a code offset then needs to be fixed up:
//!
//!   - relative offsets in branch instructions (`if*`, `goto`, `jsr`, their wide forms, and the
//!     targets of `tableswitch`/`lookupswitch`)
//!   - the exception table
//!   - line number and local variable (type) tables
//!   - stack map frames, including `new` offsets in uninitialized verification types
//!
//! ### Boundary rule
//!
//! Every offset at or after the gap position moves by the gap length. In particular, something
//! that used to start exactly at the gap position ends up starting after the gap:
//!
//! ```text,ignore,no_run
//!        ...                     ...
//!   10:  invokestatic     =>   10: nop             <- gap of 3 bytes
//!   13:  ...                   11: nop
//!                              12: nop
//!                              13: invokestatic    <- branches/ranges that targeted 10
//!                              16: ...
//! ```
//!
//! so newly inserted code is never silently absorbed into a range that began at the insertion
//! point. Local variable ranges that _end_ at or after the gap (but start before it) are extended
//! to cover the gap.
//!
//! ### Switch padding
//!
//! `tableswitch` and `lookupswitch` pad their operands to a multiple of 4 bytes from the start of
//! the method. If one of them sits at or after the gap, the gap is rounded up to a multiple of 4
//! so that the padding stays valid. The surplus is filled with `nop`.
//!
//! ### Failure
//!
//! All checks (instruction boundary, method length limit, branch offset ranges) happen before
//! anything is modified, so a failed gap insertion leaves the code untouched.

use super::opcodes::{
    self, instruction_length, read_s16, read_s32, switch_padding, write_s32, write_u16,
};
use crate::jvm::class_file::{AttributeBody, Code, LocalVariable};
use crate::jvm::{CodeTooLarge, Error};

/// Method bodies can't be longer than this
pub const MAX_CODE_LENGTH: usize = 65535;

/// Bytes inserted into a method body
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Gap {
    /// Where the gap starts
    pub position: usize,

    /// Number of bytes inserted
    pub length: usize,
}

impl Gap {
    /// Where a code offset from before the gap ends up after it
    pub fn shift(&self, offset: usize) -> usize {
        if offset >= self.position {
            offset + self.length
        } else {
            offset
        }
    }
}

/// Location of a relative jump offset in the code
#[derive(Debug, Copy, Clone)]
struct JumpOperand {
    /// Start of the instruction (jumps are relative to this)
    instruction: usize,

    /// Start of the offset operand
    operand: usize,

    /// 4-byte (otherwise 2-byte) offset
    wide: bool,
}

/// Find all relative jump operands of the instruction at `position`
fn jump_operands(code: &[u8], position: usize, out: &mut Vec<JumpOperand>) -> Result<(), Error> {
    let opcode = code[position];
    if opcodes::is_short_branch(opcode) || opcodes::is_wide_branch(opcode) {
        out.push(JumpOperand {
            instruction: position,
            operand: position + 1,
            wide: opcodes::is_wide_branch(opcode),
        });
    } else if opcodes::is_switch(opcode) {
        let operands = position + 1 + switch_padding(position);
        let wide_operand = |operand| JumpOperand {
            instruction: position,
            operand,
            wide: true,
        };

        out.push(wide_operand(operands));
        if opcode == opcodes::TABLESWITCH {
            let low = read_s32(code, operands + 4)? as i64;
            let high = read_s32(code, operands + 8)? as i64;
            for i in 0..(high - low + 1) as usize {
                out.push(wide_operand(operands + 12 + 4 * i));
            }
        } else {
            let pairs = read_s32(code, operands + 4)? as usize;
            for i in 0..pairs {
                out.push(wide_operand(operands + 12 + 8 * i));
            }
        }
    }
    Ok(())
}

/// Insert `length` bytes of `nop` at `position`, fixing up all offsets in the method body
///
/// The gap actually inserted (which may be longer than requested, see the module docs) is
/// returned.
pub fn insert_gap(code: &mut Code, position: usize, length: usize) -> Result<Gap, Error> {
    let bytes = &code.code;

    let mut on_boundary = position == bytes.len();
    let mut switch_after_gap = false;
    let mut jumps = vec![];
    let mut pos = 0;
    while pos < bytes.len() {
        on_boundary |= pos == position;
        switch_after_gap |= pos >= position && opcodes::is_switch(bytes[pos]);
        let instruction_len = instruction_length(bytes, pos)?;
        jump_operands(bytes, pos, &mut jumps)?;
        pos += instruction_len;
    }
    if !on_boundary {
        return Err(Error::BadBytecode {
            position,
            message: String::from("gap does not start on an instruction boundary"),
        });
    }

    let requested = length;
    let length = if switch_after_gap {
        (length + 3) / 4 * 4
    } else {
        length
    };
    let gap = Gap { position, length };
    if length == 0 {
        return Ok(gap);
    }

    let new_length = bytes.len() + length;
    if new_length > MAX_CODE_LENGTH {
        return Err(Error::CodeTooLarge(CodeTooLarge::CodeLength {
            length: new_length,
        }));
    }

    // Compute every new jump offset before touching anything
    let mut patches = vec![];
    for jump in jumps {
        let offset = if jump.wide {
            read_s32(bytes, jump.operand)? as i64
        } else {
            read_s16(bytes, jump.operand)? as i64
        };
        let target = jump.instruction as i64 + offset;
        if target < 0 || target as usize > bytes.len() {
            return Err(Error::BadBytecode {
                position: jump.instruction,
                message: format!("jump to {} is outside of the code", target),
            });
        }

        let new_offset = gap.shift(target as usize) as i64 - gap.shift(jump.instruction) as i64;
        if new_offset == offset {
            continue;
        }
        let fits = if jump.wide {
            i32::try_from(new_offset).is_ok()
        } else {
            i16::try_from(new_offset).is_ok()
        };
        if !fits {
            return Err(Error::CodeTooLarge(CodeTooLarge::BranchOffset {
                position: jump.instruction,
                offset: new_offset,
            }));
        }
        patches.push((jump, new_offset));
    }

    let bytes = &mut code.code;
    for (jump, offset) in patches {
        if jump.wide {
            write_s32(bytes, jump.operand, offset as i32)?;
        } else {
            write_u16(bytes, jump.operand, offset as i16 as u16)?;
        }
    }
    let tail = bytes.split_off(position);
    bytes.resize(position + length, opcodes::NOP);
    bytes.extend_from_slice(&tail);
    shift_tables(code, gap);

    log::trace!(
        "Inserted gap of {} bytes (requested {}) at {}",
        length,
        requested,
        position
    );
    Ok(gap)
}

/// Move all the offsets stored outside of the instructions themselves
fn shift_tables(code: &mut Code, gap: Gap) {
    let shift = |pc: u16| gap.shift(pc as usize) as u16;

    for handler in &mut code.exception_table {
        handler.start_pc = shift(handler.start_pc);
        handler.end_pc = shift(handler.end_pc);
        handler.handler_pc = shift(handler.handler_pc);
    }

    for attribute in &mut code.attributes {
        match &mut attribute.body {
            AttributeBody::LineNumberTable(lines) => {
                for line in lines {
                    line.start_pc = shift(line.start_pc);
                }
            }
            AttributeBody::LocalVariableTable(variables)
            | AttributeBody::LocalVariableTypeTable(variables) => {
                for variable in variables {
                    shift_local_variable(variable, gap);
                }
            }
            AttributeBody::StackMapTable(table) => table.shift(gap),
            _ => (),
        }
    }
}

fn shift_local_variable(variable: &mut LocalVariable, gap: Gap) {
    let start = variable.start_pc as usize;
    let end = start + variable.length as usize;
    if start >= gap.position {
        variable.start_pc = (start + gap.length) as u16;
    } else if end >= gap.position {
        variable.length = (variable.length as usize + gap.length) as u16;
    }
}
