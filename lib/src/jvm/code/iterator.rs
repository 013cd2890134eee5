use super::fixup::{self, Gap, MAX_CODE_LENGTH};
use super::opcodes::{self, instruction_length};
use crate::jvm::class_file::{Code, ExceptionHandler};
use crate::jvm::{CodeTooLarge, Error};

/// Cursor over the instructions of a method body, which can also edit them
///
/// Iteration yields the position of each instruction in turn. Edits that change the length of the
/// code go through [`CodeIterator::insert_gap`] (or [`CodeIterator::append`]), so that branch
/// offsets, the exception table, and the debug tables stay valid. Every gap inserted is recorded
/// in the edit log, in order.
///
/// If the cursor is at or after a gap when it is inserted, it moves along with the code it was
/// pointing at. This means that iteration never visits code inserted at the cursor.
pub struct CodeIterator<'c> {
    code: &'c mut Code,

    /// Position of the next instruction
    position: usize,

    /// Gaps inserted so far
    edits: Vec<Gap>,
}

impl<'c> CodeIterator<'c> {
    pub fn new(code: &'c mut Code) -> CodeIterator<'c> {
        CodeIterator {
            code,
            position: 0,
            edits: vec![],
        }
    }

    pub fn code(&self) -> &Code {
        &*self.code
    }

    /// Direct access to the method body
    ///
    /// Changing the instruction bytes through this won't fix up any offsets.
    pub fn code_mut(&mut self) -> &mut Code {
        &mut *self.code
    }

    /// Length of the instruction bytes
    pub fn code_length(&self) -> usize {
        self.code.code.len()
    }

    pub fn has_next(&self) -> bool {
        self.position < self.code.code.len()
    }

    /// Return the position of the next instruction and advance past it
    pub fn next(&mut self) -> Result<usize, Error> {
        let position = self.position;
        self.position += instruction_length(&self.code.code, position)?;
        Ok(position)
    }

    /// Position of the next instruction, without advancing
    pub fn look_ahead(&self) -> usize {
        self.position
    }

    /// Move the cursor to an instruction
    pub fn move_to(&mut self, position: usize) {
        self.position = position;
    }

    /// Move the cursor back to the start
    pub fn begin(&mut self) {
        self.position = 0;
    }

    /// Length of the instruction at `position`
    pub fn instruction_length(&self, position: usize) -> Result<usize, Error> {
        instruction_length(&self.code.code, position)
    }

    pub fn byte_at(&self, position: usize) -> Result<u8, Error> {
        self.code
            .code
            .get(position)
            .copied()
            .ok_or_else(|| out_of_bounds(position))
    }

    pub fn u16_at(&self, position: usize) -> Result<u16, Error> {
        opcodes::read_u16(&self.code.code, position)
    }

    pub fn s16_at(&self, position: usize) -> Result<i16, Error> {
        opcodes::read_s16(&self.code.code, position)
    }

    pub fn s32_at(&self, position: usize) -> Result<i32, Error> {
        opcodes::read_s32(&self.code.code, position)
    }

    pub fn write_byte(&mut self, value: u8, position: usize) -> Result<(), Error> {
        let byte = self
            .code
            .code
            .get_mut(position)
            .ok_or_else(|| out_of_bounds(position))?;
        *byte = value;
        Ok(())
    }

    pub fn write_u16(&mut self, value: u16, position: usize) -> Result<(), Error> {
        opcodes::write_u16(&mut self.code.code, position, value)
    }

    pub fn write_s32(&mut self, value: i32, position: usize) -> Result<(), Error> {
        opcodes::write_s32(&mut self.code.code, position, value)
    }

    /// Overwrite one byte with `nop`
    pub fn write_nop(&mut self, position: usize) -> Result<(), Error> {
        self.write_byte(opcodes::NOP, position)
    }

    /// Overwrite bytes starting at `position` (the code does not grow)
    pub fn write(&mut self, bytes: &[u8], position: usize) -> Result<(), Error> {
        let region = self
            .code
            .code
            .get_mut(position..position + bytes.len())
            .ok_or_else(|| out_of_bounds(position + bytes.len()))?;
        region.copy_from_slice(bytes);
        Ok(())
    }

    /// Add bytes to the end of the code, returning where they start
    ///
    /// Nothing needs fixing up, since no existing offset can point past the end.
    pub fn append(&mut self, bytes: &[u8]) -> Result<usize, Error> {
        let position = self.code.code.len();
        let new_length = position + bytes.len();
        if new_length > MAX_CODE_LENGTH {
            return Err(Error::CodeTooLarge(CodeTooLarge::CodeLength {
                length: new_length,
            }));
        }
        self.code.code.extend_from_slice(bytes);
        Ok(position)
    }

    /// Insert a gap of (at least) `length` bytes of `nop` at `position`
    ///
    /// See [`fixup`](super::fixup) for how offsets are adjusted. The gap actually inserted is
    /// returned.
    pub fn insert_gap(&mut self, position: usize, length: usize) -> Result<Gap, Error> {
        let gap = fixup::insert_gap(&mut *self.code, position, length)?;
        if gap.length > 0 {
            self.position = gap.shift(self.position);
            self.edits.push(gap);
        }
        Ok(gap)
    }

    /// Merge exception table entries (relative to `offset`) into the front of the exception
    /// table, so that they take priority over the existing handlers
    pub fn insert_exception_entries(
        &mut self,
        entries: &[ExceptionHandler],
        offset: usize,
    ) -> Result<(), Error> {
        let relocate = |pc: u16| -> Result<u16, Error> {
            u16::try_from(pc as usize + offset).map_err(|_| {
                Error::CodeTooLarge(CodeTooLarge::CodeLength {
                    length: pc as usize + offset,
                })
            })
        };
        let mut relocated = Vec::with_capacity(entries.len());
        for entry in entries {
            relocated.push(ExceptionHandler {
                start_pc: relocate(entry.start_pc)?,
                end_pc: relocate(entry.end_pc)?,
                handler_pc: relocate(entry.handler_pc)?,
                catch_type: entry.catch_type,
            });
        }
        relocated.append(&mut self.code.exception_table);
        self.code.exception_table = relocated;
        Ok(())
    }

    /// Gaps inserted through this iterator so far
    pub fn edits(&self) -> &[Gap] {
        &self.edits
    }
}

fn out_of_bounds(position: usize) -> Error {
    Error::BadBytecode {
        position,
        message: String::from("position is past the end of the code"),
    }
}
