use super::attribute::{read_optional, write_optional};
use super::{
    copy_attributes, read_bytes, Attribute, AttributeBody, ClassConstantIndex, ConstantIndex,
    ConstantPool, Deserialize, Serialize, StackMapTable, Utf8ConstantIndex,
};
use crate::jvm::code::{opcodes, CodeIterator, MAX_CODE_LENGTH};
use crate::jvm::Error;
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::collections::{BTreeSet, HashMap};

/// Body of a method
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.3
#[derive(Debug, Clone, PartialEq)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,

    /// Encoded bytecode instructions
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionHandler>,

    /// Line numbers, local variables, stack map, etc.
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Start of exception handler range (inclusive)
    pub start_pc: u16,

    /// End of exception handler range (exclusive)
    pub end_pc: u16,

    /// Start of the exception handler
    pub handler_pc: u16,

    /// Class of exceptions caught (`None` catches everything)
    pub catch_type: Option<ClassConstantIndex>,
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.12
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LineNumber {
    pub start_pc: u16,
    pub line_number: u16,
}

/// Entry in the local variable (or local variable type) table
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.13
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LocalVariable {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: Utf8ConstantIndex,

    /// Field descriptor (or signature, in the type table)
    pub descriptor_index: Utf8ConstantIndex,

    /// Local variable slot
    pub index: u16,
}

impl Code {
    pub fn new(max_stack: u16, max_locals: u16, code: Vec<u8>) -> Code {
        Code {
            max_stack,
            max_locals,
            code,
            exception_table: vec![],
            attributes: vec![],
        }
    }

    /// Read the body of a code attribute
    pub fn read<R: ReadBytesExt>(reader: &mut R, pool: &ConstantPool) -> Result<Code, Error> {
        let max_stack = u16::deserialize(reader)?;
        let max_locals = u16::deserialize(reader)?;
        let code_length = u32::deserialize(reader)? as usize;
        if code_length > MAX_CODE_LENGTH {
            return Err(Error::MalformedInput(format!(
                "code length {} is larger than {}",
                code_length, MAX_CODE_LENGTH
            )));
        }
        let code = read_bytes(reader, code_length)?;
        let exception_table = Vec::deserialize(reader)?;
        let attributes = Attribute::read_list(reader, pool)?;
        Ok(Code {
            max_stack,
            max_locals,
            code,
            exception_table,
            attributes,
        })
    }

    pub fn line_number_table(&self) -> Option<&[LineNumber]> {
        self.attributes
            .iter()
            .find_map(|attribute| match &attribute.body {
                AttributeBody::LineNumberTable(lines) => Some(lines.as_slice()),
                _ => None,
            })
    }

    /// Source line of the instruction at `pc`, if the line number table covers it
    pub fn line_number(&self, pc: usize) -> Option<u16> {
        self.line_number_table()?
            .iter()
            .filter(|line| line.start_pc as usize <= pc)
            .max_by_key(|line| line.start_pc)
            .map(|line| line.line_number)
    }

    pub fn stack_map_table(&self) -> Option<&StackMapTable> {
        self.attributes
            .iter()
            .find_map(|attribute| match &attribute.body {
                AttributeBody::StackMapTable(table) => Some(table),
                _ => None,
            })
    }

    /// Copy the body into another pool
    ///
    /// Constant pool indices embedded in instructions are remapped. An `ldc` whose constant ends
    /// up past index 255 is widened into `ldc_w`, which shifts the rest of the code.
    pub fn copy(
        &self,
        from: &ConstantPool,
        to: &mut ConstantPool,
        renames: &HashMap<String, String>,
    ) -> Result<Code, Error> {
        let mut exception_table = Vec::with_capacity(self.exception_table.len());
        for handler in &self.exception_table {
            exception_table.push(ExceptionHandler {
                catch_type: match handler.catch_type {
                    Some(class) => Some(from.copy_class(class, to, renames)?),
                    None => None,
                },
                ..*handler
            });
        }

        let mut copied = Code {
            max_stack: self.max_stack,
            max_locals: self.max_locals,
            code: self.code.clone(),
            exception_table,
            attributes: copy_attributes(&self.attributes, from, to, renames)?,
        };
        copied.remap_constants(from, to, renames)?;
        Ok(copied)
    }

    fn remap_constants(
        &mut self,
        from: &ConstantPool,
        to: &mut ConstantPool,
        renames: &HashMap<String, String>,
    ) -> Result<(), Error> {
        let mut iterator = CodeIterator::new(self);
        while iterator.has_next() {
            let position = iterator.next()?;
            let opcode = iterator.byte_at(position)?;
            if opcode == opcodes::LDC {
                let index = ConstantIndex(iterator.byte_at(position + 1)? as u16);
                let copied = from.copy_constant(index, to, renames)?;
                match u8::try_from(copied.0) {
                    Ok(byte) => iterator.write_byte(byte, position + 1)?,
                    Err(_) => {
                        iterator.insert_gap(position + 2, 1)?;
                        iterator.write_byte(opcodes::LDC_W, position)?;
                        iterator.write_u16(copied.0, position + 1)?;
                    }
                }
            } else if opcodes::has_constant_operand(opcode) {
                let index = ConstantIndex(iterator.u16_at(position + 1)?);
                let copied = from.copy_constant(index, to, renames)?;
                iterator.write_u16(copied.0, position + 1)?;
            }
        }
        Ok(())
    }

    pub fn rename_classes(
        &mut self,
        pool: &mut ConstantPool,
        renames: &HashMap<String, String>,
    ) -> Result<(), Error> {
        for attribute in &mut self.attributes {
            attribute.rename_classes(pool, renames)?;
        }
        Ok(())
    }

    pub fn collect_classes(
        &self,
        pool: &ConstantPool,
        out: &mut BTreeSet<String>,
    ) -> Result<(), Error> {
        for handler in &self.exception_table {
            if let Some(class) = handler.catch_type {
                out.insert(pool.get_class_name(class)?.to_owned());
            }
        }
        for attribute in &self.attributes {
            attribute.collect_classes(pool, out)?;
        }
        Ok(())
    }
}

impl Serialize for Code {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.max_stack.serialize(writer)?;
        self.max_locals.serialize(writer)?;
        (self.code.len() as u32).serialize(writer)?;
        writer.write_all(&self.code)?;
        self.exception_table.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Serialize for ExceptionHandler {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start_pc.serialize(writer)?;
        self.end_pc.serialize(writer)?;
        self.handler_pc.serialize(writer)?;
        write_optional(writer, self.catch_type)?;
        Ok(())
    }
}

impl Deserialize for ExceptionHandler {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(ExceptionHandler {
            start_pc: u16::deserialize(reader)?,
            end_pc: u16::deserialize(reader)?,
            handler_pc: u16::deserialize(reader)?,
            catch_type: read_optional(reader, ClassConstantIndex)?,
        })
    }
}

impl Serialize for LineNumber {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start_pc.serialize(writer)?;
        self.line_number.serialize(writer)
    }
}

impl Deserialize for LineNumber {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(LineNumber {
            start_pc: u16::deserialize(reader)?,
            line_number: u16::deserialize(reader)?,
        })
    }
}

impl Serialize for LocalVariable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start_pc.serialize(writer)?;
        self.length.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.index.serialize(writer)
    }
}

impl Deserialize for LocalVariable {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(LocalVariable {
            start_pc: u16::deserialize(reader)?,
            length: u16::deserialize(reader)?,
            name_index: Utf8ConstantIndex::deserialize(reader)?,
            descriptor_index: Utf8ConstantIndex::deserialize(reader)?,
            index: u16::deserialize(reader)?,
        })
    }
}
