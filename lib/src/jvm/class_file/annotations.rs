use super::{
    read_bytes, ConstantIndex, ConstantPool, Deserialize, Serialize, Utf8ConstantIndex,
};
use crate::jvm::Error;
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::collections::{BTreeSet, HashMap};

/// Annotation as it appears in the `Runtime*Annotations` attributes
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.16
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// Field descriptor of the annotation type (eg. `Ljava/lang/Deprecated;`)
    pub type_index: Utf8ConstantIndex,
    pub elements: Vec<ElementValuePair>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementValuePair {
    pub name_index: Utf8ConstantIndex,
    pub value: ElementValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    /// Primitive or string constant
    ///
    /// The tag is one of `BCDFIJSZs`. For `s`, the constant is a utf8 constant (not a string
    /// constant).
    Const { tag: u8, value: ConstantIndex },

    Enum {
        /// Field descriptor of the enum type
        type_name: Utf8ConstantIndex,
        const_name: Utf8ConstantIndex,
    },

    /// Return descriptor of a class literal (eg. `Ljava/lang/String;` or `V`)
    Class(Utf8ConstantIndex),

    Annotation(Annotation),

    Array(Vec<ElementValue>),
}

/// Annotation on a use of a type
///
/// The target and path are kept as raw bytes: they only hold offsets and small indices, none of
/// which point into the constant pool.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.20
#[derive(Debug, Clone, PartialEq)]
pub struct TypeAnnotation {
    pub target_type: u8,
    pub target_info: Vec<u8>,

    /// `(type_path_kind, type_argument_index)` pairs
    pub type_path: Vec<(u8, u8)>,
    pub annotation: Annotation,
}

impl Annotation {
    pub fn copy(
        &self,
        from: &ConstantPool,
        to: &mut ConstantPool,
        renames: &HashMap<String, String>,
    ) -> Result<Annotation, Error> {
        let mut elements = Vec::with_capacity(self.elements.len());
        for pair in &self.elements {
            elements.push(ElementValuePair {
                name_index: from.copy_utf8(pair.name_index, to)?,
                value: pair.value.copy(from, to, renames)?,
            });
        }
        Ok(Annotation {
            type_index: from.copy_descriptor(self.type_index, to, renames)?,
            elements,
        })
    }

    pub fn rename_classes(
        &mut self,
        pool: &mut ConstantPool,
        renames: &HashMap<String, String>,
    ) -> Result<(), Error> {
        self.type_index = pool.rename_descriptor_at(self.type_index, renames)?;
        for pair in &mut self.elements {
            pair.value.rename_classes(pool, renames)?;
        }
        Ok(())
    }

    pub fn collect_classes(
        &self,
        pool: &ConstantPool,
        out: &mut BTreeSet<String>,
    ) -> Result<(), Error> {
        pool.collect_descriptor_classes(self.type_index, out)?;
        for pair in &self.elements {
            pair.value.collect_classes(pool, out)?;
        }
        Ok(())
    }
}

impl ElementValue {
    pub fn copy(
        &self,
        from: &ConstantPool,
        to: &mut ConstantPool,
        renames: &HashMap<String, String>,
    ) -> Result<ElementValue, Error> {
        let copied = match self {
            ElementValue::Const { tag, value } => ElementValue::Const {
                tag: *tag,
                value: from.copy_constant(*value, to, renames)?,
            },
            ElementValue::Enum {
                type_name,
                const_name,
            } => ElementValue::Enum {
                type_name: from.copy_descriptor(*type_name, to, renames)?,
                const_name: from.copy_utf8(*const_name, to)?,
            },
            ElementValue::Class(class) => {
                ElementValue::Class(from.copy_descriptor(*class, to, renames)?)
            }
            ElementValue::Annotation(annotation) => {
                ElementValue::Annotation(annotation.copy(from, to, renames)?)
            }
            ElementValue::Array(values) => ElementValue::Array(
                values
                    .iter()
                    .map(|value| value.copy(from, to, renames))
                    .collect::<Result<_, _>>()?,
            ),
        };
        Ok(copied)
    }

    pub fn rename_classes(
        &mut self,
        pool: &mut ConstantPool,
        renames: &HashMap<String, String>,
    ) -> Result<(), Error> {
        match self {
            ElementValue::Const { .. } => (),
            ElementValue::Enum { type_name, .. } => {
                *type_name = pool.rename_descriptor_at(*type_name, renames)?;
            }
            ElementValue::Class(class) => {
                *class = pool.rename_descriptor_at(*class, renames)?;
            }
            ElementValue::Annotation(annotation) => annotation.rename_classes(pool, renames)?,
            ElementValue::Array(values) => {
                for value in values {
                    value.rename_classes(pool, renames)?;
                }
            }
        }
        Ok(())
    }

    pub fn collect_classes(
        &self,
        pool: &ConstantPool,
        out: &mut BTreeSet<String>,
    ) -> Result<(), Error> {
        match self {
            ElementValue::Const { .. } => Ok(()),
            ElementValue::Enum { type_name, .. } => pool.collect_descriptor_classes(*type_name, out),
            ElementValue::Class(class) => pool.collect_descriptor_classes(*class, out),
            ElementValue::Annotation(annotation) => annotation.collect_classes(pool, out),
            ElementValue::Array(values) => values
                .iter()
                .try_for_each(|value| value.collect_classes(pool, out)),
        }
    }
}

impl TypeAnnotation {
    pub fn copy(
        &self,
        from: &ConstantPool,
        to: &mut ConstantPool,
        renames: &HashMap<String, String>,
    ) -> Result<TypeAnnotation, Error> {
        Ok(TypeAnnotation {
            target_type: self.target_type,
            target_info: self.target_info.clone(),
            type_path: self.type_path.clone(),
            annotation: self.annotation.copy(from, to, renames)?,
        })
    }
}

impl Serialize for Annotation {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.type_index.serialize(writer)?;
        self.elements.serialize(writer)
    }
}

impl Deserialize for Annotation {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(Annotation {
            type_index: Utf8ConstantIndex::deserialize(reader)?,
            elements: Vec::deserialize(reader)?,
        })
    }
}

impl Serialize for ElementValuePair {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.name_index.serialize(writer)?;
        self.value.serialize(writer)
    }
}

impl Deserialize for ElementValuePair {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(ElementValuePair {
            name_index: Utf8ConstantIndex::deserialize(reader)?,
            value: ElementValue::deserialize(reader)?,
        })
    }
}

impl Serialize for ElementValue {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            ElementValue::Const { tag, value } => {
                tag.serialize(writer)?;
                value.serialize(writer)?;
            }
            ElementValue::Enum {
                type_name,
                const_name,
            } => {
                b'e'.serialize(writer)?;
                type_name.serialize(writer)?;
                const_name.serialize(writer)?;
            }
            ElementValue::Class(class) => {
                b'c'.serialize(writer)?;
                class.serialize(writer)?;
            }
            ElementValue::Annotation(annotation) => {
                b'@'.serialize(writer)?;
                annotation.serialize(writer)?;
            }
            ElementValue::Array(values) => {
                b'['.serialize(writer)?;
                values.serialize(writer)?;
            }
        }
        Ok(())
    }
}

impl Deserialize for ElementValue {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let value = match u8::deserialize(reader)? {
            tag @ (b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's') => {
                ElementValue::Const {
                    tag,
                    value: ConstantIndex::deserialize(reader)?,
                }
            }
            b'e' => ElementValue::Enum {
                type_name: Utf8ConstantIndex::deserialize(reader)?,
                const_name: Utf8ConstantIndex::deserialize(reader)?,
            },
            b'c' => ElementValue::Class(Utf8ConstantIndex::deserialize(reader)?),
            b'@' => ElementValue::Annotation(Annotation::deserialize(reader)?),
            b'[' => ElementValue::Array(Vec::deserialize(reader)?),
            tag => {
                return Err(Error::MalformedInput(format!(
                    "unknown element value tag {:#04x}",
                    tag
                )))
            }
        };
        Ok(value)
    }
}

/// Read the `target_info` union, whose shape depends on the `target_type`
fn read_target_info<R: ReadBytesExt>(target_type: u8, reader: &mut R) -> Result<Vec<u8>, Error> {
    let length = match target_type {
        0x00 | 0x01 | 0x16 => 1,
        0x10 | 0x11 | 0x12 | 0x17 | 0x42 | 0x43..=0x46 => 2,
        0x13..=0x15 => 0,
        0x47..=0x4B => 3,

        // `localvar_target` is a table of (start_pc, length, index) entries
        0x40 | 0x41 => {
            let count = u16::deserialize(reader)?;
            let mut info = count.to_be_bytes().to_vec();
            info.extend(read_bytes(reader, 6 * count as usize)?);
            return Ok(info);
        }
        other => {
            return Err(Error::MalformedInput(format!(
                "unknown type annotation target {:#04x}",
                other
            )))
        }
    };
    read_bytes(reader, length)
}

impl Serialize for TypeAnnotation {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.target_type.serialize(writer)?;
        writer.write_all(&self.target_info)?;
        (self.type_path.len() as u8).serialize(writer)?;
        for (kind, argument) in &self.type_path {
            kind.serialize(writer)?;
            argument.serialize(writer)?;
        }
        self.annotation.serialize(writer)
    }
}

impl Deserialize for TypeAnnotation {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let target_type = u8::deserialize(reader)?;
        let target_info = read_target_info(target_type, reader)?;
        let path_length = u8::deserialize(reader)?;
        let mut type_path = Vec::with_capacity(path_length as usize);
        for _ in 0..path_length {
            type_path.push((u8::deserialize(reader)?, u8::deserialize(reader)?));
        }
        Ok(TypeAnnotation {
            target_type,
            target_info,
            type_path,
            annotation: Annotation::deserialize(reader)?,
        })
    }
}
