use super::{ClassConstantIndex, ConstantPool, Deserialize, Serialize};
use crate::jvm::code::Gap;
use crate::jvm::Error;
use crate::util::Width;
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::collections::{BTreeSet, HashMap};
use std::io::{Error as IoError, ErrorKind};

/// [0]: https://docs.oracle.com/javase/specs/jvms/se7/html/jvms-4.html#jvms-4.7.4
#[derive(Debug, Clone, PartialEq)]
pub struct StackMapTable(pub Vec<StackMapFrame>);

/// One frame of the stack map
///
/// Frames are stored with their encoded `offset_delta`. The first frame is at `offset_delta` and
/// every later frame is at `previous + offset_delta + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct StackMapFrame {
    pub offset_delta: u16,

    /// Was (or must be) the frame written in its `_extended` form, even though the delta would
    /// fit in the compact one? Only meaningful for `Same` and `SameLocalsOneStack`.
    pub extended: bool,

    pub kind: FrameKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameKind {
    /// Frame has the same locals as the previous frame and number of stack items is zero
    /// Tags: 0-63 or 251
    Same,

    /// Frame has the same locals as the previous frame and number of stack items is one
    /// Tags: 64-127 or 247
    SameLocalsOneStack(VerificationType),

    /// Frame is like the previous frame, but without the last `k` locals (1 to 3)
    /// Tags: 248-250
    Chop(u8),

    /// Frame is like the previous frame, but with 1 to 3 extra locals
    /// Tags: 252-254
    Append(Vec<VerificationType>),

    /// Frame has exactly the locals and stack specified
    /// Tag: 255
    Full {
        locals: Vec<VerificationType>,
        stack: Vec<VerificationType>,
    },
}

/// These types are from [this hierarchy][0]
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se7/html/jvms-4.html#jvms-4.10.1.2
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum VerificationType {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,

    /// In the constructor, the `this` parameter starts with this type then turns into an object
    /// type after `<init>` is called
    UninitializedThis,

    /// Object type
    Object(ClassConstantIndex),

    /// State of an object after `new` has been called but `<init>` has not been called (holds
    /// the offset of the `new` instruction)
    Uninitialized(u16),
}

impl Width for VerificationType {
    fn width(&self) -> usize {
        match self {
            VerificationType::Double | VerificationType::Long => 2,
            _ => 1,
        }
    }
}

impl StackMapTable {
    /// Absolute bytecode offsets of all frames
    pub fn offsets(&self) -> Vec<usize> {
        let mut offsets = Vec::with_capacity(self.0.len());
        let mut previous: Option<usize> = None;
        for frame in &self.0 {
            let offset = match previous {
                None => frame.offset_delta as usize,
                Some(previous) => previous + frame.offset_delta as usize + 1,
            };
            offsets.push(offset);
            previous = Some(offset);
        }
        offsets
    }

    /// Move frames (and `new` offsets in uninitialized types) following a gap in the code
    pub fn shift(&mut self, gap: Gap) {
        let offsets = self.offsets();
        let mut previous: Option<usize> = None;
        for (frame, offset) in self.0.iter_mut().zip(offsets) {
            let offset = gap.shift(offset);
            let delta = match previous {
                None => offset,
                Some(previous) => offset - previous - 1,
            };
            frame.offset_delta = delta as u16;
            previous = Some(offset);

            frame.for_each_type_mut(|verification_type| {
                if let VerificationType::Uninitialized(new_offset) = verification_type {
                    *new_offset = gap.shift(*new_offset as usize) as u16;
                }
            });
        }
    }

    pub fn copy(
        &self,
        from: &ConstantPool,
        to: &mut ConstantPool,
        renames: &HashMap<String, String>,
    ) -> Result<StackMapTable, Error> {
        let mut frames = self.0.clone();
        for frame in &mut frames {
            let mut result = Ok(());
            frame.for_each_type_mut(|verification_type| {
                if let VerificationType::Object(class) = verification_type {
                    match from.copy_class(*class, to, renames) {
                        Ok(copied) => *class = copied,
                        Err(err) => result = Err(err),
                    }
                }
            });
            result?;
        }
        Ok(StackMapTable(frames))
    }

    pub fn collect_classes(
        &self,
        pool: &ConstantPool,
        out: &mut BTreeSet<String>,
    ) -> Result<(), Error> {
        for frame in &self.0 {
            for verification_type in frame.types() {
                if let VerificationType::Object(class) = verification_type {
                    out.insert(pool.get_class_name(*class)?.to_owned());
                }
            }
        }
        Ok(())
    }
}

impl StackMapFrame {
    fn types(&self) -> Box<dyn Iterator<Item = &VerificationType> + '_> {
        match &self.kind {
            FrameKind::Same | FrameKind::Chop(_) => Box::new(std::iter::empty()),
            FrameKind::SameLocalsOneStack(stack) => Box::new(std::iter::once(stack)),
            FrameKind::Append(locals) => Box::new(locals.iter()),
            FrameKind::Full { locals, stack } => Box::new(locals.iter().chain(stack.iter())),
        }
    }

    fn for_each_type_mut(&mut self, mut visit: impl FnMut(&mut VerificationType)) {
        match &mut self.kind {
            FrameKind::Same | FrameKind::Chop(_) => (),
            FrameKind::SameLocalsOneStack(stack) => visit(stack),
            FrameKind::Append(locals) => locals.iter_mut().for_each(visit),
            FrameKind::Full { locals, stack } => {
                locals.iter_mut().chain(stack.iter_mut()).for_each(visit)
            }
        }
    }
}

impl Serialize for StackMapTable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for StackMapTable {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Vec::deserialize(reader).map(StackMapTable)
    }
}

impl Serialize for StackMapFrame {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        let offset_delta = self.offset_delta;
        let compact = !self.extended && offset_delta <= 63;
        match &self.kind {
            // `same_frame` and `same_frame_extended`
            FrameKind::Same => {
                if compact {
                    (offset_delta as u8).serialize(writer)?;
                } else {
                    251u8.serialize(writer)?;
                    offset_delta.serialize(writer)?;
                }
            }

            // `same_locals_1_stack_item_frame` and `same_locals_1_stack_item_frame_extended`
            FrameKind::SameLocalsOneStack(stack) => {
                if compact {
                    (offset_delta as u8 + 64).serialize(writer)?;
                } else {
                    247u8.serialize(writer)?;
                    offset_delta.serialize(writer)?;
                }
                stack.serialize(writer)?;
            }

            // `chop_frame`
            FrameKind::Chop(chopped_k) => {
                if !(1..=3).contains(chopped_k) {
                    return Err(IoError::new(
                        ErrorKind::InvalidData,
                        "chop frames remove 1-3 locals",
                    ));
                }
                (251 - chopped_k).serialize(writer)?;
                offset_delta.serialize(writer)?;
            }

            // `append_frame`
            FrameKind::Append(locals) => {
                let added_k = locals.len();
                if !(1..=3).contains(&added_k) {
                    return Err(IoError::new(
                        ErrorKind::InvalidData,
                        "append frames add 1-3 locals",
                    ));
                }
                (251 + added_k as u8).serialize(writer)?;
                offset_delta.serialize(writer)?;
                for local in locals {
                    local.serialize(writer)?;
                }
            }

            // `full_frame`
            FrameKind::Full { locals, stack } => {
                255u8.serialize(writer)?;
                offset_delta.serialize(writer)?;
                locals.serialize(writer)?;
                stack.serialize(writer)?;
            }
        };
        Ok(())
    }
}

impl Deserialize for StackMapFrame {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let tag = u8::deserialize(reader)?;
        let frame = match tag {
            0..=63 => StackMapFrame {
                offset_delta: tag as u16,
                extended: false,
                kind: FrameKind::Same,
            },
            64..=127 => StackMapFrame {
                offset_delta: tag as u16 - 64,
                extended: false,
                kind: FrameKind::SameLocalsOneStack(VerificationType::deserialize(reader)?),
            },
            247 => {
                let offset_delta = u16::deserialize(reader)?;
                StackMapFrame {
                    offset_delta,
                    extended: true,
                    kind: FrameKind::SameLocalsOneStack(VerificationType::deserialize(reader)?),
                }
            }
            248..=250 => StackMapFrame {
                offset_delta: u16::deserialize(reader)?,
                extended: true,
                kind: FrameKind::Chop(251 - tag),
            },
            251 => StackMapFrame {
                offset_delta: u16::deserialize(reader)?,
                extended: true,
                kind: FrameKind::Same,
            },
            252..=254 => {
                let offset_delta = u16::deserialize(reader)?;
                let locals = (0..tag - 251)
                    .map(|_| VerificationType::deserialize(reader))
                    .collect::<Result<_, _>>()?;
                StackMapFrame {
                    offset_delta,
                    extended: true,
                    kind: FrameKind::Append(locals),
                }
            }
            255 => StackMapFrame {
                offset_delta: u16::deserialize(reader)?,
                extended: true,
                kind: FrameKind::Full {
                    locals: Vec::deserialize(reader)?,
                    stack: Vec::deserialize(reader)?,
                },
            },
            _ => {
                return Err(Error::MalformedInput(format!(
                    "reserved stack map frame type {}",
                    tag
                )))
            }
        };
        Ok(frame)
    }
}

impl Serialize for VerificationType {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            VerificationType::Top => 0u8.serialize(writer)?,
            VerificationType::Integer => 1u8.serialize(writer)?,
            VerificationType::Float => 2u8.serialize(writer)?,
            VerificationType::Double => 3u8.serialize(writer)?,
            VerificationType::Long => 4u8.serialize(writer)?,
            VerificationType::Null => 5u8.serialize(writer)?,
            VerificationType::UninitializedThis => 6u8.serialize(writer)?,
            VerificationType::Object(cls) => {
                7u8.serialize(writer)?;
                cls.serialize(writer)?;
            }
            VerificationType::Uninitialized(off) => {
                8u8.serialize(writer)?;
                off.serialize(writer)?;
            }
        };
        Ok(())
    }
}

impl Deserialize for VerificationType {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let verification_type = match u8::deserialize(reader)? {
            0 => VerificationType::Top,
            1 => VerificationType::Integer,
            2 => VerificationType::Float,
            3 => VerificationType::Double,
            4 => VerificationType::Long,
            5 => VerificationType::Null,
            6 => VerificationType::UninitializedThis,
            7 => VerificationType::Object(ClassConstantIndex::deserialize(reader)?),
            8 => VerificationType::Uninitialized(u16::deserialize(reader)?),
            other => {
                return Err(Error::MalformedInput(format!(
                    "unknown verification type tag {}",
                    other
                )))
            }
        };
        Ok(verification_type)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::to_bytes;

    fn same(offset_delta: u16) -> StackMapFrame {
        StackMapFrame {
            offset_delta,
            extended: false,
            kind: FrameKind::Same,
        }
    }

    #[test]
    fn absolute_offsets() {
        let table = StackMapTable(vec![same(5), same(0), same(9)]);
        assert_eq!(table.offsets(), vec![5, 6, 16]);
    }

    #[test]
    fn shifting_switches_to_extended_form() {
        let mut table = StackMapTable(vec![
            same(5),
            StackMapFrame {
                offset_delta: 10,
                extended: false,
                kind: FrameKind::SameLocalsOneStack(VerificationType::Uninitialized(8)),
            },
        ]);
        table.shift(Gap {
            position: 8,
            length: 60,
        });
        assert_eq!(table.offsets(), vec![5, 76]);
        assert_eq!(
            table.0[1].kind,
            FrameKind::SameLocalsOneStack(VerificationType::Uninitialized(68))
        );

        // delta of 70 no longer fits in the compact form
        let bytes = to_bytes(&table).unwrap();
        assert_eq!(bytes, vec![0, 2, 5, 247, 0, 70, 8, 0, 68]);
    }

    #[test]
    fn extended_forms_survive() {
        let bytes: Vec<u8> = vec![0, 2, 251, 0, 3, 249, 0, 1];
        let table = StackMapTable::deserialize(&mut bytes.as_slice()).unwrap();
        assert_eq!(table.0[1].kind, FrameKind::Chop(2));
        assert_eq!(to_bytes(&table).unwrap(), bytes);
    }
}
