use super::{
    copy_attributes, Attribute, AttributeBody, ConstantIndex, ConstantPool, Deserialize, Serialize,
    Utf8ConstantIndex,
};
use crate::jvm::{
    BinaryName, Error, FieldAccessFlags, FieldType, Name, ParseDescriptor, UnqualifiedName,
};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::collections::{BTreeSet, HashMap};

/// Field declared by a class or interface
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.5
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub access_flags: FieldAccessFlags,
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,
    pub attributes: Vec<Attribute>,
}

/// Attributes on fields that survive pruning
const PRUNE_KEEPS: [&str; 4] = [
    "RuntimeVisibleAnnotations",
    "RuntimeInvisibleAnnotations",
    "Signature",
    "ConstantValue",
];

impl Field {
    /// Make a new field with no attributes
    pub fn new(
        pool: &mut ConstantPool,
        access_flags: FieldAccessFlags,
        name: &str,
        descriptor: &str,
    ) -> Result<Field, Error> {
        UnqualifiedName::check_valid(name).map_err(Error::BadDescriptor)?;
        FieldType::<BinaryName>::parse(descriptor)?;
        Ok(Field {
            access_flags,
            name_index: pool.add_utf8(name)?,
            descriptor_index: pool.add_utf8(descriptor)?,
            attributes: vec![],
        })
    }

    pub fn read<R: ReadBytesExt>(reader: &mut R, pool: &ConstantPool) -> Result<Field, Error> {
        Ok(Field {
            access_flags: FieldAccessFlags::deserialize(reader)?,
            name_index: Utf8ConstantIndex::deserialize(reader)?,
            descriptor_index: Utf8ConstantIndex::deserialize(reader)?,
            attributes: Attribute::read_list(reader, pool)?,
        })
    }

    pub fn name<'p>(&self, pool: &'p ConstantPool) -> Result<&'p str, Error> {
        pool.get_utf8(self.name_index)
    }

    pub fn descriptor<'p>(&self, pool: &'p ConstantPool) -> Result<&'p str, Error> {
        pool.get_utf8(self.descriptor_index)
    }

    /// Initial value of a static field, from its `ConstantValue` attribute
    pub fn constant_value(&self) -> Option<ConstantIndex> {
        self.attributes
            .iter()
            .find_map(|attribute| match attribute.body {
                AttributeBody::ConstantValue(value) => Some(value),
                _ => None,
            })
    }

    pub fn copy(
        &self,
        from: &ConstantPool,
        to: &mut ConstantPool,
        renames: &HashMap<String, String>,
    ) -> Result<Field, Error> {
        Ok(Field {
            access_flags: self.access_flags,
            name_index: from.copy_utf8(self.name_index, to)?,
            descriptor_index: from.copy_descriptor(self.descriptor_index, to, renames)?,
            attributes: copy_attributes(&self.attributes, from, to, renames)?,
        })
    }

    pub fn rename_classes(
        &mut self,
        pool: &mut ConstantPool,
        renames: &HashMap<String, String>,
    ) -> Result<(), Error> {
        self.descriptor_index = pool.rename_descriptor_at(self.descriptor_index, renames)?;
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
        pool.collect_descriptor_classes(self.descriptor_index, out)?;
        for attribute in &self.attributes {
            attribute.collect_classes(pool, out)?;
        }
        Ok(())
    }

    /// Drop every attribute not needed to describe the field's shape
    pub(super) fn prune(&mut self, pool: &ConstantPool) {
        self.attributes.retain(|attribute| {
            attribute
                .name(pool)
                .map_or(false, |name| PRUNE_KEEPS.contains(&name))
        });
    }
}

impl Serialize for Field {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.access_flags.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn validate_on_construction() {
        let mut pool = ConstantPool::new();
        assert!(Field::new(&mut pool, FieldAccessFlags::PUBLIC, "width", "I").is_ok());
        assert!(matches!(
            Field::new(&mut pool, FieldAccessFlags::PUBLIC, "width", "Q"),
            Err(Error::BadDescriptor(_))
        ));
        assert!(matches!(
            Field::new(&mut pool, FieldAccessFlags::PUBLIC, "a.b", "I"),
            Err(Error::BadDescriptor(_))
        ));
    }
}
