use super::{
    copy_attributes, Attribute, AttributeBody, Code, ConstantPool, Deserialize, Serialize,
    Utf8ConstantIndex,
};
use crate::jvm::{
    BinaryName, Error, MethodAccessFlags, MethodDescriptor, Name, ParseDescriptor,
    UnqualifiedName,
};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::collections::{BTreeSet, HashMap};

/// Method declared by a class or interface
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.6
#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    pub access_flags: MethodAccessFlags,
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,
    pub attributes: Vec<Attribute>,
}

/// Attributes on methods that survive pruning
const PRUNE_KEEPS: [&str; 7] = [
    "RuntimeVisibleAnnotations",
    "RuntimeInvisibleAnnotations",
    "RuntimeVisibleParameterAnnotations",
    "RuntimeInvisibleParameterAnnotations",
    "AnnotationDefault",
    "Exceptions",
    "Signature",
];

impl Method {
    /// Make a new method with no attributes (so no body either)
    pub fn new(
        pool: &mut ConstantPool,
        access_flags: MethodAccessFlags,
        name: &str,
        descriptor: &str,
    ) -> Result<Method, Error> {
        UnqualifiedName::check_valid(name).map_err(Error::BadDescriptor)?;
        MethodDescriptor::<BinaryName>::parse(descriptor)?;
        Ok(Method {
            access_flags,
            name_index: pool.add_utf8(name)?,
            descriptor_index: pool.add_utf8(descriptor)?,
            attributes: vec![],
        })
    }

    pub fn read<R: ReadBytesExt>(reader: &mut R, pool: &ConstantPool) -> Result<Method, Error> {
        Ok(Method {
            access_flags: MethodAccessFlags::deserialize(reader)?,
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

    /// Is this a compiler-generated bridge method?
    pub fn is_bridge(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::BRIDGE)
    }

    pub fn code(&self) -> Option<&Code> {
        self.attributes
            .iter()
            .find_map(|attribute| match &attribute.body {
                AttributeBody::Code(code) => Some(code),
                _ => None,
            })
    }

    pub fn code_mut(&mut self) -> Option<&mut Code> {
        self.attributes
            .iter_mut()
            .find_map(|attribute| match &mut attribute.body {
                AttributeBody::Code(code) => Some(code),
                _ => None,
            })
    }

    /// Install a method body, replacing the current one if there is one
    pub fn set_code(&mut self, pool: &mut ConstantPool, code: Code) -> Result<(), Error> {
        match self.code_mut() {
            Some(existing) => *existing = code,
            None => self
                .attributes
                .push(Attribute::new(pool, AttributeBody::Code(code))?),
        }
        Ok(())
    }

    pub fn copy(
        &self,
        from: &ConstantPool,
        to: &mut ConstantPool,
        renames: &HashMap<String, String>,
    ) -> Result<Method, Error> {
        Ok(Method {
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

    /// Drop the body and every attribute not needed to describe the method's shape
    pub(super) fn prune(&mut self, pool: &ConstantPool) {
        self.attributes.retain(|attribute| {
            attribute
                .name(pool)
                .map_or(false, |name| PRUNE_KEEPS.contains(&name))
        });
    }
}

impl Serialize for Method {
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
    use crate::jvm::code::opcodes;

    #[test]
    fn install_and_replace_body() {
        let mut pool = ConstantPool::new();
        let mut method = Method::new(&mut pool, MethodAccessFlags::STATIC, "run", "()V").unwrap();
        assert!(method.code().is_none());

        method
            .set_code(&mut pool, Code::new(0, 0, vec![opcodes::RETURN]))
            .unwrap();
        method
            .set_code(&mut pool, Code::new(0, 0, vec![opcodes::NOP, opcodes::RETURN]))
            .unwrap();
        assert_eq!(method.attributes.len(), 1);
        assert_eq!(method.code().unwrap().code.len(), 2);

        method.prune(&pool);
        assert!(method.code().is_none());
    }

    #[test]
    fn reject_bad_descriptors() {
        let mut pool = ConstantPool::new();
        assert!(Method::new(&mut pool, MethodAccessFlags::PUBLIC, "run", "V").is_err());
        assert!(Method::new(&mut pool, MethodAccessFlags::PUBLIC, "<init>", "(I)V").is_ok());
    }
}
