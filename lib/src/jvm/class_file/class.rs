use super::attribute::{read_optional, write_optional};
use super::{
    read_bytes, remove_attributes, Attribute, AttributeBody, ClassConstantIndex, ConstantPool,
    Deserialize, Field, Method, Serialize, Version,
};
use crate::jvm::{
    same_parameters, to_internal_name, to_java_name, BinaryName, ClassAccessFlags, Error, Name,
};
use byteorder::WriteBytesExt;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::Read;
use std::path::Path;

/// Representation of the [`class` file format of the JVM][0]
///
/// The class owns its constant pool; fields, methods, and attributes hold indices into it. Class
/// names taken or returned by the methods here are Java names (`java.lang.Object`), except where
/// noted.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html
#[derive(Debug, Clone)]
pub struct ClassFile {
    version: Version,
    constants: ConstantPool,
    access_flags: ClassAccessFlags,
    this_class: ClassConstantIndex,

    /// Only `java.lang.Object` has no superclass
    super_class: Option<ClassConstantIndex>,
    interfaces: Vec<ClassConstantIndex>,
    fields: Vec<Field>,
    methods: Vec<Method>,
    attributes: Vec<Attribute>,

    /// Set after pruning and freezing: all edits are refused until the class is defrosted
    frozen: bool,
}

/// Class-level attributes that survive pruning
const PRUNE_KEEPS: [&str; 3] = [
    "RuntimeVisibleAnnotations",
    "RuntimeInvisibleAnnotations",
    "Signature",
];

impl ClassFile {
    /// Magic header bytes that go at the front of the serialized class file
    const MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

    /// Make a new empty class
    ///
    /// Classes other than interfaces get the `ACC_SUPER` flag, and every class gets a
    /// `SourceFile` attribute derived from its name.
    pub fn new(
        name: &str,
        superclass: &str,
        access_flags: ClassAccessFlags,
    ) -> Result<ClassFile, Error> {
        let name = BinaryName::from_java_name(name).map_err(Error::BadDescriptor)?;
        let superclass = BinaryName::from_java_name(superclass).map_err(Error::BadDescriptor)?;

        let mut constants = ConstantPool::new();
        let this_class = constants.add_class(name.as_str())?;
        let super_class = if name == BinaryName::OBJECT {
            None
        } else {
            Some(constants.add_class(superclass.as_str())?)
        };
        let source_file = constants.add_utf8(source_file_name(&name.to_java_name()))?;
        let attributes = vec![Attribute::new(
            &mut constants,
            AttributeBody::SourceFile(source_file),
        )?];

        let access_flags = if access_flags.contains(ClassAccessFlags::INTERFACE) {
            access_flags
        } else {
            access_flags | ClassAccessFlags::SUPER
        };

        Ok(ClassFile {
            version: Version::default(),
            constants,
            access_flags,
            this_class,
            super_class,
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            attributes,
            frozen: false,
        })
    }

    /// Parse a class file
    ///
    /// Nothing is returned unless the whole class parsed. Bytes after the end of the class are
    /// ignored (with a warning).
    pub fn parse(bytes: &[u8]) -> Result<ClassFile, Error> {
        let mut reader = bytes;
        let class = ClassFile::read(&mut reader).map_err(|err| match err {
            Error::BadConstantIndex { .. } => Error::MalformedInput(err.to_string()),
            other => other,
        })?;
        if !reader.is_empty() {
            log::warn!(
                "Ignoring {} trailing bytes after class {}",
                reader.len(),
                class.internal_name()?
            );
        }
        log::debug!(
            "Parsed class {} (version {}.{}, {} constants)",
            class.internal_name()?,
            class.version.major_version,
            class.version.minor_version,
            class.constants.len()
        );
        Ok(class)
    }

    /// Read a class file from a stream, buffering all of it before parsing
    pub fn read_from<R: Read>(reader: &mut R) -> Result<ClassFile, Error> {
        let mut bytes = vec![];
        reader.read_to_end(&mut bytes)?;
        ClassFile::parse(&bytes)
    }

    fn read(reader: &mut &[u8]) -> Result<ClassFile, Error> {
        let magic = read_bytes(reader, 4)?;
        if magic != ClassFile::MAGIC {
            return Err(Error::MalformedInput(format!(
                "bad magic number {:02X?}",
                magic
            )));
        }
        let version = Version::deserialize(reader)?;
        let constants = ConstantPool::deserialize(reader)?;
        let access_flags = ClassAccessFlags::deserialize(reader)?;
        let this_class = ClassConstantIndex::deserialize(reader)?;
        constants.get_class_name(this_class)?;
        let super_class = read_optional(reader, ClassConstantIndex)?;
        if let Some(super_class) = super_class {
            constants.get_class_name(super_class)?;
        }
        let interfaces: Vec<ClassConstantIndex> = Vec::deserialize(reader)?;
        for interface in &interfaces {
            constants.get_class_name(*interface)?;
        }

        let field_count = u16::deserialize(reader)?;
        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            let field = Field::read(reader, &constants)?;
            field.name(&constants)?;
            field.descriptor(&constants)?;
            fields.push(field);
        }

        let method_count = u16::deserialize(reader)?;
        let mut methods = Vec::with_capacity(method_count as usize);
        for _ in 0..method_count {
            let method = Method::read(reader, &constants)?;
            method.name(&constants)?;
            method.descriptor(&constants)?;
            methods.push(method);
        }

        let attributes = Attribute::read_list(reader, &constants)?;

        Ok(ClassFile {
            version,
            constants,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
            frozen: false,
        })
    }

    /// Serialize the class file into a fresh buffer
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut bytes = vec![];
        self.serialize(&mut bytes)?;
        Ok(bytes)
    }

    /// Save the class file to disk
    pub fn save_to_path<P: AsRef<Path>>(
        &self,
        path: P,
        create_missing_directories: bool,
    ) -> Result<(), Error> {
        let path = path.as_ref();
        if create_missing_directories {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
        }
        let bytes = self.to_bytes()?;
        fs::write(path, bytes)?;
        Ok(())
    }

    fn check_not_frozen(&self) -> Result<(), Error> {
        if self.frozen {
            let name = self.internal_name().unwrap_or("<unknown>");
            Err(Error::Frozen(to_java_name(name)))
        } else {
            Ok(())
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn set_version(&mut self, version: Version) -> Result<(), Error> {
        self.check_not_frozen()?;
        self.version = version;
        Ok(())
    }

    pub fn access_flags(&self) -> ClassAccessFlags {
        self.access_flags
    }

    pub fn set_access_flags(&mut self, access_flags: ClassAccessFlags) -> Result<(), Error> {
        self.check_not_frozen()?;
        self.access_flags = access_flags;
        Ok(())
    }

    pub fn constants(&self) -> &ConstantPool {
        &self.constants
    }

    pub fn constants_mut(&mut self) -> Result<&mut ConstantPool, Error> {
        self.check_not_frozen()?;
        Ok(&mut self.constants)
    }

    /// Internal name of this class (`java/lang/Object`)
    pub fn internal_name(&self) -> Result<&str, Error> {
        self.constants.get_class_name(self.this_class)
    }

    /// Java name of this class (`java.lang.Object`)
    pub fn name(&self) -> Result<String, Error> {
        self.internal_name().map(to_java_name)
    }

    /// Java name of the superclass (`None` only for `java.lang.Object`)
    pub fn superclass(&self) -> Result<Option<String>, Error> {
        match self.super_class {
            None => Ok(None),
            Some(super_class) => Ok(Some(to_java_name(
                self.constants.get_class_name(super_class)?,
            ))),
        }
    }

    /// Java names of implemented interfaces
    pub fn interfaces(&self) -> Result<Vec<String>, Error> {
        self.interfaces
            .iter()
            .map(|interface| self.constants.get_class_name(*interface).map(to_java_name))
            .collect()
    }

    pub fn add_interface(&mut self, name: &str) -> Result<(), Error> {
        self.check_not_frozen()?;
        let interface = self.constants.add_class(&to_internal_name(name))?;
        if !self.interfaces.contains(&interface) {
            self.interfaces.push(interface);
        }
        Ok(())
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Methods along with the pool they refer to, for editing method bodies
    pub fn methods_and_pool_mut(&mut self) -> Result<(&mut [Method], &mut ConstantPool), Error> {
        self.check_not_frozen()?;
        Ok((&mut self.methods, &mut self.constants))
    }

    pub fn get_field(&self, name: &str) -> Option<&Field> {
        self.fields
            .iter()
            .find(|field| field.name(&self.constants).map_or(false, |n| n == name))
    }

    pub fn get_method(&self, name: &str, descriptor: &str) -> Option<&Method> {
        self.method_index(name, descriptor)
            .map(|index| &self.methods[index])
    }

    /// Position of a method in the method list
    pub fn method_index(&self, name: &str, descriptor: &str) -> Option<usize> {
        let pool = &self.constants;
        self.methods.iter().position(|method| {
            method.name(pool).map_or(false, |n| n == name)
                && method.descriptor(pool).map_or(false, |d| d == descriptor)
        })
    }

    /// Name of the source file, from the `SourceFile` attribute
    pub fn source_file(&self) -> Result<Option<&str>, Error> {
        for attribute in &self.attributes {
            if let AttributeBody::SourceFile(file) = &attribute.body {
                return self.constants.get_utf8(*file).map(Some);
            }
        }
        Ok(None)
    }

    /// Add a field, refusing a second field of the same name
    pub fn add_field(&mut self, field: Field) -> Result<(), Error> {
        self.check_not_frozen()?;
        let name = field.name(&self.constants)?;
        for existing in &self.fields {
            if existing.name(&self.constants)? == name {
                return Err(Error::DuplicateMember {
                    name: name.to_owned(),
                    descriptor: existing.descriptor(&self.constants)?.to_owned(),
                });
            }
        }
        self.fields.push(field);
        Ok(())
    }

    /// Add a method
    ///
    /// A method with the same name and descriptor as an existing non-bridge method is a
    /// duplicate. Bridge methods with the same name and parameter types are replaced by the new
    /// method.
    pub fn add_method(&mut self, method: Method) -> Result<(), Error> {
        self.check_not_frozen()?;
        let pool = &self.constants;
        let name = method.name(pool)?;
        let descriptor = method.descriptor(pool)?;

        let mut bridges = vec![];
        for (index, existing) in self.methods.iter().enumerate() {
            if existing.name(pool)? != name {
                continue;
            }
            let existing_descriptor = existing.descriptor(pool)?;
            if existing.is_bridge() {
                if same_parameters(existing_descriptor, descriptor) {
                    bridges.push(index);
                }
            } else if existing_descriptor == descriptor {
                return Err(Error::DuplicateMember {
                    name: name.to_owned(),
                    descriptor: descriptor.to_owned(),
                });
            }
        }

        for index in bridges.into_iter().rev() {
            log::debug!("Replacing bridge method {} {}", name, descriptor);
            self.methods.remove(index);
        }
        self.methods.push(method);
        Ok(())
    }

    /// Remove a field by name
    pub fn remove_field(&mut self, name: &str) -> Result<bool, Error> {
        self.check_not_frozen()?;
        let pool = &self.constants;
        let before = self.fields.len();
        self.fields
            .retain(|field| field.name(pool).map_or(true, |n| n != name));
        Ok(self.fields.len() != before)
    }

    /// Remove a method by name and descriptor
    pub fn remove_method(&mut self, name: &str, descriptor: &str) -> Result<bool, Error> {
        self.check_not_frozen()?;
        match self.method_index(name, descriptor) {
            Some(index) => {
                self.methods.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Add a class attribute, replacing existing attributes of the same name
    pub fn add_attribute(&mut self, attribute: Attribute) -> Result<(), Error> {
        self.check_not_frozen()?;
        let name = attribute.name(&self.constants)?.to_owned();
        remove_attributes(&mut self.attributes, &self.constants, &name);
        self.attributes.push(attribute);
        Ok(())
    }

    /// Remove class attributes by name, returning how many were removed
    pub fn remove_attribute(&mut self, name: &str) -> Result<usize, Error> {
        self.check_not_frozen()?;
        Ok(remove_attributes(&mut self.attributes, &self.constants, name))
    }

    /// Rename one class everywhere in this class file
    pub fn rename_class(&mut self, old_name: &str, new_name: &str) -> Result<(), Error> {
        let renames = HashMap::from([(old_name.to_owned(), new_name.to_owned())]);
        self.rename_classes(&renames)
    }

    /// Rename classes everywhere in this class file: the pool, member descriptors, and
    /// attributes (signatures, local variable tables, annotations)
    ///
    /// Both Java names and internal names are accepted.
    pub fn rename_classes(&mut self, renames: &HashMap<String, String>) -> Result<(), Error> {
        self.check_not_frozen()?;
        let renames: HashMap<String, String> = renames
            .iter()
            .map(|(old, new)| (to_internal_name(old), to_internal_name(new)))
            .filter(|(old, new)| old != new)
            .collect();
        if renames.is_empty() {
            return Ok(());
        }

        self.constants.rename_classes(&renames)?;
        for field in &mut self.fields {
            field.rename_classes(&mut self.constants, &renames)?;
        }
        for method in &mut self.methods {
            method.rename_classes(&mut self.constants, &renames)?;
        }
        for attribute in &mut self.attributes {
            attribute.rename_classes(&mut self.constants, &renames)?;
        }
        Ok(())
    }

    /// Java names of every class referred to by this class file
    pub fn referenced_classes(&self) -> Result<BTreeSet<String>, Error> {
        let pool = &self.constants;
        let mut classes = pool.referenced_classes()?;
        for field in &self.fields {
            field.collect_classes(pool, &mut classes)?;
        }
        for method in &self.methods {
            method.collect_classes(pool, &mut classes)?;
        }
        for attribute in &self.attributes {
            attribute.collect_classes(pool, &mut classes)?;
        }
        Ok(classes.iter().map(|name| to_java_name(name)).collect())
    }

    /// Rebuild the constant pool, keeping only the constants something still refers to
    pub fn compact(&mut self) -> Result<(), Error> {
        self.check_not_frozen()?;
        let before = self.constants.len();
        self.rebuild_pool()?;
        log::debug!(
            "Compacted {} from {} to {} constants",
            self.internal_name()?,
            before,
            self.constants.len()
        );
        Ok(())
    }

    /// Discard method bodies and every attribute not needed to describe the shape of the class,
    /// then compact
    ///
    /// This can't be undone: the pruned class no longer carries enough to regenerate its
    /// bytecode.
    pub fn prune(&mut self) -> Result<(), Error> {
        self.check_not_frozen()?;
        let before = self.constants.len();
        let pool = &self.constants;
        self.attributes.retain(|attribute| {
            attribute
                .name(pool)
                .map_or(false, |name| PRUNE_KEEPS.contains(&name))
        });
        for field in &mut self.fields {
            field.prune(pool);
        }
        for method in &mut self.methods {
            method.prune(pool);
        }
        self.rebuild_pool()?;
        log::debug!(
            "Pruned {} from {} to {} constants",
            self.internal_name()?,
            before,
            self.constants.len()
        );
        Ok(())
    }

    /// Prune the class, then refuse further edits until [`ClassFile::defrost`]
    pub fn prune_and_freeze(&mut self) -> Result<(), Error> {
        self.prune()?;
        self.freeze();
        Ok(())
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn defrost(&mut self) {
        self.frozen = false;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Copy everything into a fresh pool, starting with this class, the superclass, and the
    /// interfaces
    fn rebuild_pool(&mut self) -> Result<(), Error> {
        let no_renames = HashMap::new();
        let old = &self.constants;
        let mut pool = ConstantPool::new();

        let this_class = old.copy_class(self.this_class, &mut pool, &no_renames)?;
        let super_class = match self.super_class {
            Some(super_class) => Some(old.copy_class(super_class, &mut pool, &no_renames)?),
            None => None,
        };
        let interfaces = self
            .interfaces
            .iter()
            .map(|interface| old.copy_class(*interface, &mut pool, &no_renames))
            .collect::<Result<Vec<_>, _>>()?;
        let fields = self
            .fields
            .iter()
            .map(|field| field.copy(old, &mut pool, &no_renames))
            .collect::<Result<Vec<_>, _>>()?;
        let methods = self
            .methods
            .iter()
            .map(|method| method.copy(old, &mut pool, &no_renames))
            .collect::<Result<Vec<_>, _>>()?;
        let attributes = self
            .attributes
            .iter()
            .map(|attribute| attribute.copy(old, &mut pool, &no_renames))
            .collect::<Result<Vec<_>, _>>()?;

        self.constants = pool;
        self.this_class = this_class;
        self.super_class = super_class;
        self.interfaces = interfaces;
        self.fields = fields;
        self.methods = methods;
        self.attributes = attributes;
        Ok(())
    }
}

/// `me.alec.Point$Inner` is declared in `Point.java`
fn source_file_name(java_name: &str) -> String {
    let simple_name = java_name.rsplit('.').next().unwrap_or(java_name);
    let outer_name = simple_name.split('$').next().unwrap_or(simple_name);
    format!("{}.java", outer_name)
}

impl Serialize for ClassFile {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&ClassFile::MAGIC)?;
        self.version.serialize(writer)?;
        self.constants.serialize(writer)?;
        self.access_flags.serialize(writer)?;
        self.this_class.serialize(writer)?;
        write_optional(writer, self.super_class)?;
        self.interfaces.serialize(writer)?;
        self.fields.serialize(writer)?;
        self.methods.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}
