use super::{read_bytes, Deserialize, Serialize};
use crate::jvm::{classes_in_signature, rename_classes_in_signature, Error};
use crate::util::{Offset, OffsetVec, Width};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Class file constants pool
///
/// Entries are 1-indexed and `long`/`double` constants take up two slots (the second one is
/// unusable). Adding a constant that is structurally equal to one already in the pool returns the
/// existing index instead of appending a copy.
///
/// Parsed pools are kept exactly as they were read, duplicates included, so that serializing them
/// again reproduces the input. When a parsed pool has duplicates, lookups resolve to the first
/// one.
#[derive(Debug, Clone)]
pub struct ConstantPool {
    constants: OffsetVec<Constant>,
    lookup: HashMap<ConstantKey, ConstantIndex>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        ConstantPool::new()
    }
}

impl ConstantPool {
    /// Make a fresh empty constants pool
    pub fn new() -> ConstantPool {
        ConstantPool {
            constants: OffsetVec::new_starting_at(Offset(1)),
            lookup: HashMap::new(),
        }
    }

    /// Number of constants in the pool (not counting unusable slots)
    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    /// Value of `constant_pool_count` in the class file (one more than the largest index)
    pub fn slot_count(&self) -> u16 {
        self.constants.offset_len().0 as u16
    }

    /// Iterate over constants along with their indices
    pub fn iter(&self) -> impl Iterator<Item = (ConstantIndex, &Constant)> + '_ {
        self.constants
            .iter()
            .map(|(offset, _, constant)| (ConstantIndex(offset.0 as u16), constant))
    }

    /// Push a constant into the constant pool, provided there is space for it
    ///
    /// Note: the largest valid index is 65534, indexing starts at 1, and some constants take two
    /// spaces.
    fn push_constant(&mut self, constant: Constant) -> Result<ConstantIndex, Error> {
        let offset: u16 = self.constants.offset_len().0 as u16;

        if offset.checked_add(constant.width() as u16).is_none() {
            return Err(Error::ConstantPoolOverflow { constant, offset });
        }

        self.constants.push(constant);
        Ok(ConstantIndex(offset))
    }

    /// Get or insert a constant
    pub fn add(&mut self, constant: Constant) -> Result<ConstantIndex, Error> {
        let key = constant.key();
        if let Some(idx) = self.lookup.get(&key) {
            return Ok(*idx);
        }
        let idx = self.push_constant(constant)?;
        self.lookup.insert(key, idx);
        Ok(idx)
    }

    /// Get or insert a utf8 constant
    pub fn add_utf8<'a, S: Into<Cow<'a, str>>>(
        &mut self,
        utf8: S,
    ) -> Result<Utf8ConstantIndex, Error> {
        let owned = utf8.into().into_owned();
        self.add(Constant::Utf8(owned)).map(Utf8ConstantIndex)
    }

    pub fn add_integer(&mut self, integer: i32) -> Result<ConstantIndex, Error> {
        self.add(Constant::Integer(integer))
    }

    pub fn add_float(&mut self, float: f32) -> Result<ConstantIndex, Error> {
        self.add(Constant::Float(float))
    }

    pub fn add_long(&mut self, long: i64) -> Result<ConstantIndex, Error> {
        self.add(Constant::Long(long))
    }

    pub fn add_double(&mut self, double: f64) -> Result<ConstantIndex, Error> {
        self.add(Constant::Double(double))
    }

    /// Get or insert a class constant from its internal name (`java/lang/Object`, or an array
    /// descriptor like `[I`)
    pub fn add_class(&mut self, name: &str) -> Result<ClassConstantIndex, Error> {
        let name = self.add_utf8(name)?;
        self.add(Constant::Class(name)).map(ClassConstantIndex)
    }

    /// Get or insert a string constant
    pub fn add_string(&mut self, string: &str) -> Result<StringConstantIndex, Error> {
        let utf8 = self.add_utf8(string)?;
        self.add(Constant::String(utf8)).map(StringConstantIndex)
    }

    /// Get or insert a name & type constant
    pub fn add_name_and_type(
        &mut self,
        name: &str,
        descriptor: &str,
    ) -> Result<NameAndTypeConstantIndex, Error> {
        let name = self.add_utf8(name)?;
        let descriptor = self.add_utf8(descriptor)?;
        self.add(Constant::NameAndType { name, descriptor })
            .map(NameAndTypeConstantIndex)
    }

    /// Get or insert a field reference
    pub fn add_field_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<FieldRefConstantIndex, Error> {
        let class = self.add_class(class)?;
        let name_and_type = self.add_name_and_type(name, descriptor)?;
        self.add(Constant::FieldRef(class, name_and_type))
            .map(FieldRefConstantIndex)
    }

    /// Get or insert a method (or interface method) reference
    pub fn add_method_ref(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> Result<MethodRefConstantIndex, Error> {
        let class = self.add_class(class)?;
        let name_and_type = self.add_name_and_type(name, descriptor)?;
        self.add(Constant::MethodRef {
            class,
            name_and_type,
            is_interface,
        })
        .map(MethodRefConstantIndex)
    }

    /// Get or insert a method handle, `member` being a field or method reference
    pub fn add_method_handle(
        &mut self,
        handle_kind: HandleKind,
        member: ConstantIndex,
    ) -> Result<ConstantIndex, Error> {
        self.add(Constant::MethodHandle {
            handle_kind,
            member,
        })
    }

    pub fn add_method_type(&mut self, descriptor: &str) -> Result<ConstantIndex, Error> {
        let descriptor = self.add_utf8(descriptor)?;
        self.add(Constant::MethodType { descriptor })
    }

    /// Get or insert an invoke dynamic constant
    pub fn add_invoke_dynamic(
        &mut self,
        bootstrap_method: u16,
        name: &str,
        descriptor: &str,
    ) -> Result<InvokeDynamicConstantIndex, Error> {
        let name_and_type = self.add_name_and_type(name, descriptor)?;
        self.add(Constant::InvokeDynamic {
            bootstrap_method,
            name_and_type,
        })
        .map(InvokeDynamicConstantIndex)
    }

    /// Get or insert a dynamically-computed constant
    pub fn add_dynamic(
        &mut self,
        bootstrap_method: u16,
        name: &str,
        descriptor: &str,
    ) -> Result<ConstantIndex, Error> {
        let name_and_type = self.add_name_and_type(name, descriptor)?;
        self.add(Constant::Dynamic {
            bootstrap_method,
            name_and_type,
        })
    }

    /// Lookup a constant
    ///
    /// Fails on index 0, indices past the end, and the unusable slot following a `long` or
    /// `double`.
    pub fn get(&self, index: impl Into<ConstantIndex>) -> Result<&Constant, Error> {
        let index: ConstantIndex = index.into();
        self.constants
            .get_offset(Offset(index.0 as usize))
            .ok()
            .ok_or(Error::BadConstantIndex {
                index: index.0,
                expected: "constant",
            })
    }

    pub fn get_utf8(&self, index: Utf8ConstantIndex) -> Result<&str, Error> {
        match self.get(index)? {
            Constant::Utf8(utf8) => Ok(utf8),
            _ => Err(index.0.mismatch("Utf8")),
        }
    }

    /// Internal name of a class constant
    pub fn get_class_name(&self, index: ClassConstantIndex) -> Result<&str, Error> {
        match self.get(index)? {
            Constant::Class(name) => self.get_utf8(*name),
            _ => Err(index.0.mismatch("Class")),
        }
    }

    pub fn get_string(&self, index: StringConstantIndex) -> Result<&str, Error> {
        match self.get(index)? {
            Constant::String(utf8) => self.get_utf8(*utf8),
            _ => Err(index.0.mismatch("String")),
        }
    }

    pub fn get_integer(&self, index: ConstantIndex) -> Result<i32, Error> {
        match self.get(index)? {
            Constant::Integer(integer) => Ok(*integer),
            _ => Err(index.mismatch("Integer")),
        }
    }

    pub fn get_float(&self, index: ConstantIndex) -> Result<f32, Error> {
        match self.get(index)? {
            Constant::Float(float) => Ok(*float),
            _ => Err(index.mismatch("Float")),
        }
    }

    pub fn get_long(&self, index: ConstantIndex) -> Result<i64, Error> {
        match self.get(index)? {
            Constant::Long(long) => Ok(*long),
            _ => Err(index.mismatch("Long")),
        }
    }

    pub fn get_double(&self, index: ConstantIndex) -> Result<f64, Error> {
        match self.get(index)? {
            Constant::Double(double) => Ok(*double),
            _ => Err(index.mismatch("Double")),
        }
    }

    /// Name and descriptor of a name & type constant
    pub fn get_name_and_type(
        &self,
        index: NameAndTypeConstantIndex,
    ) -> Result<(&str, &str), Error> {
        match self.get(index)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.get_utf8(*name)?, self.get_utf8(*descriptor)?))
            }
            _ => Err(index.0.mismatch("NameAndType")),
        }
    }

    /// Resolve a field, method, or interface method reference
    pub fn get_member_ref(&self, index: ConstantIndex) -> Result<MemberRef<'_>, Error> {
        let (kind, class, name_and_type) = match self.get(index)? {
            Constant::FieldRef(class, name_and_type) => (MemberKind::Field, class, name_and_type),
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface: false,
            } => (MemberKind::Method, class, name_and_type),
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface: true,
            } => (MemberKind::InterfaceMethod, class, name_and_type),
            _ => return Err(index.mismatch("Fieldref or Methodref")),
        };
        let (name, descriptor) = self.get_name_and_type(*name_and_type)?;
        Ok(MemberRef {
            kind,
            class: self.get_class_name(*class)?,
            name,
            descriptor,
        })
    }

    /// Bootstrap method index, name, and descriptor of an invoke dynamic constant
    pub fn get_invoke_dynamic(
        &self,
        index: InvokeDynamicConstantIndex,
    ) -> Result<(u16, &str, &str), Error> {
        match self.get(index)? {
            Constant::InvokeDynamic {
                bootstrap_method,
                name_and_type,
            } => {
                let (name, descriptor) = self.get_name_and_type(*name_and_type)?;
                Ok((*bootstrap_method, name, descriptor))
            }
            _ => Err(index.0.mismatch("InvokeDynamic")),
        }
    }

    /// Rename a class everywhere the pool refers to it
    ///
    /// This covers class constants (including array class constants) and the descriptors of name
    /// & type and method type constants. Names are internal names (`java/lang/Object`). Renamed
    /// strings are added as fresh utf8 constants, since the old ones may be shared with unrelated
    /// string literals.
    pub fn rename_class(&mut self, old_name: &str, new_name: &str) -> Result<(), Error> {
        self.rename_classes_with(|name| {
            if name == old_name {
                Some(new_name.to_owned())
            } else {
                None
            }
        })
    }

    /// Rename several classes in one pass (see [`ConstantPool::rename_class`])
    pub fn rename_classes(&mut self, renames: &HashMap<String, String>) -> Result<(), Error> {
        if renames.is_empty() {
            return Ok(());
        }
        self.rename_classes_with(|name| renames.get(name).cloned())
    }

    fn rename_classes_with(
        &mut self,
        mut rename: impl FnMut(&str) -> Option<String>,
    ) -> Result<(), Error> {
        let mut changes: Vec<(Offset, String)> = vec![];
        for (offset, _, constant) in &self.constants {
            let renamed = match constant {
                Constant::Class(name) => rename_class_name(self.get_utf8(*name)?, &mut rename)?,
                Constant::NameAndType { descriptor, .. } | Constant::MethodType { descriptor } => {
                    let descriptor = self.get_utf8(*descriptor)?;
                    let renamed = rename_classes_in_signature(descriptor, &mut rename)?;
                    Some(renamed).filter(|renamed| renamed != descriptor)
                }
                _ => None,
            };
            if let Some(renamed) = renamed {
                changes.push((offset, renamed));
            }
        }
        if changes.is_empty() {
            return Ok(());
        }

        for (offset, renamed) in changes {
            let utf8 = self.add_utf8(renamed)?;
            match self.constants.get_offset_mut(offset) {
                Some(Constant::Class(name)) => *name = utf8,
                Some(Constant::NameAndType { descriptor, .. })
                | Some(Constant::MethodType { descriptor }) => *descriptor = utf8,
                _ => (),
            }
        }
        self.rebuild_lookup();
        Ok(())
    }

    fn rebuild_lookup(&mut self) {
        self.lookup.clear();
        for (offset, _, constant) in &self.constants {
            self.lookup
                .entry(constant.key())
                .or_insert(ConstantIndex(offset.0 as u16));
        }
    }

    /// Copy a constant (and everything it refers to) into another pool
    ///
    /// Class names in class constants and in name & type or method type descriptors are renamed
    /// according to `renames` along the way.
    pub fn copy_constant(
        &self,
        index: impl Into<ConstantIndex>,
        dest: &mut ConstantPool,
        renames: &HashMap<String, String>,
    ) -> Result<ConstantIndex, Error> {
        let copied = match self.get(index)? {
            Constant::Utf8(utf8) => Constant::Utf8(utf8.clone()),
            Constant::Integer(integer) => Constant::Integer(*integer),
            Constant::Float(float) => Constant::Float(*float),
            Constant::Long(long) => Constant::Long(*long),
            Constant::Double(double) => Constant::Double(*double),
            Constant::Class(name) => {
                let name = self.get_utf8(*name)?;
                let renamed = rename_class_name(name, |class| renames.get(class).cloned())?;
                Constant::Class(dest.add_utf8(renamed.as_deref().unwrap_or(name))?)
            }
            Constant::String(utf8) => Constant::String(dest.add_utf8(self.get_utf8(*utf8)?)?),
            Constant::FieldRef(class, name_and_type) => Constant::FieldRef(
                ClassConstantIndex(self.copy_constant(*class, dest, renames)?),
                NameAndTypeConstantIndex(self.copy_constant(*name_and_type, dest, renames)?),
            ),
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => Constant::MethodRef {
                class: ClassConstantIndex(self.copy_constant(*class, dest, renames)?),
                name_and_type: NameAndTypeConstantIndex(self.copy_constant(
                    *name_and_type,
                    dest,
                    renames,
                )?),
                is_interface: *is_interface,
            },
            Constant::NameAndType { name, descriptor } => {
                let name = dest.add_utf8(self.get_utf8(*name)?)?;
                let descriptor = rename_descriptor(self.get_utf8(*descriptor)?, renames)?;
                Constant::NameAndType {
                    name,
                    descriptor: dest.add_utf8(descriptor)?,
                }
            }
            Constant::MethodHandle {
                handle_kind,
                member,
            } => Constant::MethodHandle {
                handle_kind: *handle_kind,
                member: self.copy_constant(*member, dest, renames)?,
            },
            Constant::MethodType { descriptor } => {
                let descriptor = rename_descriptor(self.get_utf8(*descriptor)?, renames)?;
                Constant::MethodType {
                    descriptor: dest.add_utf8(descriptor)?,
                }
            }
            Constant::InvokeDynamic {
                bootstrap_method,
                name_and_type,
            } => Constant::InvokeDynamic {
                bootstrap_method: *bootstrap_method,
                name_and_type: NameAndTypeConstantIndex(self.copy_constant(
                    *name_and_type,
                    dest,
                    renames,
                )?),
            },
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            } => Constant::Dynamic {
                bootstrap_method: *bootstrap_method,
                name_and_type: NameAndTypeConstantIndex(self.copy_constant(
                    *name_and_type,
                    dest,
                    renames,
                )?),
            },
            Constant::Module(name) => Constant::Module(dest.add_utf8(self.get_utf8(*name)?)?),
            Constant::Package(name) => Constant::Package(dest.add_utf8(self.get_utf8(*name)?)?),
        };
        dest.add(copied)
    }

    /// Build a new pool containing only the constants reachable from `roots`
    ///
    /// Roots are copied in order (each one preceded by whatever it refers to), so the numbering
    /// of the result is stable for a given root order. The returned map sends each root's old
    /// index to its new one.
    pub fn compact(
        &self,
        roots: impl IntoIterator<Item = ConstantIndex>,
    ) -> Result<(ConstantPool, HashMap<ConstantIndex, ConstantIndex>), Error> {
        let no_renames = HashMap::new();
        let mut compacted = ConstantPool::new();
        let mut remapping = HashMap::new();
        for root in roots {
            let new_index = self.copy_constant(root, &mut compacted, &no_renames)?;
            remapping.insert(root, new_index);
        }
        log::debug!(
            "Compacted constant pool from {} to {} entries",
            self.len(),
            compacted.len()
        );
        Ok((compacted, remapping))
    }

    pub fn copy_utf8(
        &self,
        index: Utf8ConstantIndex,
        dest: &mut ConstantPool,
    ) -> Result<Utf8ConstantIndex, Error> {
        dest.add_utf8(self.get_utf8(index)?)
    }

    pub fn copy_class(
        &self,
        index: ClassConstantIndex,
        dest: &mut ConstantPool,
        renames: &HashMap<String, String>,
    ) -> Result<ClassConstantIndex, Error> {
        self.copy_constant(index, dest, renames)
            .map(ClassConstantIndex)
    }

    /// Copy a utf8 constant holding a descriptor or signature, renaming classes in it
    pub fn copy_descriptor(
        &self,
        index: Utf8ConstantIndex,
        dest: &mut ConstantPool,
        renames: &HashMap<String, String>,
    ) -> Result<Utf8ConstantIndex, Error> {
        let descriptor = rename_descriptor(self.get_utf8(index)?, renames)?;
        dest.add_utf8(descriptor)
    }

    /// Rename classes in the descriptor or signature at `index`
    ///
    /// The existing utf8 constant is left untouched: if anything changed, the index of a new
    /// constant holding the renamed text is returned.
    pub fn rename_descriptor_at(
        &mut self,
        index: Utf8ConstantIndex,
        renames: &HashMap<String, String>,
    ) -> Result<Utf8ConstantIndex, Error> {
        let descriptor = self.get_utf8(index)?;
        let renamed = rename_descriptor(descriptor, renames)?;
        if renamed == descriptor {
            return Ok(index);
        }
        let renamed = renamed.into_owned();
        self.add_utf8(renamed)
    }

    /// Add the classes mentioned by the descriptor or signature at `index` to `out`
    pub fn collect_descriptor_classes(
        &self,
        index: Utf8ConstantIndex,
        out: &mut BTreeSet<String>,
    ) -> Result<(), Error> {
        out.extend(classes_in_signature(self.get_utf8(index)?)?);
        Ok(())
    }

    /// Internal names of every class mentioned by a class constant
    ///
    /// Array class constants contribute their element class, if any.
    pub fn referenced_classes(&self) -> Result<BTreeSet<String>, Error> {
        let mut classes = BTreeSet::new();
        for (_, constant) in self.iter() {
            if let Constant::Class(name) = constant {
                let name = self.get_utf8(*name)?;
                if name.starts_with('[') {
                    classes.extend(classes_in_signature(name)?);
                } else {
                    classes.insert(name.to_owned());
                }
            }
        }
        Ok(classes)
    }

    /// Check that every constant refers to constants of the right kind
    fn check_references(&self) -> Result<(), Error> {
        for (_, constant) in self.iter() {
            match constant {
                Constant::Class(utf8)
                | Constant::String(utf8)
                | Constant::Module(utf8)
                | Constant::Package(utf8)
                | Constant::MethodType { descriptor: utf8 } => {
                    self.get_utf8(*utf8)?;
                }
                Constant::FieldRef(class, name_and_type)
                | Constant::MethodRef {
                    class,
                    name_and_type,
                    ..
                } => {
                    self.get_class_name(*class)?;
                    self.get_name_and_type(*name_and_type)?;
                }
                Constant::NameAndType { .. } => {
                    self.get_name_and_type(NameAndTypeConstantIndex(
                        self.lookup_index(constant),
                    ))?;
                }
                Constant::MethodHandle { member, .. } => {
                    self.get_member_ref(*member)?;
                }
                Constant::InvokeDynamic { name_and_type, .. }
                | Constant::Dynamic { name_and_type, .. } => {
                    self.get_name_and_type(*name_and_type)?;
                }
                Constant::Utf8(_)
                | Constant::Integer(_)
                | Constant::Float(_)
                | Constant::Long(_)
                | Constant::Double(_) => (),
            }
        }
        Ok(())
    }

    /// Index under which a constant present in the pool is found
    fn lookup_index(&self, constant: &Constant) -> ConstantIndex {
        self.lookup
            .get(&constant.key())
            .copied()
            .unwrap_or(ConstantIndex(0))
    }
}

/// Rename a class constant's name, which is either an internal name or an array descriptor
fn rename_class_name(
    name: &str,
    mut rename: impl FnMut(&str) -> Option<String>,
) -> Result<Option<String>, Error> {
    if name.starts_with('[') {
        let renamed = rename_classes_in_signature(name, &mut rename)?;
        Ok(Some(renamed).filter(|renamed| renamed != name))
    } else {
        Ok(rename(name))
    }
}

/// Rename classes inside a descriptor or signature according to a map of internal names
pub fn rename_descriptor<'a>(
    descriptor: &'a str,
    renames: &HashMap<String, String>,
) -> Result<Cow<'a, str>, Error> {
    if renames.is_empty() {
        Ok(Cow::Borrowed(descriptor))
    } else {
        rename_classes_in_signature(descriptor, |name| renames.get(name).cloned()).map(Cow::Owned)
    }
}

impl Serialize for ConstantPool {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.slot_count().serialize(writer)?;
        for (_, _, constant) in &self.constants {
            constant.serialize(writer)?;
        }
        Ok(())
    }
}

impl Deserialize for ConstantPool {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let count = u16::deserialize(reader)?;
        if count == 0 {
            return Err(Error::MalformedInput(String::from(
                "constant pool count must be at least 1",
            )));
        }

        let mut pool = ConstantPool::new();
        while pool.slot_count() < count {
            let constant = Constant::deserialize(reader)?;
            let offset = pool.slot_count();
            if offset as usize + constant.width() > count as usize {
                return Err(Error::MalformedInput(format!(
                    "constant at #{} overruns the constant pool",
                    offset
                )));
            }
            let key = constant.key();
            pool.constants.push(constant);
            pool.lookup.entry(key).or_insert(ConstantIndex(offset));
        }

        pool.check_references()
            .map_err(|err| Error::MalformedInput(err.to_string()))?;
        Ok(pool)
    }
}

/// Constants as in the constant pool
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Class or an interface
    Class(Utf8ConstantIndex),

    /// Field
    FieldRef(ClassConstantIndex, NameAndTypeConstantIndex),

    /// Method (this combines `Methodref` and `InterfaceMethodref`)
    MethodRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
        is_interface: bool,
    },

    /// Constant object of type `java.lang.String`
    String(Utf8ConstantIndex),

    /// Constant primitive of type `int`
    Integer(i32),

    /// Constant primitive of type `float`
    Float(f32),

    /// Constant primitive of type `long`
    Long(i64),

    /// Constant primitive of type `double`
    Double(f64),

    /// Name and a type (eg. for a field or a method)
    NameAndType {
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    },

    /// Constant UTF-8 encoded raw string value
    ///
    /// Despite the name, the encoding is not quite UTF-8 (the encoding of the
    /// null character `\u{0000}` and the encoding of supplementary characters
    /// is different).
    Utf8(String),

    /// Constant object of type `java.lang.invoke.MethodHandle`
    MethodHandle {
        handle_kind: HandleKind,

        /// Depending on the method kind, this points to different things:
        ///
        ///   - `FieldRef` for `GetField`, `GetStatic`, `PutField`, `PutStatic`
        ///   - `MethodRef` for the rest
        member: ConstantIndex,
    },

    /// Method type
    MethodType { descriptor: Utf8ConstantIndex },

    /// Dynamically-computed constant
    Dynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    },

    /// Dynamically-computed call site
    InvokeDynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    },

    Module(Utf8ConstantIndex),
    Package(Utf8ConstantIndex),
}

/// Hashable identity of a constant, used for deduplication
///
/// Floating point constants are compared by bit pattern, so `NaN` constants deduplicate and `0.0`
/// and `-0.0` stay distinct.
#[derive(Clone, Hash, PartialEq, Eq, Debug)]
enum ConstantKey {
    Utf8(String),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16, bool),
    NameAndType(u16, u16),
    MethodHandle(HandleKind, u16),
    MethodType(u16),
    Dynamic(u16, u16),
    InvokeDynamic(u16, u16),
    Module(u16),
    Package(u16),
}

impl Constant {
    fn key(&self) -> ConstantKey {
        match self {
            Constant::Utf8(utf8) => ConstantKey::Utf8(utf8.clone()),
            Constant::Integer(integer) => ConstantKey::Integer(*integer),
            Constant::Float(float) => ConstantKey::Float(float.to_bits()),
            Constant::Long(long) => ConstantKey::Long(*long),
            Constant::Double(double) => ConstantKey::Double(double.to_bits()),
            Constant::Class(name) => ConstantKey::Class(name.0 .0),
            Constant::String(utf8) => ConstantKey::String(utf8.0 .0),
            Constant::FieldRef(class, name_and_type) => {
                ConstantKey::FieldRef(class.0 .0, name_and_type.0 .0)
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => ConstantKey::MethodRef(class.0 .0, name_and_type.0 .0, *is_interface),
            Constant::NameAndType { name, descriptor } => {
                ConstantKey::NameAndType(name.0 .0, descriptor.0 .0)
            }
            Constant::MethodHandle {
                handle_kind,
                member,
            } => ConstantKey::MethodHandle(*handle_kind, member.0),
            Constant::MethodType { descriptor } => ConstantKey::MethodType(descriptor.0 .0),
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            } => ConstantKey::Dynamic(*bootstrap_method, name_and_type.0 .0),
            Constant::InvokeDynamic {
                bootstrap_method,
                name_and_type,
            } => ConstantKey::InvokeDynamic(*bootstrap_method, name_and_type.0 .0),
            Constant::Module(name) => ConstantKey::Module(name.0 .0),
            Constant::Package(name) => ConstantKey::Package(name.0 .0),
        }
    }
}

impl Serialize for Constant {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            Constant::Utf8(string) => {
                1u8.serialize(writer)?;
                let buffer: Vec<u8> = encode_modified_utf8(string);
                let len = u16::try_from(buffer.len()).map_err(|_| {
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "utf8 constant longer than 65535 bytes",
                    )
                })?;
                len.serialize(writer)?;
                writer.write_all(&buffer)?;
            }
            Constant::Integer(integer) => {
                3u8.serialize(writer)?;
                integer.serialize(writer)?;
            }
            Constant::Float(float) => {
                4u8.serialize(writer)?;
                float.serialize(writer)?;
            }
            Constant::Long(long) => {
                5u8.serialize(writer)?;
                long.serialize(writer)?;
            }
            Constant::Double(double) => {
                6u8.serialize(writer)?;
                double.serialize(writer)?;
            }
            Constant::Class(name) => {
                7u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::String(bytes) => {
                8u8.serialize(writer)?;
                bytes.serialize(writer)?;
            }
            Constant::FieldRef(class, name_and_type) => {
                9u8.serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                (if !is_interface { 10u8 } else { 11u8 }).serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::NameAndType { name, descriptor } => {
                12u8.serialize(writer)?;
                name.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::MethodHandle {
                handle_kind,
                member,
            } => {
                15u8.serialize(writer)?;
                handle_kind.serialize(writer)?;
                member.serialize(writer)?;
            }
            Constant::MethodType { descriptor } => {
                16u8.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            } => {
                17u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::InvokeDynamic {
                bootstrap_method,
                name_and_type,
            } => {
                18u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::Module(name) => {
                19u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::Package(name) => {
                20u8.serialize(writer)?;
                name.serialize(writer)?;
            }
        };
        Ok(())
    }
}

impl Deserialize for Constant {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let constant = match u8::deserialize(reader)? {
            1 => {
                let len = u16::deserialize(reader)?;
                let bytes = read_bytes(reader, len as usize)?;
                Constant::Utf8(decode_modified_utf8(&bytes)?)
            }
            3 => Constant::Integer(i32::deserialize(reader)?),
            4 => Constant::Float(f32::deserialize(reader)?),
            5 => Constant::Long(i64::deserialize(reader)?),
            6 => Constant::Double(f64::deserialize(reader)?),
            7 => Constant::Class(Utf8ConstantIndex::deserialize(reader)?),
            8 => Constant::String(Utf8ConstantIndex::deserialize(reader)?),
            9 => Constant::FieldRef(
                ClassConstantIndex::deserialize(reader)?,
                NameAndTypeConstantIndex::deserialize(reader)?,
            ),
            tag @ (10 | 11) => Constant::MethodRef {
                class: ClassConstantIndex::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
                is_interface: tag == 11,
            },
            12 => Constant::NameAndType {
                name: Utf8ConstantIndex::deserialize(reader)?,
                descriptor: Utf8ConstantIndex::deserialize(reader)?,
            },
            15 => Constant::MethodHandle {
                handle_kind: HandleKind::deserialize(reader)?,
                member: ConstantIndex::deserialize(reader)?,
            },
            16 => Constant::MethodType {
                descriptor: Utf8ConstantIndex::deserialize(reader)?,
            },
            17 => Constant::Dynamic {
                bootstrap_method: u16::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
            },
            18 => Constant::InvokeDynamic {
                bootstrap_method: u16::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
            },
            19 => Constant::Module(Utf8ConstantIndex::deserialize(reader)?),
            20 => Constant::Package(Utf8ConstantIndex::deserialize(reader)?),
            tag => {
                return Err(Error::MalformedInput(format!(
                    "unknown constant pool tag {}",
                    tag
                )))
            }
        };
        Ok(constant)
    }
}

/// Modified UTF-8 format used in class files.
///
/// See [this `DataInput` section for details][0]. Quoting from that section:
///
/// > The differences between this format and the standard UTF-8 format are the following:
/// >
/// >  * The null byte `\u0000` is encoded in 2-byte format rather than 1-byte, so that the encoded
/// >    strings never have embedded nulls.
/// >  * Only the 1-byte, 2-byte, and 3-byte formats are used.
/// >  * Supplementary characters are represented in the form of surrogate pairs.
///
/// [0]: https://docs.oracle.com/en/java/javase/17/docs/api/java.base/java/io/DataInput.html#modified-utf-8
pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    let mut buffer: Vec<u8> = vec![];
    for c in string.chars() {
        // Handle the exception for how `\u{0000}` is represented
        let len: usize = if c == '\u{0000}' { 2 } else { c.len_utf8() };
        let code: u32 = c as u32;

        match len {
            1 => buffer.push(code as u8),
            2 => {
                buffer.push((code >> 6 & 0x1F) as u8 | 0b1100_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
            3 => {
                buffer.push((code >> 12 & 0x0F) as u8 | 0b1110_0000);
                buffer.push((code >> 6 & 0x3F) as u8 | 0b1000_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }

            // Supplementary characters: main divergence from unicode
            _ => {
                buffer.push(0b1110_1101);
                buffer.push(((code >> 16 & 0x0F) as u8).wrapping_sub(1) & 0x0F | 0b1010_0000);
                buffer.push((code >> 10 & 0x3F) as u8 | 0b1000_0000);

                buffer.push(0b1110_1101);
                buffer.push(((code >> 6 & 0x0F) as u8) | 0b1011_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
        }
    }
    buffer
}

/// Inverse of [`encode_modified_utf8`]
///
/// Surrogate pairs are recombined into supplementary characters. Unpaired surrogates have no
/// `char` representation and are rejected.
pub fn decode_modified_utf8(bytes: &[u8]) -> Result<String, Error> {
    fn malformed(at: usize) -> Error {
        Error::MalformedInput(format!("invalid modified UTF-8 at byte {}", at))
    }

    // Decode one 1-3 byte unit into a UTF-16 code unit
    fn unit(bytes: &[u8], at: usize) -> Result<(u32, usize), Error> {
        let continuation = |i: usize| -> Result<u32, Error> {
            match bytes.get(i) {
                Some(b) if b & 0xC0 == 0x80 => Ok((b & 0x3F) as u32),
                _ => Err(malformed(i)),
            }
        };
        let b0 = bytes[at];
        if b0 & 0x80 == 0 {
            Ok((b0 as u32, 1))
        } else if b0 & 0xE0 == 0xC0 {
            Ok((((b0 & 0x1F) as u32) << 6 | continuation(at + 1)?, 2))
        } else if b0 & 0xF0 == 0xE0 {
            let code =
                ((b0 & 0x0F) as u32) << 12 | continuation(at + 1)? << 6 | continuation(at + 2)?;
            Ok((code, 3))
        } else {
            Err(malformed(at))
        }
    }

    let mut string = String::with_capacity(bytes.len());
    let mut at = 0;
    while at < bytes.len() {
        let (code, len) = unit(bytes, at)?;
        let code = match code {
            0xD800..=0xDBFF => {
                let (low, low_len) = if at + len < bytes.len() {
                    unit(bytes, at + len)?
                } else {
                    return Err(malformed(at));
                };
                if !(0xDC00..=0xDFFF).contains(&low) {
                    return Err(malformed(at + len));
                }
                at += low_len;
                0x10000 + ((code - 0xD800) << 10) + (low - 0xDC00)
            }
            0xDC00..=0xDFFF => return Err(malformed(at)),
            _ => code,
        };
        string.push(char::from_u32(code).ok_or_else(|| malformed(at))?);
        at += len;
    }
    Ok(string)
}

/// Almost all constants have width 1, except for `Constant::Long` and `Constant::Double`. Quoting
/// the JVM specification:
///
/// > All 8-byte constants take up two entries in the constant_pool table of the class file. If a
/// > CONSTANT_Long_info or CONSTANT_Double_info structure is the item in the constant_pool table
/// > at index n, then the next usable item in the pool is located at index n+2. The constant_pool
/// > index n+1 must be valid but is considered unusable.
/// >
/// > In retrospect, making 8-byte constants take two constant pool entries was a poor choice.
impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct ConstantIndex(pub u16);

impl ConstantIndex {
    fn mismatch(self, expected: &'static str) -> Error {
        Error::BadConstantIndex {
            index: self.0,
            expected,
        }
    }
}

impl fmt::Display for ConstantIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl Serialize for ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for ConstantIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        u16::deserialize(reader).map(ConstantIndex)
    }
}

/// Indices that are known to point at a particular kind of constant
macro_rules! typed_index {
    ($($name:ident),* $(,)?) => {
        $(
            #[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Debug)]
            pub struct $name(pub ConstantIndex);

            impl From<$name> for ConstantIndex {
                fn from(index: $name) -> ConstantIndex {
                    index.0
                }
            }

            impl Serialize for $name {
                fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
                    self.0.serialize(writer)
                }
            }

            impl Deserialize for $name {
                fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
                    ConstantIndex::deserialize(reader).map($name)
                }
            }
        )*
    };
}

typed_index!(
    Utf8ConstantIndex,
    StringConstantIndex,
    NameAndTypeConstantIndex,
    ClassConstantIndex,
    FieldRefConstantIndex,
    MethodRefConstantIndex,
    InvokeDynamicConstantIndex,
);

/// Kind of member reference
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum MemberKind {
    Field,
    Method,
    InterfaceMethod,
}

/// Resolved field or method reference
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MemberRef<'a> {
    pub kind: MemberKind,

    /// Internal name of the class declaring the member
    pub class: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
}

/// Type of method handle
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-5.html#jvms-5.4.3.5-220
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum HandleKind {
    GetField,
    GetStatic,
    PutField,
    PutStatic,
    InvokeVirtual,
    InvokeStatic,
    InvokeSpecial,
    NewInvokeSpecial,
    InvokeInterface,
}

impl Serialize for HandleKind {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        let byte: u8 = match self {
            HandleKind::GetField => 1,
            HandleKind::GetStatic => 2,
            HandleKind::PutField => 3,
            HandleKind::PutStatic => 4,
            HandleKind::InvokeVirtual => 5,
            HandleKind::InvokeStatic => 6,
            HandleKind::InvokeSpecial => 7,
            HandleKind::NewInvokeSpecial => 8,
            HandleKind::InvokeInterface => 9,
        };
        byte.serialize(writer)
    }
}

impl Deserialize for HandleKind {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let kind = match u8::deserialize(reader)? {
            1 => HandleKind::GetField,
            2 => HandleKind::GetStatic,
            3 => HandleKind::PutField,
            4 => HandleKind::PutStatic,
            5 => HandleKind::InvokeVirtual,
            6 => HandleKind::InvokeStatic,
            7 => HandleKind::InvokeSpecial,
            8 => HandleKind::NewInvokeSpecial,
            9 => HandleKind::InvokeInterface,
            other => {
                return Err(Error::MalformedInput(format!(
                    "unknown method handle kind {}",
                    other
                )))
            }
        };
        Ok(kind)
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn dedup_returns_existing_index() {
        let mut pool = ConstantPool::new();
        let first = pool.add_method_ref("a/B", "run", "()V", false).unwrap();
        let len = pool.len();
        let second = pool.add_method_ref("a/B", "run", "()V", false).unwrap();
        assert_eq!(first, second);
        assert_eq!(pool.len(), len);

        // interface and class method refs are different constants
        let interface = pool.add_method_ref("a/B", "run", "()V", true).unwrap();
        assert_ne!(first, interface);

        assert_eq!(pool.add_float(f32::NAN).unwrap(), pool.add_float(f32::NAN).unwrap());
        assert_ne!(pool.add_double(0.0).unwrap(), pool.add_double(-0.0).unwrap());
    }

    #[test]
    fn wide_constants_take_two_slots() {
        let mut pool = ConstantPool::new();
        let long = pool.add_long(42).unwrap();
        let after = pool.add_integer(7).unwrap();
        assert_eq!(long, ConstantIndex(1));
        assert_eq!(after, ConstantIndex(3));
        assert_eq!(pool.slot_count(), 4);
        assert_eq!(pool.get_long(long).unwrap(), 42);

        assert!(matches!(
            pool.get(ConstantIndex(2)),
            Err(Error::BadConstantIndex { index: 2, .. })
        ));
        assert!(pool.get(ConstantIndex(0)).is_err());
        assert!(pool.get(ConstantIndex(4)).is_err());
        assert!(matches!(
            pool.get_utf8(Utf8ConstantIndex(after)),
            Err(Error::BadConstantIndex {
                expected: "Utf8",
                ..
            })
        ));
    }

    #[test]
    fn resolve_member_refs() {
        let mut pool = ConstantPool::new();
        let field = pool.add_field_ref("a/B", "count", "I").unwrap();
        let member = pool.get_member_ref(field.0).unwrap();
        assert_eq!(
            member,
            MemberRef {
                kind: MemberKind::Field,
                class: "a/B",
                name: "count",
                descriptor: "I",
            }
        );
    }

    #[test]
    fn rename_is_idempotent_and_reversible() {
        let mut pool = ConstantPool::new();
        let class = pool.add_class("a/A").unwrap();
        let array = pool.add_class("[La/A;").unwrap();
        let method = pool.add_method_ref("c/C", "make", "(La/A;)[La/A;", false).unwrap();
        let literal = pool.add_string("a/A").unwrap();

        pool.rename_class("a/A", "b/B").unwrap();
        assert_eq!(pool.get_class_name(class).unwrap(), "b/B");
        assert_eq!(pool.get_class_name(array).unwrap(), "[Lb/B;");
        assert_eq!(
            pool.get_member_ref(method.0).unwrap().descriptor,
            "(Lb/B;)[Lb/B;"
        );
        // string literals are not class references
        assert_eq!(pool.get_string(literal).unwrap(), "a/A");

        let len = pool.len();
        pool.rename_class("a/A", "b/B").unwrap();
        assert_eq!(pool.len(), len);

        pool.rename_class("b/B", "a/A").unwrap();
        assert_eq!(pool.get_class_name(class).unwrap(), "a/A");
        assert_eq!(pool.get_class_name(array).unwrap(), "[La/A;");
        assert_eq!(
            pool.get_member_ref(method.0).unwrap().descriptor,
            "(La/A;)[La/A;"
        );
    }

    #[test]
    fn batch_rename() {
        let mut pool = ConstantPool::new();
        let a = pool.add_class("a/A").unwrap();
        let b = pool.add_class("b/B").unwrap();
        let renames: HashMap<String, String> = [("a/A", "b/B"), ("b/B", "a/A")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        pool.rename_classes(&renames).unwrap();
        assert_eq!(pool.get_class_name(a).unwrap(), "b/B");
        assert_eq!(pool.get_class_name(b).unwrap(), "a/A");
    }

    #[test]
    fn compact_keeps_only_reachable_constants() {
        let mut pool = ConstantPool::new();
        pool.add_string("unused").unwrap();
        pool.add_long(1).unwrap();
        let method = pool.add_method_ref("a/B", "run", "()V", false).unwrap();

        let (compacted, remapping) = pool.compact(vec![method.0]).unwrap();
        // Utf8 a/B, Class, Utf8 run, Utf8 ()V, NameAndType, Methodref
        assert_eq!(compacted.len(), 6);
        let new_method = remapping[&method.0];
        assert_eq!(
            compacted.get_member_ref(new_method).unwrap(),
            pool.get_member_ref(method.0).unwrap()
        );

        // compacting again changes nothing and adding again deduplicates
        let (again, _) = compacted.compact(vec![new_method]).unwrap();
        assert_eq!(again.len(), 6);
        let mut compacted = compacted;
        assert_eq!(
            compacted.add_method_ref("a/B", "run", "()V", false).unwrap().0,
            new_method
        );
    }

    #[test]
    fn copy_with_renames() {
        let mut pool = ConstantPool::new();
        let handle_target = pool.add_method_ref("a/A", "of", "(La/A;)V", false).unwrap();
        let handle = pool
            .add_method_handle(HandleKind::InvokeStatic, handle_target.0)
            .unwrap();

        let renames: HashMap<String, String> =
            [(String::from("a/A"), String::from("z/Z"))].into_iter().collect();
        let mut dest = ConstantPool::new();
        let copied = pool.copy_constant(handle, &mut dest, &renames).unwrap();
        match dest.get(copied).unwrap() {
            Constant::MethodHandle { member, .. } => {
                let member = dest.get_member_ref(*member).unwrap();
                assert_eq!(member.class, "z/Z");
                assert_eq!(member.descriptor, "(Lz/Z;)V");
            }
            other => panic!("expected method handle, got {:?}", other),
        }
    }

    #[test]
    fn parse_keeps_duplicates() {
        let mut bytes = vec![];
        4u16.serialize(&mut bytes).unwrap();
        for _ in 0..2 {
            Constant::Utf8(String::from("x")).serialize(&mut bytes).unwrap();
        }
        Constant::Class(Utf8ConstantIndex(ConstantIndex(2)))
            .serialize(&mut bytes)
            .unwrap();

        let pool = ConstantPool::deserialize(&mut bytes.as_slice()).unwrap();
        assert_eq!(pool.len(), 3);
        assert_eq!(super::super::to_bytes(&pool).unwrap(), bytes);

        // lookups go to the first copy
        let mut pool = pool;
        assert_eq!(pool.add_utf8("x").unwrap(), Utf8ConstantIndex(ConstantIndex(1)));
    }

    #[test]
    fn parse_rejects_dangling_references() {
        let mut bytes = vec![];
        2u16.serialize(&mut bytes).unwrap();
        Constant::Class(Utf8ConstantIndex(ConstantIndex(5)))
            .serialize(&mut bytes)
            .unwrap();
        assert!(matches!(
            ConstantPool::deserialize(&mut bytes.as_slice()),
            Err(Error::MalformedInput(_))
        ));

        let mut bytes = vec![];
        2u16.serialize(&mut bytes).unwrap();
        Constant::Long(3).serialize(&mut bytes).unwrap();
        assert!(matches!(
            ConstantPool::deserialize(&mut bytes.as_slice()),
            Err(Error::MalformedInput(_))
        ));
    }
}
