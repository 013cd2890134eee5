use super::{
    read_bytes, Annotation, ClassConstantIndex, Code, ConstantIndex, ConstantPool, Deserialize,
    ElementValue, LineNumber, LocalVariable, NameAndTypeConstantIndex, Serialize,
    StackMapTable, TypeAnnotation, Utf8ConstantIndex,
};
use crate::jvm::{Error, InnerClassAccessFlags, ParameterAccessFlags};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

/// Attributes (used in classes, fields, methods, and even on some attributes)
///
/// While some attributes aren't essential, others are really important (eg. the code attribute
/// for including the actual bytecode). Attributes with a name that isn't recognized are kept as
/// opaque bytes.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name_index: Utf8ConstantIndex,
    pub body: AttributeBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeBody {
    Code(Code),
    ConstantValue(ConstantIndex),
    Exceptions(Vec<ClassConstantIndex>),
    SourceFile(Utf8ConstantIndex),
    Signature(Utf8ConstantIndex),
    InnerClasses(Vec<InnerClass>),
    EnclosingMethod {
        class: ClassConstantIndex,
        method: Option<NameAndTypeConstantIndex>,
    },
    BootstrapMethods(Vec<BootstrapMethod>),
    StackMapTable(StackMapTable),
    LineNumberTable(Vec<LineNumber>),
    LocalVariableTable(Vec<LocalVariable>),

    /// Same layout as the local variable table, but the descriptors are generic signatures
    LocalVariableTypeTable(Vec<LocalVariable>),
    Deprecated,
    Synthetic,
    RuntimeVisibleAnnotations(Vec<Annotation>),
    RuntimeInvisibleAnnotations(Vec<Annotation>),
    RuntimeVisibleParameterAnnotations(Vec<Vec<Annotation>>),
    RuntimeInvisibleParameterAnnotations(Vec<Vec<Annotation>>),
    AnnotationDefault(ElementValue),
    RuntimeVisibleTypeAnnotations(Vec<TypeAnnotation>),
    RuntimeInvisibleTypeAnnotations(Vec<TypeAnnotation>),
    NestHost(ClassConstantIndex),
    NestMembers(Vec<ClassConstantIndex>),
    MethodParameters(Vec<MethodParameter>),

    /// Attribute that isn't decoded
    Unknown(Vec<u8>),
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.6
#[derive(Debug, Clone, PartialEq)]
pub struct InnerClass {
    pub inner_class: ClassConstantIndex,
    pub outer_class: Option<ClassConstantIndex>,
    pub inner_name: Option<Utf8ConstantIndex>,
    pub access_flags: InnerClassAccessFlags,
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.23
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapMethod {
    pub bootstrap_method: ConstantIndex,
    pub bootstrap_arguments: Vec<ConstantIndex>,
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.24
#[derive(Debug, Clone, PartialEq)]
pub struct MethodParameter {
    pub name: Option<Utf8ConstantIndex>,
    pub access_flags: ParameterAccessFlags,
}

/// Decodes the body of an attribute (everything after the length)
type Decoder = fn(&mut &[u8], &ConstantPool) -> Result<AttributeBody, Error>;

/// Attribute decoders, keyed by attribute name
///
/// Adding support for a new attribute means adding one entry here (and its variant).
fn registry() -> &'static HashMap<&'static str, Decoder> {
    static REGISTRY: OnceLock<HashMap<&'static str, Decoder>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut decoders: HashMap<&'static str, Decoder> = HashMap::new();
        decoders.insert("Code", |bytes, pool| {
            Code::read(bytes, pool).map(AttributeBody::Code)
        });
        decoders.insert("ConstantValue", |bytes, _| {
            ConstantIndex::deserialize(bytes).map(AttributeBody::ConstantValue)
        });
        decoders.insert("Exceptions", |bytes, _| {
            Vec::deserialize(bytes).map(AttributeBody::Exceptions)
        });
        decoders.insert("SourceFile", |bytes, _| {
            Utf8ConstantIndex::deserialize(bytes).map(AttributeBody::SourceFile)
        });
        decoders.insert("Signature", |bytes, _| {
            Utf8ConstantIndex::deserialize(bytes).map(AttributeBody::Signature)
        });
        decoders.insert("InnerClasses", |bytes, _| {
            Vec::deserialize(bytes).map(AttributeBody::InnerClasses)
        });
        decoders.insert("EnclosingMethod", |bytes, _| {
            Ok(AttributeBody::EnclosingMethod {
                class: ClassConstantIndex::deserialize(bytes)?,
                method: read_optional(bytes, NameAndTypeConstantIndex)?,
            })
        });
        decoders.insert("BootstrapMethods", |bytes, _| {
            Vec::deserialize(bytes).map(AttributeBody::BootstrapMethods)
        });
        decoders.insert("StackMapTable", |bytes, _| {
            StackMapTable::deserialize(bytes).map(AttributeBody::StackMapTable)
        });
        decoders.insert("LineNumberTable", |bytes, _| {
            Vec::deserialize(bytes).map(AttributeBody::LineNumberTable)
        });
        decoders.insert("LocalVariableTable", |bytes, _| {
            Vec::deserialize(bytes).map(AttributeBody::LocalVariableTable)
        });
        decoders.insert("LocalVariableTypeTable", |bytes, _| {
            Vec::deserialize(bytes).map(AttributeBody::LocalVariableTypeTable)
        });
        decoders.insert("Deprecated", |_, _| Ok(AttributeBody::Deprecated));
        decoders.insert("Synthetic", |_, _| Ok(AttributeBody::Synthetic));
        decoders.insert("RuntimeVisibleAnnotations", |bytes, _| {
            Vec::deserialize(bytes).map(AttributeBody::RuntimeVisibleAnnotations)
        });
        decoders.insert("RuntimeInvisibleAnnotations", |bytes, _| {
            Vec::deserialize(bytes).map(AttributeBody::RuntimeInvisibleAnnotations)
        });
        decoders.insert("RuntimeVisibleParameterAnnotations", |bytes, _| {
            read_parameter_annotations(bytes).map(AttributeBody::RuntimeVisibleParameterAnnotations)
        });
        decoders.insert("RuntimeInvisibleParameterAnnotations", |bytes, _| {
            read_parameter_annotations(bytes)
                .map(AttributeBody::RuntimeInvisibleParameterAnnotations)
        });
        decoders.insert("AnnotationDefault", |bytes, _| {
            ElementValue::deserialize(bytes).map(AttributeBody::AnnotationDefault)
        });
        decoders.insert("RuntimeVisibleTypeAnnotations", |bytes, _| {
            Vec::deserialize(bytes).map(AttributeBody::RuntimeVisibleTypeAnnotations)
        });
        decoders.insert("RuntimeInvisibleTypeAnnotations", |bytes, _| {
            Vec::deserialize(bytes).map(AttributeBody::RuntimeInvisibleTypeAnnotations)
        });
        decoders.insert("NestHost", |bytes, _| {
            ClassConstantIndex::deserialize(bytes).map(AttributeBody::NestHost)
        });
        decoders.insert("NestMembers", |bytes, _| {
            Vec::deserialize(bytes).map(AttributeBody::NestMembers)
        });
        decoders.insert("MethodParameters", |bytes, _| {
            let count = u8::deserialize(bytes)?;
            let parameters = (0..count)
                .map(|_| MethodParameter::deserialize(bytes))
                .collect::<Result<_, _>>()?;
            Ok(AttributeBody::MethodParameters(parameters))
        });
        decoders
    })
}

impl AttributeBody {
    /// Name under which this kind of attribute is stored (`None` for unknown attributes)
    pub fn name(&self) -> Option<&'static str> {
        let name = match self {
            AttributeBody::Code(_) => "Code",
            AttributeBody::ConstantValue(_) => "ConstantValue",
            AttributeBody::Exceptions(_) => "Exceptions",
            AttributeBody::SourceFile(_) => "SourceFile",
            AttributeBody::Signature(_) => "Signature",
            AttributeBody::InnerClasses(_) => "InnerClasses",
            AttributeBody::EnclosingMethod { .. } => "EnclosingMethod",
            AttributeBody::BootstrapMethods(_) => "BootstrapMethods",
            AttributeBody::StackMapTable(_) => "StackMapTable",
            AttributeBody::LineNumberTable(_) => "LineNumberTable",
            AttributeBody::LocalVariableTable(_) => "LocalVariableTable",
            AttributeBody::LocalVariableTypeTable(_) => "LocalVariableTypeTable",
            AttributeBody::Deprecated => "Deprecated",
            AttributeBody::Synthetic => "Synthetic",
            AttributeBody::RuntimeVisibleAnnotations(_) => "RuntimeVisibleAnnotations",
            AttributeBody::RuntimeInvisibleAnnotations(_) => "RuntimeInvisibleAnnotations",
            AttributeBody::RuntimeVisibleParameterAnnotations(_) => {
                "RuntimeVisibleParameterAnnotations"
            }
            AttributeBody::RuntimeInvisibleParameterAnnotations(_) => {
                "RuntimeInvisibleParameterAnnotations"
            }
            AttributeBody::AnnotationDefault(_) => "AnnotationDefault",
            AttributeBody::RuntimeVisibleTypeAnnotations(_) => "RuntimeVisibleTypeAnnotations",
            AttributeBody::RuntimeInvisibleTypeAnnotations(_) => {
                "RuntimeInvisibleTypeAnnotations"
            }
            AttributeBody::NestHost(_) => "NestHost",
            AttributeBody::NestMembers(_) => "NestMembers",
            AttributeBody::MethodParameters(_) => "MethodParameters",
            AttributeBody::Unknown(_) => return None,
        };
        Some(name)
    }
}

impl Attribute {
    /// Make a new attribute, interning its name in the pool
    pub fn new(pool: &mut ConstantPool, body: AttributeBody) -> Result<Attribute, Error> {
        let name = body.name().ok_or_else(|| {
            Error::MalformedInput(String::from("unknown attributes need an explicit name"))
        })?;
        Ok(Attribute {
            name_index: pool.add_utf8(name)?,
            body,
        })
    }

    /// Make a new opaque attribute
    pub fn unknown(pool: &mut ConstantPool, name: &str, info: Vec<u8>) -> Result<Attribute, Error> {
        Ok(Attribute {
            name_index: pool.add_utf8(name)?,
            body: AttributeBody::Unknown(info),
        })
    }

    /// Read an attribute, dispatching on its name
    ///
    /// The attribute's declared length must be exactly what its decoder consumes.
    pub fn read<R: ReadBytesExt>(reader: &mut R, pool: &ConstantPool) -> Result<Attribute, Error> {
        let name_index = Utf8ConstantIndex::deserialize(reader)?;
        let length = u32::deserialize(reader)?;
        let info = read_bytes(reader, length as usize)?;
        let name = pool.get_utf8(name_index)?;

        let body = match registry().get(name) {
            Some(decode) => {
                let mut bytes: &[u8] = &info;
                let body = decode(&mut bytes, pool)?;
                if !bytes.is_empty() {
                    return Err(Error::MalformedInput(format!(
                        "{} attribute has {} unread bytes",
                        name,
                        bytes.len()
                    )));
                }
                body
            }
            None => AttributeBody::Unknown(info),
        };
        Ok(Attribute { name_index, body })
    }

    /// Read a list of attributes prefixed by a `u16` count
    pub fn read_list<R: ReadBytesExt>(
        reader: &mut R,
        pool: &ConstantPool,
    ) -> Result<Vec<Attribute>, Error> {
        let count = u16::deserialize(reader)?;
        (0..count).map(|_| Attribute::read(reader, pool)).collect()
    }

    pub fn name<'p>(&self, pool: &'p ConstantPool) -> Result<&'p str, Error> {
        pool.get_utf8(self.name_index)
    }

    /// Copy the attribute into another pool, renaming classes as it goes
    pub fn copy(
        &self,
        from: &ConstantPool,
        to: &mut ConstantPool,
        renames: &HashMap<String, String>,
    ) -> Result<Attribute, Error> {
        let name_index = from.copy_utf8(self.name_index, to)?;
        let body = match &self.body {
            AttributeBody::Code(code) => AttributeBody::Code(code.copy(from, to, renames)?),
            AttributeBody::ConstantValue(value) => {
                AttributeBody::ConstantValue(from.copy_constant(*value, to, renames)?)
            }
            AttributeBody::Exceptions(classes) => {
                AttributeBody::Exceptions(copy_classes(classes, from, to, renames)?)
            }
            AttributeBody::SourceFile(file) => {
                AttributeBody::SourceFile(from.copy_utf8(*file, to)?)
            }
            AttributeBody::Signature(signature) => {
                AttributeBody::Signature(from.copy_descriptor(*signature, to, renames)?)
            }
            AttributeBody::InnerClasses(inner_classes) => {
                let mut copied = Vec::with_capacity(inner_classes.len());
                for inner in inner_classes {
                    copied.push(InnerClass {
                        inner_class: from.copy_class(inner.inner_class, to, renames)?,
                        outer_class: match inner.outer_class {
                            Some(outer) => Some(from.copy_class(outer, to, renames)?),
                            None => None,
                        },
                        inner_name: match inner.inner_name {
                            Some(name) => Some(from.copy_utf8(name, to)?),
                            None => None,
                        },
                        access_flags: inner.access_flags,
                    });
                }
                AttributeBody::InnerClasses(copied)
            }
            AttributeBody::EnclosingMethod { class, method } => AttributeBody::EnclosingMethod {
                class: from.copy_class(*class, to, renames)?,
                method: match method {
                    Some(method) => Some(NameAndTypeConstantIndex(
                        from.copy_constant(*method, to, renames)?,
                    )),
                    None => None,
                },
            },
            AttributeBody::BootstrapMethods(methods) => {
                let mut copied = Vec::with_capacity(methods.len());
                for method in methods {
                    copied.push(BootstrapMethod {
                        bootstrap_method: from.copy_constant(method.bootstrap_method, to, renames)?,
                        bootstrap_arguments: method
                            .bootstrap_arguments
                            .iter()
                            .map(|argument| from.copy_constant(*argument, to, renames))
                            .collect::<Result<_, _>>()?,
                    });
                }
                AttributeBody::BootstrapMethods(copied)
            }
            AttributeBody::StackMapTable(table) => {
                AttributeBody::StackMapTable(table.copy(from, to, renames)?)
            }
            AttributeBody::LineNumberTable(lines) => AttributeBody::LineNumberTable(lines.clone()),
            AttributeBody::LocalVariableTable(locals) => {
                AttributeBody::LocalVariableTable(copy_locals(locals, from, to, renames)?)
            }
            AttributeBody::LocalVariableTypeTable(locals) => {
                AttributeBody::LocalVariableTypeTable(copy_locals(locals, from, to, renames)?)
            }
            AttributeBody::Deprecated => AttributeBody::Deprecated,
            AttributeBody::Synthetic => AttributeBody::Synthetic,
            AttributeBody::RuntimeVisibleAnnotations(annotations) => {
                AttributeBody::RuntimeVisibleAnnotations(copy_annotations(
                    annotations,
                    from,
                    to,
                    renames,
                )?)
            }
            AttributeBody::RuntimeInvisibleAnnotations(annotations) => {
                AttributeBody::RuntimeInvisibleAnnotations(copy_annotations(
                    annotations,
                    from,
                    to,
                    renames,
                )?)
            }
            AttributeBody::RuntimeVisibleParameterAnnotations(parameters) => {
                AttributeBody::RuntimeVisibleParameterAnnotations(
                    parameters
                        .iter()
                        .map(|annotations| copy_annotations(annotations, from, to, renames))
                        .collect::<Result<_, _>>()?,
                )
            }
            AttributeBody::RuntimeInvisibleParameterAnnotations(parameters) => {
                AttributeBody::RuntimeInvisibleParameterAnnotations(
                    parameters
                        .iter()
                        .map(|annotations| copy_annotations(annotations, from, to, renames))
                        .collect::<Result<_, _>>()?,
                )
            }
            AttributeBody::AnnotationDefault(value) => {
                AttributeBody::AnnotationDefault(value.copy(from, to, renames)?)
            }
            AttributeBody::RuntimeVisibleTypeAnnotations(annotations) => {
                AttributeBody::RuntimeVisibleTypeAnnotations(
                    annotations
                        .iter()
                        .map(|annotation| annotation.copy(from, to, renames))
                        .collect::<Result<_, _>>()?,
                )
            }
            AttributeBody::RuntimeInvisibleTypeAnnotations(annotations) => {
                AttributeBody::RuntimeInvisibleTypeAnnotations(
                    annotations
                        .iter()
                        .map(|annotation| annotation.copy(from, to, renames))
                        .collect::<Result<_, _>>()?,
                )
            }
            AttributeBody::NestHost(host) => {
                AttributeBody::NestHost(from.copy_class(*host, to, renames)?)
            }
            AttributeBody::NestMembers(members) => {
                AttributeBody::NestMembers(copy_classes(members, from, to, renames)?)
            }
            AttributeBody::MethodParameters(parameters) => {
                let mut copied = Vec::with_capacity(parameters.len());
                for parameter in parameters {
                    copied.push(MethodParameter {
                        name: match parameter.name {
                            Some(name) => Some(from.copy_utf8(name, to)?),
                            None => None,
                        },
                        access_flags: parameter.access_flags,
                    });
                }
                AttributeBody::MethodParameters(copied)
            }
            AttributeBody::Unknown(info) => AttributeBody::Unknown(info.clone()),
        };
        Ok(Attribute { name_index, body })
    }

    /// Rename classes mentioned by the attribute outside of class constants
    ///
    /// Class constants themselves are renamed along with the pool.
    pub fn rename_classes(
        &mut self,
        pool: &mut ConstantPool,
        renames: &HashMap<String, String>,
    ) -> Result<(), Error> {
        match &mut self.body {
            AttributeBody::Code(code) => code.rename_classes(pool, renames)?,
            AttributeBody::Signature(signature) => {
                *signature = pool.rename_descriptor_at(*signature, renames)?;
            }
            AttributeBody::LocalVariableTable(locals)
            | AttributeBody::LocalVariableTypeTable(locals) => {
                for local in locals {
                    local.descriptor_index =
                        pool.rename_descriptor_at(local.descriptor_index, renames)?;
                }
            }
            AttributeBody::RuntimeVisibleAnnotations(annotations)
            | AttributeBody::RuntimeInvisibleAnnotations(annotations) => {
                for annotation in annotations {
                    annotation.rename_classes(pool, renames)?;
                }
            }
            AttributeBody::RuntimeVisibleParameterAnnotations(parameters)
            | AttributeBody::RuntimeInvisibleParameterAnnotations(parameters) => {
                for annotation in parameters.iter_mut().flatten() {
                    annotation.rename_classes(pool, renames)?;
                }
            }
            AttributeBody::AnnotationDefault(value) => value.rename_classes(pool, renames)?,
            AttributeBody::RuntimeVisibleTypeAnnotations(annotations)
            | AttributeBody::RuntimeInvisibleTypeAnnotations(annotations) => {
                for annotation in annotations {
                    annotation.annotation.rename_classes(pool, renames)?;
                }
            }
            _ => (),
        }
        Ok(())
    }

    /// Collect the internal names of classes this attribute refers to
    pub fn collect_classes(
        &self,
        pool: &ConstantPool,
        out: &mut BTreeSet<String>,
    ) -> Result<(), Error> {
        match &self.body {
            AttributeBody::Code(code) => code.collect_classes(pool, out)?,
            AttributeBody::Exceptions(classes) | AttributeBody::NestMembers(classes) => {
                for class in classes {
                    out.insert(pool.get_class_name(*class)?.to_owned());
                }
            }
            AttributeBody::NestHost(class) | AttributeBody::EnclosingMethod { class, .. } => {
                out.insert(pool.get_class_name(*class)?.to_owned());
            }
            AttributeBody::InnerClasses(inner_classes) => {
                for inner in inner_classes {
                    out.insert(pool.get_class_name(inner.inner_class)?.to_owned());
                    if let Some(outer) = inner.outer_class {
                        out.insert(pool.get_class_name(outer)?.to_owned());
                    }
                }
            }
            AttributeBody::Signature(signature) => {
                pool.collect_descriptor_classes(*signature, out)?
            }
            AttributeBody::StackMapTable(table) => table.collect_classes(pool, out)?,
            AttributeBody::LocalVariableTable(locals)
            | AttributeBody::LocalVariableTypeTable(locals) => {
                for local in locals {
                    pool.collect_descriptor_classes(local.descriptor_index, out)?;
                }
            }
            AttributeBody::RuntimeVisibleAnnotations(annotations)
            | AttributeBody::RuntimeInvisibleAnnotations(annotations) => {
                for annotation in annotations {
                    annotation.collect_classes(pool, out)?;
                }
            }
            AttributeBody::RuntimeVisibleParameterAnnotations(parameters)
            | AttributeBody::RuntimeInvisibleParameterAnnotations(parameters) => {
                for annotation in parameters.iter().flatten() {
                    annotation.collect_classes(pool, out)?;
                }
            }
            AttributeBody::AnnotationDefault(value) => value.collect_classes(pool, out)?,
            AttributeBody::RuntimeVisibleTypeAnnotations(annotations)
            | AttributeBody::RuntimeInvisibleTypeAnnotations(annotations) => {
                for annotation in annotations {
                    annotation.annotation.collect_classes(pool, out)?;
                }
            }
            _ => (),
        }
        Ok(())
    }
}

/// Find the first attribute with the given name
pub fn find_attribute<'a>(
    attributes: &'a [Attribute],
    pool: &ConstantPool,
    name: &str,
) -> Option<&'a Attribute> {
    attributes
        .iter()
        .find(|attribute| attribute.name(pool).map_or(false, |n| n == name))
}

/// Remove every attribute with the given name, returning how many were removed
pub fn remove_attributes(attributes: &mut Vec<Attribute>, pool: &ConstantPool, name: &str) -> usize {
    let before = attributes.len();
    attributes.retain(|attribute| attribute.name(pool).map_or(true, |n| n != name));
    before - attributes.len()
}

/// Copy a list of attributes into another pool
pub fn copy_attributes(
    attributes: &[Attribute],
    from: &ConstantPool,
    to: &mut ConstantPool,
    renames: &HashMap<String, String>,
) -> Result<Vec<Attribute>, Error> {
    attributes
        .iter()
        .map(|attribute| attribute.copy(from, to, renames))
        .collect()
}

fn copy_classes(
    classes: &[ClassConstantIndex],
    from: &ConstantPool,
    to: &mut ConstantPool,
    renames: &HashMap<String, String>,
) -> Result<Vec<ClassConstantIndex>, Error> {
    classes
        .iter()
        .map(|class| from.copy_class(*class, to, renames))
        .collect()
}

fn copy_annotations(
    annotations: &[Annotation],
    from: &ConstantPool,
    to: &mut ConstantPool,
    renames: &HashMap<String, String>,
) -> Result<Vec<Annotation>, Error> {
    annotations
        .iter()
        .map(|annotation| annotation.copy(from, to, renames))
        .collect()
}

fn copy_locals(
    locals: &[LocalVariable],
    from: &ConstantPool,
    to: &mut ConstantPool,
    renames: &HashMap<String, String>,
) -> Result<Vec<LocalVariable>, Error> {
    let mut copied = Vec::with_capacity(locals.len());
    for local in locals {
        copied.push(LocalVariable {
            name_index: from.copy_utf8(local.name_index, to)?,
            descriptor_index: from.copy_descriptor(local.descriptor_index, to, renames)?,
            ..*local
        });
    }
    Ok(copied)
}

/// Read a constant index where 0 means "absent"
pub(super) fn read_optional<R: ReadBytesExt, T>(
    reader: &mut R,
    wrap: fn(ConstantIndex) -> T,
) -> Result<Option<T>, Error> {
    let index = ConstantIndex::deserialize(reader)?;
    Ok(if index.0 == 0 { None } else { Some(wrap(index)) })
}

pub(super) fn write_optional<W: WriteBytesExt, T: Into<ConstantIndex> + Copy>(
    writer: &mut W,
    value: Option<T>,
) -> std::io::Result<()> {
    value.map_or(ConstantIndex(0), Into::into).serialize(writer)
}

/// Parameter annotations are counted with a `u8`
fn read_parameter_annotations(bytes: &mut &[u8]) -> Result<Vec<Vec<Annotation>>, Error> {
    let count = u8::deserialize(bytes)?;
    (0..count).map(|_| Vec::deserialize(bytes)).collect()
}

fn write_parameter_annotations<W: WriteBytesExt>(
    writer: &mut W,
    parameters: &[Vec<Annotation>],
) -> std::io::Result<()> {
    (parameters.len() as u8).serialize(writer)?;
    for annotations in parameters {
        annotations.serialize(writer)?;
    }
    Ok(())
}

impl Serialize for Attribute {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.name_index.serialize(writer)?;

        // Attribute info length is 4 bytes
        let mut info = vec![];
        self.body.serialize(&mut info)?;
        (info.len() as u32).serialize(writer)?;
        writer.write_all(&info)?;

        Ok(())
    }
}

impl Serialize for AttributeBody {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            AttributeBody::Code(code) => code.serialize(writer),
            AttributeBody::ConstantValue(value) => value.serialize(writer),
            AttributeBody::Exceptions(classes) | AttributeBody::NestMembers(classes) => {
                classes.serialize(writer)
            }
            AttributeBody::SourceFile(utf8) | AttributeBody::Signature(utf8) => {
                utf8.serialize(writer)
            }
            AttributeBody::InnerClasses(inner_classes) => inner_classes.serialize(writer),
            AttributeBody::EnclosingMethod { class, method } => {
                class.serialize(writer)?;
                write_optional(writer, *method)
            }
            AttributeBody::BootstrapMethods(methods) => methods.serialize(writer),
            AttributeBody::StackMapTable(table) => table.serialize(writer),
            AttributeBody::LineNumberTable(lines) => lines.serialize(writer),
            AttributeBody::LocalVariableTable(locals)
            | AttributeBody::LocalVariableTypeTable(locals) => locals.serialize(writer),
            AttributeBody::Deprecated | AttributeBody::Synthetic => Ok(()),
            AttributeBody::RuntimeVisibleAnnotations(annotations)
            | AttributeBody::RuntimeInvisibleAnnotations(annotations) => {
                annotations.serialize(writer)
            }
            AttributeBody::RuntimeVisibleParameterAnnotations(parameters)
            | AttributeBody::RuntimeInvisibleParameterAnnotations(parameters) => {
                write_parameter_annotations(writer, parameters)
            }
            AttributeBody::AnnotationDefault(value) => value.serialize(writer),
            AttributeBody::RuntimeVisibleTypeAnnotations(annotations)
            | AttributeBody::RuntimeInvisibleTypeAnnotations(annotations) => {
                annotations.serialize(writer)
            }
            AttributeBody::NestHost(class) => class.serialize(writer),
            AttributeBody::MethodParameters(parameters) => {
                (parameters.len() as u8).serialize(writer)?;
                for parameter in parameters {
                    parameter.serialize(writer)?;
                }
                Ok(())
            }
            AttributeBody::Unknown(info) => writer.write_all(info),
        }
    }
}

impl Serialize for InnerClass {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.inner_class.serialize(writer)?;
        write_optional(writer, self.outer_class)?;
        write_optional(writer, self.inner_name)?;
        self.access_flags.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for InnerClass {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(InnerClass {
            inner_class: ClassConstantIndex::deserialize(reader)?,
            outer_class: read_optional(reader, ClassConstantIndex)?,
            inner_name: read_optional(reader, Utf8ConstantIndex)?,
            access_flags: InnerClassAccessFlags::deserialize(reader)?,
        })
    }
}

impl Serialize for BootstrapMethod {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.bootstrap_method.serialize(writer)?;
        self.bootstrap_arguments.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for BootstrapMethod {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(BootstrapMethod {
            bootstrap_method: ConstantIndex::deserialize(reader)?,
            bootstrap_arguments: Vec::deserialize(reader)?,
        })
    }
}

impl Serialize for MethodParameter {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        write_optional(writer, self.name)?;
        self.access_flags.serialize(writer)
    }
}

impl Deserialize for MethodParameter {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(MethodParameter {
            name: read_optional(reader, Utf8ConstantIndex)?,
            access_flags: ParameterAccessFlags::deserialize(reader)?,
        })
    }
}
