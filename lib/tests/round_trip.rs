use classweave::jvm::class_file::{
    Annotation, Attribute, AttributeBody, ClassFile, Code, Field, LineNumber, LocalVariable,
    Method, Version,
};
use classweave::jvm::code::opcodes;
use classweave::jvm::{ClassAccessFlags, Error, FieldAccessFlags, MethodAccessFlags};
use std::collections::HashMap;

/// Class with a bit of everything:
///
/// ```java,ignore,no_run
/// public class Foo implements Runnable {
///     public int width;
///     private List<Bar> items;
///
///     @Marker
///     public void run() {
///         Bar.helper(this);
///     }
/// }
/// ```
fn sample_class() -> Result<ClassFile, Error> {
    let mut class = ClassFile::new("test.Foo", "java.lang.Object", ClassAccessFlags::PUBLIC)?;
    class.add_interface("java.lang.Runnable")?;

    let pool = class.constants_mut()?;
    let width = Field::new(pool, FieldAccessFlags::PUBLIC, "width", "I")?;
    let mut items = Field::new(pool, FieldAccessFlags::PRIVATE, "items", "Ljava/util/List;")?;
    let signature = pool.add_utf8("Ljava/util/List<Ltest/Bar;>;")?;
    items
        .attributes
        .push(Attribute::new(pool, AttributeBody::Signature(signature))?);

    let mut run = Method::new(pool, MethodAccessFlags::PUBLIC, "run", "()V")?;
    let helper = pool.add_method_ref("test/Bar", "helper", "(Ltest/Foo;)V", false)?;
    let [hi, lo] = helper.0 .0.to_be_bytes();
    let mut code = Code::new(
        1,
        1,
        vec![opcodes::ALOAD_0, opcodes::INVOKESTATIC, hi, lo, opcodes::RETURN],
    );
    code.attributes.push(Attribute::new(
        pool,
        AttributeBody::LineNumberTable(vec![LineNumber {
            start_pc: 0,
            line_number: 7,
        }]),
    )?);
    let this_name = pool.add_utf8("this")?;
    let this_descriptor = pool.add_utf8("Ltest/Foo;")?;
    code.attributes.push(Attribute::new(
        pool,
        AttributeBody::LocalVariableTable(vec![LocalVariable {
            start_pc: 0,
            length: 5,
            name_index: this_name,
            descriptor_index: this_descriptor,
            index: 0,
        }]),
    )?);
    run.set_code(pool, code)?;
    let marker = pool.add_utf8("Ltest/Marker;")?;
    run.attributes.push(Attribute::new(
        pool,
        AttributeBody::RuntimeVisibleAnnotations(vec![Annotation {
            type_index: marker,
            elements: vec![],
        }]),
    )?);

    let custom = Attribute::unknown(pool, "com.example.Custom", vec![1, 2, 3])?;

    class.add_field(width)?;
    class.add_field(items)?;
    class.add_method(run)?;
    class.add_attribute(custom)?;
    Ok(class)
}

fn field_descriptors(class: &ClassFile) -> Vec<(String, String)> {
    let pool = class.constants();
    class
        .fields()
        .iter()
        .map(|field| {
            (
                field.name(pool).unwrap().to_owned(),
                field.descriptor(pool).unwrap().to_owned(),
            )
        })
        .collect()
}

/// Class, name, and descriptor of the method called in `Foo.run`
fn called_method(class: &ClassFile) -> (String, String, String) {
    let pool = class.constants();
    let code = class.get_method("run", "()V").unwrap().code().unwrap();
    let index = u16::from_be_bytes([code.code[2], code.code[3]]);
    let member = pool
        .get_member_ref(classweave::jvm::class_file::ConstantIndex(index))
        .unwrap();
    (
        member.class.to_owned(),
        member.name.to_owned(),
        member.descriptor.to_owned(),
    )
}

#[test]
fn round_trip_is_byte_identical() {
    let bytes = sample_class().unwrap().to_bytes().unwrap();
    let parsed = ClassFile::parse(&bytes).unwrap();
    assert_eq!(parsed.to_bytes().unwrap(), bytes);

    let mut reader = bytes.as_slice();
    let read = ClassFile::read_from(&mut reader).unwrap();
    assert_eq!(read.to_bytes().unwrap(), bytes);
}

#[test]
fn empty_class_scenario() {
    let mut class =
        ClassFile::new("test.Foo", "java.lang.Object", ClassAccessFlags::PUBLIC).unwrap();
    let width = Field::new(
        class.constants_mut().unwrap(),
        FieldAccessFlags::PUBLIC,
        "width",
        "I",
    )
    .unwrap();
    class.add_field(width).unwrap();

    let parsed = ClassFile::parse(&class.to_bytes().unwrap()).unwrap();
    assert_eq!(parsed.version(), Version::JAVA8);
    assert_eq!(parsed.version().major_version, 52);
    assert_eq!(parsed.version().minor_version, 0);
    assert_eq!(
        field_descriptors(&parsed),
        vec![(String::from("width"), String::from("I"))]
    );
    assert!(parsed.interfaces().unwrap().is_empty());
    assert_eq!(
        parsed.superclass().unwrap().as_deref(),
        Some("java.lang.Object")
    );
    assert_eq!(parsed.name().unwrap(), "test.Foo");
}

#[test]
fn truncated_input_is_malformed() {
    let bytes = sample_class().unwrap().to_bytes().unwrap();
    for length in 0..bytes.len() {
        match ClassFile::parse(&bytes[..length]) {
            Err(Error::MalformedInput(_)) => (),
            other => panic!("prefix of length {} parsed as {:?}", length, other.map(|_| ())),
        }
    }
}

#[test]
fn dangling_constant_index_is_malformed() {
    let mut bytes = sample_class().unwrap().to_bytes().unwrap();

    // `this_class` comes right after the constant pool and access flags; point it past the pool
    let class = ClassFile::parse(&bytes).unwrap();
    let pool_bytes = classweave::jvm::class_file::to_bytes(class.constants()).unwrap();
    let this_class = 8 + pool_bytes.len() + 2;
    bytes[this_class] = 0xff;
    bytes[this_class + 1] = 0xff;
    assert!(matches!(
        ClassFile::parse(&bytes),
        Err(Error::MalformedInput(_))
    ));
}

#[test]
fn compact_keeps_only_reachable_constants() {
    let mut class = sample_class().unwrap();
    let reachable = class.constants().len();
    let fields_before = field_descriptors(&class);
    let call_before = called_method(&class);

    let pool = class.constants_mut().unwrap();
    pool.add_utf8("unused").unwrap();
    pool.add_long(1 << 40).unwrap();
    pool.add_method_ref("test/Unused", "nothing", "()V", false)
        .unwrap();
    assert!(class.constants().len() > reachable);

    class.compact().unwrap();
    assert_eq!(class.constants().len(), reachable);
    assert_eq!(field_descriptors(&class), fields_before);
    assert_eq!(called_method(&class), call_before);
    assert_eq!(class.source_file().unwrap(), Some("Foo.java"));

    // deduplication still finds compacted entries
    let pool = class.constants_mut().unwrap();
    let first = pool.add_utf8("width").unwrap();
    let second = pool.add_utf8("width").unwrap();
    assert_eq!(first, second);
    assert_eq!(class.constants().len(), reachable);

    // and the compacted class still round trips
    let bytes = class.to_bytes().unwrap();
    assert_eq!(ClassFile::parse(&bytes).unwrap().to_bytes().unwrap(), bytes);
}

#[test]
fn rename_is_idempotent_and_reversible() {
    let mut class = sample_class().unwrap();
    let fields_before = field_descriptors(&class);
    let call_before = called_method(&class);

    class.rename_class("test.Foo", "test.Qux").unwrap();
    assert_eq!(class.name().unwrap(), "test.Qux");
    assert_eq!(
        called_method(&class).2,
        String::from("(Ltest/Qux;)V")
    );
    let once = class.to_bytes().unwrap();
    let pool_size = class.constants().len();

    class.rename_class("test.Foo", "test.Qux").unwrap();
    assert_eq!(class.constants().len(), pool_size);
    assert_eq!(class.to_bytes().unwrap(), once);

    class.rename_class("test.Qux", "test.Foo").unwrap();
    assert_eq!(class.name().unwrap(), "test.Foo");
    assert_eq!(field_descriptors(&class), fields_before);
    assert_eq!(called_method(&class), call_before);
}

#[test]
fn batch_rename_reaches_attributes() {
    let mut class = sample_class().unwrap();
    let renames = HashMap::from([
        (String::from("test.Bar"), String::from("other.Bar")),
        (String::from("java/util/List"), String::from("java/util/Collection")),
    ]);
    class.rename_classes(&renames).unwrap();

    let classes = class.referenced_classes().unwrap();
    assert!(classes.contains("other.Bar"));
    assert!(classes.contains("java.util.Collection"));
    assert!(!classes.contains("test.Bar"));
    assert!(!classes.contains("java.util.List"));

    let items = class.get_field("items").unwrap();
    assert_eq!(
        items.descriptor(class.constants()).unwrap(),
        "Ljava/util/Collection;"
    );
    let signature = items
        .attributes
        .iter()
        .find_map(|attribute| match attribute.body {
            AttributeBody::Signature(signature) => Some(signature),
            _ => None,
        })
        .unwrap();
    assert_eq!(
        class.constants().get_utf8(signature).unwrap(),
        "Ljava/util/Collection<Lother/Bar;>;"
    );
}

#[test]
fn prune_keeps_shape_only() {
    let mut class = sample_class().unwrap();
    let before = class.constants().len();
    class.prune_and_freeze().unwrap();

    assert!(class.constants().len() < before);
    let run = class.get_method("run", "()V").unwrap();
    assert!(run.code().is_none());
    assert_eq!(run.attributes.len(), 1);
    assert!(class.attributes().is_empty());
    assert_eq!(field_descriptors(&class).len(), 2);

    let bytes = class.to_bytes().unwrap();
    let parsed = ClassFile::parse(&bytes).unwrap();
    assert_eq!(parsed.methods().len(), 1);

    assert!(matches!(class.compact(), Err(Error::Frozen(_))));
    assert!(matches!(
        class.remove_method("run", "()V"),
        Err(Error::Frozen(_))
    ));
}
