use super::{BinaryName, Error, Name};
use crate::util::Width;
use std::iter::Peekable;
use std::str::Chars;

/// Utility trait for converting descriptors to and from string representations
pub trait RenderDescriptor {
    /// Turn the descriptor into a string
    fn render(&self) -> String {
        let mut string = String::new();
        self.render_to(&mut string);
        string
    }

    /// Write the descriptor to a string
    fn render_to(&self, write_to: &mut String);
}

pub trait ParseDescriptor: Sized {
    /// Parse a descriptor from a string
    fn parse(source: &str) -> Result<Self, Error> {
        let mut chars = source.chars().peekable();
        let ret = Self::parse_from(&mut chars)?;
        match chars.next() {
            None => Ok(ret),
            Some(c) => Err(Error::BadDescriptor(format!(
                "Unexpected leftover input '{}' in '{}'",
                c, source
            ))),
        }
    }

    /// Read the descriptor from a character buffer
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self, Error>;
}

/// Primitive value types
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

impl Width for BaseType {
    fn width(&self) -> usize {
        match self {
            BaseType::Byte
            | BaseType::Char
            | BaseType::Float
            | BaseType::Int
            | BaseType::Short
            | BaseType::Boolean => 1,
            BaseType::Double | BaseType::Long => 2,
        }
    }
}

impl RenderDescriptor for BaseType {
    fn render_to(&self, write_to: &mut String) {
        let c = match self {
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Double => 'D',
            BaseType::Float => 'F',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Short => 'S',
            BaseType::Boolean => 'Z',
        };
        write_to.push(c);
    }
}

impl ParseDescriptor for BaseType {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self, Error> {
        let typ = match source.next() {
            Some('B') => BaseType::Byte,
            Some('C') => BaseType::Char,
            Some('D') => BaseType::Double,
            Some('F') => BaseType::Float,
            Some('I') => BaseType::Int,
            Some('J') => BaseType::Long,
            Some('S') => BaseType::Short,
            Some('Z') => BaseType::Boolean,
            Some(c) => {
                let msg = format!("Invalid base type character '{}'", c);
                return Err(Error::BadDescriptor(msg));
            }
            None => {
                let msg = String::from("Missing base type character");
                return Err(Error::BadDescriptor(msg));
            }
        };
        Ok(typ)
    }
}

/// Reference type
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum RefType<Class> {
    Object(Class),
    ObjectArray(ArrayType<Class>),
    PrimitiveArray(ArrayType<BaseType>),
}

/// Generic array type
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ArrayType<T> {
    /// Additional dimensions (`A[]` has 0 additional dimensions, `A[][][][]` has 3)
    pub additional_dimensions: usize,

    /// Underlying element type (`A` is the underlying element type of `A[][]`)
    pub element_type: T,
}

impl<T> ArrayType<T> {
    /// Total number of dimensions in the array type
    ///
    /// This is always just `additional_dimensions + 1`
    pub const fn dimensions(&self) -> usize {
        self.additional_dimensions + 1
    }
}

impl<T: RenderDescriptor> RenderDescriptor for ArrayType<T> {
    fn render_to(&self, write_to: &mut String) {
        for _ in 0..=self.additional_dimensions {
            write_to.push('[');
        }
        self.element_type.render_to(write_to);
    }
}

impl RenderDescriptor for BinaryName {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('L');
        write_to.push_str(self.as_str());
        write_to.push(';');
    }
}

impl ParseDescriptor for BinaryName {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self, Error> {
        if let Some('L') = source.next() {
            let mut class_name = String::new();
            loop {
                let c: char = source.next().ok_or_else(|| {
                    Error::BadDescriptor(format!("Missing terminator for 'L{}'", class_name))
                })?;
                if c == ';' {
                    return BinaryName::from_string(class_name).map_err(Error::BadDescriptor);
                } else {
                    class_name.push(c)
                }
            }
        } else {
            Err(Error::BadDescriptor(String::from(
                "Expected object type to start with `L`",
            )))
        }
    }
}

impl<C: RenderDescriptor> RenderDescriptor for RefType<C> {
    fn render_to(&self, write_to: &mut String) {
        match self {
            RefType::Object(cls) => cls.render_to(write_to),
            RefType::PrimitiveArray(arr) => arr.render_to(write_to),
            RefType::ObjectArray(arr) => arr.render_to(write_to),
        }
    }
}

impl<C: ParseDescriptor> ParseDescriptor for RefType<C> {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self, Error> {
        Ok(match source.peek().copied() {
            Some('L') => RefType::Object(C::parse_from(source)?),
            Some('[') => {
                source.next();
                let mut additional_dimensions = 0;
                while source.next_if_eq(&'[').is_some() {
                    additional_dimensions += 1;
                }
                if let Some('L') = source.peek().copied() {
                    RefType::ObjectArray(ArrayType {
                        additional_dimensions,
                        element_type: C::parse_from(source)?,
                    })
                } else {
                    RefType::PrimitiveArray(ArrayType {
                        additional_dimensions,
                        element_type: BaseType::parse_from(source)?,
                    })
                }
            }
            Some(c) => {
                let msg = format!("Invalid reference type character '{}'", c);
                return Err(Error::BadDescriptor(msg));
            }
            None => return Err(Error::BadDescriptor(String::from("Missing field type"))),
        })
    }
}

impl<C> RefType<C> {
    pub fn array(field_type: FieldType<C>) -> RefType<C> {
        match field_type {
            FieldType::Base(element_type) => RefType::PrimitiveArray(ArrayType {
                additional_dimensions: 0,
                element_type,
            }),
            FieldType::Ref(RefType::Object(element_type)) => RefType::ObjectArray(ArrayType {
                additional_dimensions: 0,
                element_type,
            }),
            FieldType::Ref(RefType::PrimitiveArray(arr)) => RefType::PrimitiveArray(ArrayType {
                additional_dimensions: arr.additional_dimensions + 1,
                element_type: arr.element_type,
            }),
            FieldType::Ref(RefType::ObjectArray(arr)) => RefType::ObjectArray(ArrayType {
                additional_dimensions: arr.additional_dimensions + 1,
                element_type: arr.element_type,
            }),
        }
    }

    /// Number of array dimensions (0 for plain objects)
    pub fn dimensions(&self) -> usize {
        match self {
            RefType::Object(_) => 0,
            RefType::ObjectArray(arr) => arr.dimensions(),
            RefType::PrimitiveArray(arr) => arr.dimensions(),
        }
    }
}

/// Type of a class, instance, or local variable
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldType<Class> {
    Base(BaseType),
    Ref(RefType<Class>),
}

impl<C> Width for FieldType<C> {
    fn width(&self) -> usize {
        match self {
            FieldType::Base(base_type) => base_type.width(),
            FieldType::Ref(_) => 1,
        }
    }
}

impl<C> FieldType<C> {
    pub fn array(field_type: FieldType<C>) -> FieldType<C> {
        FieldType::Ref(RefType::array(field_type))
    }

    pub const fn object(class_name: C) -> FieldType<C> {
        FieldType::Ref(RefType::Object(class_name))
    }

    pub const fn int() -> FieldType<C> {
        FieldType::Base(BaseType::Int)
    }

    pub const fn long() -> FieldType<C> {
        FieldType::Base(BaseType::Long)
    }

    pub const fn float() -> FieldType<C> {
        FieldType::Base(BaseType::Float)
    }

    pub const fn double() -> FieldType<C> {
        FieldType::Base(BaseType::Double)
    }

    pub const fn boolean() -> FieldType<C> {
        FieldType::Base(BaseType::Boolean)
    }
}

impl<C: RenderDescriptor> RenderDescriptor for FieldType<C> {
    fn render_to(&self, write_to: &mut String) {
        match self {
            FieldType::Base(base_type) => base_type.render_to(write_to),
            FieldType::Ref(reference_type) => reference_type.render_to(write_to),
        }
    }
}

impl<C: ParseDescriptor> ParseDescriptor for FieldType<C> {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self, Error> {
        match source.peek().copied() {
            None => Err(Error::BadDescriptor(String::from("Missing field type"))),
            Some('B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z') => {
                BaseType::parse_from(source).map(FieldType::Base)
            }
            Some('L' | '[') => RefType::parse_from(source).map(FieldType::Ref),
            Some(c) => {
                let msg = format!("Invalid field type character '{}'", c);
                Err(Error::BadDescriptor(msg))
            }
        }
    }
}

/// Signature of a method
#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct MethodDescriptor<Class> {
    pub parameters: Vec<FieldType<Class>>,
    pub return_type: Option<FieldType<Class>>, // `None` is for `void` (ie. no return)
}

impl<C> MethodDescriptor<C> {
    /// Total length of parameters (not the same as the length of the vector),
    /// which must be 255 or less for it to be valid
    pub fn parameter_length(&self, has_this_param: bool) -> usize {
        let this_len = if has_this_param { 1 } else { 0 };
        this_len
            + self
                .parameters
                .iter()
                .map(|parameter| parameter.width())
                .sum::<usize>()
    }
}

impl<C: RenderDescriptor> RenderDescriptor for MethodDescriptor<C> {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('(');
        for parameter in &self.parameters {
            parameter.render_to(write_to);
        }
        write_to.push(')');
        match &self.return_type {
            None => write_to.push('V'),
            Some(typ) => typ.render_to(write_to),
        };
    }
}

impl<C: ParseDescriptor> ParseDescriptor for MethodDescriptor<C> {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self, Error> {
        if source.next_if_eq(&'(').is_none() {
            return Err(Error::BadDescriptor(String::from("Expected '(' for method")));
        }

        let mut parameters = vec![];
        while source.peek().copied() != Some(')') {
            parameters.push(FieldType::<C>::parse_from(source)?);
        }
        let _ = source.next();

        let return_type = if source.next_if_eq(&'V').is_some() {
            None
        } else {
            Some(FieldType::<C>::parse_from(source)?)
        };

        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }
}

/// Do two method descriptors take the same parameters (regardless of return type)?
pub fn same_parameters(descriptor1: &str, descriptor2: &str) -> bool {
    fn parameters(descriptor: &str) -> &str {
        match descriptor.find(')') {
            Some(end) => &descriptor[..=end],
            None => descriptor,
        }
    }
    parameters(descriptor1) == parameters(descriptor2)
}

/// Rewrite every class name mentioned in a descriptor or generic signature
///
/// `rename` receives internal class names (`java/util/List`) and returns the replacement, if any.
/// Type variables (`TT;`), names of type parameters, and the simple names of inner class suffixes
/// (`.Inner`) are left alone.
pub fn rename_classes_in_signature(
    signature: &str,
    rename: impl FnMut(&str) -> Option<String>,
) -> Result<String, Error> {
    SignatureWalker {
        source: signature,
        position: 0,
        output: String::with_capacity(signature.len()),
        rename,
    }
    .walk()
}

/// Every class name mentioned in a descriptor or generic signature, in order of appearance
pub fn classes_in_signature(signature: &str) -> Result<Vec<String>, Error> {
    let mut classes = vec![];
    rename_classes_in_signature(signature, |name| {
        classes.push(name.to_owned());
        None
    })?;
    Ok(classes)
}

/// Copies a signature through while handing class names to a renaming callback
///
/// Every delimiter in the signature grammar is ASCII, so slicing at them is always on a character
/// boundary.
struct SignatureWalker<'s, F> {
    source: &'s str,
    position: usize,
    output: String,
    rename: F,
}

impl<'s, F: FnMut(&str) -> Option<String>> SignatureWalker<'s, F> {
    fn peek(&self) -> Option<u8> {
        self.source.as_bytes().get(self.position).copied()
    }

    fn error(&self, msg: &str) -> Error {
        Error::BadDescriptor(format!(
            "{} at {} in '{}'",
            msg, self.position, self.source
        ))
    }

    /// Copy one ASCII delimiter through
    fn push_delimiter(&mut self) {
        if let Some(c) = self.peek() {
            self.output.push(c as char);
            self.position += 1;
        }
    }

    /// Scan up to (not including) the first of `stops`
    fn scan_until(&mut self, stops: &[u8]) -> Result<&'s str, Error> {
        let source: &'s str = self.source;
        let start = self.position;
        match source.as_bytes()[start..]
            .iter()
            .position(|b| stops.contains(b))
        {
            Some(len) => {
                self.position += len;
                Ok(&source[start..start + len])
            }
            None => Err(self.error("Unterminated name")),
        }
    }

    fn walk(mut self) -> Result<String, Error> {
        if self.peek() == Some(b'<') {
            self.type_parameters()?;
        }
        while let Some(c) = self.peek() {
            match c {
                b'(' | b')' | b'^' | b'V' => self.push_delimiter(),
                _ => self.field_type()?,
            }
        }
        Ok(self.output)
    }

    fn type_parameters(&mut self) -> Result<(), Error> {
        self.push_delimiter();
        loop {
            match self.peek() {
                Some(b'>') => {
                    self.push_delimiter();
                    return Ok(());
                }
                Some(_) => {
                    let identifier = self.scan_until(b":")?;
                    self.output.push_str(identifier);
                    while self.peek() == Some(b':') {
                        self.push_delimiter();
                        if let Some(b'L' | b'T' | b'[') = self.peek() {
                            self.field_type()?;
                        }
                    }
                }
                None => return Err(self.error("Unterminated type parameters")),
            }
        }
    }

    fn field_type(&mut self) -> Result<(), Error> {
        match self.peek() {
            Some(b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z') => {
                self.push_delimiter();
                Ok(())
            }
            Some(b'[') => {
                self.push_delimiter();
                self.field_type()
            }
            Some(b'T') => {
                let variable = self.scan_until(b";")?;
                self.output.push_str(variable);
                self.push_delimiter();
                Ok(())
            }
            Some(b'L') => self.class_type(),
            Some(c) => Err(self.error(&format!("Unexpected '{}'", c as char))),
            None => Err(self.error("Missing type")),
        }
    }

    fn class_type(&mut self) -> Result<(), Error> {
        self.push_delimiter();
        let name = self.scan_until(b";<.")?;
        match (self.rename)(name) {
            Some(renamed) => self.output.push_str(&renamed),
            None => self.output.push_str(name),
        }
        loop {
            match self.peek() {
                Some(b'<') => self.type_arguments()?,
                Some(b'.') => {
                    self.push_delimiter();
                    let inner = self.scan_until(b";<.")?;
                    self.output.push_str(inner);
                }
                Some(b';') => {
                    self.push_delimiter();
                    return Ok(());
                }
                _ => return Err(self.error("Unterminated class type")),
            }
        }
    }

    fn type_arguments(&mut self) -> Result<(), Error> {
        self.push_delimiter();
        loop {
            match self.peek() {
                Some(b'>') => {
                    self.push_delimiter();
                    return Ok(());
                }
                Some(b'*') => self.push_delimiter(),
                Some(b'+' | b'-') => {
                    self.push_delimiter();
                    self.field_type()?;
                }
                Some(_) => self.field_type()?,
                None => return Err(self.error("Unterminated type arguments")),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fmt::Debug;

    fn round_trip<T: RenderDescriptor + ParseDescriptor + Debug + Eq>(rendered: &str, parsed: T) {
        assert_eq!(rendered, parsed.render());
        assert_eq!(T::parse(rendered).unwrap(), parsed);
    }

    type FT = FieldType<BinaryName>;

    const INT: FT = FieldType::Base(BaseType::Int);
    const DOUBLE: FT = FieldType::Base(BaseType::Double);
    const OBJECT: FT = FieldType::object(BinaryName::OBJECT);
    const STRING: FT = FieldType::object(BinaryName::STRING);
    const INTEGER: FT = FieldType::object(BinaryName::INTEGER);

    #[test]
    fn base_types() {
        round_trip("B", BaseType::Byte);
        round_trip("C", BaseType::Char);
        round_trip("D", BaseType::Double);
        round_trip("F", BaseType::Float);
        round_trip("I", BaseType::Int);
        round_trip("J", BaseType::Long);
        round_trip("S", BaseType::Short);
        round_trip("Z", BaseType::Boolean);
    }

    #[test]
    fn field_types() {
        round_trip("I", INT);
        round_trip("Ljava/lang/Object;", OBJECT);
        round_trip(
            "[[[D",
            FieldType::array(FieldType::array(FieldType::array(DOUBLE))),
        );
        round_trip("[Ljava/lang/String;", FieldType::array(STRING));
    }

    #[test]
    fn method_descriptors() {
        round_trip(
            "(IDLjava/lang/Integer;)Ljava/lang/Object;",
            MethodDescriptor {
                parameters: vec![INT, DOUBLE, INTEGER],
                return_type: Some(OBJECT),
            },
        );
        round_trip(
            "()V",
            MethodDescriptor {
                parameters: Vec::<FT>::new(),
                return_type: None,
            },
        );
        let desc = MethodDescriptor::<BinaryName>::parse("(JILjava/lang/String;D)V").unwrap();
        assert_eq!(desc.parameter_length(true), 7);
    }

    #[test]
    fn bad_descriptors() {
        assert!(matches!(FT::parse("Q"), Err(Error::BadDescriptor(_))));
        assert!(matches!(FT::parse("Ljava/lang/Object"), Err(Error::BadDescriptor(_))));
        assert!(matches!(FT::parse("II"), Err(Error::BadDescriptor(_))));
        assert!(MethodDescriptor::<BinaryName>::parse("I)V").is_err());
    }

    #[test]
    fn compare_parameters() {
        assert!(same_parameters("(ILjava/lang/Object;)V", "(ILjava/lang/Object;)I"));
        assert!(!same_parameters("(I)V", "(J)V"));
    }

    fn rename_a_to_b(name: &str) -> Option<String> {
        match name {
            "a/A" => Some(String::from("b/B")),
            _ => None,
        }
    }

    #[test]
    fn rename_in_descriptors() {
        assert_eq!(
            rename_classes_in_signature("(La/A;[La/A;I)La/AA;", rename_a_to_b).unwrap(),
            "(Lb/B;[Lb/B;I)La/AA;"
        );
        assert_eq!(
            rename_classes_in_signature("La/A;", rename_a_to_b).unwrap(),
            "Lb/B;"
        );
    }

    #[test]
    fn rename_in_generic_signatures() {
        // type variables and type parameter names that look like class names are untouched
        let sig = "<La/A:Ljava/lang/Object;T::La/A;>(TLa/A;Ljava/util/List<+La/A;>;)La/A<*>.A<TT;>;^La/A;";
        assert_eq!(
            rename_classes_in_signature(sig, rename_a_to_b).unwrap(),
            "<La/A:Ljava/lang/Object;T::Lb/B;>(TLa/A;Ljava/util/List<+Lb/B;>;)Lb/B<*>.A<TT;>;^Lb/B;"
        );
    }

    #[test]
    fn collect_from_signature() {
        assert_eq!(
            classes_in_signature("Ljava/util/Map<Ljava/lang/String;[Lp/Q;>;").unwrap(),
            vec!["java/util/Map", "java/lang/String", "p/Q"]
        );
        assert!(classes_in_signature("Ljava/util/Map<").is_err());
    }
}
