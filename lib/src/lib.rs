//! Read, structurally edit, and rewrite JVM class files
//!
//! The crate is organized bottom-up:
//!
//!   - [`jvm::class_file`] is the structural model: constant pool, attributes, fields, methods,
//!     and the class file itself, along with its exact binary encoding
//!   - [`jvm::code`] edits raw method bodies in place while keeping every embedded offset valid
//!   - [`jvm::expr`] scans method bodies for instrumentable sites and splices in freshly compiled
//!     snippets
//!
//! ### Example
//!
//! ```
//! use classweave::jvm::class_file::{ClassFile, Field};
//! use classweave::jvm::{ClassAccessFlags, FieldAccessFlags, Error};
//!
//! # fn build() -> Result<(), Error> {
//! let mut class = ClassFile::new("test.Foo", "java.lang.Object", ClassAccessFlags::PUBLIC)?;
//! let width = Field::new(class.constants_mut()?, FieldAccessFlags::PUBLIC, "width", "I")?;
//! class.add_field(width)?;
//!
//! let bytes: Vec<u8> = class.to_bytes()?;
//! let reparsed = ClassFile::parse(&bytes)?;
//! assert_eq!(reparsed.superclass()?.as_deref(), Some("java.lang.Object"));
//! # Ok(())
//! # }
//! # build().unwrap();
//! ```

pub mod jvm;
pub mod util;
