//! Read, edit, and rewrite JVM class files
//!
//! ### Structure
//!
//!   - [`class_file`] is a faithful model of the binary class file format: the constant pool,
//!     fields, methods, and their attributes. Parsing a class and serializing it back without
//!     changes produces the same bytes.
//!   - [`code`] contains the bytecode editing engine. A [`code::CodeIterator`] walks the raw
//!     instructions of a method body and can open gaps in it while keeping every branch offset,
//!     exception range, debug table, and stack map frame pointing at the right instruction.
//!   - [`expr`] builds on the editor to find instrumentation sites (method calls, field accesses,
//!     allocations, casts, handlers) and replace them with freshly compiled snippets.
//!
//! ### Simple example
//!
//! Consider the following simple Java class:
//!
//! ```java,ignore,no_run
//! public class Point {
//!     public int x;
//!     public int y;
//! }
//! ```
//!
//! Generating an analogous class file can be done as follows:
//!
//! ```
//! use classweave::jvm::class_file::{ClassFile, Field};
//! use classweave::jvm::*;
//!
//! # fn generate_class() -> Result<Vec<u8>, Error> {
//! let mut class = ClassFile::new("me.alec.Point", "java.lang.Object", ClassAccessFlags::PUBLIC)?;
//! for name in ["x", "y"] {
//!     let field = Field::new(class.constants_mut()?, FieldAccessFlags::PUBLIC, name, "I")?;
//!     class.add_field(field)?;
//! }
//! class.to_bytes()
//! # }
//! # generate_class().unwrap();
//! ```

mod access_flags;
pub mod class_file;
pub mod code;
mod descriptors;
mod errors;
pub mod expr;
mod names;

pub use access_flags::*;
pub use descriptors::*;
pub use errors::*;
pub use names::*;
