//! Binary model of the class file format
//!
//! Everything here mirrors the [class file structure][0] closely: constants are referred to by
//! their index in the [`ConstantPool`], and every attribute is kept (known ones decoded, unknown
//! ones as raw bytes) so that an unmodified class serializes back to identical bytes.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html

mod annotations;
mod attribute;
mod binary_format;
mod class;
mod code;
mod constants;
mod field;
mod method;
mod stack_map;
mod version;

pub use annotations::*;
pub use attribute::*;
pub use binary_format::*;
pub use class::*;
pub use code::*;
pub use constants::*;
pub use field::*;
pub use method::*;
pub use stack_map::*;
pub use version::*;
