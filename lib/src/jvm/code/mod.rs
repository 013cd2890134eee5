//! Editing raw method bodies
//!
//! Method bodies are kept as the raw encoded instructions (see
//! [`Code`](crate::jvm::class_file::Code)). Rather than decoding them into some higher level
//! representation and re-encoding after edits, the editor works directly on the bytes:
//!
//!   - [`opcodes`] knows how long every instruction is and which ones carry constant pool indices
//!     or jump offsets
//!   - [`CodeIterator`] walks the instructions one at a time and lets callers overwrite bytes,
//!     append code, and open gaps
//!   - opening a gap (see [`insert_gap`]) fixes up every offset that points past the gap: jumps,
//!     switch targets, the exception table, line numbers, local variables, and stack map frames
//!   - [`Bytecode`] is a small emitter for the glue code around spliced-in snippets
//!
//! Nothing here attempts to verify the code.

mod emit;
mod fixup;
mod iterator;
pub mod opcodes;

pub use emit::*;
pub use fixup::{insert_gap, Gap, MAX_CODE_LENGTH};
pub use iterator::*;
