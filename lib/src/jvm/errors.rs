use super::class_file::Constant;
use super::expr::CompileError;
use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// Input bytes are not a well-formed class file (bad magic, truncation, bad lengths...)
    MalformedInput(String),

    /// A constant pool index is 0, out of range, the unusable slot after a `long`/`double`, or
    /// refers to a constant of the wrong kind
    BadConstantIndex {
        index: u16,
        expected: &'static str,
    },

    /// Adding this constant would push the pool past 65535 slots
    ConstantPoolOverflow {
        constant: Constant,
        offset: u16,
    },

    BadDescriptor(String),

    /// A field with the same name, or a method with the same name and descriptor, already exists
    DuplicateMember {
        name: String,
        descriptor: String,
    },

    CodeTooLarge(CodeTooLarge),

    /// Bytecode that cannot be decoded
    BadBytecode {
        position: usize,
        message: String,
    },

    /// A snippet was rejected
    Compile(CompileError),

    /// The class was frozen after pruning and must be defrosted before editing
    Frozen(String),

    IoError(std::io::Error),
}

/// Ways in which an edit can overflow the limits of a method body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeTooLarge {
    /// Method bodies are at most 65535 bytes long
    CodeLength { length: usize },

    /// A 16-bit branch at `position` would need an offset outside of `i16`
    BranchOffset { position: usize, offset: i64 },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MalformedInput(msg) => write!(f, "malformed class file: {}", msg),
            Error::BadConstantIndex { index, expected } => {
                write!(f, "bad constant pool index #{} (expected {})", index, expected)
            }
            Error::ConstantPoolOverflow { constant, offset } => write!(
                f,
                "constant pool overflow adding {:?} at offset {}",
                constant, offset
            ),
            Error::BadDescriptor(msg) => write!(f, "bad descriptor: {}", msg),
            Error::DuplicateMember { name, descriptor } => {
                write!(f, "duplicate member: {} {}", name, descriptor)
            }
            Error::CodeTooLarge(CodeTooLarge::CodeLength { length }) => {
                write!(f, "code too large: {} bytes", length)
            }
            Error::CodeTooLarge(CodeTooLarge::BranchOffset { position, offset }) => write!(
                f,
                "code too large: branch at {} needs offset {}",
                position, offset
            ),
            Error::BadBytecode { position, message } => {
                write!(f, "bad bytecode at {}: {}", position, message)
            }
            Error::Compile(err) => write!(f, "{}", err),
            Error::Frozen(class) => write!(f, "class {} is frozen", class),
            Error::IoError(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            Error::Compile(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}

impl From<CompileError> for Error {
    fn from(err: CompileError) -> Error {
        Error::Compile(err)
    }
}

impl From<CodeTooLarge> for Error {
    fn from(err: CodeTooLarge) -> Error {
        Error::CodeTooLarge(err)
    }
}
