use crate::jvm::class_file::{ConstantPool, ExceptionHandler};
use crate::jvm::{BinaryName, FieldType};
use std::fmt;

/// Turns snippet source text into bytecode
///
/// The source language is up to the implementation. Snippets refer to the values of the site
/// being replaced through placeholders:
///
///   - `$0` is the target of the site (the receiver of a call or field access)
///   - `$1`, `$2`, ... are the arguments of the site
///   - `$_` is the result of the site, which the snippet must assign if the site has a result
///
/// The [`SnippetContract`] says which local variable holds each placeholder. The compiled code
/// must leave the operand stack as it found it: the editor takes care of moving values between
/// the stack and the placeholder locals.
pub trait SnippetCompiler {
    fn compile(
        &mut self,
        source: &str,
        contract: &SnippetContract,
        pool: &mut ConstantPool,
    ) -> Result<CompiledSnippet, CompileError>;
}

impl<C: SnippetCompiler + ?Sized> SnippetCompiler for &mut C {
    fn compile(
        &mut self,
        source: &str,
        contract: &SnippetContract,
        pool: &mut ConstantPool,
    ) -> Result<CompiledSnippet, CompileError> {
        (**self).compile(source, contract, pool)
    }
}

/// Local variable bound to a placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Local {
    pub index: u16,
    pub field_type: FieldType<BinaryName>,
}

/// What a snippet gets to work with and what it must produce
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnippetContract {
    /// `$0`, if the site has a target
    pub target: Option<Local>,

    /// `$1`, `$2`, ...
    pub parameters: Vec<Local>,

    /// `$_`, if the site has a result (it is initialized to zero/null before the snippet runs)
    pub result: Option<Local>,

    /// First local variable free for the snippet's own use
    pub first_free_local: u16,

    /// Class the site refers to, as an internal name or array descriptor
    pub class_name: String,

    /// Name and descriptor of the member, for calls and field accesses
    pub member: Option<(String, String)>,
}

/// Output of a snippet compiler
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompiledSnippet {
    pub code: Vec<u8>,

    /// Exception handlers, with offsets relative to the start of `code`
    pub exception_table: Vec<ExceptionHandler>,

    pub max_stack: u16,

    /// Highest local variable slot used (plus one)
    pub max_locals: u16,
}

/// Snippet rejected by the compiler (or by the editor, before compiling)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub message: String,

    /// Approximate offset in the source text
    pub position: Option<usize>,
}

impl CompileError {
    pub fn new(message: impl Into<String>) -> CompileError {
        CompileError {
            message: message.into(),
            position: None,
        }
    }

    pub fn at(message: impl Into<String>, position: usize) -> CompileError {
        CompileError {
            message: message.into(),
            position: Some(position),
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            None => write!(f, "compile error: {}", self.message),
            Some(position) => write!(f, "compile error at {}: {}", position, self.message),
        }
    }
}

impl std::error::Error for CompileError {}
