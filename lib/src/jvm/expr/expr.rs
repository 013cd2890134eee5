use super::compiler::{CompileError, Local, SnippetCompiler, SnippetContract};
use crate::jvm::class_file::ConstantPool;
use crate::jvm::code::{opcodes, Bytecode, CodeIterator, LocalKind};
use crate::jvm::{
    BaseType, BinaryName, Error, FieldType, MethodDescriptor, Name, ParseDescriptor,
    UnqualifiedName,
};
use crate::util::Width;

/// Instrumentable site in a method body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprKind {
    /// `invokevirtual`, `invokespecial`, `invokestatic`, or `invokeinterface` (other than a
    /// constructor call)
    MethodCall {
        opcode: u8,
        class: String,
        name: String,
        descriptor: String,
    },

    /// `invokespecial <init>` which does not initialize an object allocated in this method (so
    /// `super(...)` or `this(...)` in a constructor)
    ConstructorCall { class: String, descriptor: String },

    /// `getfield`, `putfield`, `getstatic`, or `putstatic`
    FieldAccess {
        opcode: u8,
        class: String,
        name: String,
        descriptor: String,
    },

    /// `new` paired with the `invokespecial <init>` that initializes it
    ///
    /// The site position is that of the `invokespecial`.
    New {
        new_position: usize,
        class: String,
        descriptor: String,
    },

    /// `newarray`, `anewarray`, or `multianewarray`
    NewArray {
        opcode: u8,

        /// Descriptor of the array created
        array_type: String,

        /// Number of dimension sizes popped off the stack
        dimensions: u8,
    },

    /// `checkcast`
    Cast { class: String },

    /// `instanceof`
    InstanceOf { class: String },

    /// Entry in the exception table (the site position is that of the handler)
    Handler {
        index: usize,

        /// `None` for `finally` blocks
        catch_type: Option<String>,
    },
}

impl ExprKind {
    pub fn describe(&self) -> &'static str {
        match self {
            ExprKind::MethodCall { .. } => "method call",
            ExprKind::ConstructorCall { .. } => "constructor call",
            ExprKind::FieldAccess { .. } => "field access",
            ExprKind::New { .. } => "object allocation",
            ExprKind::NewArray { .. } => "array allocation",
            ExprKind::Cast { .. } => "cast",
            ExprKind::InstanceOf { .. } => "instanceof",
            ExprKind::Handler { .. } => "exception handler",
        }
    }
}

/// Bookkeeping shared by every site in one method body
#[derive(Debug)]
pub(super) struct EditState {
    /// First local not used by the original method (placeholders are allocated from here)
    pub base_locals: u16,
    pub max_locals: u16,
    /// Deepest stack any inserted code needs on top of what the method already had there
    pub extra_stack: u16,
    pub edited: bool,
}

impl EditState {
    /// Note an edit whose code pushes at most `stack` entries over the values live at the site
    fn record(&mut self, stack: u16, max_locals: u16) {
        self.extra_stack = self.extra_stack.max(stack);
        self.max_locals = self.max_locals.max(max_locals);
        self.edited = true;
    }
}

/// Stack shape of a site: what it pops and what it pushes
struct Site {
    position: usize,
    size: usize,
    target: Option<FieldType<BinaryName>>,
    parameters: Vec<FieldType<BinaryName>>,
    result: Option<FieldType<BinaryName>>,
    class_name: String,
    member: Option<(String, String)>,
}

/// Site found by the [`ExprEditor`](super::ExprEditor), handed to an
/// [`ExprVisitor`](super::ExprVisitor)
pub struct Expr<'e, 'c> {
    pub(super) iterator: &'e mut CodeIterator<'c>,
    pub(super) pool: &'e mut ConstantPool,
    pub(super) compiler: &'e mut dyn SnippetCompiler,
    pub(super) state: &'e mut EditState,
    pub(super) position: usize,
    pub(super) kind: ExprKind,
}

impl<'e, 'c> Expr<'e, 'c> {
    pub fn kind(&self) -> &ExprKind {
        &self.kind
    }

    /// Position of the site in the code
    pub fn position(&self) -> usize {
        self.position
    }

    /// Source line of the site, if there is a line number table
    pub fn line_number(&self) -> Option<u16> {
        self.iterator.code().line_number(self.position)
    }

    pub fn constants(&self) -> &ConstantPool {
        self.pool
    }

    /// Class the site refers to (internal name, or array descriptor for array types)
    pub fn class_name(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::MethodCall { class, .. }
            | ExprKind::ConstructorCall { class, .. }
            | ExprKind::FieldAccess { class, .. }
            | ExprKind::New { class, .. }
            | ExprKind::Cast { class }
            | ExprKind::InstanceOf { class } => Some(class),
            ExprKind::NewArray { array_type, .. } => Some(array_type),
            ExprKind::Handler { catch_type, .. } => catch_type.as_deref(),
        }
    }

    /// Name of the method or field, for calls and field accesses
    pub fn member_name(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::MethodCall { name, .. } | ExprKind::FieldAccess { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Replace the site with a compiled snippet
    ///
    /// The snippet sees the values the site would have consumed as `$0` (target) and `$1`,
    /// `$2`, ... (arguments), and must assign `$_` if the site produces a value. If compilation
    /// fails, the method body is left as it was.
    pub fn replace(&mut self, source: &str) -> Result<(), Error> {
        let site = self.site()?;
        let mut nop_regions = vec![];
        if let ExprKind::New { new_position, .. } = self.kind {
            nop_regions.push((new_position, self.new_sequence_length(new_position)?));
        }
        self.replace_site(site, source, &nop_regions)
    }

    /// Run a snippet at the start of an exception handler
    ///
    /// The caught exception is available as `$1`. The snippet is appended to the end of the
    /// method body, followed by a jump back to the original handler, and the exception table
    /// entry is pointed at it.
    pub fn insert_before(&mut self, source: &str) -> Result<(), Error> {
        let (index, catch_type) = match &self.kind {
            ExprKind::Handler { index, catch_type } => (*index, catch_type.clone()),
            other => {
                return Err(CompileError::new(format!(
                    "cannot insert code before a {}",
                    other.describe()
                ))
                .into())
            }
        };
        let exception_type = match &catch_type {
            Some(class) => class_type(class)?,
            None => FieldType::object(BinaryName::THROWABLE),
        };

        let local = self.state.base_locals;
        let contract = SnippetContract {
            target: None,
            parameters: vec![Local {
                index: local,
                field_type: exception_type.clone(),
            }],
            result: None,
            first_free_local: checked_local(local as usize + 1)?,
            class_name: render_class(&exception_type),
            member: None,
        };
        let snippet = self.compiler.compile(source, &contract, self.pool)?;

        let position = self.iterator.code_length();
        let old_handler = self.iterator.code().exception_table[index].handler_pc as usize;
        let mut code = Bytecode::new();
        code.store(LocalKind::Reference, local);
        let snippet_offset = code.len();
        code.extend_from_slice(&snippet.code);
        code.load(LocalKind::Reference, local);
        code.goto(position, old_handler);

        let position = self.iterator.append(code.as_slice())?;
        self.iterator
            .insert_exception_entries(&snippet.exception_table, position + snippet_offset)?;

        // the new entries went in front of the handler being edited
        let index = index + snippet.exception_table.len();
        if let ExprKind::Handler { index: current, .. } = &mut self.kind {
            *current = index;
        }
        self.iterator.code_mut().exception_table[index].handler_pc = position as u16;

        self.state
            .record(snippet.max_stack.max(1), snippet.max_locals.max(contract.first_free_local));
        log::debug!(
            "Inserted {} bytes before exception handler at {}",
            code.len(),
            old_handler
        );
        Ok(())
    }

    /// Work out the stack contract of an instruction site
    fn site(&self) -> Result<Site, Error> {
        let position = self.position;
        let size = self.iterator.instruction_length(position)?;
        let object = || FieldType::object(BinaryName::OBJECT);

        let site = match &self.kind {
            ExprKind::MethodCall {
                opcode,
                class,
                name,
                descriptor,
            } => {
                let method = MethodDescriptor::<BinaryName>::parse(descriptor)?;
                Site {
                    position,
                    size,
                    target: if *opcode == opcodes::INVOKESTATIC {
                        None
                    } else {
                        Some(class_type(class)?)
                    },
                    parameters: method.parameters,
                    result: method.return_type,
                    class_name: class.clone(),
                    member: Some((name.clone(), descriptor.clone())),
                }
            }
            ExprKind::FieldAccess {
                opcode,
                class,
                name,
                descriptor,
            } => {
                let field_type = FieldType::<BinaryName>::parse(descriptor)?;
                let target = match *opcode {
                    opcodes::GETFIELD | opcodes::PUTFIELD => Some(class_type(class)?),
                    _ => None,
                };
                let (parameters, result) = match *opcode {
                    opcodes::GETFIELD | opcodes::GETSTATIC => (vec![], Some(field_type)),
                    _ => (vec![field_type], None),
                };
                Site {
                    position,
                    size,
                    target,
                    parameters,
                    result,
                    class_name: class.clone(),
                    member: Some((name.clone(), descriptor.clone())),
                }
            }
            ExprKind::New {
                class, descriptor, ..
            } => {
                let constructor = MethodDescriptor::<BinaryName>::parse(descriptor)?;
                Site {
                    position,
                    size,
                    target: None,
                    parameters: constructor.parameters,
                    result: Some(class_type(class)?),
                    class_name: class.clone(),
                    member: Some((UnqualifiedName::INIT.as_str().to_owned(), descriptor.clone())),
                }
            }
            ExprKind::NewArray {
                array_type,
                dimensions,
                ..
            } => Site {
                position,
                size,
                target: None,
                parameters: vec![FieldType::int(); *dimensions as usize],
                result: Some(FieldType::<BinaryName>::parse(array_type)?),
                class_name: array_type.clone(),
                member: None,
            },
            ExprKind::Cast { class } => Site {
                position,
                size,
                target: None,
                parameters: vec![object()],
                result: Some(class_type(class)?),
                class_name: class.clone(),
                member: None,
            },
            ExprKind::InstanceOf { class } => Site {
                position,
                size,
                target: None,
                parameters: vec![object()],
                result: Some(FieldType::boolean()),
                class_name: class.clone(),
                member: None,
            },
            other @ (ExprKind::ConstructorCall { .. } | ExprKind::Handler { .. }) => {
                return Err(CompileError::new(format!("cannot replace a {}", other.describe()))
                    .into())
            }
        };
        Ok(site)
    }

    /// Length of the allocation sequence starting with `new` at `position`, which gets blanked
    /// out when the allocation is replaced
    ///
    /// javac emits `new; dup` (sometimes followed by `dup2_x2; pop2`), jikes emits
    /// `new; dup_x1; swap`. Anything else is assumed to be just the `new`.
    fn new_sequence_length(&self, position: usize) -> Result<usize, Error> {
        let byte = |offset: usize| self.iterator.byte_at(position + offset).ok();
        let length = match (byte(3), byte(4), byte(5)) {
            (Some(opcodes::DUP), Some(opcodes::DUP2_X2), Some(opcodes::POP2)) => 6,
            (Some(opcodes::DUP), _, _) => 4,
            (Some(opcodes::DUP_X1), Some(opcodes::SWAP), _) => 5,
            _ => {
                log::warn!(
                    "Allocation at {} is not followed by a recognized dup sequence; \
                     blanking out only the new instruction",
                    position
                );
                3
            }
        };
        Ok(length)
    }

    fn replace_site(
        &mut self,
        site: Site,
        source: &str,
        nop_regions: &[(usize, usize)],
    ) -> Result<(), Error> {
        if site.result.is_some() && !source.contains("$_") {
            return Err(CompileError::new(format!(
                "the result of the {} must be assigned to $_",
                self.kind.describe()
            ))
            .into());
        }

        // Lay out the placeholder locals after the method's own locals
        let mut next_local = self.state.base_locals as usize;
        let mut allocate = |field_type: FieldType<BinaryName>| -> Result<Local, Error> {
            let index = checked_local(next_local)?;
            next_local += field_type.width();
            checked_local(next_local)?;
            Ok(Local { index, field_type })
        };
        let target = site.target.map(&mut allocate).transpose()?;
        let parameters = site
            .parameters
            .into_iter()
            .map(&mut allocate)
            .collect::<Result<Vec<_>, _>>()?;
        let result = site.result.map(&mut allocate).transpose()?;
        let contract = SnippetContract {
            target,
            parameters,
            result,
            first_free_local: checked_local(next_local)?,
            class_name: site.class_name,
            member: site.member,
        };

        let snippet = self.compiler.compile(source, &contract, self.pool)?;

        // Values consumed by the site go from the stack into their locals
        let mut code = Bytecode::new();
        for parameter in contract.parameters.iter().rev() {
            code.store(LocalKind::of_type(&parameter.field_type), parameter.index);
        }
        if let Some(target) = &contract.target {
            code.store(LocalKind::Reference, target.index);
        }
        if let Some(result) = &contract.result {
            let kind = LocalKind::of_type(&result.field_type);
            code.const_zero(kind);
            code.store(kind, result.index);
        }
        let snippet_offset = code.len();
        code.extend_from_slice(&snippet.code);
        if let Some(result) = &contract.result {
            code.load(LocalKind::of_type(&result.field_type), result.index);
        }

        // Gap goes at the end of the site, so that jumps and handler ranges starting at the site
        // cover the new code. A handler range starting at the site keeps its start and grows to
        // cover the snippet, and one ending at the site end is extended to the new end.
        let end = site.position + site.size;
        if code.len() > site.size {
            self.iterator.insert_gap(end, code.len() - site.size)?;
        }
        for &(start, length) in nop_regions {
            for position in start..start + length {
                self.iterator.write_nop(position)?;
            }
        }
        for position in site.position..end {
            self.iterator.write_nop(position)?;
        }
        self.iterator.write(code.as_slice(), site.position)?;
        self.iterator
            .insert_exception_entries(&snippet.exception_table, site.position + snippet_offset)?;

        let result_width = contract
            .result
            .as_ref()
            .map_or(0, |result| result.field_type.width() as u16);
        self.state.record(
            snippet.max_stack.max(result_width),
            snippet.max_locals.max(contract.first_free_local),
        );
        log::debug!(
            "Replaced {} at {} ({} bytes inserted)",
            self.kind.describe(),
            site.position,
            code.len().saturating_sub(site.size)
        );
        Ok(())
    }
}

/// Type of values of a class (internal name) or array (descriptor)
pub(super) fn class_type(class: &str) -> Result<FieldType<BinaryName>, Error> {
    if class.starts_with('[') {
        FieldType::parse(class)
    } else {
        BinaryName::from_string(class.to_owned())
            .map(FieldType::object)
            .map_err(Error::BadDescriptor)
    }
}

/// Element type of `newarray`, from its `atype` operand
pub(super) fn primitive_array_element(atype: u8) -> Option<BaseType> {
    match atype {
        4 => Some(BaseType::Boolean),
        5 => Some(BaseType::Char),
        6 => Some(BaseType::Float),
        7 => Some(BaseType::Double),
        8 => Some(BaseType::Byte),
        9 => Some(BaseType::Short),
        10 => Some(BaseType::Int),
        11 => Some(BaseType::Long),
        _ => None,
    }
}

fn render_class(field_type: &FieldType<BinaryName>) -> String {
    match field_type {
        FieldType::Ref(crate::jvm::RefType::Object(class)) => class.as_str().to_owned(),
        other => crate::jvm::RenderDescriptor::render(other),
    }
}

fn checked_local(index: usize) -> Result<u16, Error> {
    u16::try_from(index)
        .map_err(|_| CompileError::new("method needs more than 65535 local variable slots").into())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn class_types() {
        assert_eq!(
            class_type("java/lang/String").unwrap(),
            FieldType::object(BinaryName::STRING)
        );
        assert_eq!(
            class_type("[I").unwrap(),
            FieldType::array(FieldType::int())
        );
        assert!(class_type("java/lang/").is_err());
        assert_eq!(primitive_array_element(10), Some(BaseType::Int));
        assert_eq!(primitive_array_element(3), None);
    }
}
