use super::compiler::SnippetCompiler;
use super::expr::{class_type, primitive_array_element, EditState, Expr, ExprKind};
use crate::jvm::class_file::{ClassConstantIndex, ClassFile, Code, ConstantIndex, ConstantPool};
use crate::jvm::code::{opcodes, CodeIterator};
use crate::jvm::{Error, FieldType, Name, RenderDescriptor, UnqualifiedName};

/// Callback for each site found by the [`ExprEditor`]
pub trait ExprVisitor {
    fn visit(&mut self, expr: &mut Expr<'_, '_>) -> Result<(), Error>;
}

impl<F> ExprVisitor for F
where
    F: FnMut(&mut Expr<'_, '_>) -> Result<(), Error>,
{
    fn visit(&mut self, expr: &mut Expr<'_, '_>) -> Result<(), Error> {
        self(expr)
    }
}

/// Recomputes the stack map of a method body after it was edited
///
/// Gaps keep existing frames valid, but replaced code (and code appended for handlers) may need
/// frames of its own. Computing them requires type inference over the whole method, which is
/// left to the implementation.
pub trait StackMapRebuilder {
    fn rebuild(&mut self, code: &mut Code, pool: &mut ConstantPool) -> Result<(), Error>;
}

/// `new` waiting for its `invokespecial <init>`
#[derive(Debug)]
struct PendingNew {
    position: usize,
    class: String,
}

/// Scans method bodies for instrumentable sites
///
/// Sites are visited in code order: method calls, field accesses, allocations (a `new` is
/// reported at the `invokespecial <init>` that initializes it), casts, and `instanceof`. Once the
/// instructions have been scanned, the exception handlers that were in the method before editing
/// are visited.
pub struct ExprEditor<C> {
    compiler: C,
    stack_map_rebuilder: Option<Box<dyn StackMapRebuilder>>,
}

impl<C: SnippetCompiler> ExprEditor<C> {
    pub fn new(compiler: C) -> ExprEditor<C> {
        ExprEditor {
            compiler,
            stack_map_rebuilder: None,
        }
    }

    /// Rebuild stack maps of edited methods that had one
    pub fn with_stack_map_rebuilder(
        mut self,
        rebuilder: Box<dyn StackMapRebuilder>,
    ) -> ExprEditor<C> {
        self.stack_map_rebuilder = Some(rebuilder);
        self
    }

    pub fn compiler(&self) -> &C {
        &self.compiler
    }

    /// Edit every method body in the class, returning whether anything changed
    pub fn edit_class<V: ExprVisitor + ?Sized>(
        &mut self,
        class: &mut ClassFile,
        visitor: &mut V,
    ) -> Result<bool, Error> {
        let (methods, pool) = class.methods_and_pool_mut()?;
        let mut edited = false;
        for method in methods {
            if let Some(code) = method.code_mut() {
                edited |= self.edit_code(code, pool, visitor)?;
            }
        }
        Ok(edited)
    }

    /// Edit one method body, returning whether anything changed
    pub fn edit_code<V: ExprVisitor + ?Sized>(
        &mut self,
        code: &mut Code,
        pool: &mut ConstantPool,
        visitor: &mut V,
    ) -> Result<bool, Error> {
        let had_stack_map = code.stack_map_table().is_some();
        let original_handlers = code.exception_table.len();
        let mut state = EditState {
            base_locals: code.max_locals,
            max_locals: code.max_locals,
            extra_stack: 0,
            edited: false,
        };

        {
            let mut iterator = CodeIterator::new(code);
            let mut pending_news: Vec<PendingNew> = vec![];
            while iterator.has_next() {
                let position = iterator.next()?;
                let kind = match classify(&iterator, pool, position, &mut pending_news)? {
                    Some(kind) => kind,
                    None => continue,
                };
                let mut expr = Expr {
                    iterator: &mut iterator,
                    pool: &mut *pool,
                    compiler: &mut self.compiler,
                    state: &mut state,
                    position,
                    kind,
                };
                visitor.visit(&mut expr)?;
            }

            // Snippets only ever prepend entries, so the original ones are always at the end
            for i in 0..original_handlers {
                let table = &iterator.code().exception_table;
                let index = table.len() - original_handlers + i;
                let handler = table[index];
                let catch_type = match handler.catch_type {
                    Some(class) => Some(pool.get_class_name(class)?.to_owned()),
                    None => None,
                };
                let mut expr = Expr {
                    iterator: &mut iterator,
                    pool: &mut *pool,
                    compiler: &mut self.compiler,
                    state: &mut state,
                    position: handler.handler_pc as usize,
                    kind: ExprKind::Handler { index, catch_type },
                };
                visitor.visit(&mut expr)?;
            }
        }

        if state.edited {
            code.max_stack = code.max_stack.saturating_add(state.extra_stack);
            code.max_locals = state.max_locals;
            if had_stack_map {
                if let Some(rebuilder) = &mut self.stack_map_rebuilder {
                    rebuilder.rebuild(code, pool)?;
                }
            }
        }
        Ok(state.edited)
    }
}

/// Decide what sort of site (if any) the instruction at `position` is
fn classify(
    iterator: &CodeIterator<'_>,
    pool: &ConstantPool,
    position: usize,
    pending_news: &mut Vec<PendingNew>,
) -> Result<Option<ExprKind>, Error> {
    let opcode = iterator.byte_at(position)?;
    let constant = || -> Result<ConstantIndex, Error> {
        Ok(ConstantIndex(iterator.u16_at(position + 1)?))
    };
    let class_constant = || -> Result<String, Error> {
        Ok(pool
            .get_class_name(ClassConstantIndex(constant()?))?
            .to_owned())
    };

    let kind = match opcode {
        opcodes::NEW => {
            pending_news.push(PendingNew {
                position,
                class: class_constant()?,
            });
            return Ok(None);
        }
        opcodes::INVOKEVIRTUAL
        | opcodes::INVOKESPECIAL
        | opcodes::INVOKESTATIC
        | opcodes::INVOKEINTERFACE => {
            let member = pool.get_member_ref(constant()?)?;
            if opcode == opcodes::INVOKESPECIAL && member.name == UnqualifiedName::INIT.as_str() {
                let matches_pending = pending_news
                    .last()
                    .map_or(false, |pending| pending.class == member.class);
                let pending = if matches_pending {
                    pending_news.pop()
                } else {
                    None
                };
                match pending {
                    Some(pending) => ExprKind::New {
                        new_position: pending.position,
                        class: pending.class,
                        descriptor: member.descriptor.to_owned(),
                    },
                    None => {
                        if let Some(unmatched) = pending_news.last() {
                            log::debug!(
                                "Constructor of {} at {} does not match pending new of {}",
                                member.class,
                                position,
                                unmatched.class
                            );
                        }
                        ExprKind::ConstructorCall {
                            class: member.class.to_owned(),
                            descriptor: member.descriptor.to_owned(),
                        }
                    }
                }
            } else {
                ExprKind::MethodCall {
                    opcode,
                    class: member.class.to_owned(),
                    name: member.name.to_owned(),
                    descriptor: member.descriptor.to_owned(),
                }
            }
        }
        opcodes::GETSTATIC | opcodes::PUTSTATIC | opcodes::GETFIELD | opcodes::PUTFIELD => {
            let member = pool.get_member_ref(constant()?)?;
            ExprKind::FieldAccess {
                opcode,
                class: member.class.to_owned(),
                name: member.name.to_owned(),
                descriptor: member.descriptor.to_owned(),
            }
        }
        opcodes::NEWARRAY => {
            let atype = iterator.byte_at(position + 1)?;
            let element = primitive_array_element(atype).ok_or_else(|| Error::BadBytecode {
                position,
                message: format!("newarray of unknown type {}", atype),
            })?;
            ExprKind::NewArray {
                opcode,
                array_type: FieldType::<crate::jvm::BinaryName>::array(FieldType::Base(element))
                    .render(),
                dimensions: 1,
            }
        }
        opcodes::ANEWARRAY => {
            let element = class_type(&class_constant()?)?;
            ExprKind::NewArray {
                opcode,
                array_type: FieldType::array(element).render(),
                dimensions: 1,
            }
        }
        opcodes::MULTIANEWARRAY => ExprKind::NewArray {
            opcode,
            array_type: class_constant()?,
            dimensions: iterator.byte_at(position + 3)?,
        },
        opcodes::CHECKCAST => ExprKind::Cast {
            class: class_constant()?,
        },
        opcodes::INSTANCEOF => ExprKind::InstanceOf {
            class: class_constant()?,
        },
        _ => return Ok(None),
    };
    Ok(Some(kind))
}
