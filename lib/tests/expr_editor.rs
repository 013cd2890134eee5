use classweave::jvm::class_file::{
    Attribute, AttributeBody, ClassFile, Code, ConstantIndex, ConstantPool, ExceptionHandler,
    LineNumber, Method, StackMapTable,
};
use classweave::jvm::code::opcodes::*;
use classweave::jvm::expr::{
    CompileError, CompiledSnippet, Expr, ExprEditor, ExprKind, ExprVisitor, SnippetCompiler,
    SnippetContract, StackMapRebuilder,
};
use classweave::jvm::{BinaryName, ClassAccessFlags, Error, FieldType, MethodAccessFlags};
use std::cell::Cell;
use std::rc::Rc;

/// Snippet compiler that always produces the same code, remembering what it was asked for
struct StubCompiler {
    code: Vec<u8>,
    exception_table: Vec<ExceptionHandler>,
    max_stack: u16,
    contracts: Vec<SnippetContract>,
}

impl StubCompiler {
    fn new(code: Vec<u8>) -> StubCompiler {
        StubCompiler {
            code,
            exception_table: vec![],
            max_stack: 1,
            contracts: vec![],
        }
    }
}

impl SnippetCompiler for StubCompiler {
    fn compile(
        &mut self,
        source: &str,
        contract: &SnippetContract,
        _pool: &mut ConstantPool,
    ) -> Result<CompiledSnippet, CompileError> {
        if let Some(position) = source.find("syntax error") {
            return Err(CompileError::at("unexpected token", position));
        }
        self.contracts.push(contract.clone());
        Ok(CompiledSnippet {
            code: self.code.clone(),
            exception_table: self.exception_table.clone(),
            max_stack: self.max_stack,
            max_locals: contract.first_free_local,
        })
    }
}

/// Replaces every site matching a predicate, recording all the sites seen
struct ReplaceWhere<P> {
    matches: P,
    source: &'static str,
    seen: Vec<(usize, ExprKind, Option<u16>)>,
}

impl<P: FnMut(&ExprKind) -> bool> ReplaceWhere<P> {
    fn new(source: &'static str, matches: P) -> ReplaceWhere<P> {
        ReplaceWhere {
            matches,
            source,
            seen: vec![],
        }
    }
}

impl<P: FnMut(&ExprKind) -> bool> ExprVisitor for ReplaceWhere<P> {
    fn visit(&mut self, expr: &mut Expr<'_, '_>) -> Result<(), Error> {
        self.seen
            .push((expr.position(), expr.kind().clone(), expr.line_number()));
        if (self.matches)(expr.kind()) {
            expr.replace(self.source)?;
        }
        Ok(())
    }
}

/// Runs a snippet at the start of every exception handler
struct InstrumentHandlers {
    source: &'static str,
    seen: Vec<ExprKind>,
}

impl ExprVisitor for InstrumentHandlers {
    fn visit(&mut self, expr: &mut Expr<'_, '_>) -> Result<(), Error> {
        if let ExprKind::Handler { .. } = expr.kind() {
            self.seen.push(expr.kind().clone());
            expr.insert_before(self.source)?;
        }
        Ok(())
    }
}

/// Counts how many times it was asked to rebuild a stack map
struct CountingRebuilder(Rc<Cell<usize>>);

impl StackMapRebuilder for CountingRebuilder {
    fn rebuild(&mut self, _code: &mut Code, _pool: &mut ConstantPool) -> Result<(), Error> {
        self.0.set(self.0.get() + 1);
        Ok(())
    }
}

fn is_call_to(name: &'static str) -> impl FnMut(&ExprKind) -> bool {
    move |kind| matches!(kind, ExprKind::MethodCall { name: n, .. } if n == name)
}

fn u16_bytes(index: impl Into<ConstantIndex>) -> [u8; 2] {
    let index: ConstantIndex = index.into();
    index.0.to_be_bytes()
}

/// Fifteen bytes that leave the stack as they found it
fn fifteen_byte_snippet() -> Vec<u8> {
    let mut code = vec![];
    for _ in 0..7 {
        code.extend_from_slice(&[ICONST_1, POP]);
    }
    code.push(NOP);
    code
}

/// Class with one static method:
///
/// ```text
///  0: iconst_0
///  1: ifeq 40
///  4: nop (x6)
/// 10: invokestatic test/Bar.tick()V
/// 13: nop (x27)
/// 40: return
/// 41: athrow
/// ```
fn class_with_call() -> ClassFile {
    let mut class =
        ClassFile::new("test.Foo", "java.lang.Object", ClassAccessFlags::PUBLIC).unwrap();
    let pool = class.constants_mut().unwrap();
    let tick = pool.add_method_ref("test/Bar", "tick", "()V", false).unwrap();

    let mut bytes = vec![NOP; 42];
    bytes[0] = ICONST_0;
    bytes[1..4].copy_from_slice(&[IFEQ, 0, 39]);
    bytes[10] = INVOKESTATIC;
    bytes[11..13].copy_from_slice(&u16_bytes(tick));
    bytes[40] = RETURN;
    bytes[41] = ATHROW;

    let mut code = Code::new(1, 0, bytes);
    code.exception_table = vec![(0, 10), (10, 13), (13, 40)]
        .into_iter()
        .map(|(start_pc, end_pc)| ExceptionHandler {
            start_pc,
            end_pc,
            handler_pc: 41,
            catch_type: None,
        })
        .collect();
    let lines = vec![(0, 1), (10, 2), (13, 3)]
        .into_iter()
        .map(|(start_pc, line_number)| LineNumber {
            start_pc,
            line_number,
        })
        .collect();
    code.attributes
        .push(Attribute::new(pool, AttributeBody::LineNumberTable(lines)).unwrap());

    let mut method = Method::new(pool, MethodAccessFlags::STATIC, "loop", "()V").unwrap();
    method.set_code(pool, code).unwrap();
    class.add_method(method).unwrap();
    class
}

#[test]
fn replacing_a_call_shifts_branches_and_handlers() {
    let mut class = class_with_call();
    let mut editor = ExprEditor::new(StubCompiler::new(fifteen_byte_snippet()));
    let mut visitor = ReplaceWhere::new("{ Bar.tock(); }", is_call_to("tick"));
    assert!(editor.edit_class(&mut class, &mut visitor).unwrap());

    // the three handler entries are visited as well, after the call
    let calls: Vec<_> = visitor
        .seen
        .iter()
        .filter(|(_, kind, _)| !matches!(kind, ExprKind::Handler { .. }))
        .collect();
    assert_eq!(calls.len(), 1);
    assert_eq!(visitor.seen.len(), 4);
    let (position, kind, line) = calls[0];
    assert_eq!(*position, 10);
    assert_eq!(*line, Some(2));
    assert_eq!(
        kind,
        &ExprKind::MethodCall {
            opcode: INVOKESTATIC,
            class: String::from("test/Bar"),
            name: String::from("tick"),
            descriptor: String::from("()V"),
        }
    );

    // static void call: no placeholders at all
    let contract = &editor.compiler().contracts[0];
    assert_eq!(contract.target, None);
    assert!(contract.parameters.is_empty());
    assert_eq!(contract.result, None);
    assert_eq!(contract.class_name, "test/Bar");

    // inspect what actually gets written out
    let parsed = ClassFile::parse(&class.to_bytes().unwrap()).unwrap();
    let code = parsed.get_method("loop", "()V").unwrap().code().unwrap();
    assert_eq!(code.code.len(), 54);
    assert_eq!(&code.code[1..4], &[IFEQ, 0, 51]);
    assert_eq!(&code.code[10..25], fifteen_byte_snippet().as_slice());
    assert!(code.code[25..52].iter().all(|byte| *byte == NOP));
    assert_eq!(&code.code[52..], &[RETURN, ATHROW]);

    let handlers: Vec<_> = code
        .exception_table
        .iter()
        .map(|handler| (handler.start_pc, handler.end_pc, handler.handler_pc))
        .collect();
    assert_eq!(handlers, vec![(0, 10, 53), (10, 25, 53), (25, 52, 53)]);

    let lines: Vec<_> = code
        .line_number_table()
        .unwrap()
        .iter()
        .map(|line| (line.start_pc, line.line_number))
        .collect();
    assert_eq!(lines, vec![(0, 1), (10, 2), (25, 3)]);
    assert_eq!(code.max_stack, 2);
}

#[test]
fn missing_result_is_a_compile_error() {
    let mut pool = ConstantPool::new();
    let size = pool.add_method_ref("test/Bar", "size", "()I", false).unwrap();
    let [hi, lo] = u16_bytes(size);
    let mut code = Code::new(1, 0, vec![INVOKESTATIC, hi, lo, POP, RETURN]);
    let before = code.clone();

    let mut editor = ExprEditor::new(StubCompiler::new(vec![ICONST_0, POP]));
    let mut visitor = ReplaceWhere::new("{ Bar.reset(); }", is_call_to("size"));
    let result = editor.edit_code(&mut code, &mut pool, &mut visitor);
    assert!(matches!(result, Err(Error::Compile(_))));
    assert_eq!(code, before);

    // the compiler was never even asked
    assert!(editor.compiler().contracts.is_empty());
}

#[test]
fn rejected_snippet_leaves_code_alone() {
    let mut pool = ConstantPool::new();
    let size = pool.add_method_ref("test/Bar", "size", "()I", false).unwrap();
    let [hi, lo] = u16_bytes(size);
    let mut code = Code::new(1, 0, vec![INVOKESTATIC, hi, lo, POP, RETURN]);
    let before = code.clone();

    let mut editor = ExprEditor::new(StubCompiler::new(vec![ICONST_0, POP]));
    let mut visitor = ReplaceWhere::new("$_ = syntax error", is_call_to("size"));
    match editor.edit_code(&mut code, &mut pool, &mut visitor) {
        Err(Error::Compile(err)) => assert_eq!(err.position, Some(5)),
        other => panic!("expected a compile error, got {:?}", other),
    }
    assert_eq!(code, before);
}

#[test]
fn replacing_a_call_with_arguments_and_result() {
    let mut pool = ConstantPool::new();
    let max = pool
        .add_method_ref("java/lang/Math", "max", "(JJ)J", false)
        .unwrap();
    let [hi, lo] = u16_bytes(max);

    // static long f(long a, long b) { return Math.max(a, b); }
    let mut code = Code::new(
        4,
        4,
        vec![LLOAD_0, LLOAD_0 + 2, INVOKESTATIC, hi, lo, LRETURN],
    );
    let mut editor = ExprEditor::new(StubCompiler::new(vec![NOP]));
    let mut visitor = ReplaceWhere::new("$_ = $1 + $2;", is_call_to("max"));
    assert!(editor.edit_code(&mut code, &mut pool, &mut visitor).unwrap());

    let long = FieldType::<BinaryName>::long();
    let contract = &editor.compiler().contracts[0];
    let parameters: Vec<_> = contract
        .parameters
        .iter()
        .map(|local| (local.index, local.field_type.clone()))
        .collect();
    assert_eq!(parameters, vec![(4, long.clone()), (6, long.clone())]);
    let result = contract.result.as_ref().unwrap();
    assert_eq!((result.index, &result.field_type), (8, &long));
    assert_eq!(contract.first_free_local, 10);

    // lstore 6; lstore 4; lconst_0; lstore 8; <snippet>; lload 8
    assert_eq!(
        code.code,
        vec![
            LLOAD_0,
            LLOAD_0 + 2,
            LSTORE,
            6,
            LSTORE,
            4,
            LCONST_0,
            LSTORE,
            8,
            NOP,
            LLOAD,
            8,
            LRETURN
        ]
    );
    assert_eq!(code.max_locals, 10);
    // original depth plus the two slots of the result
    assert_eq!(code.max_stack, 6);
}

#[test]
fn replacement_stack_adds_to_values_under_the_site() {
    let mut pool = ConstantPool::new();
    let twice = pool.add_method_ref("test/Bar", "twice", "(I)I", false).unwrap();
    let [hi, lo] = u16_bytes(twice);

    // static int f() { return 1 + Bar.twice(1); }
    let mut code = Code::new(
        2,
        0,
        vec![ICONST_1, ICONST_1, INVOKESTATIC, hi, lo, IADD, IRETURN],
    );

    // $_ = $1 + 1;
    let mut compiler = StubCompiler::new(vec![ILOAD_0, ICONST_1, IADD, ISTORE_0 + 1]);
    compiler.max_stack = 2;
    let mut editor = ExprEditor::new(compiler);
    let mut visitor = ReplaceWhere::new("$_ = $1 + 1;", is_call_to("twice"));
    assert!(editor.edit_code(&mut code, &mut pool, &mut visitor).unwrap());

    // istore_0; iconst_0; istore_1; <snippet>; iload_1
    assert_eq!(
        code.code,
        vec![
            ICONST_1,
            ICONST_1,
            ISTORE_0,
            ICONST_0,
            ISTORE_0 + 1,
            ILOAD_0,
            ICONST_1,
            IADD,
            ISTORE_0 + 1,
            ILOAD_0 + 1,
            IADD,
            IRETURN
        ]
    );
    assert_eq!(code.max_locals, 2);

    // the first `iconst_1` stays on the stack while the snippet pushes two more
    assert!(code.max_stack >= 3);
    assert_eq!(code.max_stack, 4);
}

#[test]
fn replacing_an_allocation_blanks_out_new_and_dup() {
    let mut pool = ConstantPool::new();
    let point = pool.add_class("test/Point").unwrap();
    let init = pool
        .add_method_ref("test/Point", "<init>", "(I)V", false)
        .unwrap();
    let [class_hi, class_lo] = u16_bytes(point);
    let [init_hi, init_lo] = u16_bytes(init);

    // Point p = new Point(1);
    let mut code = Code::new(
        3,
        2,
        vec![
            NEW,
            class_hi,
            class_lo,
            DUP,
            ICONST_1,
            INVOKESPECIAL,
            init_hi,
            init_lo,
            ASTORE_0 + 1,
            RETURN,
        ],
    );
    let mut editor = ExprEditor::new(StubCompiler::new(vec![NOP, NOP]));
    let mut visitor = ReplaceWhere::new("$_ = Points.of($1);", |kind: &ExprKind| {
        matches!(kind, ExprKind::New { .. })
    });
    assert!(editor.edit_code(&mut code, &mut pool, &mut visitor).unwrap());

    assert_eq!(
        visitor.seen,
        vec![(
            5,
            ExprKind::New {
                new_position: 0,
                class: String::from("test/Point"),
                descriptor: String::from("(I)V"),
            },
            None
        )]
    );
    let contract = &editor.compiler().contracts[0];
    assert_eq!(contract.target, None);
    assert_eq!(contract.parameters[0].index, 2);
    assert_eq!(
        contract.result.as_ref().map(|result| result.index),
        Some(3)
    );

    assert_eq!(
        code.code,
        vec![
            NOP,
            NOP,
            NOP,
            NOP,
            ICONST_1,
            ISTORE_0 + 2,
            ACONST_NULL,
            ASTORE_0 + 3,
            NOP,
            NOP,
            ALOAD_0 + 3,
            ASTORE_0 + 1,
            RETURN
        ]
    );
    assert_eq!(code.max_locals, 4);
}

#[test]
fn constructor_chaining_is_not_an_allocation() {
    let mut pool = ConstantPool::new();
    let init = pool
        .add_method_ref("java/lang/Object", "<init>", "()V", false)
        .unwrap();
    let [hi, lo] = u16_bytes(init);

    // body of a constructor: super();
    let mut code = Code::new(1, 1, vec![ALOAD_0, INVOKESPECIAL, hi, lo, RETURN]);
    let mut editor = ExprEditor::new(StubCompiler::new(vec![]));
    let mut visitor = ReplaceWhere::new("", |_: &ExprKind| false);
    assert!(!editor.edit_code(&mut code, &mut pool, &mut visitor).unwrap());
    assert_eq!(
        visitor.seen[0].1,
        ExprKind::ConstructorCall {
            class: String::from("java/lang/Object"),
            descriptor: String::from("()V"),
        }
    );
}

#[test]
fn casts_and_instanceof_are_sites() {
    let mut pool = ConstantPool::new();
    let point = pool.add_class("test/Point").unwrap();
    let [hi, lo] = u16_bytes(point);

    // (Point) o, then o instanceof Point
    let mut code = Code::new(
        1,
        1,
        vec![
            ALOAD_0, CHECKCAST, hi, lo, POP, ALOAD_0, INSTANCEOF, hi, lo, IRETURN,
        ],
    );
    let mut editor = ExprEditor::new(StubCompiler::new(vec![]));
    let mut visitor = ReplaceWhere::new("$_ = Points.coerce($1);", |kind: &ExprKind| {
        matches!(kind, ExprKind::Cast { .. })
    });
    assert!(editor.edit_code(&mut code, &mut pool, &mut visitor).unwrap());

    let kinds: Vec<_> = visitor
        .seen
        .iter()
        .map(|(position, kind, _)| (*position, kind.clone()))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (
                1,
                ExprKind::Cast {
                    class: String::from("test/Point")
                }
            ),
            // `astore_1; aconst_null; astore_2; aload_2` is one byte longer than `checkcast`
            (
                7,
                ExprKind::InstanceOf {
                    class: String::from("test/Point")
                }
            ),
        ]
    );

    let contract = &editor.compiler().contracts[0];
    assert_eq!(
        contract.parameters[0].field_type,
        FieldType::object(BinaryName::OBJECT)
    );
    assert_eq!(
        &code.code[..6],
        &[ALOAD_0, ASTORE_0 + 1, ACONST_NULL, ASTORE_0 + 2, ALOAD_0 + 2, POP]
    );
}

#[test]
fn handlers_get_code_inserted_before_them() {
    let mut pool = ConstantPool::new();
    let exception = pool.add_class("java/lang/Exception").unwrap();

    // try { } catch (Exception e) { }
    let mut code = Code::new(1, 2, vec![NOP, RETURN, ASTORE_0 + 1, RETURN]);
    code.exception_table.push(ExceptionHandler {
        start_pc: 0,
        end_pc: 1,
        handler_pc: 2,
        catch_type: Some(exception),
    });

    let mut compiler = StubCompiler::new(vec![NOP, NOP]);
    compiler.exception_table.push(ExceptionHandler {
        start_pc: 0,
        end_pc: 1,
        handler_pc: 1,
        catch_type: None,
    });
    let mut editor = ExprEditor::new(compiler);
    let mut visitor = InstrumentHandlers {
        source: "Log.caught($1);",
        seen: vec![],
    };
    assert!(editor.edit_code(&mut code, &mut pool, &mut visitor).unwrap());

    assert_eq!(
        visitor.seen,
        vec![ExprKind::Handler {
            index: 0,
            catch_type: Some(String::from("java/lang/Exception")),
        }]
    );
    let contract = &editor.compiler().contracts[0];
    assert_eq!(contract.parameters[0].index, 2);
    assert_eq!(contract.class_name, "java/lang/Exception");

    // astore_2; nop; nop; aload_2; goto 2
    assert_eq!(
        &code.code[4..],
        &[ASTORE_0 + 2, NOP, NOP, ALOAD_0 + 2, GOTO, 0xff, 0xfa]
    );

    // snippet's own handler first, then the original one, now pointing at the new code
    let handlers: Vec<_> = code
        .exception_table
        .iter()
        .map(|handler| (handler.start_pc, handler.end_pc, handler.handler_pc))
        .collect();
    assert_eq!(handlers, vec![(5, 6, 6), (0, 1, 4)]);
    assert_eq!(code.exception_table[1].catch_type, Some(exception));
    assert_eq!(code.max_locals, 3);
}

#[test]
fn stack_map_rebuilder_runs_after_edits() {
    let mut pool = ConstantPool::new();
    let tick = pool.add_method_ref("test/Bar", "tick", "()V", false).unwrap();
    let [hi, lo] = u16_bytes(tick);
    let mut body = Code::new(0, 0, vec![INVOKESTATIC, hi, lo, RETURN]);
    body.attributes.push(
        Attribute::new(
            &mut pool,
            AttributeBody::StackMapTable(StackMapTable(vec![])),
        )
        .unwrap(),
    );

    let rebuilt = Rc::new(Cell::new(0));
    let mut editor = ExprEditor::new(StubCompiler::new(vec![NOP]))
        .with_stack_map_rebuilder(Box::new(CountingRebuilder(rebuilt.clone())));

    let mut untouched = body.clone();
    let mut visitor = ReplaceWhere::new("{}", |_: &ExprKind| false);
    assert!(!editor.edit_code(&mut untouched, &mut pool, &mut visitor).unwrap());
    assert_eq!(rebuilt.get(), 0);

    let mut edited = body;
    let mut visitor = ReplaceWhere::new("{}", is_call_to("tick"));
    assert!(editor.edit_code(&mut edited, &mut pool, &mut visitor).unwrap());
    assert_eq!(rebuilt.get(), 1);
    assert_eq!(edited.code, vec![NOP, NOP, NOP, RETURN]);
}

#[test]
fn frozen_classes_cannot_be_edited() {
    let mut class = class_with_call();
    class.freeze();
    let mut editor = ExprEditor::new(StubCompiler::new(fifteen_byte_snippet()));
    let mut visitor = ReplaceWhere::new("{}", is_call_to("tick"));
    assert!(matches!(
        editor.edit_class(&mut class, &mut visitor),
        Err(Error::Frozen(_))
    ));

    class.defrost();
    assert!(editor.edit_class(&mut class, &mut visitor).unwrap());
}
