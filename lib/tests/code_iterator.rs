use classweave::jvm::class_file::{
    Attribute, AttributeBody, Code, ConstantPool, ExceptionHandler, LocalVariable,
};
use classweave::jvm::code::{opcodes::*, CodeIterator, Gap};
use classweave::jvm::{CodeTooLarge, Error};

/// Body of a small counting loop:
///
/// ```text
///  0: iconst_0
///  1: istore_1
///  2: iload_1
///  3: ifeq 10
///  6: iinc 1, 1
///  9: nop
/// 10: goto 2
/// 13: return
/// ```
///
/// Exception handlers cover `[2, 10)` and `[0, 2)`, both handled at 13.
fn loop_body(pool: &mut ConstantPool) -> Code {
    let mut code = Code::new(
        1,
        2,
        vec![
            ICONST_0, ISTORE_0 + 1, ILOAD_0 + 1, IFEQ, 0, 7, IINC, 1, 1, NOP, GOTO, 0xff, 0xf8,
            RETURN,
        ],
    );
    code.exception_table = vec![
        ExceptionHandler {
            start_pc: 2,
            end_pc: 10,
            handler_pc: 13,
            catch_type: None,
        },
        ExceptionHandler {
            start_pc: 0,
            end_pc: 2,
            handler_pc: 13,
            catch_type: None,
        },
    ];

    let line_numbers = vec![(0, 1), (2, 2), (10, 3)]
        .into_iter()
        .map(|(start_pc, line_number)| classweave::jvm::class_file::LineNumber {
            start_pc,
            line_number,
        })
        .collect();
    code.attributes
        .push(Attribute::new(pool, AttributeBody::LineNumberTable(line_numbers)).unwrap());

    let int = pool.add_utf8("I").unwrap();
    let this = pool.add_utf8("this").unwrap();
    let this_type = pool.add_utf8("Ltest/Foo;").unwrap();
    let counter = pool.add_utf8("counter").unwrap();
    code.attributes.push(
        Attribute::new(
            pool,
            AttributeBody::LocalVariableTable(vec![
                LocalVariable {
                    start_pc: 0,
                    length: 14,
                    name_index: this,
                    descriptor_index: this_type,
                    index: 0,
                },
                LocalVariable {
                    start_pc: 2,
                    length: 12,
                    name_index: counter,
                    descriptor_index: int,
                    index: 1,
                },
            ]),
        )
        .unwrap(),
    );
    code
}

/// Absolute targets of every branch, found by walking the instructions
fn branch_targets(code: &mut Code) -> Vec<(usize, usize)> {
    let mut iterator = CodeIterator::new(code);
    let mut targets = vec![];
    while iterator.has_next() {
        let position = iterator.next().unwrap();
        let opcode = iterator.byte_at(position).unwrap();
        if opcode == IFEQ || opcode == GOTO {
            let offset = iterator.s16_at(position + 1).unwrap();
            targets.push((position, (position as i64 + offset as i64) as usize));
        }
    }
    targets
}

fn handler_ranges(code: &Code) -> Vec<(u16, u16, u16)> {
    code.exception_table
        .iter()
        .map(|handler| (handler.start_pc, handler.end_pc, handler.handler_pc))
        .collect()
}

fn line_starts(code: &Code) -> Vec<u16> {
    code.line_number_table()
        .unwrap()
        .iter()
        .map(|line| line.start_pc)
        .collect()
}

fn local_ranges(code: &Code) -> Vec<(u16, u16)> {
    code.attributes
        .iter()
        .find_map(|attribute| match &attribute.body {
            AttributeBody::LocalVariableTable(locals) => Some(
                locals
                    .iter()
                    .map(|local| (local.start_pc, local.length))
                    .collect(),
            ),
            _ => None,
        })
        .unwrap()
}

#[test]
fn gap_shifts_everything_at_or_after_it() {
    let mut pool = ConstantPool::new();
    let mut code = loop_body(&mut pool);
    assert_eq!(branch_targets(&mut code), vec![(3, 10), (10, 2)]);

    let gap = CodeIterator::new(&mut code).insert_gap(2, 4).unwrap();
    assert_eq!(
        gap,
        Gap {
            position: 2,
            length: 4
        }
    );
    assert_eq!(code.code.len(), 18);
    assert_eq!(&code.code[2..6], &[NOP; 4]);
    assert_eq!(code.code[6], ILOAD_0 + 1);

    // both branches now land 4 bytes later, including the one that targeted the gap position
    assert_eq!(branch_targets(&mut code), vec![(7, 14), (14, 6)]);
    assert_eq!(&code.code[14..17], &[GOTO, 0xff, 0xf8]);

    // the handler range starting at the gap moves past it; the one ending there is extended
    assert_eq!(handler_ranges(&code), vec![(6, 14, 17), (0, 6, 17)]);
    assert_eq!(line_starts(&code), vec![0, 6, 14]);
    assert_eq!(local_ranges(&code), vec![(0, 18), (6, 12)]);
}

#[test]
fn entries_before_the_gap_are_untouched() {
    let mut pool = ConstantPool::new();
    let mut code = loop_body(&mut pool);

    // `iinc` starts at 6: only the tail of the loop moves
    CodeIterator::new(&mut code).insert_gap(6, 2).unwrap();
    assert_eq!(&code.code[..6], &[ICONST_0, ISTORE_0 + 1, ILOAD_0 + 1, IFEQ, 0, 9]);
    assert_eq!(branch_targets(&mut code), vec![(3, 12), (12, 2)]);
    assert_eq!(handler_ranges(&code), vec![(2, 12, 15), (0, 2, 15)]);
    assert_eq!(line_starts(&code), vec![0, 2, 12]);
    assert_eq!(local_ranges(&code), vec![(0, 16), (2, 14)]);
}

#[test]
fn handler_start_at_gap_is_shifted() {
    let mut pool = ConstantPool::new();
    let mut code = loop_body(&mut pool);
    code.exception_table = vec![ExceptionHandler {
        start_pc: 6,
        end_pc: 9,
        handler_pc: 13,
        catch_type: None,
    }];

    CodeIterator::new(&mut code).insert_gap(6, 3).unwrap();

    // the inserted code is not covered by the handler
    assert_eq!(handler_ranges(&code), vec![(9, 12, 16)]);
}

#[test]
fn several_gaps_are_logged() {
    let mut pool = ConstantPool::new();
    let mut code = loop_body(&mut pool);
    let mut iterator = CodeIterator::new(&mut code);
    iterator.insert_gap(13, 1).unwrap();
    iterator.insert_gap(2, 2).unwrap();
    iterator.insert_gap(0, 0).unwrap();
    assert_eq!(
        iterator.edits(),
        &[
            Gap {
                position: 13,
                length: 1
            },
            Gap {
                position: 2,
                length: 2
            },
        ]
    );
    assert_eq!(iterator.code_length(), 17);
    assert_eq!(iterator.byte_at(16).unwrap(), RETURN);
    assert_eq!(branch_targets(&mut code), vec![(5, 12), (12, 4)]);
}

#[test]
fn code_length_limit_is_enforced() {
    let mut bytes = vec![NOP; 65530];
    bytes.push(RETURN);
    let mut code = Code::new(0, 0, bytes);

    let result = CodeIterator::new(&mut code).insert_gap(10, 10);
    assert!(matches!(
        result,
        Err(Error::CodeTooLarge(CodeTooLarge::CodeLength { length: 65541 }))
    ));
    assert_eq!(code.code.len(), 65531);

    let result = CodeIterator::new(&mut code).append(&[NOP; 5]);
    assert!(matches!(result, Err(Error::CodeTooLarge(_))));
    assert!(CodeIterator::new(&mut code).append(&[NOP; 4]).is_ok());
    assert_eq!(code.code.len(), 65535);
}

#[test]
fn branch_offset_limit_is_enforced() {
    let mut bytes = vec![NOP; 32800];
    bytes[0] = GOTO;
    bytes[1..3].copy_from_slice(&32700i16.to_be_bytes());
    bytes.push(RETURN);
    let mut code = Code::new(0, 0, bytes.clone());

    let result = CodeIterator::new(&mut code).insert_gap(10, 100);
    assert!(matches!(
        result,
        Err(Error::CodeTooLarge(CodeTooLarge::BranchOffset {
            position: 0,
            offset: 32800
        }))
    ));

    // nothing was changed
    assert_eq!(code.code, bytes);

    // a gap past the target leaves the branch alone
    CodeIterator::new(&mut code).insert_gap(32750, 100).unwrap();
    assert_eq!(&code.code[1..3], &32700i16.to_be_bytes());
}
