use super::opcodes::*;
use crate::jvm::{BaseType, BinaryName, Error, FieldType, ParseDescriptor};
use crate::util::Width;

/// What sort of value a local variable or stack slot holds, as far as load/store/return
/// instructions are concerned
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum LocalKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
}

impl LocalKind {
    pub fn of_type<C>(field_type: &FieldType<C>) -> LocalKind {
        match field_type {
            FieldType::Base(BaseType::Long) => LocalKind::Long,
            FieldType::Base(BaseType::Float) => LocalKind::Float,
            FieldType::Base(BaseType::Double) => LocalKind::Double,
            FieldType::Base(_) => LocalKind::Int,
            FieldType::Ref(_) => LocalKind::Reference,
        }
    }

    /// Kind of values of the type with this field descriptor
    pub fn of_descriptor(descriptor: &str) -> Result<LocalKind, Error> {
        FieldType::<BinaryName>::parse(descriptor).map(|typ| LocalKind::of_type(&typ))
    }

    /// Opcode offset between the `i*` instruction and this kind's instruction, for the families
    /// laid out as `i`, `l`, `f`, `d`, `a`
    const fn family_offset(self) -> u8 {
        match self {
            LocalKind::Int => 0,
            LocalKind::Long => 1,
            LocalKind::Float => 2,
            LocalKind::Double => 3,
            LocalKind::Reference => 4,
        }
    }

    /// `ireturn`, `lreturn`, etc.
    pub const fn return_opcode(self) -> u8 {
        IRETURN + self.family_offset()
    }
}

impl Width for LocalKind {
    fn width(&self) -> usize {
        match self {
            LocalKind::Long | LocalKind::Double => 2,
            _ => 1,
        }
    }
}

/// Small growable buffer of encoded instructions
///
/// This only knows the handful of instructions needed to move values between the stack and
/// local variables around a replaced expression. Jumps are encoded relative to where the buffer
/// will eventually be placed in the method body.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Bytecode {
    bytes: Vec<u8>,
}

impl Bytecode {
    pub fn new() -> Bytecode {
        Bytecode::default()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    /// Instruction without operands
    pub fn opcode(&mut self, opcode: u8) {
        self.bytes.push(opcode);
    }

    /// Instruction whose only operand is a 16-bit index (constant pool, most often)
    pub fn opcode_u16(&mut self, opcode: u8, operand: u16) {
        self.bytes.push(opcode);
        self.bytes.extend_from_slice(&operand.to_be_bytes());
    }

    pub fn load(&mut self, kind: LocalKind, index: u16) {
        self.load_or_store(index, ILOAD_0, ILOAD, kind);
    }

    pub fn store(&mut self, kind: LocalKind, index: u16) {
        self.load_or_store(index, ISTORE_0, ISTORE, kind);
    }

    fn load_or_store(&mut self, index: u16, short_form_start: u8, normal_form: u8, kind: LocalKind) {
        let offset = kind.family_offset();
        let normal_form = normal_form + offset;
        match u8::try_from(index) {
            Ok(n @ 0..=3) => self.bytes.push(short_form_start + 4 * offset + n),
            Ok(n) => self.bytes.extend_from_slice(&[normal_form, n]),
            Err(_) => {
                self.bytes.extend_from_slice(&[WIDE, normal_form]);
                self.bytes.extend_from_slice(&index.to_be_bytes());
            }
        }
    }

    /// Push the default (zero) value of a kind
    pub fn const_zero(&mut self, kind: LocalKind) {
        self.bytes.push(match kind {
            LocalKind::Int => ICONST_0,
            LocalKind::Long => LCONST_0,
            LocalKind::Float => FCONST_0,
            LocalKind::Double => DCONST_0,
            LocalKind::Reference => ACONST_NULL,
        });
    }

    /// Discard the value of a kind on the top of the stack
    pub fn pop(&mut self, kind: LocalKind) {
        self.bytes.push(if kind.width() == 2 { POP2 } else { POP });
    }

    /// Jump to `target`, assuming the buffer will be placed at `base` in the method body
    ///
    /// A `goto` is used if the offset fits, otherwise a `goto_w`.
    pub fn goto(&mut self, base: usize, target: usize) {
        let position = (base + self.bytes.len()) as i64;
        let offset = target as i64 - position;
        match i16::try_from(offset) {
            Ok(offset) => {
                self.bytes.push(GOTO);
                self.bytes.extend_from_slice(&offset.to_be_bytes());
            }
            Err(_) => {
                self.bytes.push(GOTO_W);
                self.bytes.extend_from_slice(&(offset as i32).to_be_bytes());
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn load_store_forms() {
        let mut code = Bytecode::new();
        code.load(LocalKind::Int, 0);
        code.load(LocalKind::Reference, 3);
        code.store(LocalKind::Double, 2);
        code.store(LocalKind::Long, 200);
        code.load(LocalKind::Float, 300);
        assert_eq!(
            code.as_slice(),
            &[
                ILOAD_0,
                ALOAD_0 + 3,
                DSTORE_0 + 2,
                LSTORE,
                200,
                WIDE,
                FLOAD,
                0x01,
                0x2c
            ]
        );
    }

    #[test]
    fn kinds_from_descriptors() {
        assert_eq!(LocalKind::of_descriptor("Z").unwrap(), LocalKind::Int);
        assert_eq!(LocalKind::of_descriptor("J").unwrap(), LocalKind::Long);
        assert_eq!(
            LocalKind::of_descriptor("[I").unwrap(),
            LocalKind::Reference
        );
        assert_eq!(LocalKind::Double.width(), 2);
        assert_eq!(LocalKind::Reference.return_opcode(), ARETURN);
        assert!(LocalKind::of_descriptor("V").is_err());
    }

    #[test]
    fn short_and_wide_goto() {
        let mut code = Bytecode::new();
        code.opcode(NOP);
        code.goto(100, 50);
        assert_eq!(code.as_slice(), &[NOP, GOTO, 0xff, 0xcd]);

        let mut code = Bytecode::new();
        code.goto(0, 40000);
        assert_eq!(code.as_slice(), &[GOTO_W, 0, 0, 0x9c, 0x40]);
    }
}
