//! Instruction format table shared by the assembler and the interpreter.
//!
//! Every instruction word is `opcode << 12` ORed with a set of operand
//! fields packed into the low 12 bits. The table below is the single
//! description of those layouts: the assembler encodes through it and the
//! interpreter decodes through it, so the two cannot drift apart.

/// 4-bit operation selector occupying the top bits of an instruction word.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(u8)]
pub enum Opcode {
    /// Branch
    Br = 0,
    /// Add
    Add,
    /// Load
    Ld,
    /// Store
    St,
    /// Jump register
    Jsr,
    /// Bitwise and
    And,
    /// Load register
    Ldr,
    /// Store register
    Str,
    /// Unused, executes as a no-op
    Rti,
    /// Bitwise not
    Not,
    /// Load indirect
    Ldi,
    /// Store indirect
    Sti,
    /// Jump
    Jmp,
    /// Reserved, executes as a no-op
    Res,
    /// Load effective address
    Lea,
    /// Execute trap
    Trap,
}

impl Opcode {
    /// Extract the opcode from the top 4 bits of a word.
    pub fn from_word(word: u16) -> Self {
        match word >> 12 {
            0 => Opcode::Br,
            1 => Opcode::Add,
            2 => Opcode::Ld,
            3 => Opcode::St,
            4 => Opcode::Jsr,
            5 => Opcode::And,
            6 => Opcode::Ldr,
            7 => Opcode::Str,
            8 => Opcode::Rti,
            9 => Opcode::Not,
            10 => Opcode::Ldi,
            11 => Opcode::Sti,
            12 => Opcode::Jmp,
            13 => Opcode::Res,
            14 => Opcode::Lea,
            15 => Opcode::Trap,
            // Top 4 bits of a u16 cannot exceed 15
            _ => unreachable!(),
        }
    }

    /// Operand field layout in canonical order.
    pub fn layout(self) -> &'static [Field] {
        match self {
            Opcode::Add | Opcode::And => ADD_AND,
            Opcode::Br
            | Opcode::Ld
            | Opcode::St
            | Opcode::Ldi
            | Opcode::Sti
            | Opcode::Lea => PCREL9,
            Opcode::Jsr => JSR,
            Opcode::Ldr | Opcode::Str => REG_OFFS6,
            Opcode::Not => NOT,
            Opcode::Jmp => JMP,
            Opcode::Trap => TRAP,
            Opcode::Rti | Opcode::Res => EMPTY,
        }
    }
}

/// One operand field within the low 12 bits of an instruction word.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Field {
    shift: u16,
    width: u16,
}

impl Field {
    pub const fn new(shift: u16, width: u16) -> Self {
        Field { shift, width }
    }

    pub fn mask(self) -> u16 {
        (1 << self.width) - 1
    }

    pub fn width(self) -> u16 {
        self.width
    }

    /// Raw unsigned field value; signedness is the caller's concern.
    fn extract(self, word: u16) -> u16 {
        (word >> self.shift) & self.mask()
    }

    fn place(self, val: u16) -> u16 {
        (val & self.mask()) << self.shift
    }
}

const fn f(shift: u16, width: u16) -> Field {
    Field::new(shift, width)
}

// Layouts, in the field order both passes agree on. ADD/AND overlap sr2 and
// imm5 on purpose; the encoder only ever supplies one of them.
const ADD_AND: &[Field] = &[f(9, 3), f(6, 3), f(0, 3), f(0, 5), f(5, 1)];
const PCREL9: &[Field] = &[f(9, 3), f(0, 9)];
const JSR: &[Field] = &[f(11, 1), f(0, 11), f(6, 3)];
const REG_OFFS6: &[Field] = &[f(9, 3), f(6, 3), f(0, 6)];
const NOT: &[Field] = &[f(9, 3), f(6, 3), f(0, 6)];
const JMP: &[Field] = &[f(6, 3)];
const TRAP: &[Field] = &[f(0, 8)];
const EMPTY: &[Field] = &[];

/// No layout holds more than 5 fields.
pub const MAX_FIELDS: usize = 5;

/// Decoded operand fields in layout order; unused slots stay zero.
pub type Fields = [u16; MAX_FIELDS];

/// Pack field values into an instruction word. Fields given as `None` are
/// skipped; everything else is masked to its width and shifted into place.
pub fn encode(op: Opcode, vals: &[Option<u16>]) -> u16 {
    debug_assert!(vals.len() == op.layout().len());
    let mut word = (op as u16) << 12;
    for (field, val) in op.layout().iter().zip(vals) {
        if let Some(val) = *val {
            word |= field.place(val);
        }
    }
    word
}

/// Unpack an instruction word into its opcode and raw field values. No sign
/// extension is performed here.
pub fn decode(word: u16) -> (Opcode, Fields) {
    let op = Opcode::from_word(word);
    let mut vals = [0; MAX_FIELDS];
    for (slot, field) in vals.iter_mut().zip(op.layout()) {
        *slot = field.extract(word);
    }
    (op, vals)
}
