use std::ops::Range;
use std::str::FromStr;

use fxhash::FxBuildHasher;
use indexmap::IndexMap;
use miette::SourceSpan;

use crate::ops::Opcode;

/// Insertion-ordered map used for the label table.
type FxMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// Label -> memory address table populated during the first pass and
/// consumed immutably by the second. Entries are write-once.
#[derive(Debug, Default)]
pub struct SymbolTable {
    map: FxMap<String, u16>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    /// Bind `name` to `addr`. Returns the previous address if the label was
    /// already defined, without overwriting it.
    pub fn insert(&mut self, name: &str, addr: u16) -> Result<(), u16> {
        if let Some(prev) = self.map.get(name) {
            return Err(*prev);
        }
        self.map.insert(name.to_string(), addr);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<u16> {
        self.map.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Location within source.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Span {
    offs: usize,
    len: usize,
}

impl Span {
    pub fn new(offs: usize, len: usize) -> Self {
        Span { offs, len }
    }

    pub fn dummy() -> Self {
        Span { offs: 0, len: 0 }
    }

    pub fn offs(&self) -> usize {
        self.offs
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn end(&self) -> usize {
        self.offs + self.len
    }

    pub fn range(&self) -> Range<usize> {
        self.offs..self.end()
    }
}

impl From<Span> for SourceSpan {
    fn from(value: Span) -> Self {
        SourceSpan::new(value.offs().into(), value.len())
    }
}

impl From<Span> for Range<usize> {
    fn from(value: Span) -> Self {
        value.range()
    }
}

/// Represents the CPU registers.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Register {
    R0 = 0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    /// Also serves as the subroutine link register.
    R7,
}

impl Register {
    /// Register number as an instruction field value.
    pub fn word(self) -> u16 {
        self as u16
    }
}

impl FromStr for Register {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "R0" => Ok(Register::R0),
            "R1" => Ok(Register::R1),
            "R2" => Ok(Register::R2),
            "R3" => Ok(Register::R3),
            "R4" => Ok(Register::R4),
            "R5" => Ok(Register::R5),
            "R6" => Ok(Register::R6),
            "R7" => Ok(Register::R7),
            _ => Err(()),
        }
    }
}

/// Condition mask carried by branch instructions. The three bits are n, z, p
/// from high to low, matching the condition code register.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Flag {
    /// -
    N,
    /// 0
    Z,
    /// +
    P,
    /// <= 0
    Nz,
    /// != 0
    Np,
    /// >= 0
    Zp,
    /// Unconditional
    Nzp,
}

impl Flag {
    pub fn mask(self) -> u16 {
        match self {
            Flag::N => 0b100,
            Flag::Z => 0b010,
            Flag::P => 0b001,
            Flag::Nz => 0b110,
            Flag::Np => 0b101,
            Flag::Zp => 0b011,
            Flag::Nzp => 0b111,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InstrKind {
    Add,
    And,
    Br(Flag),
    Jmp,
    Jsr,
    Jsrr,
    Ld,
    Ldi,
    Ldr,
    Lea,
    Not,
    Ret,
    Rti,
    Res,
    St,
    Sti,
    Str,
}

impl InstrKind {
    /// Mnemonic aliasing resolves here: all branch variants share opcode 0,
    /// JSR/JSRR share 4, JMP/RET share 12.
    pub fn opcode(self) -> Opcode {
        match self {
            InstrKind::Br(_) => Opcode::Br,
            InstrKind::Add => Opcode::Add,
            InstrKind::Ld => Opcode::Ld,
            InstrKind::St => Opcode::St,
            InstrKind::Jsr | InstrKind::Jsrr => Opcode::Jsr,
            InstrKind::And => Opcode::And,
            InstrKind::Ldr => Opcode::Ldr,
            InstrKind::Str => Opcode::Str,
            InstrKind::Rti => Opcode::Rti,
            InstrKind::Not => Opcode::Not,
            InstrKind::Ldi => Opcode::Ldi,
            InstrKind::Sti => Opcode::Sti,
            InstrKind::Jmp | InstrKind::Ret => Opcode::Jmp,
            InstrKind::Res => Opcode::Res,
            InstrKind::Lea => Opcode::Lea,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TrapKind {
    Generic,
    Getc,
    Out,
    Puts,
    In,
    Putsp,
    Halt,
}

impl TrapKind {
    /// Fixed trap vector for keyword traps. `Generic` takes its vector from
    /// an operand instead.
    pub fn vector(self) -> Option<u8> {
        match self {
            TrapKind::Generic => None,
            TrapKind::Getc => Some(0x20),
            TrapKind::Out => Some(0x21),
            TrapKind::Puts => Some(0x22),
            TrapKind::In => Some(0x23),
            TrapKind::Putsp => Some(0x24),
            TrapKind::Halt => Some(0x25),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DirKind {
    Orig,
    End,
    Fill,
    Stringz,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_share_opcodes() {
        assert_eq!(InstrKind::Ret.opcode(), InstrKind::Jmp.opcode());
        assert_eq!(InstrKind::Jsrr.opcode(), InstrKind::Jsr.opcode());
        for flag in [Flag::N, Flag::Z, Flag::P, Flag::Nzp] {
            assert_eq!(InstrKind::Br(flag).opcode(), Opcode::Br);
        }
    }

    #[test]
    fn symbol_table_write_once() {
        let mut table = SymbolTable::new();
        assert!(table.insert("loop", 0x3000).is_ok());
        assert_eq!(table.insert("loop", 0x4000), Err(0x3000));
        // First binding survives
        assert_eq!(table.get("loop"), Some(0x3000));
    }
}
