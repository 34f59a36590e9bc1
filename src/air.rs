use miette::Result;

use crate::error;
use crate::ops::{self, Opcode};
use crate::symbol::{Flag, Register, Span, SymbolTable};

/// Assembly intermediate representation: the origin address plus every
/// statement laid out by the first pass, in source order with assigned
/// addresses.
#[derive(Debug)]
pub struct Air {
    orig: u16,
    stmts: Vec<AirStmt>,
}

impl Air {
    pub fn new(orig: u16) -> Self {
        Air {
            orig,
            stmts: Vec::new(),
        }
    }

    pub fn orig(&self) -> u16 {
        self.orig
    }

    pub fn add_stmt(&mut self, stmt: AirStmt) {
        self.stmts.push(stmt)
    }

    pub fn get(&self, idx: usize) -> &AirStmt {
        &self.stmts[idx]
    }

    pub fn len(&self) -> usize {
        self.stmts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }

    /// Second pass: resolve operands against the finished symbol table and
    /// encode every statement. `src` is kept only for diagnostics.
    pub fn assemble(&self, symbols: &SymbolTable, src: &str) -> Result<ObjImage> {
        let mut words = Vec::with_capacity(self.stmts.len());
        for stmt in &self.stmts {
            stmt.encode_into(&mut words, symbols, src)?;
        }
        Ok(ObjImage {
            orig: self.orig,
            words,
        })
    }
}

/// Single statement with its memory address and the span of its head token.
#[derive(PartialEq, Eq, Debug)]
pub struct AirStmt {
    pub addr: u16,
    pub span: Span,
    pub kind: StmtKind,
}

/// Statement kinds after operand classification. Operands that are
/// grammatically fixed use narrow types; the two genuinely polymorphic spots
/// (ADD/AND third operand, PC-relative targets) use small sum types.
#[derive(PartialEq, Eq, Debug)]
pub enum StmtKind {
    Add {
        dest: Register,
        src: Register,
        rhs: ImmOrReg,
    },
    And {
        dest: Register,
        src: Register,
        rhs: ImmOrReg,
    },
    Branch {
        cond: Flag,
        target: Target,
    },
    Jump {
        base: Register,
    },
    Return,
    JumpSub {
        target: Target,
    },
    JumpSubReg {
        base: Register,
    },
    Load {
        dest: Register,
        target: Target,
    },
    LoadInd {
        dest: Register,
        target: Target,
    },
    LoadReg {
        dest: Register,
        base: Register,
        offset: i16,
    },
    LoadAddr {
        dest: Register,
        target: Target,
    },
    Not {
        dest: Register,
        src: Register,
    },
    Rti,
    Res,
    Store {
        src: Register,
        target: Target,
    },
    StoreInd {
        src: Register,
        target: Target,
    },
    StoreReg {
        src: Register,
        base: Register,
        offset: i16,
    },
    Trap {
        vect: u8,
    },
    Fill {
        value: Target,
    },
    Stringz {
        /// One character per word, NUL terminator included.
        data: Vec<u16>,
    },
}

/// ADD and AND support an immediate in place of the second source register.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ImmOrReg {
    Reg(Register),
    Imm(i16),
}

/// A reference that resolves to an address or raw value during the second
/// pass: either a label or a literal supplied directly.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Target {
    Label(Label),
    Offs(i16),
}

/// Label reference, keeping the span of the referencing token so an
/// undefined label points at the use site.
#[derive(Clone, Eq, Debug)]
pub struct Label {
    pub name: String,
    pub span: Span,
}

impl Label {
    pub fn new(name: &str, span: Span) -> Self {
        Label {
            name: name.to_string(),
            span,
        }
    }
}

// Two references to one label compare equal regardless of where they appear.
impl PartialEq for Label {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl AirStmt {
    /// Statement size in words, fixed by the first pass.
    pub fn size(&self) -> u16 {
        match &self.kind {
            StmtKind::Stringz { data } => data.len() as u16,
            _ => 1,
        }
    }

    fn encode_into(&self, words: &mut Vec<u16>, symbols: &SymbolTable, src: &str) -> Result<()> {
        use StmtKind::*;
        let word = match &self.kind {
            Add { dest, src: sr, rhs } => self.add_and(Opcode::Add, *dest, *sr, *rhs),
            And { dest, src: sr, rhs } => self.add_and(Opcode::And, *dest, *sr, *rhs),
            Branch { cond, target } => {
                let offs = self.pc_offset(target, 9, symbols, src)?;
                ops::encode(Opcode::Br, &[Some(cond.mask()), Some(offs)])
            }
            Jump { base } => ops::encode(Opcode::Jmp, &[Some(base.word())]),
            Return => ops::encode(Opcode::Jmp, &[Some(Register::R7.word())]),
            JumpSub { target } => {
                let offs = self.pc_offset(target, 11, symbols, src)?;
                ops::encode(Opcode::Jsr, &[Some(1), Some(offs), None])
            }
            JumpSubReg { base } => {
                ops::encode(Opcode::Jsr, &[Some(0), None, Some(base.word())])
            }
            Load { dest, target } => self.pc_rel(Opcode::Ld, *dest, target, symbols, src)?,
            LoadInd { dest, target } => self.pc_rel(Opcode::Ldi, *dest, target, symbols, src)?,
            LoadAddr { dest, target } => self.pc_rel(Opcode::Lea, *dest, target, symbols, src)?,
            Store { src: sr, target } => self.pc_rel(Opcode::St, *sr, target, symbols, src)?,
            StoreInd { src: sr, target } => self.pc_rel(Opcode::Sti, *sr, target, symbols, src)?,
            LoadReg { dest, base, offset } => ops::encode(
                Opcode::Ldr,
                &[Some(dest.word()), Some(base.word()), Some(*offset as u16)],
            ),
            StoreReg { src: sr, base, offset } => ops::encode(
                Opcode::Str,
                &[Some(sr.word()), Some(base.word()), Some(*offset as u16)],
            ),
            Not { dest, src: sr } => ops::encode(
                Opcode::Not,
                // The hardware requires the low 6 bits all set
                &[Some(dest.word()), Some(sr.word()), Some(0b111111)],
            ),
            Rti => ops::encode(Opcode::Rti, &[]),
            Res => ops::encode(Opcode::Res, &[]),
            Trap { vect } => ops::encode(Opcode::Trap, &[Some(*vect as u16)]),
            Fill { value } => match value {
                Target::Label(label) => resolve(label, symbols, src)?,
                Target::Offs(val) => *val as u16,
            },
            Stringz { data } => {
                words.extend_from_slice(data);
                return Ok(());
            }
        };
        words.push(word);
        Ok(())
    }

    fn add_and(&self, op: Opcode, dest: Register, src: Register, rhs: ImmOrReg) -> u16 {
        match rhs {
            ImmOrReg::Reg(reg) => ops::encode(
                op,
                &[
                    Some(dest.word()),
                    Some(src.word()),
                    Some(reg.word()),
                    None,
                    Some(0),
                ],
            ),
            ImmOrReg::Imm(imm) => ops::encode(
                op,
                &[
                    Some(dest.word()),
                    Some(src.word()),
                    None,
                    Some(imm as u16),
                    Some(1),
                ],
            ),
        }
    }

    fn pc_rel(
        &self,
        op: Opcode,
        reg: Register,
        target: &Target,
        symbols: &SymbolTable,
        src: &str,
    ) -> Result<u16> {
        let offs = self.pc_offset(target, 9, symbols, src)?;
        Ok(ops::encode(op, &[Some(reg.word()), Some(offs)]))
    }

    /// Offset from the address *following* this instruction to the target,
    /// masked to `width` bits. Offsets that do not fit are an error here
    /// rather than silent truncation.
    fn pc_offset(
        &self,
        target: &Target,
        width: u32,
        symbols: &SymbolTable,
        src: &str,
    ) -> Result<u16> {
        let delta = match target {
            Target::Label(label) => {
                resolve(label, symbols, src)? as i32 - (self.addr as i32 + 1)
            }
            Target::Offs(offs) => *offs as i32,
        };
        let bound = 1i32 << (width - 1);
        if !(-bound..bound).contains(&delta) {
            return Err(error::asm_offset_range(self.span, src, width, delta));
        }
        Ok(delta as u16 & ((1 << width) - 1))
    }
}

fn resolve(label: &Label, symbols: &SymbolTable, src: &str) -> Result<u16> {
    symbols
        .get(&label.name)
        .ok_or_else(|| error::asm_undefined_label(label.span, src, &label.name))
}

/// Assembled binary image: origin plus program words in statement order.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ObjImage {
    orig: u16,
    words: Vec<u16>,
}

impl ObjImage {
    pub fn orig(&self) -> u16 {
        self.orig
    }

    pub fn words(&self) -> &[u16] {
        &self.words
    }

    /// Persisted format: origin first, then every word, as big-endian pairs.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity((self.words.len() + 1) * 2);
        bytes.extend_from_slice(&self.orig.to_be_bytes());
        for word in &self.words {
            bytes.extend_from_slice(&word.to_be_bytes());
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stmt(addr: u16, kind: StmtKind) -> AirStmt {
        AirStmt {
            addr,
            span: Span::dummy(),
            kind,
        }
    }

    fn assemble_one(addr: u16, kind: StmtKind, symbols: &SymbolTable) -> Result<u16> {
        let mut air = Air::new(addr);
        air.add_stmt(stmt(addr, kind));
        let image = air.assemble(symbols, "")?;
        Ok(image.words()[0])
    }

    #[test]
    fn pc_offset_is_relative_to_next_address() {
        let mut symbols = SymbolTable::new();
        symbols.insert("target", 0x3005).unwrap();
        let word = assemble_one(
            0x3000,
            StmtKind::Load {
                dest: Register::R1,
                target: Target::Label(Label::new("target", Span::dummy())),
            },
            &symbols,
        )
        .unwrap();
        // 0x3005 - (0x3000 + 1) = 4
        assert_eq!(word, 0x2204);
    }

    #[test]
    fn backward_branch_wraps_in_nine_bits() {
        let mut symbols = SymbolTable::new();
        symbols.insert("loop", 0x3000).unwrap();
        let word = assemble_one(
            0x3004,
            StmtKind::Branch {
                cond: Flag::Nzp,
                target: Target::Label(Label::new("loop", Span::dummy())),
            },
            &symbols,
        )
        .unwrap();
        // 0x3000 - 0x3005 = -5, masked to 9 bits
        assert_eq!(word, 0x0E00 | (-5i16 as u16 & 0x1FF));
    }

    #[test]
    fn jsr_uses_eleven_bit_offset() {
        let mut symbols = SymbolTable::new();
        symbols.insert("sub", 0x3200).unwrap();
        let word = assemble_one(
            0x3000,
            StmtKind::JumpSub {
                target: Target::Label(Label::new("sub", Span::dummy())),
            },
            &symbols,
        )
        .unwrap();
        assert_eq!(word, 0x4000 | 0x0800 | 0x1FF);
    }

    #[test]
    fn offset_overflow_is_an_error() {
        let mut symbols = SymbolTable::new();
        symbols.insert("far", 0x4000).unwrap();
        let res = assemble_one(
            0x3000,
            StmtKind::Branch {
                cond: Flag::Nzp,
                target: Target::Label(Label::new("far", Span::dummy())),
            },
            &symbols,
        );
        assert!(res.is_err());
    }

    #[test]
    fn undefined_label_is_an_error() {
        let symbols = SymbolTable::new();
        let res = assemble_one(
            0x3000,
            StmtKind::Load {
                dest: Register::R0,
                target: Target::Label(Label::new("nowhere", Span::dummy())),
            },
            &symbols,
        );
        assert!(res.is_err());
    }

    #[test]
    fn not_supplies_all_ones() {
        let symbols = SymbolTable::new();
        let word = assemble_one(
            0x3000,
            StmtKind::Not {
                dest: Register::R2,
                src: Register::R3,
            },
            &symbols,
        )
        .unwrap();
        assert_eq!(word, 0x94FF);
    }

    #[test]
    fn fill_resolves_labels_and_literals() {
        let mut symbols = SymbolTable::new();
        symbols.insert("here", 0x30FE).unwrap();
        let lit = assemble_one(0x3000, StmtKind::Fill { value: Target::Offs(-35) }, &symbols);
        assert_eq!(lit.unwrap(), -35i16 as u16);
        let lab = assemble_one(
            0x3000,
            StmtKind::Fill {
                value: Target::Label(Label::new("here", Span::dummy())),
            },
            &symbols,
        );
        assert_eq!(lab.unwrap(), 0x30FE);
    }

    #[test]
    fn image_bytes_are_big_endian() {
        let image = ObjImage {
            orig: 0x3000,
            words: vec![0x1234, 0xABCD],
        };
        assert_eq!(image.to_bytes(), vec![0x30, 0x00, 0x12, 0x34, 0xAB, 0xCD]);
    }
}
