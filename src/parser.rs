use miette::Result;

use crate::air::{Air, AirStmt, ImmOrReg, Label, StmtKind, Target};
use crate::error;
use crate::lexer::{tokenize_line, LiteralKind, Token, TokenKind};
use crate::symbol::{DirKind, InstrKind, Register, Span, SymbolTable, TrapKind};

/// First pass: streams source lines through the lexer, lays out statements
/// at consecutive addresses, and binds labels as it goes. The finished
/// [`Air`] and [`SymbolTable`] feed the second pass.
pub struct AsmParser<'a> {
    src: &'a str,
    symbols: SymbolTable,
    /// Address of the next statement.
    addr: u16,
    /// Labels seen on their own line, waiting for a statement to bind to.
    pending: Vec<(String, Span)>,
}

impl<'a> AsmParser<'a> {
    pub fn new(src: &'a str) -> Self {
        AsmParser {
            src,
            symbols: SymbolTable::new(),
            addr: 0,
            pending: Vec::new(),
        }
    }

    pub fn parse(mut self) -> Result<(Air, SymbolTable)> {
        let mut lines = lines(self.src);
        let orig = self.seek_origin(&mut lines)?;
        self.addr = orig;
        let mut air = Air::new(orig);

        for toks in lines {
            let toks = toks?;
            if toks.is_empty() {
                continue;
            }
            if !self.parse_line(&mut air, toks)? {
                break;
            }
        }
        Ok((air, self.symbols))
    }

    /// The first effective line must be `.ORIG x<addr>`.
    fn seek_origin(
        &mut self,
        lines: &mut impl Iterator<Item = Result<Vec<Token>>>,
    ) -> Result<u16> {
        for toks in lines {
            let toks = toks?;
            let Some(head) = toks.first() else { continue };
            if head.kind != TokenKind::Dir(DirKind::Orig) {
                return Err(error::parse_missing_orig(head.span, self.src));
            }
            let addr = match toks.get(1) {
                Some(Token {
                    kind: TokenKind::Lit(LiteralKind::Hex(addr)),
                    ..
                }) => *addr,
                _ => return Err(error::parse_orig_addr(head.span, self.src)),
            };
            if let Some(extra) = toks.get(2) {
                return Err(error::parse_trailing(extra.span, self.src));
            }
            return Ok(addr);
        }
        Err(error::parse_missing_orig(Span::dummy(), self.src))
    }

    /// Lay out one non-empty line. Returns `false` once `.END` is reached.
    fn parse_line(&mut self, air: &mut Air, toks: Vec<Token>) -> Result<bool> {
        let mut toks = LineToks::new(self.src, &toks);

        // Prefix labels, and lines that are nothing but labels
        while let Some(tok) = toks.take_label() {
            let name = self.src[tok.span.range()].to_string();
            self.pending.push((name, tok.span));
        }
        let Some(head) = toks.next() else {
            return Ok(true);
        };

        let kind = match head.kind {
            TokenKind::Instr(instr) => self.parse_instr(instr, &mut toks)?,
            TokenKind::Trap(trap) => self.parse_trap(trap, &mut toks)?,
            TokenKind::Dir(DirKind::End) => return Ok(false),
            TokenKind::Dir(DirKind::Fill) => StmtKind::Fill {
                value: toks.target()?,
            },
            TokenKind::Dir(DirKind::Stringz) => {
                let lit = toks.expect_str()?;
                // Span includes the quotes
                let inner = &self.src[lit.span.offs() + 1..lit.span.end() - 1];
                StmtKind::Stringz {
                    data: unescape(inner),
                }
            }
            TokenKind::Dir(DirKind::Orig) => {
                return Err(error::parse_misplaced_orig(head.span, self.src))
            }
            kind => return Err(error::parse_unexpected(head.span, self.src, "a statement", kind)),
        };
        toks.finish()?;

        for (name, span) in self.pending.drain(..) {
            if let Err(prev) = self.symbols.insert(&name, self.addr) {
                return Err(error::parse_duplicate_label(span, self.src, prev));
            }
        }
        let stmt = AirStmt {
            addr: self.addr,
            span: head.span,
            kind,
        };
        self.addr = self.addr.wrapping_add(stmt.size());
        air.add_stmt(stmt);
        Ok(true)
    }

    fn parse_instr(&self, instr: InstrKind, toks: &mut LineToks) -> Result<StmtKind> {
        use InstrKind::*;
        Ok(match instr {
            Add => StmtKind::Add {
                dest: toks.expect_reg()?,
                src: toks.expect_reg()?,
                rhs: toks.imm_or_reg()?,
            },
            And => StmtKind::And {
                dest: toks.expect_reg()?,
                src: toks.expect_reg()?,
                rhs: toks.imm_or_reg()?,
            },
            Br(cond) => StmtKind::Branch {
                cond,
                target: toks.target()?,
            },
            Jmp => StmtKind::Jump {
                base: toks.expect_reg()?,
            },
            Ret => StmtKind::Return,
            // JSR through a register is the JSRR form
            Jsr => match toks.peek_kind() {
                Some(TokenKind::Reg(_)) => StmtKind::JumpSubReg {
                    base: toks.expect_reg()?,
                },
                _ => StmtKind::JumpSub {
                    target: toks.target()?,
                },
            },
            Jsrr => StmtKind::JumpSubReg {
                base: toks.expect_reg()?,
            },
            Ld => StmtKind::Load {
                dest: toks.expect_reg()?,
                target: toks.target()?,
            },
            Ldi => StmtKind::LoadInd {
                dest: toks.expect_reg()?,
                target: toks.target()?,
            },
            Ldr => StmtKind::LoadReg {
                dest: toks.expect_reg()?,
                base: toks.expect_reg()?,
                offset: toks.expect_lit(6)?,
            },
            Lea => StmtKind::LoadAddr {
                dest: toks.expect_reg()?,
                target: toks.target()?,
            },
            Not => StmtKind::Not {
                dest: toks.expect_reg()?,
                src: toks.expect_reg()?,
            },
            Rti => StmtKind::Rti,
            Res => StmtKind::Res,
            St => StmtKind::Store {
                src: toks.expect_reg()?,
                target: toks.target()?,
            },
            Sti => StmtKind::StoreInd {
                src: toks.expect_reg()?,
                target: toks.target()?,
            },
            Str => StmtKind::StoreReg {
                src: toks.expect_reg()?,
                base: toks.expect_reg()?,
                offset: toks.expect_lit(6)?,
            },
        })
    }

    fn parse_trap(&self, trap: TrapKind, toks: &mut LineToks) -> Result<StmtKind> {
        let vect = match trap.vector() {
            Some(vect) => vect,
            None => toks.expect_vect()?,
        };
        Ok(StmtKind::Trap { vect })
    }
}

/// Convenience wrapper: assemble a full source file in one call.
pub fn assemble(src: &str) -> Result<crate::air::ObjImage> {
    let (air, symbols) = AsmParser::new(src).parse()?;
    air.assemble(&symbols, src)
}

/// Lex the source one line at a time. Statements never span lines, so errors
/// and layout both work line by line.
fn lines(src: &str) -> impl Iterator<Item = Result<Vec<Token>>> + '_ {
    let mut offs = 0;
    src.split('\n').map(move |line| {
        let line_offs = offs;
        offs += line.len() + 1;
        tokenize_line(src, line_offs, line)
    })
}

/// Operand cursor over the tokens of one line.
struct LineToks<'a> {
    src: &'a str,
    toks: &'a [Token],
    pos: usize,
    head_span: Span,
}

impl<'a> LineToks<'a> {
    fn new(src: &'a str, toks: &'a [Token]) -> Self {
        let head_span = toks.first().map(|t| t.span).unwrap_or_else(Span::dummy);
        LineToks {
            src,
            toks,
            pos: 0,
            head_span,
        }
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.toks.get(self.pos).map(|t| t.kind)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let tok = self.toks.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: &str) -> Result<&'a Token> {
        self.next()
            .ok_or_else(|| error::parse_end_of_line(self.head_span, self.src, expected))
    }

    fn expect_reg(&mut self) -> Result<Register> {
        let tok = self.expect("a register")?;
        match tok.kind {
            TokenKind::Reg(reg) => Ok(reg),
            kind => Err(error::parse_unexpected(tok.span, self.src, "a register", kind)),
        }
    }

    fn expect_str(&mut self) -> Result<&'a Token> {
        let tok = self.expect("a string literal")?;
        match tok.kind {
            TokenKind::Lit(LiteralKind::Str) => Ok(tok),
            kind => Err(error::parse_unexpected(
                tok.span,
                self.src,
                "a string literal",
                kind,
            )),
        }
    }

    fn take_label(&mut self) -> Option<&'a Token> {
        match self.peek_kind() {
            Some(TokenKind::Label) => self.next(),
            _ => None,
        }
    }

    /// Numeric literal constrained to a `bits`-wide field. Decimal literals
    /// are checked against the signed range; hex and binary literals are raw
    /// bit patterns up to the field width.
    fn expect_lit(&mut self, bits: u32) -> Result<i16> {
        let tok = self.expect("a numeric literal")?;
        let bound = 1i32 << (bits - 1);
        let (val, range) = match tok.kind {
            TokenKind::Lit(LiteralKind::Dec(d)) => (d as i32, -bound..bound),
            TokenKind::Lit(LiteralKind::Hex(u)) | TokenKind::Lit(LiteralKind::Bin(u)) => {
                (u as i32, 0..bound * 2)
            }
            kind => {
                return Err(error::parse_unexpected(
                    tok.span,
                    self.src,
                    "a numeric literal",
                    kind,
                ))
            }
        };
        if !range.contains(&val) {
            return Err(error::parse_lit_range(
                tok.span,
                self.src,
                val,
                &format!("{bits} bits"),
            ));
        }
        Ok(val as i16)
    }

    /// Unsigned 8-bit trap vector.
    fn expect_vect(&mut self) -> Result<u8> {
        let tok = self.expect("a trap vector")?;
        let val = match tok.kind {
            TokenKind::Lit(LiteralKind::Dec(d)) => d as i32,
            TokenKind::Lit(LiteralKind::Hex(u)) | TokenKind::Lit(LiteralKind::Bin(u)) => u as i32,
            kind => {
                return Err(error::parse_unexpected(
                    tok.span,
                    self.src,
                    "a trap vector",
                    kind,
                ))
            }
        };
        if !(0..=0xFF).contains(&val) {
            return Err(error::parse_lit_range(tok.span, self.src, val, "8 bits"));
        }
        Ok(val as u8)
    }

    /// A label reference or a literal offset.
    fn target(&mut self) -> Result<Target> {
        let tok = self.expect("a label or literal")?;
        match tok.kind {
            TokenKind::Label => {
                let name = &self.src[tok.span.range()];
                Ok(Target::Label(Label::new(name, tok.span)))
            }
            TokenKind::Lit(LiteralKind::Dec(d)) => Ok(Target::Offs(d)),
            TokenKind::Lit(LiteralKind::Hex(u)) | TokenKind::Lit(LiteralKind::Bin(u)) => {
                Ok(Target::Offs(u as i16))
            }
            kind => Err(error::parse_unexpected(
                tok.span,
                self.src,
                "a label or literal",
                kind,
            )),
        }
    }

    fn imm_or_reg(&mut self) -> Result<ImmOrReg> {
        match self.peek_kind() {
            Some(TokenKind::Reg(_)) => Ok(ImmOrReg::Reg(self.expect_reg()?)),
            _ => Ok(ImmOrReg::Imm(self.expect_lit(5)?)),
        }
    }

    /// Statements own their whole line.
    fn finish(&mut self) -> Result<()> {
        match self.next() {
            Some(tok) => Err(error::parse_trailing(tok.span, self.src)),
            None => Ok(()),
        }
    }
}

/// Translate string escapes into character words. Unknown escapes keep the
/// escaped character.
fn unescape(s: &str) -> Vec<u16> {
    let mut data = Vec::with_capacity(s.len() + 1);
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        let c = match c {
            '\\' => match chars.next() {
                Some('n') => '\n',
                Some('t') => '\t',
                Some('r') => '\r',
                Some('e') => '\x1b',
                Some('0') => '\0',
                Some(other) => other,
                None => break,
            },
            c => c,
        };
        data.push(c as u16);
    }
    data.push(0);
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Flag;

    fn parse(src: &str) -> (Air, SymbolTable) {
        AsmParser::new(src).parse().unwrap()
    }

    #[test]
    fn origin_is_first_effective_line() {
        let (air, _) = parse("; banner comment\n\n.ORIG x3000\nHALT\n.END\n");
        assert_eq!(air.orig(), 0x3000);
        assert_eq!(air.len(), 1);
    }

    #[test]
    fn missing_origin_is_an_error() {
        assert!(AsmParser::new("ADD R0, R0, #1\n").parse().is_err());
        assert!(AsmParser::new(".ORIG #12288\n").parse().is_err());
    }

    #[test]
    fn second_origin_is_an_error() {
        assert!(AsmParser::new(".ORIG x3000\n.ORIG x4000\n").parse().is_err());
    }

    #[test]
    fn bare_label_binds_to_next_statement() {
        let (_, symbols) = parse(".ORIG x3000\nADD R0, R0, #1\nloop\n\nAND R1, R1, #0\n.END\n");
        assert_eq!(symbols.get("loop"), Some(0x3001));
    }

    #[test]
    fn prefix_label_binds_to_its_statement() {
        let (_, symbols) = parse(".ORIG x3000\nfirst ADD R0, R0, #1\nsecond HALT\n.END\n");
        assert_eq!(symbols.get("first"), Some(0x3000));
        assert_eq!(symbols.get("second"), Some(0x3001));
    }

    #[test]
    fn duplicate_label_is_an_error() {
        assert!(AsmParser::new(".ORIG x3000\na HALT\na HALT\n.END\n")
            .parse()
            .is_err());
    }

    #[test]
    fn stringz_advances_by_length_plus_one() {
        let (air, symbols) = parse(".ORIG x3000\nmsg .STRINGZ \"hi\"\nafter HALT\n.END\n");
        assert_eq!(symbols.get("after"), Some(0x3003));
        assert_eq!(
            &air.get(0).kind,
            &StmtKind::Stringz {
                data: vec![b'h' as u16, b'i' as u16, 0]
            }
        );
    }

    #[test]
    fn stringz_escapes() {
        let (air, _) = parse(".ORIG x3000\n.STRINGZ \"a\\n\\t\\\\\"\n.END\n");
        assert_eq!(
            &air.get(0).kind,
            &StmtKind::Stringz {
                data: vec![b'a' as u16, b'\n' as u16, b'\t' as u16, b'\\' as u16, 0]
            }
        );
    }

    #[test]
    fn jsr_through_register_is_jsrr() {
        let (air, _) = parse(".ORIG x3000\nJSR R3\n.END\n");
        assert_eq!(
            &air.get(0).kind,
            &StmtKind::JumpSubReg { base: Register::R3 }
        );
    }

    #[test]
    fn add_immediate_flag_follows_third_operand() {
        let (air, _) = parse(".ORIG x3000\nADD R0, R1, R2\nADD R0, R1, #-7\n.END\n");
        assert_eq!(
            &air.get(0).kind,
            &StmtKind::Add {
                dest: Register::R0,
                src: Register::R1,
                rhs: ImmOrReg::Reg(Register::R2),
            }
        );
        assert_eq!(
            &air.get(1).kind,
            &StmtKind::Add {
                dest: Register::R0,
                src: Register::R1,
                rhs: ImmOrReg::Imm(-7),
            }
        );
    }

    #[test]
    fn imm5_out_of_range_is_an_error() {
        assert!(AsmParser::new(".ORIG x3000\nADD R0, R0, #16\n.END\n")
            .parse()
            .is_err());
    }

    #[test]
    fn trailing_token_is_an_error() {
        assert!(AsmParser::new(".ORIG x3000\nRET R0\n.END\n").parse().is_err());
    }

    #[test]
    fn end_stops_the_parse() {
        let (air, _) = parse(".ORIG x3000\nHALT\n.END\nthis line is never lexed as code\n");
        assert_eq!(air.len(), 1);
    }

    #[test]
    fn generic_trap_takes_a_vector() {
        let (air, _) = parse(".ORIG x3000\nTRAP x25\n.END\n");
        assert_eq!(&air.get(0).kind, &StmtKind::Trap { vect: 0x25 });
    }

    #[test]
    fn branch_variants_carry_their_condition() {
        let (air, _) = parse(".ORIG x3000\nBRnz done\ndone HALT\n.END\n");
        assert_eq!(
            &air.get(0).kind,
            &StmtKind::Branch {
                cond: Flag::Nz,
                target: Target::Label(Label::new("done", Span::dummy())),
            }
        );
    }

    #[test]
    fn hello_world_image() {
        let image = assemble(
            ".ORIG x3000\n\
             LEA R0, msg\n\
             PUTs\n\
             HALT\n\
             msg .STRINGZ \"Hello, world!\"\n\
             .END\n",
        )
        .unwrap();
        assert_eq!(image.orig(), 0x3000);
        let mut expect = vec![0xE002, 0xF022, 0xF025];
        expect.extend("Hello, world!".chars().map(|c| c as u16));
        expect.push(0);
        assert_eq!(image.words(), expect.as_slice());
    }
}
