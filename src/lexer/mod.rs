use std::fmt;
use std::str::FromStr;

use miette::Result;

use crate::error;
use crate::lexer::cursor::Cursor;
use crate::symbol::{DirKind, Flag, InstrKind, Register, Span, TrapKind};

pub mod cursor;

/// A source token with its location.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TokenKind {
    /// Identifier that is not a mnemonic or register
    Label,
    Instr(InstrKind),
    Trap(TrapKind),
    Dir(DirKind),
    Reg(Register),
    Lit(LiteralKind),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LiteralKind {
    /// `#` prefix, signed
    Dec(i16),
    /// `x` prefix
    Hex(u16),
    /// `b` prefix
    Bin(u16),
    /// Quoted string; contents are sliced from the source by span
    Str,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::Label => "label",
            TokenKind::Instr(_) => "instruction",
            TokenKind::Trap(_) => "trap",
            TokenKind::Dir(_) => "directive",
            TokenKind::Reg(_) => "register",
            TokenKind::Lit(LiteralKind::Str) => "string literal",
            TokenKind::Lit(_) => "numeric literal",
        };
        f.write_str(name)
    }
}

/// Test if a character is considered to be whitespace.
pub(crate) fn is_whitespace(c: char) -> bool {
    // Commas are essentially whitespace between operands
    matches!(c, ' ' | '\t' | '\r' | ',')
}

fn is_id_start(c: char) -> bool {
    matches!(c, 'a'..='z' | 'A'..='Z' | '_')
}

pub(crate) fn is_id(c: char) -> bool {
    matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '_')
}

/// Tokenize one source line. `line_offs` is the byte offset of the line
/// within `src`, so spans refer to the whole source for diagnostics.
/// Comments run to the end of the line.
pub fn tokenize_line(src: &str, line_offs: usize, line: &str) -> Result<Vec<Token>> {
    let mut cursor = Cursor::new(line);
    let mut toks = Vec::new();
    let mut pos = 0;

    // Raw shape found while scanning, refined into a `TokenKind` below once
    // the token text is known.
    enum Raw {
        Ws,
        Str,
        Dir,
        Dec,
        /// Unprefixed decimal
        Num,
        Hex,
        Bin,
        Ident,
    }

    loop {
        cursor.reset_pos();
        let Some(first) = cursor.bump() else { break };
        let raw = match first {
            ';' => break,
            c if is_whitespace(c) => {
                cursor.take_while(is_whitespace);
                Raw::Ws
            }
            '"' => {
                loop {
                    match cursor.bump() {
                        Some('"') => break,
                        // Skip escaped characters so \" does not close
                        Some('\\') => {
                            cursor.bump();
                        }
                        Some(_) => {}
                        None => {
                            let span = Span::new(line_offs + pos, cursor.pos_in_token());
                            return Err(error::lex_unclosed_str(span, src));
                        }
                    }
                }
                Raw::Str
            }
            '.' => {
                cursor.take_while(is_id);
                Raw::Dir
            }
            '#' => {
                if cursor.first() == '-' {
                    cursor.bump();
                }
                cursor.take_while(|c| c.is_ascii_digit());
                Raw::Dec
            }
            'x' | 'X' if cursor.first().is_ascii_hexdigit() => {
                cursor.take_while(|c| c.is_ascii_hexdigit());
                Raw::Hex
            }
            'b' | 'B' if matches!(cursor.first(), '0' | '1') => {
                cursor.take_while(|c| matches!(c, '0' | '1'));
                Raw::Bin
            }
            c if c.is_ascii_digit() => {
                // Take the whole identifier-shaped run so `12ab` errors as
                // one bad literal instead of splitting
                cursor.take_while(is_id);
                Raw::Num
            }
            c if is_id_start(c) => {
                cursor.take_while(is_id);
                Raw::Ident
            }
            _ => {
                let span = Span::new(line_offs + pos, cursor.pos_in_token());
                return Err(error::lex_unknown(span, src));
            }
        };

        let len = cursor.pos_in_token();
        let text = &line[pos..pos + len];
        let span = Span::new(line_offs + pos, len);
        pos += len;

        let kind = match raw {
            Raw::Ws => continue,
            Raw::Str => TokenKind::Lit(LiteralKind::Str),
            Raw::Dir => {
                TokenKind::Dir(directive(text).ok_or_else(|| error::lex_invalid_dir(span, src))?)
            }
            Raw::Dec => TokenKind::Lit(LiteralKind::Dec(parse_dec(&text[1..], span, src)?)),
            Raw::Num => TokenKind::Lit(LiteralKind::Dec(parse_dec(text, span, src)?)),
            Raw::Hex => TokenKind::Lit(LiteralKind::Hex(parse_radix(&text[1..], 16, span, src)?)),
            Raw::Bin => TokenKind::Lit(LiteralKind::Bin(parse_radix(&text[1..], 2, span, src)?)),
            Raw::Ident => classify(text),
        };
        toks.push(Token { kind, span });
    }
    Ok(toks)
}

/// Mnemonics are case-sensitive: sort an identifier into instruction, trap,
/// register, or label.
fn classify(text: &str) -> TokenKind {
    if let Some(kind) = instr_kind(text) {
        return TokenKind::Instr(kind);
    }
    if let Some(kind) = trap_kind(text) {
        return TokenKind::Trap(kind);
    }
    if let Ok(reg) = Register::from_str(text) {
        return TokenKind::Reg(reg);
    }
    TokenKind::Label
}

fn instr_kind(text: &str) -> Option<InstrKind> {
    let kind = match text {
        "ADD" => InstrKind::Add,
        "AND" => InstrKind::And,
        "BR" | "BRnzp" => InstrKind::Br(Flag::Nzp),
        "BRn" => InstrKind::Br(Flag::N),
        "BRz" => InstrKind::Br(Flag::Z),
        "BRp" => InstrKind::Br(Flag::P),
        "BRnz" => InstrKind::Br(Flag::Nz),
        "BRnp" => InstrKind::Br(Flag::Np),
        "BRzp" => InstrKind::Br(Flag::Zp),
        "JMP" => InstrKind::Jmp,
        "RET" => InstrKind::Ret,
        "JSR" => InstrKind::Jsr,
        "JSRR" => InstrKind::Jsrr,
        "LD" => InstrKind::Ld,
        "LDI" => InstrKind::Ldi,
        "LDR" => InstrKind::Ldr,
        "LEA" => InstrKind::Lea,
        "NOT" => InstrKind::Not,
        "RTI" => InstrKind::Rti,
        "RES" => InstrKind::Res,
        "ST" => InstrKind::St,
        "STI" => InstrKind::Sti,
        "STR" => InstrKind::Str,
        _ => return None,
    };
    Some(kind)
}

fn trap_kind(text: &str) -> Option<TrapKind> {
    let kind = match text {
        "TRAP" => TrapKind::Generic,
        "GETc" => TrapKind::Getc,
        "OUT" => TrapKind::Out,
        "PUTs" => TrapKind::Puts,
        "IN" => TrapKind::In,
        "PUTsp" => TrapKind::Putsp,
        "HALT" => TrapKind::Halt,
        _ => return None,
    };
    Some(kind)
}

fn directive(text: &str) -> Option<DirKind> {
    let kind = match text {
        ".ORIG" => DirKind::Orig,
        ".END" => DirKind::End,
        ".FILL" => DirKind::Fill,
        ".STRINGZ" => DirKind::Stringz,
        _ => return None,
    };
    Some(kind)
}

fn parse_dec(digits: &str, span: Span, src: &str) -> Result<i16> {
    let val: i32 = digits
        .parse()
        .map_err(|_| error::lex_bad_literal(span, src))?;
    if !(i16::MIN as i32..=i16::MAX as i32).contains(&val) {
        return Err(error::lex_bad_literal(span, src));
    }
    Ok(val as i16)
}

fn parse_radix(digits: &str, radix: u32, span: Span, src: &str) -> Result<u16> {
    u16::from_str_radix(digits, radix).map_err(|_| error::lex_bad_literal(span, src))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(line: &str) -> Vec<TokenKind> {
        tokenize_line(line, 0, line)
            .unwrap()
            .into_iter()
            .map(|tok| tok.kind)
            .collect()
    }

    #[test]
    fn commas_are_whitespace() {
        assert_eq!(
            kinds("ADD R0, R1, #-7"),
            vec![
                TokenKind::Instr(InstrKind::Add),
                TokenKind::Reg(Register::R0),
                TokenKind::Reg(Register::R1),
                TokenKind::Lit(LiteralKind::Dec(-7)),
            ]
        );
    }

    #[test]
    fn comments_end_the_line() {
        assert_eq!(
            kinds("HALT ; stop \"here\""),
            vec![TokenKind::Trap(TrapKind::Halt)]
        );
        assert!(kinds("; nothing but comment").is_empty());
    }

    #[test]
    fn literal_prefixes() {
        assert_eq!(kinds("x3000"), vec![TokenKind::Lit(LiteralKind::Hex(0x3000))]);
        assert_eq!(kinds("b1010"), vec![TokenKind::Lit(LiteralKind::Bin(10))]);
        assert_eq!(kinds("#-16"), vec![TokenKind::Lit(LiteralKind::Dec(-16))]);
    }

    #[test]
    fn bare_decimals_are_literals() {
        assert_eq!(kinds("123"), vec![TokenKind::Lit(LiteralKind::Dec(123))]);
        assert_eq!(kinds("0"), vec![TokenKind::Lit(LiteralKind::Dec(0))]);
    }

    #[test]
    fn bad_literals() {
        assert!(tokenize_line("#", 0, "#").is_err());
        assert!(tokenize_line("#99999", 0, "#99999").is_err());
        assert!(tokenize_line("99999", 0, "99999").is_err());
        // A digit-led identifier is one bad literal, not a number and a label
        assert!(tokenize_line("12ab", 0, "12ab").is_err());
    }

    #[test]
    fn x_prefixed_identifiers_are_labels() {
        // Only a hex digit after `x` makes a literal
        assert_eq!(kinds("xGG")[0], TokenKind::Label);
        assert_eq!(kinds("x")[0], TokenKind::Label);
    }

    #[test]
    fn mnemonics_are_case_sensitive() {
        assert_eq!(kinds("add")[0], TokenKind::Label);
        assert_eq!(kinds("ADD")[0], TokenKind::Instr(InstrKind::Add));
        assert_eq!(kinds("PUTs")[0], TokenKind::Trap(TrapKind::Puts));
        assert_eq!(kinds("PUTS")[0], TokenKind::Label);
    }

    #[test]
    fn string_spans_include_quotes() {
        let toks = tokenize_line(r#".STRINGZ "hi!""#, 0, r#".STRINGZ "hi!""#).unwrap();
        assert_eq!(toks[1].kind, TokenKind::Lit(LiteralKind::Str));
        assert_eq!(toks[1].span.range(), 9..14);
    }

    #[test]
    fn unterminated_string() {
        assert!(tokenize_line(r#""oops"#, 0, r#""oops"#).is_err());
    }

    #[test]
    fn escaped_quote_stays_inside_the_string() {
        let line = r#".STRINGZ "say \"hi\"""#;
        let toks = tokenize_line(line, 0, line).unwrap();
        assert_eq!(toks.len(), 2);
        assert_eq!(toks[1].kind, TokenKind::Lit(LiteralKind::Str));
    }

    #[test]
    fn unknown_directive() {
        assert!(tokenize_line(".BLKW x2", 0, ".BLKW x2").is_err());
    }
}
