//! Diagnostic constructors. Every lexer, parser, and encoding error funnels
//! through here so messages stay consistent and always carry the offending
//! source.

use miette::{miette, LabeledSpan, Report, Severity};

use crate::lexer::TokenKind;
use crate::symbol::Span;

// Lexer errors

pub fn lex_unknown(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::unknown",
        help = "make sure that your int literals start with #, x, or b",
        labels = vec![LabeledSpan::at(span, "unknown token")],
        "Encountered an unknown token",
    )
    .with_source_code(src.to_string())
}

pub fn lex_bad_literal(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::bad_lit",
        help = "numeric literals are #<decimal>, x<hex>, or b<binary>; \
                decimal ranges from -32,768 to 32,767",
        labels = vec![LabeledSpan::at(span, "incorrect literal")],
        "Encountered an invalid numeric literal",
    )
    .with_source_code(src.to_string())
}

pub fn lex_invalid_dir(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::dir",
        help = "available directives are .ORIG, .END, .FILL, and .STRINGZ",
        labels = vec![LabeledSpan::at(span, "incorrect directive")],
        "Encountered an invalid directive",
    )
    .with_source_code(src.to_string())
}

pub fn lex_unclosed_str(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::str_lit",
        help = "make sure to close string literals with a \" character",
        labels = vec![LabeledSpan::at(span, "incorrect literal")],
        "Encountered an unterminated string literal",
    )
    .with_source_code(src.to_string())
}

// Parser errors

pub fn parse_missing_orig(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::orig",
        help = "the first statement of a program must be `.ORIG x<addr>`",
        labels = vec![LabeledSpan::at(span, "expected .ORIG")],
        "Program does not start with an origin directive",
    )
    .with_source_code(src.to_string())
}

pub fn parse_orig_addr(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::orig",
        help = ".ORIG takes a single hex address, like `.ORIG x3000`",
        labels = vec![LabeledSpan::at(span, "not a hex address")],
        "Expected a hexadecimal starting address",
    )
    .with_source_code(src.to_string())
}

pub fn parse_misplaced_orig(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::orig",
        help = "a program has exactly one origin, on its first effective line",
        labels = vec![LabeledSpan::at(span, "second origin")],
        "Origin directive appears twice",
    )
    .with_source_code(src.to_string())
}

pub fn parse_duplicate_label(span: Span, src: &str, prev_addr: u16) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::duplicate_label",
        help = format!("this label is already bound to address x{prev_addr:04X}"),
        labels = vec![LabeledSpan::at(span, "duplicate label")],
        "Label defined twice",
    )
    .with_source_code(src.to_string())
}

pub fn parse_unexpected(span: Span, src: &str, expected: &str, found: TokenKind) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::unexpected_token",
        help = "check the type of operands allowed for this instruction",
        labels = vec![LabeledSpan::at(span, "unexpected token")],
        "Expected {expected}, found {found}",
    )
    .with_source_code(src.to_string())
}

pub fn parse_end_of_line(span: Span, src: &str, expected: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::end_of_line",
        help = "statements cannot continue onto the next line",
        labels = vec![LabeledSpan::at(span, "statement starts here")],
        "Missing operand: expected {expected} before end of line",
    )
    .with_source_code(src.to_string())
}

pub fn parse_trailing(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::trailing",
        help = "each line holds at most one statement",
        labels = vec![LabeledSpan::at(span, "extra token")],
        "Unexpected token after a complete statement",
    )
    .with_source_code(src.to_string())
}

pub fn parse_lit_range(span: Span, src: &str, val: i32, bits: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::lit_range",
        help = format!("this operand must fit in {bits}"),
        labels = vec![LabeledSpan::at(span, "out-of-range literal")],
        "Found numeric literal {val} of incorrect size",
    )
    .with_source_code(src.to_string())
}

// Encoding errors

pub fn asm_undefined_label(span: Span, src: &str, name: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::undefined_label",
        help = "labels are declared on their own line or as a statement prefix",
        labels = vec![LabeledSpan::at(span, "undefined label")],
        "Reference to undefined label `{name}`",
    )
    .with_source_code(src.to_string())
}

pub fn asm_offset_range(span: Span, src: &str, width: u32, delta: i32) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::offset_range",
        help = "move the target closer or jump through a register instead",
        labels = vec![LabeledSpan::at(span, "offset out of range")],
        "Offset {delta} does not fit in a {width}-bit field",
    )
    .with_source_code(src.to_string())
}
