//! An assembler and interpreter for the LC3 assembly language.
//!
//! Source files pass through a line lexer and a two-pass parser into an
//! intermediate representation ([`Air`]), which encodes into a binary image
//! that the interpreter ([`RunState`]) executes. The instruction format
//! lives in [`ops`] and is shared by both halves, so what the assembler
//! emits is exactly what the runtime decodes.

pub mod air;
pub mod error;
pub mod lexer;
pub mod ops;
pub mod parser;
pub mod runtime;
pub mod symbol;
pub mod term;

pub use air::{Air, ObjImage};
pub use parser::AsmParser;
pub use runtime::RunState;
pub use symbol::SymbolTable;

/// Source lines shown around an error label.
pub const DIAGNOSTIC_CONTEXT_LINES: usize = 8;
