//! Reader and lowering for the Cosmos surface language.

pub mod declaration_parser;
pub mod diagnostics;
pub mod parser;
pub mod surface;

pub use declaration_parser::{
    parse_program, parse_program_with_depth, parse_term, parse_term_with_depth,
    DeclarationParseError,
};
pub use surface::*;
