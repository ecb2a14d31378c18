//! WHERE-clause filter language
//!
//! A small boolean expression language evaluated against a single row.
//! The in-memory driver uses it for raw-string filters; SQL drivers pass
//! raw filters straight through to their own engine.
//!
//! ```
//! use quarry_core::expr::{parse, MathFunctions};
//! use quarry_core::row;
//!
//! let filter = parse("age > 18 and status = 'active'").unwrap();
//! let adult = row! { "age" => 20, "status" => "active" };
//! assert!(filter.matches(&adult, &MathFunctions).unwrap());
//! ```

pub mod ast;
pub mod functions;
pub mod lexer;
pub mod parser;

pub use ast::{BinaryOperator, Expression, FunctionLookup, NoFunctions, Operand};
pub use functions::MathFunctions;
pub use lexer::{Lexer, Token, TokenKind};
pub use parser::parse;
