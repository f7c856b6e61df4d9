//! A whole-program compiler for JPL, a small statically-typed numeric and
//! image processing language, targeting x86-64 NASM assembly linked against
//! an external runtime.
//!
//! The pipeline runs strictly forward: bytes → tokens → tree → typed tree →
//! (constant-propagation-annotated tree at `-O2`) → assembly text. The type
//! checker and the constant-propagation pass annotate tree nodes in place;
//! everything else is a pure function of its input.

/// The lexer maps the source text to a sequence of located tokens.
pub mod lexer;

/// The parser maps the token stream to a tree of commands.
pub mod parser;

/// The type checker resolves every expression's type in place and builds the
/// global scope the code generator consumes.
pub mod type_checker;

/// The optional constant-propagation pass (optimization level >= 2).
pub mod const_prop;

/// The code generator lowers the typed tree to an x86-64 NASM module.
pub mod codegen;

pub mod ast;
pub mod token;
pub mod types;
