//! Lowering of the typed tree to an x86-64 NASM module.
//!
//! The module-level state ([`Module`]) owns the deduplicating constant pool,
//! the jump-label counter and the calling-convention table; per-function
//! state lives in [`x86_64::FunctionGen`]. The emitted text always consists
//! of the fixed linkage header, a `.data` section listing the constant pool,
//! and a `.text` section with every JPL function followed by `jpl_main`.

use std::collections::HashMap;
use std::fmt;

use crate::{ast::Program, type_checker::Globals, types::ResolvedType};

mod convention;
mod x86_64;

pub use convention::{ArgSlot, CallingConvention, Location, ReturnLocation};

use x86_64::FunctionGen;

type Result<T, E = Error> = std::result::Result<T, E>;

/// The fixed linkage header: the entry point plus every runtime helper the
/// generated code may call.
pub const LINKAGE_HEADER: &str = "\
global jpl_main
global _jpl_main
extern _fail_assertion
extern _jpl_alloc
extern _get_time
extern _show
extern _print
extern _print_time
extern _read_image
extern _write_image
extern _fmod
extern _sqrt
extern _exp
extern _sin
extern _cos
extern _tan
extern _asin
extern _acos
extern _atan
extern _log
extern _pow
extern _atan2
extern _to_int
extern _to_float
";

/// Generates the complete assembly module for a type-checked program.
///
/// The global scope provides a calling convention for every function,
/// builtins included, before any body is lowered; `opt_level` switches the
/// peephole rules (>= 1) and the constant-propagation-informed ones (>= 2).
pub fn generate(program: &Program, globals: &Globals, opt_level: u8) -> Result<String> {
    let mut module = Module::new(globals, opt_level);
    let mut main = FunctionGen::main();
    for cmd in program {
        main.cg_cmd(&mut module, cmd)?;
    }
    let main = main.render();
    module.functions.push(main);
    Ok(module.render())
}

/// Module-wide code generation state.
pub struct Module {
    pool: ConstPool,
    jump_count: u32,
    conventions: HashMap<String, CallingConvention>,
    opt_level: u8,
    /// Rendered functions in emission order; `jpl_main` is pushed last.
    functions: Vec<String>,
}

impl Module {
    fn new(globals: &Globals, opt_level: u8) -> Module {
        let conventions = globals
            .functions()
            .map(|(name, ret, params)| (name.to_string(), CallingConvention::new(params, ret)))
            .collect();
        Module {
            pool: ConstPool::default(),
            jump_count: 0,
            conventions,
            opt_level,
            functions: Vec::new(),
        }
    }

    fn opt_level(&self) -> u8 {
        self.opt_level
    }

    fn pool(&mut self) -> &mut ConstPool {
        &mut self.pool
    }

    fn fresh_jump(&mut self) -> String {
        self.jump_count += 1;
        format!(".jump{}", self.jump_count)
    }

    fn convention(&self, name: &str) -> Result<CallingConvention> {
        self.conventions
            .get(name)
            .cloned()
            .ok_or_else(|| Error::new(format!("Asked for the convention of unknown function {name}.")))
    }

    fn render(&self) -> String {
        let mut out = String::from(LINKAGE_HEADER);
        out.push_str("\nsection .data\n");
        out.push_str(&self.pool.render());
        out.push_str("\nsection .text\n");
        for function in &self.functions {
            out.push_str(function);
        }
        out
    }
}

/// The deduplicated `.data` section: raw assembler directives addressed by
/// synthesized `constN` labels. Adding an identical directive twice returns
/// the original label.
#[derive(Default)]
pub struct ConstPool {
    directives: Vec<String>,
    labels: HashMap<String, usize>,
}

impl ConstPool {
    fn add(&mut self, directive: String) -> String {
        let index = match self.labels.get(&directive) {
            Some(&index) => index,
            None => {
                let index = self.directives.len();
                self.labels.insert(directive.clone(), index);
                self.directives.push(directive);
                index
            }
        };
        format!("const{index}")
    }

    /// Strings are NUL-terminated in the pool.
    pub fn string(&mut self, value: &str) -> String {
        self.add(format!("db `{value}`, 0"))
    }

    pub fn int(&mut self, value: i64) -> String {
        self.add(format!("dq {value}"))
    }

    pub fn float(&mut self, value: f64) -> String {
        self.add(format!("dq {value:.10e}"))
    }

    fn render(&self) -> String {
        self.directives
            .iter()
            .enumerate()
            .map(|(index, directive)| format!("const{index}: {directive}\n"))
            .collect()
    }
}

/// An internal failure of the generator itself: an inconsistent tree or
/// stack. Distinct from the user-facing lex/parse/type errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Error {
    pub message: String,
}

impl Error {
    pub(crate) fn new(message: impl Into<String>) -> Error {
        Error {
            message: message.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// The `(TypeName)` string handed to `_show` alongside the value.
fn show_type_string(ty: &ResolvedType) -> String {
    format!("({ty})")
}
