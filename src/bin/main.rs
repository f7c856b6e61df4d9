use std::{fmt, fs, path::PathBuf};

use clap::Parser;

use jpl::{codegen, const_prop, lexer, parser, type_checker};

/// The JPL compiler.
///
/// Stage flags short-circuit the pipeline in the order `-l`, `-p`, `-t`,
/// `-s`; without any of them the full pipeline runs for effect and prints
/// nothing on success. Success and failure are reported as `Compilation
/// succeeded` / `Compilation failed` on stdout (diagnostics go to stderr)
/// and the exit code is always zero.
#[derive(Parser)]
#[command(name = "jplc")]
struct Cli {
    /// The JPL source file to compile.
    input: PathBuf,

    /// Print the token stream and stop after lexing.
    #[arg(short = 'l')]
    lex: bool,

    /// Print the parse tree and stop after parsing.
    #[arg(short = 'p')]
    parse: bool,

    /// Type-check and print the typed tree.
    #[arg(short = 't')]
    typecheck: bool,

    /// Emit the assembly module to stdout.
    #[arg(short = 's')]
    assembly: bool,

    /// Optimization level. Only the character attached to -O is consulted
    /// (write -O2, not -O 2); anything but a digit means level 0.
    #[arg(short = 'O', value_name = "LEVEL", default_value = "0")]
    opt: String,
}

impl Cli {
    fn opt_level(&self) -> u8 {
        match self.opt.bytes().next() {
            Some(digit @ b'0'..=b'9') => digit - b'0',
            _ => 0,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let source = match fs::read_to_string(&cli.input) {
        Ok(source) => source,
        Err(error) => {
            eprintln!("Could not read {}: {error}", cli.input.display());
            println!("Compilation failed");
            return;
        }
    };
    run(&cli, &source);
}

fn run(cli: &Cli, source: &str) {
    if cli.lex {
        let tokens = match lexer::lex_all(source) {
            Ok(tokens) => tokens,
            Err(error) => return fail(error),
        };
        for token in &tokens {
            println!("{token}");
        }
        println!("Compilation succeeded: lexical analysis complete");
        return;
    }

    let tokens = match lexer::lex_all(source) {
        Ok(tokens) => tokens,
        Err(error) => return fail(error),
    };
    let mut program = match parser::parse_program(&tokens) {
        Ok(program) => program,
        Err(error) => return fail(error),
    };
    if cli.parse {
        for cmd in &program {
            println!("{cmd}");
        }
        println!("Compilation succeeded");
        return;
    }

    let globals = match type_checker::typecheck(&mut program) {
        Ok(globals) => globals,
        Err(error) => return fail(error),
    };
    if cli.typecheck {
        for cmd in &program {
            println!("{cmd}");
        }
        println!("Compilation succeeded");
        return;
    }

    if cli.opt_level() >= 2 {
        const_prop::propagate(&mut program);
    }

    let assembly = match codegen::generate(&program, &globals, cli.opt_level()) {
        Ok(assembly) => assembly,
        Err(error) => return fail(error),
    };
    if cli.assembly {
        print!("{assembly}");
        println!("Compilation succeeded");
    }
}

fn fail(error: impl fmt::Display) {
    eprintln!("{error}");
    println!("Compilation failed");
}
