//! End-to-end pipeline tests: lex, parse, type-check, (optionally propagate
//! constants,) generate, and inspect the emitted assembly module.

use jpl::{
    codegen::{self, LINKAGE_HEADER},
    const_prop, lexer, parser, type_checker,
};
use pretty_assertions::assert_eq;

fn compile_at(src: &str, opt_level: u8) -> Result<String, String> {
    let tokens = lexer::lex_all(src).map_err(|e| e.to_string())?;
    let mut program = parser::parse_program(&tokens).map_err(|e| e.to_string())?;
    let globals = type_checker::typecheck(&mut program).map_err(|e| e.to_string())?;
    if opt_level >= 2 {
        const_prop::propagate(&mut program);
    }
    codegen::generate(&program, &globals, opt_level).map_err(|e| e.to_string())
}

fn compile(src: &str) -> String {
    compile_at(src, 0).expect("program should compile")
}

#[test]
fn module_shape() {
    let asm = compile("show 1 + 2\n");
    assert!(asm.starts_with(LINKAGE_HEADER));
    let data = asm.find("section .data").unwrap();
    let text = asm.find("section .text").unwrap();
    assert!(data < text);
    assert!(asm.contains("jpl_main:\n_jpl_main:"));
    assert!(asm.contains("push r12"));
    assert!(asm.contains("mov r12, rbp"));
    assert!(asm.trim_end().ends_with("ret"));
}

#[test]
fn show_addition() {
    let asm = compile("show 1 + 2\n");
    // Right operand first, then left, both through the pool at -O0.
    assert!(asm.contains("const0: dq 2"));
    assert!(asm.contains("const1: dq 1"));
    assert!(asm.contains("add rax, r10"));
    assert!(asm.contains("db `(IntType)`, 0"));
    assert!(asm.contains("lea rsi, [rsp]"));
    assert!(asm.contains("call _show"));
}

#[test]
fn let_binding_feeds_later_commands() {
    let asm = compile("let x = 3\nshow x * x\n");
    assert!(asm.contains("; let x = 3 | line: 0"));
    assert!(asm.contains("bytes from rbp - 16 to rsp for temp x"));
    assert!(asm.contains("imul rax, r10"));
}

#[test]
fn array_literal_and_index_checks() {
    let asm = compile("let a = [1, 2, 3]\nshow a[2]\n");
    assert!(asm.contains("call _jpl_alloc"));
    assert!(asm.contains("db `negative array index`, 0"));
    assert!(asm.contains("db `index too large`, 0"));
    assert!(asm.contains("call _fail_assertion"));
    assert!(asm.contains("imul rax, 8 ; multiply by size of elements"));
    assert!(asm.contains("add rax, [rsp + 8] ; add ptr for address in heap"));
}

#[test]
fn functions_are_emitted_before_main() {
    let asm = compile("fn sq(x: int): int {\n return x * x\n}\nshow sq(7)\n");
    let sq = asm.find("sq:\n_sq:").unwrap();
    let main = asm.find("jpl_main:\n_jpl_main:").unwrap();
    assert!(sq < main);
    // The int argument is homed from rdi in the prologue.
    assert!(asm.contains("push rdi"));
    assert!(asm.contains("call _sq"));
    assert!(asm.contains(";Remove temporary variables"));
}

#[test]
fn aggregate_returns_go_through_a_memory_slot() {
    let src = "fn pair(x: int): {int, int} {\n return {x, x}\n}\nshow pair(1)\n";
    let asm = compile(src);
    assert!(asm.contains("push rdi ; $return"));
    assert!(asm.contains("sub rsp, 16 ; Allocating space for return"));
    assert!(asm.contains("lea rdi, [rsp + 0] ; putting return into rdi"));
    assert!(asm.contains("; Moving 16 bytes from rsp to rax"));
}

#[test]
fn float_arithmetic_uses_sse() {
    let asm = compile("show 1.5 + 2.5\nshow 1.0 < 2.0\nshow 3.0 % 2.0\n");
    assert!(asm.contains("addsd xmm0, xmm1"));
    assert!(asm.contains("cmpltsd xmm0, xmm1"));
    assert!(asm.contains("movq rax, xmm0"));
    assert!(asm.contains("call _fmod"));
    assert!(asm.contains("dq 1.5000000000e0"));
}

#[test]
fn integer_division_guards_against_zero() {
    let asm = compile("show 7 / 2\nshow 7 % 2\n");
    assert!(asm.contains("cmp r10, 0 ; check for divide by zero"));
    assert!(asm.contains("cmp r10, 0 ; check for mod by zero"));
    assert!(asm.contains("db `divide by zero`, 0"));
    assert!(asm.contains("cqo"));
    assert!(asm.contains("idiv r10"));
    assert!(asm.contains("mov rax, rdx"));
}

#[test]
fn short_circuit_evaluation() {
    let asm = compile("show true && false\nshow false || true\n");
    assert!(asm.contains("je .jump"));
    assert!(asm.contains("jne .jump"));
}

#[test]
fn sum_loop_frees_bounds_array_loop_keeps_them() {
    let sum = compile("show sum[i: 3, j: 3] i * j\n");
    assert!(sum.contains("sub rsp, 8 ; 8 bytes for sum"));
    assert!(sum.contains("initialize sum"));
    assert!(sum.contains("Add loop body to sum"));
    assert!(sum.contains("add rsp, 16 ; free loop indices"));
    assert!(sum.contains("add rsp, 16 ; free loop bounds"));
    assert!(sum.contains("db `non-positive loop bound`, 0"));

    let array = compile("show array[i: 3] i\n");
    assert!(array.contains("sub rsp, 8 ; 8 bytes for array ptr"));
    assert!(array.contains("call _jpl_alloc ; allocate array"));
    assert!(array.contains("db `overflow computing array size`, 0"));
    assert!(array.contains("add rsp, 8 ; free loop indices"));
    // The bounds and pointer slot form the resulting array descriptor.
    assert!(!array.contains("free loop bounds"));
}

#[test]
fn image_commands_call_the_runtime() {
    let asm = compile("read image \"in.png\" to img\nwrite image img to \"out.png\"\n");
    assert!(asm.contains("call _read_image"));
    assert!(asm.contains("call _write_image"));
    assert!(asm.contains("db `in.png`, 0"));
    assert!(asm.contains("db `out.png`, 0"));
    assert!(asm.contains("sub rsp, 24"));
}

#[test]
fn time_wraps_the_inner_command() {
    let asm = compile("time show 1\n");
    let first = asm.find("call _get_time").unwrap();
    let second = asm.rfind("call _get_time").unwrap();
    assert!(first < second);
    let show = asm.find("call _show").unwrap();
    assert!(first < show && show < second);
    assert!(asm.contains("subsd xmm0, xmm1 ; op time = end - start"));
    assert!(asm.contains("call _print_time"));
}

#[test]
fn assert_and_print() {
    let asm = compile("assert 1 < 2, \"math broke\"\nprint \"done\"\n");
    assert!(asm.contains("cmp rax, 0 ; check assert"));
    assert!(asm.contains("db `math broke`, 0"));
    assert!(asm.contains("call _print ; print done"));
}

#[test]
fn tuple_index_slides_the_element_down() {
    let asm = compile("show {1, 2, 3}{1}\n");
    assert!(asm.contains("; moving 8 bytes from rsp + 8 to rsp + 16"));
    assert!(asm.contains("add rsp, 16"));
}

#[test]
fn string_constants_deduplicate() {
    let asm = compile("print \"hi\"\nprint \"hi\"\nprint \"bye\"\n");
    assert_eq!(asm.matches("db `hi`, 0").count(), 1);
    assert_eq!(asm.matches("db `bye`, 0").count(), 1);
}

#[test]
fn opt1_small_int_pushes_are_immediate() {
    let o0 = compile_at("show 3\n", 0).unwrap();
    assert!(o0.contains("mov rax, [rel const0] ; 3"));
    let o1 = compile_at("show 3\n", 1).unwrap();
    assert!(o1.contains("push qword 3"));
    // Values past 32 bits still go through the pool.
    let o1_big = compile_at("show 4294967296\n", 1).unwrap();
    assert!(o1_big.contains("dq 4294967296"));
}

#[test]
fn opt1_power_of_two_multiplies_become_shifts() {
    let o0 = compile_at("let x = 3\nshow x * 8\n", 0).unwrap();
    assert!(o0.contains("imul rax, r10"));
    let o1 = compile_at("let x = 3\nshow x * 8\n", 1).unwrap();
    assert!(o1.contains("shl rax, 3"));
    assert!(!o1.contains("imul rax, r10"));
    // Multiplying by one disappears entirely.
    let by_one = compile_at("let x = 3\nshow x * 1\n", 1).unwrap();
    assert!(!by_one.contains("shl rax"));
    assert!(!by_one.contains("imul"));
}

#[test]
fn opt1_division_by_one_is_elided() {
    let asm = compile_at("let x = 3\nshow x / 1\n", 1).unwrap();
    assert!(!asm.contains("idiv"));
    let asm = compile_at("let x = 3\nshow x % 1\n", 1).unwrap();
    assert!(!asm.contains("idiv"));
}

#[test]
fn opt1_boolean_valued_if_is_elided() {
    let o0 = compile_at("let b = true\nshow if b then 1 else 0\n", 0).unwrap();
    assert!(o0.contains("cmp rax, 0 ; if b then 1 else 0"));
    let o1 = compile_at("let b = true\nshow if b then 1 else 0\n", 1).unwrap();
    assert!(!o1.contains("cmp rax, 0 ; if b then 1 else 0"));
    // Other literal pairs keep the branch.
    let o1_other = compile_at("let b = true\nshow if b then 2 else 0\n", 1).unwrap();
    assert!(o1_other.contains("cmp rax, 0 ; if b then 2 else 0"));
}

#[test]
fn opt1_array_index_reuses_the_variable_slot() {
    let o0 = compile_at("let a = [1, 2, 3]\nshow a[0]\n", 0).unwrap();
    assert!(o0.contains("to rsp for temp a"));
    let o1 = compile_at("let a = [1, 2, 3]\nshow a[0]\n", 1).unwrap();
    // The descriptor is addressed in place; no copy of a is made.
    assert!(!o1.contains("to rsp for temp a"));
}

#[test]
fn opt2_constant_propagation_reaches_variables() {
    let src = "let x = 3\nshow x\n";
    let o1 = compile_at(src, 1).unwrap();
    assert!(o1.contains("to rsp for temp x"));
    let o2 = compile_at(src, 2).unwrap();
    assert!(o2.contains("push qword 3 ; x"));
}

#[test]
fn opt2_known_multiplies_through_names_become_shifts() {
    let src = "let x = 4\nlet y = 7\nshow y * x\n";
    let o1 = compile_at(src, 1).unwrap();
    assert!(o1.contains("imul rax, r10"));
    let o2 = compile_at(src, 2).unwrap();
    assert!(o2.contains("shl rax, 2"));
}

#[test]
fn compile_time_failures() {
    let type_error = compile_at("show 1 + true\n", 0).unwrap_err();
    assert!(type_error.contains("Typechecking Step"));
    let redefinition = compile_at("let x = 1\nlet x = 2\n", 0).unwrap_err();
    assert!(redefinition.contains("already defined"));
    let missing_return = compile_at("fn f(): int {\n assert true, \"x\"\n}\n", 0).unwrap_err();
    assert!(missing_return.contains("never returns"));
    let mixed_array = compile_at("show [1, true]\n", 0).unwrap_err();
    assert!(mixed_array.contains("mismatched element types"));
    let bad_bound = compile_at("show array[i: 1.5] i\n", 0).unwrap_err();
    assert!(bad_bound.contains("non-int type"));
    let parse_error = compile_at("show +\n", 0).unwrap_err();
    assert!(parse_error.contains("Parsing Step"));
    let lex_error = compile_at("show ^\n", 0).unwrap_err();
    assert!(lex_error.contains("Lexing Step"));
}

#[test]
fn calls_route_arguments_per_convention() {
    let src = "fn f(a: int, b: float, c: int): float {\n return b\n}\nshow f(1, 2.0, 3)\n";
    let asm = compile(src);
    assert!(asm.contains("pop rdi"));
    assert!(asm.contains("movsd xmm0, [rsp]"));
    assert!(asm.contains("pop rsi"));
    assert!(asm.contains("call _f"));
    // Float return comes back in xmm0 and is pushed.
    assert!(asm.contains("movsd [rsp], xmm0"));
}

#[test]
fn global_variables_are_reached_through_r12() {
    let src = "let g = 5\nfn f(): int {\n return g\n}\nshow f()\n";
    let asm = compile(src);
    assert!(asm.contains("mov r10, [r12 - 16]"));
}
