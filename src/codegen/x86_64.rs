//! Per-function lowering to x86-64.
//!
//! Evaluation is stack-oriented: every expression leaves its value (of its
//! resolved type's stack size) on top of the machine stack. The generator
//! tracks a symbolic stack size for the whole function; every instruction
//! that moves `rsp` also updates the counter, which is what makes the
//! 16-byte call alignment checks purely static.

use std::collections::HashMap;

use crate::{
    ast::{
        Argument, ArgumentKind, BinOp, Binding, BindingKind, Cmd, CmdKind, Expr, ExprKind, FnCmd,
        LValue, LValueKind, LoopBound, Stmt, StmtKind, StringLit, UnOp,
    },
    types::ResolvedType,
};

use super::{
    convention::{CallingConvention, ReturnLocation},
    show_type_string, Error, Module, Result,
};

/// The symbolic stack frame: the byte distance from `rbp` to `rsp`, plus the
/// `rbp`-relative home of every named value. Offsets are recorded relative
/// to the temporaries base so the frame's fixed prologue size can be folded
/// in on lookup; stack-passed arguments get negative offsets (they live
/// above the return address).
pub(crate) struct Frame {
    offsets: HashMap<String, i64>,
    size: u32,
    init_size: u32,
}

impl Frame {
    fn new(init_size: u32) -> Frame {
        Frame {
            offsets: HashMap::new(),
            size: init_size,
            init_size,
        }
    }

    fn size(&self) -> u32 {
        self.size
    }

    fn grow(&mut self, bytes: u32) {
        self.size += bytes;
    }

    fn shrink(&mut self, bytes: u32) {
        self.size -= bytes;
    }

    /// Bytes of locals on top of the fixed prologue.
    fn temporaries_size(&self) -> u32 {
        self.size - self.init_size
    }

    fn set(&mut self, name: &str, offset: i64) {
        self.offsets.insert(name.to_string(), offset);
    }

    fn has(&self, name: &str) -> bool {
        self.offsets.contains_key(name)
    }

    /// The distance below `rbp` of a name's lowest byte. Negative means
    /// above `rbp` (a stack-passed argument).
    fn offset(&self, name: &str) -> i64 {
        self.offsets[name] + i64::from(self.init_size)
    }

    /// Records an argument form at `offset`: a plain name, or an array name
    /// whose dimension sizes sit in the descriptor's length words.
    fn add_argument(&mut self, arg: &Argument, offset: i64) {
        match &arg.kind {
            ArgumentKind::Var(name) => self.set(name, offset),
            ArgumentKind::Array(name, dims) => {
                for (i, dim) in dims.iter().enumerate() {
                    self.set(dim, offset - 8 * i as i64);
                }
                self.set(name, offset);
            }
        }
    }

    fn add_lvalue(&mut self, lvalue: &LValue, ty: &ResolvedType, offset: i64) {
        match (&lvalue.kind, ty) {
            (LValueKind::Arg(arg), _) => self.add_argument(arg, offset),
            (LValueKind::Tuple(items), ResolvedType::Tuple(types)) => {
                let mut next = offset;
                for (item, ty) in items.iter().zip(types) {
                    self.add_lvalue(item, ty, next);
                    next -= i64::from(ty.stack_size());
                }
            }
            (LValueKind::Tuple(_), _) => {}
        }
    }

    fn add_binding(&mut self, binding: &Binding, ty: &ResolvedType, offset: i64) {
        match (&binding.kind, ty) {
            (BindingKind::Var(arg, _), _) => self.add_argument(arg, offset),
            (BindingKind::Tuple(items), ResolvedType::Tuple(types)) => {
                let mut next = offset;
                for (item, ty) in items.iter().zip(types) {
                    self.add_binding(item, ty, next);
                    next -= i64::from(ty.stack_size());
                }
            }
            (BindingKind::Tuple(_), _) => {}
        }
    }
}

/// Generates the body of one assembly function.
pub(crate) struct FunctionGen<'g> {
    name: String,
    is_main: bool,
    lines: Vec<String>,
    frame: Frame,
    /// The top-level frame, addressed through `r12`, for names a function
    /// body reads from the global scope. `None` in `jpl_main` itself.
    globals: Option<&'g Frame>,
}

impl<'g> FunctionGen<'g> {
    /// The `jpl_main` generator. Its prologue saves `r12` (hence the initial
    /// frame size of 8) and the runtime places `argnum`/`args` above the
    /// return address.
    pub(crate) fn main() -> FunctionGen<'static> {
        let mut frame = Frame::new(8);
        frame.set("argnum", -24);
        frame.set("args", -24);
        FunctionGen {
            name: "jpl_main".to_string(),
            is_main: true,
            lines: Vec::new(),
            frame,
            globals: None,
        }
    }

    fn function(name: &str, globals: &'g Frame) -> FunctionGen<'g> {
        FunctionGen {
            name: name.to_string(),
            is_main: false,
            lines: Vec::new(),
            frame: Frame::new(0),
            globals: Some(globals),
        }
    }

    fn emit(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    /// Renders the function: label pair, prologue, body lines (labels flush
    /// left, comments preceded by a blank line), and for `jpl_main` the
    /// trailing teardown.
    pub(crate) fn render(&self) -> String {
        let mut code = format!("{0}:\n_{0}:\n", self.name);
        code.push_str("; Function Stack Setup\n\tpush rbp\n\tmov rbp, rsp\n");
        if self.is_main {
            code.push_str("\n; Setting Up r12\n\tpush r12\n\tmov r12, rbp\n");
        }
        for line in &self.lines {
            let head = match line.as_bytes().first() {
                Some(b';') => "\n",
                Some(b'.') => "",
                _ => "\t",
            };
            code.push_str(head);
            code.push_str(line);
            code.push('\n');
        }
        if self.is_main {
            if self.frame.temporaries_size() != 0 {
                code.push_str(&format!(
                    "\n;Remove temporary variables\n\tadd rsp, {}\n",
                    self.frame.temporaries_size()
                ));
            }
            code.push_str("\n; Restore r12\n\tpop r12\n");
            code.push_str("\n; Function Return\n\tpop rbp\n\tret\n");
        }
        code
    }
}

/// Call-site alignment. The stack pointer must be 16-byte aligned right
/// before every `call`; an 8-byte pad is inserted whenever the symbolic size
/// plus the bytes about to be pushed says otherwise.
impl FunctionGen<'_> {
    fn align_for_call(&mut self, pending_bytes: u32) -> bool {
        let pad = (self.frame.size() + pending_bytes) % 16 != 0;
        if pad {
            self.emit("sub rsp, 8 ; align stack");
            self.frame.grow(8);
        }
        pad
    }

    fn end_align(&mut self, padded: bool) {
        if padded {
            self.emit("add rsp, 8 ; undo alignment");
            self.frame.shrink(8);
        }
    }

    fn call_fail_assertion(&mut self, m: &mut Module, message: &str) {
        let padded = self.align_for_call(0);
        let label = m.pool().string(message);
        self.emit(format!("lea rdi, [rel {label}] ; {message}"));
        self.emit("call _fail_assertion");
        self.end_align(padded);
    }
}

/// Commands.
impl<'g> FunctionGen<'g> {
    pub(crate) fn cg_cmd(&mut self, m: &mut Module, cmd: &Cmd) -> Result<()> {
        match &cmd.kind {
            CmdKind::Show(expr) => self.cg_show(m, cmd, expr),
            CmdKind::Let { lvalue, expr } => self.cg_let(m, cmd, lvalue, expr),
            CmdKind::Read { file, into } => self.cg_read(m, cmd, file, into),
            CmdKind::Fn(fun) => self.cg_fn(m, fun),
            CmdKind::Assert { expr, msg } => self.cg_assert(m, expr, msg),
            CmdKind::TypeAlias { .. } => Ok(()),
            CmdKind::Print(msg) => self.cg_print(m, msg),
            CmdKind::Write { expr, file } => self.cg_write(m, cmd, expr, file),
            CmdKind::Time(inner) => self.cg_time(m, inner),
        }
    }

    fn cg_show(&mut self, m: &mut Module, cmd: &Cmd, expr: &Expr) -> Result<()> {
        let value_size = resolved(expr)?.stack_size();
        let padded = self.align_for_call(value_size);
        self.cg_expr(m, expr)?;
        self.emit(format!("; {} | line: {}", cmd.text, cmd.loc.line));
        let type_string = show_type_string(resolved(expr)?);
        let label = m.pool().string(&type_string);
        self.emit(format!("lea rdi, [rel {label}] ; {type_string}"));
        self.emit("lea rsi, [rsp]");
        self.emit("call _show");
        self.emit(format!("add rsp, {value_size}"));
        self.frame.shrink(value_size);
        self.end_align(padded);
        Ok(())
    }

    fn cg_let(&mut self, m: &mut Module, cmd: &Cmd, lvalue: &LValue, expr: &Expr) -> Result<()> {
        self.cg_expr(m, expr)?;
        self.emit(format!("; {} | line: {}", cmd.text, cmd.loc.line));
        let offset = i64::from(self.frame.temporaries_size());
        self.frame.add_lvalue(lvalue, resolved(expr)?, offset);
        Ok(())
    }

    fn cg_read(
        &mut self,
        m: &mut Module,
        cmd: &Cmd,
        file: &StringLit,
        into: &Argument,
    ) -> Result<()> {
        let image_size = ResolvedType::image().stack_size();
        self.frame.grow(image_size);
        self.emit(format!("; {} | line: {}", cmd.text, cmd.loc.line));
        self.emit(format!("sub rsp, {image_size}"));
        self.emit("lea rdi, [rsp]");
        let padded = self.align_for_call(0);
        let label = m.pool().string(file.value());
        self.emit(format!("lea rsi, [rel {label}] ; {}", file.value()));
        self.emit("call _read_image");
        self.end_align(padded);
        let offset = i64::from(self.frame.temporaries_size());
        self.frame.add_argument(into, offset);
        Ok(())
    }

    fn cg_fn(&mut self, m: &mut Module, fun: &FnCmd) -> Result<()> {
        let sub = FunctionGen::function(&fun.name, &self.frame);
        let rendered = sub.generate(m, fun)?;
        m.functions.push(rendered);
        Ok(())
    }

    fn cg_assert(&mut self, m: &mut Module, expr: &Expr, msg: &StringLit) -> Result<()> {
        self.cg_expr(m, expr)?;
        self.emit("pop rax");
        self.frame.shrink(8);
        self.emit("cmp rax, 0 ; check assert");
        let ok = m.fresh_jump();
        self.emit(format!("jne {ok}"));
        self.call_fail_assertion(m, msg.value());
        self.emit(format!("{ok}:"));
        Ok(())
    }

    fn cg_print(&mut self, m: &mut Module, msg: &StringLit) -> Result<()> {
        let label = m.pool().string(msg.value());
        self.emit(format!("lea rdi, [rel {label}] ; {}", msg.value()));
        let padded = self.align_for_call(0);
        self.emit(format!("call _print ; print {}", msg.value()));
        self.end_align(padded);
        Ok(())
    }

    fn cg_write(
        &mut self,
        m: &mut Module,
        cmd: &Cmd,
        expr: &Expr,
        file: &StringLit,
    ) -> Result<()> {
        let image_size = ResolvedType::image().stack_size();
        let padded = self.align_for_call(image_size);
        self.cg_expr(m, expr)?;
        let label = m.pool().string(file.value());
        self.emit(format!("lea rdi, [rel {label}] ; {}", file.value()));
        self.emit(format!("call _write_image ; {}", cmd.text));
        self.emit(format!("add rsp, {image_size}"));
        self.frame.shrink(image_size);
        self.end_align(padded);
        Ok(())
    }

    fn cg_time(&mut self, m: &mut Module, inner: &Cmd) -> Result<()> {
        self.emit(format!("; Timing call to {}", inner.text));
        let padded = self.align_for_call(0);
        self.emit("call _get_time ; getting pre-op time");
        self.end_align(padded);
        self.emit("sub rsp, 8");
        self.frame.grow(8);
        self.emit("movsd [rsp], xmm0 ; collecting _get_time return");
        let start = self.frame.size();

        self.cg_cmd(m, inner)?;

        let padded = self.align_for_call(0);
        self.emit("call _get_time ; getting post-op time");
        self.end_align(padded);
        self.emit("sub rsp, 8");
        self.frame.grow(8);
        self.emit("movsd [rsp], xmm0 ; collecting _get_time return");

        self.emit("movsd xmm0, [rsp] ; end time");
        self.emit("add rsp, 8");
        self.frame.shrink(8);
        let end = self.frame.size();
        self.emit(format!("movsd xmm1, [rsp + {}] ; start time", end - start));
        self.emit("subsd xmm0, xmm1 ; op time = end - start");
        let padded = self.align_for_call(0);
        self.emit("call _print_time");
        self.end_align(padded);
        Ok(())
    }
}

/// Function bodies (non-main).
impl FunctionGen<'_> {
    /// Prologue (argument homing per the calling convention), statements,
    /// and a fallthrough epilogue when no return statement ended the body.
    fn generate(mut self, m: &mut Module, fun: &FnCmd) -> Result<String> {
        let cc = m.convention(&fun.name)?;

        if cc.returns_in_memory() {
            self.emit("push rdi ; $return");
            self.frame.grow(8);
            let offset = i64::from(self.frame.temporaries_size());
            self.frame.set("$return", offset);
        }

        // Stack arguments sit above the return address; the first starts 16
        // bytes above rbp and they grow upwards in pop order.
        let mut stack_arg_offset = -16i64;
        for slot in &cc.pop_order {
            let binding = &fun.params[slot.index];
            let ty = &cc.args[slot.index];
            if slot.location.is_int_register() {
                self.emit(format!("push {}", slot.location));
                self.frame.grow(8);
                let offset = i64::from(self.frame.temporaries_size());
                self.frame.add_binding(binding, ty, offset);
            } else if slot.location.is_float_register() {
                self.emit("sub rsp, 8");
                self.frame.grow(8);
                self.emit(format!("movsd [rsp], {}", slot.location));
                let offset = i64::from(self.frame.temporaries_size());
                self.frame.add_binding(binding, ty, offset);
            } else {
                self.frame.add_binding(binding, ty, stack_arg_offset);
                stack_arg_offset -= i64::from(ty.stack_size());
            }
        }

        let mut had_return = false;
        for stmt in &fun.body {
            had_return |= self.cg_stmt(m, stmt, &cc)?;
        }
        if !had_return {
            self.emit_return(&cc)?;
        }
        Ok(self.render())
    }

    /// Returns whether the statement was a `return`.
    fn cg_stmt(&mut self, m: &mut Module, stmt: &Stmt, cc: &CallingConvention) -> Result<bool> {
        match &stmt.kind {
            StmtKind::Let { lvalue, expr } => {
                self.cg_expr(m, expr)?;
                self.emit(format!("; {} | line: {}", stmt.text, stmt.loc.line));
                let offset = i64::from(self.frame.temporaries_size());
                self.frame.add_lvalue(lvalue, resolved(expr)?, offset);
                Ok(false)
            }
            StmtKind::Assert { expr, msg } => {
                self.cg_assert(m, expr, msg)?;
                Ok(false)
            }
            StmtKind::Return(expr) => {
                self.cg_expr(m, expr)?;
                self.emit_return(cc)?;
                Ok(true)
            }
        }
    }

    /// Moves the value on top of the stack into the return location, frees
    /// the temporaries and returns.
    fn emit_return(&mut self, cc: &CallingConvention) -> Result<()> {
        match cc.ret_location {
            ReturnLocation::Void => {}
            ReturnLocation::Rax => {
                self.emit("pop rax");
                self.frame.shrink(8);
            }
            ReturnLocation::Xmm0 => {
                self.emit("movsd xmm0, [rsp]");
                self.emit("add rsp, 8");
                self.frame.shrink(8);
            }
            ReturnLocation::Memory { size } => {
                let slot = self.frame.offset("$return");
                self.emit(format!(
                    "mov rax, {} ; Address to write return value into",
                    based("rbp", slot, 0)
                ));
                self.emit(format!("; Moving {size} bytes from rsp to rax"));
                self.move_qwords(size, "rsp", "rax");
            }
        }
        self.emit(";Remove temporary variables");
        self.emit(format!("add rsp, {}", self.frame.temporaries_size()));
        self.emit("; Function Return");
        self.emit("pop rbp");
        self.emit("ret");
        Ok(())
    }
}

/// Expressions. Each case pushes a value of the expression's resolved-type
/// size and leaves every deeper slot untouched.
impl FunctionGen<'_> {
    fn cg_expr(&mut self, m: &mut Module, expr: &Expr) -> Result<()> {
        match &expr.kind {
            ExprKind::Int(value) => {
                self.push_constant_int(m, *value, "");
                Ok(())
            }
            ExprKind::Float(value) => {
                let label = m.pool().float(*value);
                self.emit(format!("mov rax, [rel {label}] ; {value}"));
                self.emit("push rax");
                self.frame.grow(8);
                Ok(())
            }
            ExprKind::True => {
                self.push_constant_int(m, 1, "true");
                Ok(())
            }
            ExprKind::False => {
                self.push_constant_int(m, 0, "false");
                Ok(())
            }
            ExprKind::Var(name) => self.cg_var(m, expr, name),
            ExprKind::Unop(op, operand) => self.cg_unop(m, expr, *op, operand),
            ExprKind::Binop(lhs, op, rhs) => self.cg_binop(m, expr, lhs, *op, rhs),
            ExprKind::Tuple(items) => {
                // Last-to-first, so element 0 ends up at the lowest address.
                for item in items.iter().rev() {
                    self.cg_expr(m, item)?;
                }
                Ok(())
            }
            ExprKind::Array(items) => self.cg_array_literal(m, expr, items),
            ExprKind::TupleIndex(target, index) => self.cg_tuple_index(m, target, *index),
            ExprKind::ArrayIndex(target, indices) => {
                self.cg_array_index(m, expr, target, indices)
            }
            ExprKind::Call(name, args) => self.cg_call(m, name, args),
            ExprKind::If(cond, then, els) => self.cg_if(m, expr, cond, then, els),
            ExprKind::ArrayLoop(bounds, body) => self.cg_loop(m, expr, bounds, body, false),
            ExprKind::SumLoop(bounds, body) => self.cg_loop(m, expr, bounds, body, true),
        }
    }

    fn cg_var(&mut self, m: &mut Module, expr: &Expr, name: &str) -> Result<()> {
        if m.opt_level() >= 2 {
            if let Some(value) = expr.cp.as_int() {
                if under_32_bits(value) {
                    self.push_constant_int(m, value, &expr.text);
                    return Ok(());
                }
            }
        }
        let size = resolved(expr)?.stack_size();
        let (base, offset) = self.locate(name)?;
        self.emit(format!("sub rsp, {size}"));
        self.frame.grow(size);
        self.emit(format!(
            "; Moving {size} bytes from {base} - {offset} to rsp for temp {name}"
        ));
        for i in (0..size).step_by(8).rev() {
            self.emit(format!("mov r10, {}", based(base, offset, i)));
            self.emit(format!("mov [rsp + {i}], r10"));
        }
        Ok(())
    }

    /// A name's frame base and offset: locals via `rbp`, top-level names
    /// (from inside a function) via `r12`.
    fn locate(&self, name: &str) -> Result<(&'static str, i64)> {
        if self.frame.has(name) {
            return Ok(("rbp", self.frame.offset(name)));
        }
        match self.globals {
            Some(globals) if globals.has(name) => Ok(("r12", globals.offset(name))),
            _ => Err(Error::new(format!("No stack slot for variable {name}."))),
        }
    }

    fn cg_unop(&mut self, m: &mut Module, expr: &Expr, op: UnOp, operand: &Expr) -> Result<()> {
        self.cg_expr(m, operand)?;
        self.emit(format!("; {}", expr.text));
        match (op, resolved(operand)?) {
            (UnOp::Neg, ResolvedType::Int) => {
                self.emit("pop rax");
                self.frame.shrink(8);
                self.emit("neg rax");
                self.emit("push rax");
                self.frame.grow(8);
            }
            (UnOp::Neg, ResolvedType::Float) => {
                self.emit("movsd xmm1, [rsp]");
                self.emit("add rsp, 8");
                self.frame.shrink(8);
                self.emit("pxor xmm0, xmm0");
                self.emit("subsd xmm0, xmm1");
                self.emit("sub rsp, 8");
                self.frame.grow(8);
                self.emit("movsd [rsp], xmm0");
            }
            (UnOp::Not, ResolvedType::Bool) => {
                self.emit("pop rax");
                self.frame.shrink(8);
                self.emit("xor rax, 1");
                self.emit("push rax");
                self.frame.grow(8);
            }
            (op, ty) => {
                return Err(Error::new(format!(
                    "Unsupported type {ty} for unary {op} in {}.",
                    expr.text
                )))
            }
        }
        Ok(())
    }

    /// Evaluates both operands (right first, so the left ends up on top) and
    /// pops them into `rax`/`r10`.
    fn int_operands(&mut self, m: &mut Module, lhs: &Expr, rhs: &Expr, text: &str) -> Result<()> {
        self.cg_expr(m, rhs)?;
        self.cg_expr(m, lhs)?;
        self.emit(format!("; {text}"));
        self.emit("pop rax");
        self.frame.shrink(8);
        self.emit("pop r10");
        self.frame.shrink(8);
        Ok(())
    }

    /// Like [`Self::int_operands`] but into `xmm0`/`xmm1`.
    fn float_operands(&mut self, m: &mut Module, lhs: &Expr, rhs: &Expr, text: &str) -> Result<()> {
        self.cg_expr(m, rhs)?;
        self.cg_expr(m, lhs)?;
        self.emit(format!("; {text}"));
        self.emit("movsd xmm0, [rsp]");
        self.emit("add rsp, 8");
        self.frame.shrink(8);
        self.emit("movsd xmm1, [rsp]");
        self.emit("add rsp, 8");
        self.frame.shrink(8);
        Ok(())
    }

    fn push_rax(&mut self) {
        self.emit("push rax");
        self.frame.grow(8);
    }

    fn push_xmm0(&mut self) {
        self.emit("sub rsp, 8");
        self.frame.grow(8);
        self.emit("movsd [rsp], xmm0");
    }

    fn cg_binop(
        &mut self,
        m: &mut Module,
        expr: &Expr,
        lhs: &Expr,
        op: BinOp,
        rhs: &Expr,
    ) -> Result<()> {
        if matches!(op, BinOp::And | BinOp::Or) {
            return self.cg_short_circuit(m, expr, lhs, op, rhs);
        }

        let arithmetic = matches!(
            op,
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod
        );
        let operand_ty = if arithmetic {
            resolved(expr)?
        } else {
            resolved(lhs)?
        }
        .clone();

        match (op, &operand_ty) {
            (BinOp::Add, ResolvedType::Int) => {
                self.int_operands(m, lhs, rhs, &expr.text)?;
                self.emit("add rax, r10");
                self.push_rax();
            }
            (BinOp::Add, ResolvedType::Float) => {
                self.float_operands(m, lhs, rhs, &expr.text)?;
                self.emit("addsd xmm0, xmm1");
                self.push_xmm0();
            }
            (BinOp::Sub, ResolvedType::Int) => {
                self.int_operands(m, lhs, rhs, &expr.text)?;
                self.emit("sub rax, r10");
                self.push_rax();
            }
            (BinOp::Sub, ResolvedType::Float) => {
                self.float_operands(m, lhs, rhs, &expr.text)?;
                self.emit("subsd xmm0, xmm1");
                self.push_xmm0();
            }
            (BinOp::Mul, ResolvedType::Int) => {
                if m.opt_level() >= 1 && self.try_shift_multiply(m, expr, lhs, rhs)? {
                    return Ok(());
                }
                self.int_operands(m, lhs, rhs, &expr.text)?;
                self.emit("imul rax, r10");
                self.push_rax();
            }
            (BinOp::Mul, ResolvedType::Float) => {
                self.float_operands(m, lhs, rhs, &expr.text)?;
                self.emit("mulsd xmm0, xmm1");
                self.push_xmm0();
            }
            (BinOp::Div, ResolvedType::Int) => {
                if m.opt_level() >= 1 && self.known_int(m.opt_level(), rhs) == Some(1) {
                    // x / 1 is x.
                    return self.cg_expr(m, lhs);
                }
                self.int_operands(m, lhs, rhs, &expr.text)?;
                self.int_divide(m, "divide by zero")?;
                self.push_rax();
            }
            (BinOp::Div, ResolvedType::Float) => {
                self.float_operands(m, lhs, rhs, &expr.text)?;
                self.emit("divsd xmm0, xmm1");
                self.push_xmm0();
            }
            (BinOp::Mod, ResolvedType::Int) => {
                if m.opt_level() >= 1 && self.known_int(m.opt_level(), rhs) == Some(1) {
                    // x % 1 is 0; x is still evaluated for its checks.
                    self.cg_expr(m, lhs)?;
                    self.emit(format!("; {}", expr.text));
                    self.emit("pop rax");
                    self.frame.shrink(8);
                    self.emit("mov rax, 0");
                    self.push_rax();
                    return Ok(());
                }
                self.int_operands(m, lhs, rhs, &expr.text)?;
                self.int_divide(m, "mod by zero")?;
                self.emit("mov rax, rdx");
                self.push_rax();
            }
            (BinOp::Mod, ResolvedType::Float) => {
                self.float_operands(m, lhs, rhs, &expr.text)?;
                self.emit("call _fmod");
                self.push_xmm0();
            }
            (BinOp::Lt, ResolvedType::Int) => {
                self.int_compare(m, lhs, rhs, &expr.text, "setl")?;
            }
            (BinOp::Gt, ResolvedType::Int) => {
                self.int_compare(m, lhs, rhs, &expr.text, "setg")?;
            }
            (BinOp::Le, ResolvedType::Int) => {
                self.int_compare(m, lhs, rhs, &expr.text, "setle")?;
            }
            (BinOp::Ge, ResolvedType::Int) => {
                self.int_compare(m, lhs, rhs, &expr.text, "setge")?;
            }
            (BinOp::Eq, ResolvedType::Int | ResolvedType::Bool) => {
                self.int_compare(m, lhs, rhs, &expr.text, "sete")?;
            }
            (BinOp::Ne, ResolvedType::Int | ResolvedType::Bool) => {
                self.int_compare(m, lhs, rhs, &expr.text, "setne")?;
            }
            (BinOp::Lt, ResolvedType::Float) => {
                self.float_compare(m, lhs, rhs, &expr.text, "cmpltsd", false)?;
            }
            (BinOp::Gt, ResolvedType::Float) => {
                self.float_compare(m, lhs, rhs, &expr.text, "cmpltsd", true)?;
            }
            (BinOp::Le, ResolvedType::Float) => {
                self.float_compare(m, lhs, rhs, &expr.text, "cmplesd", false)?;
            }
            (BinOp::Ge, ResolvedType::Float) => {
                self.float_compare(m, lhs, rhs, &expr.text, "cmplesd", true)?;
            }
            (BinOp::Eq, ResolvedType::Float) => {
                self.float_compare(m, lhs, rhs, &expr.text, "cmpeqsd", false)?;
            }
            (BinOp::Ne, ResolvedType::Float) => {
                self.float_compare(m, lhs, rhs, &expr.text, "cmpneqsd", false)?;
            }
            (op, ty) => {
                return Err(Error::new(format!(
                    "Unsupported type {ty} for {op} in {}.",
                    expr.text
                )))
            }
        }
        Ok(())
    }

    /// `cqo` + `idiv r10` with a divisor-zero guard. Quotient lands in
    /// `rax`, remainder in `rdx`.
    fn int_divide(&mut self, m: &mut Module, message: &str) -> Result<()> {
        self.emit(format!("cmp r10, 0 ; check for {message}"));
        let ok = m.fresh_jump();
        self.emit(format!("jne {ok}"));
        self.call_fail_assertion(m, message);
        self.emit(format!("{ok}:"));
        self.emit("cqo");
        self.emit("idiv r10");
        Ok(())
    }

    fn int_compare(
        &mut self,
        m: &mut Module,
        lhs: &Expr,
        rhs: &Expr,
        text: &str,
        set: &str,
    ) -> Result<()> {
        self.int_operands(m, lhs, rhs, text)?;
        self.emit("cmp rax, r10");
        self.emit(format!("{set} al"));
        self.emit("and rax, 1");
        self.push_rax();
        Ok(())
    }

    /// SSE compares write an all-ones/all-zeros mask; the low bit is the
    /// boolean. `swapped` runs the compare with the operands exchanged,
    /// which is how `>` and `>=` are derived from `cmpltsd`/`cmplesd`.
    fn float_compare(
        &mut self,
        m: &mut Module,
        lhs: &Expr,
        rhs: &Expr,
        text: &str,
        cmp: &str,
        swapped: bool,
    ) -> Result<()> {
        self.float_operands(m, lhs, rhs, text)?;
        let result = if swapped {
            self.emit(format!("{cmp} xmm1, xmm0"));
            "xmm1"
        } else {
            self.emit(format!("{cmp} xmm0, xmm1"));
            "xmm0"
        };
        self.emit(format!("movq rax, {result}"));
        self.emit("and rax, 1");
        self.push_rax();
        Ok(())
    }

    /// Power-of-two multiplies become shifts; a multiply by one disappears.
    /// Returns whether the multiply was fully lowered.
    fn try_shift_multiply(
        &mut self,
        m: &mut Module,
        expr: &Expr,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<bool> {
        let opt = m.opt_level();
        let known = |e: &Expr| self.known_int(opt, e).filter(|&v| power_of_two(v).is_some());
        let (amount, other) = if let Some(value) = known(lhs) {
            (value, rhs)
        } else if let Some(value) = known(rhs) {
            (value, lhs)
        } else {
            return Ok(false);
        };
        self.cg_expr(m, other)?;
        let power = power_of_two(amount).expect("filtered to powers of two");
        if power != 0 {
            self.emit(format!("; {}", expr.text));
            self.emit("pop rax");
            self.frame.shrink(8);
            self.emit(format!("shl rax, {power}"));
            self.push_rax();
        }
        Ok(true)
    }

    /// The integer an expression is statically known to evaluate to, under
    /// the current optimization level: literals at `-O1`, constant
    /// propagation results at `-O2`.
    fn known_int(&self, opt_level: u8, expr: &Expr) -> Option<i64> {
        match opt_level {
            0 => None,
            1 => match expr.kind {
                ExprKind::Int(value) => Some(value),
                _ => None,
            },
            _ => expr.cp.as_int(),
        }
    }

    /// `&&`/`||`: the right side only runs when the left has not already
    /// decided the result.
    fn cg_short_circuit(
        &mut self,
        m: &mut Module,
        expr: &Expr,
        lhs: &Expr,
        op: BinOp,
        rhs: &Expr,
    ) -> Result<()> {
        self.emit(format!("; {}", expr.text));
        let jump = match op {
            BinOp::And => "je",
            BinOp::Or => "jne",
            _ => return Err(Error::new(format!("{op} is not a short-circuit operator."))),
        };
        self.cg_expr(m, lhs)?;
        self.emit("pop rax");
        self.frame.shrink(8);
        self.emit("cmp rax, 0");
        let skip = m.fresh_jump();
        self.emit(format!("{jump} {skip}"));
        self.cg_expr(m, rhs)?;
        self.emit("pop rax");
        self.frame.shrink(8);
        self.emit(format!("{skip}:"));
        self.push_rax();
        Ok(())
    }

    fn cg_array_literal(&mut self, m: &mut Module, expr: &Expr, items: &[Expr]) -> Result<()> {
        let ResolvedType::Array(element, _) = resolved(expr)? else {
            return Err(Error::new(format!(
                "Array literal {} without an array type.",
                expr.text
            )));
        };
        let element_size = element.stack_size();
        let heap_size = element_size
            .checked_mul(items.len() as u32)
            .ok_or_else(|| Error::new("Array literal was too big to store."))?;

        for item in items.iter().rev() {
            self.cg_expr(m, item)?;
        }

        self.emit(format!("mov rdi, {heap_size}"));
        let padded = self.align_for_call(0);
        self.emit("call _jpl_alloc");
        self.end_align(padded);

        self.emit(format!("; moving {heap_size} bytes from rsp to rax onto the heap"));
        for i in (0..heap_size / 8).rev() {
            let offset = i * 8;
            self.emit(format!("mov r10, [rsp + {offset}]"));
            self.emit(format!("mov [rax + {offset}], r10"));
        }

        self.emit(format!("add rsp, {heap_size}"));
        self.frame.shrink(heap_size);
        self.push_rax();
        self.emit(format!("mov rax, {}", items.len()));
        self.push_rax();
        Ok(())
    }

    /// Slides the selected element down to the base of the tuple's stack
    /// region and releases the rest.
    fn cg_tuple_index(&mut self, m: &mut Module, target: &Expr, index: i64) -> Result<()> {
        self.cg_expr(m, target)?;
        let ResolvedType::Tuple(items) = resolved(target)? else {
            return Err(Error::new(format!(
                "Tuple index into non-tuple {}.",
                target.text
            )));
        };
        let index = index as usize;
        let total: u32 = items.iter().map(ResolvedType::stack_size).sum();
        let element_size = items[index].stack_size();
        let element_offset: u32 = items[..index].iter().map(ResolvedType::stack_size).sum();
        let removed = total - element_size;

        self.emit(format!(
            "; moving {element_size} bytes from rsp + {element_offset} to rsp + {removed}"
        ));
        for i in (0..element_size / 8).rev() {
            self.emit(format!("mov r10, {}", rsp_off(element_offset + i * 8)));
            self.emit(format!("mov {}, r10", rsp_off(removed + i * 8)));
        }
        self.emit(format!("add rsp, {removed}"));
        self.frame.shrink(removed);
        Ok(())
    }

    fn cg_array_index(
        &mut self,
        m: &mut Module,
        expr: &Expr,
        target: &Expr,
        indices: &[Expr],
    ) -> Result<()> {
        // For a named array already on the stack, its descriptor can be
        // addressed in place instead of copied.
        let reused_var = if m.opt_level() >= 1 {
            match &target.kind {
                ExprKind::Var(name) if self.frame.has(name) => Some(name.as_str()),
                _ => None,
            }
        } else {
            None
        };
        if reused_var.is_none() {
            self.cg_expr(m, target)?;
        }

        for index in indices.iter().rev() {
            self.cg_expr(m, index)?;
        }

        let indices_size = 8 * indices.len() as u32;
        // Distance from rsp to the array descriptor's length words.
        let gap = match reused_var {
            Some(name) => i64::from(self.frame.size()) - self.frame.offset(name),
            None => i64::from(indices_size),
        };

        for i in 0..indices.len() as u32 {
            let neg_ok = m.fresh_jump();
            let big_ok = m.fresh_jump();
            self.emit(format!("mov rax, {}", rsp_off(i * 8)));
            self.emit("cmp rax, 0");
            self.emit(format!("jge {neg_ok}"));
            self.call_fail_assertion(m, "negative array index");
            self.emit(format!("{neg_ok}:"));
            self.emit(format!("cmp rax, [rsp + {}]", i64::from(i * 8) + gap));
            self.emit(format!("jl {big_ok}"));
            self.call_fail_assertion(m, "index too large");
            self.emit(format!("{big_ok}:"));
        }

        // Row-major linearization. At -O1 the first index seeds the
        // accumulator directly; at -O2 known lengths become immediates.
        let lengths = match &target.cp {
            crate::const_prop::CpValue::Array(lengths) if m.opt_level() >= 2 => Some(lengths),
            _ => None,
        };
        if m.opt_level() < 1 {
            self.emit("mov rax, 0");
            for i in 0..indices.len() as u32 {
                self.emit(format!("imul rax, [rsp + {}]", i64::from(i * 8) + gap));
                self.emit(format!("add rax, {}", rsp_off(i * 8)));
            }
        } else {
            self.emit("mov rax, [rsp]");
            for i in 1..indices.len() as u32 {
                let known = lengths
                    .and_then(|lengths| lengths.get(i as usize))
                    .and_then(|length| length.as_int());
                match known {
                    Some(length) if power_of_two(length).is_some() => {
                        self.emit(format!("shl rax, {}", power_of_two(length).unwrap()));
                    }
                    Some(length) if under_32_bits(length) => {
                        self.emit(format!("imul rax, {length}"));
                    }
                    _ => {
                        self.emit(format!("imul rax, [rsp + {}]", i64::from(i * 8) + gap));
                    }
                }
                self.emit(format!("add rax, {}", rsp_off(i * 8)));
            }
        }

        let element_size = resolved(expr)?.stack_size();
        match power_of_two(i64::from(element_size)) {
            Some(power) if m.opt_level() >= 1 => {
                self.emit(format!("shl rax, {power} ; multiply by size of elements"));
            }
            _ => {
                self.emit(format!(
                    "imul rax, {element_size} ; multiply by size of elements"
                ));
            }
        }
        self.emit(format!(
            "add rax, [rsp + {}] ; add ptr for address in heap",
            i64::from(indices_size) + gap
        ));

        if reused_var.is_none() {
            for _ in 0..indices.len() {
                self.emit("add rsp, 8");
                self.frame.shrink(8);
            }
            let array_size = resolved(target)?.stack_size();
            self.emit(format!("add rsp, {array_size}"));
            self.frame.shrink(array_size);
        } else {
            self.emit(format!("add rsp, {indices_size}"));
            self.frame.shrink(indices_size);
        }

        self.emit(format!("sub rsp, {element_size}"));
        self.frame.grow(element_size);
        self.emit(format!(
            "; Extracting array element of {element_size} bytes from rax to rsp"
        ));
        self.move_qwords(element_size, "rax", "rsp");
        Ok(())
    }

    fn cg_call(&mut self, m: &mut Module, name: &str, args: &[Expr]) -> Result<()> {
        let cc = m.convention(name)?;

        if let ReturnLocation::Memory { size } = cc.ret_location {
            self.emit(format!("sub rsp, {size} ; Allocating space for return"));
            self.frame.grow(size);
        }

        let padded = self.align_for_call(cc.stack_argument_size);

        for slot in cc.pop_order.iter().rev() {
            self.cg_expr(m, &args[slot.index])?;
        }
        for slot in &cc.pop_order {
            if slot.location.is_int_register() {
                self.emit(format!("pop {}", slot.location));
                self.frame.shrink(8);
            } else if slot.location.is_float_register() {
                self.emit(format!("movsd {}, [rsp]", slot.location));
                self.emit("add rsp, 8");
                self.frame.shrink(8);
            } else {
                break;
            }
        }

        if cc.returns_in_memory() {
            let distance = cc.stack_argument_size + if padded { 8 } else { 0 };
            self.emit(format!(
                "lea rdi, [rsp + {distance}] ; putting return into rdi"
            ));
        }

        self.emit(format!("call _{name}"));

        for slot in &cc.pop_order {
            if slot.location == super::Location::Stack {
                let bytes = cc.args[slot.index].stack_size();
                self.emit(format!("add rsp, {bytes}"));
                self.frame.shrink(bytes);
            }
        }

        self.end_align(padded);

        match cc.ret_location {
            ReturnLocation::Rax => self.push_rax(),
            ReturnLocation::Xmm0 => self.push_xmm0(),
            ReturnLocation::Void | ReturnLocation::Memory { .. } => {}
        }
        Ok(())
    }

    fn cg_if(
        &mut self,
        m: &mut Module,
        expr: &Expr,
        cond: &Expr,
        then: &Expr,
        els: &Expr,
    ) -> Result<()> {
        self.cg_expr(m, cond)?;

        // `if c then 1 else 0` is the condition itself.
        if m.opt_level() >= 1
            && self.known_int(m.opt_level(), then) == Some(1)
            && self.known_int(m.opt_level(), els) == Some(0)
        {
            return Ok(());
        }

        self.emit("pop rax");
        self.frame.shrink(8);
        self.emit(format!("cmp rax, 0 ; {}", expr.text));
        let else_jump = m.fresh_jump();
        let end_jump = m.fresh_jump();
        self.emit(format!("je {else_jump}"));
        self.cg_expr(m, then)?;
        self.emit(format!("jmp {end_jump}"));
        // Only one branch actually pushes at runtime.
        self.frame.shrink(resolved(expr)?.stack_size());
        self.emit(format!("{else_jump}:"));
        self.cg_expr(m, els)?;
        self.emit(format!("{end_jump}:"));
        Ok(())
    }

    /// The shared array/sum comprehension lowering: result slot, bounds
    /// (right to left, each positivity-checked), zeroed indices, body,
    /// accumulate-or-store, ripple-carry increment. The bounds remain on the
    /// stack for an array loop — together with the pointer slot they *are*
    /// the resulting descriptor.
    fn cg_loop(
        &mut self,
        m: &mut Module,
        expr: &Expr,
        bounds: &[LoopBound],
        body: &Expr,
        is_sum: bool,
    ) -> Result<()> {
        if is_sum {
            self.emit("sub rsp, 8 ; 8 bytes for sum");
        } else {
            self.emit("sub rsp, 8 ; 8 bytes for array ptr");
        }
        self.frame.grow(8);

        for bound in bounds.iter().rev() {
            self.emit(format!("; Adding {} bound to stack", bound.var));
            self.cg_expr(m, &bound.bound)?;
            let ok = m.fresh_jump();
            self.emit("mov rax, [rsp]");
            self.emit("cmp rax, 0");
            self.emit(format!("jg {ok}"));
            self.call_fail_assertion(m, "non-positive loop bound");
            self.emit(format!("{ok}:"));
        }

        let indices_size = 8 * bounds.len() as u32;
        let element_size = resolved(body)?.stack_size();

        if is_sum {
            self.emit("mov rax, 0");
            self.emit(format!("mov [rsp + {indices_size}], rax ; initialize sum"));
        } else {
            self.emit("; Computing total size of heap memory to allocate");
            self.emit(format!("mov rdi, {element_size} ; sizeof array element"));
            for (i, bound) in bounds.iter().enumerate() {
                let ok = m.fresh_jump();
                self.emit(format!(
                    "imul rdi, {} ; multiply by {}",
                    rsp_off(i as u32 * 8),
                    bound.bound.text
                ));
                self.emit(format!(
                    "jno {ok} ; check that {}'s bound doesn't overflow",
                    bound.var
                ));
                self.call_fail_assertion(m, "overflow computing array size");
                self.emit(format!("{ok}:"));
            }
            let padded = self.align_for_call(0);
            self.emit("call _jpl_alloc ; allocate array");
            self.end_align(padded);
            self.emit(format!(
                "mov [rsp + {indices_size}], rax ; Move array pointer to stack"
            ));
        }

        for bound in bounds.iter().rev() {
            self.emit("mov rax, 0");
            self.emit(format!("push rax ; adding {} to stack", bound.var));
            self.frame.grow(8);
            let offset = i64::from(self.frame.temporaries_size());
            self.frame.set(&bound.var, offset);
        }

        let body_jump = m.fresh_jump();
        self.emit(format!("{body_jump}: ; loop body"));
        self.cg_expr(m, body)?;

        if is_sum {
            if *resolved(expr)? == ResolvedType::Int {
                self.emit("pop rax");
                self.frame.shrink(8);
                self.emit(format!(
                    "add [rsp + {}], rax ; Add loop body to sum",
                    indices_size * 2
                ));
            } else {
                self.emit("movsd xmm0, [rsp]");
                self.emit("add rsp, 8");
                self.frame.shrink(8);
                self.emit(format!(
                    "addsd xmm0, [rsp + {}] ; Load sum",
                    indices_size * 2
                ));
                self.emit(format!(
                    "movsd [rsp + {}], xmm0 ; Save sum",
                    indices_size * 2
                ));
            }
        } else {
            // The element is still on the stack; the indices and bounds sit
            // `element_size` deeper while the address is computed.
            if m.opt_level() < 1 {
                self.emit("mov rax, 0");
                for i in 0..bounds.len() as u32 {
                    self.emit(format!(
                        "imul rax, [rsp + {}]",
                        element_size + i * 8 + indices_size
                    ));
                    self.emit(format!("add rax, [rsp + {}]", element_size + i * 8));
                }
            } else {
                self.emit(format!("mov rax, [rsp + {element_size}]"));
                for (i, bound) in bounds.iter().enumerate().skip(1) {
                    let i = i as u32;
                    match self.known_int(m.opt_level(), &bound.bound) {
                        Some(value) if power_of_two(value).is_some() => {
                            self.emit(format!("shl rax, {}", power_of_two(value).unwrap()));
                        }
                        Some(value) if under_32_bits(value) => {
                            self.emit(format!("imul rax, {value}"));
                        }
                        _ => {
                            self.emit(format!(
                                "imul rax, [rsp + {}]",
                                element_size + i * 8 + indices_size
                            ));
                        }
                    }
                    self.emit(format!("add rax, [rsp + {}]", element_size + i * 8));
                }
            }
            match power_of_two(i64::from(element_size)) {
                Some(power) if m.opt_level() >= 1 => {
                    self.emit(format!("shl rax, {power} ; multiply by size of elements"));
                }
                _ => {
                    self.emit(format!(
                        "imul rax, {element_size} ; multiply by size of elements"
                    ));
                }
            }
            self.emit(format!(
                "add rax, [rsp + {}] ; add ptr for address in heap",
                element_size + indices_size * 2
            ));
            self.emit("; Moving newly created element into array");
            self.move_qwords(element_size, "rsp", "rax");
            self.emit(format!("add rsp, {element_size}"));
            self.frame.shrink(element_size);
        }

        for (i, bound) in bounds.iter().enumerate().rev() {
            let i = i as u32;
            self.emit(format!("; Increment {}", bound.var));
            self.emit(format!("add qword {}, 1", rsp_off(i * 8)));
            self.emit(format!("mov rax, {}", rsp_off(i * 8)));
            self.emit(format!("cmp rax, [rsp + {}]", i * 8 + indices_size));
            self.emit(format!(
                "jl {body_jump} ; If {} < bound, next iter",
                bound.var
            ));
            if i != 0 {
                self.emit(format!("mov qword {}, 0 ; {} = 0", rsp_off(i * 8), bound.var));
            }
        }

        self.emit("; end loop body");
        self.emit(format!("add rsp, {indices_size} ; free loop indices"));
        self.frame.shrink(indices_size);
        if is_sum {
            self.emit(format!("add rsp, {indices_size} ; free loop bounds"));
            self.frame.shrink(indices_size);
        }
        Ok(())
    }

    /// Pushes an integer literal: a direct `push qword` when it fits in 32
    /// bits at `-O1`+, otherwise through the constant pool.
    fn push_constant_int(&mut self, m: &mut Module, value: i64, note: &str) {
        if m.opt_level() >= 1 && under_32_bits(value) {
            self.emit(format!("push qword {value} ; {note}"));
        } else {
            let label = m.pool().int(value);
            self.emit(format!("mov rax, [rel {label}] ; {value} {note}"));
            self.emit("push rax");
        }
        self.frame.grow(8);
    }

    /// Copies `bytes` one qword at a time through `r10`, highest first.
    fn move_qwords(&mut self, bytes: u32, from: &str, to: &str) {
        for i in (0..bytes).step_by(8).rev() {
            self.emit(format!("mov r10, [{from} + {i}]"));
            self.emit(format!("mov [{to} + {i}], r10"));
        }
    }
}

/// `[base + (add - offset)]` with the sign folded into the syntax.
fn based(base: &str, offset: i64, add: u32) -> String {
    let disp = i64::from(add) - offset;
    if disp >= 0 {
        format!("[{base} + {disp}]")
    } else {
        format!("[{base} - {}]", -disp)
    }
}

fn rsp_off(offset: u32) -> String {
    if offset == 0 {
        "[rsp]".to_string()
    } else {
        format!("[rsp + {offset}]")
    }
}

fn under_32_bits(value: i64) -> bool {
    value & ((1i64 << 31) - 1) == value
}

/// `Some(log2)` for strictly positive powers of two.
fn power_of_two(value: i64) -> Option<u32> {
    (value > 0 && value & (value - 1) == 0).then(|| value.trailing_zeros())
}

fn resolved(expr: &Expr) -> Result<&ResolvedType> {
    expr.ty
        .as_ref()
        .ok_or_else(|| Error::new(format!("Expression {} has no resolved type.", expr.text)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn frame_offsets_fold_in_the_prologue_size() {
        let mut frame = Frame::new(8);
        frame.set("argnum", -24);
        assert_eq!(frame.offset("argnum"), -16);
        frame.grow(8);
        frame.set("x", i64::from(frame.temporaries_size()));
        assert_eq!(frame.offset("x"), 16);
        assert_eq!(frame.temporaries_size(), 8);
    }

    #[test]
    fn frame_array_argument_homes_dimensions_in_the_descriptor() {
        use crate::token::Loc;
        let mut frame = Frame::new(0);
        let arg = Argument {
            kind: ArgumentKind::Array("a".into(), vec!["w".into(), "h".into()]),
            loc: Loc::default(),
            text: "a[w, h]".into(),
        };
        frame.grow(24);
        frame.add_argument(&arg, 24);
        // The descriptor is [len_2][len_1][ptr] from rbp-24 up; w (the first
        // dimension) is the lowest length word.
        assert_eq!(frame.offset("a"), 24);
        assert_eq!(frame.offset("w"), 24);
        assert_eq!(frame.offset("h"), 16);
    }

    #[test]
    fn based_addressing_folds_signs() {
        assert_eq!(based("rbp", 16, 0), "[rbp - 16]");
        assert_eq!(based("rbp", 16, 8), "[rbp - 8]");
        assert_eq!(based("rbp", -16, 0), "[rbp + 16]");
        assert_eq!(based("rbp", -16, 8), "[rbp + 24]");
    }

    #[test]
    fn power_of_two_detection() {
        assert_eq!(power_of_two(1), Some(0));
        assert_eq!(power_of_two(8), Some(3));
        assert_eq!(power_of_two(0), None);
        assert_eq!(power_of_two(-8), None);
        assert_eq!(power_of_two(24), None);
    }

    #[test]
    fn under_32_bits_rejects_negatives() {
        assert!(under_32_bits(0));
        assert!(under_32_bits(2147483647));
        assert!(!under_32_bits(2147483648));
        assert!(!under_32_bits(-1));
    }
}
