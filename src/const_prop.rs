//! Constant propagation, run only at optimization level 2 and above.
//!
//! A single environment-based pass over the tree that attaches a [`CpValue`]
//! to every expression node. The values are lowering hints for the code
//! generator (immediate pushes, shift strengths, known array lengths); they
//! are never required for correctness and nothing is rewritten.

use std::collections::HashMap;

use crate::ast::{
    ArgumentKind, Cmd, CmdKind, Expr, ExprKind, LValue, LValueKind, Program, Stmt, StmtKind,
};

/// What is statically known about an expression's value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum CpValue {
    #[default]
    None,
    /// The expression always evaluates to this integer.
    Int(i64),
    /// The expression is an array whose per-dimension lengths are known to
    /// this extent. The element values are never tracked.
    Array(Vec<CpValue>),
}

impl CpValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            CpValue::Int(value) => Some(*value),
            _ => None,
        }
    }
}

/// Annotates every expression of the program with its [`CpValue`].
pub fn propagate(program: &mut Program) {
    let mut env = HashMap::new();
    env.insert("argnum".to_string(), CpValue::None);
    env.insert("args".to_string(), CpValue::Array(vec![CpValue::None]));
    let mut pass = Propagator { env };
    for cmd in program.iter_mut() {
        pass.visit_cmd(cmd);
    }
}

struct Propagator {
    env: HashMap<String, CpValue>,
}

impl Propagator {
    fn visit_cmd(&mut self, cmd: &mut Cmd) {
        match &mut cmd.kind {
            CmdKind::Read { into, .. } => {
                // Rank is known (images are 2-D), lengths are not.
                let name = match &into.kind {
                    ArgumentKind::Var(name) => name,
                    ArgumentKind::Array(name, _) => name,
                };
                self.env.insert(
                    name.clone(),
                    CpValue::Array(vec![CpValue::None, CpValue::None]),
                );
            }
            CmdKind::Write { expr, .. } => self.visit_expr(expr),
            CmdKind::TypeAlias { .. } | CmdKind::Print(_) => {}
            CmdKind::Let { lvalue, expr } => {
                self.visit_expr(expr);
                let cp = expr.cp.clone();
                self.bind_lvalue(lvalue, cp);
            }
            CmdKind::Assert { expr, .. } => self.visit_expr(expr),
            CmdKind::Show(expr) => self.visit_expr(expr),
            CmdKind::Time(inner) => self.visit_cmd(inner),
            CmdKind::Fn(fun) => {
                for stmt in &mut fun.body {
                    self.visit_stmt(stmt);
                }
            }
        }
    }

    fn visit_stmt(&mut self, stmt: &mut Stmt) {
        match &mut stmt.kind {
            StmtKind::Let { lvalue, expr } => {
                self.visit_expr(expr);
                let cp = expr.cp.clone();
                self.bind_lvalue(lvalue, cp);
            }
            StmtKind::Assert { expr, .. } => self.visit_expr(expr),
            StmtKind::Return(expr) => self.visit_expr(expr),
        }
    }

    /// Propagates the right-hand side's value to the simple names a `let`
    /// introduces. For an array argument bound to a known-length array, each
    /// dimension name picks up the corresponding length.
    fn bind_lvalue(&mut self, lvalue: &LValue, cp: CpValue) {
        let LValueKind::Arg(arg) = &lvalue.kind else {
            return;
        };
        match &arg.kind {
            ArgumentKind::Var(name) => {
                self.env.insert(name.clone(), cp);
            }
            ArgumentKind::Array(name, dims) => {
                if let CpValue::Array(lengths) = &cp {
                    for (dim, length) in dims.iter().zip(lengths) {
                        self.env.insert(dim.clone(), length.clone());
                    }
                }
                self.env.insert(name.clone(), cp);
            }
        }
    }

    fn visit_expr(&mut self, expr: &mut Expr) {
        let cp = match &mut expr.kind {
            ExprKind::Int(value) => CpValue::Int(*value),
            ExprKind::Float(_) | ExprKind::True | ExprKind::False => CpValue::None,
            ExprKind::Var(name) => self.env.get(name).cloned().unwrap_or_default(),
            ExprKind::Tuple(items) => {
                for item in items {
                    self.visit_expr(item);
                }
                CpValue::None
            }
            ExprKind::Array(items) => {
                for item in items.iter_mut() {
                    self.visit_expr(item);
                }
                CpValue::Array(vec![CpValue::Int(items.len() as i64)])
            }
            ExprKind::TupleIndex(target, _) => {
                self.visit_expr(target);
                CpValue::None
            }
            ExprKind::ArrayIndex(target, indices) => {
                self.visit_expr(target);
                for index in indices {
                    self.visit_expr(index);
                }
                CpValue::None
            }
            ExprKind::Call(_, args) => {
                for arg in args {
                    self.visit_expr(arg);
                }
                CpValue::None
            }
            ExprKind::Unop(_, operand) => {
                self.visit_expr(operand);
                CpValue::None
            }
            ExprKind::Binop(lhs, _, rhs) => {
                self.visit_expr(lhs);
                self.visit_expr(rhs);
                CpValue::None
            }
            ExprKind::If(cond, then, els) => {
                self.visit_expr(cond);
                self.visit_expr(then);
                self.visit_expr(els);
                CpValue::None
            }
            ExprKind::ArrayLoop(bounds, body) => {
                let mut lengths = Vec::with_capacity(bounds.len());
                for bound in bounds.iter_mut() {
                    self.visit_expr(&mut bound.bound);
                    lengths.push(bound.bound.cp.clone());
                }
                self.visit_expr(body);
                CpValue::Array(lengths)
            }
            ExprKind::SumLoop(bounds, body) => {
                for bound in bounds.iter_mut() {
                    self.visit_expr(&mut bound.bound);
                }
                self.visit_expr(body);
                CpValue::None
            }
        };
        expr.cp = cp;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lexer::lex_all, parser::parse_program, type_checker::typecheck};
    use pretty_assertions::assert_eq;

    fn annotated(src: &str) -> Program {
        let tokens = lex_all(src).unwrap();
        let mut program = parse_program(&tokens).unwrap();
        typecheck(&mut program).unwrap();
        propagate(&mut program);
        program
    }

    fn shown_cp(cmd: &Cmd) -> &CpValue {
        match &cmd.kind {
            CmdKind::Show(expr) => &expr.cp,
            _ => panic!("expected a show command"),
        }
    }

    #[test]
    fn int_literals_and_variables() {
        let program = annotated("let x = 3\nshow x\n");
        assert_eq!(shown_cp(&program[1]), &CpValue::Int(3));
    }

    #[test]
    fn array_literal_length_flows_to_dimension_name() {
        let program = annotated("let a[n] = [1, 2, 3]\nshow n\nshow a\n");
        assert_eq!(shown_cp(&program[1]), &CpValue::Int(3));
        assert_eq!(
            shown_cp(&program[2]),
            &CpValue::Array(vec![CpValue::Int(3)])
        );
    }

    #[test]
    fn array_loop_bounds_become_lengths() {
        let program = annotated("let m = array[i: 4, j: 8] i + j\nshow m\n");
        assert_eq!(
            shown_cp(&program[1]),
            &CpValue::Array(vec![CpValue::Int(4), CpValue::Int(8)])
        );
    }

    #[test]
    fn read_has_known_rank_but_unknown_lengths() {
        let program = annotated("read image \"f.png\" to img\nshow img\n");
        assert_eq!(
            shown_cp(&program[1]),
            &CpValue::Array(vec![CpValue::None, CpValue::None])
        );
    }

    #[test]
    fn computed_values_are_not_tracked() {
        let program = annotated("let x = 1 + 2\nshow x\n");
        assert_eq!(shown_cp(&program[1]), &CpValue::None);
        let program = annotated("show sum[i: 2] i\n");
        assert_eq!(shown_cp(&program[0]), &CpValue::None);
    }

    #[test]
    fn prelude_args_rank_is_known() {
        let program = annotated("show args\n");
        assert_eq!(shown_cp(&program[0]), &CpValue::Array(vec![CpValue::None]));
    }
}
