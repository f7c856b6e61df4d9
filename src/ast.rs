//! The source-syntax tree.
//!
//! A program is a list of top-level [`Cmd`]s. Every node records its source
//! location and the raw text span it was parsed from, which diagnostics quote
//! verbatim. Expressions additionally carry two annotation slots written by
//! later passes: the resolved type (type checker) and the constant-propagation
//! value (optimizer, at `-O2`).
//!
//! `Display` produces the canonical S-expression form used by the `-p` and
//! `-t` stages; once an expression has a resolved type, the type is
//! interpolated right after the node name (`(IntExpr (IntType) 3)`).

use std::fmt;

use crate::const_prop::CpValue;
use crate::token::Loc;
use crate::types::ResolvedType;

pub type Program = Vec<Cmd>;

#[derive(Debug, PartialEq)]
pub struct Cmd {
    pub kind: CmdKind,
    pub loc: Loc,
    pub text: String,
}

#[derive(Debug, PartialEq)]
pub enum CmdKind {
    /// `read image <string> to <argument>`
    Read { file: StringLit, into: Argument },
    /// `write image <expr> to <string>`
    Write { expr: Expr, file: StringLit },
    /// `type <variable> = <type>`
    TypeAlias { name: String, ty: TypeSyntax },
    /// `let <lvalue> = <expr>`
    Let { lvalue: LValue, expr: Expr },
    /// `assert <expr> , <string>`
    Assert { expr: Expr, msg: StringLit },
    /// `print <string>`
    Print(StringLit),
    /// `show <expr>`
    Show(Expr),
    /// `time <cmd>`
    Time(Box<Cmd>),
    /// `fn <variable> ( <binding> , ... ) : <type> { <stmt> ... }`
    Fn(FnCmd),
}

#[derive(Debug, PartialEq)]
pub struct FnCmd {
    pub name: String,
    pub params: Vec<Binding>,
    pub ret: TypeSyntax,
    pub body: Vec<Stmt>,
}

/// A string literal; the text keeps its surrounding quotes.
#[derive(Debug, PartialEq)]
pub struct StringLit {
    pub text: String,
    pub loc: Loc,
}

impl StringLit {
    /// The contents between the quotes.
    pub fn value(&self) -> &str {
        &self.text[1..self.text.len() - 1]
    }
}

#[derive(Debug, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub loc: Loc,
    pub text: String,
}

#[derive(Debug, PartialEq)]
pub enum StmtKind {
    Let { lvalue: LValue, expr: Expr },
    Assert { expr: Expr, msg: StringLit },
    Return(Expr),
}

#[derive(Debug, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub loc: Loc,
    pub text: String,
    /// Filled in by the type checker; `Some` for every node afterwards.
    pub ty: Option<ResolvedType>,
    /// Filled in by constant propagation at `-O2`; advisory only.
    pub cp: CpValue,
}

impl Expr {
    pub fn new(kind: ExprKind, loc: Loc, text: impl Into<String>) -> Expr {
        Expr {
            kind,
            loc,
            text: text.into(),
            ty: None,
            cp: CpValue::None,
        }
    }

    /// The resolved type, which the code generator may assume present.
    pub fn resolved(&self) -> &ResolvedType {
        self.ty.as_ref().expect("expression was not type-checked")
    }
}

#[derive(Debug, PartialEq)]
pub enum ExprKind {
    Int(i64),
    Float(f64),
    True,
    False,
    Var(String),
    Tuple(Vec<Expr>),
    Array(Vec<Expr>),
    TupleIndex(Box<Expr>, i64),
    ArrayIndex(Box<Expr>, Vec<Expr>),
    Call(String, Vec<Expr>),
    Unop(UnOp, Box<Expr>),
    Binop(Box<Expr>, BinOp, Box<Expr>),
    If(Box<Expr>, Box<Expr>, Box<Expr>),
    ArrayLoop(Vec<LoopBound>, Box<Expr>),
    SumLoop(Vec<LoopBound>, Box<Expr>),
}

/// One `x : e` entry of an `array`/`sum` bounds list.
#[derive(Debug, PartialEq)]
pub struct LoopBound {
    pub var: String,
    pub bound: Expr,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Gt,
    Eq,
    Ne,
    Le,
    Ge,
    And,
    Or,
}

impl BinOp {
    pub fn from_text(text: &str) -> Option<BinOp> {
        Some(match text {
            "+" => BinOp::Add,
            "-" => BinOp::Sub,
            "*" => BinOp::Mul,
            "/" => BinOp::Div,
            "%" => BinOp::Mod,
            "<" => BinOp::Lt,
            ">" => BinOp::Gt,
            "==" => BinOp::Eq,
            "!=" => BinOp::Ne,
            "<=" => BinOp::Le,
            ">=" => BinOp::Ge,
            "&&" => BinOp::And,
            "||" => BinOp::Or,
            _ => return None,
        })
    }
}

#[derive(Debug, PartialEq)]
pub struct TypeSyntax {
    pub kind: TypeKind,
    pub loc: Loc,
    pub text: String,
}

#[derive(Debug, PartialEq)]
pub enum TypeKind {
    Int,
    Bool,
    Float,
    Var(String),
    Array(Box<TypeSyntax>, u32),
    Tuple(Vec<TypeSyntax>),
}

#[derive(Debug, PartialEq)]
pub struct LValue {
    pub kind: LValueKind,
    pub loc: Loc,
    pub text: String,
}

#[derive(Debug, PartialEq)]
pub enum LValueKind {
    Arg(Argument),
    Tuple(Vec<LValue>),
}

#[derive(Debug, PartialEq)]
pub struct Argument {
    pub kind: ArgumentKind,
    pub loc: Loc,
    pub text: String,
}

#[derive(Debug, PartialEq)]
pub enum ArgumentKind {
    /// `x`
    Var(String),
    /// `x[d1, d2, ...]` — binds the array and each dimension size.
    Array(String, Vec<String>),
}

#[derive(Debug, PartialEq)]
pub struct Binding {
    pub kind: BindingKind,
    pub loc: Loc,
    pub text: String,
}

#[derive(Debug, PartialEq)]
pub enum BindingKind {
    Var(Argument, TypeSyntax),
    Tuple(Vec<Binding>),
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            CmdKind::Read { file, into } => write!(f, "(ReadCmd {} {into})", file.text),
            CmdKind::Write { expr, file } => write!(f, "(WriteCmd {expr} {})", file.text),
            CmdKind::TypeAlias { name, ty } => write!(f, "(TypeCmd {name} {ty})"),
            CmdKind::Let { lvalue, expr } => write!(f, "(LetCmd {lvalue} {expr})"),
            CmdKind::Assert { expr, msg } => write!(f, "(AssertCmd {expr} {})", msg.text),
            CmdKind::Print(msg) => write!(f, "(PrintCmd {})", msg.text),
            CmdKind::Show(expr) => write!(f, "(ShowCmd {expr})"),
            CmdKind::Time(cmd) => write!(f, "(TimeCmd {cmd})"),
            CmdKind::Fn(fun) => {
                write!(f, "(FnCmd {} (", fun.name)?;
                write_list(f, &fun.params)?;
                write!(f, ") {} ", fun.ret)?;
                write_list(f, &fun.body)?;
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            StmtKind::Let { lvalue, expr } => write!(f, "(LetStmt {lvalue} {expr})"),
            StmtKind::Assert { expr, msg } => write!(f, "(AssertStmt {expr} {})", msg.text),
            StmtKind::Return(expr) => write!(f, "(ReturnStmt {expr})"),
        }
    }
}

impl Expr {
    /// ` (IntType)` once resolved, nothing beforehand.
    fn rtype(&self) -> String {
        match &self.ty {
            Some(ty) => format!(" ({ty})"),
            None => String::new(),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rt = self.rtype();
        match &self.kind {
            ExprKind::Int(v) => write!(f, "(IntExpr{rt} {v})"),
            // The reference serialization prints floats truncated to an
            // integer.
            ExprKind::Float(v) => write!(f, "(FloatExpr{rt} {})", *v as i64),
            ExprKind::True => write!(f, "(TrueExpr{rt})"),
            ExprKind::False => write!(f, "(FalseExpr{rt})"),
            ExprKind::Var(name) => write!(f, "(VarExpr{rt} {name})"),
            ExprKind::Tuple(items) => {
                write!(f, "(TupleLiteralExpr{rt} ")?;
                write_list(f, items)?;
                write!(f, ")")
            }
            ExprKind::Array(items) => {
                write!(f, "(ArrayLiteralExpr{rt} ")?;
                write_list(f, items)?;
                write!(f, ")")
            }
            ExprKind::TupleIndex(expr, index) => {
                write!(f, "(TupleIndexExpr{rt} {expr} {index})")
            }
            ExprKind::ArrayIndex(expr, indices) => {
                write!(f, "(ArrayIndexExpr{rt} {expr} ")?;
                write_list(f, indices)?;
                write!(f, ")")
            }
            ExprKind::Call(name, args) => {
                write!(f, "(CallExpr{rt} {name} ")?;
                write_list(f, args)?;
                write!(f, ")")
            }
            ExprKind::Unop(op, expr) => write!(f, "(UnopExpr{rt} {op} {expr})"),
            ExprKind::Binop(lhs, op, rhs) => write!(f, "(BinopExpr{rt} {lhs} {op} {rhs})"),
            ExprKind::If(cond, then, els) => write!(f, "(IfExpr{rt} {cond} {then} {els})"),
            ExprKind::ArrayLoop(bounds, body) => {
                write!(f, "(ArrayLoopExpr{rt} ")?;
                for bound in bounds {
                    write!(f, "{} {} ", bound.var, bound.bound)?;
                }
                write!(f, "{body})")
            }
            ExprKind::SumLoop(bounds, body) => {
                write!(f, "(SumLoopExpr{rt} ")?;
                for bound in bounds {
                    write!(f, "{} {} ", bound.var, bound.bound)?;
                }
                write!(f, "{body})")
            }
        }
    }
}

impl fmt::Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnOp::Neg => "-",
            UnOp::Not => "!",
        })
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        })
    }
}

impl fmt::Display for TypeSyntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TypeKind::Int => write!(f, "(IntType)"),
            TypeKind::Bool => write!(f, "(BoolType)"),
            TypeKind::Float => write!(f, "(FloatType)"),
            TypeKind::Var(name) => write!(f, "(VarType {name})"),
            TypeKind::Array(elem, rank) => write!(f, "(ArrayType {elem} {rank})"),
            TypeKind::Tuple(items) => {
                write!(f, "(TupleType ")?;
                write_list(f, items)?;
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for LValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            LValueKind::Arg(arg) => write!(f, "(ArgLValue {arg})"),
            LValueKind::Tuple(items) => {
                write!(f, "(TupleLValue ")?;
                write_list(f, items)?;
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ArgumentKind::Var(name) => write!(f, "(VarArgument {name})"),
            ArgumentKind::Array(name, dims) => {
                write!(f, "(ArrayArgument {name} ")?;
                write_list(f, dims)?;
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            BindingKind::Var(arg, ty) => write!(f, "(VarBinding {arg} {ty})"),
            BindingKind::Tuple(items) => {
                write!(f, "(TupleBinding ")?;
                write_list(f, items)?;
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn expr(kind: ExprKind) -> Expr {
        Expr::new(kind, Loc::default(), "")
    }

    #[test]
    fn untyped_serialization() {
        let e = expr(ExprKind::Binop(
            Box::new(expr(ExprKind::Int(1))),
            BinOp::Add,
            Box::new(expr(ExprKind::Int(2))),
        ));
        assert_eq!(e.to_string(), "(BinopExpr (IntExpr 1) + (IntExpr 2))");
    }

    #[test]
    fn typed_serialization_interpolates_the_type() {
        let mut e = expr(ExprKind::Int(3));
        e.ty = Some(ResolvedType::Int);
        assert_eq!(e.to_string(), "(IntExpr (IntType) 3)");
    }

    #[test]
    fn float_serialization_truncates() {
        assert_eq!(expr(ExprKind::Float(3.99)).to_string(), "(FloatExpr 3)");
        assert_eq!(expr(ExprKind::Float(-2.5)).to_string(), "(FloatExpr -2)");
    }

    #[test]
    fn string_lit_value_strips_quotes() {
        let s = StringLit {
            text: "\"hello\"".into(),
            loc: Loc::default(),
        };
        assert_eq!(s.value(), "hello");
    }
}
