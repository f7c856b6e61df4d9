use std::collections::HashMap;
use std::fmt;

use crate::{
    ast::{
        Argument, ArgumentKind, BinOp, Binding, BindingKind, Cmd, CmdKind, Expr, ExprKind, LValue,
        LValueKind, LoopBound, Program, Stmt, StmtKind, TypeKind, TypeSyntax, UnOp,
    },
    token::Loc,
    types::ResolvedType,
};

type Result<T, E = Error> = std::result::Result<T, E>;

/// What a name means inside a scope.
#[derive(Clone, Debug, PartialEq)]
pub enum NameInfo {
    Variable(ResolvedType),
    TypeAlias(ResolvedType),
    Func {
        ret: ResolvedType,
        params: Vec<ResolvedType>,
    },
}

/// The global symbol table surviving type checking. The code generator reads
/// it to derive a calling convention for every function (declared or
/// predeclared) before lowering anything.
#[derive(Debug)]
pub struct Globals {
    table: HashMap<String, NameInfo>,
}

impl Globals {
    pub fn get(&self, name: &str) -> Option<&NameInfo> {
        self.table.get(name)
    }

    /// Every function known at the top level, builtins included.
    pub fn functions(&self) -> impl Iterator<Item = (&str, &ResolvedType, &[ResolvedType])> {
        self.table.iter().filter_map(|(name, info)| match info {
            NameInfo::Func { ret, params } => Some((name.as_str(), ret, params.as_slice())),
            _ => None,
        })
    }
}

/// Type-checks a program, annotating every expression with its resolved type
/// in place, and returns the global scope.
pub fn typecheck(program: &mut Program) -> Result<Globals> {
    Checker::new().check(program)
}

/// The type checker.
///
/// Scopes are kept as a stack of tables; lookup walks from the innermost
/// outwards. Introducing a name that resolves *anywhere* in the stack is an
/// error: the language forbids shadowing even across parent scopes.
pub struct Checker {
    scopes: Vec<HashMap<String, NameInfo>>,
}

impl Default for Checker {
    fn default() -> Self {
        Checker::new()
    }
}

impl Checker {
    pub fn new() -> Checker {
        let mut global = HashMap::new();
        let float1 = (ResolvedType::Float, vec![ResolvedType::Float]);
        let float2 = (
            ResolvedType::Float,
            vec![ResolvedType::Float, ResolvedType::Float],
        );
        global.insert(
            "args".to_string(),
            NameInfo::Variable(ResolvedType::Array(Box::new(ResolvedType::Int), 1)),
        );
        global.insert("argnum".to_string(), NameInfo::Variable(ResolvedType::Int));
        for name in [
            "sqrt", "exp", "sin", "cos", "tan", "asin", "acos", "atan", "log",
        ] {
            global.insert(
                name.to_string(),
                NameInfo::Func {
                    ret: float1.0.clone(),
                    params: float1.1.clone(),
                },
            );
        }
        for name in ["pow", "atan2"] {
            global.insert(
                name.to_string(),
                NameInfo::Func {
                    ret: float2.0.clone(),
                    params: float2.1.clone(),
                },
            );
        }
        global.insert(
            "to_int".to_string(),
            NameInfo::Func {
                ret: ResolvedType::Int,
                params: vec![ResolvedType::Float],
            },
        );
        global.insert(
            "to_float".to_string(),
            NameInfo::Func {
                ret: ResolvedType::Float,
                params: vec![ResolvedType::Int],
            },
        );
        Checker {
            scopes: vec![global],
        }
    }

    pub fn check(mut self, program: &mut Program) -> Result<Globals> {
        for cmd in program.iter_mut() {
            self.check_cmd(cmd)?;
        }
        let table = self.scopes.pop().expect("global scope");
        Ok(Globals { table })
    }

    fn check_cmd(&mut self, cmd: &mut Cmd) -> Result<()> {
        let loc = cmd.loc;
        let text = cmd.text.clone();
        match &mut cmd.kind {
            CmdKind::Show(expr) => {
                self.check_expr(expr)?;
            }
            CmdKind::Read { into, .. } => {
                self.bind_argument(into, &ResolvedType::image())?;
            }
            CmdKind::Write { expr, .. } => {
                let ty = self.check_expr(expr)?;
                check_image_type(&ty, loc, &text)?;
            }
            CmdKind::Let { lvalue, expr } => {
                let ty = self.check_expr(expr)?;
                self.bind_lvalue(lvalue, &ty)?;
            }
            CmdKind::Assert { expr, .. } => {
                let ty = self.check_expr(expr)?;
                if ty != ResolvedType::Bool {
                    return Err(err(ErrorKind::AssertNotBool(ty.to_string()), loc, &text));
                }
            }
            CmdKind::Print(_) => {}
            CmdKind::Time(inner) => self.check_cmd(inner)?,
            CmdKind::TypeAlias { name, ty } => {
                let resolved = self.resolve_type(ty)?;
                let name = name.clone();
                self.add(&name, NameInfo::TypeAlias(resolved), loc, &text)?;
            }
            CmdKind::Fn(fun) => {
                // Parameter types resolve against the enclosing scope; the
                // names they introduce live in the function's own scope.
                let param_types = fun
                    .params
                    .iter()
                    .map(|binding| self.binding_type(binding))
                    .collect::<Result<Vec<_>>>()?;
                let ret = self.resolve_type(&fun.ret)?;

                self.scopes.push(HashMap::new());
                for (binding, ty) in fun.params.iter().zip(&param_types) {
                    self.bind_binding(binding, ty)?;
                }

                // The function becomes visible in the enclosing scope before
                // its body is checked, so directly recursive calls resolve.
                let name = fun.name.clone();
                self.add_enclosing(
                    &name,
                    NameInfo::Func {
                        ret: ret.clone(),
                        params: param_types.clone(),
                    },
                    loc,
                    &text,
                )?;

                let mut has_return = false;
                for stmt in &mut fun.body {
                    has_return |= self.check_stmt(stmt, &ret)?;
                }
                self.scopes.pop();

                // A syntactic check only: some return statement must appear,
                // on any path, unless the function returns {}.
                if !ret.is_void() && !has_return {
                    return Err(err(ErrorKind::MissingReturn(fun.name.clone()), loc, &text));
                }
            }
        }
        Ok(())
    }

    /// Returns whether the statement was a `return`.
    fn check_stmt(&mut self, stmt: &mut Stmt, ret: &ResolvedType) -> Result<bool> {
        let loc = stmt.loc;
        let text = stmt.text.clone();
        match &mut stmt.kind {
            StmtKind::Let { lvalue, expr } => {
                let ty = self.check_expr(expr)?;
                self.bind_lvalue(lvalue, &ty)?;
                Ok(false)
            }
            StmtKind::Assert { expr, .. } => {
                let ty = self.check_expr(expr)?;
                if ty != ResolvedType::Bool {
                    return Err(err(ErrorKind::AssertNotBool(ty.to_string()), loc, &text));
                }
                Ok(false)
            }
            StmtKind::Return(expr) => {
                let ty = self.check_expr(expr)?;
                if &ty != ret {
                    return Err(err(
                        ErrorKind::ReturnTypeMismatch {
                            want: ret.to_string(),
                            got: ty.to_string(),
                        },
                        loc,
                        &text,
                    ));
                }
                Ok(true)
            }
        }
    }

    /// Computes the type of an expression, writes it into the node's `ty`
    /// slot, and returns it.
    fn check_expr(&mut self, expr: &mut Expr) -> Result<ResolvedType> {
        let loc = expr.loc;
        let text = expr.text.clone();
        let ty = match &mut expr.kind {
            ExprKind::Int(_) => ResolvedType::Int,
            ExprKind::Float(_) => ResolvedType::Float,
            ExprKind::True | ExprKind::False => ResolvedType::Bool,
            ExprKind::Var(name) => match self.lookup(name) {
                Some(NameInfo::Variable(ty)) => ty.clone(),
                Some(_) => return Err(err(ErrorKind::NotAVariable(name.clone()), loc, &text)),
                None => return Err(err(ErrorKind::UndefinedName(name.clone()), loc, &text)),
            },
            ExprKind::Binop(lhs, op, rhs) => {
                let op = *op;
                let lt = self.check_expr(lhs)?;
                let rt = self.check_expr(rhs)?;
                self.binop_type(op, &lt, &rt, loc, &text)?
            }
            ExprKind::Unop(op, operand) => {
                let op = *op;
                let ty = self.check_expr(operand)?;
                match op {
                    UnOp::Neg if ty.is_numeric() => ty,
                    UnOp::Not if ty == ResolvedType::Bool => ty,
                    _ => {
                        return Err(err(
                            ErrorKind::UnopUnsupported {
                                op,
                                ty: ty.to_string(),
                            },
                            loc,
                            &text,
                        ))
                    }
                }
            }
            ExprKind::Tuple(items) => {
                let types = items
                    .iter_mut()
                    .map(|item| self.check_expr(item))
                    .collect::<Result<Vec<_>>>()?;
                ResolvedType::Tuple(types)
            }
            ExprKind::Array(items) => {
                if items.is_empty() {
                    return Err(err(ErrorKind::EmptyArrayLiteral, loc, &text));
                }
                let first = self.check_expr(&mut items[0])?;
                for (i, item) in items.iter_mut().enumerate().skip(1) {
                    let ty = self.check_expr(item)?;
                    if ty != first {
                        return Err(err(
                            ErrorKind::ArrayElementMismatch {
                                index: i,
                                first: first.to_string(),
                                got: ty.to_string(),
                            },
                            loc,
                            &text,
                        ));
                    }
                }
                ResolvedType::Array(Box::new(first), 1)
            }
            ExprKind::TupleIndex(target, index) => {
                let index = *index;
                let ty = self.check_expr(target)?;
                let ResolvedType::Tuple(items) = ty else {
                    return Err(err(ErrorKind::IndexedNonTuple(ty.to_string()), loc, &text));
                };
                if index < 0 || index as usize >= items.len() {
                    return Err(err(
                        ErrorKind::TupleIndexOutOfRange {
                            index,
                            len: items.len(),
                        },
                        loc,
                        &text,
                    ));
                }
                items[index as usize].clone()
            }
            ExprKind::ArrayIndex(target, indices) => {
                let ty = self.check_expr(target)?;
                let ResolvedType::Array(element, rank) = ty else {
                    return Err(err(ErrorKind::IndexedNonArray(ty.to_string()), loc, &text));
                };
                if rank as usize != indices.len() {
                    return Err(err(
                        ErrorKind::RankMismatch {
                            rank,
                            indices: indices.len(),
                        },
                        loc,
                        &text,
                    ));
                }
                for index in indices.iter_mut() {
                    let ty = self.check_expr(index)?;
                    if ty != ResolvedType::Int {
                        return Err(err(ErrorKind::NonIntIndex(ty.to_string()), loc, &text));
                    }
                }
                *element
            }
            ExprKind::Call(name, args) => {
                let (ret, params) = match self.lookup(name) {
                    Some(NameInfo::Func { ret, params }) => (ret.clone(), params.clone()),
                    Some(_) => return Err(err(ErrorKind::NotAFunction(name.clone()), loc, &text)),
                    None => return Err(err(ErrorKind::UndefinedName(name.clone()), loc, &text)),
                };
                if params.len() != args.len() {
                    return Err(err(
                        ErrorKind::CallArgCount {
                            name: name.clone(),
                            want: params.len(),
                            got: args.len(),
                        },
                        loc,
                        &text,
                    ));
                }
                let name = name.clone();
                for (i, (arg, want)) in args.iter_mut().zip(&params).enumerate() {
                    let got = self.check_expr(arg)?;
                    if &got != want {
                        return Err(err(
                            ErrorKind::CallArgType {
                                name: name.clone(),
                                index: i + 1,
                                want: want.to_string(),
                                got: got.to_string(),
                            },
                            loc,
                            &text,
                        ));
                    }
                }
                ret
            }
            ExprKind::If(cond, then, els) => {
                let ct = self.check_expr(cond)?;
                if ct != ResolvedType::Bool {
                    return Err(err(ErrorKind::ConditionNotBool(ct.to_string()), loc, &text));
                }
                let tt = self.check_expr(then)?;
                let et = self.check_expr(els)?;
                if tt != et {
                    return Err(err(
                        ErrorKind::BranchMismatch {
                            then: tt.to_string(),
                            els: et.to_string(),
                        },
                        loc,
                        &text,
                    ));
                }
                tt
            }
            ExprKind::ArrayLoop(bounds, body) => {
                let rank = bounds.len() as u32;
                self.check_loop_bounds(bounds, loc, &text)?;
                let body_ty = self.check_expr(body)?;
                self.scopes.pop();
                ResolvedType::Array(Box::new(body_ty), rank)
            }
            ExprKind::SumLoop(bounds, body) => {
                self.check_loop_bounds(bounds, loc, &text)?;
                let body_ty = self.check_expr(body)?;
                self.scopes.pop();
                if !body_ty.is_numeric() {
                    return Err(err(
                        ErrorKind::SumNotNumeric(body_ty.to_string()),
                        loc,
                        &text,
                    ));
                }
                body_ty
            }
        };
        expr.ty = Some(ty.clone());
        Ok(ty)
    }

    fn binop_type(
        &self,
        op: BinOp,
        lhs: &ResolvedType,
        rhs: &ResolvedType,
        loc: Loc,
        text: &str,
    ) -> Result<ResolvedType> {
        let mismatch = || {
            err(
                ErrorKind::BinopMismatch {
                    op,
                    lhs: lhs.to_string(),
                    rhs: rhs.to_string(),
                },
                loc,
                text,
            )
        };
        let unsupported = || {
            err(
                ErrorKind::BinopUnsupported {
                    op,
                    ty: lhs.to_string(),
                },
                loc,
                text,
            )
        };
        match op {
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
                if lhs != rhs {
                    return Err(mismatch());
                }
                if !lhs.is_numeric() {
                    return Err(unsupported());
                }
                Ok(lhs.clone())
            }
            BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => {
                if lhs != rhs {
                    return Err(mismatch());
                }
                if !lhs.is_numeric() {
                    return Err(unsupported());
                }
                Ok(ResolvedType::Bool)
            }
            BinOp::Eq | BinOp::Ne => {
                if lhs != rhs {
                    return Err(mismatch());
                }
                if !matches!(
                    lhs,
                    ResolvedType::Int | ResolvedType::Float | ResolvedType::Bool
                ) {
                    return Err(unsupported());
                }
                Ok(ResolvedType::Bool)
            }
            BinOp::And | BinOp::Or => {
                if *lhs != ResolvedType::Bool || *rhs != ResolvedType::Bool {
                    return Err(mismatch());
                }
                Ok(ResolvedType::Bool)
            }
        }
    }

    /// Checks each bound is a non-empty list of ints and pushes the loop
    /// scope with every index variable bound to int. The caller pops.
    fn check_loop_bounds(
        &mut self,
        bounds: &mut [LoopBound],
        loc: Loc,
        text: &str,
    ) -> Result<()> {
        if bounds.is_empty() {
            return Err(err(ErrorKind::EmptyLoopBounds, loc, text));
        }
        for bound in bounds.iter_mut() {
            let ty = self.check_expr(&mut bound.bound)?;
            if ty != ResolvedType::Int {
                return Err(err(
                    ErrorKind::NonIntLoopBound(ty.to_string()),
                    bound.bound.loc,
                    &bound.bound.text,
                ));
            }
        }
        self.scopes.push(HashMap::new());
        for bound in bounds.iter() {
            let loc = bound.bound.loc;
            let text = bound.bound.text.clone();
            self.add(&bound.var, NameInfo::Variable(ResolvedType::Int), loc, &text)?;
        }
        Ok(())
    }

    fn resolve_type(&self, ty: &TypeSyntax) -> Result<ResolvedType> {
        match &ty.kind {
            TypeKind::Int => Ok(ResolvedType::Int),
            TypeKind::Bool => Ok(ResolvedType::Bool),
            TypeKind::Float => Ok(ResolvedType::Float),
            TypeKind::Var(name) => match self.lookup(name) {
                Some(NameInfo::TypeAlias(resolved)) => Ok(resolved.clone()),
                Some(_) => Err(err(ErrorKind::NotAType(name.clone()), ty.loc, &ty.text)),
                None => Err(err(ErrorKind::UndefinedName(name.clone()), ty.loc, &ty.text)),
            },
            TypeKind::Array(element, rank) => {
                let element = self.resolve_type(element)?;
                Ok(ResolvedType::Array(Box::new(element), *rank))
            }
            TypeKind::Tuple(items) => {
                let items = items
                    .iter()
                    .map(|item| self.resolve_type(item))
                    .collect::<Result<Vec<_>>>()?;
                Ok(ResolvedType::Tuple(items))
            }
        }
    }

    /// The resolved type a binding declares, without introducing any names.
    fn binding_type(&self, binding: &Binding) -> Result<ResolvedType> {
        match &binding.kind {
            BindingKind::Var(_, ty) => self.resolve_type(ty),
            BindingKind::Tuple(items) => {
                let items = items
                    .iter()
                    .map(|item| self.binding_type(item))
                    .collect::<Result<Vec<_>>>()?;
                Ok(ResolvedType::Tuple(items))
            }
        }
    }

    /// Introduces every leaf name of a binding into the current scope.
    fn bind_binding(&mut self, binding: &Binding, ty: &ResolvedType) -> Result<()> {
        match (&binding.kind, ty) {
            (BindingKind::Var(arg, _), _) => self.bind_argument(arg, ty),
            (BindingKind::Tuple(items), ResolvedType::Tuple(types)) => {
                for (item, ty) in items.iter().zip(types) {
                    self.bind_binding(item, ty)?;
                }
                Ok(())
            }
            (BindingKind::Tuple(_), _) => Err(err(
                ErrorKind::LValueNotTuple(ty.to_string()),
                binding.loc,
                &binding.text,
            )),
        }
    }

    fn bind_lvalue(&mut self, lvalue: &LValue, ty: &ResolvedType) -> Result<()> {
        match &lvalue.kind {
            LValueKind::Arg(arg) => self.bind_argument(arg, ty),
            LValueKind::Tuple(items) => {
                let ResolvedType::Tuple(types) = ty else {
                    return Err(err(
                        ErrorKind::LValueNotTuple(ty.to_string()),
                        lvalue.loc,
                        &lvalue.text,
                    ));
                };
                if items.len() != types.len() {
                    return Err(err(
                        ErrorKind::LValueArityMismatch {
                            lvalue: items.len(),
                            ty: types.len(),
                        },
                        lvalue.loc,
                        &lvalue.text,
                    ));
                }
                for (item, ty) in items.iter().zip(types) {
                    self.bind_lvalue(item, ty)?;
                }
                Ok(())
            }
        }
    }

    /// Binds an argument form: a plain variable, or an array variable plus
    /// one int per dimension name, whose count must equal the array's rank.
    fn bind_argument(&mut self, arg: &Argument, ty: &ResolvedType) -> Result<()> {
        match &arg.kind {
            ArgumentKind::Var(name) => {
                let name = name.clone();
                self.add(&name, NameInfo::Variable(ty.clone()), arg.loc, &arg.text)
            }
            ArgumentKind::Array(name, dims) => {
                let ResolvedType::Array(_, rank) = ty else {
                    return Err(err(
                        ErrorKind::ArgNotArray(ty.to_string()),
                        arg.loc,
                        &arg.text,
                    ));
                };
                if dims.len() != *rank as usize {
                    return Err(err(
                        ErrorKind::ArgRankMismatch {
                            dims: dims.len(),
                            rank: *rank,
                        },
                        arg.loc,
                        &arg.text,
                    ));
                }
                let name = name.clone();
                self.add(&name, NameInfo::Variable(ty.clone()), arg.loc, &arg.text)?;
                for dim in dims.clone() {
                    self.add(&dim, NameInfo::Variable(ResolvedType::Int), arg.loc, &arg.text)?;
                }
                Ok(())
            }
        }
    }

    fn lookup(&self, name: &str) -> Option<&NameInfo> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    /// Adds a binding to the innermost scope; fails if the name already
    /// resolves anywhere (shadowing is forbidden at any distance).
    fn add(&mut self, name: &str, info: NameInfo, loc: Loc, text: &str) -> Result<()> {
        if self.lookup(name).is_some() {
            return Err(err(ErrorKind::AlreadyDefined(name.to_string()), loc, text));
        }
        self.scopes
            .last_mut()
            .expect("scope stack is never empty")
            .insert(name.to_string(), info);
        Ok(())
    }

    /// Adds a binding to the scope *enclosing* the innermost one, checking
    /// for conflicts only from there outwards. Used for a function's own
    /// name, which lives outside its parameter scope.
    fn add_enclosing(&mut self, name: &str, info: NameInfo, loc: Loc, text: &str) -> Result<()> {
        let enclosing = self.scopes.len() - 2;
        if self.scopes[..=enclosing]
            .iter()
            .any(|scope| scope.contains_key(name))
        {
            return Err(err(ErrorKind::AlreadyDefined(name.to_string()), loc, text));
        }
        self.scopes[enclosing].insert(name.to_string(), info);
        Ok(())
    }
}

/// `write image` demands exactly the canonical image type; the checks run in
/// a fixed order so each failure mode gets its own diagnostic.
fn check_image_type(ty: &ResolvedType, loc: Loc, text: &str) -> Result<()> {
    let fail = |reason: &'static str| {
        Err(err(
            ErrorKind::NotAnImage {
                ty: ty.to_string(),
                reason,
            },
            loc,
            text,
        ))
    };
    let ResolvedType::Array(element, rank) = ty else {
        return fail("a non-array type");
    };
    let ResolvedType::Tuple(items) = element.as_ref() else {
        return fail("an array of non-tuples");
    };
    if items.len() != 4 {
        return fail("a tuple without exactly 4 elements");
    }
    if items.iter().any(|item| *item != ResolvedType::Float) {
        return fail("a tuple with non-float elements");
    }
    if *rank != 2 {
        return fail("an array that is not rank 2");
    }
    Ok(())
}

fn err(kind: ErrorKind, loc: Loc, text: &str) -> Error {
    Error {
        kind,
        loc,
        context: text.to_string(),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub loc: Loc,
    /// The raw text of the offending node.
    pub context: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    UndefinedName(String),
    NotAVariable(String),
    NotAType(String),
    NotAFunction(String),
    AlreadyDefined(String),
    BinopMismatch { op: BinOp, lhs: String, rhs: String },
    BinopUnsupported { op: BinOp, ty: String },
    UnopUnsupported { op: UnOp, ty: String },
    AssertNotBool(String),
    ConditionNotBool(String),
    BranchMismatch { then: String, els: String },
    EmptyArrayLiteral,
    ArrayElementMismatch { index: usize, first: String, got: String },
    IndexedNonTuple(String),
    IndexedNonArray(String),
    TupleIndexOutOfRange { index: i64, len: usize },
    RankMismatch { rank: u32, indices: usize },
    NonIntIndex(String),
    CallArgCount { name: String, want: usize, got: usize },
    CallArgType { name: String, index: usize, want: String, got: String },
    EmptyLoopBounds,
    NonIntLoopBound(String),
    SumNotNumeric(String),
    NotAnImage { ty: String, reason: &'static str },
    ArgNotArray(String),
    ArgRankMismatch { dims: usize, rank: u32 },
    LValueNotTuple(String),
    LValueArityMismatch { lvalue: usize, ty: usize },
    ReturnTypeMismatch { want: String, got: String },
    MissingReturn(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\nEncountered Error at Typechecking Step. {}, Expression \"{}\".\n{}",
            self.loc, self.context, self.kind
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ErrorKind::*;
        match self {
            UndefinedName(name) => write!(f, "Undefined reference to {name}."),
            NotAVariable(name) => {
                write!(f, "Referenced {name} as a variable, but it is not one.")
            }
            NotAType(name) => write!(f, "Referenced {name} as a type, but it is not one."),
            NotAFunction(name) => {
                write!(f, "Referenced {name} as a function, but it is not one.")
            }
            AlreadyDefined(name) => write!(f, "Name {name} is already defined."),
            BinopMismatch { op, lhs, rhs } => {
                write!(f, "Types do not match for {op}. lhs: {lhs}, rhs: {rhs}.")
            }
            BinopUnsupported { op, ty } => {
                write!(f, "No supported {op} operation for {ty}.")
            }
            UnopUnsupported { op, ty } => write!(f, "No supported unary {op} for {ty}."),
            AssertNotBool(ty) => write!(
                f,
                "Assert takes a boolean as its first argument, but got a {ty}."
            ),
            ConditionNotBool(ty) => {
                write!(f, "If condition must be a boolean, but got a {ty}.")
            }
            BranchMismatch { then, els } => write!(
                f,
                "If branches must have matching types. Then: {then}, Else: {els}."
            ),
            EmptyArrayLiteral => {
                write!(f, "Array literal has no elements; element type unknown.")
            }
            ArrayElementMismatch { index, first, got } => write!(
                f,
                "Array literal with mismatched element types. 1st: {first}, {}th: {got}.",
                index + 1
            ),
            IndexedNonTuple(ty) => write!(f, "Tuple index into a non-tuple of type {ty}."),
            IndexedNonArray(ty) => write!(f, "Array index into a non-array of type {ty}."),
            TupleIndexOutOfRange { index, len } => write!(
                f,
                "Index {index} is out of range for a tuple with {len} elements."
            ),
            RankMismatch { rank, indices } => write!(
                f,
                "Indexed an array of rank {rank} with {indices} indices."
            ),
            NonIntIndex(ty) => write!(f, "Array index of non-int type {ty}."),
            CallArgCount { name, want, got } => write!(
                f,
                "Function {name} expects {want} arguments, but got {got}."
            ),
            CallArgType {
                name,
                index,
                want,
                got,
            } => write!(
                f,
                "Function {name} expects a {want} as its {index}th argument, but got a {got}."
            ),
            EmptyLoopBounds => write!(f, "Loop with no bounds."),
            NonIntLoopBound(ty) => write!(f, "Loop bound of non-int type {ty}."),
            SumNotNumeric(ty) => write!(
                f,
                "Sum loop body of non-numerical type {ty}. Expected an int or a float."
            ),
            NotAnImage { ty, reason } => write!(
                f,
                "Write expects a {{float, float, float, float}}[,], but got {reason}: {ty}."
            ),
            ArgNotArray(ty) => write!(f, "Array argument assigned non-array type {ty}."),
            ArgRankMismatch { dims, rank } => write!(
                f,
                "Array argument declares {dims} dimensions but was assigned an array of rank {rank}."
            ),
            LValueNotTuple(ty) => write!(f, "Tuple lvalue assigned non-tuple type {ty}."),
            LValueArityMismatch { lvalue, ty } => write!(
                f,
                "Tuple lvalue with {lvalue} elements assigned a tuple type with {ty} elements."
            ),
            ReturnTypeMismatch { want, got } => write!(
                f,
                "Return type does not match the function. Expected {want}, got {got}."
            ),
            MissingReturn(name) => write!(
                f,
                "Function {name} has a non-{{}} return type, but never returns."
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lexer::lex_all, parser::parse_program};
    use pretty_assertions::assert_eq;

    fn check(src: &str) -> Result<(Program, Globals)> {
        let tokens = lex_all(src).unwrap();
        let mut program = parse_program(&tokens).unwrap();
        let globals = typecheck(&mut program)?;
        Ok((program, globals))
    }

    fn check_err(src: &str) -> ErrorKind {
        check(src).unwrap_err().kind
    }

    /// The typed tree for a source program, one command per line.
    fn typed_tree(src: &str) -> String {
        let (program, _) = check(src).unwrap();
        program.iter().map(|cmd| cmd.to_string() + "\n").collect()
    }

    #[test]
    fn annotates_every_expression() {
        assert_eq!(
            typed_tree("show 1 + 2\n"),
            "(ShowCmd (BinopExpr (IntType) (IntExpr (IntType) 1) + (IntExpr (IntType) 2)))\n"
        );
        assert_eq!(
            typed_tree("show [1, 2][0] == 2\n"),
            "(ShowCmd (BinopExpr (BoolType) (ArrayIndexExpr (IntType) \
             (ArrayLiteralExpr (ArrayType (IntType) 1) (IntExpr (IntType) 1) \
             (IntExpr (IntType) 2)) (IntExpr (IntType) 0)) == (IntExpr (IntType) 2)))\n"
        );
    }

    #[test]
    fn rechecking_is_stable() {
        let src = "let a = [1., 2.]\nshow sum[i: 2] a[i]\n";
        let tokens = lex_all(src).unwrap();
        let mut program = parse_program(&tokens).unwrap();
        typecheck(&mut program).unwrap();
        let first: Vec<String> = program.iter().map(|c| c.to_string()).collect();
        typecheck(&mut program).unwrap();
        let second: Vec<String> = program.iter().map(|c| c.to_string()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn prelude_bindings() {
        let (_, globals) = check("show argnum + args[0]\n").unwrap();
        assert!(matches!(
            globals.get("sqrt"),
            Some(NameInfo::Func { .. })
        ));
        assert_eq!(globals.functions().count(), 13);
    }

    #[test]
    fn let_and_tuple_destructuring() {
        assert!(check("let {x, y} = {1, 2.5}\nshow x\nshow y\n").is_ok());
        assert!(matches!(
            check_err("let {x, y} = {1, 2, 3}\n"),
            ErrorKind::LValueArityMismatch { lvalue: 2, ty: 3 }
        ));
        assert!(matches!(
            check_err("let {x, y} = 7\n"),
            ErrorKind::LValueNotTuple(_)
        ));
    }

    #[test]
    fn array_argument_binds_dimensions() {
        assert!(check("let a[n] = [1, 2, 3]\nshow n\nshow a[n - 1]\n").is_ok());
        assert!(matches!(
            check_err("let a[n, m] = [1, 2]\n"),
            ErrorKind::ArgRankMismatch { dims: 2, rank: 1 }
        ));
        assert!(matches!(
            check_err("let a[n] = 4\n"),
            ErrorKind::ArgNotArray(_)
        ));
    }

    #[test]
    fn binop_rules() {
        assert!(matches!(
            check_err("show 1 + true\n"),
            ErrorKind::BinopMismatch { op: BinOp::Add, .. }
        ));
        assert!(matches!(
            check_err("show true < false\n"),
            ErrorKind::BinopUnsupported { op: BinOp::Lt, .. }
        ));
        assert!(matches!(
            check_err("show {1} == {1}\n"),
            ErrorKind::BinopUnsupported { op: BinOp::Eq, .. }
        ));
        assert!(matches!(
            check_err("show 1 && 2\n"),
            ErrorKind::BinopMismatch { op: BinOp::And, .. }
        ));
        assert!(check("show 1.5 * 2. - 0.5\nshow 1 % 2 == 0\nshow true || false\n").is_ok());
    }

    #[test]
    fn no_shadowing_anywhere() {
        assert!(matches!(
            check_err("let x = 1\nlet x = 2\n"),
            ErrorKind::AlreadyDefined(_)
        ));
        // Even a child scope may not reuse a name from an enclosing scope.
        assert!(matches!(
            check_err("let x = 1\nshow sum[x: 3] x\n"),
            ErrorKind::AlreadyDefined(_)
        ));
        assert!(matches!(
            check_err("fn f(argnum: int): int {\n return argnum\n}\n"),
            ErrorKind::AlreadyDefined(_)
        ));
    }

    #[test]
    fn functions_and_calls() {
        assert!(check("fn sq(x: int): int {\n return x * x\n}\nshow sq(7)\n").is_ok());
        assert!(matches!(
            check_err("fn f(): int {\n assert true, \"x\"\n}\n"),
            ErrorKind::MissingReturn(_)
        ));
        assert!(check("fn g(): {} {\n}\nshow 1\n").is_ok());
        assert!(matches!(
            check_err("fn sq(x: int): int {\n return x\n}\nshow sq(1, 2)\n"),
            ErrorKind::CallArgCount { want: 1, got: 2, .. }
        ));
        assert!(matches!(
            check_err("show sqrt(1)\n"),
            ErrorKind::CallArgType { index: 1, .. }
        ));
        assert!(matches!(
            check_err("fn f(): int {\n return 1.0\n}\n"),
            ErrorKind::ReturnTypeMismatch { .. }
        ));
        // Recursion resolves because the function is visible to its body.
        assert!(check(
            "fn fac(n: int): int {\n return if n == 0 then 1 else n * fac(n - 1)\n}\nshow fac(5)\n"
        )
        .is_ok());
    }

    #[test]
    fn type_aliases_resolve_structurally() {
        assert!(check("type n = int\nfn f(x: n): n {\n return x + 1\n}\nshow f(1)\n").is_ok());
        assert!(matches!(
            check_err("type t = int\nshow t\n"),
            ErrorKind::NotAVariable(_)
        ));
        assert!(matches!(
            check_err("let y = 1\ntype u = y\n"),
            ErrorKind::NotAType(_)
        ));
    }

    #[test]
    fn loops() {
        assert!(check("show sum[i: 3, j: 3] i * j\n").is_ok());
        assert!(check("show array[i: 4] i * i\n").is_ok());
        assert!(matches!(
            check_err("show array[i: 1.5] i\n"),
            ErrorKind::NonIntLoopBound(_)
        ));
        assert!(matches!(
            check_err("show sum[i: 2] true\n"),
            ErrorKind::SumNotNumeric(_)
        ));
        // The loop scope ends with the loop.
        assert!(matches!(
            check_err("show sum[i: 2] i\nshow i\n"),
            ErrorKind::UndefinedName(_)
        ));
    }

    #[test]
    fn indexing() {
        assert!(matches!(
            check_err("show {1, 2}{5}\n"),
            ErrorKind::TupleIndexOutOfRange { index: 5, len: 2 }
        ));
        assert!(matches!(
            check_err("let a = [1, 2]\nshow a[0, 0]\n"),
            ErrorKind::RankMismatch { rank: 1, indices: 2 }
        ));
        assert!(matches!(
            check_err("let a = [1, 2]\nshow a[true]\n"),
            ErrorKind::NonIntIndex(_)
        ));
        assert!(matches!(
            check_err("show [1, true]\n"),
            ErrorKind::ArrayElementMismatch { .. }
        ));
    }

    #[test]
    fn read_and_write_images() {
        assert!(check("read image \"in.png\" to img\nwrite image img to \"out.png\"\n").is_ok());
        assert!(check("read image \"in.png\" to img[w, h]\nshow w * h\n").is_ok());
        assert!(matches!(
            check_err("write image 1 to \"out.png\"\n"),
            ErrorKind::NotAnImage { .. }
        ));
        assert!(matches!(
            check_err("let m = array[i: 2, j: 2] {1., 2., 3.}\nwrite image m to \"o\"\n"),
            ErrorKind::NotAnImage { .. }
        ));
    }

    #[test]
    fn error_display_format() {
        let error = check("show missing\n").unwrap_err();
        assert_eq!(
            error.to_string(),
            "\nEncountered Error at Typechecking Step. Line 0, Position 5, \
             Expression \"missing\".\nUndefined reference to missing."
        );
    }
}
