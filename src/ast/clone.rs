//! Deep cloning and identifier substitution helpers shared by the inliners,
//! the range analyzer, the propagator, and the loop unroller.
//!
//! `Expr`/`Stmt` already derive `Clone`, which is a deep clone since every
//! child is owned (`Box`/`Vec`), not shared (§3: "Cloning is deep for
//! expressions and for statements"). What the passes actually need beyond
//! a plain `.clone()` is *substitution while cloning*: replacing identifiers
//! by expressions (inlining) or by their known constant value (range
//! analysis, propagation), and renaming locals (aggressive inlining).

use crate::ast::{Expr, ExprKind, Stmt, StmtKind, UnaryOp};
use crate::fx::FxHashMap;

/// A deep clone of `expr`; spelled out as a named function (rather than a
/// bare `.clone()` at call sites) so every place that duplicates AST for a
/// rewrite reads the same way the spec's deep-clone routines do.
pub fn deep_clone_expr(expr: &Expr) -> Expr {
    expr.clone()
}

/// A deep clone of `stmt`.
pub fn deep_clone_stmt(stmt: &Stmt) -> Stmt {
    stmt.clone()
}

/// Replace every `Ident(name)` in `expr` with a clone of `args[name]`,
/// unconditionally (used by the inliners: a call argument substitutes for
/// every occurrence of the matching parameter, including under `&`, since
/// the substituted tree is immediately re-validated by O1/O2 rather than
/// assumed constant).
pub fn substitute_params(expr: &Expr, args: &FxHashMap<String, Expr>) -> Expr {
    let kind = match &expr.kind {
        ExprKind::Ident(name) => {
            if let Some(replacement) = args.get(name) {
                return Expr { ty: expr.ty.clone(), ..replacement.clone() };
            }
            ExprKind::Ident(name.clone())
        }
        ExprKind::Integer(v) => ExprKind::Integer(*v),
        ExprKind::Float(v) => ExprKind::Float(*v),
        ExprKind::Str(b) => ExprKind::Str(b.clone()),
        ExprKind::Binary(op, l, r) => ExprKind::Binary(
            *op,
            Box::new(substitute_params(l, args)),
            Box::new(substitute_params(r, args)),
        ),
        ExprKind::Unary(op, e) => ExprKind::Unary(*op, Box::new(substitute_params(e, args))),
        ExprKind::Cast(e, ty) => ExprKind::Cast(Box::new(substitute_params(e, args)), ty.clone()),
        ExprKind::Call(name, call_args) => ExprKind::Call(
            name.clone(),
            call_args.iter().map(|a| substitute_params(a, args)).collect(),
        ),
        ExprKind::Index(a, i) => ExprKind::Index(
            Box::new(substitute_params(a, args)),
            Box::new(substitute_params(i, args)),
        ),
        ExprKind::Member(o, name, is_arrow) => {
            ExprKind::Member(Box::new(substitute_params(o, args)), name.clone(), *is_arrow)
        }
        ExprKind::Assign(l, r) => ExprKind::Assign(
            Box::new(substitute_params(l, args)),
            Box::new(substitute_params(r, args)),
        ),
        ExprKind::Ternary(c, t, e) => ExprKind::Ternary(
            Box::new(substitute_params(c, args)),
            Box::new(substitute_params(t, args)),
            Box::new(substitute_params(e, args)),
        ),
    };
    Expr { kind, line: expr.line, ty: expr.ty.clone() }
}

/// Replace every `Ident(name)` bound in `env` with its integer literal value,
/// *except* inside the operand of `&` (§4.I: "Substitution into the operand
/// of `&` is forbidden — would yield `&literal`"; §8: "No expression
/// optimizer inserts a reference to `&literal`").
pub fn substitute_exact(expr: &Expr, env: &FxHashMap<String, i64>) -> Expr {
    let kind = match &expr.kind {
        ExprKind::Ident(name) => {
            if let Some(&v) = env.get(name) {
                ExprKind::Integer(v)
            } else {
                ExprKind::Ident(name.clone())
            }
        }
        ExprKind::Unary(UnaryOp::AddrOf, inner) => {
            // Do not descend: `&x` must keep referring to the lvalue `x`.
            ExprKind::Unary(UnaryOp::AddrOf, Box::new(inner.as_ref().clone()))
        }
        ExprKind::Integer(v) => ExprKind::Integer(*v),
        ExprKind::Float(v) => ExprKind::Float(*v),
        ExprKind::Str(b) => ExprKind::Str(b.clone()),
        ExprKind::Binary(op, l, r) => ExprKind::Binary(
            *op,
            Box::new(substitute_exact(l, env)),
            Box::new(substitute_exact(r, env)),
        ),
        ExprKind::Unary(op, e) => ExprKind::Unary(*op, Box::new(substitute_exact(e, env))),
        ExprKind::Cast(e, ty) => ExprKind::Cast(Box::new(substitute_exact(e, env)), ty.clone()),
        ExprKind::Call(name, call_args) => ExprKind::Call(
            name.clone(),
            call_args.iter().map(|a| substitute_exact(a, env)).collect(),
        ),
        ExprKind::Index(a, i) => ExprKind::Index(
            Box::new(substitute_exact(a, env)),
            Box::new(substitute_exact(i, env)),
        ),
        ExprKind::Member(o, name, is_arrow) => {
            ExprKind::Member(Box::new(substitute_exact(o, env)), name.clone(), *is_arrow)
        }
        ExprKind::Assign(l, r) => {
            // The lvalue side is never substituted: `x = 5` cannot become `5 = 5`.
            ExprKind::Assign(Box::new(l.as_ref().clone()), Box::new(substitute_exact(r, env)))
        }
        ExprKind::Ternary(c, t, e) => ExprKind::Ternary(
            Box::new(substitute_exact(c, env)),
            Box::new(substitute_exact(t, env)),
            Box::new(substitute_exact(e, env)),
        ),
    };
    Expr { kind, line: expr.line, ty: expr.ty.clone() }
}

/// Rename every `Ident`/`VarDecl` occurrence of a name in `locals` by
/// appending `suffix` (used by the O3 aggressive inliner, §4.L: "renames
/// every local of the clone with a fresh per-site suffix").
pub fn rename_locals_expr(expr: &Expr, locals: &FxHashMap<String, String>) -> Expr {
    let kind = match &expr.kind {
        ExprKind::Ident(name) => {
            ExprKind::Ident(locals.get(name).cloned().unwrap_or_else(|| name.clone()))
        }
        ExprKind::Integer(v) => ExprKind::Integer(*v),
        ExprKind::Float(v) => ExprKind::Float(*v),
        ExprKind::Str(b) => ExprKind::Str(b.clone()),
        ExprKind::Binary(op, l, r) => ExprKind::Binary(
            *op,
            Box::new(rename_locals_expr(l, locals)),
            Box::new(rename_locals_expr(r, locals)),
        ),
        ExprKind::Unary(op, e) => ExprKind::Unary(*op, Box::new(rename_locals_expr(e, locals))),
        ExprKind::Cast(e, ty) => ExprKind::Cast(Box::new(rename_locals_expr(e, locals)), ty.clone()),
        ExprKind::Call(name, call_args) => ExprKind::Call(
            name.clone(),
            call_args.iter().map(|a| rename_locals_expr(a, locals)).collect(),
        ),
        ExprKind::Index(a, i) => ExprKind::Index(
            Box::new(rename_locals_expr(a, locals)),
            Box::new(rename_locals_expr(i, locals)),
        ),
        ExprKind::Member(o, name, is_arrow) => {
            ExprKind::Member(Box::new(rename_locals_expr(o, locals)), name.clone(), *is_arrow)
        }
        ExprKind::Assign(l, r) => ExprKind::Assign(
            Box::new(rename_locals_expr(l, locals)),
            Box::new(rename_locals_expr(r, locals)),
        ),
        ExprKind::Ternary(c, t, e) => ExprKind::Ternary(
            Box::new(rename_locals_expr(c, locals)),
            Box::new(rename_locals_expr(t, locals)),
            Box::new(rename_locals_expr(e, locals)),
        ),
    };
    Expr { kind, line: expr.line, ty: expr.ty.clone() }
}

pub fn rename_locals_stmt(stmt: &Stmt, locals: &FxHashMap<String, String>) -> Stmt {
    let kind = match &stmt.kind {
        StmtKind::Expr(e) => StmtKind::Expr(rename_locals_expr(e, locals)),
        StmtKind::VarDecl { name, ty, init, is_static, is_extern } => StmtKind::VarDecl {
            name: locals.get(name).cloned().unwrap_or_else(|| name.clone()),
            ty: ty.clone(),
            init: init.as_ref().map(|e| rename_locals_expr(e, locals)),
            is_static: *is_static,
            is_extern: *is_extern,
        },
        StmtKind::If { cond, then, els } => StmtKind::If {
            cond: rename_locals_expr(cond, locals),
            then: Box::new(rename_locals_stmt(then, locals)),
            els: els.as_ref().map(|s| Box::new(rename_locals_stmt(s, locals))),
        },
        StmtKind::While { cond, body, vec_info } => StmtKind::While {
            cond: rename_locals_expr(cond, locals),
            body: Box::new(rename_locals_stmt(body, locals)),
            vec_info: vec_info.clone(),
        },
        StmtKind::DoWhile { cond, body } => StmtKind::DoWhile {
            cond: rename_locals_expr(cond, locals),
            body: Box::new(rename_locals_stmt(body, locals)),
        },
        StmtKind::For { init, cond, step, body, vec_info } => StmtKind::For {
            init: init.as_ref().map(|s| Box::new(rename_locals_stmt(s, locals))),
            cond: cond.as_ref().map(|e| rename_locals_expr(e, locals)),
            step: step.as_ref().map(|e| rename_locals_expr(e, locals)),
            body: Box::new(rename_locals_stmt(body, locals)),
            vec_info: vec_info.clone(),
        },
        StmtKind::Switch { cond, body } => StmtKind::Switch {
            cond: rename_locals_expr(cond, locals),
            body: Box::new(rename_locals_stmt(body, locals)),
        },
        StmtKind::Case(v) => StmtKind::Case(*v),
        StmtKind::Default => StmtKind::Default,
        StmtKind::Break => StmtKind::Break,
        StmtKind::Continue => StmtKind::Continue,
        StmtKind::Goto(l) => StmtKind::Goto(l.clone()),
        StmtKind::Label(l) => StmtKind::Label(l.clone()),
        StmtKind::Return(e) => StmtKind::Return(e.as_ref().map(|e| rename_locals_expr(e, locals))),
        StmtKind::Block(stmts) => {
            StmtKind::Block(stmts.iter().map(|s| rename_locals_stmt(s, locals)).collect())
        }
        StmtKind::Assert(e) => StmtKind::Assert(rename_locals_expr(e, locals)),
    };
    Stmt { kind, line: stmt.line }
}
