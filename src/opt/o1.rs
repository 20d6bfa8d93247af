//! Component G: the O1 optimizer (§4.G).
//!
//! A bottom-up expression rewriter (recurse into children, then fold /
//! simplify / strength-reduce this node) plus statement-level dead-branch
//! and dead-loop elimination and post-terminator truncation.

use crate::ast::{Expr, ExprKind, Function, Stmt, StmtKind};
use crate::opt::fold::{fold_binary, fold_unary};

/// Bottom-up rewrite of `expr` (§4.G).
pub fn simplify_expr(expr: Expr) -> Expr {
    let line = expr.line;
    let ty = expr.ty.clone();
    let mut out = match expr.kind {
        ExprKind::Binary(op, l, r) => {
            let l = simplify_expr(*l);
            let r = simplify_expr(*r);
            fold_binary(op, l, r, line)
        }
        ExprKind::Unary(op, e) => fold_unary(op, simplify_expr(*e), line),
        ExprKind::Cast(e, cast_ty) => {
            Expr { kind: ExprKind::Cast(Box::new(simplify_expr(*e)), cast_ty), line, ty: None }
        }
        ExprKind::Call(name, args) => Expr {
            kind: ExprKind::Call(name, args.into_iter().map(simplify_expr).collect()),
            line,
            ty: None,
        },
        ExprKind::Index(a, i) => Expr {
            kind: ExprKind::Index(Box::new(simplify_expr(*a)), Box::new(simplify_expr(*i))),
            line,
            ty: None,
        },
        ExprKind::Member(o, name, is_arrow) => {
            Expr { kind: ExprKind::Member(Box::new(simplify_expr(*o)), name, is_arrow), line, ty: None }
        }
        ExprKind::Assign(l, r) => Expr {
            kind: ExprKind::Assign(Box::new(simplify_expr(*l)), Box::new(simplify_expr(*r))),
            line,
            ty: None,
        },
        ExprKind::Ternary(c, t, e) => {
            let c = simplify_expr(*c);
            if let Some(v) = c.as_integer() {
                return simplify_expr(if v != 0 { *t } else { *e });
            }
            Expr {
                kind: ExprKind::Ternary(Box::new(c), Box::new(simplify_expr(*t)), Box::new(simplify_expr(*e))),
                line,
                ty: None,
            }
        }
        literal @ (ExprKind::Integer(_) | ExprKind::Float(_) | ExprKind::Str(_) | ExprKind::Ident(_)) => {
            Expr { kind: literal, line, ty: None }
        }
    };
    out.ty = ty;
    out
}

/// Statement-level rewrite (§4.G): dead-branch/dead-loop elimination, plus
/// recursing into nested bodies.
pub fn simplify_stmt(stmt: Stmt) -> Stmt {
    let line = stmt.line;
    match stmt.kind {
        StmtKind::Expr(e) => Stmt::new(StmtKind::Expr(simplify_expr(e)), line),
        StmtKind::VarDecl { name, ty, init, is_static, is_extern } => Stmt::new(
            StmtKind::VarDecl { name, ty, init: init.map(simplify_expr), is_static, is_extern },
            line,
        ),
        StmtKind::If { cond, then, els } => {
            let cond = simplify_expr(cond);
            if let Some(v) = cond.as_integer() {
                return if v != 0 {
                    simplify_stmt(*then)
                } else {
                    match els {
                        Some(e) => simplify_stmt(*e),
                        None => Stmt::empty_block(line),
                    }
                };
            }
            Stmt::new(
                StmtKind::If {
                    cond,
                    then: Box::new(simplify_stmt(*then)),
                    els: els.map(|e| Box::new(simplify_stmt(*e))),
                },
                line,
            )
        }
        StmtKind::While { cond, body, vec_info } => {
            let cond = simplify_expr(cond);
            if cond.as_integer() == Some(0) {
                return Stmt::empty_block(line);
            }
            Stmt::new(StmtKind::While { cond, body: Box::new(simplify_stmt(*body)), vec_info }, line)
        }
        StmtKind::DoWhile { cond, body } => Stmt::new(
            StmtKind::DoWhile { cond: simplify_expr(cond), body: Box::new(simplify_stmt(*body)) },
            line,
        ),
        StmtKind::For { init, cond, step, body, vec_info } => {
            let cond = cond.map(simplify_expr);
            if let Some(c) = &cond {
                if c.as_integer() == Some(0) {
                    return match init {
                        Some(init) => simplify_stmt(*init),
                        None => Stmt::empty_block(line),
                    };
                }
            }
            Stmt::new(
                StmtKind::For {
                    init: init.map(|s| Box::new(simplify_stmt(*s))),
                    cond,
                    step: step.map(simplify_expr),
                    body: Box::new(simplify_stmt(*body)),
                    vec_info,
                },
                line,
            )
        }
        StmtKind::Switch { cond, body } => {
            Stmt::new(StmtKind::Switch { cond: simplify_expr(cond), body: Box::new(simplify_stmt(*body)) }, line)
        }
        StmtKind::Return(e) => Stmt::new(StmtKind::Return(e.map(simplify_expr)), line),
        StmtKind::Block(stmts) => Stmt::new(StmtKind::Block(simplify_block(stmts)), line),
        StmtKind::Assert(e) => Stmt::new(StmtKind::Assert(simplify_expr(e)), line),
        passthrough @ (StmtKind::Case(_)
        | StmtKind::Default
        | StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Goto(_)
        | StmtKind::Label(_)) => Stmt::new(passthrough, line),
    }
}

/// Simplify every statement, then truncate anything after an unconditional
/// exit unless a `case`/`default` label follows (§4.G, §8 invariant).
pub fn simplify_block(stmts: Vec<Stmt>) -> Vec<Stmt> {
    let simplified: Vec<Stmt> = stmts.into_iter().map(simplify_stmt).collect();
    truncate_after_exit(simplified)
}

fn truncate_after_exit(stmts: Vec<Stmt>) -> Vec<Stmt> {
    let mut out = Vec::with_capacity(stmts.len());
    let mut exited = false;
    for stmt in stmts {
        if exited {
            if matches!(stmt.kind, StmtKind::Case(_) | StmtKind::Default) {
                exited = false;
            } else {
                log::trace!("o1: dropping unreachable statement at line {}", stmt.line);
                continue;
            }
        }
        if stmt.is_unconditional_exit() {
            exited = true;
        }
        out.push(stmt);
    }
    out
}

/// Run O1 over a single function's body (§2: O1 runs component G only).
pub fn run(function: &mut Function) {
    if let Some(body) = function.body.take() {
        function.body = Some(simplify_stmt(body));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::TokenOp;

    fn int(v: i64) -> Expr {
        Expr::new(ExprKind::Integer(v), 0)
    }

    #[test]
    fn scenario_constant_fold_return() {
        // return 3 + 4 * 2;
        let mul = Expr::new(ExprKind::Binary(TokenOp::Mul, Box::new(int(4)), Box::new(int(2))), 0);
        let add = Expr::new(ExprKind::Binary(TokenOp::Add, Box::new(int(3)), Box::new(mul)), 0);
        assert_eq!(simplify_expr(add).as_integer(), Some(11));
    }

    #[test]
    fn if_zero_collapses_to_else_branch() {
        let stmt = Stmt::new(
            StmtKind::If {
                cond: int(0),
                then: Box::new(Stmt::new(StmtKind::Break, 0)),
                els: Some(Box::new(Stmt::new(StmtKind::Continue, 0))),
            },
            0,
        );
        assert!(matches!(simplify_stmt(stmt).kind, StmtKind::Continue));
    }

    #[test]
    fn if_without_else_collapses_to_empty_block() {
        let stmt = Stmt::new(
            StmtKind::If { cond: int(0), then: Box::new(Stmt::new(StmtKind::Break, 0)), els: None },
            0,
        );
        assert!(matches!(simplify_stmt(stmt).kind, StmtKind::Block(b) if b.is_empty()));
    }

    #[test]
    fn statements_after_return_are_truncated() {
        let block = vec![Stmt::new(StmtKind::Return(Some(int(1))), 0), Stmt::new(StmtKind::Expr(int(2)), 0)];
        assert_eq!(simplify_block(block).len(), 1);
    }

    #[test]
    fn case_label_after_break_survives_truncation() {
        let block = vec![
            Stmt::new(StmtKind::Break, 0),
            Stmt::new(StmtKind::Case(1), 0),
            Stmt::new(StmtKind::Expr(int(2)), 0),
        ];
        assert_eq!(simplify_block(block).len(), 3);
    }

    #[test]
    fn o1_is_idempotent() {
        let mul = Expr::new(ExprKind::Binary(TokenOp::Mul, Box::new(int(4)), Box::new(int(2))), 0);
        let add = Expr::new(ExprKind::Binary(TokenOp::Add, Box::new(int(3)), Box::new(mul)), 0);
        let once = simplify_expr(add.clone());
        let twice = simplify_expr(simplify_expr(add));
        assert_eq!(once.as_integer(), twice.as_integer());
    }
}
