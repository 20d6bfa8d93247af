//! Component M: the loop unroller (§4.M).
//!
//! Recognizes the canonical `for` form: `init` is `T i = A` or `i = A` with
//! integer `A`; `cond` is `i REL B` for `REL ∈ {<, <=, !=}` with integer `B`;
//! `step` is `i++`, `++i`, or `i = i + 1`. Iteration count `N` is `B - A` for
//! `<`/`!=`, `B - A + 1` for `<=`.
//!
//! Full unroll fires when `N ≤ 4`, the body has no flow control (no nested
//! loop, `return`, `break`, `continue`, or `goto`), and the body's AST node
//! count is at most 50: the loop becomes a block of `N` clones of the body,
//! each with `i` substituted by its concrete iteration value and re-folded
//! by O1. Partial unrolling is disabled by policy (falls back to a no-op,
//! per §4.M / §9: without a register allocator, duplicated bodies only
//! inflate icache pressure). Anything else keeps the loop as-is.

use crate::ast::{node_count, substitute_exact, Expr, ExprKind, Function, Stmt, StmtKind, TokenOp, UnaryOp};
use crate::fx::FxHashMap;
use crate::opt::o1::simplify_stmt;

const MAX_FULL_UNROLL_ITERATIONS: i64 = 4;
const MAX_FULL_UNROLL_NODE_COUNT: usize = 50;

enum Rel {
    Lt,
    Le,
    Ne,
}

pub fn run(function: &mut Function) {
    if let Some(body) = function.body.take() {
        function.body = Some(process_nested(body));
    }
}

fn process_nested(stmt: Stmt) -> Stmt {
    if let StmtKind::Block(inner) = stmt.kind {
        Stmt::new(StmtKind::Block(inner.into_iter().map(process_stmt).collect()), stmt.line)
    } else {
        process_stmt(stmt)
    }
}

fn process_stmt(stmt: Stmt) -> Stmt {
    let line = stmt.line;
    match stmt.kind {
        StmtKind::For { init, cond, step, body, vec_info } => {
            if let Some(unrolled) = try_unroll(&init, &cond, &step, &body) {
                return unrolled;
            }
            Stmt::new(StmtKind::For { init, cond, step, body: Box::new(process_nested(*body)), vec_info }, line)
        }
        StmtKind::If { cond, then, els } => Stmt::new(
            StmtKind::If { cond, then: Box::new(process_nested(*then)), els: els.map(|e| Box::new(process_nested(*e))) },
            line,
        ),
        StmtKind::While { cond, body, vec_info } => {
            Stmt::new(StmtKind::While { cond, body: Box::new(process_nested(*body)), vec_info }, line)
        }
        StmtKind::DoWhile { cond, body } => {
            Stmt::new(StmtKind::DoWhile { cond, body: Box::new(process_nested(*body)) }, line)
        }
        StmtKind::Switch { cond, body } => {
            Stmt::new(StmtKind::Switch { cond, body: Box::new(process_nested(*body)) }, line)
        }
        StmtKind::Block(stmts) => Stmt::new(StmtKind::Block(stmts.into_iter().map(process_stmt).collect()), line),
        other => Stmt::new(other, line),
    }
}

fn try_unroll(init: &Option<Box<Stmt>>, cond: &Option<Expr>, step: &Option<Expr>, body: &Stmt) -> Option<Stmt> {
    let (name, a) = canonical_init(init)?;
    let (rel, b) = canonical_cond(cond, &name)?;
    if !canonical_step_is_one(step, &name) {
        return None;
    }
    let n = match rel {
        Rel::Lt | Rel::Ne => b - a,
        Rel::Le => b - a + 1,
    };
    if !(0..=MAX_FULL_UNROLL_ITERATIONS).contains(&n) {
        return None;
    }
    if has_flow_control(body) || stmt_node_count(body) > MAX_FULL_UNROLL_NODE_COUNT {
        return None;
    }
    let mut copies = Vec::with_capacity(n as usize);
    for k in 0..n {
        let mut env = FxHashMap::default();
        env.insert(name.clone(), a + k);
        let substituted = substitute_exact_stmt(body, &env);
        copies.push(simplify_stmt(process_nested(substituted)));
    }
    Some(Stmt::new(StmtKind::Block(copies), body.line))
}

fn canonical_init(init: &Option<Box<Stmt>>) -> Option<(String, i64)> {
    match init.as_deref().map(|s| &s.kind) {
        Some(StmtKind::VarDecl { name, init: Some(e), .. }) => Some((name.clone(), e.as_integer()?)),
        Some(StmtKind::Expr(e)) => assign_const(e),
        _ => None,
    }
}

fn assign_const(e: &Expr) -> Option<(String, i64)> {
    if let ExprKind::Assign(lhs, rhs) = &e.kind {
        if let ExprKind::Ident(name) = &lhs.kind {
            return rhs.as_integer().map(|v| (name.clone(), v));
        }
    }
    None
}

fn canonical_cond(cond: &Option<Expr>, name: &str) -> Option<(Rel, i64)> {
    let cond = cond.as_ref()?;
    let ExprKind::Binary(op, l, r) = &cond.kind else { return None };
    if !matches!(&l.kind, ExprKind::Ident(n) if n == name) {
        return None;
    }
    let b = r.as_integer()?;
    let rel = match op {
        TokenOp::Lt => Rel::Lt,
        TokenOp::Le => Rel::Le,
        TokenOp::Ne => Rel::Ne,
        _ => return None,
    };
    Some((rel, b))
}

fn canonical_step_is_one(step: &Option<Expr>, name: &str) -> bool {
    let Some(step) = step else { return false };
    if let ExprKind::Unary(op, inner) = &step.kind {
        if matches!(&inner.kind, ExprKind::Ident(n) if n == name)
            && matches!(op, UnaryOp::PreInc | UnaryOp::PostInc)
        {
            return true;
        }
    }
    if let ExprKind::Assign(lhs, rhs) = &step.kind {
        if matches!(&lhs.kind, ExprKind::Ident(n) if n == name) {
            if let ExprKind::Binary(TokenOp::Add, l, r) = &rhs.kind {
                if matches!(&l.kind, ExprKind::Ident(n) if n == name) && r.as_integer() == Some(1) {
                    return true;
                }
                if matches!(&r.kind, ExprKind::Ident(n) if n == name) && l.as_integer() == Some(1) {
                    return true;
                }
            }
        }
    }
    false
}

/// Conservative: a nested loop or any of `return`/`break`/`continue`/`goto`
/// disqualifies full unrolling (§4.M "no flow control").
fn has_flow_control(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Return(_)
        | StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Goto(_)
        | StmtKind::While { .. }
        | StmtKind::DoWhile { .. }
        | StmtKind::For { .. } => true,
        StmtKind::If { then, els, .. } => has_flow_control(then) || els.as_ref().is_some_and(|e| has_flow_control(e)),
        StmtKind::Switch { body, .. } => has_flow_control(body),
        StmtKind::Block(stmts) => stmts.iter().any(has_flow_control),
        _ => false,
    }
}

fn stmt_node_count(stmt: &Stmt) -> usize {
    1 + match &stmt.kind {
        StmtKind::Expr(e) => node_count(e),
        StmtKind::VarDecl { init, .. } => init.as_ref().map_or(0, node_count),
        StmtKind::If { cond, then, els } => {
            node_count(cond) + stmt_node_count(then) + els.as_ref().map_or(0, |e| stmt_node_count(e))
        }
        StmtKind::While { cond, body, .. } => node_count(cond) + stmt_node_count(body),
        StmtKind::DoWhile { cond, body } => node_count(cond) + stmt_node_count(body),
        StmtKind::For { init, cond, step, body, .. } => {
            init.as_ref().map_or(0, |s| stmt_node_count(s))
                + cond.as_ref().map_or(0, node_count)
                + step.as_ref().map_or(0, node_count)
                + stmt_node_count(body)
        }
        StmtKind::Switch { cond, body } => node_count(cond) + stmt_node_count(body),
        StmtKind::Return(e) => e.as_ref().map_or(0, node_count),
        StmtKind::Block(stmts) => stmts.iter().map(stmt_node_count).sum(),
        StmtKind::Assert(e) => node_count(e),
        _ => 0,
    }
}

fn substitute_exact_stmt(stmt: &Stmt, env: &FxHashMap<String, i64>) -> Stmt {
    let kind = match &stmt.kind {
        StmtKind::Expr(e) => StmtKind::Expr(substitute_exact(e, env)),
        StmtKind::VarDecl { name, ty, init, is_static, is_extern } => StmtKind::VarDecl {
            name: name.clone(),
            ty: ty.clone(),
            init: init.as_ref().map(|e| substitute_exact(e, env)),
            is_static: *is_static,
            is_extern: *is_extern,
        },
        StmtKind::If { cond, then, els } => StmtKind::If {
            cond: substitute_exact(cond, env),
            then: Box::new(substitute_exact_stmt(then, env)),
            els: els.as_ref().map(|e| Box::new(substitute_exact_stmt(e, env))),
        },
        StmtKind::While { cond, body, vec_info } => StmtKind::While {
            cond: substitute_exact(cond, env),
            body: Box::new(substitute_exact_stmt(body, env)),
            vec_info: vec_info.clone(),
        },
        StmtKind::DoWhile { cond, body } => {
            StmtKind::DoWhile { cond: substitute_exact(cond, env), body: Box::new(substitute_exact_stmt(body, env)) }
        }
        StmtKind::For { init, cond, step, body, vec_info } => StmtKind::For {
            init: init.as_ref().map(|s| Box::new(substitute_exact_stmt(s, env))),
            cond: cond.as_ref().map(|e| substitute_exact(e, env)),
            step: step.as_ref().map(|e| substitute_exact(e, env)),
            body: Box::new(substitute_exact_stmt(body, env)),
            vec_info: vec_info.clone(),
        },
        StmtKind::Switch { cond, body } => {
            StmtKind::Switch { cond: substitute_exact(cond, env), body: Box::new(substitute_exact_stmt(body, env)) }
        }
        StmtKind::Return(e) => StmtKind::Return(e.as_ref().map(|e| substitute_exact(e, env))),
        StmtKind::Block(stmts) => StmtKind::Block(stmts.iter().map(|s| substitute_exact_stmt(s, env)).collect()),
        StmtKind::Assert(e) => StmtKind::Assert(substitute_exact(e, env)),
        other => other.clone(),
    };
    Stmt { kind, line: stmt.line }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Expr {
        Expr::new(ExprKind::Ident(name.to_string()), 0)
    }

    fn int(v: i64) -> Expr {
        Expr::new(ExprKind::Integer(v), 0)
    }

    fn canonical_for(body: Stmt) -> Stmt {
        Stmt::new(
            StmtKind::For {
                init: Some(Box::new(Stmt::new(
                    StmtKind::Expr(Expr::new(ExprKind::Assign(Box::new(ident("i")), Box::new(int(0))), 0)),
                    0,
                ))),
                cond: Some(Expr::new(ExprKind::Binary(TokenOp::Lt, Box::new(ident("i")), Box::new(int(3))), 0)),
                step: Some(Expr::new(ExprKind::Unary(UnaryOp::PostInc, Box::new(ident("i"))), 0)),
                body: Box::new(body),
                vec_info: None,
            },
            0,
        )
    }

    #[test]
    fn full_unroll_substitutes_each_iteration_value() {
        // for (i=0;i<3;i++) sum = sum + i;
        let body = Stmt::block(
            vec![Stmt::new(
                StmtKind::Expr(Expr::new(
                    ExprKind::Assign(
                        Box::new(ident("sum")),
                        Box::new(Expr::new(ExprKind::Binary(TokenOp::Add, Box::new(ident("sum")), Box::new(ident("i"))), 0)),
                    ),
                    0,
                )),
                0,
            )],
            0,
        );
        let out = process_stmt(canonical_for(body));
        let StmtKind::Block(copies) = out.kind else { panic!("expected block") };
        assert_eq!(copies.len(), 3);
        let StmtKind::Block(inner0) = &copies[0].kind else { panic!() };
        let StmtKind::Expr(e) = &inner0[0].kind else { panic!() };
        let ExprKind::Assign(_, rhs) = &e.kind else { panic!() };
        // sum = sum + 0, after fold the `+0` identity collapses to `sum`.
        assert!(matches!(rhs.kind, ExprKind::Ident(_)));
    }

    #[test]
    fn iteration_count_over_four_keeps_loop() {
        let for_stmt = Stmt::new(
            StmtKind::For {
                init: Some(Box::new(Stmt::new(
                    StmtKind::Expr(Expr::new(ExprKind::Assign(Box::new(ident("i")), Box::new(int(0))), 0)),
                    0,
                ))),
                cond: Some(Expr::new(ExprKind::Binary(TokenOp::Lt, Box::new(ident("i")), Box::new(int(100))), 0)),
                step: Some(Expr::new(ExprKind::Unary(UnaryOp::PostInc, Box::new(ident("i"))), 0)),
                body: Box::new(Stmt::empty_block(0)),
                vec_info: None,
            },
            0,
        );
        let out = process_stmt(for_stmt);
        assert!(matches!(out.kind, StmtKind::For { .. }));
    }

    #[test]
    fn unroll_is_idempotent() {
        let body = Stmt::block(vec![Stmt::new(StmtKind::Expr(ident("x")), 0)], 0);
        let once = process_stmt(canonical_for(body));
        let twice = process_stmt(once.clone());
        assert!(matches!(twice.kind, StmtKind::Block(_)));
    }

    #[test]
    fn body_with_return_disqualifies_full_unroll() {
        let body = Stmt::block(vec![Stmt::new(StmtKind::Return(Some(int(1))), 0)], 0);
        let out = process_stmt(canonical_for(body));
        assert!(matches!(out.kind, StmtKind::For { .. }));
    }
}
