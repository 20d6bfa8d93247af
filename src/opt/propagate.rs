//! Component I: O2 within-block constant propagation and dead-store
//! elimination (§4.I).
//!
//! One forward sweep per block. The environment maps a variable name to
//! `{value, store_index, was_read}`, where `value` is either a known integer
//! constant or "unknown". A fresh store to an unread, pure, non-`var_decl`
//! binding is dropped as dead. Copy propagation (`x = y` substituting `y` for
//! later uses of `x`) is deliberately not implemented: without a register
//! allocator downstream, it only relocates a load rather than eliminating
//! one, and can bloat code (§4.I / §9).

use crate::ast::{expr_is_pure, Expr, ExprKind, Function, Stmt, StmtKind, UnaryOp};
use crate::fx::FxHashMap;
use crate::opt::o1::simplify_expr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Value {
    Const(i64),
    Unknown,
}

#[derive(Debug, Clone)]
struct Binding {
    value: Value,
    /// Index into the *output* statement vector currently being built, so a
    /// later dead-store check can reach back and blank the RHS.
    store_index: usize,
    was_read: bool,
    /// A `var_decl`'s storage slot is never eliminated even if its
    /// initializer goes unread (§4.I).
    is_var_decl: bool,
}

type Env = FxHashMap<String, Binding>;

/// Run O2 propagation over a single function's body (§2: O2 runs G,H,I,J,K).
pub fn run(function: &mut Function) {
    if let Some(body) = function.body.take() {
        function.body = Some(process_stmt(body));
    }
}

fn process_stmt(stmt: Stmt) -> Stmt {
    let line = stmt.line;
    match stmt.kind {
        StmtKind::Block(stmts) => Stmt::new(StmtKind::Block(process_block(stmts)), line),
        StmtKind::If { cond, then, els } => Stmt::new(
            StmtKind::If {
                cond,
                then: Box::new(process_stmt(*then)),
                els: els.map(|e| Box::new(process_stmt(*e))),
            },
            line,
        ),
        StmtKind::While { cond, body, vec_info } => {
            Stmt::new(StmtKind::While { cond, body: Box::new(process_stmt(*body)), vec_info }, line)
        }
        StmtKind::DoWhile { cond, body } => {
            Stmt::new(StmtKind::DoWhile { cond, body: Box::new(process_stmt(*body)) }, line)
        }
        StmtKind::For { init, cond, step, body, vec_info } => Stmt::new(
            StmtKind::For { init, cond, step, body: Box::new(process_stmt(*body)), vec_info },
            line,
        ),
        StmtKind::Switch { cond, body } => {
            Stmt::new(StmtKind::Switch { cond, body: Box::new(process_stmt(*body)) }, line)
        }
        other => Stmt::new(other, line),
    }
}

/// One forward sweep over a single block's direct statements (§4.I). Nested
/// blocks are processed independently by `process_stmt`'s recursion and do
/// not see this block's bindings beyond the single wholesale-invalidation
/// rule below.
fn process_block(stmts: Vec<Stmt>) -> Vec<Stmt> {
    let mut env: Env = Env::default();
    let mut out: Vec<Stmt> = Vec::with_capacity(stmts.len());

    for stmt in stmts {
        let line = stmt.line;
        match stmt.kind {
            StmtKind::VarDecl { name, ty, init, is_static, is_extern } => {
                let init = init.map(|e| substitute_and_fold(e, &env));
                record_store(&mut env, &name, init.as_ref(), out.len(), true);
                out.push(Stmt::new(
                    StmtKind::VarDecl { name, ty, init, is_static, is_extern },
                    line,
                ));
            }
            StmtKind::Expr(e) => {
                let e = substitute_and_fold(e, &env);
                mark_reads(&e, &mut env);
                if let ExprKind::Assign(lhs, rhs) = &e.kind {
                    if let ExprKind::Ident(name) = &lhs.kind {
                        kill_dead_store(&mut env, &mut out, name);
                        record_store(&mut env, name, Some(rhs), out.len(), false);
                        out.push(Stmt::new(StmtKind::Expr(e), line));
                        continue;
                    }
                }
                invalidate_side_effects(&e, &mut env);
                out.push(Stmt::new(StmtKind::Expr(e), line));
            }
            StmtKind::Return(e) => {
                let e = e.map(|e| substitute_and_fold(e, &env));
                if let Some(e) = &e {
                    mark_reads(e, &mut env);
                }
                env.clear();
                out.push(Stmt::new(StmtKind::Return(e), line));
            }
            StmtKind::If { cond, then, els } => {
                let cond = substitute_and_fold(cond, &env);
                mark_reads(&cond, &mut env);
                let then = Box::new(process_stmt(*then));
                let els = els.map(|e| Box::new(process_stmt(*e)));
                env.clear();
                out.push(Stmt::new(StmtKind::If { cond, then, els }, line));
            }
            StmtKind::While { cond, body, vec_info } => {
                // Loop conditions are never substituted (§4.I).
                let body = Box::new(process_stmt(*body));
                env.clear();
                out.push(Stmt::new(StmtKind::While { cond, body, vec_info }, line));
            }
            StmtKind::DoWhile { cond, body } => {
                let body = Box::new(process_stmt(*body));
                env.clear();
                out.push(Stmt::new(StmtKind::DoWhile { cond, body }, line));
            }
            StmtKind::For { init, cond, step, body, vec_info } => {
                let init = init.map(|s| Box::new(process_stmt(*s)));
                let body = Box::new(process_stmt(*body));
                env.clear();
                out.push(Stmt::new(StmtKind::For { init, cond, step, body, vec_info }, line));
            }
            StmtKind::Switch { cond, body } => {
                let cond = substitute_and_fold(cond, &env);
                mark_reads(&cond, &mut env);
                let body = Box::new(process_stmt(*body));
                env.clear();
                out.push(Stmt::new(StmtKind::Switch { cond, body }, line));
            }
            StmtKind::Block(inner) => {
                out.push(Stmt::new(StmtKind::Block(process_block(inner)), line));
                env.clear();
            }
            StmtKind::Case(v) => {
                env.clear();
                out.push(Stmt::new(StmtKind::Case(v), line));
            }
            StmtKind::Default => {
                env.clear();
                out.push(Stmt::new(StmtKind::Default, line));
            }
            StmtKind::Break => {
                env.clear();
                out.push(Stmt::new(StmtKind::Break, line));
            }
            StmtKind::Continue => {
                env.clear();
                out.push(Stmt::new(StmtKind::Continue, line));
            }
            StmtKind::Goto(label) => {
                env.clear();
                out.push(Stmt::new(StmtKind::Goto(label), line));
            }
            StmtKind::Label(label) => {
                env.clear();
                out.push(Stmt::new(StmtKind::Label(label), line));
            }
            StmtKind::Assert(e) => {
                let e = substitute_and_fold(e, &env);
                mark_reads(&e, &mut env);
                out.push(Stmt::new(StmtKind::Assert(e), line));
            }
        }
    }
    out
}

fn substitute_and_fold(expr: Expr, env: &Env) -> Expr {
    let consts: FxHashMap<String, i64> = env
        .iter()
        .filter_map(|(k, b)| match b.value {
            Value::Const(v) => Some((k.clone(), v)),
            Value::Unknown => None,
        })
        .collect();
    if consts.is_empty() {
        return simplify_expr(expr);
    }
    simplify_expr(crate::ast::substitute_exact(&expr, &consts))
}

/// Record that `value_expr` (already substituted/folded) was stored into
/// `name` at `store_index` in the output vector being built.
fn record_store(env: &mut Env, name: &str, value_expr: Option<&Expr>, store_index: usize, is_var_decl: bool) {
    let value = match value_expr.and_then(|e| e.as_integer()) {
        Some(v) => Value::Const(v),
        None => Value::Unknown,
    };
    env.insert(name.to_string(), Binding { value, store_index, was_read: false, is_var_decl });
}

/// If the previous store to `name` went unread and its RHS was pure, blank
/// it out in `out` (§4.I dead-store elimination). `var_decl`s are exempt.
fn kill_dead_store(env: &mut Env, out: &mut [Stmt], name: &str) {
    let Some(prev) = env.get(name) else {
        return;
    };
    if prev.was_read || prev.is_var_decl {
        return;
    }
    let Some(stmt) = out.get(prev.store_index) else {
        return;
    };
    let StmtKind::Expr(e) = &stmt.kind else {
        return;
    };
    let ExprKind::Assign(_, rhs) = &e.kind else {
        return;
    };
    if expr_is_pure(rhs) {
        log::trace!("o2: dropping dead store to `{name}` at line {}", stmt.line);
        out[prev.store_index] = Stmt::empty_block(stmt.line);
    }
}

/// Mark every identifier read by `expr` (i.e. every `Ident` not on the LHS
/// of a top-level `Assign`) as read in `env`.
fn mark_reads(expr: &Expr, env: &mut Env) {
    match &expr.kind {
        ExprKind::Ident(name) => {
            if let Some(b) = env.get_mut(name) {
                b.was_read = true;
            }
        }
        ExprKind::Unary(UnaryOp::AddrOf, inner) => {
            // `&x` both reads and invalidates x; invalidation happens in
            // `invalidate_side_effects`, reading is still tracked here.
            mark_reads(inner, env);
        }
        ExprKind::Binary(_, l, r) => {
            mark_reads(l, env);
            mark_reads(r, env);
        }
        ExprKind::Unary(_, e) => mark_reads(e, env),
        ExprKind::Cast(e, _) => mark_reads(e, env),
        ExprKind::Call(_, args) => args.iter().for_each(|a| mark_reads(a, env)),
        ExprKind::Index(a, i) => {
            mark_reads(a, env);
            mark_reads(i, env);
        }
        ExprKind::Member(o, _, _) => mark_reads(o, env),
        ExprKind::Assign(lhs, rhs) => {
            mark_reads(rhs, env);
            if !matches!(lhs.kind, ExprKind::Ident(_)) {
                mark_reads(lhs, env);
            }
        }
        ExprKind::Ternary(c, t, e) => {
            mark_reads(c, env);
            mark_reads(t, env);
            mark_reads(e, env);
        }
        ExprKind::Integer(_) | ExprKind::Float(_) | ExprKind::Str(_) => {}
    }
}

/// Calls invalidate every binding (conservative alias model); `&x` invalidates
/// just `x` (§4.I).
fn invalidate_side_effects(expr: &Expr, env: &mut Env) {
    match &expr.kind {
        ExprKind::Call(_, args) => {
            env.clear();
            args.iter().for_each(|a| invalidate_side_effects(a, env));
        }
        ExprKind::Unary(UnaryOp::AddrOf, inner) => {
            if let ExprKind::Ident(name) = &inner.kind {
                env.remove(name);
            }
        }
        ExprKind::Binary(_, l, r) => {
            invalidate_side_effects(l, env);
            invalidate_side_effects(r, env);
        }
        ExprKind::Unary(_, e) | ExprKind::Cast(e, _) => invalidate_side_effects(e, env),
        ExprKind::Index(a, i) => {
            invalidate_side_effects(a, env);
            invalidate_side_effects(i, env);
        }
        ExprKind::Member(o, _, _) => invalidate_side_effects(o, env),
        ExprKind::Assign(lhs, rhs) => {
            invalidate_side_effects(lhs, env);
            invalidate_side_effects(rhs, env);
        }
        ExprKind::Ternary(c, t, e) => {
            invalidate_side_effects(c, env);
            invalidate_side_effects(t, env);
            invalidate_side_effects(e, env);
        }
        ExprKind::Ident(_) | ExprKind::Integer(_) | ExprKind::Float(_) | ExprKind::Str(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::TokenOp;

    fn ident(name: &str) -> Expr {
        Expr::new(ExprKind::Ident(name.to_string()), 0)
    }

    fn int(v: i64) -> Expr {
        Expr::new(ExprKind::Integer(v), 0)
    }

    fn assign(name: &str, rhs: Expr) -> Stmt {
        Stmt::new(StmtKind::Expr(Expr::new(ExprKind::Assign(Box::new(ident(name)), Box::new(rhs)), 0)), 0)
    }

    #[test]
    fn constant_propagates_into_return() {
        let block = vec![
            assign("x", int(5)),
            Stmt::new(
                StmtKind::Return(Some(Expr::new(
                    ExprKind::Binary(TokenOp::Add, Box::new(ident("x")), Box::new(int(1))),
                    0,
                ))),
                0,
            ),
        ];
        let out = process_block(block);
        let StmtKind::Return(Some(e)) = &out[1].kind else {
            panic!("expected return");
        };
        assert_eq!(e.as_integer(), Some(6));
    }

    #[test]
    fn dead_store_with_pure_rhs_is_dropped() {
        let block = vec![assign("x", int(1)), assign("x", int(2)), Stmt::new(StmtKind::Return(Some(ident("x"))), 0)];
        let out = process_block(block);
        assert!(matches!(&out[0].kind, StmtKind::Block(b) if b.is_empty()));
    }

    #[test]
    fn store_read_before_overwrite_is_kept() {
        let block = vec![
            assign("x", int(1)),
            Stmt::new(StmtKind::Expr(Expr::new(ExprKind::Call("use".to_string(), vec![ident("x")]), 0)), 0),
            assign("x", int(2)),
        ];
        let out = process_block(block);
        assert!(matches!(&out[0].kind, StmtKind::Expr(_)));
    }

    #[test]
    fn var_decl_store_is_never_eliminated() {
        let block = vec![
            Stmt::new(
                StmtKind::VarDecl { name: "x".to_string(), ty: None, init: Some(int(1)), is_static: false, is_extern: false },
                0,
            ),
            assign("x", int(2)),
        ];
        let out = process_block(block);
        assert!(matches!(&out[0].kind, StmtKind::VarDecl { .. }));
    }

    #[test]
    fn call_invalidates_all_bindings() {
        let block = vec![
            assign("x", int(1)),
            Stmt::new(StmtKind::Expr(Expr::new(ExprKind::Call("f".to_string(), vec![]), 0)), 0),
            Stmt::new(StmtKind::Return(Some(ident("x"))), 0),
        ];
        let out = process_block(block);
        let StmtKind::Return(Some(e)) = &out[2].kind else {
            panic!("expected return");
        };
        assert!(matches!(e.kind, ExprKind::Ident(_)));
    }

    #[test]
    fn loop_condition_is_not_substituted() {
        let block = vec![
            assign("n", int(3)),
            Stmt::new(
                StmtKind::While {
                    cond: Expr::new(ExprKind::Binary(TokenOp::Lt, Box::new(ident("n")), Box::new(int(10))), 0),
                    body: Box::new(Stmt::empty_block(0)),
                    vec_info: None,
                },
                0,
            ),
        ];
        let out = process_block(block);
        let StmtKind::While { cond, .. } = &out[1].kind else {
            panic!("expected while");
        };
        assert!(matches!(cond.kind, ExprKind::Binary(TokenOp::Lt, _, _)));
    }
}
