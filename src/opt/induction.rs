//! Component K: induction-variable strength reduction (§4.K).
//!
//! For a `while`/`for` loop whose body contains `var * CONST` for a loop
//! variable with a constant preceding initialization, an identified step,
//! and a linear increment `i = i + STEP`, a fresh induction variable
//! `_ivK = init * CONST` replaces every `i * CONST` in the body, and
//! `_ivK = _ivK + STEP*CONST` is appended adjacent to the loop's increment.
//! Each distinct `CONST` multiplier of the loop variable gets its own IV.
//!
//! `for`'s increment lives in a dedicated single-expression `step` slot that
//! cannot host a second statement, so for `for`-loops the IV update is
//! appended at the end of the body instead (independent of `step`'s own
//! update, so the ordering does not change its value). For `while`-loops the
//! increment is an ordinary body statement, so the update is spliced
//! immediately after it, matching the spec text literally.

use crate::ast::{Expr, ExprKind, Function, Stmt, StmtKind, TokenOp, UnaryOp};

pub fn run(function: &mut Function) {
    if let Some(body) = function.body.take() {
        function.body = Some(process_nested(body));
    }
}

fn process_nested(stmt: Stmt) -> Stmt {
    if let StmtKind::Block(inner) = stmt.kind {
        Stmt::new(StmtKind::Block(process_block(inner)), stmt.line)
    } else {
        let mut wrapped = process_block(vec![stmt]);
        wrapped.pop().expect("process_block preserves length for a singleton input")
    }
}

fn process_block(stmts: Vec<Stmt>) -> Vec<Stmt> {
    let mut out: Vec<Stmt> = Vec::with_capacity(stmts.len());
    let mut last_const: Option<(String, i64)> = None;
    for stmt in stmts {
        let line = stmt.line;
        match stmt.kind {
            StmtKind::VarDecl { name, ty, init, is_static, is_extern } => {
                last_const = init.as_ref().and_then(|e| e.as_integer()).map(|v| (name.clone(), v));
                out.push(Stmt::new(StmtKind::VarDecl { name, ty, init, is_static, is_extern }, line));
            }
            StmtKind::Expr(e) => {
                last_const = assign_const(&e);
                out.push(Stmt::new(StmtKind::Expr(e), line));
            }
            StmtKind::For { init, cond, step, body, vec_info } => {
                let ivs = for_loop_var_and_step(&init, &step);
                let mut new_body = process_nested(*body);
                let mut prefix = Vec::new();
                if let Some((loop_var, init_val, step_val)) = ivs {
                    let StmtKind::Block(body_stmts) = &new_body.kind else {
                        out.push(Stmt::new(StmtKind::For { init, cond, step, body: Box::new(new_body), vec_info }, line));
                        last_const = None;
                        continue;
                    };
                    let mut multipliers = Vec::new();
                    for s in body_stmts {
                        collect_multipliers_stmt(s, &loop_var, &mut multipliers);
                    }
                    multipliers.sort_unstable();
                    multipliers.dedup();
                    let mut body_stmts = body_stmts.clone();
                    for k in multipliers {
                        let iv_name = iv_name(&loop_var, k);
                        body_stmts = body_stmts
                            .into_iter()
                            .map(|s| replace_multiplier_stmt(s, &loop_var, k, &iv_name))
                            .collect();
                        body_stmts.push(iv_update_stmt(&iv_name, step_val, k, line));
                        prefix.push(iv_init_stmt(&iv_name, init_val, k, line));
                    }
                    new_body = Stmt::new(StmtKind::Block(body_stmts), new_body.line);
                }
                out.extend(prefix);
                out.push(Stmt::new(StmtKind::For { init, cond, step, body: Box::new(new_body), vec_info }, line));
                last_const = None;
            }
            StmtKind::While { cond, body, vec_info } => {
                let mut new_body = process_nested(*body);
                let mut prefix = Vec::new();
                if let Some((loop_var, init_val)) = last_const.clone() {
                    if let StmtKind::Block(body_stmts) = new_body.kind {
                        if let Some(step_idx) = body_stmts
                            .iter()
                            .position(|s| linear_increment_stmt(s, &loop_var).is_some())
                        {
                            let step_val = linear_increment_stmt(&body_stmts[step_idx], &loop_var).unwrap();
                            let mut multipliers = Vec::new();
                            for s in &body_stmts {
                                collect_multipliers_stmt(s, &loop_var, &mut multipliers);
                            }
                            multipliers.sort_unstable();
                            multipliers.dedup();
                            let mut body_stmts = body_stmts;
                            for k in multipliers {
                                let iv_name = iv_name(&loop_var, k);
                                body_stmts = body_stmts
                                    .into_iter()
                                    .map(|s| replace_multiplier_stmt(s, &loop_var, k, &iv_name))
                                    .collect();
                                let insert_at = step_idx + 1;
                                body_stmts.insert(insert_at, iv_update_stmt(&iv_name, step_val, k, line));
                                prefix.push(iv_init_stmt(&iv_name, init_val, k, line));
                            }
                            new_body = Stmt::new(StmtKind::Block(body_stmts), line);
                        } else {
                            new_body = Stmt::new(StmtKind::Block(body_stmts), line);
                        }
                    } else {
                        new_body = Stmt::new(new_body.kind, new_body.line);
                    }
                }
                out.extend(prefix);
                out.push(Stmt::new(StmtKind::While { cond, body: Box::new(new_body), vec_info }, line));
                last_const = None;
            }
            other => {
                out.push(process_generic(Stmt::new(other, line)));
                last_const = None;
            }
        }
    }
    out
}

/// Recurse into every other statement shape's nested bodies without looking
/// for induction opportunities at this level (the loop detection above only
/// fires directly on a `for`/`while` node).
fn process_generic(stmt: Stmt) -> Stmt {
    let line = stmt.line;
    let kind = match stmt.kind {
        StmtKind::If { cond, then, els } => StmtKind::If {
            cond,
            then: Box::new(process_nested(*then)),
            els: els.map(|e| Box::new(process_nested(*e))),
        },
        StmtKind::DoWhile { cond, body } => StmtKind::DoWhile { cond, body: Box::new(process_nested(*body)) },
        StmtKind::Switch { cond, body } => StmtKind::Switch { cond, body: Box::new(process_nested(*body)) },
        StmtKind::Block(stmts) => StmtKind::Block(process_block(stmts)),
        other => other,
    };
    Stmt::new(kind, line)
}

fn iv_name(loop_var: &str, k: i64) -> String {
    format!("_iv_{loop_var}_{k}")
}

fn iv_init_stmt(iv_name: &str, init_val: i64, k: i64, line: u32) -> Stmt {
    let value = init_val.wrapping_mul(k);
    Stmt::new(
        StmtKind::VarDecl {
            name: iv_name.to_string(),
            ty: None,
            init: Some(Expr::new(ExprKind::Integer(value), line)),
            is_static: false,
            is_extern: false,
        },
        line,
    )
}

fn iv_update_stmt(iv_name: &str, step_val: i64, k: i64, line: u32) -> Stmt {
    let delta = step_val.wrapping_mul(k);
    let rhs = Expr::new(
        ExprKind::Binary(
            TokenOp::Add,
            Box::new(Expr::new(ExprKind::Ident(iv_name.to_string()), line)),
            Box::new(Expr::new(ExprKind::Integer(delta), line)),
        ),
        line,
    );
    Stmt::new(
        StmtKind::Expr(Expr::new(
            ExprKind::Assign(Box::new(Expr::new(ExprKind::Ident(iv_name.to_string()), line)), Box::new(rhs)),
            line,
        )),
        line,
    )
}

fn assign_const(e: &Expr) -> Option<(String, i64)> {
    if let ExprKind::Assign(lhs, rhs) = &e.kind {
        if let ExprKind::Ident(name) = &lhs.kind {
            return rhs.as_integer().map(|v| (name.clone(), v));
        }
    }
    None
}

/// `for`'s own `init`/`step` fields directly name the loop variable, its
/// constant initial value, and its per-iteration step.
fn for_loop_var_and_step(init: &Option<Box<Stmt>>, step: &Option<Expr>) -> Option<(String, i64, i64)> {
    let (name, init_val) = match init.as_deref().map(|s| &s.kind) {
        Some(StmtKind::VarDecl { name, init: Some(e), .. }) => (name.clone(), e.as_integer()?),
        Some(StmtKind::Expr(e)) => assign_const(e)?,
        _ => return None,
    };
    let step_val = step.as_ref().and_then(|e| linear_increment(e, &name))?;
    Some((name, init_val, step_val))
}

/// Recognizes `i = i + STEP` (either operand order) or `i++`/`++i` for `name`.
fn linear_increment(e: &Expr, name: &str) -> Option<i64> {
    if let ExprKind::Assign(lhs, rhs) = &e.kind {
        if matches!(&lhs.kind, ExprKind::Ident(n) if n == name) {
            if let ExprKind::Binary(TokenOp::Add, l, r) = &rhs.kind {
                if matches!(&l.kind, ExprKind::Ident(n) if n == name) {
                    return r.as_integer();
                }
                if matches!(&r.kind, ExprKind::Ident(n) if n == name) {
                    return l.as_integer();
                }
            }
        }
    }
    if let ExprKind::Unary(op, inner) = &e.kind {
        if matches!(&inner.kind, ExprKind::Ident(n) if n == name)
            && matches!(op, UnaryOp::PreInc | UnaryOp::PostInc)
        {
            return Some(1);
        }
    }
    None
}

fn linear_increment_stmt(stmt: &Stmt, name: &str) -> Option<i64> {
    match &stmt.kind {
        StmtKind::Expr(e) => linear_increment(e, name),
        _ => None,
    }
}

fn is_loop_var_times_k(expr: &Expr, loop_var: &str, k: i64) -> bool {
    let ExprKind::Binary(TokenOp::Mul, l, r) = &expr.kind else {
        return false;
    };
    matches!((&l.kind, r.as_integer()), (ExprKind::Ident(n), Some(kk)) if n == loop_var && kk == k)
        || matches!((l.as_integer(), &r.kind), (Some(kk), ExprKind::Ident(n)) if n == loop_var && kk == k)
}

fn collect_multipliers_expr(expr: &Expr, loop_var: &str, out: &mut Vec<i64>) {
    if let ExprKind::Binary(TokenOp::Mul, l, r) = &expr.kind {
        if let (ExprKind::Ident(n), Some(k)) = (&l.kind, r.as_integer()) {
            if n == loop_var {
                out.push(k);
            }
        }
        if let (Some(k), ExprKind::Ident(n)) = (l.as_integer(), &r.kind) {
            if n == loop_var {
                out.push(k);
            }
        }
    }
    match &expr.kind {
        ExprKind::Binary(_, l, r) => {
            collect_multipliers_expr(l, loop_var, out);
            collect_multipliers_expr(r, loop_var, out);
        }
        ExprKind::Unary(_, e) | ExprKind::Cast(e, _) => collect_multipliers_expr(e, loop_var, out),
        ExprKind::Call(_, args) => args.iter().for_each(|a| collect_multipliers_expr(a, loop_var, out)),
        ExprKind::Index(a, i) => {
            collect_multipliers_expr(a, loop_var, out);
            collect_multipliers_expr(i, loop_var, out);
        }
        ExprKind::Member(o, _, _) => collect_multipliers_expr(o, loop_var, out),
        ExprKind::Assign(l, r) => {
            collect_multipliers_expr(l, loop_var, out);
            collect_multipliers_expr(r, loop_var, out);
        }
        ExprKind::Ternary(c, t, e) => {
            collect_multipliers_expr(c, loop_var, out);
            collect_multipliers_expr(t, loop_var, out);
            collect_multipliers_expr(e, loop_var, out);
        }
        ExprKind::Integer(_) | ExprKind::Float(_) | ExprKind::Str(_) | ExprKind::Ident(_) => {}
    }
}

fn collect_multipliers_stmt(stmt: &Stmt, loop_var: &str, out: &mut Vec<i64>) {
    match &stmt.kind {
        StmtKind::Expr(e) => collect_multipliers_expr(e, loop_var, out),
        StmtKind::VarDecl { init: Some(e), .. } => collect_multipliers_expr(e, loop_var, out),
        StmtKind::VarDecl { init: None, .. } => {}
        StmtKind::If { cond, then, els } => {
            collect_multipliers_expr(cond, loop_var, out);
            collect_multipliers_stmt(then, loop_var, out);
            if let Some(e) = els {
                collect_multipliers_stmt(e, loop_var, out);
            }
        }
        StmtKind::While { cond, body, .. } => {
            collect_multipliers_expr(cond, loop_var, out);
            collect_multipliers_stmt(body, loop_var, out);
        }
        StmtKind::DoWhile { cond, body } => {
            collect_multipliers_expr(cond, loop_var, out);
            collect_multipliers_stmt(body, loop_var, out);
        }
        StmtKind::For { init, cond, step, body, .. } => {
            if let Some(i) = init {
                collect_multipliers_stmt(i, loop_var, out);
            }
            if let Some(c) = cond {
                collect_multipliers_expr(c, loop_var, out);
            }
            if let Some(s) = step {
                collect_multipliers_expr(s, loop_var, out);
            }
            collect_multipliers_stmt(body, loop_var, out);
        }
        StmtKind::Switch { cond, body } => {
            collect_multipliers_expr(cond, loop_var, out);
            collect_multipliers_stmt(body, loop_var, out);
        }
        StmtKind::Return(Some(e)) => collect_multipliers_expr(e, loop_var, out),
        StmtKind::Return(None) => {}
        StmtKind::Block(stmts) => stmts.iter().for_each(|s| collect_multipliers_stmt(s, loop_var, out)),
        StmtKind::Assert(e) => collect_multipliers_expr(e, loop_var, out),
        StmtKind::Case(_)
        | StmtKind::Default
        | StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Goto(_)
        | StmtKind::Label(_) => {}
    }
}

fn replace_multiplier_expr(expr: Expr, loop_var: &str, k: i64, iv: &str) -> Expr {
    if is_loop_var_times_k(&expr, loop_var, k) {
        return Expr::new(ExprKind::Ident(iv.to_string()), expr.line);
    }
    let line = expr.line;
    let ty = expr.ty.clone();
    let kind = match expr.kind {
        ExprKind::Binary(op, l, r) => ExprKind::Binary(
            op,
            Box::new(replace_multiplier_expr(*l, loop_var, k, iv)),
            Box::new(replace_multiplier_expr(*r, loop_var, k, iv)),
        ),
        ExprKind::Unary(op, e) => ExprKind::Unary(op, Box::new(replace_multiplier_expr(*e, loop_var, k, iv))),
        ExprKind::Cast(e, cty) => ExprKind::Cast(Box::new(replace_multiplier_expr(*e, loop_var, k, iv)), cty),
        ExprKind::Call(name, args) => {
            ExprKind::Call(name, args.into_iter().map(|a| replace_multiplier_expr(a, loop_var, k, iv)).collect())
        }
        ExprKind::Index(a, i) => ExprKind::Index(
            Box::new(replace_multiplier_expr(*a, loop_var, k, iv)),
            Box::new(replace_multiplier_expr(*i, loop_var, k, iv)),
        ),
        ExprKind::Member(o, name, is_arrow) => {
            ExprKind::Member(Box::new(replace_multiplier_expr(*o, loop_var, k, iv)), name, is_arrow)
        }
        ExprKind::Assign(l, r) => ExprKind::Assign(
            Box::new(replace_multiplier_expr(*l, loop_var, k, iv)),
            Box::new(replace_multiplier_expr(*r, loop_var, k, iv)),
        ),
        ExprKind::Ternary(c, t, e) => ExprKind::Ternary(
            Box::new(replace_multiplier_expr(*c, loop_var, k, iv)),
            Box::new(replace_multiplier_expr(*t, loop_var, k, iv)),
            Box::new(replace_multiplier_expr(*e, loop_var, k, iv)),
        ),
        literal => literal,
    };
    Expr { kind, line, ty }
}

fn replace_multiplier_stmt(stmt: Stmt, loop_var: &str, k: i64, iv: &str) -> Stmt {
    let line = stmt.line;
    let kind = match stmt.kind {
        StmtKind::Expr(e) => StmtKind::Expr(replace_multiplier_expr(e, loop_var, k, iv)),
        StmtKind::VarDecl { name, ty, init, is_static, is_extern } => StmtKind::VarDecl {
            name,
            ty,
            init: init.map(|e| replace_multiplier_expr(e, loop_var, k, iv)),
            is_static,
            is_extern,
        },
        StmtKind::If { cond, then, els } => StmtKind::If {
            cond: replace_multiplier_expr(cond, loop_var, k, iv),
            then: Box::new(replace_multiplier_stmt(*then, loop_var, k, iv)),
            els: els.map(|e| Box::new(replace_multiplier_stmt(*e, loop_var, k, iv))),
        },
        StmtKind::While { cond, body, vec_info } => StmtKind::While {
            cond: replace_multiplier_expr(cond, loop_var, k, iv),
            body: Box::new(replace_multiplier_stmt(*body, loop_var, k, iv)),
            vec_info,
        },
        StmtKind::DoWhile { cond, body } => StmtKind::DoWhile {
            cond: replace_multiplier_expr(cond, loop_var, k, iv),
            body: Box::new(replace_multiplier_stmt(*body, loop_var, k, iv)),
        },
        StmtKind::For { init, cond, step, body, vec_info } => StmtKind::For {
            init: init.map(|s| Box::new(replace_multiplier_stmt(*s, loop_var, k, iv))),
            cond: cond.map(|e| replace_multiplier_expr(e, loop_var, k, iv)),
            step: step.map(|e| replace_multiplier_expr(e, loop_var, k, iv)),
            body: Box::new(replace_multiplier_stmt(*body, loop_var, k, iv)),
            vec_info,
        },
        StmtKind::Switch { cond, body } => StmtKind::Switch {
            cond: replace_multiplier_expr(cond, loop_var, k, iv),
            body: Box::new(replace_multiplier_stmt(*body, loop_var, k, iv)),
        },
        StmtKind::Return(e) => StmtKind::Return(e.map(|e| replace_multiplier_expr(e, loop_var, k, iv))),
        StmtKind::Block(stmts) => {
            StmtKind::Block(stmts.into_iter().map(|s| replace_multiplier_stmt(s, loop_var, k, iv)).collect())
        }
        StmtKind::Assert(e) => StmtKind::Assert(replace_multiplier_expr(e, loop_var, k, iv)),
        passthrough @ (StmtKind::Case(_)
        | StmtKind::Default
        | StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Goto(_)
        | StmtKind::Label(_)) => passthrough,
    };
    Stmt::new(kind, line)
}
