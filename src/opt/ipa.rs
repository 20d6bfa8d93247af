//! Component O: the interprocedural suite (§4.O).
//!
//! Runs once at O3, after unrolling and within-function cleanup:
//!
//! 1. **Return-value propagation**: a function whose body is a single
//!    `return K;` (integer `K`, so no control flow) has every call to it,
//!    with pure arguments, replaced by `K`.
//! 2. **IPA constant propagation**: for each static (non-`main`) function,
//!    a parameter always passed the same integer constant across every call
//!    site is substituted by it in the body.
//! 3. **Dead-argument elimination**: an unused parameter of a static
//!    function is dropped from the declaration and every call site, right
//!    to left so earlier indices stay valid.
//! 4. **Dead-function elimination**: static functions with zero remaining
//!    call sites are removed, iterated to a fixpoint (removing one dead
//!    function can make its sole remaining caller's only other callee
//!    dead too).
//!
//! A final O1+O2 pass runs over every surviving function afterwards.

use crate::ast::{expr_is_pure, substitute_exact, Expr, ExprKind, Function, Program, Stmt, StmtKind};
use crate::fx::{FxHashMap, FxHashSet};
use crate::opt::{inline_simple, induction, o1, propagate, range};

pub fn run(program: &mut Program) {
    propagate_return_values(program);
    propagate_constant_params(program);
    eliminate_dead_arguments(program);
    eliminate_dead_functions(program);
    final_cleanup(program);
}

// ---- return-value propagation -----------------------------------------

fn find_return_value_candidates(program: &Program) -> FxHashMap<String, i64> {
    let mut out = FxHashMap::default();
    for f in &program.functions {
        let Some(body) = &f.body else { continue };
        let StmtKind::Block(stmts) = &body.kind else { continue };
        let [only] = stmts.as_slice() else { continue };
        let StmtKind::Return(Some(e)) = &only.kind else { continue };
        if let Some(k) = e.as_integer() {
            out.insert(f.name.clone(), k);
        }
    }
    out
}

fn propagate_return_values(program: &mut Program) {
    let candidates = find_return_value_candidates(program);
    if candidates.is_empty() {
        return;
    }
    for f in &mut program.functions {
        if let Some(body) = f.body.take() {
            f.body = Some(fold_return_calls_stmt(body, &candidates));
        }
    }
}

fn fold_return_calls_expr(expr: Expr, candidates: &FxHashMap<String, i64>) -> Expr {
    let line = expr.line;
    let ty = expr.ty.clone();
    match expr.kind {
        ExprKind::Call(name, args) => {
            let args: Vec<Expr> = args.into_iter().map(|a| fold_return_calls_expr(a, candidates)).collect();
            if let Some(&k) = candidates.get(&name) {
                if args.iter().all(expr_is_pure) {
                    log::trace!("ipa: folding call to {name} at line {line} to constant {k}");
                    return Expr { kind: ExprKind::Integer(k), line, ty };
                }
            }
            Expr { kind: ExprKind::Call(name, args), line, ty }
        }
        ExprKind::Binary(op, l, r) => Expr {
            kind: ExprKind::Binary(
                op,
                Box::new(fold_return_calls_expr(*l, candidates)),
                Box::new(fold_return_calls_expr(*r, candidates)),
            ),
            line,
            ty,
        },
        ExprKind::Unary(op, e) => {
            Expr { kind: ExprKind::Unary(op, Box::new(fold_return_calls_expr(*e, candidates))), line, ty }
        }
        ExprKind::Cast(e, cty) => Expr { kind: ExprKind::Cast(Box::new(fold_return_calls_expr(*e, candidates)), cty), line, ty },
        ExprKind::Index(a, i) => Expr {
            kind: ExprKind::Index(
                Box::new(fold_return_calls_expr(*a, candidates)),
                Box::new(fold_return_calls_expr(*i, candidates)),
            ),
            line,
            ty,
        },
        ExprKind::Member(o, name, is_arrow) => {
            Expr { kind: ExprKind::Member(Box::new(fold_return_calls_expr(*o, candidates)), name, is_arrow), line, ty }
        }
        ExprKind::Assign(l, r) => Expr {
            kind: ExprKind::Assign(
                Box::new(fold_return_calls_expr(*l, candidates)),
                Box::new(fold_return_calls_expr(*r, candidates)),
            ),
            line,
            ty,
        },
        ExprKind::Ternary(c, t, e) => Expr {
            kind: ExprKind::Ternary(
                Box::new(fold_return_calls_expr(*c, candidates)),
                Box::new(fold_return_calls_expr(*t, candidates)),
                Box::new(fold_return_calls_expr(*e, candidates)),
            ),
            line,
            ty,
        },
        literal @ (ExprKind::Integer(_) | ExprKind::Float(_) | ExprKind::Str(_) | ExprKind::Ident(_)) => {
            Expr { kind: literal, line, ty }
        }
    }
}

fn fold_return_calls_stmt(stmt: Stmt, candidates: &FxHashMap<String, i64>) -> Stmt {
    let line = stmt.line;
    let kind = match stmt.kind {
        StmtKind::Expr(e) => StmtKind::Expr(fold_return_calls_expr(e, candidates)),
        StmtKind::VarDecl { name, ty, init, is_static, is_extern } => StmtKind::VarDecl {
            name,
            ty,
            init: init.map(|e| fold_return_calls_expr(e, candidates)),
            is_static,
            is_extern,
        },
        StmtKind::If { cond, then, els } => StmtKind::If {
            cond: fold_return_calls_expr(cond, candidates),
            then: Box::new(fold_return_calls_stmt(*then, candidates)),
            els: els.map(|e| Box::new(fold_return_calls_stmt(*e, candidates))),
        },
        StmtKind::While { cond, body, vec_info } => StmtKind::While {
            cond: fold_return_calls_expr(cond, candidates),
            body: Box::new(fold_return_calls_stmt(*body, candidates)),
            vec_info,
        },
        StmtKind::DoWhile { cond, body } => StmtKind::DoWhile {
            cond: fold_return_calls_expr(cond, candidates),
            body: Box::new(fold_return_calls_stmt(*body, candidates)),
        },
        StmtKind::For { init, cond, step, body, vec_info } => StmtKind::For {
            init: init.map(|s| Box::new(fold_return_calls_stmt(*s, candidates))),
            cond: cond.map(|e| fold_return_calls_expr(e, candidates)),
            step: step.map(|e| fold_return_calls_expr(e, candidates)),
            body: Box::new(fold_return_calls_stmt(*body, candidates)),
            vec_info,
        },
        StmtKind::Switch { cond, body } => StmtKind::Switch {
            cond: fold_return_calls_expr(cond, candidates),
            body: Box::new(fold_return_calls_stmt(*body, candidates)),
        },
        StmtKind::Return(e) => StmtKind::Return(e.map(|e| fold_return_calls_expr(e, candidates))),
        StmtKind::Block(stmts) => {
            StmtKind::Block(stmts.into_iter().map(|s| fold_return_calls_stmt(s, candidates)).collect())
        }
        StmtKind::Assert(e) => StmtKind::Assert(fold_return_calls_expr(e, candidates)),
        passthrough @ (StmtKind::Case(_)
        | StmtKind::Default
        | StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Goto(_)
        | StmtKind::Label(_)) => passthrough,
    };
    Stmt::new(kind, line)
}

// ---- IPA constant propagation ------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArgObservation {
    Unseen,
    Constant(i64),
    Varying,
}

fn collect_observations(program: &Program) -> FxHashMap<String, Vec<ArgObservation>> {
    let mut obs: FxHashMap<String, Vec<ArgObservation>> = program
        .functions
        .iter()
        .filter(|f| f.is_static && f.name != "main")
        .map(|f| (f.name.clone(), vec![ArgObservation::Unseen; f.params.len()]))
        .collect();
    for f in &program.functions {
        if let Some(body) = &f.body {
            observe_calls_stmt(body, &mut obs);
        }
    }
    obs
}

fn observe_calls_expr(expr: &Expr, obs: &mut FxHashMap<String, Vec<ArgObservation>>) {
    if let ExprKind::Call(name, args) = &expr.kind {
        if let Some(positions) = obs.get_mut(name) {
            for (i, pos) in positions.iter_mut().enumerate() {
                let value = args.get(i).and_then(Expr::as_integer);
                *pos = match (*pos, value) {
                    (ArgObservation::Unseen, Some(v)) => ArgObservation::Constant(v),
                    (ArgObservation::Unseen, None) => ArgObservation::Varying,
                    (ArgObservation::Constant(existing), Some(v)) if existing == v => ArgObservation::Constant(v),
                    _ => ArgObservation::Varying,
                };
            }
        }
    }
    match &expr.kind {
        ExprKind::Call(_, args) => args.iter().for_each(|a| observe_calls_expr(a, obs)),
        ExprKind::Binary(_, l, r) | ExprKind::Assign(l, r) => {
            observe_calls_expr(l, obs);
            observe_calls_expr(r, obs);
        }
        ExprKind::Unary(_, e) | ExprKind::Cast(e, _) => observe_calls_expr(e, obs),
        ExprKind::Index(a, i) => {
            observe_calls_expr(a, obs);
            observe_calls_expr(i, obs);
        }
        ExprKind::Member(o, _, _) => observe_calls_expr(o, obs),
        ExprKind::Ternary(c, t, e) => {
            observe_calls_expr(c, obs);
            observe_calls_expr(t, obs);
            observe_calls_expr(e, obs);
        }
        ExprKind::Integer(_) | ExprKind::Float(_) | ExprKind::Str(_) | ExprKind::Ident(_) => {}
    }
}

fn observe_calls_stmt(stmt: &Stmt, obs: &mut FxHashMap<String, Vec<ArgObservation>>) {
    match &stmt.kind {
        StmtKind::Expr(e) => observe_calls_expr(e, obs),
        StmtKind::VarDecl { init: Some(e), .. } => observe_calls_expr(e, obs),
        StmtKind::VarDecl { init: None, .. } => {}
        StmtKind::If { cond, then, els } => {
            observe_calls_expr(cond, obs);
            observe_calls_stmt(then, obs);
            if let Some(e) = els {
                observe_calls_stmt(e, obs);
            }
        }
        StmtKind::While { cond, body, .. } | StmtKind::DoWhile { cond, body } => {
            observe_calls_expr(cond, obs);
            observe_calls_stmt(body, obs);
        }
        StmtKind::For { init, cond, step, body, .. } => {
            if let Some(i) = init {
                observe_calls_stmt(i, obs);
            }
            if let Some(c) = cond {
                observe_calls_expr(c, obs);
            }
            if let Some(s) = step {
                observe_calls_expr(s, obs);
            }
            observe_calls_stmt(body, obs);
        }
        StmtKind::Switch { cond, body } => {
            observe_calls_expr(cond, obs);
            observe_calls_stmt(body, obs);
        }
        StmtKind::Return(Some(e)) => observe_calls_expr(e, obs),
        StmtKind::Return(None) => {}
        StmtKind::Block(stmts) => stmts.iter().for_each(|s| observe_calls_stmt(s, obs)),
        StmtKind::Assert(e) => observe_calls_expr(e, obs),
        StmtKind::Case(_)
        | StmtKind::Default
        | StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Goto(_)
        | StmtKind::Label(_) => {}
    }
}

fn propagate_constant_params(program: &mut Program) {
    let observations = collect_observations(program);
    let mut substitutions: FxHashMap<String, FxHashMap<String, i64>> = FxHashMap::default();
    for f in &program.functions {
        if !f.is_static || f.name == "main" {
            continue;
        }
        let Some(positions) = observations.get(&f.name) else { continue };
        let mut env = FxHashMap::default();
        for (param, observation) in f.params.iter().zip(positions.iter()) {
            if let ArgObservation::Constant(v) = observation {
                env.insert(param.name.clone(), *v);
            }
        }
        if !env.is_empty() {
            substitutions.insert(f.name.clone(), env);
        }
    }
    if substitutions.is_empty() {
        return;
    }
    for f in &mut program.functions {
        if let Some(env) = substitutions.get(&f.name) {
            if let Some(body) = f.body.take() {
                log::debug!("ipa: substituting constant parameters in {}", f.name);
                f.body = Some(o1::simplify_stmt(substitute_exact_stmt(body, env)));
            }
        }
    }
}

/// Mirrors `rename_locals_stmt`'s structure, applying `substitute_exact` at
/// every expression site instead of a rename map.
fn substitute_exact_stmt(stmt: Stmt, env: &FxHashMap<String, i64>) -> Stmt {
    let line = stmt.line;
    let kind = match stmt.kind {
        StmtKind::Expr(e) => StmtKind::Expr(substitute_exact(&e, env)),
        StmtKind::VarDecl { name, ty, init, is_static, is_extern } => StmtKind::VarDecl {
            name,
            ty,
            init: init.map(|e| substitute_exact(&e, env)),
            is_static,
            is_extern,
        },
        StmtKind::If { cond, then, els } => StmtKind::If {
            cond: substitute_exact(&cond, env),
            then: Box::new(substitute_exact_stmt(*then, env)),
            els: els.map(|e| Box::new(substitute_exact_stmt(*e, env))),
        },
        StmtKind::While { cond, body, vec_info } => StmtKind::While {
            cond: substitute_exact(&cond, env),
            body: Box::new(substitute_exact_stmt(*body, env)),
            vec_info,
        },
        StmtKind::DoWhile { cond, body } => {
            StmtKind::DoWhile { cond: substitute_exact(&cond, env), body: Box::new(substitute_exact_stmt(*body, env)) }
        }
        StmtKind::For { init, cond, step, body, vec_info } => StmtKind::For {
            init: init.map(|s| Box::new(substitute_exact_stmt(*s, env))),
            cond: cond.map(|e| substitute_exact(&e, env)),
            step: step.map(|e| substitute_exact(&e, env)),
            body: Box::new(substitute_exact_stmt(*body, env)),
            vec_info,
        },
        StmtKind::Switch { cond, body } => {
            StmtKind::Switch { cond: substitute_exact(&cond, env), body: Box::new(substitute_exact_stmt(*body, env)) }
        }
        StmtKind::Return(e) => StmtKind::Return(e.map(|e| substitute_exact(&e, env))),
        StmtKind::Block(stmts) => {
            StmtKind::Block(stmts.into_iter().map(|s| substitute_exact_stmt(s, env)).collect())
        }
        StmtKind::Assert(e) => StmtKind::Assert(substitute_exact(&e, env)),
        passthrough @ (StmtKind::Case(_)
        | StmtKind::Default
        | StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Goto(_)
        | StmtKind::Label(_)) => passthrough,
    };
    Stmt::new(kind, line)
}

// ---- dead-argument elimination -----------------------------------------

fn collect_idents_expr(expr: &Expr, out: &mut FxHashSet<String>) {
    if let ExprKind::Ident(name) = &expr.kind {
        out.insert(name.clone());
    }
    match &expr.kind {
        ExprKind::Binary(_, l, r) | ExprKind::Assign(l, r) => {
            collect_idents_expr(l, out);
            collect_idents_expr(r, out);
        }
        ExprKind::Unary(_, e) | ExprKind::Cast(e, _) => collect_idents_expr(e, out),
        ExprKind::Call(_, args) => args.iter().for_each(|a| collect_idents_expr(a, out)),
        ExprKind::Index(a, i) => {
            collect_idents_expr(a, out);
            collect_idents_expr(i, out);
        }
        ExprKind::Member(o, _, _) => collect_idents_expr(o, out),
        ExprKind::Ternary(c, t, e) => {
            collect_idents_expr(c, out);
            collect_idents_expr(t, out);
            collect_idents_expr(e, out);
        }
        ExprKind::Integer(_) | ExprKind::Float(_) | ExprKind::Str(_) | ExprKind::Ident(_) => {}
    }
}

fn collect_idents_stmt(stmt: &Stmt, out: &mut FxHashSet<String>) {
    match &stmt.kind {
        StmtKind::Expr(e) => collect_idents_expr(e, out),
        StmtKind::VarDecl { init: Some(e), .. } => collect_idents_expr(e, out),
        StmtKind::VarDecl { init: None, .. } => {}
        StmtKind::If { cond, then, els } => {
            collect_idents_expr(cond, out);
            collect_idents_stmt(then, out);
            if let Some(e) = els {
                collect_idents_stmt(e, out);
            }
        }
        StmtKind::While { cond, body, .. } | StmtKind::DoWhile { cond, body } => {
            collect_idents_expr(cond, out);
            collect_idents_stmt(body, out);
        }
        StmtKind::For { init, cond, step, body, .. } => {
            if let Some(i) = init {
                collect_idents_stmt(i, out);
            }
            if let Some(c) = cond {
                collect_idents_expr(c, out);
            }
            if let Some(s) = step {
                collect_idents_expr(s, out);
            }
            collect_idents_stmt(body, out);
        }
        StmtKind::Switch { cond, body } => {
            collect_idents_expr(cond, out);
            collect_idents_stmt(body, out);
        }
        StmtKind::Return(Some(e)) => collect_idents_expr(e, out),
        StmtKind::Return(None) => {}
        StmtKind::Block(stmts) => stmts.iter().for_each(|s| collect_idents_stmt(s, out)),
        StmtKind::Assert(e) => collect_idents_expr(e, out),
        StmtKind::Case(_)
        | StmtKind::Default
        | StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Goto(_)
        | StmtKind::Label(_) => {}
    }
}

fn unused_param_indices(f: &Function) -> Vec<usize> {
    let Some(body) = &f.body else { return Vec::new() };
    let mut used = FxHashSet::default();
    collect_idents_stmt(body, &mut used);
    f.params.iter().enumerate().filter(|(_, p)| !used.contains(&p.name)).map(|(i, _)| i).collect()
}

fn eliminate_dead_arguments(program: &mut Program) {
    let mut by_fn: FxHashMap<String, Vec<usize>> = FxHashMap::default();
    for f in &program.functions {
        if !f.is_static || f.name == "main" {
            continue;
        }
        let unused = unused_param_indices(f);
        if !unused.is_empty() {
            by_fn.insert(f.name.clone(), unused);
        }
    }
    if by_fn.is_empty() {
        return;
    }
    for (name, mut indices) in by_fn {
        indices.sort_unstable_by(|a, b| b.cmp(a));
        if let Some(f) = program.find_mut(&name) {
            for &i in &indices {
                log::debug!("ipa: dropping unused parameter {} of {}", i, name);
                f.params.remove(i);
            }
        }
        for &i in &indices {
            for f in &mut program.functions {
                if let Some(body) = f.body.take() {
                    f.body = Some(remove_call_arg_stmt(body, &name, i));
                }
            }
        }
    }
}

fn remove_call_arg_expr(expr: Expr, fn_name: &str, idx: usize) -> Expr {
    let line = expr.line;
    let ty = expr.ty.clone();
    let kind = match expr.kind {
        ExprKind::Call(name, mut args) => {
            if name == fn_name && idx < args.len() {
                args.remove(idx);
            }
            ExprKind::Call(name, args.into_iter().map(|a| remove_call_arg_expr(a, fn_name, idx)).collect())
        }
        ExprKind::Binary(op, l, r) => ExprKind::Binary(
            op,
            Box::new(remove_call_arg_expr(*l, fn_name, idx)),
            Box::new(remove_call_arg_expr(*r, fn_name, idx)),
        ),
        ExprKind::Unary(op, e) => ExprKind::Unary(op, Box::new(remove_call_arg_expr(*e, fn_name, idx))),
        ExprKind::Cast(e, cty) => ExprKind::Cast(Box::new(remove_call_arg_expr(*e, fn_name, idx)), cty),
        ExprKind::Index(a, i) => ExprKind::Index(
            Box::new(remove_call_arg_expr(*a, fn_name, idx)),
            Box::new(remove_call_arg_expr(*i, fn_name, idx)),
        ),
        ExprKind::Member(o, name, is_arrow) => {
            ExprKind::Member(Box::new(remove_call_arg_expr(*o, fn_name, idx)), name, is_arrow)
        }
        ExprKind::Assign(l, r) => ExprKind::Assign(
            Box::new(remove_call_arg_expr(*l, fn_name, idx)),
            Box::new(remove_call_arg_expr(*r, fn_name, idx)),
        ),
        ExprKind::Ternary(c, t, e) => ExprKind::Ternary(
            Box::new(remove_call_arg_expr(*c, fn_name, idx)),
            Box::new(remove_call_arg_expr(*t, fn_name, idx)),
            Box::new(remove_call_arg_expr(*e, fn_name, idx)),
        ),
        literal => literal,
    };
    Expr { kind, line, ty }
}

fn remove_call_arg_stmt(stmt: Stmt, fn_name: &str, idx: usize) -> Stmt {
    let line = stmt.line;
    let kind = match stmt.kind {
        StmtKind::Expr(e) => StmtKind::Expr(remove_call_arg_expr(e, fn_name, idx)),
        StmtKind::VarDecl { name, ty, init, is_static, is_extern } => StmtKind::VarDecl {
            name,
            ty,
            init: init.map(|e| remove_call_arg_expr(e, fn_name, idx)),
            is_static,
            is_extern,
        },
        StmtKind::If { cond, then, els } => StmtKind::If {
            cond: remove_call_arg_expr(cond, fn_name, idx),
            then: Box::new(remove_call_arg_stmt(*then, fn_name, idx)),
            els: els.map(|e| Box::new(remove_call_arg_stmt(*e, fn_name, idx))),
        },
        StmtKind::While { cond, body, vec_info } => StmtKind::While {
            cond: remove_call_arg_expr(cond, fn_name, idx),
            body: Box::new(remove_call_arg_stmt(*body, fn_name, idx)),
            vec_info,
        },
        StmtKind::DoWhile { cond, body } => StmtKind::DoWhile {
            cond: remove_call_arg_expr(cond, fn_name, idx),
            body: Box::new(remove_call_arg_stmt(*body, fn_name, idx)),
        },
        StmtKind::For { init, cond, step, body, vec_info } => StmtKind::For {
            init: init.map(|s| Box::new(remove_call_arg_stmt(*s, fn_name, idx))),
            cond: cond.map(|e| remove_call_arg_expr(e, fn_name, idx)),
            step: step.map(|e| remove_call_arg_expr(e, fn_name, idx)),
            body: Box::new(remove_call_arg_stmt(*body, fn_name, idx)),
            vec_info,
        },
        StmtKind::Switch { cond, body } => StmtKind::Switch {
            cond: remove_call_arg_expr(cond, fn_name, idx),
            body: Box::new(remove_call_arg_stmt(*body, fn_name, idx)),
        },
        StmtKind::Return(e) => StmtKind::Return(e.map(|e| remove_call_arg_expr(e, fn_name, idx))),
        StmtKind::Block(stmts) => {
            StmtKind::Block(stmts.into_iter().map(|s| remove_call_arg_stmt(s, fn_name, idx)).collect())
        }
        StmtKind::Assert(e) => StmtKind::Assert(remove_call_arg_expr(e, fn_name, idx)),
        passthrough @ (StmtKind::Case(_)
        | StmtKind::Default
        | StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Goto(_)
        | StmtKind::Label(_)) => passthrough,
    };
    Stmt::new(kind, line)
}

// ---- dead-function elimination -----------------------------------------

fn count_calls(program: &Program) -> FxHashMap<String, usize> {
    let mut counts = FxHashMap::default();
    for f in &program.functions {
        if let Some(body) = &f.body {
            count_calls_stmt(body, &mut counts);
        }
    }
    counts
}

fn count_calls_expr(expr: &Expr, counts: &mut FxHashMap<String, usize>) {
    if let ExprKind::Call(name, args) = &expr.kind {
        *counts.entry(name.clone()).or_insert(0) += 1;
        args.iter().for_each(|a| count_calls_expr(a, counts));
        return;
    }
    match &expr.kind {
        ExprKind::Binary(_, l, r) | ExprKind::Assign(l, r) => {
            count_calls_expr(l, counts);
            count_calls_expr(r, counts);
        }
        ExprKind::Unary(_, e) | ExprKind::Cast(e, _) => count_calls_expr(e, counts),
        ExprKind::Index(a, i) => {
            count_calls_expr(a, counts);
            count_calls_expr(i, counts);
        }
        ExprKind::Member(o, _, _) => count_calls_expr(o, counts),
        ExprKind::Ternary(c, t, e) => {
            count_calls_expr(c, counts);
            count_calls_expr(t, counts);
            count_calls_expr(e, counts);
        }
        ExprKind::Call(..) | ExprKind::Integer(_) | ExprKind::Float(_) | ExprKind::Str(_) | ExprKind::Ident(_) => {}
    }
}

fn count_calls_stmt(stmt: &Stmt, counts: &mut FxHashMap<String, usize>) {
    match &stmt.kind {
        StmtKind::Expr(e) => count_calls_expr(e, counts),
        StmtKind::VarDecl { init: Some(e), .. } => count_calls_expr(e, counts),
        StmtKind::VarDecl { init: None, .. } => {}
        StmtKind::If { cond, then, els } => {
            count_calls_expr(cond, counts);
            count_calls_stmt(then, counts);
            if let Some(e) = els {
                count_calls_stmt(e, counts);
            }
        }
        StmtKind::While { cond, body, .. } | StmtKind::DoWhile { cond, body } => {
            count_calls_expr(cond, counts);
            count_calls_stmt(body, counts);
        }
        StmtKind::For { init, cond, step, body, .. } => {
            if let Some(i) = init {
                count_calls_stmt(i, counts);
            }
            if let Some(c) = cond {
                count_calls_expr(c, counts);
            }
            if let Some(s) = step {
                count_calls_expr(s, counts);
            }
            count_calls_stmt(body, counts);
        }
        StmtKind::Switch { cond, body } => {
            count_calls_expr(cond, counts);
            count_calls_stmt(body, counts);
        }
        StmtKind::Return(Some(e)) => count_calls_expr(e, counts),
        StmtKind::Return(None) => {}
        StmtKind::Block(stmts) => stmts.iter().for_each(|s| count_calls_stmt(s, counts)),
        StmtKind::Assert(e) => count_calls_expr(e, counts),
        StmtKind::Case(_)
        | StmtKind::Default
        | StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Goto(_)
        | StmtKind::Label(_) => {}
    }
}

fn eliminate_dead_functions(program: &mut Program) {
    loop {
        let counts = count_calls(program);
        let before = program.functions.len();
        program.functions.retain(|f| {
            let keep = !f.is_static || f.name == "main" || counts.get(&f.name).copied().unwrap_or(0) > 0;
            if !keep {
                log::debug!("ipa: removing dead function {}", f.name);
            }
            keep
        });
        if program.functions.len() == before {
            break;
        }
    }
}

// ---- final cleanup ------------------------------------------------------

fn final_cleanup(program: &mut Program) {
    for f in &mut program.functions {
        o1::run(f);
        range::run(f);
        propagate::run(f);
        induction::run(f);
    }
    inline_simple::run(program, inline_simple::DEFAULT_NODE_LIMIT);
    for f in &mut program.functions {
        o1::run(f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Param, TokenOp};

    fn int(v: i64) -> Expr {
        Expr::new(ExprKind::Integer(v), 0)
    }

    fn ident(name: &str) -> Expr {
        Expr::new(ExprKind::Ident(name.to_string()), 0)
    }

    fn param(name: &str) -> Param {
        Param { name: name.to_string(), ty: None }
    }

    fn make_fn(name: &str, params: Vec<Param>, body: Stmt, is_static: bool) -> Function {
        Function { name: name.to_string(), params, body: Some(body), inline_hint: Function::DEFAULT, is_static, line: 0 }
    }

    #[test]
    fn return_value_propagation_folds_pure_call() {
        let seven = make_fn("seven", vec![], Stmt::block(vec![Stmt::new(StmtKind::Return(Some(int(7))), 0)], 0), true);
        let main = make_fn(
            "main",
            vec![],
            Stmt::block(vec![Stmt::new(StmtKind::Return(Some(Expr::new(ExprKind::Call("seven".to_string(), vec![]), 0))), 0)], 0),
            false,
        );
        let mut program = Program { functions: vec![seven, main] };
        run(&mut program);
        let main = program.find("main").unwrap();
        let StmtKind::Block(stmts) = &main.body.as_ref().unwrap().kind else { panic!() };
        let StmtKind::Return(Some(e)) = &stmts[0].kind else { panic!() };
        assert_eq!(e.as_integer(), Some(7));
    }

    #[test]
    fn constant_argument_propagates_into_static_function_body() {
        let scale = make_fn(
            "scale",
            vec![param("k"), param("x")],
            Stmt::block(
                vec![Stmt::new(
                    StmtKind::Return(Some(Expr::new(ExprKind::Binary(TokenOp::Mul, Box::new(ident("k")), Box::new(ident("x"))), 0))),
                    0,
                )],
                0,
            ),
            true,
        );
        let caller_a = make_fn(
            "a",
            vec![],
            Stmt::block(
                vec![Stmt::new(StmtKind::Expr(Expr::new(ExprKind::Call("scale".to_string(), vec![int(3), ident("x")]), 0)), 0)],
                0,
            ),
            false,
        );
        let caller_b = make_fn(
            "main",
            vec![],
            Stmt::block(
                vec![Stmt::new(StmtKind::Expr(Expr::new(ExprKind::Call("scale".to_string(), vec![int(3), int(9)]), 0)), 0)],
                0,
            ),
            false,
        );
        let mut program = Program { functions: vec![scale, caller_a, caller_b] };
        propagate_constant_params(&mut program);
        let scale = program.find("scale").unwrap();
        let StmtKind::Block(stmts) = &scale.body.as_ref().unwrap().kind else { panic!() };
        let StmtKind::Return(Some(e)) = &stmts[0].kind else { panic!() };
        // k is always 3; x varies (ident "x" vs literal 9), so only k is substituted.
        assert!(matches!(&e.kind, ExprKind::Binary(TokenOp::Mul, l, _) if l.as_integer() == Some(3)));
    }

    #[test]
    fn varying_argument_blocks_substitution() {
        let f = make_fn(
            "id",
            vec![param("x")],
            Stmt::block(vec![Stmt::new(StmtKind::Return(Some(ident("x"))), 0)], 0),
            true,
        );
        let caller = make_fn(
            "main",
            vec![],
            Stmt::block(
                vec![
                    Stmt::new(StmtKind::Expr(Expr::new(ExprKind::Call("id".to_string(), vec![int(1)]), 0)), 0),
                    Stmt::new(StmtKind::Expr(Expr::new(ExprKind::Call("id".to_string(), vec![int(2)]), 0)), 0),
                ],
                0,
            ),
            false,
        );
        let mut program = Program { functions: vec![f, caller] };
        propagate_constant_params(&mut program);
        let f = program.find("id").unwrap();
        let StmtKind::Block(stmts) = &f.body.as_ref().unwrap().kind else { panic!() };
        let StmtKind::Return(Some(e)) = &stmts[0].kind else { panic!() };
        assert!(matches!(&e.kind, ExprKind::Ident(n) if n == "x"));
    }

    #[test]
    fn unused_parameter_is_dropped_from_declaration_and_call_sites() {
        let f = make_fn(
            "f",
            vec![param("used"), param("unused")],
            Stmt::block(vec![Stmt::new(StmtKind::Return(Some(ident("used"))), 0)], 0),
            true,
        );
        let caller = make_fn(
            "main",
            vec![],
            Stmt::block(
                vec![Stmt::new(StmtKind::Expr(Expr::new(ExprKind::Call("f".to_string(), vec![int(1), int(2)]), 0)), 0)],
                0,
            ),
            false,
        );
        let mut program = Program { functions: vec![f, caller] };
        eliminate_dead_arguments(&mut program);
        let f = program.find("f").unwrap();
        assert_eq!(f.params.len(), 1);
        assert_eq!(f.params[0].name, "used");
        let main = program.find("main").unwrap();
        let StmtKind::Block(stmts) = &main.body.as_ref().unwrap().kind else { panic!() };
        let StmtKind::Expr(call) = &stmts[0].kind else { panic!() };
        let ExprKind::Call(_, args) = &call.kind else { panic!() };
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn dead_function_with_no_call_sites_is_removed_but_main_survives() {
        let dead = make_fn("dead", vec![], Stmt::block(vec![Stmt::new(StmtKind::Return(Some(int(0))), 0)], 0), true);
        let main = make_fn("main", vec![], Stmt::block(vec![Stmt::new(StmtKind::Return(Some(int(0))), 0)], 0), false);
        let mut program = Program { functions: vec![dead, main] };
        eliminate_dead_functions(&mut program);
        assert!(program.find("dead").is_none());
        assert!(program.find("main").is_some());
    }

    #[test]
    fn cascading_dead_function_elimination_removes_callee_too() {
        let leaf = make_fn("leaf", vec![], Stmt::block(vec![Stmt::new(StmtKind::Return(Some(int(0))), 0)], 0), true);
        let middle = make_fn(
            "middle",
            vec![],
            Stmt::block(vec![Stmt::new(StmtKind::Expr(Expr::new(ExprKind::Call("leaf".to_string(), vec![]), 0)), 0)], 0),
            true,
        );
        let main = make_fn("main", vec![], Stmt::block(vec![Stmt::new(StmtKind::Return(Some(int(0))), 0)], 0), false);
        let mut program = Program { functions: vec![leaf, middle, main] };
        eliminate_dead_functions(&mut program);
        assert!(program.find("middle").is_none());
        assert!(program.find("leaf").is_none());
        assert!(program.find("main").is_some());
    }
}
