//! Component L: the O3 aggressive multi-statement inliner (§4.L).
//!
//! A function is eligible when its body is a block of at most `S`
//! statements (8, or 20 for a PGO-hot function) whose last statement is a
//! `return e;`, with no `goto`/`label`, no top-level `break`/`continue`, no
//! nested `return` other than the terminal one, no static locals, and no
//! loops (a loop body that mutated a parameter would corrupt the caller's
//! argument after substitution).
//!
//! At each call site with pure arguments, not recursive on the function
//! currently being processed, the clone's leading statements (everything but
//! the terminal `return`) are spliced in before the statement containing the
//! call, every local of the clone is renamed with a fresh per-site suffix,
//! and the call expression itself is replaced by the clone's terminal
//! return-expression.
//!
//! Only one call site per statement is touched per sweep (the first call
//! found, searching through binary/unary/cast/index/member/ternary
//! structure, not merely a top-level call); the pipeline driver re-runs this
//! sweep to a fixpoint, re-running O1/O2 between rounds.

use crate::ast::{
    expr_is_pure, rename_locals_expr, rename_locals_stmt, substitute_params, Expr, ExprKind, Function,
    Param, Program, Stmt, StmtKind,
};
use crate::fx::{FxHashMap, FxHashSet};

const DEFAULT_STMT_LIMIT: usize = 8;
const HOT_STMT_LIMIT: usize = 20;

const CALL_SITE_SENTINEL: &str = "__inline_call_site__";

struct Candidate {
    params: Vec<Param>,
    leading: Vec<Stmt>,
    terminal: Expr,
}

/// One sweep of aggressive inlining over every function in `program`.
/// Returns whether anything changed (the pipeline driver uses this to decide
/// whether another fixpoint round is worthwhile).
pub fn run(program: &mut Program, hot_functions: &FxHashSet<String>) -> bool {
    let candidates: FxHashMap<String, Candidate> = program
        .functions
        .iter()
        .filter_map(|f| build_candidate(f, hot_functions.contains(&f.name)).map(|c| (f.name.clone(), c)))
        .collect();
    if candidates.is_empty() {
        return false;
    }
    let mut changed = false;
    let mut counter = 0u32;
    for function in &mut program.functions {
        let Some(body) = function.body.take() else { continue };
        let StmtKind::Block(stmts) = body.kind else {
            function.body = Some(body);
            continue;
        };
        let new_stmts = process_block(stmts, &candidates, &function.name, &mut counter, &mut changed);
        function.body = Some(Stmt::new(StmtKind::Block(new_stmts), body.line));
    }
    changed
}

fn build_candidate(f: &Function, is_hot: bool) -> Option<Candidate> {
    let body = f.body.as_ref()?;
    let StmtKind::Block(stmts) = &body.kind else { return None };
    let limit = if is_hot { HOT_STMT_LIMIT } else { DEFAULT_STMT_LIMIT };
    if stmts.is_empty() || stmts.len() > limit {
        return None;
    }
    let (leading, last) = stmts.split_at(stmts.len() - 1);
    let StmtKind::Return(Some(terminal)) = &last[0].kind else { return None };
    for s in leading {
        if matches!(s.kind, StmtKind::Break | StmtKind::Continue) {
            return None;
        }
        if contains_disallowed(s) || contains_return(s) {
            return None;
        }
    }
    Some(Candidate { params: f.params.clone(), leading: leading.to_vec(), terminal: terminal.clone() })
}

fn contains_disallowed(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Goto(_) | StmtKind::Label(_) | StmtKind::While { .. } | StmtKind::DoWhile { .. } | StmtKind::For { .. } => {
            true
        }
        StmtKind::VarDecl { is_static: true, .. } => true,
        StmtKind::If { then, els, .. } => {
            contains_disallowed(then) || els.as_ref().is_some_and(|e| contains_disallowed(e))
        }
        StmtKind::Switch { body, .. } => contains_disallowed(body),
        StmtKind::Block(stmts) => stmts.iter().any(contains_disallowed),
        _ => false,
    }
}

fn contains_return(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Return(_) => true,
        StmtKind::If { then, els, .. } => contains_return(then) || els.as_ref().is_some_and(|e| contains_return(e)),
        StmtKind::Switch { body, .. } => contains_return(body),
        StmtKind::Block(stmts) => stmts.iter().any(contains_return),
        _ => false,
    }
}

fn process_block(
    stmts: Vec<Stmt>,
    candidates: &FxHashMap<String, Candidate>,
    current_fn: &str,
    counter: &mut u32,
    changed: &mut bool,
) -> Vec<Stmt> {
    let mut out = Vec::new();
    for stmt in stmts {
        out.extend(splice_stmt(stmt, candidates, current_fn, counter, changed));
    }
    out
}

fn process_body(
    stmt: Stmt,
    candidates: &FxHashMap<String, Candidate>,
    current_fn: &str,
    counter: &mut u32,
    changed: &mut bool,
) -> Stmt {
    if let StmtKind::Block(inner) = stmt.kind {
        Stmt::new(StmtKind::Block(process_block(inner, candidates, current_fn, counter, changed)), stmt.line)
    } else {
        let line = stmt.line;
        let mut spliced = splice_stmt(stmt, candidates, current_fn, counter, changed);
        if spliced.len() == 1 {
            spliced.pop().expect("checked len == 1")
        } else {
            Stmt::new(StmtKind::Block(spliced), line)
        }
    }
}

/// Returns the statements that should replace `stmt`: usually itself, plus
/// any leading statements injected by an inlined call found within it.
fn splice_stmt(
    stmt: Stmt,
    candidates: &FxHashMap<String, Candidate>,
    current_fn: &str,
    counter: &mut u32,
    changed: &mut bool,
) -> Vec<Stmt> {
    let line = stmt.line;
    match stmt.kind {
        StmtKind::Expr(e) => {
            let (mut leading, e) = try_splice_expr(e, candidates, current_fn, counter, changed);
            leading.push(Stmt::new(StmtKind::Expr(e), line));
            leading
        }
        StmtKind::VarDecl { name, ty, init: Some(init), is_static, is_extern } => {
            let (mut leading, init) = try_splice_expr(init, candidates, current_fn, counter, changed);
            leading.push(Stmt::new(StmtKind::VarDecl { name, ty, init: Some(init), is_static, is_extern }, line));
            leading
        }
        StmtKind::VarDecl { name, ty, init: None, is_static, is_extern } => {
            vec![Stmt::new(StmtKind::VarDecl { name, ty, init: None, is_static, is_extern }, line)]
        }
        StmtKind::Return(Some(e)) => {
            let (mut leading, e) = try_splice_expr(e, candidates, current_fn, counter, changed);
            leading.push(Stmt::new(StmtKind::Return(Some(e)), line));
            leading
        }
        StmtKind::Return(None) => vec![Stmt::new(StmtKind::Return(None), line)],
        StmtKind::If { cond, then, els } => {
            let (mut leading, cond) = try_splice_expr(cond, candidates, current_fn, counter, changed);
            let then = Box::new(process_body(*then, candidates, current_fn, counter, changed));
            let els = els.map(|e| Box::new(process_body(*e, candidates, current_fn, counter, changed)));
            leading.push(Stmt::new(StmtKind::If { cond, then, els }, line));
            leading
        }
        StmtKind::Switch { cond, body } => {
            let (mut leading, cond) = try_splice_expr(cond, candidates, current_fn, counter, changed);
            let body = Box::new(process_body(*body, candidates, current_fn, counter, changed));
            leading.push(Stmt::new(StmtKind::Switch { cond, body }, line));
            leading
        }
        StmtKind::Assert(e) => {
            let (mut leading, e) = try_splice_expr(e, candidates, current_fn, counter, changed);
            leading.push(Stmt::new(StmtKind::Assert(e), line));
            leading
        }
        StmtKind::While { cond, body, vec_info } => {
            vec![Stmt::new(
                StmtKind::While { cond, body: Box::new(process_body(*body, candidates, current_fn, counter, changed)), vec_info },
                line,
            )]
        }
        StmtKind::DoWhile { cond, body } => vec![Stmt::new(
            StmtKind::DoWhile { cond, body: Box::new(process_body(*body, candidates, current_fn, counter, changed)) },
            line,
        )],
        StmtKind::For { init, cond, step, body, vec_info } => vec![Stmt::new(
            StmtKind::For {
                init,
                cond,
                step,
                body: Box::new(process_body(*body, candidates, current_fn, counter, changed)),
                vec_info,
            },
            line,
        )],
        StmtKind::Block(inner) => {
            vec![Stmt::new(StmtKind::Block(process_block(inner, candidates, current_fn, counter, changed)), line)]
        }
        passthrough => vec![Stmt::new(passthrough, line)],
    }
}

/// Finds the first call in `expr`, inlines it if eligible, and returns
/// `(leading statements to splice before the containing statement, rewritten
/// expr)`. If no call is found, eligible, recursive, or impure-argumented,
/// the expression is returned with the call left in place and no leading
/// statements.
fn try_splice_expr(
    expr: Expr,
    candidates: &FxHashMap<String, Candidate>,
    current_fn: &str,
    counter: &mut u32,
    changed: &mut bool,
) -> (Vec<Stmt>, Expr) {
    let line = expr.line;
    let ty = expr.ty.clone();
    let (rewritten, found) = extract_first_call(expr);
    let Some((name, args)) = found else {
        return (Vec::new(), rewritten);
    };
    let original_call = Expr::new(ExprKind::Call(name.clone(), args.clone()), line);
    if name == current_fn {
        return (Vec::new(), substitute_sentinel(rewritten, original_call));
    }
    let Some(candidate) = candidates.get(&name) else {
        return (Vec::new(), substitute_sentinel(rewritten, original_call));
    };
    if candidate.params.len() != args.len() || !args.iter().all(expr_is_pure) {
        return (Vec::new(), substitute_sentinel(rewritten, original_call));
    }
    *counter += 1;
    let suffix = format!("__inl{}", *counter);
    let (leading, mut terminal) = instantiate(candidate, &args, &suffix);
    terminal.ty = ty;
    *changed = true;
    (leading, substitute_sentinel(rewritten, terminal))
}

fn substitute_sentinel(expr: Expr, replacement: Expr) -> Expr {
    let mut map = FxHashMap::default();
    map.insert(CALL_SITE_SENTINEL.to_string(), replacement);
    substitute_params(&expr, &map)
}

/// Deep-clones the candidate's body, substitutes parameters with `args`, and
/// renames every local with `suffix` (§4.L).
fn instantiate(candidate: &Candidate, args: &[Expr], suffix: &str) -> (Vec<Stmt>, Expr) {
    let mut param_env = FxHashMap::default();
    for (p, a) in candidate.params.iter().zip(args.iter()) {
        param_env.insert(p.name.clone(), a.clone());
    }
    let mut local_names = Vec::new();
    candidate.leading.iter().for_each(|s| collect_locals(s, &mut local_names));
    let rename: FxHashMap<String, String> =
        local_names.into_iter().map(|n| (n.clone(), format!("{n}{suffix}"))).collect();

    let leading: Vec<Stmt> = candidate
        .leading
        .iter()
        .map(|s| substitute_params_stmt(s, &param_env))
        .map(|s| rename_locals_stmt(&s, &rename))
        .collect();
    let terminal = rename_locals_expr(&substitute_params(&candidate.terminal, &param_env), &rename);
    (leading, terminal)
}

fn collect_locals(stmt: &Stmt, out: &mut Vec<String>) {
    match &stmt.kind {
        StmtKind::VarDecl { name, .. } => out.push(name.clone()),
        StmtKind::If { then, els, .. } => {
            collect_locals(then, out);
            if let Some(e) = els {
                collect_locals(e, out);
            }
        }
        StmtKind::Switch { body, .. } => collect_locals(body, out),
        StmtKind::Block(stmts) => stmts.iter().for_each(|s| collect_locals(s, out)),
        _ => {}
    }
}

fn substitute_params_stmt(stmt: &Stmt, args: &FxHashMap<String, Expr>) -> Stmt {
    let kind = match &stmt.kind {
        StmtKind::Expr(e) => StmtKind::Expr(substitute_params(e, args)),
        StmtKind::VarDecl { name, ty, init, is_static, is_extern } => StmtKind::VarDecl {
            name: name.clone(),
            ty: ty.clone(),
            init: init.as_ref().map(|e| substitute_params(e, args)),
            is_static: *is_static,
            is_extern: *is_extern,
        },
        StmtKind::If { cond, then, els } => StmtKind::If {
            cond: substitute_params(cond, args),
            then: Box::new(substitute_params_stmt(then, args)),
            els: els.as_ref().map(|e| Box::new(substitute_params_stmt(e, args))),
        },
        StmtKind::Switch { cond, body } => {
            StmtKind::Switch { cond: substitute_params(cond, args), body: Box::new(substitute_params_stmt(body, args)) }
        }
        StmtKind::Block(stmts) => {
            StmtKind::Block(stmts.iter().map(|s| substitute_params_stmt(s, args)).collect())
        }
        StmtKind::Return(e) => StmtKind::Return(e.as_ref().map(|e| substitute_params(e, args))),
        StmtKind::Assert(e) => StmtKind::Assert(substitute_params(e, args)),
        other => other.clone(),
    };
    Stmt { kind, line: stmt.line }
}

/// Replaces the first `Call` node found (in evaluation order through
/// binary/unary/cast/index/member/assign/ternary structure) with an
/// identifier sentinel, returning it alongside the call's name and
/// arguments. `None` if `expr` contains no call.
fn extract_first_call(expr: Expr) -> (Expr, Option<(String, Vec<Expr>)>) {
    if let ExprKind::Call(name, args) = expr.kind {
        return (Expr::new(ExprKind::Ident(CALL_SITE_SENTINEL.to_string()), expr.line), Some((name, args)));
    }
    let line = expr.line;
    let ty = expr.ty.clone();
    match expr.kind {
        ExprKind::Binary(op, l, r) => {
            let (l2, found) = extract_first_call(*l);
            if found.is_some() {
                return (Expr { kind: ExprKind::Binary(op, Box::new(l2), r), line, ty }, found);
            }
            let (r2, found) = extract_first_call(*r);
            (Expr { kind: ExprKind::Binary(op, Box::new(l2), Box::new(r2)), line, ty }, found)
        }
        ExprKind::Unary(op, e) => {
            let (e2, found) = extract_first_call(*e);
            (Expr { kind: ExprKind::Unary(op, Box::new(e2)), line, ty }, found)
        }
        ExprKind::Cast(e, cty) => {
            let (e2, found) = extract_first_call(*e);
            (Expr { kind: ExprKind::Cast(Box::new(e2), cty), line, ty }, found)
        }
        ExprKind::Index(a, i) => {
            let (a2, found) = extract_first_call(*a);
            if found.is_some() {
                return (Expr { kind: ExprKind::Index(Box::new(a2), i), line, ty }, found);
            }
            let (i2, found) = extract_first_call(*i);
            (Expr { kind: ExprKind::Index(Box::new(a2), Box::new(i2)), line, ty }, found)
        }
        ExprKind::Member(o, name, is_arrow) => {
            let (o2, found) = extract_first_call(*o);
            (Expr { kind: ExprKind::Member(Box::new(o2), name, is_arrow), line, ty }, found)
        }
        ExprKind::Assign(l, r) => {
            let (l2, found) = extract_first_call(*l);
            if found.is_some() {
                return (Expr { kind: ExprKind::Assign(Box::new(l2), r), line, ty }, found);
            }
            let (r2, found) = extract_first_call(*r);
            (Expr { kind: ExprKind::Assign(Box::new(l2), Box::new(r2)), line, ty }, found)
        }
        ExprKind::Ternary(c, t, e) => {
            let (c2, found) = extract_first_call(*c);
            if found.is_some() {
                return (Expr { kind: ExprKind::Ternary(Box::new(c2), t, e), line, ty }, found);
            }
            let (t2, found) = extract_first_call(*t);
            if found.is_some() {
                return (Expr { kind: ExprKind::Ternary(Box::new(c2), Box::new(t2), e), line, ty }, found);
            }
            let (e2, found) = extract_first_call(*e);
            (Expr { kind: ExprKind::Ternary(Box::new(c2), Box::new(t2), Box::new(e2)), line, ty }, found)
        }
        other => (Expr { kind: other, line, ty }, None),
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

    fn param(name: &str) -> Param {
        Param { name: name.to_string(), ty: None }
    }

    fn make_adder() -> Function {
        // int add_one(int x) { int t = x + 1; return t; }
        Function {
            name: "add_one".to_string(),
            params: vec![param("x")],
            body: Some(Stmt::block(
                vec![
                    Stmt::new(
                        StmtKind::VarDecl {
                            name: "t".to_string(),
                            ty: None,
                            init: Some(Expr::new(
                                ExprKind::Binary(TokenOp::Add, Box::new(ident("x")), Box::new(int(1))),
                                0,
                            )),
                            is_static: false,
                            is_extern: false,
                        },
                        0,
                    ),
                    Stmt::new(StmtKind::Return(Some(ident("t"))), 0),
                ],
                0,
            )),
            inline_hint: Function::DEFAULT,
            is_static: false,
            line: 0,
        }
    }

    fn make_caller() -> Function {
        Function {
            name: "main".to_string(),
            params: vec![],
            body: Some(Stmt::block(
                vec![Stmt::new(
                    StmtKind::Return(Some(Expr::new(ExprKind::Call("add_one".to_string(), vec![int(5)]), 0))),
                    0,
                )],
                0,
            )),
            inline_hint: Function::DEFAULT,
            is_static: false,
            line: 0,
        }
    }

    #[test]
    fn call_site_gets_leading_statement_and_terminal_substitution() {
        let mut program = Program { functions: vec![make_adder(), make_caller()] };
        let changed = run(&mut program, &FxHashSet::default());
        assert!(changed);
        let main = program.find("main").unwrap();
        let StmtKind::Block(stmts) = &main.body.as_ref().unwrap().kind else { panic!() };
        // One spliced VarDecl (renamed), then the Return using the renamed local.
        assert_eq!(stmts.len(), 2);
        assert!(matches!(&stmts[0].kind, StmtKind::VarDecl { name, .. } if name.starts_with('t') && name != "t"));
    }

    #[test]
    fn function_with_loop_is_not_a_candidate() {
        let mut looping = make_adder();
        let StmtKind::Block(stmts) = &mut looping.body.as_mut().unwrap().kind else { panic!() };
        stmts.insert(
            0,
            Stmt::new(
                StmtKind::While { cond: int(0), body: Box::new(Stmt::empty_block(0)), vec_info: None },
                0,
            ),
        );
        assert!(build_candidate(&looping, false).is_none());
    }

    #[test]
    fn self_recursive_call_is_left_alone() {
        let mut program = Program { functions: vec![make_adder()] };
        let StmtKind::Block(stmts) =
            &mut program.functions[0].body.as_mut().unwrap().kind
        else {
            panic!()
        };
        *stmts = vec![Stmt::new(
            StmtKind::Return(Some(Expr::new(ExprKind::Call("add_one".to_string(), vec![int(1)]), 0))),
            0,
        )];
        let changed = run(&mut program, &FxHashSet::default());
        assert!(!changed);
    }

    #[test]
    fn impure_argument_blocks_inlining() {
        let mut caller = make_caller();
        let StmtKind::Block(stmts) = &mut caller.body.as_mut().unwrap().kind else { panic!() };
        let StmtKind::Return(Some(call)) = &mut stmts[0].kind else { panic!() };
        let ExprKind::Call(_, args) = &mut call.kind else { panic!() };
        args[0] = Expr::new(ExprKind::Call("rand".to_string(), vec![]), 0);
        let mut program = Program { functions: vec![make_adder(), caller] };
        let changed = run(&mut program, &FxHashSet::default());
        assert!(!changed);
    }
}
