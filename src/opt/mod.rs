//! The optimizer: a multi-pass AST rewriter sequenced by `CompilerOptions`
//! (§2 data flow, §4.P).
//!
//! `run_pipeline` is the crate's single entry point into this module. Every
//! other item here is an independent pass over `ast::Program`/`Function`
//! that `run_pipeline` sequences according to `OptLevel`; nothing in this
//! module is meant to be called directly from outside the crate except for
//! testing individual passes.

mod fold;
pub mod induction;
pub mod inline_aggressive;
pub mod inline_simple;
pub mod ipa;
pub mod o1;
pub mod propagate;
pub mod range;
pub mod unroll;
pub mod vectorize;

use crate::ast::{node_count, Expr, Program, Stmt, StmtKind};
use crate::fx::FxHashSet;
use crate::options::{CompilerOptions, OptLevel};

/// Run the full optimizer pipeline over `program` per `options.opt_level`
/// (§4.P). O0 runs nothing; O1 runs component G; O2 runs G, H, I, J, K; O3
/// runs all of G through O, with the aggressive-inlining/unrolling fixpoint
/// (§4.L/§4.M) iterated up to three rounds. Each level logs a per-pass
/// statistics summary (nodes folded, dead-store nodes removed, calls
/// inlined, loops unrolled/vectorized), measured from real before/after
/// node counts rather than estimated.
pub fn run_pipeline(program: &mut Program, options: &CompilerOptions) {
    log::debug!("opt: running pipeline at {:?}", options.opt_level);
    match options.opt_level {
        OptLevel::O0 => {
            log::debug!("opt: O0, no passes run");
        }
        OptLevel::O1 => run_o1(program),
        OptLevel::O2 => run_o2(program),
        OptLevel::O3 => run_o3(program, options),
    }
    log::debug!("opt: pipeline complete");
}

/// Total AST node count of a function body (statements and expressions),
/// used only for the statistics `run_pipeline` logs — not a budget like
/// `inline_simple`'s expression-only `node_count`.
fn stmt_node_count(stmt: &Stmt) -> usize {
    1 + match &stmt.kind {
        StmtKind::Expr(e) | StmtKind::Assert(e) => node_count(e),
        StmtKind::VarDecl { init, .. } => init.as_ref().map_or(0, node_count),
        StmtKind::If { cond, then, els } => {
            node_count(cond) + stmt_node_count(then) + els.as_deref().map_or(0, stmt_node_count)
        }
        StmtKind::While { cond, body, .. } | StmtKind::DoWhile { cond, body } => {
            node_count(cond) + stmt_node_count(body)
        }
        StmtKind::For { init, cond, step, body, .. } => {
            init.as_deref().map_or(0, stmt_node_count)
                + cond.as_ref().map_or(0, node_count)
                + step.as_ref().map_or(0, node_count)
                + stmt_node_count(body)
        }
        StmtKind::Switch { cond, body } => node_count(cond) + stmt_node_count(body),
        StmtKind::Return(e) => e.as_ref().map_or(0, node_count),
        StmtKind::Block(stmts) => stmts.iter().map(stmt_node_count).sum(),
        StmtKind::Case(_)
        | StmtKind::Default
        | StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Goto(_)
        | StmtKind::Label(_) => 0,
    }
}

fn program_node_count(program: &Program) -> usize {
    program.functions.iter().filter_map(|f| f.body.as_ref()).map(stmt_node_count).sum()
}

fn count_calls_expr(expr: &Expr) -> usize {
    use crate::ast::ExprKind;
    let here = usize::from(matches!(expr.kind, ExprKind::Call(..)));
    here + match &expr.kind {
        ExprKind::Binary(_, l, r) | ExprKind::Assign(l, r) => count_calls_expr(l) + count_calls_expr(r),
        ExprKind::Unary(_, e) | ExprKind::Cast(e, _) | ExprKind::Member(e, _, _) => count_calls_expr(e),
        ExprKind::Call(_, args) => args.iter().map(count_calls_expr).sum(),
        ExprKind::Index(a, i) => count_calls_expr(a) + count_calls_expr(i),
        ExprKind::Ternary(c, t, e) => count_calls_expr(c) + count_calls_expr(t) + count_calls_expr(e),
        ExprKind::Integer(_) | ExprKind::Float(_) | ExprKind::Str(_) | ExprKind::Ident(_) => 0,
    }
}

fn count_calls_stmt(stmt: &Stmt) -> usize {
    match &stmt.kind {
        StmtKind::Expr(e) | StmtKind::Assert(e) => count_calls_expr(e),
        StmtKind::VarDecl { init, .. } => init.as_ref().map_or(0, count_calls_expr),
        StmtKind::If { cond, then, els } => {
            count_calls_expr(cond) + count_calls_stmt(then) + els.as_deref().map_or(0, count_calls_stmt)
        }
        StmtKind::While { cond, body, .. } | StmtKind::DoWhile { cond, body } => {
            count_calls_expr(cond) + count_calls_stmt(body)
        }
        StmtKind::For { init, cond, step, body, .. } => {
            init.as_deref().map_or(0, count_calls_stmt)
                + cond.as_ref().map_or(0, count_calls_expr)
                + step.as_ref().map_or(0, count_calls_expr)
                + count_calls_stmt(body)
        }
        StmtKind::Switch { cond, body } => count_calls_expr(cond) + count_calls_stmt(body),
        StmtKind::Return(e) => e.as_ref().map_or(0, count_calls_expr),
        StmtKind::Block(stmts) => stmts.iter().map(count_calls_stmt).sum(),
        StmtKind::Case(_)
        | StmtKind::Default
        | StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Goto(_)
        | StmtKind::Label(_) => 0,
    }
}

fn program_call_count(program: &Program) -> usize {
    program.functions.iter().filter_map(|f| f.body.as_ref()).map(count_calls_stmt).sum()
}

fn count_for_loops_stmt(stmt: &Stmt) -> usize {
    let here = usize::from(matches!(stmt.kind, StmtKind::For { .. }));
    here + match &stmt.kind {
        StmtKind::If { then, els, .. } => count_for_loops_stmt(then) + els.as_deref().map_or(0, count_for_loops_stmt),
        StmtKind::While { body, .. }
        | StmtKind::DoWhile { body, .. }
        | StmtKind::For { body, .. }
        | StmtKind::Switch { body, .. } => count_for_loops_stmt(body),
        StmtKind::Block(stmts) => stmts.iter().map(count_for_loops_stmt).sum(),
        _ => 0,
    }
}

fn count_vectorized_loops_stmt(stmt: &Stmt) -> usize {
    let here = match &stmt.kind {
        StmtKind::For { vec_info, .. } | StmtKind::While { vec_info, .. } => usize::from(vec_info.is_some()),
        _ => 0,
    };
    here + match &stmt.kind {
        StmtKind::If { then, els, .. } => {
            count_vectorized_loops_stmt(then) + els.as_deref().map_or(0, count_vectorized_loops_stmt)
        }
        StmtKind::While { body, .. }
        | StmtKind::DoWhile { body, .. }
        | StmtKind::For { body, .. }
        | StmtKind::Switch { body, .. } => count_vectorized_loops_stmt(body),
        StmtKind::Block(stmts) => stmts.iter().map(count_vectorized_loops_stmt).sum(),
        _ => 0,
    }
}

fn program_vectorized_loop_count(program: &Program) -> usize {
    program.functions.iter().filter_map(|f| f.body.as_ref()).map(count_vectorized_loops_stmt).sum()
}

fn run_o1(program: &mut Program) {
    log::debug!("opt: O1 — component G (simplify/fold)");
    let before = program_node_count(program);
    for f in &mut program.functions {
        o1::run(f);
    }
    let folded = before.saturating_sub(program_node_count(program));
    log::debug!("opt: O1 stats — nodes folded: {folded}");
}

/// O2: G, H, I, J, K (§4.P).
fn run_o2(program: &mut Program) {
    log::debug!("opt: O2 — components G, H, I, J, K");
    let mut nodes_folded = 0usize;
    let mut dead_store_nodes_removed = 0usize;
    for f in &mut program.functions {
        let pre_fold = f.body.as_ref().map_or(0, stmt_node_count);
        o1::run(f);
        nodes_folded += pre_fold.saturating_sub(f.body.as_ref().map_or(0, stmt_node_count));

        range::run(f);

        let pre_propagate = f.body.as_ref().map_or(0, stmt_node_count);
        propagate::run(f);
        dead_store_nodes_removed += pre_propagate.saturating_sub(f.body.as_ref().map_or(0, stmt_node_count));
    }
    let calls_before_inline = program_call_count(program);
    inline_simple::run(program, inline_simple::DEFAULT_NODE_LIMIT);
    let calls_inlined = calls_before_inline.saturating_sub(program_call_count(program));
    for f in &mut program.functions {
        induction::run(f);
    }
    log::debug!(
        "opt: O2 stats — nodes folded: {nodes_folded}, dead-store nodes removed: {dead_store_nodes_removed}, calls inlined: {calls_inlined}"
    );
}

/// O3: all of G through O (§4.P), with a fixpoint loop over aggressive
/// inlining and unrolling (§4.L/§4.M each can expose new opportunities for
/// the other — an unrolled loop body can contain a fresh inlinable call,
/// and an inlined call can shrink a loop body enough to unroll) before the
/// interprocedural suite runs once at the end.
fn run_o3(program: &mut Program, options: &CompilerOptions) {
    log::debug!("opt: O3 — components G through O");
    run_o2(program);

    let hot: FxHashSet<String> =
        program.functions.iter().filter(|f| options.is_hot(&f.name)).map(|f| f.name.clone()).collect();

    let mut calls_inlined = 0usize;
    let mut loops_unrolled = 0usize;
    const MAX_ROUNDS: usize = 3;
    for round in 0..MAX_ROUNDS {
        let calls_before = program_call_count(program);
        inline_simple::run(program, inline_simple::O3_NODE_LIMIT);
        let changed = inline_aggressive::run(program, &hot);
        calls_inlined += calls_before.saturating_sub(program_call_count(program));

        for f in &mut program.functions {
            let pre_unroll = f.body.as_ref().map_or(0, count_for_loops_stmt);
            unroll::run(f);
            loops_unrolled += pre_unroll.saturating_sub(f.body.as_ref().map_or(0, count_for_loops_stmt));
            o1::run(f);
        }
        log::debug!("opt: O3 fixpoint round {round} — inline_aggressive changed={changed}");
        if !changed {
            break;
        }
    }

    let avx = options.avx_level;
    for f in &mut program.functions {
        vectorize::run(f, avx);
    }
    let loops_vectorized = program_vectorized_loop_count(program);

    ipa::run(program);
    log::debug!(
        "opt: O3 stats — calls inlined: {calls_inlined}, loops unrolled: {loops_unrolled}, loops vectorized: {loops_vectorized}"
    );
    log::debug!("opt: O3 complete");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, ExprKind, Function, Param, Stmt, StmtKind, TokenOp};

    fn int(v: i64) -> Expr {
        Expr::new(ExprKind::Integer(v), 0)
    }

    #[test]
    fn o0_leaves_the_program_untouched() {
        let body = Stmt::block(
            vec![Stmt::new(
                StmtKind::Return(Some(Expr::new(ExprKind::Binary(TokenOp::Add, Box::new(int(1)), Box::new(int(2))), 0))),
                0,
            )],
            0,
        );
        let mut program = Program {
            functions: vec![Function {
                name: "main".to_string(),
                params: Vec::<Param>::new(),
                body: Some(body),
                inline_hint: Function::DEFAULT,
                is_static: false,
                line: 0,
            }],
        };
        let options = CompilerOptions::default();
        run_pipeline(&mut program, &options);
        let main = program.find("main").unwrap();
        let StmtKind::Block(stmts) = &main.body.as_ref().unwrap().kind else { panic!() };
        let StmtKind::Return(Some(e)) = &stmts[0].kind else { panic!() };
        // unfolded: still a Binary node, not collapsed to 3.
        assert!(matches!(e.kind, ExprKind::Binary(..)));
    }

    #[test]
    fn o1_folds_constants_in_return() {
        let body = Stmt::block(
            vec![Stmt::new(
                StmtKind::Return(Some(Expr::new(ExprKind::Binary(TokenOp::Add, Box::new(int(1)), Box::new(int(2))), 0))),
                0,
            )],
            0,
        );
        let mut program = Program {
            functions: vec![Function {
                name: "main".to_string(),
                params: Vec::<Param>::new(),
                body: Some(body),
                inline_hint: Function::DEFAULT,
                is_static: false,
                line: 0,
            }],
        };
        let mut options = CompilerOptions::default();
        options.opt_level = OptLevel::O1;
        run_pipeline(&mut program, &options);
        let main = program.find("main").unwrap();
        let StmtKind::Block(stmts) = &main.body.as_ref().unwrap().kind else { panic!() };
        let StmtKind::Return(Some(e)) = &stmts[0].kind else { panic!() };
        assert_eq!(e.as_integer(), Some(3));
    }

    #[test]
    fn o3_dead_function_elimination_never_removes_main() {
        let main_body = Stmt::block(vec![Stmt::new(StmtKind::Return(Some(int(0))), 0)], 0);
        let mut program = Program {
            functions: vec![Function {
                name: "main".to_string(),
                params: Vec::<Param>::new(),
                body: Some(main_body),
                inline_hint: Function::DEFAULT,
                is_static: false,
                line: 0,
            }],
        };
        let mut options = CompilerOptions::default();
        options.opt_level = OptLevel::O3;
        run_pipeline(&mut program, &options);
        assert!(program.find("main").is_some());
    }
}
