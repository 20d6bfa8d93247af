//! Component J: the O2 single-expression inliner (§4.J).
//!
//! A candidate is any function whose body is a block of exactly one
//! `return e;`, with `e` at most `node_limit` AST nodes (`always_inline`
//! bypasses the limit, `noinline` is always excluded). Every call to a
//! candidate anywhere in the program is replaced by a deep-clone of `e` with
//! parameters substituted by the (pure) argument expressions, then O1 is
//! re-run on the substituted subtree. The call's `resolved_type` is kept on
//! the replacement node.

use crate::ast::{
    node_count, substitute_params, Expr, ExprKind, Function, Param, Program, Stmt, StmtKind,
};
use crate::fx::FxHashMap;
use crate::opt::o1::simplify_expr;

/// Default single-expression node limit (§4.J: "default 4").
pub const DEFAULT_NODE_LIMIT: usize = 4;
/// Node limit used transitively during O3 fixpoint inlining (§4.J / §4.L).
pub const O3_NODE_LIMIT: usize = 16;

struct Candidate {
    params: Vec<Param>,
    body: Expr,
}

/// Run the single-expression inliner over every function in `program`.
pub fn run(program: &mut Program, node_limit: usize) {
    let candidates = find_candidates(program, node_limit);
    if candidates.is_empty() {
        return;
    }
    for function in &mut program.functions {
        if let Some(body) = function.body.take() {
            function.body = Some(inline_stmt(body, &candidates));
        }
    }
}

fn find_candidates(program: &Program, node_limit: usize) -> FxHashMap<String, Candidate> {
    let mut out = FxHashMap::default();
    for f in &program.functions {
        if f.is_noinline() {
            continue;
        }
        let Some(body) = &f.body else { continue };
        let StmtKind::Block(stmts) = &body.kind else { continue };
        let [only] = stmts.as_slice() else { continue };
        let StmtKind::Return(Some(e)) = &only.kind else { continue };
        if f.is_always_inline() || node_count(e) <= node_limit {
            out.insert(f.name.clone(), Candidate { params: f.params.clone(), body: e.clone() });
        }
    }
    out
}

fn inline_stmt(stmt: Stmt, candidates: &FxHashMap<String, Candidate>) -> Stmt {
    let line = stmt.line;
    let kind = match stmt.kind {
        StmtKind::Expr(e) => StmtKind::Expr(inline_expr(e, candidates)),
        StmtKind::VarDecl { name, ty, init, is_static, is_extern } => StmtKind::VarDecl {
            name,
            ty,
            init: init.map(|e| inline_expr(e, candidates)),
            is_static,
            is_extern,
        },
        StmtKind::If { cond, then, els } => StmtKind::If {
            cond: inline_expr(cond, candidates),
            then: Box::new(inline_stmt(*then, candidates)),
            els: els.map(|e| Box::new(inline_stmt(*e, candidates))),
        },
        StmtKind::While { cond, body, vec_info } => StmtKind::While {
            cond: inline_expr(cond, candidates),
            body: Box::new(inline_stmt(*body, candidates)),
            vec_info,
        },
        StmtKind::DoWhile { cond, body } => {
            StmtKind::DoWhile { cond: inline_expr(cond, candidates), body: Box::new(inline_stmt(*body, candidates)) }
        }
        StmtKind::For { init, cond, step, body, vec_info } => StmtKind::For {
            init: init.map(|s| Box::new(inline_stmt(*s, candidates))),
            cond: cond.map(|e| inline_expr(e, candidates)),
            step: step.map(|e| inline_expr(e, candidates)),
            body: Box::new(inline_stmt(*body, candidates)),
            vec_info,
        },
        StmtKind::Switch { cond, body } => {
            StmtKind::Switch { cond: inline_expr(cond, candidates), body: Box::new(inline_stmt(*body, candidates)) }
        }
        StmtKind::Return(e) => StmtKind::Return(e.map(|e| inline_expr(e, candidates))),
        StmtKind::Block(stmts) => {
            StmtKind::Block(stmts.into_iter().map(|s| inline_stmt(s, candidates)).collect())
        }
        StmtKind::Assert(e) => StmtKind::Assert(inline_expr(e, candidates)),
        passthrough @ (StmtKind::Case(_)
        | StmtKind::Default
        | StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Goto(_)
        | StmtKind::Label(_)) => passthrough,
    };
    Stmt::new(kind, line)
}

fn inline_expr(expr: Expr, candidates: &FxHashMap<String, Candidate>) -> Expr {
    let line = expr.line;
    let ty = expr.ty.clone();
    match expr.kind {
        ExprKind::Call(name, args) => {
            let args: Vec<Expr> = args.into_iter().map(|a| inline_expr(a, candidates)).collect();
            if let Some(result) = try_inline(&name, &args, candidates, ty.clone(), line) {
                return result;
            }
            Expr { kind: ExprKind::Call(name, args), line, ty }
        }
        ExprKind::Binary(op, l, r) => Expr {
            kind: ExprKind::Binary(op, Box::new(inline_expr(*l, candidates)), Box::new(inline_expr(*r, candidates))),
            line,
            ty,
        },
        ExprKind::Unary(op, e) => {
            Expr { kind: ExprKind::Unary(op, Box::new(inline_expr(*e, candidates))), line, ty }
        }
        ExprKind::Cast(e, cast_ty) => {
            Expr { kind: ExprKind::Cast(Box::new(inline_expr(*e, candidates)), cast_ty), line, ty }
        }
        ExprKind::Index(a, i) => Expr {
            kind: ExprKind::Index(Box::new(inline_expr(*a, candidates)), Box::new(inline_expr(*i, candidates))),
            line,
            ty,
        },
        ExprKind::Member(o, name, is_arrow) => {
            Expr { kind: ExprKind::Member(Box::new(inline_expr(*o, candidates)), name, is_arrow), line, ty }
        }
        ExprKind::Assign(l, r) => Expr {
            kind: ExprKind::Assign(Box::new(inline_expr(*l, candidates)), Box::new(inline_expr(*r, candidates))),
            line,
            ty,
        },
        ExprKind::Ternary(c, t, e) => Expr {
            kind: ExprKind::Ternary(
                Box::new(inline_expr(*c, candidates)),
                Box::new(inline_expr(*t, candidates)),
                Box::new(inline_expr(*e, candidates)),
            ),
            line,
            ty,
        },
        literal @ (ExprKind::Integer(_) | ExprKind::Float(_) | ExprKind::Str(_) | ExprKind::Ident(_)) => {
            Expr { kind: literal, line, ty }
        }
    }
}

fn try_inline(
    name: &str,
    args: &[Expr],
    candidates: &FxHashMap<String, Candidate>,
    call_ty: Option<std::rc::Rc<crate::ast::TypeInfo>>,
    line: u32,
) -> Option<Expr> {
    let candidate = candidates.get(name)?;
    if candidate.params.len() != args.len() {
        return None;
    }
    if !args.iter().all(crate::ast::expr_is_pure) {
        return None;
    }
    let mut env = FxHashMap::default();
    for (param, arg) in candidate.params.iter().zip(args.iter()) {
        env.insert(param.name.clone(), arg.clone());
    }
    let substituted = substitute_params(&candidate.body, &env);
    let mut folded = simplify_expr(substituted);
    folded.line = line;
    folded.ty = call_ty;
    Some(folded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::TokenOp;

    fn int(v: i64) -> Expr {
        Expr::new(ExprKind::Integer(v), 0)
    }

    fn ident(name: &str) -> Expr {
        Expr::new(ExprKind::Ident(name.to_string()), 0)
    }

    fn param(name: &str) -> Param {
        Param { name: name.to_string(), ty: None }
    }

    fn make_square() -> Function {
        Function {
            name: "square".to_string(),
            params: vec![param("x")],
            body: Some(Stmt::block(
                vec![Stmt::new(
                    StmtKind::Return(Some(Expr::new(
                        ExprKind::Binary(TokenOp::Mul, Box::new(ident("x")), Box::new(ident("x"))),
                        0,
                    ))),
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
    fn call_with_pure_constant_argument_inlines_and_folds() {
        let mut program = Program {
            functions: vec![
                make_square(),
                Function {
                    name: "main".to_string(),
                    params: vec![],
                    body: Some(Stmt::block(
                        vec![Stmt::new(
                            StmtKind::Return(Some(Expr::new(
                                ExprKind::Call("square".to_string(), vec![int(3)]),
                                0,
                            ))),
                            0,
                        )],
                        0,
                    )),
                    inline_hint: Function::DEFAULT,
                    is_static: false,
                    line: 0,
                },
            ],
        };
        run(&mut program, DEFAULT_NODE_LIMIT);
        let main = program.find("main").unwrap();
        let StmtKind::Block(stmts) = &main.body.as_ref().unwrap().kind else { panic!() };
        let StmtKind::Return(Some(e)) = &stmts[0].kind else { panic!() };
        assert_eq!(e.as_integer(), Some(9));
    }

    #[test]
    fn noinline_function_is_never_a_candidate() {
        let mut square = make_square();
        square.inline_hint = Function::NOINLINE;
        let candidates = find_candidates(&Program { functions: vec![square] }, DEFAULT_NODE_LIMIT);
        assert!(candidates.is_empty());
    }

    #[test]
    fn always_inline_bypasses_node_limit() {
        let mut big = make_square();
        big.inline_hint = Function::ALWAYS_INLINE;
        // x*x*x*x*x well over a limit of 1.
        let chain = Expr::new(
            ExprKind::Binary(
                TokenOp::Mul,
                Box::new(Expr::new(ExprKind::Binary(TokenOp::Mul, Box::new(ident("x")), Box::new(ident("x"))), 0)),
                Box::new(ident("x")),
            ),
            0,
        );
        big.body = Some(Stmt::block(vec![Stmt::new(StmtKind::Return(Some(chain)), 0)], 0));
        let candidates = find_candidates(&Program { functions: vec![big] }, 1);
        assert!(candidates.contains_key("square"));
    }

    #[test]
    fn impure_argument_blocks_inlining() {
        let call = Expr::new(
            ExprKind::Call("square".to_string(), vec![Expr::new(ExprKind::Call("rand".to_string(), vec![]), 0)]),
            0,
        );
        let mut candidates = FxHashMap::default();
        candidates.insert(
            "square".to_string(),
            Candidate {
                params: vec![param("x")],
                body: Expr::new(ExprKind::Binary(TokenOp::Mul, Box::new(ident("x")), Box::new(ident("x"))), 0),
            },
        );
        let out = inline_expr(call, &candidates);
        assert!(matches!(out.kind, ExprKind::Call(..)));
    }
}
