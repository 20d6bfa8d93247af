//! Component H: assert-driven range analysis (§4.H).
//!
//! Maintains an environment mapping variable names to `{min, max,
//! is_power_of_two, exact}`. An `assert(cond)` statement refines the
//! environment: `&&` chains decompose into independent refinements, the
//! pattern `(x & (x - 1)) == 0` marks `x` as a power of two, and a simple
//! comparison `x REL const` (or `const REL x`) tightens `min`/`max`. Once
//! `min == max` the binding becomes `exact`, and every subsequent statement
//! has that identifier substituted by its literal value before being
//! re-folded by O1.
//!
//! Entering a control-flow statement recurses into the nested block but
//! resets nothing for the outer environment: outer statements continue to
//! see pre-branch refinements even though the branch may not have executed.
//! This is deliberately accepted as an optimization-quality tradeoff, not a
//! soundness one, per §4.H / §9.
//!
//! Loop headers are the one place this pass does not substitute: the body
//! may reassign the tracked variable on a later iteration, so folding an
//! exact value into a `while`/`for` condition once, statically, would wrongly
//! turn a loop that should terminate into one that never re-evaluates its
//! exit test.

use crate::ast::{substitute_exact, Expr, ExprKind, Function, Stmt, StmtKind, TokenOp};
use crate::fx::FxHashMap;
use crate::opt::o1::{simplify_expr, simplify_stmt};

/// §5/§9: range analysis tracks at most this many live variables; once full,
/// new bindings are silently skipped (a missed optimization, never unsound).
const MAX_RANGES: usize = 64;

#[derive(Debug, Clone, Copy)]
struct RangeFact {
    min: i64,
    max: i64,
    is_power_of_two: bool,
    exact: bool,
}

impl RangeFact {
    fn unknown() -> Self {
        RangeFact { min: i64::MIN, max: i64::MAX, is_power_of_two: false, exact: false }
    }

    fn exact_value(&self) -> Option<i64> {
        if self.exact {
            Some(self.min)
        } else {
            None
        }
    }
}

type Env = FxHashMap<String, RangeFact>;

/// Run range analysis over a single function's body (§2: O2 runs H after G).
pub fn run(function: &mut Function) {
    if let Some(body) = function.body.take() {
        let mut env = Env::default();
        function.body = Some(process_stmt(body, &mut env));
    }
}

fn process_block(stmts: Vec<Stmt>, env: &mut Env) -> Vec<Stmt> {
    stmts.into_iter().map(|s| process_stmt(s, env)).collect()
}

fn process_stmt(stmt: Stmt, env: &mut Env) -> Stmt {
    let line = stmt.line;
    match stmt.kind {
        StmtKind::Assert(cond) => {
            let cond = substitute_and_fold(cond, env);
            refine(&cond, env);
            Stmt::new(StmtKind::Assert(cond), line)
        }
        StmtKind::Expr(e) => {
            let e = substitute_and_fold(e, env);
            invalidate_assigned(&e, env);
            Stmt::new(StmtKind::Expr(e), line)
        }
        StmtKind::VarDecl { name, ty, init, is_static, is_extern } => {
            let init = init.map(|e| substitute_and_fold(e, env));
            env.remove(&name);
            Stmt::new(StmtKind::VarDecl { name, ty, init, is_static, is_extern }, line)
        }
        StmtKind::Return(e) => {
            Stmt::new(StmtKind::Return(e.map(|e| substitute_and_fold(e, env))), line)
        }
        StmtKind::If { cond, then, els } => {
            let cond = substitute_and_fold(cond, env);
            let then = Box::new(process_stmt(*then, env));
            let els = els.map(|e| Box::new(process_stmt(*e, env)));
            Stmt::new(StmtKind::If { cond, then, els }, line)
        }
        StmtKind::While { cond, body, vec_info } => {
            let body = Box::new(process_stmt(*body, env));
            Stmt::new(StmtKind::While { cond, body, vec_info }, line)
        }
        StmtKind::DoWhile { cond, body } => {
            let body = Box::new(process_stmt(*body, env));
            Stmt::new(StmtKind::DoWhile { cond, body }, line)
        }
        StmtKind::For { init, cond, step, body, vec_info } => {
            let init = init.map(|s| Box::new(process_stmt(*s, env)));
            let body = Box::new(process_stmt(*body, env));
            Stmt::new(StmtKind::For { init, cond, step, body, vec_info }, line)
        }
        StmtKind::Switch { cond, body } => {
            let cond = substitute_and_fold(cond, env);
            let body = Box::new(process_stmt(*body, env));
            Stmt::new(StmtKind::Switch { cond, body }, line)
        }
        StmtKind::Block(stmts) => Stmt::new(StmtKind::Block(process_block(stmts, env)), line),
        passthrough @ (StmtKind::Case(_)
        | StmtKind::Default
        | StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Goto(_)
        | StmtKind::Label(_)) => Stmt::new(passthrough, line),
    }
}

/// Drop the range entry for whatever `expr` assigns to: a stale exact
/// binding is worse than none (it would substitute the old value into code
/// that runs after the reassignment).
fn invalidate_assigned(expr: &Expr, env: &mut Env) {
    if let ExprKind::Assign(lhs, _) = &expr.kind {
        if let ExprKind::Ident(name) = &lhs.kind {
            env.remove(name);
        }
    }
}

fn substitute_and_fold(expr: Expr, env: &Env) -> Expr {
    let exact: FxHashMap<String, i64> =
        env.iter().filter_map(|(k, v)| v.exact_value().map(|val| (k.clone(), val))).collect();
    if exact.is_empty() {
        return simplify_expr(expr);
    }
    simplify_expr(substitute_exact(&expr, &exact))
}

/// Refine `env` from an `assert`ed condition (§4.H).
fn refine(cond: &Expr, env: &mut Env) {
    if let ExprKind::Binary(TokenOp::LogAnd, l, r) = &cond.kind {
        refine(l, env);
        refine(r, env);
        return;
    }
    if try_power_of_two(cond, env) {
        return;
    }
    try_comparison(cond, env);
}

/// `(x & (x - 1)) == 0` (either operand order) marks `x` as a power of two.
fn try_power_of_two(cond: &Expr, env: &mut Env) -> bool {
    let ExprKind::Binary(TokenOp::Eq, l, r) = &cond.kind else {
        return false;
    };
    let and_expr = match (l.as_integer(), r.as_integer()) {
        (Some(0), _) => r.as_ref(),
        (_, Some(0)) => l.as_ref(),
        _ => return false,
    };
    let ExprKind::Binary(TokenOp::BitAnd, a, b) = &and_expr.kind else {
        return false;
    };
    let name = match minus_one_ident(a, b).or_else(|| minus_one_ident(b, a)) {
        Some(name) => name,
        None => return false,
    };
    if !env.contains_key(&name) && env.len() >= MAX_RANGES {
        return true;
    }
    env.entry(name).or_insert_with(RangeFact::unknown).is_power_of_two = true;
    true
}

/// If `ident_side` is `Ident(name)` and `minus_one_side` is `name - 1`,
/// returns `name`.
fn minus_one_ident(ident_side: &Expr, minus_one_side: &Expr) -> Option<String> {
    let ExprKind::Ident(name) = &ident_side.kind else {
        return None;
    };
    let ExprKind::Binary(TokenOp::Sub, inner, one) = &minus_one_side.kind else {
        return None;
    };
    let ExprKind::Ident(inner_name) = &inner.kind else {
        return None;
    };
    if inner_name == name && one.as_integer() == Some(1) {
        Some(name.clone())
    } else {
        None
    }
}

/// `x REL const` or `const REL x` tightens `min`/`max` for `x` (§4.H).
fn try_comparison(cond: &Expr, env: &mut Env) {
    let ExprKind::Binary(op, l, r) = &cond.kind else {
        return;
    };
    if let (ExprKind::Ident(name), Some(c)) = (&l.kind, r.as_integer()) {
        tighten(env, name, *op, c);
    } else if let (Some(c), ExprKind::Ident(name)) = (l.as_integer(), &r.kind) {
        tighten(env, name, mirror(*op), c);
    }
}

/// Flips a relational operator's sense for `const REL x` → `x REL' const`.
fn mirror(op: TokenOp) -> TokenOp {
    match op {
        TokenOp::Lt => TokenOp::Gt,
        TokenOp::Gt => TokenOp::Lt,
        TokenOp::Le => TokenOp::Ge,
        TokenOp::Ge => TokenOp::Le,
        other => other,
    }
}

fn tighten(env: &mut Env, name: &str, op: TokenOp, c: i64) {
    if !env.contains_key(name) && env.len() >= MAX_RANGES {
        return;
    }
    let fact = env.entry(name.to_string()).or_insert_with(RangeFact::unknown);
    match op {
        TokenOp::Eq => {
            fact.min = c;
            fact.max = c;
        }
        TokenOp::Lt => fact.max = fact.max.min(c - 1),
        TokenOp::Le => fact.max = fact.max.min(c),
        TokenOp::Gt => fact.min = fact.min.max(c + 1),
        TokenOp::Ge => fact.min = fact.min.max(c),
        _ => return,
    }
    if fact.min == fact.max {
        fact.exact = true;
    }
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

    fn bin(op: TokenOp, l: Expr, r: Expr) -> Expr {
        Expr::new(ExprKind::Binary(op, Box::new(l), Box::new(r)), 0)
    }

    #[test]
    fn eq_assert_becomes_exact() {
        let mut env = Env::default();
        refine(&bin(TokenOp::Eq, ident("x"), int(5)), &mut env);
        assert_eq!(env["x"].exact_value(), Some(5));
    }

    #[test]
    fn and_chain_decomposes_into_two_bounds() {
        let mut env = Env::default();
        let cond = bin(
            TokenOp::LogAnd,
            bin(TokenOp::Ge, ident("x"), int(3)),
            bin(TokenOp::Le, ident("x"), int(3)),
        );
        refine(&cond, &mut env);
        assert_eq!(env["x"].exact_value(), Some(3));
    }

    #[test]
    fn reversed_comparison_mirrors_operator() {
        let mut env = Env::default();
        // 10 > x  =>  x < 10  =>  max = 9.
        refine(&bin(TokenOp::Gt, int(10), ident("x")), &mut env);
        assert_eq!(env["x"].max, 9);
        assert!(!env["x"].exact);
    }

    #[test]
    fn power_of_two_pattern_sets_flag() {
        let mut env = Env::default();
        let and = bin(TokenOp::BitAnd, ident("x"), bin(TokenOp::Sub, ident("x"), int(1)));
        let cond = bin(TokenOp::Eq, and, int(0));
        refine(&cond, &mut env);
        assert!(env["x"].is_power_of_two);
    }

    #[test]
    fn exact_value_substitutes_into_later_statement() {
        let mut env = Env::default();
        env.insert("x".to_string(), RangeFact { min: 7, max: 7, is_power_of_two: false, exact: true });
        let folded = substitute_and_fold(bin(TokenOp::Add, ident("x"), int(1)), &env);
        assert_eq!(folded.as_integer(), Some(8));
    }

    #[test]
    fn assignment_invalidates_exact_binding() {
        let mut env = Env::default();
        env.insert("x".to_string(), RangeFact { min: 7, max: 7, is_power_of_two: false, exact: true });
        let assign = Expr::new(ExprKind::Assign(Box::new(ident("x")), Box::new(int(9))), 0);
        invalidate_assigned(&assign, &mut env);
        assert!(!env.contains_key("x"));
    }

    #[test]
    fn loop_condition_is_left_unsubstituted() {
        // assert(n == 4); while (n < 10) { n = n + 1; }
        // must not freeze the while condition to a constant.
        let mut function = Function {
            name: "f".to_string(),
            params: vec![],
            inline_hint: 0,
            is_static: false,
            line: 0,
            body: Some(Stmt::block(
                vec![
                    Stmt::new(StmtKind::Assert(bin(TokenOp::Eq, ident("n"), int(4))), 0),
                    Stmt::new(
                        StmtKind::While {
                            cond: bin(TokenOp::Lt, ident("n"), int(10)),
                            body: Box::new(Stmt::block(
                                vec![Stmt::new(
                                    StmtKind::Expr(Expr::new(
                                        ExprKind::Assign(
                                            Box::new(ident("n")),
                                            Box::new(bin(TokenOp::Add, ident("n"), int(1))),
                                        ),
                                        0,
                                    )),
                                    0,
                                )],
                                0,
                            )),
                            vec_info: None,
                        },
                        0,
                    ),
                ],
                0,
            )),
        };
        run(&mut function);
        let StmtKind::Block(stmts) = function.body.unwrap().kind else {
            panic!("expected block");
        };
        let StmtKind::While { cond, .. } = &stmts[1].kind else {
            panic!("expected while");
        };
        assert!(matches!(cond.kind, ExprKind::Binary(TokenOp::Lt, _, _)));
    }
}
