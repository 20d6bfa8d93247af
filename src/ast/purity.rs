//! Purity and size queries shared by the propagator, the inliners, and the
//! loop unroller.

use crate::ast::{Expr, ExprKind, UnaryOp};

/// True if evaluating `expr` cannot be observed to have a side effect:
/// no assignment, no increment/decrement, no call (conservatively treated
/// as possibly impure, per §4.I's "conservative alias model" for calls).
///
/// Used to gate: O2 dead-store elimination's "its RHS is pure" condition,
/// the single-expression inliner's "every argument is pure" condition, and
/// the aggressive inliner's identical condition (§4.J, §4.L).
pub fn expr_is_pure(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Integer(_) | ExprKind::Float(_) | ExprKind::Str(_) | ExprKind::Ident(_) => true,
        ExprKind::Binary(_, l, r) => expr_is_pure(l) && expr_is_pure(r),
        ExprKind::Unary(op, e) => {
            !matches!(op, UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec)
                && expr_is_pure(e)
        }
        ExprKind::Cast(e, _) => expr_is_pure(e),
        ExprKind::Call(..) => false,
        ExprKind::Index(a, i) => expr_is_pure(a) && expr_is_pure(i),
        ExprKind::Member(o, _, _) => expr_is_pure(o),
        ExprKind::Assign(..) => false,
        ExprKind::Ternary(c, t, e) => expr_is_pure(c) && expr_is_pure(t) && expr_is_pure(e),
    }
}

/// The number of AST nodes in `expr`, used by the inliners' size limits
/// (§4.J: "`e` has ≤ N AST nodes"; §4.L raises the limit transitively).
pub fn node_count(expr: &Expr) -> usize {
    1 + match &expr.kind {
        ExprKind::Integer(_) | ExprKind::Float(_) | ExprKind::Str(_) | ExprKind::Ident(_) => 0,
        ExprKind::Binary(_, l, r) => node_count(l) + node_count(r),
        ExprKind::Unary(_, e) => node_count(e),
        ExprKind::Cast(e, _) => node_count(e),
        ExprKind::Call(_, args) => args.iter().map(node_count).sum(),
        ExprKind::Index(a, i) => node_count(a) + node_count(i),
        ExprKind::Member(o, _, _) => node_count(o),
        ExprKind::Assign(l, r) => node_count(l) + node_count(r),
        ExprKind::Ternary(c, t, e) => node_count(c) + node_count(t) + node_count(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ExprKind;

    fn int(v: i64) -> Expr {
        Expr::new(ExprKind::Integer(v), 0)
    }

    #[test]
    fn call_is_impure() {
        let call = Expr::new(ExprKind::Call("f".into(), vec![int(1)]), 0);
        assert!(!expr_is_pure(&call));
    }

    #[test]
    fn arithmetic_of_literals_is_pure() {
        let e = Expr::new(
            ExprKind::Binary(crate::ast::TokenOp::Add, Box::new(int(1)), Box::new(int(2))),
            0,
        );
        assert!(expr_is_pure(&e));
        assert_eq!(node_count(&e), 3);
    }
}
