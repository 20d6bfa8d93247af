//! Shared constant-folding and algebraic-identity helpers (§4.G), reused by
//! the O1 bottom-up rewriter, assert-driven range analysis's exact re-fold,
//! and the loop unroller's per-copy re-fold.

use crate::ast::{Expr, ExprKind, TokenOp, UnaryOp};

fn int(v: i64, line: u32) -> Expr {
    Expr::new(ExprKind::Integer(v), line)
}

/// Two's-complement evaluation of a constant-operand binary op (§4.G: "the
/// abstract machine here is taken to be the same two's-complement machine
/// the original C implementation ran on"). Division/modulo by zero returns
/// `None` so the caller leaves the node intact rather than folding it.
fn eval_integer(op: TokenOp, a: i64, b: i64) -> Option<i64> {
    Some(match op {
        TokenOp::Add => a.wrapping_add(b),
        TokenOp::Sub => a.wrapping_sub(b),
        TokenOp::Mul => a.wrapping_mul(b),
        TokenOp::Div => {
            if b == 0 {
                return None;
            }
            a.wrapping_div(b)
        }
        TokenOp::Mod => {
            if b == 0 {
                return None;
            }
            a.wrapping_rem(b)
        }
        TokenOp::Shl => a.wrapping_shl(b as u32),
        TokenOp::Shr => a.wrapping_shr(b as u32),
        TokenOp::BitAnd => a & b,
        TokenOp::BitOr => a | b,
        TokenOp::BitXor => a ^ b,
        TokenOp::Eq => i64::from(a == b),
        TokenOp::Ne => i64::from(a != b),
        TokenOp::Lt => i64::from(a < b),
        TokenOp::Gt => i64::from(a > b),
        TokenOp::Le => i64::from(a <= b),
        TokenOp::Ge => i64::from(a >= b),
        TokenOp::LogAnd => i64::from(a != 0 && b != 0),
        TokenOp::LogOr => i64::from(a != 0 || b != 0),
    })
}

/// Identities and annihilators (§4.G): `x+0, 0+x, x-0, x*1, 1*x, x/1, x|0,
/// 0|x, x^0, 0^x, x<<0, x>>0 → x`; `x*0, 0*x, x&0, 0&x → 0`.
fn algebraic_identity(op: TokenOp, l: &Expr, r: &Expr, line: u32) -> Option<Expr> {
    let lv = l.as_integer();
    let rv = r.as_integer();
    match (op, lv, rv) {
        (TokenOp::Add, Some(0), _) => Some(r.clone()),
        (TokenOp::Add, _, Some(0)) => Some(l.clone()),
        (TokenOp::Sub, _, Some(0)) => Some(l.clone()),
        (TokenOp::Mul, Some(1), _) => Some(r.clone()),
        (TokenOp::Mul, _, Some(1)) => Some(l.clone()),
        (TokenOp::Mul, Some(0), _) | (TokenOp::Mul, _, Some(0)) => Some(int(0, line)),
        (TokenOp::Div, _, Some(1)) => Some(l.clone()),
        (TokenOp::BitOr, Some(0), _) => Some(r.clone()),
        (TokenOp::BitOr, _, Some(0)) => Some(l.clone()),
        (TokenOp::BitXor, Some(0), _) => Some(r.clone()),
        (TokenOp::BitXor, _, Some(0)) => Some(l.clone()),
        (TokenOp::BitAnd, Some(0), _) | (TokenOp::BitAnd, _, Some(0)) => Some(int(0, line)),
        (TokenOp::Shl, _, Some(0)) => Some(l.clone()),
        (TokenOp::Shr, _, Some(0)) => Some(l.clone()),
        _ => None,
    }
}

fn power_of_two_exponent(k: i64) -> Option<u32> {
    if k > 0 && (k & (k - 1)) == 0 {
        Some(k.trailing_zeros())
    } else {
        None
    }
}

/// `x * 2^n` (either operand order) → `x << n`.
fn power_of_two_operand<'a>(l: &'a Expr, r: &'a Expr) -> Option<(&'a Expr, u32)> {
    if let Some(n) = r.as_integer().and_then(power_of_two_exponent) {
        return Some((l, n));
    }
    if let Some(n) = l.as_integer().and_then(power_of_two_exponent) {
        return Some((r, n));
    }
    None
}

/// Strength-reduces `x*2^n`, `x/2^n`, `x%2^n` to shift/and (§4.G), swapping
/// operand order where necessary.
fn strength_reduce(op: TokenOp, l: &Expr, r: &Expr, line: u32) -> Option<Expr> {
    match op {
        TokenOp::Mul => {
            let (var, n) = power_of_two_operand(l, r)?;
            Some(Expr {
                kind: ExprKind::Binary(TokenOp::Shl, Box::new(var.clone()), Box::new(int(n as i64, line))),
                line,
                ty: None,
            })
        }
        TokenOp::Div => {
            let n = r.as_integer().and_then(power_of_two_exponent)?;
            Some(Expr {
                kind: ExprKind::Binary(TokenOp::Shr, Box::new(l.clone()), Box::new(int(n as i64, line))),
                line,
                ty: None,
            })
        }
        TokenOp::Mod => {
            let k = r.as_integer()?;
            power_of_two_exponent(k)?;
            Some(Expr {
                kind: ExprKind::Binary(TokenOp::BitAnd, Box::new(l.clone()), Box::new(int(k - 1, line))),
                line,
                ty: None,
            })
        }
        _ => None,
    }
}

/// Fold/simplify `Binary(op, l, r)` given already-optimized children. Tries,
/// in order: constant folding, algebraic identity, strength reduction; falls
/// through to rebuilding the binary node unchanged.
pub fn fold_binary(op: TokenOp, l: Expr, r: Expr, line: u32) -> Expr {
    if let (Some(a), Some(b)) = (l.as_integer(), r.as_integer()) {
        if let Some(v) = eval_integer(op, a, b) {
            return int(v, line);
        }
    }
    if let Some(simplified) = algebraic_identity(op, &l, &r, line) {
        return simplified;
    }
    if let Some(reduced) = strength_reduce(op, &l, &r, line) {
        return reduced;
    }
    Expr { kind: ExprKind::Binary(op, Box::new(l), Box::new(r)), line, ty: None }
}

/// Fold a unary op of an already-optimized operand: constant fold, or
/// collapse `-(-x) → x` / `~~x → x` (§4.G).
pub fn fold_unary(op: UnaryOp, e: Expr, line: u32) -> Expr {
    if let Some(v) = e.as_integer() {
        match op {
            UnaryOp::Neg => return int(v.wrapping_neg(), line),
            UnaryOp::BitNot => return int(!v, line),
            UnaryOp::LogNot => return int(i64::from(v == 0), line),
            _ => {}
        }
    }
    if let ExprKind::Unary(inner_op, inner) = &e.kind {
        let collapses = matches!(
            (op, inner_op),
            (UnaryOp::Neg, UnaryOp::Neg) | (UnaryOp::BitNot, UnaryOp::BitNot)
        );
        if collapses {
            return inner.as_ref().clone();
        }
    }
    Expr { kind: ExprKind::Unary(op, Box::new(e)), line, ty: None }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Expr {
        Expr::new(ExprKind::Ident(name.to_string()), 0)
    }

    #[test]
    fn folds_constant_arithmetic() {
        let folded = fold_binary(TokenOp::Add, int(3, 0), int(4, 0), 0);
        assert_eq!(folded.as_integer(), Some(7));
    }

    #[test]
    fn division_by_zero_is_left_intact() {
        let node = fold_binary(TokenOp::Div, int(1, 0), int(0, 0), 0);
        assert!(node.as_integer().is_none());
    }

    #[test]
    fn identity_add_zero_returns_other_operand_unfolded() {
        let node = fold_binary(TokenOp::Add, ident("x"), int(0, 0), 0);
        assert!(matches!(node.kind, ExprKind::Ident(name) if name == "x"));
    }

    #[test]
    fn strength_reduces_div_by_power_of_two() {
        let node = fold_binary(TokenOp::Div, ident("x"), int(4, 0), 0);
        match node.kind {
            ExprKind::Binary(TokenOp::Shr, _, shift) => assert_eq!(shift.as_integer(), Some(2)),
            other => panic!("expected shift, got {other:?}"),
        }
    }

    #[test]
    fn strength_reduces_mod_by_power_of_two() {
        let node = fold_binary(TokenOp::Mod, ident("x"), int(8, 0), 0);
        match node.kind {
            ExprKind::Binary(TokenOp::BitAnd, _, mask) => assert_eq!(mask.as_integer(), Some(7)),
            other => panic!("expected bitand mask, got {other:?}"),
        }
    }

    #[test]
    fn double_negation_collapses() {
        let node = fold_unary(UnaryOp::Neg, Expr::new(ExprKind::Unary(UnaryOp::Neg, Box::new(ident("x"))), 0), 0);
        assert!(matches!(node.kind, ExprKind::Ident(name) if name == "x"));
    }
}
