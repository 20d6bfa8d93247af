//! Component N: the vectorizer (§4.N).
//!
//! Annotates — never rewrites — loops for the back end by attaching a
//! `VecInfo` to the `for`/`while` node. Three recognized modes:
//!
//! 1. **Element-wise**: `for (i=0; i<N; i++) a[i] = b[i] OP c[i];` over
//!    4-byte int/float arrays; float supports `+ - * /`, int only `+ -`
//!    (SSE2 has no packed `pmulld`).
//! 2. **Reduction**: a `while` of the shape `acc = acc + arr[i]; i = i + 1;`
//!    (either operand order for the accumulator), preceded by `i = 0`.
//! 3. **Init**: `arr[i] = expr` where `expr` is `K*i + C` in any operand
//!    order (including bare `K*i`, `i+C`, `i`, or a constant).
//!
//! Vector width is 8 for AVX-float (`avx_level ≥ Avx`) or AVX2-int
//! (`avx_level ≥ Avx2`), 4 otherwise; if the loop's iteration count is below
//! that width it is halved to 4, and below 4 the loop is left unannotated.
//! The loop must start at 0. Element type is read from the array
//! identifier's `resolved_type.element_kind`.

use crate::ast::{
    ElementKind, Expr, ExprKind, Function, Stmt, StmtKind, TokenOp, UnaryOp, VecInfo, VecMode,
};
use crate::fx::FxHashMap;
use crate::options::AvxLevel;

enum Rel {
    Lt,
    Le,
    Ne,
}

pub fn run(function: &mut Function, avx: AvxLevel) {
    if let Some(body) = function.body.take() {
        function.body = Some(process_nested(body, avx));
    }
}

fn process_nested(stmt: Stmt, avx: AvxLevel) -> Stmt {
    if let StmtKind::Block(inner) = stmt.kind {
        Stmt::new(StmtKind::Block(process_block(inner, avx)), stmt.line)
    } else {
        let mut wrapped = process_block(vec![stmt], avx);
        wrapped.pop().expect("process_block preserves length for a singleton input")
    }
}

fn process_block(stmts: Vec<Stmt>, avx: AvxLevel) -> Vec<Stmt> {
    let mut out = Vec::with_capacity(stmts.len());
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
                let body = process_nested(*body, avx);
                let resolved = try_element_wise(&init, &cond, &step, &body, avx)
                    .or_else(|| try_init_mode(&init, &cond, &step, &body, avx));
                out.push(Stmt::new(
                    StmtKind::For { init, cond, step, body: Box::new(body), vec_info: resolved.or(vec_info) },
                    line,
                ));
                last_const = None;
            }
            StmtKind::While { cond, body, vec_info } => {
                let body = process_nested(*body, avx);
                let resolved = try_reduction(&cond, &body, avx, last_const.clone());
                out.push(Stmt::new(
                    StmtKind::While { cond, body: Box::new(body), vec_info: resolved.or(vec_info) },
                    line,
                ));
                last_const = None;
            }
            other => {
                out.push(process_generic(Stmt::new(other, line), avx));
                last_const = None;
            }
        }
    }
    out
}

fn process_generic(stmt: Stmt, avx: AvxLevel) -> Stmt {
    let line = stmt.line;
    let kind = match stmt.kind {
        StmtKind::If { cond, then, els } => StmtKind::If {
            cond,
            then: Box::new(process_nested(*then, avx)),
            els: els.map(|e| Box::new(process_nested(*e, avx))),
        },
        StmtKind::DoWhile { cond, body } => StmtKind::DoWhile { cond, body: Box::new(process_nested(*body, avx)) },
        StmtKind::Switch { cond, body } => StmtKind::Switch { cond, body: Box::new(process_nested(*body, avx)) },
        StmtKind::Block(stmts) => StmtKind::Block(process_block(stmts, avx)),
        other => other,
    };
    Stmt::new(kind, line)
}

fn assign_const(e: &Expr) -> Option<(String, i64)> {
    if let ExprKind::Assign(lhs, rhs) = &e.kind {
        if let ExprKind::Ident(name) = &lhs.kind {
            return rhs.as_integer().map(|v| (name.clone(), v));
        }
    }
    None
}

fn is_ident(e: &Expr, name: &str) -> bool {
    matches!(&e.kind, ExprKind::Ident(n) if n == name)
}

fn canonical_init(init: &Option<Box<Stmt>>) -> Option<(String, i64)> {
    match init.as_deref().map(|s| &s.kind) {
        Some(StmtKind::VarDecl { name, init: Some(e), .. }) => Some((name.clone(), e.as_integer()?)),
        Some(StmtKind::Expr(e)) => assign_const(e),
        _ => None,
    }
}

fn canonical_cond(cond: &Option<Expr>, name: &str) -> Option<(Rel, i64)> {
    let cond = cond.as_ref()?;
    let ExprKind::Binary(op, l, r) = &cond.kind else { return None };
    if !is_ident(l, name) {
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

fn linear_increment(e: &Expr, name: &str) -> Option<i64> {
    if let ExprKind::Assign(lhs, rhs) = &e.kind {
        if is_ident(lhs, name) {
            if let ExprKind::Binary(TokenOp::Add, l, r) = &rhs.kind {
                if is_ident(l, name) {
                    return r.as_integer();
                }
                if is_ident(r, name) {
                    return l.as_integer();
                }
            }
        }
    }
    if let ExprKind::Unary(op, inner) = &e.kind {
        if is_ident(inner, name) && matches!(op, UnaryOp::PreInc | UnaryOp::PostInc) {
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

/// Iteration count for a `for` that starts at 0 (§4.N "must start at 0").
fn canonical_iteration_count(
    init: &Option<Box<Stmt>>,
    cond: &Option<Expr>,
    step: &Option<Expr>,
) -> Option<(String, i64)> {
    let (name, a) = canonical_init(init)?;
    if a != 0 {
        return None;
    }
    let (rel, b) = canonical_cond(cond, &name)?;
    if step.as_ref().and_then(|e| linear_increment(e, &name)) != Some(1) {
        return None;
    }
    let n = match rel {
        Rel::Lt | Rel::Ne => b,
        Rel::Le => b + 1,
    };
    if n < 0 {
        return None;
    }
    Some((name, n))
}

fn array_element_kind(arr_expr: &Expr) -> Option<ElementKind> {
    arr_expr.ty.as_ref().and_then(|t| t.element_kind)
}

fn base_width(is_float: bool, avx: AvxLevel) -> u32 {
    if is_float {
        if avx >= AvxLevel::Avx { 8 } else { 4 }
    } else if avx >= AvxLevel::Avx2 {
        8
    } else {
        4
    }
}

fn vector_width(base: u32, iterations: i64) -> Option<u32> {
    if iterations >= i64::from(base) {
        return Some(base);
    }
    if base > 4 && iterations >= 4 {
        return Some(4);
    }
    None
}

fn try_element_wise(
    init: &Option<Box<Stmt>>,
    cond: &Option<Expr>,
    step: &Option<Expr>,
    body: &Stmt,
    avx: AvxLevel,
) -> Option<VecInfo> {
    let (loop_var, iterations) = canonical_iteration_count(init, cond, step)?;
    let StmtKind::Block(stmts) = &body.kind else { return None };
    let [only] = stmts.as_slice() else { return None };
    let StmtKind::Expr(e) = &only.kind else { return None };
    let ExprKind::Assign(lhs, rhs) = &e.kind else { return None };
    let ExprKind::Index(dst_arr, dst_idx) = &lhs.kind else { return None };
    if !is_ident(dst_idx, &loop_var) {
        return None;
    }
    let ExprKind::Ident(dst_name) = &dst_arr.kind else { return None };
    let ExprKind::Binary(op, l, r) = &rhs.kind else { return None };
    let ExprKind::Index(src1_arr, src1_idx) = &l.kind else { return None };
    let ExprKind::Index(src2_arr, src2_idx) = &r.kind else { return None };
    if !is_ident(src1_idx, &loop_var) || !is_ident(src2_idx, &loop_var) {
        return None;
    }
    let ExprKind::Ident(src1_name) = &src1_arr.kind else { return None };
    let ExprKind::Ident(src2_name) = &src2_arr.kind else { return None };
    let element_kind = array_element_kind(dst_arr)?;
    let is_float = matches!(element_kind, ElementKind::Float32);
    let op_supported = match (op, is_float) {
        (TokenOp::Add, _) | (TokenOp::Sub, _) => true,
        (TokenOp::Mul, true) | (TokenOp::Div, true) => true,
        _ => false,
    };
    if !op_supported {
        return None;
    }
    let width = vector_width(base_width(is_float, avx), iterations)?;
    Some(VecInfo {
        width,
        elem_size: 4,
        is_float,
        op: *op,
        iterations,
        loop_var,
        dst: Some(dst_name.clone()),
        src1: Some(src1_name.clone()),
        src2: Some(src2_name.clone()),
        accum_var: None,
        vec_mode: VecMode::ElementWise,
        init_scale: None,
        init_offset: None,
    })
}

fn try_init_mode(
    init: &Option<Box<Stmt>>,
    cond: &Option<Expr>,
    step: &Option<Expr>,
    body: &Stmt,
    avx: AvxLevel,
) -> Option<VecInfo> {
    let (loop_var, iterations) = canonical_iteration_count(init, cond, step)?;
    let StmtKind::Block(stmts) = &body.kind else { return None };
    let [only] = stmts.as_slice() else { return None };
    let StmtKind::Expr(e) = &only.kind else { return None };
    let ExprKind::Assign(lhs, rhs) = &e.kind else { return None };
    let ExprKind::Index(arr, idx) = &lhs.kind else { return None };
    if !is_ident(idx, &loop_var) {
        return None;
    }
    let ExprKind::Ident(dst_name) = &arr.kind else { return None };
    let (scale, offset) = parse_linear(rhs, &loop_var)?;
    let element_kind = array_element_kind(arr)?;
    let is_float = matches!(element_kind, ElementKind::Float32);
    let width = vector_width(base_width(is_float, avx), iterations)?;
    Some(VecInfo {
        width,
        elem_size: 4,
        is_float,
        op: TokenOp::Add,
        iterations,
        loop_var,
        dst: Some(dst_name.clone()),
        src1: None,
        src2: None,
        accum_var: None,
        vec_mode: VecMode::Init,
        init_scale: Some(scale),
        init_offset: Some(offset),
    })
}

/// `K*i` (either order) → `(K, 0)`; standalone `i` → `(1, 0)`.
fn parse_scaled(expr: &Expr, loop_var: &str) -> Option<i64> {
    if is_ident(expr, loop_var) {
        return Some(1);
    }
    if let ExprKind::Binary(TokenOp::Mul, l, r) = &expr.kind {
        if is_ident(l, loop_var) {
            return r.as_integer();
        }
        if is_ident(r, loop_var) {
            return l.as_integer();
        }
    }
    None
}

/// `K*i + C`, `i + C`, bare `K*i`/`i`, or a bare constant (any operand order).
fn parse_linear(expr: &Expr, loop_var: &str) -> Option<(i64, i64)> {
    if let Some(c) = expr.as_integer() {
        return Some((0, c));
    }
    if let Some(k) = parse_scaled(expr, loop_var) {
        return Some((k, 0));
    }
    if let ExprKind::Binary(TokenOp::Add, l, r) = &expr.kind {
        if let Some(k) = parse_scaled(l, loop_var) {
            if let Some(c) = r.as_integer() {
                return Some((k, c));
            }
        }
        if let Some(k) = parse_scaled(r, loop_var) {
            if let Some(c) = l.as_integer() {
                return Some((k, c));
            }
        }
    }
    None
}

/// A `while (i REL bound) { acc = acc + arr[i]; i = i + 1; }` reduction,
/// where `last_const` is the `i = 0` statement immediately preceding the
/// loop (§4.N has no separate `init` slot on `while`, unlike `for`).
fn try_reduction(cond: &Expr, body: &Stmt, avx: AvxLevel, last_const: Option<(String, i64)>) -> Option<VecInfo> {
    let ExprKind::Binary(op, l, r) = &cond.kind else { return None };
    let ExprKind::Ident(loop_var) = &l.kind else { return None };
    let bound = r.as_integer()?;
    let (start_name, start_val) = last_const?;
    if start_name != *loop_var || start_val != 0 {
        return None;
    }
    let iterations = match op {
        TokenOp::Lt | TokenOp::Ne => bound,
        TokenOp::Le => bound + 1,
        _ => return None,
    };
    if iterations < 0 {
        return None;
    }

    let StmtKind::Block(stmts) = &body.kind else { return None };
    let [acc_stmt, step_stmt] = stmts.as_slice() else { return None };
    if linear_increment_stmt(step_stmt, loop_var) != Some(1) {
        return None;
    }
    let StmtKind::Expr(acc_e) = &acc_stmt.kind else { return None };
    let ExprKind::Assign(acc_lhs, acc_rhs) = &acc_e.kind else { return None };
    let ExprKind::Ident(acc_name) = &acc_lhs.kind else { return None };
    let ExprKind::Binary(TokenOp::Add, l2, r2) = &acc_rhs.kind else { return None };
    let (arr_expr, arr_name) = if is_ident(l2, acc_name) {
        let ExprKind::Index(arr, idx) = &r2.kind else { return None };
        if !is_ident(idx, loop_var) {
            return None;
        }
        let ExprKind::Ident(name) = &arr.kind else { return None };
        (arr.as_ref(), name)
    } else if is_ident(r2, acc_name) {
        let ExprKind::Index(arr, idx) = &l2.kind else { return None };
        if !is_ident(idx, loop_var) {
            return None;
        }
        let ExprKind::Ident(name) = &arr.kind else { return None };
        (arr.as_ref(), name)
    } else {
        return None;
    };
    let element_kind = array_element_kind(arr_expr)?;
    let is_float = matches!(element_kind, ElementKind::Float32);
    let width = vector_width(base_width(is_float, avx), iterations)?;
    Some(VecInfo {
        width,
        elem_size: 4,
        is_float,
        op: TokenOp::Add,
        iterations,
        loop_var: loop_var.clone(),
        dst: None,
        src1: Some(arr_name.clone()),
        src2: None,
        accum_var: Some(acc_name.clone()),
        vec_mode: VecMode::Reduction,
        init_scale: None,
        init_offset: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::TypeInfo;
    use std::rc::Rc;

    fn ident(name: &str) -> Expr {
        Expr::new(ExprKind::Ident(name.to_string()), 0)
    }

    fn int(v: i64) -> Expr {
        Expr::new(ExprKind::Integer(v), 0)
    }

    fn int_array(name: &str) -> Expr {
        let mut e = ident(name);
        e.ty = Some(Rc::new(TypeInfo::array_of(ElementKind::Int32)));
        e
    }

    fn index(arr: Expr, idx: Expr) -> Expr {
        Expr::new(ExprKind::Index(Box::new(arr), Box::new(idx)), 0)
    }

    fn assign(lhs: Expr, rhs: Expr) -> Stmt {
        Stmt::new(StmtKind::Expr(Expr::new(ExprKind::Assign(Box::new(lhs), Box::new(rhs)), 0)), 0)
    }

    #[test]
    fn element_wise_add_is_annotated_with_width_four_without_avx() {
        let body = Stmt::block(
            vec![assign(
                index(int_array("a"), ident("i")),
                Expr::new(
                    ExprKind::Binary(TokenOp::Add, Box::new(index(int_array("b"), ident("i"))), Box::new(index(int_array("c"), ident("i")))),
                    0,
                ),
            )],
            0,
        );
        let for_stmt = Stmt::new(
            StmtKind::For {
                init: Some(Box::new(Stmt::new(
                    StmtKind::Expr(Expr::new(ExprKind::Assign(Box::new(ident("i")), Box::new(int(0))), 0)),
                    0,
                ))),
                cond: Some(Expr::new(ExprKind::Binary(TokenOp::Lt, Box::new(ident("i")), Box::new(int(16))), 0)),
                step: Some(Expr::new(ExprKind::Unary(UnaryOp::PostInc, Box::new(ident("i"))), 0)),
                body: Box::new(body),
                vec_info: None,
            },
            0,
        );
        let out = process_block(vec![for_stmt], AvxLevel::None);
        let StmtKind::For { vec_info: Some(info), .. } = &out[0].kind else { panic!("expected annotation") };
        assert_eq!(info.width, 4);
        assert!(matches!(info.vec_mode, VecMode::ElementWise));
    }

    #[test]
    fn int_multiply_is_not_vectorized() {
        let body = Stmt::block(
            vec![assign(
                index(int_array("a"), ident("i")),
                Expr::new(
                    ExprKind::Binary(TokenOp::Mul, Box::new(index(int_array("b"), ident("i"))), Box::new(index(int_array("c"), ident("i")))),
                    0,
                ),
            )],
            0,
        );
        let for_stmt = Stmt::new(
            StmtKind::For {
                init: Some(Box::new(Stmt::new(
                    StmtKind::Expr(Expr::new(ExprKind::Assign(Box::new(ident("i")), Box::new(int(0))), 0)),
                    0,
                ))),
                cond: Some(Expr::new(ExprKind::Binary(TokenOp::Lt, Box::new(ident("i")), Box::new(int(16))), 0)),
                step: Some(Expr::new(ExprKind::Unary(UnaryOp::PostInc, Box::new(ident("i"))), 0)),
                body: Box::new(body),
                vec_info: None,
            },
            0,
        );
        let out = process_block(vec![for_stmt], AvxLevel::Avx2);
        assert!(matches!(&out[0].kind, StmtKind::For { vec_info: None, .. }));
    }

    #[test]
    fn short_loop_is_not_vectorized() {
        let body =
            Stmt::block(vec![assign(index(int_array("a"), ident("i")), index(int_array("b"), ident("i")))], 0);
        let for_stmt = Stmt::new(
            StmtKind::For {
                init: Some(Box::new(Stmt::new(
                    StmtKind::Expr(Expr::new(ExprKind::Assign(Box::new(ident("i")), Box::new(int(0))), 0)),
                    0,
                ))),
                cond: Some(Expr::new(ExprKind::Binary(TokenOp::Lt, Box::new(ident("i")), Box::new(int(2))), 0)),
                step: Some(Expr::new(ExprKind::Unary(UnaryOp::PostInc, Box::new(ident("i"))), 0)),
                body: Box::new(body),
                vec_info: None,
            },
            0,
        );
        let out = process_block(vec![for_stmt], AvxLevel::None);
        assert!(matches!(&out[0].kind, StmtKind::For { vec_info: None, .. }));
    }

    #[test]
    fn reduction_while_after_zero_init_is_annotated() {
        let init = Stmt::new(
            StmtKind::Expr(Expr::new(ExprKind::Assign(Box::new(ident("i")), Box::new(int(0))), 0)),
            0,
        );
        let acc = assign(
            ident("acc"),
            Expr::new(ExprKind::Binary(TokenOp::Add, Box::new(ident("acc")), Box::new(index(int_array("arr"), ident("i")))), 0),
        );
        let step = assign(
            ident("i"),
            Expr::new(ExprKind::Binary(TokenOp::Add, Box::new(ident("i")), Box::new(int(1))), 0),
        );
        let while_stmt = Stmt::new(
            StmtKind::While {
                cond: Expr::new(ExprKind::Binary(TokenOp::Lt, Box::new(ident("i")), Box::new(int(32))), 0),
                body: Box::new(Stmt::block(vec![acc, step], 0)),
                vec_info: None,
            },
            0,
        );
        let out = process_block(vec![init, while_stmt], AvxLevel::None);
        let StmtKind::While { vec_info: Some(info), .. } = &out[1].kind else { panic!("expected annotation") };
        assert!(matches!(info.vec_mode, VecMode::Reduction));
        assert_eq!(info.accum_var.as_deref(), Some("acc"));
    }
}
