//! Black-box scenarios from the design notes, exercised against the crate's
//! public `occ_backend::{ast, opt, encoder}` surface rather than any
//! module-private helper.

use occ_backend::ast::{Expr, ExprKind, Function, Param, Program, Stmt, StmtKind, TokenOp};
use occ_backend::encoder::{self, Cond, EncoderCtx, Mnemonic};
use occ_backend::operand::Operand;
use occ_backend::options::{Bitness, CompilerOptions, OptLevel};
use occ_backend::opt;

fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn int(v: i64) -> Expr {
    Expr::new(ExprKind::Integer(v), 0)
}

fn ident(name: &str) -> Expr {
    Expr::new(ExprKind::Ident(name.to_string()), 0)
}

fn assign(lhs: Expr, rhs: Expr) -> Stmt {
    Stmt::new(StmtKind::Expr(Expr::new(ExprKind::Assign(Box::new(lhs), Box::new(rhs)), 0)), 0)
}

fn make_fn(name: &str, params: Vec<Param>, body: Stmt, is_static: bool) -> Function {
    Function { name: name.to_string(), params, body: Some(body), inline_hint: Function::DEFAULT, is_static, line: 0 }
}

fn return_int(stmts: &[Stmt]) -> i64 {
    let StmtKind::Block(b) = &stmts[0].kind else { panic!("expected a block body") };
    let StmtKind::Return(Some(e)) = &b[0].kind else { panic!("expected a leading return") };
    e.as_integer().expect("return value did not fold to a constant")
}

#[test]
fn scenario_1_o1_folds_nested_arithmetic_to_a_single_literal() {
    init_log();
    // int f() { return 3 + 4 * 2; }
    let mul = Expr::new(ExprKind::Binary(TokenOp::Mul, Box::new(int(4)), Box::new(int(2))), 0);
    let add = Expr::new(ExprKind::Binary(TokenOp::Add, Box::new(int(3)), Box::new(mul)), 0);
    let f = make_fn("f", vec![], Stmt::block(vec![Stmt::new(StmtKind::Return(Some(add)), 0)], 0), false);
    let mut program = Program { functions: vec![f] };
    let mut options = CompilerOptions::default();
    options.opt_level = OptLevel::O1;
    opt::run_pipeline(&mut program, &options);

    let f = program.find("f").unwrap();
    let StmtKind::Block(stmts) = &f.body.as_ref().unwrap().kind else { panic!() };
    let StmtKind::Return(Some(e)) = &stmts[0].kind else { panic!() };
    assert_eq!(e.as_integer(), Some(11));
}

#[test]
fn scenario_2_o3_unrolls_and_folds_a_constant_loop_sum() {
    init_log();
    // int main() { int sum = 0; for (int i=0; i<5; i++) sum = sum + i; return sum; }
    let sum_decl = Stmt::new(
        StmtKind::VarDecl { name: "sum".to_string(), ty: None, init: Some(int(0)), is_static: false, is_extern: false },
        0,
    );
    let for_stmt = Stmt::new(
        StmtKind::For {
            init: Some(Box::new(Stmt::new(
                StmtKind::VarDecl { name: "i".to_string(), ty: None, init: Some(int(0)), is_static: false, is_extern: false },
                0,
            ))),
            cond: Some(Expr::new(ExprKind::Binary(TokenOp::Lt, Box::new(ident("i")), Box::new(int(5))), 0)),
            step: Some(Expr::new(
                ExprKind::Assign(
                    Box::new(ident("i")),
                    Box::new(Expr::new(ExprKind::Binary(TokenOp::Add, Box::new(ident("i")), Box::new(int(1))), 0)),
                ),
                0,
            )),
            body: Box::new(Stmt::block(
                vec![assign(ident("sum"), Expr::new(ExprKind::Binary(TokenOp::Add, Box::new(ident("sum")), Box::new(ident("i"))), 0))],
                0,
            )),
            vec_info: None,
        },
        0,
    );
    let ret = Stmt::new(StmtKind::Return(Some(ident("sum"))), 0);
    let main = make_fn("main", vec![], Stmt::block(vec![sum_decl, for_stmt, ret], 0), false);
    let mut program = Program { functions: vec![main] };
    let mut options = CompilerOptions::default();
    options.opt_level = OptLevel::O3;
    opt::run_pipeline(&mut program, &options);

    let main = program.find("main").unwrap();
    let StmtKind::Block(stmts) = &main.body.as_ref().unwrap().kind else { panic!() };
    assert_eq!(return_int(std::slice::from_ref(stmts.last().unwrap())), 10);
    assert!(
        !stmts.iter().any(|s| matches!(s.kind, StmtKind::For { .. })),
        "the for loop should have been fully unrolled away"
    );
}

#[test]
fn scenario_3_encoder_mov_imm64() {
    let mut ctx = EncoderCtx::new(Bitness::Bits64);
    encoder::emit_inst2(&mut ctx, Mnemonic::Mov, &Operand::imm(0x1234567890abcdef_i64), &Operand::reg("rax"));
    assert_eq!(ctx.buf.as_slice(), &[0x48, 0xB8, 0xEF, 0xCD, 0xAB, 0x90, 0x78, 0x56, 0x34, 0x12]);
}

#[test]
fn scenario_4_encoder_add_reg_reg() {
    let mut ctx = EncoderCtx::new(Bitness::Bits64);
    encoder::emit_inst2(&mut ctx, Mnemonic::Arith(occ_backend::encoder::ArithOp::Add), &Operand::reg("rbx"), &Operand::reg("rcx"));
    assert_eq!(ctx.buf.as_slice(), &[0x48, 0x01, 0xD9]);
}

#[test]
fn scenario_5_encoder_jne_registers_relative_relocation() {
    let mut ctx = EncoderCtx::new(Bitness::Bits64);
    encoder::emit_inst1(&mut ctx, Mnemonic::Jcc(Cond::Ne), &Operand::label("label"));
    assert_eq!(ctx.buf.as_slice(), &[0x0F, 0x85, 0x00, 0x00, 0x00, 0x00]);
    let relocs = ctx.relocs.relocations();
    assert_eq!(relocs.len(), 1);
    assert_eq!(relocs[0].offset, 2);
}

#[test]
fn scenario_6_ipa_reduces_static_helper_to_its_constant_and_drops_it() {
    init_log();
    // static int helper(int x) { return 99; } int main() { return helper(7); }
    let helper = make_fn(
        "helper",
        vec![Param { name: "x".to_string(), ty: None }],
        Stmt::block(vec![Stmt::new(StmtKind::Return(Some(int(99))), 0)], 0),
        true,
    );
    let main = make_fn(
        "main",
        vec![],
        Stmt::block(vec![Stmt::new(StmtKind::Return(Some(Expr::new(ExprKind::Call("helper".to_string(), vec![int(7)]), 0))), 0)], 0),
        false,
    );
    let mut program = Program { functions: vec![helper, main] };
    let mut options = CompilerOptions::default();
    options.opt_level = OptLevel::O3;
    opt::run_pipeline(&mut program, &options);

    assert!(program.find("helper").is_none(), "helper should have zero remaining call sites after propagation");
    let main = program.find("main").unwrap();
    let StmtKind::Block(stmts) = &main.body.as_ref().unwrap().kind else { panic!() };
    let StmtKind::Return(Some(e)) = &stmts[0].kind else { panic!() };
    assert_eq!(e.as_integer(), Some(99));
}

#[test]
fn invariant_o1_is_idempotent_on_the_same_program() {
    let mul = Expr::new(ExprKind::Binary(TokenOp::Mul, Box::new(int(4)), Box::new(int(2))), 0);
    let add = Expr::new(ExprKind::Binary(TokenOp::Add, Box::new(int(3)), Box::new(mul)), 0);
    let f = make_fn("f", vec![], Stmt::block(vec![Stmt::new(StmtKind::Return(Some(add)), 0)], 0), false);
    let mut once = Program { functions: vec![f.clone()] };
    let mut twice = Program { functions: vec![f] };
    let mut options = CompilerOptions::default();
    options.opt_level = OptLevel::O1;
    opt::run_pipeline(&mut once, &options);
    opt::run_pipeline(&mut twice, &options);
    opt::run_pipeline(&mut twice, &options);
    assert_eq!(return_int(std::slice::from_ref(&once.find("f").unwrap().body.as_ref().unwrap())), 11);
    assert_eq!(return_int(std::slice::from_ref(&twice.find("f").unwrap().body.as_ref().unwrap())), 11);
}

#[test]
fn invariant_fold_of_plus_zero_is_structurally_the_bare_identifier() {
    let expr = Expr::new(ExprKind::Binary(TokenOp::Add, Box::new(ident("x")), Box::new(int(0))), 0);
    let f = make_fn("f", vec![], Stmt::block(vec![Stmt::new(StmtKind::Return(Some(expr)), 0)], 0), false);
    let mut program = Program { functions: vec![f] };
    let mut options = CompilerOptions::default();
    options.opt_level = OptLevel::O1;
    opt::run_pipeline(&mut program, &options);
    let f = program.find("f").unwrap();
    let StmtKind::Block(stmts) = &f.body.as_ref().unwrap().kind else { panic!() };
    let StmtKind::Return(Some(e)) = &stmts[0].kind else { panic!() };
    assert!(matches!(&e.kind, ExprKind::Ident(n) if n == "x"));
}

#[test]
fn invariant_dead_function_elimination_never_removes_main() {
    let main = make_fn("main", vec![], Stmt::block(vec![Stmt::new(StmtKind::Return(Some(int(0))), 0)], 0), false);
    let mut program = Program { functions: vec![main] };
    let mut options = CompilerOptions::default();
    options.opt_level = OptLevel::O3;
    opt::run_pipeline(&mut program, &options);
    assert!(program.find("main").is_some());
}
