//! End-to-end tests of the IR pipeline: the tail-call optimizer and the
//! await transform, each re-checked by the IR validator and (where the
//! direct-style fragment allows) run through the reference interpreter.

use scrip::eval::{eval_exp, Value};
use scrip::ir::construct::*;
use scrip::ir::validate::{check_prog, Scope};
use scrip::ir::{Arg, Dec, DecKind, Exp, ExpKind, Flavor, Prog, RelOp};
use scrip::pass::{await_lowering, tailcall};
use scrip::source::Span;
use scrip::types::{Control, FuncSort, Type};

fn prog_of_exp(e: Exp) -> Prog {
    Prog {
        args: Vec::new(),
        decs: vec![vec![exp_dec(e)]],
        fields: Vec::new(),
        flavor: Flavor::initial(),
        span: Span::Empty,
    }
}

fn prog_of_decs(decs: Vec<Dec>) -> Prog {
    Prog {
        args: Vec::new(),
        decs: vec![decs],
        fields: Vec::new(),
        flavor: Flavor::initial(),
        span: Span::Empty,
    }
}

fn exp_of_prog(prog: &Prog) -> &Exp {
    match &prog.decs[0][0].kind {
        DecKind::Let(_, e) => e,
        _ => panic!("expected a let declaration"),
    }
}

/// Visit every expression in a tree, declarations included, reporting
/// how many function bodies enclose each node. CPS output nests "later"
/// code deeper in continuation closures.
fn walk_at(exp: &Exp, depth: usize, visit: &mut dyn FnMut(&Exp, usize)) {
    visit(exp, depth);
    match &exp.kind {
        ExpKind::Lit(_) | ExpKind::Var(_) | ExpKind::Prim(_) | ExpKind::NewObj(..) => {}
        ExpKind::Un(_, _, e)
        | ExpKind::Show(_, e)
        | ExpKind::Proj(e, _)
        | ExpKind::Opt(e)
        | ExpKind::Tag(_, e)
        | ExpKind::Dot(e, _)
        | ExpKind::ActorDot(e, _)
        | ExpKind::Loop(e)
        | ExpKind::Label(_, _, e)
        | ExpKind::Break(_, e)
        | ExpKind::Ret(e)
        | ExpKind::Async(e)
        | ExpKind::Await(e)
        | ExpKind::Assert(e)
        | ExpKind::Declare(_, _, e)
        | ExpKind::Define(_, _, e) => walk_at(e, depth, visit),
        ExpKind::Bin(_, _, e1, e2)
        | ExpKind::Rel(_, _, e1, e2)
        | ExpKind::Idx(e1, e2)
        | ExpKind::Assign(e1, e2) => {
            walk_at(e1, depth, visit);
            walk_at(e2, depth, visit);
        }
        ExpKind::Tup(es) | ExpKind::Array(_, _, es) => {
            es.iter().for_each(|e| walk_at(e, depth, visit))
        }
        ExpKind::Call(_, f, _, arg) => {
            walk_at(f, depth, visit);
            walk_at(arg, depth, visit);
        }
        ExpKind::Func { body, .. } => walk_at(body, depth + 1, visit),
        ExpKind::Block(decs, e) => {
            decs.iter().for_each(|d| walk_dec_at(d, depth, visit));
            walk_at(e, depth, visit);
        }
        ExpKind::If(c, t, f) => {
            walk_at(c, depth, visit);
            walk_at(t, depth, visit);
            walk_at(f, depth, visit);
        }
        ExpKind::Switch(scrut, cases) => {
            walk_at(scrut, depth, visit);
            cases.iter().for_each(|case| walk_at(&case.exp, depth, visit));
        }
        ExpKind::Actor(decs, _, _) => {
            decs.iter().for_each(|d| walk_dec_at(d, depth, visit))
        }
    }
}

fn walk_dec(dec: &Dec, visit: &mut dyn FnMut(&Exp)) {
    walk_dec_at(dec, 0, &mut |e, _| visit(e));
}

fn walk_dec_at(dec: &Dec, depth: usize, visit: &mut dyn FnMut(&Exp, usize)) {
    match &dec.kind {
        DecKind::Let(_, e) | DecKind::Var(_, e) => walk_at(e, depth, visit),
        DecKind::Typ(_) => {}
    }
}

fn walk_prog(prog: &Prog, visit: &mut dyn FnMut(&Exp)) {
    for group in &prog.decs {
        for dec in group {
            walk_dec(dec, visit);
        }
    }
}

fn walk_prog_at(prog: &Prog, visit: &mut dyn FnMut(&Exp, usize)) {
    for group in &prog.decs {
        for dec in group {
            walk_dec_at(dec, 0, visit);
        }
    }
}

fn count_in_prog(prog: &Prog, pred: fn(&ExpKind) -> bool) -> usize {
    let mut count = 0;
    walk_prog(prog, &mut |e| {
        if pred(&e.kind) {
            count += 1;
        }
    });
    count
}

fn nat_func_typ() -> Type {
    Type::Func(
        FuncSort::Local,
        Control::Returns,
        Vec::new(),
        vec![Type::nat()],
        vec![Type::nat()],
    )
}

/// `let f = func(n : Nat) : Nat { if n == 0 then 0 else f(n - 1) }; f(arg)`
fn countdown(arg: u64) -> Exp {
    let n = || var_exp("n", Type::nat());
    let recurse = call_exp(
        var_exp("f", nat_func_typ()),
        Vec::new(),
        bin_exp(Type::nat(), scrip::ir::BinOp::Sub, n(), nat_exp(1)),
    );
    let body = if_exp(
        rel_exp(Type::nat(), RelOp::Eq, n(), nat_exp(0)),
        nat_exp(0),
        recurse,
        Type::nat(),
    );
    let f = local_func_exp("f", vec![Arg::new("n", Type::nat())], vec![Type::nat()], body);
    block_exp(
        vec![let_dec(var_pat("f", f.note.typ.clone()), f)],
        call_exp(var_exp("f", nat_func_typ()), Vec::new(), nat_exp(arg)),
    )
}

/// As [`countdown`], but the recursive call is not in tail position:
/// `if n == 0 then 0 else f(n - 1) + 1`.
fn countup(arg: u64) -> Exp {
    let n = || var_exp("n", Type::nat());
    let recurse = call_exp(
        var_exp("f", nat_func_typ()),
        Vec::new(),
        bin_exp(Type::nat(), scrip::ir::BinOp::Sub, n(), nat_exp(1)),
    );
    let body = if_exp(
        rel_exp(Type::nat(), RelOp::Eq, n(), nat_exp(0)),
        nat_exp(0),
        bin_exp(Type::nat(), scrip::ir::BinOp::Add, recurse, nat_exp(1)),
        Type::nat(),
    );
    let f = local_func_exp("f", vec![Arg::new("n", Type::nat())], vec![Type::nat()], body);
    block_exp(
        vec![let_dec(var_pat("f", f.note.typ.clone()), f)],
        call_exp(var_exp("f", nat_func_typ()), Vec::new(), nat_exp(arg)),
    )
}

fn assert_nat(value: Result<Value, String>, expected: u64) {
    match value {
        Ok(Value::Nat(n)) => assert_eq!(n, expected.into()),
        other => panic!("expected {}, got {:?}", expected, other),
    }
}

// ---------------------------------------------------------------------------
// Tail calls

#[test]
fn tail_call_pass_preserves_types() {
    let prog = prog_of_exp(countdown(3));
    check_prog(&Scope::new(), "desugaring", &prog).unwrap();
    let optimized = tailcall::transform(prog);
    check_prog(&Scope::new(), "tail call optimization", &optimized).unwrap();
}

#[test]
fn self_tail_call_becomes_a_loop() {
    let optimized = tailcall::transform(prog_of_exp(countdown(3)));
    assert!(count_in_prog(&optimized, |k| matches!(k, ExpKind::Loop(_))) > 0);
    assert_nat(eval_exp(exp_of_prog(&optimized)), 0);
}

#[test]
fn rewritten_function_runs_in_bounded_stack() {
    // Deep enough that the call-per-recursion form would exhaust the
    // interpreter's stack.
    let optimized = tailcall::transform(prog_of_exp(countdown(50_000)));
    assert_nat(eval_exp(exp_of_prog(&optimized)), 0);
}

#[test]
fn non_tail_self_call_is_left_alone() {
    let prog = prog_of_exp(countup(3));
    let optimized = tailcall::transform(prog);
    assert_eq!(
        count_in_prog(&optimized, |k| matches!(k, ExpKind::Loop(_))),
        0
    );
    check_prog(&Scope::new(), "tail call optimization", &optimized).unwrap();
    assert_nat(eval_exp(exp_of_prog(&optimized)), 3);
}

#[test]
fn rewrite_computes_the_same_function() {
    for n in [0, 1, 2, 7, 19] {
        let plain = eval_exp(exp_of_prog(&prog_of_exp(countdown(n))));
        let optimized = tailcall::transform(prog_of_exp(countdown(n)));
        let looped = eval_exp(exp_of_prog(&optimized));
        match (plain, looped) {
            (Ok(Value::Nat(a)), Ok(Value::Nat(b))) => assert_eq!(a, b),
            other => panic!("evaluation diverged: {:?}", other),
        }
    }
}

#[test]
fn tail_call_pass_is_idempotent() {
    let once = tailcall::transform(prog_of_exp(countdown(3)));
    let twice = tailcall::transform(once.clone());
    assert_eq!(once.decs, twice.decs);
}

#[test]
fn multi_parameter_tail_calls_assign_componentwise() {
    // let f = func(n : Nat, acc : Nat) : Nat {
    //     if n == 0 then acc else f(n - 1, acc + n)
    // }; f(10, 0)  -- triangular number by accumulation
    let fty = Type::Func(
        FuncSort::Local,
        Control::Returns,
        Vec::new(),
        vec![Type::nat(), Type::nat()],
        vec![Type::nat()],
    );
    let n = || var_exp("n", Type::nat());
    let acc = || var_exp("acc", Type::nat());
    let recurse = call_exp(
        var_exp("f", fty.clone()),
        Vec::new(),
        tup_exp(vec![
            bin_exp(Type::nat(), scrip::ir::BinOp::Sub, n(), nat_exp(1)),
            bin_exp(Type::nat(), scrip::ir::BinOp::Add, acc(), n()),
        ]),
    );
    let body = if_exp(
        rel_exp(Type::nat(), RelOp::Eq, n(), nat_exp(0)),
        acc(),
        recurse,
        Type::nat(),
    );
    let f = local_func_exp(
        "f",
        vec![Arg::new("n", Type::nat()), Arg::new("acc", Type::nat())],
        vec![Type::nat()],
        body,
    );
    let e = block_exp(
        vec![let_dec(var_pat("f", f.note.typ.clone()), f)],
        call_exp(
            var_exp("f", fty),
            Vec::new(),
            tup_exp(vec![nat_exp(10), nat_exp(0)]),
        ),
    );
    let prog = prog_of_exp(e);
    check_prog(&Scope::new(), "desugaring", &prog).unwrap();
    let optimized = tailcall::transform(prog);
    check_prog(&Scope::new(), "tail call optimization", &optimized).unwrap();
    assert_nat(eval_exp(exp_of_prog(&optimized)), 55);
}

#[test]
fn shadowed_bindings_disable_the_rewrite() {
    // The inner block rebinds f, so the "self" call is not a self call.
    let inner_f = local_func_exp(
        "f",
        vec![Arg::new("m", Type::nat())],
        vec![Type::nat()],
        var_exp("m", Type::nat()),
    );
    let body = block_exp(
        vec![let_dec(var_pat("f", inner_f.note.typ.clone()), inner_f)],
        call_exp(var_exp("f", nat_func_typ()), Vec::new(), var_exp("n", Type::nat())),
    );
    let f = local_func_exp("f", vec![Arg::new("n", Type::nat())], vec![Type::nat()], body);
    let e = block_exp(
        vec![let_dec(var_pat("f", f.note.typ.clone()), f)],
        call_exp(var_exp("f", nat_func_typ()), Vec::new(), nat_exp(5)),
    );
    let optimized = tailcall::transform(prog_of_exp(e));
    // Only the inner function is called; no loop may be introduced for
    // the outer one.
    assert_eq!(
        count_in_prog(&optimized, |k| matches!(k, ExpKind::Loop(_))),
        0
    );
    check_prog(&Scope::new(), "tail call optimization", &optimized).unwrap();
    assert_nat(eval_exp(exp_of_prog(&optimized)), 5);
}

// ---------------------------------------------------------------------------
// Await lowering

/// `let p = async 1; let q = async 2; <body using p, q>`
fn async_prog(body: Exp) -> Prog {
    prog_of_decs(vec![
        let_dec(
            var_pat("p", Type::promise(Type::nat())),
            async_exp(nat_exp(1)),
        ),
        let_dec(
            var_pat("q", Type::promise(Type::nat())),
            async_exp(nat_exp(2)),
        ),
        exp_dec(body),
    ])
}

fn p_var() -> Exp {
    var_exp("p", Type::promise(Type::nat()))
}

fn q_var() -> Exp {
    var_exp("q", Type::promise(Type::nat()))
}

#[test]
fn await_pass_erases_async_and_await() {
    // async { await p; 1 + 2 }
    let body = async_exp(block_exp(
        vec![exp_dec(await_exp(p_var()))],
        bin_exp(Type::nat(), scrip::ir::BinOp::Add, nat_exp(1), nat_exp(2)),
    ));
    let prog = async_prog(body);
    check_prog(&Scope::new(), "desugaring", &prog).unwrap();

    let lowered = await_lowering::transform(prog);
    assert!(!lowered.flavor.has_await);
    assert_eq!(
        count_in_prog(&lowered, |k| matches!(
            k,
            ExpKind::Async(_) | ExpKind::Await(_)
        )),
        0
    );
    // The async body now goes through the primitives.
    assert!(count_in_prog(&lowered, |k| matches!(k, ExpKind::Prim(p) if p == "@async")) > 0);
    assert!(count_in_prog(&lowered, |k| matches!(k, ExpKind::Prim(p) if p == "@await")) > 0);
    check_prog(&Scope::new(), "await lowering", &lowered).unwrap();
}

#[test]
fn sequential_awaits_declare_before_defining() {
    // async { let x = await p; let y = await q; x + y }
    let body = async_exp(block_exp(
        vec![
            let_dec(var_pat("x", Type::nat()), await_exp(p_var())),
            let_dec(var_pat("y", Type::nat()), await_exp(q_var())),
        ],
        bin_exp(
            Type::nat(),
            scrip::ir::BinOp::Add,
            var_exp("x", Type::nat()),
            var_exp("y", Type::nat()),
        ),
    ));
    let prog = async_prog(body);
    check_prog(&Scope::new(), "desugaring", &prog).unwrap();

    let lowered = await_lowering::transform(prog);
    check_prog(&Scope::new(), "await lowering", &lowered).unwrap();

    // Both bindings are announced up front and defined after their
    // initializers resolve. (The async body's binders were refreshed
    // when it was lifted, so only their hints survive.)
    let mut declares = Vec::new();
    let mut defines = Vec::new();
    walk_prog(&lowered, &mut |e| match &e.kind {
        ExpKind::Declare(id, _, _) => declares.push(id.clone()),
        ExpKind::Define(id, _, _) => defines.push(id.clone()),
        _ => {}
    });
    assert_eq!(declares.len(), 2);
    assert!(declares.iter().any(|id| id.starts_with("$x")));
    assert!(declares.iter().any(|id| id.starts_with("$y")));
    for id in &declares {
        assert!(defines.contains(id), "{} is declared but never defined", id);
    }

    // Evaluation order is preserved: the second await sits deeper in
    // continuation closures than the first.
    let mut p_depth = None;
    let mut q_depth = None;
    walk_prog_at(&lowered, &mut |e, depth| {
        if let ExpKind::Var(id) = &e.kind {
            if id == "p" {
                p_depth = Some(p_depth.unwrap_or(depth).max(depth));
            } else if id == "q" {
                q_depth = Some(q_depth.unwrap_or(depth).max(depth));
            }
        }
    });
    assert!(p_depth.unwrap() < q_depth.unwrap());
}

#[test]
fn labels_crossing_awaits_become_continuations() {
    // async { label l : Nat { break l (await p) } }
    let body = async_exp(label_exp(
        "l",
        Type::nat(),
        break_exp("l", await_exp(p_var())),
    ));
    let prog = async_prog(body);
    check_prog(&Scope::new(), "desugaring", &prog).unwrap();

    let lowered = await_lowering::transform(prog);
    check_prog(&Scope::new(), "await lowering", &lowered).unwrap();
    assert_eq!(
        count_in_prog(&lowered, |k| matches!(
            k,
            ExpKind::Label(..) | ExpKind::Break(..)
        )),
        0
    );
}

#[test]
fn conditionals_under_await_share_one_continuation() {
    // async { if (await p) == 1 then 10 else 20 }
    let body = async_exp(if_exp(
        rel_exp(Type::nat(), RelOp::Eq, await_exp(p_var()), nat_exp(1)),
        nat_exp(10),
        nat_exp(20),
        Type::nat(),
    ));
    let prog = async_prog(body);
    check_prog(&Scope::new(), "desugaring", &prog).unwrap();
    let lowered = await_lowering::transform(prog);
    check_prog(&Scope::new(), "await lowering", &lowered).unwrap();
}

#[test]
fn loops_under_await_are_translated() {
    // async { label exit : () { loop { await p; break exit () } } }
    let body = async_exp(label_exp(
        "exit",
        Type::unit(),
        loop_exp(block_exp(
            vec![exp_dec(await_exp(p_var()))],
            break_exp("exit", unit_exp()),
        )),
    ));
    let prog = async_prog(body);
    check_prog(&Scope::new(), "desugaring", &prog).unwrap();
    let lowered = await_lowering::transform(prog);
    check_prog(&Scope::new(), "await lowering", &lowered).unwrap();
    assert_eq!(
        count_in_prog(&lowered, |k| matches!(k, ExpKind::Loop(_))),
        0
    );
}

#[test]
fn pure_code_stays_in_direct_style() {
    let prog = prog_of_exp(countdown(3));
    let lowered = await_lowering::transform(prog);
    check_prog(&Scope::new(), "await lowering", &lowered).unwrap();
    // No continuations were introduced.
    assert_eq!(
        count_in_prog(&lowered, |k| matches!(k, ExpKind::Prim(_))),
        0
    );
    assert_nat(eval_exp(exp_of_prog(&lowered)), 0);
}

// ---------------------------------------------------------------------------
// The full pipeline

#[test]
fn pipeline_runs_both_passes_in_sequence() {
    let body = async_exp(block_exp(
        vec![let_dec(var_pat("x", Type::nat()), await_exp(p_var()))],
        var_exp("x", Type::nat()),
    ));
    let prog = async_prog(body);
    let lowered = scrip::ir::validate::check_prog(&Scope::new(), "desugaring", &prog)
        .map(|()| tailcall::transform(prog))
        .unwrap();
    check_prog(&Scope::new(), "tail call optimization", &lowered).unwrap();
    let lowered = await_lowering::transform(lowered);
    check_prog(&Scope::new(), "await lowering", &lowered).unwrap();
    assert!(!lowered.flavor.has_await);
}
