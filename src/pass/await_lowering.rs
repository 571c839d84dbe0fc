//! Async/await elimination.
//!
//! Rewrites every expression that may suspend into continuation-passing
//! style while leaving pure fragments in direct style. `async e` becomes
//! a call to the `@async` primitive with the CPS-converted body lifted
//! into a closure over its reply continuation; `await e` becomes a call
//! to the `@await` primitive carrying the current continuation.
//!
//! The answer type of converted code is `None`: continuations have type
//! `t -> None`, the static witness that invoking a continuation never
//! returns to its caller (every continuation chain ends in `@await`,
//! which suspends, or the reply continuation of `@async`, which ends the
//! message execution). A continuation call therefore checks in any
//! position.
//!
//! Two kinds of continuation are used: a *named* continuation is an IR
//! variable of function type; a *meta* continuation is a host-side
//! builder consuming the value expression. `FnOnce` enforces the
//! one-shot discipline on builders at compile time; `letcont` reifies a
//! builder into a named function binding where a continuation must be
//! shared or escape.

use std::collections::VecDeque;

use im::HashMap;

use crate::ir::construct::{
    answer_typ, assert_exp, block_exp, call_exp, cont_typ, declare_exp, define_exp, exp_dec,
    fresh_id, fresh_var, id_of, if_exp, let_dec, let_var_dec, local_func_exp, prim_exp,
    switch_exp, tup_exp, unit_exp, var_exp,
};
use crate::ir::{
    Arg, Case, Dec, DecKind, Effect, Exp, ExpKind, Flavor, Id, Mutability, Pat, PatField,
    PatKind, Prog,
};
use crate::pass::rename::rename_exp;
use crate::source::Span;
use crate::types::{self, Type};

/// Run the pass over a whole program, clearing the `has_await` flavor.
pub fn transform(prog: Prog) -> Prog {
    let labs = LabelEnv::new();
    let Prog {
        args,
        decs,
        fields,
        flavor,
        span,
    } = prog;
    Prog {
        args,
        decs: decs
            .into_iter()
            .map(|group| group.into_iter().map(|d| t_dec(&labs, d)).collect())
            .collect(),
        fields,
        flavor: Flavor {
            has_await: false,
            ..flavor
        },
        span,
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
enum LabelKey {
    /// The implicit return point of the enclosing `async` body.
    Ret,
    Named(Id),
}

#[derive(Clone)]
enum LabelKind {
    /// Jumps to this label become continuation calls.
    Cont(Exp),
    /// The label survives in direct style.
    Label,
}

type LabelEnv = HashMap<LabelKey, LabelKind>;

enum Cont<'a> {
    /// A reified continuation: a variable of function type.
    Named(Exp),
    /// A host-side builder consuming the value expression, together with
    /// the type of the value it consumes. Used exactly once.
    Meta(Type, Box<dyn FnOnce(Exp) -> Exp + 'a>),
}

impl<'a> Cont<'a> {
    fn meta(typ: Type, f: impl FnOnce(Exp) -> Exp + 'a) -> Cont<'a> {
        Cont::Meta(typ, Box::new(f))
    }
}

/// Pass a value to a continuation.
fn apply(k: Cont<'_>, v: Exp) -> Exp {
    match k {
        Cont::Named(kv) => call_exp(kv, Vec::new(), v),
        Cont::Meta(_, f) => f(v),
    }
}

/// Reify a continuation by eta-expanding it into a named function
/// binding, except when it is already named.
fn letcont<'a>(k: Cont<'a>, body: impl FnOnce(&Exp) -> Exp) -> Exp {
    match k {
        Cont::Named(kv) => body(&kv),
        Cont::Meta(typ, f) => {
            let kv = fresh_var("k", cont_typ(&typ));
            let v = fresh_var("v", typ.clone());
            let cont = local_func_exp(
                "k",
                vec![Arg::new(id_of(&v).clone(), typ)],
                vec![answer_typ()],
                f(v),
            );
            let dec = let_var_dec(&kv, cont);
            block_exp(vec![dec], body(&kv))
        }
    }
}

/// `@await : (async t, t -> None) -> None`.
fn await_prim(t: &Type) -> Exp {
    prim_exp(
        "@await",
        Type::Func(
            types::FuncSort::Local,
            types::Control::Returns,
            Vec::new(),
            vec![Type::promise(t.clone()), cont_typ(t)],
            vec![answer_typ()],
        ),
    )
}

/// `@async : ((t -> None) -> None) -> async t`.
fn async_prim(t: &Type) -> Exp {
    prim_exp(
        "@async",
        Type::Func(
            types::FuncSort::Local,
            types::Control::Returns,
            Vec::new(),
            vec![cont_typ(&cont_typ(t))],
            vec![Type::promise(t.clone())],
        ),
    )
}

// ---------------------------------------------------------------------------
// Trivial translation

fn t_dec(labs: &LabelEnv, dec: Dec) -> Dec {
    let Dec { kind, span } = dec;
    let kind = match kind {
        DecKind::Let(pat, e) => DecKind::Let(pat, t_exp(labs, e)),
        DecKind::Var(id, e) => DecKind::Var(id, t_exp(labs, e)),
        DecKind::Typ(con) => DecKind::Typ(con),
    };
    Dec { kind, span }
}

/// The trivial translation: applied to expressions whose effect is
/// `Triv`. Recurses structurally, re-associating labels and returns with
/// the label environment and lowering any `async` bodies it meets.
fn t_exp(labs: &LabelEnv, e: Exp) -> Exp {
    debug_assert_eq!(
        e.note.eff,
        Effect::Triv,
        "trivial translation of a suspending expression"
    );
    let Exp { kind, span, note } = e;
    let kind = match kind {
        ExpKind::Lit(_) | ExpKind::Var(_) | ExpKind::Prim(_) | ExpKind::NewObj(..) => kind,

        ExpKind::Async(body) => return lower_async(span, note, *body),
        ExpKind::Await(_) => unreachable!("await in trivial code"),

        ExpKind::Un(t, op, e1) => ExpKind::Un(t, op, tb(labs, e1)),
        ExpKind::Bin(t, op, e1, e2) => ExpKind::Bin(t, op, tb(labs, e1), tb(labs, e2)),
        ExpKind::Rel(t, op, e1, e2) => ExpKind::Rel(t, op, tb(labs, e1), tb(labs, e2)),
        ExpKind::Show(t, e1) => ExpKind::Show(t, tb(labs, e1)),
        ExpKind::Tup(es) => ExpKind::Tup(tbs(labs, es)),
        ExpKind::Proj(e1, n) => ExpKind::Proj(tb(labs, e1), n),
        ExpKind::Opt(e1) => ExpKind::Opt(tb(labs, e1)),
        ExpKind::Tag(lab, e1) => ExpKind::Tag(lab, tb(labs, e1)),
        ExpKind::Dot(e1, lab) => ExpKind::Dot(tb(labs, e1), lab),
        ExpKind::ActorDot(e1, lab) => ExpKind::ActorDot(tb(labs, e1), lab),
        ExpKind::Array(m, t, es) => ExpKind::Array(m, t, tbs(labs, es)),
        ExpKind::Idx(e1, e2) => ExpKind::Idx(tb(labs, e1), tb(labs, e2)),
        ExpKind::Assign(e1, e2) => ExpKind::Assign(tb(labs, e1), tb(labs, e2)),
        ExpKind::Call(conv, f, ts, arg) => {
            ExpKind::Call(conv, tb(labs, f), ts, tb(labs, arg))
        }

        ExpKind::Func {
            name,
            sort,
            control,
            typ_params,
            params,
            rets,
            body,
        } => ExpKind::Func {
            name,
            sort,
            control,
            typ_params,
            params,
            rets,
            // A function body is a fresh context; no label or return of
            // the surrounding translation is visible inside.
            body: Box::new(t_exp(&LabelEnv::new(), *body)),
        },

        ExpKind::Block(decs, e1) => ExpKind::Block(
            decs.into_iter().map(|d| t_dec(labs, d)).collect(),
            Box::new(t_exp(labs, *e1)),
        ),

        ExpKind::If(c, e2, e3) => {
            ExpKind::If(tb(labs, c), tb(labs, e2), tb(labs, e3))
        }
        ExpKind::Switch(scrut, cases) => ExpKind::Switch(
            tb(labs, scrut),
            cases
                .into_iter()
                .map(|case| Case {
                    pat: case.pat,
                    exp: t_exp(labs, case.exp),
                })
                .collect(),
        ),
        ExpKind::Loop(body) => ExpKind::Loop(tb(labs, body)),

        ExpKind::Label(id, t, body) => {
            let labs = labs.update(LabelKey::Named(id.clone()), LabelKind::Label);
            ExpKind::Label(id, t, Box::new(t_exp(&labs, *body)))
        }
        ExpKind::Break(id, e1) => match labs.get(&LabelKey::Named(id.clone())) {
            Some(LabelKind::Cont(kv)) => {
                let mut call = call_exp(kv.clone(), Vec::new(), t_exp(labs, *e1));
                call.span = span;
                return call;
            }
            _ => ExpKind::Break(id, tb(labs, e1)),
        },
        ExpKind::Ret(e1) => match labs.get(&LabelKey::Ret) {
            Some(LabelKind::Cont(kv)) => {
                let mut call = call_exp(kv.clone(), Vec::new(), t_exp(labs, *e1));
                call.span = span;
                return call;
            }
            _ => ExpKind::Ret(tb(labs, e1)),
        },

        ExpKind::Assert(e1) => ExpKind::Assert(tb(labs, e1)),
        ExpKind::Declare(id, t, body) => ExpKind::Declare(id, t, tb(labs, body)),
        ExpKind::Define(id, m, e1) => ExpKind::Define(id, m, tb(labs, e1)),

        ExpKind::Actor(decs, fields, typ) => {
            let empty = LabelEnv::new();
            ExpKind::Actor(
                decs.into_iter().map(|d| t_dec(&empty, d)).collect(),
                fields,
                typ,
            )
        }
    };
    Exp { kind, span, note }
}

fn tb(labs: &LabelEnv, e: Box<Exp>) -> Box<Exp> {
    Box::new(t_exp(labs, *e))
}

fn tbs(labs: &LabelEnv, es: Vec<Exp>) -> Vec<Exp> {
    es.into_iter().map(|e| t_exp(labs, e)).collect()
}

/// Lower `async e` to `@async (func(k_ret) { C[e] k_ret })`. The body's
/// bound names are refreshed first so nothing is captured when it is
/// lifted into the closure.
fn lower_async(span: Span, note: crate::ir::Note, body: Exp) -> Exp {
    let inner = match types::promote(&note.typ).as_async() {
        Some(t) => t.clone(),
        None => unreachable!("async expression of non-async type"),
    };
    let body = rename_exp(body);
    let k_ret = fresh_var("k_ret", cont_typ(&inner));
    let labs = LabelEnv::new().update(LabelKey::Ret, LabelKind::Cont(k_ret.clone()));
    let cps = if body.note.eff == Effect::Await {
        c_exp(&labs, body, Cont::Named(k_ret.clone()))
    } else {
        apply(Cont::Named(k_ret.clone()), t_exp(&labs, body))
    };
    let closure = local_func_exp(
        "async",
        vec![Arg::new(id_of(&k_ret).clone(), cont_typ(&inner))],
        vec![answer_typ()],
        cps,
    );
    let mut call = call_exp(async_prim(&inner), Vec::new(), closure);
    call.span = span;
    call.note.typ = note.typ;
    call
}

// ---------------------------------------------------------------------------
// CPS translation

/// The CPS translation: applied to expressions whose effect is `Await`.
/// Produces an expression of the answer type that will pass the value of
/// `e` to `k`.
fn c_exp<'a>(labs: &LabelEnv, e: Exp, k: Cont<'a>) -> Exp {
    let Exp { kind, span, note } = e;
    let typ = note.typ.clone();
    match kind {
        ExpKind::Await(e1) => letcont(k, |kv| {
            let kv = kv.clone();
            let prim = await_prim(&typ);
            if e1.note.eff == Effect::Triv {
                let awaited = t_exp(labs, *e1);
                call_exp(prim, Vec::new(), tup_exp(vec![awaited, kv]))
            } else {
                let operand_typ = e1.note.typ.clone();
                c_exp(
                    labs,
                    *e1,
                    Cont::meta(operand_typ, move |v| {
                        call_exp(prim, Vec::new(), tup_exp(vec![v, kv]))
                    }),
                )
            }
        }),

        ExpKind::Un(t, op, e1) => c_exps(labs, vec![*e1], {
            Box::new(move |mut vs| {
                let v = vs.pop().unwrap();
                apply(k, renote(crate::ir::construct::un_exp(t, op, v), span, typ))
            })
        }),

        ExpKind::Bin(t, op, e1, e2) => c_exps(labs, vec![*e1, *e2], {
            Box::new(move |mut vs| {
                let v2 = vs.pop().unwrap();
                let v1 = vs.pop().unwrap();
                apply(
                    k,
                    renote(crate::ir::construct::bin_exp(t, op, v1, v2), span, typ),
                )
            })
        }),

        ExpKind::Rel(t, op, e1, e2) => c_exps(labs, vec![*e1, *e2], {
            Box::new(move |mut vs| {
                let v2 = vs.pop().unwrap();
                let v1 = vs.pop().unwrap();
                apply(
                    k,
                    renote(crate::ir::construct::rel_exp(t, op, v1, v2), span, typ),
                )
            })
        }),

        ExpKind::Show(t, e1) => c_exps(labs, vec![*e1], {
            Box::new(move |mut vs| {
                let v = vs.pop().unwrap();
                let show = Exp {
                    kind: ExpKind::Show(t, Box::new(v)),
                    span,
                    note: crate::ir::Note::new(typ, Effect::Triv),
                };
                apply(k, show)
            })
        }),

        ExpKind::Tup(es) => c_exps(labs, es, {
            Box::new(move |vs| apply(k, renote(tup_exp(vs), span, typ)))
        }),

        ExpKind::Proj(e1, n) => c_exps(labs, vec![*e1], {
            Box::new(move |mut vs| {
                let v = vs.pop().unwrap();
                apply(k, renote(crate::ir::construct::proj_exp(v, n), span, typ))
            })
        }),

        ExpKind::Opt(e1) => c_exps(labs, vec![*e1], {
            Box::new(move |mut vs| {
                let v = vs.pop().unwrap();
                apply(k, renote(crate::ir::construct::opt_exp(v), span, typ))
            })
        }),

        ExpKind::Tag(lab, e1) => c_exps(labs, vec![*e1], {
            Box::new(move |mut vs| {
                let v = vs.pop().unwrap();
                apply(
                    k,
                    renote(crate::ir::construct::tag_exp(lab, v, typ.clone()), span, typ),
                )
            })
        }),

        ExpKind::Dot(e1, lab) => c_exps(labs, vec![*e1], {
            Box::new(move |mut vs| {
                let v = vs.pop().unwrap();
                let dot = Exp {
                    kind: ExpKind::Dot(Box::new(v), lab),
                    span,
                    note: crate::ir::Note::new(typ, Effect::Triv),
                };
                apply(k, dot)
            })
        }),

        ExpKind::ActorDot(e1, lab) => c_exps(labs, vec![*e1], {
            Box::new(move |mut vs| {
                let v = vs.pop().unwrap();
                let dot = Exp {
                    kind: ExpKind::ActorDot(Box::new(v), lab),
                    span,
                    note: crate::ir::Note::new(typ, Effect::Triv),
                };
                apply(k, dot)
            })
        }),

        ExpKind::Array(m, t, es) => c_exps(labs, es, {
            Box::new(move |vs| {
                apply(
                    k,
                    renote(crate::ir::construct::array_exp(m, t, vs), span, typ),
                )
            })
        }),

        ExpKind::Idx(e1, e2) => c_exps(labs, vec![*e1, *e2], {
            Box::new(move |mut vs| {
                let i = vs.pop().unwrap();
                let a = vs.pop().unwrap();
                let idx = Exp {
                    kind: ExpKind::Idx(Box::new(a), Box::new(i)),
                    span,
                    note: crate::ir::Note::new(typ, Effect::Triv),
                };
                apply(k, idx)
            })
        }),

        ExpKind::Assign(target, source) => c_assign(labs, span, typ, *target, *source, k),

        ExpKind::Call(conv, f, ts, arg) => c_exps(labs, vec![*f, *arg], {
            Box::new(move |mut vs| {
                let arg = vs.pop().unwrap();
                let f = vs.pop().unwrap();
                let call = Exp {
                    kind: ExpKind::Call(conv, Box::new(f), ts, Box::new(arg)),
                    span,
                    note: crate::ir::Note::new(typ, Effect::Triv),
                };
                apply(k, call)
            })
        }),

        ExpKind::Block(decs, e1) => c_block(labs, decs, *e1, k),

        ExpKind::If(c, e2, e3) => letcont(k, |kv| {
            let then = c_branch(labs, *e2, kv);
            let els = c_branch(labs, *e3, kv);
            if c.note.eff == Effect::Triv {
                let mut cond = if_exp(t_exp(labs, *c), then, els, answer_typ());
                cond.span = span;
                cond
            } else {
                let cond_typ = c.note.typ.clone();
                c_exp(
                    labs,
                    *c,
                    Cont::meta(cond_typ, move |v| if_exp(v, then, els, answer_typ())),
                )
            }
        }),

        ExpKind::Switch(scrut, cases) => letcont(k, |kv| {
            let cases: Vec<Case> = cases
                .into_iter()
                .map(|case| Case {
                    pat: case.pat,
                    exp: c_branch(labs, case.exp, kv),
                })
                .collect();
            if scrut.note.eff == Effect::Triv {
                let mut switch = switch_exp(t_exp(labs, *scrut), cases, answer_typ());
                switch.span = span;
                switch
            } else {
                let scrut_typ = scrut.note.typ.clone();
                c_exp(
                    labs,
                    *scrut,
                    Cont::meta(scrut_typ, move |v| switch_exp(v, cases, answer_typ())),
                )
            }
        }),

        ExpKind::Loop(body) => {
            // The loop never produces a value; its continuation is dead.
            drop(k);
            let loop_fn = fresh_var(
                "loop",
                Type::Func(
                    types::FuncSort::Local,
                    types::Control::Returns,
                    Vec::new(),
                    Vec::new(),
                    vec![answer_typ()],
                ),
            );
            let again = loop_fn.clone();
            let body_cps = c_exp(
                labs,
                *body,
                // The body's value is unit, but the expression carrying
                // it may be a continuation call; sequence it.
                Cont::meta(Type::unit(), move |v| {
                    block_exp(
                        vec![exp_dec(v)],
                        call_exp(again, Vec::new(), unit_exp()),
                    )
                }),
            );
            let cont = local_func_exp("loop", Vec::new(), vec![answer_typ()], body_cps);
            let dec = let_var_dec(&loop_fn, cont);
            block_exp(vec![dec], call_exp(loop_fn, Vec::new(), unit_exp()))
        }

        ExpKind::Label(id, _t, body) => letcont(k, |kv| {
            let labs = labs.update(LabelKey::Named(id), LabelKind::Cont(kv.clone()));
            c_exp(&labs, *body, Cont::Named(kv.clone()))
        }),

        ExpKind::Break(id, e1) => {
            let kv = match labs.get(&LabelKey::Named(id)) {
                Some(LabelKind::Cont(kv)) => kv.clone(),
                _ => unreachable!("label context crosses a suspension point"),
            };
            drop(k);
            if e1.note.eff == Effect::Await {
                c_exp(labs, *e1, Cont::Named(kv))
            } else {
                apply(Cont::Named(kv), t_exp(labs, *e1))
            }
        }

        ExpKind::Ret(e1) => {
            let kv = match labs.get(&LabelKey::Ret) {
                Some(LabelKind::Cont(kv)) => kv.clone(),
                _ => unreachable!("return context crosses a suspension point"),
            };
            drop(k);
            if e1.note.eff == Effect::Await {
                c_exp(labs, *e1, Cont::Named(kv))
            } else {
                apply(Cont::Named(kv), t_exp(labs, *e1))
            }
        }

        ExpKind::Assert(e1) => c_exps(labs, vec![*e1], {
            Box::new(move |mut vs| {
                let v = vs.pop().unwrap();
                apply(k, renote(assert_exp(v), span, typ))
            })
        }),

        ExpKind::Declare(id, t, body) => {
            let body = c_exp(labs, *body, k);
            let mut declared = declare_exp(id, t, body);
            declared.span = span;
            declared
        }

        ExpKind::Define(id, m, e1) => c_exps(labs, vec![*e1], {
            Box::new(move |mut vs| {
                let v = vs.pop().unwrap();
                apply(k, renote(define_exp(id, m, v), span, typ))
            })
        }),

        // Atoms and constructs that are trivial by definition can only
        // arrive here through a conservative effect annotation.
        kind => {
            let e = Exp {
                kind,
                span,
                note: crate::ir::Note::new(note.typ, Effect::Triv),
            };
            apply(k, t_exp(labs, e))
        }
    }
}

/// Translate a branch to feed an already-reified continuation.
fn c_branch(labs: &LabelEnv, e: Exp, kv: &Exp) -> Exp {
    if e.note.eff == Effect::Await {
        c_exp(labs, e, Cont::Named(kv.clone()))
    } else {
        apply(Cont::Named(kv.clone()), t_exp(labs, e))
    }
}

/// Assignment keeps its target an lvalue: the target's subterms are
/// converted, never the target itself.
fn c_assign<'a>(
    labs: &LabelEnv,
    span: Span,
    typ: Type,
    target: Exp,
    source: Exp,
    k: Cont<'a>,
) -> Exp {
    let target_note = target.note.clone();
    match target.kind {
        ExpKind::Var(_) => c_exps(labs, vec![source], {
            Box::new(move |mut vs| {
                let v = vs.pop().unwrap();
                apply(
                    k,
                    renote(crate::ir::construct::assign_exp(target, v), span, typ),
                )
            })
        }),
        ExpKind::Dot(obj, lab) => c_exps(labs, vec![*obj, source], {
            Box::new(move |mut vs| {
                let v = vs.pop().unwrap();
                let obj = vs.pop().unwrap();
                let target = Exp {
                    kind: ExpKind::Dot(Box::new(obj), lab),
                    span: Span::Empty,
                    note: target_note,
                };
                apply(
                    k,
                    renote(crate::ir::construct::assign_exp(target, v), span, typ),
                )
            })
        }),
        ExpKind::Idx(array, index) => c_exps(labs, vec![*array, *index, source], {
            Box::new(move |mut vs| {
                let v = vs.pop().unwrap();
                let index = vs.pop().unwrap();
                let array = vs.pop().unwrap();
                let target = Exp {
                    kind: ExpKind::Idx(Box::new(array), Box::new(index)),
                    span: Span::Empty,
                    note: target_note,
                };
                apply(
                    k,
                    renote(crate::ir::construct::assign_exp(target, v), span, typ),
                )
            })
        }),
        _ => unreachable!("assignment to a non-lvalue"),
    }
}

/// Convert an operand list left to right. Operands before a suspension
/// are evaluated eagerly and held in fresh bindings so the evaluation
/// order of the original expression is preserved.
fn c_exps<'a>(
    labs: &LabelEnv,
    exps: Vec<Exp>,
    k: Box<dyn FnOnce(Vec<Exp>) -> Exp + 'a>,
) -> Exp {
    c_exps_acc(labs, exps.into_iter().collect(), Vec::new(), k)
}

fn c_exps_acc<'a>(
    labs: &LabelEnv,
    mut rest: VecDeque<Exp>,
    mut done: Vec<Exp>,
    k: Box<dyn FnOnce(Vec<Exp>) -> Exp + 'a>,
) -> Exp {
    if rest.iter().all(|e| e.note.eff == Effect::Triv) {
        // Nothing ahead suspends; finish in direct style.
        done.extend(rest.into_iter().map(|e| t_exp(labs, e)));
        return k(done);
    }
    let head = rest.pop_front().unwrap();
    if head.note.eff == Effect::Triv {
        // Evaluate before the upcoming suspension and hold the value; a
        // variable read is snapshotted too, since the suspension may
        // write the cell it reads.
        let labs2 = labs.clone();
        snapshot_exp(t_exp(labs, head), move |v| {
            done.push(v);
            c_exps_acc(&labs2, rest, done, k)
        })
    } else {
        let labs2 = labs.clone();
        let head_typ = head.note.typ.clone();
        c_exp(
            labs,
            head,
            Cont::meta(head_typ, move |v| {
                name_exp(v, move |v| {
                    done.push(v);
                    c_exps_acc(&labs2, rest, done, k)
                })
            }),
        )
    }
}

/// Bind a non-atomic expression to a fresh name; atoms pass through.
fn name_exp(e: Exp, f: impl FnOnce(Exp) -> Exp) -> Exp {
    match &e.kind {
        ExpKind::Var(_) | ExpKind::Lit(_) | ExpKind::Prim(_) => f(e),
        _ => bind_exp(e, f),
    }
}

/// Like [`name_exp`], but also captures variable reads.
fn snapshot_exp(e: Exp, f: impl FnOnce(Exp) -> Exp) -> Exp {
    match &e.kind {
        ExpKind::Lit(_) | ExpKind::Prim(_) => f(e),
        _ => bind_exp(e, f),
    }
}

fn bind_exp(e: Exp, f: impl FnOnce(Exp) -> Exp) -> Exp {
    let x = fresh_var("t", e.note.typ.clone());
    let dec = let_var_dec(&x, e);
    block_exp(vec![dec], f(x))
}

/// Restore an original annotation on a reassembled node. The effect is
/// trivial: its suspending subterms have been hoisted out.
fn renote(mut e: Exp, span: Span, typ: Type) -> Exp {
    e.span = span;
    e.note.typ = typ;
    e
}

// ---------------------------------------------------------------------------
// Blocks

/// CPS-convert a block. Type declarations stay in place (hoisted to the
/// front, where they scope over everything); each variable bound by a
/// value declaration is *declared* up front, then the initializers are
/// sequenced and the bindings *defined*, because an initializer may
/// suspend between sibling declarations.
fn c_block<'a>(labs: &LabelEnv, decs: Vec<Dec>, result: Exp, k: Cont<'a>) -> Exp {
    let mut typ_decs = Vec::new();
    let mut val_decs = VecDeque::new();
    for dec in decs {
        match dec.kind {
            DecKind::Typ(_) => typ_decs.push(dec),
            _ => val_decs.push_back(dec),
        }
    }
    let mut declared = Vec::new();
    for dec in &val_decs {
        match &dec.kind {
            DecKind::Let(pat, _) => pat_vars(pat, &mut declared),
            DecKind::Var(id, init) => {
                declared.push((id.clone(), Type::mutable(init.note.typ.clone())))
            }
            DecKind::Typ(_) => {}
        }
    }
    let body = c_decs(labs, val_decs, result, k);
    let wrapped = declared
        .into_iter()
        .rev()
        .fold(body, |acc, (id, typ)| declare_exp(id, typ, acc));
    block_exp(typ_decs, wrapped)
}

fn c_decs<'a>(
    labs: &LabelEnv,
    mut decs: VecDeque<Dec>,
    result: Exp,
    k: Cont<'a>,
) -> Exp {
    let head = match decs.pop_front() {
        None => {
            return if result.note.eff == Effect::Await {
                c_exp(labs, result, k)
            } else {
                apply(k, t_exp(labs, result))
            }
        }
        Some(dec) => dec,
    };
    match head.kind {
        DecKind::Let(pat, init) => {
            // Refresh the pattern's names; the originals are defined
            // once the initializer has resolved. This keeps the original
            // bindings stable across a suspension.
            let (pat, renamed) = refresh_pat(pat);
            let defines: Vec<Dec> = renamed
                .into_iter()
                .map(|(orig, fresh, typ)| {
                    exp_dec(define_exp(orig, Mutability::Const, var_exp(fresh, typ)))
                })
                .collect();
            if init.note.eff == Effect::Triv {
                let mut ds = vec![let_dec(pat, t_exp(labs, init))];
                ds.extend(defines);
                block_exp(ds, c_decs(labs, decs, result, k))
            } else {
                let labs2 = labs.clone();
                let init_typ = init.note.typ.clone();
                c_exp(
                    labs,
                    init,
                    Cont::meta(init_typ, move |v| {
                        let mut ds = vec![let_dec(pat, v)];
                        ds.extend(defines);
                        block_exp(ds, c_decs(&labs2, decs, result, k))
                    }),
                )
            }
        }
        DecKind::Var(id, init) => {
            if init.note.eff == Effect::Triv {
                let define = exp_dec(define_exp(id, Mutability::Var, t_exp(labs, init)));
                block_exp(vec![define], c_decs(labs, decs, result, k))
            } else {
                let labs2 = labs.clone();
                let init_typ = init.note.typ.clone();
                c_exp(
                    labs,
                    init,
                    Cont::meta(init_typ, move |v| {
                        let define = exp_dec(define_exp(id, Mutability::Var, v));
                        block_exp(vec![define], c_decs(&labs2, decs, result, k))
                    }),
                )
            }
        }
        DecKind::Typ(_) => unreachable!("type declarations are hoisted"),
    }
}

fn pat_vars(pat: &Pat, out: &mut Vec<(Id, Type)>) {
    match &pat.kind {
        PatKind::Wild | PatKind::Lit(_) | PatKind::Alt(..) => {}
        PatKind::Var(id) => out.push((id.clone(), pat.typ.clone())),
        PatKind::Tup(pats) => pats.iter().for_each(|p| pat_vars(p, out)),
        PatKind::Obj(fields) => fields.iter().for_each(|f| pat_vars(&f.pat, out)),
        PatKind::Opt(p) | PatKind::Tag(_, p) => pat_vars(p, out),
    }
}

/// Refresh every variable in a pattern, returning the rewritten pattern
/// and the (original, fresh, type) triples.
fn refresh_pat(pat: Pat) -> (Pat, Vec<(Id, Id, Type)>) {
    let mut renamed = Vec::new();
    let pat = refresh_pat_rec(pat, &mut renamed);
    (pat, renamed)
}

fn refresh_pat_rec(pat: Pat, renamed: &mut Vec<(Id, Id, Type)>) -> Pat {
    let Pat { kind, span, typ } = pat;
    let kind = match kind {
        PatKind::Wild | PatKind::Lit(_) | PatKind::Alt(..) => kind,
        PatKind::Var(id) => {
            let fresh = fresh_id(crate::pass::rename::hint_of(&id));
            renamed.push((id, fresh.clone(), typ.clone()));
            PatKind::Var(fresh)
        }
        PatKind::Tup(pats) => PatKind::Tup(
            pats.into_iter()
                .map(|p| refresh_pat_rec(p, renamed))
                .collect(),
        ),
        PatKind::Obj(fields) => PatKind::Obj(
            fields
                .into_iter()
                .map(|f| PatField {
                    lab: f.lab,
                    pat: refresh_pat_rec(f.pat, renamed),
                })
                .collect(),
        ),
        PatKind::Opt(p) => PatKind::Opt(Box::new(refresh_pat_rec(*p, renamed))),
        PatKind::Tag(lab, p) => PatKind::Tag(lab, Box::new(refresh_pat_rec(*p, renamed))),
    };
    Pat { kind, span, typ }
}
