//! Self tail-call optimization.
//!
//! Rewrites each locally bound function that calls itself in tail
//! position (with identity generic instantiation) into a loop that
//! reassigns its parameters in place, bounding stack depth regardless of
//! recursion depth:
//!
//! ```text
//! let f = func(x, y) { ... f(e1, e2) ... }
//! ```
//!
//! becomes
//!
//! ```text
//! let f = func(x', y') {
//!     var t1 = x'; var t2 = y';
//!     loop {
//!         label l {
//!             let x = t1; let y = t2;
//!             return ... { t1 := e1; t2 := e2; break l } ...
//!         }
//!     }
//! }
//! ```
//!
//! Mutual tail calls, calls with non-identity instantiation, and calls
//! through rebound variables are left as ordinary calls. Actor bodies
//! are not descended into.

use std::cell::Cell;

use crate::ir::construct::{
    assign_exp, block_exp, break_exp, exp_dec, fresh_id, fresh_var, func_exp, label_exp,
    let_dec, let_var_dec, loop_exp, proj_exp, ret_exp, unit_exp, var_dec, var_exp, var_pat,
};
use crate::ir::{
    Arg, Case, Dec, DecKind, Exp, ExpKind, Id, Pat, PatKind, Prog, TypParam,
};
use crate::source::Span;
use crate::types::{Control, FuncSort, Type};

/// Run the pass over a whole program.
pub fn transform(prog: Prog) -> Prog {
    let env = TailEnv {
        tail_pos: false,
        info: None,
    };
    let Prog {
        args,
        decs: groups,
        fields,
        flavor,
        span,
    } = prog;
    Prog {
        args,
        decs: groups.into_iter().map(|group| decs(&env, group)).collect(),
        fields,
        flavor,
        span,
    }
}

/// The function a tail call could return to: the innermost enclosing
/// optimizable binding.
struct FuncInfo {
    /// The name the function is bound to.
    name: Id,
    /// Its type parameters, for the identity-instantiation check.
    typ_params: Vec<TypParam>,
    /// One mutable temporary per parameter.
    temps: Vec<Exp>,
    /// The label of the loop back edge.
    label: Id,
    /// Set as soon as any self tail call is rewritten.
    discovered: Cell<bool>,
}

#[derive(Copy, Clone)]
struct TailEnv<'a> {
    tail_pos: bool,
    info: Option<&'a FuncInfo>,
}

impl<'a> TailEnv<'a> {
    fn tail(self) -> TailEnv<'a> {
        TailEnv {
            tail_pos: true,
            ..self
        }
    }

    fn non_tail(self) -> TailEnv<'a> {
        TailEnv {
            tail_pos: false,
            ..self
        }
    }

    /// Drop the function info when a binder shadows its name.
    fn shadowed_by(self, ids: impl IntoIterator<Item = Id>) -> TailEnv<'a> {
        match self.info {
            Some(info) if ids.into_iter().any(|id| id == info.name) => TailEnv {
                info: None,
                ..self
            },
            _ => self,
        }
    }

    /// A fresh function, class, or async context: tail calls cross no
    /// closure boundary.
    fn fresh() -> TailEnv<'a> {
        TailEnv {
            tail_pos: true,
            info: None,
        }
    }
}

fn exp(env: TailEnv<'_>, e: Exp) -> Exp {
    let Exp { kind, span, note } = e;
    let kind = match kind {
        ExpKind::Lit(_) | ExpKind::Var(_) | ExpKind::Prim(_) | ExpKind::NewObj(..) => kind,

        ExpKind::Call(conv, func, insts, arg) => {
            match env.info {
                Some(info) if env.tail_pos && is_self_call(info, &func, &insts) => {
                    info.discovered.set(true);
                    let arg = exp(env.non_tail(), *arg);
                    // Reassign the temporaries and jump to the back
                    // edge. The replacement never produces a value, so
                    // the call's annotation holds vacuously.
                    let mut jump = block_exp(
                        assigns(info, arg),
                        break_exp(info.label.clone(), unit_exp()),
                    );
                    jump.span = span;
                    return jump;
                }
                _ => ExpKind::Call(
                    conv,
                    Box::new(exp(env.non_tail(), *func)),
                    insts,
                    Box::new(exp(env.non_tail(), *arg)),
                ),
            }
        }

        ExpKind::Un(t, op, e1) => ExpKind::Un(t, op, sub(env, e1)),
        ExpKind::Bin(t, op, e1, e2) => ExpKind::Bin(t, op, sub(env, e1), sub(env, e2)),
        ExpKind::Rel(t, op, e1, e2) => ExpKind::Rel(t, op, sub(env, e1), sub(env, e2)),
        ExpKind::Show(t, e1) => ExpKind::Show(t, sub(env, e1)),
        ExpKind::Tup(es) => ExpKind::Tup(subs(env, es)),
        ExpKind::Proj(e1, n) => ExpKind::Proj(sub(env, e1), n),
        ExpKind::Opt(e1) => ExpKind::Opt(sub(env, e1)),
        ExpKind::Tag(lab, e1) => ExpKind::Tag(lab, sub(env, e1)),
        ExpKind::Dot(e1, lab) => ExpKind::Dot(sub(env, e1), lab),
        ExpKind::ActorDot(e1, lab) => ExpKind::ActorDot(sub(env, e1), lab),
        ExpKind::Array(m, t, es) => ExpKind::Array(m, t, subs(env, es)),
        ExpKind::Idx(e1, e2) => ExpKind::Idx(sub(env, e1), sub(env, e2)),
        ExpKind::Assign(e1, e2) => ExpKind::Assign(sub(env, e1), sub(env, e2)),

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
            body: Box::new(exp(TailEnv::fresh(), *body)),
        },

        ExpKind::Block(block_decs, e1) => {
            let env = env.shadowed_by(bound_ids(&block_decs));
            let e1 = Box::new(exp(env.tail(), *e1));
            ExpKind::Block(decs(&env, block_decs), e1)
        }

        ExpKind::If(c, t, f) => ExpKind::If(
            sub(env, c),
            Box::new(exp(env.tail(), *t)),
            Box::new(exp(env.tail(), *f)),
        ),

        ExpKind::Switch(scrut, cases) => ExpKind::Switch(
            sub(env, scrut),
            cases
                .into_iter()
                .map(|Case { pat, exp: body }| {
                    let env = env.shadowed_by(pat_ids(&pat));
                    Case {
                        pat,
                        exp: exp(env.tail(), body),
                    }
                })
                .collect(),
        ),

        ExpKind::Loop(body) => ExpKind::Loop(sub(env, body)),
        ExpKind::Label(id, t, body) => {
            ExpKind::Label(id, t, Box::new(exp(env.tail(), *body)))
        }
        ExpKind::Break(id, e1) => ExpKind::Break(id, sub(env, e1)),
        // A returned expression hands its value straight to the caller,
        // so it is a tail position even when the return itself is not.
        ExpKind::Ret(e1) => ExpKind::Ret(Box::new(exp(env.tail(), *e1))),
        ExpKind::Async(body) => ExpKind::Async(Box::new(exp(TailEnv::fresh(), *body))),
        ExpKind::Await(e1) => ExpKind::Await(sub(env, e1)),
        ExpKind::Assert(e1) => ExpKind::Assert(sub(env, e1)),
        ExpKind::Declare(id, t, body) => {
            let env = env.shadowed_by([id.clone()]);
            ExpKind::Declare(id, t, Box::new(exp(env.tail(), *body)))
        }
        ExpKind::Define(id, m, e1) => ExpKind::Define(id, m, sub(env, e1)),

        // Not descended into; see the module comment.
        ExpKind::Actor(..) => kind,
    };
    Exp { kind, span, note }
}

fn sub(env: TailEnv<'_>, e: Box<Exp>) -> Box<Exp> {
    Box::new(exp(env.non_tail(), *e))
}

fn subs(env: TailEnv<'_>, es: Vec<Exp>) -> Vec<Exp> {
    es.into_iter().map(|e| exp(env.non_tail(), e)).collect()
}

fn decs(env: &TailEnv<'_>, decs: Vec<Dec>) -> Vec<Dec> {
    decs.into_iter().map(|d| dec(*env, d)).collect()
}

fn dec(env: TailEnv<'_>, d: Dec) -> Dec {
    let Dec { kind, span } = d;
    match kind {
        DecKind::Let(pat, init) => {
            if let (
                PatKind::Var(name),
                ExpKind::Func {
                    sort: FuncSort::Local,
                    control: Control::Returns,
                    ..
                },
            ) = (&pat.kind, &init.kind)
            {
                let name = name.clone();
                let func_span = init.span;
                match init.kind {
                    ExpKind::Func {
                        name: hint,
                        typ_params,
                        params,
                        rets,
                        body,
                        ..
                    } => {
                        return optimize_func(
                            span, name, hint, typ_params, params, rets, *body, func_span,
                        )
                    }
                    _ => unreachable!(),
                }
            }
            Dec {
                kind: DecKind::Let(pat, exp(env.non_tail(), init)),
                span,
            }
        }
        DecKind::Var(id, init) => Dec {
            kind: DecKind::Var(id, exp(env.non_tail(), init)),
            span,
        },
        DecKind::Typ(con) => Dec {
            kind: DecKind::Typ(con),
            span,
        },
    }
}

/// Process a locally bound function definition. The body is traversed
/// with this binding as the innermost candidate; if any self tail call
/// was rewritten, the whole definition is replaced by the loop form.
#[allow(clippy::too_many_arguments)]
fn optimize_func(
    dec_span: Span,
    name: Id,
    hint: Id,
    typ_params: Vec<TypParam>,
    params: Vec<Arg>,
    rets: Vec<Type>,
    body: Exp,
    func_span: Span,
) -> Dec {
    let info = FuncInfo {
        name: name.clone(),
        typ_params: typ_params.clone(),
        temps: params
            .iter()
            .map(|arg| fresh_var("temp", Type::mutable(arg.typ.clone())))
            .collect(),
        label: fresh_id("tailcall"),
        discovered: Cell::new(false),
    };
    let env = TailEnv {
        tail_pos: true,
        info: Some(&info),
    };
    // A parameter shadowing the binding makes self calls unreachable.
    let env = env.shadowed_by(params.iter().map(|arg| arg.id.clone()));
    let body = exp(env, body);

    if !info.discovered.get() {
        let func = func_exp(hint, FuncSort::Local, Control::Returns, typ_params, params, rets, body);
        let func = Exp {
            span: func_span,
            ..func
        };
        let mut dec = let_dec(var_pat(name, func.note.typ.clone()), func);
        dec.span = dec_span;
        return dec;
    }

    let fresh_params: Vec<Arg> = params
        .iter()
        .map(|arg| Arg::new(fresh_id(&arg.id), arg.typ.clone()))
        .collect();
    let temp_decs: Vec<Dec> = info
        .temps
        .iter()
        .zip(&fresh_params)
        .map(|(temp, arg)| {
            var_dec(
                crate::ir::construct::id_of(temp).clone(),
                var_exp(arg.id.clone(), arg.typ.clone()),
            )
        })
        .collect();
    let rebinds: Vec<Dec> = params
        .iter()
        .zip(&info.temps)
        .map(|(arg, temp)| {
            let_dec(
                var_pat(arg.id.clone(), arg.typ.clone()),
                var_exp(
                    crate::ir::construct::id_of(temp).clone(),
                    arg.typ.clone(),
                ),
            )
        })
        .collect();
    let new_body = block_exp(
        temp_decs,
        loop_exp(label_exp(
            info.label.clone(),
            Type::unit(),
            block_exp(rebinds, ret_exp(body)),
        )),
    );
    let func = func_exp(
        hint,
        FuncSort::Local,
        Control::Returns,
        typ_params,
        fresh_params,
        rets,
        new_body,
    );
    let func = Exp {
        span: func_span,
        ..func
    };
    let mut dec = let_dec(var_pat(name, func.note.typ.clone()), func);
    dec.span = dec_span;
    dec
}

/// Whether a call is a self call at the identity instantiation: the
/// callee is the candidate's name and each type argument is exactly the
/// corresponding type parameter.
fn is_self_call(info: &FuncInfo, func: &Exp, insts: &[Type]) -> bool {
    match &func.kind {
        ExpKind::Var(id) if *id == info.name => {
            insts.len() == info.typ_params.len()
                && insts.iter().zip(&info.typ_params).all(|(inst, param)| {
                    matches!(inst, Type::Con(con, args) if args.is_empty() && *con == param.con)
                })
        }
        _ => false,
    }
}

/// The parameter reassignments for a rewritten self call. A tuple
/// literal of matching arity is assigned component-wise (the components
/// read the immutable rebound parameters, never the temporaries);
/// anything else is bound to a fresh immutable first and projected.
fn assigns(info: &FuncInfo, arg: Exp) -> Vec<Dec> {
    match info.temps.as_slice() {
        [temp] => vec![exp_dec(assign_exp(temp.clone(), arg))],
        temps => match arg.kind {
            ExpKind::Tup(es) if es.len() == temps.len() => temps
                .iter()
                .zip(es)
                .map(|(temp, e)| exp_dec(assign_exp(temp.clone(), e)))
                .collect(),
            _ => {
                let tup = fresh_var("tup", arg.note.typ.clone());
                let mut decs = vec![let_var_dec(&tup, arg)];
                decs.extend(temps.iter().enumerate().map(|(i, temp)| {
                    exp_dec(assign_exp(temp.clone(), proj_exp(tup.clone(), i)))
                }));
                decs
            }
        },
    }
}

fn bound_ids(decs: &[Dec]) -> Vec<Id> {
    let mut ids = Vec::new();
    for dec in decs {
        match &dec.kind {
            DecKind::Let(pat, _) => ids.extend(pat_ids(pat)),
            DecKind::Var(id, _) => ids.push(id.clone()),
            DecKind::Typ(_) => {}
        }
    }
    ids
}

fn pat_ids(pat: &Pat) -> Vec<Id> {
    fn walk(pat: &Pat, ids: &mut Vec<Id>) {
        match &pat.kind {
            PatKind::Wild | PatKind::Lit(_) | PatKind::Alt(..) => {}
            PatKind::Var(id) => ids.push(id.clone()),
            PatKind::Tup(pats) => pats.iter().for_each(|p| walk(p, ids)),
            PatKind::Obj(fields) => fields.iter().for_each(|f| walk(&f.pat, ids)),
            PatKind::Opt(p) | PatKind::Tag(_, p) => walk(p, ids),
        }
    }
    let mut ids = Vec::new();
    walk(pat, &mut ids);
    ids
}
