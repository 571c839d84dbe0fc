//! Smart constructors for IR nodes.
//!
//! Transforms assemble replacement trees through these helpers, which
//! compute type and effect annotations locally so that the assembled node
//! is accepted by [`super::validate`]. The effect of a compound node is
//! the least upper bound of its immediate sub-effects, with the `async`
//! boundary and `await` as the two exceptions.
//!
//! Synthesised nodes carry [`Span::Empty`].

use std::sync::atomic::{AtomicU32, Ordering};

use num_bigint::BigUint;

use crate::ir::{
    Arg, BinOp, CallConv, Case, Dec, DecKind, Effect, Exp, ExpKind, Id, Lit, Mutability, Note,
    Pat, PatKind, RelOp, TypParam, UnOp,
};
use crate::source::Span;
use crate::types::{self, Bind, Control, FuncSort, Type};

static FRESH_NAMES: AtomicU32 = AtomicU32::new(0);

/// Mint an identifier no elaborated program can contain.
pub fn fresh_id(hint: &str) -> Id {
    format!("${}/{}", hint, FRESH_NAMES.fetch_add(1, Ordering::Relaxed))
}

fn exp(kind: ExpKind, typ: Type, eff: Effect) -> Exp {
    Exp {
        kind,
        span: Span::Empty,
        note: Note::new(typ, eff),
    }
}

// ---------------------------------------------------------------------------
// Atoms

pub fn var_exp(id: impl Into<Id>, typ: Type) -> Exp {
    exp(ExpKind::Var(id.into()), typ, Effect::Triv)
}

/// A unique variable expression of the given type.
pub fn fresh_var(hint: &str, typ: Type) -> Exp {
    var_exp(fresh_id(hint), typ)
}

/// The identifier of a variable expression.
pub fn id_of(var: &Exp) -> &Id {
    match &var.kind {
        ExpKind::Var(id) => id,
        _ => unreachable!("expected a variable expression"),
    }
}

pub fn lit_exp(lit: Lit) -> Exp {
    let typ = lit.typ();
    exp(ExpKind::Lit(lit), typ, Effect::Triv)
}

pub fn nat_exp(n: u64) -> Exp {
    lit_exp(Lit::Nat(BigUint::from(n)))
}

pub fn bool_exp(b: bool) -> Exp {
    lit_exp(Lit::Bool(b))
}

pub fn text_exp(text: impl Into<String>) -> Exp {
    lit_exp(Lit::Text(text.into()))
}

pub fn unit_exp() -> Exp {
    exp(ExpKind::Tup(Vec::new()), Type::unit(), Effect::Triv)
}

pub fn prim_exp(name: impl Into<String>, typ: Type) -> Exp {
    exp(ExpKind::Prim(name.into()), typ, Effect::Triv)
}

// ---------------------------------------------------------------------------
// Compounds

pub fn tup_exp(exps: Vec<Exp>) -> Exp {
    let typ = Type::Tup(exps.iter().map(|e| e.note.typ.clone()).collect());
    let eff = exps_eff(&exps);
    exp(ExpKind::Tup(exps), typ, eff)
}

pub fn proj_exp(tup: Exp, index: usize) -> Exp {
    let typ = match types::promote(&tup.note.typ) {
        Type::Tup(ts) => ts[index].clone(),
        _ => unreachable!("projection from a non-tuple"),
    };
    let eff = tup.note.eff;
    exp(ExpKind::Proj(Box::new(tup), index), typ, eff)
}

pub fn opt_exp(e: Exp) -> Exp {
    let typ = Type::opt(e.note.typ.clone());
    let eff = e.note.eff;
    exp(ExpKind::Opt(Box::new(e)), typ, eff)
}

pub fn tag_exp(lab: impl Into<String>, e: Exp, typ: Type) -> Exp {
    let eff = e.note.eff;
    exp(ExpKind::Tag(lab.into(), Box::new(e)), typ, eff)
}

pub fn dot_exp(obj: Exp, lab: &str) -> Exp {
    let typ = match types::promote(&obj.note.typ) {
        Type::Obj(_, fields) => types::lookup_field(lab, &fields)
            .map(Type::as_immut)
            .unwrap_or_else(|| unreachable!("projection of an absent field")),
        _ => unreachable!("field access on a non-object"),
    };
    let eff = obj.note.eff;
    exp(ExpKind::Dot(Box::new(obj), lab.to_owned()), typ, eff)
}

pub fn array_exp(mutability: Mutability, elem: Type, exps: Vec<Exp>) -> Exp {
    let typ = match mutability {
        Mutability::Const => Type::array(elem.clone()),
        Mutability::Var => Type::array(Type::mutable(elem.clone())),
    };
    let eff = exps_eff(&exps);
    exp(ExpKind::Array(mutability, elem, exps), typ, eff)
}

pub fn idx_exp(array: Exp, index: Exp) -> Exp {
    let typ = match types::promote(&array.note.typ) {
        Type::Array(elem) => elem.as_immut(),
        _ => unreachable!("indexing into a non-array"),
    };
    let eff = array.note.eff.lub(index.note.eff);
    exp(ExpKind::Idx(Box::new(array), Box::new(index)), typ, eff)
}

pub fn un_exp(op_typ: Type, op: UnOp, e: Exp) -> Exp {
    let eff = e.note.eff;
    exp(ExpKind::Un(op_typ.clone(), op, Box::new(e)), op_typ, eff)
}

pub fn bin_exp(op_typ: Type, op: BinOp, e1: Exp, e2: Exp) -> Exp {
    let eff = e1.note.eff.lub(e2.note.eff);
    exp(
        ExpKind::Bin(op_typ.clone(), op, Box::new(e1), Box::new(e2)),
        op_typ,
        eff,
    )
}

pub fn rel_exp(op_typ: Type, op: RelOp, e1: Exp, e2: Exp) -> Exp {
    let eff = e1.note.eff.lub(e2.note.eff);
    exp(
        ExpKind::Rel(op_typ, op, Box::new(e1), Box::new(e2)),
        Type::bool(),
        eff,
    )
}

pub fn assign_exp(target: Exp, source: Exp) -> Exp {
    let eff = target.note.eff.lub(source.note.eff);
    exp(
        ExpKind::Assign(Box::new(target), Box::new(source)),
        Type::unit(),
        eff,
    )
}

pub fn if_exp(cond: Exp, then: Exp, els: Exp, typ: Type) -> Exp {
    let eff = cond.note.eff.lub(then.note.eff).lub(els.note.eff);
    exp(
        ExpKind::If(Box::new(cond), Box::new(then), Box::new(els)),
        typ,
        eff,
    )
}

pub fn switch_exp(scrut: Exp, cases: Vec<Case>, typ: Type) -> Exp {
    let eff = cases
        .iter()
        .fold(scrut.note.eff, |eff, case| eff.lub(case.exp.note.eff));
    exp(ExpKind::Switch(Box::new(scrut), cases), typ, eff)
}

pub fn loop_exp(body: Exp) -> Exp {
    let eff = body.note.eff;
    exp(ExpKind::Loop(Box::new(body)), Type::Non, eff)
}

pub fn label_exp(id: impl Into<Id>, typ: Type, body: Exp) -> Exp {
    let eff = body.note.eff;
    exp(ExpKind::Label(id.into(), typ.clone(), Box::new(body)), typ, eff)
}

pub fn break_exp(id: impl Into<Id>, arg: Exp) -> Exp {
    let eff = arg.note.eff;
    exp(ExpKind::Break(id.into(), Box::new(arg)), Type::Non, eff)
}

pub fn ret_exp(arg: Exp) -> Exp {
    let eff = arg.note.eff;
    exp(ExpKind::Ret(Box::new(arg)), Type::Non, eff)
}

pub fn assert_exp(e: Exp) -> Exp {
    let eff = e.note.eff;
    exp(ExpKind::Assert(Box::new(e)), Type::unit(), eff)
}

pub fn async_exp(body: Exp) -> Exp {
    let typ = Type::promise(body.note.typ.clone());
    exp(ExpKind::Async(Box::new(body)), typ, Effect::Triv)
}

pub fn await_exp(e: Exp) -> Exp {
    let typ = match types::promote(&e.note.typ) {
        Type::Async(t) => (*t).clone(),
        _ => unreachable!("awaiting a non-async value"),
    };
    exp(ExpKind::Await(Box::new(e)), typ, Effect::Await)
}

pub fn declare_exp(id: impl Into<Id>, typ: Type, body: Exp) -> Exp {
    let note = body.note.clone();
    exp(
        ExpKind::Declare(id.into(), typ, Box::new(body)),
        note.typ,
        note.eff,
    )
}

pub fn define_exp(id: impl Into<Id>, mutability: Mutability, e: Exp) -> Exp {
    let eff = e.note.eff;
    exp(
        ExpKind::Define(id.into(), mutability, Box::new(e)),
        Type::unit(),
        eff,
    )
}

/// A function value. The note's function type closes the type parameters
/// back into de Bruijn binders.
pub fn func_exp(
    name: impl Into<Id>,
    sort: FuncSort,
    control: Control,
    typ_params: Vec<TypParam>,
    params: Vec<Arg>,
    rets: Vec<Type>,
    body: Exp,
) -> Exp {
    let cons: Vec<_> = typ_params.iter().map(|p| p.con.clone()).collect();
    let binds: Vec<Bind> = typ_params
        .iter()
        .map(|p| Bind {
            var: p.con.name().to_owned(),
            bound: p.bound.clone(),
        })
        .collect();
    let typ = Type::Func(
        sort,
        control,
        types::close_binds(&cons, &binds),
        params
            .iter()
            .map(|arg| types::close(&cons, &arg.typ))
            .collect(),
        rets.iter().map(|t| types::close(&cons, t)).collect(),
    );
    exp(
        ExpKind::Func {
            name: name.into(),
            sort,
            control,
            typ_params,
            params,
            rets,
            body: Box::new(body),
        },
        typ,
        Effect::Triv,
    )
}

/// A local, directly returning function value without type parameters.
pub fn local_func_exp(name: impl Into<Id>, params: Vec<Arg>, rets: Vec<Type>, body: Exp) -> Exp {
    func_exp(
        name,
        FuncSort::Local,
        Control::Returns,
        Vec::new(),
        params,
        rets,
        body,
    )
}

/// A call, with its convention and result type read off the callee's
/// function type. The effect is the least upper bound of the callee's and
/// the argument's.
pub fn call_exp(func: Exp, typs: Vec<Type>, arg: Exp) -> Exp {
    let (sort, control, cods) = match types::promote(&func.note.typ) {
        Type::Func(sort, control, _, _, cods) => (sort, control, cods),
        _ => unreachable!("call of a non-function"),
    };
    let typ = types::seq(&cods.iter().map(|t| types::open(&typs, t)).collect::<Vec<_>>());
    let eff = func.note.eff.lub(arg.note.eff);
    exp(
        ExpKind::Call(
            CallConv { sort, control },
            Box::new(func),
            typs,
            Box::new(arg),
        ),
        typ,
        eff,
    )
}

pub fn block_exp(decs: Vec<Dec>, result: Exp) -> Exp {
    if decs.is_empty() {
        return result;
    }
    let eff = decs
        .iter()
        .fold(result.note.eff, |eff, dec| eff.lub(super::dec_effect(dec)));
    let typ = result.note.typ.clone();
    exp(ExpKind::Block(decs, Box::new(result)), typ, eff)
}

// ---------------------------------------------------------------------------
// Patterns and declarations

pub fn var_pat(id: impl Into<Id>, typ: Type) -> Pat {
    Pat {
        kind: PatKind::Var(id.into()),
        span: Span::Empty,
        typ,
    }
}

pub fn wild_pat(typ: Type) -> Pat {
    Pat {
        kind: PatKind::Wild,
        span: Span::Empty,
        typ,
    }
}

pub fn tup_pat(pats: Vec<Pat>) -> Pat {
    let typ = Type::Tup(pats.iter().map(|p| p.typ.clone()).collect());
    Pat {
        kind: PatKind::Tup(pats),
        span: Span::Empty,
        typ,
    }
}

pub fn let_dec(pat: Pat, e: Exp) -> Dec {
    Dec {
        kind: DecKind::Let(pat, e),
        span: Span::Empty,
    }
}

/// `let v = e`, binding a variable expression's identifier.
pub fn let_var_dec(var: &Exp, e: Exp) -> Dec {
    let_dec(var_pat(id_of(var).clone(), var.note.typ.clone()), e)
}

/// `var id = e`, introducing a mutable cell.
pub fn var_dec(id: impl Into<Id>, e: Exp) -> Dec {
    Dec {
        kind: DecKind::Var(id.into(), e),
        span: Span::Empty,
    }
}

/// An expression evaluated for effect only.
pub fn exp_dec(e: Exp) -> Dec {
    let_dec(wild_pat(e.note.typ.clone()), e)
}

pub fn case(pat: Pat, e: Exp) -> Case {
    Case { pat, exp: e }
}

// ---------------------------------------------------------------------------
// Continuation typing for the await pass

/// The answer type of CPS-translated code. A continuation invocation
/// never returns to its caller, and `Non` is the static witness.
pub fn answer_typ() -> Type {
    Type::Non
}

/// The type of a continuation consuming a value of type `t`.
pub fn cont_typ(t: &Type) -> Type {
    Type::Func(
        FuncSort::Local,
        Control::Returns,
        Vec::new(),
        vec![t.clone()],
        vec![Type::Non],
    )
}

fn exps_eff(exps: &[Exp]) -> Effect {
    exps.iter()
        .fold(Effect::Triv, |eff, e| eff.lub(e.note.eff))
}
