//! Type checking of the intermediate representation.
//!
//! The checker re-verifies every annotation the passes are required to
//! preserve: types are well formed and closed, effects dominate the
//! inferred effects, names and labels are in scope, mutability is
//! confined to its legal positions, and shared functions meet their
//! concreteness and shareability obligations. It either completes
//! silently or reports the first violation as a [`CheckError`] naming the
//! pass that produced the tree; a failure is always a compiler bug.

use im::HashMap;

use crate::ir::{
    infer_effect, ops, Case, Dec, DecKind, Exp, ExpKind, Flavor, Id, Mutability, ObjField, Pat,
    PatKind, Prog,
};
use crate::reporting::CheckError;
use crate::source::Span;
use crate::types::{
    self, disjoint_add, lookup_field, open_binds, promote, seq, subtype, Bind, ConSet, Control,
    Field, FuncSort, Kind, ObjSort, Type,
};

/// The top-level scope seeded by elaboration: value bindings and the type
/// constructors in scope.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub vals: HashMap<Id, Type>,
    pub cons: ConSet,
}

impl Scope {
    pub fn new() -> Scope {
        Scope::default()
    }
}

/// Check a whole program against a top-level scope. `phase` names the
/// pass that produced the tree and appears only in error messages.
pub fn check_prog(scope: &Scope, phase: &str, prog: &Prog) -> Result<(), CheckError> {
    let mut env = Env {
        vals: scope.vals.clone(),
        cons: scope.cons.clone(),
        labs: HashMap::new(),
        rets: None,
        is_async: false,
        flavor: prog.flavor,
        phase,
    };
    for arg in &prog.args {
        env.check_typ(prog.span, &arg.typ)?;
        env.vals.insert(arg.id.clone(), arg.typ.clone());
    }
    for group in &prog.decs {
        env = env.check_decs(prog.span, group)?;
    }
    check_exposed_fields(&env, prog.span, &prog.fields)?;
    Ok(())
}

fn check_exposed_fields(
    env: &Env<'_>,
    span: Span,
    fields: &[ObjField],
) -> Result<(), CheckError> {
    for field in fields {
        let typ = match env.vals.get(&field.var) {
            Some(typ) => typ.clone(),
            None => {
                return Err(env.error(
                    span,
                    format!("unbound variable {} in exposed field", field.var),
                ))
            }
        };
        env.check(
            types::is_shared(&typ),
            span,
            || format!("exposed field {} must have shared type", field.lab),
        )?;
    }
    Ok(())
}

struct Env<'a> {
    vals: HashMap<Id, Type>,
    cons: ConSet,
    labs: HashMap<Id, Type>,
    rets: Option<Type>,
    is_async: bool,
    flavor: Flavor,
    phase: &'a str,
}

impl<'a> Env<'a> {
    fn branch(&self) -> Env<'a> {
        Env {
            vals: self.vals.clone(),
            cons: self.cons.clone(),
            labs: self.labs.clone(),
            rets: self.rets.clone(),
            is_async: self.is_async,
            flavor: self.flavor,
            phase: self.phase,
        }
    }

    fn error(&self, span: Span, message: impl Into<String>) -> CheckError {
        CheckError::new(self.phase, span, message)
    }

    fn check(
        &self,
        cond: bool,
        span: Span,
        message: impl FnOnce() -> String,
    ) -> Result<(), CheckError> {
        if cond {
            Ok(())
        } else {
            Err(self.error(span, message()))
        }
    }

    fn check_sub(&self, span: Span, t1: &Type, t2: &Type) -> Result<(), CheckError> {
        self.check(subtype(t1, t2), span, || {
            format!(
                "expression of type {} cannot produce expected type {}",
                t1, t2
            )
        })
    }

    // -----------------------------------------------------------------------
    // Types

    /// Validate a type annotation: closed, kind correct, sorted fields,
    /// mutability confined, flavor respected.
    fn check_typ(&self, span: Span, typ: &Type) -> Result<(), CheckError> {
        match typ {
            Type::Prim(_) | Type::Any | Type::Non | Type::Shared => Ok(()),
            Type::Pre => Err(self.error(span, "illegal occurrence of unresolved type")),
            Type::Var(i) => Err(self.error(span, format!("free bound type variable #{}", i))),
            Type::Mut(_) => Err(self.error(span, "misplaced mutable type")),
            Type::Con(con, args) => {
                self.check(self.cons.contains(con), span, || {
                    format!("free type constructor {}", con.name())
                })?;
                let binds = con.kind().binds().to_vec();
                self.check(binds.len() == args.len(), span, || {
                    format!("type constructor {} applied at wrong arity", con.name())
                })?;
                for arg in args {
                    self.check_typ(span, arg)?;
                }
                self.check_typ_bounds(span, &binds, args)
            }
            Type::Tup(ts) => ts.iter().try_for_each(|t| self.check_typ(span, t)),
            Type::Opt(t) => self.check_typ(span, t),
            Type::Array(t) => self.check_typ_allow_mut(span, t),
            Type::Async(t) => {
                self.check(self.flavor.has_async_typ, span, || {
                    "async type after async erasure".to_owned()
                })?;
                self.check_typ(span, t)
            }
            Type::Obj(sort, fields) => {
                self.check(types::fields_sorted(fields), span, || {
                    "object type's fields are not distinct and sorted".to_owned()
                })?;
                for field in fields {
                    match sort {
                        ObjSort::Actor => {
                            self.check(!field.typ.is_mut(), span, || {
                                format!("actor field {} must be immutable", field.lab)
                            })?;
                            self.check(types::is_shared(&field.typ), span, || {
                                format!("actor field {} must have shared type", field.lab)
                            })?;
                            self.check_typ(span, &field.typ)?;
                        }
                        ObjSort::Object | ObjSort::Module => {
                            self.check_typ_allow_mut(span, &field.typ)?;
                        }
                    }
                }
                Ok(())
            }
            Type::Variant(fields) => {
                self.check(types::fields_sorted(fields), span, || {
                    "variant type's fields are not distinct and sorted".to_owned()
                })?;
                fields
                    .iter()
                    .try_for_each(|f| self.check_typ(span, &f.typ))
            }
            Type::Func(sort, control, binds, doms, cods) => {
                let (cons, args) = open_binds(binds);
                let mut env = self.branch();
                for con in &cons {
                    env.cons.insert(con.clone());
                }
                let doms: Vec<Type> = doms.iter().map(|t| types::open(&args, t)).collect();
                let cods: Vec<Type> = cods.iter().map(|t| types::open(&args, t)).collect();
                for bind in binds {
                    env.check_typ(span, &types::open(&args, &bind.bound))?;
                }
                for dom in &doms {
                    env.check_typ(span, dom)?;
                }
                for cod in &cods {
                    env.check_typ(span, cod)?;
                }
                if *control == Control::Promises {
                    self.check(
                        cods.len() == 1 && promote(&cods[0]).as_async().is_some(),
                        span,
                        || "promising function must return an async type".to_owned(),
                    )?;
                }
                if *sort == FuncSort::Shared {
                    for dom in &doms {
                        env.check(types::is_shared(dom), span, || {
                            format!("shared function parameter of non-shared type {}", dom)
                        })?;
                    }
                    match control {
                        Control::Promises => {
                            let inner = match promote(&cods[0]).as_async() {
                                Some(t) => t.clone(),
                                None => unreachable!("checked above"),
                            };
                            env.check(types::is_shared(&inner), span, || {
                                format!("shared function result of non-shared type {}", inner)
                            })?;
                        }
                        Control::Returns => {
                            env.check(cods.is_empty() || cods[0].is_unit(), span, || {
                                "a shared function returns nothing or a promise".to_owned()
                            })?;
                        }
                    }
                }
                Ok(())
            }
            Type::Serialized(t) => {
                self.check(self.flavor.serialized, span, || {
                    "misplaced serialized type".to_owned()
                })?;
                self.check(types::is_shared(t), span, || {
                    format!("serialized payload of non-shared type {}", t)
                })?;
                self.check_typ(span, t)
            }
        }
    }

    /// Like [`Env::check_typ`], but tolerates one leading `Mut`. Used at
    /// the positions where mutable cells legally occur.
    fn check_typ_allow_mut(&self, span: Span, typ: &Type) -> Result<(), CheckError> {
        match typ {
            Type::Mut(t) => self.check_typ(span, t),
            t => self.check_typ(span, t),
        }
    }

    fn check_typ_bounds(
        &self,
        span: Span,
        binds: &[Bind],
        args: &[Type],
    ) -> Result<(), CheckError> {
        for (bind, arg) in binds.iter().zip(args) {
            let bound = types::open(args, &bind.bound);
            self.check(subtype(arg, &bound), span, || {
                format!(
                    "type argument {} does not satisfy parameter bound {}",
                    arg, bound
                )
            })?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Expressions

    fn check_exp(&self, exp: &Exp) -> Result<(), CheckError> {
        let span = exp.span;
        let typ = &exp.note.typ;
        self.check_typ_allow_mut(span, typ)?;
        self.check(infer_effect(exp) <= exp.note.eff, span, || {
            "inferred effect not covered by effect annotation".to_owned()
        })?;

        match &exp.kind {
            ExpKind::Lit(lit) => self.check_sub(span, &lit.typ(), typ),

            ExpKind::Var(id) => {
                let bound = match self.vals.get(id) {
                    Some(t) => t.clone(),
                    None => return Err(self.error(span, format!("unbound variable {}", id))),
                };
                // The immutable view of a mutable binding is taken
                // implicitly, unless the context wants the cell itself.
                self.check(
                    subtype(&bound, typ) || subtype(&bound.as_immut(), typ),
                    span,
                    || {
                        format!(
                            "variable of type {} cannot produce expected type {}",
                            bound, typ
                        )
                    },
                )
            }

            ExpKind::Prim(_) => Ok(()),

            ExpKind::Un(op_typ, op, e1) => {
                self.check_exp(e1)?;
                self.check_typ(span, op_typ)?;
                self.check(ops::has_unop(*op, op_typ), span, || {
                    format!("unary operator is not defined for operand type {}", op_typ)
                })?;
                self.check_sub(span, &e1.note.typ, op_typ)?;
                self.check_sub(span, op_typ, typ)
            }

            ExpKind::Bin(op_typ, op, e1, e2) => {
                self.check_exp(e1)?;
                self.check_exp(e2)?;
                self.check_typ(span, op_typ)?;
                self.check(ops::has_binop(*op, op_typ), span, || {
                    format!("binary operator is not defined for operand type {}", op_typ)
                })?;
                self.check_sub(span, &e1.note.typ, op_typ)?;
                self.check_sub(span, &e2.note.typ, op_typ)?;
                self.check_sub(span, op_typ, typ)
            }

            ExpKind::Rel(op_typ, op, e1, e2) => {
                self.check_exp(e1)?;
                self.check_exp(e2)?;
                self.check_typ(span, op_typ)?;
                self.check(ops::has_relop(*op, op_typ), span, || {
                    format!(
                        "relational operator is not defined for operand type {}",
                        op_typ
                    )
                })?;
                self.check_sub(span, &e1.note.typ, op_typ)?;
                self.check_sub(span, &e2.note.typ, op_typ)?;
                self.check_sub(span, &Type::bool(), typ)
            }

            ExpKind::Show(op_typ, e1) => {
                self.check(self.flavor.has_show, span, || {
                    "show operator after show erasure".to_owned()
                })?;
                self.check_exp(e1)?;
                self.check_typ(span, op_typ)?;
                self.check(ops::can_show(op_typ), span, || {
                    format!("show is not defined for operand type {}", op_typ)
                })?;
                self.check_sub(span, &e1.note.typ, op_typ)?;
                self.check_sub(span, &Type::text(), typ)
            }

            ExpKind::Tup(es) => {
                for e in es {
                    self.check_exp(e)?;
                }
                let tup = Type::Tup(es.iter().map(|e| e.note.typ.clone()).collect());
                self.check_sub(span, &tup, typ)
            }

            ExpKind::Proj(e1, n) => {
                self.check_exp(e1)?;
                let ts = match promote(&e1.note.typ) {
                    Type::Tup(ts) => ts,
                    t => {
                        return Err(
                            self.error(span, format!("expected tuple type, found {}", t))
                        )
                    }
                };
                self.check(*n < ts.len(), span, || {
                    format!("tuple projection {} out of bounds", n)
                })?;
                self.check_sub(span, &ts[*n], typ)
            }

            ExpKind::Opt(e1) => {
                self.check_exp(e1)?;
                self.check_sub(span, &Type::opt(e1.note.typ.clone()), typ)
            }

            ExpKind::Tag(lab, e1) => {
                self.check_exp(e1)?;
                let variant =
                    Type::Variant(vec![Field::new(lab.clone(), e1.note.typ.clone())]);
                self.check_sub(span, &variant, typ)
            }

            ExpKind::Dot(e1, lab) => {
                self.check_exp(e1)?;
                let (sort, fields) = self.expect_obj(span, &e1.note.typ)?;
                self.check(sort != ObjSort::Actor, span, || {
                    "object field access on actor type".to_owned()
                })?;
                self.check_field(span, &fields, lab, typ)
            }

            ExpKind::ActorDot(e1, lab) => {
                self.check_exp(e1)?;
                let (sort, fields) = self.expect_obj(span, &e1.note.typ)?;
                self.check(sort == ObjSort::Actor, span, || {
                    "actor field access on non-actor type".to_owned()
                })?;
                self.check_field(span, &fields, lab, typ)
            }

            ExpKind::Array(mutability, elem, es) => {
                self.check_typ(span, elem)?;
                for e in es {
                    self.check_exp(e)?;
                    self.check_sub(span, &e.note.typ, elem)?;
                }
                let array = match mutability {
                    Mutability::Const => Type::array(elem.clone()),
                    Mutability::Var => Type::array(Type::mutable(elem.clone())),
                };
                self.check_sub(span, &array, typ)
            }

            ExpKind::Idx(e1, e2) => {
                self.check_exp(e1)?;
                self.check_exp(e2)?;
                let elem = match promote(&e1.note.typ) {
                    Type::Array(elem) => (*elem).clone(),
                    t => {
                        return Err(
                            self.error(span, format!("expected array type, found {}", t))
                        )
                    }
                };
                self.check_sub(span, &e2.note.typ, &Type::nat())?;
                self.check(
                    subtype(&elem, typ) || subtype(&elem.as_immut(), typ),
                    span,
                    || {
                        format!(
                            "array element of type {} cannot produce expected type {}",
                            elem, typ
                        )
                    },
                )
            }

            ExpKind::Assign(target, source) => {
                self.check_exp(target)?;
                self.check_exp(source)?;
                let cell = match target.note.typ.as_mut() {
                    Some(cell) => cell.clone(),
                    None => {
                        return Err(self.error(span, "expected mutable assignment target"))
                    }
                };
                self.check_sub(span, &source.note.typ, &cell)?;
                self.check_sub(span, &Type::unit(), typ)
            }

            ExpKind::Call(conv, func, typ_args, arg) => {
                self.check_exp(func)?;
                self.check_exp(arg)?;
                let (sort, control, binds, doms, cods) = match promote(&func.note.typ) {
                    Type::Func(sort, control, binds, doms, cods) => {
                        (sort, control, binds, doms, cods)
                    }
                    t => {
                        return Err(
                            self.error(span, format!("expected function type, found {}", t))
                        )
                    }
                };
                self.check(
                    conv.sort == sort && conv.control == control,
                    span,
                    || "call convention mismatch".to_owned(),
                )?;
                self.check(binds.len() == typ_args.len(), span, || {
                    "type argument arity mismatch".to_owned()
                })?;
                for typ_arg in typ_args {
                    self.check_typ(span, typ_arg)?;
                }
                self.check_typ_bounds(span, &binds, typ_args)?;
                let doms: Vec<Type> =
                    doms.iter().map(|t| types::open(typ_args, t)).collect();
                let cod = seq(
                    &cods
                        .iter()
                        .map(|t| types::open(typ_args, t))
                        .collect::<Vec<_>>(),
                );
                if sort == FuncSort::Shared {
                    for t in doms.iter().chain(std::iter::once(&cod)) {
                        self.check(types::is_concrete(t), span, || {
                            format!("message type {} must be concrete", t)
                        })?;
                    }
                }
                self.check_sub(span, &arg.note.typ, &seq(&doms))?;
                self.check_sub(span, &cod, typ)
            }

            ExpKind::Block(decs, e1) => {
                let env = self.check_decs(span, decs)?;
                env.check_exp(e1)?;
                self.check_sub(span, &e1.note.typ, typ)
            }

            ExpKind::If(cond, then, els) => {
                self.check_exp(cond)?;
                self.check_sub(span, &cond.note.typ, &Type::bool())?;
                self.check_exp(then)?;
                self.check_sub(span, &then.note.typ, typ)?;
                self.check_exp(els)?;
                self.check_sub(span, &els.note.typ, typ)
            }

            ExpKind::Switch(scrut, cases) => {
                self.check_exp(scrut)?;
                for Case { pat, exp: body } in cases {
                    let ve = self.check_pat(pat)?;
                    self.check(subtype(&scrut.note.typ, &pat.typ), span, || {
                        format!(
                            "case pattern of type {} cannot consume scrutinee of type {}",
                            pat.typ, scrut.note.typ
                        )
                    })?;
                    let mut env = self.branch();
                    for (id, t) in ve {
                        env.vals.insert(id, t);
                    }
                    env.check_exp(body)?;
                    self.check_sub(span, &body.note.typ, typ)?;
                }
                Ok(())
            }

            ExpKind::Loop(body) => {
                self.check_exp(body)?;
                self.check(subtype(&body.note.typ, &Type::unit()), span, || {
                    format!("loop body of type {} must have unit type", body.note.typ)
                })
            }

            ExpKind::Label(id, lab_typ, body) => {
                self.check_typ(span, lab_typ)?;
                let mut env = self.branch();
                env.labs.insert(id.clone(), lab_typ.clone());
                env.check_exp(body)?;
                self.check_sub(span, &body.note.typ, lab_typ)?;
                self.check_sub(span, lab_typ, typ)
            }

            ExpKind::Break(id, e1) => {
                let lab_typ = match self.labs.get(id) {
                    Some(t) => t.clone(),
                    None => return Err(self.error(span, format!("unbound label {}", id))),
                };
                self.check_exp(e1)?;
                self.check_sub(span, &e1.note.typ, &lab_typ)
            }

            ExpKind::Ret(e1) => {
                let ret_typ = match &self.rets {
                    Some(t) => t.clone(),
                    None => return Err(self.error(span, "misplaced return")),
                };
                self.check_exp(e1)?;
                self.check_sub(span, &e1.note.typ, &ret_typ)
            }

            ExpKind::Async(body) => {
                self.check(self.flavor.has_await, span, || {
                    "async expression after await erasure".to_owned()
                })?;
                let inner = match promote(typ).as_async() {
                    Some(t) => t.clone(),
                    None => {
                        return Err(self.error(
                            span,
                            format!("async expression of non-async type {}", typ),
                        ))
                    }
                };
                let mut env = self.branch();
                env.labs = HashMap::new();
                env.rets = Some(inner.clone());
                env.is_async = true;
                env.check_exp(body)?;
                self.check_sub(span, &body.note.typ, &inner)
            }

            ExpKind::Await(e1) => {
                self.check(self.flavor.has_await, span, || {
                    "await expression after await erasure".to_owned()
                })?;
                self.check(self.is_async, span, || "misplaced await".to_owned())?;
                self.check_exp(e1)?;
                let inner = match promote(&e1.note.typ).as_async() {
                    Some(t) => t.clone(),
                    None => {
                        return Err(self.error(
                            span,
                            format!("expected async type, found {}", e1.note.typ),
                        ))
                    }
                };
                self.check_sub(span, &inner, typ)
            }

            ExpKind::Assert(e1) => {
                self.check_exp(e1)?;
                self.check_sub(span, &e1.note.typ, &Type::bool())?;
                self.check_sub(span, &Type::unit(), typ)
            }

            ExpKind::Declare(id, dec_typ, body) => {
                self.check_typ_allow_mut(span, dec_typ)?;
                let mut env = self.branch();
                env.vals.insert(id.clone(), dec_typ.clone());
                env.check_exp(body)?;
                self.check_sub(span, &body.note.typ, typ)
            }

            ExpKind::Define(id, mutability, e1) => {
                self.check_exp(e1)?;
                let bound = match self.vals.get(id) {
                    Some(t) => t.clone(),
                    None => return Err(self.error(span, format!("unbound variable {}", id))),
                };
                match mutability {
                    Mutability::Var => {
                        let cell = match bound.as_mut() {
                            Some(cell) => cell.clone(),
                            None => {
                                return Err(self.error(
                                    span,
                                    "mutable definition of immutable binding",
                                ))
                            }
                        };
                        self.check_sub(span, &e1.note.typ, &cell)?;
                    }
                    Mutability::Const => {
                        self.check(!bound.is_mut(), span, || {
                            "immutable definition of mutable binding".to_owned()
                        })?;
                        self.check_sub(span, &e1.note.typ, &bound)?;
                    }
                }
                self.check_sub(span, &Type::unit(), typ)
            }

            ExpKind::Func {
                sort,
                control,
                typ_params,
                params,
                rets,
                body,
                ..
            } => {
                let mut env = self.branch();
                for param in typ_params {
                    env.cons = match disjoint_add(&env.cons, param.con.clone()) {
                        Ok(cons) => cons,
                        Err(con) => {
                            return Err(self.error(
                                span,
                                format!("duplicate type parameter {}", con.name()),
                            ))
                        }
                    };
                }
                for param in typ_params {
                    env.check_typ(span, &param.bound)?;
                }
                let mut ids = std::collections::HashSet::new();
                for arg in params {
                    env.check_typ(span, &arg.typ)?;
                    self.check(ids.insert(arg.id.clone()), span, || {
                        format!("duplicate parameter {}", arg.id)
                    })?;
                }
                let ret_typ = seq(rets);
                for ret in rets {
                    env.check_typ(span, ret)?;
                }
                if *sort == FuncSort::Shared {
                    for arg in params {
                        env.check(types::is_shared(&arg.typ), span, || {
                            format!("shared function parameter {} of non-shared type", arg.id)
                        })?;
                    }
                    match control {
                        Control::Promises => {
                            let inner = match promote(&ret_typ).as_async() {
                                Some(t) => t.clone(),
                                None => {
                                    return Err(self.error(
                                        span,
                                        "promising function must return an async type",
                                    ))
                                }
                            };
                            env.check(types::is_shared(&inner), span, || {
                                format!("shared function result of non-shared type {}", inner)
                            })?;
                        }
                        Control::Returns => {
                            env.check(rets.is_empty() || ret_typ.is_unit(), span, || {
                                "a shared function returns nothing or a promise".to_owned()
                            })?;
                        }
                    }
                }
                let mut body_env = env.branch();
                for arg in params {
                    body_env.vals.insert(arg.id.clone(), arg.typ.clone());
                }
                body_env.labs = HashMap::new();
                body_env.rets = Some(ret_typ.clone());
                body_env.is_async = false;
                body_env.check_exp(body)?;
                env.check_sub(span, &body.note.typ, &ret_typ)?;

                let cons: Vec<_> = typ_params.iter().map(|p| p.con.clone()).collect();
                let binds: Vec<Bind> = typ_params
                    .iter()
                    .map(|p| Bind {
                        var: p.con.name().to_owned(),
                        bound: p.bound.clone(),
                    })
                    .collect();
                let fun_typ = Type::Func(
                    *sort,
                    *control,
                    types::close_binds(&cons, &binds),
                    params.iter().map(|a| types::close(&cons, &a.typ)).collect(),
                    rets.iter().map(|t| types::close(&cons, t)).collect(),
                );
                self.check_sub(span, &fun_typ, typ)
            }

            ExpKind::NewObj(sort, fields) => {
                self.check(*sort != ObjSort::Actor, span, || {
                    "object construction cannot produce an actor".to_owned()
                })?;
                let mut tfs = Vec::with_capacity(fields.len());
                for field in fields {
                    let field_typ = match self.vals.get(&field.var) {
                        Some(t) => t.clone(),
                        None => {
                            return Err(
                                self.error(span, format!("unbound variable {}", field.var))
                            )
                        }
                    };
                    tfs.push(Field::new(field.lab.clone(), field_typ));
                }
                let tfs = types::sort_fields(tfs);
                self.check(types::fields_sorted(&tfs), span, || {
                    "object construction with duplicate field labels".to_owned()
                })?;
                self.check_sub(span, &Type::Obj(*sort, tfs), typ)
            }

            ExpKind::Actor(decs, fields, actor_typ) => {
                self.check_typ(span, actor_typ)?;
                let tfs = match actor_typ.as_obj() {
                    Some((ObjSort::Actor, tfs)) => tfs.to_vec(),
                    _ => {
                        return Err(self.error(
                            span,
                            format!("expected actor type, found {}", actor_typ),
                        ))
                    }
                };
                let mut env = self.branch();
                env.labs = HashMap::new();
                env.rets = None;
                env.is_async = false;
                let env = env.check_decs(span, decs)?;
                for field in fields {
                    let field_typ = match env.vals.get(&field.var) {
                        Some(t) => t.clone(),
                        None => {
                            return Err(
                                env.error(span, format!("unbound variable {}", field.var))
                            )
                        }
                    };
                    let expected = match lookup_field(&field.lab, &tfs) {
                        Some(t) => t.clone(),
                        None => {
                            return Err(env.error(
                                span,
                                format!(
                                    "field {} does not exist in type {}",
                                    field.lab, actor_typ
                                ),
                            ))
                        }
                    };
                    env.check_sub(span, &field_typ, &expected)?;
                }
                self.check_sub(span, actor_typ, typ)
            }
        }
    }

    fn expect_obj(
        &self,
        span: Span,
        typ: &Type,
    ) -> Result<(ObjSort, Vec<Field>), CheckError> {
        match promote(typ) {
            Type::Obj(sort, fields) => Ok((sort, fields)),
            t => Err(self.error(span, format!("expected object type, found {}", t))),
        }
    }

    fn check_field(
        &self,
        span: Span,
        fields: &[Field],
        lab: &str,
        typ: &Type,
    ) -> Result<(), CheckError> {
        let field_typ = match lookup_field(lab, fields) {
            Some(t) => t.clone(),
            None => {
                return Err(self.error(span, format!("field {} does not exist", lab)))
            }
        };
        self.check(
            subtype(&field_typ, typ) || subtype(&field_typ.as_immut(), typ),
            span,
            || {
                format!(
                    "field of type {} cannot produce expected type {}",
                    field_typ, typ
                )
            },
        )
    }

    // -----------------------------------------------------------------------
    // Declarations

    /// Check a block of declarations: a gather phase first collects every
    /// binding into a fresh scope (failing on duplicates), then each
    /// declaration is re-checked with the full scope in hand, so mutually
    /// recursive bindings see each other.
    fn check_decs(&self, span: Span, decs: &[Dec]) -> Result<Env<'a>, CheckError> {
        let mut env = self.branch();
        let mut bound: HashMap<Id, Type> = HashMap::new();
        for dec in decs {
            self.gather_dec(span, &mut bound, &mut env.cons, dec)?;
        }
        for (id, typ) in bound {
            env.vals.insert(id, typ);
        }
        for dec in decs {
            env.check_dec(dec)?;
        }
        Ok(env)
    }

    fn gather_dec(
        &self,
        span: Span,
        bound: &mut HashMap<Id, Type>,
        cons: &mut ConSet,
        dec: &Dec,
    ) -> Result<(), CheckError> {
        match &dec.kind {
            DecKind::Let(pat, _) => self.gather_pat(span, bound, pat),
            DecKind::Var(id, exp) => self.gather_id(
                span,
                bound,
                id,
                Type::mutable(exp.note.typ.clone()),
            ),
            DecKind::Typ(con) => {
                *cons = match disjoint_add(cons, con.clone()) {
                    Ok(cons) => cons,
                    Err(con) => {
                        return Err(self.error(
                            span,
                            format!("duplicate definition of type {}", con.name()),
                        ))
                    }
                };
                Ok(())
            }
        }
    }

    fn gather_pat(
        &self,
        span: Span,
        bound: &mut HashMap<Id, Type>,
        pat: &Pat,
    ) -> Result<(), CheckError> {
        match &pat.kind {
            PatKind::Wild | PatKind::Lit(_) => Ok(()),
            PatKind::Var(id) => self.gather_id(span, bound, id, pat.typ.clone()),
            PatKind::Tup(pats) => pats
                .iter()
                .try_for_each(|p| self.gather_pat(span, bound, p)),
            PatKind::Obj(fields) => fields
                .iter()
                .try_for_each(|f| self.gather_pat(span, bound, &f.pat)),
            PatKind::Opt(p) | PatKind::Tag(_, p) => self.gather_pat(span, bound, p),
            // Alternatives bind nothing; enforced in check_pat.
            PatKind::Alt(..) => Ok(()),
        }
    }

    fn gather_id(
        &self,
        span: Span,
        bound: &mut HashMap<Id, Type>,
        id: &Id,
        typ: Type,
    ) -> Result<(), CheckError> {
        self.check(!bound.contains_key(id), span, || {
            format!("duplicate definition of {} in block", id)
        })?;
        bound.insert(id.clone(), typ);
        Ok(())
    }

    fn check_dec(&self, dec: &Dec) -> Result<(), CheckError> {
        let span = dec.span;
        match &dec.kind {
            DecKind::Let(pat, exp) => {
                self.check_exp(exp)?;
                self.check_pat(pat)?;
                self.check(subtype(&exp.note.typ, &pat.typ), span, || {
                    format!(
                        "let pattern of type {} cannot consume expression of type {}",
                        pat.typ, exp.note.typ
                    )
                })
            }
            DecKind::Var(_, exp) => self.check_exp(exp),
            DecKind::Typ(con) => {
                let kind = con.kind();
                let (binds, body) = match &kind {
                    Kind::Def(binds, body) | Kind::Abs(binds, body) => (binds, body),
                };
                let (cons, args) = open_binds(binds);
                let mut env = self.branch();
                for c in &cons {
                    env.cons.insert(c.clone());
                }
                for bind in binds {
                    env.check_typ(span, &types::open(&args, &bind.bound))?;
                }
                env.check_typ(span, &types::open(&args, body))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Patterns

    /// Validate a pattern and return its bound-variable environment.
    fn check_pat(&self, pat: &Pat) -> Result<HashMap<Id, Type>, CheckError> {
        let span = pat.span;
        self.check_typ(span, &pat.typ)?;
        let mut ve = HashMap::new();
        self.check_pat_into(span, &mut ve, pat)?;
        Ok(ve)
    }

    fn check_pat_into(
        &self,
        span: Span,
        ve: &mut HashMap<Id, Type>,
        pat: &Pat,
    ) -> Result<(), CheckError> {
        match &pat.kind {
            PatKind::Wild => Ok(()),
            PatKind::Var(id) => {
                self.check(!ve.contains_key(id), span, || {
                    format!("duplicate variable {} in pattern", id)
                })?;
                ve.insert(id.clone(), pat.typ.clone());
                Ok(())
            }
            PatKind::Lit(lit) => self.check(subtype(&lit.typ(), &pat.typ), span, || {
                format!(
                    "literal pattern of type {} cannot consume expected type {}",
                    lit.typ(),
                    pat.typ
                )
            }),
            PatKind::Tup(pats) => {
                let ts = match promote(&pat.typ) {
                    Type::Tup(ts) => ts,
                    t => {
                        return Err(self.error(
                            span,
                            format!("expected tuple type in pattern, found {}", t),
                        ))
                    }
                };
                self.check(ts.len() == pats.len(), span, || {
                    "tuple pattern arity mismatch".to_owned()
                })?;
                for (t, p) in ts.iter().zip(pats) {
                    self.check_proj(span, t, p)?;
                    self.check_pat_into(span, ve, p)?;
                }
                Ok(())
            }
            PatKind::Obj(fields) => {
                let (_, tfs) = self.expect_obj(span, &pat.typ)?;
                for field in fields {
                    let t = match lookup_field(&field.lab, &tfs) {
                        Some(t) => t.as_immut(),
                        None => {
                            return Err(self.error(
                                span,
                                format!("field {} does not exist", field.lab),
                            ))
                        }
                    };
                    self.check_proj(span, &t, &field.pat)?;
                    self.check_pat_into(span, ve, &field.pat)?;
                }
                Ok(())
            }
            PatKind::Opt(p) => {
                let t = match promote(&pat.typ) {
                    Type::Opt(t) => (*t).clone(),
                    t => {
                        return Err(self.error(
                            span,
                            format!("expected option type in pattern, found {}", t),
                        ))
                    }
                };
                self.check_proj(span, &t, p)?;
                self.check_pat_into(span, ve, p)
            }
            PatKind::Tag(lab, p) => {
                let arms = match promote(&pat.typ) {
                    Type::Variant(arms) => arms,
                    t => {
                        return Err(self.error(
                            span,
                            format!("expected variant type in pattern, found {}", t),
                        ))
                    }
                };
                let t = match lookup_field(lab, &arms) {
                    Some(t) => t.clone(),
                    None => {
                        return Err(self.error(
                            span,
                            format!("variant pattern arm {} does not exist", lab),
                        ))
                    }
                };
                self.check_proj(span, &t, p)?;
                self.check_pat_into(span, ve, p)
            }
            PatKind::Alt(p1, p2) => {
                self.check_proj(span, &pat.typ, p1)?;
                self.check_proj(span, &pat.typ, p2)?;
                let ve1 = self.check_pat(p1)?;
                let ve2 = self.check_pat(p2)?;
                self.check(ve1.is_empty() && ve2.is_empty(), span, || {
                    "alternative patterns may not bind variables".to_owned()
                })
            }
        }
    }

    /// The projected component type must be consumable by the
    /// sub-pattern's annotation.
    fn check_proj(&self, span: Span, projected: &Type, pat: &Pat) -> Result<(), CheckError> {
        self.check(subtype(projected, &pat.typ), span, || {
            format!(
                "sub-pattern of type {} cannot consume projected type {}",
                pat.typ, projected
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::construct::*;
    use crate::ir::{Arg, Exp, Flavor, Prog};
    use crate::source::Span;
    use crate::types::{Field, ObjSort, Type};

    fn prog_of(decs: Vec<Dec>) -> Prog {
        Prog {
            args: Vec::new(),
            decs: vec![decs],
            fields: Vec::new(),
            flavor: Flavor::initial(),
            span: Span::Empty,
        }
    }

    fn check_exp(e: Exp) -> Result<(), crate::reporting::CheckError> {
        check_prog(&Scope::new(), "test", &prog_of(vec![exp_dec(e)]))
    }

    #[test]
    fn accepts_simple_arithmetic() {
        let e = bin_exp(
            Type::nat(),
            crate::ir::BinOp::Add,
            nat_exp(1),
            nat_exp(2),
        );
        assert!(check_exp(e).is_ok());
    }

    #[test]
    fn rejects_unbound_variables() {
        let err = check_exp(var_exp("x", Type::nat())).unwrap_err();
        assert!(err.message.contains("unbound variable x"));
    }

    #[test]
    fn rejects_immutable_assignment_targets() {
        let body = assign_exp(var_exp("x", Type::nat()), nat_exp(1));
        let decs = vec![
            let_dec(var_pat("x", Type::nat()), nat_exp(0)),
            exp_dec(body),
        ];
        let err = check_prog(&Scope::new(), "test", &prog_of(decs)).unwrap_err();
        assert_eq!(err.message, "expected mutable assignment target");
    }

    #[test]
    fn accepts_mutable_assignment_targets() {
        let decs = vec![
            var_dec("x", nat_exp(0)),
            exp_dec(assign_exp(
                var_exp("x", Type::mutable(Type::nat())),
                nat_exp(1),
            )),
        ];
        assert!(check_prog(&Scope::new(), "test", &prog_of(decs)).is_ok());
    }

    #[test]
    fn rejects_unsorted_object_types() {
        let typ = Type::Obj(
            ObjSort::Object,
            vec![
                Field::new("b", Type::nat()),
                Field::new("a", Type::nat()),
            ],
        );
        let err = check_exp(var_exp("o", typ)).unwrap_err();
        assert_eq!(
            err.message,
            "object type's fields are not distinct and sorted"
        );
    }

    #[test]
    fn rejects_effect_underapproximation() {
        // An await annotated as trivial must be refused.
        let p = fresh_var("p", Type::promise(Type::nat()));
        let mut awaited = await_exp(p.clone());
        awaited.note.eff = crate::ir::Effect::Triv;
        let body = async_exp(awaited);
        let decs = vec![let_var_dec(&p, async_exp(nat_exp(1))), exp_dec(body)];
        let err = check_prog(&Scope::new(), "test", &prog_of(decs)).unwrap_err();
        assert!(err.message.contains("inferred effect"));
    }

    #[test]
    fn rejects_misplaced_await() {
        let p = fresh_var("p", Type::promise(Type::nat()));
        let decs = vec![
            let_var_dec(&p, async_exp(nat_exp(1))),
            exp_dec(await_exp(p)),
        ];
        let err = check_prog(&Scope::new(), "test", &prog_of(decs)).unwrap_err();
        assert_eq!(err.message, "misplaced await");
    }

    #[test]
    fn rejects_unbound_labels() {
        let err = check_exp(break_exp("l", unit_exp())).unwrap_err();
        assert!(err.message.contains("unbound label l"));
    }

    #[test]
    fn rejects_misplaced_return() {
        let err = check_exp(ret_exp(unit_exp())).unwrap_err();
        assert_eq!(err.message, "misplaced return");
    }

    #[test]
    fn rejects_duplicate_block_bindings() {
        let decs = vec![
            let_dec(var_pat("x", Type::nat()), nat_exp(0)),
            let_dec(var_pat("x", Type::nat()), nat_exp(1)),
        ];
        let err = check_prog(&Scope::new(), "test", &prog_of(decs)).unwrap_err();
        assert!(err.message.contains("duplicate definition of x"));
    }

    #[test]
    fn accepts_recursive_functions() {
        // let f = func(n : Nat) : Nat { f(n) }; gathering makes the
        // binding visible to its own body.
        let call = call_exp(
            var_exp(
                "f",
                Type::Func(
                    crate::types::FuncSort::Local,
                    crate::types::Control::Returns,
                    Vec::new(),
                    vec![Type::nat()],
                    vec![Type::nat()],
                ),
            ),
            Vec::new(),
            var_exp("n", Type::nat()),
        );
        let f = local_func_exp(
            "f",
            vec![Arg::new("n", Type::nat())],
            vec![Type::nat()],
            call,
        );
        let decs = vec![let_dec(
            var_pat("f", f.note.typ.clone()),
            f,
        )];
        assert!(check_prog(&Scope::new(), "test", &prog_of(decs)).is_ok());
    }

    #[test]
    fn rejects_label_type_mismatches() {
        let e = label_exp("l", Type::nat(), text_exp("nope"));
        let err = check_exp(e).unwrap_err();
        assert!(err.message.contains("cannot produce expected type"));
    }
}
