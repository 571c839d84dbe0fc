//! Capture-avoiding renaming.
//!
//! Refreshes every bound value identifier and label in an expression.
//! The await pass applies this to `async` bodies before lifting them into
//! closures, so that no binder in the lifted code can capture or be
//! captured by binders at the lifting site.

use im::HashMap;

use crate::ir::construct::fresh_id;
use crate::ir::{Case, Dec, DecKind, Exp, ExpKind, Id, ObjField, Pat, PatKind, PatField};

/// Rename every bound identifier and label in an expression to a fresh
/// name. Free identifiers are left alone.
pub fn rename_exp(exp: Exp) -> Exp {
    Renaming::default().exp(exp)
}

#[derive(Default, Clone)]
struct Renaming {
    vals: HashMap<Id, Id>,
    labs: HashMap<Id, Id>,
}

/// The hint part of an identifier: what `fresh_id` once decorated, or the
/// name itself.
pub(crate) fn hint_of(id: &Id) -> &str {
    let id = id.strip_prefix('$').unwrap_or(id);
    id.split('/').next().unwrap_or(id)
}

impl Renaming {
    fn bind_val(&mut self, id: &Id) -> Id {
        let fresh = fresh_id(hint_of(id));
        self.vals.insert(id.clone(), fresh.clone());
        fresh
    }

    fn bind_lab(&mut self, id: &Id) -> Id {
        let fresh = fresh_id(hint_of(id));
        self.labs.insert(id.clone(), fresh.clone());
        fresh
    }

    fn val(&self, id: &Id) -> Id {
        self.vals.get(id).cloned().unwrap_or_else(|| id.clone())
    }

    fn lab(&self, id: &Id) -> Id {
        self.labs.get(id).cloned().unwrap_or_else(|| id.clone())
    }

    fn exp(&self, exp: Exp) -> Exp {
        let Exp { kind, span, note } = exp;
        let kind = match kind {
            ExpKind::Lit(_) | ExpKind::Prim(_) => kind,
            ExpKind::Var(id) => ExpKind::Var(self.val(&id)),
            ExpKind::Un(t, op, e) => ExpKind::Un(t, op, self.boxed(e)),
            ExpKind::Bin(t, op, e1, e2) => {
                ExpKind::Bin(t, op, self.boxed(e1), self.boxed(e2))
            }
            ExpKind::Rel(t, op, e1, e2) => {
                ExpKind::Rel(t, op, self.boxed(e1), self.boxed(e2))
            }
            ExpKind::Show(t, e) => ExpKind::Show(t, self.boxed(e)),
            ExpKind::Tup(es) => ExpKind::Tup(self.exps(es)),
            ExpKind::Proj(e, n) => ExpKind::Proj(self.boxed(e), n),
            ExpKind::Opt(e) => ExpKind::Opt(self.boxed(e)),
            ExpKind::Tag(lab, e) => ExpKind::Tag(lab, self.boxed(e)),
            ExpKind::Dot(e, lab) => ExpKind::Dot(self.boxed(e), lab),
            ExpKind::ActorDot(e, lab) => ExpKind::ActorDot(self.boxed(e), lab),
            ExpKind::Array(m, t, es) => ExpKind::Array(m, t, self.exps(es)),
            ExpKind::Idx(e1, e2) => ExpKind::Idx(self.boxed(e1), self.boxed(e2)),
            ExpKind::Assign(e1, e2) => ExpKind::Assign(self.boxed(e1), self.boxed(e2)),
            ExpKind::Func {
                name,
                sort,
                control,
                typ_params,
                params,
                rets,
                body,
            } => {
                let mut inner = self.clone();
                let params = params
                    .into_iter()
                    .map(|mut arg| {
                        arg.id = inner.bind_val(&arg.id);
                        arg
                    })
                    .collect();
                ExpKind::Func {
                    name,
                    sort,
                    control,
                    typ_params,
                    params,
                    rets,
                    body: Box::new(inner.exp(*body)),
                }
            }
            ExpKind::Call(conv, f, ts, arg) => {
                ExpKind::Call(conv, self.boxed(f), ts, self.boxed(arg))
            }
            ExpKind::Block(decs, e) => {
                let (_, decs, e) = self.block(decs, *e);
                ExpKind::Block(decs, Box::new(e))
            }
            ExpKind::If(c, t, f) => {
                ExpKind::If(self.boxed(c), self.boxed(t), self.boxed(f))
            }
            ExpKind::Switch(scrut, cases) => ExpKind::Switch(
                self.boxed(scrut),
                cases.into_iter().map(|case| self.case(case)).collect(),
            ),
            ExpKind::Loop(body) => ExpKind::Loop(self.boxed(body)),
            ExpKind::Label(id, t, body) => {
                let mut inner = self.clone();
                let id = inner.bind_lab(&id);
                ExpKind::Label(id, t, Box::new(inner.exp(*body)))
            }
            ExpKind::Break(id, e) => ExpKind::Break(self.lab(&id), self.boxed(e)),
            ExpKind::Ret(e) => ExpKind::Ret(self.boxed(e)),
            ExpKind::Async(body) => ExpKind::Async(self.boxed(body)),
            ExpKind::Await(e) => ExpKind::Await(self.boxed(e)),
            ExpKind::Assert(e) => ExpKind::Assert(self.boxed(e)),
            ExpKind::Declare(id, t, body) => {
                let mut inner = self.clone();
                let id = inner.bind_val(&id);
                ExpKind::Declare(id, t, Box::new(inner.exp(*body)))
            }
            ExpKind::Define(id, m, e) => ExpKind::Define(self.val(&id), m, self.boxed(e)),
            ExpKind::NewObj(sort, fields) => ExpKind::NewObj(sort, self.fields(fields)),
            ExpKind::Actor(decs, fields, typ) => {
                let unit = crate::ir::construct::unit_exp();
                let (inner, decs, _) = self.block(decs, unit);
                let fields = inner.fields(fields);
                ExpKind::Actor(decs, fields, typ)
            }
        };
        Exp { kind, span, note }
    }

    fn boxed(&self, e: Box<Exp>) -> Box<Exp> {
        Box::new(self.exp(*e))
    }

    fn exps(&self, es: Vec<Exp>) -> Vec<Exp> {
        es.into_iter().map(|e| self.exp(e)).collect()
    }

    fn fields(&self, fields: Vec<ObjField>) -> Vec<ObjField> {
        fields
            .into_iter()
            .map(|mut f| {
                f.var = self.val(&f.var);
                f
            })
            .collect()
    }

    /// A block scopes recursively: every declaration's binders are
    /// refreshed before any right-hand side is renamed.
    fn block(&self, decs: Vec<Dec>, result: Exp) -> (Renaming, Vec<Dec>, Exp) {
        let mut inner = self.clone();
        for dec in &decs {
            match &dec.kind {
                DecKind::Let(pat, _) => inner.bind_pat(pat),
                DecKind::Var(id, _) => {
                    inner.bind_val(id);
                }
                DecKind::Typ(_) => {}
            }
        }
        let decs = decs
            .into_iter()
            .map(|dec| {
                let Dec { kind, span } = dec;
                let kind = match kind {
                    DecKind::Let(pat, e) => DecKind::Let(inner.pat(pat), inner.exp(e)),
                    DecKind::Var(id, e) => DecKind::Var(inner.val(&id), inner.exp(e)),
                    DecKind::Typ(con) => DecKind::Typ(con),
                };
                Dec { kind, span }
            })
            .collect();
        let result = inner.exp(result);
        (inner, decs, result)
    }

    fn case(&self, case: Case) -> Case {
        let mut inner = self.clone();
        inner.bind_pat(&case.pat);
        Case {
            pat: inner.pat(case.pat),
            exp: inner.exp(case.exp),
        }
    }

    fn bind_pat(&mut self, pat: &Pat) {
        match &pat.kind {
            PatKind::Wild | PatKind::Lit(_) => {}
            PatKind::Var(id) => {
                self.bind_val(id);
            }
            PatKind::Tup(pats) => pats.iter().for_each(|p| self.bind_pat(p)),
            PatKind::Obj(fields) => fields.iter().for_each(|f| self.bind_pat(&f.pat)),
            PatKind::Opt(p) | PatKind::Tag(_, p) => self.bind_pat(p),
            // Alternatives bind nothing.
            PatKind::Alt(..) => {}
        }
    }

    fn pat(&self, pat: Pat) -> Pat {
        let Pat { kind, span, typ } = pat;
        let kind = match kind {
            PatKind::Wild | PatKind::Lit(_) => kind,
            PatKind::Var(id) => PatKind::Var(self.val(&id)),
            PatKind::Tup(pats) => {
                PatKind::Tup(pats.into_iter().map(|p| self.pat(p)).collect())
            }
            PatKind::Obj(fields) => PatKind::Obj(
                fields
                    .into_iter()
                    .map(|f| PatField {
                        lab: f.lab,
                        pat: self.pat(f.pat),
                    })
                    .collect(),
            ),
            PatKind::Opt(p) => PatKind::Opt(Box::new(self.pat(*p))),
            PatKind::Tag(lab, p) => PatKind::Tag(lab, Box::new(self.pat(*p))),
            PatKind::Alt(p1, p2) => {
                PatKind::Alt(Box::new(self.pat(*p1)), Box::new(self.pat(*p2)))
            }
        };
        Pat { kind, span, typ }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::construct::*;
    use crate::types::Type;

    #[test]
    fn renames_block_bindings_and_uses() {
        let body = block_exp(
            vec![let_dec(var_pat("x", Type::nat()), nat_exp(1))],
            var_exp("x", Type::nat()),
        );
        let renamed = rename_exp(body);
        match renamed.kind {
            ExpKind::Block(decs, result) => {
                let bound = match &decs[0].kind {
                    DecKind::Let(pat, _) => match &pat.kind {
                        PatKind::Var(id) => id.clone(),
                        _ => panic!("expected a variable pattern"),
                    },
                    _ => panic!("expected a let declaration"),
                };
                assert_ne!(bound, "x");
                assert_eq!(result.kind, ExpKind::Var(bound));
            }
            _ => panic!("expected a block"),
        }
    }

    #[test]
    fn leaves_free_variables_alone() {
        let e = var_exp("free", Type::nat());
        assert_eq!(rename_exp(e.clone()), e);
    }

    #[test]
    fn renames_labels() {
        let e = label_exp("l", Type::nat(), break_exp("l", nat_exp(1)));
        match rename_exp(e).kind {
            ExpKind::Label(id, _, body) => {
                assert_ne!(id, "l");
                match body.kind {
                    ExpKind::Break(target, _) => assert_eq!(target, id),
                    _ => panic!("expected a break"),
                }
            }
            _ => panic!("expected a label"),
        }
    }
}
