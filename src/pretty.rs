//! Pretty printing of types.
//!
//! Checker messages embed rendered types; the renderer deliberately stops
//! at constructor names so recursive types print finitely.

use std::fmt;

use pretty::RcDoc;

use crate::types::{Bind, Field, FuncSort, ObjSort, Type};

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Prec {
    Typ,
    Atom,
}

pub fn typ_doc(typ: &Type) -> RcDoc<'_, ()> {
    typ_prec(typ, Prec::Typ)
}

fn typ_prec(typ: &Type, prec: Prec) -> RcDoc<'_, ()> {
    match typ {
        Type::Prim(p) => RcDoc::text(p.name()),
        Type::Var(i) => RcDoc::text(format!("#{}", i)),
        Type::Any => RcDoc::text("Any"),
        Type::Non => RcDoc::text("None"),
        Type::Shared => RcDoc::text("Shared"),
        Type::Pre => RcDoc::text("???"),
        Type::Con(con, args) => {
            let head = RcDoc::text(con.name().to_owned());
            if args.is_empty() {
                head
            } else {
                head.append(angles(args.iter().map(|t| typ_prec(t, Prec::Typ))))
            }
        }
        Type::Tup(ts) => parens(ts.iter().map(|t| typ_prec(t, Prec::Typ))),
        Type::Opt(t) => RcDoc::text("?").append(typ_prec(t, Prec::Atom)),
        Type::Array(t) => RcDoc::text("[")
            .append(typ_prec(t, Prec::Typ))
            .append(RcDoc::text("]")),
        Type::Mut(t) => RcDoc::text("var ").append(typ_prec(t, Prec::Atom)),
        Type::Async(t) => paren_if(
            prec == Prec::Atom,
            RcDoc::text("async ").append(typ_prec(t, Prec::Atom)),
        ),
        Type::Obj(sort, fields) => {
            let prefix = match sort {
                ObjSort::Object => RcDoc::nil(),
                ObjSort::Module => RcDoc::text("module "),
                ObjSort::Actor => RcDoc::text("actor "),
            };
            prefix.append(braces(fields.iter().map(field_doc)))
        }
        Type::Variant(fields) => braces(fields.iter().map(|f| {
            RcDoc::text("#")
                .append(RcDoc::text(f.lab.as_str()))
                .append(RcDoc::text(" : "))
                .append(typ_prec(&f.typ, Prec::Typ))
        })),
        Type::Func(sort, _, binds, doms, cods) => {
            let sort_doc = match sort {
                FuncSort::Local => RcDoc::nil(),
                FuncSort::Shared => RcDoc::text("shared "),
            };
            let binds_doc = if binds.is_empty() {
                RcDoc::nil()
            } else {
                angles(binds.iter().map(bind_doc))
            };
            let cod_doc = match cods.as_slice() {
                [cod] => typ_prec(cod, Prec::Typ),
                _ => parens(cods.iter().map(|t| typ_prec(t, Prec::Typ))),
            };
            paren_if(
                prec == Prec::Atom,
                sort_doc
                    .append(binds_doc)
                    .append(parens(doms.iter().map(|t| typ_prec(t, Prec::Typ))))
                    .append(RcDoc::text(" -> "))
                    .append(cod_doc),
            )
        }
        Type::Serialized(t) => RcDoc::text("serialized ").append(typ_prec(t, Prec::Atom)),
    }
}

fn field_doc(field: &Field) -> RcDoc<'_, ()> {
    RcDoc::text(field.lab.as_str())
        .append(RcDoc::text(" : "))
        .append(typ_prec(&field.typ, Prec::Typ))
}

fn bind_doc(bind: &Bind) -> RcDoc<'_, ()> {
    let head = RcDoc::text(bind.var.as_str());
    match &bind.bound {
        Type::Any => head,
        bound => head
            .append(RcDoc::text(" <: "))
            .append(typ_prec(bound, Prec::Typ)),
    }
}

fn parens<'a>(docs: impl Iterator<Item = RcDoc<'a, ()>>) -> RcDoc<'a, ()> {
    RcDoc::text("(")
        .append(RcDoc::intersperse(docs, RcDoc::text(", ")))
        .append(RcDoc::text(")"))
}

fn angles<'a>(docs: impl Iterator<Item = RcDoc<'a, ()>>) -> RcDoc<'a, ()> {
    RcDoc::text("<")
        .append(RcDoc::intersperse(docs, RcDoc::text(", ")))
        .append(RcDoc::text(">"))
}

fn braces<'a>(docs: impl Iterator<Item = RcDoc<'a, ()>>) -> RcDoc<'a, ()> {
    RcDoc::text("{")
        .append(RcDoc::intersperse(docs, RcDoc::text("; ")))
        .append(RcDoc::text("}"))
}

fn paren_if(cond: bool, doc: RcDoc<'_, ()>) -> RcDoc<'_, ()> {
    if cond {
        RcDoc::text("(").append(doc).append(RcDoc::text(")"))
    } else {
        doc
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", typ_doc(self).pretty(80))
    }
}
