//! The Scrip type model.
//!
//! Types are owned structural trees. Type constructors are the one point of
//! indirection: a [`Con`] is a reference-counted token whose identity is a
//! globally unique stamp, carrying a [`Kind`] that gives its parameters and
//! body. Recursive types are cycles through constructors; everywhere else
//! the tree is acyclic. Bound type variables inside constructor bodies and
//! function types are de Bruijn indices over individual binders, translated
//! to and from constructor references with [`open`] and [`close`].

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Field and variant labels.
pub type Lab = String;

/// Primitive types.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Prim {
    Null,
    Bool,
    Nat,
    Nat8,
    Nat16,
    Nat32,
    Nat64,
    Int,
    Float,
    Char,
    Text,
}

impl Prim {
    pub const fn name(&self) -> &'static str {
        match self {
            Prim::Null => "Null",
            Prim::Bool => "Bool",
            Prim::Nat => "Nat",
            Prim::Nat8 => "Nat8",
            Prim::Nat16 => "Nat16",
            Prim::Nat32 => "Nat32",
            Prim::Nat64 => "Nat64",
            Prim::Int => "Int",
            Prim::Float => "Float",
            Prim::Char => "Char",
            Prim::Text => "Text",
        }
    }
}

/// The sort of an object type.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ObjSort {
    Object,
    Module,
    Actor,
}

impl fmt::Display for ObjSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjSort::Object => write!(f, "object"),
            ObjSort::Module => write!(f, "module"),
            ObjSort::Actor => write!(f, "actor"),
        }
    }
}

/// The sort of a function: local, or shared across actor boundaries.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FuncSort {
    Local,
    Shared,
}

/// The caller contract of a function.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Control {
    /// Returns its results directly.
    Returns,
    /// Returns a promise (the codomain is an async type).
    Promises,
}

/// A labelled object field or variant arm.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub lab: Lab,
    pub typ: Type,
}

impl Field {
    pub fn new(lab: impl Into<Lab>, typ: Type) -> Field {
        Field {
            lab: lab.into(),
            typ,
        }
    }
}

/// A type parameter binder. The bound may mention sibling binders through
/// de Bruijn indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bind {
    pub var: String,
    pub bound: Type,
}

/// The kind of a type constructor: its parameters together with either a
/// definition body (`Def`) or an upper bound (`Abs`).
#[derive(Debug, Clone)]
pub enum Kind {
    Def(Vec<Bind>, Type),
    Abs(Vec<Bind>, Type),
}

impl Kind {
    pub fn binds(&self) -> &[Bind] {
        match self {
            Kind::Def(binds, _) | Kind::Abs(binds, _) => binds,
        }
    }
}

static CON_STAMPS: AtomicU32 = AtomicU32::new(0);

/// The payload of a type constructor token. Identity, equality, and
/// hashing are all by stamp; the kind cell is only written while the
/// constructor's definition is being tied and is immutable afterwards.
pub struct ConData {
    name: String,
    stamp: u32,
    kind: RefCell<Kind>,
}

/// A type constructor token.
pub type Con = Rc<ConData>;

impl ConData {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stamp(&self) -> u32 {
        self.stamp
    }

    pub fn kind(&self) -> Kind {
        self.kind.borrow().clone()
    }
}

impl PartialEq for ConData {
    fn eq(&self, other: &ConData) -> bool {
        self.stamp == other.stamp
    }
}

impl Eq for ConData {}

impl std::hash::Hash for ConData {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.stamp.hash(state);
    }
}

impl fmt::Debug for ConData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Con({}/{})", self.name, self.stamp)
    }
}

impl fmt::Display for ConData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Mint a fresh constructor with a globally unique stamp.
pub fn fresh_con(name: impl Into<String>, kind: Kind) -> Con {
    Rc::new(ConData {
        name: name.into(),
        stamp: CON_STAMPS.fetch_add(1, Ordering::Relaxed),
        kind: RefCell::new(kind),
    })
}

/// Replace a provisional kind. Used to tie the knot of recursive
/// definitions; the constructor must not have been handed to a pass yet.
pub fn set_kind(con: &Con, kind: Kind) {
    *con.kind.borrow_mut() = kind;
}

/// The set of type constructors in scope.
pub type ConSet = im::HashSet<Con>;

/// Add a constructor to a scope, failing if it is already present. The
/// failure is how duplicate type definitions are detected.
pub fn disjoint_add(set: &ConSet, con: Con) -> Result<ConSet, Con> {
    if set.contains(&con) {
        Err(con)
    } else {
        Ok(set.update(con))
    }
}

/// Types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// Primitive types.
    Prim(Prim),
    /// Bound type variable (de Bruijn index). Only valid under a binder;
    /// never appears in a fully resolved type.
    Var(u32),
    /// A constructor applied to arguments.
    Con(Con, Vec<Type>),
    /// Top.
    Any,
    /// Bottom.
    Non,
    /// Supertype of every type whose values can cross actor boundaries.
    Shared,
    /// Tuples. The empty tuple is the unit type.
    Tup(Vec<Type>),
    /// Options.
    Opt(Rc<Type>),
    /// Arrays. A mutable array has a `Mut` element type.
    Array(Rc<Type>),
    /// Mutable cells. Second class: legal only as the type of a mutable
    /// binding, a mutable array element, or a mutable object field.
    Mut(Rc<Type>),
    /// Suspended computations.
    Async(Rc<Type>),
    /// Objects, modules, and actors. Fields strictly sorted by label.
    Obj(ObjSort, Vec<Field>),
    /// Variants. Arms strictly sorted by label.
    Variant(Vec<Field>),
    /// Functions: sort, control, type parameters, domain, codomain.
    /// Domain and codomain are de Bruijn-closed over the parameters.
    Func(FuncSort, Control, Vec<Bind>, Vec<Type>, Vec<Type>),
    /// Serialized message payloads (serialized compilation flavor only).
    Serialized(Rc<Type>),
    /// Unresolved sentinel; illegal in checked IR.
    Pre,
}

impl Type {
    pub fn unit() -> Type {
        Type::Tup(Vec::new())
    }

    pub fn nat() -> Type {
        Type::Prim(Prim::Nat)
    }

    pub fn int() -> Type {
        Type::Prim(Prim::Int)
    }

    pub fn bool() -> Type {
        Type::Prim(Prim::Bool)
    }

    pub fn text() -> Type {
        Type::Prim(Prim::Text)
    }

    pub fn opt(t: Type) -> Type {
        Type::Opt(Rc::new(t))
    }

    pub fn array(t: Type) -> Type {
        Type::Array(Rc::new(t))
    }

    pub fn mutable(t: Type) -> Type {
        Type::Mut(Rc::new(t))
    }

    pub fn promise(t: Type) -> Type {
        Type::Async(Rc::new(t))
    }

    pub fn con(con: Con) -> Type {
        Type::Con(con, Vec::new())
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, Type::Tup(ts) if ts.is_empty())
    }

    pub fn is_mut(&self) -> bool {
        matches!(self, Type::Mut(_))
    }

    /// The immutable view of a type: strips a top-level `Mut`.
    pub fn as_immut(&self) -> Type {
        match self {
            Type::Mut(t) => (**t).clone(),
            t => t.clone(),
        }
    }

    pub fn as_mut(&self) -> Option<&Type> {
        match self {
            Type::Mut(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_tup(&self) -> Option<&[Type]> {
        match self {
            Type::Tup(ts) => Some(ts),
            _ => None,
        }
    }

    pub fn as_opt(&self) -> Option<&Type> {
        match self {
            Type::Opt(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Type> {
        match self {
            Type::Array(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_async(&self) -> Option<&Type> {
        match self {
            Type::Async(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_obj(&self) -> Option<(ObjSort, &[Field])> {
        match self {
            Type::Obj(sort, fields) => Some((*sort, fields)),
            _ => None,
        }
    }

    pub fn as_variant(&self) -> Option<&[Field]> {
        match self {
            Type::Variant(fields) => Some(fields),
            _ => None,
        }
    }

    #[allow(clippy::type_complexity)]
    pub fn as_func(&self) -> Option<(FuncSort, Control, &[Bind], &[Type], &[Type])> {
        match self {
            Type::Func(sort, control, binds, doms, cods) => {
                Some((*sort, *control, binds, doms, cods))
            }
            _ => None,
        }
    }
}

/// The type of a sequence of values: unit for none, the type itself for
/// one, a tuple otherwise.
pub fn seq(ts: &[Type]) -> Type {
    match ts {
        [] => Type::unit(),
        [t] => t.clone(),
        _ => Type::Tup(ts.to_vec()),
    }
}

/// Look a label up in a sorted field list.
pub fn lookup_field<'a>(lab: &str, fields: &'a [Field]) -> Option<&'a Type> {
    fields
        .binary_search_by(|field| field.lab.as_str().cmp(lab))
        .ok()
        .map(|index| &fields[index].typ)
}

/// Whether a field list is strictly sorted with distinct labels.
pub fn fields_sorted(fields: &[Field]) -> bool {
    fields.windows(2).all(|pair| pair[0].lab < pair[1].lab)
}

/// Sort a field list into the strict order the model requires. Callers
/// must not pass duplicate labels.
pub fn sort_fields(mut fields: Vec<Field>) -> Vec<Field> {
    fields.sort_by(|a, b| a.lab.cmp(&b.lab));
    fields
}

// ---------------------------------------------------------------------------
// Substitution

/// Substitute de Bruijn indices `0..ts.len()` in `t` with `ts`, shifting
/// the remaining indices down. The substituted types must be closed.
pub fn open(ts: &[Type], t: &Type) -> Type {
    if ts.is_empty() {
        return t.clone();
    }
    open_at(0, ts, t)
}

fn open_at(depth: u32, ts: &[Type], t: &Type) -> Type {
    match t {
        Type::Var(i) => {
            if *i < depth {
                Type::Var(*i)
            } else if (*i - depth) < ts.len() as u32 {
                ts[(*i - depth) as usize].clone()
            } else {
                Type::Var(*i - ts.len() as u32)
            }
        }
        Type::Prim(_) | Type::Any | Type::Non | Type::Shared | Type::Pre => t.clone(),
        Type::Con(con, args) => Type::Con(
            con.clone(),
            args.iter().map(|arg| open_at(depth, ts, arg)).collect(),
        ),
        Type::Tup(elts) => Type::Tup(elts.iter().map(|t| open_at(depth, ts, t)).collect()),
        Type::Opt(t1) => Type::Opt(Rc::new(open_at(depth, ts, t1))),
        Type::Array(t1) => Type::Array(Rc::new(open_at(depth, ts, t1))),
        Type::Mut(t1) => Type::Mut(Rc::new(open_at(depth, ts, t1))),
        Type::Async(t1) => Type::Async(Rc::new(open_at(depth, ts, t1))),
        Type::Serialized(t1) => Type::Serialized(Rc::new(open_at(depth, ts, t1))),
        Type::Obj(sort, fields) => Type::Obj(
            *sort,
            fields
                .iter()
                .map(|f| Field::new(f.lab.clone(), open_at(depth, ts, &f.typ)))
                .collect(),
        ),
        Type::Variant(fields) => Type::Variant(
            fields
                .iter()
                .map(|f| Field::new(f.lab.clone(), open_at(depth, ts, &f.typ)))
                .collect(),
        ),
        Type::Func(sort, control, binds, doms, cods) => {
            let inner = depth + binds.len() as u32;
            Type::Func(
                *sort,
                *control,
                binds
                    .iter()
                    .map(|b| Bind {
                        var: b.var.clone(),
                        bound: open_at(inner, ts, &b.bound),
                    })
                    .collect(),
                doms.iter().map(|t| open_at(inner, ts, t)).collect(),
                cods.iter().map(|t| open_at(inner, ts, t)).collect(),
            )
        }
    }
}

/// Abstract the nullary constructors `cs` out of `t`, replacing their
/// occurrences with de Bruijn indices `0..cs.len()`. Inverse of [`open`].
pub fn close(cs: &[Con], t: &Type) -> Type {
    if cs.is_empty() {
        return t.clone();
    }
    close_at(0, cs, t)
}

fn close_at(depth: u32, cs: &[Con], t: &Type) -> Type {
    match t {
        Type::Var(i) => {
            if *i < depth {
                Type::Var(*i)
            } else {
                Type::Var(*i + cs.len() as u32)
            }
        }
        Type::Prim(_) | Type::Any | Type::Non | Type::Shared | Type::Pre => t.clone(),
        Type::Con(con, args) => match cs.iter().position(|c| c == con) {
            Some(index) if args.is_empty() => Type::Var(depth + index as u32),
            _ => Type::Con(
                con.clone(),
                args.iter().map(|arg| close_at(depth, cs, arg)).collect(),
            ),
        },
        Type::Tup(elts) => Type::Tup(elts.iter().map(|t| close_at(depth, cs, t)).collect()),
        Type::Opt(t1) => Type::Opt(Rc::new(close_at(depth, cs, t1))),
        Type::Array(t1) => Type::Array(Rc::new(close_at(depth, cs, t1))),
        Type::Mut(t1) => Type::Mut(Rc::new(close_at(depth, cs, t1))),
        Type::Async(t1) => Type::Async(Rc::new(close_at(depth, cs, t1))),
        Type::Serialized(t1) => Type::Serialized(Rc::new(close_at(depth, cs, t1))),
        Type::Obj(sort, fields) => Type::Obj(
            *sort,
            fields
                .iter()
                .map(|f| Field::new(f.lab.clone(), close_at(depth, cs, &f.typ)))
                .collect(),
        ),
        Type::Variant(fields) => Type::Variant(
            fields
                .iter()
                .map(|f| Field::new(f.lab.clone(), close_at(depth, cs, &f.typ)))
                .collect(),
        ),
        Type::Func(sort, control, binds, doms, cods) => {
            let inner = depth + binds.len() as u32;
            Type::Func(
                *sort,
                *control,
                binds
                    .iter()
                    .map(|b| Bind {
                        var: b.var.clone(),
                        bound: close_at(inner, cs, &b.bound),
                    })
                    .collect(),
                doms.iter().map(|t| close_at(inner, cs, t)).collect(),
                cods.iter().map(|t| close_at(inner, cs, t)).collect(),
            )
        }
    }
}

/// Close a binder list over the given constructors.
pub fn close_binds(cs: &[Con], binds: &[Bind]) -> Vec<Bind> {
    binds
        .iter()
        .map(|b| Bind {
            var: b.var.clone(),
            bound: close(cs, &b.bound),
        })
        .collect()
}

/// Mint fresh abstract constructors for a binder list and return them
/// together with their use as type arguments. The bounds are opened with
/// the fresh constructors themselves, so mutually dependent bounds
/// resolve.
pub fn open_binds(binds: &[Bind]) -> (Vec<Con>, Vec<Type>) {
    let cons: Vec<Con> = binds
        .iter()
        .map(|b| fresh_con(b.var.clone(), Kind::Abs(Vec::new(), Type::Pre)))
        .collect();
    let args: Vec<Type> = cons.iter().map(|c| Type::con(c.clone())).collect();
    for (con, bind) in cons.iter().zip(binds) {
        set_kind(con, Kind::Abs(Vec::new(), open(&args, &bind.bound)));
    }
    (cons, args)
}

// ---------------------------------------------------------------------------
// Promotion

/// Unfold constructor applications at the head of a type: definitions to
/// their opened body, abstract constructors to their opened bound. Other
/// types are returned unchanged.
pub fn promote(t: &Type) -> Type {
    let mut t = t.clone();
    let mut seen: HashSet<u32> = HashSet::new();
    loop {
        match &t {
            Type::Con(con, args) => {
                if !seen.insert(con.stamp()) {
                    return t;
                }
                let next = match con.kind() {
                    Kind::Def(_, body) => open(args, &body),
                    Kind::Abs(_, bound) => open(args, &bound),
                };
                t = next;
            }
            _ => return t,
        }
    }
}

// ---------------------------------------------------------------------------
// Subtyping

/// Structural subtyping. Reflexive and transitive; `Non` is bottom, `Any`
/// is top, and every shareable type is below `Shared`.
pub fn subtype(t1: &Type, t2: &Type) -> bool {
    sub(&mut HashSet::new(), t1, t2)
}

/// Type equivalence: mutual subtyping.
pub fn eq(t1: &Type, t2: &Type) -> bool {
    t1 == t2 || eq_rec(&mut HashSet::new(), t1, t2)
}

fn eq_rec(seen: &mut HashSet<(Type, Type)>, t1: &Type, t2: &Type) -> bool {
    sub(seen, t1, t2) && sub(seen, t2, t1)
}

fn sub(seen: &mut HashSet<(Type, Type)>, t1: &Type, t2: &Type) -> bool {
    if t1 == t2 {
        return true;
    }
    let key = (t1.clone(), t2.clone());
    if !seen.insert(key) {
        // Assumed: we are inside the unfolding of a recursive constructor.
        return true;
    }
    match (t1, t2) {
        (Type::Pre, _) | (_, Type::Pre) => false,
        (_, Type::Any) => true,
        (Type::Non, _) => true,

        // Unfold definitions on either side first.
        (Type::Con(con, args), _) if matches!(con.kind(), Kind::Def(..)) => {
            let body = match con.kind() {
                Kind::Def(_, body) => body,
                Kind::Abs(..) => unreachable!(),
            };
            let unfolded = open(args, &body);
            sub(seen, &unfolded, t2)
        }
        (_, Type::Con(con, args)) if matches!(con.kind(), Kind::Def(..)) => {
            let body = match con.kind() {
                Kind::Def(_, body) => body,
                Kind::Abs(..) => unreachable!(),
            };
            let unfolded = open(args, &body);
            sub(seen, t1, &unfolded)
        }

        // Abstract constructors: identical applications only, otherwise
        // promote the left side to its bound.
        (Type::Con(c1, ts1), Type::Con(c2, ts2)) if c1 == c2 && ts1.len() == ts2.len() => {
            ts1.iter().zip(ts2).all(|(a, b)| eq_rec(seen, a, b))
        }
        (Type::Con(con, args), _) => {
            let bound = match con.kind() {
                Kind::Abs(_, bound) => bound,
                Kind::Def(..) => unreachable!(),
            };
            let promoted = open(args, &bound);
            sub(seen, &promoted, t2)
        }
        (_, Type::Con(..)) => false,

        (_, Type::Shared) => is_shared(t1),

        (Type::Prim(Prim::Nat), Type::Prim(Prim::Int)) => true,
        (Type::Prim(_), Type::Prim(_)) => false,
        (Type::Prim(Prim::Null), Type::Opt(_)) => true,

        (Type::Opt(a), Type::Opt(b)) => sub(seen, a, b),
        (Type::Tup(ts1), Type::Tup(ts2)) => {
            ts1.len() == ts2.len() && ts1.iter().zip(ts2).all(|(a, b)| sub(seen, a, b))
        }
        // Mutable arrays are invariant; immutable arrays covariant.
        (Type::Array(a), Type::Array(b)) => {
            if a.is_mut() || b.is_mut() {
                eq_rec(seen, a, b)
            } else {
                sub(seen, a, b)
            }
        }
        (Type::Mut(a), Type::Mut(b)) => eq_rec(seen, a, b),
        (Type::Async(a), Type::Async(b)) => sub(seen, a, b),
        (Type::Serialized(a), Type::Serialized(b)) => sub(seen, a, b),

        // Object subtyping by width and depth; mutable fields invariant.
        (Type::Obj(s1, fs1), Type::Obj(s2, fs2)) => {
            s1 == s2
                && fs2.iter().all(|f2| match lookup_field(&f2.lab, fs1) {
                    Some(t1) => {
                        if f2.typ.is_mut() || t1.is_mut() {
                            eq_rec(seen, t1, &f2.typ)
                        } else {
                            sub(seen, t1, &f2.typ)
                        }
                    }
                    None => false,
                })
        }
        // Variant subtyping by width in the other direction.
        (Type::Variant(fs1), Type::Variant(fs2)) => {
            fs1.iter().all(|f1| match lookup_field(&f1.lab, fs2) {
                Some(t2) => sub(seen, &f1.typ, t2),
                None => false,
            })
        }

        (
            Type::Func(s1, c1, binds1, doms1, cods1),
            Type::Func(s2, c2, binds2, doms2, cods2),
        ) => {
            if s1 != s2
                || c1 != c2
                || binds1.len() != binds2.len()
                || doms1.len() != doms2.len()
                || cods1.len() != cods2.len()
            {
                return false;
            }
            let (_, args) = open_binds(binds1);
            let bounds_eq = binds1
                .iter()
                .zip(binds2)
                .all(|(b1, b2)| eq_rec(seen, &open(&args, &b1.bound), &open(&args, &b2.bound)));
            bounds_eq
                && doms1
                    .iter()
                    .zip(doms2)
                    .all(|(d1, d2)| sub(seen, &open(&args, d2), &open(&args, d1)))
                && cods1
                    .iter()
                    .zip(cods2)
                    .all(|(r1, r2)| sub(seen, &open(&args, r1), &open(&args, r2)))
        }

        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Shareability and concreteness

/// Whether values of this type may cross actor boundaries.
pub fn is_shared(t: &Type) -> bool {
    shared_rec(&mut HashSet::new(), t)
}

fn shared_rec(seen: &mut HashSet<Type>, t: &Type) -> bool {
    if !seen.insert(t.clone()) {
        return true;
    }
    match t {
        Type::Prim(_) | Type::Any | Type::Non | Type::Shared => true,
        Type::Var(_) | Type::Pre | Type::Mut(_) | Type::Async(_) => false,
        Type::Opt(t1) | Type::Array(t1) | Type::Serialized(t1) => shared_rec(seen, t1),
        Type::Tup(ts) => ts.iter().all(|t| shared_rec(seen, t)),
        Type::Obj(ObjSort::Actor, _) => true,
        Type::Obj(ObjSort::Module, _) => false,
        Type::Obj(ObjSort::Object, fields) => fields
            .iter()
            .all(|f| !f.typ.is_mut() && shared_rec(seen, &f.typ)),
        Type::Variant(fields) => fields.iter().all(|f| shared_rec(seen, &f.typ)),
        Type::Func(sort, ..) => *sort == FuncSort::Shared,
        Type::Con(con, args) => {
            let unfolded = match con.kind() {
                Kind::Def(_, body) => open(args, &body),
                Kind::Abs(_, bound) => open(args, &bound),
            };
            shared_rec(seen, &unfolded)
        }
    }
}

/// Whether a type mentions no abstract constructors or free type
/// variables. Shared calls require concrete instantiation.
pub fn is_concrete(t: &Type) -> bool {
    concrete_rec(&mut HashSet::new(), t)
}

fn concrete_rec(seen: &mut HashSet<Type>, t: &Type) -> bool {
    if !seen.insert(t.clone()) {
        return true;
    }
    match t {
        Type::Prim(_) | Type::Any | Type::Non | Type::Shared => true,
        Type::Var(_) | Type::Pre => false,
        Type::Opt(t1)
        | Type::Array(t1)
        | Type::Mut(t1)
        | Type::Async(t1)
        | Type::Serialized(t1) => concrete_rec(seen, t1),
        Type::Tup(ts) => ts.iter().all(|t| concrete_rec(seen, t)),
        Type::Obj(_, fields) | Type::Variant(fields) => {
            fields.iter().all(|f| concrete_rec(seen, &f.typ))
        }
        Type::Func(_, _, binds, doms, cods) => {
            let (_, args) = open_binds(binds);
            doms.iter()
                .chain(cods)
                .all(|t| concrete_rec(seen, &open(&args, t)))
        }
        Type::Con(con, args) => match con.kind() {
            Kind::Def(_, body) => concrete_rec(seen, &open(args, &body)),
            Kind::Abs(..) => false,
        },
    }
}

#[cfg(test)]
mod tests;
