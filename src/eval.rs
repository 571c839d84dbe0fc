//! A reference interpreter for the direct-style fragment of the IR.
//!
//! Used by the test suite to witness that transforms preserve observable
//! behaviour (and, for the tail-call pass, that stack depth stays
//! bounded). Actors, `async`/`await`, `show`, and primitive references
//! are outside the fragment and trap.
//!
//! Every binding is a shared slot: blocks pre-allocate slots for all of
//! their bindings so mutually recursive definitions can close over each
//! other, and `declare`/`define` fill a slot after the fact. Reading an
//! unfilled slot traps.

use std::cell::RefCell;
use std::rc::Rc;

use im::HashMap;
use num_bigint::{BigInt, BigUint};
use num_traits::ToPrimitive;

use crate::ir::{
    Arg, BinOp, Case, Dec, DecKind, Exp, ExpKind, Id, Lit, Pat, PatKind, RelOp, UnOp,
};

type Slot = Rc<RefCell<Option<Value>>>;
type Env = HashMap<Id, Slot>;

/// Runtime values.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Nat(BigUint),
    Int(BigInt),
    Float(f64),
    Char(char),
    Text(String),
    Tup(Vec<Value>),
    Opt(Box<Value>),
    Tag(String, Box<Value>),
    Array(Rc<RefCell<Vec<Value>>>),
    Obj(HashMap<String, Slot>),
    Func(Rc<Closure>),
}

impl Value {
    pub fn unit() -> Value {
        Value::Tup(Vec::new())
    }

    pub fn nat(n: u64) -> Value {
        Value::Nat(BigUint::from(n))
    }
}

#[derive(Debug)]
pub struct Closure {
    params: Vec<Arg>,
    body: Exp,
    env: Env,
}

/// Non-local outcomes of evaluation.
#[derive(Debug)]
enum Control {
    Break(Id, Value),
    Ret(Value),
    Trap(String),
}

type Eval<T> = Result<T, Control>;

fn trap<T>(message: impl Into<String>) -> Eval<T> {
    Err(Control::Trap(message.into()))
}

/// Evaluate a closed expression. A `break` or `return` escaping the
/// expression is reported as a trap.
pub fn eval_exp(exp: &Exp) -> Result<Value, String> {
    match eval(&Env::new(), exp) {
        Ok(value) => Ok(value),
        Err(Control::Trap(message)) => Err(message),
        Err(Control::Break(id, _)) => Err(format!("break {} escaped", id)),
        Err(Control::Ret(_)) => Err("return escaped".to_owned()),
    }
}

fn lookup(env: &Env, id: &Id) -> Eval<Value> {
    match env.get(id) {
        Some(slot) => match &*slot.borrow() {
            Some(value) => Ok(value.clone()),
            None => trap(format!("use of {} before definition", id)),
        },
        None => trap(format!("unbound variable {}", id)),
    }
}

fn filled(value: Value) -> Slot {
    Rc::new(RefCell::new(Some(value)))
}

fn eval(env: &Env, exp: &Exp) -> Eval<Value> {
    match &exp.kind {
        ExpKind::Lit(lit) => Ok(lit_value(lit)),
        ExpKind::Var(id) => lookup(env, id),
        ExpKind::Prim(name) => trap(format!("primitive {} not supported", name)),

        ExpKind::Un(_, op, e1) => un_op(*op, eval(env, e1)?),
        ExpKind::Bin(_, op, e1, e2) => {
            let v1 = eval(env, e1)?;
            let v2 = eval(env, e2)?;
            bin_op(*op, v1, v2)
        }
        ExpKind::Rel(_, op, e1, e2) => {
            let v1 = eval(env, e1)?;
            let v2 = eval(env, e2)?;
            rel_op(*op, v1, v2)
        }
        ExpKind::Show(..) => trap("show not supported"),

        ExpKind::Tup(es) => {
            let mut vs = Vec::with_capacity(es.len());
            for e in es {
                vs.push(eval(env, e)?);
            }
            Ok(Value::Tup(vs))
        }
        ExpKind::Proj(e1, n) => match eval(env, e1)? {
            Value::Tup(mut vs) if *n < vs.len() => Ok(vs.swap_remove(*n)),
            _ => trap("projection from a non-tuple"),
        },
        ExpKind::Opt(e1) => Ok(Value::Opt(Box::new(eval(env, e1)?))),
        ExpKind::Tag(lab, e1) => Ok(Value::Tag(lab.clone(), Box::new(eval(env, e1)?))),

        ExpKind::Dot(e1, lab) => match eval(env, e1)? {
            Value::Obj(fields) => match fields.get(lab) {
                Some(slot) => match &*slot.borrow() {
                    Some(value) => Ok(value.clone()),
                    None => trap(format!("field {} read before definition", lab)),
                },
                None => trap(format!("no field {}", lab)),
            },
            _ => trap("field access on a non-object"),
        },
        ExpKind::ActorDot(..) | ExpKind::Actor(..) => trap("actors not supported"),
        ExpKind::Async(_) | ExpKind::Await(_) => trap("async not supported"),

        ExpKind::Array(_, _, es) => {
            let mut vs = Vec::with_capacity(es.len());
            for e in es {
                vs.push(eval(env, e)?);
            }
            Ok(Value::Array(Rc::new(RefCell::new(vs))))
        }
        ExpKind::Idx(e1, e2) => {
            let array = eval(env, e1)?;
            let index = index_of(eval(env, e2)?)?;
            match array {
                Value::Array(elems) => match elems.borrow().get(index) {
                    Some(value) => Ok(value.clone()),
                    None => trap("array index out of bounds"),
                },
                _ => trap("indexing into a non-array"),
            }
        }

        ExpKind::Assign(target, source) => {
            let value = eval(env, source)?;
            assign(env, target, value)?;
            Ok(Value::unit())
        }

        ExpKind::Func { params, body, .. } => Ok(Value::Func(Rc::new(Closure {
            params: params.clone(),
            body: (**body).clone(),
            env: env.clone(),
        }))),

        ExpKind::Call(_, func, _, arg) => {
            let func = eval(env, func)?;
            let arg = eval(env, arg)?;
            call(func, arg)
        }

        ExpKind::Block(decs, e1) => {
            let env = eval_decs(env, decs)?;
            eval(&env, e1)
        }

        ExpKind::If(c, e2, e3) => match eval(env, c)? {
            Value::Bool(true) => eval(env, e2),
            Value::Bool(false) => eval(env, e3),
            _ => trap("condition is not a boolean"),
        },

        ExpKind::Switch(scrut, cases) => {
            let value = eval(env, scrut)?;
            eval_cases(env, &value, cases)
        }

        ExpKind::Loop(body) => loop {
            eval(env, body)?;
        },

        ExpKind::Label(id, _, body) => match eval(env, body) {
            Err(Control::Break(target, value)) if target == *id => Ok(value),
            outcome => outcome,
        },
        ExpKind::Break(id, e1) => {
            let value = eval(env, e1)?;
            Err(Control::Break(id.clone(), value))
        }
        ExpKind::Ret(e1) => {
            let value = eval(env, e1)?;
            Err(Control::Ret(value))
        }

        ExpKind::Assert(e1) => match eval(env, e1)? {
            Value::Bool(true) => Ok(Value::unit()),
            Value::Bool(false) => trap("assertion failed"),
            _ => trap("assertion on a non-boolean"),
        },

        ExpKind::Declare(id, _, body) => {
            let env = env.update(id.clone(), Rc::new(RefCell::new(None)));
            eval(&env, body)
        }
        ExpKind::Define(id, _, e1) => {
            let value = eval(env, e1)?;
            match env.get(id) {
                Some(slot) => {
                    *slot.borrow_mut() = Some(value);
                    Ok(Value::unit())
                }
                None => trap(format!("define of unbound {}", id)),
            }
        }

        ExpKind::NewObj(_, fields) => {
            let mut object = HashMap::new();
            for field in fields {
                match env.get(&field.var) {
                    Some(slot) => {
                        object.insert(field.lab.clone(), slot.clone());
                    }
                    None => return trap(format!("unbound variable {}", field.var)),
                }
            }
            Ok(Value::Obj(object))
        }
    }
}

fn assign(env: &Env, target: &Exp, value: Value) -> Eval<()> {
    match &target.kind {
        ExpKind::Var(id) => match env.get(id) {
            Some(slot) => {
                *slot.borrow_mut() = Some(value);
                Ok(())
            }
            None => trap(format!("unbound variable {}", id)),
        },
        ExpKind::Dot(e1, lab) => match eval(env, e1)? {
            Value::Obj(fields) => match fields.get(lab) {
                Some(slot) => {
                    *slot.borrow_mut() = Some(value);
                    Ok(())
                }
                None => trap(format!("no field {}", lab)),
            },
            _ => trap("field access on a non-object"),
        },
        ExpKind::Idx(e1, e2) => {
            let array = eval(env, e1)?;
            let index = index_of(eval(env, e2)?)?;
            match array {
                Value::Array(elems) => {
                    let mut elems = elems.borrow_mut();
                    if index < elems.len() {
                        elems[index] = value;
                        Ok(())
                    } else {
                        trap("array index out of bounds")
                    }
                }
                _ => trap("indexing into a non-array"),
            }
        }
        _ => trap("assignment to a non-lvalue"),
    }
}

fn call(func: Value, arg: Value) -> Eval<Value> {
    let closure = match func {
        Value::Func(closure) => closure,
        _ => return trap("call of a non-function"),
    };
    let args = match closure.params.len() {
        1 => vec![arg],
        n => match arg {
            Value::Tup(vs) if vs.len() == n => vs,
            _ => return trap("argument arity mismatch"),
        },
    };
    let mut env = closure.env.clone();
    for (param, value) in closure.params.iter().zip(args) {
        env.insert(param.id.clone(), filled(value));
    }
    match eval(&env, &closure.body) {
        Ok(value) => Ok(value),
        Err(Control::Ret(value)) => Ok(value),
        Err(outcome) => Err(outcome),
    }
}

/// Evaluate a block's declarations. Slots for every binding are
/// allocated up front so that right-hand sides can close over later
/// siblings.
fn eval_decs(env: &Env, decs: &[Dec]) -> Eval<Env> {
    let mut env = env.clone();
    for dec in decs {
        match &dec.kind {
            DecKind::Let(pat, _) => {
                for id in pat_binders(pat) {
                    env.insert(id, Rc::new(RefCell::new(None)));
                }
            }
            DecKind::Var(id, _) => {
                env.insert(id.clone(), Rc::new(RefCell::new(None)));
            }
            DecKind::Typ(_) => {}
        }
    }
    for dec in decs {
        match &dec.kind {
            DecKind::Let(pat, init) => {
                let value = eval(&env, init)?;
                match match_pat(pat, &value) {
                    Some(bindings) => {
                        for (id, value) in bindings {
                            match env.get(&id) {
                                Some(slot) => *slot.borrow_mut() = Some(value),
                                None => return trap(format!("unbound binder {}", id)),
                            }
                        }
                    }
                    None => return trap("let pattern match failed"),
                }
            }
            DecKind::Var(id, init) => {
                let value = eval(&env, init)?;
                match env.get(id) {
                    Some(slot) => *slot.borrow_mut() = Some(value),
                    None => return trap(format!("unbound binder {}", id)),
                }
            }
            DecKind::Typ(_) => {}
        }
    }
    Ok(env)
}

fn eval_cases(env: &Env, value: &Value, cases: &[Case]) -> Eval<Value> {
    for case in cases {
        if let Some(bindings) = match_pat(&case.pat, value) {
            let mut env = env.clone();
            for (id, value) in bindings {
                env.insert(id, filled(value));
            }
            return eval(&env, &case.exp);
        }
    }
    trap("no case matched")
}

fn pat_binders(pat: &Pat) -> Vec<Id> {
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

fn match_pat(pat: &Pat, value: &Value) -> Option<Vec<(Id, Value)>> {
    let mut bindings = Vec::new();
    match_into(pat, value, &mut bindings).then_some(bindings)
}

fn match_into(pat: &Pat, value: &Value, bindings: &mut Vec<(Id, Value)>) -> bool {
    match (&pat.kind, value) {
        (PatKind::Wild, _) => true,
        (PatKind::Var(id), _) => {
            bindings.push((id.clone(), value.clone()));
            true
        }
        (PatKind::Lit(lit), _) => lit_matches(lit, value),
        (PatKind::Tup(pats), Value::Tup(vs)) => {
            pats.len() == vs.len()
                && pats
                    .iter()
                    .zip(vs)
                    .all(|(p, v)| match_into(p, v, bindings))
        }
        (PatKind::Obj(fields), Value::Obj(slots)) => fields.iter().all(|f| {
            match slots.get(&f.lab) {
                Some(slot) => match &*slot.borrow() {
                    Some(v) => match_into(&f.pat, v, bindings),
                    None => false,
                },
                None => false,
            }
        }),
        (PatKind::Opt(p), Value::Opt(v)) => match_into(p, v, bindings),
        (PatKind::Opt(_), Value::Null) => false,
        (PatKind::Tag(lab, p), Value::Tag(tag, v)) => {
            lab == tag && match_into(p, v, bindings)
        }
        (PatKind::Alt(p1, p2), _) => {
            match_into(p1, value, bindings) || match_into(p2, value, bindings)
        }
        _ => false,
    }
}

fn lit_matches(lit: &Lit, value: &Value) -> bool {
    match (lit, value) {
        (Lit::Null, Value::Null) => true,
        (Lit::Bool(a), Value::Bool(b)) => a == b,
        (Lit::Nat(a), Value::Nat(b)) => a == b,
        (Lit::Int(a), Value::Int(b)) => a == b,
        (Lit::Char(a), Value::Char(b)) => a == b,
        (Lit::Text(a), Value::Text(b)) => a == b,
        _ => false,
    }
}

fn lit_value(lit: &Lit) -> Value {
    match lit {
        Lit::Null => Value::Null,
        Lit::Bool(b) => Value::Bool(*b),
        Lit::Nat(n) => Value::Nat(n.clone()),
        Lit::Nat8(n) => Value::Nat(BigUint::from(*n)),
        Lit::Nat16(n) => Value::Nat(BigUint::from(*n)),
        Lit::Nat32(n) => Value::Nat(BigUint::from(*n)),
        Lit::Nat64(n) => Value::Nat(BigUint::from(*n)),
        Lit::Int(i) => Value::Int(i.clone()),
        Lit::Float(f) => Value::Float(*f),
        Lit::Char(c) => Value::Char(*c),
        Lit::Text(t) => Value::Text(t.clone()),
    }
}

fn index_of(value: Value) -> Eval<usize> {
    match value {
        Value::Nat(n) => match n.to_usize() {
            Some(index) => Ok(index),
            None => trap("array index too large"),
        },
        _ => trap("array index is not a Nat"),
    }
}

fn un_op(op: UnOp, value: Value) -> Eval<Value> {
    match (op, value) {
        (UnOp::Pos, value) => Ok(value),
        (UnOp::Neg, Value::Int(i)) => Ok(Value::Int(-i)),
        (UnOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        _ => trap("unary operator unsupported at this value"),
    }
}

fn bin_op(op: BinOp, v1: Value, v2: Value) -> Eval<Value> {
    match (op, v1, v2) {
        (BinOp::Add, Value::Nat(a), Value::Nat(b)) => Ok(Value::Nat(a + b)),
        (BinOp::Sub, Value::Nat(a), Value::Nat(b)) => {
            if a >= b {
                Ok(Value::Nat(a - b))
            } else {
                trap("natural subtraction underflow")
            }
        }
        (BinOp::Mul, Value::Nat(a), Value::Nat(b)) => Ok(Value::Nat(a * b)),
        (BinOp::Div, Value::Nat(a), Value::Nat(b)) => {
            if b == BigUint::from(0u8) {
                trap("division by zero")
            } else {
                Ok(Value::Nat(a / b))
            }
        }
        (BinOp::Mod, Value::Nat(a), Value::Nat(b)) => {
            if b == BigUint::from(0u8) {
                trap("division by zero")
            } else {
                Ok(Value::Nat(a % b))
            }
        }
        (BinOp::Pow, Value::Nat(a), Value::Nat(b)) => match b.to_u32() {
            Some(exp) => Ok(Value::Nat(a.pow(exp))),
            None => trap("exponent too large"),
        },
        (BinOp::Add, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
        (BinOp::Sub, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a - b)),
        (BinOp::Mul, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a * b)),
        (BinOp::Div, Value::Int(a), Value::Int(b)) => {
            if b == BigInt::from(0) {
                trap("division by zero")
            } else {
                Ok(Value::Int(a / b))
            }
        }
        (BinOp::Add, Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
        (BinOp::Sub, Value::Float(a), Value::Float(b)) => Ok(Value::Float(a - b)),
        (BinOp::Mul, Value::Float(a), Value::Float(b)) => Ok(Value::Float(a * b)),
        (BinOp::Div, Value::Float(a), Value::Float(b)) => Ok(Value::Float(a / b)),
        (BinOp::Cat, Value::Text(a), Value::Text(b)) => Ok(Value::Text(a + &b)),
        _ => trap("binary operator unsupported at these values"),
    }
}

fn rel_op(op: RelOp, v1: Value, v2: Value) -> Eval<Value> {
    use std::cmp::Ordering;
    let ordering = match (&v1, &v2) {
        (Value::Nat(a), Value::Nat(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Char(a), Value::Char(b)) => a.partial_cmp(b),
        (Value::Text(a), Value::Text(b)) => a.partial_cmp(b),
        (Value::Bool(a), Value::Bool(b)) => match op {
            RelOp::Eq | RelOp::Ne => Some(if a == b {
                Ordering::Equal
            } else {
                Ordering::Less
            }),
            _ => None,
        },
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    };
    let ordering = match ordering {
        Some(ordering) => ordering,
        None => return trap("relational operator unsupported at these values"),
    };
    Ok(Value::Bool(match op {
        RelOp::Eq => ordering == Ordering::Equal,
        RelOp::Ne => ordering != Ordering::Equal,
        RelOp::Lt => ordering == Ordering::Less,
        RelOp::Le => ordering != Ordering::Greater,
        RelOp::Gt => ordering == Ordering::Greater,
        RelOp::Ge => ordering != Ordering::Less,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::construct::*;
    use crate::ir::BinOp;
    use crate::types::Type;

    #[test]
    fn evaluates_arithmetic() {
        let e = bin_exp(Type::nat(), BinOp::Add, nat_exp(2), nat_exp(3));
        assert!(matches!(eval_exp(&e), Ok(Value::Nat(n)) if n == 5u8.into()));
    }

    #[test]
    fn natural_subtraction_traps_below_zero() {
        let e = bin_exp(Type::nat(), BinOp::Sub, nat_exp(2), nat_exp(3));
        assert!(eval_exp(&e).is_err());
    }

    #[test]
    fn labels_catch_breaks() {
        let e = label_exp("l", Type::nat(), break_exp("l", nat_exp(7)));
        assert!(matches!(eval_exp(&e), Ok(Value::Nat(n)) if n == 7u8.into()));
    }

    #[test]
    fn calls_bind_parameters_and_catch_returns() {
        let f = local_func_exp(
            "f",
            vec![crate::ir::Arg::new("n", Type::nat())],
            vec![Type::nat()],
            ret_exp(bin_exp(
                Type::nat(),
                BinOp::Add,
                var_exp("n", Type::nat()),
                nat_exp(1),
            )),
        );
        let e = block_exp(
            vec![let_var_dec(&var_exp("f", f.note.typ.clone()), f)],
            call_exp(
                var_exp(
                    "f",
                    crate::types::Type::Func(
                        crate::types::FuncSort::Local,
                        crate::types::Control::Returns,
                        Vec::new(),
                        vec![Type::nat()],
                        vec![Type::nat()],
                    ),
                ),
                Vec::new(),
                nat_exp(41),
            ),
        );
        assert!(matches!(eval_exp(&e), Ok(Value::Nat(n)) if n == 42u8.into()));
    }

    #[test]
    fn mutable_cells_share_state() {
        // { var x = 0; x := 5; x }
        let e = block_exp(
            vec![
                var_dec("x", nat_exp(0)),
                exp_dec(assign_exp(
                    var_exp("x", Type::mutable(Type::nat())),
                    nat_exp(5),
                )),
            ],
            var_exp("x", Type::nat()),
        );
        assert!(matches!(eval_exp(&e), Ok(Value::Nat(n)) if n == 5u8.into()));
    }
}
