//! Admissibility of operators at operand types.
//!
//! Operator expressions in the IR are tagged with the type they operate
//! at; the checker consults these tables to confirm the tag is a type the
//! operator is actually defined for.

use crate::ir::{BinOp, RelOp, UnOp};
use crate::types::{promote, Prim, Type};

fn as_prim(typ: &Type) -> Option<Prim> {
    match promote(typ) {
        Type::Prim(p) => Some(p),
        _ => None,
    }
}

fn is_num(p: Prim) -> bool {
    matches!(
        p,
        Prim::Nat
            | Prim::Nat8
            | Prim::Nat16
            | Prim::Nat32
            | Prim::Nat64
            | Prim::Int
            | Prim::Float
    )
}

fn is_fixed_nat(p: Prim) -> bool {
    matches!(p, Prim::Nat8 | Prim::Nat16 | Prim::Nat32 | Prim::Nat64)
}

/// Whether a unary operator is defined at the given operand type.
pub fn has_unop(op: UnOp, typ: &Type) -> bool {
    match as_prim(typ) {
        Some(p) => match op {
            UnOp::Pos => is_num(p),
            UnOp::Neg => matches!(p, Prim::Int | Prim::Float),
            UnOp::Not => p == Prim::Bool || is_fixed_nat(p),
        },
        None => false,
    }
}

/// Whether a binary operator is defined at the given operand type.
pub fn has_binop(op: BinOp, typ: &Type) -> bool {
    match as_prim(typ) {
        Some(p) => match op {
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod | BinOp::Pow => {
                is_num(p)
            }
            BinOp::And | BinOp::Or | BinOp::Xor | BinOp::ShL | BinOp::ShR => is_fixed_nat(p),
            BinOp::Cat => p == Prim::Text,
        },
        None => false,
    }
}

/// Whether a relational operator is defined at the given operand type.
pub fn has_relop(op: RelOp, typ: &Type) -> bool {
    match as_prim(typ) {
        Some(p) => match op {
            RelOp::Eq | RelOp::Ne => p != Prim::Float,
            RelOp::Lt | RelOp::Gt | RelOp::Le | RelOp::Ge => {
                is_num(p) || matches!(p, Prim::Char | Prim::Text)
            }
        },
        None => false,
    }
}

/// Whether `show` can render values of the given type.
pub fn can_show(typ: &Type) -> bool {
    match promote(typ) {
        Type::Prim(_) => true,
        Type::Opt(t) | Type::Array(t) => can_show(&t),
        Type::Tup(ts) => ts.iter().all(can_show),
        Type::Variant(fields) => fields.iter().all(|f| can_show(&f.typ)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_binops() {
        assert!(has_binop(BinOp::Add, &Type::nat()));
        assert!(has_binop(BinOp::Sub, &Type::int()));
        assert!(!has_binop(BinOp::Add, &Type::bool()));
    }

    #[test]
    fn bitwise_needs_fixed_width() {
        assert!(has_binop(BinOp::Xor, &Type::Prim(Prim::Nat32)));
        assert!(!has_binop(BinOp::Xor, &Type::nat()));
    }

    #[test]
    fn concatenation_is_textual() {
        assert!(has_binop(BinOp::Cat, &Type::text()));
        assert!(!has_binop(BinOp::Cat, &Type::nat()));
    }

    #[test]
    fn float_equality_is_undefined() {
        assert!(has_relop(RelOp::Lt, &Type::Prim(Prim::Float)));
        assert!(!has_relop(RelOp::Eq, &Type::Prim(Prim::Float)));
    }
}
