use super::*;

macro_rules! assert_subtype {
    ($sub_ty:expr, $super_ty:expr) => {{
        let sub_ty = $sub_ty;
        let super_ty = $super_ty;
        assert!(
            subtype(&sub_ty, &super_ty),
            "{} <: {}",
            sub_ty,
            super_ty
        );
    }};
}

macro_rules! assert_not_subtype {
    ($sub_ty:expr, $super_ty:expr) => {{
        let sub_ty = $sub_ty;
        let super_ty = $super_ty;
        assert!(
            !subtype(&sub_ty, &super_ty),
            "{} </: {}",
            sub_ty,
            super_ty
        );
    }};
}

fn obj(fields: Vec<(&str, Type)>) -> Type {
    Type::Obj(
        ObjSort::Object,
        sort_fields(
            fields
                .into_iter()
                .map(|(lab, typ)| Field::new(lab, typ))
                .collect(),
        ),
    )
}

fn variant(arms: Vec<(&str, Type)>) -> Type {
    Type::Variant(sort_fields(
        arms.into_iter()
            .map(|(lab, typ)| Field::new(lab, typ))
            .collect(),
    ))
}

fn func(doms: Vec<Type>, cods: Vec<Type>) -> Type {
    Type::Func(FuncSort::Local, Control::Returns, Vec::new(), doms, cods)
}

mod lattice {
    use super::*;

    #[test]
    fn reflexive() {
        for t in [
            Type::nat(),
            Type::unit(),
            Type::opt(Type::text()),
            Type::array(Type::mutable(Type::int())),
            obj(vec![("a", Type::nat())]),
            func(vec![Type::nat()], vec![Type::int()]),
        ] {
            assert_subtype!(t.clone(), t);
        }
    }

    #[test]
    fn bottom_and_top() {
        assert_subtype!(Type::Non, Type::nat());
        assert_subtype!(Type::nat(), Type::Any);
        assert_subtype!(Type::Non, Type::Any);
        assert_not_subtype!(Type::Any, Type::nat());
    }

    #[test]
    fn transitive_spot_checks() {
        // Nat <: Int <: Any
        assert_subtype!(Type::nat(), Type::int());
        assert_subtype!(Type::int(), Type::Any);
        assert_subtype!(Type::nat(), Type::Any);

        let wide = obj(vec![("a", Type::nat()), ("b", Type::text())]);
        let mid = obj(vec![("a", Type::nat())]);
        let narrow = obj(vec![("a", Type::int())]);
        assert_subtype!(wide.clone(), mid.clone());
        assert_subtype!(mid, narrow.clone());
        assert_subtype!(wide, narrow);
    }

    #[test]
    fn pre_relates_to_nothing() {
        assert_not_subtype!(Type::Pre, Type::Any);
        assert_not_subtype!(Type::Non, Type::Pre);
    }
}

mod prims {
    use super::*;

    #[test]
    fn nat_widens_to_int() {
        assert_subtype!(Type::nat(), Type::int());
        assert_not_subtype!(Type::int(), Type::nat());
    }

    #[test]
    fn null_widens_to_options() {
        assert_subtype!(Type::Prim(Prim::Null), Type::opt(Type::nat()));
        assert_not_subtype!(Type::opt(Type::nat()), Type::Prim(Prim::Null));
    }

    #[test]
    fn distinct_prims_unrelated() {
        assert_not_subtype!(Type::bool(), Type::nat());
        assert_not_subtype!(Type::Prim(Prim::Nat8), Type::Prim(Prim::Nat16));
    }
}

mod shared {
    use super::*;

    #[test]
    fn shareable_types_are_below_shared() {
        assert_subtype!(Type::nat(), Type::Shared);
        assert_subtype!(Type::opt(Type::text()), Type::Shared);
        assert_subtype!(variant(vec![("a", Type::unit())]), Type::Shared);
    }

    #[test]
    fn mutable_state_is_not_shareable() {
        assert_not_subtype!(Type::array(Type::mutable(Type::nat())), Type::Shared);
        assert_not_subtype!(obj(vec![("a", Type::mutable(Type::nat()))]), Type::Shared);
    }

    #[test]
    fn local_functions_are_not_shareable() {
        assert_not_subtype!(func(vec![], vec![]), Type::Shared);
        let shared_fn = Type::Func(
            FuncSort::Shared,
            Control::Returns,
            Vec::new(),
            vec![Type::nat()],
            vec![],
        );
        assert_subtype!(shared_fn, Type::Shared);
    }
}

mod composites {
    use super::*;

    #[test]
    fn tuples_are_covariant_pointwise() {
        assert_subtype!(
            Type::Tup(vec![Type::nat(), Type::Non]),
            Type::Tup(vec![Type::int(), Type::text()])
        );
        assert_not_subtype!(
            Type::Tup(vec![Type::nat()]),
            Type::Tup(vec![Type::nat(), Type::nat()])
        );
    }

    #[test]
    fn options_and_arrays_are_covariant() {
        assert_subtype!(Type::opt(Type::nat()), Type::opt(Type::int()));
        assert_subtype!(Type::array(Type::nat()), Type::array(Type::int()));
    }

    #[test]
    fn mutable_arrays_are_invariant() {
        assert_subtype!(
            Type::array(Type::mutable(Type::nat())),
            Type::array(Type::mutable(Type::nat()))
        );
        assert_not_subtype!(
            Type::array(Type::mutable(Type::nat())),
            Type::array(Type::mutable(Type::int()))
        );
    }

    #[test]
    fn mutable_cells_are_invariant() {
        assert_not_subtype!(Type::mutable(Type::nat()), Type::mutable(Type::int()));
        assert_not_subtype!(Type::mutable(Type::nat()), Type::nat());
    }

    #[test]
    fn async_is_covariant() {
        assert_subtype!(Type::promise(Type::nat()), Type::promise(Type::int()));
    }
}

mod objects {
    use super::*;

    #[test]
    fn width_subtyping() {
        let wide = obj(vec![("a", Type::nat()), ("b", Type::text())]);
        let narrow = obj(vec![("b", Type::text())]);
        assert_subtype!(wide.clone(), narrow.clone());
        assert_not_subtype!(narrow, wide);
    }

    #[test]
    fn depth_subtyping() {
        assert_subtype!(obj(vec![("a", Type::nat())]), obj(vec![("a", Type::int())]));
    }

    #[test]
    fn mutable_fields_are_invariant() {
        assert_not_subtype!(
            obj(vec![("a", Type::mutable(Type::nat()))]),
            obj(vec![("a", Type::mutable(Type::int()))])
        );
    }

    #[test]
    fn sorts_must_agree() {
        let fields = vec![Field::new("a", Type::nat())];
        assert_not_subtype!(
            Type::Obj(ObjSort::Module, fields.clone()),
            Type::Obj(ObjSort::Object, fields)
        );
    }
}

mod variants {
    use super::*;

    #[test]
    fn width_subtyping_runs_the_other_way() {
        let narrow = variant(vec![("a", Type::nat())]);
        let wide = variant(vec![("a", Type::nat()), ("b", Type::text())]);
        assert_subtype!(narrow.clone(), wide.clone());
        assert_not_subtype!(wide, narrow);
    }

    #[test]
    fn depth_subtyping() {
        assert_subtype!(
            variant(vec![("a", Type::nat())]),
            variant(vec![("a", Type::int())])
        );
    }
}

mod functions {
    use super::*;

    #[test]
    fn contravariant_domains_covariant_codomains() {
        let general = func(vec![Type::int()], vec![Type::nat()]);
        let specific = func(vec![Type::nat()], vec![Type::int()]);
        assert_subtype!(general.clone(), specific.clone());
        assert_not_subtype!(specific, general);
    }

    #[test]
    fn sorts_and_controls_must_agree() {
        let local = func(vec![Type::nat()], vec![]);
        let shared = Type::Func(
            FuncSort::Shared,
            Control::Returns,
            Vec::new(),
            vec![Type::nat()],
            vec![],
        );
        assert_not_subtype!(local, shared);
    }

    #[test]
    fn generic_functions_compare_under_shared_binders() {
        let id = |bound: Type| {
            Type::Func(
                FuncSort::Local,
                Control::Returns,
                vec![Bind {
                    var: "X".to_owned(),
                    bound,
                }],
                vec![Type::Var(0)],
                vec![Type::Var(0)],
            )
        };
        assert_subtype!(id(Type::Any), id(Type::Any));
        assert_not_subtype!(id(Type::Any), id(Type::Shared));
    }
}

mod constructors {
    use super::*;

    #[test]
    fn definitions_unfold() {
        let pair = fresh_con(
            "Pair",
            Kind::Def(Vec::new(), Type::Tup(vec![Type::nat(), Type::nat()])),
        );
        assert_subtype!(
            Type::con(pair.clone()),
            Type::Tup(vec![Type::int(), Type::int()])
        );
        assert_subtype!(
            Type::Tup(vec![Type::nat(), Type::nat()]),
            Type::con(pair)
        );
    }

    #[test]
    fn parameterised_definitions_substitute() {
        // type Box<X> = (X,)
        let boxed = fresh_con(
            "Box",
            Kind::Def(
                vec![Bind {
                    var: "X".to_owned(),
                    bound: Type::Any,
                }],
                Type::Tup(vec![Type::Var(0)]),
            ),
        );
        assert_subtype!(
            Type::Con(boxed.clone(), vec![Type::nat()]),
            Type::Tup(vec![Type::int()])
        );
        assert_not_subtype!(
            Type::Con(boxed, vec![Type::int()]),
            Type::Tup(vec![Type::nat()])
        );
    }

    #[test]
    fn abstract_constructors_promote_to_their_bound() {
        let abs = fresh_con("X", Kind::Abs(Vec::new(), Type::int()));
        assert_subtype!(Type::con(abs.clone()), Type::int());
        assert_not_subtype!(Type::int(), Type::con(abs));
    }

    #[test]
    fn recursive_definitions_terminate() {
        // type List = ?(Nat, List)
        let list = fresh_con("List", Kind::Def(Vec::new(), Type::Pre));
        set_kind(
            &list,
            Kind::Def(
                Vec::new(),
                Type::opt(Type::Tup(vec![Type::nat(), Type::con(list.clone())])),
            ),
        );
        assert_subtype!(Type::con(list.clone()), Type::con(list.clone()));
        assert_subtype!(
            Type::con(list.clone()),
            Type::opt(Type::Tup(vec![Type::nat(), Type::con(list)]))
        );
    }

    #[test]
    fn isomorphic_recursive_definitions_are_related() {
        let make = |name: &str| {
            let con = fresh_con(name, Kind::Def(Vec::new(), Type::Pre));
            set_kind(
                &con,
                Kind::Def(
                    Vec::new(),
                    Type::opt(Type::Tup(vec![Type::nat(), Type::con(con.clone())])),
                ),
            );
            con
        };
        let a = make("A");
        let b = make("B");
        assert_subtype!(Type::con(a), Type::con(b));
    }

    #[test]
    fn disjoint_add_refuses_duplicates() {
        let con = fresh_con("C", Kind::Def(Vec::new(), Type::nat()));
        let set = ConSet::new();
        let set = disjoint_add(&set, con.clone()).unwrap();
        assert!(disjoint_add(&set, con).is_err());
    }
}

mod substitution {
    use super::*;

    #[test]
    fn open_replaces_outermost_binders() {
        // <X>(X) -> X opened at Nat
        let body = Type::Var(0);
        assert_eq!(open(&[Type::nat()], &body), Type::nat());
    }

    #[test]
    fn open_shifts_under_inner_binders() {
        // The domain of an inner generic function keeps its own binder.
        let inner = Type::Func(
            FuncSort::Local,
            Control::Returns,
            vec![Bind {
                var: "Y".to_owned(),
                bound: Type::Any,
            }],
            vec![Type::Var(0), Type::Var(1)],
            vec![],
        );
        let opened = open(&[Type::nat()], &inner);
        match opened {
            Type::Func(_, _, _, doms, _) => {
                assert_eq!(doms, vec![Type::Var(0), Type::nat()]);
            }
            t => panic!("unexpected type {}", t),
        }
    }

    #[test]
    fn close_inverts_open() {
        let con = fresh_con("X", Kind::Abs(Vec::new(), Type::Any));
        let t = Type::Tup(vec![Type::con(con.clone()), Type::nat()]);
        let closed = close(&[con.clone()], &t);
        assert_eq!(closed, Type::Tup(vec![Type::Var(0), Type::nat()]));
        assert_eq!(open(&[Type::con(con)], &closed), t);
    }

    #[test]
    fn promote_unfolds_to_a_head() {
        let pair = fresh_con(
            "Pair",
            Kind::Def(Vec::new(), Type::Tup(vec![Type::nat(), Type::nat()])),
        );
        let alias = fresh_con("Alias", Kind::Def(Vec::new(), Type::con(pair)));
        assert_eq!(
            promote(&Type::con(alias)),
            Type::Tup(vec![Type::nat(), Type::nat()])
        );
    }

    #[test]
    fn seq_of_one_is_its_element() {
        assert_eq!(seq(&[]), Type::unit());
        assert_eq!(seq(&[Type::nat()]), Type::nat());
        assert_eq!(
            seq(&[Type::nat(), Type::text()]),
            Type::Tup(vec![Type::nat(), Type::text()])
        );
    }
}
