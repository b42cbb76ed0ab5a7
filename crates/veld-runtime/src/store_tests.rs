use crate::{Builtin, Field, StoreError, TypeHeader, TypeId, TypeStore};

fn builtins(store: &mut TypeStore) -> (TypeId, TypeId, TypeId, TypeId) {
    (
        store.declare_builtin(Builtin::Bool),
        store.declare_builtin(Builtin::I32),
        store.declare_builtin(Builtin::I64),
        store.declare_builtin(Builtin::Str),
    )
}

#[test]
fn declare_is_idempotent_under_structural_equality() {
    let mut store = TypeStore::new();
    let i64t = store.declare_builtin(Builtin::I64);

    let a = store.declare(TypeHeader::struct_type("Pair", vec![i64t, i64t]));
    let b = store.declare(TypeHeader::struct_type("Pair", vec![i64t, i64t]));
    assert_eq!(a, b);
    assert_eq!(store.len(), 2);
}

#[test]
fn argument_order_distinguishes_composites() {
    let mut store = TypeStore::new();
    let a = store.declare_builtin(Builtin::I32);
    let b = store.declare_builtin(Builtin::I64);

    let ab = store.declare(TypeHeader::struct_type("Pair", vec![a, b]));
    let ba = store.declare(TypeHeader::struct_type("Pair", vec![b, a]));
    assert_ne!(ab, ba);
}

#[test]
fn role_distinguishes_same_named_composites() {
    let mut store = TypeStore::new();
    let s = store.declare(TypeHeader::struct_type("List", vec![]));
    let e = store.declare(TypeHeader::enum_type("List", vec![]));
    assert_ne!(s, e);
}

#[test]
fn builtins_are_defined_at_declaration() {
    let mut store = TypeStore::new();
    let (boolean, i32t, i64t, str_t) = builtins(&mut store);

    assert_eq!(store.size(boolean).unwrap(), 1);
    assert_eq!(store.size(i32t).unwrap(), 4);
    assert_eq!(store.size(i64t).unwrap(), 8);
    assert_eq!(store.size(str_t).unwrap(), size_of::<usize>());

    assert_eq!(store.alignment(boolean).unwrap(), 1);
    assert_eq!(store.alignment(i32t).unwrap(), 4);
    assert_eq!(store.alignment(i64t).unwrap(), 8);

    for ty in [boolean, i32t, i64t, str_t] {
        assert!(store.defined(ty));
        assert!(store.is_trivial(ty).unwrap());
    }
}

#[test]
fn builtin_lookup_round_trips() {
    let mut store = TypeStore::new();
    assert_eq!(store.builtin(Builtin::I64), None);

    let i64t = store.declare_builtin(Builtin::I64);
    assert_eq!(store.builtin(Builtin::I64), Some(i64t));
    assert_eq!(store.declare_builtin(Builtin::I64), i64t);
}

#[test]
fn empty_struct_layout() {
    let mut store = TypeStore::new();
    let unit = store.declare(TypeHeader::struct_type("Unit", vec![]));
    assert!(!store.defined(unit));

    store.define_struct(unit, vec![]).unwrap();

    assert!(store.defined(unit));
    assert_eq!(store.size(unit).unwrap(), 0);
    assert_eq!(store.alignment(unit).unwrap(), 1);
    assert_eq!(store.stride(unit).unwrap(), 1);
    assert!(store.is_trivial(unit).unwrap());
}

#[test]
fn flat_struct_layout() {
    let mut store = TypeStore::new();
    let (_, i32t, i64t, _) = builtins(&mut store);

    let pair = store.declare(TypeHeader::struct_type("Pair", vec![]));
    let m = store
        .define_struct(pair, vec![Field::inline(i64t), Field::inline(i32t)])
        .unwrap();

    assert_eq!(m.offsets(), &[0, 8]);
    assert_eq!(m.size(), 12);
    assert_eq!(m.alignment(), 8);
    assert!(m.trivial());
    assert_eq!(store.stride(pair).unwrap(), 16);
}

#[test]
fn struct_offsets_respect_field_alignment() {
    let mut store = TypeStore::new();
    let (boolean, i32t, i64t, _) = builtins(&mut store);

    let mixed = store.declare(TypeHeader::struct_type("Mixed", vec![]));
    let m = store
        .define_struct(
            mixed,
            vec![
                Field::inline(boolean),
                Field::inline(i64t),
                Field::inline(i32t),
            ],
        )
        .unwrap();

    assert_eq!(m.offsets(), &[0, 8, 16]);
    assert_eq!(m.size(), 20);
    assert_eq!(m.alignment(), 8);
    let offsets = m.offsets().to_vec();
    let fields = m.fields().to_vec();
    for (i, &offset) in offsets.iter().enumerate() {
        let align = store.field_alignment(fields[i]).unwrap();
        assert!(offset.is_multiple_of(align));
    }
    assert_eq!(store.stride(mixed).unwrap(), 24);
}

#[test]
fn out_of_line_fields_occupy_a_pointer() {
    let mut store = TypeStore::new();
    let (boolean, _, _, _) = builtins(&mut store);

    // Payload type is declared but deliberately never defined; the boxed
    // back edge must lay out regardless.
    let open = store.declare(TypeHeader::struct_type("Open", vec![]));
    let node = store.declare(TypeHeader::struct_type("Node", vec![]));
    let m = store
        .define_struct(node, vec![Field::inline(boolean), Field::boxed(open)])
        .unwrap();

    assert_eq!(m.offsets(), &[0, 8]);
    assert_eq!(m.size(), 8 + size_of::<usize>());
    assert_eq!(m.alignment(), align_of::<usize>());
    assert!(!m.trivial());

    let boxed = Field::boxed(open);
    assert_eq!(store.field_size(boxed).unwrap(), size_of::<usize>());
    assert_eq!(store.field_alignment(boxed).unwrap(), align_of::<usize>());
    assert!(!store.field_is_trivial(boxed).unwrap());
}

#[test]
fn enum_layout_with_two_variants() {
    let mut store = TypeStore::new();
    let (_, i32t, i64t, _) = builtins(&mut store);

    let either = store.declare(TypeHeader::enum_type("Either", vec![]));
    let m = store
        .define_enum(either, vec![Field::inline(i32t), Field::inline(i64t)])
        .unwrap();

    assert_eq!(m.offsets(), &[0, 8]);
    assert_eq!(m.size(), 10);
    assert_eq!(m.alignment(), 8);
    assert!(m.trivial());
    assert_eq!(store.stride(either).unwrap(), 16);
}

#[test]
fn enum_tag_alignment_pads_odd_payloads() {
    let mut store = TypeStore::new();
    let (boolean, _, _, _) = builtins(&mut store);

    let flag = store.declare(TypeHeader::enum_type("Flag", vec![]));
    let m = store
        .define_enum(flag, vec![Field::inline(boolean), Field::inline(boolean)])
        .unwrap();

    // 1-byte payload rounds up to the tag's 2-byte alignment.
    assert_eq!(m.offsets(), &[0, 2]);
    assert_eq!(m.size(), 4);
    assert_eq!(m.alignment(), 2);
}

#[test]
fn single_variant_enum_collapses_to_its_payload() {
    let mut store = TypeStore::new();
    let (_, _, i64t, _) = builtins(&mut store);

    let only = store.declare(TypeHeader::enum_type("Only", vec![]));
    let m = store.define_enum(only, vec![Field::inline(i64t)]).unwrap();

    assert_eq!(m.offsets(), &[0]);
    assert_eq!(m.size(), 8);
    assert_eq!(m.alignment(), 8);
    assert!(m.trivial());
    assert_eq!(m.fields().len(), 1);
}

#[test]
fn empty_enum_is_zero_sized() {
    let mut store = TypeStore::new();
    let never = store.declare(TypeHeader::enum_type("Never", vec![]));
    let m = store.define_enum(never, vec![]).unwrap();

    assert_eq!(m.size(), 0);
    assert_eq!(m.alignment(), 1);
    assert!(m.fields().is_empty());
    assert_eq!(store.stride(never).unwrap(), 1);
}

#[test]
fn recursive_list_defines_through_a_boxed_back_edge() {
    let mut store = TypeStore::new();
    let i64t = store.declare_builtin(Builtin::I64);

    let list = store.declare(TypeHeader::enum_type("List", vec![i64t]));
    let cons = store.declare(TypeHeader::struct_type("List.Cons", vec![i64t]));
    let empty = store.declare(TypeHeader::struct_type("List.Empty", vec![i64t]));

    store.define_struct(empty, vec![]).unwrap();
    store
        .define_struct(cons, vec![Field::inline(i64t), Field::boxed(list)])
        .unwrap();
    store
        .define_enum(list, vec![Field::inline(cons), Field::inline(empty)])
        .unwrap();

    assert!(store.defined(list) && store.defined(cons) && store.defined(empty));
    assert_eq!(store.size(cons).unwrap(), 16);
    assert_eq!(store.alignment(cons).unwrap(), 8);
    assert!(!store.is_trivial(cons).unwrap());
    assert!(!store.is_trivial(list).unwrap());
}

#[test]
fn describe_renders_names_and_arguments() {
    let mut store = TypeStore::new();
    let (boolean, _, i64t, _) = builtins(&mut store);

    let pair = store.declare(TypeHeader::struct_type("Pair", vec![i64t, boolean]));
    let list = store.declare(TypeHeader::enum_type("List", vec![pair]));
    let none = store.declare(TypeHeader::None);

    assert_eq!(store.describe(i64t), "Int64");
    assert_eq!(store.describe(pair), "Pair<Int64, Bool>");
    assert_eq!(store.describe(list), "List<Pair<Int64, Bool>>");
    assert_eq!(store.describe(none), "nil");
}

#[test]
fn all_trivial_short_circuits_on_boxed_fields() {
    let mut store = TypeStore::new();
    let (_, _, i64t, _) = builtins(&mut store);
    let open = store.declare(TypeHeader::struct_type("Open", vec![]));

    assert!(store.all_trivial(&[]).unwrap());
    assert!(store.all_trivial(&[Field::inline(i64t)]).unwrap());
    // Boxed fields are never trivial, even when the payload type has no
    // layout yet.
    assert!(
        !store
            .all_trivial(&[Field::inline(i64t), Field::boxed(open)])
            .unwrap()
    );
}

#[test]
fn iteration_follows_declaration_order() {
    let mut store = TypeStore::new();
    assert!(store.is_empty());

    let a = store.declare_builtin(Builtin::Bool);
    let b = store.declare(TypeHeader::struct_type("Unit", vec![]));
    let ids: Vec<_> = store.iter().collect();
    assert_eq!(ids, vec![a, b]);
    assert_eq!(store.len(), 2);
}

#[test]
fn unknown_id_is_rejected() {
    let store = TypeStore::new();
    let bogus = TypeId(7);

    assert!(!store.defined(bogus));
    assert_eq!(
        store.metatype(bogus).unwrap_err(),
        StoreError::UnknownType("type id 7".into())
    );
    assert_eq!(
        store.size(bogus).unwrap_err(),
        StoreError::UnknownType("type id 7".into())
    );
    assert!(matches!(
        store.header(bogus).unwrap_err(),
        StoreError::UnknownType(_)
    ));
}

#[test]
fn redefinition_is_rejected() {
    let mut store = TypeStore::new();
    let unit = store.declare(TypeHeader::struct_type("Unit", vec![]));
    store.define_struct(unit, vec![]).unwrap();

    let err = store.define_struct(unit, vec![]).unwrap_err();
    assert_eq!(err, StoreError::Redefinition("Unit".into()));
}

#[test]
fn lookup_before_define_is_rejected() {
    let mut store = TypeStore::new();
    let open = store.declare(TypeHeader::struct_type("Open", vec![]));

    assert_eq!(
        store.metatype(open).unwrap_err(),
        StoreError::UndefinedType("Open".into())
    );
    assert_eq!(
        store.stride(open).unwrap_err(),
        StoreError::UndefinedType("Open".into())
    );
}

#[test]
fn inline_field_of_undefined_type_is_rejected() {
    let mut store = TypeStore::new();
    let open = store.declare(TypeHeader::struct_type("Open", vec![]));
    let holder = store.declare(TypeHeader::struct_type("Holder", vec![]));

    let err = store
        .define_struct(holder, vec![Field::inline(open)])
        .unwrap_err();
    assert_eq!(
        err,
        StoreError::UndefinedDependency {
            ty: "Holder".into(),
            field: "Open".into(),
        }
    );
    // The failed define leaves the type undefined, so a corrected layout
    // can still be installed.
    assert!(!store.defined(holder));
    store.define_struct(holder, vec![Field::boxed(open)]).unwrap();
}

#[test]
fn define_checks_the_header_role() {
    let mut store = TypeStore::new();
    let (boolean, _, _, _) = builtins(&mut store);
    let s = store.declare(TypeHeader::struct_type("S", vec![]));
    let e = store.declare(TypeHeader::enum_type("E", vec![]));
    let none = store.declare(TypeHeader::None);

    assert_eq!(
        store.define_enum(s, vec![]).unwrap_err(),
        StoreError::RoleMismatch {
            ty: "S".into(),
            expected: "an enum",
        }
    );
    assert_eq!(
        store.define_struct(e, vec![]).unwrap_err(),
        StoreError::RoleMismatch {
            ty: "E".into(),
            expected: "a struct",
        }
    );
    assert!(matches!(
        store.define_struct(boolean, vec![]).unwrap_err(),
        StoreError::RoleMismatch { .. }
    ));
    assert!(matches!(
        store.define_enum(none, vec![]).unwrap_err(),
        StoreError::RoleMismatch { .. }
    ));
}

#[test]
fn none_header_is_internable_but_never_defined() {
    let mut store = TypeStore::new();
    let a = store.declare(TypeHeader::None);
    let b = store.declare(TypeHeader::None);

    assert_eq!(a, b);
    assert!(!store.defined(a));
    assert!(matches!(
        store.metatype(a).unwrap_err(),
        StoreError::UndefinedType(_)
    ));
}
