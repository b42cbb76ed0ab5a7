//! The owning type registry.
//!
//! A [`TypeStore`] interns [`TypeHeader`]s to canonical [`TypeId`]s,
//! computes physical layouts on `define_struct`/`define_enum`, and drives
//! the value ABI (see `instance.rs`). Cyclic types are declared first to
//! obtain stable ids, then defined with `out_of_line` on at least one back
//! edge so every cycle has a finite layout.

use std::collections::HashMap;
use std::fmt::Write as _;

use veld_core::align::round_up;

use crate::error::StoreError;
use crate::field::Field;
use crate::header::{Builtin, TypeHeader};
use crate::ids::TypeId;
use crate::metatype::Metatype;

/// Width of the u16 variant tag trailing multi-variant enum payloads.
pub(crate) const TAG_SIZE: usize = size_of::<u16>();
pub(crate) const TAG_ALIGN: usize = align_of::<u16>();

/// One interned type: its identity and, once defined, its layout.
struct Entry {
    header: TypeHeader,
    metatype: Metatype,
}

/// The owning registry of runtime types.
///
/// The store is single-threaded: declarations, definitions, and value
/// operations on instances tied to one store must not run concurrently.
/// Independent stores in separate threads do not interact. Dropping the
/// store invalidates every id and instance derived from it.
#[derive(Default)]
pub struct TypeStore {
    /// Interned types, indexed by `TypeId`.
    entries: Vec<Entry>,
    /// Map from structural identity to canonical id.
    index: HashMap<TypeHeader, TypeId>,
}

impl TypeStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the canonical id of the unique interned header equal to
    /// `header`, interning it first if no equal header is known.
    ///
    /// Built-in scalars carry their layout from birth; `None`, struct, and
    /// enum headers await `define`.
    pub fn declare(&mut self, header: TypeHeader) -> TypeId {
        if let Some(&id) = self.index.get(&header) {
            return id;
        }

        let id = TypeId(self.entries.len() as u32);
        assert!(id.0 <= Field::MAX_TYPE_ID, "type table full");

        let metatype = match &header {
            TypeHeader::Builtin(b) => {
                Metatype::new(b.size(), b.alignment(), true, Vec::new(), Vec::new())
            }
            _ => Metatype::undefined(),
        };
        self.index.insert(header.clone(), id);
        self.entries.push(Entry { header, metatype });
        id
    }

    /// Interns the given built-in scalar.
    pub fn declare_builtin(&mut self, builtin: Builtin) -> TypeId {
        self.declare(TypeHeader::Builtin(builtin))
    }

    /// Returns the id of `builtin` if it has been declared.
    pub fn builtin(&self, builtin: Builtin) -> Option<TypeId> {
        self.index.get(&TypeHeader::Builtin(builtin)).copied()
    }

    /// Number of interned types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over interned ids in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = TypeId> + '_ {
        (0..self.entries.len()).map(|i| TypeId(i as u32))
    }

    /// Accesses the header interned for `ty`.
    pub fn header(&self, ty: TypeId) -> Result<&TypeHeader, StoreError> {
        Ok(&self.entry(ty)?.header)
    }

    /// `true` iff a layout has been defined for `ty`.
    pub fn defined(&self, ty: TypeId) -> bool {
        self.entries
            .get(ty.index())
            .is_some_and(|e| e.metatype.defined())
    }

    /// Accesses the metatype of `ty`.
    pub fn metatype(&self, ty: TypeId) -> Result<&Metatype, StoreError> {
        let entry = self.entry(ty)?;
        if entry.metatype.defined() {
            Ok(&entry.metatype)
        } else {
            Err(StoreError::UndefinedType(self.describe(ty)))
        }
    }

    /// Assigns a product layout to `ty`.
    ///
    /// Field types must be declared in this store, and in-line field types
    /// must already be defined; out-of-line fields only need a declaration,
    /// which is what lets cyclic types close their back edges.
    pub fn define_struct(
        &mut self,
        ty: TypeId,
        fields: Vec<Field>,
    ) -> Result<&Metatype, StoreError> {
        self.check_definable(ty, false)?;
        let metatype = self.layout_struct(ty, fields)?;
        Ok(self.install(ty, metatype))
    }

    /// Assigns a sum layout to `ty`, one field per variant.
    pub fn define_enum(&mut self, ty: TypeId, fields: Vec<Field>) -> Result<&Metatype, StoreError> {
        self.check_definable(ty, true)?;
        let metatype = self.layout_enum(ty, fields)?;
        Ok(self.install(ty, metatype))
    }

    /// Returns the size of an instance of `ty`.
    pub fn size(&self, ty: TypeId) -> Result<usize, StoreError> {
        Ok(self.metatype(ty)?.size())
    }

    /// Returns the alignment of an instance of `ty`.
    pub fn alignment(&self, ty: TypeId) -> Result<usize, StoreError> {
        Ok(self.metatype(ty)?.alignment())
    }

    /// Returns the distance between consecutive instances of `ty` stored in
    /// contiguous memory; at least 1 even for zero-sized types.
    pub fn stride(&self, ty: TypeId) -> Result<usize, StoreError> {
        let m = self.metatype(ty)?;
        Ok(round_up(m.size(), m.alignment()).max(1))
    }

    /// Returns the offset of the `i`-th slot of `ty`.
    pub fn offset(&self, ty: TypeId, i: usize) -> Result<usize, StoreError> {
        Ok(self.metatype(ty)?.offsets()[i])
    }

    /// Returns the size `field` occupies in its aggregate: pointer-sized
    /// when out of line, the field type's size otherwise.
    pub fn field_size(&self, field: Field) -> Result<usize, StoreError> {
        if field.out_of_line() {
            Ok(size_of::<*const u8>())
        } else {
            self.size(field.ty())
        }
    }

    /// Returns the alignment `field` requires in its aggregate.
    pub fn field_alignment(&self, field: Field) -> Result<usize, StoreError> {
        if field.out_of_line() {
            Ok(align_of::<*const u8>())
        } else {
            self.alignment(field.ty())
        }
    }

    /// `true` iff instances of `ty` involve no out-of-line storage.
    pub fn is_trivial(&self, ty: TypeId) -> Result<bool, StoreError> {
        Ok(self.metatype(ty)?.trivial())
    }

    /// `true` iff `field` involves no out-of-line storage.
    pub fn field_is_trivial(&self, field: Field) -> Result<bool, StoreError> {
        Ok(!field.out_of_line() && self.is_trivial(field.ty())?)
    }

    /// `true` iff none of `fields` involves out-of-line storage.
    pub fn all_trivial(&self, fields: &[Field]) -> Result<bool, StoreError> {
        for &field in fields {
            if !self.field_is_trivial(field)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Returns a description of the type identified by `ty`.
    ///
    /// Builtins render by their surface names, composites as `Name` or
    /// `Name<Arg1, Arg2, ...>`, and the absent type as `nil`.
    pub fn describe(&self, ty: TypeId) -> String {
        let mut out = String::new();
        self.write_description(&mut out, ty);
        out
    }

    /// Appends the description of `ty` to `out`.
    pub(crate) fn write_description(&self, out: &mut String, ty: TypeId) {
        let Some(entry) = self.entries.get(ty.index()) else {
            write!(out, "type id {}", ty.0).unwrap();
            return;
        };
        match &entry.header {
            TypeHeader::None => out.push_str("nil"),
            TypeHeader::Builtin(b) => out.push_str(b.name()),
            TypeHeader::Struct(c) | TypeHeader::Enum(c) => {
                out.push_str(c.name());
                if !c.arguments().is_empty() {
                    out.push('<');
                    for (i, &argument) in c.arguments().iter().enumerate() {
                        if i > 0 {
                            out.push_str(", ");
                        }
                        self.write_description(out, argument);
                    }
                    out.push('>');
                }
            }
        }
    }

    fn entry(&self, ty: TypeId) -> Result<&Entry, StoreError> {
        self.entries
            .get(ty.index())
            .ok_or_else(|| StoreError::UnknownType(self.describe(ty)))
    }

    /// Verifies that `ty` is interned here with the expected role and has
    /// not been defined yet.
    fn check_definable(&self, ty: TypeId, want_enum: bool) -> Result<(), StoreError> {
        let entry = self.entry(ty)?;
        let role_matches = if want_enum {
            entry.header.is_enum()
        } else {
            entry.header.is_struct()
        };
        if !role_matches {
            return Err(StoreError::RoleMismatch {
                ty: self.describe(ty),
                expected: if want_enum { "an enum" } else { "a struct" },
            });
        }
        if entry.metatype.defined() {
            return Err(StoreError::Redefinition(self.describe(ty)));
        }
        Ok(())
    }

    fn install(&mut self, ty: TypeId, metatype: Metatype) -> &Metatype {
        let entry = &mut self.entries[ty.index()];
        entry.metatype = metatype;
        &entry.metatype
    }

    /// Size and alignment `field` contributes to the layout of `owner`.
    ///
    /// In-line fields require a defined type; out-of-line fields occupy a
    /// machine pointer regardless of the pointee's state.
    fn field_layout(&self, owner: TypeId, field: Field) -> Result<(usize, usize), StoreError> {
        if field.out_of_line() {
            return Ok((size_of::<*const u8>(), align_of::<*const u8>()));
        }
        let entry = self.entry(field.ty())?;
        if !entry.metatype.defined() {
            return Err(StoreError::UndefinedDependency {
                ty: self.describe(owner),
                field: self.describe(field.ty()),
            });
        }
        Ok((entry.metatype.size(), entry.metatype.alignment()))
    }

    /// Returns the byte offset of each field in declaration order.
    fn struct_offsets(&self, owner: TypeId, fields: &[Field]) -> Result<Vec<usize>, StoreError> {
        let mut offsets = vec![0];
        for i in 1..fields.len() {
            let (previous_size, _) = self.field_layout(owner, fields[i - 1])?;
            let (_, alignment) = self.field_layout(owner, fields[i])?;
            offsets.push(round_up(offsets[i - 1] + previous_size, alignment));
        }
        Ok(offsets)
    }

    fn layout_struct(&self, ty: TypeId, fields: Vec<Field>) -> Result<Metatype, StoreError> {
        if fields.is_empty() {
            return Ok(Metatype::new(0, 1, true, fields, Vec::new()));
        }

        let offsets = self.struct_offsets(ty, &fields)?;

        let mut alignment = 1;
        for &field in &fields {
            alignment = alignment.max(self.field_layout(ty, field)?.1);
        }
        let (last_size, _) = self.field_layout(ty, fields[fields.len() - 1])?;
        let size = offsets[offsets.len() - 1] + last_size;
        let trivial = self.all_trivial(&fields)?;

        Ok(Metatype::new(size, alignment, trivial, fields, offsets))
    }

    fn layout_enum(&self, ty: TypeId, fields: Vec<Field>) -> Result<Metatype, StoreError> {
        match fields.len() {
            // No variants: indistinguishable from the empty struct.
            0 => Ok(Metatype::new(0, 1, true, fields, Vec::new())),

            // A single variant needs no tag and takes its payload's layout.
            1 => {
                let (size, alignment) = self.field_layout(ty, fields[0])?;
                let trivial = self.field_is_trivial(fields[0])?;
                Ok(Metatype::new(size, alignment, trivial, fields, vec![0]))
            }

            // Payload slot at offset 0, u16 tag after the widest payload.
            _ => {
                let mut payload_size = 0;
                let mut alignment = 1;
                for &field in &fields {
                    let (size, align) = self.field_layout(ty, field)?;
                    payload_size = payload_size.max(size);
                    alignment = alignment.max(align);
                }
                let tag_offset = round_up(payload_size, TAG_ALIGN);
                let size = tag_offset + TAG_SIZE;
                let alignment = alignment.max(TAG_ALIGN);
                let trivial = self.all_trivial(&fields)?;

                Ok(Metatype::new(
                    size,
                    alignment,
                    trivial,
                    fields,
                    vec![0, tag_offset],
                ))
            }
        }
    }
}
