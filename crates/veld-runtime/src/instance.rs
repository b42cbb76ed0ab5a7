//! Generic value operations on raw instance memory.
//!
//! Every operation is driven by a [`TypeId`] and a raw base pointer. The
//! caller owns instance storage (scratch buffers, frames, globals); the
//! store only manages the out-of-line payloads hanging off it. Operations
//! that read or write instance memory are `unsafe`: the caller vouches that
//! the pointer refers to suitably sized and aligned storage for the type.

use std::ffi::{CStr, c_char};
use std::fmt::Write as _;

use veld_core::alloc::{aligned_alloc, aligned_free};
use veld_core::scratch::Scratch;

use crate::error::StoreError;
use crate::field::Field;
use crate::header::{Builtin, TypeHeader};
use crate::ids::TypeId;
use crate::metatype::Metatype;
use crate::store::{TAG_SIZE, TypeStore};

impl TypeStore {
    /// Returns `base` advanced by the offset of the `i`-th field of `m`.
    ///
    /// For an out-of-line field the slot at that offset holds the payload
    /// pointer; a null slot is populated with zeroed storage sized for the
    /// field's type before the payload address is returned. The returned
    /// address points at memory capable of holding an instance of the
    /// field's type.
    ///
    /// # Safety
    /// `base` must point to storage laid out per `m`, which must belong to
    /// this store, and `i` must be a valid field index.
    pub unsafe fn address_of(
        &self,
        m: &Metatype,
        i: usize,
        base: *mut u8,
    ) -> Result<*mut u8, StoreError> {
        let field = m.fields()[i];
        // SAFETY: `base` covers the layout of `m` per the caller contract.
        let field_address = unsafe { base.add(m.offsets()[i]) };
        if field.out_of_line() {
            // SAFETY: an out-of-line slot holds the payload pointer.
            unsafe { self.materialize(field, field_address) }
        } else {
            Ok(field_address)
        }
    }

    /// [`address_of`](Self::address_of) by type id.
    ///
    /// # Safety
    /// Same contract as [`address_of`](Self::address_of), against the
    /// layout of `ty`.
    pub unsafe fn field_address(
        &self,
        ty: TypeId,
        i: usize,
        base: *mut u8,
    ) -> Result<*mut u8, StoreError> {
        let m = self.metatype(ty)?;
        // SAFETY: forwarded caller contract.
        unsafe { self.address_of(m, i, base) }
    }

    /// Returns the payload address of the out-of-line `field` whose slot is
    /// at `slot`, allocating zeroed storage on first use.
    unsafe fn materialize(&self, field: Field, slot: *mut u8) -> Result<*mut u8, StoreError> {
        let m = self.metatype(field.ty())?;
        // SAFETY: `slot` holds the field's payload pointer.
        unsafe {
            let slot = slot as *mut *mut u8;
            if (*slot).is_null() {
                *slot = aligned_alloc(m.alignment(), m.size(), true);
            }
            Ok(*slot)
        }
    }

    /// Returns the payload address of `field` without allocating: the slot
    /// contents for an out-of-line field (null if never materialized), the
    /// field address itself otherwise.
    unsafe fn resolve(&self, field: Field, field_address: *mut u8) -> *mut u8 {
        if field.out_of_line() {
            // SAFETY: an out-of-line slot holds the payload pointer.
            unsafe { *(field_address as *mut *mut u8) }
        } else {
            field_address
        }
    }

    /// Resolves the payload address of an enum variant, whose slot sits at
    /// the instance base, materializing out-of-line storage.
    unsafe fn variant_address(&self, field: Field, base: *mut u8) -> Result<*mut u8, StoreError> {
        if field.out_of_line() {
            // SAFETY: forwarded caller contract.
            unsafe { self.materialize(field, base) }
        } else {
            Ok(base)
        }
    }

    /// Calls `action` with a zero-initialized buffer large enough for
    /// `count` contiguous instances of `ty`.
    ///
    /// The buffer holds `size(ty)` bytes when `count` is 1 and
    /// `stride(ty) * count` bytes otherwise, is aligned for `ty`, and is
    /// released when `action` returns on any path. Zero-sized buffers pass
    /// a null base pointer. Instances constructed inside the buffer must be
    /// deinitialized before `action` returns; the store does not do so.
    pub fn with_temporary_allocation<R>(
        &self,
        ty: TypeId,
        count: usize,
        action: impl FnOnce(*mut u8) -> R,
    ) -> Result<R, StoreError> {
        let m = self.metatype(ty)?;
        let bytes = if count == 1 {
            m.size()
        } else {
            self.stride(ty)? * count
        };
        let mut scratch = Scratch::new(bytes, m.alignment().max(1));
        Ok(action(scratch.base()))
    }

    /// Initializes `target` with a deep copy of the instance of `ty` stored
    /// at `source`.
    ///
    /// Out-of-line payloads reachable from `source` are copied into fresh
    /// allocations owned by `target`.
    ///
    /// # Safety
    /// `target` must point to fresh or zeroed storage for an instance of
    /// `ty`; `source` must point to an initialized instance of `ty`.
    pub unsafe fn copy_initialize(
        &self,
        ty: TypeId,
        target: *mut u8,
        source: *mut u8,
    ) -> Result<(), StoreError> {
        match self.header(ty)? {
            TypeHeader::None => Err(StoreError::UndefinedType(self.describe(ty))),
            TypeHeader::Builtin(b) => {
                // SAFETY: builtin instances occupy `b.size()` bytes.
                unsafe { copy_bytes(target, source, b.size()) };
                Ok(())
            }
            // SAFETY: forwarded caller contract.
            TypeHeader::Struct(_) => unsafe { self.copy_struct(ty, target, source) },
            TypeHeader::Enum(_) => unsafe { self.copy_enum(ty, target, source) },
        }
    }

    unsafe fn copy_struct(
        &self,
        ty: TypeId,
        target: *mut u8,
        source: *mut u8,
    ) -> Result<(), StoreError> {
        let m = self.metatype(ty)?;
        if m.trivial() {
            // SAFETY: trivial instances are plain bytes.
            unsafe { copy_bytes(target, source, m.size()) };
            return Ok(());
        }

        for i in 0..m.fields().len() {
            // SAFETY: both bases cover the layout of `m`.
            let t = unsafe { self.address_of(m, i, target)? };
            let s = unsafe { self.address_of(m, i, source)? };
            // SAFETY: the resolved addresses hold instances of the field's type.
            unsafe { self.copy_initialize(m.fields()[i].ty(), t, s)? };
        }
        Ok(())
    }

    unsafe fn copy_enum(
        &self,
        ty: TypeId,
        target: *mut u8,
        source: *mut u8,
    ) -> Result<(), StoreError> {
        let m = self.metatype(ty)?;
        if m.trivial() {
            // SAFETY: trivial instances are plain bytes.
            unsafe { copy_bytes(target, source, m.size()) };
            return Ok(());
        }

        // SAFETY: multi-variant instances carry their tag at `offsets()[1]`.
        let tag = unsafe { self.read_variant_tag(m, source) };
        let field = self.variant_field(ty, m, tag as usize)?;

        // SAFETY: both payload slots sit at the instance base.
        let t = unsafe { self.variant_address(field, target)? };
        let s = unsafe { self.variant_address(field, source)? };
        // SAFETY: the payload is an initialized instance of the variant's type.
        unsafe { self.copy_initialize(field.ty(), t, s)? };

        if m.fields().len() > 1 {
            // SAFETY: `target` covers the layout of `m`, including the tag.
            unsafe { write_tag(target.add(m.offsets()[1]), tag) };
        }
        Ok(())
    }

    /// Initializes `target` to the `variant`-th case of the enum `ty`,
    /// copying the payload from `source` and setting the tag.
    ///
    /// `source` points to an instance of the variant's type, not of the
    /// enum. Single-variant enums carry no tag; the tag step is skipped.
    ///
    /// # Safety
    /// `target` must point to fresh or zeroed storage for an instance of
    /// `ty`; `source` must point to an initialized instance of the
    /// `variant`-th field's type.
    pub unsafe fn copy_initialize_enum(
        &self,
        ty: TypeId,
        variant: usize,
        target: *mut u8,
        source: *mut u8,
    ) -> Result<(), StoreError> {
        if !self.header(ty)?.is_enum() {
            return Err(StoreError::RoleMismatch {
                ty: self.describe(ty),
                expected: "an enum",
            });
        }
        let m = self.metatype(ty)?;
        let field = self.variant_field(ty, m, variant)?;

        // SAFETY: the payload slot sits at the instance base.
        let t = unsafe { self.variant_address(field, target)? };
        // SAFETY: `source` holds an instance of the variant's type.
        unsafe { self.copy_initialize(field.ty(), t, source)? };

        if m.fields().len() > 1 {
            // SAFETY: `target` covers the layout of `m`, including the tag.
            unsafe { write_tag(target.add(m.offsets()[1]), variant as u16) };
        }
        Ok(())
    }

    /// Initializes `target` with the given scalar after checking that `ty`
    /// is a built-in of matching width.
    ///
    /// # Safety
    /// `target` must point to storage for an instance of `ty`.
    pub unsafe fn copy_initialize_builtin<T: Copy>(
        &self,
        ty: TypeId,
        target: *mut u8,
        value: T,
    ) -> Result<(), StoreError> {
        let TypeHeader::Builtin(b) = self.header(ty)? else {
            return Err(StoreError::InvalidArgument(format!(
                "{} is not a built-in type",
                self.describe(ty)
            )));
        };
        if b.size() != size_of::<T>() {
            return Err(StoreError::InvalidArgument(format!(
                "source width {} does not match {}",
                size_of::<T>(),
                b.name()
            )));
        }
        // SAFETY: widths match per the check above.
        unsafe { copy_bytes(target, &value as *const T as *const u8, size_of::<T>()) };
        Ok(())
    }

    /// Destroys the instance of `ty` stored at `source`, releasing any
    /// out-of-line payloads it owns. The storage itself is untouched and
    /// returns to its zeroed state for reuse.
    ///
    /// # Safety
    /// `source` must point to an initialized instance of `ty`, which must
    /// not be used again before re-initialization.
    pub unsafe fn deinitialize(&self, ty: TypeId, source: *mut u8) -> Result<(), StoreError> {
        match self.header(ty)? {
            TypeHeader::None => Err(StoreError::UndefinedType(self.describe(ty))),
            TypeHeader::Builtin(_) => Ok(()),
            // SAFETY: forwarded caller contract.
            TypeHeader::Struct(_) => unsafe { self.deinit_struct(ty, source) },
            TypeHeader::Enum(_) => unsafe { self.deinit_enum(ty, source) },
        }
    }

    unsafe fn deinit_struct(&self, ty: TypeId, source: *mut u8) -> Result<(), StoreError> {
        let m = self.metatype(ty)?;
        if m.trivial() {
            return Ok(());
        }

        for i in 0..m.fields().len() {
            // SAFETY: `source` covers the layout of `m`.
            let field_address = unsafe { source.add(m.offsets()[i]) };
            // SAFETY: the slot belongs to this field.
            unsafe { self.deinit_field(m.fields()[i], field_address)? };
        }
        Ok(())
    }

    unsafe fn deinit_enum(&self, ty: TypeId, source: *mut u8) -> Result<(), StoreError> {
        let m = self.metatype(ty)?;
        if m.trivial() {
            return Ok(());
        }

        // SAFETY: multi-variant instances carry their tag at `offsets()[1]`.
        let tag = unsafe { self.read_variant_tag(m, source) };
        let field = self.variant_field(ty, m, tag as usize)?;
        // SAFETY: the payload slot sits at the instance base.
        unsafe { self.deinit_field(field, source) }
    }

    /// Deinitializes the value of `field` whose slot or storage begins at
    /// `field_address`, releasing its out-of-line payload if one was ever
    /// materialized. Never allocates: a null slot is skipped.
    unsafe fn deinit_field(&self, field: Field, field_address: *mut u8) -> Result<(), StoreError> {
        // SAFETY: forwarded caller contract.
        let payload = unsafe { self.resolve(field, field_address) };
        if field.out_of_line() {
            if payload.is_null() {
                return Ok(());
            }
            // SAFETY: `payload` holds an instance of the field's type.
            unsafe { self.deinitialize(field.ty(), payload)? };
            // SAFETY: the payload came from `materialize`; nulling the slot
            // keeps re-deinitialization and re-use well-defined.
            unsafe {
                aligned_free(payload);
                *(field_address as *mut *mut u8) = std::ptr::null_mut();
            }
            Ok(())
        } else {
            // SAFETY: `payload` holds an instance of the field's type.
            unsafe { self.deinitialize(field.ty(), payload) }
        }
    }

    /// Writes a textual rendering of the instance of `ty` at `source`.
    ///
    /// Scalars render natively (`true`/`false`, decimal integers, the
    /// referenced string's contents), structs as `Name<args>(f0, f1, ...)`,
    /// enums as `Name<args>(payload)`, and the absent type as `nil`.
    ///
    /// # Safety
    /// `source` must point to an initialized instance of `ty`; `String`
    /// values must hold null pointers or null-terminated C strings.
    pub unsafe fn dump_instance(
        &self,
        out: &mut String,
        ty: TypeId,
        source: *mut u8,
    ) -> Result<(), StoreError> {
        match self.header(ty)? {
            TypeHeader::None => {
                out.push_str("nil");
                Ok(())
            }
            TypeHeader::Builtin(b) => {
                // SAFETY: forwarded caller contract.
                unsafe { dump_builtin(out, *b, source) };
                Ok(())
            }
            // SAFETY: forwarded caller contract.
            TypeHeader::Struct(_) => unsafe { self.dump_struct(out, ty, source) },
            TypeHeader::Enum(_) => unsafe { self.dump_enum(out, ty, source) },
        }
    }

    /// Returns a textual rendering of the instance of `ty` at `source`.
    ///
    /// # Safety
    /// Same contract as [`dump_instance`](Self::dump_instance).
    pub unsafe fn describe_instance(
        &self,
        ty: TypeId,
        source: *mut u8,
    ) -> Result<String, StoreError> {
        let mut out = String::new();
        // SAFETY: forwarded caller contract.
        unsafe { self.dump_instance(&mut out, ty, source)? };
        Ok(out)
    }

    unsafe fn dump_struct(
        &self,
        out: &mut String,
        ty: TypeId,
        source: *mut u8,
    ) -> Result<(), StoreError> {
        let m = self.metatype(ty)?;
        self.write_description(out, ty);
        out.push('(');
        for i in 0..m.fields().len() {
            if i > 0 {
                out.push_str(", ");
            }
            // SAFETY: `source` covers the layout of `m`.
            let s = unsafe { self.address_of(m, i, source)? };
            // SAFETY: the resolved address holds an instance of the field's type.
            unsafe { self.dump_instance(out, m.fields()[i].ty(), s)? };
        }
        out.push(')');
        Ok(())
    }

    unsafe fn dump_enum(
        &self,
        out: &mut String,
        ty: TypeId,
        source: *mut u8,
    ) -> Result<(), StoreError> {
        let m = self.metatype(ty)?;

        // SAFETY: multi-variant instances carry their tag at `offsets()[1]`.
        let tag = unsafe { self.read_variant_tag(m, source) };
        let field = self.variant_field(ty, m, tag as usize)?;
        // SAFETY: the payload slot sits at the instance base.
        let s = unsafe { self.variant_address(field, source)? };

        self.write_description(out, ty);
        out.push('(');
        // SAFETY: the payload is an initialized instance of the variant's type.
        unsafe { self.dump_instance(out, field.ty(), s)? };
        out.push(')');
        Ok(())
    }

    /// Reads the active variant's ordinal; single-variant enums have none
    /// and are always variant 0.
    unsafe fn read_variant_tag(&self, m: &Metatype, source: *mut u8) -> u16 {
        if m.fields().len() > 1 {
            // SAFETY: `source` covers the layout of `m`, including the tag.
            unsafe { read_tag(source.add(m.offsets()[1])) }
        } else {
            0
        }
    }

    /// Looks up the field of the `variant`-th case of `ty`.
    fn variant_field(
        &self,
        ty: TypeId,
        m: &Metatype,
        variant: usize,
    ) -> Result<Field, StoreError> {
        m.fields().get(variant).copied().ok_or_else(|| {
            StoreError::InvalidArgument(format!(
                "variant {variant} is out of range for {}",
                self.describe(ty)
            ))
        })
    }
}

/// Copies `size` bytes between instance buffers; zero-sized types touch no
/// memory.
unsafe fn copy_bytes(target: *mut u8, source: *const u8, size: usize) {
    if size > 0 {
        // SAFETY: forwarded caller contract; instance buffers never overlap.
        unsafe { std::ptr::copy_nonoverlapping(source, target, size) };
    }
}

/// Reads the little-endian u16 variant tag at `p`.
unsafe fn read_tag(p: *const u8) -> u16 {
    let mut bytes = [0u8; TAG_SIZE];
    // SAFETY: forwarded caller contract.
    unsafe { std::ptr::copy_nonoverlapping(p, bytes.as_mut_ptr(), TAG_SIZE) };
    u16::from_le_bytes(bytes)
}

/// Writes `tag` at `p` as a little-endian u16.
unsafe fn write_tag(p: *mut u8, tag: u16) {
    let bytes = tag.to_le_bytes();
    // SAFETY: forwarded caller contract.
    unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), p, TAG_SIZE) };
}

/// Renders a scalar instance.
unsafe fn dump_builtin(out: &mut String, builtin: Builtin, source: *mut u8) {
    match builtin {
        Builtin::Bool => {
            // SAFETY: the instance occupies one initialized byte.
            let v = unsafe { *source };
            out.push_str(if v != 0 { "true" } else { "false" });
        }
        Builtin::I32 => {
            // SAFETY: the instance holds an initialized i32.
            let v = unsafe { read_scalar::<i32>(source) };
            write!(out, "{v}").unwrap();
        }
        Builtin::I64 => {
            // SAFETY: the instance holds an initialized i64.
            let v = unsafe { read_scalar::<i64>(source) };
            write!(out, "{v}").unwrap();
        }
        Builtin::Str => {
            // SAFETY: the instance holds a null pointer or a pointer to a
            // null-terminated string; null renders as empty.
            let p = unsafe { read_scalar::<*const c_char>(source) };
            if !p.is_null() {
                let s = unsafe { CStr::from_ptr(p) };
                out.push_str(&s.to_string_lossy());
            }
        }
    }
}

/// Reads a scalar from possibly-unaligned instance memory.
unsafe fn read_scalar<T: Copy>(p: *const u8) -> T {
    // SAFETY: forwarded caller contract.
    unsafe { (p as *const T).read_unaligned() }
}
