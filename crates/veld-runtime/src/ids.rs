//! Store index newtypes.

/// Canonical identity of an interned type.
///
/// A `TypeId` is an index into its store's entry table; comparing two ids
/// obtained from the same store compares type identity in O(1). Ids are
/// stable for the store's lifetime and meaningless in any other store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(transparent)]
pub struct TypeId(pub u32);

impl TypeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}
