//! Human-readable type table dump for debugging.

use std::fmt::Write as _;

use veld_core::align::round_up;

use crate::store::TypeStore;

/// Renders the store's type table.
///
/// One line per interned type: its id, description, and layout, or
/// `undefined` for declared-but-not-yet-defined entries.
pub fn dump(store: &TypeStore) -> String {
    let mut out = String::new();
    let w = width_for_count(store.len());

    writeln!(out, "[types]").unwrap();
    for ty in store.iter() {
        let description = store.describe(ty);
        match store.metatype(ty) {
            Ok(m) => {
                let stride = round_up(m.size(), m.alignment()).max(1);
                writeln!(
                    out,
                    "T{:0w$} {description} size={} align={} stride={stride} trivial={}",
                    ty.0,
                    m.size(),
                    m.alignment(),
                    m.trivial(),
                )
                .unwrap();
            }
            Err(_) => {
                writeln!(out, "T{:0w$} {description} undefined", ty.0).unwrap();
            }
        }
    }
    out
}

/// Digits needed to print indices up to `count`.
fn width_for_count(count: usize) -> usize {
    count.saturating_sub(1).max(1).ilog10() as usize + 1
}
