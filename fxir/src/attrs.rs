//! Persisted IR attributes.
//!
//! Attributes encode facts about functions, their return values, their
//! parameters, and individual call sites. They are stored on [`AttrList`]s
//! carried by function definitions, external declarations, and call
//! instructions. A deduction run reads them as pre-established ground truth
//! and appends the facts it managed to prove.
use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use strum::EnumDiscriminants;

/// A single attribute, possibly carrying a payload.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, EnumDiscriminants)]
#[strum_discriminants(name(AttrKind), derive(Hash, PartialOrd, Ord))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Attr {
    /// The annotated function or call never reaches a trapping operation.
    NoTrap,

    /// The annotated function never re-enters itself, directly or through
    /// other calls.
    NoRecurse,

    /// The annotated function eventually returns to its caller.
    WillReturn,

    /// The annotated pointer value is never null.
    NonNull,

    /// The annotated pointer value points to at least this many accessible
    /// bytes.
    Dereferenceable(u32),

    /// The annotated pointer value is aligned to this many bytes.
    Align(u32),
}

impl Attr {
    /// Return the payload-free kind of this attribute.
    pub fn kind(&self) -> AttrKind {
        self.into()
    }
}

impl AttrKind {
    /// Canonical name used when rendering attributes.
    pub fn name(&self) -> &'static str {
        match self {
            AttrKind::NoTrap => "notrap",
            AttrKind::NoRecurse => "norecurse",
            AttrKind::WillReturn => "willreturn",
            AttrKind::NonNull => "nonnull",
            AttrKind::Dereferenceable => "dereferenceable",
            AttrKind::Align => "align",
        }
    }
}

/// The attribute slot a position maps onto within an [`AttrList`].
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AttrSlot {
    /// Function-scope attributes.
    Function,
    /// Attributes of the returned value.
    Return,
    /// Attributes of the argument with the given index.
    Arg(u32),
}

/// Set of attributes attached to one slot.
///
/// At most one attribute per [`AttrKind`] is stored; adding an attribute of
/// a kind already present replaces the payload.
#[derive(Debug, Clone, Default, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AttrSet {
    attrs: SmallVec<[Attr; 4]>,
}

impl AttrSet {
    /// Returns true if an attribute of the given kind is present.
    pub fn has(&self, kind: AttrKind) -> bool {
        self.attrs.iter().any(|a| a.kind() == kind)
    }

    /// Return the attribute of the given kind, if present.
    pub fn get(&self, kind: AttrKind) -> Option<Attr> {
        self.attrs.iter().copied().find(|a| a.kind() == kind)
    }

    /// Insert an attribute, replacing any previous attribute of the same
    /// kind. Returns true if the set changed.
    pub fn add(&mut self, attr: Attr) -> bool {
        match self.attrs.iter_mut().find(|a| a.kind() == attr.kind()) {
            Some(existing) if *existing == attr => false,
            Some(existing) => {
                *existing = attr;
                true
            }
            None => {
                self.attrs.push(attr);
                true
            }
        }
    }

    /// Iterate over all attributes in the set.
    pub fn iter(&self) -> impl Iterator<Item = &Attr> {
        self.attrs.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }
}

/// Attribute lists group the slots of one function or call site.
///
/// Argument slots are allocated lazily; querying an argument slot that was
/// never written behaves like an empty set.
#[derive(Debug, Clone, Default, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AttrList {
    function: AttrSet,
    ret: AttrSet,
    args: BTreeMap<u32, AttrSet>,
}

impl AttrList {
    /// Return the set stored at `slot`, if any attributes were ever added.
    pub fn set(&self, slot: AttrSlot) -> Option<&AttrSet> {
        match slot {
            AttrSlot::Function => Some(&self.function),
            AttrSlot::Return => Some(&self.ret),
            AttrSlot::Arg(index) => self.args.get(&index),
        }
    }

    /// Return the mutable set stored at `slot`, allocating it on demand.
    pub fn set_mut(&mut self, slot: AttrSlot) -> &mut AttrSet {
        match slot {
            AttrSlot::Function => &mut self.function,
            AttrSlot::Return => &mut self.ret,
            AttrSlot::Arg(index) => self.args.entry(index).or_default(),
        }
    }

    /// Returns true if an attribute of `kind` is attached at `slot`.
    pub fn has(&self, slot: AttrSlot, kind: AttrKind) -> bool {
        self.set(slot).is_some_and(|s| s.has(kind))
    }

    /// Return the attribute of `kind` attached at `slot`, if present.
    pub fn get(&self, slot: AttrSlot, kind: AttrKind) -> Option<Attr> {
        self.set(slot).and_then(|s| s.get(kind))
    }

    /// Attach an attribute at `slot`. Returns true if the list changed.
    pub fn add(&mut self, slot: AttrSlot, attr: Attr) -> bool {
        self.set_mut(slot).add(attr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent_per_kind() {
        let mut set = AttrSet::default();
        assert!(set.add(Attr::NonNull));
        assert!(!set.add(Attr::NonNull));
        assert!(set.add(Attr::Dereferenceable(8)));
        // Same kind, new payload: replaced, reported as a change.
        assert!(set.add(Attr::Dereferenceable(16)));
        assert_eq!(
            set.get(AttrKind::Dereferenceable),
            Some(Attr::Dereferenceable(16))
        );
        assert_eq!(set.iter().count(), 2);
    }

    #[test]
    fn argument_slots_are_lazy() {
        let mut list = AttrList::default();
        assert!(list.set(AttrSlot::Arg(3)).is_none());
        assert!(list.add(AttrSlot::Arg(3), Attr::NonNull));
        assert!(list.has(AttrSlot::Arg(3), AttrKind::NonNull));
        assert!(!list.has(AttrSlot::Arg(0), AttrKind::NonNull));
    }
}
