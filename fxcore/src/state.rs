//! Lattice states shared by all props.
//!
//! A state tracks two bounds on the truth of a fact: `known` bits are
//! proven, `assumed` bits are optimistically believed. `known` is always a
//! subset of `assumed`; updates may only add known bits or remove assumed
//! bits, which guarantees monotonicity and thereby the existence of a
//! fixpoint. The fixpoint is reached when both encodings are equal. A
//! fixpoint can also be forced: an optimistic one promotes the assumed bits
//! to known, a pessimistic one retracts the assumed bits down to known.

/// Outcome of an update or manifestation step.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum ChangeStatus {
    Changed,
    Unchanged,
}

impl std::ops::BitOr for ChangeStatus {
    type Output = ChangeStatus;

    fn bitor(self, rhs: ChangeStatus) -> ChangeStatus {
        if self == ChangeStatus::Changed || rhs == ChangeStatus::Changed {
            ChangeStatus::Changed
        } else {
            ChangeStatus::Unchanged
        }
    }
}

impl std::ops::BitOrAssign for ChangeStatus {
    fn bitor_assign(&mut self, rhs: ChangeStatus) {
        *self = *self | rhs;
    }
}

impl std::ops::BitAnd for ChangeStatus {
    type Output = ChangeStatus;

    fn bitand(self, rhs: ChangeStatus) -> ChangeStatus {
        if self == ChangeStatus::Changed && rhs == ChangeStatus::Changed {
            ChangeStatus::Changed
        } else {
            ChangeStatus::Unchanged
        }
    }
}

/// Minimal interface the solver needs to drive a state to a fixpoint
/// without knowing its encoding.
pub trait AbstractState {
    /// Return whether this state holds any usable information. If false, no
    /// information provided by the owning prop should be used.
    fn is_valid_state(&self) -> bool;

    /// Return whether this state cannot change anymore by itself.
    fn is_at_fixpoint(&self) -> bool;

    /// Accept the currently assumed information as proven.
    ///
    /// Returns [`ChangeStatus::Unchanged`] as the assumed value does not
    /// change.
    fn indicate_optimistic_fixpoint(&mut self) -> ChangeStatus;

    /// Retract the assumed information down to what is proven.
    ///
    /// Returns [`ChangeStatus::Changed`] as the assumed value may change.
    fn indicate_pessimistic_fixpoint(&mut self) -> ChangeStatus;
}

/// Simple state with an integer bit encoding.
///
/// The interface ensures that the assumed bits always remain a superset of
/// the known bits. Users can only add known bits and, except through adding
/// known bits, only remove assumed bits. The all-zero encoding is the worst
/// state; the best (most optimistic) encoding is chosen at construction
/// time and defaults to all ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegerState {
    known: u32,
    assumed: u32,
}

impl IntegerState {
    /// Initialize the state with the given best (fully optimistic) encoding.
    pub fn new(best: u32) -> Self {
        IntegerState {
            known: Self::worst_state(),
            assumed: best,
        }
    }

    /// Return the worst possible representable state.
    pub const fn worst_state() -> u32 {
        0
    }

    /// Return the known state encoding.
    pub fn known(&self) -> u32 {
        self.known
    }

    /// Return the assumed state encoding.
    pub fn assumed(&self) -> u32 {
        self.assumed
    }

    /// Return true if all bits set in `bits` are known.
    pub fn is_known(&self, bits: u32) -> bool {
        (self.known & bits) == bits
    }

    /// Return true if all bits set in `bits` are assumed.
    pub fn is_assumed(&self, bits: u32) -> bool {
        (self.assumed & bits) == bits
    }

    /// Add the bits in `bits` to the known bits.
    pub fn add_known_bits(&mut self, bits: u32) -> &mut Self {
        // Make sure we never miss any known bits.
        self.assumed |= bits;
        self.known |= bits;
        self
    }

    /// Remove the bits in `bits` from the assumed bits, if not known.
    pub fn remove_assumed_bits(&mut self, bits: u32) -> &mut Self {
        // Make sure we never lose any known bits.
        self.assumed = (self.assumed & !bits) | self.known;
        self
    }

    /// Keep only assumed bits also set in `bits`, but all known ones.
    pub fn intersect_assumed_bits(&mut self, bits: u32) -> &mut Self {
        // Make sure we never lose any known bits.
        self.assumed = (self.assumed & bits) | self.known;
        self
    }

    /// Take the minimum of the assumed value and `value`, interpreted
    /// numerically.
    pub fn take_assumed_minimum(&mut self, value: u32) -> &mut Self {
        // Make sure we never lose the known value.
        self.assumed = self.assumed.min(value).max(self.known);
        self
    }

    /// Take the maximum of the known value and `value`, interpreted
    /// numerically.
    pub fn take_known_maximum(&mut self, value: u32) -> &mut Self {
        // Make sure we never lose the known value.
        self.assumed = self.assumed.max(value);
        self.known = self.known.max(value);
        self
    }

    /// Clamp this state with `other`: the assumed information becomes the
    /// minimum of both, but never less than what was known before.
    pub fn clamp(&mut self, other: &IntegerState) -> &mut Self {
        self.take_assumed_minimum(other.assumed)
    }

    /// Make this the minimum, known and assumed, of this state and `other`.
    pub fn meet(&mut self, other: &IntegerState) -> &mut Self {
        self.known = self.known.min(other.known);
        self.assumed = self.assumed.min(other.assumed);
        self
    }

    /// Make this the maximum, known and assumed, of this state and `other`.
    pub fn join(&mut self, other: &IntegerState) -> &mut Self {
        self.known = self.known.max(other.known);
        self.assumed = self.assumed.max(other.assumed);
        self
    }
}

impl Default for IntegerState {
    fn default() -> Self {
        IntegerState::new(u32::MAX)
    }
}

impl AbstractState for IntegerState {
    fn is_valid_state(&self) -> bool {
        self.assumed != Self::worst_state()
    }

    fn is_at_fixpoint(&self) -> bool {
        self.assumed == self.known
    }

    fn indicate_optimistic_fixpoint(&mut self) -> ChangeStatus {
        self.known = self.assumed;
        ChangeStatus::Unchanged
    }

    fn indicate_pessimistic_fixpoint(&mut self) -> ChangeStatus {
        self.assumed = self.known;
        ChangeStatus::Changed
    }
}

/// Simple wrapper for a single bit (boolean) state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BooleanState(IntegerState);

impl BooleanState {
    pub fn new() -> Self {
        BooleanState(IntegerState::new(1))
    }

    /// Return true if the fact is assumed to hold.
    pub fn is_assumed(&self) -> bool {
        self.0.is_assumed(1)
    }

    /// Return true if the fact is proven to hold.
    pub fn is_known(&self) -> bool {
        self.0.is_known(1)
    }

    /// Mark the fact as proven.
    pub fn set_known(&mut self) {
        self.0.add_known_bits(1);
    }

    /// Give up the optimistic assumption, unless the fact is proven.
    pub fn retract_assumed(&mut self) {
        self.0.remove_assumed_bits(1);
    }
}

impl Default for BooleanState {
    fn default() -> Self {
        BooleanState::new()
    }
}

impl std::ops::Deref for BooleanState {
    type Target = IntegerState;

    fn deref(&self) -> &IntegerState {
        &self.0
    }
}

impl std::ops::DerefMut for BooleanState {
    fn deref_mut(&mut self) -> &mut IntegerState {
        &mut self.0
    }
}

impl AbstractState for BooleanState {
    fn is_valid_state(&self) -> bool {
        self.0.is_valid_state()
    }

    fn is_at_fixpoint(&self) -> bool {
        self.0.is_at_fixpoint()
    }

    fn indicate_optimistic_fixpoint(&mut self) -> ChangeStatus {
        self.0.indicate_optimistic_fixpoint()
    }

    fn indicate_pessimistic_fixpoint(&mut self) -> ChangeStatus {
        self.0.indicate_pessimistic_fixpoint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_bits_are_never_lost() {
        let mut state = IntegerState::new(0b1111);
        state.add_known_bits(0b0011);
        assert_eq!(state.known(), 0b0011);
        assert_eq!(state.assumed(), 0b1111);

        state.remove_assumed_bits(0b0110);
        assert_eq!(state.known(), 0b0011);
        assert_eq!(state.assumed(), 0b1011);

        state.intersect_assumed_bits(0b0001);
        assert_eq!(state.assumed(), 0b0011);
        assert!(state.is_known(0b0011));
    }

    #[test]
    fn numeric_minimum_respects_known_floor() {
        let mut state = IntegerState::new(64);
        state.take_known_maximum(8);
        state.take_assumed_minimum(4);
        assert_eq!(state.assumed(), 8);
        assert_eq!(state.known(), 8);
        assert!(state.is_at_fixpoint());
    }

    #[test]
    fn optimistic_fixpoint_promotes_assumed() {
        let mut state = BooleanState::new();
        assert!(state.is_assumed());
        assert!(!state.is_known());
        assert!(!state.is_at_fixpoint());

        assert_eq!(
            state.indicate_optimistic_fixpoint(),
            ChangeStatus::Unchanged
        );
        assert!(state.is_known());
        assert!(state.is_at_fixpoint());
    }

    #[test]
    fn pessimistic_fixpoint_retracts_to_known() {
        let mut state = IntegerState::new(0b111);
        state.add_known_bits(0b001);
        assert_eq!(state.indicate_pessimistic_fixpoint(), ChangeStatus::Changed);
        assert_eq!(state.assumed(), 0b001);
        assert_eq!(state.known(), 0b001);
        assert!(state.is_at_fixpoint());
        // Still valid: one bit survived as proven.
        assert!(state.is_valid_state());
    }

    #[test]
    fn worst_state_is_invalid() {
        let mut state = BooleanState::new();
        state.retract_assumed();
        assert!(!state.is_valid_state());
        assert!(state.is_at_fixpoint());
    }

    #[test]
    fn change_status_combinators() {
        use ChangeStatus::*;
        assert_eq!(Changed | Unchanged, Changed);
        assert_eq!(Unchanged | Unchanged, Unchanged);
        assert_eq!(Changed & Unchanged, Unchanged);
        assert_eq!(Changed & Changed, Changed);
    }
}
