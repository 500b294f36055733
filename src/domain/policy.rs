//! Visibility policy for public links.

/// Returns true if one more link may become public under `cap`.
///
/// `public_count` is the number of links currently public in local state,
/// optimistic rows included, so a pending make-public already consumes a
/// slot.
pub fn can_make_public(public_count: usize, cap: usize) -> bool {
    public_count < cap
}

/// Free public slots under `cap`. Saturates at zero when remote state
/// briefly exceeds the cap (e.g. after the cap was lowered).
pub fn remaining_public_slots(public_count: usize, cap: usize) -> usize {
    cap.saturating_sub(public_count)
}
