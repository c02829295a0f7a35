//! Fair-share ("water-filling") allocation of a bounded total.
//!
//! Parties are visited in ascending order of what they can give (or take).
//! Each receives the even share of what is still unallocated, or its whole
//! availability if that is smaller; the shortfall is then spread over the
//! parties not yet visited. Because the most constrained parties come first,
//! a single linear pass is enough.
//!
//! The share is recomputed after every party. For a party that took the even
//! share `s` out of `R` over `n` parties the next share is
//! `(R - s) / (n - 1) = s`, so this matches recomputing only after a party is
//! exhausted. In fixed point it also carries the division remainder forward:
//! the last party takes exactly what is left, and the shares sum to
//! `min(total, sum(availability))` with no drift.

use crate::fixed::{Amount, Fixed64};

/// Split `total` across `entries` (`(key, availability)` pairs).
///
/// Entries with no availability are dropped. The result is in allocation
/// order (ascending availability, ties in input order) and never gives a
/// party more than its availability.
pub fn water_fill<K: Copy>(total: Amount, entries: &[(K, Amount)]) -> Vec<(K, Amount)> {
    let mut ordered: Vec<(K, Amount)> = entries
        .iter()
        .copied()
        .filter(|&(_, available)| available > Fixed64::ZERO)
        .collect();
    // Stable sort: equal availabilities keep their insertion order.
    ordered.sort_by_key(|&(_, available)| available);

    let mut remaining = total.max(Fixed64::ZERO);
    let count = ordered.len();
    let mut shares = Vec::with_capacity(count);

    for (index, (key, available)) in ordered.into_iter().enumerate() {
        let left = Fixed64::from_num(count - index);
        let share = remaining / left;
        let take = available.min(share);
        remaining -= take;
        shares.push((key, take));
    }

    shares
}
