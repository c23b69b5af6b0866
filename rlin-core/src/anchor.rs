// Anchor adjustment
// Rotates a traversal order so it starts at the batch member closest to the
// already-labeled set, keeping the MST adjacency spine intact.

use crate::distance::compare_profiles;
use crate::store::LabeledSet;
use rlin_common::Profile;

/// Rotate `order` to begin at the member with the smallest distance to any
/// labeled profile. The prefix before the pivot is appended reversed, which
/// preserves neighbor adjacency across the seam. Ties keep the earliest
/// position. A singleton order or an empty labeled set passes through
/// unchanged.
pub fn anchor_order(order: Vec<usize>, profiles: &[Profile], labeled: &LabeledSet) -> Vec<usize> {
    if labeled.is_empty() || order.len() <= 1 {
        return order;
    }

    let mut best = f64::INFINITY;
    let mut pivot = 0;
    for (pos, &member) in order.iter().enumerate() {
        let mut nearest = f64::INFINITY;
        for entry in labeled.entries() {
            let d = compare_profiles(&profiles[member], &entry.profile).distance();
            if d < nearest {
                nearest = d;
            }
        }
        if nearest < best {
            best = nearest;
            pivot = pos;
        }
    }

    let mut rotated: Vec<usize> = order[pivot..].to_vec();
    rotated.extend(order[..pivot].iter().rev().copied());
    rotated
}
