//! Pure assembly-order algebra.
//!
//! An assembly's order is a gap-free sequence of slide ids (positions
//! `0..n-1`). Each op is interpreted against the committed order it is applied
//! to: out-of-range positions are clamped rather than rejected, so a mutation
//! built against stale client state still lands somewhere sensible and the
//! client reconciles via the returned order.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A position-changing operation on an assembly's order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OrderOp {
    InsertItem { slide_id: Uuid, position: usize },
    MoveItem { from: usize, to: usize },
    RemoveItem { position: usize },
}

/// Apply `op` to `order` in place. Returns true when the order changed.
pub fn apply(order: &mut Vec<Uuid>, op: &OrderOp) -> bool {
    match *op {
        OrderOp::InsertItem { slide_id, position } => {
            // Re-inserting an already-present slide moves it instead of
            // duplicating it, keeping items unique per assembly.
            if let Some(from) = order.iter().position(|id| *id == slide_id) {
                let to = position.min(order.len().saturating_sub(1));
                if from == to {
                    return false;
                }
                let id = order.remove(from);
                order.insert(to.min(order.len()), id);
                return true;
            }
            let at = position.min(order.len());
            order.insert(at, slide_id);
            true
        }
        OrderOp::MoveItem { from, to } => {
            if order.is_empty() {
                return false;
            }
            let from = from.min(order.len() - 1);
            let to = to.min(order.len() - 1);
            if from == to {
                return false;
            }
            let id = order.remove(from);
            order.insert(to, id);
            true
        }
        OrderOp::RemoveItem { position } => {
            if position >= order.len() {
                return false;
            }
            order.remove(position);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    #[test]
    fn insert_at_position() {
        let mut order = ids(3);
        let original = order.clone();
        let new_id = Uuid::new_v4();
        assert!(apply(
            &mut order,
            &OrderOp::InsertItem {
                slide_id: new_id,
                position: 1
            }
        ));
        assert_eq!(order.len(), 4);
        assert_eq!(order[1], new_id);
        assert_eq!(order[0], original[0]);
        assert_eq!(order[2], original[1]);
    }

    #[test]
    fn insert_position_is_clamped_to_end() {
        let mut order = ids(2);
        let new_id = Uuid::new_v4();
        assert!(apply(
            &mut order,
            &OrderOp::InsertItem {
                slide_id: new_id,
                position: 99
            }
        ));
        assert_eq!(*order.last().unwrap(), new_id);
    }

    #[test]
    fn insert_existing_slide_moves_it() {
        let mut order = ids(3);
        let moved = order[2];
        assert!(apply(
            &mut order,
            &OrderOp::InsertItem {
                slide_id: moved,
                position: 0
            }
        ));
        assert_eq!(order.len(), 3);
        assert_eq!(order[0], moved);
    }

    #[test]
    fn move_item_to_front() {
        let mut order = ids(4);
        let moved = order[3];
        assert!(apply(&mut order, &OrderOp::MoveItem { from: 3, to: 0 }));
        assert_eq!(order[0], moved);
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn move_with_out_of_range_positions_clamps() {
        let mut order = ids(3);
        let last = order[2];
        assert!(apply(&mut order, &OrderOp::MoveItem { from: 99, to: 0 }));
        assert_eq!(order[0], last);
    }

    #[test]
    fn move_on_empty_order_is_a_noop() {
        let mut order: Vec<Uuid> = vec![];
        assert!(!apply(&mut order, &OrderOp::MoveItem { from: 0, to: 1 }));
    }

    #[test]
    fn move_to_same_position_is_a_noop() {
        let mut order = ids(3);
        let before = order.clone();
        assert!(!apply(&mut order, &OrderOp::MoveItem { from: 1, to: 1 }));
        assert_eq!(order, before);
    }

    #[test]
    fn remove_item() {
        let mut order = ids(3);
        let removed = order[1];
        assert!(apply(&mut order, &OrderOp::RemoveItem { position: 1 }));
        assert_eq!(order.len(), 2);
        assert!(!order.contains(&removed));
    }

    #[test]
    fn remove_out_of_range_is_a_noop() {
        let mut order = ids(2);
        let before = order.clone();
        assert!(!apply(&mut order, &OrderOp::RemoveItem { position: 5 }));
        assert_eq!(order, before);
    }

    #[test]
    fn concurrent_move_and_remove_both_land() {
        // Two editors race: "move item 3 to position 0" and "remove item 5".
        // Applied in arrival order against the committed state, both changes
        // are reflected in the final order.
        let mut order = ids(6);
        let moved = order[3];
        let removed = order[5];
        assert!(apply(&mut order, &OrderOp::MoveItem { from: 3, to: 0 }));
        // After the move, the old item 5 sits at position 5 still? It shifted:
        // [3,0,1,2,4,5] - the removed target is now at position 5.
        let pos = order.iter().position(|id| *id == removed).unwrap();
        assert!(apply(&mut order, &OrderOp::RemoveItem { position: pos }));
        assert_eq!(order.len(), 5);
        assert_eq!(order[0], moved);
        assert!(!order.contains(&removed));
    }

    /// Apply `ops` in sequence, recording the order published after each
    /// step, and check that a client replaying that log lands on every
    /// intermediate state and the final one.
    fn apply_and_check_log(initial: &[Uuid], ops: &[OrderOp]) -> Vec<Uuid> {
        let mut live = initial.to_vec();
        let mut log = Vec::new();
        for op in ops {
            apply(&mut live, op);
            let mut seen = live.clone();
            seen.sort();
            seen.dedup();
            assert_eq!(seen.len(), live.len(), "duplicate slide after {op:?}");
            log.push((op.clone(), live.clone()));
        }

        let mut replayed = initial.to_vec();
        for (op, published) in &log {
            apply(&mut replayed, op);
            assert_eq!(&replayed, published, "log diverged at {op:?}");
        }
        live
    }

    #[test]
    fn both_serialization_orders_of_racing_ops_replay_cleanly() {
        // Two editors submit concurrently; the coordinator picks an order.
        // Whichever wins, the published event log must replay to the same
        // states a late subscriber reconstructs, and no duplicate ever
        // appears mid-sequence.
        let initial = ids(5);
        let new_id = Uuid::new_v4();
        let pairs = vec![
            (
                OrderOp::MoveItem { from: 3, to: 0 },
                OrderOp::RemoveItem { position: 4 },
            ),
            (
                OrderOp::InsertItem {
                    slide_id: new_id,
                    position: 2,
                },
                OrderOp::MoveItem { from: 1, to: 4 },
            ),
            (
                OrderOp::RemoveItem { position: 0 },
                OrderOp::RemoveItem { position: 0 },
            ),
            (
                OrderOp::InsertItem {
                    slide_id: initial[4],
                    position: 0,
                },
                OrderOp::MoveItem { from: 4, to: 2 },
            ),
        ];

        for (a, b) in pairs {
            let ab = apply_and_check_log(&initial, &[a.clone(), b.clone()]);
            let ba = apply_and_check_log(&initial, &[b.clone(), a.clone()]);
            // Positional ops resolved against different committed states may
            // land differently, but the surviving set sizes agree.
            assert_eq!(ab.len(), ba.len(), "diverging lengths for {a:?} / {b:?}");
        }
    }
}
