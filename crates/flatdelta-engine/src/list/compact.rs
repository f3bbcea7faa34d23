//! Pairwise compaction of a pending list log.
//!
//! The log is an index-addressed `Vec`; the walk mutates it in place. For
//! each record the scan looks up the next record concerning the same item
//! and, when the pair matches a merge rule, rewrites or drops them:
//!
//! | current | next            | outcome                                     |
//! |---------|-----------------|---------------------------------------------|
//! | Insert  | Move            | one Insert at the Move's destination        |
//! | Insert  | Replace         | keep the Insert (it carries the new value)  |
//! | Insert  | Remove          | both cancel                                 |
//! | Move    | Move / Remove   | drop the first Move, rebase the later one   |
//! | Move    | (no-op)         | dropped                                     |
//! | Replace | Replace/Remove  | drop the first Replace                      |
//! | Modify  | anything but Move | drop the Modify                           |
//!
//! Records lying between a merged pair concern other items, but their index
//! operands were computed against a list in which the merged item sat at a
//! particular position. Merging changes where (or whether) that item exists
//! during the span, so every record in between is rebased: first *excluded*
//! (re-expressed against the list without the item), then, if the item still
//! exists in the rewritten log, *included* at its new position.
//!
//! Because a merge can enable another merge for an item whose earlier record
//! was already passed, the scan resumes from that item's previous record
//! after every merge.

use flatdelta_types::DeltaOperation;

/// Positional view of one pending record.
///
/// `K` identifies the backing record so the caller can release dropped
/// records and write rebased operands back; `I` is the item identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingOp<K, I> {
    pub key: K,
    pub op: DeltaOperation,
    pub item: Option<I>,
    pub current_index: usize,
    pub new_index: usize,
}

/// Compact `log` in place and return the keys of every dropped record.
pub fn compact<K: Copy, I: Copy + Eq>(log: &mut Vec<PendingOp<K, I>>) -> Vec<K> {
    let mut dropped = Vec::new();
    loop {
        let before = log.len();
        pass(log, &mut dropped);
        if log.len() == before {
            return dropped;
        }
    }
}

fn pass<K: Copy, I: Copy + Eq>(log: &mut Vec<PendingOp<K, I>>, dropped: &mut Vec<K>) {
    let mut i = 0;
    while i < log.len() {
        let current = log[i];
        if is_noop_move(&current) {
            dropped.push(log.remove(i).key);
            i = resume_at(log, i, current.item);
            continue;
        }
        let Some(item) = current.item else {
            i += 1;
            continue;
        };
        let Some(j) = next_for(log, i, item) else {
            i += 1;
            continue;
        };
        if merge(log, i, j, dropped) {
            i = resume_at(log, i, Some(item));
        } else {
            i += 1;
        }
    }
}

fn next_for<K, I: Copy + Eq>(log: &[PendingOp<K, I>], i: usize, item: I) -> Option<usize> {
    log[i + 1..]
        .iter()
        .position(|r| r.item == Some(item))
        .map(|offset| i + 1 + offset)
}

/// Position of the item's last record before `i`, or `i` itself.
fn resume_at<K, I: Copy + Eq>(log: &[PendingOp<K, I>], i: usize, item: Option<I>) -> usize {
    item.and_then(|it| log[..i].iter().rposition(|r| r.item == Some(it)))
        .unwrap_or(i)
}

fn merge<K: Copy, I: Copy>(
    log: &mut Vec<PendingOp<K, I>>,
    p: usize,
    q: usize,
    dropped: &mut Vec<K>,
) -> bool {
    use DeltaOperation::{Insert, Modify, Move, Remove, Replace};

    match (log[p].op, log[q].op) {
        (Insert, Move) => {
            let mut x = log[p].new_index;
            for k in p + 1..q {
                exclude(&mut log[k], &mut x);
            }
            let (_, destination) = move_parts(&log[q]);
            let collapsed = &mut log[q];
            collapsed.op = Insert;
            collapsed.current_index = 0;
            collapsed.new_index = destination;
            dropped.push(log.remove(p).key);
        }
        (Insert, Replace) => {
            dropped.push(log.remove(q).key);
        }
        (Insert, Remove) => {
            let mut x = log[p].new_index;
            for k in p + 1..q {
                exclude(&mut log[k], &mut x);
            }
            dropped.push(log.remove(q).key);
            dropped.push(log.remove(p).key);
        }
        (Move, Move) | (Move, Remove) => {
            let (origin, target) = move_parts(&log[p]);
            // x follows the item as the log had it; y follows it as if the
            // first move never happened.
            let mut x = target;
            let mut y = origin;
            for k in p + 1..q {
                exclude(&mut log[k], &mut x);
                include(&mut log[k], &mut y);
            }
            let later = &mut log[q];
            if later.op == Move {
                let (_, destination) = move_parts(later);
                set_move(later, y, destination);
            } else {
                later.current_index = y;
            }
            dropped.push(log.remove(p).key);
        }
        (Replace, Replace) | (Replace, Remove) => {
            dropped.push(log.remove(p).key);
        }
        (Modify, next) if next != Move => {
            dropped.push(log.remove(p).key);
        }
        _ => return false,
    }
    true
}

/// A move whose removal and reinsertion land on the same position.
pub fn is_noop_move<K, I>(rec: &PendingOp<K, I>) -> bool {
    rec.op == DeltaOperation::Move
        && (rec.new_index == rec.current_index || rec.new_index == rec.current_index + 1)
}

/// Split a move into (removal index, reinsertion index after removal).
fn move_parts<K, I>(rec: &PendingOp<K, I>) -> (usize, usize) {
    let c = rec.current_index;
    let n = rec.new_index;
    (c, if n > c { n - 1 } else { n })
}

fn set_move<K, I>(rec: &mut PendingOp<K, I>, removal: usize, reinsertion: usize) {
    rec.current_index = removal;
    rec.new_index = if reinsertion >= removal {
        reinsertion + 1
    } else {
        reinsertion
    };
}

/// Re-express `rec` against the list without the tracked item, which sits
/// at `*x` before `rec` runs. Advances `*x` past `rec`.
fn exclude<K, I>(rec: &mut PendingOp<K, I>, x: &mut usize) {
    let shift_out = |a: usize, x: usize| if a > x { a - 1 } else { a };
    match rec.op {
        DeltaOperation::Insert => {
            let a = rec.new_index;
            rec.new_index = shift_out(a, *x);
            if a <= *x {
                *x += 1;
            }
        }
        DeltaOperation::Remove => {
            let a = rec.current_index;
            rec.current_index = shift_out(a, *x);
            if a < *x {
                *x -= 1;
            }
        }
        DeltaOperation::Replace | DeltaOperation::Modify => {
            rec.current_index = shift_out(rec.current_index, *x);
        }
        DeltaOperation::Move => {
            let (c, d) = move_parts(rec);
            let removal = shift_out(c, *x);
            let x1 = if c < *x { *x - 1 } else { *x };
            let reinsertion = if d > x1 { d - 1 } else { d };
            *x = if d <= x1 { x1 + 1 } else { x1 };
            set_move(rec, removal, reinsertion);
        }
        DeltaOperation::Clear => {}
    }
}

/// Re-express `rec`, written against the list without the tracked item,
/// against the list where the item has `*y` predecessors. Inserts landing
/// exactly at the item's position go before it. Advances `*y` past `rec`.
fn include<K, I>(rec: &mut PendingOp<K, I>, y: &mut usize) {
    let shift_in = |a: usize, y: usize| if a >= y { a + 1 } else { a };
    match rec.op {
        DeltaOperation::Insert => {
            let a = rec.new_index;
            rec.new_index = if a > *y { a + 1 } else { a };
            if a <= *y {
                *y += 1;
            }
        }
        DeltaOperation::Remove => {
            let a = rec.current_index;
            rec.current_index = shift_in(a, *y);
            if a < *y {
                *y -= 1;
            }
        }
        DeltaOperation::Replace | DeltaOperation::Modify => {
            rec.current_index = shift_in(rec.current_index, *y);
        }
        DeltaOperation::Move => {
            let (c, d) = move_parts(rec);
            let removal = shift_in(c, *y);
            let y1 = if c < *y { *y - 1 } else { *y };
            let reinsertion = if d > y1 { d + 1 } else { d };
            *y = if d <= y1 { y1 + 1 } else { y1 };
            set_move(rec, removal, reinsertion);
        }
        DeltaOperation::Clear => {}
    }
}
