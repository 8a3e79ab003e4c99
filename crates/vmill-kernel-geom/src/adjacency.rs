//! Neighbor lookup between octants.
//!
//! An octant's face neighbor along an axis is the octant with that axis bit
//! flipped. If the move stays inside the parent the neighbor is a sibling
//! ([`Adjacency::Local`]); otherwise it lives under another parent
//! ([`Adjacency::Extern`]) and the search has to climb until some ancestor
//! step is local, then descend the mirrored path on the other side.

use crate::shifted_box::{Axis, Corner, Direction};

/// Whether a neighboring octant shares the same parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Adjacency {
    /// Sibling under the same parent.
    Local,
    /// Outside the current parent.
    Extern,
}

const fn build_adjacency_table() -> [[[(u8, Adjacency); 2]; 3]; 8] {
    let mut table = [[[(0u8, Adjacency::Local); 2]; 3]; 8];
    let mut corner = 0;
    while corner < 8 {
        let mut axis = 0;
        while axis < 3 {
            let on_max_side = (corner >> axis) & 1 == 1;
            let neighbor = (corner ^ (1 << axis)) as u8;
            table[corner][axis][0] = (
                neighbor,
                if on_max_side { Adjacency::Local } else { Adjacency::Extern },
            );
            table[corner][axis][1] = (
                neighbor,
                if on_max_side { Adjacency::Extern } else { Adjacency::Local },
            );
            axis += 1;
        }
        corner += 1;
    }
    table
}

/// `ADJACENCY_TABLE[corner][axis][direction]` = (neighbor corner, adjacency).
pub const ADJACENCY_TABLE: [[[(u8, Adjacency); 2]; 3]; 8] = build_adjacency_table();

/// Neighbor of octant `corner` one step along `axis` in `direction`.
#[inline]
pub fn get_adjacent(corner: Corner, axis: Axis, direction: Direction) -> (Corner, Adjacency) {
    let (neighbor, adjacency) = ADJACENCY_TABLE[corner.index()][axis.index()][direction as usize];
    (Corner::ALL[neighbor as usize], adjacency)
}

/// Result of the upward half of a neighbor search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborPath {
    /// How many levels above the start node the common ancestor sits.
    pub levels_up: usize,
    /// Octants to follow from the common ancestor, top-down.
    pub descent: Vec<Corner>,
}

/// Climb from a node towards the root looking for a local step.
///
/// `ancestry` yields the child index of the start node, then of its parent,
/// and so on up to (but excluding) the root. Returns `None` when every step
/// is external, i.e. the neighbor would lie outside the root.
pub fn get_adjacent_up(
    ancestry: impl IntoIterator<Item = Corner>,
    axis: Axis,
    direction: Direction,
) -> Option<NeighborPath> {
    let mut mirrored = Vec::new();
    for (level, corner) in ancestry.into_iter().enumerate() {
        let (neighbor, adjacency) = get_adjacent(corner, axis, direction);
        mirrored.push(neighbor);
        if adjacency == Adjacency::Local {
            mirrored.reverse();
            return Some(NeighborPath {
                levels_up: level + 1,
                descent: mirrored,
            });
        }
    }
    None
}

/// What the tree reports when asked for a child during descent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescentStep<N> {
    /// Continue into this child.
    Into(N),
    /// The current node is a leaf; it covers the rest of the path.
    Leaf,
    /// The child slot is empty (material was removed).
    Missing,
}

/// Replay a [`NeighborPath`] downward from the common ancestor.
///
/// Returns the deepest node reached: the same-size neighbor, a coarser leaf
/// covering it, or `None` when the region has been deleted.
pub fn get_adjacent_down<N: Copy>(
    ancestor: N,
    path: &NeighborPath,
    mut step: impl FnMut(N, Corner) -> DescentStep<N>,
) -> Option<N> {
    let mut current = ancestor;
    for &corner in &path.descent {
        match step(current, corner) {
            DescentStep::Into(child) => current = child,
            DescentStep::Leaf => return Some(current),
            DescentStep::Missing => return None,
        }
    }
    Some(current)
}
