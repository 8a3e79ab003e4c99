//! Arena octree of stock boxes.
//!
//! Nodes live in a [`SlotMap`] and refer to each other by [`NodeKey`]. A
//! leaf that needs more resolution is replaced in place by a branch, so the
//! key a parent holds stays valid; deleted nodes are removed from the arena
//! and their keys go stale.

use slotmap::{new_key_type, SlotMap};
use thiserror::Error;
use tracing::trace;
use vmill_kernel_geom::{
    get_adjacent_down, get_adjacent_up, Axis, Corner, DescentStep, Direction, ShiftedBox,
};
use vmill_kernel_math::Point3;

use crate::voxel::VoxelInfo;
use crate::StockSimError;

new_key_type! {
    /// Stable handle to an octree node.
    pub struct NodeKey;
}

/// Errors from octree queries.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OctreeError {
    /// The queried box is not inside the root volume.
    #[error("box {min:?}..{max:?} lies outside the stock volume")]
    OutsideRoot {
        /// Query box minimum.
        min: [f64; 3],
        /// Query box maximum.
        max: [f64; 3],
    },
}

/// Hands out node ids. Ids are never reused, including across trees sharing
/// one allocator.
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    /// Allocator starting at id 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocator starting at `first`.
    pub fn starting_at(first: u64) -> Self {
        Self { next: first }
    }

    /// Take the next id.
    pub fn allocate(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// The id the next call to [`allocate`](Self::allocate) returns.
    pub fn peek(&self) -> u64 {
        self.next
    }
}

/// Branch or leaf payload.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Interior node. A `None` child was deleted.
    Branch {
        /// Children indexed by octant.
        children: [Option<NodeKey>; 8],
    },
    /// Terminal node carrying cut state.
    Leaf {
        /// Removed-corner record.
        voxel: VoxelInfo,
    },
}

/// A node of the stock octree.
#[derive(Debug, Clone, PartialEq)]
pub struct OctreeNode {
    bbox: ShiftedBox,
    depth: u32,
    parent: Option<NodeKey>,
    child_index: Option<Corner>,
    id: u64,
    first_change_version: u64,
    kind: NodeKind,
}

impl OctreeNode {
    /// Region of the stock this node covers.
    pub fn bbox(&self) -> &ShiftedBox {
        &self.bbox
    }

    /// Depth below the root (root = 0).
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Parent key; `None` for the root.
    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    /// Octant of the parent this node occupies; `None` for the root.
    pub fn child_index(&self) -> Option<Corner> {
        self.child_index
    }

    /// Unique id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Version at which this node or a descendant last changed.
    pub fn first_change_version(&self) -> u64 {
        self.first_change_version
    }

    /// Branch or leaf payload.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// True for leaves.
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    /// True for branches.
    pub fn is_branch(&self) -> bool {
        matches!(self.kind, NodeKind::Branch { .. })
    }

    /// Cut state, for leaves.
    pub fn voxel(&self) -> Option<&VoxelInfo> {
        match &self.kind {
            NodeKind::Leaf { voxel } => Some(voxel),
            NodeKind::Branch { .. } => None,
        }
    }

    /// Child slots, for branches.
    pub fn children(&self) -> Option<&[Option<NodeKey>; 8]> {
        match &self.kind {
            NodeKind::Branch { children } => Some(children),
            NodeKind::Leaf { .. } => None,
        }
    }

    /// Bit `i` is set when child `i` is present. Zero for leaves.
    pub fn child_mask(&self) -> u8 {
        self.children().map_or(0, |children| {
            children
                .iter()
                .zip(Corner::ALL)
                .filter(|(c, _)| c.is_some())
                .fold(0, |mask, (_, corner)| mask | corner.bit())
        })
    }
}

/// A consumer's view of the version stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VersionInfo {
    /// Last version the consumer has already seen.
    pub min_change_version: u64,
    /// Version of the tree when the query was made.
    pub curr_version: u64,
}

impl VersionInfo {
    /// Whether `node` changed after the consumer's last sync.
    pub fn is_changed(&self, node: &OctreeNode) -> bool {
        node.first_change_version > self.min_change_version
    }
}

/// The stock octree.
#[derive(Debug, Clone)]
pub struct Octree {
    nodes: SlotMap<NodeKey, OctreeNode>,
    root: NodeKey,
    max_depth: u32,
    version: u64,
    ids: IdAllocator,
}

impl Octree {
    /// Build a tree over `bbox`. The root is refined immediately, so a
    /// fresh tree has one branch and eight leaves.
    pub fn new(bbox: ShiftedBox, max_depth: u32, ids: IdAllocator) -> Result<Self, StockSimError> {
        if max_depth <= 1 {
            return Err(StockSimError::MaxDepthTooSmall(max_depth));
        }
        let mut ids = ids;
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(OctreeNode {
            bbox,
            depth: 0,
            parent: None,
            child_index: None,
            id: ids.allocate(),
            first_change_version: 0,
            kind: NodeKind::Leaf {
                voxel: VoxelInfo::new(),
            },
        });
        let mut tree = Self {
            nodes,
            root,
            max_depth,
            version: 0,
            ids,
        };
        tree.push_leaf(root);
        Ok(tree)
    }

    /// Root key. The root is always a branch.
    pub fn root(&self) -> NodeKey {
        self.root
    }

    /// Deepest level leaves may reach.
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Current global version.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Start a new version and return it.
    pub fn advance_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    /// Version window for a consumer that last synced at `min_change_version`.
    pub fn version_info(&self, min_change_version: u64) -> VersionInfo {
        VersionInfo {
            min_change_version,
            curr_version: self.version,
        }
    }

    /// Id allocator state, e.g. to seed another tree.
    pub fn ids(&self) -> &IdAllocator {
        &self.ids
    }

    /// Node lookup. `None` for deleted nodes.
    pub fn get(&self, key: NodeKey) -> Option<&OctreeNode> {
        self.nodes.get(key)
    }

    /// Node lookup on a key the caller knows is live.
    ///
    /// # Panics
    ///
    /// Panics if the node was deleted.
    pub fn node(&self, key: NodeKey) -> &OctreeNode {
        &self.nodes[key]
    }

    /// Mutable cut state of a live leaf.
    ///
    /// # Panics
    ///
    /// Panics if `key` is not a live leaf.
    pub fn voxel_mut(&mut self, key: NodeKey) -> &mut VoxelInfo {
        match &mut self.nodes[key].kind {
            NodeKind::Leaf { voxel } => voxel,
            NodeKind::Branch { .. } => panic!("voxel_mut called on a branch"),
        }
    }

    /// Build the eight children of `leaf`, not yet linked into the tree.
    ///
    /// Each child is seeded with the parent corner it shares and stamped
    /// with the current version.
    ///
    /// # Panics
    ///
    /// Panics if `leaf` is not a live leaf.
    pub fn create_level(&mut self, leaf: NodeKey) -> [OctreeNode; 8] {
        let node = &self.nodes[leaf];
        let parent_voxel = match &node.kind {
            NodeKind::Leaf { voxel } => *voxel,
            NodeKind::Branch { .. } => panic!("create_level called on a branch"),
        };
        let octants = node.bbox.split();
        let depth = node.depth + 1;
        let version = self.version;
        let ids = &mut self.ids;
        Corner::ALL.map(|corner| OctreeNode {
            bbox: octants[corner.index()],
            depth,
            parent: Some(leaf),
            child_index: Some(corner),
            id: ids.allocate(),
            first_change_version: version,
            kind: NodeKind::Leaf {
                voxel: VoxelInfo::inherited(&parent_voxel, corner),
            },
        })
    }

    /// Replace `leaf` by a branch over eight new leaves and return their keys.
    ///
    /// The branch keeps the leaf's key and gets a fresh id.
    ///
    /// # Panics
    ///
    /// Panics if `leaf` is not a live leaf or is already at `max_depth`.
    pub fn push_leaf(&mut self, leaf: NodeKey) -> [NodeKey; 8] {
        assert!(
            self.nodes[leaf].depth < self.max_depth,
            "push_leaf beyond max depth"
        );
        let children = self.create_level(leaf).map(|child| self.nodes.insert(child));
        let id = self.ids.allocate();
        let node = &mut self.nodes[leaf];
        trace!(old_id = node.id, new_id = id, depth = node.depth, "push leaf");
        node.id = id;
        node.kind = NodeKind::Branch {
            children: children.map(Some),
        };
        self.set_first_change_version(leaf);
        children
    }

    /// Remove a leaf and return it.
    ///
    /// # Panics
    ///
    /// Panics if `leaf` is not a live leaf.
    pub fn delete_leaf(&mut self, leaf: NodeKey) -> OctreeNode {
        assert!(self.nodes[leaf].is_leaf(), "delete_leaf called on a branch");
        self.detach(leaf)
    }

    /// Remove a branch together with its whole subtree and return the
    /// branch node.
    ///
    /// # Panics
    ///
    /// Panics if `branch` is not a live branch or is the root.
    pub fn delete_branch(&mut self, branch: NodeKey) -> OctreeNode {
        assert!(
            self.nodes[branch].is_branch(),
            "delete_branch called on a leaf"
        );
        let mut stack: Vec<NodeKey> = self.nodes[branch]
            .children()
            .into_iter()
            .flatten()
            .flatten()
            .copied()
            .collect();
        while let Some(key) = stack.pop() {
            if let Some(node) = self.nodes.remove(key) {
                stack.extend(node.children().into_iter().flatten().flatten());
            }
        }
        self.detach(branch)
    }

    fn detach(&mut self, key: NodeKey) -> OctreeNode {
        assert!(key != self.root, "the root cannot be deleted");
        let node = self.nodes.remove(key).expect("detach on a stale key");
        let (Some(parent), Some(corner)) = (node.parent, node.child_index) else {
            unreachable!("non-root node without a parent");
        };
        if let NodeKind::Branch { children } = &mut self.nodes[parent].kind {
            children[corner.index()] = None;
        }
        self.set_first_change_version(parent);
        node
    }

    /// Mark a leaf whose cut state changed.
    pub fn update_data(&mut self, leaf: NodeKey) {
        self.set_first_change_version(leaf);
    }

    /// Stamp `key` and its ancestors with the current version.
    ///
    /// Stops at the first ancestor already stamped, since everything above
    /// it is stamped too.
    pub fn set_first_change_version(&mut self, key: NodeKey) {
        let version = self.version;
        let mut current = Some(key);
        while let Some(k) = current {
            let node = &mut self.nodes[k];
            if node.first_change_version == version && k != key {
                break;
            }
            node.first_change_version = version;
            current = node.parent;
        }
    }

    /// Deepest live node whose region contains `bbox`.
    ///
    /// # Panics
    ///
    /// Panics if the tree no longer partitions its volume.
    pub fn locate(&self, bbox: &ShiftedBox) -> Result<NodeKey, OctreeError> {
        let root = &self.nodes[self.root];
        if !root.bbox.contains_box(bbox) {
            return Err(OctreeError::OutsideRoot {
                min: bbox.min().coords.into(),
                max: bbox.max().coords.into(),
            });
        }
        let target = bbox.center();
        let mut current = self.root;
        while let Some(child) = self.child_toward(current, &target) {
            if !self.nodes[child].bbox.contains_box(bbox) {
                break;
            }
            current = child;
        }
        Ok(current)
    }

    /// Deepest live node containing `p`. A branch is returned when the
    /// octant holding `p` was removed.
    pub fn locate_point(&self, p: &Point3) -> Result<NodeKey, OctreeError> {
        if !self.nodes[self.root].bbox.contains_point(p) {
            return Err(OctreeError::OutsideRoot {
                min: p.coords.into(),
                max: p.coords.into(),
            });
        }
        let mut current = self.root;
        while let Some(child) = self.child_toward(current, p) {
            current = child;
        }
        Ok(current)
    }

    fn child_toward(&self, key: NodeKey, target: &Point3) -> Option<NodeKey> {
        let node = &self.nodes[key];
        let children = node.children()?;
        let c = node.bbox.center();
        let index = usize::from(target.x >= c.x)
            | usize::from(target.y >= c.y) << 1
            | usize::from(target.z >= c.z) << 2;
        let child = children[index]?;
        assert!(
            self.nodes[child].bbox.contains_point(target),
            "octant {index} does not contain a point of its parent's half"
        );
        Some(child)
    }

    /// Face neighbor of `key` along `axis` in `direction`.
    ///
    /// Returns the same-size neighbor, a coarser leaf covering it, or `None`
    /// when the neighbor lies outside the stock or was removed.
    pub fn neighbor(&self, key: NodeKey, axis: Axis, direction: Direction) -> Option<NodeKey> {
        let ancestry = std::iter::successors(Some(key), |&k| self.nodes[k].parent)
            .map_while(|k| self.nodes[k].child_index);
        let path = get_adjacent_up(ancestry, axis, direction)?;
        let mut ancestor = key;
        for _ in 0..path.levels_up {
            ancestor = self.nodes[ancestor].parent?;
        }
        get_adjacent_down(ancestor, &path, |node, corner| {
            match &self.nodes[node].kind {
                NodeKind::Leaf { .. } => DescentStep::Leaf,
                NodeKind::Branch { children } => match children[corner.index()] {
                    Some(child) => DescentStep::Into(child),
                    None => DescentStep::Missing,
                },
            }
        })
    }

    /// Leaves changed after `info.min_change_version`. Unchanged subtrees
    /// are skipped.
    pub fn changed_leaves(&self, info: &VersionInfo) -> Vec<NodeKey> {
        let mut out = Vec::new();
        let mut stack = vec![self.root];
        while let Some(key) = stack.pop() {
            let node = &self.nodes[key];
            if !info.is_changed(node) {
                continue;
            }
            match &node.kind {
                NodeKind::Leaf { .. } => out.push(key),
                NodeKind::Branch { children } => stack.extend(children.iter().flatten()),
            }
        }
        out
    }

    /// All live leaves.
    pub fn leaves(&self) -> impl Iterator<Item = (NodeKey, &OctreeNode)> {
        self.nodes.iter().filter(|(_, n)| n.is_leaf())
    }

    /// Number of live leaves.
    pub fn leaf_count(&self) -> usize {
        self.leaves().count()
    }

    /// Number of live nodes, branches included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Depth of the deepest live leaf.
    pub fn max_leaf_depth(&self) -> u32 {
        self.leaves().map(|(_, n)| n.depth).max().unwrap_or(0)
    }

    /// Total volume of live leaves.
    pub fn live_volume(&self) -> f64 {
        self.leaves().map(|(_, n)| n.bbox.volume()).sum()
    }
}
