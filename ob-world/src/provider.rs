use std::collections::HashMap;

use ob_protocol::shared::BlockPos;

use crate::iter::BlockIter;
use crate::palette::{AIR, BlockId};

/// Read access to the blocks the session currently knows about. Implementations
/// sit over whatever chunk storage the connection layer keeps.
pub trait WorldView {
    fn block_at(&self, pos: BlockPos) -> BlockId;

    /// Bulk fetch for a region, indexed per `BlockIter::index_of`.
    fn blocks_at(&self, iter: &BlockIter) -> Vec<BlockId> {
        let mut blocks = Vec::with_capacity(iter.len());
        for pos in iter.clone() {
            blocks.push(self.block_at(pos));
        }
        blocks
    }

    /// Lava in ultrawarm dimensions is thinner and pushes harder.
    fn ultrawarm(&self) -> bool {
        false
    }
}

/// Write access to the session block cache. Piston strokes rewrite the cache
/// so later collision sweeps see placeholders and final blocks.
pub trait WorldWrite {
    fn set_block(&mut self, pos: BlockPos, id: BlockId);
}

/// Sparse map-backed world for tests and the offline demo.
#[derive(Clone, Debug, Default)]
pub struct MapWorld {
    blocks: HashMap<BlockPos, BlockId>,
    ultrawarm: bool,
}

impl MapWorld {
    pub fn new() -> MapWorld {
        MapWorld::default()
    }

    pub fn set(&mut self, pos: BlockPos, id: BlockId) {
        if id == AIR {
            self.blocks.remove(&pos);
        } else {
            self.blocks.insert(pos, id);
        }
    }

    pub fn fill(&mut self, min: BlockPos, max: BlockPos, id: BlockId) {
        for pos in BlockIter::from_min_max(min, max) {
            self.set(pos, id);
        }
    }

    pub fn set_ultrawarm(&mut self, ultrawarm: bool) {
        self.ultrawarm = ultrawarm;
    }
}

impl WorldView for MapWorld {
    fn block_at(&self, pos: BlockPos) -> BlockId {
        self.blocks.get(&pos).copied().unwrap_or(AIR)
    }

    fn ultrawarm(&self) -> bool {
        self.ultrawarm
    }
}

impl WorldWrite for MapWorld {
    fn set_block(&mut self, pos: BlockPos, id: BlockId) {
        self.set(pos, id);
    }
}
