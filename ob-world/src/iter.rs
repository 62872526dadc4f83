use ob_protocol::shared::BlockPos;

/// Iterator over an inclusive block region, x first, then z, then y. The
/// sequence position doubles as the index into a block array fetched for
/// the same region, so lookups and bulk fetches stay in step.
#[derive(Clone, Debug)]
pub struct BlockIter {
    start: BlockPos,
    size_x: i32,
    size_y: i32,
    size_z: i32,
    i: i32,
}

impl BlockIter {
    pub fn from_min_max(min: BlockPos, max: BlockPos) -> BlockIter {
        BlockIter {
            start: min,
            size_x: (max.x - min.x + 1).max(0),
            size_y: (max.y - min.y + 1).max(0),
            size_z: (max.z - min.z + 1).max(0),
            i: 0,
        }
    }

    pub fn min(&self) -> BlockPos {
        self.start
    }

    pub fn max(&self) -> BlockPos {
        BlockPos::new(
            self.start.x + self.size_x - 1,
            self.start.y + self.size_y - 1,
            self.start.z + self.size_z - 1,
        )
    }

    /// Total number of blocks in the region, not the number left to yield.
    pub fn len(&self) -> usize {
        (self.size_x * self.size_y * self.size_z) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Array index of a position inside the region, or None when outside.
    pub fn index_of(&self, pos: BlockPos) -> Option<usize> {
        let dx = pos.x - self.start.x;
        let dy = pos.y - self.start.y;
        let dz = pos.z - self.start.z;
        if dx < 0 || dx >= self.size_x || dy < 0 || dy >= self.size_y || dz < 0 || dz >= self.size_z
        {
            return None;
        }
        Some((dx + self.size_x * (dz + self.size_z * dy)) as usize)
    }

    pub fn contains_region(&self, min: BlockPos, max: BlockPos) -> bool {
        self.index_of(min).is_some() && self.index_of(max).is_some()
    }
}

impl Iterator for BlockIter {
    type Item = BlockPos;

    fn next(&mut self) -> Option<BlockPos> {
        if self.i as usize >= self.len() {
            return None;
        }
        let i = self.i;
        self.i += 1;
        Some(BlockPos::new(
            self.start.x + i % self.size_x,
            self.start.y + i / (self.size_x * self.size_z),
            self.start.z + (i / self.size_x) % self.size_z,
        ))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.len().saturating_sub(self.i as usize);
        (left, Some(left))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_x_then_z_then_y() {
        let iter = BlockIter::from_min_max(BlockPos::new(0, 0, 0), BlockPos::new(1, 1, 1));
        let positions: Vec<BlockPos> = iter.collect();
        assert_eq!(positions.len(), 8);
        assert_eq!(positions[0], BlockPos::new(0, 0, 0));
        assert_eq!(positions[1], BlockPos::new(1, 0, 0));
        assert_eq!(positions[2], BlockPos::new(0, 0, 1));
        assert_eq!(positions[4], BlockPos::new(0, 1, 0));
    }

    #[test]
    fn index_matches_iteration_order() {
        let iter = BlockIter::from_min_max(BlockPos::new(-2, 5, 3), BlockPos::new(1, 7, 4));
        for (i, pos) in iter.clone().enumerate() {
            assert_eq!(iter.index_of(pos), Some(i));
        }
        assert_eq!(iter.index_of(BlockPos::new(2, 5, 3)), None);
    }

    #[test]
    fn inverted_bounds_make_an_empty_region() {
        let mut iter = BlockIter::from_min_max(BlockPos::new(3, 0, 0), BlockPos::new(1, 0, 0));
        assert!(iter.is_empty());
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn region_containment() {
        let iter = BlockIter::from_min_max(BlockPos::new(0, 0, 0), BlockPos::new(4, 4, 4));
        assert!(iter.contains_region(BlockPos::new(1, 1, 1), BlockPos::new(3, 3, 3)));
        assert!(!iter.contains_region(BlockPos::new(1, 1, 1), BlockPos::new(5, 3, 3)));
    }
}
