use std::cell::Cell;

use glam::DVec3;
use ob_protocol::shared::BlockPos;
use ob_world::iter::BlockIter;
use ob_world::palette::BlockId;
use ob_world::provider::WorldView;
use tracing::debug;

use crate::bounding_box::BoundingBox;

/// Blocks kept around the box footprint so neighbor lookups stay in-window.
const WINDOW_MARGIN: i32 = 2;

/// Per-tick snapshot of the blocks around a vehicle, filled by one bulk
/// world query. A lookup outside the window is not fatal; it degrades to a
/// direct single-block query.
pub struct VehicleContext {
    center: DVec3,
    region: BlockIter,
    blocks: Vec<BlockId>,
    supporting_block: Cell<Option<Option<BlockPos>>>,
}

impl VehicleContext {
    pub fn load(world: &dyn WorldView, bounding_box: &BoundingBox) -> VehicleContext {
        let region = window(bounding_box);
        let blocks = world.blocks_at(&region);
        VehicleContext {
            center: bounding_box.bottom_center(),
            region,
            blocks,
            supporting_block: Cell::new(None),
        }
    }

    /// Reload after the box moved. The window survives while the body moved
    /// less than one block; memoized per-position values never do.
    pub fn refresh(&mut self, world: &dyn WorldView, bounding_box: &BoundingBox) {
        let center = bounding_box.bottom_center();
        self.supporting_block.set(None);
        if self.center.distance_squared(center) < 1.0 {
            self.center = center;
            return;
        }
        self.region = window(bounding_box);
        self.blocks = world.blocks_at(&self.region);
        self.center = center;
    }

    pub fn center(&self) -> DVec3 {
        self.center
    }

    pub fn block_at(&self, world: &dyn WorldView, pos: BlockPos) -> BlockId {
        if let Some(index) = self.region.index_of(pos) {
            return self.blocks[index];
        }
        debug!("block lookup at {:?} missed the cached window", pos);
        world.block_at(pos)
    }

    /// Supporting block for this window epoch, computed at most once.
    pub fn supporting_block(
        &self,
        compute: impl FnOnce() -> Option<BlockPos>,
    ) -> Option<BlockPos> {
        if let Some(cached) = self.supporting_block.get() {
            return cached;
        }
        let value = compute();
        self.supporting_block.set(Some(value));
        value
    }
}

fn window(bounding_box: &BoundingBox) -> BlockIter {
    let min = bounding_box.min();
    let max = bounding_box.max();
    BlockIter::from_min_max(
        BlockPos::new(
            min.x.floor() as i32 - WINDOW_MARGIN,
            min.y.floor() as i32 - WINDOW_MARGIN,
            min.z.floor() as i32 - WINDOW_MARGIN,
        ),
        BlockPos::new(
            max.x.floor() as i32 + WINDOW_MARGIN,
            max.y.floor() as i32 + WINDOW_MARGIN,
            max.z.floor() as i32 + WINDOW_MARGIN,
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ob_world::provider::MapWorld;

    fn vehicle_box(x: f64, y: f64, z: f64) -> BoundingBox {
        BoundingBox::from_bottom_center(DVec3::new(x, y, z), 1.0, 1.0)
    }

    #[test]
    fn serves_window_hits_without_touching_the_world() {
        let mut world = MapWorld::new();
        world.set(BlockPos::new(0, -1, 0), 7);
        let b = vehicle_box(0.5, 0.0, 0.5);
        let ctx = VehicleContext::load(&world, &b);

        // Mutate the world after the load; cached reads must not see it.
        world.set(BlockPos::new(0, -1, 0), 9);
        assert_eq!(ctx.block_at(&world, BlockPos::new(0, -1, 0)), 7);
    }

    #[test]
    fn falls_back_to_a_direct_query_outside_the_window() {
        let mut world = MapWorld::new();
        world.set(BlockPos::new(40, 0, 0), 5);
        let b = vehicle_box(0.5, 0.0, 0.5);
        let ctx = VehicleContext::load(&world, &b);

        assert_eq!(ctx.block_at(&world, BlockPos::new(40, 0, 0)), 5);
    }

    #[test]
    fn refresh_keeps_the_window_for_small_moves() {
        let mut world = MapWorld::new();
        world.set(BlockPos::new(0, -1, 0), 7);
        let mut b = vehicle_box(0.5, 0.0, 0.5);
        let mut ctx = VehicleContext::load(&world, &b);

        world.set(BlockPos::new(0, -1, 0), 9);
        b.translate(DVec3::new(0.5, 0.0, 0.0));
        ctx.refresh(&world, &b);
        // Under one block of travel, the stale snapshot is kept.
        assert_eq!(ctx.block_at(&world, BlockPos::new(0, -1, 0)), 7);

        b.translate(DVec3::new(2.0, 0.0, 0.0));
        ctx.refresh(&world, &b);
        assert_eq!(ctx.block_at(&world, BlockPos::new(0, -1, 0)), 9);
    }

    #[test]
    fn supporting_block_is_computed_once_per_epoch() {
        let world = MapWorld::new();
        let b = vehicle_box(0.5, 0.0, 0.5);
        let mut ctx = VehicleContext::load(&world, &b);

        let first = ctx.supporting_block(|| Some(BlockPos::new(0, -1, 0)));
        let second = ctx.supporting_block(|| unreachable!("memoized"));
        assert_eq!(first, second);

        ctx.refresh(&world, &b);
        let third = ctx.supporting_block(|| None);
        assert_eq!(third, None);
    }
}
