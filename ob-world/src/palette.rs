use glam::DVec3;
use ob_protocol::shared::Direction;
use serde::Deserialize;

use crate::shapes::Shape;

/// Index into the session block palette. Id 0 is always air.
pub type BlockId = u32;

pub const AIR: BlockId = 0;

pub const DEFAULT_SLIPPERINESS: f64 = 0.6;

/// Fluid levels run 0 (source) through 7 (thinnest flow); 8 and up marks a
/// falling column, which fills the whole block.
pub const FALLING_FLUID_LEVEL: u8 = 8;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fluid {
    #[default]
    Empty,
    Water,
    Lava,
}

/// How a block reacts to being pushed by a piston.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushReaction {
    #[default]
    Normal,
    Block,
    Destroy,
    PushOnly,
}

/// One block state record. Physics only sees blocks through these fields,
/// so a palette is all the world data a session needs besides block ids.
#[derive(Clone, Debug, Deserialize)]
pub struct BlockState {
    pub name: String,
    #[serde(default)]
    pub shape: Shape,
    #[serde(default)]
    pub water_level: Option<u8>,
    #[serde(default)]
    pub lava_level: Option<u8>,
    #[serde(default)]
    pub waterlogged: bool,
    #[serde(default)]
    pub push: PushReaction,
    #[serde(default)]
    pub block_entity: bool,
    #[serde(default)]
    pub unbreakable: bool,
    /// Piston bases only. An extended base cannot be moved by another piston.
    #[serde(default)]
    pub extended: bool,
    /// Trapdoors only.
    #[serde(default)]
    pub open: bool,
    /// Bubble columns only. Downward drag instead of upward push.
    #[serde(default)]
    pub drag: bool,
    #[serde(default)]
    pub facing: Option<String>,
}

impl Default for BlockState {
    fn default() -> Self {
        Self {
            name: "minecraft:air".to_owned(),
            shape: Shape::Empty,
            water_level: None,
            lava_level: None,
            waterlogged: false,
            push: PushReaction::Normal,
            block_entity: false,
            unbreakable: false,
            extended: false,
            open: false,
            drag: false,
            facing: None,
        }
    }
}

impl BlockState {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Self::default()
        }
    }

    pub fn solid(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            shape: Shape::Cube,
            ..Self::default()
        }
    }

    pub fn water(level: u8) -> Self {
        Self {
            name: "minecraft:water".to_owned(),
            water_level: Some(level),
            ..Self::default()
        }
    }

    pub fn lava(level: u8) -> Self {
        Self {
            name: "minecraft:lava".to_owned(),
            lava_level: Some(level),
            ..Self::default()
        }
    }

    pub fn facing(&self) -> Direction {
        match &self.facing {
            Some(name) => Direction::from_string(name),
            None => Direction::Invalid,
        }
    }
}

/// Block state lookup table for one session. Ids outside the table read as air.
#[derive(Clone, Debug, Default)]
pub struct BlockPalette {
    states: Vec<BlockState>,
    air: BlockState,
}

impl BlockPalette {
    pub fn new(states: Vec<BlockState>) -> Self {
        Self {
            states,
            air: BlockState::default(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn get(&self, id: BlockId) -> &BlockState {
        self.states.get(id as usize).unwrap_or(&self.air)
    }

    /// First id carrying the given identifier, mainly for building test worlds.
    pub fn id_of(&self, name: &str) -> Option<BlockId> {
        self.states
            .iter()
            .position(|state| state.name == name)
            .map(|index| index as BlockId)
    }

    pub fn fluid(&self, id: BlockId) -> Fluid {
        let state = self.get(id);
        if state.water_level.is_some() || state.waterlogged {
            Fluid::Water
        } else if state.lava_level.is_some() {
            Fluid::Lava
        } else {
            Fluid::Empty
        }
    }

    /// World-space fluid surface height inside the block, or -1 when the block
    /// does not hold the given fluid. Falling columns fill the whole block.
    pub fn fluid_height(&self, fluid: Fluid, id: BlockId) -> f64 {
        if self.fluid(id) != fluid || fluid == Fluid::Empty {
            return -1.0;
        }
        let state = self.get(id);
        let level = match fluid {
            Fluid::Water => state.water_level.unwrap_or(0),
            Fluid::Lava => state.lava_level.unwrap_or(0),
            Fluid::Empty => return -1.0,
        };
        if level >= FALLING_FLUID_LEVEL {
            1.0
        } else {
            (8 - level) as f64 / 9.0
        }
    }

    /// Raw water level, excluding waterlogged blocks.
    pub fn water_level(&self, id: BlockId) -> Option<u8> {
        self.get(id).water_level
    }

    pub fn lava_level(&self, id: BlockId) -> Option<u8> {
        self.get(id).lava_level
    }

    pub fn slipperiness(&self, id: BlockId) -> f64 {
        match self.get(id).name.as_str() {
            "minecraft:slime_block" => 0.8,
            "minecraft:ice" | "minecraft:packed_ice" | "minecraft:frosted_ice" => 0.98,
            "minecraft:blue_ice" => 0.989,
            _ => DEFAULT_SLIPPERINESS,
        }
    }

    /// Per-axis motion multiplier applied while standing inside the block.
    pub fn movement_multiplier(&self, id: BlockId) -> Option<DVec3> {
        match self.get(id).name.as_str() {
            "minecraft:cobweb" => Some(DVec3::new(0.25, 0.05, 0.25)),
            "minecraft:powder_snow" => Some(DVec3::new(0.9, 1.5, 0.9)),
            "minecraft:sweet_berry_bush" => Some(DVec3::new(0.8, 0.75, 0.8)),
            _ => None,
        }
    }

    pub fn is_cobweb(&self, id: BlockId) -> bool {
        self.get(id).name == "minecraft:cobweb"
    }

    pub fn is_slime_block(&self, id: BlockId) -> bool {
        self.get(id).name == "minecraft:slime_block"
    }

    pub fn is_honey_block(&self, id: BlockId) -> bool {
        self.get(id).name == "minecraft:honey_block"
    }

    pub fn is_soul_sand(&self, id: BlockId) -> bool {
        self.get(id).name == "minecraft:soul_sand"
    }

    pub fn is_bed(&self, id: BlockId) -> bool {
        self.get(id).name.ends_with("_bed")
    }

    pub fn is_bubble_column(&self, id: BlockId) -> bool {
        self.get(id).name == "minecraft:bubble_column"
    }

    /// Plain ice never blocks fluid flow, unlike other full cubes.
    pub fn is_ice(&self, id: BlockId) -> bool {
        self.get(id).name == "minecraft:ice"
    }

    pub fn is_lily_pad(&self, id: BlockId) -> bool {
        self.get(id).name == "minecraft:lily_pad"
    }

    pub fn is_climbable(&self, id: BlockId) -> bool {
        matches!(
            self.get(id).name.as_str(),
            "minecraft:ladder"
                | "minecraft:vine"
                | "minecraft:scaffolding"
                | "minecraft:twisting_vines"
                | "minecraft:twisting_vines_plant"
                | "minecraft:weeping_vines"
                | "minecraft:weeping_vines_plant"
                | "minecraft:cave_vines"
                | "minecraft:cave_vines_plant"
        )
    }

    pub fn ladder_direction(&self, id: BlockId) -> Option<Direction> {
        let state = self.get(id);
        if state.name == "minecraft:ladder" {
            Some(state.facing())
        } else {
            None
        }
    }

    pub fn open_trapdoor_direction(&self, id: BlockId) -> Option<Direction> {
        let state = self.get(id);
        if state.open && state.name.ends_with("_trapdoor") {
            Some(state.facing())
        } else {
            None
        }
    }

    pub fn is_piston(&self, id: BlockId) -> bool {
        matches!(
            self.get(id).name.as_str(),
            "minecraft:piston" | "minecraft:sticky_piston"
        )
    }

    pub fn is_sticky_piston(&self, id: BlockId) -> bool {
        self.get(id).name == "minecraft:sticky_piston"
    }

    pub fn is_piston_head(&self, id: BlockId) -> bool {
        self.get(id).name == "minecraft:piston_head"
    }

    pub fn is_moving_piston(&self, id: BlockId) -> bool {
        self.get(id).name == "minecraft:moving_piston"
    }

    /// Piston head state pointing the given way, or air when the palette has
    /// none.
    pub fn piston_head(&self, facing: Direction) -> BlockId {
        self.states
            .iter()
            .position(|state| state.name == "minecraft:piston_head" && state.facing() == facing)
            .map(|index| index as BlockId)
            .unwrap_or(AIR)
    }

    pub fn is_block_sticky(&self, id: BlockId) -> bool {
        self.is_slime_block(id) || self.is_honey_block(id)
    }

    /// Whether two touching blocks move as one when a piston pulls on them.
    /// Slime and honey do not stick to each other.
    pub fn is_block_attached(&self, id: BlockId, adjacent: BlockId) -> bool {
        let sticky = self.is_block_sticky(id);
        let adjacent_sticky = self.is_block_sticky(adjacent);
        if sticky && adjacent_sticky {
            return self.get(id).name == self.get(adjacent).name;
        }
        sticky || adjacent_sticky
    }

    pub fn can_piston_move_block(&self, id: BlockId, is_pushing: bool) -> bool {
        if id == AIR {
            return true;
        }
        let state = self.get(id);
        // Pistons can only be moved while retracted.
        if self.is_piston(id) {
            return !state.extended;
        }
        if state.unbreakable {
            return false;
        }
        match state.push {
            PushReaction::Block | PushReaction::Destroy => false,
            PushReaction::PushOnly => is_pushing,
            PushReaction::Normal => !state.block_entity,
        }
    }

    pub fn can_piston_destroy_block(&self, id: BlockId) -> bool {
        self.get(id).push == PushReaction::Destroy
    }

    pub fn has_collision(&self, id: BlockId) -> bool {
        self.get(id).shape != Shape::Empty
    }

    pub fn is_full_cube(&self, id: BlockId) -> bool {
        self.get(id).shape == Shape::Cube
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn palette() -> BlockPalette {
        BlockPalette::new(vec![
            BlockState::default(),
            BlockState::solid("minecraft:stone"),
            BlockState::water(0),
            BlockState::water(9),
            BlockState::lava(4),
            BlockState {
                waterlogged: true,
                ..BlockState::solid("minecraft:oak_fence")
            },
            BlockState::solid("minecraft:slime_block"),
            BlockState::solid("minecraft:honey_block"),
            BlockState {
                extended: true,
                facing: Some("up".to_owned()),
                ..BlockState::solid("minecraft:piston")
            },
            BlockState {
                push: PushReaction::PushOnly,
                ..BlockState::solid("minecraft:glazed_terracotta")
            },
            BlockState {
                block_entity: true,
                ..BlockState::solid("minecraft:chest")
            },
            BlockState {
                unbreakable: true,
                ..BlockState::solid("minecraft:obsidian")
            },
        ])
    }

    #[test]
    fn fluid_heights_follow_levels() {
        let palette = palette();
        let source = palette.id_of("minecraft:water").unwrap();
        assert_eq!(palette.fluid(source), Fluid::Water);
        assert!((palette.fluid_height(Fluid::Water, source) - 8.0 / 9.0).abs() < 1e-9);
        // Falling water fills the block.
        assert_eq!(palette.fluid_height(Fluid::Water, 3), 1.0);
        assert!((palette.fluid_height(Fluid::Lava, 4) - 4.0 / 9.0).abs() < 1e-9);
        assert_eq!(palette.fluid_height(Fluid::Water, 4), -1.0);
    }

    #[test]
    fn waterlogged_counts_as_water_but_keeps_no_level() {
        let palette = palette();
        let fence = palette.id_of("minecraft:oak_fence").unwrap();
        assert_eq!(palette.fluid(fence), Fluid::Water);
        assert_eq!(palette.water_level(fence), None);
        assert!((palette.fluid_height(Fluid::Water, fence) - 8.0 / 9.0).abs() < 1e-9);
    }

    #[test]
    fn out_of_range_ids_read_as_air() {
        let palette = palette();
        assert_eq!(palette.get(9999).name, "minecraft:air");
        assert_eq!(palette.fluid(9999), Fluid::Empty);
        assert!(!palette.has_collision(9999));
    }

    #[test]
    fn piston_movability_rules() {
        let palette = palette();
        let extended_piston = palette.id_of("minecraft:piston").unwrap();
        let push_only = palette.id_of("minecraft:glazed_terracotta").unwrap();
        let chest = palette.id_of("minecraft:chest").unwrap();
        let obsidian = palette.id_of("minecraft:obsidian").unwrap();
        let stone = palette.id_of("minecraft:stone").unwrap();

        assert!(palette.can_piston_move_block(AIR, true));
        assert!(palette.can_piston_move_block(stone, true));
        assert!(!palette.can_piston_move_block(extended_piston, true));
        assert!(palette.can_piston_move_block(push_only, true));
        assert!(!palette.can_piston_move_block(push_only, false));
        assert!(!palette.can_piston_move_block(chest, true));
        assert!(!palette.can_piston_move_block(obsidian, true));
    }

    #[test]
    fn sticky_blocks_do_not_attach_across_kinds() {
        let palette = palette();
        let slime = palette.id_of("minecraft:slime_block").unwrap();
        let honey = palette.id_of("minecraft:honey_block").unwrap();
        let stone = palette.id_of("minecraft:stone").unwrap();

        assert!(palette.is_block_attached(slime, slime));
        assert!(!palette.is_block_attached(slime, honey));
        assert!(palette.is_block_attached(slime, stone));
        assert!(!palette.is_block_attached(stone, stone));
    }

    #[test]
    fn palette_round_trips_through_json() {
        let json = r#"[
            { "name": "minecraft:air" },
            { "name": "minecraft:stone", "shape": "cube" },
            { "name": "minecraft:water", "water_level": 0 },
            { "name": "minecraft:ladder", "shape": "empty", "facing": "north" }
        ]"#;
        let palette = BlockPalette::from_json(json).unwrap();
        assert_eq!(palette.len(), 4);
        assert!(palette.is_full_cube(1));
        assert_eq!(
            palette.ladder_direction(3),
            Some(ob_protocol::shared::Direction::North)
        );
    }
}
