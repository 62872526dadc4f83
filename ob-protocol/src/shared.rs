use glam::{DVec3, IVec3, Vec3};
use std::fmt;
use std::ops;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    Y,
    Z,
    X,
}

impl Axis {
    pub fn as_string(&self) -> &'static str {
        match *self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        }
    }

    pub fn choose(&self, x: f64, y: f64, z: f64) -> f64 {
        match *self {
            Axis::X => x,
            Axis::Y => y,
            Axis::Z => z,
        }
    }
}

/// Integer block coordinates. Both protocol sides agree on these; only
/// sub-block precision differs between them.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> BlockPos {
        BlockPos { x, y, z }
    }

    /// Block containing the given point (floor on every axis).
    pub fn containing(pos: DVec3) -> BlockPos {
        BlockPos {
            x: pos.x.floor() as i32,
            y: pos.y.floor() as i32,
            z: pos.z.floor() as i32,
        }
    }

    pub fn shift(self, dir: Direction) -> BlockPos {
        let (ox, oy, oz) = dir.get_offset();
        self + (ox, oy, oz)
    }

    pub fn shift_by(self, dir: Direction, by: i32) -> BlockPos {
        let (ox, oy, oz) = dir.get_offset();
        self + (ox * by, oy * by, oz * by)
    }

    pub fn up(self) -> BlockPos {
        self + (0, 1, 0)
    }

    pub fn down(self) -> BlockPos {
        self + (0, -1, 0)
    }

    /// Lower-north-west corner of the block.
    pub fn min_corner(self) -> DVec3 {
        DVec3::new(self.x as f64, self.y as f64, self.z as f64)
    }

    /// Center of the block volume.
    pub fn center(self) -> DVec3 {
        DVec3::new(
            self.x as f64 + 0.5,
            self.y as f64 + 0.5,
            self.z as f64 + 0.5,
        )
    }

    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(self.x as f32, self.y as f32, self.z as f32)
    }
}

impl From<IVec3> for BlockPos {
    fn from(v: IVec3) -> BlockPos {
        BlockPos::new(v.x, v.y, v.z)
    }
}

impl ops::Add<BlockPos> for BlockPos {
    type Output = BlockPos;

    fn add(self, o: BlockPos) -> BlockPos {
        BlockPos {
            x: self.x + o.x,
            y: self.y + o.y,
            z: self.z + o.z,
        }
    }
}

impl ops::Add<(i32, i32, i32)> for BlockPos {
    type Output = BlockPos;

    fn add(self, (x, y, z): (i32, i32, i32)) -> BlockPos {
        BlockPos {
            x: self.x + x,
            y: self.y + y,
            z: self.z + z,
        }
    }
}

impl ops::Sub<BlockPos> for BlockPos {
    type Output = BlockPos;

    fn sub(self, o: BlockPos) -> BlockPos {
        BlockPos {
            x: self.x - o.x,
            y: self.y - o.y,
            z: self.z - o.z,
        }
    }
}

impl Default for BlockPos {
    fn default() -> BlockPos {
        BlockPos::new(0, 0, 0)
    }
}

impl fmt::Debug for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<{},{},{}>", self.x, self.y, self.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Invalid,
    Down,
    Up,
    North,
    South,
    West,
    East,
}

impl Direction {
    pub const HORIZONTAL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    pub fn all() -> Vec<Direction> {
        vec![
            Direction::Down,
            Direction::Up,
            Direction::North,
            Direction::South,
            Direction::West,
            Direction::East,
        ]
    }

    pub fn from_string(val: &str) -> Direction {
        match val {
            "down" => Direction::Down,
            "up" => Direction::Up,
            "north" => Direction::North,
            "south" => Direction::South,
            "west" => Direction::West,
            "east" => Direction::East,
            _ => Direction::Invalid,
        }
    }

    pub fn opposite(&self) -> Direction {
        match *self {
            Direction::Down => Direction::Up,
            Direction::Up => Direction::Down,
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
            Direction::East => Direction::West,
            _ => unreachable!(),
        }
    }

    pub fn get_offset(&self) -> (i32, i32, i32) {
        match *self {
            Direction::Down => (0, -1, 0),
            Direction::Up => (0, 1, 0),
            Direction::North => (0, 0, -1),
            Direction::South => (0, 0, 1),
            Direction::West => (-1, 0, 0),
            Direction::East => (1, 0, 0),
            _ => unreachable!(),
        }
    }

    pub fn unit_vector(&self) -> DVec3 {
        let (x, y, z) = self.get_offset();
        DVec3::new(x as f64, y as f64, z as f64)
    }

    pub fn as_string(&self) -> &'static str {
        match *self {
            Direction::Down => "down",
            Direction::Up => "up",
            Direction::North => "north",
            Direction::South => "south",
            Direction::West => "west",
            Direction::East => "east",
            Direction::Invalid => "invalid",
        }
    }

    pub fn index(&self) -> usize {
        match *self {
            Direction::Down => 0,
            Direction::Up => 1,
            Direction::North => 2,
            Direction::South => 3,
            Direction::West => 4,
            Direction::East => 5,
            _ => unreachable!(),
        }
    }

    pub fn is_horizontal(&self) -> bool {
        matches!(
            *self,
            Direction::North | Direction::South | Direction::West | Direction::East
        )
    }

    pub fn axis(&self) -> Axis {
        match *self {
            Direction::Down | Direction::Up => Axis::Y,
            Direction::North | Direction::South => Axis::Z,
            Direction::West | Direction::East => Axis::X,
            _ => unreachable!(),
        }
    }

    /// Sign of this direction along its own axis.
    pub fn axis_sign(&self) -> f64 {
        match *self {
            Direction::Up | Direction::South | Direction::East => 1.0,
            Direction::Down | Direction::North | Direction::West => -1.0,
            _ => unreachable!(),
        }
    }
}
