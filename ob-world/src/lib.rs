pub mod iter;
pub mod palette;
pub mod provider;
pub mod shapes;

pub use iter::BlockIter;
pub use palette::{BlockId, BlockPalette, BlockState, Fluid, PushReaction, AIR};
pub use provider::{MapWorld, WorldView, WorldWrite};
pub use shapes::{Aabb, Shape};
