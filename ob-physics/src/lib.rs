pub mod border;
pub mod bounding_box;
pub mod collision;
pub mod context;
pub mod piston;
pub mod session;
pub mod vehicle;

pub use bounding_box::BoundingBox;
pub use session::PhysicsSession;
