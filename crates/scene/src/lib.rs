//! Scene object store, camera and viewer movement.

pub mod camera;
pub mod controller;
pub mod object;
pub mod transform;

pub use camera::{Camera, WORLD_UP};
pub use controller::{KeyboardMovementController, MoveAction, MovementInput};
pub use object::{IdAllocator, ObjectId, PointLightComponent, Scene, SceneObject};
pub use transform::TransformComponent;
