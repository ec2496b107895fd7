//! CPU-side resource data for the Ember engine.
//!
//! - [`MeshData`]: vertex and index arrays split into sub-meshes
//! - [`TextureData`]: decoded RGBA8 pixels
//!
//! Nothing here touches the GPU; the renderer uploads these.

mod error;
pub mod mesh;
pub mod texture;

pub use error::{ResourceError, ResourceResult};
pub use mesh::{MeshData, SubMesh, SubMeshMaterial, Vertex};
pub use texture::TextureData;
