//! Mesh data: interleaved vertices, `u32` indices and sub-mesh ranges.
//!
//! A mesh is drawn one sub-mesh at a time. Each sub-mesh covers a contiguous
//! index range and is shaded either with one of the mesh's textures or with a
//! flat diffuse color.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};
use tracing::debug;

use crate::error::{ResourceError, ResourceResult};

/// Interleaved vertex as laid out in the vertex buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub color: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

impl Vertex {
    pub const fn new(position: Vec3, color: Vec3, normal: Vec3, uv: Vec2) -> Self {
        Self {
            position,
            color,
            normal,
            uv,
        }
    }
}

/// How a sub-mesh is shaded.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SubMeshMaterial {
    /// Index into the textures supplied with the mesh.
    Texture(u32),
    /// Flat diffuse color.
    Color(Vec4),
}

impl Default for SubMeshMaterial {
    fn default() -> Self {
        SubMeshMaterial::Color(Vec4::ONE)
    }
}

/// A contiguous index range drawn with one material.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SubMesh {
    pub index_count: u32,
    pub index_start: u32,
    pub material: SubMeshMaterial,
}

/// Mesh geometry ready for upload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub submeshes: Vec<SubMesh>,
}

impl MeshData {
    /// Builds a mesh drawn as a single sub-mesh.
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>, material: SubMeshMaterial) -> Self {
        let submeshes = vec![SubMesh {
            index_count: indices.len() as u32,
            index_start: 0,
            material,
        }];
        Self {
            vertices,
            indices,
            submeshes,
        }
    }

    /// Replaces the material of every sub-mesh.
    pub fn with_material(mut self, material: SubMeshMaterial) -> Self {
        for submesh in &mut self.submeshes {
            submesh.material = material;
        }
        self
    }

    /// Number of distinct texture slots the sub-meshes reference (highest index + 1).
    pub fn texture_slots(&self) -> u32 {
        self.submeshes
            .iter()
            .filter_map(|s| match s.material {
                SubMeshMaterial::Texture(index) => Some(index + 1),
                SubMeshMaterial::Color(_) => None,
            })
            .max()
            .unwrap_or(0)
    }

    /// Checks indices, sub-mesh ranges and texture references.
    ///
    /// `texture_count` is the number of textures that will be supplied with
    /// the mesh.
    pub fn validate(&self, texture_count: usize) -> ResourceResult<()> {
        if self.vertices.is_empty() || self.indices.is_empty() {
            return Err(ResourceError::InvalidData(
                "mesh has no vertices or no indices".to_string(),
            ));
        }

        let vertex_count = self.vertices.len();
        if let Some(index) = self.indices.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(ResourceError::InvalidData(format!(
                "index {} out of range for {} vertices",
                index, vertex_count
            )));
        }

        for (i, submesh) in self.submeshes.iter().enumerate() {
            let end = submesh.index_start as usize + submesh.index_count as usize;
            if end > self.indices.len() {
                return Err(ResourceError::InvalidData(format!(
                    "sub-mesh {} covers indices up to {} of {}",
                    i,
                    end,
                    self.indices.len()
                )));
            }
            if let SubMeshMaterial::Texture(index) = submesh.material
                && index as usize >= texture_count
            {
                return Err(ResourceError::InvalidData(format!(
                    "sub-mesh {} references texture {} of {}",
                    i, index, texture_count
                )));
            }
        }

        Ok(())
    }

    /// Unit cube centered on the origin with a distinct color per face.
    pub fn cube() -> Self {
        // (normal, u axis, v axis, color); u x v = normal.
        let faces = [
            (Vec3::NEG_X, Vec3::NEG_Z, Vec3::NEG_Y, Vec3::new(0.9, 0.9, 0.9)),
            (Vec3::X, Vec3::Z, Vec3::NEG_Y, Vec3::new(0.8, 0.8, 0.1)),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z, Vec3::new(0.9, 0.6, 0.1)),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z, Vec3::new(0.8, 0.1, 0.1)),
            (Vec3::Z, Vec3::NEG_X, Vec3::NEG_Y, Vec3::new(0.1, 0.1, 0.8)),
            (Vec3::NEG_Z, Vec3::X, Vec3::NEG_Y, Vec3::new(0.1, 0.8, 0.1)),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, u, v, color) in faces {
            let base = vertices.len() as u32;
            for (du, dv) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
                let position = normal * 0.5 + u * du + v * dv;
                let uv = Vec2::new(du + 0.5, dv + 0.5);
                vertices.push(Vertex::new(position, color, normal, uv));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }

        debug!("Generated cube mesh ({} vertices)", vertices.len());
        Self::new(vertices, indices, SubMeshMaterial::default())
    }

    /// Unit quad in the XZ plane facing -Y (up), textured with slot 0.
    pub fn quad() -> Self {
        let normal = Vec3::NEG_Y;
        let color = Vec3::ONE;
        let vertices = vec![
            Vertex::new(Vec3::new(-0.5, 0.0, -0.5), color, normal, Vec2::new(0.0, 0.0)),
            Vertex::new(Vec3::new(0.5, 0.0, -0.5), color, normal, Vec2::new(1.0, 0.0)),
            Vertex::new(Vec3::new(0.5, 0.0, 0.5), color, normal, Vec2::new(1.0, 1.0)),
            Vertex::new(Vec3::new(-0.5, 0.0, 0.5), color, normal, Vec2::new(0.0, 1.0)),
        ];
        let indices = vec![0, 1, 2, 2, 3, 0];
        Self::new(vertices, indices, SubMeshMaterial::Texture(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layout() {
        use std::mem::{offset_of, size_of};

        assert_eq!(size_of::<Vertex>(), 44);
        assert_eq!(offset_of!(Vertex, position), 0);
        assert_eq!(offset_of!(Vertex, color), 12);
        assert_eq!(offset_of!(Vertex, normal), 24);
        assert_eq!(offset_of!(Vertex, uv), 36);
    }

    #[test]
    fn test_cube_geometry() {
        let cube = MeshData::cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        assert_eq!(cube.submeshes.len(), 1);
        assert_eq!(cube.submeshes[0].index_count, 36);
        assert!(cube.validate(0).is_ok());

        for vertex in &cube.vertices {
            assert!((vertex.normal.length() - 1.0).abs() < 1e-6);
            assert!((vertex.position.dot(vertex.normal) - 0.5).abs() < 1e-6);
            assert_eq!(vertex.position.abs().max_element(), 0.5);
        }
    }

    #[test]
    fn test_cube_faces_are_right_handed() {
        let cube = MeshData::cube();
        for triangle in cube.indices.chunks(3) {
            let [a, b, c] = [0, 1, 2].map(|i| cube.vertices[triangle[i] as usize]);
            let face_normal = (b.position - a.position).cross(c.position - a.position);
            assert!(face_normal.dot(a.normal) > 0.0);
        }
    }

    #[test]
    fn test_quad_needs_one_texture() {
        let quad = MeshData::quad();
        assert_eq!(quad.texture_slots(), 1);
        assert!(quad.validate(1).is_ok());
        assert!(matches!(
            quad.validate(0),
            Err(ResourceError::InvalidData(_))
        ));
    }

    #[test]
    fn test_with_material_replaces_all() {
        let red = Vec4::new(1.0, 0.0, 0.0, 1.0);
        let quad = MeshData::quad().with_material(SubMeshMaterial::Color(red));
        assert_eq!(quad.texture_slots(), 0);
        assert_eq!(quad.submeshes[0].material, SubMeshMaterial::Color(red));
    }

    #[test]
    fn test_out_of_range_index_rejected() {
        let mut quad = MeshData::quad();
        quad.indices[0] = 4;
        assert!(quad.validate(1).is_err());
    }

    #[test]
    fn test_submesh_past_end_rejected() {
        let mut cube = MeshData::cube();
        cube.submeshes.push(SubMesh {
            index_count: 6,
            index_start: 33,
            material: SubMeshMaterial::default(),
        });
        assert!(cube.validate(0).is_err());
    }
}
