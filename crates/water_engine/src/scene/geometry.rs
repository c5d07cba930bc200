//! Shared vertex and index storage
//!
//! Every mesh in the scene lives in one vertex array and one index array, so
//! a frame binds a single vertex buffer and a single index buffer. Each mesh
//! keeps its own local indices and records where they start.

use bytemuck::{Pod, Zeroable};

use crate::assets::MeshData;

/// Interleaved vertex shared by every graphics pipeline
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Texture coordinate, origin top-left
    pub tex_coord: [f32; 2],
    /// Object-space normal
    pub normal: [f32; 3],
}

/// Where one mesh sits inside [`SceneGeometry`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshRange {
    /// First index in the shared index array
    pub first_index: u32,
    /// Number of indices
    pub index_count: u32,
    /// Added to every index of the mesh
    pub vertex_offset: i32,
}

/// Every mesh of the scene merged into one vertex and one index array
#[derive(Debug, Clone, Default)]
pub struct SceneGeometry {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
}

impl SceneGeometry {
    /// Empty geometry
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a mesh and return its range
    pub fn add(&mut self, mesh: &MeshData) -> MeshRange {
        let range = MeshRange {
            first_index: self.indices.len() as u32,
            index_count: mesh.indices.len() as u32,
            vertex_offset: self.vertices.len() as i32,
        };
        self.vertices.extend_from_slice(&mesh.vertices);
        self.indices.extend_from_slice(&mesh.indices);
        range
    }

    /// All vertices
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// All indices, local to each mesh
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }
}

/// Flat `divisions × divisions` grid over `[-1, 1]²` in the XZ plane, facing +Y
///
/// Texture coordinates run 0..1 across the grid so the height field maps
/// onto it texel for texel. Triangles wind counter-clockwise seen from above.
pub fn surface_grid(divisions: u32) -> MeshData {
    let divisions = divisions.max(1);
    let stride = divisions + 1;

    let vertices = (0..stride)
        .flat_map(|row| (0..stride).map(move |col| (row, col)))
        .map(|(row, col)| {
            let u = col as f32 / divisions as f32;
            let v = row as f32 / divisions as f32;
            Vertex {
                position: [u * 2.0 - 1.0, 0.0, v * 2.0 - 1.0],
                tex_coord: [u, v],
                normal: [0.0, 1.0, 0.0],
            }
        })
        .collect();

    let indices = (0..divisions)
        .flat_map(|row| (0..divisions).map(move |col| (row, col)))
        .flat_map(|(row, col)| {
            let top_left = row * stride + col;
            let top_right = top_left + 1;
            let bottom_left = top_left + stride;
            let bottom_right = bottom_left + 1;
            [top_left, bottom_left, top_right, top_right, bottom_left, bottom_right]
        })
        .collect();

    MeshData { vertices, indices }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn triangle() -> MeshData {
        MeshData {
            vertices: vec![Vertex::default(); 3],
            indices: vec![0, 1, 2],
        }
    }

    #[test]
    fn test_vertex_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
    }

    #[test]
    fn test_ranges_record_index_start_and_vertex_offset() {
        let mut geometry = SceneGeometry::new();
        let first = geometry.add(&triangle());
        let grid = geometry.add(&surface_grid(2));

        assert_eq!(
            first,
            MeshRange {
                first_index: 0,
                index_count: 3,
                vertex_offset: 0
            }
        );
        assert_eq!(
            grid,
            MeshRange {
                first_index: 3,
                index_count: 24,
                vertex_offset: 3
            }
        );
        assert_eq!(geometry.vertices().len(), 3 + 9);
        // Indices stay local; the draw's vertex offset rebases them
        assert_eq!(geometry.indices()[3], 0);
    }

    #[test]
    fn test_grid_spans_unit_square() {
        let grid = surface_grid(4);
        assert_eq!(grid.vertices.len(), 25);
        assert_eq!(grid.indices.len(), 4 * 4 * 6);

        let first = grid.vertices[0];
        let last = grid.vertices[24];
        assert_eq!(first.position, [-1.0, 0.0, -1.0]);
        assert_eq!(last.position, [1.0, 0.0, 1.0]);
        assert_eq!(last.tex_coord, [1.0, 1.0]);
        assert!(grid.indices.iter().all(|&i| i < 25));
    }

    #[test]
    fn test_grid_triangles_face_up() {
        let grid = surface_grid(1);
        for tri in grid.indices.chunks(3) {
            let p = |i: u32| nalgebra::Vector3::from(grid.vertices[i as usize].position);
            let normal = (p(tri[1]) - p(tri[0])).cross(&(p(tri[2]) - p(tri[0])));
            // Counter-clockwise seen from +Y
            assert_relative_eq!(normal.normalize().y, 1.0, epsilon = 1e-6);
        }
    }
}
