//! OBJ model loading

use std::path::Path;

use crate::assets::{AssetError, AssetResult};
use crate::scene::geometry::Vertex;

/// Vertices and triangle-list indices of one model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    /// Unique vertices
    pub vertices: Vec<Vertex>,
    /// Indices into `vertices`
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Append another model; its indices are shifted past this model's vertices
    pub fn append(&mut self, other: &MeshData) {
        let base = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&other.vertices);
        self.indices.extend(other.indices.iter().map(|i| i + base));
    }
}

/// Load every shape of an OBJ file as one triangulated, single-indexed mesh
///
/// Texture V is flipped to Vulkan's top-left origin. Missing normals and
/// texture coordinates load as zeros.
pub fn load_obj(path: impl AsRef<Path>) -> AssetResult<MeshData> {
    let path = path.as_ref();
    let options = tobj::LoadOptions {
        triangulate: true,
        single_index: true,
        ..Default::default()
    };
    let (models, _materials) = tobj::load_obj(path, &options).map_err(|e| AssetError::Model {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let mut data = MeshData::default();
    for model in &models {
        data.append(&mesh_from_tobj(&model.mesh));
    }

    log::debug!(
        "Loaded {:?}: {} shapes, {} vertices, {} indices",
        path,
        models.len(),
        data.vertices.len(),
        data.indices.len()
    );
    Ok(data)
}

fn mesh_from_tobj(mesh: &tobj::Mesh) -> MeshData {
    let vertex_count = mesh.positions.len() / 3;
    let vertices = (0..vertex_count)
        .map(|i| {
            let tex_coord = if mesh.texcoords.len() >= 2 * (i + 1) {
                [mesh.texcoords[2 * i], 1.0 - mesh.texcoords[2 * i + 1]]
            } else {
                [0.0, 0.0]
            };
            let normal = if mesh.normals.len() >= 3 * (i + 1) {
                [mesh.normals[3 * i], mesh.normals[3 * i + 1], mesh.normals[3 * i + 2]]
            } else {
                [0.0, 0.0, 0.0]
            };
            Vertex {
                position: [mesh.positions[3 * i], mesh.positions[3 * i + 1], mesh.positions[3 * i + 2]],
                tex_coord,
                normal,
            }
        })
        .collect();

    MeshData {
        vertices,
        indices: mesh.indices.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("water_engine_{}_{}", std::process::id(), name));
        let mut file = std::fs::File::create(&path).expect("create");
        file.write_all(contents.as_bytes()).expect("write");
        path
    }

    #[test]
    fn test_quad_is_triangulated_and_v_flipped() {
        let path = write_temp(
            "quad.obj",
            "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\n\
             vt 0 0\nvt 1 0\nvt 1 1\nvt 0 1\n\
             vn 0 0 1\n\
             f 1/1/1 2/2/1 3/3/1 4/4/1\n",
        );
        let mesh = load_obj(&path).expect("load");
        let _ = std::fs::remove_file(&path);

        assert_eq!(mesh.indices.len(), 6);
        assert_eq!(mesh.vertices.len(), 4);
        let top_right = mesh
            .vertices
            .iter()
            .find(|v| v.position == [1.0, 1.0, 0.0])
            .expect("corner");
        assert_eq!(top_right.tex_coord, [1.0, 0.0]);
        assert_eq!(top_right.normal, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_missing_file_is_a_model_error() {
        let err = load_obj("does/not/exist.obj").unwrap_err();
        assert!(matches!(err, AssetError::Model { .. }));
    }

    #[test]
    fn test_append_rebases_indices() {
        let v = Vertex::default();
        let mut a = MeshData {
            vertices: vec![v; 3],
            indices: vec![0, 1, 2],
        };
        let b = MeshData {
            vertices: vec![v; 3],
            indices: vec![2, 1, 0],
        };
        a.append(&b);
        assert_eq!(a.indices, vec![0, 1, 2, 5, 4, 3]);
    }
}
