//! Image loading utilities for texture data
//!
//! Every image is converted to tightly packed RGBA8 ready for a staging copy.

use std::path::Path;

use crate::assets::{AssetError, AssetResult};

/// Cube map face files in layer order: +X, −X, +Y, −Y, +Z, −Z
pub const CUBE_FACE_NAMES: [&str; 6] = ["posx.jpg", "negx.jpg", "posy.jpg", "negy.jpg", "posz.jpg", "negz.jpg"];

/// Decoded RGBA8 image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaImage {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// `width × height × 4` bytes, row-major
    pub pixels: Vec<u8>,
}

impl RgbaImage {
    /// Image filled with one color
    pub fn solid(width: u32, height: u32, color: [u8; 4]) -> Self {
        Self {
            width,
            height,
            pixels: color.repeat((width * height) as usize),
        }
    }

    /// Size in bytes
    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

/// Load and decode an image file as RGBA8
pub fn load_rgba(path: impl AsRef<Path>) -> AssetResult<RgbaImage> {
    let path = path.as_ref();
    let img = image::open(path).map_err(|e| AssetError::Image {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    log::debug!("Loaded image {}x{} from {:?}", width, height, path);

    Ok(RgbaImage {
        width,
        height,
        pixels: rgba.into_raw(),
    })
}

/// Load the six faces of a cube map from `dir`; all faces must share one size
pub fn load_cube_faces(dir: impl AsRef<Path>) -> AssetResult<[RgbaImage; 6]> {
    let dir = dir.as_ref();
    let faces = CUBE_FACE_NAMES
        .iter()
        .map(|name| load_rgba(dir.join(name)))
        .collect::<AssetResult<Vec<_>>>()?;
    check_cube_faces(dir, faces)
}

fn check_cube_faces(dir: &Path, faces: Vec<RgbaImage>) -> AssetResult<[RgbaImage; 6]> {
    let invalid = |reason: String| AssetError::Invalid {
        path: dir.display().to_string(),
        reason,
    };

    let first = faces.first().map(|f| (f.width, f.height));
    if let Some(face) = faces.iter().find(|f| Some((f.width, f.height)) != first) {
        return Err(invalid(format!(
            "cube faces differ in size ({}x{} vs {:?})",
            face.width, face.height, first
        )));
    }

    let count = faces.len();
    faces
        .try_into()
        .map_err(|_| invalid(format!("expected 6 cube faces, found {count}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_image_size() {
        let img = RgbaImage::solid(4, 2, [1, 2, 3, 4]);
        assert_eq!(img.byte_len(), 32);
        assert_eq!(&img.pixels[28..], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_face_order_is_positive_then_negative_per_axis() {
        assert_eq!(CUBE_FACE_NAMES[0], "posx.jpg");
        assert_eq!(CUBE_FACE_NAMES[3], "negy.jpg");
        assert_eq!(CUBE_FACE_NAMES[5], "negz.jpg");
    }

    #[test]
    fn test_mismatched_faces_are_rejected() {
        let mut faces = vec![RgbaImage::solid(2, 2, [0; 4]); 6];
        faces[4] = RgbaImage::solid(4, 4, [0; 4]);
        let err = check_cube_faces(Path::new("sky"), faces).unwrap_err();
        assert!(matches!(err, AssetError::Invalid { .. }));
    }

    #[test]
    fn test_six_equal_faces_are_accepted() {
        let faces = vec![RgbaImage::solid(2, 2, [0; 4]); 6];
        let faces = check_cube_faces(Path::new("sky"), faces).expect("cube");
        assert_eq!(faces[5].width, 2);
    }

    #[test]
    fn test_missing_image_reports_path() {
        let err = load_rgba("nowhere.png").unwrap_err();
        assert!(err.to_string().contains("nowhere.png"));
    }
}
