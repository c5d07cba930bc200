//! Asset loading
//!
//! Models come in through `tobj`, images through `image`. Both hand back
//! plain CPU-side data; uploading is the renderer's job.

pub mod obj_loader;
pub mod image_loader;

pub use obj_loader::{load_obj, MeshData};
pub use image_loader::{load_cube_faces, load_rgba, RgbaImage, CUBE_FACE_NAMES};

use thiserror::Error;

/// Asset loading errors
#[derive(Error, Debug)]
pub enum AssetError {
    /// The model file could not be read or parsed
    #[error("Failed to load model {path}: {reason}")]
    Model {
        /// File that failed
        path: String,
        /// Loader message
        reason: String,
    },

    /// The image file could not be read or decoded
    #[error("Failed to load image {path}: {reason}")]
    Image {
        /// File that failed
        path: String,
        /// Decoder message
        reason: String,
    },

    /// Decoded data that cannot be used as-is
    #[error("Invalid asset {path}: {reason}")]
    Invalid {
        /// Offending file or directory
        path: String,
        /// What is wrong with it
        reason: String,
    },
}

/// Result type for asset loading
pub type AssetResult<T> = Result<T, AssetError>;
