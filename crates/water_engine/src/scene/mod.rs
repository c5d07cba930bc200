//! The water scene
//!
//! A fixed set of objects (skybox, chalet, lake bed, water surface) and the
//! three passes that draw them. Nothing here touches the GPU; the application
//! turns these descriptions into registry meshes, pipelines and uniforms.
//!
//! ## Passes
//!
//! ```text
//! refraction ─┐
//!             ├──> surface (swapchain)
//! reflection ─┘
//! ```
//!
//! Refraction and reflection render the scene objects into owned targets.
//! The surface pass renders the same objects plus the water, which samples
//! both captures and the simulated height field.

pub mod geometry;

use crate::core::config::SceneConfig;
use crate::foundation::math::{Mat4, Mat4Ext, Quat, Transform, Vec3};
use crate::render::backends::vulkan::resources::uniform::{ClipPlane, UniformBufferObject};
use crate::render::backends::vulkan::rendering::render_pass::AttachmentLayouts;
use geometry::MeshRange;

/// Texture an object samples at binding 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectTexture {
    /// Skybox cube map
    Skybox,
    /// Chalet diffuse texture
    Chalet,
    /// Lake bed diffuse texture
    Lake,
}

/// How an object is positioned and drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// Centered on the camera, drawn first without depth
    Skybox,
    /// Placed by its transform, depth tested
    Model,
}

/// One textured object of the scene
#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    /// Name used for registry meshes and logs
    pub tag: &'static str,
    /// Draw range in the shared geometry
    pub range: MeshRange,
    /// Sampled texture
    pub texture: ObjectTexture,
    /// Placement
    pub transform: Transform,
    /// Positioning and pipeline choice
    pub kind: ObjectKind,
    /// Whether the object shows up in the reflection capture
    pub reflected: bool,
}

/// Object-to-world matrix, `T × R × S`
///
/// The skybox ignores its translation and follows the camera.
pub fn model_matrix(object: &SceneObject, camera_position: &Vec3) -> Mat4 {
    match object.kind {
        ObjectKind::Skybox => Transform {
            position: *camera_position,
            ..object.transform.clone()
        }
        .to_matrix(),
        ObjectKind::Model => object.transform.to_matrix(),
    }
}

/// Mirror about the water plane `y = water_height`
pub fn reflection_matrix(water_height: f32) -> Mat4 {
    Mat4::mirror_y(water_height)
}

/// Object-to-world matrix as seen in the water
///
/// Models are mirrored about the water plane. The skybox is mirrored about
/// the camera's own height so it stays centered on the camera.
pub fn reflected_model_matrix(object: &SceneObject, camera_position: &Vec3, water_height: f32) -> Mat4 {
    match object.kind {
        ObjectKind::Skybox => reflection_matrix(camera_position.y) * model_matrix(object, camera_position),
        ObjectKind::Model => reflection_matrix(water_height) * model_matrix(object, camera_position),
    }
}

/// Which stage of the frame a pass is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    /// Scene below the water, captured for the surface to refract
    Refraction,
    /// Mirrored scene above the water, captured for the surface to reflect
    Reflection,
    /// Final image: scene plus water, into the swapchain
    Surface,
}

/// One parameterized scene pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapturePass {
    /// Stage of the frame
    pub kind: PassKind,
    /// Plane pushed to the object shaders, in world space after mirroring
    pub clip: ClipPlane,
    /// Objects are drawn through the water mirror
    pub reflected: bool,
    /// Final layouts of the pass's attachments
    pub layouts: AttachmentLayouts,
}

impl CapturePass {
    /// Refraction keeps what lies below the water
    pub fn refraction(water_height: f32) -> Self {
        Self {
            kind: PassKind::Refraction,
            clip: ClipPlane::below(water_height),
            reflected: false,
            layouts: AttachmentLayouts::sampled(),
        }
    }

    /// Reflection keeps what lay above the water, which the mirror moves below it
    pub fn reflection(water_height: f32) -> Self {
        Self {
            kind: PassKind::Reflection,
            clip: ClipPlane::below(water_height),
            reflected: true,
            layouts: AttachmentLayouts::sampled(),
        }
    }

    /// The surface pass draws everything, unclipped, for presentation
    pub fn surface() -> Self {
        Self {
            kind: PassKind::Surface,
            clip: ClipPlane::none(),
            reflected: false,
            layouts: AttachmentLayouts::present(),
        }
    }

    /// The three passes in submission order
    pub fn all(water_height: f32) -> [CapturePass; 3] {
        [Self::refraction(water_height), Self::reflection(water_height), Self::surface()]
    }

    /// Whether this pass renders into an owned target other passes sample
    pub fn is_capture(&self) -> bool {
        self.kind != PassKind::Surface
    }

    /// Short name for logs and registry tags
    pub fn name(&self) -> &'static str {
        match self.kind {
            PassKind::Refraction => "refraction",
            PassKind::Reflection => "reflection",
            PassKind::Surface => "surface",
        }
    }
}

/// Uniforms for `object` drawn in `pass`
pub fn object_uniform(
    object: &SceneObject,
    pass: &CapturePass,
    camera_position: &Vec3,
    view: &Mat4,
    proj: &Mat4,
    water_height: f32,
) -> UniformBufferObject {
    let model = if pass.reflected {
        reflected_model_matrix(object, camera_position, water_height)
    } else {
        model_matrix(object, camera_position)
    };
    UniformBufferObject::new(&model, view, proj)
}

/// Placement of the water surface grid
pub fn water_transform(config: &SceneConfig) -> Transform {
    Transform {
        position: Vec3::new(0.0, config.water_height, 0.0),
        rotation: Quat::identity(),
        scale: Vec3::new(config.water_half_size, 1.0, config.water_half_size),
    }
}

/// Draw ranges of the loaded models
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneRanges {
    /// Skybox cube
    pub skybox: MeshRange,
    /// Chalet model
    pub chalet: MeshRange,
    /// Lake bed model
    pub lake: MeshRange,
}

/// The textured objects of the water scene in draw order
pub fn water_scene(ranges: &SceneRanges) -> Vec<SceneObject> {
    vec![
        SceneObject {
            tag: "skybox",
            range: ranges.skybox,
            texture: ObjectTexture::Skybox,
            transform: Transform::default(),
            kind: ObjectKind::Skybox,
            reflected: true,
        },
        SceneObject {
            tag: "chalet",
            range: ranges.chalet,
            texture: ObjectTexture::Chalet,
            transform: Transform::from_euler_degrees(
                Vec3::new(-4.3177, 1.8368, 4.7955),
                Vec3::new(-90.0, 0.0, 0.0),
                Vec3::new(1.0, 1.0, 1.0),
            ),
            kind: ObjectKind::Model,
            reflected: true,
        },
        SceneObject {
            tag: "lake",
            range: ranges.lake,
            texture: ObjectTexture::Lake,
            transform: Transform::default(),
            kind: ObjectKind::Model,
            reflected: false,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    fn scene() -> Vec<SceneObject> {
        water_scene(&SceneRanges {
            skybox: MeshRange::default(),
            chalet: MeshRange::default(),
            lake: MeshRange::default(),
        })
    }

    #[test]
    fn test_skybox_follows_camera() {
        let skybox = &scene()[0];
        let camera = Vec3::new(2.0, 0.5, -3.0);
        let center = model_matrix(skybox, &camera).transform_point(&Point3::origin());
        assert_relative_eq!(center.coords, camera, epsilon = 1e-6);
    }

    #[test]
    fn test_chalet_is_rotated_onto_its_side_and_placed() {
        let chalet = &scene()[1];
        let model = model_matrix(chalet, &Vec3::zeros());

        let origin = model.transform_point(&Point3::origin());
        assert_relative_eq!(origin, Point3::new(-4.3177, 1.8368, 4.7955), epsilon = 1e-5);

        // Model +Z (up in the file) becomes world +Y
        let up = model.transform_vector(&Vec3::z());
        assert_relative_eq!(up, Vec3::y(), epsilon = 1e-5);
    }

    #[test]
    fn test_reflected_model_is_mirrored_about_water() {
        let chalet = &scene()[1];
        let camera = Vec3::zeros();
        let h = 0.25;

        let p = model_matrix(chalet, &camera).transform_point(&Point3::origin());
        let r = reflected_model_matrix(chalet, &camera, h).transform_point(&Point3::origin());
        assert_relative_eq!(r.x, p.x, epsilon = 1e-5);
        assert_relative_eq!(r.y, 2.0 * h - p.y, epsilon = 1e-5);
        assert_relative_eq!(r.z, p.z, epsilon = 1e-5);
    }

    #[test]
    fn test_reflected_skybox_stays_on_camera() {
        let skybox = &scene()[0];
        let camera = Vec3::new(1.0, 3.0, 2.0);
        let center = reflected_model_matrix(skybox, &camera, 0.0).transform_point(&Point3::origin());
        assert_relative_eq!(center.coords, camera, epsilon = 1e-5);
    }

    #[test]
    fn test_reflection_capture_keeps_mirrored_scenery() {
        let h = 0.0;
        let chalet = &scene()[1];
        let pass = CapturePass::reflection(h);

        // The chalet stands above the water; mirrored, it must survive the clip
        let mirrored = reflected_model_matrix(chalet, &Vec3::zeros(), h).transform_point(&Point3::origin());
        assert!(pass.clip.keeps([mirrored.x, mirrored.y, mirrored.z]));

        // Refraction drops it
        let plain = model_matrix(chalet, &Vec3::zeros()).transform_point(&Point3::origin());
        assert!(!CapturePass::refraction(h).clip.keeps([plain.x, plain.y, plain.z]));
    }

    #[test]
    fn test_pass_order_and_layouts() {
        let passes = CapturePass::all(0.0);
        let kinds: Vec<PassKind> = passes.iter().map(|p| p.kind).collect();
        assert_eq!(kinds, vec![PassKind::Refraction, PassKind::Reflection, PassKind::Surface]);

        assert!(passes[0].is_capture() && passes[1].is_capture());
        assert!(passes[0].layouts.color_is_sampled());
        assert!(!passes[2].layouts.color_is_sampled());
    }

    #[test]
    fn test_uniforms_depend_only_on_inputs() {
        let objects = scene();
        let pass = CapturePass::surface();
        let camera = Vec3::new(0.0, 0.5, 3.0);
        let view = Mat4::identity();
        let proj = Mat4::perspective_zo(1.0, 1.5, 0.1, 100.0);

        let a = object_uniform(&objects[1], &pass, &camera, &view, &proj, 0.0);
        let b = object_uniform(&objects[1], &pass, &camera, &view, &proj, 0.0);
        assert_eq!(a, b);
        assert_eq!(a.proj, <[[f32; 4]; 4]>::from(proj));
    }

    #[test]
    fn test_water_transform_scales_grid() {
        let config = SceneConfig {
            water_height: 0.3,
            water_half_size: 8.0,
            ..SceneConfig::default()
        };
        let model = water_transform(&config).to_matrix();
        let corner = model.transform_point(&Point3::new(1.0, 0.0, -1.0));
        assert_relative_eq!(corner, Point3::new(8.0, 0.3, -8.0), epsilon = 1e-6);
    }
}
