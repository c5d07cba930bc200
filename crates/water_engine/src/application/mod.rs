//! Application lifecycle and the frame loop
//!
//! [`WaterApplication`] owns the window, the Vulkan context and every
//! resource of the water scene, and drives one frame per loop iteration:
//!
//! ```text
//! wait slot fence ─> acquire ─> wait image owner ─> write uniforms
//!   ─> submit compute ─> submit passes (+ overlay) ─> present
//! ```
//!
//! Compute waits on image acquisition; graphics waits on compute; present
//! waits on graphics. An out-of-date swapchain at acquire, or an out-of-date
//! or suboptimal one (or a resize) at present, rebuilds every
//! swapchain-dependent resource before the next frame.

pub mod frame;
pub mod overlay;
pub mod setup;

use ash::vk;
use std::time::Duration;
use thiserror::Error;

use crate::assets::AssetError;
use crate::config::ConfigError;
use crate::core::config::ApplicationConfig;
use crate::foundation::math::Vec3;
use crate::foundation::time::Timer;
use crate::render::backends::vulkan::resources::registry::DescriptorRegistry;
use crate::render::backends::vulkan::resources::uniform::{SimulationInput, UniformBufferObject};
use crate::render::backends::vulkan::state::sync::{wait_for_fence, FrameCounter, FrameSync, ImageFenceTracker};
use crate::render::backends::vulkan::{VulkanContext, VulkanError, VulkanResult};
use crate::render::camera::Camera;
use crate::render::window::{Window, WindowError};
use crate::scene::{object_uniform, water_transform};

use frame::{
    decide_after_acquire, decide_after_present, graphics_submission, graphics_wait_stages, FrameOutcome,
    RecreatePlan, COMPUTE_WAIT_STAGE,
};
use overlay::{NoOverlay, Overlay};
use setup::{SceneAssets, SceneLayout, SwapchainResources};

/// Application-level errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Window system failure
    #[error("Window error: {0}")]
    Window(#[from] WindowError),

    /// Vulkan failure
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] VulkanError),

    /// Configuration could not be loaded or is invalid
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Model or image could not be loaded
    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),
}

/// Result type for application operations
pub type AppResult<T> = Result<T, AppError>;

/// Where the camera starts
const CAMERA_START: [f32; 3] = [0.0, 0.5, 3.0];

/// How often the title bar FPS is refreshed
const FPS_INTERVAL: Duration = Duration::from_secs(1);

/// The water renderer
pub struct WaterApplication {
    // Field order is drop order: swapchain resources before the pool's
    // layouts, everything GPU before the context, the context before the window.
    frame: Option<SwapchainResources>,
    registry: DescriptorRegistry,
    layout: SceneLayout,
    assets: SceneAssets,
    sync: Vec<FrameSync>,
    overlay: Box<dyn Overlay>,
    images_in_flight: ImageFenceTracker<vk::Fence>,
    frames: FrameCounter,
    camera: Camera,
    timer: Timer,
    config: ApplicationConfig,
    context: VulkanContext,
    window: Window,
}

impl WaterApplication {
    /// Open the window, load the scene and build the first swapchain
    pub fn new(config: ApplicationConfig) -> AppResult<Self> {
        let window = Window::new(&config.window)?;
        let context = VulkanContext::new(
            &window,
            &config.renderer.application_name,
            config.renderer.validation_enabled(),
        )?;

        let assets = SceneAssets::load(&context, &config.scene)?;
        let mut registry = DescriptorRegistry::new(&context);
        let layout = SceneLayout::declare(&mut registry, &assets, config.scene.water_height)?;

        let (width, height) = window.framebuffer_size();
        let extent = vk::Extent2D { width, height };
        let frame = SwapchainResources::build(&context, &config, extent, &assets, &layout, &mut registry)?;

        let sync = FrameSync::create_slots(context.device(), config.renderer.max_frames_in_flight)?;
        let images_in_flight = ImageFenceTracker::new(frame.swapchain.size());
        let frames = FrameCounter::new(config.renderer.max_frames_in_flight);
        let camera = Camera::new(Vec3::from(CAMERA_START), window.aspect_ratio());

        log::info!(
            "Water renderer ready: {} swapchain images, {} frames in flight",
            frame.swapchain.size(),
            frames.max_in_flight()
        );

        Ok(Self {
            frame: Some(frame),
            registry,
            layout,
            assets,
            sync,
            overlay: Box::new(NoOverlay),
            images_in_flight,
            frames,
            camera,
            timer: Timer::new(),
            config,
            context,
            window,
        })
    }

    /// Replace the overlay drawn over the surface pass
    pub fn with_overlay(mut self, mut overlay: Box<dyn Overlay>) -> AppResult<Self> {
        if let Some(frame) = &self.frame {
            overlay.image_count_changed(frame.swapchain.size());
            overlay.on_resize(&self.context, &frame.swapchain)?;
        }
        self.overlay = overlay;
        Ok(self)
    }

    /// Vulkan context
    pub fn context(&self) -> &VulkanContext {
        &self.context
    }

    /// Run until the window closes
    pub fn run(&mut self) -> AppResult<()> {
        log::info!("Entering main loop");

        while !self.window.should_close() {
            self.window.poll_events();
            self.timer.update();

            let input = self.window.camera_input();
            self.camera
                .update(self.timer.delta_time(), &input, self.window.aspect_ratio());

            self.draw_frame()?;

            if let Some(fps) = self.timer.sample_fps(FPS_INTERVAL) {
                let title = format!("{} - {:.0} FPS", self.config.window.title, fps);
                self.window.set_title(&title);
            }
        }

        self.context.wait_idle()?;
        log::info!("Main loop finished after {} frames", self.timer.frame_count());
        Ok(())
    }

    /// Render and present one frame
    pub fn draw_frame(&mut self) -> AppResult<()> {
        let slot = self.frames.current();
        let (image_available, compute_finished, render_finished, in_flight) = {
            let sync = &self.sync[slot];
            sync.in_flight.wait()?;
            (
                sync.image_available.handle(),
                sync.compute_finished.handle(),
                sync.render_finished.handle(),
                sync.in_flight.handle(),
            )
        };

        let Some(frame) = self.frame.as_ref() else {
            return self.recreate_swapchain();
        };

        let (image_index, status) = frame.swapchain.acquire_next_image(image_available)?;
        if decide_after_acquire(status) == FrameOutcome::Recreate {
            return self.recreate_swapchain();
        }
        let image = image_index as usize;

        if let Some(previous) = self.images_in_flight.claim(image, in_flight) {
            if previous != in_flight {
                wait_for_fence(self.context.device(), previous)?;
            }
        }

        self.update_uniforms(image)?;
        let overlay = self.overlay.command_buffer(image)?;

        self.sync[slot].in_flight.reset()?;

        let device = self.context.device();

        let compute_buffers = [frame.compute.command_buffer(image)];
        let compute_wait = [image_available];
        let compute_stages = [COMPUTE_WAIT_STAGE];
        let compute_signal = [compute_finished];
        let compute_submit = vk::SubmitInfo::builder()
            .wait_semaphores(&compute_wait)
            .wait_dst_stage_mask(&compute_stages)
            .command_buffers(&compute_buffers)
            .signal_semaphores(&compute_signal)
            .build();
        unsafe {
            device
                .queue_submit(self.context.compute_queue(), &[compute_submit], vk::Fence::null())
                .map_err(VulkanError::Api)?;
        }

        let passes: Vec<vk::CommandBuffer> = frame
            .targets
            .iter()
            .map(|t| t.target.command_buffer(image))
            .collect();
        let graphics_buffers = graphics_submission(&passes, overlay);
        let graphics_wait = [compute_finished];
        let graphics_stages = [graphics_wait_stages()];
        let graphics_signal = [render_finished];
        let graphics_submit = vk::SubmitInfo::builder()
            .wait_semaphores(&graphics_wait)
            .wait_dst_stage_mask(&graphics_stages)
            .command_buffers(&graphics_buffers)
            .signal_semaphores(&graphics_signal)
            .build();
        unsafe {
            device
                .queue_submit(self.context.graphics_queue(), &[graphics_submit], in_flight)
                .map_err(VulkanError::Api)?;
        }

        let status = frame
            .swapchain
            .present(self.context.present_queue(), image_index, render_finished)?;

        let resized = self.window.take_resized();
        self.frames.advance();
        if decide_after_present(status, resized) == FrameOutcome::Recreate {
            self.recreate_swapchain()?;
        }
        Ok(())
    }

    /// Write every uniform slot of swapchain image `image` from the current camera
    fn update_uniforms(&self, image: usize) -> VulkanResult<()> {
        let view = self.camera.view();
        let proj = self.camera.projection();
        let position = self.camera.position;
        let water_height = self.config.scene.water_height;

        for meshes in &self.layout.passes {
            for &(index, mesh) in &meshes.objects {
                let ubo = object_uniform(&self.assets.objects[index], &meshes.pass, &position, &view, &proj, water_height);
                self.registry.write_uniform(mesh, image, 0, &ubo)?;
            }
        }

        let water_model = water_transform(&self.config.scene).to_matrix();
        self.registry
            .write_uniform(self.layout.water, image, 0, &UniformBufferObject::new(&water_model, &view, &proj))?;

        let input = SimulationInput::new(self.window.mouse_pressed());
        self.registry.write_uniform(self.layout.simulation, image, 0, &input)
    }

    /// Rebuild every swapchain-dependent resource
    ///
    /// Blocks while the window is minimized. Returns without rebuilding if the
    /// window is closed in the meantime; the next frame retries.
    pub fn recreate_swapchain(&mut self) -> AppResult<()> {
        let extent = loop {
            let (width, height) = self.window.framebuffer_size();
            match RecreatePlan::for_framebuffer(width, height) {
                RecreatePlan::Rebuild { extent } => break extent,
                RecreatePlan::WaitForRestore => {
                    if self.window.should_close() {
                        return Ok(());
                    }
                    self.window.wait_events();
                }
            }
        };

        log::debug!("Recreating swapchain at {}x{}", extent.width, extent.height);
        self.context.wait_idle()?;

        self.frame = None;
        self.registry.free_pool();

        let frame = SwapchainResources::build(
            &self.context,
            &self.config,
            extent,
            &self.assets,
            &self.layout,
            &mut self.registry,
        )?;

        let image_count = frame.swapchain.size();
        self.images_in_flight.reset(image_count);
        self.overlay.image_count_changed(image_count);
        self.overlay.on_resize(&self.context, &frame.swapchain)?;
        self.frame = Some(frame);

        log::info!(
            "Swapchain recreated: {}x{}, {} images",
            extent.width,
            extent.height,
            image_count
        );
        Ok(())
    }
}

impl Drop for WaterApplication {
    fn drop(&mut self) {
        if let Err(e) = self.context.wait_idle() {
            log::error!("Failed to wait for device idle during shutdown: {}", e);
        }
    }
}

/// Build the application from `config` and run it until the window closes
pub fn run(config: ApplicationConfig) -> AppResult<()> {
    let mut app = WaterApplication::new(config)?;
    app.run()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_convert_from_layers() {
        let err: AppError = VulkanError::NoSuitableMemoryType.into();
        assert!(matches!(err, AppError::Vulkan(_)));
        assert!(err.to_string().starts_with("Vulkan error"));

        let err: AppError = WindowError::CreationFailed.into();
        assert!(matches!(err, AppError::Window(_)));
    }

    #[test]
    fn test_camera_starts_above_water() {
        let config = ApplicationConfig::default();
        assert!(CAMERA_START[1] > config.scene.water_height);
    }
}
