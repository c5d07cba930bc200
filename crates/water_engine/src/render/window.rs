//! Window management using GLFW
//!
//! Creates a client-API-less window for Vulkan, turns GLFW events into the
//! three things the renderer cares about (resize flag, cursor position, close
//! request) and exposes key polling for the camera.

use ash::vk;
use glfw::{Action, Key, MouseButton, WindowEvent};
use thiserror::Error;

use crate::core::config::WindowConfig;
use crate::render::camera::CameraInput;

/// Window management errors
#[derive(Error, Debug)]
pub enum WindowError {
    /// GLFW could not be initialized
    #[error("GLFW initialization failed")]
    InitializationFailed,

    /// The window could not be created
    #[error("Window creation failed")]
    CreationFailed,

    /// The platform has no Vulkan loader visible to GLFW
    #[error("Vulkan is not supported by GLFW on this system")]
    VulkanUnsupported,

    /// Any other GLFW failure
    #[error("GLFW error: {0}")]
    GlfwError(String),
}

/// Result type for window operations
pub type WindowResult<T> = Result<T, WindowError>;

/// GLFW window wrapper
pub struct Window {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, WindowEvent)>,
    resized: bool,
    cursor: Option<(f64, f64)>,
}

impl Window {
    /// Create the window described by `config`
    pub fn new(config: &WindowConfig) -> WindowResult<Self> {
        let mut glfw = glfw::init(glfw::fail_on_errors).map_err(|_| WindowError::InitializationFailed)?;
        if !glfw.vulkan_supported() {
            return Err(WindowError::VulkanUnsupported);
        }

        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(config.resizable));

        let (mut window, events) = glfw
            .create_window(config.width, config.height, &config.title, glfw::WindowMode::Windowed)
            .ok_or(WindowError::CreationFailed)?;

        window.set_key_polling(true);
        window.set_close_polling(true);
        window.set_framebuffer_size_polling(true);
        window.set_cursor_pos_polling(true);
        window.set_cursor_mode(glfw::CursorMode::Disabled);

        log::info!("Created window {}x{} '{}'", config.width, config.height, config.title);

        Ok(Self {
            glfw,
            window,
            events,
            resized: false,
            cursor: None,
        })
    }

    /// Whether the user asked to close the window
    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    /// Poll and consume pending events
    pub fn poll_events(&mut self) {
        self.glfw.poll_events();
        self.drain_events();
    }

    /// Block until at least one event arrives (used while minimized)
    pub fn wait_events(&mut self) {
        self.glfw.wait_events();
        self.drain_events();
    }

    fn drain_events(&mut self) {
        for (_, event) in glfw::flush_messages(&self.events) {
            match event {
                WindowEvent::FramebufferSize(width, height) => {
                    log::debug!("Framebuffer resized to {}x{}", width, height);
                    self.resized = true;
                }
                WindowEvent::CursorPos(x, y) => self.cursor = Some((x, y)),
                WindowEvent::Key(Key::Escape, _, Action::Press, _) => self.window.set_should_close(true),
                _ => {}
            }
        }
    }

    /// Returns and clears the framebuffer-resized flag
    pub fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.resized)
    }

    /// Framebuffer size in pixels; `(0, 0)` while minimized
    pub fn framebuffer_size(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (width.max(0) as u32, height.max(0) as u32)
    }

    /// Width over height of the window, 1.0 while minimized
    pub fn aspect_ratio(&self) -> f32 {
        let (width, height) = self.window.get_size();
        if width > 0 && height > 0 {
            width as f32 / height as f32
        } else {
            1.0
        }
    }

    /// Sample key state and the latest cursor position for the camera
    pub fn camera_input(&mut self) -> CameraInput {
        let pressed = |key| self.window.get_key(key) == Action::Press;
        CameraInput {
            forward: pressed(Key::W),
            back: pressed(Key::S),
            left: pressed(Key::A),
            right: pressed(Key::D),
            roll_left: pressed(Key::Q),
            roll_right: pressed(Key::E),
            up: pressed(Key::Space),
            down: pressed(Key::Backspace),
            cursor: self.cursor.take(),
        }
    }

    /// Whether the left mouse button is held (drives the simulation input)
    pub fn mouse_pressed(&self) -> bool {
        self.window.get_mouse_button(MouseButton::Button1) == Action::Press
    }

    /// Replace the window title
    pub fn set_title(&mut self, title: &str) {
        self.window.set_title(title);
    }

    /// Get required Vulkan instance extensions from GLFW
    pub fn required_instance_extensions(&self) -> WindowResult<Vec<String>> {
        self.glfw
            .get_required_instance_extensions()
            .ok_or_else(|| WindowError::GlfwError("Failed to get required extensions".to_string()))
    }

    /// Create a Vulkan surface for this window
    pub fn create_vulkan_surface(&self, instance: vk::Instance) -> WindowResult<vk::SurfaceKHR> {
        let mut surface = vk::SurfaceKHR::null();
        let result = self.window.create_window_surface(instance, std::ptr::null(), &mut surface);

        if result == vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(WindowError::GlfwError(format!("Failed to create Vulkan surface: {:?}", result)))
        }
    }
}
