//! Per-frame decisions
//!
//! What the frame loop does after acquire and present, and what a recreate
//! request turns into, as plain functions of the reported status.

use ash::vk;

use crate::render::backends::vulkan::rendering::commands::graphics_read_stages;
use crate::render::backends::vulkan::state::swapchain::SwapchainStatus;

/// What the loop does after a swapchain call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Keep going with this swapchain
    Continue,
    /// Rebuild every swapchain-dependent resource first
    Recreate,
}

/// After acquire: only an out-of-date swapchain aborts the frame
///
/// A suboptimal image is still rendered and presented; the recreate happens
/// after present.
pub fn decide_after_acquire(status: SwapchainStatus) -> FrameOutcome {
    match status {
        SwapchainStatus::OutOfDate => FrameOutcome::Recreate,
        SwapchainStatus::Optimal | SwapchainStatus::Suboptimal => FrameOutcome::Continue,
    }
}

/// After present: out of date, suboptimal or a window resize all recreate
pub fn decide_after_present(status: SwapchainStatus, resized: bool) -> FrameOutcome {
    match status {
        SwapchainStatus::OutOfDate | SwapchainStatus::Suboptimal => FrameOutcome::Recreate,
        SwapchainStatus::Optimal if resized => FrameOutcome::Recreate,
        SwapchainStatus::Optimal => FrameOutcome::Continue,
    }
}

/// What a recreate request does given the current framebuffer size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecreatePlan {
    /// Minimized: block on window events until the framebuffer has area again
    WaitForRestore,
    /// Rebuild for this window extent
    Rebuild {
        /// Framebuffer size to build for
        extent: vk::Extent2D,
    },
}

impl RecreatePlan {
    /// Plan for a framebuffer of `width` × `height`
    pub fn for_framebuffer(width: u32, height: u32) -> Self {
        if width == 0 || height == 0 {
            RecreatePlan::WaitForRestore
        } else {
            RecreatePlan::Rebuild {
                extent: vk::Extent2D { width, height },
            }
        }
    }
}

/// Stage the compute submission waits on `image_available` at
pub const COMPUTE_WAIT_STAGE: vk::PipelineStageFlags = vk::PipelineStageFlags::COMPUTE_SHADER;

/// Stages the graphics submission waits on `compute_finished` at
///
/// Includes the vertex stage: the water surface displaces its grid by the
/// height field.
pub fn graphics_wait_stages() -> vk::PipelineStageFlags {
    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | graphics_read_stages()
}

/// Command buffers of the graphics submission in execution order
///
/// Captures come first so the surface pass samples finished images; the
/// overlay draws last, on top.
pub fn graphics_submission(passes: &[vk::CommandBuffer], overlay: Option<vk::CommandBuffer>) -> Vec<vk::CommandBuffer> {
    passes.iter().copied().chain(overlay).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::vulkan::state::sync::ImageFenceTracker;
    use ash::vk::Handle;

    #[test]
    fn test_acquire_recreates_only_when_out_of_date() {
        assert_eq!(decide_after_acquire(SwapchainStatus::OutOfDate), FrameOutcome::Recreate);
        assert_eq!(decide_after_acquire(SwapchainStatus::Suboptimal), FrameOutcome::Continue);
        assert_eq!(decide_after_acquire(SwapchainStatus::Optimal), FrameOutcome::Continue);
    }

    #[test]
    fn test_present_recreates_on_any_mismatch() {
        assert_eq!(decide_after_present(SwapchainStatus::OutOfDate, false), FrameOutcome::Recreate);
        assert_eq!(decide_after_present(SwapchainStatus::Suboptimal, false), FrameOutcome::Recreate);
        assert_eq!(decide_after_present(SwapchainStatus::Optimal, true), FrameOutcome::Recreate);
        assert_eq!(decide_after_present(SwapchainStatus::Optimal, false), FrameOutcome::Continue);
    }

    #[test]
    fn test_minimized_window_waits() {
        assert_eq!(RecreatePlan::for_framebuffer(0, 600), RecreatePlan::WaitForRestore);
        assert_eq!(RecreatePlan::for_framebuffer(800, 0), RecreatePlan::WaitForRestore);
    }

    #[test]
    fn test_resize_sequence_rebuilds_at_each_size() {
        let plans: Vec<RecreatePlan> = [(1280, 768), (640, 480), (1280, 768)]
            .into_iter()
            .map(|(w, h)| RecreatePlan::for_framebuffer(w, h))
            .collect();

        assert_eq!(
            plans[1],
            RecreatePlan::Rebuild {
                extent: vk::Extent2D {
                    width: 640,
                    height: 480
                }
            }
        );
        assert_eq!(plans[0], plans[2]);
    }

    /// Recreating twice in a row leaves the same tracker state as once
    #[test]
    fn test_tracker_reset_is_idempotent() {
        let fence = vk::Fence::from_raw(7);
        let mut tracker = ImageFenceTracker::new(3);
        tracker.claim(1, fence);

        tracker.reset(2);
        let once: Vec<Option<vk::Fence>> = (0..tracker.len()).map(|i| tracker.owner(i)).collect();
        tracker.reset(2);
        let twice: Vec<Option<vk::Fence>> = (0..tracker.len()).map(|i| tracker.owner(i)).collect();

        assert_eq!(once, twice);
        assert_eq!(once, vec![None, None]);
    }

    #[test]
    fn test_overlay_draws_last() {
        let passes = [vk::CommandBuffer::from_raw(1), vk::CommandBuffer::from_raw(2)];
        let overlay = vk::CommandBuffer::from_raw(3);

        let with = graphics_submission(&passes, Some(overlay));
        assert_eq!(with.last(), Some(&overlay));
        assert_eq!(graphics_submission(&passes, None).len(), 2);
    }
}
