//! Vulkan synchronization primitives for GPU/CPU coordination
//!
//! RAII wrappers for semaphores and fences, the per-slot [`FrameSync`] bundle,
//! and the two pieces of host-side bookkeeping the frame loop needs:
//!
//! - [`FrameCounter`] cycles the frame slot modulo the frames-in-flight limit.
//! - [`ImageFenceTracker`] remembers which slot fence last submitted work that
//!   touched a given swapchain image, so the host can wait on it before
//!   overwriting that image's uniform buffers or resubmitting its command
//!   buffers.
//!
//! ## Semaphore chain per frame
//! ```text
//! acquire ──image_available──▶ compute ──compute_finished──▶ graphics ──render_finished──▶ present
//!                                                               └── signals in_flight (slot fence)
//! ```
//!
//! The tracker is generic over the fence id so the ownership rules are
//! testable without a device.

use ash::{vk, Device};

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// GPU-GPU synchronization primitive with automatic resource management
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new binary semaphore
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();

        let semaphore = unsafe {
            device
                .create_semaphore(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Fence wrapper with RAII cleanup
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence
    pub fn new(device: Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::builder().flags(flags);

        let fence = unsafe { device.create_fence(&create_info, None).map_err(VulkanError::Api)? };

        Ok(Self { device, fence })
    }

    /// Block until the fence is signaled
    pub fn wait(&self) -> VulkanResult<()> {
        wait_for_fence(&self.device, self.fence)
    }

    /// Reset fence to unsignaled
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe { self.device.reset_fences(&[self.fence]).map_err(VulkanError::Api) }
    }

    /// Get the fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// Block on a raw fence handle with no timeout
pub fn wait_for_fence(device: &Device, fence: vk::Fence) -> VulkanResult<()> {
    unsafe {
        device
            .wait_for_fences(&[fence], true, u64::MAX)
            .map_err(VulkanError::Api)
    }
}

/// Synchronization objects for one frame slot
pub struct FrameSync {
    /// Signaled when the acquired swapchain image is ready
    pub image_available: Semaphore,
    /// Signaled when the simulation dispatch has finished
    pub compute_finished: Semaphore,
    /// Signaled when all graphics passes have finished
    pub render_finished: Semaphore,
    /// Host waits on this before reusing the slot; created signaled
    pub in_flight: Fence,
}

impl FrameSync {
    /// Create frame synchronization objects
    pub fn new(device: Device) -> VulkanResult<Self> {
        let image_available = Semaphore::new(device.clone())?;
        let compute_finished = Semaphore::new(device.clone())?;
        let render_finished = Semaphore::new(device.clone())?;
        let in_flight = Fence::new(device, true)?;

        Ok(Self {
            image_available,
            compute_finished,
            render_finished,
            in_flight,
        })
    }

    /// One bundle per frame slot
    pub fn create_slots(device: &Device, count: usize) -> VulkanResult<Vec<Self>> {
        (0..count).map(|_| Self::new(device.clone())).collect()
    }
}

/// Current frame slot, advancing modulo the frames-in-flight limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCounter {
    current: usize,
    max_in_flight: usize,
}

impl FrameCounter {
    /// Start at slot 0; `max_in_flight` is clamped to at least 1
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            current: 0,
            max_in_flight: max_in_flight.max(1),
        }
    }

    /// Slot index in `0..max_in_flight`
    pub fn current(&self) -> usize {
        self.current
    }

    /// Number of slots
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Move to the next slot
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.max_in_flight;
    }
}

/// Per-swapchain-image record of the fence guarding its last submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFenceTracker<F> {
    owners: Vec<Option<F>>,
}

impl<F: Copy + PartialEq> ImageFenceTracker<F> {
    /// Tracker for `image_count` images, all unowned
    pub fn new(image_count: usize) -> Self {
        Self {
            owners: vec![None; image_count],
        }
    }

    /// Record `fence` as the owner of `image`
    ///
    /// Returns the previous owner when it differs from `fence`; the caller
    /// must wait on it before touching the image's per-image resources.
    pub fn claim(&mut self, image: usize, fence: F) -> Option<F> {
        let previous = self.owners[image].replace(fence);
        previous.filter(|prev| *prev != fence)
    }

    /// Current owner of `image`
    pub fn owner(&self, image: usize) -> Option<F> {
        self.owners[image]
    }

    /// Forget every owner and resize for a rebuilt swapchain
    pub fn reset(&mut self, image_count: usize) {
        self.owners.clear();
        self.owners.resize(image_count, None);
    }

    /// Number of tracked images
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    /// Whether no images are tracked
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_counter_wraps() {
        let mut counter = FrameCounter::new(2);
        let slots: Vec<usize> = (0..5)
            .map(|_| {
                let slot = counter.current();
                counter.advance();
                slot
            })
            .collect();
        assert_eq!(slots, vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn test_frame_counter_never_zero_slots() {
        let mut counter = FrameCounter::new(0);
        counter.advance();
        assert_eq!(counter.current(), 0);
        assert_eq!(counter.max_in_flight(), 1);
    }

    #[test]
    fn test_first_claim_needs_no_wait() {
        let mut tracker = ImageFenceTracker::new(3);
        assert_eq!(tracker.claim(1, 'a'), None);
        assert_eq!(tracker.owner(1), Some('a'));
    }

    #[test]
    fn test_claim_by_other_slot_returns_previous_owner() {
        // Three images, two slots: slot B lands on the image slot A still owns
        let mut tracker = ImageFenceTracker::new(3);
        tracker.claim(0, 'A');
        tracker.claim(1, 'B');
        tracker.claim(2, 'A');

        assert_eq!(tracker.claim(0, 'B'), Some('A'));
        assert_eq!(tracker.owner(0), Some('B'));
    }

    #[test]
    fn test_reclaim_by_same_slot_is_not_a_wait() {
        let mut tracker = ImageFenceTracker::new(2);
        tracker.claim(0, 7u64);
        assert_eq!(tracker.claim(0, 7u64), None);
    }

    #[test]
    fn test_no_two_images_report_a_stale_owner_after_reset() {
        let mut tracker = ImageFenceTracker::new(2);
        tracker.claim(0, 1u32);
        tracker.claim(1, 2u32);

        tracker.reset(4);
        assert_eq!(tracker.len(), 4);
        assert!((0..4).all(|i| tracker.owner(i).is_none()));

        // A second reset is the same state as one
        let once = tracker.clone();
        tracker.reset(4);
        assert_eq!(tracker, once);
    }
}
