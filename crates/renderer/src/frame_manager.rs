//! Frame pacing and synchronization.
//!
//! The scheduler implements the "frames in flight" pattern: while the GPU
//! renders frame N, the CPU records frame N+1 into another slot.
//!
//! ```text
//! 1. Wait on in_flight[current]
//! 2. Acquire an image (signals image_available[current])
//!    OUT_OF_DATE → recreate the swapchain and skip the frame
//! 3. If images_in_flight[image] belongs to another slot, wait on its fence
//!    and hand the image to the current slot
//! 4. Reset and record the command buffer of the image
//! 5. Reset in_flight[current], submit (wait image_available, signal
//!    render_finished, fence in_flight)
//! 6. Present (wait render_finished); OUT_OF_DATE/SUBOPTIMAL → recreate
//! 7. current = (current + 1) % frames_in_flight
//! ```
//!
//! [`FrameSlots`] holds the bookkeeping of steps 3 and 7 without touching
//! Vulkan, so the fence aliasing rules can be tested on their own.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, trace};

use renderer_rhi::command::{CommandBuffer, CommandPool};
use renderer_rhi::device::Device;
use renderer_rhi::swapchain::Swapchain;
use renderer_rhi::sync::{Fence, FrameSync};

use crate::error::{RenderError, RenderResult};

/// Frame slot cursor and swapchain image ownership.
#[derive(Clone, Debug)]
pub struct FrameSlots {
    frames_in_flight: usize,
    current: usize,
    /// Frame slot whose fence guards the last submission of each image.
    images_in_flight: Vec<Option<usize>>,
}

impl FrameSlots {
    pub fn new(frames_in_flight: usize, image_count: usize) -> Self {
        Self {
            frames_in_flight: frames_in_flight.max(1),
            current: 0,
            images_in_flight: vec![None; image_count],
        }
    }

    #[inline]
    pub fn current(&self) -> usize {
        self.current
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images_in_flight.len()
    }

    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.frames_in_flight;
    }

    /// Forgets every image owner; used when the swapchain is rebuilt.
    pub fn resize_images(&mut self, image_count: usize) {
        self.images_in_flight.clear();
        self.images_in_flight.resize(image_count, None);
    }

    /// Hands `image_index` to the current slot.
    ///
    /// Returns the slot whose fence must be waited on before the image is
    /// rendered to again. The current slot's own fence has already been
    /// waited on, so it is never returned.
    pub fn claim_image(&mut self, image_index: usize) -> Option<usize> {
        if image_index >= self.images_in_flight.len() {
            self.images_in_flight.resize(image_index + 1, None);
        }
        let previous = self.images_in_flight[image_index].replace(self.current);
        previous.filter(|&slot| slot != self.current)
    }

    pub fn image_owner(&self, image_index: usize) -> Option<usize> {
        self.images_in_flight.get(image_index).copied().flatten()
    }
}

/// A frame that acquired a swapchain image and may be recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AcquiredFrame {
    pub frame_index: usize,
    pub image_index: u32,
    pub suboptimal: bool,
}

/// Owns per-slot sync objects and per-image command buffers.
pub struct FrameScheduler {
    device: Arc<Device>,
    command_pool: Arc<CommandPool>,
    sync: Vec<FrameSync>,
    slots: FrameSlots,
    command_buffers: Vec<vk::CommandBuffer>,
    frame_number: u64,
}

impl FrameScheduler {
    pub fn new(
        device: Arc<Device>,
        command_pool: Arc<CommandPool>,
        frames_in_flight: usize,
        image_count: usize,
    ) -> RenderResult<Self> {
        let frames_in_flight = frames_in_flight.max(1);
        let sync = (0..frames_in_flight)
            .map(|_| FrameSync::new(device.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        let command_buffers = command_pool.allocate_command_buffers(image_count as u32)?;

        info!(
            "Frame scheduler created with {} frames in flight, {} images",
            frames_in_flight, image_count
        );

        Ok(Self {
            device,
            command_pool,
            sync,
            slots: FrameSlots::new(frames_in_flight, image_count),
            command_buffers,
            frame_number: 0,
        })
    }

    #[inline]
    pub fn current_frame(&self) -> usize {
        self.slots.current()
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.slots.frames_in_flight()
    }

    /// Number of frames presented so far.
    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Steps 1 to 3. Returns `None` when the swapchain is out of date; the
    /// caller recreates it and skips the frame without advancing.
    pub fn begin_frame(&mut self, swapchain: &Swapchain) -> RenderResult<Option<AcquiredFrame>> {
        let frame_index = self.slots.current();
        let sync = &self.sync[frame_index];
        sync.in_flight().wait(u64::MAX)?;

        let (image_index, suboptimal) = match swapchain.acquire_next_image(sync.image_available())
        {
            Ok(acquired) => acquired,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Swapchain out of date during acquire");
                return Ok(None);
            }
            Err(e) => return Err(RenderError::Rhi(e.into())),
        };

        if let Some(previous) = self.slots.claim_image(image_index as usize) {
            trace!(
                "Image {} still owned by frame slot {}, waiting",
                image_index, previous
            );
            Fence::wait_raw(&self.device, self.sync[previous].in_flight().handle(), u64::MAX)?;
        }

        Ok(Some(AcquiredFrame {
            frame_index,
            image_index,
            suboptimal,
        }))
    }

    /// Command buffer of the acquired image, reset and ready to record.
    pub fn begin_recording(&self, frame: &AcquiredFrame) -> RenderResult<CommandBuffer> {
        let handle = self
            .command_buffers
            .get(frame.image_index as usize)
            .copied()
            .ok_or_else(|| {
                RenderError::Internal(format!(
                    "no command buffer for swapchain image {}",
                    frame.image_index
                ))
            })?;
        let cmd = CommandBuffer::from_handle(self.device.clone(), handle);
        cmd.reset()?;
        cmd.begin()?;
        Ok(cmd)
    }

    /// Steps 5 and 6. Returns `true` when the swapchain must be recreated.
    /// Always advances to the next slot.
    pub fn submit_and_present(
        &mut self,
        swapchain: &Swapchain,
        frame: &AcquiredFrame,
        cmd: &CommandBuffer,
    ) -> RenderResult<bool> {
        let sync = &self.sync[frame.frame_index];
        sync.in_flight().reset()?;

        let wait_info = vk::SemaphoreSubmitInfo::default()
            .semaphore(sync.image_available())
            .stage_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
        let signal_info = vk::SemaphoreSubmitInfo::default()
            .semaphore(sync.render_finished())
            .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS);
        let cmd_info = vk::CommandBufferSubmitInfo::default().command_buffer(cmd.handle());
        let submit = vk::SubmitInfo2::default()
            .wait_semaphore_infos(std::slice::from_ref(&wait_info))
            .command_buffer_infos(std::slice::from_ref(&cmd_info))
            .signal_semaphore_infos(std::slice::from_ref(&signal_info));

        unsafe {
            self.device
                .submit_graphics(std::slice::from_ref(&submit), sync.in_flight().handle())?;
        }

        let needs_recreate = match swapchain.present(
            self.device.present_queue(),
            frame.image_index,
            sync.render_finished(),
        ) {
            Ok(suboptimal) => suboptimal || frame.suboptimal,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) | Err(vk::Result::SUBOPTIMAL_KHR) => {
                debug!("Swapchain out of date during present");
                true
            }
            Err(e) => {
                self.slots.advance();
                return Err(RenderError::Rhi(e.into()));
            }
        };

        self.slots.advance();
        self.frame_number += 1;
        Ok(needs_recreate)
    }

    /// Reallocates the per-image command buffers and clears image
    /// ownership. The device must be idle.
    pub fn on_swapchain_recreated(&mut self, image_count: usize) -> RenderResult<()> {
        self.command_pool.free_command_buffers(&self.command_buffers);
        self.command_buffers = self
            .command_pool
            .allocate_command_buffers(image_count as u32)?;
        self.slots.resize_images(image_count);
        debug!("Frame scheduler reset for {} images", image_count);
        Ok(())
    }

    /// Blocks until every slot's last submission has completed.
    pub fn wait_all(&self) -> RenderResult<()> {
        for sync in &self.sync {
            sync.in_flight().wait(u64::MAX)?;
        }
        Ok(())
    }
}

impl Drop for FrameScheduler {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            tracing::error!("Failed to wait for device idle: {}", e);
        }
        self.command_pool.free_command_buffers(&self.command_buffers);
        debug!("Frame scheduler destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_wraps() {
        let mut slots = FrameSlots::new(2, 3);
        assert_eq!(slots.current(), 0);
        slots.advance();
        assert_eq!(slots.current(), 1);
        slots.advance();
        assert_eq!(slots.current(), 0);
    }

    #[test]
    fn test_zero_frames_in_flight_is_clamped() {
        let mut slots = FrameSlots::new(0, 2);
        assert_eq!(slots.frames_in_flight(), 1);
        slots.advance();
        assert_eq!(slots.current(), 0);
    }

    #[test]
    fn test_claim_returns_other_slot_only() {
        let mut slots = FrameSlots::new(2, 3);
        assert_eq!(slots.claim_image(0), None);
        assert_eq!(slots.image_owner(0), Some(0));

        slots.advance();
        assert_eq!(slots.claim_image(0), Some(0));
        assert_eq!(slots.image_owner(0), Some(1));

        // Same slot again: its fence was already waited on.
        assert_eq!(slots.claim_image(0), None);
    }

    #[test]
    fn test_resize_clears_owners() {
        let mut slots = FrameSlots::new(2, 2);
        slots.claim_image(1);
        slots.resize_images(4);
        assert_eq!(slots.image_count(), 4);
        assert!((0..4).all(|i| slots.image_owner(i).is_none()));
    }

    #[test]
    fn test_out_of_range_image_grows() {
        let mut slots = FrameSlots::new(2, 1);
        assert_eq!(slots.claim_image(3), None);
        assert_eq!(slots.image_count(), 4);
    }

    /// Replays an acquire order against a model of the GPU: each
    /// submission stays pending until its slot's fence is waited on. No
    /// image may be rendered to while its last submission is pending.
    fn wait(slot: usize, pending: &mut [Option<usize>], done: &mut [bool]) {
        if let Some(id) = pending[slot].take() {
            done[id] = true;
        }
    }

    #[test]
    fn test_fence_aliasing_never_reuses_busy_image() {
        let acquire_order = [0usize, 1, 2, 0, 2, 1, 1, 0, 2, 2, 0, 1, 0, 0, 2];
        let mut slots = FrameSlots::new(2, 3);

        let mut fence_pending: Vec<Option<usize>> = vec![None; 2];
        let mut completed: Vec<bool> = Vec::new();
        let mut last_submission: Vec<Option<usize>> = vec![None; 3];

        for &image in &acquire_order {
            let current = slots.current();
            wait(current, &mut fence_pending, &mut completed);

            if let Some(previous) = slots.claim_image(image) {
                wait(previous, &mut fence_pending, &mut completed);
            }

            if let Some(id) = last_submission[image] {
                assert!(completed[id], "image {image} reused while submission {id} pending");
            }

            let id = completed.len();
            completed.push(false);
            fence_pending[current] = Some(id);
            last_submission[image] = Some(id);
            slots.advance();
        }
    }

    #[test]
    fn test_scheduler_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<FrameSlots>();
    }
}
