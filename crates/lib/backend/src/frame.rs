// Copyright (C) 2025 sable project

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use std::slice;

use ash::vk;
use log::info;

use crate::{
    AcquiredImage, BackendResult, DeviceContext, FreeGpuResource, Swapchain, MAX_FRAMES_IN_FLIGHT,
};

/// Sync primitives and the command buffer for one in-flight frame. The
/// fence starts signaled so the slot's first cycle doesn't block.
pub(crate) struct FrameSlot {
    pub fence: vk::Fence,
    pub acquire_semaphore: vk::Semaphore,
    pub render_finished_semaphore: vk::Semaphore,
    pub command_buffer: vk::CommandBuffer,
}

impl FrameSlot {
    fn new(device: &DeviceContext) -> BackendResult<Self> {
        let fence_create_info =
            vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);
        let semaphore_create_info = vk::SemaphoreCreateInfo::builder();
        unsafe {
            Ok(Self {
                fence: device.raw.create_fence(&fence_create_info, None)?,
                acquire_semaphore: device.raw.create_semaphore(&semaphore_create_info, None)?,
                render_finished_semaphore: device
                    .raw
                    .create_semaphore(&semaphore_create_info, None)?,
                command_buffer: device.allocate_command_buffer()?,
            })
        }
    }
}

impl FreeGpuResource for FrameSlot {
    fn free(&self, device: &ash::Device) {
        unsafe {
            device.destroy_fence(self.fence, None);
            device.destroy_semaphore(self.acquire_semaphore, None);
            device.destroy_semaphore(self.render_finished_semaphore, None);
        }
    }
}

/// Everything a scene needs to record into the current frame.
pub struct RecordContext<'a> {
    pub device: &'a ash::Device,
    pub command_buffer: vk::CommandBuffer,
    pub frame_index: usize,
    pub image_index: u32,
    pub framebuffer: vk::Framebuffer,
    pub render_area: vk::Rect2D,
}

/// A scene variant. The scheduler opens and closes the command buffer
/// and calls these in order; it never looks at the commands themselves.
pub trait SceneRenderer {
    fn begin(&mut self, context: &RecordContext) -> BackendResult<()>;
    fn bind(&mut self, context: &RecordContext) -> BackendResult<()>;
    fn draw(&mut self, context: &RecordContext) -> BackendResult<()>;
    fn end(&mut self, context: &RecordContext) -> BackendResult<()>;
}

/// Source of the surface's drawable size. Polled only during chain
/// rebuild; `wait_events` may block until the window changes (used to
/// sit out minimization).
pub trait SurfaceProvider {
    fn drawable_extent(&self) -> [u32; 2];
    fn wait_events(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was rendered and queued for presentation.
    Presented,
    /// Presented, then the chain was rebuilt (resize or staleness).
    PresentedAndRebuilt,
    /// The chain was out of date at acquire: nothing was recorded or
    /// submitted this cycle, the chain was rebuilt instead.
    SkippedAndRebuilt,
}

/// Rebuild request latched from the window. The decision merges it with
/// GPU-reported staleness; consuming happens exactly once per completed
/// rebuild, after recreation, so a request that lands while a frame is
/// in flight is never lost and never honored twice.
#[derive(Debug, Default)]
struct RebuildGate {
    resize_requested: bool,
}

impl RebuildGate {
    fn notify_resize(&mut self) {
        self.resize_requested = true;
    }

    fn needs_rebuild(&self, stale: bool, suboptimal: bool) -> bool {
        stale || suboptimal || self.resize_requested
    }

    fn rebuilt(&mut self) {
        self.resize_requested = false;
    }
}

/// Drives the wait/acquire/record/submit/present cycle with
/// [`MAX_FRAMES_IN_FLIGHT`] slots and owns the presentable chain.
pub struct FrameScheduler {
    swapchain: Swapchain,
    slots: [FrameSlot; MAX_FRAMES_IN_FLIGHT],
    current_frame: usize,
    gate: RebuildGate,
}

impl FrameScheduler {
    pub fn new(device: &DeviceContext, swapchain: Swapchain) -> BackendResult<Self> {
        Ok(Self {
            swapchain,
            slots: [FrameSlot::new(device)?, FrameSlot::new(device)?],
            current_frame: 0,
            gate: RebuildGate::default(),
        })
    }

    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    pub fn frame_index(&self) -> usize {
        self.current_frame
    }

    /// Latches a rebuild request from the window. Consumed exactly once,
    /// after the next rebuild completes.
    pub fn notify_resize(&mut self) {
        self.gate.notify_resize();
    }

    /// Runs one frame cycle. Out-of-date and suboptimal conditions are
    /// absorbed here; any other device result propagates as fatal.
    pub fn draw_frame(
        &mut self,
        device: &DeviceContext,
        window: &dyn SurfaceProvider,
        renderer: &mut dyn SceneRenderer,
    ) -> BackendResult<FrameOutcome> {
        let slot = &self.slots[self.current_frame];
        unsafe {
            device
                .raw
                .wait_for_fences(slice::from_ref(&slot.fence), true, u64::MAX)
        }?;

        let (image_index, suboptimal) =
            match self.swapchain.acquire_next_image(slot.acquire_semaphore)? {
                AcquiredImage::NeedRebuild => {
                    // Fence stays signaled, the slot is immediately
                    // reusable on the next cycle.
                    self.rebuild_swapchain(device, window)?;
                    return Ok(FrameOutcome::SkippedAndRebuilt);
                }
                AcquiredImage::Image { index, suboptimal } => (index, suboptimal),
            };

        unsafe {
            device.raw.reset_fences(slice::from_ref(&slot.fence))?;
            device
                .raw
                .reset_command_buffer(slot.command_buffer, vk::CommandBufferResetFlags::empty())?;
            device.raw.begin_command_buffer(
                slot.command_buffer,
                &vk::CommandBufferBeginInfo::builder(),
            )?;
        }
        let context = RecordContext {
            device: &device.raw,
            command_buffer: slot.command_buffer,
            frame_index: self.current_frame,
            image_index,
            framebuffer: self.swapchain.framebuffer(image_index),
            render_area: self.swapchain.render_area(),
        };
        renderer.begin(&context)?;
        renderer.bind(&context)?;
        renderer.draw(&context)?;
        renderer.end(&context)?;
        unsafe { device.raw.end_command_buffer(slot.command_buffer) }?;

        let wait_stage = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(slice::from_ref(&slot.acquire_semaphore))
            .wait_dst_stage_mask(slice::from_ref(&wait_stage))
            .command_buffers(slice::from_ref(&slot.command_buffer))
            .signal_semaphores(slice::from_ref(&slot.render_finished_semaphore))
            .build();
        unsafe {
            device.raw.queue_submit(
                device.graphics_queue.raw,
                slice::from_ref(&submit_info),
                slot.fence,
            )
        }?;

        let stale = self.swapchain.present(
            device.present_queue.raw,
            slot.render_finished_semaphore,
            image_index,
        )?;

        self.current_frame = (self.current_frame + 1) % MAX_FRAMES_IN_FLIGHT;

        if self.gate.needs_rebuild(stale, suboptimal) {
            self.rebuild_swapchain(device, window)?;
            Ok(FrameOutcome::PresentedAndRebuilt)
        } else {
            Ok(FrameOutcome::Presented)
        }
    }

    fn rebuild_swapchain(
        &mut self,
        device: &DeviceContext,
        window: &dyn SurfaceProvider,
    ) -> BackendResult<()> {
        let mut extent = window.drawable_extent();
        while extent[0] == 0 || extent[1] == 0 {
            info!("Surface has zero area, waiting");
            window.wait_events();
            extent = window.drawable_extent();
        }
        self.swapchain.rebuild(device, extent)?;
        // Consumed only after recreation completes.
        self.gate.rebuilt();

        Ok(())
    }

    pub fn destroy(&mut self, device: &DeviceContext) {
        device.wait();
        for slot in &self.slots {
            slot.free(&device.raw);
        }
        self.swapchain.destroy(device);
    }
}

#[cfg(test)]
mod test {
    use super::RebuildGate;

    #[test]
    fn any_staleness_source_forces_rebuild() {
        let mut gate = RebuildGate::default();
        assert!(gate.needs_rebuild(true, false));
        assert!(gate.needs_rebuild(false, true));
        assert!(!gate.needs_rebuild(false, false));
        gate.notify_resize();
        assert!(gate.needs_rebuild(false, false));
    }

    #[test]
    fn resize_latched_mid_flight_rebuilds_exactly_once() {
        let mut gate = RebuildGate::default();
        // The window signals a resize after submit, before present.
        gate.notify_resize();
        // Present reports nothing wrong, the latch alone forces the
        // rebuild.
        assert!(gate.needs_rebuild(false, false));
        gate.rebuilt();
        // Consumed once: the following cycles present without another
        // rebuild.
        assert!(!gate.needs_rebuild(false, false));
        assert!(!gate.needs_rebuild(false, false));
    }

    #[test]
    fn one_rebuild_serves_resize_and_staleness_together() {
        let mut gate = RebuildGate::default();
        gate.notify_resize();
        // Present also went stale: still a single rebuild.
        assert!(gate.needs_rebuild(true, false));
        gate.rebuilt();
        assert!(!gate.needs_rebuild(false, false));
    }

    #[test]
    fn staleness_alone_does_not_consume_a_later_resize() {
        let mut gate = RebuildGate::default();
        // A stale present rebuilds with no resize pending.
        assert!(gate.needs_rebuild(true, false));
        gate.rebuilt();
        // A resize arriving afterwards still gets its own rebuild.
        gate.notify_resize();
        assert!(gate.needs_rebuild(false, false));
    }

    #[test]
    fn frame_counter_wraps() {
        let next = |frame: usize| (frame + 1) % crate::MAX_FRAMES_IN_FLIGHT;
        assert_eq!(1, next(0));
        assert_eq!(0, next(1));
    }
}
