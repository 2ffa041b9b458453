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
use gpu_alloc::Config;
use gpu_alloc_ash::device_properties;

use crate::{BackendResult, GpuAllocator};

#[derive(Debug, Clone, Copy)]
pub struct Queue {
    pub raw: vk::Queue,
    pub family_index: u32,
}

/// Everything the backend needs from the device provider: the logical
/// device, the two queues and a command pool on the graphics family.
/// None of it is owned here, the provider keeps them alive for the
/// lifetime of this context.
pub struct DeviceContext {
    pub(crate) instance: ash::Instance,
    pub raw: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub graphics_queue: Queue,
    pub present_queue: Queue,
    pub(crate) command_pool: vk::CommandPool,
}

impl DeviceContext {
    pub fn new(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: &ash::Device,
        graphics_queue: Queue,
        present_queue: Queue,
        command_pool: vk::CommandPool,
    ) -> Self {
        Self {
            instance: instance.clone(),
            raw: device.clone(),
            physical_device,
            graphics_queue,
            present_queue,
            command_pool,
        }
    }

    pub(crate) fn create_allocator(&self) -> BackendResult<GpuAllocator> {
        let config = Config {
            dedicated_threshold: 64 * 1024 * 1024,
            preferred_dedicated_threshold: 32 * 1024 * 1024,
            transient_dedicated_threshold: 32 * 1024 * 1024,
            final_free_list_chunk: 1024 * 1024,
            minimal_buddy_size: 128,
            starting_free_list_chunk: 16 * 1024,
            initial_buddy_dedicated_size: 32 * 1024 * 1024,
        };
        let props = unsafe {
            device_properties(&self.instance, vk::API_VERSION_1_0, self.physical_device)
        }?;

        Ok(GpuAllocator::new(config, props))
    }

    pub(crate) fn allocate_command_buffer(&self) -> BackendResult<vk::CommandBuffer> {
        let allocate_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1)
            .build();
        let buffers = unsafe { self.raw.allocate_command_buffers(&allocate_info) }?;

        Ok(buffers[0])
    }

    /// Records a short-lived command buffer, submits it to the graphics
    /// queue and blocks until the GPU is done with it. For setup-time
    /// transfers only, never on the per-frame path.
    pub fn one_time_submit<F>(&self, op: F) -> BackendResult<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer),
    {
        let cb = self.allocate_command_buffer()?;
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
            .build();
        unsafe { self.raw.begin_command_buffer(cb, &begin_info) }?;
        op(&self.raw, cb);
        unsafe { self.raw.end_command_buffer(cb) }?;

        let fence = unsafe {
            self.raw
                .create_fence(&vk::FenceCreateInfo::builder().build(), None)
        }?;
        let submit_info = vk::SubmitInfo::builder()
            .command_buffers(slice::from_ref(&cb))
            .build();
        let result = unsafe {
            self.raw
                .queue_submit(self.graphics_queue.raw, slice::from_ref(&submit_info), fence)
                .and_then(|_| self.raw.wait_for_fences(slice::from_ref(&fence), true, u64::MAX))
        };
        unsafe {
            self.raw.destroy_fence(fence, None);
            self.raw
                .free_command_buffers(self.command_pool, slice::from_ref(&cb));
        }
        result?;

        Ok(())
    }

    pub fn wait(&self) {
        unsafe { self.raw.device_wait_idle().unwrap() };
    }
}
