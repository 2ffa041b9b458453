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

mod descriptors;
mod device;
mod error;
mod frame;
mod resources;
mod swapchain;

use ash::vk;

pub use descriptors::*;
pub use device::*;
pub use error::*;
pub use frame::*;
pub use resources::*;
pub use swapchain::*;

pub use sable_common::{Handle, Pool};

/// GPU objects that need the device to be destroyed but own nothing else.
pub trait FreeGpuResource {
    fn free(&self, device: &ash::Device);
}

pub type GpuAllocator = gpu_alloc::GpuAllocator<vk::DeviceMemory>;
pub type GpuMemory = gpu_alloc::MemoryBlock<vk::DeviceMemory>;
pub type DescriptorAllocator =
    gpu_descriptor::DescriptorAllocator<vk::DescriptorPool, vk::DescriptorSet>;
pub type DescriptorSet = gpu_descriptor::DescriptorSet<vk::DescriptorSet>;

/// Depth of the CPU/GPU pipeline. Slot N may not be reused until its
/// previous submission has been confirmed by the slot fence.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;
