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

use arrayvec::ArrayVec;
use ash::vk;
use gpu_descriptor::{DescriptorSetLayoutCreateFlags, DescriptorTotalCount};
use gpu_descriptor_ash::AshDescriptorDevice;
use sable_common::Handle;

use crate::{
    BackendResult, Buffer, DescriptorAllocator, DescriptorSet, DeviceContext, Image,
    ResourceTable, MAX_FRAMES_IN_FLIGHT,
};

/// Byte offset of one frame slot's slice of an N-way-replicated uniform
/// buffer.
pub fn frame_uniform_offset(frame_index: usize, payload_size: u64) -> u64 {
    frame_index as u64 * payload_size
}

/// One descriptor set per frame slot, each pointing at that slot's range
/// of the replicated uniform buffer plus an optional sampled texture.
/// Rebound when the underlying handles change; chain rebuilds don't
/// touch it. The set layout is declared and owned by the caller.
pub struct DescriptorBinder {
    allocator: DescriptorAllocator,
    layout: vk::DescriptorSetLayout,
    sets: Vec<DescriptorSet>,
}

impl DescriptorBinder {
    pub fn new(device: &DeviceContext, layout: vk::DescriptorSetLayout) -> BackendResult<Self> {
        let mut allocator = DescriptorAllocator::new(0);
        let count = DescriptorTotalCount {
            uniform_buffer: 1,
            combined_image_sampler: 1,
            ..Default::default()
        };
        let sets = unsafe {
            allocator.allocate(
                AshDescriptorDevice::wrap(&device.raw),
                &layout,
                DescriptorSetLayoutCreateFlags::empty(),
                &count,
                MAX_FRAMES_IN_FLIGHT as u32,
            )
        }?;

        Ok(Self {
            allocator,
            layout,
            sets,
        })
    }

    pub fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    pub fn set(&self, frame_index: usize) -> vk::DescriptorSet {
        *self.sets[frame_index].raw()
    }

    /// Points every frame slot's set at its slice of the uniform buffer
    /// (binding 0) and, when given, the shared texture (binding 1).
    pub fn bind(
        &self,
        device: &DeviceContext,
        table: &ResourceTable,
        uniform: Handle<Buffer>,
        payload_size: u64,
        texture: Option<(Handle<Image>, vk::Sampler)>,
    ) -> BackendResult<()> {
        let uniform = table.buffer(uniform)?.raw;
        let image_info = texture
            .map(|(handle, sampler)| {
                table.image(handle).map(|image| vk::DescriptorImageInfo {
                    sampler,
                    image_view: image.view,
                    image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                })
            })
            .transpose()?;

        for (frame_index, set) in self.sets.iter().enumerate() {
            let buffer_info = vk::DescriptorBufferInfo {
                buffer: uniform,
                offset: frame_uniform_offset(frame_index, payload_size),
                range: payload_size,
            };
            let mut writes = ArrayVec::<vk::WriteDescriptorSet, 2>::new();
            writes.push(
                vk::WriteDescriptorSet::builder()
                    .dst_set(*set.raw())
                    .dst_binding(0)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(std::slice::from_ref(&buffer_info))
                    .build(),
            );
            if let Some(image_info) = &image_info {
                writes.push(
                    vk::WriteDescriptorSet::builder()
                        .dst_set(*set.raw())
                        .dst_binding(1)
                        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                        .image_info(std::slice::from_ref(image_info))
                        .build(),
                );
            }
            unsafe { device.raw.update_descriptor_sets(&writes, &[]) };
        }

        Ok(())
    }

    pub fn destroy(&mut self, device: &DeviceContext) {
        unsafe {
            self.allocator.free(
                AshDescriptorDevice::wrap(&device.raw),
                self.sets.drain(..),
            );
            self.allocator.cleanup(AshDescriptorDevice::wrap(&device.raw));
        }
    }
}

#[cfg(test)]
mod test {
    use crate::frame_uniform_offset;

    #[test]
    fn uniform_offsets_are_frame_relative() {
        assert_eq!(0, frame_uniform_offset(0, 256));
        assert_eq!(256, frame_uniform_offset(1, 256));
        assert_eq!(512, frame_uniform_offset(2, 256));
    }

    #[test]
    fn zero_payload_collapses_offsets() {
        assert_eq!(0, frame_uniform_offset(1, 0));
    }
}
