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

use std::{ptr::NonNull, slice};

use ash::vk;
use bitflags::bitflags;
use gpu_alloc::{Request, UsageFlags};
use gpu_alloc_ash::AshMemoryDevice;
use log::info;
use sable_common::{Handle, Pool};

use crate::{BackendError, BackendResult, DeviceContext, GpuAllocator, GpuMemory};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const TRANSFER_SRC = 0b1;
        const TRANSFER_DST = 0b10;
        const UNIFORM = 0b100;
        const STORAGE = 0b1000;
        const INDEX = 0b10000;
        const VERTEX = 0b100000;
    }
}

impl From<BufferUsage> for vk::BufferUsageFlags {
    fn from(value: BufferUsage) -> Self {
        let mut result = vk::BufferUsageFlags::empty();
        if value.contains(BufferUsage::TRANSFER_SRC) {
            result |= vk::BufferUsageFlags::TRANSFER_SRC;
        }
        if value.contains(BufferUsage::TRANSFER_DST) {
            result |= vk::BufferUsageFlags::TRANSFER_DST;
        }
        if value.contains(BufferUsage::UNIFORM) {
            result |= vk::BufferUsageFlags::UNIFORM_BUFFER;
        }
        if value.contains(BufferUsage::STORAGE) {
            result |= vk::BufferUsageFlags::STORAGE_BUFFER;
        }
        if value.contains(BufferUsage::INDEX) {
            result |= vk::BufferUsageFlags::INDEX_BUFFER;
        }
        if value.contains(BufferUsage::VERTEX) {
            result |= vk::BufferUsageFlags::VERTEX_BUFFER;
        }

        result
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryKind {
    DeviceLocal,
    HostVisible,
}

impl From<MemoryKind> for UsageFlags {
    fn from(value: MemoryKind) -> Self {
        match value {
            MemoryKind::DeviceLocal => UsageFlags::FAST_DEVICE_ACCESS,
            MemoryKind::HostVisible => UsageFlags::HOST_ACCESS | UsageFlags::UPLOAD,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BufferDesc {
    pub size: u64,
    pub usage: BufferUsage,
    pub memory: MemoryKind,
    pub alignment: Option<u64>,
}

impl BufferDesc {
    pub fn gpu_only(size: u64, usage: BufferUsage) -> Self {
        Self {
            size,
            usage,
            memory: MemoryKind::DeviceLocal,
            alignment: None,
        }
    }

    pub fn host_visible(size: u64, usage: BufferUsage) -> Self {
        Self {
            size,
            usage,
            memory: MemoryKind::HostVisible,
            alignment: None,
        }
    }

    pub fn alignment(mut self, alignment: u64) -> Self {
        self.alignment = Some(alignment);
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ImageDesc {
    pub extent: [u32; 2],
    pub format: vk::Format,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
    pub memory: MemoryKind,
}

impl ImageDesc {
    pub fn texture(extent: [u32; 2], format: vk::Format) -> Self {
        Self {
            extent,
            format,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            memory: MemoryKind::DeviceLocal,
        }
    }
}

#[derive(Debug)]
pub struct Buffer {
    pub raw: vk::Buffer,
    pub desc: BufferDesc,
    allocation: Option<GpuMemory>,
    mapped: Option<NonNull<u8>>,
}

impl Buffer {
    fn free(self, device: &ash::Device, allocator: &mut GpuAllocator) {
        unsafe {
            device.destroy_buffer(self.raw, None);
            if let Some(mut block) = self.allocation {
                if self.mapped.is_some() {
                    block.unmap(AshMemoryDevice::wrap(device));
                }
                allocator.dealloc(AshMemoryDevice::wrap(device), block);
            }
        }
    }
}

#[derive(Debug)]
pub struct Image {
    pub raw: vk::Image,
    pub desc: ImageDesc,
    pub view: vk::ImageView,
    allocation: Option<GpuMemory>,
}

impl Image {
    fn free(self, device: &ash::Device, allocator: &mut GpuAllocator) {
        unsafe {
            if self.view != vk::ImageView::null() {
                device.destroy_image_view(self.view, None);
            }
            device.destroy_image(self.raw, None);
            if let Some(block) = self.allocation {
                allocator.dealloc(AshMemoryDevice::wrap(device), block);
            }
        }
    }
}

/// Owns every buffer and image the renderer works with, behind typed
/// generational handles. External code never touches the underlying
/// objects, it only hands handles back to this table.
pub struct ResourceTable {
    allocator: GpuAllocator,
    buffers: Pool<Buffer>,
    images: Pool<Image>,
    samplers: Vec<vk::Sampler>,
}

impl ResourceTable {
    pub fn new(device: &DeviceContext) -> BackendResult<Self> {
        Ok(Self {
            allocator: device.create_allocator()?,
            buffers: Pool::new(),
            images: Pool::new(),
            samplers: Vec::new(),
        })
    }

    pub fn create_buffer(
        &mut self,
        device: &DeviceContext,
        desc: BufferDesc,
    ) -> BackendResult<Handle<Buffer>> {
        let create_info = vk::BufferCreateInfo::builder()
            .size(desc.size)
            .usage(desc.usage.into())
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .build();
        let buffer = unsafe { device.raw.create_buffer(&create_info, None) }?;
        let requirement = unsafe { device.raw.get_buffer_memory_requirements(buffer) };
        let alignment = desc
            .alignment
            .map_or(requirement.alignment, |alignment| {
                alignment.max(requirement.alignment)
            });
        let allocation = unsafe {
            self.allocator.alloc(
                AshMemoryDevice::wrap(&device.raw),
                Request {
                    size: requirement.size,
                    align_mask: alignment - 1,
                    memory_types: requirement.memory_type_bits,
                    usage: desc.memory.into(),
                },
            )
        }?;
        unsafe {
            device
                .raw
                .bind_buffer_memory(buffer, *allocation.memory(), allocation.offset())
        }?;

        Ok(self.buffers.push(Buffer {
            raw: buffer,
            desc,
            allocation: Some(allocation),
            mapped: None,
        }))
    }

    pub fn create_image(
        &mut self,
        device: &DeviceContext,
        desc: ImageDesc,
    ) -> BackendResult<Handle<Image>> {
        let create_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: desc.extent[0],
                height: desc.extent[1],
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(desc.format)
            .tiling(desc.tiling)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(desc.usage)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .build();
        let image = unsafe { device.raw.create_image(&create_info, None) }?;
        let requirement = unsafe { device.raw.get_image_memory_requirements(image) };
        let allocation = unsafe {
            self.allocator.alloc(
                AshMemoryDevice::wrap(&device.raw),
                Request {
                    size: requirement.size,
                    align_mask: requirement.alignment - 1,
                    memory_types: requirement.memory_type_bits,
                    usage: desc.memory.into(),
                },
            )
        }?;
        unsafe {
            device
                .raw
                .bind_image_memory(image, *allocation.memory(), allocation.offset())
        }?;

        Ok(self.images.push(Image {
            raw: image,
            desc,
            view: vk::ImageView::null(),
            allocation: Some(allocation),
        }))
    }

    /// Single-mip color view, created once and owned by the image.
    pub fn create_image_view(
        &mut self,
        device: &DeviceContext,
        handle: Handle<Image>,
    ) -> BackendResult<vk::ImageView> {
        let image = self
            .images
            .get_mut(handle)
            .ok_or(BackendError::InvalidHandle)?;
        if image.view != vk::ImageView::null() {
            return Ok(image.view);
        }
        let create_info = vk::ImageViewCreateInfo::builder()
            .image(image.raw)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(image.desc.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            })
            .build();
        image.view = unsafe { device.raw.create_image_view(&create_info, None) }?;

        Ok(image.view)
    }

    /// Linear-filtered repeat sampler with anisotropy at the device
    /// limit. Owned by the table, destroyed with it.
    pub fn create_sampler(&mut self, device: &DeviceContext) -> BackendResult<vk::Sampler> {
        let limits = unsafe {
            device
                .instance
                .get_physical_device_properties(device.physical_device)
        }
        .limits;
        let create_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(true)
            .max_anisotropy(limits.max_sampler_anisotropy)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .build();
        let sampler = unsafe { device.raw.create_sampler(&create_info, None) }?;
        self.samplers.push(sampler);

        Ok(sampler)
    }

    pub fn buffer(&self, handle: Handle<Buffer>) -> BackendResult<&Buffer> {
        self.buffers.get(handle).ok_or(BackendError::InvalidHandle)
    }

    pub fn image(&self, handle: Handle<Image>) -> BackendResult<&Image> {
        self.images.get(handle).ok_or(BackendError::InvalidHandle)
    }

    /// Persistently maps the buffer's memory. The pointer stays valid
    /// until the buffer is destroyed; mapping again returns the same
    /// pointer. Host-visible memory only.
    pub fn map_buffer(
        &mut self,
        device: &DeviceContext,
        handle: Handle<Buffer>,
    ) -> BackendResult<NonNull<u8>> {
        let buffer = self
            .buffers
            .get_mut(handle)
            .ok_or(BackendError::InvalidHandle)?;
        if let Some(ptr) = buffer.mapped {
            return Ok(ptr);
        }
        let allocation = buffer
            .allocation
            .as_mut()
            .ok_or(BackendError::MemoryMapFailed)?;
        let ptr = unsafe {
            allocation.map(
                AshMemoryDevice::wrap(&device.raw),
                0,
                buffer.desc.size as usize,
            )
        }?;
        buffer.mapped = Some(ptr);

        Ok(ptr)
    }

    /// Blocking device-side copy from one buffer into another. The
    /// calling thread waits for the GPU; setup-time transfers only.
    pub fn store_buffer(
        &self,
        device: &DeviceContext,
        src: Handle<Buffer>,
        dst: Handle<Buffer>,
        size: u64,
    ) -> BackendResult<()> {
        let src = self.buffer(src)?.raw;
        let dst = self.buffer(dst)?.raw;
        device.one_time_submit(|raw, cb| {
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size,
            };
            unsafe { raw.cmd_copy_buffer(cb, src, dst, slice::from_ref(&region)) };
        })
    }

    /// Blocking copy of tightly-packed pixels into an image. The image
    /// must already be in a transfer-write layout; transitions are the
    /// caller's business.
    pub fn store_buffer_to_image(
        &self,
        device: &DeviceContext,
        src: Handle<Buffer>,
        dst: Handle<Image>,
        extent: [u32; 2],
    ) -> BackendResult<()> {
        let src = self.buffer(src)?.raw;
        let dst = self.image(dst)?.raw;
        device.one_time_submit(|raw, cb| {
            let region = vk::BufferImageCopy {
                buffer_offset: 0,
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                image_offset: vk::Offset3D::default(),
                image_extent: vk::Extent3D {
                    width: extent[0],
                    height: extent[1],
                    depth: 1,
                },
            };
            unsafe {
                raw.cmd_copy_buffer_to_image(
                    cb,
                    src,
                    dst,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    slice::from_ref(&region),
                )
            };
        })
    }

    pub fn destroy_buffer(
        &mut self,
        device: &DeviceContext,
        handle: Handle<Buffer>,
    ) -> BackendResult<()> {
        let buffer = self
            .buffers
            .remove(handle)
            .ok_or(BackendError::InvalidHandle)?;
        buffer.free(&device.raw, &mut self.allocator);

        Ok(())
    }

    pub fn destroy_image(
        &mut self,
        device: &DeviceContext,
        handle: Handle<Image>,
    ) -> BackendResult<()> {
        let image = self
            .images
            .remove(handle)
            .ok_or(BackendError::InvalidHandle)?;
        image.free(&device.raw, &mut self.allocator);

        Ok(())
    }

    /// Waits for the device, then frees every live entry in one pass.
    /// All outstanding handles and mapped pointers go stale.
    pub fn destroy(&mut self, device: &DeviceContext) {
        device.wait();
        info!(
            "Destroy resource table: {} buffers, {} images",
            self.buffers.len(),
            self.images.len()
        );
        for buffer in self.buffers.drain() {
            buffer.free(&device.raw, &mut self.allocator);
        }
        for image in self.images.drain() {
            image.free(&device.raw, &mut self.allocator);
        }
        for sampler in self.samplers.drain(..) {
            unsafe { device.raw.destroy_sampler(sampler, None) };
        }
        unsafe { self.allocator.cleanup(AshMemoryDevice::wrap(&device.raw)) };
    }
}

#[cfg(test)]
mod test {
    use ash::vk;
    use gpu_alloc::UsageFlags;

    use crate::{BufferDesc, BufferUsage, ImageDesc, MemoryKind};

    #[test]
    fn buffer_usage_converts_per_flag() {
        let usage = BufferUsage::TRANSFER_DST | BufferUsage::VERTEX;
        let flags = vk::BufferUsageFlags::from(usage);
        assert!(flags.contains(vk::BufferUsageFlags::TRANSFER_DST));
        assert!(flags.contains(vk::BufferUsageFlags::VERTEX_BUFFER));
        assert!(!flags.contains(vk::BufferUsageFlags::UNIFORM_BUFFER));
    }

    #[test]
    fn memory_kind_maps_to_alloc_usage() {
        assert_eq!(
            UsageFlags::FAST_DEVICE_ACCESS,
            UsageFlags::from(MemoryKind::DeviceLocal)
        );
        assert!(UsageFlags::from(MemoryKind::HostVisible).contains(UsageFlags::HOST_ACCESS));
    }

    #[test]
    fn desc_helpers_pick_memory_kind() {
        let gpu = BufferDesc::gpu_only(1024, BufferUsage::VERTEX);
        assert_eq!(MemoryKind::DeviceLocal, gpu.memory);
        let host = BufferDesc::host_visible(256, BufferUsage::UNIFORM).alignment(64);
        assert_eq!(MemoryKind::HostVisible, host.memory);
        assert_eq!(Some(64), host.alignment);
    }

    #[test]
    fn image_desc_carries_memory_kind() {
        let desc = ImageDesc::texture([4, 4], vk::Format::R8G8B8A8_UNORM);
        assert_eq!(MemoryKind::DeviceLocal, desc.memory);
        let staging = ImageDesc {
            memory: MemoryKind::HostVisible,
            tiling: vk::ImageTiling::LINEAR,
            ..desc
        };
        assert_eq!(MemoryKind::HostVisible, staging.memory);
    }
}
