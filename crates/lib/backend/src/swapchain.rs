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

use ash::{extensions::khr, vk};
use log::info;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::{BackendError, BackendResult, DeviceContext};

pub struct Surface {
    pub(crate) raw: vk::SurfaceKHR,
    pub(crate) loader: khr::Surface,
}

impl Surface {
    pub fn create(
        entry: &ash::Entry,
        instance: &ash::Instance,
        display_handle: RawDisplayHandle,
        window_handle: RawWindowHandle,
    ) -> BackendResult<Self> {
        let surface = unsafe {
            ash_window::create_surface(entry, instance, display_handle, window_handle, None)
        }?;
        let loader = khr::Surface::new(entry, instance);

        Ok(Self {
            raw: surface,
            loader,
        })
    }

    /// Adopts an already-created surface, taking over its destruction.
    pub fn from_raw(
        entry: &ash::Entry,
        instance: &ash::Instance,
        raw: vk::SurfaceKHR,
    ) -> Self {
        Self {
            raw,
            loader: khr::Surface::new(entry, instance),
        }
    }

    /// The format the chain will be created with. Callers use it to build
    /// the render pass before the chain itself exists.
    pub fn preferred_format(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> BackendResult<vk::SurfaceFormatKHR> {
        let formats = unsafe {
            self.loader
                .get_physical_device_surface_formats(physical_device, self.raw)
        }?;

        select_surface_format(&formats).ok_or(BackendError::NoSuitableFormat)
    }

    fn destroy(&self) {
        unsafe { self.loader.destroy_surface(self.raw, None) };
    }
}

fn select_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    let preferred = vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_SRGB,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    };
    if formats.contains(&preferred) {
        Some(preferred)
    } else {
        formats.first().copied()
    }
}

fn select_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// The surface dictates the extent when it reports one; otherwise the
/// drawable size is clamped into the supported range.
fn clamp_extent(capabilities: &vk::SurfaceCapabilitiesKHR, drawable: [u32; 2]) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: drawable[0].clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: drawable[1].clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

fn select_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut desired = capabilities.min_image_count + 1;
    if capabilities.max_image_count != 0 {
        desired = desired.min(capabilities.max_image_count);
    }

    desired
}

struct SwapchainInner {
    raw: vk::SwapchainKHR,
    loader: khr::Swapchain,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    framebuffers: Vec<vk::Framebuffer>,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl SwapchainInner {
    fn new(
        device: &DeviceContext,
        surface: &Surface,
        render_pass: vk::RenderPass,
        drawable: [u32; 2],
    ) -> BackendResult<Self> {
        let capabilities = unsafe {
            surface
                .loader
                .get_physical_device_surface_capabilities(device.physical_device, surface.raw)
        }?;
        let formats = unsafe {
            surface
                .loader
                .get_physical_device_surface_formats(device.physical_device, surface.raw)
        }?;
        let format = match select_surface_format(&formats) {
            Some(format) => format,
            None => return Err(BackendError::NoSuitableFormat),
        };
        let present_modes = unsafe {
            surface
                .loader
                .get_physical_device_surface_present_modes(device.physical_device, surface.raw)
        }?;
        let present_mode = select_present_mode(&present_modes);
        let extent = clamp_extent(&capabilities, drawable);
        assert!(
            extent.width != 0 && extent.height != 0,
            "Can't create swapchain for a surface with zero area"
        );
        let image_count = select_image_count(&capabilities);

        info!(
            "Create swapchain {} x {}, format {:?}, present mode {:?}, {} images",
            extent.width, extent.height, format.format, present_mode, image_count
        );

        let queue_families = [
            device.graphics_queue.family_index,
            device.present_queue.family_index,
        ];
        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.raw)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);
        create_info = if queue_families[0] != queue_families[1] {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&queue_families)
        } else {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let loader = khr::Swapchain::new(&device.instance, &device.raw);
        let swapchain = unsafe { loader.create_swapchain(&create_info, None) }?;
        let images = unsafe { loader.get_swapchain_images(swapchain) }?;

        let views = images
            .iter()
            .map(|image| {
                let view_create_info = vk::ImageViewCreateInfo::builder()
                    .image(*image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(format.format)
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    })
                    .build();
                unsafe { device.raw.create_image_view(&view_create_info, None) }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let framebuffers = views
            .iter()
            .map(|view| {
                let framebuffer_create_info = vk::FramebufferCreateInfo::builder()
                    .render_pass(render_pass)
                    .attachments(slice::from_ref(view))
                    .width(extent.width)
                    .height(extent.height)
                    .layers(1)
                    .build();
                unsafe { device.raw.create_framebuffer(&framebuffer_create_info, None) }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            raw: swapchain,
            loader,
            images,
            views,
            framebuffers,
            format: format.format,
            extent,
        })
    }

    fn cleanup(&mut self, device: &DeviceContext) {
        device.wait();
        unsafe {
            for framebuffer in self.framebuffers.drain(..) {
                device.raw.destroy_framebuffer(framebuffer, None);
            }
            for view in self.views.drain(..) {
                device.raw.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.raw, None);
        }
    }
}

/// The result of asking the chain for the next image. Out-of-date means
/// nothing was acquired and the chain must be rebuilt before the next
/// attempt; suboptimal still produces a usable image.
pub enum AcquiredImage {
    NeedRebuild,
    Image { index: u32, suboptimal: bool },
}

/// Presentable image chain plus its per-image views and framebuffers.
/// Rebuilt whole on resize or invalidation, never patched. The render
/// pass is supplied and owned by the caller.
pub struct Swapchain {
    surface: Surface,
    render_pass: vk::RenderPass,
    inner: SwapchainInner,
}

impl Swapchain {
    pub fn new(
        device: &DeviceContext,
        surface: Surface,
        render_pass: vk::RenderPass,
        drawable: [u32; 2],
    ) -> BackendResult<Self> {
        Ok(Self {
            inner: SwapchainInner::new(device, &surface, render_pass, drawable)?,
            surface,
            render_pass,
        })
    }

    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> BackendResult<AcquiredImage> {
        match unsafe {
            self.inner.loader.acquire_next_image(
                self.inner.raw,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        } {
            Ok((index, suboptimal)) => Ok(AcquiredImage::Image { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquiredImage::NeedRebuild),
            Err(err) => Err(BackendError::from(err)),
        }
    }

    /// Queues the image for presentation. Returns true when the chain
    /// went stale and must be rebuilt.
    pub fn present(
        &self,
        queue: vk::Queue,
        wait_semaphore: vk::Semaphore,
        image_index: u32,
    ) -> BackendResult<bool> {
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(slice::from_ref(&wait_semaphore))
            .swapchains(slice::from_ref(&self.inner.raw))
            .image_indices(slice::from_ref(&image_index))
            .build();

        match unsafe { self.inner.loader.queue_present(queue, &present_info) } {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
            Err(err) => Err(BackendError::from(err)),
        }
    }

    pub fn rebuild(&mut self, device: &DeviceContext, drawable: [u32; 2]) -> BackendResult<()> {
        info!("Rebuild swapchain");
        self.inner.cleanup(device);
        self.inner = SwapchainInner::new(device, &self.surface, self.render_pass, drawable)?;

        Ok(())
    }

    pub fn backbuffer_format(&self) -> vk::Format {
        self.inner.format
    }

    pub fn image_count(&self) -> usize {
        self.inner.images.len()
    }

    pub fn framebuffer(&self, image_index: u32) -> vk::Framebuffer {
        self.inner.framebuffers[image_index as usize]
    }

    pub fn render_area(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.inner.extent,
        }
    }

    pub fn destroy(&mut self, device: &DeviceContext) {
        self.inner.cleanup(device);
        self.surface.destroy();
    }
}

#[cfg(test)]
mod test {
    use ash::vk;

    use super::{clamp_extent, select_image_count, select_present_mode, select_surface_format};

    fn capabilities(
        current: [u32; 2],
        min: [u32; 2],
        max: [u32; 2],
    ) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current[0],
                height: current[1],
            },
            min_image_extent: vk::Extent2D {
                width: min[0],
                height: min[1],
            },
            max_image_extent: vk::Extent2D {
                width: max[0],
                height: max[1],
            },
            ..Default::default()
        }
    }

    #[test]
    fn preferred_format_wins() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        let selected = select_surface_format(&formats).unwrap();
        assert_eq!(vk::Format::B8G8R8A8_SRGB, selected.format);
    }

    #[test]
    fn first_format_is_fallback() {
        let formats = [vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
        let selected = select_surface_format(&formats).unwrap();
        assert_eq!(vk::Format::R8G8B8A8_UNORM, selected.format);
    }

    #[test]
    fn no_formats_no_selection() {
        assert_eq!(None, select_surface_format(&[]));
    }

    #[test]
    fn mailbox_preferred_fifo_guaranteed() {
        assert_eq!(
            vk::PresentModeKHR::MAILBOX,
            select_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX])
        );
        assert_eq!(
            vk::PresentModeKHR::FIFO,
            select_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE])
        );
    }

    #[test]
    fn surface_extent_wins_when_reported() {
        let caps = capabilities([800, 600], [1, 1], [4096, 4096]);
        let extent = clamp_extent(&caps, [1024, 768]);
        assert_eq!((800, 600), (extent.width, extent.height));
    }

    #[test]
    fn drawable_extent_clamped_into_range() {
        let caps = capabilities([u32::MAX, u32::MAX], [64, 64], [2048, 2048]);
        let extent = clamp_extent(&caps, [8192, 16]);
        assert_eq!((2048, 64), (extent.width, extent.height));
    }

    #[test]
    fn image_count_respects_limits() {
        let mut caps = capabilities([800, 600], [1, 1], [4096, 4096]);
        caps.min_image_count = 2;
        caps.max_image_count = 0;
        assert_eq!(3, select_image_count(&caps));
        caps.max_image_count = 2;
        assert_eq!(2, select_image_count(&caps));
    }
}
