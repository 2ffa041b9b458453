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

use ash::vk;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Out of device memory")]
    OutOfDeviceMemory,
    #[error("Out of host memory")]
    OutOfHostMemory,
    #[error("Too many objects")]
    TooManyObjects,
    #[error("Descriptor pool fragmentation")]
    Fragmentation,
    #[error("No memory type satisfies the allocation request")]
    NoSuitableMemory,
    #[error("No suitable surface format")]
    NoSuitableFormat,
    #[error("Handle is stale or was never created")]
    InvalidHandle,
    #[error("Failed to map memory")]
    MemoryMapFailed,
    #[error("Memory isn't host-visible")]
    NotHostVisible,
    #[error("Vulkan not found or failed to load")]
    VulkanFailedToLoad,
    #[error("Vulkan error: {0}")]
    Vulkan(vk::Result),
}

pub type BackendResult<T> = Result<T, BackendError>;

impl From<vk::Result> for BackendError {
    fn from(value: vk::Result) -> Self {
        match value {
            vk::Result::ERROR_OUT_OF_HOST_MEMORY => Self::OutOfHostMemory,
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => Self::OutOfDeviceMemory,
            vk::Result::ERROR_TOO_MANY_OBJECTS => Self::TooManyObjects,
            value => Self::Vulkan(value),
        }
    }
}

impl From<gpu_alloc::AllocationError> for BackendError {
    fn from(value: gpu_alloc::AllocationError) -> Self {
        match value {
            gpu_alloc::AllocationError::NoCompatibleMemoryTypes => Self::NoSuitableMemory,
            gpu_alloc::AllocationError::OutOfDeviceMemory => Self::OutOfDeviceMemory,
            gpu_alloc::AllocationError::OutOfHostMemory => Self::OutOfHostMemory,
            gpu_alloc::AllocationError::TooManyObjects => Self::TooManyObjects,
        }
    }
}

impl From<gpu_alloc::MapError> for BackendError {
    fn from(value: gpu_alloc::MapError) -> Self {
        match value {
            gpu_alloc::MapError::NonHostVisible => Self::NotHostVisible,
            gpu_alloc::MapError::AlreadyMapped | gpu_alloc::MapError::MapFailed => {
                Self::MemoryMapFailed
            }
            gpu_alloc::MapError::OutOfDeviceMemory => Self::OutOfDeviceMemory,
            gpu_alloc::MapError::OutOfHostMemory => Self::OutOfHostMemory,
        }
    }
}

impl From<gpu_descriptor::AllocationError> for BackendError {
    fn from(value: gpu_descriptor::AllocationError) -> Self {
        match value {
            gpu_descriptor::AllocationError::OutOfDeviceMemory => Self::OutOfDeviceMemory,
            gpu_descriptor::AllocationError::OutOfHostMemory => Self::OutOfHostMemory,
            gpu_descriptor::AllocationError::Fragmentation => Self::Fragmentation,
        }
    }
}

impl From<ash::LoadingError> for BackendError {
    fn from(_: ash::LoadingError) -> Self {
        Self::VulkanFailedToLoad
    }
}

#[cfg(test)]
mod test {
    use ash::vk;

    use crate::BackendError;

    #[test]
    fn oom_results_collapse_to_memory_variants() {
        assert!(matches!(
            BackendError::from(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
            BackendError::OutOfDeviceMemory
        ));
        assert!(matches!(
            BackendError::from(vk::Result::ERROR_OUT_OF_HOST_MEMORY),
            BackendError::OutOfHostMemory
        ));
    }

    #[test]
    fn unexpected_results_stay_distinguishable() {
        assert!(matches!(
            BackendError::from(vk::Result::ERROR_DEVICE_LOST),
            BackendError::Vulkan(vk::Result::ERROR_DEVICE_LOST)
        ));
    }

    #[test]
    fn no_compatible_memory_is_config_fatal() {
        assert!(matches!(
            BackendError::from(gpu_alloc::AllocationError::NoCompatibleMemoryTypes),
            BackendError::NoSuitableMemory
        ));
    }

    #[test]
    fn mapping_device_local_memory_is_reported() {
        assert!(matches!(
            BackendError::from(gpu_alloc::MapError::NonHostVisible),
            BackendError::NotHostVisible
        ));
    }
}
