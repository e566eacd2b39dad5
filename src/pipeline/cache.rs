//! Persistent, per-name pipeline cache files.
//!
//! A [`PipelineCacheFile`] wraps a `VkPipelineCache` that is seeded from a blob on disk. Loading is best-effort:
//! a missing, unreadable or mismatching file simply results in an empty cache. The blob header written by the driver
//! is validated against the current device before the data is handed back to it.
//!
//! # Example
//! ```ignore
//! use std::path::Path;
//! use deimos::prelude::*;
//!
//! let cache = PipelineCacheFile::load(device.clone(), Path::new("cache"), "gbuffer")?;
//! // Create pipelines with `cache.handle()` ...
//! cache.save()?;
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ash::vk;

use crate::{Device, Error};

/// Size in bytes of a `VK_PIPELINE_CACHE_HEADER_VERSION_ONE` header.
pub const HEADER_SIZE: usize = 16 + 4 * 4;

/// Reasons a cache blob can be rejected.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HeaderMismatch {
    /// The blob is smaller than a header.
    Truncated,
    /// The length field does not describe a version one header.
    Length,
    /// Unknown header version.
    Version,
    /// Blob was produced by a different vendor.
    Vendor,
    /// Blob was produced by a different device.
    Device,
    /// Blob was produced by a different driver build.
    Uuid,
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&data[offset..offset + 4]);
    u32::from_ne_bytes(bytes)
}

/// Validate the header of a pipeline cache blob against the properties of the device it will be used with.
pub fn validate_header(data: &[u8], properties: &vk::PhysicalDeviceProperties) -> Result<(), HeaderMismatch> {
    if data.len() < HEADER_SIZE {
        return Err(HeaderMismatch::Truncated);
    }
    if read_u32(data, 0) as usize != HEADER_SIZE {
        return Err(HeaderMismatch::Length);
    }
    if read_u32(data, 4) != vk::PipelineCacheHeaderVersion::ONE.as_raw() as u32 {
        return Err(HeaderMismatch::Version);
    }
    if read_u32(data, 8) != properties.vendor_id {
        return Err(HeaderMismatch::Vendor);
    }
    if read_u32(data, 12) != properties.device_id {
        return Err(HeaderMismatch::Device);
    }
    if data[16..HEADER_SIZE] != properties.pipeline_cache_uuid {
        return Err(HeaderMismatch::Uuid);
    }
    Ok(())
}

/// A `VkPipelineCache` backed by a file on disk.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct PipelineCacheFile {
    #[derivative(Debug = "ignore")]
    device: Device,
    handle: vk::PipelineCache,
    name: String,
    path: PathBuf,
}

impl PipelineCacheFile {
    /// Path of the cache file for `name` inside `directory`.
    pub fn path_for(directory: &Path, name: &str) -> PathBuf {
        directory.join(format!("{name}.pipeline_cache"))
    }

    fn read_initial_data(path: &Path, properties: &vk::PhysicalDeviceProperties) -> Vec<u8> {
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("No pipeline cache at {}, starting empty", path.display());
                return vec![];
            }
            Err(err) => {
                warn!("Could not read pipeline cache {}: {err}", path.display());
                return vec![];
            }
        };
        match validate_header(&data, properties) {
            Ok(()) => data,
            Err(reason) => {
                warn!("Discarding pipeline cache {}: header mismatch ({reason:?})", path.display());
                vec![]
            }
        }
    }

    /// Create a pipeline cache named `name`, seeded from its file in `directory` if there is a valid one.
    /// # Errors
    /// Only fails if the Vulkan pipeline cache object could not be created.
    pub fn load(device: Device, directory: &Path, name: &str) -> Result<Self> {
        let path = Self::path_for(directory, name);
        let data = Self::read_initial_data(&path, device.properties());
        let info = vk::PipelineCacheCreateInfo {
            s_type: vk::StructureType::PIPELINE_CACHE_CREATE_INFO,
            p_next: std::ptr::null(),
            flags: vk::PipelineCacheCreateFlags::empty(),
            initial_data_size: data.len(),
            p_initial_data: data.as_ptr().cast(),
        };
        let handle = unsafe { device.create_pipeline_cache(&info, None) }
            .map_err(Error::from)
            .with_context(|| Error::PipelineCacheCreation(name.to_owned()))?;
        info!("Loaded pipeline cache `{name}` ({} bytes)", data.len());
        Ok(Self {
            device,
            handle,
            name: name.to_owned(),
            path,
        })
    }

    /// Write the current contents of the cache back to its file.
    pub fn save(&self) -> Result<()> {
        let data = unsafe { self.device.get_pipeline_cache_data(self.handle)? };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, &data)?;
        debug!("Saved pipeline cache `{}` ({} bytes)", self.name, data.len());
        Ok(())
    }

    /// Get unsafe access to the underlying `VkPipelineCache` handle.
    /// # Safety
    /// The caller must not destroy this handle.
    pub unsafe fn handle(&self) -> vk::PipelineCache {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for PipelineCacheFile {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline_cache(self.handle, None);
        }
    }
}
