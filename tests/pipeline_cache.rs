use std::path::Path;

use deimos::prelude::*;
use deimos::pipeline::cache::{validate_header, HeaderMismatch, HEADER_SIZE};

fn properties() -> vk::PhysicalDeviceProperties {
    vk::PhysicalDeviceProperties {
        vendor_id: 0x10de,
        device_id: 0x2684,
        pipeline_cache_uuid: [7; vk::UUID_SIZE],
        ..Default::default()
    }
}

fn header(properties: &vk::PhysicalDeviceProperties) -> Vec<u8> {
    let mut data = Vec::with_capacity(HEADER_SIZE + 8);
    data.extend_from_slice(&(HEADER_SIZE as u32).to_ne_bytes());
    data.extend_from_slice(&(vk::PipelineCacheHeaderVersion::ONE.as_raw() as u32).to_ne_bytes());
    data.extend_from_slice(&properties.vendor_id.to_ne_bytes());
    data.extend_from_slice(&properties.device_id.to_ne_bytes());
    data.extend_from_slice(&properties.pipeline_cache_uuid);
    // Driver specific payload
    data.extend_from_slice(&[0xab; 8]);
    data
}

#[test]
fn matching_header_is_accepted() {
    let properties = properties();
    assert_eq!(validate_header(&header(&properties), &properties), Ok(()));
}

#[test]
fn mismatching_headers_are_rejected() {
    let properties = properties();
    let data = header(&properties);

    assert_eq!(validate_header(&data[..HEADER_SIZE - 1], &properties), Err(HeaderMismatch::Truncated));
    assert_eq!(validate_header(&[], &properties), Err(HeaderMismatch::Truncated));

    let mut wrong_length = data.clone();
    wrong_length[0..4].copy_from_slice(&16u32.to_ne_bytes());
    assert_eq!(validate_header(&wrong_length, &properties), Err(HeaderMismatch::Length));

    let mut wrong_version = data.clone();
    wrong_version[4..8].copy_from_slice(&2u32.to_ne_bytes());
    assert_eq!(validate_header(&wrong_version, &properties), Err(HeaderMismatch::Version));

    let other_vendor = vk::PhysicalDeviceProperties {
        vendor_id: 0x1002,
        ..properties
    };
    assert_eq!(validate_header(&data, &other_vendor), Err(HeaderMismatch::Vendor));

    let other_device = vk::PhysicalDeviceProperties {
        device_id: 0x1234,
        ..properties
    };
    assert_eq!(validate_header(&data, &other_device), Err(HeaderMismatch::Device));

    let other_driver = vk::PhysicalDeviceProperties {
        pipeline_cache_uuid: [8; vk::UUID_SIZE],
        ..properties
    };
    assert_eq!(validate_header(&data, &other_driver), Err(HeaderMismatch::Uuid));
}

#[test]
fn cache_file_path() {
    let path = PipelineCacheFile::path_for(Path::new("cache"), "gbuffer");
    assert_eq!(path, Path::new("cache").join("gbuffer.pipeline_cache"));
}
