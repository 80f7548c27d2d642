// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Device discovery.
//!
//! Scans `/dev` for `video*` nodes and probes each one: the node must be a
//! streaming M2M device and accept a planar YUV 4:2:0 trial negotiation on
//! both queues at the requested resolution. The first node that passes
//! wins. Callers with a known device path can skip this entirely and hand
//! the path to the pipeline builder.

use std::{fs, io};

use crate::{device::M2mDevice, format, queue::QueueKind, Error};

/// Finds the first M2M device under `/dev` able to deinterlace
/// `width`x`height` planar YUV 4:2:0.
pub fn find_device(width: u32, height: u32) -> Result<M2mDevice, Error> {
    let entries = fs::read_dir("/dev").map_err(|e| Error::Device("scan /dev", e))?;

    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !name.starts_with("video") {
            continue;
        }

        let path = entry.path();
        log::debug!("probing device {}", path.display());

        let dev = match M2mDevice::open(&path) {
            Ok(dev) => dev,
            Err(e) => {
                log::trace!("skipping {}: {}", path.display(), e);
                continue;
            }
        };

        if let Err(e) = format::probe(&dev, QueueKind::Capture, width, height) {
            log::trace!("skipping {}: {}", path.display(), e);
            continue;
        }
        if let Err(e) = format::probe(&dev, QueueKind::Output, width, height) {
            log::trace!("skipping {}: {}", path.display(), e);
            continue;
        }

        log::info!("using device {}", path.display());
        return Ok(dev);
    }

    Err(Error::Device(
        "device discovery",
        io::Error::new(
            io::ErrorKind::NotFound,
            "no deinterlace-capable M2M device found",
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_device_handles_absent_hardware() {
        // On machines without a capable device this must report NotFound
        // rather than panic; with hardware present it returns a handle.
        match find_device(1920, 1080) {
            Ok(_) => {}
            Err(Error::Device("device discovery", e)) => {
                assert_eq!(e.kind(), io::ErrorKind::NotFound);
            }
            Err(Error::Device("scan /dev", _)) => {}
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }
}
