// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! M2M device handle.
//!
//! Opens a V4L2 device node non-blocking, verifies it is a streaming
//! memory-to-memory device, and records whether it speaks the single-plane
//! or multi-plane buffer API. Everything else in the crate addresses the
//! device through this handle's file descriptor.

use std::{
    fs::OpenOptions,
    io,
    os::fd::{AsRawFd, OwnedFd, RawFd},
    os::unix::fs::OpenOptionsExt,
    path::{Path, PathBuf},
};

use crate::{sys, Error};

/// An open, validated memory-to-memory device handle.
#[derive(Debug)]
pub struct M2mDevice {
    fd: OwnedFd,
    path: PathBuf,
    driver: String,
    card: String,
    multiplanar: bool,
}

impl M2mDevice {
    /// Opens the device node and validates its capabilities.
    ///
    /// The node must advertise streaming I/O and either `VIDEO_M2M` or
    /// `VIDEO_M2M_MPLANE`. The fd is opened non-blocking so that buffer
    /// dequeue latency is always governed by the readiness poll, never by
    /// the ioctl itself.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path)
            .map_err(|e| Error::Device("open", e))?;

        Self::validate(OwnedFd::from(file), path.to_path_buf())
    }

    /// Wraps an already-open device fd, validating it the same way
    /// [`M2mDevice::open`] does.
    ///
    /// Intended for callers that perform their own device discovery.
    pub fn from_fd(fd: OwnedFd) -> Result<Self, Error> {
        Self::validate(fd, PathBuf::new())
    }

    fn validate(fd: OwnedFd, path: PathBuf) -> Result<Self, Error> {
        // SAFETY: zeroed v4l2_capability is valid and stays alive across
        // the call.
        let mut cap: sys::v4l2_capability = unsafe { std::mem::zeroed() };
        unsafe { sys::ioctl(fd.as_raw_fd(), sys::VIDIOC_QUERYCAP, &mut cap) }
            .map_err(|e| Error::Device("VIDIOC_QUERYCAP", e))?;

        let caps = if cap.device_caps != 0 {
            cap.device_caps
        } else {
            cap.capabilities
        };

        if caps & sys::V4L2_CAP_STREAMING == 0 {
            return Err(Error::Device(
                "capability check",
                io::Error::new(io::ErrorKind::Unsupported, "no streaming I/O support"),
            ));
        }

        let multiplanar = if caps & sys::V4L2_CAP_VIDEO_M2M != 0 {
            false
        } else if caps & sys::V4L2_CAP_VIDEO_M2M_MPLANE != 0 {
            true
        } else {
            return Err(Error::Device(
                "capability check",
                io::Error::new(io::ErrorKind::Unsupported, "not a memory-to-memory device"),
            ));
        };

        let driver = fixed_cstr(&cap.driver);
        let card = fixed_cstr(&cap.card);
        log::debug!(
            "opened {} ({}) multiplanar={}",
            card,
            driver,
            multiplanar
        );

        Ok(M2mDevice {
            fd,
            path,
            driver,
            card,
            multiplanar,
        })
    }

    #[cfg(test)]
    pub(crate) fn fake(fd: OwnedFd) -> Self {
        M2mDevice {
            fd,
            path: PathBuf::new(),
            driver: String::new(),
            card: String::new(),
            multiplanar: true,
        }
    }

    pub fn raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    /// Device path, empty when constructed from a bare fd.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Kernel driver name (e.g. "bcm2835-codec").
    pub fn driver(&self) -> &str {
        &self.driver
    }

    /// Human-readable device name from the driver.
    pub fn card(&self) -> &str {
        &self.card
    }

    /// Whether the device uses the multi-plane buffer API.
    pub fn multiplanar(&self) -> bool {
        self.multiplanar
    }

    /// Buffer type for the queue frames are submitted to.
    pub fn output_buf_type(&self) -> u32 {
        if self.multiplanar {
            sys::V4L2_BUF_TYPE_VIDEO_OUTPUT_MPLANE
        } else {
            sys::V4L2_BUF_TYPE_VIDEO_OUTPUT
        }
    }

    /// Buffer type for the queue deinterlaced frames are produced on.
    pub fn capture_buf_type(&self) -> u32 {
        if self.multiplanar {
            sys::V4L2_BUF_TYPE_VIDEO_CAPTURE_MPLANE
        } else {
            sys::V4L2_BUF_TYPE_VIDEO_CAPTURE
        }
    }
}

fn fixed_cstr(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf)
        .trim_end_matches('\0')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_node() {
        let err = M2mDevice::open("/dev/video-none-such").unwrap_err();
        match err {
            Error::Device(op, _) => assert_eq!(op, "open"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_fixed_cstr() {
        assert_eq!(fixed_cstr(b"bcm2835-codec\0\0\0"), "bcm2835-codec");
        assert_eq!(fixed_cstr(b"\0\0\0"), "");
    }

    #[test]
    fn test_from_fd_rejects_non_video_fd() {
        use std::fs::File;

        let file = File::open("/dev/null").unwrap();
        let err = M2mDevice::from_fd(OwnedFd::from(file)).unwrap_err();
        match err {
            Error::Device("VIDIOC_QUERYCAP", _) => {}
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
