// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Raw V4L2 ABI for the memory-to-memory streaming interface.
//!
//! Hand-declared `#[repr(C)]` mirrors of the `videodev2.h` structures this
//! crate actually uses, plus the matching ioctl request codes and a thin
//! [`ioctl`]/[`wait_ready`] layer over `libc`. Request codes are computed
//! from the structure sizes with the kernel's `_IOC` encoding so they stay
//! correct across architectures.
//!
//! Only the streaming M2M subset is covered: capability query, format
//! negotiation, selection rectangles, buffer pool management, DMA export
//! and stream control. This is not a general-purpose binding.

#![allow(non_camel_case_types)]

use std::{io, mem};

use std::os::fd::RawFd;

pub const VIDEO_MAX_PLANES: usize = 8;

// Buffer types
pub const V4L2_BUF_TYPE_VIDEO_CAPTURE: u32 = 1;
pub const V4L2_BUF_TYPE_VIDEO_OUTPUT: u32 = 2;
pub const V4L2_BUF_TYPE_VIDEO_CAPTURE_MPLANE: u32 = 9;
pub const V4L2_BUF_TYPE_VIDEO_OUTPUT_MPLANE: u32 = 10;

// Field order
pub const V4L2_FIELD_ANY: u32 = 0;
pub const V4L2_FIELD_NONE: u32 = 1;
pub const V4L2_FIELD_INTERLACED_TB: u32 = 8;
pub const V4L2_FIELD_INTERLACED_BT: u32 = 9;

// Memory types
pub const V4L2_MEMORY_MMAP: u32 = 1;
pub const V4L2_MEMORY_DMABUF: u32 = 4;

// Capability flags
pub const V4L2_CAP_VIDEO_M2M_MPLANE: u32 = 0x0000_4000;
pub const V4L2_CAP_VIDEO_M2M: u32 = 0x0000_8000;
pub const V4L2_CAP_STREAMING: u32 = 0x0400_0000;

// Buffer flags
pub const V4L2_BUF_FLAG_ERROR: u32 = 0x0000_0040;

// Selection targets and flags
pub const V4L2_SEL_TGT_CROP: u32 = 0x0000;
pub const V4L2_SEL_TGT_CROP_BOUNDS: u32 = 0x0002;
pub const V4L2_SEL_TGT_COMPOSE: u32 = 0x0100;
pub const V4L2_SEL_TGT_COMPOSE_BOUNDS: u32 = 0x0102;
pub const V4L2_SEL_FLAG_LE: u32 = 0x0002;

/// Planar YUV 4:2:0, fourcc `YU12`.
pub const V4L2_PIX_FMT_YUV420: u32 = 0x3231_5559;

pub fn is_output(buf_type: u32) -> bool {
    matches!(
        buf_type,
        V4L2_BUF_TYPE_VIDEO_OUTPUT | V4L2_BUF_TYPE_VIDEO_OUTPUT_MPLANE
    )
}

pub fn is_multiplanar(buf_type: u32) -> bool {
    matches!(
        buf_type,
        V4L2_BUF_TYPE_VIDEO_CAPTURE_MPLANE | V4L2_BUF_TYPE_VIDEO_OUTPUT_MPLANE
    )
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct v4l2_capability {
    pub driver: [u8; 16],
    pub card: [u8; 32],
    pub bus_info: [u8; 32],
    pub version: u32,
    pub capabilities: u32,
    pub device_caps: u32,
    pub reserved: [u32; 3],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct v4l2_pix_format {
    pub width: u32,
    pub height: u32,
    pub pixelformat: u32,
    pub field: u32,
    pub bytesperline: u32,
    pub sizeimage: u32,
    pub colorspace: u32,
    pub priv_: u32,
    pub flags: u32,
    pub ycbcr_enc: u32,
    pub quantization: u32,
    pub xfer_func: u32,
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct v4l2_plane_pix_format {
    pub sizeimage: u32,
    pub bytesperline: u32,
    pub reserved: [u16; 6],
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct v4l2_pix_format_mplane {
    pub width: u32,
    pub height: u32,
    pub pixelformat: u32,
    pub field: u32,
    pub colorspace: u32,
    pub plane_fmt: [v4l2_plane_pix_format; VIDEO_MAX_PLANES],
    pub num_planes: u8,
    pub flags: u8,
    pub ycbcr_enc: u8,
    pub quantization: u8,
    pub xfer_func: u8,
    pub reserved: [u8; 7],
}

/// The `fmt` union of `struct v4l2_format`. The kernel sizes this union at
/// 200 bytes with pointer alignment; the `align` member reproduces that.
#[repr(C)]
#[derive(Clone, Copy)]
pub union v4l2_format_fmt {
    pub pix: v4l2_pix_format,
    pub pix_mp: v4l2_pix_format_mplane,
    pub align: [u64; 25],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct v4l2_format {
    pub type_: u32,
    pub fmt: v4l2_format_fmt,
}

impl v4l2_format {
    pub fn zeroed(buf_type: u32) -> Self {
        // SAFETY: all-zero is a valid bit pattern for every member.
        let mut fmt: Self = unsafe { mem::zeroed() };
        fmt.type_ = buf_type;
        fmt
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct v4l2_timecode {
    pub type_: u32,
    pub flags: u32,
    pub frames: u8,
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub userbits: [u8; 4],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union v4l2_plane_m {
    pub mem_offset: u32,
    pub userptr: libc::c_ulong,
    pub fd: i32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct v4l2_plane {
    pub bytesused: u32,
    pub length: u32,
    pub m: v4l2_plane_m,
    pub data_offset: u32,
    pub reserved: [u32; 11],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union v4l2_buffer_m {
    pub offset: u32,
    pub userptr: libc::c_ulong,
    pub planes: *mut v4l2_plane,
    pub fd: i32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct v4l2_buffer {
    pub index: u32,
    pub type_: u32,
    pub bytesused: u32,
    pub flags: u32,
    pub field: u32,
    pub timestamp: libc::timeval,
    pub timecode: v4l2_timecode,
    pub sequence: u32,
    pub memory: u32,
    pub m: v4l2_buffer_m,
    pub length: u32,
    pub reserved2: u32,
    pub request_fd: i32,
}

impl v4l2_buffer {
    pub fn zeroed(buf_type: u32, memory: u32) -> Self {
        // SAFETY: all-zero is a valid bit pattern (null planes pointer).
        let mut buf: Self = unsafe { mem::zeroed() };
        buf.type_ = buf_type;
        buf.memory = memory;
        buf
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct v4l2_requestbuffers {
    pub count: u32,
    pub type_: u32,
    pub memory: u32,
    pub capabilities: u32,
    pub flags: u8,
    pub reserved: [u8; 3],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct v4l2_exportbuffer {
    pub type_: u32,
    pub index: u32,
    pub plane: u32,
    pub flags: u32,
    pub fd: i32,
    pub reserved: [u32; 11],
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct v4l2_rect {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct v4l2_selection {
    pub type_: u32,
    pub target: u32,
    pub flags: u32,
    pub r: v4l2_rect,
    pub reserved: [u32; 9],
}

// _IOC encoding as used by the generic Linux ABI.
const IOC_NRSHIFT: libc::c_ulong = 0;
const IOC_TYPESHIFT: libc::c_ulong = 8;
const IOC_SIZESHIFT: libc::c_ulong = 16;
const IOC_DIRSHIFT: libc::c_ulong = 30;

const IOC_WRITE: libc::c_ulong = 1;
const IOC_READ: libc::c_ulong = 2;

const fn vidioc(dir: libc::c_ulong, nr: libc::c_ulong, size: usize) -> libc::c_ulong {
    (dir << IOC_DIRSHIFT)
        | ((b'V' as libc::c_ulong) << IOC_TYPESHIFT)
        | (nr << IOC_NRSHIFT)
        | ((size as libc::c_ulong) << IOC_SIZESHIFT)
}

pub const VIDIOC_QUERYCAP: libc::c_ulong =
    vidioc(IOC_READ, 0, mem::size_of::<v4l2_capability>());
pub const VIDIOC_G_FMT: libc::c_ulong =
    vidioc(IOC_READ | IOC_WRITE, 4, mem::size_of::<v4l2_format>());
pub const VIDIOC_S_FMT: libc::c_ulong =
    vidioc(IOC_READ | IOC_WRITE, 5, mem::size_of::<v4l2_format>());
pub const VIDIOC_REQBUFS: libc::c_ulong =
    vidioc(IOC_READ | IOC_WRITE, 8, mem::size_of::<v4l2_requestbuffers>());
pub const VIDIOC_QUERYBUF: libc::c_ulong =
    vidioc(IOC_READ | IOC_WRITE, 9, mem::size_of::<v4l2_buffer>());
pub const VIDIOC_QBUF: libc::c_ulong =
    vidioc(IOC_READ | IOC_WRITE, 15, mem::size_of::<v4l2_buffer>());
pub const VIDIOC_EXPBUF: libc::c_ulong =
    vidioc(IOC_READ | IOC_WRITE, 16, mem::size_of::<v4l2_exportbuffer>());
pub const VIDIOC_DQBUF: libc::c_ulong =
    vidioc(IOC_READ | IOC_WRITE, 17, mem::size_of::<v4l2_buffer>());
pub const VIDIOC_STREAMON: libc::c_ulong =
    vidioc(IOC_WRITE, 18, mem::size_of::<libc::c_int>());
pub const VIDIOC_STREAMOFF: libc::c_ulong =
    vidioc(IOC_WRITE, 19, mem::size_of::<libc::c_int>());
pub const VIDIOC_TRY_FMT: libc::c_ulong =
    vidioc(IOC_READ | IOC_WRITE, 64, mem::size_of::<v4l2_format>());
pub const VIDIOC_G_SELECTION: libc::c_ulong =
    vidioc(IOC_READ | IOC_WRITE, 94, mem::size_of::<v4l2_selection>());
pub const VIDIOC_S_SELECTION: libc::c_ulong =
    vidioc(IOC_READ | IOC_WRITE, 95, mem::size_of::<v4l2_selection>());

/// Issues an ioctl on the device fd.
///
/// # Safety
///
/// `arg` must point to a live, properly initialized value of the structure
/// the request code was derived from, and must stay valid for the duration
/// of the call.
pub unsafe fn ioctl<T>(fd: RawFd, request: libc::c_ulong, arg: *mut T) -> io::Result<()> {
    // SAFETY: upheld by the caller per the function contract.
    let ret = unsafe { libc::ioctl(fd, request, arg) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Waits for the requested readiness events on the device fd.
///
/// Returns `true` when one of `events` is signalled. A timeout, a poll
/// failure, or error-only readiness (`POLLERR`) all report `false`; the
/// caller treats every `false` as "nothing to dequeue". Interruption by a
/// signal restarts the wait, it is never surfaced.
pub fn wait_ready(fd: RawFd, events: i16, timeout_ms: i32) -> bool {
    let mut pfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };

    loop {
        // SAFETY: pfd is a valid pollfd for the duration of the call.
        let ret = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if ret > 0 {
            break;
        }
        if ret == 0 {
            return false;
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            continue;
        }
        log::debug!("poll failed: {}", err);
        return false;
    }

    if pfd.revents & libc::POLLERR != 0 {
        log::debug!("poll reported error readiness");
        return false;
    }

    pfd.revents & events != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_struct_sizes_64bit() {
        // The ioctl request codes embed these sizes; a drift here would
        // produce ENOTTY on every call.
        #[cfg(target_pointer_width = "64")]
        {
            assert_eq!(mem::size_of::<v4l2_capability>(), 104);
            assert_eq!(mem::size_of::<v4l2_format>(), 208);
            assert_eq!(mem::size_of::<v4l2_buffer>(), 88);
            assert_eq!(mem::size_of::<v4l2_plane>(), 64);
        }
        assert_eq!(mem::size_of::<v4l2_pix_format>(), 48);
        assert_eq!(mem::size_of::<v4l2_pix_format_mplane>(), 192);
        assert_eq!(mem::size_of::<v4l2_plane_pix_format>(), 20);
        assert_eq!(mem::size_of::<v4l2_requestbuffers>(), 20);
        assert_eq!(mem::size_of::<v4l2_exportbuffer>(), 64);
        assert_eq!(mem::size_of::<v4l2_selection>(), 64);
    }

    #[test]
    fn test_buf_type_predicates() {
        assert!(is_output(V4L2_BUF_TYPE_VIDEO_OUTPUT));
        assert!(is_output(V4L2_BUF_TYPE_VIDEO_OUTPUT_MPLANE));
        assert!(!is_output(V4L2_BUF_TYPE_VIDEO_CAPTURE));
        assert!(is_multiplanar(V4L2_BUF_TYPE_VIDEO_CAPTURE_MPLANE));
        assert!(!is_multiplanar(V4L2_BUF_TYPE_VIDEO_OUTPUT));
    }

    #[test]
    fn test_request_codes_stable_on_x86_64() {
        // Spot-check against the values from a kernel build on x86_64.
        #[cfg(all(target_arch = "x86_64", target_pointer_width = "64"))]
        {
            assert_eq!(VIDIOC_QUERYCAP, 0x8068_5600);
            assert_eq!(VIDIOC_S_FMT, 0xc0d0_5605);
            assert_eq!(VIDIOC_QBUF, 0xc058_560f);
            assert_eq!(VIDIOC_STREAMON, 0x4004_5612);
        }
    }
}
