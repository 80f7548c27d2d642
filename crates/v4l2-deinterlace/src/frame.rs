// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Frame representations on both pipeline boundaries.
//!
//! Upstream hands the pipeline a [`SourceFrame`]: dmabuf objects plus a
//! plane layout describing planar YUV 4:2:0, interlace flags, an optional
//! presentation timestamp and the sample aspect ratio. Downstream receives
//! a progressive frame built around the same [`FramePlane`] layout over
//! buffers exported from the device (see [`crate::pipeline`]). Pixel data
//! is never touched here, only descriptors.
//!
//! This module also implements the device timestamp encoding. The kernel
//! buffer timestamp is a `timeval`; "no timestamp" is encoded as the
//! out-of-range sentinel `tv_sec = 1_000_000, tv_usec = 0` and surfaced as
//! `Option<i64>` microseconds on the API.

use std::fmt;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};

/// Sample aspect ratio as a rational number. `0 / 1` means unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AspectRatio {
    pub num: i32,
    pub den: i32,
}

impl Default for AspectRatio {
    fn default() -> Self {
        AspectRatio { num: 0, den: 1 }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.num, self.den)
    }
}

/// Which interlaced field is temporally first.
///
/// Starts out [`FieldOrder::Unknown`] and is fixed exactly once per stream
/// from the first submitted frame; the format is never renegotiated after
/// that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldOrder {
    #[default]
    Unknown,
    TopFirst,
    BottomFirst,
}

impl FieldOrder {
    pub(crate) fn v4l2_field(self) -> u32 {
        match self {
            FieldOrder::Unknown => crate::sys::V4L2_FIELD_ANY,
            FieldOrder::TopFirst => crate::sys::V4L2_FIELD_INTERLACED_TB,
            FieldOrder::BottomFirst => crate::sys::V4L2_FIELD_INTERLACED_BT,
        }
    }
}

/// One dmabuf backing a frame. Owns the descriptor; the buffer itself is
/// reference-counted by the kernel across all descriptors.
#[derive(Debug)]
pub struct DmaObject {
    fd: OwnedFd,
    size: usize,
}

impl DmaObject {
    pub fn new(fd: OwnedFd, size: usize) -> Self {
        DmaObject { fd, size }
    }

    pub fn fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }

    pub(crate) fn raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

/// One image plane within a frame: which dmabuf object it lives in, the
/// byte offset of its first row, and its row pitch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePlane {
    pub object: usize,
    pub offset: usize,
    pub pitch: usize,
}

/// An interlaced input frame supplied by the upstream producer.
///
/// Planar YUV 4:2:0: `planes[0]` is the luma plane, so `planes[0].pitch`
/// is the coded row stride and `planes[1].offset` the luma plane size.
/// The pipeline recovers the coded frame geometry from these two values
/// on the first frame.
#[derive(Debug)]
pub struct SourceFrame {
    pub objects: Vec<DmaObject>,
    pub planes: Vec<FramePlane>,
    pub interlaced: bool,
    pub top_field_first: bool,
    /// Presentation timestamp in microseconds, if the producer has one.
    pub pts: Option<i64>,
    pub sample_aspect_ratio: AspectRatio,
}

pub(crate) const USEC_PER_SEC: i64 = 1_000_000;

/// "No timestamp" sentinel: outside the representable range of real
/// stream timestamps, chosen to survive the kernel round-trip bit-for-bit.
const NOPTS_SENTINEL_SEC: i64 = 1_000_000;

pub(crate) fn pts_to_timeval(pts: Option<i64>) -> libc::timeval {
    match pts {
        None => libc::timeval {
            tv_sec: NOPTS_SENTINEL_SEC as libc::time_t,
            tv_usec: 0,
        },
        Some(pts) => libc::timeval {
            tv_sec: (pts / USEC_PER_SEC) as libc::time_t,
            tv_usec: (pts % USEC_PER_SEC) as libc::suseconds_t,
        },
    }
}

pub(crate) fn pts_from_timeval(tv: libc::timeval) -> Option<i64> {
    if tv.tv_sec as i64 == NOPTS_SENTINEL_SEC && tv.tv_usec == 0 {
        None
    } else {
        Some(tv.tv_sec as i64 * USEC_PER_SEC + tv.tv_usec as i64)
    }
}

/// Reconstructs the presentation timestamp for an emitted frame.
///
/// A missing device timestamp, or one that repeats the previously emitted
/// value, is replaced by the previous value advanced by the nominal frame
/// interval. Emitted timestamps therefore never stall or duplicate even
/// when the device does not report them reliably.
pub(crate) fn next_pts(device_pts: Option<i64>, last_pts: i64, interval: i64) -> i64 {
    match device_pts {
        Some(pts) if pts != last_pts => pts,
        _ => last_pts + interval,
    }
}
