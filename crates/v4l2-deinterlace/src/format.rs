// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Format negotiation.
//!
//! The deinterlacer streams planar YUV 4:2:0 on both queues: interlaced
//! fields on OUTPUT (top-first or bottom-first, fixed once observed),
//! progressive frames on CAPTURE. Negotiation happens in two steps:
//!
//! - [`probe`] runs a trial request at device validation time and rejects
//!   devices that cannot take the pixel format / field order combination.
//! - [`commit`] sets the final format once the first frame has revealed the
//!   stream's field order and coded layout, then negotiates the crop
//!   (OUTPUT) or compose (CAPTURE) selection rectangle for the visible
//!   region, tolerating device-side rounding.
//!
//! Both queues must be committed before buffer allocation.

use std::mem;

use crate::{
    device::M2mDevice,
    queue::{Queue, QueueKind},
    sys, Error,
};

fn default_field(kind: QueueKind) -> u32 {
    if kind.is_output() {
        sys::V4L2_FIELD_INTERLACED_TB
    } else {
        sys::V4L2_FIELD_NONE
    }
}

/// Trial-negotiates planar YUV 4:2:0 at `width`x`height` on one queue.
///
/// Fails with [`Error::FormatUnsupported`] when the device rejects the
/// pixel format or rewrites the requested field order. The device format
/// is not committed.
pub fn probe(dev: &M2mDevice, kind: QueueKind, width: u32, height: u32) -> Result<(), Error> {
    let buf_type = kind.buf_type(dev.multiplanar());
    let field = default_field(kind);
    let mut fmt = sys::v4l2_format::zeroed(buf_type);

    // SAFETY: fmt is a live v4l2_format matching the request code.
    if let Err(e) = unsafe { sys::ioctl(dev.raw_fd(), sys::VIDIOC_G_FMT, &mut fmt) } {
        log::error!("VIDIOC_G_FMT failed: {}", e);
    }

    if dev.multiplanar() {
        // SAFETY: pix_mp is the active union member for this buffer type.
        let mut pix_mp = unsafe { fmt.fmt.pix_mp };
        pix_mp.pixelformat = sys::V4L2_PIX_FMT_YUV420;
        pix_mp.field = field;
        pix_mp.width = width;
        pix_mp.height = height;
        fmt.fmt.pix_mp = pix_mp;
    } else {
        // SAFETY: pix is the active union member for this buffer type.
        let mut pix = unsafe { fmt.fmt.pix };
        pix.pixelformat = sys::V4L2_PIX_FMT_YUV420;
        pix.field = field;
        pix.width = width;
        pix.height = height;
        fmt.fmt.pix = pix;
    }

    // SAFETY: fmt is a live v4l2_format matching the request code.
    if unsafe { sys::ioctl(dev.raw_fd(), sys::VIDIOC_TRY_FMT, &mut fmt) }.is_err() {
        return Err(Error::FormatUnsupported("VIDIOC_TRY_FMT rejected"));
    }

    // The trial call reports what the device would actually use; anything
    // other than our exact pixel format and field order means unsupported.
    let (pixelformat, got_field) = if dev.multiplanar() {
        // SAFETY: pix_mp is the active union member for this buffer type.
        let pix_mp = unsafe { fmt.fmt.pix_mp };
        (pix_mp.pixelformat, pix_mp.field)
    } else {
        // SAFETY: pix is the active union member for this buffer type.
        let pix = unsafe { fmt.fmt.pix };
        (pix.pixelformat, pix.field)
    };

    if pixelformat != sys::V4L2_PIX_FMT_YUV420 || got_field != field {
        log::debug!(
            "format not supported for type {}: pixelformat {:#x} field {}",
            buf_type,
            pixelformat,
            got_field
        );
        return Err(Error::FormatUnsupported(
            "device rewrote pixel format or field order",
        ));
    }

    Ok(())
}

/// Commits the stream format on one queue and negotiates its selection
/// rectangle.
///
/// `pitch` is the luma row stride and `luma_size` the byte size of the
/// luma plane as laid out by the upstream producer; the coded height is
/// recovered as `luma_size / pitch` on multi-plane devices, and plane 0 is
/// sized to cover all three planes (`luma_size * 3 / 2`). The visible
/// `width`x`height` region becomes the crop (OUTPUT) or compose (CAPTURE)
/// rectangle, flagged less-than-or-equal so the driver may round down.
pub fn commit(
    dev: &M2mDevice,
    queue: &mut Queue,
    field: u32,
    width: u32,
    height: u32,
    pitch: u32,
    luma_size: u32,
) -> Result<(), Error> {
    let output = queue.kind.is_output();

    if sys::is_multiplanar(queue.buf_type) {
        // SAFETY: pix_mp is the active union member for this buffer type.
        let mut pix_mp = unsafe { queue.format.fmt.pix_mp };
        pix_mp.pixelformat = sys::V4L2_PIX_FMT_YUV420;
        pix_mp.field = field;
        pix_mp.width = width;
        pix_mp.height = luma_size / pitch;
        pix_mp.plane_fmt[0].bytesperline = pitch;
        pix_mp.plane_fmt[0].sizeimage = luma_size + (luma_size >> 1);
        queue.format.fmt.pix_mp = pix_mp;
    } else {
        // SAFETY: pix is the active union member for this buffer type.
        let mut pix = unsafe { queue.format.fmt.pix };
        pix.pixelformat = sys::V4L2_PIX_FMT_YUV420;
        pix.field = field;
        pix.width = width;
        pix.height = height;
        // Leave the layout to the driver on single-plane devices.
        pix.bytesperline = 0;
        pix.sizeimage = 0;
        queue.format.fmt.pix = pix;
    }

    // SAFETY: the queue format is a live v4l2_format matching the request
    // code; the driver writes the accepted layout back into it.
    unsafe { sys::ioctl(dev.raw_fd(), sys::VIDIOC_S_FMT, &mut queue.format) }
        .map_err(|e| Error::Device("VIDIOC_S_FMT", e))?;

    // SAFETY: all-zero is a valid v4l2_selection.
    let mut sel: sys::v4l2_selection = unsafe { mem::zeroed() };
    sel.type_ = queue.buf_type;
    sel.target = if output {
        sys::V4L2_SEL_TGT_CROP_BOUNDS
    } else {
        sys::V4L2_SEL_TGT_COMPOSE_BOUNDS
    };

    // SAFETY: sel is a live v4l2_selection matching the request code.
    if let Err(e) = unsafe { sys::ioctl(dev.raw_fd(), sys::VIDIOC_G_SELECTION, &mut sel) } {
        log::error!("VIDIOC_G_SELECTION failed: {}", e);
    }

    sel.r = sys::v4l2_rect {
        left: 0,
        top: 0,
        width,
        height,
    };
    sel.target = if output {
        sys::V4L2_SEL_TGT_CROP
    } else {
        sys::V4L2_SEL_TGT_COMPOSE
    };
    sel.flags = sys::V4L2_SEL_FLAG_LE;

    // SAFETY: sel is a live v4l2_selection matching the request code.
    unsafe { sys::ioctl(dev.raw_fd(), sys::VIDIOC_S_SELECTION, &mut sel) }
        .map_err(|e| Error::Device("VIDIOC_S_SELECTION", e))?;

    log::debug!(
        "committed type {} {}x{} field {} pitch {} selection {}x{}",
        queue.buf_type,
        width,
        height,
        field,
        pitch,
        sel.r.width,
        sel.r.height
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_fields() {
        assert_eq!(
            default_field(QueueKind::Output),
            sys::V4L2_FIELD_INTERLACED_TB
        );
        assert_eq!(default_field(QueueKind::Capture), sys::V4L2_FIELD_NONE);
    }

    #[test]
    fn test_commit_surfaces_device_error() {
        use std::fs::File;
        use std::os::fd::OwnedFd;

        // A non-video fd rejects every control; the failure must carry the
        // failing operation.
        let file = File::options()
            .read(true)
            .write(true)
            .open("/dev/null")
            .unwrap();
        let dev = M2mDevice::fake(OwnedFd::from(file));
        let mut queue = Queue {
            kind: QueueKind::Output,
            buf_type: QueueKind::Output.buf_type(true),
            memory: QueueKind::Output.memory(),
            format: sys::v4l2_format::zeroed(QueueKind::Output.buf_type(true)),
            slots: Vec::new(),
        };

        let err = commit(
            &dev,
            &mut queue,
            sys::V4L2_FIELD_INTERLACED_TB,
            1920,
            1080,
            1920,
            1920 * 1080,
        )
        .unwrap_err();
        match err {
            Error::Device("VIDIOC_S_FMT", _) => {}
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
