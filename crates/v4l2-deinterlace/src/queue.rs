// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Buffer pools and the queue driver.
//!
//! Each of the two device queues owns a fixed pool of [`Slot`]s created by
//! [`Queue::allocate`]. The OUTPUT pool imports dmabuf descriptors borrowed
//! from submitted frames; the CAPTURE pool is kernel-allocated, pre-armed at
//! allocation time and exported as dmabuf descriptors owned by the slots.
//! The driver half wraps the enqueue/dequeue ioctls and the readiness poll,
//! and tracks the per-slot enqueued/free state that doubles as the free
//! list.

use std::{
    mem,
    os::fd::{FromRawFd, OwnedFd, RawFd},
};

use crate::{frame::SourceFrame, sys, Error};

/// Which side of the memory-to-memory device a queue drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    /// Frames submitted to the hardware.
    Output,
    /// Frames produced by the hardware.
    Capture,
}

impl QueueKind {
    pub fn buf_type(self, multiplanar: bool) -> u32 {
        match (self, multiplanar) {
            (QueueKind::Output, false) => sys::V4L2_BUF_TYPE_VIDEO_OUTPUT,
            (QueueKind::Output, true) => sys::V4L2_BUF_TYPE_VIDEO_OUTPUT_MPLANE,
            (QueueKind::Capture, false) => sys::V4L2_BUF_TYPE_VIDEO_CAPTURE,
            (QueueKind::Capture, true) => sys::V4L2_BUF_TYPE_VIDEO_CAPTURE_MPLANE,
        }
    }

    /// OUTPUT buffers are imported dmabufs, CAPTURE buffers come from the
    /// kernel pool so they can be exported.
    pub fn memory(self) -> u32 {
        match self {
            QueueKind::Output => sys::V4L2_MEMORY_DMABUF,
            QueueKind::Capture => sys::V4L2_MEMORY_MMAP,
        }
    }

    pub fn poll_events(self) -> i16 {
        match self {
            QueueKind::Output => libc::POLLOUT | libc::POLLWRNORM,
            QueueKind::Capture => libc::POLLIN | libc::POLLRDNORM,
        }
    }

    pub fn is_output(self) -> bool {
        self == QueueKind::Output
    }
}

/// Per-plane layout recorded at allocation time.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PlaneInfo {
    pub bytesperline: u32,
    pub length: u32,
}

/// Bookkeeping record for one hardware buffer.
pub(crate) struct Slot {
    pub index: u32,
    pub enqueued: bool,
    pub field: u32,
    pub flags: u32,
    pub timestamp: libc::timeval,
    pub planes: Vec<PlaneInfo>,
    /// CAPTURE: exported dmabuf fds, one per plane, owned by the slot.
    pub exported: Vec<OwnedFd>,
    /// OUTPUT: the submitted frame, moved in so its dmabufs stay alive
    /// while the hardware reads them.
    pub attached: Option<SourceFrame>,
    /// OUTPUT: raw plane fds borrowed from `attached` at submission.
    pub bound_fds: Vec<RawFd>,
}

impl Slot {
    pub(crate) fn new(index: u32, planes: Vec<PlaneInfo>) -> Self {
        Slot {
            index,
            enqueued: false,
            field: sys::V4L2_FIELD_ANY,
            flags: 0,
            timestamp: libc::timeval {
                tv_sec: 0,
                tv_usec: 0,
            },
            planes,
            exported: Vec::new(),
            attached: None,
            bound_fds: Vec::new(),
        }
    }
}

/// One device queue with its negotiated format and buffer pool.
pub(crate) struct Queue {
    pub kind: QueueKind,
    pub buf_type: u32,
    pub memory: u32,
    pub format: sys::v4l2_format,
    pub slots: Vec<Slot>,
}

impl Queue {
    /// Creates the queue and loads the device's current format so later
    /// negotiation starts from driver defaults.
    pub fn new(fd: RawFd, kind: QueueKind, multiplanar: bool) -> Result<Self, Error> {
        let buf_type = kind.buf_type(multiplanar);
        let mut format = sys::v4l2_format::zeroed(buf_type);
        // SAFETY: format is a live v4l2_format matching the request code.
        unsafe { sys::ioctl(fd, sys::VIDIOC_G_FMT, &mut format) }
            .map_err(|e| Error::Device("VIDIOC_G_FMT", e))?;

        Ok(Queue {
            kind,
            buf_type,
            memory: kind.memory(),
            format,
            slots: Vec::new(),
        })
    }

    pub fn stream_on(&self, fd: RawFd) -> Result<(), Error> {
        let mut buf_type = self.buf_type as libc::c_int;
        log::debug!("stream on type {}", self.buf_type);
        // SAFETY: buf_type is a live c_int matching the request code.
        unsafe { sys::ioctl(fd, sys::VIDIOC_STREAMON, &mut buf_type) }
            .map_err(|e| Error::Device("VIDIOC_STREAMON", e))
    }

    pub fn stream_off(&self, fd: RawFd) -> Result<(), Error> {
        let mut buf_type = self.buf_type as libc::c_int;
        log::debug!("stream off type {}", self.buf_type);
        // SAFETY: buf_type is a live c_int matching the request code.
        unsafe { sys::ioctl(fd, sys::VIDIOC_STREAMOFF, &mut buf_type) }
            .map_err(|e| Error::Device("VIDIOC_STREAMOFF", e))
    }

    /// Allocates the buffer pool. The device may grant fewer buffers than
    /// requested; zero granted is a failure. CAPTURE slots are immediately
    /// enqueued (the device writes into them, so the queue starts armed)
    /// and their planes exported as dmabuf fds.
    ///
    /// Any failure releases the slots created so far and leaves the pool
    /// empty; retrying requires renegotiating the format.
    pub fn allocate(&mut self, fd: RawFd, count: u32) -> Result<(), Error> {
        let multiplanar = sys::is_multiplanar(self.buf_type);

        // SAFETY: all-zero is a valid v4l2_requestbuffers.
        let mut req: sys::v4l2_requestbuffers = unsafe { mem::zeroed() };
        req.count = count;
        req.type_ = self.buf_type;
        req.memory = self.memory;

        // SAFETY: req is a live v4l2_requestbuffers matching the request.
        if let Err(e) = unsafe { sys::ioctl(fd, sys::VIDIOC_REQBUFS, &mut req) } {
            log::error!("VIDIOC_REQBUFS failed: {}", e);
            return Err(Error::AllocationFailed("VIDIOC_REQBUFS"));
        }
        if req.count == 0 {
            return Err(Error::AllocationFailed("device granted no buffers"));
        }
        log::debug!(
            "queue type {} allocated {} of {} requested buffers",
            self.buf_type,
            req.count,
            count
        );

        for index in 0..req.count {
            // SAFETY: all-zero planes are valid.
            let mut planes: [sys::v4l2_plane; sys::VIDEO_MAX_PLANES] = unsafe { mem::zeroed() };
            let mut buf = sys::v4l2_buffer::zeroed(self.buf_type, self.memory);
            buf.index = index;
            if multiplanar {
                buf.length = sys::VIDEO_MAX_PLANES as u32;
                buf.m.planes = planes.as_mut_ptr();
            }

            // SAFETY: buf and its planes array outlive the call.
            if let Err(e) = unsafe { sys::ioctl(fd, sys::VIDIOC_QUERYBUF, &mut buf) } {
                log::error!("VIDIOC_QUERYBUF failed for index {}: {}", index, e);
                self.slots.clear();
                return Err(Error::AllocationFailed("VIDIOC_QUERYBUF"));
            }

            let num_planes = if multiplanar { buf.length as usize } else { 1 };
            let mut info = Vec::with_capacity(num_planes);
            for plane in 0..num_planes {
                if multiplanar {
                    // SAFETY: pix_mp is the active union member for
                    // multi-plane buffer types.
                    let pix_mp = unsafe { self.format.fmt.pix_mp };
                    info.push(PlaneInfo {
                        bytesperline: pix_mp.plane_fmt[plane].bytesperline,
                        length: planes[plane].length,
                    });
                } else {
                    // SAFETY: pix is the active union member for
                    // single-plane buffer types.
                    let bytesperline = unsafe { self.format.fmt.pix.bytesperline };
                    info.push(PlaneInfo {
                        bytesperline,
                        length: buf.length,
                    });
                }
            }

            self.slots.push(Slot::new(index, info));

            if !self.kind.is_output() {
                let slot_index = self.slots.len() - 1;
                if let Err(e) = self.submit(fd, slot_index) {
                    log::error!("pre-arming capture buffer {} failed: {}", index, e);
                    self.slots.clear();
                    return Err(Error::AllocationFailed("capture pre-arm VIDIOC_QBUF"));
                }
                if let Err(e) = self.export_slot(fd, slot_index, num_planes) {
                    log::error!("VIDIOC_EXPBUF failed for index {}: {}", index, e);
                    self.slots.clear();
                    return Err(Error::AllocationFailed("VIDIOC_EXPBUF"));
                }
            }
        }

        Ok(())
    }

    fn export_slot(&mut self, fd: RawFd, slot_index: usize, num_planes: usize) -> Result<(), Error> {
        let slot = &mut self.slots[slot_index];
        for plane in 0..num_planes {
            // SAFETY: all-zero is a valid v4l2_exportbuffer.
            let mut expbuf: sys::v4l2_exportbuffer = unsafe { mem::zeroed() };
            expbuf.type_ = self.buf_type;
            expbuf.index = slot.index;
            expbuf.plane = plane as u32;
            expbuf.flags = (libc::O_CLOEXEC | libc::O_RDWR) as u32;

            // SAFETY: expbuf is a live v4l2_exportbuffer matching the
            // request code.
            unsafe { sys::ioctl(fd, sys::VIDIOC_EXPBUF, &mut expbuf) }
                .map_err(|e| Error::Device("VIDIOC_EXPBUF", e))?;

            // SAFETY: on success the kernel returned a fresh dmabuf fd we
            // now own.
            slot.exported.push(unsafe { OwnedFd::from_raw_fd(expbuf.fd) });
        }
        Ok(())
    }

    /// Hands the slot to the device. No state is reverted on failure.
    pub fn submit(&mut self, fd: RawFd, slot_index: usize) -> Result<(), Error> {
        let multiplanar = sys::is_multiplanar(self.buf_type);
        let dmabuf = self.memory == sys::V4L2_MEMORY_DMABUF;
        let slot = &mut self.slots[slot_index];

        // SAFETY: all-zero planes are valid.
        let mut planes: [sys::v4l2_plane; sys::VIDEO_MAX_PLANES] = unsafe { mem::zeroed() };
        let mut buf = sys::v4l2_buffer::zeroed(self.buf_type, self.memory);
        buf.index = slot.index;
        buf.field = slot.field;
        buf.timestamp = slot.timestamp;

        if multiplanar {
            for (plane, info) in slot.planes.iter().enumerate() {
                planes[plane].length = info.length;
                if dmabuf {
                    planes[plane].m.fd = slot.bound_fds[plane];
                }
            }
            buf.length = slot.planes.len() as u32;
            buf.m.planes = planes.as_mut_ptr();
        } else {
            buf.length = slot.planes[0].length;
            if dmabuf {
                buf.m.fd = slot.bound_fds[0];
            }
        }

        log::trace!(
            "qbuf type {} index {} field {}",
            self.buf_type,
            slot.index,
            slot.field
        );
        // SAFETY: buf and its planes array outlive the call; bound fds are
        // kept alive by the attached frame.
        unsafe { sys::ioctl(fd, sys::VIDIOC_QBUF, &mut buf) }
            .map_err(|e| Error::Device("VIDIOC_QBUF", e))?;

        slot.enqueued = true;
        Ok(())
    }

    /// Waits up to `timeout_ms` (0 = immediate) for a completed buffer and
    /// dequeues it. Returns the slot index, marked free of its enqueue.
    ///
    /// Returns `None` on timeout, error readiness, or when the device has
    /// nothing ready ("would block" is the expected steady-state answer
    /// and is not logged as an error).
    pub fn dequeue(&mut self, fd: RawFd, timeout_ms: i32) -> Option<usize> {
        if !sys::wait_ready(fd, self.kind.poll_events(), timeout_ms) {
            return None;
        }

        // SAFETY: all-zero planes are valid.
        let mut planes: [sys::v4l2_plane; sys::VIDEO_MAX_PLANES] = unsafe { mem::zeroed() };
        let mut buf = sys::v4l2_buffer::zeroed(self.buf_type, self.memory);
        if sys::is_multiplanar(self.buf_type) {
            buf.length = sys::VIDEO_MAX_PLANES as u32;
            buf.m.planes = planes.as_mut_ptr();
        }

        // SAFETY: buf and its planes array outlive the call.
        if let Err(e) = unsafe { sys::ioctl(fd, sys::VIDIOC_DQBUF, &mut buf) } {
            if e.raw_os_error() != Some(libc::EAGAIN) {
                log::debug!("VIDIOC_DQBUF failed: {}", e);
            }
            return None;
        }

        let index = buf.index as usize;
        let slot = self.slots.get_mut(index)?;
        slot.enqueued = false;
        slot.flags = buf.flags;
        slot.field = buf.field;
        slot.timestamp = buf.timestamp;
        log::trace!("dqbuf type {} index {} flags {:#x}", self.buf_type, index, buf.flags);
        Some(index)
    }

    /// First slot not currently enqueued, or `None` when the pool is
    /// exhausted (the caller's backpressure signal).
    pub fn find_free_slot(&self) -> Option<usize> {
        self.slots.iter().position(|slot| !slot.enqueued)
    }

    /// Drains every already-completed buffer without blocking and drops
    /// the frames attached to them, making their slots reusable.
    pub fn recycle_completed(&mut self, fd: RawFd) {
        while let Some(index) = self.dequeue(fd, 0) {
            let slot = &mut self.slots[index];
            slot.attached = None;
            slot.bound_fds.clear();
        }
    }

    /// Number of slots currently owned by the device. Used for admission
    /// control on the OUTPUT side.
    pub fn count_enqueued(&self) -> usize {
        self.slots.iter().filter(|slot| slot.enqueued).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_queue(kind: QueueKind, slots: usize) -> Queue {
        let buf_type = kind.buf_type(true);
        Queue {
            kind,
            buf_type,
            memory: kind.memory(),
            format: sys::v4l2_format::zeroed(buf_type),
            slots: (0..slots)
                .map(|i| {
                    Slot::new(
                        i as u32,
                        vec![PlaneInfo {
                            bytesperline: 1920,
                            length: 1920 * 1080 * 3 / 2,
                        }],
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn test_queue_kind_buf_types() {
        assert_eq!(
            QueueKind::Output.buf_type(false),
            sys::V4L2_BUF_TYPE_VIDEO_OUTPUT
        );
        assert_eq!(
            QueueKind::Output.buf_type(true),
            sys::V4L2_BUF_TYPE_VIDEO_OUTPUT_MPLANE
        );
        assert_eq!(
            QueueKind::Capture.buf_type(false),
            sys::V4L2_BUF_TYPE_VIDEO_CAPTURE
        );
        assert_eq!(
            QueueKind::Capture.buf_type(true),
            sys::V4L2_BUF_TYPE_VIDEO_CAPTURE_MPLANE
        );
    }

    #[test]
    fn test_queue_kind_memory() {
        assert_eq!(QueueKind::Output.memory(), sys::V4L2_MEMORY_DMABUF);
        assert_eq!(QueueKind::Capture.memory(), sys::V4L2_MEMORY_MMAP);
    }

    #[test]
    fn test_find_free_slot_exhaustion() {
        // A pool of K slots admits exactly K claims before reporting
        // exhaustion.
        let mut queue = fake_queue(QueueKind::Output, 4);

        for _ in 0..4 {
            let index = queue.find_free_slot().expect("slot available");
            queue.slots[index].enqueued = true;
        }
        assert_eq!(queue.find_free_slot(), None);

        // Recycling one slot makes it claimable again.
        queue.slots[2].enqueued = false;
        assert_eq!(queue.find_free_slot(), Some(2));
    }

    #[test]
    fn test_count_enqueued() {
        let mut queue = fake_queue(QueueKind::Output, 5);
        assert_eq!(queue.count_enqueued(), 0);

        queue.slots[0].enqueued = true;
        queue.slots[3].enqueued = true;
        assert_eq!(queue.count_enqueued(), 2);
    }

    #[test]
    fn test_dequeue_without_device_reports_nothing() {
        // A dead fd never yields a buffer; the driver treats it as "not
        // ready" rather than panicking.
        let mut queue = fake_queue(QueueKind::Capture, 2);
        assert_eq!(queue.dequeue(-1, 0), None);
    }
}
