// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! The deinterlace pipeline.
//!
//! [`Deinterlacer`] owns a reference-counted context shared with every
//! frame it has emitted. The context carries the device handle and both
//! queues; it is torn down exactly once, when the last holder lets go.
//! That last holder may be an emitted frame released long after the
//! pipeline itself was dropped.
//!
//! Format negotiation is deferred to the first submitted frame: the frame
//! reveals the stream's field order and coded layout, both queues are
//! committed and their pools allocated (CAPTURE pre-armed), and streaming
//! starts. From then on [`Deinterlacer::submit`] feeds the OUTPUT queue
//! and [`Deinterlacer::retrieve`] drains the CAPTURE queue.
//!
//! A single thread is expected to drive submission and retrieval. Emitted
//! frames may still be released from any thread at any time, so the queue
//! bookkeeping lives behind a mutex; the retrieval wait itself runs
//! without the lock so a concurrent frame release can always re-arm its
//! buffer.
//!
//! # Example
//!
//! ```no_run
//! use v4l2_deinterlace::pipeline::Deinterlacer;
//! use v4l2_deinterlace::Error;
//!
//! let deint = Deinterlacer::builder(1920, 1080).open()?;
//! # let mut inputs: Vec<v4l2_deinterlace::frame::SourceFrame> = Vec::new();
//!
//! loop {
//!     if deint.needs_input() {
//!         match inputs.pop() {
//!             Some(frame) => deint.submit(frame)?,
//!             None => break,
//!         }
//!     }
//!     match deint.retrieve(deint.recommended_timeout()) {
//!         Ok(frame) => println!("frame pts {}", frame.pts()),
//!         Err(Error::WouldBlock) => continue,
//!         Err(e) => return Err(e),
//!     }
//! }
//! # Ok::<(), Error>(())
//! ```

use std::{
    io,
    os::fd::{AsRawFd, BorrowedFd, FromRawFd, RawFd},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use dma_buf::DmaBuf;
use unix_ts::Timestamp;

use crate::{
    device::M2mDevice,
    discover,
    format,
    fourcc::FourCC,
    frame::{
        next_pts, pts_from_timeval, pts_to_timeval, AspectRatio, FieldOrder, FramePlane,
        SourceFrame, USEC_PER_SEC,
    },
    queue::{Queue, QueueKind},
    sys, Error,
};

const DEFAULT_OUTPUT_BUFFERS: u32 = 10;
const DEFAULT_CAPTURE_BUFFERS: u32 = 8;

/// Nominal output frame interval: the device doubles the frame rate, so
/// the default assumes 60 progressive frames per second.
const DEFAULT_FRAME_INTERVAL_US: i64 = USEC_PER_SEC / 60;

/// With fewer OUTPUT buffers than this in flight, input may still be
/// forthcoming and retrieval should not block on the device.
const OUTPUT_LOW_WATER: usize = 5;

/// Poll this long once enough buffers are in flight that a capture
/// completion is imminent.
const BLOCKING_TIMEOUT_MS: i32 = 10_000;

struct State {
    draining: bool,
    coded_width: u32,
    coded_height: u32,
    sample_aspect_ratio: AspectRatio,
    field_order: FieldOrder,
    last_pts: i64,
    output: Queue,
    capture: Queue,
}

pub(crate) struct Shared {
    dev: M2mDevice,
    width: u32,
    height: u32,
    output_pool: u32,
    capture_pool: u32,
    frame_interval: i64,
    state: Mutex<State>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let fd = self.dev.raw_fd();
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if !state.draining {
            if let Err(e) = state.output.stream_off(fd) {
                log::debug!("output stream off failed: {}", e);
            }
            if let Err(e) = state.capture.stream_off(fd) {
                log::debug!("capture stream off failed: {}", e);
            }
        }
        log::debug!("destroying deinterlace context");
        // Exported descriptors, attached input frames and the device
        // handle close with their owners.
    }
}

/// An emitted frame's hold on its CAPTURE slot. Releasing it recycles the
/// buffer to the device while the stream is live, or closes the exported
/// descriptors once the pipeline has drained. Runs exactly once, from
/// whichever thread drops the frame.
struct SlotHold {
    shared: Arc<Shared>,
    index: usize,
}

impl Drop for SlotHold {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        if state.draining {
            state.capture.slots[self.index].exported.clear();
            log::trace!("closed capture buffer {} after shutdown", self.index);
        } else if let Err(e) = state.capture.submit(self.shared.dev.raw_fd(), self.index) {
            log::error!("failed to recycle capture buffer {}: {}", self.index, e);
        }
        // The Arc reference drops after the lock is released; if this was
        // the last holder the context is torn down.
    }
}

/// A progressive frame produced by the deinterlacer.
///
/// The payload is a set of exported dmabuf planes borrowed from a device
/// buffer. Dropping the frame returns the buffer to the device (or closes
/// it if the pipeline has shut down), so frames may be held and released
/// in any order, on any thread, including after the pipeline is gone.
pub struct ProgressiveFrame {
    format: FourCC,
    width: u32,
    height: u32,
    sample_aspect_ratio: AspectRatio,
    pts: i64,
    decode_error: bool,
    /// Raw fd and byte size per dmabuf object; fds are owned by the held
    /// capture slot.
    objects: Vec<(RawFd, usize)>,
    planes: Vec<FramePlane>,
    /// Kept for its drop side effect: recycles or closes the slot.
    _hold: SlotHold,
}

impl ProgressiveFrame {
    /// Pixel format of the exported planes (planar YUV 4:2:0).
    pub fn format(&self) -> FourCC {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn sample_aspect_ratio(&self) -> AspectRatio {
        self.sample_aspect_ratio
    }

    /// Presentation timestamp in microseconds. Always present: missing or
    /// repeated device timestamps are replaced with synthesized ones, so
    /// consecutive frames carry strictly increasing values.
    pub fn pts(&self) -> i64 {
        self.pts
    }

    /// The presentation timestamp as a seconds/nanoseconds timestamp.
    pub fn timestamp(&self) -> Timestamp {
        let secs = self.pts.div_euclid(USEC_PER_SEC);
        let micros = self.pts.rem_euclid(USEC_PER_SEC);
        Timestamp::new(secs, (micros * 1000) as u32)
    }

    /// True when the device flagged this buffer as corrupted. The frame
    /// is still delivered; whether to display it is the consumer's call.
    pub fn is_corrupt(&self) -> bool {
        self.decode_error
    }

    /// Plane layout: object index, byte offset and row pitch per plane.
    /// Three planes for planar YUV 4:2:0 (luma, then two half-pitch
    /// chroma planes), synthesized over a single object when the device
    /// reports a single combined plane.
    pub fn planes(&self) -> &[FramePlane] {
        &self.planes
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Borrow the dmabuf descriptor backing object `object`.
    pub fn object_fd(&self, object: usize) -> BorrowedFd<'_> {
        // SAFETY: the fd is owned by the capture slot this frame holds
        // and stays open at least as long as the hold.
        unsafe { BorrowedFd::borrow_raw(self.objects[object].0) }
    }

    /// Byte size of object `object`.
    pub fn object_size(&self, object: usize) -> usize {
        self.objects[object].1
    }

    /// Duplicates object `object` into an owned [`DmaBuf`] handle, e.g.
    /// for CPU mapping. The duplicate is independent of the frame's own
    /// lifetime.
    pub fn dmabuf(&self, object: usize) -> Result<DmaBuf, Error> {
        // SAFETY: duplicating a valid fd.
        let fd = unsafe { libc::fcntl(self.objects[object].0, libc::F_DUPFD_CLOEXEC, 0) };
        if fd < 0 {
            return Err(Error::Device("F_DUPFD_CLOEXEC", io::Error::last_os_error()));
        }
        // SAFETY: fd is a freshly duplicated descriptor we now own.
        Ok(unsafe { DmaBuf::from_raw_fd(fd) })
    }
}

impl std::fmt::Debug for ProgressiveFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressiveFrame")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("pts", &self.pts)
            .field("corrupt", &self.decode_error)
            .finish()
    }
}

/// Configuration builder for [`Deinterlacer`].
#[derive(Debug, Clone)]
pub struct Builder {
    device: Option<PathBuf>,
    width: u32,
    height: u32,
    output_buffers: u32,
    capture_buffers: u32,
    frame_interval: i64,
}

impl Builder {
    /// Device node to use. Without this the builder scans `/dev` for the
    /// first capable device.
    pub fn with_device<P: AsRef<Path>>(mut self, device: P) -> Builder {
        self.device = Some(device.as_ref().to_path_buf());
        self
    }

    /// Number of OUTPUT buffers to request; the device may grant fewer.
    pub fn with_output_buffers(mut self, count: u32) -> Builder {
        self.output_buffers = count;
        self
    }

    /// Number of CAPTURE buffers to request; the device may grant fewer.
    pub fn with_capture_buffers(mut self, count: u32) -> Builder {
        self.capture_buffers = count;
        self
    }

    /// Nominal output frame interval in microseconds, used to synthesize
    /// timestamps the device did not preserve.
    pub fn with_frame_interval(mut self, micros: i64) -> Builder {
        self.frame_interval = micros;
        self
    }

    /// Opens and validates the device and returns the idle pipeline.
    /// Streaming starts on the first submitted frame.
    pub fn open(self) -> Result<Deinterlacer, Error> {
        let dev = match &self.device {
            Some(path) => {
                let dev = M2mDevice::open(path)?;
                format::probe(&dev, QueueKind::Capture, self.width, self.height)?;
                format::probe(&dev, QueueKind::Output, self.width, self.height)?;
                dev
            }
            None => discover::find_device(self.width, self.height)?,
        };

        let fd = dev.raw_fd();
        let output = Queue::new(fd, QueueKind::Output, dev.multiplanar())?;
        let capture = Queue::new(fd, QueueKind::Capture, dev.multiplanar())?;

        let shared = Arc::new(Shared {
            dev,
            width: self.width,
            height: self.height,
            output_pool: self.output_buffers,
            capture_pool: self.capture_buffers,
            frame_interval: self.frame_interval,
            state: Mutex::new(State {
                draining: false,
                coded_width: 0,
                coded_height: 0,
                sample_aspect_ratio: AspectRatio::default(),
                field_order: FieldOrder::Unknown,
                last_pts: 0,
                output,
                capture,
            }),
        });

        Ok(Deinterlacer { shared })
    }
}

/// A V4L2 M2M deinterlace pipeline.
pub struct Deinterlacer {
    shared: Arc<Shared>,
}

impl Deinterlacer {
    /// Starts configuring a pipeline for `width`x`height` visible frames.
    pub fn builder(width: u32, height: u32) -> Builder {
        Builder {
            device: None,
            width,
            height,
            output_buffers: DEFAULT_OUTPUT_BUFFERS,
            capture_buffers: DEFAULT_CAPTURE_BUFFERS,
            frame_interval: DEFAULT_FRAME_INTERVAL_US,
        }
    }

    /// Visible frame width.
    pub fn width(&self) -> u32 {
        self.shared.width
    }

    /// Visible frame height.
    pub fn height(&self) -> u32 {
        self.shared.height
    }

    /// Submits an interlaced frame to the device.
    ///
    /// The first frame fixes the stream's field order, commits the format
    /// on both queues, allocates the buffer pools (CAPTURE pre-armed) and
    /// starts streaming. The frame is moved into its buffer slot, keeping
    /// its dmabuf descriptors alive until the device has consumed them.
    ///
    /// Completed OUTPUT buffers are recycled before a slot is claimed;
    /// [`Error::ResourceExhausted`] means every slot is still in flight.
    /// Stall upstream and retry after retrieving frames, it is never
    /// fatal.
    pub fn submit(&self, frame: SourceFrame) -> Result<(), Error> {
        let fd = self.shared.dev.raw_fd();
        let mut state = self.shared.lock();
        let state = &mut *state;

        if state.draining {
            return Err(Error::Draining);
        }

        state.sample_aspect_ratio = frame.sample_aspect_ratio;

        if state.field_order == FieldOrder::Unknown {
            self.start_streaming(state, &frame)?;
        }

        if frame.objects.is_empty() {
            return Err(Error::FormatUnsupported("frame carries no dmabuf objects"));
        }

        state.output.recycle_completed(fd);
        let slot_index = state.output.find_free_slot().ok_or(Error::ResourceExhausted)?;

        let num_planes = state.output.slots[slot_index].planes.len();
        // One object per device plane; a frame with all planes in a single
        // dmabuf backs every device plane with object 0.
        let bound: Vec<RawFd> = (0..num_planes)
            .map(|i| frame.objects.get(i).unwrap_or(&frame.objects[0]).raw_fd())
            .collect();

        let slot = &mut state.output.slots[slot_index];
        slot.bound_fds = bound;
        if frame.interlaced {
            slot.field = if frame.top_field_first {
                sys::V4L2_FIELD_INTERLACED_TB
            } else {
                sys::V4L2_FIELD_INTERLACED_BT
            };
        }
        slot.timestamp = pts_to_timeval(frame.pts);
        slot.attached = Some(frame);

        state.output.submit(fd, slot_index)
    }

    /// First-frame setup: fix the field order, commit formats, allocate
    /// pools and start both streams. The coded geometry comes from the
    /// frame's luma layout (row pitch and luma plane size).
    fn start_streaming(&self, state: &mut State, frame: &SourceFrame) -> Result<(), Error> {
        let fd = self.shared.dev.raw_fd();

        let pitch = frame
            .planes
            .first()
            .map(|p| p.pitch as u32)
            .filter(|&p| p > 0)
            .ok_or(Error::FormatUnsupported("frame has no luma plane layout"))?;
        let luma_size = frame
            .planes
            .get(1)
            .map(|p| p.offset as u32)
            .filter(|&s| s >= pitch)
            .ok_or(Error::FormatUnsupported("frame layout lacks a chroma plane"))?;

        state.coded_width = pitch;
        state.coded_height = luma_size / pitch;
        state.field_order = if frame.top_field_first {
            FieldOrder::TopFirst
        } else {
            FieldOrder::BottomFirst
        };

        log::debug!(
            "starting stream: {}x{} coded {}x{} field order {:?}",
            self.shared.width,
            self.shared.height,
            state.coded_width,
            state.coded_height,
            state.field_order
        );

        format::commit(
            &self.shared.dev,
            &mut state.output,
            state.field_order.v4l2_field(),
            self.shared.width,
            self.shared.height,
            pitch,
            luma_size,
        )?;
        format::commit(
            &self.shared.dev,
            &mut state.capture,
            sys::V4L2_FIELD_NONE,
            self.shared.width,
            self.shared.height,
            pitch,
            luma_size,
        )?;

        state.capture.allocate(fd, self.shared.capture_pool)?;
        state.capture.stream_on(fd)?;
        state.output.allocate(fd, self.shared.output_pool)?;
        state.output.stream_on(fd)?;

        Ok(())
    }

    /// Waits up to `timeout_ms` (0 = immediate) for a deinterlaced frame.
    ///
    /// [`Error::WouldBlock`] is the expected steady-state answer when the
    /// device has nothing ready; when [`Deinterlacer::needs_input`] is
    /// also true, respond by feeding more input rather than retrying.
    pub fn retrieve(&self, timeout_ms: i32) -> Result<ProgressiveFrame, Error> {
        let fd = self.shared.dev.raw_fd();

        if self.shared.lock().capture.slots.is_empty() {
            // Nothing negotiated yet; the first submit arms the queue.
            return Err(Error::WouldBlock);
        }

        // Wait without holding the state lock: a consumer releasing a
        // frame must be able to re-arm its buffer while we sleep here, or
        // this wait could never be satisfied.
        if !sys::wait_ready(fd, QueueKind::Capture.poll_events(), timeout_ms) {
            return Err(Error::WouldBlock);
        }

        let mut state = self.shared.lock();
        let state = &mut *state;

        let index = state.capture.dequeue(fd, 0).ok_or(Error::WouldBlock)?;
        let slot = &state.capture.slots[index];

        let (objects, planes) = if slot.planes.len() > 1 {
            // One exported object per device plane.
            let objects = slot
                .exported
                .iter()
                .zip(&slot.planes)
                .map(|(fd, info)| (fd.as_raw_fd(), info.length as usize))
                .collect();
            let planes = slot
                .planes
                .iter()
                .enumerate()
                .map(|(i, info)| FramePlane {
                    object: i,
                    offset: 0,
                    pitch: info.bytesperline as usize,
                })
                .collect();
            (objects, planes)
        } else {
            // The device reported a single combined plane; synthesize the
            // three-plane YUV 4:2:0 view over it.
            let pitch = slot.planes[0].bytesperline as usize;
            let luma = pitch * state.coded_height as usize;
            let objects = vec![(
                slot.exported[0].as_raw_fd(),
                slot.planes[0].length as usize,
            )];
            let planes = vec![
                FramePlane {
                    object: 0,
                    offset: 0,
                    pitch,
                },
                FramePlane {
                    object: 0,
                    offset: luma,
                    pitch: pitch / 2,
                },
                FramePlane {
                    object: 0,
                    offset: luma + luma / 4,
                    pitch: pitch / 2,
                },
            ];
            (objects, planes)
        };

        let decode_error = slot.flags & sys::V4L2_BUF_FLAG_ERROR != 0;
        if decode_error {
            log::error!("device reported a buffer error, passing frame through");
        }

        let pts = next_pts(
            pts_from_timeval(slot.timestamp),
            state.last_pts,
            self.shared.frame_interval,
        );
        state.last_pts = pts;
        state.capture.slots[index].timestamp = pts_to_timeval(Some(pts));

        Ok(ProgressiveFrame {
            format: FourCC(*b"YU12"),
            width: self.shared.width,
            height: self.shared.height,
            sample_aspect_ratio: state.sample_aspect_ratio,
            pts,
            decode_error,
            objects,
            planes,
            _hold: SlotHold {
                shared: Arc::clone(&self.shared),
                index,
            },
        })
    }

    /// Number of OUTPUT buffers currently owned by the device.
    pub fn output_in_flight(&self) -> usize {
        self.shared.lock().output.count_enqueued()
    }

    /// True when few enough OUTPUT buffers are in flight that the caller
    /// should feed more input instead of blocking on retrieval.
    pub fn needs_input(&self) -> bool {
        self.output_in_flight() < OUTPUT_LOW_WATER
    }

    /// Suggested `retrieve` timeout for the current pipeline fill level:
    /// non-blocking while input is still wanted, a long wait once enough
    /// buffers are in flight that a completion is imminent.
    pub fn recommended_timeout(&self) -> i32 {
        if self.needs_input() {
            0
        } else {
            BLOCKING_TIMEOUT_MS
        }
    }

    /// Stops both device streams and refuses further submissions.
    /// Outstanding emitted frames stay valid; their buffers are closed as
    /// they are released. Idempotent; also runs on drop.
    pub fn shutdown(&self) {
        let fd = self.shared.dev.raw_fd();
        let mut state = self.shared.lock();
        if state.draining {
            return;
        }
        state.draining = true;

        if let Err(e) = state.output.stream_off(fd) {
            log::debug!("output stream off failed: {}", e);
        }
        if let Err(e) = state.capture.stream_off(fd) {
            log::debug!("capture stream off failed: {}", e);
        }
    }
}

impl Drop for Deinterlacer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{PlaneInfo, Slot};
    use std::fs::File;
    use std::os::fd::OwnedFd;
    use std::sync::Weak;

    fn null_fd() -> OwnedFd {
        OwnedFd::from(
            File::options()
                .read(true)
                .write(true)
                .open("/dev/null")
                .unwrap(),
        )
    }

    fn fake_capture_slot(index: u32) -> Slot {
        let mut slot = Slot::new(
            index,
            vec![PlaneInfo {
                bytesperline: 1920,
                length: 1920 * 1080 * 3 / 2,
            }],
        );
        slot.exported.push(null_fd());
        slot
    }

    fn fake_pipeline(capture_slots: usize) -> Deinterlacer {
        let dev = M2mDevice::fake(null_fd());
        let multiplanar = dev.multiplanar();
        let mk_queue = |kind: QueueKind| Queue {
            kind,
            buf_type: kind.buf_type(multiplanar),
            memory: kind.memory(),
            format: sys::v4l2_format::zeroed(kind.buf_type(multiplanar)),
            slots: Vec::new(),
        };
        let mut capture = mk_queue(QueueKind::Capture);
        capture.slots = (0..capture_slots)
            .map(|i| fake_capture_slot(i as u32))
            .collect();

        Deinterlacer {
            shared: Arc::new(Shared {
                dev,
                width: 1920,
                height: 1080,
                output_pool: DEFAULT_OUTPUT_BUFFERS,
                capture_pool: DEFAULT_CAPTURE_BUFFERS,
                frame_interval: DEFAULT_FRAME_INTERVAL_US,
                state: Mutex::new(State {
                    draining: false,
                    coded_width: 1920,
                    coded_height: 1080,
                    sample_aspect_ratio: AspectRatio::default(),
                    field_order: FieldOrder::TopFirst,
                    last_pts: 0,
                    output: mk_queue(QueueKind::Output),
                    capture,
                }),
            }),
        }
    }

    fn hold(pipeline: &Deinterlacer, index: usize) -> SlotHold {
        SlotHold {
            shared: Arc::clone(&pipeline.shared),
            index,
        }
    }

    #[test]
    fn test_context_outlives_pipeline_until_last_release() {
        let pipeline = fake_pipeline(3);
        let weak: Weak<Shared> = Arc::downgrade(&pipeline.shared);

        let hold_a = hold(&pipeline, 0);
        let hold_b = hold(&pipeline, 1);
        let hold_c = hold(&pipeline, 2);

        // Tearing the pipeline down must not destroy the context while
        // frames are outstanding.
        drop(pipeline);
        assert!(weak.upgrade().is_some());

        // Releases may happen in any order; only the last one destroys.
        drop(hold_b);
        assert!(weak.upgrade().is_some());
        drop(hold_a);
        assert!(weak.upgrade().is_some());
        drop(hold_c);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_release_after_shutdown_closes_descriptors() {
        let pipeline = fake_pipeline(2);
        let shared = Arc::clone(&pipeline.shared);

        let held = hold(&pipeline, 0);
        pipeline.shutdown();
        drop(held);

        let state = shared.lock();
        assert!(
            state.capture.slots[0].exported.is_empty(),
            "exported descriptors must be closed on post-shutdown release"
        );
        assert!(!state.capture.slots[0].enqueued);
    }

    #[test]
    fn test_release_while_live_keeps_descriptors() {
        let pipeline = fake_pipeline(2);
        let shared = Arc::clone(&pipeline.shared);

        // Live release attempts a requeue (which the fake device rejects)
        // and must not close the exported descriptors either way.
        drop(hold(&pipeline, 1));

        let state = shared.lock();
        assert!(!state.capture.slots[1].exported.is_empty());
        drop(state);
    }

    #[test]
    fn test_submit_after_shutdown_is_refused() {
        let pipeline = fake_pipeline(1);
        pipeline.shutdown();

        let frame = SourceFrame {
            objects: Vec::new(),
            planes: Vec::new(),
            interlaced: true,
            top_field_first: true,
            pts: None,
            sample_aspect_ratio: AspectRatio::default(),
        };
        match pipeline.submit(frame) {
            Err(Error::Draining) => {}
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let pipeline = fake_pipeline(1);
        pipeline.shutdown();
        pipeline.shutdown();
        assert!(pipeline.shared.lock().draining);
    }

    #[test]
    fn test_retrieve_before_negotiation_would_block() {
        let pipeline = fake_pipeline(0);
        match pipeline.retrieve(0) {
            Err(Error::WouldBlock) => {}
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_needs_input_when_idle() {
        let pipeline = fake_pipeline(1);
        assert!(pipeline.needs_input());
        assert_eq!(pipeline.recommended_timeout(), 0);

        {
            let mut state = pipeline.shared.lock();
            for i in 0..OUTPUT_LOW_WATER {
                state.output.slots.push(fake_capture_slot(i as u32));
                let index = state.output.slots.len() - 1;
                state.output.slots[index].enqueued = true;
            }
        }
        assert!(!pipeline.needs_input());
        assert_eq!(pipeline.recommended_timeout(), BLOCKING_TIMEOUT_MS);
    }

    #[test]
    fn test_builder_defaults() {
        let builder = Deinterlacer::builder(1280, 720);
        assert_eq!(builder.width, 1280);
        assert_eq!(builder.height, 720);
        assert_eq!(builder.output_buffers, DEFAULT_OUTPUT_BUFFERS);
        assert_eq!(builder.capture_buffers, DEFAULT_CAPTURE_BUFFERS);
        assert_eq!(builder.frame_interval, USEC_PER_SEC / 60);
        assert!(builder.device.is_none());
    }
}
