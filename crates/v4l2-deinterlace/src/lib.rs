// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

//! Hardware Video Deinterlacing for Linux
//!
//! This crate drives a V4L2 memory-to-memory (M2M) deinterlacer with
//! zero-copy DMA buffer exchange on both sides: interlaced frames enter the
//! device OUTPUT queue as borrowed dmabuf descriptors, the hardware splits
//! each frame into two progressive frames, and results leave the CAPTURE
//! queue as exported dmabuf descriptors the consumer can map or hand to
//! another hardware block. Pixel payload is never copied, only descriptors.
//!
//! Each interlaced input frame produces two progressive output frames, so
//! the output frame rate is double the input rate.
//!
//! # Quick Start
//!
//! ```no_run
//! use v4l2_deinterlace::frame::SourceFrame;
//! use v4l2_deinterlace::pipeline::Deinterlacer;
//!
//! let deint = Deinterlacer::builder(1920, 1080)
//!     .with_device("/dev/video10")
//!     .open()?;
//!
//! // Feed an interlaced frame backed by a dmabuf (one object, three
//! // planes for planar YUV 4:2:0).
//! # fn next_input() -> SourceFrame { unimplemented!() }
//! let frame = next_input();
//! deint.submit(frame)?;
//!
//! // Pull progressive frames as they complete.
//! match deint.retrieve(deint.recommended_timeout()) {
//!     Ok(frame) => println!("deinterlaced frame pts {}", frame.pts()),
//!     Err(v4l2_deinterlace::Error::WouldBlock) => { /* nothing ready yet */ }
//!     Err(e) => return Err(e),
//! }
//! # Ok::<(), v4l2_deinterlace::Error>(())
//! ```
//!
//! # Buffer Lifetime
//!
//! Frames returned by [`pipeline::Deinterlacer::retrieve`] borrow hardware
//! buffers. Dropping the frame recycles its buffer back to the device (or
//! closes it once the pipeline has shut down), so frames may be held, sent
//! to other threads, and released in any order, even after the pipeline
//! itself is gone.

use std::{error, fmt, io};

/// Error type for deinterlace pipeline operations
#[derive(Debug)]
pub enum Error {
    /// A device control (ioctl) failed; carries the operation name and the
    /// underlying OS error. Fatal for format negotiation and stream
    /// start/stop, retryable for buffer submission.
    Device(&'static str, io::Error),

    /// The device rejected the pixel format or field-order combination.
    /// There is no fallback.
    FormatUnsupported(&'static str),

    /// Buffer pool allocation failed and the pool was released. Retrying
    /// requires renegotiating the format.
    AllocationFailed(&'static str),

    /// No free hardware buffer slot. Backpressure signal: stall upstream
    /// and retry after completed buffers have been recycled.
    ResourceExhausted,

    /// No buffer became ready within the timeout. Expected steady-state
    /// condition, not a failure.
    WouldBlock,

    /// The pipeline is shutting down and refuses new submissions.
    Draining,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Device(op, err) => write!(f, "device control {} failed: {}", op, err),
            Error::FormatUnsupported(what) => write!(f, "format not supported: {}", what),
            Error::AllocationFailed(what) => write!(f, "buffer allocation failed: {}", what),
            Error::ResourceExhausted => write!(f, "no free buffer slot available"),
            Error::WouldBlock => write!(f, "no buffer ready within timeout"),
            Error::Draining => write!(f, "pipeline is shutting down"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Device(_, err) => Some(err),
            _ => None,
        }
    }
}

/// The sys module carries the raw V4L2 ABI structures and ioctl plumbing.
pub mod sys;

/// The fourcc module provides portable handling of fourcc codes.
pub mod fourcc;

/// The device module opens and validates M2M device handles.
pub mod device;

/// The format module negotiates formats and selection rectangles.
pub mod format;

/// The queue module manages the per-queue buffer pools and ioctl driver.
pub mod queue;

/// The frame module defines the frame representations on both pipeline
/// boundaries and the device timestamp encoding.
pub mod frame;

/// The pipeline module ties both queues into the deinterlace pipeline.
pub mod pipeline;

/// The discover module locates a capable device node under /dev.
pub mod discover;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Device("VIDIOC_STREAMON", io::Error::from_raw_os_error(libc::ENODEV));
        let msg = format!("{}", err);
        assert!(msg.contains("VIDIOC_STREAMON"));

        assert_eq!(
            format!("{}", Error::ResourceExhausted),
            "no free buffer slot available"
        );
        assert_eq!(
            format!("{}", Error::WouldBlock),
            "no buffer ready within timeout"
        );
    }

    #[test]
    fn test_error_source() {
        use std::error::Error as _;

        let err = Error::Device("VIDIOC_QBUF", io::Error::from_raw_os_error(libc::EINVAL));
        assert!(err.source().is_some());
        assert!(Error::WouldBlock.source().is_none());
    }
}
