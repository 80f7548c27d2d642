// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies
//
// Deinterlace Pipeline Tests
//
// TESTING LAYERS:
//
// Layer 1 (Unit Tests - No hardware required):
//   - Builder configuration and open failures
//   - Source frame construction and descriptor ownership
//   - FourCC conversions
//   - Error surface of the public API
//
// Layer 3 (Hardware Integration - Requires a V4L2 M2M deinterlacer):
//   - Device discovery and pipeline open
//   - Idle retrieval behavior on a real device
//
// RUN LAYER 1:
//   cargo test --test deinterlace_pipeline
//
// RUN LAYER 3 (on hardware):
//   cargo test --test deinterlace_pipeline -- --ignored --nocapture

use std::fs::File;
use std::os::fd::{AsRawFd, OwnedFd};

use serial_test::serial;
use v4l2_deinterlace::fourcc::FourCC;
use v4l2_deinterlace::frame::{AspectRatio, DmaObject, FramePlane, SourceFrame};
use v4l2_deinterlace::pipeline::Deinterlacer;
use v4l2_deinterlace::Error;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// =============================================================================
// Layer 1: Unit Tests (No Hardware Required)
// =============================================================================

#[test]
fn test_open_missing_device() {
    let result = Deinterlacer::builder(1920, 1080)
        .with_device("/dev/video-does-not-exist")
        .open();
    match result {
        Err(Error::Device("open", _)) => {}
        Err(other) => panic!("unexpected error: {:?}", other),
        Ok(_) => panic!("open succeeded on a missing node"),
    }
}

#[test]
fn test_open_non_video_device() {
    // /dev/null opens fine but rejects the capability query.
    let result = Deinterlacer::builder(1920, 1080)
        .with_device("/dev/null")
        .open();
    match result {
        Err(Error::Device("VIDIOC_QUERYCAP", _)) => {}
        Err(other) => panic!("unexpected error: {:?}", other),
        Ok(_) => panic!("open succeeded on /dev/null"),
    }
}

#[test]
fn test_source_frame_layout() {
    // A 720x576 interlaced frame in one dmabuf object, three planes.
    let backing = File::open("/dev/null").unwrap();
    let size = 768 * 576 * 3 / 2;
    let frame = SourceFrame {
        objects: vec![DmaObject::new(OwnedFd::from(backing), size)],
        planes: vec![
            FramePlane {
                object: 0,
                offset: 0,
                pitch: 768,
            },
            FramePlane {
                object: 0,
                offset: 768 * 576,
                pitch: 384,
            },
            FramePlane {
                object: 0,
                offset: 768 * 576 + 768 * 576 / 4,
                pitch: 384,
            },
        ],
        interlaced: true,
        top_field_first: true,
        pts: Some(40_000),
        sample_aspect_ratio: AspectRatio { num: 16, den: 15 },
    };

    assert_eq!(frame.objects.len(), 1);
    assert_eq!(frame.objects[0].size(), size);
    assert!(frame.objects[0].fd().as_raw_fd() >= 0);
    assert_eq!(frame.planes[1].offset, 768 * 576);
}

#[test]
fn test_fourcc_public_api() {
    let yu12 = FourCC(*b"YU12");
    assert_eq!(u32::from(yu12), 0x3231_5559);
    assert_eq!(FourCC::from(0x3231_5559), yu12);
    assert_eq!(format!("{}", yu12), "YU12");
}

#[test]
fn test_error_messages_name_the_condition() {
    assert!(format!("{}", Error::ResourceExhausted).contains("no free buffer slot"));
    assert!(format!("{}", Error::WouldBlock).contains("timeout"));
    assert!(format!("{}", Error::Draining).contains("shutting down"));
}

// =============================================================================
// Layer 3: Hardware Integration (Requires V4L2 M2M deinterlacer)
// =============================================================================

#[ignore = "test requires a V4L2 M2M deinterlace device (run with --include-ignored to enable)"]
#[test]
#[serial]
fn test_discover_and_open() {
    init_logging();
    let deint = Deinterlacer::builder(1920, 1080)
        .open()
        .expect("no deinterlace-capable device found");
    assert_eq!(deint.width(), 1920);
    assert_eq!(deint.height(), 1080);
}

#[ignore = "test requires a V4L2 M2M deinterlace device (run with --include-ignored to enable)"]
#[test]
#[serial]
fn test_idle_retrieve_would_block() {
    init_logging();
    let deint = Deinterlacer::builder(1920, 1080).open().unwrap();

    // Before the first frame arrives nothing is negotiated and the
    // pipeline wants input.
    assert!(deint.needs_input());
    assert_eq!(deint.recommended_timeout(), 0);
    match deint.retrieve(0) {
        Err(Error::WouldBlock) => {}
        Ok(_) => panic!("retrieve returned a frame from an idle pipeline"),
        Err(other) => panic!("unexpected error: {:?}", other),
    }
}
