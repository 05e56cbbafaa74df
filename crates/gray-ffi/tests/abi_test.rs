//! C ABI tests for the grayscale library.

use std::ffi::CStr;

use grayscale::{Grayscale, GrayscaleStatusString, Pixel, Status};

const HEADER: &str = include_str!("../include/grayscale.h");

#[test]
fn test_header_status_codes() {
    let names = [
        (Status::Success, "SUCCESS"),
        (Status::InvalidValue, "INVALID_VALUE"),
        (Status::MemoryAllocation, "MEMORY_ALLOCATION"),
        (Status::InitializationError, "INITIALIZATION_ERROR"),
        (Status::NoDevice, "NO_DEVICE"),
        (Status::KernelCompilation, "KERNEL_COMPILATION"),
        (Status::InvalidConfiguration, "INVALID_CONFIGURATION"),
        (Status::TransferFailed, "TRANSFER_FAILED"),
        (Status::LaunchFailure, "LAUNCH_FAILURE"),
        (Status::SynchronizationFailed, "SYNCHRONIZATION_FAILED"),
        (Status::Unknown, "UNKNOWN"),
    ];
    assert_eq!(names.len(), Status::ALL.len());

    for (status, name) in names {
        let decl = format!("GRAY_STATUS_{name} = {}", status.code());
        assert!(HEADER.contains(&decl), "header missing `{decl}`");
    }
}

#[test]
fn test_grayscale_raw_buffer() {
    let mut pixels: Vec<Pixel> = (0..1000u32)
        .map(|i| Pixel::rgb((i % 256) as u8, (i * 3 % 256) as u8, (i * 5 % 256) as u8))
        .collect();
    let before = pixels.clone();

    let status = unsafe { Grayscale(pixels.as_mut_ptr(), pixels.len() as u32) };
    assert_eq!(status, Status::Success);

    for (a, b) in pixels.iter().zip(&before) {
        assert_eq!((a.r, a.g, a.b), (b.r, b.g, b.b));
        assert_eq!(a.gray, b.luma());
    }
}

#[test]
fn test_status_string_export() {
    let s = unsafe { CStr::from_ptr(GrayscaleStatusString(Status::NoDevice.code())) };
    assert_eq!(s.to_str().unwrap(), "no compute device available");

    let s = unsafe { CStr::from_ptr(GrayscaleStatusString(1234)) };
    assert_eq!(s.to_str().unwrap(), "unrecognized status code");
}
