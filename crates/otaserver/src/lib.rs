//! `otaserver` turns a directory of firmware images into a queryable catalog.
//!
//! Firmware images are plain files whose names encode the device slot they
//! target, the application they belong to, and their version:
//!
//! ```text
//! {slot}_{appid}_{version}_{suffix}
//! slot0_app42_0x2_fw.bin
//! ```
//!
//! The version is a hexadecimal number, and a larger number denotes a newer
//! image. The [`catalog::Catalog`] answers which image is the latest one for
//! an application and a slot, and returns its filename or its content.
//!
//! The catalog never caches the directory content, so images deployed on
//! disk are served as soon as they appear.

#![deny(unsafe_code)]
#![deny(missing_docs)]

/// The firmware catalog.
pub mod catalog;
/// Error management.
pub mod error;
/// The firmware naming convention.
pub mod filename;

pub use catalog::Catalog;
pub use filename::{FirmwareDescriptor, Version};
