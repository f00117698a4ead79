//! `otaserver-coap` exposes the firmware images of a directory to embedded
//! devices through the Constrained Application Protocol (`CoAP`).
//!
//! For every application slot found in the firmware directory, the server
//! attaches these read-only resources:
//!
//! | Path                       | Payload                          |
//! |----------------------------|----------------------------------|
//! | `/{appid}/{slot}/version`  | latest version, i.e. `0x2`       |
//! | `/{appid}/{slot}/name`     | latest firmware filename         |
//! | `/{appid}/{slot}/firmware` | latest firmware binary           |
//! | `/{appid}/version`         | latest version of the first slot |
//!
//! A device asks for the latest version, compares it with its own one, and
//! downloads the new binary when needed. Binaries larger than a datagram are
//! transferred block by block.
//!
//! Every request answers with the `2.05 Content` status, even when no
//! firmware is available. In that case, the payload is empty.
//!
//! New firmware can be deployed while the server is running: the firmware
//! directory is watched, and the resources of new application slots are
//! attached to the tree as soon as their files appear. A periodic scan
//! catches the files the watcher may miss. The content of every response is
//! always read from disk, so a newer version is served as soon as its file
//! appears.

#![deny(unsafe_code)]
#![deny(missing_docs)]

/// Translation of `CoAP` datagrams into resource requests.
pub mod dispatch;
/// Error management.
pub mod error;
/// Firmware resources along with their responses.
pub mod resources;
/// The firmware server.
pub mod server;
/// The tree of firmware resources.
pub mod tree;

mod watch;

pub use server::{DEFAULT_COAP_PORT, GracefulShutdownServer, Server};
pub use tree::ResourceTree;
