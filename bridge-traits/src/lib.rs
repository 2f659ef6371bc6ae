//! # External Collaborator Contracts
//!
//! Platform- and transport-agnostic traits consumed by the offline sync
//! engine. The engine never talks to the network or the byte-transfer layer
//! directly; it depends on these contracts and receives concrete
//! implementations from the host application:
//!
//! - [`ContentApi`](content::ContentApi): remote course content metadata
//!   (file/folder listings, dashboard cards)
//! - [`FileTransfer`](transfer::FileTransfer): per-file byte transfer with
//!   incremental progress reporting
//!
//! All operations return a typed [`BridgeError`](error::BridgeError) so the
//! engine can classify failures (transient network, authorization, missing
//! record, storage exhaustion) without knowing transport details.

pub mod content;
pub mod error;
pub mod transfer;

pub use content::{ContentApi, DashboardCardInfo, RemoteFileInfo};
pub use error::{BridgeError, Result};
pub use transfer::{DownloadRequest, Downloaded, DiscoveredFile, FileTransfer, ProgressCallback};
