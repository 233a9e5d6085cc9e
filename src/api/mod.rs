//! Purpose: Define the stable public Rust API boundary for ledgerbatch.
//! Exports: Client, transport, item specs, outcome/result types, and errors.
//! Role: Public, additive-only surface; hides internal core module layout.
//! Invariants: This module is the only public path to core types.
//! Invariants: Encoder and correlator stay reachable for callers with custom transports.

mod client;
mod remote;

pub use crate::core::correlate::correlate;
pub use crate::core::encode::{encode_item, encode_items};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::item::{
    CreateAsset, CreateKey, ItemSpec, OP_CREATE_ASSET, OP_CREATE_KEY, OP_UPDATE_ASSET_TAGS, Tags,
    UpdateAssetTags,
};
pub use crate::core::outcome::{ItemOutcome, Outcome, RawOutcome};
pub use crate::core::result::BatchResult;
pub use crate::core::taxonomy::{Failure, FailureClass, FailureCode, map_failure};
pub use client::{ApiResult, BatchClient, Transport};
pub use remote::{BATCH_PATH, HttpTransport};
