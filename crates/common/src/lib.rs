/**
 * Local directory storage for opaque payloads,
 *  with staged writes and atomic commits.
 */
pub mod blob_store;
/**
 * Post-delivery cleanup queue and the
 *  worker that drains it.
 */
pub mod burn;
pub mod clock;
/**
 * Single-use upload and download credentials.
 */
pub mod credentials;
pub mod error;
/**
 * The relay service transports talk to.
 *  Uploads, credential issuance, one-shot delivery.
 */
pub mod relay;
/**
 * Pending transfer records and the
 *  latest-slot bookkeeping.
 */
pub mod tasks;
pub mod token;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::blob_store::{BlobStore, BlobStoreError, StorageHandle};
    pub use crate::burn::BurnWorker;
    pub use crate::clock::{Clock, ManualClock, SharedClock, SystemClock};
    pub use crate::credentials::UploadMode;
    pub use crate::error::RelayError;
    pub use crate::relay::{Delivery, Receipt, Relay, RelayConfig, UploadSession};
    pub use crate::tasks::TaskId;
    pub use crate::token::Token;
    pub use crate::version::build_info;
}
