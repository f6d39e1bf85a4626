//! keepstack-vault: JSON-file-backed persistent merge store.
//!
//! The vault is the durable side of a collection run: identity-keyed record
//! collections with merge-don't-clobber semantics, derived ordering, durable
//! stop flags for cross-context cancellation, and bulk clear.

mod vault;

pub use vault::{data_dir, MergeOutcome, Vault, VaultSnapshot};
