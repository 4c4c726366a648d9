//! Append-only mailbox ledger.
//!
//! Anyone may deposit a letter; anyone may enumerate every letter ever
//! deposited, in order, with the identity of its sender.
//!
//! * [`ledger`]: the in-memory ledger, its snapshot format and Merkle root.
//! * [`identity`]: 20-byte sender addresses, derivable from ed25519 keys.
//! * [`store`]: the JSON file store the `mailbox` binary deposits through.

pub mod identity;
pub mod ledger;
pub mod store;

pub use identity::{Identity, IdentityError};
pub use ledger::{Ledger, LedgerError, LedgerSnapshot, Letter};
pub use store::{LedgerStore, StoreError};
