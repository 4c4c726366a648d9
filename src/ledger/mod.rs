use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::identity::Identity;

pub const SNAPSHOT_VERSION: u8 = 1;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u8),
    #[error("snapshot records {recorded} letters but holds {actual}")]
    CountMismatch { recorded: u64, actual: u64 },
    #[error("snapshot root {recorded} does not match letters (computed {computed})")]
    RootMismatch { recorded: String, computed: String },
}

/// A deposited message. Fields are fixed at deposit time.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Letter {
    content: String,
    sender: Identity,
}

impl Letter {
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn sender(&self) -> Identity {
        self.sender
    }

    /// `(content, sender)` pair as exposed by enumeration.
    pub fn as_pair(&self) -> (&str, Identity) {
        (&self.content, self.sender)
    }

    fn leaf_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"letter");
        hasher.update(self.sender.as_bytes());
        hasher.update((self.content.len() as u64).to_le_bytes());
        hasher.update(self.content.as_bytes());
        hasher.finalize().into()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub version: u8,
    pub total_letters: u64,
    pub letters: Vec<Letter>,
    #[serde(with = "hex_root")]
    pub root: [u8; 32],
}

/// Append-only sequence of letters.
///
/// `deposit` is the only mutation and needs `&mut self`; every read borrows
/// immutably, so enumeration always sees whole letters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Ledger {
    letters: Vec<Letter>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a letter attributed to `sender`. Content is not validated.
    pub fn deposit(&mut self, sender: Identity, content: impl Into<String>) {
        self.letters.push(Letter {
            content: content.into(),
            sender,
        });
    }

    /// Every letter in deposit order.
    pub fn read_all(&self) -> &[Letter] {
        &self.letters
    }

    pub fn total_letters(&self) -> u64 {
        self.letters.len() as u64
    }

    pub fn letter(&self, index: u64) -> Option<&Letter> {
        usize::try_from(index)
            .ok()
            .and_then(|idx| self.letters.get(idx))
    }

    pub fn is_empty(&self) -> bool {
        self.letters.is_empty()
    }

    /// Merkle root committing to every letter and its position.
    pub fn root(&self) -> [u8; 32] {
        compute_merkle_root(&self.letters)
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            version: SNAPSHOT_VERSION,
            total_letters: self.total_letters(),
            letters: self.letters.clone(),
            root: self.root(),
        }
    }

    /// Rebuilds a ledger from a snapshot, refusing one whose count or root
    /// disagrees with its letters.
    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Result<Self, LedgerError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(LedgerError::UnsupportedVersion(snapshot.version));
        }
        let actual = snapshot.letters.len() as u64;
        if snapshot.total_letters != actual {
            return Err(LedgerError::CountMismatch {
                recorded: snapshot.total_letters,
                actual,
            });
        }
        let computed = compute_merkle_root(&snapshot.letters);
        if computed != snapshot.root {
            return Err(LedgerError::RootMismatch {
                recorded: hex::encode(snapshot.root),
                computed: hex::encode(computed),
            });
        }
        Ok(Self {
            letters: snapshot.letters,
        })
    }
}

/// Root over the letter tree, bound to the letter count.
fn compute_merkle_root(letters: &[Letter]) -> [u8; 32] {
    let tree = build_merkle(letters.iter().map(Letter::leaf_hash).collect());
    let mut hasher = Sha256::new();
    hasher.update(b"mailbox-root");
    hasher.update((letters.len() as u64).to_le_bytes());
    hasher.update(tree);
    hasher.finalize().into()
}

// An unpaired node is promoted to the next level as-is.
fn build_merkle(mut level: Vec<[u8; 32]>) -> [u8; 32] {
    if level.is_empty() {
        return Sha256::digest(b"mailbox-empty").into();
    }
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => {
                    let mut hasher = Sha256::new();
                    hasher.update(b"node");
                    hasher.update(left);
                    hasher.update(right);
                    let node: [u8; 32] = hasher.finalize().into();
                    node
                }
                _ => pair[0],
            })
            .collect();
    }
    level[0]
}

mod hex_root {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let bytes = hex::decode(&encoded).map_err(D::Error::custom)?;
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| D::Error::invalid_length(bytes.len(), &"32 bytes"))
    }
}
