//! Transaction intent flags.
//!
//! Callers describe a transaction with a bitset drawn from four groups: isolation,
//! access mode, snapshot and (for commit / rollback) chaining. The decoding helpers
//! resolve each group to at most one choice.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Bitset of transaction intent flags.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionFlags(u32);

impl TransactionFlags {
    pub const REPEATABLE_READ: Self = Self(1 << 0);
    pub const READ_COMMITTED: Self = Self(1 << 1);
    pub const READ_UNCOMMITTED: Self = Self(1 << 2);
    pub const SERIALIZABLE: Self = Self(1 << 3);
    pub const READ_WRITE: Self = Self(1 << 4);
    pub const READ_ONLY: Self = Self(1 << 5);
    /// Only honored together with `REPEATABLE_READ`.
    pub const CONSISTENT_SNAPSHOT: Self = Self(1 << 6);
    pub const CHAIN: Self = Self(1 << 7);
    pub const NO_CHAIN: Self = Self(1 << 8);

    const NAMES: [(Self, &'static str); 9] = [
        (Self::REPEATABLE_READ, "REPEATABLE_READ"),
        (Self::READ_COMMITTED, "READ_COMMITTED"),
        (Self::READ_UNCOMMITTED, "READ_UNCOMMITTED"),
        (Self::SERIALIZABLE, "SERIALIZABLE"),
        (Self::READ_WRITE, "READ_WRITE"),
        (Self::READ_ONLY, "READ_ONLY"),
        (Self::CONSISTENT_SNAPSHOT, "CONSISTENT_SNAPSHOT"),
        (Self::CHAIN, "CHAIN"),
        (Self::NO_CHAIN, "NO_CHAIN"),
    ];

    const ALL_BITS: u32 = (1 << 9) - 1;

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Build from raw bits, dropping any bit that is not a known flag.
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & Self::ALL_BITS)
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub const fn contains(&self, other: Self) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }
}

impl BitOr for TransactionFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for TransactionFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for TransactionFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "TransactionFlags(empty)");
        }
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "TransactionFlags({})", names.join(" | "))
    }
}

/// Transaction isolation level.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    RepeatableRead,
    ReadCommitted,
    ReadUncommitted,
    Serializable,
}

impl IsolationLevel {
    /// Decoding order; the first level whose flag is set wins.
    pub const PRIORITY: [Self; 4] = [
        Self::RepeatableRead,
        Self::ReadCommitted,
        Self::ReadUncommitted,
        Self::Serializable,
    ];

    /// SQL spelling used after `ISOLATION LEVEL`.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::RepeatableRead => "REPEATABLE READ",
            Self::ReadCommitted => "READ COMMITTED",
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::Serializable => "SERIALIZABLE",
        }
    }

    pub fn flag(&self) -> TransactionFlags {
        match self {
            Self::RepeatableRead => TransactionFlags::REPEATABLE_READ,
            Self::ReadCommitted => TransactionFlags::READ_COMMITTED,
            Self::ReadUncommitted => TransactionFlags::READ_UNCOMMITTED,
            Self::Serializable => TransactionFlags::SERIALIZABLE,
        }
    }

    /// The highest-priority isolation level set in `flags`.
    pub fn from_flags(flags: TransactionFlags) -> Option<Self> {
        Self::PRIORITY
            .into_iter()
            .find(|level| flags.contains(level.flag()))
    }
}

/// Decoded `begin_transaction` flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeginIntent {
    pub isolation: Option<IsolationLevel>,
    pub consistent_snapshot: bool,
    /// `Some(true)` read-write, `Some(false)` read-only, `None` unspecified.
    pub read_write: Option<bool>,
}

impl BeginIntent {
    /// Decode begin flags. Empty flags mean `READ_WRITE`.
    pub fn decode(flags: TransactionFlags) -> Self {
        let flags = if flags.is_empty() {
            TransactionFlags::READ_WRITE
        } else {
            flags
        };
        let isolation = IsolationLevel::from_flags(flags);
        let consistent_snapshot = isolation == Some(IsolationLevel::RepeatableRead)
            && flags.contains(TransactionFlags::CONSISTENT_SNAPSHOT);
        let read_write = if flags.contains(TransactionFlags::READ_WRITE) {
            Some(true)
        } else if flags.contains(TransactionFlags::READ_ONLY) {
            Some(false)
        } else {
            None
        };
        Self {
            isolation,
            consistent_snapshot,
            read_write,
        }
    }
}

/// Decode the chaining group: `Some(true)` chain, `Some(false)` explicit no-chain.
pub fn decode_chain(flags: TransactionFlags) -> Option<bool> {
    if flags.contains(TransactionFlags::CHAIN) {
        Some(true)
    } else if flags.contains(TransactionFlags::NO_CHAIN) {
        Some(false)
    } else {
        None
    }
}
