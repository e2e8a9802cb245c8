//! Ledger record types.

use std::fmt;

use chaoslb_core::Protocol;
use serde::Serialize;

/// Something this process created on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerEntry {
    DummyInterface {
        name: String,
    },
    VipBinding {
        address: String,
        interface: String,
    },
    ServiceEntry {
        address: String,
        port: u16,
        protocol: Protocol,
    },
    NatRule {
        address: String,
        port: u16,
        source: String,
    },
}

/// Discriminant of a [`LedgerEntry`], for counting and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    DummyInterface,
    VipBinding,
    ServiceEntry,
    NatRule,
}

impl LedgerEntry {
    pub fn kind(&self) -> EntryKind {
        match self {
            LedgerEntry::DummyInterface { .. } => EntryKind::DummyInterface,
            LedgerEntry::VipBinding { .. } => EntryKind::VipBinding,
            LedgerEntry::ServiceEntry { .. } => EntryKind::ServiceEntry,
            LedgerEntry::NatRule { .. } => EntryKind::NatRule,
        }
    }
}

impl fmt::Display for LedgerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerEntry::DummyInterface { name } => write!(f, "interface {name}"),
            LedgerEntry::VipBinding { address, interface } => {
                write!(f, "vip {address}/{interface}")
            }
            LedgerEntry::ServiceEntry {
                address,
                port,
                protocol,
            } => write!(f, "service {address}:{port}:{protocol}"),
            LedgerEntry::NatRule {
                address,
                port,
                source,
            } => write!(f, "snat {address}:{port}->{source}"),
        }
    }
}

/// Value of a kernel tunable before this process overrode it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OriginalParameter {
    pub name: String,
    pub previous_value: String,
}
