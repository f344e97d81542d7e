//! The persisted outbox row and its lifecycle status.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// The three statuses of an outbox row. `Init` is non-terminal; `Success`
/// and `Fail` are terminal and are never written back to `Init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum OutboxStatus {
    Init = 0,
    Success = 1,
    Fail = 2,
}

impl OutboxStatus {
    pub const fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Init),
            1 => Some(Self::Success),
            2 => Some(Self::Fail),
            _ => None,
        }
    }

    /// Terminal statuses are write-once: no transition leads out of them.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Fail)
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Success => "success",
            Self::Fail => "fail",
        };
        f.write_str(name)
    }
}

impl FromStr for OutboxStatus {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "init" => Ok(Self::Init),
            "success" => Ok(Self::Success),
            "fail" => Ok(Self::Fail),
            other => Err(RelayError::InvalidInput(format!("unknown outbox status: {other}"))),
        }
    }
}

/// A persisted outbox row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub id: i64,
    pub key: String,
    pub data: Vec<u8>,
    pub send_times: i64,
    pub status: OutboxStatus,
    pub utime: i64,
    pub ctime: i64,
}

/// Fields needed to insert a new row; `id`/`utime`/`ctime` are assigned by
/// the store.
#[derive(Debug, Clone)]
pub struct NewOutboxRecord {
    pub key: String,
    pub data: Vec<u8>,
}

/// Fields applied by a single-row send-status update
/// ([`Insert`]/`UpdateOnSend`]).
#[derive(Debug, Clone, Copy)]
pub struct SendOutcomeUpdate {
    pub status: OutboxStatus,
    pub send_times: i64,
    pub utime: i64,
}

/// Filter/pagination parameters for [`crate::outbox::OutboxQuery`]-driven
/// listing (admin surface `List`).
#[derive(Debug, Clone)]
pub struct OutboxQuery {
    /// `None` means "any status".
    pub status: Option<OutboxStatus>,
    pub key: Option<String>,
    pub ctime_from: Option<i64>,
    pub ctime_to: Option<i64>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for OutboxQuery {
    fn default() -> Self {
        Self { status: None, key: None, ctime_from: None, ctime_to: None, limit: 50, offset: 0 }
    }
}
