//! Account state: positions and balances
//!
//! Each domain merges a REST snapshot with private pushes into one
//! last-writer-wins table.

mod feeds;
mod merge;
mod table;

pub use feeds::{spawn_account_stream, AccountFeed, AccountStream, BalanceFeed, PositionFeed};
pub use merge::{AccountStateHandle, FeedEvent, MergeMessage, SnapshotMergeStream};
pub use table::{AccountStateTable, Observation};

use rust_decimal::Decimal;

/// Holding per symbol
pub type Positions = AccountStateTable<String, Decimal>;

/// Holding per token
pub type Balances = AccountStateTable<String, Decimal>;
