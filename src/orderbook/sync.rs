//! Snapshot/delta reconciliation
//!
//! The synchronizer is a pure state machine: it is fed deltas and the REST
//! snapshot by the book feed and tells the feed when to fetch the snapshot.
//!
//! ```text
//! AwaitingFirstDelta --delta--> AwaitingSnapshot --snapshot--> Buffering --replay--> Synchronized
//!        ^                                                                              |
//!        +------------------------ gap / crossed book / reset -------------------------+
//! ```

use tracing::debug;

use super::PriceLevelBook;
use crate::error::Result;
use crate::parser::{DepthUpdate, OrderBookSnapshot};

/// Phase of the synchronization protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    AwaitingFirstDelta,
    /// Snapshot fetch in flight, deltas are buffered
    AwaitingSnapshot,
    /// Snapshot received, buffered deltas are being replayed
    Buffering,
    Synchronized,
}

/// What the caller has to do after feeding a delta
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// First delta seen: start fetching the snapshot now
    FetchSnapshot,
    /// Delta held until the snapshot arrives
    Buffered,
    /// Delta applied, the book has a new state
    Applied,
}

/// Turns a delta stream plus one snapshot into a gap-free book
#[derive(Debug)]
pub struct BookSynchronizer {
    symbol: String,
    phase: SyncPhase,
    buffer: Vec<DepthUpdate>,
    book: Option<PriceLevelBook>,
}

impl BookSynchronizer {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            phase: SyncPhase::AwaitingFirstDelta,
            buffer: Vec::new(),
            book: None,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// The synchronized book, `None` until the snapshot has been applied
    pub fn book(&self) -> Option<&PriceLevelBook> {
        match self.phase {
            SyncPhase::Synchronized => self.book.as_ref(),
            _ => None,
        }
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Discard all partial state and start over
    pub fn reset(&mut self) {
        self.phase = SyncPhase::AwaitingFirstDelta;
        self.buffer.clear();
        self.book = None;
    }

    /// Feed the next delta from the stream.
    ///
    /// Any error leaves the synchronizer reset to `AwaitingFirstDelta`.
    pub fn on_delta(&mut self, update: DepthUpdate) -> Result<SyncAction> {
        match self.phase {
            SyncPhase::AwaitingFirstDelta => {
                self.buffer.push(update);
                self.phase = SyncPhase::AwaitingSnapshot;
                Ok(SyncAction::FetchSnapshot)
            }
            SyncPhase::AwaitingSnapshot | SyncPhase::Buffering => {
                self.buffer.push(update);
                Ok(SyncAction::Buffered)
            }
            SyncPhase::Synchronized => {
                let Some(book) = self.book.as_mut() else {
                    self.reset();
                    return self.on_delta(update);
                };
                match book.apply_update(&update) {
                    Ok(()) => Ok(SyncAction::Applied),
                    Err(e) => {
                        self.reset();
                        Err(e)
                    }
                }
            }
        }
    }

    /// Build the book from the snapshot and replay the buffered deltas that
    /// are not already contained in it.
    ///
    /// Returns the number of replayed deltas. Any error leaves the
    /// synchronizer reset to `AwaitingFirstDelta`.
    pub fn on_snapshot(&mut self, snapshot: &OrderBookSnapshot) -> Result<usize> {
        if self.phase != SyncPhase::AwaitingSnapshot {
            debug!(phase = ?self.phase, "Ignoring snapshot outside of AwaitingSnapshot");
            return Ok(0);
        }

        self.phase = SyncPhase::Buffering;
        let mut book = PriceLevelBook::from_snapshot(&self.symbol, snapshot);
        let mut replayed = 0;

        let buffered = std::mem::take(&mut self.buffer);
        for update in buffered {
            if update.previous_sequence < snapshot.sequence {
                continue;
            }
            if let Err(e) = book.apply_update(&update) {
                self.reset();
                return Err(e);
            }
            replayed += 1;
        }

        debug!(
            symbol = %self.symbol,
            sequence = book.sequence(),
            replayed,
            "Order book synchronized from snapshot"
        );

        self.book = Some(book);
        self.phase = SyncPhase::Synchronized;
        Ok(replayed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MarketMakerError;
    use crate::orderbook::Side;
    use crate::parser::PriceLevel;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn level(price: Decimal, quantity: Decimal) -> PriceLevel {
        PriceLevel { price, quantity }
    }

    fn delta(previous: u64, sequence: u64, bid: (Decimal, Decimal)) -> DepthUpdate {
        DepthUpdate {
            symbol: "PERP_BTC_USDT".to_string(),
            sequence,
            previous_sequence: previous,
            bids: vec![level(bid.0, bid.1)],
            asks: vec![],
        }
    }

    fn snapshot(sequence: u64) -> OrderBookSnapshot {
        OrderBookSnapshot {
            sequence,
            bids: vec![level(dec!(100), dec!(1)), level(dec!(99), dec!(2))],
            asks: vec![level(dec!(101), dec!(1)), level(dec!(102), dec!(2))],
        }
    }

    #[test]
    fn test_first_delta_triggers_fetch_and_is_buffered() {
        let mut sync = BookSynchronizer::new("PERP_BTC_USDT");
        assert_eq!(sync.phase(), SyncPhase::AwaitingFirstDelta);

        let action = sync.on_delta(delta(90, 95, (dec!(98), dec!(1)))).unwrap();
        assert_eq!(action, SyncAction::FetchSnapshot);
        assert_eq!(sync.phase(), SyncPhase::AwaitingSnapshot);
        assert_eq!(sync.buffered(), 1);

        let action = sync.on_delta(delta(95, 99, (dec!(98), dec!(2)))).unwrap();
        assert_eq!(action, SyncAction::Buffered);
        assert_eq!(sync.buffered(), 2);
        assert!(sync.book().is_none());
    }

    #[test]
    fn test_buffer_replay_skips_deltas_older_than_snapshot() {
        let mut sync = BookSynchronizer::new("PERP_BTC_USDT");
        sync.on_delta(delta(95, 99, (dec!(97), dec!(9)))).unwrap();
        sync.on_delta(delta(99, 100, (dec!(96), dec!(9)))).unwrap();
        sync.on_delta(delta(100, 101, (dec!(98), dec!(3)))).unwrap();
        sync.on_delta(delta(101, 105, (dec!(100), dec!(0)))).unwrap();

        let replayed = sync.on_snapshot(&snapshot(100)).unwrap();
        assert_eq!(replayed, 2);
        assert_eq!(sync.phase(), SyncPhase::Synchronized);

        let mut expected = PriceLevelBook::from_snapshot("PERP_BTC_USDT", &snapshot(100));
        expected.apply_update(&delta(100, 101, (dec!(98), dec!(3)))).unwrap();
        expected.apply_update(&delta(101, 105, (dec!(100), dec!(0)))).unwrap();

        assert_eq!(sync.book(), Some(&expected));
        assert_eq!(sync.book().unwrap().sequence(), 105);
        assert_eq!(sync.book().unwrap().best_bid().unwrap().price, dec!(99));
    }

    #[test]
    fn test_synchronized_deltas_apply_in_sequence() {
        let mut sync = BookSynchronizer::new("PERP_BTC_USDT");
        sync.on_delta(delta(90, 95, (dec!(97), dec!(1)))).unwrap();
        sync.on_snapshot(&snapshot(100)).unwrap();

        let action = sync.on_delta(delta(100, 110, (dec!(99.5), dec!(4)))).unwrap();
        assert_eq!(action, SyncAction::Applied);
        let book = sync.book().unwrap();
        assert_eq!(book.sequence(), 110);
        assert_eq!(book.best_bid().unwrap().price, dec!(100));
        assert_eq!(book.level_count(Side::Bid), 3);
        let bids: Vec<_> = book.levels(Side::Bid).iter().map(|l| l.price).collect();
        assert_eq!(bids, vec![dec!(100), dec!(99.5), dec!(99)]);

        let action = sync.on_delta(delta(110, 111, (dec!(100.5), dec!(1)))).unwrap();
        assert_eq!(action, SyncAction::Applied);
        assert_eq!(sync.book().unwrap().best_bid().unwrap().price, dec!(100.5));
    }

    #[test]
    fn test_gap_resets_to_awaiting_first_delta() {
        let mut sync = BookSynchronizer::new("PERP_BTC_USDT");
        sync.on_delta(delta(100, 101, (dec!(98), dec!(1)))).unwrap();
        sync.on_snapshot(&snapshot(100)).unwrap();
        assert_eq!(sync.phase(), SyncPhase::Synchronized);

        let err = sync.on_delta(delta(150, 160, (dec!(98), dec!(1)))).unwrap_err();
        assert!(matches!(
            err,
            MarketMakerError::GapDetected {
                expected: 101,
                got: 150
            }
        ));
        assert_eq!(sync.phase(), SyncPhase::AwaitingFirstDelta);
        assert_eq!(sync.buffered(), 0);
        assert!(sync.book().is_none());

        // The protocol starts over
        let action = sync.on_delta(delta(160, 170, (dec!(98), dec!(1)))).unwrap();
        assert_eq!(action, SyncAction::FetchSnapshot);
    }

    #[test]
    fn test_gap_during_replay_resets() {
        let mut sync = BookSynchronizer::new("PERP_BTC_USDT");
        sync.on_delta(delta(102, 103, (dec!(98), dec!(1)))).unwrap();

        let err = sync.on_snapshot(&snapshot(100)).unwrap_err();
        assert!(matches!(err, MarketMakerError::GapDetected { .. }));
        assert_eq!(sync.phase(), SyncPhase::AwaitingFirstDelta);
    }

    #[test]
    fn test_crossed_book_resets() {
        let mut sync = BookSynchronizer::new("PERP_BTC_USDT");
        sync.on_delta(delta(90, 95, (dec!(97), dec!(1)))).unwrap();
        sync.on_snapshot(&snapshot(100)).unwrap();

        let err = sync.on_delta(delta(100, 101, (dec!(101.5), dec!(1)))).unwrap_err();
        assert!(matches!(err, MarketMakerError::CrossedBook { .. }));
        assert_eq!(sync.phase(), SyncPhase::AwaitingFirstDelta);
    }

    #[test]
    fn test_gap_inside_buffer_resets_and_clears_buffer() {
        let mut sync = BookSynchronizer::new("PERP_BTC_USDT");
        sync.on_delta(delta(100, 101, (dec!(98), dec!(1)))).unwrap();
        sync.on_delta(delta(104, 105, (dec!(98), dec!(2)))).unwrap();

        let err = sync.on_snapshot(&snapshot(100)).unwrap_err();
        assert!(matches!(err, MarketMakerError::GapDetected { expected: 101, got: 104 }));
        assert_eq!(sync.buffered(), 0);
        assert!(sync.book().is_none());
    }

    #[test]
    fn test_snapshot_without_pending_fetch_is_ignored() {
        let mut sync = BookSynchronizer::new("PERP_BTC_USDT");
        assert_eq!(sync.on_snapshot(&snapshot(100)).unwrap(), 0);
        assert_eq!(sync.phase(), SyncPhase::AwaitingFirstDelta);
    }
}
