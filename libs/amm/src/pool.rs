//! Pool state
//!
//! One [`Pool`] per asset pair. It owns the price position, the clock, every
//! accumulator and both position arenas; the engine modules (`spot`,
//! `liquidity`, `swapper`) are `impl Pool` blocks that read and mutate it
//! through `&mut self`.
//!
//! Entry points run inside [`Pool::transact`]: a failed operation restores
//! the state captured before it started, so no partial mutation survives.

use crate::accumulators::{
    DeadlineAccumulator, DeadlineLedger, DeadlineTree, FlowSchedule, RangeAccumulator, RangeTree,
    RateSchedule, Rescale,
};
use crate::error::{EngineError, Result};
use crate::events::PoolEvent;
use crate::liquidity::LpPosition;
use crate::math::time::{self, tail_era};
use crate::math::{Bin, Clock, PriceGrid};
use crate::swapper::SwapperPosition;
use crate::types::{Era, LpId, SwapperId, Token};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tidal_config::{PoolSettings, TOKENS};
use tracing::{debug, info, warn};

/// Fixed per-pool parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolParams {
    pub symbols: [String; 2],
    pub decimals: [u8; 2],
    pub epsilon: Decimal,
    pub spot_fee: Decimal,
    pub twap_spread: Decimal,
    pub utilization_cap: Decimal,
    pub min_rate: Decimal,
    pub variance_floor: Decimal,
}

/// Snapshot of the current price position and clock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceInfo {
    pub tick_bin: Bin,
    pub bin_frac: Decimal,
    pub price: Decimal,
    pub sqrt_price: Decimal,
    pub era: Era,
    pub date: Decimal,
    pub deflator: Decimal,
    pub variance: Decimal,
}

/// Per-bin liquidity breakdown, present units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinLiquidity {
    pub bin: Bin,
    pub minted: Decimal,
    pub staged: Decimal,
    pub draining: Decimal,
    pub lent: Decimal,
    pub used: Decimal,
    pub owed: Decimal,
    pub available: Decimal,
    pub utilization: Decimal,
}

#[derive(Debug, Clone)]
pub struct Pool {
    pub(crate) params: PoolParams,
    pub(crate) grid: PriceGrid,

    // Price position
    pub(crate) tick_bin: Bin,
    pub(crate) bin_frac: Decimal,
    pub(crate) variance: Decimal,

    // Clock
    pub(crate) clock: Clock,
    pub(crate) entry_deflator: Decimal,

    // Liquidity, present units
    pub(crate) minted: RangeTree,
    pub(crate) join_staged: RangeTree,

    // Borrowing, inflated units
    pub(crate) lent: DeadlineTree,
    pub(crate) used: DeadlineTree,
    pub(crate) owed: DeadlineTree,
    pub(crate) draining: RangeTree,
    pub(crate) expire: [DeadlineLedger; TOKENS],

    // Fee growth: per unit of earning liquidity, and per inflated lent unit
    pub(crate) fees: [RangeTree; TOKENS],
    pub(crate) lend_fees: [RangeTree; TOKENS],
    pub(crate) protocol_fees: [Decimal; TOKENS],

    // Scheduled flows, present units; `flow_dot[lend][token]`
    pub(crate) flow_hat: [FlowSchedule; TOKENS],
    pub(crate) flow_dot: [[RateSchedule; TOKENS]; TOKENS],
    pub(crate) matured: [Decimal; TOKENS],

    pub(crate) swapper_enabled: bool,
    pub(crate) swapper_ever: bool,

    pub(crate) lps: Vec<LpPosition>,
    pub(crate) swappers: Vec<SwapperPosition>,
    pub(crate) events: Vec<PoolEvent>,
}

impl Pool {
    /// Build a pool from validated settings
    pub fn new(settings: &PoolSettings) -> Result<Self> {
        settings.validate()?;
        let grid = PriceGrid::new(settings.splits)?;
        let (tick_bin, bin_frac) = grid.position_of(settings.initial_price)?;
        let depth = grid.splits();
        let clock = Clock::genesis();

        info!(
            pair = %format!("{}/{}", settings.symbols[0], settings.symbols[1]),
            splits = depth,
            tick_bin,
            "Pool created"
        );

        Ok(Self {
            params: PoolParams {
                symbols: settings.symbols.clone(),
                decimals: settings.decimals,
                epsilon: settings.epsilon,
                spot_fee: settings.spot_fee,
                twap_spread: settings.twap_spread,
                utilization_cap: settings.utilization_cap,
                min_rate: settings.min_rate,
                variance_floor: settings.variance_floor,
            },
            grid,
            tick_bin,
            bin_frac,
            variance: settings.initial_variance,
            entry_deflator: clock.deflator_at(tail_era(clock.era())),
            clock,
            minted: RangeTree::new(depth),
            join_staged: RangeTree::new(depth),
            lent: DeadlineTree::new(depth),
            used: DeadlineTree::new(depth),
            owed: DeadlineTree::new(depth),
            draining: RangeTree::new(depth),
            expire: [DeadlineLedger::new(), DeadlineLedger::new()],
            fees: [RangeTree::new(depth), RangeTree::new(depth)],
            lend_fees: [RangeTree::new(depth), RangeTree::new(depth)],
            protocol_fees: [Decimal::ZERO; TOKENS],
            flow_hat: [FlowSchedule::new(), FlowSchedule::new()],
            flow_dot: Default::default(),
            matured: [Decimal::ZERO; TOKENS],
            swapper_enabled: false,
            swapper_ever: false,
            lps: Vec::new(),
            swappers: Vec::new(),
            events: Vec::new(),
        })
    }

    /// Run `op` all-or-nothing.
    ///
    /// The rollback snapshot is a full clone of the pool, so every call costs
    /// O(state), and nested calls (batched actions) pay it once per level.
    pub fn transact<T>(&mut self, op: impl FnOnce(&mut Pool) -> Result<T>) -> Result<T> {
        let snapshot = self.clone();
        match op(self) {
            Ok(value) => Ok(value),
            Err(err) => {
                warn!(error = %err, kind = ?err.kind(), "Operation rejected, state restored");
                *self = snapshot;
                Err(err)
            }
        }
    }

    pub(crate) fn emit(&mut self, event: PoolEvent) {
        info!(event = event.name(), deltas = ?event.deltas(), "Pool event");
        self.events.push(event);
    }

    /// Drain the event log
    pub fn take_events(&mut self) -> Vec<PoolEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[PoolEvent] {
        &self.events
    }

    /// One-time activation of Swapper origination
    pub fn enable_swapper_creation(&mut self) -> Result<()> {
        self.transact(|pool| {
            if pool.swapper_enabled {
                return Err(EngineError::SwapperCreationAlreadyEnabled);
            }
            pool.swapper_enabled = true;
            pool.emit(PoolEvent::SwapperCreationEnabled);
            Ok(())
        })
    }

    /// Step the clock forward by `eras`
    pub fn advance(&mut self, eras: Era) -> Result<()> {
        self.transact(|pool| {
            let from = pool.clock.era();
            let from_deflator = pool.clock.deflator();
            let factor = pool.clock.advance(eras)?;
            let to = pool.clock.era();

            for index in 0..pool.swappers.len() {
                let pos = &pool.swappers[index];
                let Some(twap) = pos.twap else { continue };
                if twap.until <= to && !pos.is_unwound() {
                    let deflator = from_deflator * time::decay(twap.until - from);
                    pool.conclude_twap(SwapperId(index), deflator)?;
                }
            }

            let floor = pool.params.variance_floor;
            pool.variance = floor + (pool.variance - floor) * factor;

            for token in Token::BOTH {
                let t = token.index();
                let mut matured = pool.flow_hat[t].mature(to);
                for lend in Token::BOTH {
                    matured += pool.flow_dot[lend.index()][t].advance(from, to);
                }
                pool.matured[t] += matured;
            }
            pool.flush(to);

            if pool.clock.needs_rebase() {
                pool.rebase();
            }
            pool.entry_deflator = pool.clock.deflator_at(tail_era(to));

            debug!(from, to, deflator = %pool.clock.deflator(), "Clock advanced");
            pool.emit(PoolEvent::Advanced {
                era: to,
                deflator: pool.clock.deflator(),
            });
            Ok(())
        })
    }

    /// Materialize every deadline due at or before `era`
    pub(crate) fn flush(&mut self, era: Era) {
        self.lent.flush(era);
        self.used.flush(era);
        self.owed.flush(era);
        for ledger in self.expire.iter_mut() {
            ledger.expire(era);
        }
    }

    /// Rescale every inflated store so the deflator can restart at one
    fn rebase(&mut self) {
        let factor = self.clock.rebase();
        let inverse = Decimal::ONE / factor;

        self.lent.rescale(factor);
        self.used.rescale(factor);
        self.owed.rescale(factor);
        self.draining.rescale(factor);
        for ledger in self.expire.iter_mut() {
            ledger.rescale(factor);
        }
        for tree in self.lend_fees.iter_mut() {
            tree.rescale(inverse);
        }
        for lp in self.lps.iter_mut() {
            if let Some(drain) = lp.drain.as_mut() {
                drain.drain_deflator *= inverse;
            }
        }
        let grid = self.grid;
        for swapper in self.swappers.iter_mut() {
            swapper.rescale(&grid, factor);
        }

        info!(factor = %factor, "Deflator rebased");
        self.emit(PoolEvent::Rebased { factor });
    }

    // ---- per-bin liquidity ----

    /// Lent liquidity at `bin`, present units
    pub(crate) fn lent_present(&self, bin: Bin) -> Decimal {
        self.lent.now_at(self.clock.era(), bin) * self.clock.deflator()
    }

    /// Liquidity backing the bin: minted plus still-locked draining
    pub(crate) fn capacity(&self, bin: Bin) -> Decimal {
        self.minted.at(bin) + self.draining.at(bin) * self.clock.deflator()
    }

    /// Liquidity that earns spot fees
    pub(crate) fn earning(&self, bin: Bin) -> Decimal {
        (self.minted.at(bin) - self.join_staged.at(bin)).max(Decimal::ZERO)
    }

    /// Liquidity a swap can move through
    pub(crate) fn available(&self, bin: Bin) -> Decimal {
        (self.capacity(bin) - self.lent_present(bin)).max(Decimal::ZERO)
    }

    pub(crate) fn utilization(&self, bin: Bin) -> Decimal {
        let capacity = self.capacity(bin);
        if capacity <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (self.lent_present(bin) / capacity).min(Decimal::ONE)
    }

    pub(crate) fn sqrt_price(&self) -> Decimal {
        self.grid.sqrt_price_at(self.tick_bin, self.bin_frac)
    }

    pub(crate) fn check_bins(&self, start: Bin, stop: Bin) -> Result<()> {
        if start < 0 || start >= stop || stop > self.grid.bins() {
            return Err(EngineError::InvalidRange {
                start,
                stop,
                limit: self.grid.bins(),
            });
        }
        Ok(())
    }

    // ---- queries ----

    pub fn params(&self) -> &PoolParams {
        &self.params
    }

    pub fn grid(&self) -> &PriceGrid {
        &self.grid
    }

    pub fn era(&self) -> Era {
        self.clock.era()
    }

    pub fn deflator(&self) -> Decimal {
        self.clock.deflator()
    }

    /// Deflator projected to the next earn horizon
    pub fn entry_deflator(&self) -> Decimal {
        self.entry_deflator
    }

    pub fn price_info(&self) -> PriceInfo {
        let sqrt_price = self.sqrt_price();
        PriceInfo {
            tick_bin: self.tick_bin,
            bin_frac: self.bin_frac,
            price: sqrt_price * sqrt_price,
            sqrt_price,
            era: self.clock.era(),
            date: self.clock.date(),
            deflator: self.clock.deflator(),
            variance: self.variance,
        }
    }

    /// Liquidity breakdown for every bin in `[start, stop)`
    pub fn bin_liquidity(&self, start: Bin, stop: Bin) -> Result<Vec<BinLiquidity>> {
        self.check_bins(start, stop)?;
        let era = self.clock.era();
        let deflator = self.clock.deflator();
        Ok((start..stop)
            .map(|bin| BinLiquidity {
                bin,
                minted: self.minted.at(bin),
                staged: self.join_staged.at(bin),
                draining: self.draining.at(bin) * deflator,
                lent: self.lent_present(bin),
                used: self.used.now_at(era, bin) * deflator,
                owed: self.owed.now_at(era, bin) * deflator,
                available: self.available(bin),
                utilization: self.utilization(bin),
            })
            .collect())
    }

    pub fn lp_count(&self) -> usize {
        self.lps.len()
    }

    pub fn swapper_count(&self) -> usize {
        self.swappers.len()
    }

    pub fn lp(&self, id: LpId) -> Result<&LpPosition> {
        self.lps.get(id.0).ok_or(EngineError::UnknownLp(id.0))
    }

    pub fn swapper(&self, id: SwapperId) -> Result<&SwapperPosition> {
        self.swappers.get(id.0).ok_or(EngineError::UnknownSwapper(id.0))
    }

    pub fn swapper_creation_enabled(&self) -> bool {
        self.swapper_enabled
    }

    /// Fees that found no earning liquidity
    pub fn protocol_fees(&self) -> [Decimal; TOKENS] {
        self.protocol_fees
    }

    /// Scheduled flows matured so far
    pub fn matured_flows(&self) -> [Decimal; TOKENS] {
        self.matured
    }

    /// Scheduled flows still ahead, per token
    pub fn pending_flows(&self) -> [Decimal; TOKENS] {
        [self.flow_hat[0].pending(), self.flow_hat[1].pending()]
    }

    /// Lent capacity expiring in the future, present units
    pub fn expiring_capacity(&self, token: Token) -> Decimal {
        self.expire[token.index()].now_at(self.clock.era()) * self.clock.deflator()
    }

    /// Decay between now and `era`
    pub(crate) fn decay_until(&self, era: Era) -> Decimal {
        time::decay(era - self.clock.era())
    }
}
