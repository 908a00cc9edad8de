//! Scenario replay
//!
//! A scenario is a list of steps run in order against one pool. `act` steps
//! run a batch of actions for a caller and settle the netted deltas through
//! an in-memory ledger.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tidal_amm::{AccountId, Action, MemoryLedger, Payment, Pool, PoolEvent, Settlement, Token, TokenLedger};
use tidal_config::PoolSettings;
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Scenario {
    /// Ledger account holding the pool's tokens
    #[serde(default = "default_pool_account")]
    pub pool_account: AccountId,
    /// Overrides the configured pool settings when present
    #[serde(default)]
    pub pool: Option<PoolSettings>,
    pub steps: Vec<Step>,
}

fn default_pool_account() -> AccountId {
    AccountId(0)
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    /// Credit an account out of thin air
    Fund {
        account: AccountId,
        token: Token,
        amount: i128,
    },
    EnableSwappers,
    Act {
        caller: AccountId,
        actions: Vec<Action>,
    },
    Advance {
        eras: i64,
    },
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("Failed to parse scenario {}", path.display()))
    }
}

/// Totals reported after a replay
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub steps: usize,
    pub rejected: usize,
    pub events: usize,
}

pub struct Runner {
    pool: Pool,
    ledger: MemoryLedger,
    settlement: Settlement,
    fail_fast: bool,
}

impl Runner {
    pub fn new(settings: &PoolSettings, pool_account: AccountId, fail_fast: bool) -> Result<Self> {
        settings.validate().context("Invalid pool settings")?;
        let pool = Pool::new(settings).context("Failed to create pool")?;
        let settlement = pool.settlement(pool_account);
        Ok(Self {
            pool,
            ledger: MemoryLedger::new(),
            settlement,
            fail_fast,
        })
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn ledger(&self) -> &MemoryLedger {
        &self.ledger
    }

    /// Run every step, handing each emitted event to `sink`
    pub fn run(&mut self, steps: &[Step], mut sink: impl FnMut(&PoolEvent) -> Result<()>) -> Result<Summary> {
        let mut summary = Summary::default();
        for (index, step) in steps.iter().enumerate() {
            summary.steps += 1;
            if let Err(err) = self.step(step) {
                summary.rejected += 1;
                if self.fail_fast {
                    return Err(err).with_context(|| format!("Step {index} failed"));
                }
                warn!(step = index, error = %err, "Step rejected");
            }
            for event in self.pool.take_events() {
                sink(&event)?;
                summary.events += 1;
            }
        }
        info!(steps = summary.steps, rejected = summary.rejected, events = summary.events, "Scenario complete");
        Ok(summary)
    }

    fn step(&mut self, step: &Step) -> Result<()> {
        match step {
            Step::Fund { account, token, amount } => {
                if *amount < 0 {
                    bail!("Cannot fund a negative amount ({amount})");
                }
                self.ledger.mint(*account, *token, *amount);
            }
            Step::EnableSwappers => self.pool.enable_swapper_creation()?,
            Step::Act { caller, actions } => {
                let (outcome, amounts) = self.pool.settled(
                    &self.settlement,
                    &mut self.ledger,
                    *caller,
                    Payment::Direct,
                    |pool| {
                        let outcome = pool.batch(*caller, actions)?;
                        let deltas = outcome.deltas;
                        Ok((outcome, deltas))
                    },
                )?;
                info!(
                    caller = %caller,
                    actions = outcome.outcomes.len(),
                    token0 = amounts[0],
                    token1 = amounts[1],
                    "Settled"
                );
            }
            Step::Advance { eras } => self.pool.advance(*eras)?,
        }
        Ok(())
    }

    /// Ledger balances of `account`
    pub fn balances(&self, account: AccountId) -> [i128; 2] {
        Token::BOTH.map(|token| self.ledger.balance(account, token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"{
        "pool_account": 100,
        "steps": [
            {"step": "fund", "account": 1, "token": "Zero", "amount": 1000000000000000000},
            {"step": "fund", "account": 1, "token": "One", "amount": 1000000000000000000},
            {"step": "act", "caller": 1, "actions": [
                {"action": "pour", "start_tub": 2040, "stop_tub": 2056, "liquidity": "1"}
            ]},
            {"step": "enable_swappers"},
            {"step": "act", "caller": 2, "actions": [
                {"action": "pour", "start_tub": 2040, "stop_tub": 2056, "liquidity": "1"}
            ]},
            {"step": "advance", "eras": 1024}
        ]
    }"#;

    #[test]
    fn test_replay_counts_and_settles() {
        let scenario: Scenario = serde_json::from_str(SCENARIO).unwrap();
        let mut runner = Runner::new(&PoolSettings::default(), scenario.pool_account, false).unwrap();
        let mut names = Vec::new();
        let summary = runner
            .run(&scenario.steps, |event| {
                names.push(event.name());
                Ok(())
            })
            .unwrap();

        assert_eq!(summary.steps, 6);
        // account 2 holds nothing
        assert_eq!(summary.rejected, 1);
        assert_eq!(names, vec!["poured", "swapper_creation_enabled", "advanced"]);
        let pool_balances = runner.balances(AccountId(100));
        assert!(pool_balances[0] > 0 && pool_balances[1] > 0);
        assert_eq!(runner.pool().lp_count(), 1);
    }

    #[test]
    fn test_fail_fast_stops_at_first_rejection() {
        let scenario: Scenario = serde_json::from_str(SCENARIO).unwrap();
        let mut runner = Runner::new(&PoolSettings::default(), scenario.pool_account, true).unwrap();
        let err = runner.run(&scenario.steps, |_| Ok(())).unwrap_err();
        assert!(err.to_string().contains("Step 4"));
    }

    #[test]
    fn test_load_reports_path_on_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{\"steps\": [").unwrap();
        let err = Scenario::load(&path).unwrap_err();
        assert!(err.to_string().contains("broken.json"));

        let path = dir.path().join("ok.json");
        std::fs::write(&path, SCENARIO).unwrap();
        let scenario = Scenario::load(&path).unwrap();
        assert_eq!(scenario.pool_account, AccountId(100));
        assert!(scenario.pool.is_none());
    }
}
