// =============================================================================
// Capital tiers — balance-driven instrument selection and position sizing
// =============================================================================
//
// Balance buckets map to an instrument, a contract cap, a daily loss limit,
// and whether the additive sizing rules apply:
//
//   Tier 1: MES Building   $0 – $3,500    MES  1–3   -$100   scaling on
//   Tier 2: ES Entry       $3.5k – $5k    ES   1     -$400   scaling off
//   Tier 3: ES Growth      $5k – $7.5k    ES   1–2   -$400   scaling on
//   Tier 4: ES Scaling     $7.5k – $10k   ES   1–3   -$500   scaling on
//   Tier 5: ES Full        $10k+          ES   1–3   -$500   scaling on
//
// Additive sizing: 1 base, +1 for 2+ stacked signals, +1 in a trending
// regime, +1 on a 3+ win streak, -1 on a 2+ loss streak, clamped to
// [1, tier cap]. Scaling-disabled tiers always trade one contract.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::Regime;

/// A single tier definition.
#[derive(Debug, Clone, Copy)]
pub struct Tier {
    pub name: &'static str,
    pub min_balance: f64,
    pub max_balance: f64,
    pub instrument: &'static str,
    pub max_contracts: u32,
    pub daily_loss_limit: f64,
    pub scaling_enabled: bool,
}

pub const TIERS: &[Tier] = &[
    Tier {
        name: "Tier 1: MES Building",
        min_balance: 0.0,
        max_balance: 3500.0,
        instrument: "MES",
        max_contracts: 3,
        daily_loss_limit: -100.0,
        scaling_enabled: true,
    },
    Tier {
        name: "Tier 2: ES Entry",
        min_balance: 3500.0,
        max_balance: 5000.0,
        instrument: "ES",
        max_contracts: 1,
        daily_loss_limit: -400.0,
        scaling_enabled: false,
    },
    Tier {
        name: "Tier 3: ES Growth",
        min_balance: 5000.0,
        max_balance: 7500.0,
        instrument: "ES",
        max_contracts: 2,
        daily_loss_limit: -400.0,
        scaling_enabled: true,
    },
    Tier {
        name: "Tier 4: ES Scaling",
        min_balance: 7500.0,
        max_balance: 10_000.0,
        instrument: "ES",
        max_contracts: 3,
        daily_loss_limit: -500.0,
        scaling_enabled: true,
    },
    Tier {
        name: "Tier 5: ES Full",
        min_balance: 10_000.0,
        max_balance: f64::INFINITY,
        instrument: "ES",
        max_contracts: 3,
        daily_loss_limit: -500.0,
        scaling_enabled: true,
    },
];

/// Persisted tier state. Serialized to the state store on every trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierState {
    pub balance: f64,
    pub tier_index: usize,
    pub instrument: String,
    pub max_contracts: u32,
    pub daily_loss_limit: f64,
    pub scaling_enabled: bool,
    pub session_start_balance: f64,
    pub session_pnl: f64,
    pub win_streak: u32,
    pub loss_streak: u32,
}

impl TierState {
    fn from_balance(balance: f64) -> Self {
        let (index, tier) = tier_for_balance(balance);
        Self {
            balance,
            tier_index: index,
            instrument: tier.instrument.to_string(),
            max_contracts: tier.max_contracts,
            daily_loss_limit: tier.daily_loss_limit,
            scaling_enabled: tier.scaling_enabled,
            session_start_balance: balance,
            session_pnl: 0.0,
            win_streak: 0,
            loss_streak: 0,
        }
    }
}

fn tier_for_balance(balance: f64) -> (usize, &'static Tier) {
    TIERS
        .iter()
        .enumerate()
        .find(|(_, t)| balance >= t.min_balance && balance < t.max_balance)
        .unwrap_or((0, &TIERS[0]))
}

/// A tier transition, announced to the observer.
#[derive(Debug, Clone, Serialize)]
pub struct TierChange {
    pub from_tier: usize,
    pub to_tier: usize,
    pub from_instrument: String,
    pub to_instrument: String,
    pub balance: f64,
}

type TierObserver = Box<dyn FnMut(&TierChange) + Send>;

pub struct TierManager {
    state: TierState,
    observers: Vec<TierObserver>,
}

impl TierManager {
    /// Start fresh from a configured balance.
    pub fn new(starting_balance: f64) -> Self {
        let state = TierState::from_balance(starting_balance);
        info!(
            balance = state.balance,
            tier = TIERS[state.tier_index].name,
            instrument = %state.instrument,
            "tier manager initialized"
        );
        Self {
            state,
            observers: Vec::new(),
        }
    }

    /// Resume from a persisted snapshot.
    pub fn from_state(state: TierState) -> Self {
        info!(
            balance = state.balance,
            tier = TIERS[state.tier_index].name,
            "tier state restored"
        );
        Self {
            state,
            observers: Vec::new(),
        }
    }

    pub fn on_tier_change(&mut self, cb: impl FnMut(&TierChange) + Send + 'static) {
        self.observers.push(Box::new(cb));
    }

    pub fn state(&self) -> &TierState {
        &self.state
    }

    pub fn tier(&self) -> &'static Tier {
        &TIERS[self.state.tier_index]
    }

    /// Begin a session: rebase session bookkeeping and re-evaluate the tier
    /// in case the balance moved between sessions.
    pub fn start_session(&mut self) -> &TierState {
        self.state.session_start_balance = self.state.balance;
        self.state.session_pnl = 0.0;
        self.update_tier();
        &self.state
    }

    /// Record a completed trade. Updates balance, session P&L, win/loss
    /// streaks (a scratch trade touches neither), and the tier.
    pub fn record_trade(&mut self, pnl: f64) {
        self.state.balance += pnl;
        self.state.session_pnl += pnl;

        if pnl > 0.0 {
            self.state.win_streak += 1;
            self.state.loss_streak = 0;
        } else if pnl < 0.0 {
            self.state.loss_streak += 1;
            self.state.win_streak = 0;
        }

        self.update_tier();
    }

    /// Additive position size for the current tier.
    pub fn position_size(&self, regime: Regime, stacked_count: u32) -> u32 {
        if !self.state.scaling_enabled {
            return 1;
        }

        let mut size: i64 = 1;
        if stacked_count >= 2 {
            size += 1;
        }
        if regime.is_trending() {
            size += 1;
        }
        if self.state.win_streak >= 3 {
            size += 1;
        } else if self.state.loss_streak >= 2 {
            size -= 1;
        }

        size.clamp(1, self.state.max_contracts as i64) as u32
    }

    /// True when the session P&L has breached the tier's loss limit.
    pub fn should_halt(&self, session_pnl: f64) -> bool {
        session_pnl <= self.state.daily_loss_limit
    }

    /// Overwrite the balance from an external source (broker account
    /// query); re-evaluates the tier.
    pub fn set_balance(&mut self, balance: f64) {
        let old = self.state.balance;
        self.state.balance = balance;
        if (old - balance).abs() > 0.01 {
            info!(old_balance = old, new_balance = balance, "balance updated");
            self.update_tier();
        }
    }

    fn update_tier(&mut self) -> bool {
        let old_index = self.state.tier_index;
        let old_instrument = self.state.instrument.clone();

        let (index, tier) = tier_for_balance(self.state.balance);
        self.state.tier_index = index;
        self.state.instrument = tier.instrument.to_string();
        self.state.max_contracts = tier.max_contracts;
        self.state.daily_loss_limit = tier.daily_loss_limit;
        self.state.scaling_enabled = tier.scaling_enabled;

        if index != old_index {
            let change = TierChange {
                from_tier: old_index,
                to_tier: index,
                from_instrument: old_instrument,
                to_instrument: tier.instrument.to_string(),
                balance: self.state.balance,
            };
            info!(
                from = TIERS[old_index].name,
                to = tier.name,
                balance = self.state.balance,
                "tier change"
            );
            for observer in &mut self.observers {
                observer(&change);
            }
            return true;
        }
        false
    }
}
