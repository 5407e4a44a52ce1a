use serde::Serialize;

/// A debt record as supplied by the host. `amount` is the principal the
/// simulation starts from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Debt {
    pub id: u32,
    pub debtor_name: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationParameters {
    pub principal: f64,
    /// Per-tick rate as a percentage, e.g. 5.0 is 5% per tick.
    pub interest_rate_percent: f64,
    /// Upper bound on the amount paid down in one tick.
    pub repayment_rate_per_tick: f64,
}

impl SimulationParameters {
    pub fn new(principal: f64, interest_rate_percent: f64, repayment_rate_per_tick: f64) -> Self {
        Self {
            principal,
            interest_rate_percent,
            repayment_rate_per_tick,
        }
    }

    pub fn for_debt(debt: &Debt) -> Self {
        Self::new(debt.amount, 0.0, 0.0)
    }

    pub fn rate_fraction(&self) -> f64 {
        self.interest_rate_percent / 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSample {
    pub tick_index: u32,
    pub payment_applied: f64,
    pub remaining_balance_after_tick: f64,
}

impl SimulationSample {
    /// Copy of the sample with money values rounded for display.
    pub fn rounded(&self) -> Self {
        Self {
            tick_index: self.tick_index,
            payment_applied: round_cents(self.payment_applied),
            remaining_balance_after_tick: round_cents(self.remaining_balance_after_tick),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationState {
    pub is_running: bool,
    pub tick_index: u32,
    pub remaining_balance: f64,
    pub total_interest_accrued: f64,
    pub history: Vec<SimulationSample>,
}

impl SimulationState {
    pub fn initial(principal: f64) -> Self {
        Self {
            is_running: false,
            tick_index: 0,
            remaining_balance: principal,
            total_interest_accrued: 0.0,
            history: Vec::new(),
        }
    }

    pub fn is_paid_off(&self) -> bool {
        self.remaining_balance <= 0.0
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Projection {
    pub ticks: u32,
    pub paid_off: bool,
    pub final_balance: f64,
    pub total_interest_accrued: f64,
    pub samples: Vec<SimulationSample>,
}

/// Rounds half away from zero to two decimal places. Display only; ties
/// such as 0.125 become 0.13 rather than the half-even 0.12.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
