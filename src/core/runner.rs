use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info};

use super::engine::step;
use super::error::SimulationError;
use super::types::{Debt, SimulationParameters, SimulationState};

pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(1);
const MIN_TICK_PERIOD: Duration = Duration::from_millis(1);

struct Shared {
    state: watch::Sender<SimulationState>,
    /// Bumped on every stop so a tick scheduled for an earlier run declines
    /// to touch the state.
    generation: AtomicU64,
}

/// A live repayment simulation bound to one debt.
///
/// Ticks run on a Tokio task; each one replaces the state under the watch
/// channel lock, so `snapshot` and subscribers only ever see committed
/// ticks. Dropping the simulation cancels any active run.
pub struct Simulation {
    debt: Debt,
    params: SimulationParameters,
    tick_period: Duration,
    shared: Arc<Shared>,
    task: Option<JoinHandle<()>>,
    runtime: Handle,
}

impl Simulation {
    /// Binds a new simulation to `debt` using the current Tokio runtime.
    pub fn new(debt: Debt, tick_period: Duration) -> Result<Self, SimulationError> {
        let runtime = Handle::try_current()?;
        Ok(Self::with_handle(debt, tick_period, runtime))
    }

    pub fn with_handle(debt: Debt, tick_period: Duration, runtime: Handle) -> Self {
        let params = SimulationParameters::for_debt(&debt);
        let (state, _) = watch::channel(SimulationState::initial(params.principal));
        Self {
            debt,
            params,
            tick_period: tick_period.max(MIN_TICK_PERIOD),
            shared: Arc::new(Shared {
                state,
                generation: AtomicU64::new(0),
            }),
            task: None,
            runtime,
        }
    }

    pub fn debt(&self) -> &Debt {
        &self.debt
    }

    pub fn parameters(&self) -> SimulationParameters {
        self.params
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.borrow().is_running
    }

    /// Latest committed progress.
    pub fn snapshot(&self) -> SimulationState {
        self.shared.state.borrow().clone()
    }

    /// Receiver notified after every tick and every state-changing call.
    pub fn subscribe(&self) -> watch::Receiver<SimulationState> {
        self.shared.state.subscribe()
    }

    /// Resets progress and stores new rates. Parameters never change during
    /// a run.
    pub fn configure(&mut self, interest_rate_percent: f64, repayment_rate_per_tick: f64) {
        self.reset();
        self.params.interest_rate_percent = interest_rate_percent;
        self.params.repayment_rate_per_tick = repayment_rate_per_tick;
        debug!(
            debt_id = self.debt.id,
            interest_rate_percent, repayment_rate_per_tick, "simulation configured"
        );
    }

    /// Starts a fresh run. Ignored while a run is already active.
    pub fn start(&mut self) {
        if self.is_running() {
            debug!(debt_id = self.debt.id, "start ignored, run already active");
            return;
        }

        self.reset();
        if self.params.principal <= 0.0 {
            debug!(debt_id = self.debt.id, "nothing owed, run ends immediately");
            return;
        }

        let generation = self.shared.generation.load(Ordering::SeqCst);
        self.shared.state.send_modify(|state| state.is_running = true);
        info!(
            debt_id = self.debt.id,
            principal = self.params.principal,
            interest_rate_percent = self.params.interest_rate_percent,
            repayment_rate_per_tick = self.params.repayment_rate_per_tick,
            "simulation started"
        );

        self.task = Some(self.runtime.spawn(run_ticks(
            Arc::clone(&self.shared),
            self.params,
            self.tick_period,
            generation,
            self.debt.id,
        )));
    }

    /// Cancels the active run, keeping progress as of the last completed
    /// tick. Calling it while idle changes nothing.
    pub fn stop(&mut self) {
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
        let stopped = self.shared.state.send_if_modified(|state| {
            let was_running = state.is_running;
            state.is_running = false;
            was_running
        });
        if stopped {
            info!(debt_id = self.debt.id, "simulation stopped");
        }
    }

    pub fn reset(&mut self) {
        self.stop();
        self.shared
            .state
            .send_replace(SimulationState::initial(self.params.principal));
    }

    /// Renames the bound debtor. Progress and rates are left alone.
    pub fn rename_debtor(&mut self, debtor_name: String) {
        self.debt.debtor_name = debtor_name;
    }

    /// Binds a different debt. Rates go back to zero along with progress.
    pub fn rebind(&mut self, debt: Debt) {
        self.stop();
        self.params = SimulationParameters::for_debt(&debt);
        self.debt = debt;
        self.reset();
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_ticks(
    shared: Arc<Shared>,
    params: SimulationParameters,
    period: Duration,
    generation: u64,
    debt_id: u32,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let mut finished = false;
        shared.state.send_if_modified(|state| {
            if shared.generation.load(Ordering::SeqCst) != generation || !state.is_running {
                finished = true;
                return false;
            }

            *state = step(std::mem::take(state), &params);
            debug!(
                debt_id,
                tick = state.tick_index,
                remaining = state.remaining_balance,
                "tick"
            );
            if state.is_paid_off() {
                state.is_running = false;
                finished = true;
                info!(debt_id, ticks = state.tick_index, "debt paid off");
            }
            true
        });

        if finished {
            break;
        }
    }
}
