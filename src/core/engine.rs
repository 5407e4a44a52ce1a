use super::types::{Projection, SimulationParameters, SimulationSample, SimulationState};

/// Advances a run by one tick.
///
/// Payment is applied before interest, so interest for the tick accrues on
/// the post-payment balance and is then capitalized. A state whose balance
/// is already exhausted is returned unchanged.
pub fn step(mut state: SimulationState, params: &SimulationParameters) -> SimulationState {
    if state.is_paid_off() {
        return state;
    }

    let payment = state.remaining_balance.min(params.repayment_rate_per_tick);
    let mut remaining = state.remaining_balance - payment;

    let rate = params.rate_fraction();
    state.total_interest_accrued += remaining * rate;
    remaining *= 1.0 + rate;

    if remaining < 0.0 {
        remaining = 0.0;
    }

    state.remaining_balance = remaining;
    state.tick_index += 1;
    state.history.push(SimulationSample {
        tick_index: state.tick_index,
        payment_applied: payment,
        remaining_balance_after_tick: remaining,
    });
    state
}

/// Runs the step function without a timer until the debt is paid off or
/// `max_ticks` ticks have been applied.
pub fn project(params: &SimulationParameters, max_ticks: u32) -> Projection {
    let mut state = SimulationState::initial(params.principal);
    while !state.is_paid_off() && state.tick_index < max_ticks {
        state = step(state, params);
    }

    Projection {
        ticks: state.tick_index,
        paid_off: state.is_paid_off(),
        final_balance: state.remaining_balance,
        total_interest_accrued: state.total_interest_accrued,
        samples: state.history,
    }
}
