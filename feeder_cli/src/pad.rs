//! Button-to-action dispatch.
//!
//! Each context owns a complete mapping for all five buttons; switching
//! context swaps the whole table at once so a button can never carry a
//! stale meaning from the previous context.

use feeder_traits::ButtonId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadAction {
    Feed,
    Eject,
    Abort,
    CanLoadBegin,
    CanLoadConfirm,
    HomeX,
    HomeZ,
    RequestPosition,
    NextContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadContext {
    /// Day-to-day operation: feeding and can loading.
    Run,
    /// Homing and diagnostics.
    Maintain,
}

impl PadContext {
    pub fn action(self, button: ButtonId) -> PadAction {
        match self {
            PadContext::Run => match button {
                ButtonId::Ok => PadAction::Feed,
                ButtonId::Up => PadAction::CanLoadBegin,
                ButtonId::Down => PadAction::CanLoadConfirm,
                ButtonId::Left => PadAction::Abort,
                ButtonId::Right => PadAction::NextContext,
            },
            PadContext::Maintain => match button {
                ButtonId::Ok => PadAction::Eject,
                ButtonId::Up => PadAction::HomeX,
                ButtonId::Down => PadAction::HomeZ,
                ButtonId::Left => PadAction::RequestPosition,
                ButtonId::Right => PadAction::NextContext,
            },
        }
    }

    pub fn next(self) -> Self {
        match self {
            PadContext::Run => PadContext::Maintain,
            PadContext::Maintain => PadContext::Run,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn every_button_maps_in_every_context() {
        for ctx in [PadContext::Run, PadContext::Maintain] {
            for id in ButtonId::ALL {
                // Exhaustive match guarantees this; the loop documents it.
                let _ = ctx.action(id);
            }
        }
    }

    #[rstest]
    fn context_cycle_returns_home() {
        assert_eq!(PadContext::Run.next().next(), PadContext::Run);
    }
}
