//! Multi-phase motion sequencer.
//!
//! Each phase issues its motion command exactly once on entry and then
//! polls the link for the completion state that motion produces. The
//! engine drives `tick` from its main loop; nothing here blocks.

use std::fmt;

use tracing::{info, warn};

use crate::error::FeederError;
use crate::geometry::Geometry;
use crate::link::MotionLink;
use crate::protocol::{Axis, ControllerState};

/// Where the machine is inside an operation. `Idle` and `LoadingFirst` are
/// the two rest states; everything else has a motion in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispensePhase {
    Idle,
    // Dispense arc.
    XHoming,
    XToStart,
    TabLifting,
    LidPeeling,
    XRehoming,
    // Eject arc, also the tail of a dispense.
    ZLiftEject,
    XEject,
    XRehomingFinal,
    ZNextCan,
    // Startup arc.
    InitialZHoming,
    InitialZOffsetting,
    /// Magazine empty at startup: hold here until a can is loaded.
    LoadingFirst,
    // Can loading, operator-gated between the two steps.
    CanLoadStep1,
    CanLoadStep2,
}

impl DispensePhase {
    const COUNT: usize = 15;

    fn index(self) -> usize {
        match self {
            DispensePhase::Idle => 0,
            DispensePhase::XHoming => 1,
            DispensePhase::XToStart => 2,
            DispensePhase::TabLifting => 3,
            DispensePhase::LidPeeling => 4,
            DispensePhase::XRehoming => 5,
            DispensePhase::ZLiftEject => 6,
            DispensePhase::XEject => 7,
            DispensePhase::XRehomingFinal => 8,
            DispensePhase::ZNextCan => 9,
            DispensePhase::InitialZHoming => 10,
            DispensePhase::InitialZOffsetting => 11,
            DispensePhase::LoadingFirst => 12,
            DispensePhase::CanLoadStep1 => 13,
            DispensePhase::CanLoadStep2 => 14,
        }
    }
}

impl fmt::Display for DispensePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DispensePhase::Idle => "idle",
            DispensePhase::XHoming => "x_homing",
            DispensePhase::XToStart => "x_to_start",
            DispensePhase::TabLifting => "tab_lifting",
            DispensePhase::LidPeeling => "lid_peeling",
            DispensePhase::XRehoming => "x_rehoming",
            DispensePhase::ZLiftEject => "z_lift_eject",
            DispensePhase::XEject => "x_eject",
            DispensePhase::XRehomingFinal => "x_rehoming_final",
            DispensePhase::ZNextCan => "z_next_can",
            DispensePhase::InitialZHoming => "initial_z_homing",
            DispensePhase::InitialZOffsetting => "initial_z_offsetting",
            DispensePhase::LoadingFirst => "loading_first",
            DispensePhase::CanLoadStep1 => "can_load_step_1",
            DispensePhase::CanLoadStep2 => "can_load_step_2",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for DispensePhase {
    type Err = crate::protocol::UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let p = match s {
            "idle" => DispensePhase::Idle,
            "x_homing" => DispensePhase::XHoming,
            "x_to_start" => DispensePhase::XToStart,
            "tab_lifting" => DispensePhase::TabLifting,
            "lid_peeling" => DispensePhase::LidPeeling,
            "x_rehoming" => DispensePhase::XRehoming,
            "z_lift_eject" => DispensePhase::ZLiftEject,
            "x_eject" => DispensePhase::XEject,
            "x_rehoming_final" => DispensePhase::XRehomingFinal,
            "z_next_can" => DispensePhase::ZNextCan,
            "initial_z_homing" => DispensePhase::InitialZHoming,
            "initial_z_offsetting" => DispensePhase::InitialZOffsetting,
            "loading_first" => DispensePhase::LoadingFirst,
            "can_load_step_1" => DispensePhase::CanLoadStep1,
            "can_load_step_2" => DispensePhase::CanLoadStep2,
            _ => return Err(crate::protocol::UnknownName),
        };
        Ok(p)
    }
}

/// What one `tick` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Unchanged,
    /// The current phase issued its motion command.
    Started(DispensePhase),
    Advanced {
        from: DispensePhase,
        to: DispensePhase,
    },
}

pub struct DispenseSequencer {
    phase: DispensePhase,
    started: [bool; DispensePhase::COUNT],
    cans_loaded: u32,
    max_cans: u32,
    geometry: Geometry,
}

impl DispenseSequencer {
    pub fn new(geometry: Geometry, max_cans: u32) -> Self {
        Self {
            phase: DispensePhase::Idle,
            started: [false; DispensePhase::COUNT],
            cans_loaded: 0,
            max_cans,
            geometry,
        }
    }

    pub fn phase(&self) -> DispensePhase {
        self.phase
    }

    pub fn cans_loaded(&self) -> u32 {
        self.cans_loaded
    }

    pub fn set_cans_loaded(&mut self, cans: u32) {
        self.cans_loaded = cans.min(self.max_cans);
    }

    /// Recalibrate the bottom-of-stack eject position. The open offset
    /// derives from it, so callers follow up with [`Self::apply_offset`].
    pub fn set_eject_last(&mut self, eject_last: f64) {
        self.geometry.eject_last = eject_last;
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.phase, DispensePhase::Idle | DispensePhase::LoadingFirst)
    }

    fn reset_runners(&mut self) {
        self.started = [false; DispensePhase::COUNT];
    }

    fn enter(&mut self, phase: DispensePhase) {
        self.phase = phase;
        self.started[phase.index()] = false;
    }

    /// Start the full open-and-eject sequence. The engine checks the can
    /// count and link state before calling this.
    pub fn begin_dispense(&mut self) {
        info!(cans = self.cans_loaded, "dispense sequence starting");
        self.reset_runners();
        self.enter(DispensePhase::XHoming);
    }

    /// Eject the current can without opening it.
    pub fn begin_eject(&mut self) {
        info!(cans = self.cans_loaded, "eject sequence starting");
        self.reset_runners();
        self.enter(DispensePhase::ZLiftEject);
    }

    /// Home Z and drive the stack to its opening offset. Run once after
    /// connect, before any feed can happen.
    pub fn begin_startup(&mut self) {
        self.reset_runners();
        self.enter(DispensePhase::InitialZHoming);
    }

    /// Halt everything and return to rest. The link's command state is
    /// forced back to idle because M112 is never acknowledged.
    pub fn abort(&mut self, link: &MotionLink) {
        warn!(phase = %self.phase, "sequence aborted");
        link.emergency_stop();
        link.set_state(ControllerState::Idle);
        self.reset_runners();
        self.phase = DispensePhase::Idle;
    }

    /// Lower the stack one slot so the operator can drop a can in.
    pub fn can_load_begin(&mut self, link: &MotionLink) -> Result<(), FeederError> {
        if !self.is_idle() {
            return Err(FeederError::Busy("sequence in progress"));
        }
        if link.state() != ControllerState::Idle {
            return Err(FeederError::Busy("controller not idle"));
        }
        if self.cans_loaded >= self.max_cans {
            return Err(FeederError::MagazineFull);
        }
        let target = link.position().z - self.geometry.next_can;
        link.move_linear(Axis::Z, target, self.geometry.feed_z);
        self.reset_runners();
        self.enter(DispensePhase::CanLoadStep1);
        // Step 1 is already in flight; only the operator ends it.
        self.started[DispensePhase::CanLoadStep1.index()] = true;
        Ok(())
    }

    /// Operator confirms the can is seated: count it and restore the
    /// opening offset.
    pub fn can_load_confirm(&mut self, link: &MotionLink) -> Result<(), FeederError> {
        if self.phase != DispensePhase::CanLoadStep1 {
            return Err(FeederError::State(format!(
                "cannot confirm load from {}",
                self.phase
            )));
        }
        if link.state() != ControllerState::Idle {
            return Err(FeederError::Busy("controller not idle"));
        }
        self.cans_loaded += 1;
        info!(cans = self.cans_loaded, "can loaded");
        self.enter(DispensePhase::CanLoadStep2);
        Ok(())
    }

    /// Re-derive the opening offset from the current can count and, when
    /// the machine is at rest, drive Z there. Used after the count is
    /// edited by hand.
    pub fn apply_offset(&mut self, link: &MotionLink) {
        if self.is_idle() && link.state() == ControllerState::Idle {
            let target = self.geometry.can_open_offset(self.cans_loaded);
            link.move_linear(Axis::Z, target, self.geometry.feed_z);
        }
    }

    /// Advance the active phase: issue its command if it has not started,
    /// otherwise check whether its motion has finished and move on. At most
    /// one transition per call.
    pub fn tick(&mut self, link: &MotionLink) -> TickOutcome {
        use DispensePhase::*;

        if self.is_idle() {
            return TickOutcome::Unchanged;
        }

        let phase = self.phase;
        if !self.started[phase.index()] {
            self.start_phase(phase, link);
            self.started[phase.index()] = true;
            return TickOutcome::Started(phase);
        }

        let state = link.state();
        let done = match phase {
            XHoming | XRehoming | XRehomingFinal => state == ControllerState::XHomed,
            XToStart | TabLifting | LidPeeling | XEject => {
                state == ControllerState::MoveCompleted
            }
            ZLiftEject | ZNextCan | InitialZHoming | InitialZOffsetting | CanLoadStep2 => {
                state == ControllerState::Idle
            }
            // Ended only by the operator through can_load_confirm.
            CanLoadStep1 => false,
            Idle | LoadingFirst => false,
        };
        if !done {
            return TickOutcome::Unchanged;
        }

        let next = match phase {
            XHoming => XToStart,
            XToStart => TabLifting,
            TabLifting => LidPeeling,
            LidPeeling => XRehoming,
            XRehoming => ZLiftEject,
            ZLiftEject => XEject,
            XEject => XRehomingFinal,
            XRehomingFinal => ZNextCan,
            ZNextCan => {
                self.cans_loaded = self.cans_loaded.saturating_sub(1);
                info!(cans = self.cans_loaded, "can dispensed");
                Idle
            }
            InitialZHoming => InitialZOffsetting,
            InitialZOffsetting => {
                if self.cans_loaded == 0 {
                    LoadingFirst
                } else {
                    Idle
                }
            }
            CanLoadStep2 => Idle,
            Idle | LoadingFirst | CanLoadStep1 => return TickOutcome::Unchanged,
        };

        // X-homed is a completion marker, not a rest state; clear it so the
        // next phase's predicate starts from a clean slate.
        if state == ControllerState::XHomed {
            link.set_state(ControllerState::Idle);
        }

        self.enter(next);
        TickOutcome::Advanced { from: phase, to: next }
    }

    fn start_phase(&mut self, phase: DispensePhase, link: &MotionLink) {
        use DispensePhase::*;
        let g = &self.geometry;
        match phase {
            XHoming | XRehoming | XRehomingFinal => link.home_axis(Axis::X),
            XToStart => link.move_linear(Axis::X, g.x_start, g.feed_fast),
            TabLifting => link.move_linear(Axis::X, g.x_tab_lift, g.feed_slow),
            LidPeeling => link.move_linear(Axis::X, g.x_lid_peel, g.feed_slow),
            ZLiftEject => {
                let target = g.can_open_offset(self.cans_loaded) + g.can_to_eject;
                link.move_linear(Axis::Z, target, g.feed_z);
            }
            XEject => link.move_linear(Axis::X, g.x_eject, g.feed_fast),
            ZNextCan => {
                let target = g.can_open_offset(self.cans_loaded.saturating_sub(1));
                link.move_linear(Axis::Z, target, g.feed_z);
            }
            InitialZHoming => link.home_axis(Axis::Z),
            InitialZOffsetting => {
                let target = g.can_open_offset(self.cans_loaded);
                link.move_linear(Axis::Z, target, g.feed_z);
            }
            CanLoadStep2 => {
                let target = g.can_open_offset(self.cans_loaded);
                link.move_linear(Axis::Z, target, g.feed_z);
            }
            Idle | LoadingFirst | CanLoadStep1 => {}
        }
    }
}
