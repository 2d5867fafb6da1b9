//! Debounced edge detection over a raw button pad.

use std::time::{Duration, Instant};

use tracing::trace;

use feeder_traits::{ButtonId, ButtonPad};

/// Minimum spacing between accepted presses of the same button.
pub const DEBOUNCE_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub id: ButtonId,
    pub at: Instant,
}

#[derive(Debug, Clone, Copy, Default)]
struct LineState {
    pressed: bool,
    last_accept: Option<Instant>,
}

/// Polled button source. Emits one event per released-to-pressed edge,
/// suppressing edges that arrive within the debounce window of the last
/// accepted press on the same line.
pub struct ButtonSource<P: ButtonPad> {
    pad: P,
    lines: [LineState; ButtonId::ALL.len()],
}

impl<P: ButtonPad> ButtonSource<P> {
    /// Snapshot the pad so buttons held at startup do not fire.
    pub fn new(mut pad: P) -> Self {
        let mut lines = [LineState::default(); ButtonId::ALL.len()];
        for id in ButtonId::ALL {
            if let Some(pressed) = pad.read(id) {
                lines[id.index()].pressed = pressed;
            }
        }
        Self { pad, lines }
    }

    /// Sample every line once; call `on_press` for each accepted press.
    /// Lines the pad cannot read this cycle keep their previous state.
    pub fn poll(&mut self, now: Instant, mut on_press: impl FnMut(ButtonEvent)) {
        for id in ButtonId::ALL {
            let Some(pressed) = self.pad.read(id) else {
                continue;
            };
            let line = &mut self.lines[id.index()];
            let was = line.pressed;
            line.pressed = pressed;
            if !(pressed && !was) {
                continue;
            }
            let accept = match line.last_accept {
                None => true,
                Some(prev) => now.duration_since(prev) >= DEBOUNCE_INTERVAL,
            };
            if accept {
                line.last_accept = Some(now);
                trace!(button = %id, "press");
                on_press(ButtonEvent { id, at: now });
            }
        }
    }
}
