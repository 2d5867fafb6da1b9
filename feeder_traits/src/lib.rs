//! Hardware seam traits for the feeder stack.
//!
//! Everything above this crate talks to the physical machine through these
//! traits, so the core can be driven by mocks in tests and by
//! `feeder_hardware` on the device.

/// Writing half of the newline-delimited motion-controller link.
///
/// Implementations append the line terminator themselves; callers pass the
/// bare command (e.g. `"G28 X"`).
pub trait LineWriter: Send {
    fn write_line(&mut self, line: &str)
    -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Reading half of the motion-controller link.
///
/// `read_chunk` blocks up to the transport's configured timeout and returns
/// the number of bytes placed in `buf`. A timeout with no data is `Ok(0)`,
/// not an error; chunk boundaries carry no meaning (lines may span chunks).
pub trait LineReader: Send {
    fn read_chunk(
        &mut self,
        buf: &mut [u8],
    ) -> Result<usize, Box<dyn std::error::Error + Send + Sync>>;
}

/// Logical buttons exposed by the front panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonId {
    Up,
    Down,
    Left,
    Right,
    Ok,
}

impl ButtonId {
    pub const ALL: [ButtonId; 5] = [
        ButtonId::Up,
        ButtonId::Down,
        ButtonId::Left,
        ButtonId::Right,
        ButtonId::Ok,
    ];

    /// Stable index into per-button tables.
    pub fn index(self) -> usize {
        match self {
            ButtonId::Up => 0,
            ButtonId::Down => 1,
            ButtonId::Left => 2,
            ButtonId::Right => 3,
            ButtonId::Ok => 4,
        }
    }
}

impl std::fmt::Display for ButtonId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ButtonId::Up => "up",
            ButtonId::Down => "down",
            ButtonId::Left => "left",
            ButtonId::Right => "right",
            ButtonId::Ok => "ok",
        };
        f.write_str(s)
    }
}

/// Raw digital input sampling for the button panel.
///
/// Buttons are active-low with pull-ups; implementations translate the
/// electrical level so `Some(true)` means logically pressed. `None` marks an
/// input that is not available this cycle (failed init or a transient read
/// error) and must be skipped rather than treated as released.
pub trait ButtonPad {
    fn read(&mut self, id: ButtonId) -> Option<bool>;
}

impl ButtonPad for Box<dyn ButtonPad> {
    fn read(&mut self, id: ButtonId) -> Option<bool> {
        (**self).read(id)
    }
}
