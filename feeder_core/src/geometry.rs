//! Machine geometry and the can-stack offset arithmetic.
//!
//! X positions drive the opener head, Z positions drive the can magazine
//! elevator. All distances are millimetres, feeds are mm/min.

/// Fixed positions and feeds for one machine build. Values come from the
/// `[geometry]` config table; defaults match the reference machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    /// Z at which the *lowest* can in a full stack is ejected.
    pub eject_last: f64,
    /// Z travel between the open position and the eject position of a can.
    pub can_to_eject: f64,
    /// Z travel to bring the next can into position after an eject.
    pub next_can: f64,
    /// Height of one can including its carrier spacing.
    pub cartridge_height: f64,
    /// X park position where the cutter engages the lid tab.
    pub x_start: f64,
    /// X travel that lifts the lid tab.
    pub x_tab_lift: f64,
    /// X position that peels the lid back.
    pub x_lid_peel: f64,
    /// X position for flinging the opened can off the holder.
    pub x_eject: f64,
    pub feed_fast: f64,
    pub feed_slow: f64,
    pub feed_z: f64,
}

impl Geometry {
    pub fn from_config(g: &feeder_config::Geometry) -> Self {
        Self {
            eject_last: g.eject_last,
            can_to_eject: g.can_to_eject,
            next_can: g.next_can,
            cartridge_height: g.cartridge_height,
            x_start: g.x_start,
            x_tab_lift: g.x_tab_lift,
            x_lid_peel: g.x_lid_peel,
            x_eject: g.x_eject,
            feed_fast: g.feed_fast,
            feed_slow: g.feed_slow,
            feed_z: g.feed_z,
        }
    }

    /// Z at which the lowest can sits in the opening position.
    pub fn open_last(&self) -> f64 {
        self.eject_last - self.can_to_eject
    }

    /// Z offset that puts the topmost of `cans` loaded cans into the
    /// opening position. With a full magazine this is near the bottom of
    /// travel; each consumed can raises the stack by one cartridge height.
    pub fn can_open_offset(&self, cans: u32) -> f64 {
        (self.open_last() + self.cartridge_height) - f64::from(cans) * self.cartridge_height
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self::from_config(&feeder_config::Geometry::default())
    }
}
