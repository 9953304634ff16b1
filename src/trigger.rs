//! Triggers: signal edges that redirect a running program.

use embassy_time::Instant;

use crate::edge::{Edge, EdgeConfig, EdgeDetector};
use crate::signal::SignalSource;

/// Maximum number of simultaneously armed triggers.
pub const MAX_TRIGGER_COUNT: usize = 4;

/// Which signal edges fire a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeMask {
    Rising,
    Falling,
    Both,
}

impl EdgeMask {
    fn matches(self, edge: Edge) -> bool {
        match self {
            Self::Rising => edge == Edge::Rising,
            Self::Falling => edge == Edge::Falling,
            Self::Both => true,
        }
    }
}

/// What happens when a trigger fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerAction {
    /// Resume a suspended bytecode store
    Resume,
    /// Jump to an absolute bytecode address (clearing the loop stack)
    JumpTo(usize),
}

/// A single trigger slot.
#[derive(Debug, Clone)]
struct Trigger {
    channel: u8,
    mask: EdgeMask,
    one_shot: bool,
    action: TriggerAction,
    detector: EdgeDetector,
    armed: bool,
}

impl Trigger {
    const fn disarmed() -> Self {
        Self {
            channel: 0,
            mask: EdgeMask::Both,
            one_shot: false,
            action: TriggerAction::Resume,
            detector: EdgeDetector::new(EdgeConfig {
                mid_low: 64,
                mid_high: 192,
                debounce: embassy_time::Duration::from_millis(0),
            }),
            armed: false,
        }
    }
}

/// Fixed table of trigger slots.
///
/// At most one armed slot watches any given channel; `slot_for_channel`
/// enforces this by reusing the existing slot on re-binding.
pub struct TriggerTable {
    slots: [Trigger; MAX_TRIGGER_COUNT],
    edges: EdgeConfig,
}

impl TriggerTable {
    pub fn new(edges: EdgeConfig) -> Self {
        Self {
            slots: core::array::from_fn(|_| Trigger::disarmed()),
            edges,
        }
    }

    /// Arm a trigger on `channel`.
    ///
    /// Reuses the slot already watching the channel if there is one, else
    /// takes the first free slot. Returns `false` when the table is full.
    pub fn arm(&mut self, channel: u8, mask: EdgeMask, one_shot: bool, action: TriggerAction) -> bool {
        let edges = self.edges;
        let Some(slot) = self.slot_for_channel(channel) else {
            return false;
        };
        slot.channel = channel;
        slot.mask = mask;
        slot.one_shot = one_shot;
        slot.action = action;
        slot.detector = EdgeDetector::new(edges);
        slot.armed = true;
        true
    }

    /// Disarm the trigger watching `channel`, if any.
    pub fn disarm(&mut self, channel: u8) {
        for slot in &mut self.slots {
            if slot.armed && slot.channel == channel {
                slot.armed = false;
            }
        }
    }

    /// Number of armed triggers.
    pub fn armed_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.armed).count()
    }

    /// Sample every armed trigger's channel and collect the action of the
    /// first one that fires.
    ///
    /// One-shot triggers disarm as they fire; permanent triggers stay
    /// armed. Polling continues across all slots so every detector tracks
    /// its signal even on ticks where an earlier slot fired.
    pub fn poll(&mut self, signals: &dyn SignalSource, now: Instant) -> Option<TriggerAction> {
        let mut fired = None;
        for slot in &mut self.slots {
            if !slot.armed {
                continue;
            }
            let sample = signals.channel_value(slot.channel);
            let Some(edge) = slot.detector.feed(sample, now) else {
                continue;
            };
            if !slot.mask.matches(edge) {
                continue;
            }
            if slot.one_shot {
                slot.armed = false;
            }
            if fired.is_none() {
                fired = Some(slot.action);
            }
        }
        fired
    }

    fn slot_for_channel(&mut self, channel: u8) -> Option<&mut Trigger> {
        let index = self
            .slots
            .iter()
            .position(|slot| slot.armed && slot.channel == channel)
            .or_else(|| self.slots.iter().position(|slot| !slot.armed))?;
        Some(&mut self.slots[index])
    }
}
