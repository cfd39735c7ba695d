//! Click policy and single/double click disambiguation.

use std::time::{Duration, Instant};

use crate::config::TreeConfig;
use crate::display::DisplayId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    Click(DisplayId),
    DoubleClick(DisplayId),
}

impl Gesture {
    pub fn target(self) -> DisplayId {
        match self {
            Self::Click(id) | Self::DoubleClick(id) => id,
        }
    }
}

/// What a gesture does to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureAction {
    /// Collapse if expanded, otherwise reveal or uncollapse one level.
    Toggle,
    RevealDepth(usize),
}

/// Which gesture performs the deep reveal. At most one ever does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickPolicy {
    /// Both gestures toggle one level.
    Toggle,
    Deep { depth: usize, on_double_click: bool },
}

impl ClickPolicy {
    pub fn from_config(config: &TreeConfig) -> Self {
        if config.click_expand_depth > 1 {
            Self::Deep {
                depth: config.click_expand_depth,
                on_double_click: config.deep_reveal_on_double_click,
            }
        } else {
            Self::Toggle
        }
    }

    pub fn action_for(self, gesture: Gesture) -> GestureAction {
        match (self, gesture) {
            (Self::Toggle, _) => GestureAction::Toggle,
            (Self::Deep { depth, on_double_click: false }, Gesture::Click(_))
            | (Self::Deep { depth, on_double_click: true }, Gesture::DoubleClick(_)) => {
                GestureAction::RevealDepth(depth)
            }
            (Self::Deep { .. }, _) => GestureAction::Toggle,
        }
    }

    /// Single clicks only need deferring when double click means something else.
    pub fn debounce_window(self, configured: Duration) -> Duration {
        match self {
            Self::Toggle => Duration::ZERO,
            Self::Deep { .. } => configured,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingClick {
    target: DisplayId,
    at: Instant,
}

/// Holds a single click back for one window so a second press on the same
/// node becomes a double click instead of two clicks.
#[derive(Debug, Clone)]
pub struct ClickDebouncer {
    window: Duration,
    pending: Option<PendingClick>,
}

impl ClickDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// The node with a single click waiting to fire, if any.
    pub fn pending(&self) -> Option<DisplayId> {
        self.pending.map(|p| p.target)
    }

    /// Register a press. Returns gestures that are final as of `now`.
    pub fn press(&mut self, target: DisplayId, now: Instant) -> Vec<Gesture> {
        let mut fired = Vec::new();
        if let Some(pending) = self.pending.take() {
            if pending.target == target && now.duration_since(pending.at) <= self.window {
                fired.push(Gesture::DoubleClick(target));
                return fired;
            }
            fired.push(Gesture::Click(pending.target));
        }

        if self.window.is_zero() {
            fired.push(Gesture::Click(target));
        } else {
            self.pending = Some(PendingClick { target, at: now });
        }
        fired
    }

    /// Fire the pending single click once its window has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<Gesture> {
        let pending = self.pending?;
        if now.duration_since(pending.at) > self.window {
            self.pending = None;
            Some(Gesture::Click(pending.target))
        } else {
            None
        }
    }
}
