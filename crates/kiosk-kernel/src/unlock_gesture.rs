//! [`UnlockGestureDetector`] – recognises the secret admin unlock gesture.
//!
//! Any of the following counts as the gesture:
//!
//! - a long press or a secondary (right) click;
//! - the Menu key, Shift + D-pad centre, or Alt + Enter;
//! - [`UnlockGestureDetector::required_presses`] back presses, each within
//!   [`UnlockGestureDetector::press_timeout`] of the previous one.
//!
//! The detector is a pure function of the signals and the timestamps fed to
//! it, so tests drive it with synthetic offsets.

use std::time::Duration;

use kiosk_types::{InputSignal, KeyChord, KeyCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureVerdict {
    /// Open the admin challenge.
    Unlock,
    /// A back-press sequence is in progress.
    Pending { remaining: u32 },
    Ignored,
}

#[derive(Debug, Clone)]
pub struct UnlockGestureDetector {
    required_presses: u32,
    press_timeout: Duration,
    count: u32,
    last_press: Option<Duration>,
}

impl Default for UnlockGestureDetector {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(2))
    }
}

impl UnlockGestureDetector {
    pub fn new(required_presses: u32, press_timeout: Duration) -> Self {
        Self {
            required_presses: required_presses.max(1),
            press_timeout,
            count: 0,
            last_press: None,
        }
    }

    pub fn required_presses(&self) -> u32 {
        self.required_presses
    }

    pub fn press_timeout(&self) -> Duration {
        self.press_timeout
    }

    /// Feed one signal observed at monotonic time `now`.
    pub fn observe(&mut self, signal: InputSignal, now: Duration) -> GestureVerdict {
        match signal {
            InputSignal::LongPress | InputSignal::SecondaryClick => self.fire(),
            InputSignal::Key(chord) if is_unlock_chord(chord) => self.fire(),
            InputSignal::Key(_) => GestureVerdict::Ignored,
            InputSignal::Back => self.back_press(now),
        }
    }

    fn back_press(&mut self, now: Duration) -> GestureVerdict {
        let within = self
            .last_press
            .is_some_and(|last| now.saturating_sub(last) <= self.press_timeout);
        self.count = if within { self.count + 1 } else { 1 };
        self.last_press = Some(now);

        if self.count >= self.required_presses {
            self.fire()
        } else {
            GestureVerdict::Pending {
                remaining: self.required_presses - self.count,
            }
        }
    }

    fn fire(&mut self) -> GestureVerdict {
        self.count = 0;
        self.last_press = None;
        GestureVerdict::Unlock
    }
}

fn is_unlock_chord(chord: KeyChord) -> bool {
    match chord.key {
        KeyCode::Menu => true,
        KeyCode::DpadCenter => chord.shift,
        KeyCode::Enter => chord.alt,
        KeyCode::Other(_) => false,
    }
}
