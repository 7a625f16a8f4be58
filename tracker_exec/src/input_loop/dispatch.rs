//! Dispatch of input events to mode changes

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use eqpt_if::input::InputEvent;
use log::{info, trace};

use crate::mode::{Mode, ModeTable, ModeWriter};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Turns input events into updates of the current mode.
///
/// Owns the only [`ModeWriter`], so it is the only thing that ever changes the mode.
pub struct Dispatcher {
    modes: ModeTable,
    stop_button: Option<u8>,
    writer: ModeWriter,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Dispatcher {
    pub fn new(modes: ModeTable, stop_button: Option<u8>, writer: ModeWriter) -> Self {
        Self {
            modes,
            stop_button,
            writer
        }
    }

    /// Handle a single event, returning the newly selected mode if it changed the mode.
    ///
    /// Only button presses select modes. The stop button always selects idle, even if a mode is
    /// also mapped to it.
    pub fn dispatch(&mut self, event: &InputEvent) -> Option<Mode> {
        let number = match *event {
            InputEvent::Button { number, pressed: true } => number,
            _ => {
                trace!("Ignoring input event {:?}", event);
                return None
            }
        };

        let mode = if Some(number) == self.stop_button {
            Mode::idle()
        }
        else {
            match self.modes.for_button(number) {
                Some(m) => m.clone(),
                None => {
                    trace!("Button {} is not mapped to a mode", number);
                    return None
                }
            }
        };

        info!("Button {} pressed, switching to mode \"{}\"", number, mode.name);
        self.writer.set(mode.clone());

        Some(mode)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mode::{mode_cell, ModeParams};
    use crate::vision::{ColorRange, ColorRangeConfig};
    use std::collections::BTreeMap;

    fn dispatcher() -> (Dispatcher, crate::mode::ModeReader) {
        let ranges = ColorRangeConfig::from_ranges(vec![
            ColorRange::new("green", [50, 100, 50], [70, 255, 255]).unwrap(),
        ]);
        let mut params = BTreeMap::new();
        params.insert("green".to_string(), ModeParams {
            targets: vec!["green".into()],
            button: Some(0),
            speed_scale: 1.0
        });
        let table = ModeTable::from_params(&params, "idle", &ranges).unwrap();
        let (writer, reader) = mode_cell(table.initial());

        (Dispatcher::new(table, Some(3), writer), reader)
    }

    #[test]
    fn test_button_selects_mode() {
        let (mut d, reader) = dispatcher();
        assert!(reader.get().is_idle());

        let m = d.dispatch(&InputEvent::Button { number: 0, pressed: true }).unwrap();
        assert_eq!(m.name, "green");
        assert_eq!(reader.get().targets, vec!["green"]);

        // Stop button returns to idle
        d.dispatch(&InputEvent::Button { number: 3, pressed: true }).unwrap();
        assert!(reader.get().is_idle());
    }

    #[test]
    fn test_other_events_ignored() {
        let (mut d, reader) = dispatcher();

        assert!(d.dispatch(&InputEvent::Button { number: 0, pressed: false }).is_none());
        assert!(d.dispatch(&InputEvent::Axis { number: 0, value: 1200 }).is_none());
        assert!(d.dispatch(&InputEvent::Button { number: 9, pressed: true }).is_none());
        assert!(reader.get().is_idle());
    }
}
