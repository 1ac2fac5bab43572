//! Keyboard sampling and key edge detection

use macroquad::prelude::*;
use shared::{ClientMessage, InputKeys};

/// What one frame of keyboard input produced
#[derive(Debug, Clone, Default)]
pub struct InputFrame {
    /// Movement keys currently held
    pub keys: InputKeys,
    /// `keyPress` messages for keys whose state changed this frame
    pub edges: Vec<ClientMessage>,
    /// Toggle the chunk grid overlay
    pub toggle_grid: bool,
}

/// Tracks key state between frames so only changes go out on the wire
pub struct InputManager {
    previous: InputKeys,

    // Previous frame key state for edge detection
    prev_key_g: bool,
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            previous: InputKeys::default(),
            prev_key_g: false,
        }
    }

    /// Samples the keyboard (WASD and arrow keys both work)
    pub fn poll(&mut self) -> InputFrame {
        let keys = InputKeys {
            up: is_key_down(KeyCode::W) || is_key_down(KeyCode::Up),
            down: is_key_down(KeyCode::S) || is_key_down(KeyCode::Down),
            left: is_key_down(KeyCode::A) || is_key_down(KeyCode::Left),
            right: is_key_down(KeyCode::D) || is_key_down(KeyCode::Right),
        };

        let key_g = is_key_down(KeyCode::G);
        let toggle_grid = key_g && !self.prev_key_g;
        self.prev_key_g = key_g;

        InputFrame {
            keys,
            edges: self.edges(keys),
            toggle_grid,
        }
    }

    /// Returns a `keyPress` for every key that differs from the last call.
    pub fn edges(&mut self, keys: InputKeys) -> Vec<ClientMessage> {
        let edges = InputKeys::NAMES
            .iter()
            .filter_map(|&name| {
                let now = keys.get(name)?;
                let before = self.previous.get(name)?;
                (now != before).then(|| ClientMessage::KeyPress {
                    key: name.to_string(),
                    pressed: now,
                })
            })
            .collect();
        self.previous = keys;
        edges
    }

    /// Forgets held keys, so the next sample re-sends every pressed key.
    pub fn reset(&mut self) {
        self.previous = InputKeys::default();
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_press(key: &str, pressed: bool) -> ClientMessage {
        ClientMessage::KeyPress {
            key: key.to_string(),
            pressed,
        }
    }

    #[test]
    fn test_only_changes_are_reported() {
        let mut input = InputManager::new();
        let held = InputKeys {
            up: true,
            ..InputKeys::default()
        };

        assert_eq!(input.edges(held), vec![key_press("up", true)]);
        assert!(input.edges(held).is_empty());
        assert!(input.edges(held).is_empty());
        assert_eq!(input.edges(InputKeys::default()), vec![key_press("up", false)]);
    }

    #[test]
    fn test_simultaneous_changes_in_fixed_order() {
        let mut input = InputManager::new();
        input.edges(InputKeys {
            left: true,
            ..InputKeys::default()
        });

        let edges = input.edges(InputKeys {
            down: true,
            right: true,
            ..InputKeys::default()
        });

        assert_eq!(
            edges,
            vec![
                key_press("down", true),
                key_press("left", false),
                key_press("right", true),
            ]
        );
    }

    #[test]
    fn test_reset_resends_held_keys() {
        let mut input = InputManager::new();
        let held = InputKeys {
            right: true,
            ..InputKeys::default()
        };
        input.edges(held);

        input.reset();

        assert_eq!(input.edges(held), vec![key_press("right", true)]);
    }
}
