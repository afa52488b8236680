// Keyboard shortcuts for the main window
//
// Keybindings:
// - Ctrl+Enter: Generate from the current prompt
// - Escape: Cancel the running generation

use gdk4::{Key, ModifierType};
use gtk4::prelude::*;
use gtk4::{EventControllerKey, PropagationPhase, Widget};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Generate,
    Cancel,
}

/// Map a key press to an action. Plain Enter is left to the prompt field so
/// multi-line prompts stay editable.
pub fn action_for_key(keyval: Key, state: ModifierType) -> Option<KeyAction> {
    let ctrl = state.contains(ModifierType::CONTROL_MASK);
    match keyval {
        Key::Return | Key::KP_Enter if ctrl => Some(KeyAction::Generate),
        Key::Escape => Some(KeyAction::Cancel),
        _ => None,
    }
}

/// Callback type for key actions
pub type KeyActionCallback = Box<dyn Fn(KeyAction)>;

pub struct Keybindings {
    controller: EventControllerKey,
    on_action: Rc<RefCell<Option<KeyActionCallback>>>,
}

impl Keybindings {
    pub fn new() -> Self {
        let controller = EventControllerKey::new();
        // Capture phase so Ctrl+Enter is seen before the text view inserts a newline.
        controller.set_propagation_phase(PropagationPhase::Capture);

        let on_action: Rc<RefCell<Option<KeyActionCallback>>> = Rc::new(RefCell::new(None));

        let on_action_clone = on_action.clone();
        controller.connect_key_pressed(move |_controller, keyval, _keycode, state| {
            let Some(action) = action_for_key(keyval, state) else {
                return glib::Propagation::Proceed;
            };
            match *on_action_clone.borrow() {
                Some(ref callback) => {
                    callback(action);
                    glib::Propagation::Stop
                }
                None => glib::Propagation::Proceed,
            }
        });

        Self {
            controller,
            on_action,
        }
    }

    /// Attach to a widget (normally the window).
    pub fn attach(&self, widget: &impl IsA<Widget>) {
        widget.add_controller(self.controller.clone());
    }

    pub fn connect_action<F>(&self, callback: F)
    where
        F: Fn(KeyAction) + 'static,
    {
        *self.on_action.borrow_mut() = Some(Box::new(callback));
    }
}

impl Default for Keybindings {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ctrl_enter_generates() {
        assert_eq!(
            action_for_key(Key::Return, ModifierType::CONTROL_MASK),
            Some(KeyAction::Generate)
        );
        assert_eq!(
            action_for_key(Key::KP_Enter, ModifierType::CONTROL_MASK | ModifierType::SHIFT_MASK),
            Some(KeyAction::Generate)
        );
    }

    #[test]
    fn test_plain_enter_is_left_to_the_prompt() {
        assert_eq!(action_for_key(Key::Return, ModifierType::empty()), None);
        assert_eq!(action_for_key(Key::a, ModifierType::CONTROL_MASK), None);
    }

    #[test]
    fn test_escape_cancels() {
        assert_eq!(
            action_for_key(Key::Escape, ModifierType::empty()),
            Some(KeyAction::Cancel)
        );
    }
}
