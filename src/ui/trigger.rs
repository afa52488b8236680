// Generate button

use gtk4::prelude::*;
use gtk4::Button;

const IDLE_LABEL: &str = "Generate";
const BUSY_LABEL: &str = "Generating...";

/// Single activation control. Every press is forwarded; deciding whether a
/// press starts a cycle is the controller's job.
pub struct GenerateTrigger {
    button: Button,
}

impl GenerateTrigger {
    pub fn new() -> Self {
        let button = Button::with_label(IDLE_LABEL);
        button.set_hexpand(true);
        button.set_tooltip_text(Some("Generate images (Ctrl+Enter)"));
        button.add_css_class("btn-generate");
        Self { button }
    }

    pub fn widget(&self) -> &Button {
        &self.button
    }

    pub fn connect_activated<F>(&self, callback: F)
    where
        F: Fn() + 'static,
    {
        self.button.connect_clicked(move |_| callback());
    }

    pub fn set_busy(&self, busy: bool) {
        self.button.set_label(if busy { BUSY_LABEL } else { IDLE_LABEL });
        if busy {
            self.button.add_css_class("busy");
        } else {
            self.button.remove_css_class("busy");
        }
    }
}

impl Default for GenerateTrigger {
    fn default() -> Self {
        Self::new()
    }
}
