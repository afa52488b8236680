// Multi-line prompt field

use gtk4::prelude::*;
use gtk4::{PolicyType, ScrolledWindow, TextView, WrapMode};

/// Height of the prompt area before the user resizes the window.
const PROMPT_MIN_HEIGHT_PX: i32 = 96;

/// Free-form text holder. No validation, no length limit.
pub struct PromptInput {
    scrolled: ScrolledWindow,
    view: TextView,
}

impl PromptInput {
    pub fn new() -> Self {
        let view = TextView::new();
        view.set_wrap_mode(WrapMode::WordChar);
        view.set_accepts_tab(false);
        view.set_top_margin(6);
        view.set_bottom_margin(6);
        view.set_left_margin(8);
        view.set_right_margin(8);
        view.add_css_class("prompt-input");

        let scrolled = ScrolledWindow::builder()
            .hscrollbar_policy(PolicyType::Never)
            .vscrollbar_policy(PolicyType::Automatic)
            .min_content_height(PROMPT_MIN_HEIGHT_PX)
            .hexpand(true)
            .child(&view)
            .build();
        scrolled.add_css_class("prompt-scroll");

        Self { scrolled, view }
    }

    pub fn widget(&self) -> &ScrolledWindow {
        &self.scrolled
    }

    /// Current text content, exactly as typed.
    pub fn text(&self) -> String {
        let buffer = self.view.buffer();
        let (start, end) = buffer.bounds();
        buffer.text(&start, &end, false).to_string()
    }

    pub fn set_text(&self, text: &str) {
        self.view.buffer().set_text(text);
    }

    pub fn grab_focus(&self) {
        self.view.grab_focus();
    }
}

impl Default for PromptInput {
    fn default() -> Self {
        Self::new()
    }
}
