// Main window for FluidCanvas
// Image grid on top, prompt below it, Generate button at the bottom, status bar last

use gdk4::Display;
use gtk4::prelude::*;
use gtk4::{
    Align, Application, ApplicationWindow, Box as GtkBox, Button, CssProvider, Label,
    Orientation, Settings, STYLE_PROVIDER_PRIORITY_APPLICATION,
};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use super::image_grid::ImageGrid;
use super::keybindings::{KeyAction, Keybindings};
use super::prompt_input::PromptInput;
use super::trigger::GenerateTrigger;
use crate::config::AppConfig;
use crate::controller::{CycleOutcome, GenerationController, TriggerDecision};
use crate::pipeline::worker::GenerationOutcome;
use crate::pipeline::{CancelToken, GenerationWorker};

/// Vertical gap between the grid, prompt and button.
const SECTION_SPACING: i32 = 8;

/// CSS for terminal aesthetic
const APP_CSS: &str = r#"
* {
    border-radius: 0;
    box-shadow: none;
    background-image: none;
}

window {
    background-color: #0a0a0a;
    color: #e0e0e0;
}

button {
    background-color: transparent;
    border: 1px solid #333333;
    color: #e0e0e0;
}

button:hover {
    background-color: rgba(224, 224, 224, 0.05);
    border-color: #555555;
}

.btn-generate {
    padding: 8px;
    font-weight: bold;
}

.btn-generate.busy {
    border-color: #00ff88;
    border-style: dashed;
    color: #00ff88;
}

.image-grid {
    background-color: #0a0a0a;
}

.grid-image {
    background-color: #121212;
    border: 1px solid #333333;
}

.prompt-scroll {
    border: 1px solid #333333;
}

.prompt-input,
.prompt-input text {
    background-color: #121212;
    color: #e0e0e0;
    caret-color: #00ff88;
}

.status-bar {
    border-top: 1px solid #333333;
}

.muted {
    color: #777777;
}

.status-error {
    color: #ff5f5f;
}
"#;

/// Load and apply the embedded stylesheet
fn load_css() {
    let provider = CssProvider::new();
    provider.load_from_string(APP_CSS);

    if let Some(display) = Display::default() {
        gtk4::style_context_add_provider_for_display(
            &display,
            &provider,
            STYLE_PROVIDER_PRIORITY_APPLICATION,
        );
        tracing::debug!("Loaded embedded CSS");
    }
}

/// Main window: owns the views and drives generation cycles
pub struct MainWindow {
    self_weak: RefCell<Weak<MainWindow>>,
    window: ApplicationWindow,
    grid: ImageGrid,
    prompt: PromptInput,
    trigger: GenerateTrigger,
    status_label: Label,
    cancel_button: Button,
    keybindings: Keybindings,
    controller: RefCell<GenerationController>,
    worker: Rc<GenerationWorker>,
    active_cancel: RefCell<Option<CancelToken>>,
    last_layout_size: Cell<(i32, i32)>,
}

impl MainWindow {
    pub fn new(app: &Application, config: &AppConfig, worker: Rc<GenerationWorker>) -> Rc<Self> {
        load_css();
        if let Some(settings) = Settings::default() {
            settings.set_gtk_application_prefer_dark_theme(config.window.prefer_dark);
        }

        let window = ApplicationWindow::builder()
            .application(app)
            .title("FluidCanvas")
            .default_width(config.window.width)
            .default_height(config.window.height)
            .build();

        let root = GtkBox::new(Orientation::Vertical, SECTION_SPACING);

        let grid = ImageGrid::new(config.grid.rows, config.grid.columns);

        let prompt = PromptInput::new();
        prompt.widget().set_margin_start(8);
        prompt.widget().set_margin_end(8);

        let trigger = GenerateTrigger::new();
        trigger.widget().set_margin_start(8);
        trigger.widget().set_margin_end(8);

        // Status bar
        let status_bar = GtkBox::new(Orientation::Horizontal, 8);
        status_bar.add_css_class("status-bar");
        status_bar.set_margin_start(8);
        status_bar.set_margin_end(8);
        status_bar.set_margin_bottom(4);

        let status_label = Label::new(Some("> Ready"));
        status_label.set_halign(Align::Start);
        status_label.set_hexpand(true);
        status_label.set_ellipsize(gtk4::pango::EllipsizeMode::End);
        status_label.add_css_class("muted");
        status_bar.append(&status_label);

        let cancel_button = Button::with_label("[cancel]");
        cancel_button.set_tooltip_text(Some("Cancel generation (Esc)"));
        cancel_button.set_sensitive(false);
        status_bar.append(&cancel_button);

        root.append(&grid);
        root.append(prompt.widget());
        root.append(trigger.widget());
        root.append(&status_bar);
        window.set_child(Some(&root));

        let main_window = Rc::new(Self {
            self_weak: RefCell::new(Weak::new()),
            window,
            grid,
            prompt,
            trigger,
            status_label,
            cancel_button: cancel_button.clone(),
            keybindings: Keybindings::new(),
            controller: RefCell::new(GenerationController::new(config.generation.clone())),
            worker,
            active_cancel: RefCell::new(None),
            last_layout_size: Cell::new((0, 0)),
        });
        *main_window.self_weak.borrow_mut() = Rc::downgrade(&main_window);

        let window_weak = Rc::downgrade(&main_window);
        main_window.trigger.connect_activated(move || {
            if let Some(window) = window_weak.upgrade() {
                window.on_trigger();
            }
        });

        let window_weak = Rc::downgrade(&main_window);
        cancel_button.connect_clicked(move |_| {
            if let Some(window) = window_weak.upgrade() {
                window.cancel_generation();
            }
        });

        main_window.setup_keybindings();
        main_window.setup_layout_resize_observer();
        main_window.prompt.set_text("");
        main_window.prompt.grab_focus();

        main_window
    }

    fn setup_keybindings(&self) {
        self.keybindings.attach(&self.window);
        let weak_self = self.self_weak.borrow().clone();
        self.keybindings.connect_action(move |action| {
            if let Some(window) = weak_self.upgrade() {
                match action {
                    KeyAction::Generate => window.on_trigger(),
                    KeyAction::Cancel => window.cancel_generation(),
                }
            }
        });
    }

    // Keep picture sizes tied to the grid's rendered bounds
    fn setup_layout_resize_observer(&self) {
        let weak_self = self.self_weak.borrow().clone();
        self.grid.add_tick_callback(move |grid, _clock| {
            if let Some(window) = weak_self.upgrade() {
                let size = (grid.width(), grid.height());
                if size.0 > 0 && size.1 > 0 && size != window.last_layout_size.get() {
                    window.last_layout_size.set(size);
                    window.schedule_relayout(Duration::from_millis(40));
                }
                glib::ControlFlow::Continue
            } else {
                glib::ControlFlow::Break
            }
        });
    }

    fn schedule_relayout(&self, delay: Duration) {
        let weak_self = self.self_weak.borrow().clone();
        glib::timeout_add_local(delay, move || {
            if let Some(window) = weak_self.upgrade() {
                window.grid.relayout();
            }
            glib::ControlFlow::Break
        });
    }

    /// Trigger activation: read the prompt and hand a request to the worker.
    fn on_trigger(&self) {
        let prompt = self.prompt.text();
        let (id, decision) = self
            .controller
            .borrow_mut()
            .trigger(&prompt, &mut rand::rng());

        let request = match decision {
            TriggerDecision::Start(request) => request,
            TriggerDecision::Busy => {
                self.set_status("> Busy: a generation is already running", false);
                return;
            }
        };

        let handle = self.worker.submit(id, request);
        *self.active_cancel.borrow_mut() = Some(handle.cancel_token());
        self.set_busy(true);
        self.set_status(self.controller.borrow().status_text(), false);

        let weak_self = self.self_weak.borrow().clone();
        glib::spawn_future_local(async move {
            let id = handle.id();
            let outcome = handle.wait().await;
            if let Some(window) = weak_self.upgrade() {
                window.finish_generation(id, outcome);
            }
        });
    }

    fn finish_generation(&self, id: u64, outcome: GenerationOutcome) {
        let cycle = self.controller.borrow_mut().complete(id, outcome);
        if cycle == CycleOutcome::Stale {
            return;
        }

        let is_error = matches!(cycle, CycleOutcome::Failed { .. });
        if let Some(placement) = self.grid.apply(cycle) {
            tracing::debug!(
                id,
                placed = placement.placed,
                dropped = placement.dropped,
                shown = self.grid.image_count(),
                "Grid updated"
            );
            self.controller.borrow_mut().record_placement(placement);
        }

        self.active_cancel.borrow_mut().take();
        self.set_busy(false);
        self.set_status(self.controller.borrow().status_text(), is_error);
    }

    fn cancel_generation(&self) {
        if let Some(token) = self.active_cancel.borrow().as_ref() {
            tracing::info!("Cancel requested");
            token.cancel();
            self.set_status("> Cancelling...", false);
        }
    }

    fn set_busy(&self, busy: bool) {
        self.trigger.set_busy(busy);
        self.cancel_button.set_sensitive(busy);
    }

    /// Set status bar text
    pub fn set_status(&self, status: &str, is_error: bool) {
        self.status_label.set_text(status);
        if is_error {
            self.status_label.add_css_class("status-error");
        } else {
            self.status_label.remove_css_class("status-error");
        }
    }

    /// Present the window
    pub fn present(&self) {
        self.window.present();
    }

    /// Cancel whatever is running; used when the application shuts down.
    pub fn shutdown(&self) {
        if let Some(token) = self.active_cancel.borrow_mut().take() {
            token.cancel();
        }
        self.worker.cancel_active();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_css_declares_widget_classes() {
        // Verify the stylesheet covers every class the widgets add
        // This doesn't require GTK initialization
        for class in [
            ".btn-generate",
            ".image-grid",
            ".grid-image",
            ".prompt-input",
            ".status-bar",
            ".status-error",
        ] {
            assert!(APP_CSS.contains(class), "missing {class}");
        }
    }
}
