use anyhow::{Context, Result};
use gtk4::prelude::*;
use gtk4::Application;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::pipeline::{CommandPipeline, GenerationWorker, InferencePipeline, ModelResources};
use crate::ui::MainWindow;

const APP_ID: &str = "com.fluidcanvas.FluidCanvas";

/// Process-wide resources built once before the UI starts.
pub struct AppContext {
    pub config: AppConfig,
    pub worker: Rc<GenerationWorker>,
}

impl AppContext {
    /// Load config, locate the models and bring up the engine. Any failure
    /// here means the app cannot generate anything and must not start.
    pub fn initialize() -> Result<Self> {
        let config = AppConfig::load().context("Failed to load configuration")?;
        let resources = ModelResources::locate(config.pipeline.models_dir.as_deref())
            .context("Failed to locate model resources")?;
        let pipeline = CommandPipeline::new(&config.pipeline, resources)
            .context("Failed to initialise inference pipeline")?;
        Self::with_pipeline(config, Arc::new(pipeline))
    }

    pub fn with_pipeline(config: AppConfig, pipeline: Arc<dyn InferencePipeline>) -> Result<Self> {
        let worker = GenerationWorker::new(pipeline).context("Failed to start generation worker")?;
        Ok(Self {
            config,
            worker: Rc::new(worker),
        })
    }
}

pub struct FluidCanvasApp {
    app: Application,
}

impl FluidCanvasApp {
    pub fn new(context: AppContext) -> Self {
        let app = Application::builder().application_id(APP_ID).build();

        let context = Rc::new(context);
        // Single window for the whole session.
        let main_window: Rc<RefCell<Option<Rc<MainWindow>>>> = Rc::new(RefCell::new(None));

        let window_slot = main_window.clone();
        app.connect_activate(move |app| {
            if let Some(window) = window_slot.borrow().as_ref() {
                window.present();
                return;
            }
            let window = MainWindow::new(app, &context.config, context.worker.clone());
            window.present();
            *window_slot.borrow_mut() = Some(window);
        });

        let window_slot = main_window;
        app.connect_shutdown(move |_| {
            if let Some(window) = window_slot.borrow_mut().take() {
                window.shutdown();
            }
        });

        Self { app }
    }

    pub fn run(&self) -> i32 {
        self.app.run().into()
    }
}
