mod app;
mod config;
mod controller;
mod models;
mod pipeline;
mod ui;

use app::{AppContext, FluidCanvasApp};

fn main() {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "fluidcanvas=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let context = match AppContext::initialize() {
        Ok(context) => context,
        Err(err) => {
            tracing::error!(error = ?err, "Startup failed");
            std::process::exit(1);
        }
    };

    let app = FluidCanvasApp::new(context);
    std::process::exit(app.run());
}
