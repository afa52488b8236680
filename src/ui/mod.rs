pub mod image_grid;
pub mod keybindings;
pub mod prompt_input;
pub mod trigger;
pub mod window;

pub use image_grid::ImageGrid;
pub use window::MainWindow;
