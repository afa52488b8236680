pub mod generation;
pub mod grid_model;

pub use generation::*;
pub use grid_model::*;
