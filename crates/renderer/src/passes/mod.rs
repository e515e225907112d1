//! The four passes of a frame, in recording order.

mod grid;
mod main;
mod shadow;
mod ui;

pub use grid::GridPass;
pub use main::{MainPass, MainPipeline, select_pipeline};
pub use shadow::ShadowPass;
pub use ui::{NoUi, UiPass, UiRenderer};

pub const SHADOW_PASS: &str = "ShadowPass";
pub const MAIN_PASS: &str = "MainPass";
pub const GRID_PASS: &str = "GridPass";
pub const UI_PASS: &str = "UIPass";
