use std::any::Any;

use ash::vk;

use renderer_rhi::command::CommandBuffer;
use renderer_rhi::debug::colors;
use renderer_rhi::rendering::{ColorAttachment, RenderingConfig};

use crate::error::RenderResult;
use crate::graph::{FrameContext, PassSetup, RenderPass, RenderTarget};

use super::UI_PASS;

/// An immediate-mode UI that records into the frame's command buffer.
///
/// `record` runs inside a rendering scope with the swapchain image bound
/// as the only color attachment (load, store) and depth testing off.
pub trait UiRenderer {
    /// Called once with the color format the UI renders to.
    fn setup(&mut self, _color_format: vk::Format) -> RenderResult<()> {
        Ok(())
    }

    fn record(&mut self, cmd: &CommandBuffer, extent: vk::Extent2D) -> RenderResult<()>;
}

/// A UI that draws nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoUi;

impl UiRenderer for NoUi {
    fn record(&mut self, _cmd: &CommandBuffer, _extent: vk::Extent2D) -> RenderResult<()> {
        Ok(())
    }
}

pub struct UiPass {
    ui: Box<dyn UiRenderer>,
}

impl UiPass {
    pub fn new(ui: Box<dyn UiRenderer>) -> Self {
        Self { ui }
    }
}

impl RenderPass for UiPass {
    fn name(&self) -> &'static str {
        UI_PASS
    }

    fn setup(&mut self, setup: &mut PassSetup<'_>) -> RenderResult<()> {
        self.ui.setup(setup.color_format)
    }

    fn rendering(&self, target: &RenderTarget) -> Option<RenderingConfig> {
        Some(
            RenderingConfig::new(target.extent)
                .with_color_attachment(ColorAttachment::new(target.color_view).load()),
        )
    }

    fn execute(&mut self, cmd: &CommandBuffer, ctx: &mut FrameContext<'_>) -> RenderResult<()> {
        cmd.set_viewport_and_scissor(ctx.extent);
        cmd.set_depth_state(false, false, vk::CompareOp::ALWAYS);
        cmd.set_line_width(1.0);
        self.ui.record(cmd, ctx.extent)
    }

    fn debug_color(&self) -> [f32; 4] {
        colors::UI
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recording {
        format: Option<vk::Format>,
    }

    impl UiRenderer for Recording {
        fn setup(&mut self, color_format: vk::Format) -> RenderResult<()> {
            self.format = Some(color_format);
            Ok(())
        }

        fn record(&mut self, _cmd: &CommandBuffer, _extent: vk::Extent2D) -> RenderResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_ui_pass_is_named_and_typed() {
        let pass = UiPass::new(Box::new(NoUi));
        assert_eq!(pass.name(), "UIPass");
        assert!(pass.as_any().is::<UiPass>());
    }

    #[test]
    fn test_default_setup_accepts_any_format() {
        let mut ui = NoUi;
        assert!(ui.setup(vk::Format::B8G8R8A8_SRGB).is_ok());

        let mut recording = Recording { format: None };
        recording.setup(vk::Format::B8G8R8A8_UNORM).unwrap();
        assert_eq!(recording.format, Some(vk::Format::B8G8R8A8_UNORM));
    }
}
