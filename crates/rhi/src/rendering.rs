//! Dynamic rendering descriptions.
//!
//! A pass describes its attachments with [`RenderingConfig`]; the graph turns
//! that into a [`RenderingInfoBundle`] whose `info()` feeds
//! `vkCmdBeginRendering`.
//!
//! ```no_run
//! use ash::vk;
//! use renderer_rhi::rendering::{ColorAttachment, DepthAttachment, RenderingConfig};
//! use renderer_rhi::command::CommandBuffer;
//!
//! # fn example(color: vk::ImageView, depth: vk::ImageView, cmd: &CommandBuffer) {
//! let config = RenderingConfig::new(vk::Extent2D { width: 800, height: 600 })
//!     .with_color_attachment(ColorAttachment::new(color).with_clear_color([0.0, 0.0, 0.0, 1.0]))
//!     .with_depth_attachment(DepthAttachment::new(depth).with_clear_depth(1.0));
//!
//! let bundle = config.build();
//! cmd.begin_rendering(&bundle.info());
//! cmd.end_rendering();
//! # }
//! ```

use ash::vk;

/// A colour attachment. Defaults to CLEAR/STORE in `COLOR_ATTACHMENT_OPTIMAL`.
#[derive(Clone, Copy, Debug)]
pub struct ColorAttachment {
    pub image_view: vk::ImageView,
    pub layout: vk::ImageLayout,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub clear_color: [f32; 4],
}

impl ColorAttachment {
    pub fn new(image_view: vk::ImageView) -> Self {
        Self {
            image_view,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }

    #[inline]
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Keeps the existing contents instead of clearing.
    #[inline]
    pub fn load(mut self) -> Self {
        self.load_op = vk::AttachmentLoadOp::LOAD;
        self
    }

    pub fn to_rendering_attachment_info(&self) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_view(self.image_view)
            .image_layout(self.layout)
            .load_op(self.load_op)
            .store_op(self.store_op)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            })
    }
}

/// A depth attachment. Defaults to CLEAR/STORE to 1.0 in
/// `DEPTH_ATTACHMENT_OPTIMAL`.
#[derive(Clone, Copy, Debug)]
pub struct DepthAttachment {
    pub image_view: vk::ImageView,
    pub layout: vk::ImageLayout,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub clear_depth: f32,
}

impl DepthAttachment {
    pub fn new(image_view: vk::ImageView) -> Self {
        Self {
            image_view,
            layout: vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_depth: 1.0,
        }
    }

    #[inline]
    pub fn with_clear_depth(mut self, depth: f32) -> Self {
        self.clear_depth = depth;
        self
    }

    #[inline]
    pub fn load(mut self) -> Self {
        self.load_op = vk::AttachmentLoadOp::LOAD;
        self
    }

    pub fn to_rendering_attachment_info(&self) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_view(self.image_view)
            .image_layout(self.layout)
            .load_op(self.load_op)
            .store_op(self.store_op)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: self.clear_depth,
                    stencil: 0,
                },
            })
    }
}

/// Everything `vkCmdBeginRendering` needs for one pass.
#[derive(Clone, Debug)]
pub struct RenderingConfig {
    pub color_attachments: Vec<ColorAttachment>,
    pub depth_attachment: Option<DepthAttachment>,
    pub render_area: vk::Rect2D,
}

impl RenderingConfig {
    pub fn new(extent: vk::Extent2D) -> Self {
        Self {
            color_attachments: Vec::new(),
            depth_attachment: None,
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
        }
    }

    #[inline]
    pub fn with_color_attachment(mut self, attachment: ColorAttachment) -> Self {
        self.color_attachments.push(attachment);
        self
    }

    #[inline]
    pub fn with_depth_attachment(mut self, attachment: DepthAttachment) -> Self {
        self.depth_attachment = Some(attachment);
        self
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.render_area.extent
    }

    /// Materializes the attachment infos so they outlive the `RenderingInfo`.
    pub fn build(&self) -> RenderingInfoBundle {
        RenderingInfoBundle {
            color_attachments: self
                .color_attachments
                .iter()
                .map(ColorAttachment::to_rendering_attachment_info)
                .collect(),
            depth_attachment: self
                .depth_attachment
                .as_ref()
                .map(DepthAttachment::to_rendering_attachment_info),
            render_area: self.render_area,
        }
    }
}

/// Owns the attachment infos referenced by the `RenderingInfo` it hands out.
pub struct RenderingInfoBundle {
    color_attachments: Vec<vk::RenderingAttachmentInfo<'static>>,
    depth_attachment: Option<vk::RenderingAttachmentInfo<'static>>,
    render_area: vk::Rect2D,
}

impl RenderingInfoBundle {
    pub fn info(&self) -> vk::RenderingInfo<'_> {
        let mut info = vk::RenderingInfo::default()
            .render_area(self.render_area)
            .layer_count(1)
            .color_attachments(&self.color_attachments);

        if let Some(ref depth) = self.depth_attachment {
            info = info.depth_attachment(depth);
        }

        info
    }

    #[inline]
    pub fn color_attachments(&self) -> &[vk::RenderingAttachmentInfo<'static>] {
        &self.color_attachments
    }

    #[inline]
    pub fn depth_attachment(&self) -> Option<&vk::RenderingAttachmentInfo<'static>> {
        self.depth_attachment.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent() -> vk::Extent2D {
        vk::Extent2D {
            width: 800,
            height: 600,
        }
    }

    #[test]
    fn test_color_attachment_defaults_clear_store() {
        let attachment = ColorAttachment::new(vk::ImageView::null());
        assert_eq!(attachment.layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(attachment.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(attachment.store_op, vk::AttachmentStoreOp::STORE);

        let loaded = attachment.load();
        assert_eq!(loaded.load_op, vk::AttachmentLoadOp::LOAD);
    }

    #[test]
    fn test_depth_attachment_clears_to_one() {
        let attachment = DepthAttachment::new(vk::ImageView::null());
        assert_eq!(attachment.layout, vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL);
        assert_eq!(attachment.clear_depth, 1.0);

        let info = attachment.to_rendering_attachment_info();
        let depth = unsafe { info.clear_value.depth_stencil.depth };
        assert_eq!(depth, 1.0);
    }

    #[test]
    fn test_bundle_carries_attachments() {
        let config = RenderingConfig::new(extent())
            .with_color_attachment(ColorAttachment::new(vk::ImageView::null()))
            .with_depth_attachment(DepthAttachment::new(vk::ImageView::null()));

        let bundle = config.build();
        assert_eq!(bundle.color_attachments().len(), 1);
        assert!(bundle.depth_attachment().is_some());

        let info = bundle.info();
        assert_eq!(info.color_attachment_count, 1);
        assert_eq!(info.layer_count, 1);
        assert_eq!(info.render_area.extent.width, 800);
    }

    #[test]
    fn test_depth_only_config() {
        let bundle = RenderingConfig::new(extent())
            .with_depth_attachment(DepthAttachment::new(vk::ImageView::null()))
            .build();
        assert!(bundle.color_attachments().is_empty());
        assert_eq!(bundle.info().color_attachment_count, 0);
    }
}
