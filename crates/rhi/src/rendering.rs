//! Attachment descriptions for dynamic rendering.

use ash::vk;

/// Depth value the depth attachment is cleared to.
pub const CLEAR_DEPTH: f32 = 1.0;

/// Color attachment cleared to `clear_color` and stored for presentation.
pub fn color_attachment(
    view: vk::ImageView,
    clear_color: [f32; 4],
) -> vk::RenderingAttachmentInfo<'static> {
    vk::RenderingAttachmentInfo::default()
        .image_view(view)
        .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .clear_value(vk::ClearValue {
            color: vk::ClearColorValue {
                float32: clear_color,
            },
        })
}

/// Depth attachment cleared to [`CLEAR_DEPTH`]. Its contents are not kept.
pub fn depth_attachment(view: vk::ImageView) -> vk::RenderingAttachmentInfo<'static> {
    vk::RenderingAttachmentInfo::default()
        .image_view(view)
        .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::DONT_CARE)
        .clear_value(vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: CLEAR_DEPTH,
                stencil: 0,
            },
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_attachment_clears_and_stores() {
        let info = color_attachment(vk::ImageView::null(), [0.1, 0.2, 0.3, 1.0]);
        assert_eq!(info.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(info.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(info.image_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        let color = unsafe { info.clear_value.color.float32 };
        assert_eq!(color, [0.1, 0.2, 0.3, 1.0]);
    }

    #[test]
    fn test_depth_attachment_clears_to_far_plane() {
        let info = depth_attachment(vk::ImageView::null());
        assert_eq!(info.image_layout, vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL);
        let depth = unsafe { info.clear_value.depth_stencil.depth };
        assert_eq!(depth, CLEAR_DEPTH);
    }
}
