//! Sampled 2D textures uploaded through a staging buffer.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::buffer::{Buffer, BufferUsage};
use crate::command::record_layout_transition;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{Image, ImageDesc};

/// Format used for all decoded RGBA8 textures.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Byte length of a tightly packed RGBA8 image, or `None` on overflow.
pub fn rgba8_len(width: u32, height: u32) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(4)
}

/// Linear, repeating sampler with the device's maximum anisotropy.
pub fn sampler_create_info(max_anisotropy: f32) -> vk::SamplerCreateInfo<'static> {
    vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .anisotropy_enable(true)
        .max_anisotropy(max_anisotropy)
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
}

/// GPU texture: image, view and sampler, left in `SHADER_READ_ONLY_OPTIMAL`.
pub struct Texture {
    device: Arc<Device>,
    image: Image,
    sampler: vk::Sampler,
}

impl Texture {
    /// Uploads tightly packed RGBA8 pixels.
    ///
    /// Blocks until the upload completes.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidHandle`] if `pixels` does not hold exactly
    /// `width * height * 4` bytes.
    pub fn from_rgba8(
        device: Arc<Device>,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> RhiResult<Self> {
        let expected = rgba8_len(width, height).ok_or_else(|| {
            RhiError::InvalidHandle(format!("Texture {}x{} is too large", width, height))
        })?;
        if pixels.len() != expected {
            return Err(RhiError::InvalidHandle(format!(
                "Texture {}x{} needs {} bytes, got {}",
                width,
                height,
                expected,
                pixels.len()
            )));
        }

        let image = Image::new(
            device.clone(),
            &ImageDesc::texture(width, height, TEXTURE_FORMAT),
        )?;
        let staging = Buffer::new_with_data(device.clone(), BufferUsage::Staging, pixels)?;

        let handle = image.handle();
        device.one_shot(|raw, cmd| {
            record_layout_transition(
                raw,
                cmd,
                handle,
                vk::ImageAspectFlags::COLOR,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )
        })?;
        device.copy_buffer_to_image(staging.handle(), handle, width, height)?;
        device.one_shot(|raw, cmd| {
            record_layout_transition(
                raw,
                cmd,
                handle,
                vk::ImageAspectFlags::COLOR,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )
        })?;

        let max_anisotropy = device.limits().max_sampler_anisotropy;
        let sampler = unsafe {
            device
                .handle()
                .create_sampler(&sampler_create_info(max_anisotropy), None)?
        };

        info!("Uploaded texture {}x{}", width, height);

        Ok(Self {
            device,
            image,
            sampler,
        })
    }

    /// Descriptor info for a combined image sampler binding.
    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler,
            image_view: self.image.view(),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_sampler(self.sampler, None) };
        debug!("Destroyed texture sampler");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgba8_len() {
        assert_eq!(rgba8_len(2, 3), Some(24));
        assert_eq!(rgba8_len(0, 3), Some(0));
        assert_eq!(rgba8_len(1, 1), Some(4));
    }

    #[test]
    fn test_sampler_uses_anisotropy() {
        let info = sampler_create_info(16.0);
        assert_eq!(info.anisotropy_enable, vk::TRUE);
        assert_eq!(info.max_anisotropy, 16.0);
        assert_eq!(info.address_mode_u, vk::SamplerAddressMode::REPEAT);
        assert_eq!(info.mag_filter, vk::Filter::LINEAR);
    }
}
