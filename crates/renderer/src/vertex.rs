//! Vertex input descriptions for [`Vertex`].

use std::mem::{offset_of, size_of};

use ash::vk;
use ember_resources::Vertex;

/// Single interleaved binding at slot 0.
pub fn binding_description() -> vk::VertexInputBindingDescription {
    vk::VertexInputBindingDescription::default()
        .binding(0)
        .stride(size_of::<Vertex>() as u32)
        .input_rate(vk::VertexInputRate::VERTEX)
}

/// Locations 0..=3: position, color, normal, uv.
pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 4] {
    let attribute = |location: u32, format: vk::Format, offset: usize| {
        vk::VertexInputAttributeDescription::default()
            .binding(0)
            .location(location)
            .format(format)
            .offset(offset as u32)
    };

    [
        attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, position)),
        attribute(1, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, color)),
        attribute(2, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, normal)),
        attribute(3, vk::Format::R32G32_SFLOAT, offset_of!(Vertex, uv)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_stride() {
        assert_eq!(binding_description().stride, 44);
    }

    #[test]
    fn test_attribute_offsets() {
        let attrs = attribute_descriptions();
        let offsets: Vec<u32> = attrs.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 24, 36]);
        assert!(attrs.iter().enumerate().all(|(i, a)| a.location == i as u32));
        assert_eq!(attrs[3].format, vk::Format::R32G32_SFLOAT);
    }
}
