//! Texture decoding through the `image` crate.

use std::path::PathBuf;

use ember_resources::{MeshData, ResourceError, SubMeshMaterial, TextureData};

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("ember_{}_{}", std::process::id(), name))
}

#[test]
fn test_png_round_trips_to_rgba8() {
    let path = temp_path("checker.png");
    let mut image = image::RgbImage::new(2, 2);
    image.put_pixel(0, 0, image::Rgb([255, 0, 0]));
    image.put_pixel(1, 1, image::Rgb([0, 0, 255]));
    image.save(&path).expect("write test png");

    let texture = TextureData::from_file(&path).expect("decode test png");
    std::fs::remove_file(&path).ok();

    assert_eq!((texture.width(), texture.height()), (2, 2));
    assert_eq!(&texture.pixels()[0..4], &[255, 0, 0, 255]);
    assert_eq!(&texture.pixels()[12..16], &[0, 0, 255, 255]);
}

#[test]
fn test_corrupt_file_is_image_error() {
    let path = temp_path("corrupt.png");
    std::fs::write(&path, b"not a png").expect("write corrupt file");

    let result = TextureData::from_file(&path);
    std::fs::remove_file(&path).ok();

    assert!(matches!(result, Err(ResourceError::Image(_))));
}

#[test]
fn test_missing_file_names_path() {
    let path = temp_path("missing.png");
    match TextureData::from_file(&path) {
        Err(ResourceError::FileNotFound(reported)) => assert_eq!(reported, path),
        other => panic!("expected FileNotFound, got {:?}", other),
    }
}

#[test]
fn test_textured_quad_with_loaded_texture() {
    let texture = TextureData::solid(4, 4, [255; 4]).unwrap();
    let quad = MeshData::quad();
    assert_eq!(quad.submeshes[0].material, SubMeshMaterial::Texture(0));
    assert!(quad.validate(std::slice::from_ref(&texture).len()).is_ok());
}
