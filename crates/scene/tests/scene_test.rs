//! Scene store behavior through the public API.

use std::collections::HashSet;
use std::f32::consts::TAU;
use std::sync::Arc;

use ember_scene::{Camera, Scene, WORLD_UP};
use glam::Vec3;

struct Mesh;

#[test]
fn test_ids_unique_across_create_and_remove() {
    let mut scene: Scene<Mesh> = Scene::new();
    let mut seen = HashSet::new();

    for round in 0..10 {
        let id = scene.create_object().id();
        assert!(seen.insert(id), "id {} issued twice", id);
        let light = scene.create_point_light(1.0, 0.1, Vec3::ONE).id();
        assert!(seen.insert(light), "id {} issued twice", light);
        if round % 2 == 0 {
            scene.remove(id);
        }
    }

    assert_eq!(seen.len(), 20);
    assert_eq!(scene.len(), 15);
    assert_eq!(scene.next_id().raw(), 20);
}

#[test]
fn test_meshes_are_shared() {
    let mut scene: Scene<Mesh> = Scene::new();
    let mesh = Arc::new(Mesh);
    for _ in 0..3 {
        scene.create_object().mesh = Some(mesh.clone());
    }
    assert_eq!(Arc::strong_count(&mesh), 4);

    let ids: Vec<_> = scene.meshes().iter().map(|o| o.id()).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);
}

#[test]
fn test_lights_sorted_from_camera_position() {
    let mut scene: Scene<Mesh> = Scene::new();
    let mut camera = Camera::new();
    camera.set_view_target(Vec3::new(0.0, 0.0, -10.0), Vec3::ZERO, WORLD_UP);

    let count = 6;
    let mut ids = Vec::new();
    for i in 0..count {
        let angle = i as f32 * TAU / count as f32;
        let light = scene.create_point_light(1.0, 0.1, Vec3::ONE);
        light.transform.translation = Vec3::new(angle.sin(), -1.0, angle.cos()) * 2.0;
        ids.push(light.id());
    }

    let order = scene.sort_back_to_front(camera.position());
    assert_eq!(order.len(), count);

    let distance = |id| {
        let object = scene.get(id).unwrap();
        (object.transform.translation - camera.position()).length_squared()
    };
    for pair in order.windows(2) {
        assert!(distance(pair[0]) >= distance(pair[1]));
    }
}
