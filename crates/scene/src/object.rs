//! Scene objects and the id-keyed store that owns them.
//!
//! Objects carry optional capabilities (a shared mesh, a point light) as plain
//! `Option` fields. Render passes select the objects they draw by filtering
//! on those fields.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use glam::Vec3;
use tracing::debug;

use crate::transform::TransformComponent;

/// Unique object identifier. Never reissued within a [`Scene`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u64);

impl ObjectId {
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic id source.
///
/// The counter is 64-bit: at a million objects per second it would take over
/// half a million years to run out, so exhaustion is not handled.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next id and advances the counter.
    pub fn next(&mut self) -> ObjectId {
        let id = ObjectId(self.next);
        self.next += 1;
        id
    }

    /// The id the next call to [`IdAllocator::next`] will return.
    pub fn peek(&self) -> ObjectId {
        ObjectId(self.next)
    }
}

/// Point light capability.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointLightComponent {
    pub intensity: f32,
}

impl Default for PointLightComponent {
    fn default() -> Self {
        Self { intensity: 1.0 }
    }
}

/// An object in the scene, generic over the mesh type it may share.
#[derive(Debug)]
pub struct SceneObject<M> {
    id: ObjectId,
    name: String,
    pub color: Vec3,
    pub transform: TransformComponent,
    pub mesh: Option<Arc<M>>,
    pub point_light: Option<PointLightComponent>,
}

impl<M> SceneObject<M> {
    fn new(id: ObjectId, prefix: &str) -> Self {
        Self {
            id,
            name: format!("{}{}", prefix, id),
            color: Vec3::ZERO,
            transform: TransformComponent::default(),
            mesh: None,
            point_light: None,
        }
    }

    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Billboard radius of a point light, stored in `scale.x`.
    #[inline]
    pub fn light_radius(&self) -> f32 {
        self.transform.scale.x
    }
}

/// Id-keyed object store.
///
/// Iteration order is unspecified except where a method says otherwise.
#[derive(Debug)]
pub struct Scene<M> {
    objects: HashMap<ObjectId, SceneObject<M>>,
    ids: IdAllocator,
}

impl<M> Default for Scene<M> {
    fn default() -> Self {
        Self {
            objects: HashMap::new(),
            ids: IdAllocator::new(),
        }
    }
}

impl<M> Scene<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an empty object named `Object{id}`.
    pub fn create_object(&mut self) -> &mut SceneObject<M> {
        let object = SceneObject::new(self.ids.next(), "Object");
        self.insert(object)
    }

    /// Inserts a point light named `PointLight{id}` with no mesh.
    ///
    /// The billboard radius is kept in `transform.scale.x`.
    pub fn create_point_light(
        &mut self,
        intensity: f32,
        radius: f32,
        color: Vec3,
    ) -> &mut SceneObject<M> {
        let mut object = SceneObject::new(self.ids.next(), "PointLight");
        object.color = color;
        object.transform.scale.x = radius;
        object.point_light = Some(PointLightComponent { intensity });
        self.insert(object)
    }

    fn insert(&mut self, object: SceneObject<M>) -> &mut SceneObject<M> {
        let id = object.id;
        debug!("Created scene object {}", object.name);
        self.objects.entry(id).or_insert(object)
    }

    pub fn get(&self, id: ObjectId) -> Option<&SceneObject<M>> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut SceneObject<M>> {
        self.objects.get_mut(&id)
    }

    /// Removes and returns the object. Its id is not reissued.
    pub fn remove(&mut self, id: ObjectId) -> Option<SceneObject<M>> {
        let removed = self.objects.remove(&id);
        if let Some(object) = &removed {
            debug!("Removed scene object {}", object.name);
        }
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = &SceneObject<M>> {
        self.objects.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SceneObject<M>> {
        self.objects.values_mut()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// The id the next created object will get.
    pub fn next_id(&self) -> ObjectId {
        self.ids.peek()
    }

    /// Objects with a mesh, ascending by id.
    pub fn meshes(&self) -> Vec<&SceneObject<M>> {
        self.sorted_by_id(|o| o.mesh.is_some())
    }

    /// Objects with a point light, ascending by id.
    pub fn point_lights(&self) -> Vec<&SceneObject<M>> {
        self.sorted_by_id(|o| o.point_light.is_some())
    }

    /// Mutable access to point-light objects, ascending by id.
    pub fn point_lights_mut(&mut self) -> Vec<&mut SceneObject<M>> {
        let mut lights: Vec<_> = self
            .objects
            .values_mut()
            .filter(|o| o.point_light.is_some())
            .collect();
        lights.sort_by_key(|o| o.id);
        lights
    }

    /// Point-light ids ordered far to near from `camera_position`.
    ///
    /// Ties in squared distance are broken by ascending id.
    pub fn sort_back_to_front(&self, camera_position: Vec3) -> Vec<ObjectId> {
        let mut keyed: Vec<(f32, ObjectId)> = self
            .objects
            .values()
            .filter(|o| o.point_light.is_some())
            .map(|o| {
                let offset = camera_position - o.transform.translation;
                (offset.length_squared(), o.id)
            })
            .collect();

        keyed.sort_by(|(da, ia), (db, ib)| db.total_cmp(da).then(ia.cmp(ib)));
        keyed.into_iter().map(|(_, id)| id).collect()
    }

    fn sorted_by_id(&self, filter: impl Fn(&SceneObject<M>) -> bool) -> Vec<&SceneObject<M>> {
        let mut selected: Vec<_> = self.objects.values().filter(|o| filter(o)).collect();
        selected.sort_by_key(|o| o.id);
        selected
    }
}
