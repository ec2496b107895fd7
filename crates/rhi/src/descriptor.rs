//! Resource binding layer: descriptor set layouts, pools and writers.
//!
//! The pieces form an ownership chain:
//!
//! - [`DescriptorSetLayoutBuilder`] collects bindings into an immutable
//!   [`LayoutBindings`] and, with a device, a [`DescriptorSetLayout`].
//! - [`DescriptorPoolBuilder`] produces a fixed-capacity [`DescriptorPool`].
//! - [`DescriptorWriter`] borrows one layout and one pool, validates every
//!   write against the layout, then allocates a set and applies the writes.
//!
//! Contract violations (unknown binding, wrong kind, wrong array count) are
//! rejected before anything reaches the GPU. Running out of pool capacity is
//! reported as [`RhiError::PoolExhausted`] so callers can rebuild a larger pool.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use ember_rhi::device::Device;
//! use ember_rhi::descriptor::{DescriptorPoolBuilder, DescriptorSetLayoutBuilder, DescriptorWriter};
//!
//! # fn example(device: Arc<Device>, ubo: vk::Buffer) -> Result<(), ember_rhi::RhiError> {
//! let layout = DescriptorSetLayoutBuilder::new()
//!     .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::ALL_GRAPHICS, 1)
//!     .build(device.clone())?;
//!
//! let pool = DescriptorPoolBuilder::new()
//!     .max_sets(2)
//!     .add_pool_size(vk::DescriptorType::UNIFORM_BUFFER, 2)
//!     .build(device)?;
//!
//! let mut writer = DescriptorWriter::new(&layout, &pool);
//! writer.write_buffer(0, ember_rhi::descriptor::buffer_info(ubo, 0, vk::WHOLE_SIZE))?;
//! let set = writer.build()?;
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use ash::vk;
use tracing::{debug, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Default set capacity for pools that do not call [`DescriptorPoolBuilder::max_sets`].
pub const DEFAULT_MAX_SETS: u32 = 1000;

/// What a single binding slot holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BindingInfo {
    pub kind: vk::DescriptorType,
    pub stages: vk::ShaderStageFlags,
    pub count: u32,
}

/// Descriptor kinds written with buffer infos.
pub fn is_buffer_kind(kind: vk::DescriptorType) -> bool {
    matches!(
        kind,
        vk::DescriptorType::UNIFORM_BUFFER
            | vk::DescriptorType::STORAGE_BUFFER
            | vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
            | vk::DescriptorType::STORAGE_BUFFER_DYNAMIC
    )
}

/// Descriptor kinds written with image infos.
pub fn is_image_kind(kind: vk::DescriptorType) -> bool {
    matches!(
        kind,
        vk::DescriptorType::COMBINED_IMAGE_SAMPLER
            | vk::DescriptorType::SAMPLED_IMAGE
            | vk::DescriptorType::STORAGE_IMAGE
            | vk::DescriptorType::SAMPLER
            | vk::DescriptorType::INPUT_ATTACHMENT
    )
}

/// Immutable mapping from binding number to [`BindingInfo`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LayoutBindings {
    bindings: BTreeMap<u32, BindingInfo>,
}

impl LayoutBindings {
    /// Looks up a binding by number.
    pub fn get(&self, binding: u32) -> Option<&BindingInfo> {
        self.bindings.get(&binding)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Bindings in ascending binding-number order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &BindingInfo)> {
        self.bindings.iter().map(|(&b, info)| (b, info))
    }

    /// Total descriptors of each kind one set of this layout consumes.
    pub fn descriptor_totals(&self) -> HashMap<vk::DescriptorType, u32> {
        let mut totals = HashMap::new();
        for info in self.bindings.values() {
            *totals.entry(info.kind).or_insert(0) += info.count;
        }
        totals
    }

    /// Checks that `binding` exists, holds a buffer kind and a single descriptor.
    pub fn validate_buffer_write(&self, binding: u32) -> RhiResult<&BindingInfo> {
        let info = self.lookup(binding)?;
        if !is_buffer_kind(info.kind) {
            return Err(RhiError::BindingViolation(format!(
                "binding {} is {:?}, not a buffer",
                binding, info.kind
            )));
        }
        if info.count != 1 {
            return Err(RhiError::BindingViolation(format!(
                "binding {} declares {} descriptors, buffer writes bind exactly one",
                binding, info.count
            )));
        }
        Ok(info)
    }

    /// Checks that `binding` exists, holds an image kind and exactly `count` descriptors.
    pub fn validate_image_write(&self, binding: u32, count: usize) -> RhiResult<&BindingInfo> {
        let info = self.lookup(binding)?;
        if !is_image_kind(info.kind) {
            return Err(RhiError::BindingViolation(format!(
                "binding {} is {:?}, not an image",
                binding, info.kind
            )));
        }
        if info.count as usize != count {
            return Err(RhiError::BindingViolation(format!(
                "binding {} declares {} descriptors but {} were supplied",
                binding, info.count, count
            )));
        }
        Ok(info)
    }

    fn lookup(&self, binding: u32) -> RhiResult<&BindingInfo> {
        self.get(binding).ok_or_else(|| {
            RhiError::BindingViolation(format!("binding {} is not in the layout", binding))
        })
    }

    fn to_vk(&self) -> Vec<vk::DescriptorSetLayoutBinding<'static>> {
        self.bindings
            .iter()
            .map(|(&binding, info)| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding)
                    .descriptor_type(info.kind)
                    .descriptor_count(info.count)
                    .stage_flags(info.stages)
            })
            .collect()
    }
}

/// Accumulates bindings for a descriptor set layout.
///
/// A repeated binding number is remembered and reported when the builder is
/// finished, so calls can be chained.
#[derive(Debug, Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: BTreeMap<u32, BindingInfo>,
    duplicate: Option<u32>,
}

impl DescriptorSetLayoutBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `binding` with `count` descriptors of `kind`, visible to `stages`.
    pub fn add_binding(
        mut self,
        binding: u32,
        kind: vk::DescriptorType,
        stages: vk::ShaderStageFlags,
        count: u32,
    ) -> Self {
        if self.bindings.contains_key(&binding) {
            self.duplicate.get_or_insert(binding);
        } else {
            self.bindings.insert(
                binding,
                BindingInfo {
                    kind,
                    stages,
                    count,
                },
            );
        }
        self
    }

    /// Finishes the builder without touching the GPU.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DuplicateBinding`] for the first repeated binding number.
    pub fn build_bindings(self) -> RhiResult<LayoutBindings> {
        if let Some(binding) = self.duplicate {
            return Err(RhiError::DuplicateBinding(binding));
        }
        Ok(LayoutBindings {
            bindings: self.bindings,
        })
    }

    /// Finishes the builder and creates the Vulkan layout.
    pub fn build(self, device: Arc<Device>) -> RhiResult<DescriptorSetLayout> {
        DescriptorSetLayout::new(device, self.build_bindings()?)
    }
}

/// Vulkan descriptor set layout with its binding table.
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
    bindings: LayoutBindings,
}

impl DescriptorSetLayout {
    /// Creates a layout from a finished binding table.
    pub fn new(device: Arc<Device>, bindings: LayoutBindings) -> RhiResult<Self> {
        let vk_bindings = bindings.to_vk();
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&vk_bindings);

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!(
            "Created descriptor set layout with {} binding(s)",
            bindings.len()
        );

        Ok(Self {
            device,
            layout,
            bindings,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    #[inline]
    pub fn bindings(&self) -> &LayoutBindings {
        &self.bindings
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
        debug!("Destroyed descriptor set layout");
    }
}

/// Declared pool capacity and what has been handed out so far.
///
/// Drivers may over-allocate silently, so the pool enforces its declared
/// ceiling on the CPU side as well.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolBudget {
    max_sets: u32,
    capacity: HashMap<vk::DescriptorType, u32>,
    sets_in_use: u32,
    in_use: HashMap<vk::DescriptorType, u32>,
}

impl PoolBudget {
    pub fn new(max_sets: u32, pool_sizes: &[vk::DescriptorPoolSize]) -> Self {
        let mut capacity = HashMap::new();
        for size in pool_sizes {
            *capacity.entry(size.ty).or_insert(0) += size.descriptor_count;
        }
        Self {
            max_sets,
            capacity,
            sets_in_use: 0,
            in_use: HashMap::new(),
        }
    }

    /// Claims room for one set of `layout`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PoolExhausted`] and leaves the budget untouched when the
    /// set count or any descriptor kind would exceed capacity.
    pub fn reserve(&mut self, layout: &LayoutBindings) -> RhiResult<()> {
        if self.sets_in_use >= self.max_sets {
            return Err(RhiError::PoolExhausted);
        }
        let totals = layout.descriptor_totals();
        for (kind, needed) in &totals {
            let capacity = self.capacity.get(kind).copied().unwrap_or(0);
            let used = self.in_use.get(kind).copied().unwrap_or(0);
            if used + needed > capacity {
                return Err(RhiError::PoolExhausted);
            }
        }

        self.sets_in_use += 1;
        for (kind, needed) in totals {
            *self.in_use.entry(kind).or_insert(0) += needed;
        }
        Ok(())
    }

    /// Returns one set of `layout` to the budget.
    pub fn release(&mut self, layout: &LayoutBindings) {
        self.sets_in_use = self.sets_in_use.saturating_sub(1);
        for (kind, count) in layout.descriptor_totals() {
            if let Some(used) = self.in_use.get_mut(&kind) {
                *used = used.saturating_sub(count);
            }
        }
    }

    /// Forgets every allocation.
    pub fn clear(&mut self) {
        self.sets_in_use = 0;
        self.in_use.clear();
    }

    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }

    pub fn sets_in_use(&self) -> u32 {
        self.sets_in_use
    }
}

/// Builds a [`DescriptorPool`].
#[derive(Debug)]
pub struct DescriptorPoolBuilder {
    max_sets: u32,
    pool_sizes: Vec<vk::DescriptorPoolSize>,
    flags: vk::DescriptorPoolCreateFlags,
}

impl Default for DescriptorPoolBuilder {
    fn default() -> Self {
        Self {
            max_sets: DEFAULT_MAX_SETS,
            pool_sizes: Vec::new(),
            flags: vk::DescriptorPoolCreateFlags::empty(),
        }
    }
}

impl DescriptorPoolBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds room for `count` descriptors of `kind`.
    pub fn add_pool_size(mut self, kind: vk::DescriptorType, count: u32) -> Self {
        self.pool_sizes.push(
            vk::DescriptorPoolSize::default()
                .ty(kind)
                .descriptor_count(count),
        );
        self
    }

    pub fn pool_flags(mut self, flags: vk::DescriptorPoolCreateFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn max_sets(mut self, max_sets: u32) -> Self {
        self.max_sets = max_sets;
        self
    }

    /// The capacity the built pool will enforce, for sizing checks without a device.
    pub fn budget(&self) -> PoolBudget {
        PoolBudget::new(self.max_sets, &self.pool_sizes)
    }

    pub fn build(self, device: Arc<Device>) -> RhiResult<DescriptorPool> {
        DescriptorPool::new(device, self.max_sets, &self.pool_sizes, self.flags)
    }
}

/// Fixed-capacity descriptor pool.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
    flags: vk::DescriptorPoolCreateFlags,
    budget: Mutex<PoolBudget>,
}

impl DescriptorPool {
    /// Creates a pool holding at most `max_sets` sets and the given descriptors.
    pub fn new(
        device: Arc<Device>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
        flags: vk::DescriptorPoolCreateFlags,
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes)
            .flags(flags);

        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };

        debug!(
            "Created descriptor pool: max_sets={}, pool_sizes={}",
            max_sets,
            pool_sizes.len()
        );

        Ok(Self {
            device,
            pool,
            flags,
            budget: Mutex::new(PoolBudget::new(max_sets, pool_sizes)),
        })
    }

    /// Allocates one set of `layout`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PoolExhausted`] when the pool is out of room. Other
    /// Vulkan failures are returned unchanged.
    pub fn allocate(&self, layout: &DescriptorSetLayout) -> RhiResult<vk::DescriptorSet> {
        let mut budget = self.lock_budget()?;
        if let Err(e) = budget.reserve(layout.bindings()) {
            warn!(
                "Descriptor pool exhausted ({} of {} sets in use)",
                budget.sets_in_use(),
                budget.max_sets()
            );
            return Err(e);
        }

        let layouts = [layout.handle()];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        match unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info) } {
            Ok(sets) => Ok(sets[0]),
            Err(e) => {
                budget.release(layout.bindings());
                Err(map_allocation_error(e))
            }
        }
    }

    /// Frees sets that were allocated with `layout`.
    ///
    /// The pool must have been created with `FREE_DESCRIPTOR_SET` and the sets
    /// must no longer be in use by the GPU.
    pub fn free(&self, layout: &DescriptorSetLayout, sets: &[vk::DescriptorSet]) -> RhiResult<()> {
        if !self
            .flags
            .contains(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
        {
            return Err(RhiError::InvalidHandle(
                "descriptor pool was not created with FREE_DESCRIPTOR_SET".to_string(),
            ));
        }

        unsafe {
            self.device.handle().free_descriptor_sets(self.pool, sets)?;
        }
        let mut budget = self.lock_budget()?;
        for _ in sets {
            budget.release(layout.bindings());
        }
        debug!("Freed {} descriptor set(s)", sets.len());
        Ok(())
    }

    /// Returns every set to the pool. No set from this pool may be in use by the GPU.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .reset_descriptor_pool(self.pool, vk::DescriptorPoolResetFlags::empty())?;
        }
        self.lock_budget()?.clear();
        debug!("Reset descriptor pool");
        Ok(())
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    fn lock_budget(&self) -> RhiResult<std::sync::MutexGuard<'_, PoolBudget>> {
        self.budget
            .lock()
            .map_err(|_| RhiError::InvalidHandle("descriptor pool budget poisoned".to_string()))
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
        debug!("Destroyed descriptor pool");
    }
}

/// Maps pool-capacity failures to [`RhiError::PoolExhausted`].
pub fn map_allocation_error(result: vk::Result) -> RhiError {
    match result {
        vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL => {
            RhiError::PoolExhausted
        }
        other => RhiError::VulkanError(other),
    }
}

#[derive(Clone, Debug)]
enum PendingResource {
    Buffer(vk::DescriptorBufferInfo),
    Images(Vec<vk::DescriptorImageInfo>),
}

#[derive(Clone, Debug)]
struct PendingWrite {
    binding: u32,
    kind: vk::DescriptorType,
    resource: PendingResource,
}

/// Validated writes waiting to be applied to a descriptor set.
#[derive(Clone, Debug)]
pub struct DescriptorWrites<'a> {
    bindings: &'a LayoutBindings,
    writes: Vec<PendingWrite>,
}

impl<'a> DescriptorWrites<'a> {
    pub fn new(bindings: &'a LayoutBindings) -> Self {
        Self {
            bindings,
            writes: Vec::new(),
        }
    }

    /// Queues a buffer for `binding`.
    pub fn write_buffer(
        &mut self,
        binding: u32,
        info: vk::DescriptorBufferInfo,
    ) -> RhiResult<&mut Self> {
        let kind = self.bindings.validate_buffer_write(binding)?.kind;
        self.writes.push(PendingWrite {
            binding,
            kind,
            resource: PendingResource::Buffer(info),
        });
        Ok(self)
    }

    /// Queues one image per array element of `binding`.
    pub fn write_images(
        &mut self,
        binding: u32,
        infos: &[vk::DescriptorImageInfo],
    ) -> RhiResult<&mut Self> {
        let kind = self.bindings.validate_image_write(binding, infos.len())?.kind;
        self.writes.push(PendingWrite {
            binding,
            kind,
            resource: PendingResource::Images(infos.to_vec()),
        });
        Ok(self)
    }

    /// Number of queued writes.
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Bindings touched by the queued writes, in queue order.
    pub fn bindings_written(&self) -> Vec<u32> {
        self.writes.iter().map(|w| w.binding).collect()
    }

    fn apply(&self, device: &Device, set: vk::DescriptorSet) {
        let writes: Vec<vk::WriteDescriptorSet<'_>> = self
            .writes
            .iter()
            .map(|pending| {
                let write = vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(pending.binding)
                    .descriptor_type(pending.kind);
                match &pending.resource {
                    PendingResource::Buffer(info) => {
                        write.buffer_info(std::slice::from_ref(info))
                    }
                    PendingResource::Images(infos) => write.image_info(infos),
                }
            })
            .collect();

        if !writes.is_empty() {
            unsafe { device.handle().update_descriptor_sets(&writes, &[]) };
        }
    }
}

/// Short-lived writer borrowing a layout and a pool.
pub struct DescriptorWriter<'a> {
    layout: &'a DescriptorSetLayout,
    pool: &'a DescriptorPool,
    writes: DescriptorWrites<'a>,
}

impl<'a> DescriptorWriter<'a> {
    pub fn new(layout: &'a DescriptorSetLayout, pool: &'a DescriptorPool) -> Self {
        Self {
            layout,
            pool,
            writes: DescriptorWrites::new(layout.bindings()),
        }
    }

    /// See [`DescriptorWrites::write_buffer`].
    pub fn write_buffer(
        &mut self,
        binding: u32,
        info: vk::DescriptorBufferInfo,
    ) -> RhiResult<&mut Self> {
        self.writes.write_buffer(binding, info)?;
        Ok(self)
    }

    /// See [`DescriptorWrites::write_images`].
    pub fn write_images(
        &mut self,
        binding: u32,
        infos: &[vk::DescriptorImageInfo],
    ) -> RhiResult<&mut Self> {
        self.writes.write_images(binding, infos)?;
        Ok(self)
    }

    /// Allocates a set from the pool and applies the queued writes to it.
    pub fn build(&self) -> RhiResult<vk::DescriptorSet> {
        let set = self.pool.allocate(self.layout)?;
        self.overwrite(set);
        Ok(set)
    }

    /// Re-applies the queued writes to an existing set.
    ///
    /// The set must not be in use by the GPU.
    pub fn overwrite(&self, set: vk::DescriptorSet) {
        self.writes.apply(&self.pool.device, set);
    }
}

/// Builds a buffer info covering `range` bytes from `offset`.
#[inline]
pub fn buffer_info(
    buffer: vk::Buffer,
    offset: vk::DeviceSize,
    range: vk::DeviceSize,
) -> vk::DescriptorBufferInfo {
    vk::DescriptorBufferInfo::default()
        .buffer(buffer)
        .offset(offset)
        .range(range)
}

/// Builds an image info for a sampled image.
#[inline]
pub fn image_info(
    sampler: vk::Sampler,
    image_view: vk::ImageView,
    image_layout: vk::ImageLayout,
) -> vk::DescriptorImageInfo {
    vk::DescriptorImageInfo::default()
        .sampler(sampler)
        .image_view(image_view)
        .image_layout(image_layout)
}

/// Tracks the array length a texture-array layout was last built for.
///
/// A render pass whose bound image count follows the scene compares the
/// current count every frame and rebuilds its layout, pool and sets whenever
/// the count differs from the built one, growing or shrinking.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextureArrayTracker {
    built: Option<u32>,
}

impl TextureArrayTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if nothing has been built yet or `current` differs from the built count.
    pub fn needs_rebuild(&self, current: u32) -> bool {
        self.built != Some(current)
    }

    /// Records a finished rebuild for `count` array elements.
    pub fn mark_built(&mut self, count: u32) {
        self.built = Some(count);
    }

    /// The array length of the current layout.
    pub fn built_count(&self) -> Option<u32> {
        self.built
    }

    /// Checks that draws referencing `count` textures match the built layout.
    pub fn check_bound(&self, count: u32) -> RhiResult<()> {
        match self.built {
            Some(built) if built == count => Ok(()),
            Some(built) => Err(RhiError::BindingViolation(format!(
                "texture array built for {} elements, draws reference {}",
                built, count
            ))),
            None => Err(RhiError::BindingViolation(
                "texture array layout has not been built".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global_layout(texture_count: u32) -> LayoutBindings {
        DescriptorSetLayoutBuilder::new()
            .add_binding(
                0,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                1,
            )
            .add_binding(
                1,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                vk::ShaderStageFlags::FRAGMENT,
                texture_count,
            )
            .build_bindings()
            .unwrap()
    }

    #[test]
    fn test_layout_round_trip() {
        let layout = global_layout(4);

        assert_eq!(layout.len(), 2);
        assert_eq!(
            layout.get(0),
            Some(&BindingInfo {
                kind: vk::DescriptorType::UNIFORM_BUFFER,
                stages: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                count: 1,
            })
        );
        assert_eq!(
            layout.get(1),
            Some(&BindingInfo {
                kind: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                stages: vk::ShaderStageFlags::FRAGMENT,
                count: 4,
            })
        );
        assert_eq!(layout.get(2), None);
    }

    #[test]
    fn test_duplicate_binding_rejected() {
        let result = DescriptorSetLayoutBuilder::new()
            .add_binding(
                0,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::ShaderStageFlags::VERTEX,
                1,
            )
            .add_binding(
                0,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                vk::ShaderStageFlags::FRAGMENT,
                1,
            )
            .build_bindings();
        assert!(matches!(result, Err(RhiError::DuplicateBinding(0))));
    }

    #[test]
    fn test_vk_bindings_sorted() {
        let layout = DescriptorSetLayoutBuilder::new()
            .add_binding(
                3,
                vk::DescriptorType::STORAGE_BUFFER,
                vk::ShaderStageFlags::COMPUTE,
                1,
            )
            .add_binding(
                1,
                vk::DescriptorType::UNIFORM_BUFFER,
                vk::ShaderStageFlags::VERTEX,
                1,
            )
            .build_bindings()
            .unwrap();
        let vk_bindings = layout.to_vk();
        assert_eq!(vk_bindings[0].binding, 1);
        assert_eq!(vk_bindings[1].binding, 3);
        assert_eq!(
            vk_bindings[1].descriptor_type,
            vk::DescriptorType::STORAGE_BUFFER
        );
    }

    #[test]
    fn test_write_unknown_binding_rejected() {
        let layout = global_layout(2);
        let mut writes = DescriptorWrites::new(&layout);
        let result = writes.write_buffer(7, buffer_info(vk::Buffer::null(), 0, vk::WHOLE_SIZE));
        assert!(matches!(result, Err(RhiError::BindingViolation(_))));
        assert!(writes.is_empty());
    }

    #[test]
    fn test_write_kind_mismatch_rejected() {
        let layout = global_layout(2);
        let mut writes = DescriptorWrites::new(&layout);
        assert!(
            writes
                .write_buffer(1, buffer_info(vk::Buffer::null(), 0, 64))
                .is_err()
        );
        let image = image_info(
            vk::Sampler::null(),
            vk::ImageView::null(),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        assert!(writes.write_images(0, &[image]).is_err());
        assert!(writes.is_empty());
    }

    #[test]
    fn test_write_image_count_must_match() {
        let layout = global_layout(2);
        let image = image_info(
            vk::Sampler::null(),
            vk::ImageView::null(),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );

        let mut writes = DescriptorWrites::new(&layout);
        assert!(matches!(
            writes.write_images(1, &[image; 3]),
            Err(RhiError::BindingViolation(_))
        ));

        writes
            .write_buffer(0, buffer_info(vk::Buffer::null(), 0, vk::WHOLE_SIZE))
            .unwrap()
            .write_images(1, &[image; 2])
            .unwrap();
        assert_eq!(writes.bindings_written(), vec![0, 1]);
    }

    #[test]
    fn test_pool_budget_set_ceiling() {
        let layout = global_layout(1);
        let sizes = [
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(10),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(10),
        ];
        let mut budget = PoolBudget::new(2, &sizes);

        budget.reserve(&layout).unwrap();
        budget.reserve(&layout).unwrap();
        assert!(matches!(
            budget.reserve(&layout),
            Err(RhiError::PoolExhausted)
        ));

        budget.release(&layout);
        assert!(budget.reserve(&layout).is_ok());
    }

    #[test]
    fn test_pool_budget_descriptor_ceiling() {
        let layout = global_layout(3);
        let sizes = [
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(2),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(2),
        ];
        let mut budget = PoolBudget::new(10, &sizes);
        let before = budget.clone();

        assert!(matches!(
            budget.reserve(&layout),
            Err(RhiError::PoolExhausted)
        ));
        assert_eq!(budget, before);

        budget.clear();
        assert_eq!(budget.sets_in_use(), 0);
    }

    #[test]
    fn test_pool_builder_budget_matches_sizes() {
        let layout = global_layout(2);
        let mut budget = DescriptorPoolBuilder::new()
            .max_sets(3)
            .add_pool_size(vk::DescriptorType::UNIFORM_BUFFER, 3)
            .add_pool_size(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 4)
            .budget();

        assert_eq!(budget.max_sets(), 3);
        budget.reserve(&layout).unwrap();
        budget.reserve(&layout).unwrap();
        // Set room remains, but the samplers are used up.
        assert!(matches!(
            budget.reserve(&layout),
            Err(RhiError::PoolExhausted)
        ));
        assert_eq!(budget.sets_in_use(), 2);
    }

    #[test]
    fn test_allocation_error_mapping() {
        assert!(matches!(
            map_allocation_error(vk::Result::ERROR_OUT_OF_POOL_MEMORY),
            RhiError::PoolExhausted
        ));
        assert!(matches!(
            map_allocation_error(vk::Result::ERROR_FRAGMENTED_POOL),
            RhiError::PoolExhausted
        ));
        assert!(matches!(
            map_allocation_error(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
            RhiError::VulkanError(_)
        ));
    }

    #[test]
    fn test_texture_array_rebuild_on_growth() {
        let mut tracker = TextureArrayTracker::new();
        assert!(tracker.needs_rebuild(2));
        tracker.mark_built(2);
        assert!(!tracker.needs_rebuild(2));
        assert!(tracker.check_bound(2).is_ok());

        // A third textured object appears.
        assert!(tracker.needs_rebuild(3));
        assert!(matches!(
            tracker.check_bound(3),
            Err(RhiError::BindingViolation(_))
        ));

        let rebuilt = global_layout(3);
        assert_eq!(rebuilt.get(1).map(|b| b.count), Some(3));
        tracker.mark_built(3);
        assert!(tracker.check_bound(3).is_ok());
        assert_eq!(tracker.built_count(), Some(3));
    }

    #[test]
    fn test_texture_array_rebuild_on_shrink() {
        let mut tracker = TextureArrayTracker::new();
        tracker.mark_built(3);
        assert!(tracker.needs_rebuild(2));
        assert!(tracker.check_bound(2).is_err());
    }

    #[test]
    fn test_unbuilt_tracker_rejects_draws() {
        let tracker = TextureArrayTracker::new();
        assert!(tracker.check_bound(0).is_err());
    }
}
