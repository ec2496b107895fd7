//! Frame pacing: slot rotation and the acquire/present protocol.
//!
//! [`FrameSequencer`] owns the frame-in-flight index. [`FrameDriver`] drives a
//! [`SurfaceTarget`] through acquire, present and recreation, and never
//! rebuilds a chain for a zero-area surface.

use ash::vk;
use tracing::{debug, trace};

use ember_rhi::swapchain::{SurfaceStatus, is_zero_extent};
use ember_rhi::RhiResult;

use crate::error::{RendererError, RendererResult};
use crate::MAX_FRAMES_IN_FLIGHT;

/// Tracks which frame slot is current and whether a frame is being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSequencer {
    slot_count: usize,
    current_slot: usize,
    frame_started: bool,
}

impl Default for FrameSequencer {
    fn default() -> Self {
        Self::new(MAX_FRAMES_IN_FLIGHT)
    }
}

impl FrameSequencer {
    /// A sequencer cycling through `slot_count` slots (at least one).
    pub fn new(slot_count: usize) -> Self {
        Self {
            slot_count: slot_count.max(1),
            current_slot: 0,
            frame_started: false,
        }
    }

    #[inline]
    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    #[inline]
    pub fn is_frame_started(&self) -> bool {
        self.frame_started
    }

    pub fn begin(&mut self) -> RendererResult<()> {
        if self.frame_started {
            return Err(RendererError::FrameAlreadyStarted);
        }
        self.frame_started = true;
        Ok(())
    }

    /// Finishes the frame and moves to the next slot.
    pub fn end(&mut self) -> RendererResult<()> {
        if !self.frame_started {
            return Err(RendererError::FrameNotStarted);
        }
        self.frame_started = false;
        self.current_slot = (self.current_slot + 1) % self.slot_count;
        Ok(())
    }

    /// Drops an in-progress frame without advancing the slot.
    pub fn abort(&mut self) {
        self.frame_started = false;
    }
}

/// A presentation chain as seen by the frame protocol.
///
/// `slot` is the frame-in-flight index; implementations keep their per-slot
/// synchronization keyed by it.
pub trait SurfaceTarget {
    /// Extent of the current chain.
    fn extent(&self) -> vk::Extent2D;

    fn image_count(&self) -> u32;

    fn format(&self) -> vk::Format;

    /// Waits until `slot` is free, then acquires an image.
    ///
    /// `(None, Stale)` means the chain is out of date and nothing was acquired.
    fn acquire(&mut self, slot: usize) -> RhiResult<(Option<u32>, SurfaceStatus)>;

    /// Presents `image_index` once the work submitted for `slot` finishes.
    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<SurfaceStatus>;

    /// Gives back `image_index` unpresented after the frame for `slot` was
    /// abandoned. `slot` must be ready to acquire again afterwards.
    fn release(&mut self, slot: usize, image_index: u32) -> RhiResult<()>;

    /// Rebuilds the chain. `extent` is never zero.
    ///
    /// Returns `false` and keeps the old chain when the surface itself
    /// reports zero area, which can happen before the resize event arrives.
    fn recreate(&mut self, extent: vk::Extent2D) -> RhiResult<bool>;
}

/// Runs the begin/end frame protocol over a [`SurfaceTarget`].
pub struct FrameDriver<T> {
    target: T,
    sequencer: FrameSequencer,
    requested_extent: vk::Extent2D,
    stale: bool,
    image_index: Option<u32>,
}

impl<T: SurfaceTarget> FrameDriver<T> {
    pub fn new(target: T) -> Self {
        Self::with_slots(target, MAX_FRAMES_IN_FLIGHT)
    }

    pub fn with_slots(target: T, slot_count: usize) -> Self {
        let requested_extent = target.extent();
        Self {
            target,
            sequencer: FrameSequencer::new(slot_count),
            requested_extent,
            stale: false,
            image_index: None,
        }
    }

    #[inline]
    pub fn target(&self) -> &T {
        &self.target
    }

    #[inline]
    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    #[inline]
    pub fn current_slot(&self) -> usize {
        self.sequencer.current_slot()
    }

    #[inline]
    pub fn is_frame_started(&self) -> bool {
        self.sequencer.is_frame_started()
    }

    /// Image acquired by the frame in progress.
    #[inline]
    pub fn image_index(&self) -> Option<u32> {
        self.image_index
    }

    /// True while the chain needs recreating before it can be used.
    #[inline]
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Records a new surface size. The chain is rebuilt at the next frame boundary.
    pub fn resize(&mut self, extent: vk::Extent2D) {
        if extent != self.requested_extent || extent != self.target.extent() {
            debug!("Surface resized to {}x{}", extent.width, extent.height);
            self.requested_extent = extent;
            self.stale = true;
        }
    }

    /// Starts a frame.
    ///
    /// Returns `Ok(None)` when no image could be acquired because the surface
    /// is stale. Recreation has been attempted by then, or deferred while the
    /// surface has zero area.
    pub fn begin_frame(&mut self) -> RendererResult<Option<u32>> {
        if self.sequencer.is_frame_started() {
            return Err(RendererError::FrameAlreadyStarted);
        }

        if self.stale && !self.recreate_if_possible()? {
            return Ok(None);
        }

        let slot = self.sequencer.current_slot();
        let (image_index, status) = self.target.acquire(slot)?;
        let Some(image_index) = image_index else {
            debug!("Surface out of date at acquire");
            self.stale = true;
            self.recreate_if_possible()?;
            return Ok(None);
        };

        // A suboptimal image is still usable; rebuild after presenting it.
        if status.is_stale() {
            self.stale = true;
        }

        self.sequencer.begin()?;
        self.image_index = Some(image_index);
        trace!("Frame begun: slot {}, image {}", slot, image_index);
        Ok(Some(image_index))
    }

    /// Presents the frame in progress and advances to the next slot.
    ///
    /// The caller must have submitted the frame's work for the current slot.
    pub fn end_frame(&mut self) -> RendererResult<SurfaceStatus> {
        let image_index = self.image_index.ok_or(RendererError::FrameNotStarted)?;
        let slot = self.sequencer.current_slot();

        let status = self.target.present(slot, image_index);
        self.image_index = None;
        self.sequencer.end()?;

        if status?.is_stale() {
            self.stale = true;
        }

        if self.stale {
            self.recreate_if_possible()?;
            return Ok(SurfaceStatus::Stale);
        }
        Ok(SurfaceStatus::Optimal)
    }

    /// Abandons the frame in progress, e.g. after a recording error.
    ///
    /// The acquired image is released unpresented and the chain is marked
    /// stale, so the next [`begin_frame`](Self::begin_frame) rebuilds it and
    /// retries the same slot. Does nothing when no frame is in progress.
    pub fn abort_frame(&mut self) -> RendererResult<()> {
        self.sequencer.abort();
        let Some(image_index) = self.image_index.take() else {
            return Ok(());
        };

        let slot = self.sequencer.current_slot();
        debug!("Abandoning frame: slot {}, image {}", slot, image_index);
        self.stale = true;
        self.target.release(slot, image_index)?;
        Ok(())
    }

    fn recreate_if_possible(&mut self) -> RendererResult<bool> {
        if is_zero_extent(self.requested_extent) {
            debug!("Surface has zero area, deferring recreation");
            return Ok(false);
        }
        if !self.target.recreate(self.requested_extent)? {
            debug!("Surface reports zero area, deferring recreation");
            return Ok(false);
        }
        self.requested_extent = self.target.extent();
        self.stale = false;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 800,
        height: 600,
    };

    #[derive(Default)]
    struct MockTarget {
        extent: vk::Extent2D,
        image_count: u32,
        recreate_calls: Vec<vk::Extent2D>,
        acquire_results: VecDeque<(Option<u32>, SurfaceStatus)>,
        present_results: VecDeque<SurfaceStatus>,
        acquired_slots: Vec<usize>,
        released: Vec<(usize, u32)>,
        next_image: u32,
        zero_surface: bool,
        deferred_recreates: u32,
    }

    impl MockTarget {
        fn new(extent: vk::Extent2D) -> Self {
            Self {
                extent,
                image_count: 3,
                ..Default::default()
            }
        }
    }

    impl SurfaceTarget for MockTarget {
        fn extent(&self) -> vk::Extent2D {
            self.extent
        }

        fn image_count(&self) -> u32 {
            self.image_count
        }

        fn format(&self) -> vk::Format {
            vk::Format::B8G8R8A8_SRGB
        }

        fn acquire(&mut self, slot: usize) -> RhiResult<(Option<u32>, SurfaceStatus)> {
            self.acquired_slots.push(slot);
            if let Some(result) = self.acquire_results.pop_front() {
                return Ok(result);
            }
            let index = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count;
            Ok((Some(index), SurfaceStatus::Optimal))
        }

        fn present(&mut self, _slot: usize, _image_index: u32) -> RhiResult<SurfaceStatus> {
            Ok(self
                .present_results
                .pop_front()
                .unwrap_or(SurfaceStatus::Optimal))
        }

        fn release(&mut self, slot: usize, image_index: u32) -> RhiResult<()> {
            self.released.push((slot, image_index));
            Ok(())
        }

        fn recreate(&mut self, extent: vk::Extent2D) -> RhiResult<bool> {
            assert!(!is_zero_extent(extent));
            if self.zero_surface {
                self.deferred_recreates += 1;
                return Ok(false);
            }
            self.recreate_calls.push(extent);
            self.extent = extent;
            Ok(true)
        }
    }

    fn run_frame(driver: &mut FrameDriver<MockTarget>) -> Option<u32> {
        let image = driver.begin_frame().unwrap();
        if image.is_some() {
            driver.end_frame().unwrap();
        }
        image
    }

    #[test]
    fn test_sequencer_cycles_slots() {
        let mut sequencer = FrameSequencer::new(2);
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(sequencer.current_slot());
            sequencer.begin().unwrap();
            sequencer.end().unwrap();
        }
        assert_eq!(seen, vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn test_sequencer_rejects_double_begin() {
        let mut sequencer = FrameSequencer::default();
        sequencer.begin().unwrap();
        assert!(matches!(
            sequencer.begin(),
            Err(RendererError::FrameAlreadyStarted)
        ));
        assert!(sequencer.is_frame_started());
    }

    #[test]
    fn test_sequencer_rejects_end_without_begin() {
        let mut sequencer = FrameSequencer::default();
        assert!(matches!(sequencer.end(), Err(RendererError::FrameNotStarted)));
        assert_eq!(sequencer.current_slot(), 0);
    }

    #[test]
    fn test_driver_rotates_slots() {
        let mut driver = FrameDriver::new(MockTarget::new(EXTENT));
        for _ in 0..4 {
            assert!(run_frame(&mut driver).is_some());
        }
        assert_eq!(driver.target().acquired_slots, vec![0, 1, 0, 1]);
        assert!(driver.target().recreate_calls.is_empty());
    }

    #[test]
    fn test_double_begin_is_an_error() {
        let mut driver = FrameDriver::new(MockTarget::new(EXTENT));
        driver.begin_frame().unwrap();
        assert!(matches!(
            driver.begin_frame(),
            Err(RendererError::FrameAlreadyStarted)
        ));
    }

    #[test]
    fn test_end_without_begin_is_an_error() {
        let mut driver = FrameDriver::new(MockTarget::new(EXTENT));
        assert!(matches!(
            driver.end_frame(),
            Err(RendererError::FrameNotStarted)
        ));
    }

    #[test]
    fn test_out_of_date_acquire_skips_frame_and_recreates() {
        let mut target = MockTarget::new(EXTENT);
        target
            .acquire_results
            .push_back((None, SurfaceStatus::Stale));
        let mut driver = FrameDriver::new(target);

        assert_eq!(driver.begin_frame().unwrap(), None);
        assert!(!driver.is_frame_started());
        assert_eq!(driver.target().recreate_calls, vec![EXTENT]);
        assert_eq!(driver.current_slot(), 0);

        assert!(run_frame(&mut driver).is_some());
    }

    #[test]
    fn test_suboptimal_present_recreates() {
        let mut target = MockTarget::new(EXTENT);
        target.present_results.push_back(SurfaceStatus::Stale);
        let mut driver = FrameDriver::new(target);

        driver.begin_frame().unwrap();
        assert_eq!(driver.end_frame().unwrap(), SurfaceStatus::Stale);
        assert_eq!(driver.target().recreate_calls.len(), 1);
        assert_eq!(driver.current_slot(), 1);
        assert!(!driver.is_stale());
    }

    #[test]
    fn test_resize_recreates_at_frame_end() {
        let mut driver = FrameDriver::new(MockTarget::new(EXTENT));
        let bigger = vk::Extent2D {
            width: 1024,
            height: 768,
        };

        driver.begin_frame().unwrap();
        driver.resize(bigger);
        driver.end_frame().unwrap();

        assert_eq!(driver.target().recreate_calls, vec![bigger]);
        assert_eq!(driver.target().extent(), bigger);
    }

    #[test]
    fn test_zero_extent_defers_recreation() {
        let mut driver = FrameDriver::new(MockTarget::new(EXTENT));
        driver.resize(vk::Extent2D {
            width: 0,
            height: 0,
        });

        for _ in 0..3 {
            assert_eq!(run_frame(&mut driver), None);
        }
        assert!(driver.target().recreate_calls.is_empty());
        assert!(driver.target().acquired_slots.is_empty());
        assert!(driver.is_stale());

        let restored = vk::Extent2D {
            width: 640,
            height: 480,
        };
        driver.resize(restored);
        assert!(run_frame(&mut driver).is_some());
        assert_eq!(driver.target().recreate_calls, vec![restored]);
        assert!(!driver.is_stale());
        assert!(run_frame(&mut driver).is_some());
    }

    #[test]
    fn test_recreate_is_idempotent() {
        let mut driver = FrameDriver::new(MockTarget::new(EXTENT));
        let count = driver.target().image_count();
        let format = driver.target().format();

        for _ in 0..2 {
            assert!(driver.target_mut().recreate(EXTENT).unwrap());
            assert_eq!(driver.target().image_count(), count);
            assert_eq!(driver.target().format(), format);
            assert_eq!(driver.target().extent(), EXTENT);
        }
    }

    #[test]
    fn test_resize_to_same_extent_is_ignored() {
        let mut driver = FrameDriver::new(MockTarget::new(EXTENT));
        driver.resize(EXTENT);
        assert!(!driver.is_stale());
        assert!(run_frame(&mut driver).is_some());
        assert!(driver.target().recreate_calls.is_empty());
    }

    #[test]
    fn test_zero_area_surface_keeps_chain_stale() {
        let mut target = MockTarget::new(EXTENT);
        target.zero_surface = true;
        let mut driver = FrameDriver::new(target);
        let bigger = vk::Extent2D {
            width: 1024,
            height: 768,
        };
        driver.resize(bigger);

        for _ in 0..2 {
            assert_eq!(run_frame(&mut driver), None);
            assert!(driver.is_stale());
        }
        assert_eq!(driver.target().deferred_recreates, 2);
        assert!(driver.target().recreate_calls.is_empty());
        assert!(driver.target().acquired_slots.is_empty());

        driver.target_mut().zero_surface = false;
        assert!(run_frame(&mut driver).is_some());
        assert_eq!(driver.target().recreate_calls, vec![bigger]);
        assert!(!driver.is_stale());
    }

    #[test]
    fn test_abandoned_frame_releases_image_and_retries_slot() {
        let mut driver = FrameDriver::new(MockTarget::new(EXTENT));
        assert!(run_frame(&mut driver).is_some());

        let image = driver.begin_frame().unwrap().unwrap();
        assert_eq!(driver.current_slot(), 1);
        driver.abort_frame().unwrap();

        assert_eq!(driver.target().released, vec![(1, image)]);
        assert!(!driver.is_frame_started());
        assert_eq!(driver.image_index(), None);
        assert!(driver.is_stale());

        // Not stuck in FrameAlreadyStarted: the chain is rebuilt and slot 1 reused.
        assert!(driver.begin_frame().unwrap().is_some());
        assert_eq!(driver.target().recreate_calls, vec![EXTENT]);
        assert_eq!(driver.target().acquired_slots, vec![0, 1, 1]);
        driver.end_frame().unwrap();
        assert_eq!(driver.current_slot(), 0);
    }

    #[test]
    fn test_abort_without_frame_does_nothing() {
        let mut driver = FrameDriver::new(MockTarget::new(EXTENT));
        driver.abort_frame().unwrap();
        assert!(driver.target().released.is_empty());
        assert!(!driver.is_stale());
        assert!(run_frame(&mut driver).is_some());
    }
}
