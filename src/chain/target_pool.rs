//! Reusable off-screen render targets for chain evaluation.
//!
//! Every chain node resolves to exactly one viewport-sized image; frames with
//! nested masks and multi-pass effects can burn through a dozen of them. The
//! pool keeps released targets keyed by their spec and hands them back out
//! before touching the allocator, so steady-state frames allocate nothing.
//!
//! Ownership is scoped: [`acquire`](TargetPool::acquire) returns a guard whose
//! `Drop` returns the target to the pool. Consuming passes take guards by
//! value, which makes "every acquire is matched by exactly one release" hold
//! on every path — including early returns when an allocation fails mid-frame.
//!
//! The bookkeeping core is generic over the pooled resource so the accounting
//! invariants are testable without a GPU device.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::gpu::GpuContext;

/// Format of ordinary chain targets.
pub(crate) const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// Format of HDR intermediates (the bloom bright-pass and its blurs).
pub(crate) const HDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Frame-time rendering errors.
///
/// Configuration problems are caught when the chain is built ([`ConfigError`]);
/// the only faults that can surface during a frame are resource exhaustion and
/// a lost/outdated surface. Both abandon the frame; the pool stays consistent
/// either way.
///
/// [`ConfigError`]: crate::effects::ConfigError
#[derive(Debug)]
pub enum RenderError {
    /// The device could not allocate a render target. Fatal for the frame,
    /// propagated to the caller, never retried.
    OutOfMemory,
    /// The swapchain surface could not provide a frame.
    Surface(wgpu::SurfaceError),
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::OutOfMemory => write!(f, "GPU out of memory allocating a render target"),
            RenderError::Surface(e) => write!(f, "surface error: {}", e),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Surface(e) => Some(e),
            _ => None,
        }
    }
}

/// What a pooled target looks like: dimensions plus pixel format.
///
/// Two targets are interchangeable exactly when their specs are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetSpec {
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
}

impl TargetSpec {
    /// Viewport-sized target in the standard chain format.
    pub(crate) fn viewport(gpu: &GpuContext) -> Self {
        Self {
            width: gpu.width(),
            height: gpu.height(),
            format: TARGET_FORMAT,
        }
    }

    /// Same dimensions, different format.
    pub(crate) fn with_format(self, format: wgpu::TextureFormat) -> Self {
        Self { format, ..self }
    }
}

/// A GPU texture usable both as a render attachment and as a shader input.
pub(crate) struct TargetTexture {
    #[allow(dead_code)]
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

/// Pure pooling policy: free lists per spec plus accounting.
pub(crate) struct PoolCore<T> {
    free: HashMap<TargetSpec, Vec<T>>,
    live: usize,
    misses: usize,
}

impl<T> PoolCore<T> {
    pub(crate) fn new() -> Self {
        Self {
            free: HashMap::new(),
            live: 0,
            misses: 0,
        }
    }

    /// Take a matching free resource, or build one with `alloc`.
    ///
    /// If `alloc` fails nothing is marked live, so an exhausted device leaves
    /// the pool exactly as it was.
    pub(crate) fn acquire_with(
        &mut self,
        spec: TargetSpec,
        alloc: impl FnOnce() -> Result<T, RenderError>,
    ) -> Result<T, RenderError> {
        if let Some(resource) = self.free.get_mut(&spec).and_then(|list| list.pop()) {
            self.live += 1;
            return Ok(resource);
        }
        let resource = alloc()?;
        self.misses += 1;
        self.live += 1;
        Ok(resource)
    }

    pub(crate) fn release(&mut self, spec: TargetSpec, resource: T) {
        debug_assert!(self.live > 0, "release without a matching acquire");
        self.live -= 1;
        self.free.entry(spec).or_default().push(resource);
    }

    fn free_count(&self) -> usize {
        self.free.values().map(Vec::len).sum()
    }
}

/// Guard over a pooled resource; dropping it releases back to the pool.
pub(crate) struct Pooled<T> {
    resource: Option<T>,
    spec: TargetSpec,
    pool: Rc<RefCell<PoolCore<T>>>,
}

impl<T> Pooled<T> {
    pub(crate) fn spec(&self) -> TargetSpec {
        self.spec
    }

    pub(crate) fn get(&self) -> &T {
        self.resource
            .as_ref()
            .expect("pooled resource accessed after release")
    }
}

impl<T> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            self.pool.borrow_mut().release(self.spec, resource);
        }
    }
}

/// A pooled off-screen render target.
pub(crate) type PooledTarget = Pooled<TargetTexture>;

impl PooledTarget {
    pub(crate) fn view(&self) -> &wgpu::TextureView {
        &self.get().view
    }
}

/// The render target pool shared by all chain nodes, within and across frames.
///
/// Cloning the pool is cheap and shares the underlying storage; guards hold a
/// clone so they can release themselves wherever they end up.
#[derive(Clone)]
pub struct TargetPool {
    core: Rc<RefCell<PoolCore<TargetTexture>>>,
}

impl TargetPool {
    pub fn new() -> Self {
        Self {
            core: Rc::new(RefCell::new(PoolCore::new())),
        }
    }

    /// Acquire a target matching `spec`, reusing a released one when possible.
    ///
    /// On a pool miss the texture is allocated with both `RENDER_ATTACHMENT`
    /// and `TEXTURE_BINDING` usage so any node can render to it and any later
    /// pass can sample it.
    pub(crate) fn acquire(
        &self,
        gpu: &GpuContext,
        spec: TargetSpec,
    ) -> Result<PooledTarget, RenderError> {
        let resource = self.core.borrow_mut().acquire_with(spec, || {
            tracing::debug!(
                width = spec.width,
                height = spec.height,
                format = ?spec.format,
                "pool miss, allocating render target"
            );
            let texture = gpu.try_create_texture(&wgpu::TextureDescriptor {
                label: Some("Chain Target"),
                size: wgpu::Extent3d {
                    width: spec.width,
                    height: spec.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: spec.format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            })?;
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            Ok(TargetTexture { texture, view })
        })?;

        Ok(Pooled {
            resource: Some(resource),
            spec,
            pool: Rc::clone(&self.core),
        })
    }

    /// Drop all free targets (e.g. after a resize made their specs stale).
    ///
    /// Live targets are unaffected; they return to the (now empty) free lists
    /// as their guards drop.
    pub fn purge(&self) {
        self.core.borrow_mut().free.clear();
    }

    /// Targets currently handed out.
    pub fn live(&self) -> usize {
        self.core.borrow().live
    }

    /// Targets sitting in the free lists.
    pub fn free_targets(&self) -> usize {
        self.core.borrow().free_count()
    }

    /// Allocations performed (pool misses) since creation.
    pub fn misses(&self) -> usize {
        self.core.borrow().misses
    }
}

impl Default for TargetPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC: TargetSpec = TargetSpec {
        width: 64,
        height: 64,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
    };

    fn test_pool() -> Rc<RefCell<PoolCore<u32>>> {
        Rc::new(RefCell::new(PoolCore::new()))
    }

    fn acquire(pool: &Rc<RefCell<PoolCore<u32>>>, spec: TargetSpec) -> Pooled<u32> {
        let mut next = pool.borrow().misses as u32;
        let resource = pool
            .borrow_mut()
            .acquire_with(spec, || {
                next += 1;
                Ok(next)
            })
            .unwrap();
        Pooled {
            resource: Some(resource),
            spec,
            pool: Rc::clone(pool),
        }
    }

    #[test]
    fn acquires_match_releases_after_walk() {
        let pool = test_pool();
        {
            let _a = acquire(&pool, SPEC);
            let _b = acquire(&pool, SPEC);
            let c = acquire(&pool, SPEC);
            drop(c);
            let _d = acquire(&pool, SPEC);
            assert_eq!(pool.borrow().live, 3);
        }
        assert_eq!(pool.borrow().live, 0);
        assert_eq!(pool.borrow().free_count(), 3);
    }

    #[test]
    fn released_target_reused_before_allocating() {
        let pool = test_pool();
        let first = acquire(&pool, SPEC);
        drop(first);
        let _second = acquire(&pool, SPEC);
        // One allocation total: the second acquire was a pool hit.
        assert_eq!(pool.borrow().misses, 1);
    }

    #[test]
    fn mismatched_spec_allocates_fresh() {
        let pool = test_pool();
        let small = acquire(&pool, SPEC);
        drop(small);
        let other = SPEC.with_format(wgpu::TextureFormat::Rgba16Float);
        let _hdr = acquire(&pool, other);
        assert_eq!(pool.borrow().misses, 2);
        assert_eq!(pool.borrow().free_count(), 1);
    }

    #[test]
    fn failed_allocation_leaves_pool_consistent() {
        let pool = test_pool();
        let held = acquire(&pool, SPEC);

        let result = pool
            .borrow_mut()
            .acquire_with(SPEC, || Err::<u32, _>(RenderError::OutOfMemory));
        assert!(matches!(result, Err(RenderError::OutOfMemory)));

        // The failed acquire changed nothing; the held guard still releases.
        assert_eq!(pool.borrow().live, 1);
        drop(held);
        assert_eq!(pool.borrow().live, 0);
        assert_eq!(pool.borrow().free_count(), 1);
    }

    #[test]
    fn guard_releases_on_early_return() {
        let pool = test_pool();

        fn abandoned_frame(pool: &Rc<RefCell<PoolCore<u32>>>) -> Result<(), RenderError> {
            let _a = acquire(pool, SPEC);
            let _b = acquire(pool, SPEC);
            // Simulated mid-frame failure; both guards unwind.
            Err(RenderError::OutOfMemory)
        }

        assert!(abandoned_frame(&pool).is_err());
        assert_eq!(pool.borrow().live, 0);
        assert_eq!(pool.borrow().free_count(), 2);
    }
}
