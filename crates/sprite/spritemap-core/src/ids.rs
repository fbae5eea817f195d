//! Sprite, image and resource handles and the per-table allocator behind them.
//!
//! Handles are the only back-references that cross structures (store, spatial
//! index, hit-test entries, buffer protocol). They are plain integers so they
//! survive the trip through a flat `f64` buffer unchanged.

use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct SpriteHandle(pub u32);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ImageHandle(pub u32);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ResourceHandle(pub u32);

/// Identity of one image inside its sprite: images are keyed by (sub layer, order).
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ImageKey {
    pub sub_layer: i32,
    pub order: i32,
}

impl ImageKey {
    pub fn new(sub_layer: i32, order: i32) -> Self {
        Self { sub_layer, order }
    }
}

/// Plain-integer handle. The raw value is what travels through the buffer
/// protocol, so it must round-trip through an `f64` slot exactly.
pub trait Handle: Copy {
    const KIND: &'static str;
    fn from_raw(raw: u32) -> Self;
}

macro_rules! impl_handle {
    ($ty:ident, $kind:literal) => {
        impl Handle for $ty {
            const KIND: &'static str = $kind;

            #[inline]
            fn from_raw(raw: u32) -> Self {
                $ty(raw)
            }
        }
    };
}

impl_handle!(SpriteHandle, "sprite");
impl_handle!(ImageHandle, "image");
impl_handle!(ResourceHandle, "resource");

/// Hands out dense handles of one kind. Handles are never reused until the
/// owning table is cleared: stale handles held by hit-test entries or an
/// in-flight buffer must not alias a newer sprite or image.
#[derive(Debug)]
pub struct HandleAllocator<H> {
    next: u32,
    _kind: PhantomData<H>,
}

impl<H> Default for HandleAllocator<H> {
    fn default() -> Self {
        Self {
            next: 0,
            _kind: PhantomData,
        }
    }
}

impl<H: Handle> HandleAllocator<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next unused handle; `None` once the handle space is exhausted.
    pub fn allocate(&mut self) -> Option<H> {
        let raw = self.next;
        self.next = raw.checked_add(1)?;
        Some(H::from_raw(raw))
    }

    /// Handles allocated since the last reset.
    pub fn issued(&self) -> u32 {
        self.next
    }

    /// Start over from the first handle; only valid once every handle of the
    /// table is gone.
    pub fn reset(&mut self) {
        self.next = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_dense_per_kind() {
        let mut sprites = HandleAllocator::<SpriteHandle>::new();
        let mut images = HandleAllocator::<ImageHandle>::new();
        assert_eq!(sprites.allocate(), Some(SpriteHandle(0)));
        assert_eq!(sprites.allocate(), Some(SpriteHandle(1)));
        assert_eq!(images.allocate(), Some(ImageHandle(0)));
        assert_eq!(sprites.issued(), 2);
        sprites.reset();
        assert_eq!(sprites.allocate(), Some(SpriteHandle(0)));
    }

    #[test]
    fn exhausted_allocator_never_wraps() {
        let mut resources = HandleAllocator::<ResourceHandle> {
            next: u32::MAX - 1,
            _kind: PhantomData,
        };
        assert_eq!(resources.allocate(), Some(ResourceHandle(u32::MAX - 1)));
        assert_eq!(resources.allocate(), None);
        assert_eq!(resources.allocate(), None);
        assert_eq!(ResourceHandle::KIND, "resource");
    }

    #[test]
    fn image_keys_order_by_sub_layer_then_order() {
        let mut keys = vec![ImageKey::new(1, 0), ImageKey::new(0, 5), ImageKey::new(0, 1)];
        keys.sort();
        assert_eq!(
            keys,
            vec![ImageKey::new(0, 1), ImageKey::new(0, 5), ImageKey::new(1, 0)]
        );
    }
}
