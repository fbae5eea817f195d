//! Loose quadtree over axis-aligned rectangles.
//!
//! Nodes live in an arena (`Vec<Node<T>>`) and items are addressed through a
//! slot table, so `remove`/`update` locate an item in O(1) without searching
//! the tree. Each node tests membership against its *loose* bounds (tight
//! bounds scaled around the center), which lets items that straddle a split
//! line still sink into a child and keeps small moves from rebucketing.

use serde::{Deserialize, Serialize};

use crate::config::SpatialConfig;
use crate::error::SpatialError;

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Rect {
    /// Build a rect, swapping bounds so that `x0 <= x1` and `y0 <= y1`.
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    /// Smallest rect containing every point; `None` for an empty iterator.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut iter = points.into_iter();
        let (x, y) = iter.next()?;
        let mut rect = Rect {
            x0: x,
            y0: y,
            x1: x,
            y1: y,
        };
        for (x, y) in iter {
            rect.x0 = rect.x0.min(x);
            rect.y0 = rect.y0.min(y);
            rect.x1 = rect.x1.max(x);
            rect.y1 = rect.y1.max(y);
        }
        Some(rect)
    }

    /// Smallest rect covering both.
    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    #[inline]
    pub fn center(&self) -> (f64, f64) {
        ((self.x0 + self.x1) * 0.5, (self.y0 + self.y1) * 0.5)
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x0.is_finite() && self.y0.is_finite() && self.x1.is_finite() && self.y1.is_finite()
    }

    /// Inclusive containment of another rect.
    #[inline]
    pub fn contains(&self, other: &Rect) -> bool {
        other.x0 >= self.x0 && other.x1 <= self.x1 && other.y0 >= self.y0 && other.y1 <= self.y1
    }

    #[inline]
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }

    /// Inclusive overlap: touching edges count.
    #[inline]
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.x0 <= other.x1 && self.x1 >= other.x0 && self.y0 <= other.y1 && self.y1 >= other.y0
    }

    /// Scale around the center by `factor`.
    pub fn scaled(&self, factor: f64) -> Rect {
        let (cx, cy) = self.center();
        let hw = self.width() * 0.5 * factor;
        let hh = self.height() * 0.5 * factor;
        Rect {
            x0: cx - hw,
            y0: cy - hh,
            x1: cx + hw,
            y1: cy + hh,
        }
    }

    pub fn expanded(&self, dx: f64, dy: f64) -> Rect {
        Rect::new(self.x0 - dx, self.y0 - dy, self.x1 + dx, self.y1 + dy)
    }

    /// Intersect with `bounds`; a rect fully outside collapses onto the nearest edge.
    pub fn clamped_to(&self, bounds: &Rect) -> Rect {
        Rect {
            x0: self.x0.clamp(bounds.x0, bounds.x1),
            y0: self.y0.clamp(bounds.y0, bounds.y1),
            x1: self.x1.clamp(bounds.x0, bounds.x1),
            y1: self.y1.clamp(bounds.y0, bounds.y1),
        }
    }
}

/// Stable address of an item: slot index plus a generation that invalidates
/// keys of removed items.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SpatialKey {
    index: u32,
    generation: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SpatialItem<T> {
    pub rect: Rect,
    pub payload: T,
}

#[derive(Debug)]
struct Node<T> {
    tight: Rect,
    loose: Rect,
    depth: u32,
    children: Option<[usize; 4]>,
    items: Vec<(SpatialKey, SpatialItem<T>)>,
}

impl<T> Node<T> {
    fn new(tight: Rect, looseness: f64, depth: u32) -> Self {
        Self {
            tight,
            loose: tight.scaled(looseness),
            depth,
            children: None,
            items: Vec::new(),
        }
    }
}

#[derive(Copy, Clone, Debug)]
struct Slot {
    generation: u32,
    /// (node index, position inside `items`) while occupied.
    location: Option<(usize, usize)>,
}

#[derive(Debug)]
pub struct LooseQuadTree<T> {
    nodes: Vec<Node<T>>,
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
    looseness: f64,
    max_items_per_node: usize,
    max_depth: u32,
}

const ROOT: usize = 0;

impl<T> LooseQuadTree<T> {
    pub fn new(bounds: Rect, config: &SpatialConfig) -> Self {
        let looseness = config.looseness.max(1.0);
        Self {
            nodes: vec![Node::new(bounds, looseness, 0)],
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
            looseness,
            max_items_per_node: config.max_items_per_node.max(1),
            max_depth: config.max_depth,
        }
    }

    pub fn bounds(&self) -> Rect {
        self.nodes[ROOT].tight
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn add(&mut self, rect: Rect, payload: T) -> Result<SpatialKey, SpatialError> {
        let root = self.nodes[ROOT].tight;
        if !rect.is_finite() || !root.contains(&rect) {
            return Err(SpatialError::OutOfBounds { rect, root });
        }
        let key = self.alloc_slot();
        self.insert_from(ROOT, key, SpatialItem { rect, payload });
        self.len += 1;
        Ok(key)
    }

    pub fn get(&self, key: SpatialKey) -> Option<&SpatialItem<T>> {
        let (node, pos) = self.locate(key)?;
        Some(&self.nodes[node].items[pos].1)
    }

    /// Remove an item; `false` without mutation when `key` is stale or
    /// `old_rect` is not the rect the tree tracks for it.
    pub fn remove(&mut self, key: SpatialKey, old_rect: &Rect) -> bool {
        let Some((node, pos)) = self.locate(key) else {
            return false;
        };
        if self.nodes[node].items[pos].1.rect != *old_rect {
            log::debug!("spatial remove desync for {key:?}: tracked rect differs");
            return false;
        }
        self.detach(node, pos);
        self.free_slot(key);
        self.len -= 1;
        true
    }

    /// Move an item; same desync guard as `remove`. A new rect outside the
    /// root bounds is rejected and the tree is left untouched.
    pub fn update(&mut self, key: SpatialKey, old_rect: &Rect, new_rect: Rect) -> bool {
        let Some((node, pos)) = self.locate(key) else {
            return false;
        };
        if self.nodes[node].items[pos].1.rect != *old_rect {
            log::debug!("spatial update desync for {key:?}: tracked rect differs");
            return false;
        }
        if !new_rect.is_finite() || !self.nodes[ROOT].tight.contains(&new_rect) {
            return false;
        }

        if self.nodes[node].loose.contains(&new_rect) {
            self.nodes[node].items[pos].1.rect = new_rect;
            if let Some(child) = self.fitting_child(node, &new_rect) {
                let item = self.detach(node, pos);
                self.insert_from(child, key, item);
            }
            return true;
        }

        let item = self.detach(node, pos);
        let item = SpatialItem {
            rect: new_rect,
            payload: item.payload,
        };
        self.insert_from(ROOT, key, item);
        true
    }

    /// All items whose rect overlaps `query` (inclusive).
    pub fn lookup(&self, query: &Rect) -> Vec<(SpatialKey, &SpatialItem<T>)> {
        let mut out = Vec::new();
        let mut stack = vec![ROOT];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            if !node.loose.overlaps(query) {
                continue;
            }
            out.extend(
                node.items
                    .iter()
                    .filter(|(_, item)| item.rect.overlaps(query))
                    .map(|(key, item)| (*key, item)),
            );
            if let Some(children) = node.children {
                stack.extend(children);
            }
        }
        out
    }

    /// Drop every item and node. Keys handed out before the call must not be reused.
    pub fn clear(&mut self) {
        self.nodes.truncate(1);
        let root = &mut self.nodes[ROOT];
        root.children = None;
        root.items.clear();
        self.slots.clear();
        self.free.clear();
        self.len = 0;
    }

    fn locate(&self, key: SpatialKey) -> Option<(usize, usize)> {
        let slot = self.slots.get(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.location
    }

    fn alloc_slot(&mut self) -> SpatialKey {
        if let Some(index) = self.free.pop() {
            let slot = &self.slots[index as usize];
            return SpatialKey {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            location: None,
        });
        SpatialKey {
            index,
            generation: 0,
        }
    }

    fn free_slot(&mut self, key: SpatialKey) {
        let slot = &mut self.slots[key.index as usize];
        slot.location = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index);
    }

    /// Swap-remove an item from its node, fixing the slot of the item moved
    /// into its place. The item's own slot keeps its generation.
    fn detach(&mut self, node: usize, pos: usize) -> SpatialItem<T> {
        let items = &mut self.nodes[node].items;
        let (key, item) = items.swap_remove(pos);
        if let Some((moved, _)) = items.get(pos) {
            self.slots[moved.index as usize].location = Some((node, pos));
        }
        self.slots[key.index as usize].location = None;
        item
    }

    /// Child whose tight quadrant contains the rect center, if its loose
    /// bounds hold the whole rect.
    fn fitting_child(&self, node: usize, rect: &Rect) -> Option<usize> {
        let children = self.nodes[node].children?;
        let (cx, cy) = self.nodes[node].tight.center();
        let (rx, ry) = rect.center();
        let quadrant = usize::from(rx >= cx) + 2 * usize::from(ry >= cy);
        let child = children[quadrant];
        self.nodes[child].loose.contains(rect).then_some(child)
    }

    fn insert_from(&mut self, start: usize, key: SpatialKey, item: SpatialItem<T>) {
        let mut node = start;
        while let Some(child) = self.fitting_child(node, &item.rect) {
            node = child;
        }
        let items = &mut self.nodes[node].items;
        items.push((key, item));
        self.slots[key.index as usize].location = Some((node, items.len() - 1));

        let target = &self.nodes[node];
        if target.children.is_none()
            && target.items.len() > self.max_items_per_node
            && target.depth < self.max_depth
        {
            self.subdivide(node);
        }
    }

    fn subdivide(&mut self, node: usize) {
        let tight = self.nodes[node].tight;
        let depth = self.nodes[node].depth + 1;
        let (cx, cy) = tight.center();
        let quadrants = [
            Rect::new(tight.x0, tight.y0, cx, cy),
            Rect::new(cx, tight.y0, tight.x1, cy),
            Rect::new(tight.x0, cy, cx, tight.y1),
            Rect::new(cx, cy, tight.x1, tight.y1),
        ];
        let base = self.nodes.len();
        for quadrant in quadrants {
            self.nodes.push(Node::new(quadrant, self.looseness, depth));
        }
        self.nodes[node].children = Some([base, base + 1, base + 2, base + 3]);

        let items = std::mem::take(&mut self.nodes[node].items);
        for (key, item) in items {
            let target = self.fitting_child(node, &item.rect).unwrap_or(node);
            let list = &mut self.nodes[target].items;
            list.push((key, item));
            self.slots[key.index as usize].location = Some((target, list.len() - 1));
        }
    }
}
