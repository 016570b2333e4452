use std::{collections::HashMap, path::PathBuf, sync::Arc};

use core_types::{AllocationUid, MappingStore};
use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    config::SlotSpaceConfig,
    content::SlotContent,
    error::{GridError, Result, SlotSpaceError},
    rect::{overlaps, within_bounds, PageId, Rect},
    slot_metrics::SlotMetrics,
};

pub type AllocationId = AllocationUid;

/// Committed ownership record. Immutable once inserted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: AllocationId,
    pub page: PageId,
    pub rect: Rect,
    pub content: SlotContent,
    pub animated: bool,
    pub proof_hash: String,
    pub created_at_ns: i64,
}

/// Everything an insert needs besides the placement; id and timestamp are assigned on commit.
#[derive(Clone, Debug)]
pub struct NewAllocation {
    pub content: SlotContent,
    pub animated: bool,
    pub proof_hash: String,
}

#[derive(Clone, Debug)]
pub struct GridStorageReport {
    pub path: PathBuf,
    pub allocations_loaded: usize,
}

/// Authoritative record of committed allocations, partitioned by page.
///
/// Each page sits behind its own lock, so the conflict check and the write of an insert
/// happen under one exclusive guard while other pages proceed in parallel.
pub struct GridIndex {
    grid_size: u32,
    total_pages: u32,
    pages: Vec<RwLock<PageIndex>>,
    by_id: RwLock<HashMap<AllocationId, (PageId, usize)>>,
    store: Mutex<MappingStore<Allocation>>,
    metrics: Option<Arc<SlotMetrics>>,
}

impl GridIndex {
    pub fn bootstrap(
        config: &SlotSpaceConfig,
        metrics: Option<Arc<SlotMetrics>>,
    ) -> Result<(Self, GridStorageReport)> {
        if !config.state_dir().exists() {
            return Err(SlotSpaceError::MissingStateDir {
                path: config.state_dir().to_path_buf(),
            });
        }
        let path = config.allocations_path();
        let (store, persisted) = MappingStore::<Allocation>::open(&path, config.sync_writes)?;
        let pages = (0..config.total_pages)
            .map(|_| RwLock::new(PageIndex::new(config.grid_size, config.bucket_size)))
            .collect();
        let grid = Self {
            grid_size: config.grid_size,
            total_pages: config.total_pages,
            pages,
            by_id: RwLock::new(HashMap::new()),
            store: Mutex::new(store),
            metrics,
        };
        let allocations_loaded = persisted.len();
        for mapped in persisted {
            let line = mapped.line;
            grid.replay(mapped.record)
                .map_err(|reason| SlotSpaceError::Corrupt { line, reason })?;
        }
        if allocations_loaded > 0 {
            info!(
                "slot space: restored {} allocations from {}",
                allocations_loaded,
                path.display()
            );
        }
        Ok((
            grid,
            GridStorageReport {
                path,
                allocations_loaded,
            },
        ))
    }

    pub fn grid_size(&self) -> u32 {
        self.grid_size
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    /// Returns true when `rect` intersects any committed allocation on `page`.
    pub fn query(&self, page: PageId, rect: &Rect) -> std::result::Result<bool, GridError> {
        Ok(self.conflict(page, rect)?.is_some())
    }

    pub fn conflict(
        &self,
        page: PageId,
        rect: &Rect,
    ) -> std::result::Result<Option<AllocationId>, GridError> {
        let index = self.page(page)?.read();
        Ok(index.find_conflict(rect).map(|existing| existing.id))
    }

    /// Checks and commits under the page's write lock.
    pub fn insert(
        &self,
        page: PageId,
        rect: Rect,
        new: NewAllocation,
    ) -> std::result::Result<Allocation, GridError> {
        let slot = self.page(page)?;
        if !within_bounds(&rect, self.grid_size) {
            return Err(GridError::OutOfBounds {
                rect,
                grid_size: self.grid_size,
            });
        }
        let mut index = slot.write();
        if let Some(existing) = index.find_conflict(&rect) {
            if let Some(metrics) = &self.metrics {
                metrics.record_conflict();
            }
            return Err(GridError::Conflict {
                page,
                rect,
                existing: existing.id,
            });
        }
        let allocation = Allocation {
            id: AllocationId::derive(page, rect.x, rect.y, rect.w, rect.h, &new.proof_hash),
            page,
            rect,
            content: new.content,
            animated: new.animated,
            proof_hash: new.proof_hash,
            created_at_ns: now_ns(),
        };
        self.store.lock().append(&allocation)?;
        let position = index.push(allocation.clone());
        drop(index);
        self.by_id.write().insert(allocation.id, (page, position));
        if let Some(metrics) = &self.metrics {
            metrics.record_allocation(page, rect.units());
        }
        debug!(
            "slot space: committed {} on page {} at {}",
            allocation.id, page, rect
        );
        Ok(allocation)
    }

    /// Point-in-time copy of a page, in commit order.
    pub fn snapshot(&self, page: PageId) -> std::result::Result<Vec<Allocation>, GridError> {
        Ok(self.page(page)?.read().allocations.clone())
    }

    pub fn get(&self, id: &AllocationId) -> Option<Allocation> {
        let (page, position) = *self.by_id.read().get(id)?;
        let index = self.pages.get(page as usize)?.read();
        index.allocations.get(position).cloned()
    }

    pub fn page_len(&self, page: PageId) -> std::result::Result<usize, GridError> {
        Ok(self.page(page)?.read().allocations.len())
    }

    pub fn len(&self) -> usize {
        self.by_id.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn page(&self, page: PageId) -> std::result::Result<&RwLock<PageIndex>, GridError> {
        self.pages.get(page as usize).ok_or(GridError::InvalidPage {
            page,
            total_pages: self.total_pages,
        })
    }

    fn replay(&self, allocation: Allocation) -> std::result::Result<(), String> {
        let slot = self
            .pages
            .get(allocation.page as usize)
            .ok_or_else(|| format!("page {} out of range", allocation.page))?;
        if !within_bounds(&allocation.rect, self.grid_size) {
            return Err(format!("rect {} out of bounds", allocation.rect));
        }
        let mut index = slot.write();
        if let Some(existing) = index.find_conflict(&allocation.rect) {
            return Err(format!(
                "allocation {} overlaps {}",
                allocation.id, existing.id
            ));
        }
        let mut by_id = self.by_id.write();
        if by_id.contains_key(&allocation.id) {
            return Err(format!("duplicate allocation id {}", allocation.id));
        }
        let page = allocation.page;
        let id = allocation.id;
        let units = allocation.rect.units();
        let position = index.push(allocation);
        by_id.insert(id, (page, position));
        if let Some(metrics) = &self.metrics {
            metrics.record_allocation(page, units);
        }
        Ok(())
    }
}

/// Allocations of one page plus a uniform bucket grid over them.
struct PageIndex {
    allocations: Vec<Allocation>,
    buckets: Vec<Vec<u32>>,
    bucket_size: u32,
    cols: u32,
}

impl PageIndex {
    fn new(grid_size: u32, bucket_size: u32) -> Self {
        let bucket_size = bucket_size.max(1);
        let cols = grid_size.div_ceil(bucket_size).max(1);
        Self {
            allocations: Vec::new(),
            buckets: vec![Vec::new(); (cols * cols) as usize],
            bucket_size,
            cols,
        }
    }

    fn find_conflict(&self, rect: &Rect) -> Option<&Allocation> {
        let (cx0, cx1, cy0, cy1) = self.bucket_span(rect)?;
        for cy in cy0..=cy1 {
            for cx in cx0..=cx1 {
                let bucket = &self.buckets[(cy * self.cols + cx) as usize];
                for &position in bucket {
                    let candidate = &self.allocations[position as usize];
                    if overlaps(&candidate.rect, rect) {
                        return Some(candidate);
                    }
                }
            }
        }
        None
    }

    fn push(&mut self, allocation: Allocation) -> usize {
        let position = self.allocations.len();
        if let Some((cx0, cx1, cy0, cy1)) = self.bucket_span(&allocation.rect) {
            for cy in cy0..=cy1 {
                for cx in cx0..=cx1 {
                    self.buckets[(cy * self.cols + cx) as usize].push(position as u32);
                }
            }
        }
        self.allocations.push(allocation);
        position
    }

    /// Inclusive bucket ranges touched by `rect`, clamped to the page. `None` for empty rects.
    fn bucket_span(&self, rect: &Rect) -> Option<(u32, u32, u32, u32)> {
        if rect.w == 0 || rect.h == 0 {
            return None;
        }
        let last = self.cols - 1;
        let size = self.bucket_size as u64;
        let cx0 = (rect.x as u64 / size).min(last as u64) as u32;
        let cy0 = (rect.y as u64 / size).min(last as u64) as u32;
        let cx1 = ((rect.right() - 1) / size).min(last as u64) as u32;
        let cy1 = ((rect.bottom() - 1) / size).min(last as u64) as u32;
        Some((cx0, cx1, cy0, cy1))
    }
}

fn now_ns() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::{Arc, Barrier},
        thread,
    };
    use tempfile::tempdir;

    fn content(title: &str) -> SlotContent {
        SlotContent {
            image_ref: "img://1".to_string(),
            link: "https://example.com/".to_string(),
            title: title.to_string(),
        }
    }

    fn new_alloc(hash: &str) -> NewAllocation {
        NewAllocation {
            content: content(hash),
            animated: false,
            proof_hash: hash.to_string(),
        }
    }

    fn grid(dir: &std::path::Path) -> GridIndex {
        let mut config = SlotSpaceConfig::new(dir.to_path_buf());
        config.sync_writes = false;
        GridIndex::bootstrap(&config, None).unwrap().0
    }

    #[test]
    fn insert_then_conflict() {
        let dir = tempdir().unwrap();
        let grid = grid(dir.path());
        let first = grid
            .insert(0, Rect::new(10, 10, 20, 10), new_alloc("h1"))
            .unwrap();
        assert!(grid.query(0, &Rect::new(15, 5, 5, 20)).unwrap());
        assert!(!grid.query(1, &Rect::new(15, 5, 5, 20)).unwrap());
        let err = grid
            .insert(0, Rect::new(15, 5, 5, 20), new_alloc("h2"))
            .unwrap_err();
        match err {
            GridError::Conflict { existing, .. } => assert_eq!(existing, first.id),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(grid.page_len(0).unwrap(), 1);
    }

    #[test]
    fn touching_rects_both_commit() {
        let dir = tempdir().unwrap();
        let grid = grid(dir.path());
        grid.insert(2, Rect::new(0, 0, 16, 16), new_alloc("a"))
            .unwrap();
        grid.insert(2, Rect::new(16, 0, 16, 16), new_alloc("b"))
            .unwrap();
        grid.insert(2, Rect::new(0, 16, 32, 1), new_alloc("c"))
            .unwrap();
        assert_eq!(grid.page_len(2).unwrap(), 3);
    }

    #[test]
    fn out_of_bounds_and_bad_page() {
        let dir = tempdir().unwrap();
        let grid = grid(dir.path());
        assert!(matches!(
            grid.insert(0, Rect::new(310, 0, 10, 10), new_alloc("a")),
            Err(GridError::OutOfBounds { .. })
        ));
        assert!(matches!(
            grid.insert(100, Rect::new(0, 0, 1, 1), new_alloc("a")),
            Err(GridError::InvalidPage { page: 100, .. })
        ));
        assert!(grid.is_empty());
    }

    #[test]
    fn large_rect_spanning_buckets_is_found() {
        let dir = tempdir().unwrap();
        let grid = grid(dir.path());
        grid.insert(5, Rect::new(3, 3, 300, 2), new_alloc("wide"))
            .unwrap();
        assert!(grid.query(5, &Rect::new(250, 4, 1, 1)).unwrap());
        assert!(!grid.query(5, &Rect::new(250, 5, 1, 1)).unwrap());
        // out-of-bounds queries are clamped rather than rejected
        assert!(!grid.query(5, &Rect::new(400, 400, 5, 5)).unwrap());
    }

    #[test]
    fn snapshot_and_lookup() {
        let dir = tempdir().unwrap();
        let grid = grid(dir.path());
        let a = grid.insert(1, Rect::new(0, 0, 1, 1), new_alloc("a")).unwrap();
        let b = grid.insert(1, Rect::new(1, 0, 1, 1), new_alloc("b")).unwrap();
        let snapshot = grid.snapshot(1).unwrap();
        assert_eq!(snapshot, vec![a.clone(), b]);
        assert_eq!(grid.get(&a.id), Some(a));
        assert!(grid.snapshot(0).unwrap().is_empty());
    }

    #[test]
    fn reload_restores_allocations() {
        let dir = tempdir().unwrap();
        let committed = {
            let grid = grid(dir.path());
            grid.insert(7, Rect::new(40, 50, 10, 10), new_alloc("persisted"))
                .unwrap()
        };
        let reopened = grid(dir.path());
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.get(&committed.id), Some(committed));
        assert!(reopened.query(7, &Rect::new(45, 55, 1, 1)).unwrap());
    }

    #[test]
    fn overlapping_file_is_corrupt() {
        let dir = tempdir().unwrap();
        let config = SlotSpaceConfig::new(dir.path().to_path_buf());
        let mut lines = String::new();
        for (hash, x) in [("a", 0u32), ("b", 5u32)] {
            let allocation = Allocation {
                id: AllocationId::derive(0, x, 0, 10, 10, hash),
                page: 0,
                rect: Rect::new(x, 0, 10, 10),
                content: content(hash),
                animated: false,
                proof_hash: hash.to_string(),
                created_at_ns: 0,
            };
            lines.push_str(&serde_json::to_string(&allocation).unwrap());
            // blank separator lines still count toward the reported line
            lines.push_str("\n\n");
        }
        std::fs::write(config.allocations_path(), lines).unwrap();
        let err = GridIndex::bootstrap(&config, None).err().unwrap();
        assert!(matches!(err, SlotSpaceError::Corrupt { line: 3, .. }));
    }

    #[test]
    fn concurrent_inserts_same_rect_single_winner() {
        let dir = tempdir().unwrap();
        let grid = Arc::new(grid(dir.path()));
        let workers = 8;
        let barrier = Arc::new(Barrier::new(workers));
        let handles: Vec<_> = (0..workers)
            .map(|i| {
                let grid = Arc::clone(&grid);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    grid.insert(3, Rect::new(100, 100, 20, 20), new_alloc(&format!("h{i}")))
                        .is_ok()
                })
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(wins, 1);
        assert_eq!(grid.page_len(3).unwrap(), 1);
    }

    #[test]
    fn concurrent_random_inserts_never_overlap() {
        let dir = tempdir().unwrap();
        let grid = Arc::new(grid(dir.path()));
        let handles: Vec<_> = (0..4u32)
            .map(|worker| {
                let grid = Arc::clone(&grid);
                thread::spawn(move || {
                    let mut seed = 0x9e37_79b9u32.wrapping_mul(worker + 1);
                    for n in 0..200u32 {
                        seed ^= seed << 13;
                        seed ^= seed >> 17;
                        seed ^= seed << 5;
                        let x = seed % 300;
                        let y = (seed / 300) % 300;
                        let w = 1 + seed % 16;
                        let h = 1 + (seed >> 8) % 16;
                        let _ = grid.insert(
                            0,
                            Rect::new(x, y, w, h),
                            new_alloc(&format!("w{worker}-{n}")),
                        );
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let snapshot = grid.snapshot(0).unwrap();
        assert!(!snapshot.is_empty());
        for (i, a) in snapshot.iter().enumerate() {
            assert!(within_bounds(&a.rect, 316));
            for b in &snapshot[i + 1..] {
                assert!(!overlaps(&a.rect, &b.rect), "{} overlaps {}", a.rect, b.rect);
            }
        }
    }
}
