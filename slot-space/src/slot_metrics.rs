use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use crate::rect::PageId;

pub struct SlotMetrics {
    grid_units_per_page: u64,
    pages: Vec<PageCounter>,
    previews: AtomicU64,
    preview_rejections: AtomicU64,
    insert_conflicts: AtomicU64,
}

impl SlotMetrics {
    pub fn new(total_pages: u32, grid_size: u32) -> Arc<Self> {
        Arc::new(Self {
            grid_units_per_page: grid_size as u64 * grid_size as u64,
            pages: (0..total_pages).map(|_| PageCounter::new()).collect(),
            previews: AtomicU64::new(0),
            preview_rejections: AtomicU64::new(0),
            insert_conflicts: AtomicU64::new(0),
        })
    }

    pub fn record_allocation(&self, page: PageId, units: u64) {
        if let Some(counter) = self.pages.get(page as usize) {
            counter.allocations.fetch_add(1, Ordering::Relaxed);
            counter.units.fetch_add(units, Ordering::Relaxed);
        }
    }

    pub fn record_preview(&self, valid: bool) {
        self.previews.fetch_add(1, Ordering::Relaxed);
        if !valid {
            self.preview_rejections.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_conflict(&self) {
        self.insert_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SlotMetricsSnapshot {
        let pages = self
            .pages
            .iter()
            .enumerate()
            .map(|(idx, counter)| PageCountsSnapshot {
                page: idx as PageId,
                allocations: counter.allocations.load(Ordering::Relaxed),
                units: counter.units.load(Ordering::Relaxed),
            })
            .collect();
        SlotMetricsSnapshot {
            grid_units_per_page: self.grid_units_per_page,
            pages,
            previews: self.previews.load(Ordering::Relaxed),
            preview_rejections: self.preview_rejections.load(Ordering::Relaxed),
            insert_conflicts: self.insert_conflicts.load(Ordering::Relaxed),
        }
    }
}

struct PageCounter {
    allocations: AtomicU64,
    units: AtomicU64,
}

impl PageCounter {
    const fn new() -> Self {
        Self {
            allocations: AtomicU64::new(0),
            units: AtomicU64::new(0),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SlotMetricsSnapshot {
    pub grid_units_per_page: u64,
    pub pages: Vec<PageCountsSnapshot>,
    pub previews: u64,
    pub preview_rejections: u64,
    pub insert_conflicts: u64,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PageCountsSnapshot {
    pub page: PageId,
    pub allocations: u64,
    pub units: u64,
}

impl SlotMetricsSnapshot {
    pub fn total_allocations(&self) -> u64 {
        self.pages.iter().map(|p| p.allocations).sum()
    }

    pub fn total_units(&self) -> u64 {
        self.pages.iter().map(|p| p.units).sum()
    }

    pub fn occupancy(&self, page: PageId) -> f64 {
        match self.pages.get(page as usize) {
            Some(counts) if self.grid_units_per_page > 0 => {
                counts.units as f64 / self.grid_units_per_page as f64
            }
            _ => 0.0,
        }
    }
}

impl fmt::Display for SlotMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let occupied: Vec<&PageCountsSnapshot> =
            self.pages.iter().filter(|p| p.allocations > 0).collect();
        if occupied.is_empty() {
            return write!(f, "slot space: no allocations committed");
        }
        writeln!(
            f,
            "slot space: {} allocations, {} units across {} pages",
            self.total_allocations(),
            self.total_units(),
            occupied.len()
        )?;
        for counts in occupied {
            writeln!(
                f,
                "  page {:>5}: allocations={}, units={}, occupancy={:.2}%",
                counts.page,
                counts.allocations,
                counts.units,
                self.occupancy(counts.page) * 100.0
            )?;
        }
        write!(
            f,
            "  previews={}, rejected={}, insert_conflicts={}",
            self.previews, self.preview_rejections, self.insert_conflicts
        )
    }
}
