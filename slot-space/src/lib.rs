//! Slot space library: the paged allocation surface.
//!
//! [`GridIndex`] owns every committed [`Allocation`], partitioned by page, and is the only
//! component that mutates allocation state. [`AllocationService`] turns client selections into
//! priced [`Draft`]s against it; geometry and pricing live in [`rect`].
//!
//! The crate exposes:
//! - [`rect`]: overlap/bounds tests and the pricing oracle.
//! - [`GridIndex`]: per-page locked spatial index with an append-only backing file.
//! - [`AllocationService`]: preview and draft finalization.

pub mod allocation;
pub mod config;
pub mod content;
pub mod error;
pub mod grid;
pub mod rect;
pub mod slot_metrics;

pub use allocation::{AllocationService, Draft, Preview};
pub use config::SlotSpaceConfig;
pub use content::{ContentInput, SlotContent};
pub use error::{AllocationError, ContentError, GridError, SelectionIssue, SlotSpaceError};
pub use grid::{Allocation, AllocationId, GridIndex, GridStorageReport, NewAllocation};
pub use rect::{overlaps, pixel_count, price, within_bounds, PageId, Pricing, Rect};
pub use slot_metrics::{PageCountsSnapshot, SlotMetrics, SlotMetricsSnapshot};
