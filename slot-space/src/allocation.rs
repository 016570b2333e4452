use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    content::{ContentInput, SlotContent},
    error::{AllocationError, SelectionIssue},
    grid::GridIndex,
    rect::{within_bounds, PageId, Pricing, Rect},
    slot_metrics::SlotMetrics,
};

/// Non-authoritative answer for a proposed selection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Preview {
    pub valid: bool,
    pub pixels: u64,
    pub price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<&'static str>,
}

/// Validated, priced proposal awaiting payment. Never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Draft {
    page: PageId,
    rect: Rect,
    content: SlotContent,
    animated: bool,
    pixels: u64,
    price: Decimal,
}

impl Draft {
    pub fn page(&self) -> PageId {
        self.page
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn content(&self) -> &SlotContent {
        &self.content
    }

    pub fn animated(&self) -> bool {
        self.animated
    }

    pub fn pixels(&self) -> u64 {
        self.pixels
    }

    pub fn price(&self) -> Decimal {
        self.price
    }
}

/// Turns client selections into priced drafts against the current grid.
pub struct AllocationService {
    grid: Arc<GridIndex>,
    pricing: Pricing,
    max_title_chars: usize,
    metrics: Option<Arc<SlotMetrics>>,
}

impl AllocationService {
    pub fn new(
        grid: Arc<GridIndex>,
        pricing: Pricing,
        max_title_chars: usize,
        metrics: Option<Arc<SlotMetrics>>,
    ) -> Self {
        Self {
            grid,
            pricing,
            max_title_chars,
            metrics,
        }
    }

    pub fn grid(&self) -> &Arc<GridIndex> {
        &self.grid
    }

    pub fn pricing(&self) -> &Pricing {
        &self.pricing
    }

    pub fn preview(&self, page: PageId, rect: &Rect, animated: bool) -> Preview {
        let issue = self.selection_issue(page, rect);
        if let Some(metrics) = &self.metrics {
            metrics.record_preview(issue.is_none());
        }
        Preview {
            valid: issue.is_none(),
            pixels: self.pricing.pixels(rect),
            price: self.pricing.quote(rect, animated),
            issue: issue.map(|issue| issue.label()),
        }
    }

    pub fn finalize_draft(
        &self,
        page: PageId,
        rect: Rect,
        content: &ContentInput,
        animated: bool,
    ) -> Result<Draft, AllocationError> {
        if let Some(issue) = self.selection_issue(page, &rect) {
            return Err(AllocationError::InvalidSelection { page, rect, issue });
        }
        self.draft(page, rect, content, animated)
    }

    /// Like [`AllocationService::finalize_draft`] but an occupied selection still drafts; the
    /// grid insert at commit is then the only occupancy check.
    pub fn finalize_draft_ignoring_occupancy(
        &self,
        page: PageId,
        rect: Rect,
        content: &ContentInput,
        animated: bool,
    ) -> Result<Draft, AllocationError> {
        match self.selection_issue(page, &rect) {
            None | Some(SelectionIssue::Occupied) => {}
            Some(issue) => return Err(AllocationError::InvalidSelection { page, rect, issue }),
        }
        self.draft(page, rect, content, animated)
    }

    fn draft(
        &self,
        page: PageId,
        rect: Rect,
        content: &ContentInput,
        animated: bool,
    ) -> Result<Draft, AllocationError> {
        let content = SlotContent::validate(content, self.max_title_chars)?;
        Ok(Draft {
            page,
            rect,
            content,
            animated,
            pixels: self.pricing.pixels(&rect),
            price: self.pricing.quote(&rect, animated),
        })
    }

    /// Same checks as a preview, evaluated against the grid as it is right now.
    pub fn selection_issue(&self, page: PageId, rect: &Rect) -> Option<SelectionIssue> {
        if (page as u32) >= self.grid.total_pages() {
            return Some(SelectionIssue::PageOutOfRange);
        }
        if !within_bounds(rect, self.grid.grid_size()) {
            return Some(SelectionIssue::OutOfBounds);
        }
        match self.grid.query(page, rect) {
            Ok(false) => None,
            Ok(true) => Some(SelectionIssue::Occupied),
            Err(_) => Some(SelectionIssue::PageOutOfRange),
        }
    }
}
