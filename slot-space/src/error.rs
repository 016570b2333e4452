use std::{fmt, path::PathBuf};

use core_types::MappingError;
use thiserror::Error;

use crate::{
    grid::AllocationId,
    rect::{PageId, Rect},
};

pub type Result<T> = std::result::Result<T, SlotSpaceError>;

#[derive(Debug, Error)]
pub enum GridError {
    #[error("page {page} out of range (total pages {total_pages})")]
    InvalidPage { page: PageId, total_pages: u32 },
    #[error("rect {rect} exceeds the {grid_size}x{grid_size} grid")]
    OutOfBounds { rect: Rect, grid_size: u32 },
    #[error("rect {rect} on page {page} overlaps allocation {existing}")]
    Conflict {
        page: PageId,
        rect: Rect,
        existing: AllocationId,
    },
    #[error("allocation store write failed: {0}")]
    Storage(#[from] std::io::Error),
}

/// Why a proposed selection cannot be drafted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionIssue {
    PageOutOfRange,
    OutOfBounds,
    Occupied,
}

impl SelectionIssue {
    pub fn label(&self) -> &'static str {
        match self {
            SelectionIssue::PageOutOfRange => "page_out_of_range",
            SelectionIssue::OutOfBounds => "out_of_bounds",
            SelectionIssue::Occupied => "occupied",
        }
    }
}

impl fmt::Display for SelectionIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContentError {
    #[error("image reference is required")]
    MissingImage,
    #[error("link is required")]
    MissingLink,
    #[error("link '{link}' is not a valid absolute http(s) URL")]
    InvalidLink { link: String },
    #[error("title has {len} characters (max {max})")]
    TitleTooLong { len: usize, max: usize },
}

impl ContentError {
    pub fn field(&self) -> &'static str {
        match self {
            ContentError::MissingImage => "image_ref",
            ContentError::MissingLink | ContentError::InvalidLink { .. } => "link",
            ContentError::TitleTooLong { .. } => "title",
        }
    }
}

#[derive(Debug, Error)]
pub enum AllocationError {
    #[error("invalid selection {rect} on page {page}: {issue}")]
    InvalidSelection {
        page: PageId,
        rect: Rect,
        issue: SelectionIssue,
    },
    #[error("invalid content: {0}")]
    InvalidContent(#[from] ContentError),
}

#[derive(Debug, Error)]
pub enum SlotSpaceError {
    #[error("state directory missing: {path}")]
    MissingStateDir { path: PathBuf },
    #[error("allocation store corrupt at line {line}: {reason}")]
    Corrupt { line: usize, reason: String },
    #[error("grid error: {0}")]
    Grid(#[from] GridError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<MappingError> for SlotSpaceError {
    fn from(err: MappingError) -> Self {
        match err {
            MappingError::Corrupt { line, reason, .. } => SlotSpaceError::Corrupt { line, reason },
            MappingError::Io(err) => SlotSpaceError::Io(err),
        }
    }
}
