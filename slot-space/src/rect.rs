//! Pure grid geometry and the pricing oracle shared by previews and settlement.

use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

pub type PageId = u16;

/// Edge length of a page in grid units.
pub const GRID_SIZE: u32 = 316;
/// Number of pages partitioning the surface.
pub const TOTAL_PAGES: u32 = 100;
/// Pixels along one edge of a grid unit.
pub const UNIT_PIXELS: u32 = 10;

/// Axis-aligned rectangle in grid units, half-open on both axes: `[x, x+w) x [y, y+h)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    pub fn right(&self) -> u64 {
        self.x as u64 + self.w as u64
    }

    pub fn bottom(&self) -> u64 {
        self.y as u64 + self.h as u64
    }

    pub fn units(&self) -> u64 {
        self.w as u64 * self.h as u64
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}) {}x{}", self.x, self.y, self.w, self.h)
    }
}

/// True when the interiors intersect. Rects that only share an edge do not overlap.
pub fn overlaps(a: &Rect, b: &Rect) -> bool {
    let x_a = a.x as u64;
    let y_a = a.y as u64;
    let x_b = b.x as u64;
    let y_b = b.y as u64;
    !(x_a >= b.right() || a.right() <= x_b || y_a >= b.bottom() || a.bottom() <= y_b)
}

pub fn within_bounds(rect: &Rect, grid_size: u32) -> bool {
    let limit = grid_size as u64;
    rect.w >= 1 && rect.h >= 1 && rect.right() <= limit && rect.bottom() <= limit
}

pub fn pixel_count(rect: &Rect, unit_pixels: u32) -> u64 {
    let per_unit = unit_pixels as u64 * unit_pixels as u64;
    rect.units() * per_unit
}

/// Exact price; decimal multiplication never rounds at these magnitudes.
pub fn price(pixels: u64, rate_per_pixel: Decimal, animated: bool) -> Decimal {
    price_with_multiplier(pixels, rate_per_pixel, animated, 2)
}

pub fn price_with_multiplier(
    pixels: u64,
    rate_per_pixel: Decimal,
    animated: bool,
    animated_multiplier: u32,
) -> Decimal {
    let base = Decimal::from(pixels) * rate_per_pixel;
    if animated {
        base * Decimal::from(animated_multiplier)
    } else {
        base
    }
}

/// Pricing parameters. Every quote in the system goes through [`Pricing::quote`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pricing {
    pub rate_per_pixel: Decimal,
    pub unit_pixels: u32,
    pub animated_multiplier: u32,
    pub minor_unit_scale: u32,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            rate_per_pixel: Decimal::new(1, 2),
            unit_pixels: UNIT_PIXELS,
            animated_multiplier: 2,
            minor_unit_scale: 2,
        }
    }
}

impl Pricing {
    pub fn pixels(&self, rect: &Rect) -> u64 {
        pixel_count(rect, self.unit_pixels)
    }

    pub fn quote(&self, rect: &Rect, animated: bool) -> Decimal {
        let exact = price_with_multiplier(
            self.pixels(rect),
            self.rate_per_pixel,
            animated,
            self.animated_multiplier,
        );
        exact.round_dp_with_strategy(self.minor_unit_scale, RoundingStrategy::MidpointAwayFromZero)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn overlap_examples() {
        let a = Rect::new(10, 10, 20, 10);
        let b = Rect::new(15, 5, 5, 20);
        let c = Rect::new(40, 50, 10, 10);
        assert!(overlaps(&a, &b));
        assert!(!overlaps(&a, &c));
    }

    #[test]
    fn touching_edges_do_not_overlap() {
        let a = Rect::new(0, 0, 10, 10);
        let right = Rect::new(10, 0, 10, 10);
        let below = Rect::new(0, 10, 10, 10);
        let corner = Rect::new(10, 10, 1, 1);
        assert!(!overlaps(&a, &right));
        assert!(!overlaps(&a, &below));
        assert!(!overlaps(&a, &corner));
    }

    #[test]
    fn overlap_is_symmetric() {
        let rects = [
            Rect::new(0, 0, 10, 10),
            Rect::new(5, 5, 10, 10),
            Rect::new(10, 0, 3, 3),
            Rect::new(2, 2, 1, 1),
            Rect::new(0, 9, 316, 2),
            Rect::new(300, 300, 16, 16),
        ];
        for a in &rects {
            for b in &rects {
                assert_eq!(overlaps(a, b), overlaps(b, a), "{a} vs {b}");
            }
        }
    }

    #[test]
    fn containment_counts_as_overlap() {
        let outer = Rect::new(0, 0, 100, 100);
        let inner = Rect::new(40, 40, 1, 1);
        assert!(overlaps(&outer, &inner));
        assert!(overlaps(&outer, &outer));
    }

    #[test]
    fn bounds_checks() {
        assert!(within_bounds(&Rect::new(0, 0, 316, 316), GRID_SIZE));
        assert!(within_bounds(&Rect::new(306, 0, 10, 10), GRID_SIZE));
        assert!(!within_bounds(&Rect::new(310, 0, 10, 10), GRID_SIZE));
        assert!(!within_bounds(&Rect::new(0, 310, 10, 10), GRID_SIZE));
        assert!(!within_bounds(&Rect::new(5, 5, 0, 3), GRID_SIZE));
        assert!(!within_bounds(&Rect::new(5, 5, 3, 0), GRID_SIZE));
        assert!(!within_bounds(&Rect::new(u32::MAX, 0, u32::MAX, 1), GRID_SIZE));
    }

    #[test]
    fn pricing_example() {
        let rect = Rect::new(0, 0, 2, 3);
        let pixels = pixel_count(&rect, UNIT_PIXELS);
        assert_eq!(pixels, 600);
        assert_eq!(price(pixels, dec!(0.01), true), dec!(12.00));
        assert_eq!(price(pixels, dec!(0.01), false), dec!(6.00));
    }

    #[test]
    fn quote_rounds_to_minor_units() {
        let pricing = Pricing {
            rate_per_pixel: dec!(0.00125),
            ..Pricing::default()
        };
        let quote = pricing.quote(&Rect::new(0, 0, 1, 1), false);
        assert_eq!(quote, dec!(0.13));
        assert_eq!(quote.scale(), 2);
    }

    #[test]
    fn quote_is_deterministic() {
        let pricing = Pricing::default();
        let rect = Rect::new(7, 9, 13, 4);
        let first = pricing.quote(&rect, true);
        for _ in 0..8 {
            assert_eq!(pricing.quote(&rect, true), first);
        }
        assert_eq!(first, dec!(104.00));
    }
}
