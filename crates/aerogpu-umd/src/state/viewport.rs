//! Viewport and scissor arrays.
//!
//! The protocol has one viewport and one scissor rectangle. Entries with zero width and zero
//! height are unused placeholders, as are inverted scissor rectangles. The first active entry is
//! encoded. When the active entries disagree the call also reports not-implemented.

use super::BestEffort;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Viewport {
    pub top_left_x: f32,
    pub top_left_y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Encoded when no viewport is active. The host falls back to the full render target.
    pub const DISABLED: Viewport = Viewport {
        top_left_x: 0.0,
        top_left_y: 0.0,
        width: 0.0,
        height: 0.0,
        min_depth: 0.0,
        max_depth: 1.0,
    };

    pub fn is_placeholder(&self) -> bool {
        self.width == 0.0 && self.height == 0.0
    }

    /// Bitwise equality, so identical NaN entries match.
    pub fn same_as(&self, other: &Viewport) -> bool {
        self.to_bits() == other.to_bits()
    }

    fn to_bits(self) -> [u32; 6] {
        [
            self.top_left_x,
            self.top_left_y,
            self.width,
            self.height,
            self.min_depth,
            self.max_depth,
        ]
        .map(f32::to_bits)
    }
}

/// Scissor rectangle in D3D `RECT` form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScissorRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl ScissorRect {
    pub const DISABLED: ScissorRect = ScissorRect {
        left: 0,
        top: 0,
        right: 0,
        bottom: 0,
    };

    pub fn width(&self) -> i32 {
        clamp_i64_to_i32(i64::from(self.right) - i64::from(self.left))
    }

    pub fn height(&self) -> i32 {
        clamp_i64_to_i32(i64::from(self.bottom) - i64::from(self.top))
    }

    pub fn is_inverted(&self) -> bool {
        self.right < self.left || self.bottom < self.top
    }

    pub fn is_placeholder(&self) -> bool {
        self.is_inverted() || (self.width() == 0 && self.height() == 0)
    }

    /// Same origin, zero extent.
    pub fn collapsed(&self) -> ScissorRect {
        ScissorRect {
            right: self.left,
            bottom: self.top,
            ..*self
        }
    }
}

fn clamp_i64_to_i32(v: i64) -> i32 {
    v.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

fn select<T: Copy>(
    entries: &[T],
    disabled: T,
    is_placeholder: impl Fn(&T) -> bool,
    same: impl Fn(&T, &T) -> bool,
    what: &str,
) -> BestEffort<T> {
    let mut active = entries.iter().filter(|e| !is_placeholder(e));
    let Some(first_active) = active.next() else {
        return BestEffort::exact(disabled);
    };
    if active.any(|e| !same(e, first_active)) {
        BestEffort::approximate(
            *first_active,
            format!("{} distinct active {what}s; only one is supported", entries.len()),
        )
    } else {
        BestEffort::exact(*first_active)
    }
}

pub fn select_viewport(viewports: &[Viewport]) -> BestEffort<Viewport> {
    select(viewports, Viewport::DISABLED, Viewport::is_placeholder, Viewport::same_as, "viewport")
}

/// With no active rectangle, entry 0 is encoded with a zero extent (scissor disabled).
pub fn select_scissor(rects: &[ScissorRect]) -> BestEffort<ScissorRect> {
    let disabled = rects.first().map_or(ScissorRect::DISABLED, ScissorRect::collapsed);
    select(rects, disabled, ScissorRect::is_placeholder, |a, b| a == b, "scissor rect")
}
