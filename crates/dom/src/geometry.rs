/// Axis-aligned box in document coordinates (CSS pixels).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[must_use]
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Grow the box by `margin` on every side, like an intersection root margin.
    #[must_use]
    pub fn inflate(&self, margin: f64) -> Self {
        Self {
            x: self.x - margin,
            y: self.y - margin,
            width: margin.mul_add(2.0, self.width),
            height: margin.mul_add(2.0, self.height),
        }
    }

    /// True when the boxes overlap or touch. Zero-sized targets intersect when their
    /// position lies inside `self`.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        other.x <= self.right()
            && other.right() >= self.x
            && other.y <= self.bottom()
            && other.bottom() >= self.y
    }
}

#[cfg(test)]
mod tests {
    use super::Rect;

    #[test]
    fn margin_promotes_near_boxes() {
        let viewport = Rect::new(0.0, 0.0, 1000.0, 800.0);
        let below = Rect::new(10.0, 830.0, 100.0, 100.0);
        assert!(!viewport.intersects(&below));
        assert!(viewport.inflate(50.0).intersects(&below));
        let far = Rect::new(10.0, 900.0, 100.0, 100.0);
        assert!(!viewport.inflate(50.0).intersects(&far));
    }
}
