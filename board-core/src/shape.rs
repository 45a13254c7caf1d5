//! Freehand shape recognition for auto-correcting pencil strokes.

use crate::element::Point;

/// Paths shorter than this are never corrected.
pub const MIN_PATH_POINTS: usize = 10;

/// Start/end distance below which a path counts as a closed loop.
pub const CLOSED_LOOP_DISTANCE: f64 = 50.0;

/// Minimum bounding-box side for a path to count as a rectangle.
pub const MIN_RECT_SIDE: f64 = 50.0;

/// Shape a stroke was recognized as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectedKind {
    /// Closed loop, rendered as a circle.
    Circle,
    /// Large open path, rendered as its bounding rectangle.
    Rect,
}

/// Geometry of a recognized shape, in element coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedShape {
    /// What the path was recognized as.
    pub kind: CorrectedKind,
    /// Top-left X.
    pub offset_x: f64,
    /// Top-left Y.
    pub offset_y: f64,
    /// Width of the bounding box.
    pub width: f64,
    /// Height of the bounding box.
    pub height: f64,
}

struct Bounds {
    min_x: f64,
    max_x: f64,
    min_y: f64,
    max_y: f64,
}

impl Bounds {
    fn of(path: &[Point]) -> Self {
        path.iter().fold(
            Self {
                min_x: f64::INFINITY,
                max_x: f64::NEG_INFINITY,
                min_y: f64::INFINITY,
                max_y: f64::NEG_INFINITY,
            },
            |b, p| Self {
                min_x: b.min_x.min(p.x()),
                max_x: b.max_x.max(p.x()),
                min_y: b.min_y.min(p.y()),
                max_y: b.max_y.max(p.y()),
            },
        )
    }

    fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// Recognize a closed loop or an axis-aligned quadrilateral in a path.
///
/// A closed loop becomes the circle whose bounding square is centered on
/// the path's bounding box, with side equal to the larger bbox dimension.
/// Otherwise a path whose bbox exceeds [`MIN_RECT_SIDE`] on both axes
/// becomes that bbox.
#[must_use]
pub fn detect_shape(path: &[Point]) -> Option<DetectedShape> {
    let (first, last) = match path {
        [first, .., last] if path.len() >= MIN_PATH_POINTS => (first, last),
        _ => return None,
    };
    let bounds = Bounds::of(path);

    if first.distance_to(last) < CLOSED_LOOP_DISTANCE {
        let center_x = (bounds.max_x + bounds.min_x) / 2.0;
        let center_y = (bounds.max_y + bounds.min_y) / 2.0;
        let radius = bounds.width().max(bounds.height()) / 2.0;
        return Some(DetectedShape {
            kind: CorrectedKind::Circle,
            offset_x: center_x - radius,
            offset_y: center_y - radius,
            width: radius * 2.0,
            height: radius * 2.0,
        });
    }

    if bounds.width() > MIN_RECT_SIDE && bounds.height() > MIN_RECT_SIDE {
        return Some(DetectedShape {
            kind: CorrectedKind::Rect,
            offset_x: bounds.min_x,
            offset_y: bounds.min_y,
            width: bounds.width(),
            height: bounds.height(),
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(from: (f64, f64), to: (f64, f64), steps: u32) -> Vec<Point> {
        (0..steps)
            .map(|i| {
                let t = f64::from(i) / f64::from(steps);
                Point::new(from.0 + (to.0 - from.0) * t, from.1 + (to.1 - from.1) * t)
            })
            .collect()
    }

    #[test]
    fn test_short_path_is_ignored() {
        let path = line((0.0, 0.0), (200.0, 200.0), 9);
        assert!(detect_shape(&path).is_none());
    }

    #[test]
    fn test_closed_square_loop_is_circle() {
        let mut path = line((0.0, 0.0), (100.0, 0.0), 5);
        path.extend(line((100.0, 0.0), (100.0, 60.0), 5));
        path.extend(line((100.0, 60.0), (0.0, 60.0), 5));
        path.extend(line((0.0, 60.0), (0.0, 10.0), 5));

        let shape = detect_shape(&path).expect("closed loop");
        assert_eq!(shape.kind, CorrectedKind::Circle);
        // Side is the larger bbox dimension, centered on the bbox.
        assert!((shape.width - 100.0).abs() < 1e-9);
        assert!((shape.height - 100.0).abs() < 1e-9);
        assert!((shape.offset_x - 0.0).abs() < 1e-9);
        assert!((shape.offset_y - (30.0 - 50.0)).abs() < 1e-9);
    }

    #[test]
    fn test_open_wide_path_is_rect() {
        // Three sides of a box; the ends are far apart.
        let mut path = line((0.0, 0.0), (0.0, 120.0), 4);
        path.extend(line((0.0, 120.0), (150.0, 120.0), 4));
        path.extend(line((150.0, 120.0), (150.0, 0.0), 4));
        path.push(Point::new(150.0, 0.0));

        let shape = detect_shape(&path).expect("rect");
        assert_eq!(shape.kind, CorrectedKind::Rect);
        assert!((shape.width - 150.0).abs() < 1e-9);
        assert!((shape.height - 120.0).abs() < 1e-9);
    }

    #[test]
    fn test_flat_open_path_is_not_corrected() {
        let path = line((0.0, 0.0), (300.0, 10.0), 20);
        assert!(detect_shape(&path).is_none());
    }
}
