//! Canvas elements - the drawable units carried by every canvas snapshot.
//!
//! Field names on the wire are camelCase (`offsetX`, `strokeWidth`, ...)
//! because the rendering layer produces and consumes them directly. The
//! server never validates ranges and never rewrites an element it relays;
//! anything that does not decode as a known shape is carried opaquely.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::shape::{detect_shape, CorrectedKind};

/// A point on the canvas, serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point(f64, f64);

impl Point {
    /// Create a point from canvas coordinates.
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self(x, y)
    }

    /// Horizontal coordinate.
    #[must_use]
    pub fn x(&self) -> f64 {
        self.0
    }

    /// Vertical coordinate.
    #[must_use]
    pub fn y(&self) -> f64 {
        self.1
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance_to(&self, other: &Point) -> f64 {
        (other.0 - self.0).hypot(other.1 - self.1)
    }
}

/// A freehand path (pencil or eraser).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stroke {
    /// Origin X (first pointer-down position).
    pub offset_x: f64,
    /// Origin Y.
    pub offset_y: f64,
    /// Stroke color as a CSS color string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    /// Stroke width in pixels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    /// Ordered path points; append-only while being drawn.
    #[serde(default)]
    pub path: Vec<Point>,
}

/// A shape defined by an origin plus a width/height delta.
///
/// For `line` the delta pair holds the terminal point; for `rect` and
/// `circle` it is the bounding box size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extent {
    /// Origin X.
    pub offset_x: f64,
    /// Origin Y.
    pub offset_y: f64,
    /// Stroke color as a CSS color string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    /// Stroke width in pixels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    /// Horizontal extent (or terminal X for lines).
    #[serde(default)]
    pub width: f64,
    /// Vertical extent (or terminal Y for lines).
    #[serde(default)]
    pub height: f64,
}

/// A literal text label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextBlock {
    /// Baseline origin X.
    pub offset_x: f64,
    /// Baseline origin Y.
    pub offset_y: f64,
    /// Fill color as a CSS color string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    /// Literal content.
    #[serde(default)]
    pub text: String,
    /// Font size in pixels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    /// Bold weight flag.
    #[serde(default)]
    pub is_bold: bool,
}

/// Known drawable shapes, tagged by the `element` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "element", rename_all = "lowercase")]
pub enum Shape {
    /// Freehand stroke.
    Pencil(Stroke),
    /// Eraser stroke, painted in the background color.
    Eraser(Stroke),
    /// Straight line from origin to (`width`, `height`).
    Line(Extent),
    /// Axis-aligned rectangle.
    Rect(Extent),
    /// Ellipse inscribed in the bounding box.
    Circle(Extent),
    /// Text label.
    Text(TextBlock),
}

/// Kind discriminant of a [`CanvasElement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// Freehand stroke.
    Stroke,
    /// Eraser stroke.
    Eraser,
    /// Straight line.
    Line,
    /// Rectangle.
    Rectangle,
    /// Ellipse.
    Ellipse,
    /// Text label.
    Text,
    /// Payload the model does not recognize.
    Opaque,
}

/// One drawable unit of a canvas.
///
/// The element keeps the exact JSON it was decoded from and serializes back
/// to it, so ids, opacity and any other keys a renderer adds reach the other
/// participants unchanged. When that JSON decodes as a known [`Shape`] a
/// typed view is kept alongside it; otherwise the element is opaque.
#[derive(Debug, Clone, PartialEq)]
pub struct CanvasElement {
    raw: Value,
    shape: Option<Shape>,
}

impl Serialize for CanvasElement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CanvasElement {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_value)
    }
}

impl From<Shape> for CanvasElement {
    fn from(shape: Shape) -> Self {
        let raw = serde_json::to_value(&shape).unwrap_or(Value::Null);
        Self {
            raw,
            shape: Some(shape),
        }
    }
}

impl CanvasElement {
    /// Wrap a JSON value, recognizing it as a [`Shape`] when it decodes as one.
    #[must_use]
    pub fn from_value(raw: Value) -> Self {
        let shape = Shape::deserialize(&raw).ok();
        Self { raw, shape }
    }

    /// Start a new freehand stroke at `origin`.
    #[must_use]
    pub fn pencil(origin: Point, color: &str, width: f64) -> Self {
        Shape::Pencil(Stroke {
            offset_x: origin.x(),
            offset_y: origin.y(),
            stroke: Some(color.to_string()),
            stroke_width: Some(width),
            path: vec![origin],
        })
        .into()
    }

    /// Create a text label.
    #[must_use]
    pub fn text(origin: Point, content: &str, color: &str, font_size: f64, bold: bool) -> Self {
        Shape::Text(TextBlock {
            offset_x: origin.x(),
            offset_y: origin.y(),
            stroke: Some(color.to_string()),
            text: content.to_string(),
            font_size: Some(font_size),
            is_bold: bold,
        })
        .into()
    }

    /// Typed view, if the element is a recognized shape.
    #[must_use]
    pub fn shape(&self) -> Option<&Shape> {
        self.shape.as_ref()
    }

    /// The JSON the element serializes to.
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.raw
    }

    /// The element's kind.
    #[must_use]
    pub fn kind(&self) -> ElementKind {
        match &self.shape {
            Some(Shape::Pencil(_)) => ElementKind::Stroke,
            Some(Shape::Eraser(_)) => ElementKind::Eraser,
            Some(Shape::Line(_)) => ElementKind::Line,
            Some(Shape::Rect(_)) => ElementKind::Rectangle,
            Some(Shape::Circle(_)) => ElementKind::Ellipse,
            Some(Shape::Text(_)) => ElementKind::Text,
            None => ElementKind::Opaque,
        }
    }

    /// Origin point, if the element is a recognized shape.
    #[must_use]
    pub fn origin(&self) -> Option<Point> {
        match self.shape.as_ref()? {
            Shape::Pencil(s) | Shape::Eraser(s) => Some(Point::new(s.offset_x, s.offset_y)),
            Shape::Line(e) | Shape::Rect(e) | Shape::Circle(e) => {
                Some(Point::new(e.offset_x, e.offset_y))
            }
            Shape::Text(t) => Some(Point::new(t.offset_x, t.offset_y)),
        }
    }

    /// Stroke (or fill, for text) color.
    #[must_use]
    pub fn stroke_color(&self) -> Option<&str> {
        match self.shape.as_ref()? {
            Shape::Pencil(s) | Shape::Eraser(s) => s.stroke.as_deref(),
            Shape::Line(e) | Shape::Rect(e) | Shape::Circle(e) => e.stroke.as_deref(),
            Shape::Text(t) => t.stroke.as_deref(),
        }
    }

    /// Stroke width in pixels. Text has none.
    #[must_use]
    pub fn stroke_width(&self) -> Option<f64> {
        match self.shape.as_ref()? {
            Shape::Pencil(s) | Shape::Eraser(s) => s.stroke_width,
            Shape::Line(e) | Shape::Rect(e) | Shape::Circle(e) => e.stroke_width,
            Shape::Text(_) => None,
        }
    }

    /// Append a point to a stroke or eraser path.
    ///
    /// Returns `false` (and does nothing) for any other kind.
    pub fn append_point(&mut self, point: Point) -> bool {
        let Some(Shape::Pencil(stroke) | Shape::Eraser(stroke)) = &mut self.shape else {
            return false;
        };
        stroke.path.push(point);
        if let Value::Object(fields) = &mut self.raw {
            let path = fields
                .entry("path")
                .or_insert_with(|| Value::Array(Vec::new()));
            match path {
                Value::Array(points) => points.push(json!([point.x(), point.y()])),
                other => *other = json!(stroke.path),
            }
        }
        true
    }

    /// Rewrite a completed pencil stroke into a circle or rectangle when its
    /// path approximates one. Color, width and unrecognized keys carry over.
    ///
    /// This is a producer-side transform; the sync server never applies it.
    /// Returns whether the element was rewritten.
    pub fn auto_correct(&mut self) -> bool {
        let Some(Shape::Pencil(stroke)) = &mut self.shape else {
            return false;
        };
        let Some(detected) = detect_shape(&stroke.path) else {
            return false;
        };
        let extent = Extent {
            offset_x: detected.offset_x,
            offset_y: detected.offset_y,
            stroke: stroke.stroke.take(),
            stroke_width: stroke.stroke_width,
            width: detected.width,
            height: detected.height,
        };
        let shape = match detected.kind {
            CorrectedKind::Circle => Shape::Circle(extent),
            CorrectedKind::Rect => Shape::Rect(extent),
        };

        let mut fields = match std::mem::take(&mut self.raw) {
            Value::Object(fields) => fields,
            _ => Map::new(),
        };
        fields.remove("path");
        if let Ok(Value::Object(typed)) = serde_json::to_value(&shape) {
            fields.extend(typed);
        }
        self.raw = Value::Object(fields);
        self.shape = Some(shape);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_pencil() {
        let value = json!({
            "element": "pencil",
            "offsetX": 10.0,
            "offsetY": 20.0,
            "path": [[10.0, 20.0], [11.0, 21.5]],
            "stroke": "#ffffff",
            "strokeWidth": 5
        });
        let element: CanvasElement = serde_json::from_value(value).expect("should parse");
        assert_eq!(element.kind(), ElementKind::Stroke);
        assert_eq!(element.stroke_color(), Some("#ffffff"));
        assert_eq!(element.stroke_width(), Some(5.0));
        match element.shape() {
            Some(Shape::Pencil(s)) => {
                assert_eq!(s.path.len(), 2);
                assert!((s.path[1].y() - 21.5).abs() < f64::EPSILON);
            }
            other => panic!("Expected pencil, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_text() {
        let value = json!({
            "element": "text",
            "offsetX": 1,
            "offsetY": 2,
            "text": "hello",
            "stroke": "#ff0000",
            "fontSize": 24,
            "isBold": true
        });
        let element: CanvasElement = serde_json::from_value(value).expect("should parse");
        match element.shape() {
            Some(Shape::Text(t)) => {
                assert_eq!(t.text, "hello");
                assert_eq!(t.font_size, Some(24.0));
                assert!(t.is_bold);
            }
            other => panic!("Expected text, got {other:?}"),
        }
    }

    #[test]
    fn test_rect_without_extent_defaults_to_zero() {
        // A rect is sent on pointer-down before any drag has sized it.
        let value = json!({"element": "rect", "offsetX": 5, "offsetY": 6, "stroke": "#000"});
        let element: CanvasElement = serde_json::from_value(value).expect("should parse");
        match element.shape() {
            Some(Shape::Rect(e)) => {
                assert!(e.width.abs() < f64::EPSILON);
                assert!(e.height.abs() < f64::EPSILON);
            }
            other => panic!("Expected rect, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_element_is_opaque_and_preserved() {
        let value = json!({"element": "star", "points": 5, "whatever": [1, 2, 3]});
        let element: CanvasElement = serde_json::from_value(value.clone()).expect("should parse");
        assert_eq!(element.kind(), ElementKind::Opaque);
        assert_eq!(serde_json::to_value(&element).expect("serialize"), value);
    }

    #[test]
    fn test_malformed_known_element_is_opaque() {
        let value = json!({"element": "pencil", "offsetX": "not a number", "offsetY": 0});
        let element: CanvasElement = serde_json::from_value(value.clone()).expect("should parse");
        assert_eq!(element.kind(), ElementKind::Opaque);
        assert_eq!(serde_json::to_value(&element).expect("serialize"), value);
    }

    #[test]
    fn test_known_element_keeps_extra_keys_and_integers() {
        let value = json!({
            "element": "pencil",
            "offsetX": 1,
            "offsetY": 2,
            "stroke": "#fff",
            "strokeWidth": 5,
            "path": [[1, 2], [3, 4]],
            "id": "el-7",
            "opacity": 0.5
        });
        let element: CanvasElement = serde_json::from_value(value.clone()).expect("should parse");
        assert_eq!(element.kind(), ElementKind::Stroke);
        assert_eq!(element.stroke_width(), Some(5.0));
        assert_eq!(serde_json::to_string(&element).expect("serialize"), value.to_string());
    }

    #[test]
    fn test_append_point_keeps_extra_keys() {
        let value = json!({"element": "eraser", "offsetX": 0, "offsetY": 0, "path": [[0, 0]], "id": "e-1"});
        let mut element = CanvasElement::from_value(value);
        assert!(element.append_point(Point::new(2.5, 3.0)));

        let out = element.as_value();
        assert_eq!(out["id"], "e-1");
        assert_eq!(out["path"], json!([[0, 0], [2.5, 3.0]]));
    }

    #[test]
    fn test_serialize_uses_wire_names() {
        let element = CanvasElement::pencil(Point::new(1.0, 2.0), "#abcdef", 3.0);
        let value = serde_json::to_value(&element).expect("serialize");
        assert_eq!(value["element"], "pencil");
        assert_eq!(value["offsetX"], 1.0);
        assert_eq!(value["strokeWidth"], 3.0);
        assert_eq!(value["path"], json!([[1.0, 2.0]]));
    }

    #[test]
    fn test_absent_optional_fields_stay_absent() {
        let value = json!({"element": "line", "offsetX": 0, "offsetY": 0, "width": 4, "height": 4});
        let element: CanvasElement = serde_json::from_value(value).expect("should parse");
        let out = serde_json::to_value(&element).expect("serialize");
        assert!(out.get("stroke").is_none());
        assert!(out.get("strokeWidth").is_none());
    }

    #[test]
    fn test_append_point_only_on_paths() {
        let mut pencil = CanvasElement::pencil(Point::new(0.0, 0.0), "#fff", 1.0);
        assert!(pencil.append_point(Point::new(1.0, 1.0)));

        let mut text = CanvasElement::text(Point::new(0.0, 0.0), "hi", "#fff", 16.0, false);
        assert!(!text.append_point(Point::new(1.0, 1.0)));
    }

    #[test]
    fn test_auto_correct_closed_loop_becomes_circle() {
        let mut element = CanvasElement::pencil(Point::new(100.0, 50.0), "#00ff00", 7.0);
        for i in 1..=36 {
            let angle = f64::from(i) * std::f64::consts::TAU / 36.0;
            element.append_point(Point::new(50.0 + 50.0 * angle.cos(), 50.0 + 50.0 * angle.sin()));
        }
        assert!(element.auto_correct());
        assert_eq!(element.kind(), ElementKind::Ellipse);
        assert_eq!(element.stroke_color(), Some("#00ff00"));
        assert_eq!(element.stroke_width(), Some(7.0));

        let out = element.as_value();
        assert_eq!(out["element"], "circle");
        assert!(out.get("path").is_none());
    }

    #[test]
    fn test_auto_correct_carries_unknown_keys() {
        let mut raw = serde_json::to_value(CanvasElement::pencil(Point::new(0.0, 0.0), "#fff", 2.0))
            .expect("serialize");
        raw["id"] = json!("el-9");
        let mut element = CanvasElement::from_value(raw);
        for (x, y) in [(100.0, 0.0), (100.0, 80.0), (0.0, 80.0)] {
            for step in 0..4 {
                element.append_point(Point::new(x - f64::from(step), y));
            }
        }
        element.append_point(Point::new(5.0, 5.0));

        assert!(element.auto_correct());
        assert_eq!(element.as_value()["id"], "el-9");
        assert_eq!(
            CanvasElement::from_value(element.as_value().clone()).shape(),
            element.shape()
        );
    }

    #[test]
    fn test_auto_correct_ignores_non_pencil() {
        let mut text = CanvasElement::text(Point::new(0.0, 0.0), "hi", "#fff", 16.0, false);
        assert!(!text.auto_correct());
        assert_eq!(text.kind(), ElementKind::Text);
    }
}
