use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// A point in device pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

/// Element rectangle in device pixels, edges as reported by the hierarchy dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

fn bounds_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\[\s*(-?\d+)\s*,\s*(-?\d+)\s*\]\[\s*(-?\d+)\s*,\s*(-?\d+)\s*\]$")
            .expect("bounds pattern is valid")
    })
}

impl Bounds {
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Parses the UiAutomator form `[x1,y1][x2,y2]`.
    /// Returns `None` for anything that does not match that shape.
    pub fn parse(raw: &str) -> Option<Self> {
        let caps = bounds_re().captures(raw.trim())?;
        let n = |i: usize| caps.get(i)?.as_str().parse::<i32>().ok();
        Some(Self::new(n(1)?, n(2)?, n(3)?, n(4)?))
    }

    /// Builds bounds from an origin and size (XCUITest style attributes).
    pub fn from_rect(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self::new(x, y, x.saturating_add(width), y.saturating_add(height))
    }

    /// Widened so extreme edges cannot overflow.
    pub fn width(&self) -> i64 {
        i64::from(self.x2) - i64::from(self.x1)
    }

    pub fn height(&self) -> i64 {
        i64::from(self.y2) - i64::from(self.y1)
    }

    pub fn has_area(&self) -> bool {
        self.width() > 0 && self.height() > 0
    }

    /// Rounded midpoint of the rectangle.
    pub fn center(&self) -> Point {
        let cx = ((self.x1 as f64 + self.x2 as f64) / 2.0).round() as i32;
        let cy = ((self.y1 as f64 + self.y2 as f64) / 2.0).round() as i32;
        Point::new(cx, cy)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x1 && p.x < self.x2 && p.y >= self.y1 && p.y < self.y2
    }
}

/// One decision-relevant on-screen node, flattened out of the raw hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrunedElement {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub class_name: String,
    pub bounds: Bounds,
    pub clickable: bool,
    pub enabled: bool,
}

impl PrunedElement {
    pub fn center(&self) -> Point {
        self.bounds.center()
    }

    /// Resource ids look like `com.example:id/username`; keep the tail.
    pub fn short_id(&self) -> Option<&str> {
        self.id
            .as_deref()
            .map(|id| id.rsplit('/').next().unwrap_or(id))
    }

    /// `android.widget.EditText` -> `EditText`.
    pub fn short_class(&self) -> &str {
        self.class_name
            .rsplit('.')
            .next()
            .unwrap_or(&self.class_name)
    }
}
