use serde::{Deserialize, Serialize};

use crate::perception::types::{Point, ScreenSize};

/// Outcome of a structural element lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ElementResult {
    Found {
        center: Point,
        #[serde(skip_serializing_if = "Option::is_none")]
        size: Option<ScreenSize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    NotFound {
        reason: String,
    },
}

impl ElementResult {
    pub fn found(center: Point) -> Self {
        Self::Found {
            center,
            size: None,
            text: None,
        }
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::NotFound {
            reason: reason.into(),
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found { .. })
    }

    pub fn center(&self) -> Option<Point> {
        match self {
            Self::Found { center, .. } => Some(*center),
            Self::NotFound { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Found { .. } => None,
            Self::NotFound { reason } => Some(reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwipeDirection {
    Up,
    Down,
    Left,
    Right,
}

impl SwipeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Left => "left",
            Self::Right => "right",
        }
    }

    /// Start and end points of a finger swipe in this direction, covering the
    /// middle band of the screen.
    pub fn gesture(&self, screen: ScreenSize) -> (Point, Point) {
        let w = screen.width as i32;
        let h = screen.height as i32;
        let (cx, cy) = (w / 2, h / 2);
        let (near_x, far_x) = (w / 5, w * 4 / 5);
        let (near_y, far_y) = (h / 5, h * 4 / 5);
        match self {
            // Content moves up: finger travels bottom -> top.
            Self::Up => (Point::new(cx, far_y), Point::new(cx, near_y)),
            Self::Down => (Point::new(cx, near_y), Point::new(cx, far_y)),
            Self::Left => (Point::new(far_x, cy), Point::new(near_x, cy)),
            Self::Right => (Point::new(near_x, cy), Point::new(far_x, cy)),
        }
    }
}

impl std::fmt::Display for SwipeDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
