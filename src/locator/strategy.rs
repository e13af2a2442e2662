use serde::{Deserialize, Serialize};

/// The ways an element can be identified on screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", content = "value", rename_all = "snake_case")]
pub enum LocatorStrategy {
    AccessibilityId(String),
    ResourceId(String),
    Text(String),
    Path(String),
    Coordinates { x: i32, y: i32 },
}

impl LocatorStrategy {
    /// Builds a locator from the free-form selector hint the reasoning model
    /// attaches to an action.
    ///
    /// Recognised forms: `accessibility_id:v` / `~v`, `id:v` / `resource_id:v`,
    /// `text:v`, `xpath:v` / `//...`, `coords:x,y`. A bare value containing
    /// `:id/` is a resource id; any other bare value is matched as text.
    pub fn from_hint(hint: &str) -> Option<Self> {
        let hint = hint.trim();
        if hint.is_empty() {
            return None;
        }

        if let Some((prefix, value)) = hint.split_once(':') {
            let value = value.trim();
            let parsed = match prefix.trim().to_ascii_lowercase().as_str() {
                "accessibility_id" | "accessibility-id" | "a11y" => {
                    Some(Self::AccessibilityId(value.to_string()))
                }
                "id" | "resource_id" | "resource-id" => Some(Self::ResourceId(value.to_string())),
                "text" => Some(Self::Text(value.to_string())),
                "xpath" | "path" => Some(Self::Path(value.to_string())),
                "coords" | "coordinates" => parse_coords(value),
                _ => None,
            };
            if let Some(locator) = parsed {
                return (!locator.value_is_empty()).then_some(locator);
            }
        }

        if let Some(rest) = hint.strip_prefix('~') {
            return (!rest.is_empty()).then(|| Self::AccessibilityId(rest.to_string()));
        }
        if hint.starts_with("//") {
            return Some(Self::Path(hint.to_string()));
        }
        if hint.contains(":id/") {
            return Some(Self::ResourceId(hint.to_string()));
        }
        Some(Self::Text(hint.to_string()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::AccessibilityId(_) => "accessibility_id",
            Self::ResourceId(_) => "resource_id",
            Self::Text(_) => "text",
            Self::Path(_) => "xpath",
            Self::Coordinates { .. } => "coords",
        }
    }

    fn value_is_empty(&self) -> bool {
        match self {
            Self::AccessibilityId(v) | Self::ResourceId(v) | Self::Text(v) | Self::Path(v) => {
                v.is_empty()
            }
            Self::Coordinates { .. } => false,
        }
    }
}

fn parse_coords(value: &str) -> Option<LocatorStrategy> {
    let (x, y) = value.split_once(',')?;
    Some(LocatorStrategy::Coordinates {
        x: x.trim().parse().ok()?,
        y: y.trim().parse().ok()?,
    })
}

impl std::fmt::Display for LocatorStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AccessibilityId(v) => write!(f, "accessibility_id:{v}"),
            Self::ResourceId(v) => write!(f, "id:{v}"),
            Self::Text(v) => write!(f, "text:{v}"),
            Self::Path(v) => write!(f, "xpath:{v}"),
            Self::Coordinates { x, y } => write!(f, "coords:{x},{y}"),
        }
    }
}
