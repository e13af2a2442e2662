/// UI hierarchy pruning.
///
/// Turns the raw XML page source of a UiAutomator2 (or XCUITest) dump into a
/// flat, document-ordered list of elements worth showing to the reasoning
/// model. Nodes without usable bounds, hidden nodes, zero-area nodes and
/// anonymous non-clickable containers are dropped.
use std::collections::HashMap;
use std::fmt::Write as _;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::errors::{PilotError, PilotResult};
use crate::perception::types::{Bounds, PrunedElement};

/// Visible characters kept from a text attribute before it is cut.
pub const MAX_TEXT_CHARS: usize = 50;
const ELLIPSIS: &str = "...";

/// Prunes a raw hierarchy, swallowing parse failures.
///
/// Malformed input yields an empty list; the failure is logged.
pub fn prune(raw: &str) -> Vec<PrunedElement> {
    match try_prune(raw) {
        Ok(elements) => elements,
        Err(e) => {
            tracing::warn!(error = %e, "hierarchy could not be parsed; no elements");
            Vec::new()
        }
    }
}

/// Prunes a raw hierarchy, reporting malformed input to the caller.
pub fn try_prune(raw: &str) -> PilotResult<Vec<PrunedElement>> {
    if raw.trim().is_empty() {
        return Err(PilotError::Hierarchy("empty hierarchy".into()));
    }

    let mut reader = Reader::from_str(raw);
    reader.trim_text(true);

    let mut out = Vec::new();
    let mut depth: usize = 0;
    let mut seen_nodes = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(tag) => {
                depth += 1;
                seen_nodes += 1;
                visit(&tag, &mut out)?;
            }
            Event::Empty(tag) => {
                seen_nodes += 1;
                visit(&tag, &mut out)?;
            }
            Event::End(_) => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    PilotError::Hierarchy("closing tag without matching opening tag".into())
                })?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if depth != 0 {
        return Err(PilotError::Hierarchy(format!(
            "hierarchy ended with {depth} unclosed node(s)"
        )));
    }
    if seen_nodes == 0 {
        return Err(PilotError::Hierarchy("no nodes in hierarchy".into()));
    }

    tracing::debug!(nodes = seen_nodes, kept = out.len(), "hierarchy pruned");
    Ok(out)
}

fn visit(tag: &BytesStart<'_>, out: &mut Vec<PrunedElement>) -> PilotResult<()> {
    let name = String::from_utf8_lossy(tag.name().as_ref()).into_owned();
    let mut attrs: HashMap<String, String> = HashMap::new();
    for attr in tag.attributes() {
        let attr = attr.map_err(|e| PilotError::Hierarchy(format!("bad attribute on <{name}>: {e}")))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        attrs.insert(key, value);
    }
    if let Some(el) = node_to_element(&name, &attrs) {
        out.push(el);
    }
    Ok(())
}

fn node_to_element(tag: &str, attrs: &HashMap<String, String>) -> Option<PrunedElement> {
    let get = |k: &str| attrs.get(k).map(String::as_str);

    let bounds = match get("bounds") {
        Some(raw) => Bounds::parse(raw)?,
        None => rect_bounds(attrs)?,
    };
    if get("displayed") == Some("false") || get("visible") == Some("false") {
        return None;
    }
    if !bounds.has_area() {
        return None;
    }

    let id = non_empty(get("resource-id")).or_else(|| non_empty(get("name")));
    let text = non_empty(get("text"))
        .or_else(|| non_empty(get("label")))
        .or_else(|| non_empty(get("value")))
        .map(|t| truncate(&t));
    let description = non_empty(get("content-desc")).map(|t| truncate(&t));
    let clickable = get("clickable") == Some("true");

    if id.is_none() && text.is_none() && description.is_none() && !clickable {
        return None;
    }

    let class_name = get("class")
        .or_else(|| get("type"))
        .unwrap_or(tag)
        .to_string();

    Some(PrunedElement {
        id,
        text,
        description,
        class_name,
        bounds,
        clickable,
        enabled: get("enabled") != Some("false"),
    })
}

/// XCUITest dumps carry `x`/`y`/`width`/`height` instead of a bounds string.
fn rect_bounds(attrs: &HashMap<String, String>) -> Option<Bounds> {
    let n = |k: &str| attrs.get(k)?.trim().parse::<i32>().ok();
    Some(Bounds::from_rect(n("x")?, n("y")?, n("width")?, n("height")?))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    let v = value?.trim();
    (!v.is_empty()).then(|| v.to_string())
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_TEXT_CHARS {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(MAX_TEXT_CHARS).collect();
    cut.push_str(ELLIPSIS);
    cut
}

/// Renders pruned elements one per line for the reasoning prompt.
pub fn format_elements(elements: &[PrunedElement]) -> String {
    if elements.is_empty() {
        return "(no interactive elements detected)".to_string();
    }

    let mut out = String::new();
    for (idx, el) in elements.iter().enumerate() {
        let _ = write!(out, "[{idx}]");
        if let Some(text) = &el.text {
            let _ = write!(out, " \"{text}\"");
        }
        if let Some(desc) = &el.description {
            let _ = write!(out, " desc=\"{desc}\"");
        }
        if let Some(id) = el.short_id() {
            let _ = write!(out, " id={id}");
        }
        let c = el.center();
        let _ = write!(out, " ({}) @({},{})", el.short_class(), c.x, c.y);
        if el.clickable {
            out.push_str(" clickable");
        }
        if !el.enabled {
            out.push_str(" disabled");
        }
        out.push('\n');
    }
    out.pop();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const LOGIN_DUMP: &str = r#"<?xml version='1.0' encoding='UTF-8' standalone='yes' ?>
<hierarchy rotation="0">
  <node class="android.widget.FrameLayout" bounds="[0,0][1080,2340]" clickable="false">
    <node class="android.widget.TextView" text="Welcome back" resource-id="" bounds="[90,300][990,400]" />
    <node class="android.widget.EditText" resource-id="com.example:id/username" text="" bounds="[90,600][990,720]" clickable="true" />
    <node class="android.view.View" bounds="[0,0][1080,10]" />
    <node class="android.widget.Button" text="Log in" content-desc="Log in button" resource-id="com.example:id/login" bounds="[90,1000][990,1120]" clickable="true" enabled="false" />
  </node>
</hierarchy>"#;

    #[test]
    fn keeps_decision_relevant_nodes_in_document_order() {
        let els = try_prune(LOGIN_DUMP).unwrap();
        let ids: Vec<_> = els.iter().map(|e| e.short_class().to_string()).collect();
        assert_eq!(ids, vec!["TextView", "EditText", "Button"]);

        assert_eq!(els[0].text.as_deref(), Some("Welcome back"));
        assert_eq!(els[0].id, None);
        assert_eq!(els[1].id.as_deref(), Some("com.example:id/username"));
        assert_eq!(els[1].text, None);
        assert!(els[1].clickable);
        assert!(els[1].enabled);
        assert!(!els[2].enabled);
        assert_eq!(els[2].description.as_deref(), Some("Log in button"));
    }

    #[test]
    fn nested_nodes_are_visited_pre_order() {
        let xml = r#"<hierarchy>
          <node text="A" bounds="[0,0][10,10]">
            <node text="B" bounds="[0,0][5,5]">
              <node text="C" bounds="[0,0][2,2]"/>
            </node>
            <node text="D" bounds="[5,5][10,10]"/>
          </node>
        </hierarchy>"#;
        let texts: Vec<_> = prune(xml).into_iter().filter_map(|e| e.text).collect();
        assert_eq!(texts, vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn drops_hidden_zero_area_and_unbounded_nodes() {
        let xml = r#"<hierarchy>
          <node text="hidden" displayed="false" bounds="[0,0][10,10]"/>
          <node text="flat" bounds="[0,10][100,10]"/>
          <node text="inverted" bounds="[50,0][10,10]"/>
          <node text="no bounds"/>
          <node text="bad bounds" bounds="[0,0]-[1,1]"/>
          <node text="ok" bounds="[0,0][1,1]"/>
        </hierarchy>"#;
        let els = prune(xml);
        assert_eq!(els.len(), 1);
        assert_eq!(els[0].text.as_deref(), Some("ok"));
        assert!(els.iter().all(|e| e.bounds.width() > 0 && e.bounds.height() > 0));
    }

    #[test]
    fn keeps_element_spanning_extreme_edges() {
        let els = prune(r#"<hierarchy><node text="wide" bounds="[-2000000000,0][2000000000,10]"/></hierarchy>"#);
        assert_eq!(els.len(), 1);
        assert_eq!(els[0].text.as_deref(), Some("wide"));
    }

    #[test]
    fn truncates_long_text_with_ellipsis() {
        let long = "x".repeat(80);
        let xml = format!(r#"<hierarchy><node text="  {long}  " bounds="[0,0][5,5]"/></hierarchy>"#);
        let els = prune(&xml);
        let text = els[0].text.as_deref().unwrap();
        assert_eq!(text.chars().count(), MAX_TEXT_CHARS + ELLIPSIS.len());
        assert!(text.ends_with("..."));

        let exact = "y".repeat(MAX_TEXT_CHARS);
        let xml = format!(r#"<hierarchy><node text="{exact}" bounds="[0,0][5,5]"/></hierarchy>"#);
        assert_eq!(prune(&xml)[0].text.as_deref(), Some(exact.as_str()));
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let long = "é".repeat(60);
        let xml = format!(r#"<hierarchy><node text="{long}" bounds="[0,0][5,5]"/></hierarchy>"#);
        let text = prune(&xml)[0].text.clone().unwrap();
        assert_eq!(text.chars().count(), 53);
    }

    #[test]
    fn whitespace_only_text_becomes_absent() {
        let xml = r#"<hierarchy><node text="   " clickable="true" bounds="[0,0][5,5]"/></hierarchy>"#;
        let els = prune(xml);
        assert_eq!(els.len(), 1);
        assert_eq!(els[0].text, None);
    }

    #[test]
    fn reads_xcuitest_rect_attributes() {
        let xml = r#"<AppiumAUT>
          <XCUIElementTypeApplication type="XCUIElementTypeApplication" x="0" y="0" width="390" height="844">
            <XCUIElementTypeButton type="XCUIElementTypeButton" name="loginButton" label="Log In" x="20" y="700" width="350" height="50" visible="true"/>
            <XCUIElementTypeStaticText type="XCUIElementTypeStaticText" label="gone" x="0" y="0" width="10" height="10" visible="false"/>
          </XCUIElementTypeApplication>
        </AppiumAUT>"#;
        let els = prune(xml);
        assert_eq!(els.len(), 1);
        assert_eq!(els[0].id.as_deref(), Some("loginButton"));
        assert_eq!(els[0].text.as_deref(), Some("Log In"));
        assert_eq!(els[0].short_class(), "XCUIElementTypeButton");
        assert_eq!(els[0].center().x, 195);
    }

    #[test]
    fn malformed_input_yields_empty_and_error() {
        for raw in ["", "   ", "not xml at all", "<hierarchy><node bounds=\"[0,0][1,1]\">", "<a></b>"] {
            assert!(try_prune(raw).is_err(), "{raw:?} should be rejected");
            assert!(prune(raw).is_empty());
        }
    }

    #[test]
    fn formats_one_line_per_element() {
        let els = try_prune(LOGIN_DUMP).unwrap();
        let text = format_elements(&els);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "[0] \"Welcome back\" (TextView) @(540,350)");
        assert_eq!(lines[1], "[1] id=username (EditText) @(540,660) clickable");
        assert_eq!(
            lines[2],
            "[2] \"Log in\" desc=\"Log in button\" id=login (Button) @(540,1060) clickable disabled"
        );
    }

    #[test]
    fn formats_empty_list() {
        assert_eq!(format_elements(&[]), "(no interactive elements detected)");
    }
}
