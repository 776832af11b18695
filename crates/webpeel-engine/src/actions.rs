//! Action-list normalization and deadline bookkeeping. The actual
//! page-manipulation calls live in `browser`, which drives a sidecar
//! process; this module only owns the normalize-then-schedule logic so it
//! can be unit tested without a real browser.

use serde_json::Value;
use std::time::Duration;
use webpeel_core::{Action, Error, Result, ScreenshotFormat, ScrollDirection, ScrollNamed, ScrollTarget};

pub const TOTAL_ACTIONS_DEADLINE: Duration = Duration::from_secs(30);
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Normalize one raw action object (the caller's JSON, which may use either
/// naming convention) into the canonical `Action` enum: `ms` vs
/// `milliseconds`, `text` vs `value`, relative `direction+amount` vs
/// absolute `to`.
pub fn normalize_action(raw: &Value) -> Result<Action> {
    let obj = raw
        .as_object()
        .ok_or_else(|| Error::Validation("action must be a JSON object".to_string()))?;
    let kind = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Validation("action is missing a \"type\" field".to_string()))?;

    let str_field = |keys: &[&str]| -> Option<String> {
        keys.iter()
            .find_map(|k| obj.get(*k)).and_then(Value::as_str).map(str::to_string)
    };
    let u64_field = |keys: &[&str]| -> Option<u64> {
        keys.iter().find_map(|k| obj.get(*k)).and_then(Value::as_u64)
    };

    match kind {
        "wait" => {
            let ms = u64_field(&["ms", "milliseconds"]).unwrap_or(1000);
            Ok(Action::Wait { ms })
        }
        "click" => Ok(Action::Click {
            selector: required_str(obj, "selector")?,
            timeout_ms: u64_field(&["timeoutMs", "timeout_ms", "timeout"]),
        }),
        "type" => Ok(Action::Type {
            selector: required_str(obj, "selector")?,
            text: str_field(&["text", "value"])
                .ok_or_else(|| Error::Validation("type action requires \"text\" or \"value\"".to_string()))?,
            timeout_ms: u64_field(&["timeoutMs", "timeout_ms", "timeout"]),
        }),
        "fill" => Ok(Action::Fill {
            selector: required_str(obj, "selector")?,
            text: str_field(&["text", "value"])
                .ok_or_else(|| Error::Validation("fill action requires \"text\" or \"value\"".to_string()))?,
            timeout_ms: u64_field(&["timeoutMs", "timeout_ms", "timeout"]),
        }),
        "select" => Ok(Action::Select {
            selector: required_str(obj, "selector")?,
            value: str_field(&["value", "text"])
                .ok_or_else(|| Error::Validation("select action requires \"value\"".to_string()))?,
            timeout_ms: u64_field(&["timeoutMs", "timeout_ms", "timeout"]),
        }),
        "press" => Ok(Action::Press {
            selector: str_field(&["selector"]),
            key: str_field(&["key", "value"])
                .ok_or_else(|| Error::Validation("press action requires \"key\"".to_string()))?,
            timeout_ms: u64_field(&["timeoutMs", "timeout_ms", "timeout"]),
        }),
        "hover" => Ok(Action::Hover {
            selector: required_str(obj, "selector")?,
            timeout_ms: u64_field(&["timeoutMs", "timeout_ms", "timeout"]),
        }),
        "scroll" => Ok(Action::Scroll { to: normalize_scroll_target(obj)? }),
        "waitforselector" | "wait_for_selector" => Ok(Action::WaitForSelector {
            selector: required_str(obj, "selector")?,
            timeout_ms: u64_field(&["timeoutMs", "timeout_ms", "timeout"]),
        }),
        "screenshot" => {
            let format = match str_field(&["format"]).as_deref() {
                Some("jpeg") | Some("jpg") => ScreenshotFormat::Jpeg,
                _ => ScreenshotFormat::Png,
            };
            Ok(Action::Screenshot {
                format,
                full_page: obj.get("fullPage").or_else(|| obj.get("full_page")).and_then(Value::as_bool).unwrap_or(true),
                quality: obj.get("quality").and_then(Value::as_u64).map(|q| q.min(100) as u8),
            })
        }
        other => Err(Error::Validation(format!("unknown action type: {other}"))),
    }
}

fn required_str(obj: &serde_json::Map<String, Value>, key: &str) -> Result<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::Validation(format!("action requires \"{key}\"")))
}

fn normalize_scroll_target(obj: &serde_json::Map<String, Value>) -> Result<ScrollTarget> {
    if let (Some(dir), Some(amount)) = (
        obj.get("direction").and_then(Value::as_str),
        obj.get("amount").and_then(Value::as_i64),
    ) {
        let direction = match dir {
            "up" => ScrollDirection::Up,
            "down" => ScrollDirection::Down,
            "left" => ScrollDirection::Left,
            "right" => ScrollDirection::Right,
            other => return Err(Error::Validation(format!("unknown scroll direction: {other}"))),
        };
        return Ok(ScrollTarget::Relative { direction, amount });
    }
    match obj.get("to") {
        Some(Value::String(s)) if s == "top" => Ok(ScrollTarget::Named(ScrollNamed::Top)),
        Some(Value::String(s)) if s == "bottom" => Ok(ScrollTarget::Named(ScrollNamed::Bottom)),
        Some(Value::Number(n)) => Ok(ScrollTarget::Pixels { x: 0, y: n.as_i64().unwrap_or(0) }),
        Some(Value::Object(point)) => {
            let x = point.get("x").and_then(Value::as_i64).unwrap_or(0);
            let y = point.get("y").and_then(Value::as_i64).unwrap_or(0);
            Ok(ScrollTarget::Pixels { x, y })
        }
        Some(other) => Err(Error::Validation(format!("invalid scroll \"to\" value: {other}"))),
        None => Ok(ScrollTarget::default()),
    }
}

/// Per-action timeout clamped by whatever remains of the 30s total
/// deadline: the whole action list shares one total-elapsed deadline, and
/// each action's own default timeout is 5s, clamped by what remains.
pub fn clamp_action_timeout(requested: Option<Duration>, remaining_total: Duration) -> Duration {
    requested.unwrap_or(DEFAULT_ACTION_TIMEOUT).min(remaining_total)
}

/// Result of the auto-scroll helper.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoScrollResult {
    pub scroll_count: u32,
    pub final_height: u64,
    pub content_grew: bool,
}

pub const AUTO_SCROLL_MAX_ITERATIONS: u32 = 20;
pub const AUTO_SCROLL_TIMEOUT: Duration = Duration::from_secs(30);
pub const AUTO_SCROLL_STABLE_PROBES: u32 = 2;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_ms_and_milliseconds_aliases() {
        let a = normalize_action(&json!({"type": "wait", "ms": 250})).unwrap();
        let b = normalize_action(&json!({"type": "wait", "milliseconds": 250})).unwrap();
        assert!(matches!(a, Action::Wait { ms: 250 }));
        assert!(matches!(b, Action::Wait { ms: 250 }));
    }

    #[test]
    fn normalizes_text_and_value_aliases() {
        let a = normalize_action(&json!({"type": "type", "selector": "#q", "text": "hi"})).unwrap();
        let b = normalize_action(&json!({"type": "type", "selector": "#q", "value": "hi"})).unwrap();
        match (a, b) {
            (Action::Type { text: t1, .. }, Action::Type { text: t2, .. }) => assert_eq!(t1, t2),
            _ => panic!("expected Type actions"),
        }
    }

    #[test]
    fn relative_scroll_takes_precedence_over_to() {
        let a = normalize_action(&json!({"type": "scroll", "direction": "down", "amount": 300})).unwrap();
        assert!(matches!(a, Action::Scroll { to: ScrollTarget::Relative { direction: ScrollDirection::Down, amount: 300 } }));
    }

    #[test]
    fn scroll_defaults_to_bottom() {
        let a = normalize_action(&json!({"type": "scroll"})).unwrap();
        assert!(matches!(a, Action::Scroll { to: ScrollTarget::Named(ScrollNamed::Bottom) }));
    }

    #[test]
    fn unknown_action_type_is_rejected() {
        assert!(normalize_action(&json!({"type": "teleport"})).is_err());
    }

    #[test]
    fn missing_required_field_is_rejected() {
        assert!(normalize_action(&json!({"type": "click"})).is_err());
    }

    #[test]
    fn action_timeout_is_clamped_by_remaining_total() {
        let clamped = clamp_action_timeout(Some(Duration::from_secs(10)), Duration::from_secs(3));
        assert_eq!(clamped, Duration::from_secs(3));
        let default_clamped = clamp_action_timeout(None, Duration::from_secs(60));
        assert_eq!(default_clamped, DEFAULT_ACTION_TIMEOUT);
    }
}
