use serde::de::DeserializeOwned;

use crate::client::AiError;

pub const MIN_POINTS: i64 = 10;
pub const MAX_POINTS: i64 = 500;
/// Used whenever a points suggestion cannot be obtained.
pub const DEFAULT_POINTS: i64 = 50;

/// Removes a surrounding Markdown code fence (```json ... ```), if any.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening line.
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

pub(crate) fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, AiError> {
    serde_json::from_str(strip_code_fence(text)).map_err(|e| AiError::Parse(e.to_string()))
}

/// Reads the first integer in a model reply such as "120" or "About 80 points".
pub fn parse_points(text: &str) -> Option<i64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..].chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Clamps into [10, 500]; a zero or missing number becomes the default.
pub fn clamp_points(points: Option<i64>) -> i64 {
    match points {
        Some(p) if p != 0 => p.clamp(MIN_POINTS, MAX_POINTS),
        _ => DEFAULT_POINTS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewear_types::api::{ImageAnalysis, Moderation};

    #[test]
    fn fences_are_stripped() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n[1]\n```  "), "[1]");
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn points_are_parsed_and_clamped() {
        assert_eq!(parse_points("120"), Some(120));
        assert_eq!(parse_points("About 80 points"), Some(80));
        assert_eq!(parse_points("no idea"), None);

        assert_eq!(clamp_points(Some(120)), 120);
        assert_eq!(clamp_points(Some(3)), MIN_POINTS);
        assert_eq!(clamp_points(Some(9000)), MAX_POINTS);
        assert_eq!(clamp_points(Some(0)), DEFAULT_POINTS);
        assert_eq!(clamp_points(None), DEFAULT_POINTS);
    }

    #[test]
    fn analysis_shape_parses() {
        let reply = "```json\n{\"category\":\"tops\",\"type\":\"t-shirt\",\"colors\":[\"red\"],\
                     \"style\":\"casual\",\"material\":\"cotton\",\"condition\":\"good\",\
                     \"tags\":[\"summer\"]}\n```";
        let analysis: ImageAnalysis = parse_json(reply).unwrap();
        assert_eq!(analysis.item_type, "t-shirt");
        assert_eq!(analysis.tags, vec!["summer"]);
    }

    #[test]
    fn moderation_shape_parses() {
        let m: Moderation =
            parse_json(r#"{"isAppropriate": false, "reason": "spam", "suggestedChanges": null}"#).unwrap();
        assert!(!m.is_appropriate);
        assert_eq!(m.reason.as_deref(), Some("spam"));

        assert!(matches!(parse_json::<Moderation>("sure!"), Err(AiError::Parse(_))));
    }
}
