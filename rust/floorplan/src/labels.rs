// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Room dimension labels in OCR output.
//!
//! OCR itself happens elsewhere. This module only recognises which text
//! lines carry a room dimension such as `12'6" x 10'` or `3.5 x 4.2 m`, so
//! their bounding boxes can seed the room box refiner. Values are kept in
//! the unit they were written in.

use crate::types::TextAnchor;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

static IMPERIAL_RE: OnceLock<Regex> = OnceLock::new();
static METRIC_RE: OnceLock<Regex> = OnceLock::new();

/// Unit a dimension label was written in
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LengthUnit {
    /// Feet with optional inches, stored as decimal feet
    Feet,
    Meters,
    Centimeters,
    Millimeters,
    /// Two numbers without a recognisable unit
    Unitless,
}

/// Parsed `first x second` room dimension
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RoomDimension {
    pub first: f64,
    pub second: f64,
    pub unit: LengthUnit,
}

/// OCR line that carries a room dimension
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionAnchor {
    pub anchor: TextAnchor,
    pub dimension: RoomDimension,
}

fn imperial_re() -> &'static Regex {
    IMPERIAL_RE.get_or_init(|| {
        Regex::new(
            r#"(\d+)\s*(?:'|ft)\s*(?:(\d+(?:\.\d+)?)\s*(?:"|''|in))?\s*[xX×*]\s*(\d+)\s*(?:'|ft)\s*(?:(\d+(?:\.\d+)?)\s*(?:"|''|in))?"#,
        )
        .unwrap()
    })
}

fn metric_re() -> &'static Regex {
    METRIC_RE.get_or_init(|| {
        Regex::new(r"(?i)(\d+(?:[.,]\d+)?)\s*(mm|cm|m)?\s*[x×*]\s*(\d+(?:[.,]\d+)?)\s*(mm|cm|m)?\b")
            .unwrap()
    })
}

fn parse_number(text: &str) -> Option<f64> {
    text.replace(',', ".").parse().ok()
}

fn feet_inches(feet: Option<regex::Match<'_>>, inches: Option<regex::Match<'_>>) -> Option<f64> {
    let feet = parse_number(feet?.as_str())?;
    let inches = match inches {
        Some(m) => parse_number(m.as_str())?,
        None => 0.0,
    };
    Some(feet + inches / 12.0)
}

/// Recognise a room dimension in one OCR text line.
pub fn parse_dimension(text: &str) -> Option<RoomDimension> {
    if let Some(caps) = imperial_re().captures(text) {
        let first = feet_inches(caps.get(1), caps.get(2))?;
        let second = feet_inches(caps.get(3), caps.get(4))?;
        return Some(RoomDimension {
            first,
            second,
            unit: LengthUnit::Feet,
        });
    }

    let caps = metric_re().captures(text)?;
    let first = parse_number(caps.get(1)?.as_str())?;
    let second = parse_number(caps.get(3)?.as_str())?;
    let unit_text = caps
        .get(4)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_ascii_lowercase());
    let unit = match unit_text.as_deref() {
        Some("m") => LengthUnit::Meters,
        Some("cm") => LengthUnit::Centimeters,
        Some("mm") => LengthUnit::Millimeters,
        _ => LengthUnit::Unitless,
    };
    Some(RoomDimension {
        first,
        second,
        unit,
    })
}

/// Keep the OCR lines that carry a room dimension.
pub fn find_dimension_anchors(lines: &[TextAnchor]) -> Vec<DimensionAnchor> {
    lines
        .iter()
        .filter_map(|line| {
            parse_dimension(&line.text).map(|dimension| DimensionAnchor {
                anchor: line.clone(),
                dimension,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LabelBox;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_feet_and_inches() {
        let d = parse_dimension("12'6\" x 10'").unwrap();
        assert_eq!(d.unit, LengthUnit::Feet);
        assert_abs_diff_eq!(d.first, 12.5);
        assert_abs_diff_eq!(d.second, 10.0);

        let d = parse_dimension("LIVING 12' x 10'6\"").unwrap();
        assert_abs_diff_eq!(d.first, 12.0);
        assert_abs_diff_eq!(d.second, 10.5);
    }

    #[test]
    fn test_metric() {
        let d = parse_dimension("3.5 x 4.2 m").unwrap();
        assert_eq!(d.unit, LengthUnit::Meters);
        assert_abs_diff_eq!(d.first, 3.5);
        assert_abs_diff_eq!(d.second, 4.2);

        let d = parse_dimension("350 x 420 cm").unwrap();
        assert_eq!(d.unit, LengthUnit::Centimeters);

        let d = parse_dimension("3,5 × 4,2m").unwrap();
        assert_eq!(d.unit, LengthUnit::Meters);
        assert_abs_diff_eq!(d.first, 3.5);
    }

    #[test]
    fn test_plain_room_name_is_not_a_dimension() {
        assert!(parse_dimension("KITCHEN").is_none());
        assert!(parse_dimension("Bed 2").is_none());
    }

    #[test]
    fn test_find_dimension_anchors() {
        let lines = vec![
            TextAnchor {
                text: "BEDROOM".into(),
                bbox: LabelBox::new(10.0, 10.0, 60.0, 12.0),
            },
            TextAnchor {
                text: "11'3\" x 12'".into(),
                bbox: LabelBox::new(10.0, 25.0, 70.0, 12.0),
            },
        ];
        let anchors = find_dimension_anchors(&lines);
        assert_eq!(anchors.len(), 1);
        assert_abs_diff_eq!(anchors[0].anchor.bbox.y, 25.0);
        assert_abs_diff_eq!(anchors[0].dimension.first, 11.25);
    }
}
