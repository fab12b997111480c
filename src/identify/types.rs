//! Identification result types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Axis-aligned box in the still's pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// One descriptive name/value pair, e.g. `Material: Ceramic`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// The object detected in a still.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentificationResult {
    #[serde(alias = "objectName")]
    pub label: String,
    /// In `[0, 1]`.
    pub confidence: f64,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(alias = "boundingBox")]
    pub bounding_box: BoundingBox,
}

impl IdentificationResult {
    /// Confidence as a percentage with one decimal, e.g. `97.2%`.
    pub fn confidence_percent(&self) -> String {
        format!("{:.1}%", self.confidence * 100.0)
    }

    /// Short caption for the bounding box overlay, e.g. `Coffee Mug (97%)`.
    pub fn caption(&self) -> String {
        format!("{} ({}%)", self.label, (self.confidence * 100.0).round() as u32)
    }

    /// Check the confidence range. Backends are not trusted to get it right.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!(
                "confidence {} is outside [0, 1]",
                self.confidence
            ));
        }
        if self.label.trim().is_empty() {
            return Err("label is empty".to_string());
        }
        Ok(())
    }
}

impl fmt::Display for IdentificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}  [{} confidence]", self.label, self.confidence_percent())?;
        let b = &self.bounding_box;
        writeln!(
            f,
            "  Bounding box: x={} y={} width={} height={}",
            b.x, b.y, b.width, b.height
        )?;
        if !self.attributes.is_empty() {
            writeln!(f, "  Attributes:")?;
            for attr in &self.attributes {
                writeln!(f, "    {}: {}", attr.name, attr.value)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> IdentificationResult {
        IdentificationResult {
            label: "Coffee Mug".to_string(),
            confidence: 0.972,
            attributes: vec![Attribute::new("Material", "Ceramic")],
            bounding_box: BoundingBox {
                x: 128,
                y: 95,
                width: 256,
                height: 320,
            },
        }
    }

    #[test]
    fn test_confidence_formatting() {
        let result = sample();
        assert_eq!(result.confidence_percent(), "97.2%");
        assert_eq!(result.caption(), "Coffee Mug (97%)");
    }

    #[test]
    fn test_validate_rejects_out_of_range_confidence() {
        let mut result = sample();
        assert!(result.validate().is_ok());
        result.confidence = 1.5;
        assert!(result.validate().is_err());
        result.confidence = f64::NAN;
        assert!(result.validate().is_err());
    }

    #[test]
    fn test_deserialize_camel_case_payload() {
        let json = serde_json::json!({
            "objectName": "Coffee Mug",
            "confidence": 0.972,
            "attributes": [{"name": "Color", "value": "White"}],
            "boundingBox": {"x": 128, "y": 95, "width": 256, "height": 320}
        });
        let result: IdentificationResult = serde_json::from_value(json).unwrap();
        assert_eq!(result.label, "Coffee Mug");
        assert_eq!(result.attributes[0], Attribute::new("Color", "White"));
        assert_eq!(result.bounding_box.height, 320);
    }

    #[test]
    fn test_display_lists_attributes() {
        let out = sample().to_string();
        assert!(out.contains("Coffee Mug  [97.2% confidence]"));
        assert!(out.contains("Material: Ceramic"));
        assert!(out.contains("x=128 y=95 width=256 height=320"));
    }
}
