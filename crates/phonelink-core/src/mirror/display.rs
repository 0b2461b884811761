//! Display surface configuration

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_WIDTH: f64 = 100.0;
pub const DEFAULT_HEIGHT: f64 = 100.0;

/// Last applied configuration of the drawing surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub width: f64,
    pub height: f64,
    pub shift_x: f64,
    pub shift_y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            shift_x: 0.0,
            shift_y: 0.0,
            color: None,
            image: None,
            extra: Map::new(),
        }
    }
}

impl DisplayConfig {
    /// Shallow merge: each attribute set on `update` replaces the current one.
    pub fn apply(&mut self, update: &DisplayConfigUpdate) {
        let update = update.normalized();
        if let Some(width) = update.width {
            self.width = width;
        }
        if let Some(height) = update.height {
            self.height = height;
        }
        if let Some(shift_x) = update.shift_x {
            self.shift_x = shift_x;
        }
        if let Some(shift_y) = update.shift_y {
            self.shift_y = shift_y;
        }
        if update.color.is_some() {
            self.color = update.color;
        }
        if update.image.is_some() {
            self.image = update.image;
        }
        for (key, value) in update.extra {
            self.extra.insert(key, value);
        }
    }
}

/// Partial configuration sent by `configure_playground`.
///
/// `origin_x`/`origin_y` place the coordinate origin and are sent as the
/// negated shift.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfigUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shift_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shift_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DisplayConfigUpdate {
    pub fn sized(width: f64, height: f64) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            ..Default::default()
        }
    }

    pub fn with_origin(mut self, origin_x: f64, origin_y: f64) -> Self {
        self.origin_x = Some(origin_x);
        self.origin_y = Some(origin_y);
        self
    }

    /// Same update with origins folded into shifts and null extras dropped.
    pub fn normalized(&self) -> Self {
        let mut out = self.clone();
        if let Some(origin_x) = out.origin_x.take() {
            out.shift_x = Some(-origin_x);
        }
        if let Some(origin_y) = out.origin_y.take() {
            out.shift_y = Some(-origin_y);
        }
        out.extra.retain(|_, v| !v.is_null());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = DisplayConfig::default();
        assert_eq!(config.width, 100.0);
        assert_eq!(config.height, 100.0);
        assert_eq!(config.shift_x, 0.0);
    }

    #[test]
    fn test_origin_becomes_negated_shift() {
        let update = DisplayConfigUpdate::sized(200.0, 100.0).with_origin(100.0, 50.0);
        let mut config = DisplayConfig::default();
        config.apply(&update);
        assert_eq!(config.width, 200.0);
        assert_eq!(config.shift_x, -100.0);
        assert_eq!(config.shift_y, -50.0);
    }

    #[test]
    fn test_shallow_merge_keeps_previous_values() {
        let mut config = DisplayConfig::default();
        config.apply(&DisplayConfigUpdate {
            color: Some("black".into()),
            ..Default::default()
        });
        config.apply(&DisplayConfigUpdate::sized(50.0, 60.0));
        assert_eq!(config.color.as_deref(), Some("black"));
        assert_eq!(config.height, 60.0);
    }

    #[test]
    fn test_normalized_wire_form_has_no_origin() {
        let update = DisplayConfigUpdate::default().with_origin(10.0, 5.0);
        let value = serde_json::to_value(update.normalized()).unwrap();
        assert_eq!(value, json!({"shift_x": -10.0, "shift_y": -5.0}));
    }
}
