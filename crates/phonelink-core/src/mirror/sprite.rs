//! Sprite and line records
//!
//! Every attribute except `id` is optional. An unset attribute in an update
//! leaves the stored value untouched, so records can be sent piecemeal.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Assigns every `Some` field of `$src` onto `$dst`.
macro_rules! merge_some {
    ($dst:ident, $src:ident, $($field:ident),+ $(,)?) => {
        $(
            if $src.$field.is_some() {
                $dst.$field = $src.$field.clone();
            }
        )+
    };
}

/// Shape of a sprite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpriteForm {
    Round,
    Rectangle,
}

/// Whether a sprite is moved by the script or by the display's physics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Movement {
    Controlled,
    Uncontrolled,
}

/// A sprite on the display surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sprite {
    /// Empty means "let the runtime pick one" when adding.
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clickable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collision_detection: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form: Option<SpriteForm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub movement: Option<Movement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<(f64, f64)>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_span: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i64>,
    /// Attributes this runtime has no typed field for.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Sprite {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn at(mut self, pos_x: f64, pos_y: f64) -> Self {
        self.pos_x = Some(pos_x);
        self.pos_y = Some(pos_y);
        self
    }

    pub fn sized(mut self, width: f64, height: f64) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn colored(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn detects_collisions(&self) -> bool {
        self.collision_detection == Some(true)
    }
}

/// A straight line on the display surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Line {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x1: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y1: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Line {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            x1: Some(x1),
            y1: Some(y1),
            x2: Some(x2),
            y2: Some(y2),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// A drawable record stored by id in the mirror.
pub trait Entity: Clone {
    fn id(&self) -> &str;

    /// Field-level partial update: only attributes set on `update` change.
    fn merge_from(&mut self, update: &Self);
}

impl Entity for Sprite {
    fn id(&self) -> &str {
        &self.id
    }

    fn merge_from(&mut self, update: &Self) {
        merge_some!(
            self,
            update,
            clickable,
            collision_detection,
            color,
            border_color,
            direction,
            distance,
            form,
            movement,
            width,
            height,
            pos_x,
            pos_y,
            anchor,
            reset_time,
            speed,
            text,
            font_color,
            font_size,
            image,
            time_span,
            rotate,
            z_index,
        );
        merge_extra(&mut self.extra, &update.extra);
    }
}

impl Entity for Line {
    fn id(&self) -> &str {
        &self.id
    }

    fn merge_from(&mut self, update: &Self) {
        merge_some!(self, update, x1, y1, x2, y2, line_width, color, z_index);
        merge_extra(&mut self.extra, &update.extra);
    }
}

fn merge_extra(dst: &mut Map<String, Value>, src: &Map<String, Value>) {
    for (key, value) in src {
        if !value.is_null() {
            dst.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_keeps_unspecified_fields() {
        let mut sprite = Sprite::new("a").at(1.0, 2.0).colored("red");
        let update = Sprite {
            id: "a".into(),
            width: Some(3.0),
            ..Default::default()
        };
        sprite.merge_from(&update);
        assert_eq!(sprite.pos_x, Some(1.0));
        assert_eq!(sprite.color.as_deref(), Some("red"));
        assert_eq!(sprite.width, Some(3.0));
    }

    #[test]
    fn test_merge_carries_unknown_attributes() {
        let mut sprite: Sprite = serde_json::from_value(json!({"id": "a", "glow": 1})).unwrap();
        let update: Sprite =
            serde_json::from_value(json!({"id": "a", "glow": null, "shadow": true})).unwrap();
        sprite.merge_from(&update);
        assert_eq!(sprite.extra.get("glow"), Some(&json!(1)));
        assert_eq!(sprite.extra.get("shadow"), Some(&json!(true)));
    }

    #[test]
    fn test_sprite_serializes_only_set_fields() {
        let sprite = Sprite::new("s1").at(0.0, 5.0);
        let value = serde_json::to_value(&sprite).unwrap();
        assert_eq!(value, json!({"id": "s1", "pos_x": 0.0, "pos_y": 5.0}));
    }

    #[test]
    fn test_sprite_enums_use_wire_names() {
        let sprite: Sprite = serde_json::from_value(json!({
            "id": "b", "form": "round", "movement": "uncontrolled"
        }))
        .unwrap();
        assert_eq!(sprite.form, Some(SpriteForm::Round));
        assert_eq!(sprite.movement, Some(Movement::Uncontrolled));
    }

    #[test]
    fn test_line_merge() {
        let mut line = Line::new(0.0, 0.0, 10.0, 10.0).with_id("l1");
        let update = Line {
            id: "l1".into(),
            color: Some("blue".into()),
            ..Default::default()
        };
        line.merge_from(&update);
        assert_eq!(line.x2, Some(10.0));
        assert_eq!(line.color.as_deref(), Some("blue"));
    }
}
