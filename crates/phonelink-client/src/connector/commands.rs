//! Display commands
//!
//! Every command updates the local mirror first and then sends the message,
//! so reads issued right after a command already see its effect.

use rand::Rng;
use serde_json::{Map, Value};

use phonelink_core::prelude::*;
use phonelink_core::{
    Cell, ColorMsg, DisplayConfig, DisplayConfigUpdate, Grid, GridInput, GridMsg, GridTarget,
    GridUpdate, Line, Payload, PlaygroundConfig, RemoveById, Sprite,
};

use super::Connector;
use crate::protocol::{events, Delivery};

/// Base color of grids built by [`Connector::setup_grid`].
const DEFAULT_BASE_COLOR: &str = "white";

/// Fresh `<prefix><5 digits>` id not rejected by `taken`.
pub(super) fn generate_id(prefix: &str, taken: impl Fn(&str) -> bool) -> String {
    let mut rng = rand::thread_rng();
    loop {
        let id = format!("{prefix}{}", rng.gen_range(10_000..=99_999));
        if !taken(&id) {
            return id;
        }
    }
}

impl Connector {
    /// Apply `payload` to the mirror, then send it.
    pub(super) fn command(&self, payload: Payload) -> Result<f64> {
        self.state().apply_to_mirror(&payload);
        self.send(payload)
    }

    /// Background color of the panel. Any CSS color string passes through.
    pub fn set_color(&self, color: impl Into<Cell>) -> Result<f64> {
        self.send(Payload::Color(ColorMsg {
            color: color.into(),
        }))
    }

    // ─────────────────────────────────────────────────────────────
    // Grid
    // ─────────────────────────────────────────────────────────────

    /// Replace the grid.
    ///
    /// The input goes out as given; the mirror keeps its normalized form.
    pub fn set_grid(
        &self,
        grid: impl Into<GridInput>,
        base_color: Option<Cell>,
        enumerate: Option<bool>,
    ) -> Result<f64> {
        self.command(Payload::Grid(GridMsg {
            grid: grid.into(),
            base_color,
            enumerate,
        }))
    }

    pub fn set_image(
        &self,
        image: impl Into<GridInput>,
        base_color: Option<Cell>,
        enumerate: Option<bool>,
    ) -> Result<f64> {
        self.set_grid(image, base_color, enumerate)
    }

    /// `rows` × `columns` grid filled with `cell` (brightness 0 by default)
    /// on a white base.
    pub fn setup_grid(&self, rows: usize, columns: usize, cell: Option<Cell>) -> Result<f64> {
        let grid = Grid::filled(rows, columns, cell.unwrap_or_default());
        self.set_grid(
            GridInput::Rows(grid.cells().to_vec()),
            Some(Cell::from(DEFAULT_BASE_COLOR)),
            None,
        )
    }

    /// Single white cell.
    pub fn reset_grid(&self) -> Result<f64> {
        self.set_grid(
            GridInput::Rows(vec![vec![Cell::from(DEFAULT_BASE_COLOR)]]),
            None,
            None,
        )
    }

    /// Write one cell, growing the grid when the target lies outside it.
    pub fn set_grid_at(&self, target: GridTarget, color: impl Into<Cell>) -> Result<f64> {
        self.update_grid(target, color, None, None)
    }

    pub fn update_cell(&self, target: GridTarget, color: impl Into<Cell>) -> Result<f64> {
        self.update_grid(target, color, None, None)
    }

    /// Cell write with explicit `base_color` and `enumerate`.
    ///
    /// Cell number 0 is rejected before anything is sent.
    pub fn update_grid(
        &self,
        target: GridTarget,
        color: impl Into<Cell>,
        base_color: Option<Cell>,
        enumerate: Option<bool>,
    ) -> Result<f64> {
        let color = color.into();
        let (row, column) = self.state().mirror.apply_grid_write(target, color.clone())?;
        trace!("Grid write at ({}, {})", row, column);

        let mut update = GridUpdate::at(target, color);
        update.base_color = base_color;
        update.enumerate = enumerate;
        self.send(Payload::GridUpdate(update))
    }

    /// Copy of the grid as last set.
    pub fn get_grid(&self) -> Grid {
        self.state().mirror.grid().clone()
    }

    pub fn get_grid_at(&self, row: usize, column: usize) -> Option<Cell> {
        self.state().mirror.grid().get(row, column).cloned()
    }

    /// Cell by 1-indexed number, row-major.
    pub fn get_grid_cell(&self, cell_number: usize) -> Option<Cell> {
        self.state()
            .mirror
            .grid()
            .get_cell_number(cell_number)
            .cloned()
    }

    // ─────────────────────────────────────────────────────────────
    // Sprites and lines
    // ─────────────────────────────────────────────────────────────

    /// Add or update a sprite; returns its id.
    ///
    /// Unset fields leave the stored values alone. An empty id gets a
    /// generated `sprite<nnnnn>` one.
    pub fn add_sprite(&self, mut sprite: Sprite) -> Result<String> {
        if sprite.id.is_empty() {
            let state = self.state();
            sprite.id = generate_id("sprite", |id| state.mirror.sprites.contains(id));
        }
        let id = sprite.id.clone();
        self.command(Payload::Sprite(sprite))?;
        Ok(id)
    }

    pub fn update_sprite(&self, sprite: Sprite) -> Result<String> {
        self.add_sprite(sprite)
    }

    /// Remove a sprite; returns the record as it was, if known.
    pub fn remove_sprite(&self, id: &str) -> Result<Option<Sprite>> {
        let removed = self.state().mirror.remove_sprite(id);
        self.send(Payload::RemoveSprite(RemoveById { id: id.to_string() }))?;
        Ok(removed)
    }

    pub fn sprites(&self) -> Vec<Sprite> {
        self.state().mirror.sprites.all().to_vec()
    }

    /// Sprite by id, or the first sprite when `id` is `None`.
    pub fn get_sprite(&self, id: Option<&str>) -> Option<Sprite> {
        let state = self.state();
        match id {
            Some(id) => state.mirror.sprite(id).cloned(),
            None => state.mirror.sprites.first().cloned(),
        }
    }

    pub fn add_line(&self, mut line: Line) -> Result<String> {
        if line.id.is_empty() {
            let state = self.state();
            line.id = generate_id("line", |id| state.mirror.lines.contains(id));
        }
        let id = line.id.clone();
        self.command(Payload::Line(line))?;
        Ok(id)
    }

    pub fn update_line(&self, line: Line) -> Result<String> {
        self.add_line(line)
    }

    pub fn remove_line(&self, id: &str) -> Result<Option<Line>> {
        let removed = self.state().mirror.remove_line(id);
        self.send(Payload::RemoveLine(RemoveById { id: id.to_string() }))?;
        Ok(removed)
    }

    pub fn lines(&self) -> Vec<Line> {
        self.state().mirror.lines.all().to_vec()
    }

    // ─────────────────────────────────────────────────────────────
    // Playground
    // ─────────────────────────────────────────────────────────────

    /// Merge `update` into the display configuration.
    ///
    /// Origins are sent as negated shifts.
    pub fn configure_playground(&self, update: DisplayConfigUpdate) -> Result<f64> {
        self.command(Payload::PlaygroundConfig(PlaygroundConfig {
            config: update.normalized(),
        }))
    }

    /// Remove every sprite and line and restore the default configuration.
    pub fn clear_playground(&self) -> Result<f64> {
        self.command(Payload::ClearPlayground)
    }

    pub fn playground_config(&self) -> DisplayConfig {
        self.state().mirror.display().clone()
    }

    // ─────────────────────────────────────────────────────────────
    // Rooms and server-side data
    // ─────────────────────────────────────────────────────────────

    pub fn join_room(&self, room: &str) -> Result<f64> {
        self.emit(events::JOIN_ROOM, room_payload(room), &Delivery::Default)
    }

    pub fn leave_room(&self, room: &str) -> Result<f64> {
        self.emit(events::LEAVE_ROOM, room_payload(room), &Delivery::Default)
    }

    /// Ask the server for the device list; answered by a `devices` event.
    pub fn get_devices(&self) -> Result<f64> {
        self.emit(events::GET_DEVICES, Map::new(), &Delivery::Default)
    }

    /// Ask the server for our buffered data; answered by `all_data`.
    pub fn request_all_data(&self) -> Result<f64> {
        self.emit(events::GET_ALL_DATA, Map::new(), &self.delivery)
    }

    /// Ask the server to drop our buffered data.
    pub fn clear_data(&self) -> Result<f64> {
        self.emit(events::CLEAR_DATA, Map::new(), &self.delivery)
    }
}

fn room_payload(room: &str) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("room".into(), Value::String(room.to_string()));
    payload
}

#[cfg(test)]
mod tests {
    use super::super::testing::{settle, started};
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_add_sprite_generates_id_and_mirrors() {
        let (connector, mut server) = started().await;
        let id = connector
            .add_sprite(Sprite::new("").at(1.0, 2.0).colored("red"))
            .unwrap();
        assert!(id.starts_with("sprite"));
        assert_eq!(id.len(), "sprite".len() + 5);

        let frame = server.next_event(events::NEW_DATA).await.unwrap();
        assert_eq!(frame.payload["type"], json!("sprite"));
        assert_eq!(frame.payload["sprite"]["id"], json!(id.clone()));
        assert_eq!(frame.payload["sprite"]["color"], json!("red"));
        assert_eq!(connector.get_sprite(Some(&id)).unwrap().pos_x, Some(1.0));
    }

    #[tokio::test]
    async fn test_update_sprite_keeps_unset_fields() {
        let (connector, _server) = started().await;
        connector.add_sprite(Sprite::new("s1").colored("red")).unwrap();
        connector
            .update_sprite(Sprite {
                id: "s1".into(),
                pos_x: Some(5.0),
                ..Default::default()
            })
            .unwrap();

        let sprite = connector.get_sprite(Some("s1")).unwrap();
        assert_eq!(sprite.color.as_deref(), Some("red"));
        assert_eq!(sprite.pos_x, Some(5.0));
        assert_eq!(connector.sprites().len(), 1);
    }

    #[tokio::test]
    async fn test_get_sprite_without_id_returns_first() {
        let (connector, _server) = started().await;
        assert!(connector.get_sprite(None).is_none());
        connector.add_sprite(Sprite::new("a")).unwrap();
        connector.add_sprite(Sprite::new("b")).unwrap();
        assert_eq!(connector.get_sprite(None).unwrap().id, "a");
    }

    #[tokio::test]
    async fn test_remove_sprite_returns_record() {
        let (connector, mut server) = started().await;
        connector.add_sprite(Sprite::new("gone").colored("blue")).unwrap();
        let removed = connector.remove_sprite("gone").unwrap().unwrap();
        assert_eq!(removed.color.as_deref(), Some("blue"));
        assert!(connector.remove_sprite("gone").unwrap().is_none());

        server.next_event(events::NEW_DATA).await.unwrap();
        let frame = server.next_event(events::NEW_DATA).await.unwrap();
        assert_eq!(frame.payload["type"], json!("remove_sprite"));
        assert_eq!(frame.payload["id"], json!("gone"));
    }

    #[tokio::test]
    async fn test_lines() {
        let (connector, _server) = started().await;
        let id = connector.add_line(Line::new(0.0, 0.0, 10.0, 10.0)).unwrap();
        assert!(id.starts_with("line"));
        connector
            .update_line(Line {
                id: id.clone(),
                color: Some("green".into()),
                ..Default::default()
            })
            .unwrap();

        let lines = connector.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].x2, Some(10.0));
        assert_eq!(lines[0].color.as_deref(), Some("green"));

        assert!(connector.remove_line(&id).unwrap().is_some());
        assert!(connector.lines().is_empty());
    }

    #[tokio::test]
    async fn test_text_art_then_cell_number_write() {
        let (connector, mut server) = started().await;
        connector.set_grid("90\n09", None, Some(false)).unwrap();
        connector
            .set_grid_at(GridTarget::CellNumber(3), "red")
            .unwrap();

        let grid = connector.get_grid();
        assert_eq!((grid.rows(), grid.columns()), (2, 2));
        assert_eq!(connector.get_grid_at(1, 0), Some(Cell::from("red")));
        assert_eq!(connector.get_grid_cell(1), Some(Cell::Brightness(9)));

        let set = server.next_event(events::NEW_DATA).await.unwrap();
        assert_eq!(set.payload["grid"], json!("90\n09"));
        assert_eq!(set.payload["enumerate"], json!(false));
        let write = server.next_event(events::NEW_DATA).await.unwrap();
        assert_eq!(write.payload["type"], json!("grid_update"));
        assert_eq!(write.payload["number"], json!(3));
        assert_eq!(write.payload["color"], json!("red"));
    }

    #[tokio::test]
    async fn test_grid_write_grows_and_round_trips() {
        let (connector, _server) = started().await;
        connector
            .set_grid_at(GridTarget::At { row: 0, column: 0 }, "blue")
            .unwrap();
        assert_eq!(connector.get_grid_at(0, 0), Some(Cell::from("blue")));

        connector
            .update_cell(GridTarget::At { row: 2, column: 3 }, 7u8)
            .unwrap();
        let grid = connector.get_grid();
        assert_eq!((grid.rows(), grid.columns()), (3, 4));
        assert_eq!(connector.get_grid_at(0, 0), Some(Cell::from("blue")));
        assert_eq!(connector.get_grid_at(1, 1), Some(Cell::default()));
    }

    #[tokio::test]
    async fn test_cell_number_zero_is_rejected_before_sending() {
        let (connector, mut server) = started().await;
        let result = connector.set_grid_at(GridTarget::CellNumber(0), "red");
        assert!(matches!(result, Err(Error::InvalidGridWrite { .. })));
        settle().await;
        assert!(server.try_next_sent().is_none());
    }

    #[tokio::test]
    async fn test_setup_and_reset_grid() {
        let (connector, mut server) = started().await;
        connector.setup_grid(2, 3, None).unwrap();
        let grid = connector.get_grid();
        assert_eq!((grid.rows(), grid.columns()), (2, 3));
        let frame = server.next_event(events::NEW_DATA).await.unwrap();
        assert_eq!(frame.payload["base_color"], json!("white"));

        connector.reset_grid().unwrap();
        assert_eq!(connector.get_grid().cells(), &[vec![Cell::from("white")]]);
    }

    #[tokio::test]
    async fn test_playground_config_and_clear() {
        let (connector, mut server) = started().await;
        connector.add_sprite(Sprite::new("s")).unwrap();
        connector
            .configure_playground(DisplayConfigUpdate::sized(200.0, 100.0).with_origin(100.0, 50.0))
            .unwrap();

        let config = connector.playground_config();
        assert_eq!(config.width, 200.0);
        assert_eq!(config.shift_x, -100.0);

        server.next_event(events::NEW_DATA).await.unwrap();
        let frame = server.next_event(events::NEW_DATA).await.unwrap();
        assert_eq!(frame.payload["type"], json!("playground_config"));
        assert_eq!(frame.payload["config"]["shift_y"], json!(-50.0));
        assert!(frame.payload["config"].get("origin_x").is_none());

        connector.clear_playground().unwrap();
        assert!(connector.sprites().is_empty());
        assert_eq!(connector.playground_config(), DisplayConfig::default());
    }

    #[tokio::test]
    async fn test_rooms_and_server_requests() {
        let (connector, mut server) = started().await;
        connector.join_room("lab").unwrap();
        let frame = server.next_sent().await.unwrap();
        assert_eq!(frame.event, events::JOIN_ROOM);
        assert_eq!(frame.payload["room"], json!("lab"));

        connector.leave_room("lab").unwrap();
        assert_eq!(server.next_sent().await.unwrap().event, events::LEAVE_ROOM);

        connector.clear_data().unwrap();
        connector.get_devices().unwrap();
        connector.request_all_data().unwrap();
        let sent: Vec<_> = server.drain_sent().into_iter().map(|f| f.event).collect();
        assert_eq!(
            sent,
            vec![events::CLEAR_DATA, events::GET_DEVICES, events::GET_ALL_DATA]
        );
    }

    #[tokio::test]
    async fn test_set_color_passes_css_through() {
        let (connector, mut server) = started().await;
        connector.set_color("hsl(0, 100%, 50%)").unwrap();
        let frame = server.next_event(events::NEW_DATA).await.unwrap();
        assert_eq!(frame.payload["type"], json!("color"));
        assert_eq!(frame.payload["color"], json!("hsl(0, 100%, 50%)"));
    }

    #[test]
    fn test_generate_id_skips_taken() {
        let id = generate_id("line", |id| id == "line10000");
        assert!(id.starts_with("line"));
        assert_ne!(id, "line10000");
    }
}
