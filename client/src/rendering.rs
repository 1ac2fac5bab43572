use crate::reconcile::ReconciliationEngine;
use macroquad::prelude::*;
use shared::{ChunkCoord, Vec3};

/// Per-frame options for the debug view
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub connected: bool,
    pub show_grid: bool,
}

/// Top-down debug view centered on the local player.
///
/// World x maps to screen x and world z to screen y, so "up" on the keyboard
/// (towards -z) moves up the screen.
pub struct Renderer {
    /// Pixels per world unit
    scale: f32,
}

impl Renderer {
    pub fn new(scale: f32) -> Self {
        Renderer { scale }
    }

    pub fn render(&self, engine: &ReconciliationEngine, config: RenderConfig) {
        clear_background(Color::from_rgba(8, 34, 56, 255));

        let camera = engine.local().position;
        let chunk_size = engine.world_config().chunk_size;

        if config.show_grid {
            self.draw_loaded_block(engine, camera, chunk_size);
        }

        for fish in engine.fish().values() {
            let (x, y) = self.to_screen(fish.position, camera);
            draw_circle(x, y, 3.0, Color::from_rgba(255, 170, 60, 255));
        }

        for (id, player) in engine.players() {
            self.draw_player(player.position, camera, Color::from_rgba(255, 68, 68, 255));
            self.draw_player_id(*id, player.position, camera);
        }

        let local = engine.local();
        self.draw_player(local.position, camera, GREEN);
        self.draw_velocity_vector(local.position, local.velocity, camera);

        self.draw_ui(engine, &config);
    }

    fn to_screen(&self, position: Vec3, camera: Vec3) -> (f32, f32) {
        (
            screen_width() / 2.0 + (position.x - camera.x) * self.scale,
            screen_height() / 2.0 + (position.z - camera.z) * self.scale,
        )
    }

    fn draw_loaded_block(&self, engine: &ReconciliationEngine, camera: Vec3, chunk_size: f32) {
        let radius = engine.world_config().load_radius;
        let size = chunk_size * self.scale;

        for chunk in engine.current_chunk().interest_block(radius) {
            let (min_x, _, min_z, _) = chunk.bounds(chunk_size);
            let (x, y) = self.to_screen(Vec3::new(min_x, 0.0, min_z), camera);
            let color = if chunk == engine.current_chunk() {
                Color::from_rgba(120, 200, 255, 120)
            } else {
                Color::from_rgba(120, 200, 255, 40)
            };
            draw_rectangle_lines(x, y, size, size, 1.0, color);
        }

        if let Some(confirmed) = engine.confirmed_chunk() {
            if confirmed != engine.current_chunk() {
                self.draw_chunk_outline(confirmed, camera, chunk_size, YELLOW);
            }
        }
    }

    fn draw_chunk_outline(&self, chunk: ChunkCoord, camera: Vec3, chunk_size: f32, color: Color) {
        let (min_x, _, min_z, _) = chunk.bounds(chunk_size);
        let (x, y) = self.to_screen(Vec3::new(min_x, 0.0, min_z), camera);
        let size = chunk_size * self.scale;
        draw_rectangle_lines(x, y, size, size, 2.0, color);
    }

    fn draw_player(&self, position: Vec3, camera: Vec3, color: Color) {
        let (x, y) = self.to_screen(position, camera);
        let size = 10.0;
        draw_rectangle(x - size / 2.0, y - size / 2.0, size, size, color);
        draw_rectangle_lines(x - size / 2.0, y - size / 2.0, size, size, 2.0, WHITE);
    }

    fn draw_velocity_vector(&self, position: Vec3, velocity: Vec3, camera: Vec3) {
        if velocity.length() < 0.1 {
            return;
        }
        let (x0, y0) = self.to_screen(position, camera);
        let (x1, y1) = self.to_screen(position + velocity.scale(0.5), camera);
        draw_line(x0, y0, x1, y1, 2.0, YELLOW);
    }

    fn draw_player_id(&self, id: u32, position: Vec3, camera: Vec3) {
        let (x, y) = self.to_screen(position, camera);
        draw_text(&id.to_string(), x - 3.0, y - 9.0, 14.0, WHITE);
    }

    fn draw_ui(&self, engine: &ReconciliationEngine, config: &RenderConfig) {
        let y_start = 10.0;

        let connection_color = if config.connected && engine.client_id().is_some() {
            GREEN
        } else {
            RED
        };
        draw_rectangle(10.0, y_start, 8.0, 8.0, connection_color);
        let label = match engine.client_id() {
            Some(id) => format!("CON #{}", id),
            None => "CON".to_string(),
        };
        draw_text(&label, 22.0, y_start + 8.0, 14.0, WHITE);

        let chunk = engine.current_chunk();
        let lines = [
            format!("chunk {}", chunk),
            format!("{} players, {} fish", engine.players().len() + 1, engine.fish().len()),
            format!("{} corrections", engine.corrections()),
            format!("{} snapshots", engine.snapshots()),
        ];
        for (i, line) in lines.iter().enumerate() {
            draw_text(line, 10.0, y_start + 26.0 + i as f32 * 14.0, 14.0, WHITE);
        }
    }
}
