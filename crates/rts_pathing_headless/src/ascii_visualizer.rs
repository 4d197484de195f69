//! ASCII map visualizer.
//!
//! Renders the current simulation state one character per tile for quick
//! terminal review: terrain, building footprints, units and the waypoints
//! of their current legs.

use rts_pathing::simulation::Simulation;
use rts_pathing::terrain::TILE_SIZE;
use rts_pathing::units::{MoveFlags, Unit, UnitFlags};

/// ASCII visualization configuration.
#[derive(Debug, Clone)]
pub struct AsciiConfig {
    /// Draw the waypoints of every unit's current leg.
    pub show_paths: bool,
    /// Show the legend.
    pub show_legend: bool,
    /// Use colored output (ANSI).
    pub use_color: bool,
}

impl Default for AsciiConfig {
    fn default() -> Self {
        Self {
            show_paths: true,
            show_legend: true,
            use_color: true,
        }
    }
}

/// ANSI color codes.
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";

    pub const CYAN: &str = "\x1b[36m";
    pub const RED: &str = "\x1b[31m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const GREEN: &str = "\x1b[32m";
    pub const GRAY: &str = "\x1b[90m";
}

/// Character and color for a unit that is not a grounded building.
fn unit_glyph(unit: &Unit) -> (char, &'static str) {
    let flags = unit.movement.flags;
    if flags.contains(MoveFlags::IMMOVABLE) {
        ('!', colors::RED)
    } else if flags.contains(MoveFlags::COLLIDED) {
        ('x', colors::RED)
    } else if unit.is_flying() {
        (if flags.contains(MoveFlags::MOVING) { 'F' } else { 'f' }, colors::CYAN)
    } else if flags.contains(MoveFlags::MOVING) {
        ('U', colors::YELLOW)
    } else {
        ('u', colors::GREEN)
    }
}

fn tile_of(x: i32, y: i32, width: usize, height: usize) -> Option<(usize, usize)> {
    let (tx, ty) = (x.div_euclid(TILE_SIZE), y.div_euclid(TILE_SIZE));
    let (tx, ty) = (usize::try_from(tx).ok()?, usize::try_from(ty).ok()?);
    (tx < width && ty < height).then_some((tx, ty))
}

/// Render the simulation as ASCII art.
#[must_use]
pub fn render_ascii(sim: &Simulation, name: &str, config: &AsciiConfig) -> String {
    let tiles = sim.map().tiles();
    let (width, height) = (tiles.width() as usize, tiles.height() as usize);

    let mut grid: Vec<Vec<(char, &'static str)>> = (0..height)
        .map(|y| {
            (0..width)
                .map(|x| {
                    if tiles.is_walkable(x as u32, y as u32) {
                        ('.', "")
                    } else {
                        ('#', colors::GRAY)
                    }
                })
                .collect()
        })
        .collect();

    // Footprints first so unit centers draw on top.
    for unit in sim.units() {
        if !unit.flags.contains(UnitFlags::BUILDING) || unit.is_flying() {
            continue;
        }
        let b = unit.bbox();
        for y in (b.top..b.bottom).step_by(TILE_SIZE as usize) {
            for x in (b.left..b.right).step_by(TILE_SIZE as usize) {
                if let Some((tx, ty)) = tile_of(x, y, width, height) {
                    grid[ty][tx] = ('B', colors::GRAY);
                }
            }
        }
    }

    if config.show_paths {
        for unit in sim.units() {
            let Ok(Some(path)) = sim.world().path_of(unit.id) else {
                continue;
            };
            for w in &path.waypoints[path.short_cursor.min(path.waypoints.len())..] {
                if let Some((tx, ty)) = tile_of(w.x, w.y, width, height) {
                    if grid[ty][tx].0 == '.' {
                        grid[ty][tx] = ('*', colors::CYAN);
                    }
                }
            }
        }
    }

    for unit in sim.units() {
        if unit.flags.contains(UnitFlags::BUILDING) && !unit.is_flying() {
            continue;
        }
        let p = unit.position();
        if let Some((tx, ty)) = tile_of(p.x, p.y, width, height) {
            grid[ty][tx] = unit_glyph(unit);
        }
    }

    let (bold, reset) = if config.use_color {
        (colors::BOLD, colors::RESET)
    } else {
        ("", "")
    };

    let mut output = String::new();
    output.push_str(&format!(
        "{bold}╔══ Scenario: {name} │ Tick: {} │ Units: {} ══╗{reset}\n",
        sim.get_tick(),
        sim.units().count()
    ));
    output.push('║');
    output.push_str(&"═".repeat(width));
    output.push_str("║\n");

    for row in &grid {
        output.push('║');
        for &(ch, color) in row {
            if config.use_color && !color.is_empty() {
                output.push_str(color);
                output.push(ch);
                output.push_str(colors::RESET);
            } else {
                output.push(ch);
            }
        }
        output.push_str("║\n");
    }

    if config.show_legend {
        output.push('╠');
        output.push_str(&"═".repeat(width));
        output.push_str("╣\n");
        output.push_str(
            "║ u=resting U=moving f/F=flyer B=building x=collided !=immovable *=waypoint #=wall\n",
        );
    }

    output.push('╚');
    output.push_str(&"═".repeat(width));
    output.push_str("╝\n");
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::Scenario;

    fn plain() -> AsciiConfig {
        AsciiConfig {
            show_paths: false,
            show_legend: false,
            use_color: false,
        }
    }

    #[test]
    fn test_grid_matches_map() {
        let loaded = Scenario::detour().instantiate().unwrap();
        let text = render_ascii(&loaded.sim, "detour", &plain());
        let rows: Vec<&str> = text.lines().collect();
        // Header, top border, 12 rows, bottom border.
        assert_eq!(rows.len(), 15);
        assert!(rows[0].contains("detour"));
        assert_eq!(rows[2].chars().count(), 16 + 2);
    }

    #[test]
    fn test_building_and_units_drawn() {
        let loaded = Scenario::detour().instantiate().unwrap();
        let text = render_ascii(&loaded.sim, "detour", &plain());
        let rows: Vec<&str> = text.lines().collect();
        // Building covers tile columns 6..10 and rows 4..8; the walker is in tile (3, 6).
        let building: String = rows[2 + 4].chars().skip(1 + 6).take(4).collect();
        assert_eq!(building, "BBBB");
        assert_eq!(rows[2 + 6].chars().nth(1 + 3), Some('u'));
    }

    #[test]
    fn test_walls_and_legend() {
        let mut scenario = Scenario::head_on();
        scenario.map[0] = "#...........".to_string();
        let loaded = scenario.instantiate().unwrap();
        let config = AsciiConfig {
            show_legend: true,
            ..plain()
        };
        let text = render_ascii(&loaded.sim, "walls", &config);
        assert!(text.lines().nth(2).unwrap().starts_with("║#"));
        assert!(text.contains("immovable"));
    }
}
