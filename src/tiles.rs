use egui::{ColorImage, TextureHandle};
use log::{debug, warn};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

const TILE_SIZE: u32 = 256;
const CACHE_DURATION_DAYS: u64 = 7;

/// Web Mercator projection utilities
#[derive(Debug)]
pub struct WebMercator;

impl WebMercator {
    /// Convert latitude to a Web Mercator tile Y coordinate at the given zoom
    pub fn lat_to_y(lat: f64, zoom: u8) -> f64 {
        let lat_rad = lat.to_radians();
        let n = 2_f64.powi(i32::from(zoom));
        let y = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / std::f64::consts::PI) / 2.0;
        y * n
    }

    /// Convert longitude to a Web Mercator tile X coordinate at the given zoom
    pub fn lon_to_x(lon: f64, zoom: u8) -> f64 {
        let n = 2_f64.powi(i32::from(zoom));
        ((lon + 180.0) / 360.0) * n
    }

    /// Convert a tile Y coordinate back to latitude
    #[allow(dead_code)]
    pub fn tile_to_lat(y: f64, zoom: u8) -> f64 {
        let n = 2_f64.powi(i32::from(zoom));
        let lat_rad = ((std::f64::consts::PI * (1.0 - 2.0 * y / n)).sinh()).atan();
        lat_rad.to_degrees()
    }

    /// Convert a tile X coordinate back to longitude
    #[allow(dead_code)]
    pub fn tile_to_lon(x: f64, zoom: u8) -> f64 {
        let n = 2_f64.powi(i32::from(zoom));
        x / n * 360.0 - 180.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
    pub zoom: u8,
}

impl TileCoord {
    pub fn new(x: u32, y: u32, zoom: u8) -> Self {
        Self { x, y, zoom }
    }

    /// Tile URL on the Carto CDN (light basemap so the colored markers pop)
    pub fn url(&self) -> String {
        let subdomain = ['a', 'b', 'c', 'd'][((self.x + self.y) % 4) as usize];
        format!(
            "https://{}.basemaps.cartocdn.com/light_all/{}/{}/{}.png",
            subdomain, self.zoom, self.x, self.y
        )
    }

    /// Cache filename based on hash of the URL
    fn cache_filename(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.url().as_bytes());
        format!("{:x}.png", hasher.finalize())
    }
}

pub enum TileState {
    Loading,
    Loaded(TextureHandle),
    Failed,
}

/// Downloads, caches, and hands out basemap tile textures.
///
/// Tiles are cached on disk under the user cache directory and fetched on
/// background threads; the UI polls with [`TileManager::get_tile`] each frame.
pub struct TileManager {
    cache_dir: PathBuf,
    tiles: Arc<Mutex<HashMap<TileCoord, TileState>>>,
}

impl Default for TileManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TileManager {
    pub fn new() -> Self {
        let cache_dir = Self::cache_dir();

        if let Err(e) = fs::create_dir_all(&cache_dir) {
            warn!("Failed to create tile cache directory: {}", e);
        }
        Self::cleanup_old_tiles(&cache_dir);

        Self {
            cache_dir,
            tiles: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn cache_dir() -> PathBuf {
        let mut path = dirs::cache_dir().unwrap_or_else(|| PathBuf::from(".cache"));
        path.push("bikeflow-desktop");
        path.push("tiles");
        path
    }

    fn cleanup_old_tiles(cache_dir: &Path) {
        let now = SystemTime::now();
        let max_age = Duration::from_secs(CACHE_DURATION_DAYS * 24 * 60 * 60);

        let Ok(entries) = fs::read_dir(cache_dir) else {
            return;
        };
        for entry in entries.flatten() {
            let age = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok());
            if age.is_some_and(|age| age > max_age) {
                let _ = fs::remove_file(entry.path());
                debug!("Removed stale tile cache entry: {:?}", entry.path());
            }
        }
    }

    /// Get a tile texture, returning `None` while it is still being fetched
    pub fn get_tile(&self, coord: TileCoord, ctx: &egui::Context) -> Option<TextureHandle> {
        let mut tiles = self.tiles.lock().expect("tile map mutex poisoned");

        match tiles.get(&coord) {
            Some(TileState::Loaded(texture)) => Some(texture.clone()),
            Some(TileState::Loading | TileState::Failed) => None,
            None => {
                let cache_path = self.cache_dir.join(coord.cache_filename());

                if cache_path.exists() {
                    match fs::read(&cache_path)
                        .map_err(|e| e.to_string())
                        .and_then(|bytes| decode_tile(&bytes, coord, ctx))
                    {
                        Ok(texture) => {
                            tiles.insert(coord, TileState::Loaded(texture.clone()));
                            return Some(texture);
                        }
                        Err(e) => warn!("Discarding unreadable cached tile: {}", e),
                    }
                }

                tiles.insert(coord, TileState::Loading);
                self.spawn_download(coord, ctx.clone());
                None
            }
        }
    }

    fn spawn_download(&self, coord: TileCoord, ctx: egui::Context) {
        let tiles = self.tiles.clone();
        let cache_path = self.cache_dir.join(coord.cache_filename());

        std::thread::spawn(move || {
            let state = match fetch_tile(coord, &cache_path, &ctx) {
                Ok(texture) => {
                    ctx.request_repaint();
                    TileState::Loaded(texture)
                }
                Err(e) => {
                    warn!("Tile {:?} failed: {}", coord, e);
                    TileState::Failed
                }
            };
            let mut tiles = tiles.lock().expect("tile map mutex poisoned");
            tiles.insert(coord, state);
        });
    }

    /// All tiles needed to cover a viewport, with pixel offsets from its center
    pub fn visible_tiles(
        &self,
        center_lat: f64,
        center_lon: f64,
        zoom: u8,
        viewport_width: f32,
        viewport_height: f32,
    ) -> Vec<(TileCoord, f32, f32)> {
        let mut tiles = Vec::new();

        let center_tile_x = WebMercator::lon_to_x(center_lon, zoom);
        let center_tile_y = WebMercator::lat_to_y(center_lat, zoom);

        let tiles_wide = (viewport_width / TILE_SIZE as f32).ceil() as i32 + 2;
        let tiles_high = (viewport_height / TILE_SIZE as f32).ceil() as i32 + 2;

        let start_x = center_tile_x.floor() as i32 - tiles_wide / 2;
        let start_y = center_tile_y.floor() as i32 - tiles_high / 2;

        let max_tile = 2_i32.pow(u32::from(zoom));

        for dy in 0..tiles_high {
            for dx in 0..tiles_wide {
                let tile_x = start_x + dx;
                let tile_y = start_y + dy;

                // Longitude wraps; latitude doesn't.
                let wrapped_x = ((tile_x % max_tile) + max_tile) % max_tile;
                if tile_y < 0 || tile_y >= max_tile {
                    continue;
                }

                let coord = TileCoord::new(wrapped_x as u32, tile_y as u32, zoom);
                let offset_x = (f64::from(tile_x) - center_tile_x) * f64::from(TILE_SIZE);
                let offset_y = (f64::from(tile_y) - center_tile_y) * f64::from(TILE_SIZE);

                tiles.push((coord, offset_x as f32, offset_y as f32));
            }
        }

        tiles
    }

    pub fn has_loading_tiles(&self) -> bool {
        let tiles = self.tiles.lock().expect("tile map mutex poisoned");
        tiles.values().any(|state| matches!(state, TileState::Loading))
    }

    pub fn error_count(&self) -> usize {
        let tiles = self.tiles.lock().expect("tile map mutex poisoned");
        tiles
            .values()
            .filter(|state| matches!(state, TileState::Failed))
            .count()
    }
}

/// Download one tile, write it to the disk cache, and upload it as a texture
fn fetch_tile(
    coord: TileCoord,
    cache_path: &Path,
    ctx: &egui::Context,
) -> Result<TextureHandle, String> {
    let url = coord.url();
    debug!("Downloading tile: {}", url);

    let response = reqwest::blocking::get(&url).map_err(|e| e.to_string())?;
    if !response.status().is_success() {
        return Err(format!("HTTP {}", response.status()));
    }
    let bytes = response.bytes().map_err(|e| e.to_string())?;

    if let Err(e) = fs::write(cache_path, &bytes) {
        warn!("Failed to write tile cache file: {}", e);
    }

    decode_tile(&bytes, coord, ctx)
}

fn decode_tile(bytes: &[u8], coord: TileCoord, ctx: &egui::Context) -> Result<TextureHandle, String> {
    let img = image::load_from_memory(bytes).map_err(|e| e.to_string())?;
    let rgba = img.to_rgba8();

    let color_image = ColorImage::from_rgba_unmultiplied(
        [TILE_SIZE as usize, TILE_SIZE as usize],
        &rgba.into_raw(),
    );

    Ok(ctx.load_texture(
        format!("tile_{}_{}/{}", coord.zoom, coord.x, coord.y),
        color_image,
        Default::default(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mercator_round_trip() {
        let lat = 42.36027;
        let lon = -71.09415;
        let zoom = 12;

        let x = WebMercator::lon_to_x(lon, zoom);
        let y = WebMercator::lat_to_y(lat, zoom);

        assert!((WebMercator::tile_to_lon(x, zoom) - lon).abs() < 1e-9);
        assert!((WebMercator::tile_to_lat(y, zoom) - lat).abs() < 1e-9);
    }

    #[test]
    fn test_tile_url_shape() {
        let url = TileCoord::new(1238, 1514, 12).url();
        assert!(url.starts_with("https://"));
        assert!(url.ends_with(".basemaps.cartocdn.com/light_all/12/1238/1514.png"));
    }

    #[test]
    fn test_cache_filename_is_stable_hash() {
        let a = TileCoord::new(1, 2, 3).cache_filename();
        let b = TileCoord::new(1, 2, 3).cache_filename();
        let c = TileCoord::new(2, 1, 3).cache_filename();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.ends_with(".png"));
    }
}
