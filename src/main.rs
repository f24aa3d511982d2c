mod bike_lanes;
mod config;
mod scales;
mod station_data;
mod tiles;
mod traffic;
mod view;

use bike_lanes::BikeLaneNetwork;
use clap::Parser;
use config::AppConfig;
use eframe::egui;
use log::{error, info, warn};
use scales::{flow_color, format_time};
use station_data::StationData;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tiles::{TileManager, WebMercator};
use traffic::{TimeFilter, NO_FILTER};
use view::TrafficView;

const MIN_ZOOM: f32 = 5.0;
const MAX_ZOOM: f32 = 18.0;
const TILE_PIXEL_SIZE: f32 = 256.0;

/// Interactive map of bike-share station traffic
#[derive(Parser, Debug)]
#[command(name = "bikeflow-desktop", version, about)]
struct Args {
    /// Directory for downloaded data files (overrides config)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Initial map center latitude (overrides config)
    #[arg(long)]
    lat: Option<f64>,

    /// Initial map center longitude (overrides config)
    #[arg(long)]
    lon: Option<f64>,

    /// Initial map zoom level (overrides config)
    #[arg(long)]
    zoom: Option<f32>,
}

fn main() -> Result<(), eframe::Error> {
    env_logger::init();

    let args = Args::parse();

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });
    if let Ok(path) = AppConfig::get_config_path() {
        info!("Config file: {}", path.display());
    }

    if let Some(data_dir) = args.data_dir {
        config.data_dir = Some(data_dir);
    }
    if let Some(lat) = args.lat {
        config.center_lat = lat;
    }
    if let Some(lon) = args.lon {
        config.center_lon = lon;
    }
    if let Some(zoom) = args.zoom {
        config.default_zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
    }

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1400.0, 900.0])
            .with_title("BikeFlow Desktop"),
        ..Default::default()
    };

    eframe::run_native(
        "BikeFlow Desktop",
        options,
        Box::new(move |_cc| Ok(Box::new(BikeFlowApp::new(config)))),
    )
}

/// Startup data load progress, shared with the loader thread.
#[derive(Debug)]
enum DataState {
    Loading,
    Ready(StationData),
    Failed(String),
}

impl DataState {
    /// True only while the loader thread is still running; both `Ready` and
    /// `Failed` are settled states that no amount of polling will change.
    fn is_loading(&self) -> bool {
        matches!(self, DataState::Loading)
    }
}

struct BikeFlowApp {
    data: Arc<Mutex<DataState>>,
    /// Derived view for the current slider value; replaced wholesale on every
    /// recompute.
    traffic_view: TrafficView,
    /// Radius scale domain, computed once from the unfiltered aggregation.
    unfiltered_max_traffic: Option<u32>,
    bike_lanes: Vec<BikeLaneNetwork>,
    view_initialized: bool,
    slider_value: i64,
    map_center_lat: f64,
    map_center_lon: f64,
    map_zoom_level: f32,
    tile_manager: TileManager,
    tile_error: Option<String>,
    show_legend: bool,
}

impl BikeFlowApp {
    fn new(config: AppConfig) -> Self {
        let data = Arc::new(Mutex::new(DataState::Loading));

        // Fetch and parse both feeds off the UI thread. This runs exactly
        // once; the aggregation core never does I/O.
        let data_handle = data.clone();
        let data_dir = config.resolved_data_dir();
        let stations_url = config.stations_url.clone();
        let trips_url = config.trips_url.clone();
        std::thread::spawn(move || {
            let rt = tokio::runtime::Runtime::new().expect("failed to start tokio runtime");
            let result =
                rt.block_on(StationData::load_or_download(data_dir, &stations_url, &trips_url));

            let mut state = data_handle.lock().expect("data state mutex poisoned");
            *state = match result {
                Ok(loaded) => DataState::Ready(loaded),
                Err(e) => {
                    error!("Failed to load station data: {}", e);
                    DataState::Failed(e.to_string())
                }
            };
        });

        Self {
            data,
            traffic_view: TrafficView::default(),
            unfiltered_max_traffic: None,
            bike_lanes: Vec::new(),
            view_initialized: false,
            slider_value: NO_FILTER,
            map_center_lat: config.center_lat,
            map_center_lon: config.center_lon,
            map_zoom_level: config.default_zoom.clamp(MIN_ZOOM, MAX_ZOOM),
            tile_manager: TileManager::new(),
            tile_error: None,
            show_legend: config.show_legend,
        }
    }

    /// Single entry point for slider input: store the value and recompute the
    /// derived view synchronously. The latest call fully determines what is
    /// displayed.
    fn on_time_change(&mut self, value: i64) {
        self.slider_value = value;
        self.recompute_view();
    }

    fn recompute_view(&mut self) {
        let state = self.data.lock().expect("data state mutex poisoned");
        if let DataState::Ready(data) = &*state {
            // The radius scale domain is fixed at load; filters only switch
            // the mode-dependent range.
            let max_traffic = *self
                .unfiltered_max_traffic
                .get_or_insert_with(|| view::unfiltered_max_traffic(&data.stations, &data.trips));

            let filter = TimeFilter::from_slider(self.slider_value);
            self.traffic_view = view::recompute(&data.stations, &data.trips, filter, max_traffic);

            if self.bike_lanes.is_empty() {
                self.bike_lanes = data.bike_lanes.clone();
            }
            self.view_initialized = true;
        }
    }

    fn draw_time_panel(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label("Filter by time:");

            let response = ui.add(
                egui::Slider::new(&mut self.slider_value, NO_FILTER..=1439)
                    .show_value(false),
            );
            if response.changed() {
                let value = self.slider_value;
                self.on_time_change(value);
            }

            if self.slider_value == NO_FILTER {
                ui.label(egui::RichText::new("(any time)").italics().weak());
            } else {
                ui.label(egui::RichText::new(format_time(self.slider_value)).strong());
            }
        });
    }

    fn draw_legend(&self, ctx: &egui::Context) {
        egui::Window::new("Legend")
            .anchor(egui::Align2::LEFT_BOTTOM, egui::vec2(10.0, -40.0))
            .title_bar(false)
            .resizable(false)
            .show(ctx, |ui| {
                for (flow, label) in [
                    (1.0, "More departures"),
                    (0.5, "Balanced"),
                    (0.0, "More arrivals"),
                ] {
                    ui.horizontal(|ui| {
                        let (rect, _) =
                            ui.allocate_exact_size(egui::vec2(12.0, 12.0), egui::Sense::hover());
                        ui.painter().circle_filled(rect.center(), 5.0, flow_color(flow));
                        ui.label(label);
                    });
                }
            });
    }

    fn draw_map(&mut self, ui: &mut egui::Ui) {
        let (response, painter) = ui.allocate_painter(
            egui::vec2(ui.available_width(), ui.available_height()),
            egui::Sense::click_and_drag(),
        );

        let rect = response.rect;
        let center = rect.center();

        painter.rect_filled(rect, 0.0, egui::Color32::from_rgb(230, 235, 240));

        // Pinch/scroll zoom
        let zoom_delta = ui.ctx().input(|i| i.zoom_delta());
        if (zoom_delta - 1.0).abs() > 0.001 {
            self.map_zoom_level += zoom_delta.log2();
            self.map_zoom_level = self.map_zoom_level.clamp(MIN_ZOOM, MAX_ZOOM);
        }

        let tile_zoom_level = self.map_zoom_level.round() as u8;

        // Basemap tiles
        let visible_tiles = self.tile_manager.visible_tiles(
            self.map_center_lat,
            self.map_center_lon,
            tile_zoom_level,
            rect.width(),
            rect.height(),
        );

        let mut tiles_rendered = 0;
        for (tile_coord, offset_x, offset_y) in visible_tiles {
            if let Some(texture) = self.tile_manager.get_tile(tile_coord, ui.ctx()) {
                let tile_rect = egui::Rect::from_min_size(
                    egui::pos2(center.x + offset_x, center.y + offset_y),
                    egui::vec2(TILE_PIXEL_SIZE, TILE_PIXEL_SIZE),
                );
                painter.image(
                    texture.id(),
                    tile_rect,
                    egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                    egui::Color32::WHITE,
                );
                tiles_rendered += 1;
            }
        }

        if self.tile_manager.error_count() > 0 {
            self.tile_error = Some(format!(
                "Failed to load {} tiles",
                self.tile_manager.error_count()
            ));
        } else if self.tile_manager.has_loading_tiles() {
            self.tile_error = Some("Loading map tiles...".to_string());
        } else if tiles_rendered > 0 {
            self.tile_error = None;
        }

        // Drag to pan, with Mercator distortion correction
        if response.dragged() {
            let delta = response.drag_delta();
            let scale = 2.0_f64.powf(f64::from(self.map_zoom_level));
            let lat_per_pixel = 180.0 / (f64::from(TILE_PIXEL_SIZE) * scale);
            let lon_per_pixel = 360.0 / (f64::from(TILE_PIXEL_SIZE) * scale);
            let cos_lat = self.map_center_lat.to_radians().cos();

            self.map_center_lat += f64::from(delta.y) * lat_per_pixel;
            self.map_center_lon -= f64::from(delta.x) * lon_per_pixel / cos_lat.max(0.1);
            self.map_center_lat = self.map_center_lat.clamp(-85.0, 85.0);
        }

        // Project lon/lat into screen space relative to the map center
        let center_lat = self.map_center_lat;
        let center_lon = self.map_center_lon;
        let to_screen = move |lat: f64, lon: f64| -> egui::Pos2 {
            let tile_x = WebMercator::lon_to_x(lon, tile_zoom_level);
            let tile_y = WebMercator::lat_to_y(lat, tile_zoom_level);
            let center_tile_x = WebMercator::lon_to_x(center_lon, tile_zoom_level);
            let center_tile_y = WebMercator::lat_to_y(center_lat, tile_zoom_level);

            egui::pos2(
                center.x + ((tile_x - center_tile_x) * f64::from(TILE_PIXEL_SIZE)) as f32,
                center.y + ((tile_y - center_tile_y) * f64::from(TILE_PIXEL_SIZE)) as f32,
            )
        };

        // Bike-lane overlays, under the station markers
        for network in &self.bike_lanes {
            let (r, g, b) = network.color;
            let stroke = egui::Stroke::new(
                5.0,
                egui::Color32::from_rgba_unmultiplied(r, g, b, 153),
            );
            for polyline in &network.polylines {
                for pair in polyline.windows(2) {
                    let from = to_screen(pair[0].0, pair[0].1);
                    let to = to_screen(pair[1].0, pair[1].1);
                    if rect.intersects(egui::Rect::from_two_pos(from, to)) {
                        painter.line_segment([from, to], stroke);
                    }
                }
            }
        }

        // Station markers, sized by traffic and colored by flow direction
        let hover_pos = response.hover_pos();
        let mut hovered: Option<usize> = None;

        for (index, (station, style)) in self
            .traffic_view
            .stations
            .iter()
            .zip(self.traffic_view.markers.iter())
            .enumerate()
        {
            if style.radius <= 0.0 {
                continue;
            }

            let pos = to_screen(station.lat, station.lon);
            if !rect.expand(style.radius).contains(pos) {
                continue;
            }

            let fill = flow_color(style.flow).gamma_multiply(0.8);
            painter.circle(
                pos,
                style.radius,
                fill,
                egui::Stroke::new(1.0, egui::Color32::WHITE),
            );

            if let Some(pointer) = hover_pos {
                if pointer.distance(pos) <= style.radius {
                    hovered = Some(index);
                }
            }
        }

        if let (Some(index), Some(pointer)) = (hovered, hover_pos) {
            self.draw_station_tooltip(&painter, rect, pointer, index);
        }

        painter.text(
            rect.left_top() + egui::vec2(10.0, 10.0),
            egui::Align2::LEFT_TOP,
            "Drag to pan | Pinch to zoom",
            egui::FontId::proportional(12.0),
            egui::Color32::DARK_GRAY,
        );

        // Attribution (required by Carto)
        painter.text(
            rect.right_bottom() + egui::vec2(-10.0, -10.0),
            egui::Align2::RIGHT_BOTTOM,
            "© OpenStreetMap contributors © CARTO",
            egui::FontId::proportional(10.0),
            egui::Color32::from_black_alpha(180),
        );

        // Status bubble: data load takes priority over tile status
        let status = {
            let state = self.data.lock().expect("data state mutex poisoned");
            match &*state {
                DataState::Loading => Some(("Loading station data...".to_string(), false)),
                DataState::Failed(message) => {
                    Some((format!("Failed to load station data: {}", message), true))
                }
                DataState::Ready(_) => self
                    .tile_error
                    .as_ref()
                    .map(|message| (message.clone(), message.contains("Failed"))),
            }
        };

        if let Some((message, is_error)) = status {
            self.draw_status_bubble(&painter, rect, &message, is_error);
        }
    }

    fn draw_station_tooltip(
        &self,
        painter: &egui::Painter,
        map_rect: egui::Rect,
        pointer: egui::Pos2,
        index: usize,
    ) {
        let station = &self.traffic_view.stations[index];

        let mut lines = vec![
            station.name.clone(),
            format!("{} trips", station.total_traffic),
            format!("{} departures", station.departures),
            format!("{} arrivals", station.arrivals),
        ];
        if station.total_traffic > 0 {
            let percent = f64::from(station.departures) / f64::from(station.total_traffic) * 100.0;
            lines.push(format!("{:.0}% departures", percent));
        }
        let text = lines.join("\n");

        let galley = painter.layout_no_wrap(
            text,
            egui::FontId::proportional(12.0),
            egui::Color32::WHITE,
        );

        let padding = egui::vec2(8.0, 6.0);
        let mut box_rect = egui::Rect::from_min_size(
            pointer + egui::vec2(14.0, -10.0),
            galley.size() + padding * 2.0,
        );
        // Keep the tooltip on screen when hovering near the map edge.
        box_rect = box_rect.translate(egui::vec2(
            (map_rect.right() - box_rect.right()).min(0.0),
            (map_rect.bottom() - box_rect.bottom()).min(0.0),
        ));

        painter.rect_filled(
            box_rect,
            4.0,
            egui::Color32::from_rgba_unmultiplied(0, 0, 0, 200),
        );
        painter.galley(box_rect.min + padding, galley, egui::Color32::WHITE);
    }

    fn draw_status_bubble(
        &self,
        painter: &egui::Painter,
        map_rect: egui::Rect,
        message: &str,
        is_error: bool,
    ) {
        let bg_color = if is_error {
            egui::Color32::from_rgb(220, 50, 50)
        } else {
            egui::Color32::from_rgb(255, 200, 100)
        };

        let bubble_pos = map_rect.center_top() + egui::vec2(0.0, 20.0);
        let galley = painter.layout_no_wrap(
            message.to_string(),
            egui::FontId::proportional(12.0),
            egui::Color32::WHITE,
        );

        let padding = egui::vec2(12.0, 6.0);
        let bubble_rect = egui::Rect::from_center_size(bubble_pos, galley.size() + padding * 2.0);

        painter.rect_filled(bubble_rect, 5.0, bg_color);
        painter.text(
            bubble_pos,
            egui::Align2::CENTER_CENTER,
            message,
            egui::FontId::proportional(12.0),
            egui::Color32::WHITE,
        );
    }
}

impl eframe::App for BikeFlowApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // First recompute once the loader thread flips the data to ready.
        if !self.view_initialized {
            self.recompute_view();
            if !self.view_initialized
                && self
                    .data
                    .lock()
                    .expect("data state mutex poisoned")
                    .is_loading()
            {
                // Still loading; poll again shortly. A failed load is
                // settled, so it gets no further wake-ups.
                ctx.request_repaint_after(std::time::Duration::from_millis(250));
            }
        }

        egui::TopBottomPanel::bottom("time_panel").show(ctx, |ui| {
            self.draw_time_panel(ui);
        });

        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| {
                self.draw_map(ui);
            });

        if self.show_legend {
            self.draw_legend(ctx);
        }
    }
}
