use std::{env, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use log::warn;

use crate::{projector::Canvas, refresh::DEFAULT_INTERVAL, structs::Campus};

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
pub const DEFAULT_DISTANCE_LIMIT: usize = 3;

/// Command-line overrides. Anything left out falls back to the environment
/// (and `.env`), then to built-in defaults.
#[derive(Parser, Debug, Default)]
#[command(about = "Live campus shuttle map and ride booking")]
pub struct Args {
    /// Base URL of the shuttle backend
    #[arg(long)]
    pub backend_url: Option<String>,
    /// Campus shown at start-up (Tesano, Abokobi, Main Campus)
    #[arg(long)]
    pub campus: Option<Campus>,
    /// Seconds between live refreshes
    #[arg(long)]
    pub interval: Option<u64>,
    /// Write the rendered SVG map here after every update
    #[arg(long)]
    pub map_output: Option<PathBuf>,
    /// Map width in pixels
    #[arg(long)]
    pub map_width: Option<f64>,
    /// Map height in pixels
    #[arg(long)]
    pub map_height: Option<f64>,
    /// Padding around the stops, in degrees
    #[arg(long)]
    pub map_padding: Option<f64>,
    /// Number of shuttles listed in the distance line
    #[arg(long)]
    pub distance_limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub backend_url: String,
    pub campus: Campus,
    pub refresh_interval: Duration,
    pub map_output: Option<PathBuf>,
    pub canvas: Canvas,
    pub distance_limit: usize,
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Canvas::default();
        Self {
            backend_url: env::var("BACKEND_URL").unwrap_or_else(|_| DEFAULT_BACKEND_URL.to_string()),
            campus: env_parse("CAMPUS", Campus::default()),
            refresh_interval: Duration::from_secs(env_parse("REFRESH_INTERVAL_SECS", DEFAULT_INTERVAL.as_secs())),
            map_output: env::var("MAP_OUTPUT").ok().filter(|p| !p.is_empty()).map(PathBuf::from),
            canvas: Canvas {
                width: env_parse("MAP_WIDTH", defaults.width),
                height: env_parse("MAP_HEIGHT", defaults.height),
                padding: env_parse("MAP_PADDING", defaults.padding),
            },
            distance_limit: env_parse("DISTANCE_LIMIT", DEFAULT_DISTANCE_LIMIT),
        }
    }

    pub fn with_args(mut self, args: Args) -> Self {
        if let Some(url) = args.backend_url {
            self.backend_url = url;
        }
        if let Some(campus) = args.campus {
            self.campus = campus;
        }
        if let Some(secs) = args.interval {
            self.refresh_interval = Duration::from_secs(secs);
        }
        if args.map_output.is_some() {
            self.map_output = args.map_output;
        }
        if let Some(width) = args.map_width {
            self.canvas.width = width;
        }
        if let Some(height) = args.map_height {
            self.canvas.height = height;
        }
        if let Some(padding) = args.map_padding {
            self.canvas.padding = padding;
        }
        if let Some(limit) = args.distance_limit {
            self.distance_limit = limit;
        }
        self.sanitized()
    }

    fn sanitized(mut self) -> Self {
        if self.refresh_interval.is_zero() {
            warn!("Refresh interval must be positive, using {DEFAULT_INTERVAL:?}");
            self.refresh_interval = DEFAULT_INTERVAL;
        }
        let defaults = Canvas::default();
        if !(self.canvas.width > 0.0 && self.canvas.height > 0.0) {
            warn!("Map size must be positive, using {}x{}", defaults.width, defaults.height);
            self.canvas.width = defaults.width;
            self.canvas.height = defaults.height;
        }
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_parse<T: FromStr + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(value) => value.parse::<T>().unwrap_or_else(|_| {
            warn!("Ignoring invalid {key}={value}");
            default
        }),
        Err(_) => default,
    }
}
