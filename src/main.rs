pub mod api;
pub mod config;
pub mod error;
pub mod geo;
pub mod io;
pub mod projector;
pub mod refresh;
pub mod render;
pub mod session;
pub mod structs;
pub mod view;
#[cfg(test)]
mod tests;

use std::{error::Error, sync::Arc};

use chrono::{Local, NaiveDateTime, TimeZone, Utc};
use clap::Parser;
use dotenv::dotenv;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    task::JoinHandle,
};

use api::BackendClient;
use config::{Args, Config};
use session::Session;
use structs::*;
use view::SharedView;

const HELP: &str = "These commands are supported:
  help                                   Display this help
  campus <name>                          Switch campus (Tesano, Abokobi, Main Campus)
  status                                 Live shuttle status
  stops                                  Stops for the current campus
  map                                    Projected map and distances
  book <pickup> <dropoff> <email> <name...> [@YYYY-MM-DDTHH:MM]
                                         Book a ride; use '-' for default stops
  stop                                   Stop live updates
  live                                   Resume live updates
  quit                                   Exit";

#[derive(Debug, PartialEq)]
enum Command {
    Help,
    Campus(Campus),
    Status,
    Stops,
    Map,
    Book(BookingArgs),
    Stop,
    Live,
    Quit,
}

#[derive(Debug, PartialEq)]
struct BookingArgs {
    pickup: Option<String>,
    dropoff: Option<String>,
    email: String,
    name: String,
    scheduled_time: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    pretty_env_logger::init();
    log::info!("Starting campus shuttle live map ...");

    let config = Config::from_env().with_args(Args::parse());
    log::debug!("{config:?}");

    let client = Arc::new(BackendClient::new(&config.backend_url));
    let mut session = Session::new(client, config.campus, config.refresh_interval);
    session.select_campus(config.campus)?;

    let renderer = spawn_renderer(session.view().clone(), config.clone());

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match parse_command(&line) {
            Ok(Command::Quit) => break,
            Ok(cmd) => handle(cmd, &mut session, &config).await,
            Err(e) => println!("❌ {e}"),
        }
    }

    session.stop_live();
    renderer.abort();
    log::info!("Bye");
    Ok(())
}

async fn handle(cmd: Command, session: &mut Session<BackendClient>, config: &Config) {
    match cmd {
        Command::Help => println!("{HELP}"),
        Command::Campus(campus) => {
            if let Err(e) = session.select_campus(campus) {
                println!("❌ {e}");
            }
        }
        Command::Status => {
            let view = session.view().snapshot();
            let live = session.live_state().map_or("stopped".to_string(), |s| s.to_string());
            println!("🚐 Live shuttle status for {} (updates {live}):", view.campus());
            for line in render::status_lines(view.shuttles()) {
                println!("  {line}");
            }
        }
        Command::Stops => {
            let view = session.view().snapshot();
            for stop in view.stops() {
                println!("  {} {} ({:.5}, {:.5})", stop.code, stop.name, stop.latitude, stop.longitude);
            }
        }
        Command::Map => {
            let frame = session.view().lock().frame(&config.canvas, config.distance_limit);
            for s in &frame.stops {
                println!("  stop    {:<20} x={:>7.1} y={:>7.1}", s.name, s.point.x, s.point.y);
            }
            for s in &frame.shuttles {
                println!("  shuttle {:<20} x={:>7.1} y={:>7.1}", s.identifier, s.point.x, s.point.y);
            }
            if let Some(line) = render::distances_line(&frame.distances) {
                println!("  {line}");
            }
            println!("  Updated: {}", render::updated_label(frame.last_updated));
        }
        Command::Book(args) => book(session, args).await,
        Command::Stop => session.stop_live(),
        Command::Live if session.is_live() => println!("Live updates are already running."),
        Command::Live => {
            if let Err(e) = session.resume_live() {
                println!("❌ {e}");
            }
        }
        Command::Quit => {}
    }
}

async fn book(session: &Session<BackendClient>, args: BookingArgs) {
    let (campus, pickup, dropoff) = {
        let view = session.view().lock();
        let stops = view.stops();
        let pickup = args.pickup.or_else(|| stops.first().map(|s| s.code.clone()));
        let dropoff = args
            .dropoff
            .or_else(|| stops.get(1).or(stops.first()).map(|s| s.code.clone()));
        (view.campus(), pickup.unwrap_or_default(), dropoff.unwrap_or_default())
    };

    let request = BookingRequest {
        name: args.name,
        email: args.email,
        campus,
        pickup_code: pickup,
        dropoff_code: dropoff,
        scheduled_time: args.scheduled_time,
    };

    match session.source().book(&request).await {
        Ok(confirmation) => println!("✅ Booking confirmed. ETA ~ {} minutes", confirmation.eta_minutes),
        Err(error::Error::BookingRejected(detail)) => println!("❌ {detail}"),
        Err(e) => {
            log::warn!("Booking failed ({}): {e}", e.code());
            println!("❌ {e}");
        }
    }
}

/// Redraws after every change to the view: logs the distance line and, when
/// configured, rewrites the SVG map.
fn spawn_renderer(view: SharedView, config: Config) -> JoinHandle<()> {
    let mut changes = view.subscribe();
    tokio::spawn(async move {
        while changes.changed().await.is_ok() {
            let frame = view.lock().frame(&config.canvas, config.distance_limit);
            if let Some(line) = render::distances_line(&frame.distances) {
                log::info!("{line}");
            }
            if let Some(path) = &config.map_output {
                if let Err(e) = io::write_map(path, &render::svg(&frame, &config.canvas)) {
                    log::error!("Unable to write map to {}: {e}", path.display());
                }
            }
        }
    })
}

//////////////////////////////////////////////////////////
// Command parsing
//////////////////////////////////////////////////////////
fn parse_command(line: &str) -> Result<Command, error::Error> {
    let line = line.trim().trim_start_matches('/');
    let (head, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();

    match head.to_ascii_lowercase().as_str() {
        "help" => Ok(Command::Help),
        "campus" => Ok(Command::Campus(rest.parse()?)),
        "status" => Ok(Command::Status),
        "stops" => Ok(Command::Stops),
        "map" => Ok(Command::Map),
        "book" => parse_booking(rest).map(Command::Book),
        "stop" | "cancel" => Ok(Command::Stop),
        "live" | "start" => Ok(Command::Live),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(error::Error::InvalidInput(format!(
            "unknown command '{other}'. Type help to see the usage."
        ))),
    }
}

fn parse_booking(rest: &str) -> Result<BookingArgs, error::Error> {
    let mut words: Vec<&str> = rest.split_whitespace().collect();

    let scheduled_time = words
        .last()
        .and_then(|w| w.strip_prefix('@'))
        .map(scheduled_utc)
        .transpose()?;
    if scheduled_time.is_some() {
        words.pop();
    }

    if words.len() < 4 {
        return Err(error::Error::InvalidInput(
            "usage: book <pickup> <dropoff> <email> <name...> [@YYYY-MM-DDTHH:MM]".to_string(),
        ));
    }

    let code = |w: &str| (w != "-").then(|| w.to_string());
    Ok(BookingArgs {
        pickup: code(words[0]),
        dropoff: code(words[1]),
        email: words[2].to_string(),
        name: words[3..].join(" "),
        scheduled_time,
    })
}

/// Local `YYYY-MM-DDTHH:MM` to a UTC RFC 3339 timestamp.
fn scheduled_utc(local: &str) -> Result<String, error::Error> {
    let naive = NaiveDateTime::parse_from_str(local, "%Y-%m-%dT%H:%M")
        .map_err(|e| error::Error::InvalidInput(format!("bad schedule '{local}': {e}")))?;
    let local = Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| error::Error::InvalidInput(format!("'{local}' does not exist in local time")))?;
    Ok(local.with_timezone(&Utc).to_rfc3339())
}
