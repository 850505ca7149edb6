//! Command-line inspector for a persisted map.
//!
//! Usage:
//!   map-tool dump X Y
//!   map-tool path X0 Y0 X1 Y1
//!   map-tool see X0 Y0 X1 Y1
//!   map-tool stats
//!
//! Reads `TACTICS_MAP_DB` (default `map.sqlite`), `TACTICS_MAP_TABLE`
//! (default `map_items`) and `TACTICS_LOG` from the environment or a `.env`
//! file, plus the `TACTICS_MAP_*` sizing variables.

use std::env;
use std::process;

use anyhow::{Context, Result, bail};
use tactics_core::Vec2;
use tactics_map::{Map, MapConfig, MapStore, PathResult};

const DEFAULT_DB_PATH: &str = "map.sqlite";
const DEFAULT_TABLE: &str = "map_items";

enum Command {
    Dump(Vec2),
    Path(Vec2, Vec2),
    See(Vec2, Vec2),
    Stats,
}

fn parse_coords(args: &[String]) -> Result<Vec<i32>> {
    args.iter()
        .map(|arg| {
            arg.parse::<i32>()
                .with_context(|| format!("'{arg}' is not a tile coordinate"))
        })
        .collect()
}

fn parse_command(args: &[String]) -> Result<Command> {
    let Some(name) = args.first() else {
        bail!("missing command (dump, path, see, stats)");
    };
    let coords = parse_coords(&args[1..])?;
    let command = match (name.to_lowercase().as_str(), coords.as_slice()) {
        ("dump", [x, y]) => Command::Dump(Vec2::new(*x, *y)),
        ("path", [x0, y0, x1, y1]) => Command::Path(Vec2::new(*x0, *y0), Vec2::new(*x1, *y1)),
        ("see", [x0, y0, x1, y1]) => Command::See(Vec2::new(*x0, *y0), Vec2::new(*x1, *y1)),
        ("stats", []) => Command::Stats,
        (other, _) => bail!("unknown command or wrong arguments: {other}"),
    };
    Ok(command)
}

fn run(command: Command) -> Result<()> {
    let db_path = env::var("TACTICS_MAP_DB").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());
    let table = env::var("TACTICS_MAP_TABLE").unwrap_or_else(|_| DEFAULT_TABLE.to_string());

    let mut map = Map::new(MapConfig::from_env()).context("invalid map configuration")?;
    let store = MapStore::open(&db_path, &table)
        .with_context(|| format!("failed to open map store {db_path}"))?;
    map.load_item_defs(&store)
        .context("failed to load archetypes")?;
    let synced = map.sync_to_db(store).context("failed to sync map")?;
    log::info!("{synced} items synced from {db_path}:{table}");

    match command {
        Command::Dump(tile) => {
            let dump = map.dump_tile(tile.x, tile.y);
            println!("{}", serde_json::to_string_pretty(&dump)?);
        }
        Command::Path(start, end) => match map.solve_path(start, end) {
            PathResult::Solved { cost, path } => {
                let steps: Vec<String> = path.iter().map(|p| format!("({}, {})", p.x, p.y)).collect();
                println!("cost {cost:.3}: {}", steps.join(" -> "));
            }
            other => println!("{other:?}"),
        },
        Command::See(from, to) => {
            println!("{}", map.can_see(from, to - from));
        }
        Command::Stats => {
            println!("{}", serde_json::to_string_pretty(&map.stats())?);
        }
    }
    Ok(())
}

fn main() {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let log_file = env::var("TACTICS_LOG").ok();
    tactics_core::initialize_logger(log::LevelFilter::Info, log_file.as_deref()).unwrap_or_else(
        |e| {
            eprintln!("Failed to initialize logger: {e}. Exiting.");
            process::exit(1);
        },
    );

    let args: Vec<String> = env::args().skip(1).collect();
    let result = parse_command(&args).and_then(run);
    if let Err(e) = result {
        log::error!("map-tool failed: {e:#}");
        process::exit(1);
    }
}
