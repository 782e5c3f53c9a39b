//! zevsplit entry point — CLI wiring for cache maintenance, setup
//! discovery, and energy analysis.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use chrono::{DateTime, Duration, Local, NaiveDate};
use tracing_subscriber::EnvFilter;

use zevsplit::analysis::engine::Analyzer;
use zevsplit::api::HttpSource;
use zevsplit::cache::{self, CachedSource, MeterCache};
use zevsplit::config::Config;
use zevsplit::io::export::export_csv;
use zevsplit::ranges::{day_end, day_start};
use zevsplit::report::write_report;
use zevsplit::setup::suggest_config;
use zevsplit::source::DataSource;

/// Parsed CLI arguments.
struct CliArgs {
    config_path: PathBuf,
    from: Option<String>,
    to: Option<String>,
    days: Option<i64>,
    energy: bool,
    suggest_setup: bool,
    dump_cache: bool,
    clear_cache: bool,
    no_cache: bool,
    csv_out: Option<PathBuf>,
    debug: bool,
}

fn print_help() {
    eprintln!("zevsplit — per-consumer energy attribution for ZEV billing groups");
    eprintln!();
    eprintln!("Usage: zevsplit [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <path>      Config file (default: config.toml)");
    eprintln!("  --energy             Run the energy analysis");
    eprintln!("  --from <date>        Start date (YYYY-MM-DD or DD.MM.YYYY)");
    eprintln!("  --to <date>          End date (YYYY-MM-DD or DD.MM.YYYY)");
    eprintln!("  --days <n>           Analyze the last n days (ignored with --from/--to)");
    eprintln!("  --csv-out <path>     Export consumer attribution to CSV");
    eprintln!("  --suggest-setup      Classify sensors and print a [zev] config suggestion");
    eprintln!("  --dump-cache         Print a summary of the reading cache");
    eprintln!("  --clear-cache        Delete the reading cache file");
    eprintln!("  --no-cache           Bypass the reading cache for this run");
    eprintln!("  --debug              Verbose diagnostic logging");
    eprintln!("  --help               Show this help message");
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        config_path: PathBuf::from("config.toml"),
        from: None,
        to: None,
        days: None,
        energy: false,
        suggest_setup: false,
        dump_cache: false,
        clear_cache: false,
        no_cache: false,
        csv_out: None,
        debug: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--config" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --config requires a path argument");
                    process::exit(1);
                }
                cli.config_path = PathBuf::from(&args[i]);
            }
            "--from" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --from requires a date argument");
                    process::exit(1);
                }
                cli.from = Some(args[i].clone());
            }
            "--to" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --to requires a date argument");
                    process::exit(1);
                }
                cli.to = Some(args[i].clone());
            }
            "--days" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --days requires a number argument");
                    process::exit(1);
                }
                match args[i].parse::<i64>() {
                    Ok(n) if n > 0 => cli.days = Some(n),
                    _ => {
                        eprintln!("error: --days value \"{}\" is not a positive number", args[i]);
                        process::exit(1);
                    }
                }
            }
            "--csv-out" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("error: --csv-out requires a path argument");
                    process::exit(1);
                }
                cli.csv_out = Some(PathBuf::from(&args[i]));
            }
            "--energy" => cli.energy = true,
            "--suggest-setup" => cli.suggest_setup = true,
            "--dump-cache" => cli.dump_cache = true,
            "--clear-cache" => cli.clear_cache = true,
            "--no-cache" => cli.no_cache = true,
            "--debug" => cli.debug = true,
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    for format in ["%Y-%m-%d", "%d.%m.%Y", "%d.%m.%y"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Ok(date);
        }
    }
    Err(format!(
        "invalid date \"{s}\", expected YYYY-MM-DD or DD.MM.YYYY"
    ))
}

/// Resolves the analysis window: explicit dates, a trailing day count, or
/// today by default.
fn resolve_window(cli: &CliArgs) -> Result<(DateTime<Local>, DateTime<Local>), String> {
    let today = Local::now().date_naive();

    match (&cli.from, &cli.to) {
        (Some(from), Some(to)) => {
            let from = parse_date(from)?;
            let to = parse_date(to)?;
            if from > to {
                return Err("start date is after end date".to_string());
            }
            Ok((day_start(from), day_end(to)))
        }
        (None, None) => {
            let days = cli.days.unwrap_or(1);
            let from = today - Duration::days(days - 1);
            Ok((day_start(from), day_end(today)))
        }
        _ => Err("--from and --to must be given together".to_string()),
    }
}

fn cache_path(cli: &CliArgs, config: &Config) -> PathBuf {
    config
        .cache
        .path
        .clone()
        .unwrap_or_else(|| cache::cache_file_path(&cli.config_path))
}

fn fail_on_config_errors(errors: &[zevsplit::config::ConfigError]) {
    if !errors.is_empty() {
        for e in errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }
}

fn main() {
    let cli = parse_args();

    let default_filter = if cli.debug { "zevsplit=debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config = match Config::from_toml_file(&cli.config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };
    fail_on_config_errors(&config.validate());

    let cache_file = cache_path(&cli, &config);

    if cli.clear_cache {
        if let Err(e) = cache::delete(&cache_file) {
            eprintln!("error: failed to delete cache: {e}");
            process::exit(1);
        }
        eprintln!("Cache deleted: {}", cache_file.display());
        return;
    }

    if cli.dump_cache {
        // Identity is intentionally unchecked for inspection.
        match MeterCache::load(&cache_file, None) {
            Ok(cache) => {
                let stdout = io::stdout();
                if let Err(e) = cache::dump(&cache, &mut stdout.lock()) {
                    eprintln!("error: failed to write cache dump: {e}");
                    process::exit(1);
                }
            }
            Err(e) => {
                eprintln!("error: failed to read cache: {e}");
                process::exit(1);
            }
        }
        return;
    }

    if !cli.energy && !cli.suggest_setup {
        print_help();
        return;
    }

    let mut http = HttpSource::new(&config.api);
    let site_id = match http.discover_site() {
        Ok(site_id) => site_id,
        Err(e) => {
            eprintln!("error: resolving site: {e}");
            process::exit(1);
        }
    };

    if cli.suggest_setup {
        match http.sensor_catalog(&site_id) {
            Ok(catalog) => print!("{}", suggest_config(&catalog)),
            Err(e) => {
                eprintln!("error: fetching sensor catalog: {e}");
                process::exit(1);
            }
        }
        return;
    }

    // --energy from here on.
    fail_on_config_errors(&config.validate_analysis());

    let (from, to) = match resolve_window(&cli) {
        Ok(window) => window,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };

    let caching_enabled = config.cache.enabled && !cli.no_cache;
    let mut source = match CachedSource::new(http, &cache_file, &site_id, caching_enabled) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("error: loading cache: {e}");
            process::exit(1);
        }
    };

    let report = match Analyzer::new(&mut source, &config).analyze(&site_id, from, to) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("error: analysis failed: {e}");
            process::exit(1);
        }
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if let Err(e) = write_report(&mut out, &report) {
        eprintln!("error: failed to write report: {e}");
        process::exit(1);
    }
    let _ = out.flush();

    if let Some(ref path) = cli.csv_out {
        if let Err(e) = export_csv(&report, path) {
            eprintln!("error: failed to write CSV: {e}");
            process::exit(1);
        }
        eprintln!("Attribution written to {}", path.display());
    }
}
