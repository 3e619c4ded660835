use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use pagewatch::{
    ActionExecutor, ChromePageSurface, Config, MonitoringSupervisor, ScanConfig, WebAction,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    let url = || Arg::new("url").required(true).help("Page to open");
    let selectors = || {
        Arg::new("selector")
            .short('s')
            .long("selector")
            .action(ArgAction::Append)
            .help("CSS selector to read (repeatable)")
    };

    Command::new("pagewatch")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Drive a browser page and watch it for changes")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .help("JSON configuration file"),
        )
        .arg(
            Arg::new("headful")
                .long("headful")
                .global(true)
                .help("Show the browser window")
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("scan")
                .about("Snapshot the elements of a page")
                .arg(url())
                .arg(selectors()),
        )
        .subcommand(
            Command::new("extract")
                .about("Extract structured data from a page")
                .arg(url())
                .arg(selectors().required(true)),
        )
        .subcommand(
            Command::new("watch")
                .about("Monitor a page until interrupted")
                .arg(url())
                .arg(selectors()),
        )
        .subcommand(
            Command::new("run")
                .about("Execute a JSON file of actions as one sequence")
                .arg(Arg::new("file").required(true).help("Path to the action list")),
        )
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<Config> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => Config::from_file(path).with_context(|| format!("loading {}", path))?,
        None => Config::default(),
    };
    if matches.get_flag("headful") {
        config.browser.headless = false;
    }
    Ok(config)
}

fn selectors_of(matches: &ArgMatches) -> Vec<String> {
    matches
        .get_many::<String>("selector")
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> anyhow::Result<&'a String> {
    matches
        .get_one::<String>(name)
        .with_context(|| format!("missing argument <{}>", name))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let matches = cli().get_matches();
    let config = load_config(&matches)?;
    let surface = Arc::new(ChromePageSurface::launch(&config.browser)?);

    match matches.subcommand() {
        Some(("scan", args)) => {
            let url = required(args, "url")?;
            let mut scan_config = ScanConfig::from(&config.monitoring);
            let selectors = selectors_of(args);
            if !selectors.is_empty() {
                scan_config.selectors = selectors;
            }

            let supervisor = MonitoringSupervisor::new(surface);
            let result = supervisor.scan_page(url, &scan_config).await;
            print_json(&result)?;
        }
        Some(("extract", args)) => {
            let url = required(args, "url")?;
            let supervisor = MonitoringSupervisor::new(surface);
            let result = supervisor
                .extract_structured_data(url, &selectors_of(args))
                .await;
            print_json(&result)?;
        }
        Some(("watch", args)) => {
            let url = required(args, "url")?;
            let mut monitoring = config.monitoring.clone();
            let selectors = selectors_of(args);
            if !selectors.is_empty() {
                monitoring.monitor_selectors = selectors;
            }

            let supervisor = MonitoringSupervisor::new(surface);
            let mut results = supervisor.start_monitoring(url, monitoring).await?;
            info!("Watching {} (Ctrl-C to stop)", url);

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    next = results.recv() => match next {
                        Some(result) => print_json(&result)?,
                        None => break,
                    },
                }
            }

            if let Some(session) = supervisor.stop_monitoring(url).await {
                print_json(&session)?;
            }
        }
        Some(("run", args)) => {
            let path = required(args, "file")?;
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path))?;
            let actions: Vec<WebAction> = serde_json::from_str(&contents)
                .with_context(|| format!("parsing actions in {}", path))?;

            let executor = ActionExecutor::with_config(surface, config.executor.clone());
            let report = executor.execute_sequence(&actions).await;
            if let Some(index) = report.failed_at {
                warn!("Sequence stopped at action {}", index);
            }
            print_json(&report)?;
        }
        _ => unreachable!("subcommand_required"),
    }

    Ok(())
}
