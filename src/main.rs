use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::*;
use std::path::PathBuf;
use std::process;

use netscan::{
    config::ScanConfig,
    intelligence::{identify_services, BannerGrabber},
    network::{IcmpEcho, TcpConnectProber},
    output::{OutputConfig, OutputFormat, OutputManager},
    scanner::{LivenessChecker, ScanEngine},
    utils::{parse_duration, validate_target, PortSpec},
    ScanError,
};
use tokio_util::sync::CancellationToken;

const AFTER_HELP: &str = "\
Examples:
  netscan --host 192.168.1.1 --ports 1-1000
  netscan --host example.com --ports 22,80,443,8080
  netscan --host 192.168.1.1 --ports 1-100 --timeout 5s --concurrent 50

The ICMP echo fallback of the liveness check needs a raw socket: run as root
or grant the binary CAP_NET_RAW (sudo setcap cap_net_raw+ep $(which netscan)).
Without it a host that answers on none of 80, 443 and 22 is reported as down;
use --no-ping to scan it anyway.";

fn build_cli() -> Command {
    Command::new("netscan")
        .version(env!("CARGO_PKG_VERSION"))
        .about("A fast TCP port scanner")
        .after_help(AFTER_HELP)
        .arg(
            Arg::new("host")
                .long("host")
                .value_name("HOST")
                .help("Target host (IP address or hostname)")
                .required(true),
        )
        .arg(
            Arg::new("ports")
                .short('p')
                .long("ports")
                .value_name("PORTS")
                .help("Ports to scan (e.g., 1-1000 or 22,80,443)")
                .required(true),
        )
        .arg(
            Arg::new("timeout")
                .short('t')
                .long("timeout")
                .value_name("DURATION")
                .help("Timeout for each port (e.g., 500ms, 2s) [default: 2s]"),
        )
        .arg(
            Arg::new("concurrent")
                .short('c')
                .long("concurrent")
                .value_name("COUNT")
                .help("Number of concurrent scanners [default: 20]")
                .allow_negative_numbers(true)
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Verbose output")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("Read settings from this TOML file instead of ~/.netscan.toml")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("no-ping")
                .long("no-ping")
                .help("Skip the liveness check and scan unconditionally")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("service-detect")
                .long("service-detect")
                .help("Identify services on open ports from their banners")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FORMAT")
                .help("Output format")
                .value_parser(["text", "json", "greppable"])
                .default_value("text"),
        )
        .arg(
            Arg::new("output-file")
                .long("output-file")
                .value_name("FILE")
                .help("Write results to a file instead of stdout")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("no-color")
                .long("no-color")
                .help("Disable colored output")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("ulimit")
                .short('u')
                .long("ulimit")
                .value_name("LIMIT")
                .help("Raise the open file limit to this value before scanning")
                .value_parser(clap::value_parser!(u64)),
        )
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

// Ulimit adjustment for Unix systems
#[cfg(unix)]
fn adjust_ulimit_size(limit: u64) {
    use rlimit::Resource;

    if Resource::NOFILE.set(limit, limit).is_ok() {
        log::info!("Raised open file limit to {}", limit);
    } else {
        eprintln!("{}", "[!] Failed to set ulimit value.".bright_red());
    }

    if let Ok((soft, _)) = Resource::NOFILE.get() {
        log::debug!("Open file limit is {}", soft);
    }
}

#[cfg(not(unix))]
fn adjust_ulimit_size(_limit: u64) {
    log::warn!("--ulimit is only supported on Unix systems");
}

/// Settings file first, then command line flags on top
fn load_config(matches: &ArgMatches) -> anyhow::Result<ScanConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => ScanConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ScanConfig::load_default_config(),
    };

    if let Some(timeout) = matches.get_one::<String>("timeout") {
        let timeout = parse_duration(timeout).context("Error parsing timeout")?;
        config = config.with_timeout(timeout);
    }

    if let Some(&concurrent) = matches.get_one::<i64>("concurrent") {
        match usize::try_from(concurrent) {
            Ok(count) => config = config.with_concurrency(count),
            Err(_) => log::warn!("Ignoring concurrency {}", concurrent),
        }
    }

    if matches.get_flag("no-ping") {
        config = config.with_skip_liveness(true);
    }
    if matches.get_flag("service-detect") {
        config = config.with_service_detection(true);
    }

    config.validate()?;
    Ok(config)
}

async fn run(matches: ArgMatches) -> anyhow::Result<()> {
    let verbose = matches.get_flag("verbose");
    let host = validate_target(
        matches
            .get_one::<String>("host")
            .map(String::as_str)
            .unwrap_or_default(),
    )?;
    let port_arg = matches
        .get_one::<String>("ports")
        .map(String::as_str)
        .unwrap_or_default();
    let ports = PortSpec::parse(port_arg).context("Error parsing ports")?;
    let config = load_config(&matches)?;

    if let Some(&limit) = matches.get_one::<u64>("ulimit") {
        adjust_ulimit_size(limit);
    }

    let format = matches
        .get_one::<String>("output")
        .map(|format| format.parse::<OutputFormat>())
        .transpose()
        .map_err(anyhow::Error::msg)?
        .unwrap_or_default();
    let colored = !matches.get_flag("no-color");
    if !colored {
        colored::control::set_override(false);
    }

    let output = OutputManager::new(OutputConfig {
        format,
        file: matches.get_one::<PathBuf>("output-file").cloned(),
        colored,
        verbose,
    });
    let narrate = verbose && format == OutputFormat::Text;

    if config.skip_liveness {
        log::debug!("Liveness check skipped for {}", host);
    } else {
        if narrate {
            println!("Checking if host {} is alive...", host);
        }

        let checker = LivenessChecker::new(TcpConnectProber, IcmpEcho).with_timeouts(
            config.liveness_timeout_duration(),
            config.liveness_timeout_duration(),
        );
        let liveness = checker.check(host).await;
        log::debug!("Liveness of {}: {}", host, liveness.describe());

        if format == OutputFormat::Text {
            println!("{}", output.host_status(host, &liveness));
        }
        if !liveness.is_alive() {
            if format != OutputFormat::Text || output.config().file.is_some() {
                output
                    .write_host_down(host, &liveness)
                    .context("Failed to write results")?;
            }
            return Ok(());
        }
    }

    if narrate {
        match &ports {
            PortSpec::Range { start, end } => println!(
                "Scanning port range {}-{} on {} with {} concurrent scanners",
                start, end, host, config.concurrency
            ),
            PortSpec::List(list) => println!(
                "Scanning {} individual ports on {} with {} concurrent scanners",
                list.len(),
                host,
                config.concurrency
            ),
        }
    }

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "{}",
                "\n[!] Interrupted, waiting for in-flight probes...".bright_yellow()
            );
            ctrl_c_token.cancel();
        }
    });

    let engine = ScanEngine::new(TcpConnectProber, config.clone());
    let mut report = engine
        .scan_with_cancel(host, &ports.ports(), cancel.clone())
        .await;

    if config.service_detection && !report.open_ports.is_empty() {
        let grabber = BannerGrabber::new(config.banner_timeout_duration());
        report.services = identify_services(
            &grabber,
            host,
            report.open_ports.as_slice(),
            config.concurrency,
            &cancel,
        )
        .await;
    }

    output
        .write_report(&report)
        .context("Failed to write results")?;

    Ok(())
}

#[tokio::main]
async fn main() {
    let matches = build_cli().get_matches();
    init_logging(matches.get_flag("verbose"));

    if let Err(e) = run(matches).await {
        eprintln!("{} {:#}", "Error:".bright_red().bold(), e);
        if e
            .downcast_ref::<ScanError>()
            .map_or(false, ScanError::is_input_error)
        {
            eprintln!("Run 'netscan --help' for usage.");
        }
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_cli_overrides_config() {
        let matches = build_cli().get_matches_from([
            "netscan",
            "--host",
            "127.0.0.1",
            "-p",
            "1-100",
            "-t",
            "500ms",
            "-c",
            "50",
            "--no-ping",
        ]);
        let config = load_config(&matches).unwrap();

        assert_eq!(config.timeout, 500);
        assert_eq!(config.concurrency, 50);
        assert!(config.skip_liveness);
        assert!(!config.service_detection);
    }

    #[test]
    fn test_non_positive_concurrency_is_ignored() {
        let matches = build_cli().get_matches_from([
            "netscan", "--host", "127.0.0.1", "-p", "80", "-c", "-5",
        ]);
        let config = load_config(&matches).unwrap();
        assert!(config.concurrency > 0);
    }

    #[test]
    fn test_bad_timeout_is_rejected() {
        let matches = build_cli().get_matches_from([
            "netscan", "--host", "127.0.0.1", "-p", "80", "-t", "fast",
        ]);
        assert!(load_config(&matches).is_err());
    }

    #[test]
    fn test_missing_host_is_a_usage_error() {
        assert!(build_cli()
            .try_get_matches_from(["netscan", "-p", "80"])
            .is_err());
    }
}
