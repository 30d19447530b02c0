use clap::{crate_authors, crate_description, crate_version, Arg, ArgAction, ArgMatches, Command};
use pretty_env_logger::env_logger::Builder;
use std::env;
use std::io::Write;
use std::path::PathBuf;
use std::process::exit;

use zonesync::models::DomainConfig;
use zonesync::orchestrator::{DomainReport, Mode, Orchestrator};
use zonesync::providers::Registry;
use zonesync::zonefile::OutputFormat;
use zonesync::Config;

fn set_logger_level(b: &mut Builder) {
    let mut b = b;
    if env::var("RUST_LOG").is_err() {
        b = b.filter_level(log::LevelFilter::Info)
    }
    b.init();
}

fn setup_logger() {
    // Adapted from env_logger examples. <3 Systemd support
    match std::env::var("RUST_LOG_STYLE") {
        Ok(s) if s == "SYSTEMD" => {
            let builder = &mut pretty_env_logger::env_logger::builder();
            builder.format(|buf, record| {
                writeln!(
                    buf,
                    "<{}>{}: {}",
                    match record.level() {
                        log::Level::Error => 3,
                        log::Level::Warn => 4,
                        log::Level::Info => 6,
                        log::Level::Debug => 7,
                        log::Level::Trace => 7,
                    },
                    record.target(),
                    record.args()
                )
            });
            set_logger_level(builder);
        }
        _ => {
            let builder = &mut pretty_env_logger::formatted_builder();
            set_logger_level(builder);
        }
    };
}

fn domains_arg() -> Arg {
    Arg::new("domains")
        .action(ArgAction::Append)
        .value_delimiter(',')
        .long("domains")
        .help("Only process these domains")
}

fn command() -> Command {
    Command::new("zonesync")
        .about(format!(
            "{}\n{} {}",
            crate_description!(),
            "Configuration is read from a JSON file and ZONESYNC__* environment variables.",
            "See the docs for more information.",
        ))
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .global(true)
                .default_value("zonesync.json")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Configuration file"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("check")
                .about("Validate the configuration without contacting any provider")
                .arg(domains_arg()),
        )
        .subcommand(
            Command::new("preview")
                .about("Show the corrections a push would make")
                .arg(domains_arg()),
        )
        .subcommand(
            Command::new("push")
                .about("Apply corrections")
                .arg(domains_arg()),
        )
        .subcommand(
            Command::new("print-ir")
                .about("Print the declared domains as JSON, after the DSL is merged in")
                .arg(domains_arg()),
        )
        .subcommand(
            Command::new("create-domains")
                .about("Create missing zones at providers that support it")
                .arg(domains_arg()),
        )
        .subcommand(
            Command::new("get-zones")
                .about("Print zones held by a provider")
                .arg(
                    Arg::new("format")
                        .long("format")
                        .default_value("zone")
                        .value_parser(["zone", "dsl", "tsv"])
                        .help("Output format"),
                )
                .arg(Arg::new("provider").required(true).help("Provider name"))
                .arg(
                    Arg::new("zones")
                        .action(ArgAction::Append)
                        .help("Zones to fetch, all of them if omitted"),
                ),
        )
        .version(crate_version!())
        .author(crate_authors!("\n"))
}

fn selected(domains: Vec<DomainConfig>, args: &ArgMatches) -> Vec<DomainConfig> {
    let Some(wanted) = args.get_many::<String>("domains") else {
        return domains;
    };
    let wanted: Vec<String> = wanted.map(|d| d.trim_end_matches('.').to_ascii_lowercase()).collect();
    domains
        .into_iter()
        .filter(|dc| wanted.contains(&dc.name.trim_end_matches('.').to_ascii_lowercase()))
        .collect()
}

fn print_reports(reports: &[DomainReport]) {
    for report in reports {
        println!("******************** Domain: {}", report.domain);
        for warning in &report.warnings {
            println!("WARNING: {warning}");
        }
        for provider in report.providers.iter().chain(report.registrar.iter()) {
            println!("----- {}", provider.provider);
            for warning in &provider.warnings {
                println!("WARNING: {warning}");
            }
            for (i, msg) in provider.corrections.iter().enumerate() {
                println!("#{}: {msg}", i + 1);
            }
        }
        if let Some(err) = &report.error {
            println!("ERROR: {err}");
        }
    }
    let failed = reports.iter().filter(|r| !r.is_ok()).count();
    let changes: usize = reports.iter().map(DomainReport::changes).sum();
    println!("Done. {changes} corrections, {failed} failed domains.");
}

pub(crate) fn main() {
    let args = command().get_matches();

    setup_logger();

    let Some((subcommand, sub_args)) = args.subcommand() else {
        exit(2);
    };
    let path = sub_args
        .get_one::<PathBuf>("config")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("zonesync.json"));

    let config = match Config::load(&path) {
        Ok(c) => c,
        Err(err) => {
            println!("{err}");
            exit(2);
        }
    };
    if subcommand == "print-ir" {
        match serde_json::to_string_pretty(&selected(config.domains, sub_args)) {
            Ok(json) => {
                println!("{json}");
                exit(0);
            }
            Err(err) => {
                println!("{err}");
                exit(1);
            }
        }
    }

    let registry = Registry::with_builtin();
    let providers = match config.build_providers(&registry) {
        Ok(p) => p,
        Err(err) => {
            println!("{err}");
            exit(2);
        }
    };
    let cache = match config.dns_cache() {
        Ok(c) => c,
        Err(err) => {
            println!("{err}");
            exit(2);
        }
    };
    let orchestrator = Orchestrator::new(&registry, &providers)
        .with_resolver(&cache)
        .with_concurrency(config.concurrency);

    let reports = match subcommand {
        "get-zones" => {
            let format = sub_args
                .get_one::<String>("format")
                .and_then(|f| f.parse::<OutputFormat>().ok())
                .unwrap_or(OutputFormat::Zone);
            let zones: Vec<String> = sub_args
                .get_many::<String>("zones")
                .map(|z| z.cloned().collect())
                .unwrap_or_default();
            let provider = sub_args.get_one::<String>("provider").cloned().unwrap_or_default();
            let stdout = std::io::stdout();
            if let Err(err) = orchestrator.get_zones(&provider, &zones, format, &mut stdout.lock()) {
                println!("{err}");
                exit(1);
            }
            exit(0);
        }
        "create-domains" => orchestrator.create_domains(&selected(config.domains, sub_args)),
        "check" => orchestrator.run(selected(config.domains, sub_args), Mode::Check),
        "preview" => orchestrator.run(selected(config.domains, sub_args), Mode::Preview),
        "push" => orchestrator.run(selected(config.domains, sub_args), Mode::Push),
        _ => exit(2),
    };

    print_reports(&reports);
    if let Err(err) = cache.save() {
        tracing::warn!("Failed to save lookup cache: {err}");
    }
    if reports.iter().any(|r| !r.is_ok()) {
        exit(1);
    }
    tracing::info!(domains = reports.len(), "Finished");
}
