//! fcs CLI - functional conformance runs against a discovered API

mod storage;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use fcs_core::permissions::{populate_tokens, required_tokens, test_case_permissions};
use fcs_core::{
    AssertionLibrary, Config, Discovery, NullValidator, ResponseValidator, Scripts,
    SpecificationTestCases, TracingSink, VerdictStatus, find_unmatched_manifest_tests,
    generate_test_cases, map_discovery_endpoints_to_manifest_test_ids,
};
use fcs_runner::{
    Certificate, HttpExecutor, OpenApiValidator, RunAborted, RunDefinition, run_test_cases,
};

#[derive(Parser)]
#[command(name = "fcs")]
#[command(about = "Functional conformance suite for discovered API endpoints")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: .fcs.toml, .fcs.json or fcs.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "terminal")]
    output: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate test cases from discovery + manifest and run them
    Run {
        /// Report directory (overrides config)
        #[arg(short, long)]
        report_dir: Option<PathBuf>,

        /// Do not save the report
        #[arg(long)]
        no_save: bool,
    },

    /// Show which manifest tests map to discovered endpoints
    Map,

    /// Show the access tokens a run needs
    Permissions {
        /// Fill every token with this value instead of leaving it empty
        #[arg(long)]
        static_token: Option<String>,
    },

    /// Initialize config file
    Init,

    /// Export JSON Schema for the run report
    Schema,
}

#[derive(Clone, Copy, ValueEnum, PartialEq, Eq)]
enum OutputFormat {
    Terminal,
    Json,
    Silent,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(cli) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(3)
        }
    }
}

/// `RUST_LOG` wins; default is info for this tool, warn for dependencies
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fcs=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    Ok(match path {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    })
}

/// Discovery and manifest documents named by the config
struct Inputs {
    discovery: Discovery,
    scripts: Scripts,
}

impl Inputs {
    fn load(cfg: &Config) -> Result<Self> {
        Ok(Self {
            discovery: Discovery::load(&cfg.discovery)?,
            scripts: Scripts::load(&cfg.manifest)?,
        })
    }

    fn generate(&self, cfg: &Config, sink: &TracingSink) -> Result<Vec<SpecificationTestCases>> {
        let library = match &cfg.assertions {
            Some(path) => AssertionLibrary::load(path)?,
            None => AssertionLibrary::default(),
        };
        Ok(generate_test_cases(&self.scripts, &self.discovery, &library, sink)?)
    }
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Run { report_dir, no_save } => {
            let cfg = load_config(cli.config.as_deref())?;
            let sink = TracingSink::new(cfg.trace);
            let inputs = Inputs::load(&cfg)?;
            let specifications = inputs.generate(&cfg, &sink)?;

            let validator: Box<dyn ResponseValidator> = match &cfg.openapi {
                Some(path) => Box::new(OpenApiValidator::load(path)?),
                None => Box::new(NullValidator),
            };
            let mut executor = HttpExecutor::new(Duration::from_secs(cfg.timeout_secs))?;
            let mut defn = RunDefinition::new(specifications, cfg.run_context());
            if let Some(paths) = &cfg.certificates {
                let (signing, transport) = Certificate::load_pair(paths)?;
                defn = defn.with_certificates(signing, transport);
            }

            if cli.output != OutputFormat::Silent {
                eprintln!("Config:");
                eprintln!("  discovery: {}", cfg.discovery.display());
                eprintln!("  manifest:  {}", cfg.manifest.display());
                if let Some(openapi) = &cfg.openapi {
                    eprintln!("  openapi:   {}", openapi.display());
                }
                eprintln!();
            }

            let start = Instant::now();
            let (report, aborted) =
                match run_test_cases(defn, &mut executor, validator.as_ref(), &sink) {
                    Ok(outcome) => (outcome.report, None),
                    Err(aborted) => {
                        let RunAborted { report, cause } = *aborted;
                        (report, Some(cause.to_string()))
                    }
                };
            let duration_secs = start.elapsed().as_secs_f64();
            let summary = report.summary(aborted.as_deref());

            match cli.output {
                OutputFormat::Terminal => {
                    for spec in &report.specifications {
                        println!("\n{} {}", spec.name, spec.version);
                        for t in &spec.tests {
                            let icon = if t.pass { "PASS" } else { "FAIL" };
                            println!("  [{icon}] {} {} ({})", t.id, t.endpoint, t.name);
                            if let Some(reason) = &t.fail_reason {
                                println!("         {reason}");
                            }
                        }
                    }
                    let icon = if summary.verdict.status == VerdictStatus::Pass {
                        "PASS"
                    } else {
                        "FAIL"
                    };
                    println!("\n{icon}: {}", summary.verdict.reason);
                    println!(
                        "  Tests: {} total, {} passed, {} failed",
                        summary.total, summary.passed, summary.failed
                    );
                    println!("  Exit code: {}", summary.verdict.exit_code);
                }
                OutputFormat::Json => {
                    let json = serde_json::json!({ "summary": summary, "report": report });
                    println!("{}", serde_json::to_string_pretty(&json)?);
                }
                OutputFormat::Silent => {}
            }

            if !no_save {
                let base = report_dir.unwrap_or_else(|| cfg.report_dir());
                let data = storage::ReportData {
                    config: &cfg,
                    discovery_name: &inputs.discovery.model.name,
                    report: &report,
                    summary: &summary,
                    duration_secs,
                };
                match storage::save_report(&base, &data) {
                    Ok(path) => {
                        if cli.output != OutputFormat::Silent {
                            eprintln!("Report saved: {}", path.display());
                        }
                    }
                    Err(e) => eprintln!("Warning: failed to save report: {e}"),
                }
            }

            Ok(summary.verdict.exit_code)
        }

        Commands::Map => {
            let cfg = load_config(cli.config.as_deref())?;
            let inputs = Inputs::load(&cfg)?;
            let mapping =
                map_discovery_endpoints_to_manifest_test_ids(&inputs.discovery, &inputs.scripts);
            let unmatched = find_unmatched_manifest_tests(&inputs.scripts, &mapping);

            match cli.output {
                OutputFormat::Terminal => {
                    for (path, methods) in &mapping {
                        for (method, ids) in methods {
                            println!("{method:6} {path}");
                            for id in ids {
                                println!("         {id}");
                            }
                        }
                    }
                    if !unmatched.is_empty() {
                        println!("\nNot discovered ({}):", unmatched.len());
                        for id in &unmatched {
                            println!("  {id}");
                        }
                    }
                }
                OutputFormat::Json => {
                    let json = serde_json::json!({ "mapped": mapping, "unmatched": unmatched });
                    println!("{}", serde_json::to_string_pretty(&json)?);
                }
                OutputFormat::Silent => {}
            }
            Ok(0)
        }

        Commands::Permissions { static_token } => {
            let cfg = load_config(cli.config.as_deref())?;
            let sink = TracingSink::new(cfg.trace);
            let specifications = Inputs::load(&cfg)?.generate(&cfg, &sink)?;

            let summary = test_case_permissions(specifications.iter().flat_map(|s| &s.test_cases))
                .context("reading test case permissions")?;
            let mut tokens = required_tokens(&summary.test_cases);
            if let Some(token) = static_token {
                populate_tokens(&mut tokens, |_| Ok::<_, std::convert::Infallible>(token.clone()))?;
            }

            match cli.output {
                OutputFormat::Terminal => {
                    for t in &tokens {
                        println!("{}: {}", t.name, t.perms.join(" "));
                        println!("         {}", t.ids.join(", "));
                    }
                    if !summary.ambiguous.is_empty() {
                        println!("\nNo default permission ({}):", summary.ambiguous.len());
                        for id in &summary.ambiguous {
                            println!("  {id}");
                        }
                    }
                }
                OutputFormat::Json => {
                    let json = serde_json::json!({
                        "tokens": tokens,
                        "ambiguous": summary.ambiguous,
                    });
                    println!("{}", serde_json::to_string_pretty(&json)?);
                }
                OutputFormat::Silent => {}
            }
            Ok(0)
        }

        Commands::Init => {
            let config_path = ".fcs.toml";
            if Path::new(config_path).exists() {
                eprintln!("{config_path} already exists");
                return Ok(1);
            }

            std::fs::write(config_path, Config::example())?;
            println!("Created {config_path}");
            println!("\nEdit the file to configure:");
            println!("  - discovery: the discovery document of the target");
            println!("  - manifest / assertions: test scripts and their asserts");
            println!("  - context: access_token and resource ids");
            println!("  - certificates: signing and transport PEM files");
            Ok(0)
        }

        Commands::Schema => {
            let schema = fcs_core::report::generate_schema()?;
            println!("{schema}");
            Ok(0)
        }
    }
}
