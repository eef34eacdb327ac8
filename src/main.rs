use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};

use nexus_tester::api::HttpTestingApi;
use nexus_tester::config::Config;
use nexus_tester::management::{self, ChainEditor};
use nexus_tester::report;
use nexus_tester::runner::{ConsoleEventListener, WizardInputs, WizardRunner};
use nexus_tester::session::{SharedContextStore, WizardDefinition};

#[derive(Parser)]
#[command(name = "nexus-tester")]
#[command(version = "0.1.0")]
#[command(about = "Step wizard for generating and running API test suites", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true, default_value = "false")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk the wizard: pick endpoints, generate a suite, run it, show results
    Wizard {
        /// Config file (YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Service to test
        #[arg(short, long)]
        service: String,

        /// Endpoint ids (comma-separated). Defaults to every endpoint.
        #[arg(short, long, value_delimiter = ',')]
        endpoints: Vec<String>,

        /// Name of the generated suite
        #[arg(long)]
        suite_name: String,

        /// Suite description
        #[arg(long)]
        description: Option<String>,

        /// Extra instructions for test generation
        #[arg(long)]
        instructions: Option<String>,

        /// Output directory for the run record and reports
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate report from a stored run record
    Report {
        /// Path to run record JSON
        results: PathBuf,

        /// Output format (json, junit, summary)
        #[arg(short, long, default_value = "summary")]
        format: String,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Inspect and edit chain files
    Chain {
        #[command(subcommand)]
        command: ChainCommands,
    },
}

#[derive(Subcommand)]
enum ChainCommands {
    /// Report sequence and variable problems in a chain file
    Check {
        /// Chain YAML file
        path: PathBuf,

        /// Known variable for rendering step placeholders (key=value, repeatable)
        #[arg(long = "var")]
        vars: Vec<String>,
    },

    /// Rewrite step sequences as 1..n
    Renumber {
        /// Chain YAML file
        path: PathBuf,

        /// Write here instead of in place
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match cli.command {
        Commands::Wizard {
            config,
            service,
            endpoints,
            suite_name,
            description,
            instructions,
            output,
        } => {
            let mut config = Config::resolve(config.as_deref())?;
            if let Some(dir) = output {
                config.output_dir = dir;
            }

            println!(
                "{} Generating suite {} for service {}",
                "▶".green().bold(),
                suite_name.cyan(),
                service.cyan()
            );
            println!("  Backend: {}", config.base_url.cyan());

            let inputs = WizardInputs {
                service_id: service,
                endpoint_ids: endpoints,
                suite_name,
                description,
                instructions,
            };
            run_wizard(&config, &inputs).await?;
        }

        Commands::Report {
            results,
            format,
            output,
        } => {
            println!(
                "{} Generating {} report from: {}",
                "📊".to_string().blue(),
                format.cyan(),
                results.display()
            );
            report::generate_report(&results, &format, output.as_deref())?;
        }

        Commands::Chain { command } => match command {
            ChainCommands::Check { path, vars } => check_chain(&path, &vars)?,
            ChainCommands::Renumber { path, output } => {
                let chain = management::load_chain(&path)?;
                let editor = ChainEditor::new(chain);
                let target = output.as_deref().unwrap_or(&path);
                management::save_chain(editor.chain(), target)?;
                println!(
                    "{} Renumbered {} steps -> {}",
                    "✓".green(),
                    editor.chain().steps().len(),
                    target.display()
                );
            }
        },
    }

    Ok(())
}

async fn run_wizard(config: &Config, inputs: &WizardInputs) -> anyhow::Result<()> {
    let api = HttpTestingApi::new(config)?;
    let mut runner = WizardRunner::new(api, WizardDefinition::api_testing(), config);

    let listener = tokio::spawn(ConsoleEventListener::listen(runner.subscribe()));
    runner.start();

    let outcome = runner.run_to_completion(inputs).await;
    let record = runner.run_record();

    // Closing the channel lets the listener drain and exit
    drop(runner);
    let _ = listener.await;

    let Some(record) = record else {
        outcome?;
        anyhow::bail!("Wizard finished without a run result");
    };

    std::fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "Failed to create output directory: {}",
            config.output_dir.display()
        )
    })?;
    let record_path = config.output_dir.join("run.json");
    report::save_record(&record, &record_path)?;
    report::junit::write_report(&record, &config.output_dir)?;

    report::summary::print(&record.view());
    println!("  Run record: {}", record_path.display().to_string().cyan());

    // A run that never finished still leaves its partial record behind
    outcome?;
    Ok(())
}

fn check_chain(path: &Path, vars: &[String]) -> anyhow::Result<()> {
    let chain = management::load_chain(path)?;

    let mut ctx = SharedContextStore::new();
    for var in vars {
        let (key, value) = var
            .split_once('=')
            .with_context(|| format!("Expected key=value, got '{}'", var))?;
        ctx.set(key.trim(), value);
    }

    println!("{} {}", "▶".green().bold(), chain.name.cyan());
    for step in chain.steps() {
        let rendered = step.render(&ctx);
        println!(
            "  {:>3}. {} {}",
            step.sequence,
            step.display_name().white().bold(),
            format!("{} {}", rendered.method, rendered.path).dimmed()
        );
    }

    let issues = chain.validate();
    if issues.is_empty() {
        println!(
            "{} {} ({} steps) is valid",
            "✓".green(),
            chain.name.cyan(),
            chain.steps().len()
        );
        return Ok(());
    }

    println!("{} {} has problems:", "✗".red(), chain.name.cyan());
    for issue in &issues {
        println!("  - {}", issue);
    }
    anyhow::bail!("{} issue(s) in {}", issues.len(), path.display())
}
