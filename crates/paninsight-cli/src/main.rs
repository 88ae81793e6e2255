use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::{ColoredString, Colorize};
use paninsight_core::analysis::{ConfidenceBand, SegmentationResponse, Tone};
use paninsight_core::chat::{backend_from_settings, ChatBackend};
use paninsight_core::export::{
    logo::source_for, print_report, FilePrintSurface, HtmlOptions, PdfExporter, PRINT_FILE_NAME,
};
use paninsight_core::session::{self, LocalAuthGate, RemoteAuthGate};
use paninsight_core::{
    render_report, AnalysisResult, ApiClient, ApiEndpoints, AuthGate, AuthMode, ChatConfig,
    ChatMode, ChatWidget, FileReportStore, FileSessionStore, OutputFormat, ReportHolder,
    ReportStore, SessionStore, Settings,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "paninsight",
    author,
    version,
    about = "PanInsight analysis reports and health assistant"
)]
struct Cli {
    /// Optional configuration file (TOML, YAML or JSON); environment variables take precedence
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show, persist and export analysis reports
    #[command(subcommand)]
    Report(ReportCommand),
    /// Ask the health assistant; reads one question per line from stdin when none are given
    Chat {
        messages: Vec<String>,
    },
    /// Sign in to the PanInsight backend
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Sign out locally and on the backend
    Logout,
    /// Print the signed-in user
    Whoami,
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Analysis result JSON handed over by the upload step
    #[arg(long, value_name = "FILE")]
    input: Option<PathBuf>,
    /// Segmentation service response to merge into the input
    #[arg(long, value_name = "FILE", requires = "input")]
    segmentation: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum ReportCommand {
    /// Render the report summary
    Show {
        #[command(flatten)]
        input: InputArgs,
        /// Emit JSON instead of human-readable text
        #[arg(long)]
        json: bool,
    },
    /// Persist an analysis result for later commands
    Save {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Export the report as a PDF document
    Pdf {
        #[command(flatten)]
        input: InputArgs,
        /// Directory to save LiverProfile-Report.pdf into
        #[arg(long, value_name = "DIR")]
        out_dir: Option<PathBuf>,
        /// Branding image URL or path
        #[arg(long, value_name = "LOCATION")]
        logo: Option<String>,
    },
    /// Write the printable HTML report and send it to the print command
    Print {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Forget the persisted analysis result
    Clear,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?;
    match cli.command {
        Commands::Report(command) => run_report(&settings, command).await?,
        Commands::Chat { messages } => run_chat(&settings, messages).await?,
        Commands::Login { email, password } => run_login(&settings, &email, &password).await?,
        Commands::Logout => run_logout(&settings).await?,
        Commands::Whoami => run_whoami(&settings)?,
    }
    Ok(())
}

fn load_settings(config_path: Option<&Path>) -> Result<Settings> {
    let mut vars = HashMap::new();
    if let Some(path) = config_path {
        let file = config::Config::builder()
            .add_source(config::File::from(path))
            .build()
            .with_context(|| format!("failed to load config file {}", path.display()))?;
        let table = file
            .try_deserialize::<HashMap<String, config::Value>>()
            .with_context(|| format!("config file {} must be a table", path.display()))?;
        flatten_config("PANINSIGHT", table, &mut vars)?;
    }
    vars.extend(std::env::vars());
    Settings::from_map(vars)
}

/// `[chat] mode = "proxy"` becomes `PANINSIGHT_CHAT_MODE=proxy`.
fn flatten_config(
    prefix: &str,
    table: HashMap<String, config::Value>,
    out: &mut HashMap<String, String>,
) -> Result<()> {
    for (key, value) in table {
        let name = format!("{}_{}", prefix, key.to_uppercase().replace('-', "_"));
        match value.clone().into_table() {
            Ok(nested) => flatten_config(&name, nested, out)?,
            Err(_) => {
                let text = value
                    .into_string()
                    .with_context(|| format!("config key {name} must be a scalar"))?;
                out.insert(name, text);
            }
        }
    }
    Ok(())
}

async fn run_report(settings: &Settings, command: ReportCommand) -> Result<()> {
    match command {
        ReportCommand::Show { input, json } => {
            let result = require_result(settings, &input)?;
            if json {
                println!("{}", render_report(&result, OutputFormat::Json)?);
            } else {
                println!("{}", headline(&result));
                print!("{}", render_report(&result, OutputFormat::Human)?);
            }
        }
        ReportCommand::Save { input } => {
            if input.input.is_none() {
                bail!("--input is required to save a report");
            }
            let result = require_result(settings, &input)?;
            println!(
                "Saved {} analysis from {} to {}",
                result.scan_type,
                result.analysis_date,
                report_store(settings).path().display()
            );
        }
        ReportCommand::Pdf {
            input,
            out_dir,
            logo,
        } => {
            let result = resolve_result(settings, &input)?;
            if result.is_none() {
                redirect_hint();
            }
            let exporter =
                PdfExporter::new(out_dir.unwrap_or_else(|| settings.downloads_dir.clone()));
            let logo_source = logo
                .or_else(|| settings.logo.clone())
                .map(|location| source_for(&location, settings.timeout))
                .transpose()?;
            if let Some(path) = exporter
                .export(result.as_ref(), logo_source.as_deref())
                .await?
            {
                println!("Report saved to {}", path.display());
            }
        }
        ReportCommand::Print { input, out } => {
            let result = require_result(settings, &input)?;
            let path = out.unwrap_or_else(|| settings.downloads_dir.join(PRINT_FILE_NAME));
            let surface = FilePrintSurface::new(&path, settings.print_command.clone());
            let options = HtmlOptions {
                logo_src: settings.logo.clone(),
                ..HtmlOptions::default()
            };
            print_report(&result, &options, &surface).await?;
            println!("Printable report written to {}", path.display());
        }
        ReportCommand::Clear => {
            report_store(settings).clear()?;
            println!("Stored report cleared");
        }
    }
    Ok(())
}

fn report_store(settings: &Settings) -> FileReportStore {
    FileReportStore::new(&settings.state_dir)
}

fn resolve_result(settings: &Settings, args: &InputArgs) -> Result<Option<AnalysisResult>> {
    let navigation = match &args.input {
        Some(path) => {
            let result = read_json::<AnalysisResult>(path)?;
            Some(match &args.segmentation {
                Some(segmentation) => {
                    let response = read_json::<SegmentationResponse>(segmentation)?;
                    result.with_segmentation(response.into_outcome()?)
                }
                None => result,
            })
        }
        None => None,
    };
    let holder = ReportHolder::new(report_store(settings));
    Ok(holder.resolve(navigation)?.into_result())
}

fn require_result(settings: &Settings, args: &InputArgs) -> Result<AnalysisResult> {
    match resolve_result(settings, args)? {
        Some(result) => Ok(result),
        None => {
            redirect_hint();
            bail!("no analysis result available");
        }
    }
}

fn redirect_hint() {
    eprintln!(
        "{} Upload a scan first, then run `paninsight report save --input FILE`.",
        "No analysis result found.".yellow()
    );
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

fn headline(result: &AnalysisResult) -> String {
    let risk = paint(
        &format!("{} Risk", result.risk_level),
        result.risk_level.tone(),
    );
    let band = result.confidence_band();
    let confidence = format!("{}% confidence", result.confidence);
    let confidence = match band {
        ConfidenceBand::High => confidence.green(),
        ConfidenceBand::Moderate => confidence.yellow(),
        ConfidenceBand::Low => confidence.red(),
    };
    format!("{} | {}", risk, confidence)
}

fn paint(text: &str, tone: Tone) -> ColoredString {
    match tone {
        Tone::Info => text.blue().bold(),
        Tone::Alert => text.red().bold(),
    }
}

fn api_client(settings: &Settings, store: &FileSessionStore) -> Result<ApiClient> {
    let cookies = store.load()?.cookies;
    ApiClient::new(
        ApiEndpoints::from_base(&settings.api_base),
        settings.timeout,
        &cookies,
    )
}

async fn is_authenticated(settings: &Settings) -> Result<bool> {
    let store = FileSessionStore::new(&settings.state_dir);
    match settings.chat_auth {
        AuthMode::None => Ok(false),
        AuthMode::Local => LocalAuthGate::new(store).is_authenticated().await,
        AuthMode::Remote => {
            let client = api_client(settings, &store)?;
            RemoteAuthGate::new(store, client).is_authenticated().await
        }
    }
}

async fn run_chat(settings: &Settings, messages: Vec<String>) -> Result<()> {
    let messages = if messages.is_empty() {
        read_stdin_lines().await?
    } else {
        messages
    };

    let backend: Box<dyn ChatBackend> = match (settings.chat_mode, &settings.chat_endpoint) {
        (ChatMode::Proxy, None) => {
            let store = FileSessionStore::new(&settings.state_dir);
            Box::new(api_client(settings, &store)?.chat_backend())
        }
        _ => backend_from_settings(settings)?,
    };

    let config = ChatConfig {
        auth_required: settings.chat_auth != AuthMode::None,
        ..ChatConfig::assistant()
    };
    let mut widget = ChatWidget::new(config);
    widget.set_authenticated(is_authenticated(settings).await?);
    widget.open();
    if let Some(greeting) = widget.transcript().first() {
        println!("{} {}", "Assistant:".cyan().bold(), greeting.text);
    }

    for message in &messages {
        let text = message.trim();
        if text.is_empty() {
            continue;
        }
        println!("{} {}", "You:".bold(), text);
        if let Some(reply) = widget.submit(backend.as_ref(), text).await? {
            println!("{} {}", "Assistant:".cyan().bold(), reply.text);
        }
    }
    Ok(())
}

async fn read_stdin_lines() -> Result<Vec<String>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut out = Vec::new();
    while let Some(line) = lines
        .next_line()
        .await
        .context("failed to read stdin")?
    {
        out.push(line);
    }
    Ok(out)
}

async fn run_login(settings: &Settings, email: &str, password: &str) -> Result<()> {
    let store = FileSessionStore::new(&settings.state_dir);
    let client = api_client(settings, &store)?;
    let user = session::login(&client, &store, email, password).await?;
    println!("{} as {}", "Signed in".green(), user.display_name());
    Ok(())
}

async fn run_logout(settings: &Settings) -> Result<()> {
    let store = FileSessionStore::new(&settings.state_dir);
    let client = api_client(settings, &store)?;
    session::logout(&client, &store).await?;
    println!("Logged out successfully!");
    Ok(())
}

fn run_whoami(settings: &Settings) -> Result<()> {
    let store = FileSessionStore::new(&settings.state_dir);
    let (notice, session) = store.update(|session| (session.take_welcome_notice(), session.clone()))?;
    if let Some(notice) = notice {
        println!("{}", notice.green());
    }
    match session.user.filter(|_| session.authenticated) {
        Some(user) => println!("{} <{}>", user.display_name(), user.email),
        None => println!("Not signed in"),
    }
    Ok(())
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tokio=warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}
