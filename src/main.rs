//! talent-card – command-line front end for profile acquisition and
//! talent-card rendering.
//!
//! Usage:
//!   talent-card profile <employee-id> [--tenant gms]
//!   talent-card photo <employee-id> [--tenant gms] [--out photo.jpg]
//!   talent-card card <employee-id> [--tenant gms] [--format html|pdf|direct] [--out card.pdf]
//!   talent-card render <input.html> [output.pdf]
//!   talent-card engines
//!
//! Settings come from the environment (see `talent_card::settings`); log
//! verbosity from `RUST_LOG` (default `info`).

use std::{fs, path::Path, path::PathBuf, process};

use clap::{Args, Parser, Subcommand};

use talent_card::engines::EngineKind;
use talent_card::pdf::decode_base64;
use talent_card::pipeline::Availability;
use talent_card::{CardFormat, EnvVars, RenderArtifact, Result, Settings, TalentCardService};

#[derive(Parser, Debug)]
#[command(
    name = "talent-card",
    about = "Fetch Workday profiles and render talent cards",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print an employee's profile report as JSON
    Profile(EmployeeArgs),
    /// Save an employee's photo
    Photo {
        #[command(flatten)]
        employee: EmployeeArgs,
        /// Output file (default: photo-<id>.<ext>)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Build a talent card for an employee
    Card {
        #[command(flatten)]
        employee: EmployeeArgs,
        /// html, pdf (template through the engine chain) or direct (record layout)
        #[arg(long, default_value_t = CardFormat::Pdf)]
        format: CardFormat,
        /// Output file (default: talent-card-<id>.<html|pdf>)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Convert an HTML file to PDF through the engine chain
    Render {
        /// HTML file to convert
        input: PathBuf,
        /// Output path (default: same stem as input with .pdf)
        output: Option<PathBuf>,
    },
    /// List the configured engines and whether each is available
    Engines,
}

#[derive(Args, Debug)]
struct EmployeeArgs {
    /// Workday employee id
    employee_id: String,
    /// Tenant (csc or gms; default: WORKDAY_TENANT, else gms)
    #[arg(long)]
    tenant: Option<String>,
}

impl Command {
    fn renders_markup(&self) -> bool {
        matches!(
            self,
            Command::Render { .. }
                | Command::Engines
                | Command::Card {
                    format: CardFormat::Pdf,
                    ..
                }
        )
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli.command) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(command: Command) -> Result<()> {
    let settings = Settings::from_env(&EnvVars::capture())?;
    // Engines are probed only for commands that need the markup pipeline.
    let engines: &[EngineKind] = if command.renders_markup() {
        settings.engines.as_slice()
    } else {
        &[]
    };
    let service = TalentCardService::from_settings(&settings, engines);

    match command {
        Command::Profile(args) => {
            let record = service.get_profile(&args.employee_id, args.tenant.as_deref())?;
            let json = serde_json::to_string_pretty(&record)
                .map_err(|e| talent_card::Error::InvalidProfileResponse(e.to_string()))?;
            println!("{json}");
        }
        Command::Photo { employee, out } => {
            let photo = service.get_photo(&employee.employee_id, employee.tenant.as_deref())?;
            let Some(photo) = photo else {
                eprintln!("No photo stored for employee {}", employee.employee_id);
                return Ok(());
            };
            let bytes = decode_base64(photo.as_base64())
                .map_err(talent_card::Error::MalformedResponse)?;
            let output = out.unwrap_or_else(|| {
                let ext = ::image::guess_format(&bytes)
                    .ok()
                    .and_then(|f| f.extensions_str().first().copied())
                    .unwrap_or("bin");
                PathBuf::from(format!("photo-{}.{ext}", employee.employee_id))
            });
            write_output(&output, &bytes)?;
        }
        Command::Card {
            employee,
            format,
            out,
        } => {
            let artifact =
                service.talent_card(&employee.employee_id, employee.tenant.as_deref(), format)?;
            let output = out.unwrap_or_else(|| {
                let ext = match artifact {
                    RenderArtifact::Markup(_) => "html",
                    RenderArtifact::Pdf(_) => "pdf",
                };
                PathBuf::from(format!("talent-card-{}.{ext}", employee.employee_id))
            });
            write_output(&output, artifact.as_bytes())?;
        }
        Command::Render { input, output } => {
            let html = fs::read_to_string(&input)?;
            // Default output: same directory + same stem as input, but with .pdf
            let output = output.unwrap_or_else(|| input.with_extension("pdf"));
            let (result, trace) = service.pipeline().render_markup_traced(&html);
            for failure in &trace.failures {
                eprintln!("  skipped {failure}");
            }
            write_output(&output, &result?)?;
        }
        Command::Engines => {
            for (name, availability) in service.pipeline().engines() {
                match availability {
                    Availability::Available => println!("{name:<12} available"),
                    Availability::Unavailable(reason) => {
                        println!("{name:<12} unavailable ({reason})")
                    }
                }
            }
        }
    }
    Ok(())
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    // Create output directory if necessary.
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, bytes)?;
    eprintln!("Wrote '{}' ({} bytes)", path.display(), bytes.len());
    Ok(())
}
