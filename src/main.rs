use clap::{Parser, Subcommand};
use env_logger::Env;
use fotogal::config::{GalleryConfig, stock_config_toml};
use fotogal::pipeline;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "fotogal", version, about = "Incremental static photo gallery generator")]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "gallery.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Build the gallery (the default when no subcommand is given).
    Build,
    /// Report what a build would rebuild, without writing anything.
    Check,
    /// Print a documented stock configuration file to stdout.
    GenConfig,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), pipeline::BuildError> {
    match cli.command.as_ref().unwrap_or(&Command::Build) {
        Command::Build => {
            let config = GalleryConfig::load(&cli.config)?;
            pipeline::build(&config)?;
            Ok(())
        }
        Command::Check => {
            let config = GalleryConfig::load(&cli.config)?;
            let plan = pipeline::plan(&config)?;
            if plan.is_noop() {
                println!("up to date");
                return Ok(());
            }
            for image in &plan.stale_images {
                println!("image: {}", image.display());
            }
            for page in &plan.stale_pages {
                println!("page:  {}", page.display());
            }
            println!(
                "{} images and {} pages would be rebuilt",
                plan.stale_images.len(),
                plan.stale_pages.len()
            );
            Ok(())
        }
        Command::GenConfig => {
            print!("{}", stock_config_toml());
            Ok(())
        }
    }
}
