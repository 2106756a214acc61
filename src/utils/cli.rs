use std::path::PathBuf;

use clap::Parser;
use log::LevelFilter;

#[derive(Parser, Debug)]
#[command(name = "resume-match")]
#[command(
    about = "Compare a resume against a job description using an AI hiring analysis",
    long_about = None
)]
pub struct Args {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to a plain-text resume (skips the interactive resume step)
    #[arg(short, long, value_name = "FILE")]
    pub resume: Option<PathBuf>,

    /// Path to a plain-text job description (skips the interactive job step)
    #[arg(short, long, value_name = "FILE")]
    pub job: Option<PathBuf>,

    /// Print the analysis as JSON instead of the formatted report
    #[arg(long)]
    pub json: bool,

    /// Sets the logger's verbosity level
    #[arg(short, long, value_name = "VERBOSITY", default_value_t = LevelFilter::Info)]
    pub verbosity: LevelFilter,
}
