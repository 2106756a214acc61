mod chat;
mod errors;
mod models;
mod ui;
mod utils;
mod workflow;

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use eyre::{Result, eyre};
use log::{debug, info, warn};

use crate::chat::client::{AnalysisClient, HttpTransport, RetryPolicy};
use crate::chat::prompt::PromptBuilder;
use crate::ui::report;
use crate::ui::terminal::{self, Entry};
use crate::utils::cli::Args;
use crate::utils::config::{Config, config};
use crate::utils::log::Logger;
use crate::workflow::controller::{WorkflowController, WorkflowSettings, WorkflowState};

const PROGRESS_TICK: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    Logger::init(args.verbosity);

    info!(
        "starting resume-match {}",
        format!("v{}", env!("CARGO_PKG_VERSION")).magenta()
    );

    let config: Config = config(args.config.clone())?;
    let mut workflow = build_workflow(&config)?;

    match (&args.resume, &args.job) {
        (Some(resume), Some(job)) => run_once(&mut workflow, resume, job, args.json).await,
        _ => run_interactive(&mut workflow, &args).await,
    }
}

fn build_workflow(config: &Config) -> Result<WorkflowController> {
    if config.llm.api_key.is_none() {
        warn!("no API key configured, set GEMINI_API_KEY or llm.api_key in the config file");
    }

    let transport = HttpTransport::new(Duration::from_secs(config.llm.timeout_secs))
        .map_err(|e| eyre!("failed to build HTTP client: {}", e))?;
    let client = AnalysisClient::new(
        transport,
        config.llm.api_key.clone(),
        config.llm.model.clone(),
        config.llm.endpoint.clone(),
        RetryPolicy::from(&config.retry),
    );

    Ok(WorkflowController::new(
        Arc::new(client),
        PromptBuilder::new(config.llm.temperature),
        WorkflowSettings {
            min_resume_chars: config.workflow.min_resume_chars,
        },
    ))
}

async fn read_text(path: &Path) -> Result<String> {
    info!("reading {}", path.display());
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| eyre!("failed to read {}: {}", path.display(), e))
}

async fn run_once(
    workflow: &mut WorkflowController,
    resume: &Path,
    job: &Path,
    json: bool,
) -> Result<()> {
    workflow.submit_resume(read_text(resume).await?)?;
    workflow.submit_job_description(read_text(job).await?)?;
    workflow.run_analysis()?;
    await_analysis(workflow).await;

    if let Some(err) = workflow.error() {
        eprintln!("{}", report::render_error(err));
        return Err(eyre!("analysis failed: {}", err));
    }

    print_result(workflow, json)
}

async fn run_interactive(workflow: &mut WorkflowController, args: &Args) -> Result<()> {
    let stdin = io::stdin();
    let mut input = stdin.lock();

    if let Some(path) = &args.resume {
        if let Err(e) = workflow.submit_resume(read_text(path).await?) {
            eprintln!("{}", report::render_error(&e));
        }
    }
    let mut prefilled_job = match &args.job {
        Some(path) => Some(read_text(path).await?),
        None => None,
    };

    loop {
        match workflow.state() {
            WorkflowState::Input => {
                terminal::step_header(
                    1,
                    "Resume",
                    &format!(
                        "Paste the plain text of your resume (at least {} characters).",
                        workflow.settings().min_resume_chars
                    ),
                );
                match terminal::read_block(&mut input)? {
                    Entry::Quit => return Ok(()),
                    Entry::Back => continue,
                    Entry::Text(text) => {
                        if let Err(e) = workflow.submit_resume(text) {
                            eprintln!("{}", report::render_error(&e));
                        }
                    }
                }
            }
            WorkflowState::Target => {
                if let Some(job) = prefilled_job.take() {
                    workflow.submit_job_description(job)?;
                } else if !reuse_job_description(workflow, &mut input)? {
                    terminal::step_header(
                        2,
                        "Job Description",
                        &format!(
                            "Paste the job description ({} returns to the resume).",
                            terminal::BACK_COMMAND
                        ),
                    );
                    match terminal::read_block(&mut input)? {
                        Entry::Quit => return Ok(()),
                        Entry::Back => {
                            workflow.go_back()?;
                            continue;
                        }
                        Entry::Text(text) => workflow.submit_job_description(text)?,
                    }
                }

                if let Err(e) = workflow.run_analysis() {
                    eprintln!("{}", report::render_error(&e));
                    continue;
                }
                await_analysis(workflow).await;

                if let Some(err) = workflow.error() {
                    eprintln!("{}", report::render_error(err));
                }
            }
            WorkflowState::Result => {
                print_result(workflow, args.json)?;
                if terminal::confirm(&mut input, "\nStart a new analysis?")? {
                    workflow.reset();
                } else {
                    return Ok(());
                }
            }
        }
    }
}

/// Offers to rerun with the job description already in the draft.
fn reuse_job_description(
    workflow: &WorkflowController,
    input: &mut impl io::BufRead,
) -> Result<bool> {
    if workflow.draft().job_description_chars() == 0 {
        return Ok(false);
    }

    let question = match workflow.error() {
        Some(err) if err.kind().is_retryable() => "Retry the analysis with the same text?",
        _ => "Use the job description you entered before?",
    };
    Ok(terminal::confirm(input, question)?)
}

async fn await_analysis(workflow: &mut WorkflowController) {
    let mut ticker = tokio::time::interval(PROGRESS_TICK);
    eprint!("{}", "analyzing".cyan());

    while workflow.poll_analysis() {
        ticker.tick().await;
        eprint!("{}", ".".cyan());
        io::stderr().flush().ok();
    }
    eprintln!();

    debug!("analysis settled in state {:?}", workflow.state());
}

fn print_result(workflow: &WorkflowController, json: bool) -> Result<()> {
    let result = workflow
        .result()
        .ok_or_else(|| eyre!("no analysis result available"))?;

    if json {
        println!("{}", report::render_json(result)?);
    } else {
        println!("{}", report::render(result));
    }
    Ok(())
}
