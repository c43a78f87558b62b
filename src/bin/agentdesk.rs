use agentdesk::api::ApiClient;
use agentdesk::config::Config;
use agentdesk::logging::init_logging;
use agentdesk::runtime::{AgentSession, Instruction, RunEvent, RunHandle};
use agentdesk::state::conversation::{load_export, save_export, RunStatus};
use agentdesk::tools::ToolRegistry;
use agentdesk::types::Attachment;
use anyhow::{bail, Context, Result};
use crossterm::style::Stylize;
use std::future::Future;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tokio::sync::{mpsc, watch};

const USAGE: &str = "usage: agentdesk [--image PATH]... [--resume FILE] [--export FILE] [INSTRUCTION...]

Runs the instruction, then reads follow-ups from stdin. An empty line or EOF
quits; '/new <instruction>' starts over with a fresh conversation.";

#[derive(Debug, Default)]
struct CliOptions {
    images: Vec<PathBuf>,
    resume: Option<PathBuf>,
    export: Option<PathBuf>,
    words: Vec<String>,
}

impl CliOptions {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut options = Self::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => {
                    println!("{USAGE}");
                    std::process::exit(0);
                }
                "--image" => options.images.push(required_value(&mut args, "--image")?.into()),
                "--resume" => options.resume = Some(required_value(&mut args, "--resume")?.into()),
                "--export" => options.export = Some(required_value(&mut args, "--export")?.into()),
                flag if flag.starts_with("--") => bail!("unknown option '{flag}'\n\n{USAGE}"),
                _ => options.words.push(arg),
            }
        }
        Ok(options)
    }
}

fn required_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    args.next()
        .with_context(|| format!("{flag} needs a value\n\n{USAGE}"))
}

/// Lines typed on stdin, read by the one thread that owns stdin.
struct Input {
    lines: mpsc::UnboundedReceiver<String>,
}

impl Input {
    fn spawn() -> Self {
        let (tx, lines) = mpsc::unbounded_channel();
        // Not on the blocking pool: runtime shutdown waits for blocking tasks.
        thread::spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        Self { lines }
    }

    /// `None` on EOF.
    async fn prompt(&mut self, prompt: &str) -> Result<Option<String>> {
        print!("{}", prompt.bold());
        io::stdout().flush()?;
        Ok(self
            .lines
            .recv()
            .await
            .map(|line| line.trim_end_matches('\r').to_string()))
    }
}

/// Resolves on Ctrl-C; never, if the handler cannot be installed.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reply {
    Approved,
    Denied,
    Interrupted,
}

/// Anything but an explicit yes is a deny; an interrupt wins over a pending answer.
async fn confirmation_reply(
    answer: impl Future<Output = Option<String>>,
    interrupt: impl Future<Output = ()>,
) -> Reply {
    tokio::select! {
        biased;
        () = interrupt => Reply::Interrupted,
        line = answer => match line.as_deref().map(str::trim) {
            Some("y" | "Y" | "yes") => Reply::Approved,
            _ => Reply::Denied,
        },
    }
}

/// Prints events until the run reports a terminal state.
async fn render_run(mut handle: RunHandle, input: &mut Input) -> Result<()> {
    let mut stdout = io::stdout();
    loop {
        let event = tokio::select! {
            event = handle.next_event() => event,
            () = interrupted() => {
                handle.cancel();
                eprintln!("\n{}", "Stopping after the current step...".yellow());
                continue;
            }
        };
        let Some(event) = event else {
            return Ok(());
        };
        let terminal = event.is_terminal();

        match event {
            RunEvent::CallStarted(cycle) => {
                writeln!(stdout, "{}", format!("[call {cycle}]").dark_grey())?;
            }
            RunEvent::Payload(payload) => tracing::debug!(%payload, "request payload"),
            RunEvent::ToolCallStarted { name, arguments } => {
                writeln!(stdout, "\n{} {}", format!("> {name}").cyan(), arguments)?;
            }
            RunEvent::ToolInfo(text) => writeln!(stdout, "{}", text.dark_grey())?,
            RunEvent::ReasoningStarted => writeln!(stdout, "{}", "Thinking:".magenta())?,
            RunEvent::ReasoningDelta(text) => write!(stdout, "{}", text.dark_grey())?,
            RunEvent::ReasoningEnded => writeln!(stdout)?,
            RunEvent::AnswerLabel => writeln!(stdout, "{}", "Answer:".green().bold())?,
            RunEvent::AnswerDelta(text) => write!(stdout, "{text}")?,
            RunEvent::ConfirmationRequest(request) => {
                writeln!(
                    stdout,
                    "\n{} {}",
                    "Confirm command:".yellow().bold(),
                    request.command
                )?;
                let answer = async { input.prompt("Run it? [y/N] ").await.ok().flatten() };
                let reply = confirmation_reply(answer, interrupted()).await;
                if reply == Reply::Interrupted {
                    handle.cancel();
                    eprintln!("\n{}", "Denied. Stopping after the current step...".yellow());
                }
                request.respond(reply == Reply::Approved);
            }
            RunEvent::RunComplete => writeln!(stdout)?,
            RunEvent::RunCancelled => writeln!(stdout, "{}", "Cancelled.".yellow())?,
            RunEvent::RunError(text) => writeln!(stdout, "\n{} {text}", "Error:".red().bold())?,
        }
        stdout.flush()?;
        if terminal {
            return Ok(());
        }
    }
}

fn first_instruction(options: &CliOptions) -> Result<Option<Instruction>> {
    let mut instruction = Instruction::text(options.words.join(" "));
    for path in &options.images {
        instruction = instruction.with_attachment(Attachment::from_path(path)?);
    }
    Ok((!instruction.is_empty()).then_some(instruction))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let options = CliOptions::parse(std::env::args().skip(1))?;

    let config = Config::load()?;
    config.validate()?;

    let backend = Arc::new(ApiClient::new(&config));
    let registry = Arc::new(ToolRegistry::with_defaults(config.shell.clone())?);
    let (_settings_tx, settings_rx) = watch::channel(config.run_settings());
    let mut session = AgentSession::new(backend, registry, settings_rx);

    let mut fresh = true;
    if let Some(path) = &options.resume {
        session.restore(load_export(path)?)?;
        fresh = false;
    }

    let mut input = Input::spawn();
    let mut next = first_instruction(&options)?;
    loop {
        let instruction = match next.take() {
            Some(instruction) => instruction,
            None => match input.prompt("> ").await? {
                Some(line) if !line.trim().is_empty() => {
                    if let Some(rest) = line.trim().strip_prefix("/new") {
                        fresh = true;
                        if rest.trim().is_empty() {
                            continue;
                        }
                        Instruction::text(rest.trim())
                    } else {
                        Instruction::text(line)
                    }
                }
                _ => break,
            },
        };

        let handle = if fresh {
            session.start_task(instruction)?
        } else {
            session.follow_up(instruction)?
        };
        fresh = false;
        render_run(handle, &mut input).await?;

        match session.finish_run().await? {
            RunStatus::Failed(error) => tracing::warn!(%error, "run failed"),
            RunStatus::Completed | RunStatus::Cancelled => {}
        }
        if let Some(path) = &options.export {
            save_export(session.conversation(), path)?;
        }
    }

    Ok(())
}
