use anyhow::Result;
use console::style;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use strata_core::{Augmentation, Error, Orchestrator, QueryResponse, Role};
use termimad::MadSkin;
use tokio_util::sync::CancellationToken;

const HELP: &str = "\
  help      show this message
  clear     forget the conversation (keeps the system prompt)
  history   print the conversation so far
  clients   list registered tool providers
  exit      leave (also: quit, Ctrl+D)";

enum Command {
    Help,
    Clear,
    History,
    Clients,
    Exit,
    Query,
}

fn parse_command(input: &str) -> Command {
    match input.to_lowercase().as_str() {
        "help" => Command::Help,
        "clear" => Command::Clear,
        "history" => Command::History,
        "clients" => Command::Clients,
        "exit" | "quit" => Command::Exit,
        _ => Command::Query,
    }
}

/// Runs one query with Ctrl-C wired to its cancellation token.
async fn query(orchestrator: &mut Orchestrator, input: &str) -> strata_core::Result<QueryResponse> {
    let cancel = CancellationToken::new();
    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let outcome = orchestrator.query_with_cancel(input, &cancel).await;
    watcher.abort();
    outcome
}

fn print_response(skin: &MadSkin, response: &QueryResponse) {
    if let Augmentation::Applied(n) = response.augmentation {
        println!("{}", style(format!("(used {n} knowledge chunk(s))")).dim());
    }
    skin.print_text(&response.content);
}

fn print_error(error: &Error) {
    match error {
        Error::Cancelled => println!("{}", style("Cancelled").yellow()),
        other => eprintln!("{} {}", style("✗").red().bold(), other),
    }
}

pub async fn ask_once(orchestrator: &mut Orchestrator, message: &str) -> Result<()> {
    let skin = MadSkin::default();
    match query(orchestrator, message).await {
        Ok(response) => {
            print_response(&skin, &response);
            Ok(())
        }
        Err(e) => {
            print_error(&e);
            Err(e.into())
        }
    }
}

pub async fn run(orchestrator: &mut Orchestrator) -> Result<()> {
    let skin = MadSkin::default();
    let history_path = strata_core::config::ensure_strata_dir()?.join("history.txt");
    let mut editor = DefaultEditor::new()?;
    let _ = editor.load_history(&history_path);

    println!("{}", style(format!("{} is ready", orchestrator.name())).cyan().bold());
    println!("{}\n", style("Type 'help' for commands, Ctrl+D to exit").dim());

    loop {
        let line = match editor.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(input);

        match parse_command(input) {
            Command::Help => println!("{HELP}"),
            Command::Clear => {
                orchestrator.clear_history();
                println!("{}", style("History cleared").dim());
            }
            Command::History => print_history(orchestrator),
            Command::Clients => {
                for name in orchestrator.provider_names() {
                    println!("  {} {}", style("•").green(), name);
                }
            }
            Command::Exit => break,
            Command::Query => match query(orchestrator, input).await {
                Ok(response) => print_response(&skin, &response),
                Err(e) => print_error(&e),
            },
        }
        println!();
    }

    let _ = editor.save_history(&history_path);
    println!("Goodbye!");
    Ok(())
}

fn print_history(orchestrator: &Orchestrator) {
    for message in orchestrator.history() {
        let role = match message.role {
            Role::System => style("system").dim(),
            Role::User => style("user").cyan(),
            Role::Assistant => style("assistant").green(),
            Role::Tool => style("tool").yellow(),
        };
        let mut text = preview(&message.content);
        if let Some(calls) = &message.tool_calls {
            let names: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
            text = format!("{text} [calls: {}]", names.join(", "));
        }
        println!("  {role}: {text}");
    }
}

fn preview(content: &str) -> String {
    const MAX: usize = 120;
    let single_line = content.replace('\n', " ");
    if single_line.chars().count() > MAX {
        format!("{}…", single_line.chars().take(MAX).collect::<String>())
    } else {
        single_line
    }
}
