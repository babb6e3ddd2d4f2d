mod commands;
mod logging;
mod status;

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use chat_api::ChatApiClient;
use chat_client::{EngineConfig, SendController, SendEvent, TranscriptStore};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing::warn;

use crate::commands::{parse_slash_command, SlashCommand, HELP};
use crate::status::{render, Output};

type Controller = SendController<ChatApiClient>;

#[tokio::main]
async fn main() -> io::Result<()> {
    logging::init();

    let config = EngineConfig::from_env().map_err(io::Error::other)?;
    let client = ChatApiClient::new(config.api_config()).map_err(io::Error::other)?;
    let transcript = Arc::new(Mutex::new(TranscriptStore::new()));
    let (sender, receiver) = unbounded_channel();
    let controller = Arc::new(
        SendController::new(Arc::new(client), transcript, config.retry_policy())
            .with_event_sink(sender),
    );
    let printer = tokio::spawn(print_events(receiver));

    open_most_recent(&controller).await;

    let mut model = config.default_model.clone();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_slash_command(&line) {
            Some(SlashCommand::Quit) => break,
            Some(command) => run_command(&controller, command, &mut model).await,
            None if line.trim().is_empty() => {}
            None => send_line(&controller, line, model.clone()),
        }
    }

    printer.abort();
    Ok(())
}

async fn open_most_recent(controller: &Controller) {
    match controller.refresh_sessions().await {
        Ok(sessions) => match sessions.first() {
            Some(latest) => {
                let session_id = latest.session_id.clone();
                open_session(controller, &session_id).await;
            }
            None => eprintln!("no sessions yet; use /session <id> to open one"),
        },
        Err(error) => eprintln!("could not list sessions: {error}"),
    }
}

async fn open_session(controller: &Controller, session_id: &str) {
    match controller.open_session(session_id).await {
        Ok(_) => print_transcript(controller),
        Err(error) => eprintln!("could not load session {session_id}: {error}"),
    }
}

async fn run_command(controller: &Controller, command: SlashCommand, model: &mut Option<String>) {
    match command {
        SlashCommand::Help => eprintln!("{HELP}"),
        SlashCommand::Session(Some(session_id)) => open_session(controller, &session_id).await,
        SlashCommand::Session(None) => match displayed_session(controller) {
            Some(session_id) => eprintln!("open session: {session_id}"),
            None => eprintln!("no session open"),
        },
        SlashCommand::Sessions => match controller.refresh_sessions().await {
            Ok(sessions) => {
                for session in &sessions {
                    let last_active = session.last_active_at.as_deref().unwrap_or("-");
                    println!(
                        "{}  {}  {last_active}",
                        session.session_id,
                        session.display_name()
                    );
                }
            }
            Err(error) => eprintln!("could not list sessions: {error}"),
        },
        SlashCommand::Models => match controller.list_models().await {
            Ok(catalog) => {
                println!("{} (default)", catalog.default);
                for option in catalog.models.iter().filter(|option| option.id != catalog.default) {
                    let marker = if option.recommended { " *" } else { "" };
                    println!("{}{marker}", option.id);
                }
            }
            Err(error) => eprintln!("could not list models: {error}"),
        },
        SlashCommand::Model(next) => {
            *model = chat_api::sanitize_model(next.as_deref());
            match model.as_deref() {
                Some(id) => eprintln!("model override: {id}"),
                None => eprintln!("model override cleared"),
            }
        }
        SlashCommand::Reload => match controller.reload_transcript().await {
            Ok(true) => print_transcript(controller),
            Ok(false) => {}
            Err(error) => eprintln!("could not reload: {error}"),
        },
        SlashCommand::Quit => {}
        SlashCommand::Unknown(name) => eprintln!("unknown command {name}; try /help"),
    }
}

fn send_line(controller: &Arc<Controller>, line: String, model: Option<String>) {
    let Some(session_id) = displayed_session(controller) else {
        eprintln!("no session open; use /session <id>");
        return;
    };

    let controller = Arc::clone(controller);
    tokio::spawn(async move {
        if let Err(error) = controller.send(&session_id, &line, model.as_deref()).await {
            warn!(%error, "send rejected");
            eprintln!("[send rejected: {error}]");
        }
    });
}

fn displayed_session(controller: &Controller) -> Option<String> {
    let transcript = controller.transcript();
    let session_id = lock_unpoisoned(&transcript).session_id().map(ToOwned::to_owned);
    session_id
}

fn print_transcript(controller: &Controller) {
    let transcript = controller.transcript();
    let store = lock_unpoisoned(&transcript);
    let mut stdout = io::stdout().lock();
    for entry in store.entries() {
        let speaker = match entry.role {
            chat_client::Role::User => "you",
            chat_client::Role::Assistant => "bot",
        };
        let _ = writeln!(stdout, "{speaker}> {}", entry.content);
    }
    let _ = stdout.flush();
}

async fn print_events(mut events: UnboundedReceiver<SendEvent>) {
    while let Some(event) = events.recv().await {
        match render(&event) {
            Some(Output::Reply(text)) => {
                let mut stdout = io::stdout().lock();
                let _ = write!(stdout, "{text}");
                let _ = stdout.flush();
            }
            Some(Output::EndReply) => println!(),
            Some(Output::Status(line)) => eprintln!("{line}"),
            None => {}
        }
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
