//! Headless chatsync client
//!
//! Builds a [`chatsync_app::Runtime`] from command-line arguments, feeds it
//! stdin lines as commands and messages, and logs every timeline change
//! through `tracing`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod args;
pub mod input;
pub mod report;

use std::sync::Arc;

pub use args::{Args, OnSendFailure};
use chatsync_app::{Backend, ClientConfig, ConfigError, Notice, Runtime, RuntimeError, RuntimeHandle};
use chatsync_client::{
    DemoBackend, DemoStore, Environment, HistoryFetcher, SystemEnv, Transport, http::HttpHistory,
    transport::ws::WsTransport,
};
pub use input::Input;
pub use report::{Change, changes};
use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};

/// Errors that end the client.
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid arguments
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Runtime refused to start
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// Reading stdin or installing the signal handler failed
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    /// Runtime task panicked
    #[error("runtime task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Run until `/quit`, Ctrl-C, or the runtime stops.
pub async fn run(args: Args) -> Result<(), CliError> {
    let config = args.to_config();
    config.validate()?;

    let env = SystemEnv::new();
    let (history, transport) = backends(env, &config)?;
    let (runtime, handle) = Runtime::from_config(env, &config, history, transport)?;
    let task = tokio::spawn(runtime.run());

    if let Some(room) = args.room {
        tokio::spawn(open_room(handle.clone(), room));
    }

    let outcome = tokio::select! {
        () = report(&handle) => Ok(()),
        result = read_input(&handle) => result,
        result = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
            result.map_err(CliError::from)
        },
    };

    // Already stopped is fine
    let _ = handle.quit();
    task.await?;
    outcome
}

fn backends(
    env: SystemEnv,
    config: &ClientConfig,
) -> Result<(Arc<dyn HistoryFetcher>, Arc<dyn Transport>), CliError> {
    match config.backend {
        Backend::Demo => {
            tracing::info!("using in-memory demo backend");
            let demo = DemoBackend::new(env, DemoStore::seeded(env.wall_clock_millis()));
            Ok((Arc::new(demo.clone()), Arc::new(demo)))
        },
        Backend::Http => {
            let history = HttpHistory::new(config.api_url()?)
                .with_token(config.token().map(str::to_owned))
                .with_limit(config.history_limit);
            Ok((Arc::new(history), Arc::new(WsTransport::new())))
        },
    }
}

async fn open_room(handle: RuntimeHandle, room: String) {
    let mut view = handle.view();
    let loaded = view.wait_for(|v| !v.rooms.is_empty()).await.is_ok();
    if !loaded {
        return;
    }
    if let Err(e) = handle.select_room(room.as_str()).await {
        tracing::warn!("cannot open #{room}: {e}");
    }
}

/// Log view changes and notices until the runtime stops.
async fn report(handle: &RuntimeHandle) {
    let mut view = handle.view();
    let mut notices = handle.notices();
    let mut last = view.borrow_and_update().clone();

    loop {
        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    return;
                }
                let next = view.borrow_and_update().clone();
                for change in changes(&last, &next) {
                    match change {
                        Change::Failed(_) => tracing::warn!("{change}"),
                        _ => tracing::info!("{change}"),
                    }
                }
                last = next;
            },
            notice = notices.recv() => match notice {
                Ok(Notice::SendFailed { room_id, draft, error }) => {
                    tracing::warn!("not sent to #{room_id}: {error}; draft {draft:?}");
                },
                Err(RecvError::Lagged(missed)) => tracing::warn!("missed {missed} notices"),
                Err(RecvError::Closed) => return,
            },
        }
    }
}

async fn read_input(handle: &RuntimeHandle) -> Result<(), CliError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let Some(input) = Input::parse(&line) else {
            continue;
        };
        tracing::debug!("input: {input}");

        let result = match input {
            Input::Send(text) => handle.send_message(text).await.map(|_| ()),
            Input::Join(room) => handle.select_room(room).await,
            Input::Reload => handle.reload().await,
            Input::Reconnect => handle.reconnect(),
            Input::Disconnect => handle.disconnect(),
            Input::Help => {
                tracing::info!("{}", input::HELP);
                Ok(())
            },
            Input::Quit => return Ok(()),
            Input::Invalid(line) => {
                tracing::warn!("unrecognized input {line:?}; {}", input::HELP);
                Ok(())
            },
        };

        match result {
            Ok(()) => {},
            Err(RuntimeError::Stopped) => return Ok(()),
            Err(e) => tracing::warn!("{e}"),
        }
    }

    tracing::info!("stdin closed, running until interrupted");
    std::future::pending().await
}
