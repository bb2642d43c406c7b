mod config;
mod events;
mod tui;

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use ember::session::{DEFAULT_MAX_FRAME_LENGTH, DEFAULT_PORT};
use ember::{
    InvocationHandler, ServerConfig, ServerEvent, ServerHandle, TreePath, TreeServer, Value,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::UnboundedReceiver;

use tui::TuiState;

#[derive(Parser)]
#[command(name = "ember-server")]
#[command(about = "Ember+ tree provider")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, help = "JSON tree definition (built-in device tree if omitted)")]
    tree: Option<PathBuf>,

    #[arg(
        long,
        default_value_t = DEFAULT_MAX_FRAME_LENGTH,
        help = "Largest accepted frame in bytes"
    )]
    max_frame_length: usize,

    #[arg(long)]
    headless: bool,
}

/// Function handler for the built-in tree: adds its integer arguments.
struct Sum;

impl InvocationHandler for Sum {
    fn invoke(&self, _path: &TreePath, arguments: &[Value]) -> Result<Vec<Value>, String> {
        let mut total = 0i64;
        for argument in arguments {
            let value = argument
                .as_integer()
                .ok_or_else(|| format!("expected integer, got {:?}", argument))?;
            total = total.checked_add(value).ok_or("integer overflow")?;
        }
        Ok(vec![Value::Integer(total)])
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let tree = config::load_tree(args.tree.as_deref())?;
    let config = ServerConfig {
        bind: args.bind,
        port: args.port,
        max_frame_length: args.max_frame_length,
    };

    if args.headless {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    let runtime = Runtime::new()?;
    let mut server = runtime.block_on(TreeServer::bind(config, tree))?;
    let handle = server.handle();
    if args.tree.is_none() {
        handle.set_invocation_handler(Sum);
    }
    let receiver = server.take_events();
    let local_addr = server.local_addr()?;
    let task = runtime.spawn(server.run());

    if args.headless {
        if let Some(receiver) = receiver {
            runtime.spawn(log_events(receiver));
        }
        let shutdown = handle.clone();
        runtime.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("Interrupted, shutting down");
                shutdown.shutdown();
            }
        });
        runtime.block_on(task)??;
    } else {
        let Some(receiver) = receiver else {
            anyhow::bail!("Server events already taken");
        };
        let result = run_with_tui(&handle, receiver, TuiState::new(local_addr));
        handle.shutdown();
        runtime.block_on(task)??;
        result?;
    }

    Ok(())
}

async fn log_events(mut receiver: UnboundedReceiver<ServerEvent>) {
    while let Some(event) = receiver.recv().await {
        let (level, text) = events::describe(&event);
        log::log!(level, "{}", text);
    }
}

fn run_with_tui(
    handle: &ServerHandle,
    mut receiver: UnboundedReceiver<ServerEvent>,
    mut tui_state: TuiState,
) -> io::Result<()> {
    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    tui_state.log_info(format!("Serving {} elements", handle.element_count()));

    while handle.is_running() {
        while let Ok(event) = receiver.try_recv() {
            tui_state.record(&event);
        }

        if event::poll(Duration::from_millis(16))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => handle.shutdown(),
                        KeyCode::PageUp => tui_state.scroll_up(),
                        KeyCode::PageDown => tui_state.scroll_down(),
                        KeyCode::End => tui_state.scroll_to_bottom(),
                        _ => {}
                    }
                }
            }
        }

        let peers = handle.peers();
        let element_count = handle.element_count();
        terminal.draw(|frame| {
            tui::render(frame, &tui_state, &peers, element_count);
        })?;
    }

    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)?;

    Ok(())
}
