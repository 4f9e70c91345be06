use std::io::Write;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use route_protocol::{decode_frame, parse_command_line, BoardFrame, CommandPayload};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, trace, warn};

mod app;
mod ui;

use app::{channel, InspectorApp};

#[derive(Clone)]
struct ChannelWriter {
    sender: Sender<String>,
}

impl std::io::Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Ok(text) = String::from_utf8(buf.to_vec()) {
            let _ = self.sender.send(text);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Routing board client", long_about = None)]
struct Cli {
    /// Address of the host broadcasting board frames.
    #[arg(long, default_value = "127.0.0.1:42000")]
    endpoint: String,
    /// Address for sending text commands to the host.
    #[arg(long, default_value = "127.0.0.1:42001")]
    command_endpoint: String,
    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Send one command, e.g. `send random pieces 5`.
    Send {
        #[arg(required = true, trailing_var_arg = true)]
        words: Vec<String>,
    },
    /// Print every broadcast frame as text instead of opening the inspector.
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let Cli {
        endpoint,
        command_endpoint,
        mode,
    } = Cli::parse();

    match mode {
        Some(Mode::Send { words }) => {
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .init();
            let payload = parse_command_line(&words.join(" "))?;
            send_command(&command_endpoint, &payload)
                .map_err(|err| eyre!("failed to reach {command_endpoint}: {err}"))?;
            println!("sent: {}", payload.to_line());
            Ok(())
        }
        Some(Mode::Watch) => {
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .init();
            watch_plain(&endpoint).await
        }
        None => run_inspector(endpoint, command_endpoint).await,
    }
}

async fn run_inspector(endpoint: String, command_endpoint: String) -> Result<()> {
    let (log_tx, log_rx) = mpsc::channel::<String>();
    let log_writer_tx = log_tx.clone();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .compact()
        .with_writer(move || ChannelWriter {
            sender: log_writer_tx.clone(),
        })
        .init();

    info!("Connecting to host at {}", endpoint);

    let (sender, receiver) = channel();
    let (command_tx, command_rx) = mpsc::channel::<CommandPayload>();
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

    let _command_handle =
        std::thread::spawn(move || run_command_pump(command_endpoint, command_rx));

    let _ui_handle = std::thread::spawn(move || -> color_eyre::Result<()> {
        let app = InspectorApp::new(receiver, command_tx, shutdown_tx, log_rx)?;
        app.run()
    });

    loop {
        if shutdown_rx.try_recv().is_ok() {
            info!("Inspector requested shutdown");
            break;
        }
        match TcpStream::connect(&endpoint).await {
            Ok(mut stream) => {
                info!("Connected. Streaming board frames. Press q to exit.");
                if let Err(err) = pump_frames(&mut stream, &sender).await {
                    warn!("Connection error: {}", err);
                    info!("Reconnecting in 2 seconds...");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
            Err(err) => {
                warn!("Failed to connect: {}", err);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }

    Ok(())
}

async fn read_frame(stream: &mut TcpStream) -> Result<BoardFrame> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    let frame = decode_frame(&payload)?;
    trace!(turn = frame.header.turn, hash = frame.header.hash, "board.frame");
    Ok(frame)
}

async fn pump_frames(stream: &mut TcpStream, sender: &UnboundedSender<BoardFrame>) -> Result<()> {
    loop {
        let frame = read_frame(stream).await?;
        if sender.send(frame).is_err() {
            break;
        }
    }
    Ok(())
}

async fn watch_plain(endpoint: &str) -> Result<()> {
    let mut stream = TcpStream::connect(endpoint).await?;
    info!(endpoint, "watch.connected");
    loop {
        let frame = read_frame(&mut stream).await?;
        println!("{}", frame.render_ascii());
    }
}

fn run_command_pump(endpoint: String, receiver: Receiver<CommandPayload>) {
    for cmd in receiver {
        match send_command(&endpoint, &cmd) {
            Ok(_) => info!(command = %cmd.to_line(), "command.sent"),
            Err(err) => warn!(?cmd, "Failed to send command: {}", err),
        }
    }
}

fn send_command(endpoint: &str, command: &CommandPayload) -> std::io::Result<()> {
    let mut stream = std::net::TcpStream::connect(endpoint)?;
    let line = format!("{}\n", command.to_line());
    stream.write_all(line.as_bytes())?;
    Ok(())
}
