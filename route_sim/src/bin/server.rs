use std::io::{BufRead, BufReader};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{info, warn};

use route_protocol::{encode_frame, parse_command_line, CommandPayload};
use route_sim::{
    load_engine_config_from_env, start_frame_server, Command, Engine, EngineError, FrameServer,
    HostEvent,
};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (config, config_path) = load_engine_config_from_env();
    let server_config = config.server.clone();
    let mut engine = Engine::new(config);
    let events = engine.events();

    let frame_server = start_frame_server(server_config.frame_bind);
    let Some(command_rx) = spawn_command_listener(server_config.command_bind) else {
        return;
    };

    info!(
        target: "route_sim::server",
        command_bind = %server_config.command_bind,
        frame_bind = %server_config.frame_bind,
        frame_rate_hz = server_config.frame_rate_hz,
        config = ?config_path,
        "route_server.ready"
    );

    let period = server_config.frame_period();
    let mut last_tick = Instant::now();
    let mut published = None;
    loop {
        let deadline = last_tick + period;
        loop {
            let wait = deadline.saturating_duration_since(Instant::now());
            match command_rx.recv_timeout(wait) {
                Ok(payload) => handle_command(&mut engine, payload),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    warn!(target: "route_sim::server", "command_listener.stopped");
                    return;
                }
            }
        }

        let now = Instant::now();
        let dt = now.duration_since(last_tick).as_secs_f32();
        last_tick = now;
        engine.advance_frame(dt);

        while let Ok(event) = events.try_recv() {
            log_host_event(&event);
        }

        if published != Some(engine.revision()) {
            published = Some(engine.revision());
            publish_frame(&engine, frame_server.as_ref());
        }
    }
}

fn handle_command(engine: &mut Engine, payload: CommandPayload) {
    let line = payload.to_line();
    match engine.dispatch(Command::from(payload)) {
        Ok(outcome) => info!(
            target: "route_sim::server",
            command = %line,
            ?outcome,
            "command.applied"
        ),
        Err(EngineError::EmptyHistory) => info!(
            target: "route_sim::server",
            command = %line,
            "command.nothing_to_undo"
        ),
        Err(err) => warn!(
            target: "route_sim::server",
            command = %line,
            error = %err,
            "command.rejected"
        ),
    }
}

fn log_host_event(event: &HostEvent) {
    match event {
        HostEvent::ModeChanged { label, .. } => {
            info!(target: "route_sim::server", mode = label, "host.mode_changed")
        }
        HostEvent::RunStateChanged { running } => {
            info!(target: "route_sim::server", running, "host.run_state_changed")
        }
        HostEvent::PolicyApplied {
            generation,
            updated,
        } => info!(
            target: "route_sim::server",
            generation,
            updated,
            "host.policy_applied"
        ),
        HostEvent::PolicyFailed { generation, reason } => warn!(
            target: "route_sim::server",
            generation,
            reason = %reason,
            "host.policy_failed"
        ),
        HostEvent::Stepped { .. } => {}
    }
}

fn publish_frame(engine: &Engine, server: Option<&FrameServer>) {
    let Some(server) = server else {
        return;
    };
    match encode_frame(&engine.frame()) {
        Ok(bytes) => server.broadcast(&bytes),
        Err(err) => warn!(target: "route_sim::server", error = %err, "frame.encode_failed"),
    }
}

fn spawn_command_listener(bind_addr: SocketAddr) -> Option<Receiver<CommandPayload>> {
    let listener = match TcpListener::bind(bind_addr) {
        Ok(listener) => listener,
        Err(err) => {
            warn!(
                target: "route_sim::server",
                addr = %bind_addr,
                error = %err,
                "command_listener.bind_failed"
            );
            return None;
        }
    };
    if let Err(err) = listener.set_nonblocking(true) {
        warn!(target: "route_sim::server", error = %err, "command_listener.nonblocking_failed");
        return None;
    }

    let (sender, receiver) = unbounded::<CommandPayload>();
    thread::spawn(move || loop {
        match listener.accept() {
            Ok((stream, addr)) => {
                info!(target: "route_sim::server", %addr, "command_client.connected");
                if let Err(err) = stream.set_nonblocking(false) {
                    warn!(target: "route_sim::server", %addr, error = %err, "command_client.blocking_failed");
                }
                let sender = sender.clone();
                thread::spawn(move || handle_client(stream, sender));
            }
            Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(err) => {
                warn!(target: "route_sim::server", error = %err, "command_client.accept_failed");
                thread::sleep(Duration::from_millis(200));
            }
        }
    });

    Some(receiver)
}

fn handle_client(stream: TcpStream, sender: Sender<CommandPayload>) {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match parse_command_line(trimmed) {
                    Ok(payload) => {
                        if sender.send(payload).is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!(
                        target: "route_sim::server",
                        command = trimmed,
                        error = %err,
                        "command.invalid"
                    ),
                }
            }
            Err(err) => {
                warn!(target: "route_sim::server", error = %err, "command_client.read_failed");
                break;
            }
        }
    }
}
