use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver};
use route_protocol::{Direction, PolicyRequest, PolicyResponse, BOARD_CELLS};
use route_sim::{
    Command, EditIntent, Engine, EngineConfig, EngineError, HostEvent, HttpPolicyTransport,
    PolicyBridge, PolicyError, PolicyTransport, MAX_RESPONSE_BYTES,
};

const WAIT: Duration = Duration::from_secs(5);

fn config() -> EngineConfig {
    let mut config = EngineConfig {
        random_seed: Some(11),
        ..EngineConfig::default()
    };
    config.policy.enabled = true;
    config
}

fn all_actions(action: i64) -> PolicyResponse {
    PolicyResponse {
        new_directions: vec![action; BOARD_CELLS],
    }
}

/// Transport that answers every request with the same reply.
fn fixed(response: PolicyResponse) -> impl PolicyTransport {
    move |_: &PolicyRequest| Ok::<_, PolicyError>(response.clone())
}

/// Transport that blocks until the test releases it, recording requests.
fn gated() -> (
    impl PolicyTransport,
    crossbeam_channel::Sender<PolicyResponse>,
    Arc<Mutex<Vec<PolicyRequest>>>,
) {
    let (release_tx, release_rx): (_, Receiver<PolicyResponse>) = unbounded();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&seen);
    let transport = move |request: &PolicyRequest| {
        recorded.lock().unwrap().push(request.clone());
        release_rx.recv().map_err(|_| PolicyError::Disconnected)
    };
    (transport, release_tx, seen)
}

fn place(engine: &mut Engine, x: i32, y: i32) {
    engine
        .dispatch(Command::Edit {
            x,
            y,
            intent: EditIntent::Cycle,
        })
        .unwrap();
}

#[test]
fn policy_reply_routes_only_occupied_cells() {
    let mut actions = vec![0i64; BOARD_CELLS];
    actions[0] = 2;
    actions[1] = 3;
    let mut engine = Engine::with_policy(
        config(),
        fixed(PolicyResponse {
            new_directions: actions,
        }),
    );
    place(&mut engine, 0, 0);

    engine.request_policy().unwrap();
    assert!(engine.wait_for_policy(WAIT));

    assert_eq!(engine.board().direction_at(0), Direction::Down);
    assert_eq!(engine.board().direction_at(1), Direction::None);
    assert_eq!(engine.board().piece_count(), 1);

    engine.dispatch(Command::Undo(1)).unwrap();
    assert_eq!(engine.board().direction_at(0), Direction::None);
}

#[test]
fn malformed_reply_leaves_board_and_notifies_host() {
    let mut engine = Engine::with_policy(
        config(),
        fixed(PolicyResponse {
            new_directions: vec![1; 99],
        }),
    );
    let events = engine.events();
    place(&mut engine, 3, 3);
    let before = *engine.board();

    engine.request_policy().unwrap();
    assert!(engine.wait_for_policy(WAIT));
    assert_eq!(*engine.board(), before);

    let failure = events
        .try_iter()
        .find(|event| matches!(event, HostEvent::PolicyFailed { .. }));
    assert!(failure.is_some());
    assert_eq!(engine.metrics().policy_failed, 1);
}

#[test]
fn out_of_range_action_rejects_whole_reply() {
    let mut actions = vec![1i64; BOARD_CELLS];
    actions[50] = 4;
    let mut engine = Engine::with_policy(
        config(),
        fixed(PolicyResponse {
            new_directions: actions,
        }),
    );
    place(&mut engine, 0, 0);
    engine.request_policy().unwrap();
    engine.wait_for_policy(WAIT);
    assert_eq!(engine.board().direction_at(0), Direction::None);
}

#[test]
fn disabled_policy_is_unavailable() {
    let mut engine = Engine::new(EngineConfig::default());
    assert!(matches!(
        engine.dispatch(Command::RequestPolicy),
        Err(EngineError::PolicyUnavailable(PolicyError::Disabled))
    ));
}

#[test]
fn newer_request_supersedes_outstanding_one() {
    let (transport, release, seen) = gated();
    let mut bridge = PolicyBridge::spawn(transport);
    let request = PolicyRequest::from_buffers(&[0; BOARD_CELLS], &[0; BOARD_CELLS]);

    let first = bridge.request(request.clone()).unwrap();
    // Let the worker pick up the first job before queueing more.
    while seen.lock().unwrap().is_empty() {
        thread::sleep(Duration::from_millis(1));
    }
    bridge.request(request.clone()).unwrap();
    let latest = bridge.request(request).unwrap();
    assert!(latest > first);

    release.send(all_actions(0)).unwrap();
    release.send(all_actions(1)).unwrap();

    let outcome = bridge.wait(WAIT).expect("latest answer");
    assert_eq!(outcome.generation, latest);
    assert_eq!(outcome.result.unwrap()[0], Direction::Right);
    // The middle request was coalesced away.
    assert_eq!(seen.lock().unwrap().len(), 2);
    assert!(bridge.poll().is_none());
}

#[test]
fn cancelled_answer_is_never_applied() {
    let (transport, release, seen) = gated();
    let mut bridge = PolicyBridge::spawn(transport);
    let request = PolicyRequest::from_buffers(&[0; BOARD_CELLS], &[0; BOARD_CELLS]);
    bridge.request(request).unwrap();
    while seen.lock().unwrap().is_empty() {
        thread::sleep(Duration::from_millis(1));
    }
    bridge.cancel();
    release.send(all_actions(0)).unwrap();
    assert!(bridge.wait(Duration::from_millis(200)).is_none());
    assert!(!bridge.is_pending());
}

#[test]
fn reply_is_applied_at_frame_boundary() {
    let (transport, release, _seen) = gated();
    let mut engine = Engine::with_policy(config(), transport);
    place(&mut engine, 5, 5);
    engine.request_policy().unwrap();
    assert!(engine.policy_pending());

    engine.advance_frame(0.016);
    assert_eq!(engine.board().direction_at(55), Direction::None);

    release.send(all_actions(3)).unwrap();
    for _ in 0..500 {
        engine.advance_frame(0.01);
        if !engine.policy_pending() {
            break;
        }
        thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(engine.board().direction_at(55), Direction::Left);
}

fn serve_once(status: &'static str, body: String) -> (String, thread::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut head = String::new();
        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            if line == "\r\n" {
                break;
            }
            if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                content_length = value.trim().parse().unwrap();
            }
            head.push_str(&line);
        }
        let mut request_body = vec![0u8; content_length];
        reader.read_exact(&mut request_body).unwrap();
        let reply = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(reply.as_bytes()).unwrap();
        head + &String::from_utf8(request_body).unwrap()
    });
    (addr, handle)
}

#[test]
fn http_transport_round_trip() {
    let body = serde_json::to_string(&all_actions(2)).unwrap();
    let (addr, server) = serve_once("200 OK", body);
    let mut transport = HttpPolicyTransport::new(addr, "/get_action", WAIT);

    let mut occupancy = [0u8; BOARD_CELLS];
    occupancy[7] = 1;
    let request = PolicyRequest::from_buffers(&occupancy, &[0; BOARD_CELLS]);
    let response = transport.fetch(&request).unwrap();
    assert_eq!(response.new_directions, vec![2; BOARD_CELLS]);

    let seen = server.join().unwrap();
    assert!(seen.starts_with("POST /get_action HTTP/1.1\r\n"));
    let json_start = seen.find('{').unwrap();
    let posted: PolicyRequest = serde_json::from_str(&seen[json_start..]).unwrap();
    assert_eq!(posted, request);
}

#[test]
fn http_error_status_is_reported() {
    let (addr, server) = serve_once("500 Internal Server Error", "{}".to_string());
    let mut transport = HttpPolicyTransport::new(addr, "/get_action", WAIT);
    let request = PolicyRequest::from_buffers(&[0; BOARD_CELLS], &[0; BOARD_CELLS]);
    assert!(matches!(
        transport.fetch(&request),
        Err(PolicyError::Http { status: 500 })
    ));
    server.join().unwrap();
}

#[test]
fn unreachable_service_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);
    let mut transport = HttpPolicyTransport::new(addr, "/get_action", Duration::from_millis(500));
    let request = PolicyRequest::from_buffers(&[0; BOARD_CELLS], &[0; BOARD_CELLS]);
    assert!(matches!(
        transport.fetch(&request),
        Err(PolicyError::Transport(_))
    ));
}

/// Accepts one connection, sends a success head with no length, then feeds
/// `chunk` every `pause` until the client hangs up.
fn serve_stream(chunk: &'static [u8], pause: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut line = String::new();
        while reader.read_line(&mut line).map(|n| n > 0).unwrap_or(false) && line != "\r\n" {
            line.clear();
        }
        let head = "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nConnection: close\r\n\r\n[";
        if stream.write_all(head.as_bytes()).is_err() {
            return;
        }
        while stream.write_all(chunk).is_ok() {
            if !pause.is_zero() {
                thread::sleep(pause);
            }
        }
    });
    addr
}

#[test]
fn endless_body_is_cut_off() {
    let addr = serve_stream(b"0,0,0,0,0,0,0,0,", Duration::ZERO);
    let mut transport = HttpPolicyTransport::new(addr, "/get_action", WAIT);
    let request = PolicyRequest::from_buffers(&[0; BOARD_CELLS], &[0; BOARD_CELLS]);

    let started = Instant::now();
    let result = transport.fetch(&request);
    assert!(started.elapsed() < WAIT);
    match result {
        Err(PolicyError::Malformed { reason }) => {
            assert!(reason.contains(&MAX_RESPONSE_BYTES.to_string()));
        }
        other => panic!("expected oversized body error, got {other:?}"),
    }
}

#[test]
fn dripping_body_hits_the_deadline() {
    let addr = serve_stream(b"0,", Duration::from_millis(20));
    let timeout = Duration::from_millis(300);
    let mut transport = HttpPolicyTransport::new(addr, "/get_action", timeout);
    let request = PolicyRequest::from_buffers(&[0; BOARD_CELLS], &[0; BOARD_CELLS]);

    let started = Instant::now();
    let result = transport.fetch(&request);
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(matches!(result, Err(PolicyError::Transport(_))));
}
