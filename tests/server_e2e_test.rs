use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use netris::net::protocol::{
    Command, JoinGamePayload, ListGamesPayload, ReceiveGarbagePayload, StatsPayload,
};
use netris::net::{
    connect, run_server, serve_until, ClientSession, ConnectionConfig, DialConfig, Endpoint,
    Listener, Ready, Server, ServerConfig, SHUTDOWN_REASON,
};
use netris::types::{Block, GameAction, Point};

const STEP: Duration = Duration::from_secs(2);

async fn start_server(config: ServerConfig) -> (Option<SocketAddr>, Arc<Server>, JoinHandle<()>) {
    let (ready_tx, ready_rx) = oneshot::channel::<Ready>();
    let handle = tokio::spawn(async move {
        let _ = run_server(config, Some(ready_tx)).await;
    });
    let ready = tokio::time::timeout(STEP, ready_rx)
        .await
        .expect("server did not signal ready")
        .expect("ready channel dropped");
    (ready.tcp, ready.server, handle)
}

fn local_config(seed: u64, rank: i32) -> ServerConfig {
    ServerConfig {
        listen_tcp: Some("127.0.0.1:0".to_string()),
        listen_socket: None,
        seed: Some(seed),
        rank,
        ..ServerConfig::default()
    }
}

async fn join_endpoint(endpoint: Endpoint, name: &str) -> ClientSession {
    let (connection, inbound) = connect(&endpoint, &DialConfig::default(), ConnectionConfig::default())
        .await
        .expect("connect failed");
    let request = JoinGamePayload {
        name: name.to_string(),
        ..JoinGamePayload::default()
    };
    tokio::time::timeout(STEP, ClientSession::join(connection, inbound, request, STEP))
        .await
        .expect("join timed out")
        .expect("join failed")
}

async fn join(addr: SocketAddr, name: &str) -> ClientSession {
    join_endpoint(Endpoint::Tcp(addr.to_string()), name).await
}

/// Pump `session` until `done` holds for its state
async fn wait_until<F>(session: &mut ClientSession, mut done: F)
where
    F: FnMut(&ClientSession) -> bool,
{
    tokio::time::timeout(STEP, async {
        while !done(&*session) {
            session.next().await.expect("connection closed while waiting");
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Pump `session` until a command matching `want` arrives
async fn wait_for<F>(session: &mut ClientSession, mut want: F) -> Command
where
    F: FnMut(&Command) -> bool,
{
    tokio::time::timeout(STEP, async {
        loop {
            let command = session.next().await.expect("connection closed while waiting");
            if want(&command) {
                return command;
            }
        }
    })
    .await
    .expect("command not received in time")
}

/// Cells the active piece would occupy after a hard drop
fn landing_cells(session: &ClientSession) -> Vec<Point> {
    let m = session.matrix().read();
    let landing = m.ghost_position().expect("no landing position");
    let piece = m.piece().expect("no active piece");
    piece.cells().iter().map(|&c| c + landing).collect()
}

/// Fill `rows` completely except the cells in `keep_clear`
fn fill_rows_around(session: &ClientSession, rows: &[i32], keep_clear: &[Point]) {
    let mut m = session.matrix().write();
    let width = m.width();
    for &y in rows {
        for x in 0..width {
            if !keep_clear.contains(&Point::new(x, y)) {
                assert!(m.set_block(x, y, Block::Garbage));
            }
        }
    }
}

#[tokio::test]
async fn same_seed_players_share_pieces_and_see_each_others_clears() {
    let (addr, server, handle) = start_server(local_config(42, 4)).await;
    let addr = addr.expect("tcp listener");

    let mut a = join(addr, "alice").await;
    let mut b = join(addr, "bob").await;
    assert_eq!(a.game(), b.game());
    assert_ne!(a.player(), b.player());
    assert_eq!(a.start_parameters().seed, 42);
    assert_eq!(b.start_parameters().seed, 42);
    assert!(!a.start_parameters().started);
    assert!(b.start_parameters().started);

    assert!(a.controls().start().await.unwrap());
    assert!(b.controls().start().await.unwrap());
    assert_eq!(
        a.matrix().read().piece_cells(),
        b.matrix().read().piece_cells()
    );

    // Complete the bottom row around the piece's lowest cells.
    let landing = landing_cells(&a);
    let floor = landing.iter().map(|p| p.y).min().unwrap();
    assert_eq!(floor, 0);
    let bottom: Vec<Point> = landing.into_iter().filter(|p| p.y == 0).collect();
    fill_rows_around(&a, &[0], &bottom);

    assert!(a.controls().apply(GameAction::HardDrop).await.unwrap());
    assert_eq!(a.matrix().read().score(), 100);

    let alice = a.player();
    wait_until(&mut b, |s| s.remote(alice).is_some_and(|m| m.score == 100)).await;
    let m = b.matrix().read();
    assert_eq!(m.score(), 0);
    assert_eq!(m.occupied(), 0);
    drop(m);

    // Roster on A's side lists both players.
    wait_until(&mut a, |s| s.roster().len() == 2).await;

    server.shutdown("test over").await;
    handle.abort();
}

#[tokio::test]
async fn double_clear_sends_garbage_to_the_opponent() {
    let (addr, server, handle) = start_server(local_config(9, 2)).await;
    let addr = addr.expect("tcp listener");

    let mut a = join(addr, "alice").await;
    let mut b = join(addr, "bob").await;
    assert!(a.controls().start().await.unwrap());
    assert!(b.controls().start().await.unwrap());

    // Stand the domino upright so both its cells share one column.
    assert!(a.controls().apply(GameAction::RotateCw).await.unwrap());
    let landing = landing_cells(&a);
    assert_eq!(landing.len(), 2);
    assert_eq!(landing[0].x, landing[1].x);
    fill_rows_around(&a, &[0, 1], &landing);

    assert!(a.controls().apply(GameAction::HardDrop).await.unwrap());
    {
        let m = a.matrix().read();
        assert_eq!(m.score(), 300);
        assert_eq!(m.lines(), 2);
        assert_eq!(m.garbage_sent(), 1);
    }

    let alice = a.player();
    let command = wait_for(&mut b, |c| matches!(c, Command::ReceiveGarbage(_))).await;
    assert_eq!(
        command,
        Command::ReceiveGarbage(ReceiveGarbagePayload {
            player: alice,
            rows: 1
        })
    );
    assert_eq!(b.matrix().read().pending_garbage(), 1);

    server.shutdown("test over").await;
    handle.abort();
}

#[tokio::test]
async fn ping_is_answered_with_one_pong_echoing_the_token() {
    let (addr, server, handle) = start_server(local_config(1, 4)).await;
    let addr = addr.expect("tcp listener");

    let stream = TcpStream::connect(addr).await.expect("connect failed");
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    write_half
        .write_all(b"{\"cmd\":2,\"Data\":{\"t\":\"abc\"}}\n")
        .await
        .unwrap();
    write_half.flush().await.unwrap();

    let pong = tokio::time::timeout(STEP, lines.next_line())
        .await
        .expect("no pong")
        .unwrap()
        .expect("stream closed");
    assert_eq!(pong, r#"{"cmd":3,"Data":{"t":"abc"}}"#);

    let extra = tokio::time::timeout(Duration::from_millis(300), lines.next_line()).await;
    assert!(extra.is_err(), "unexpected extra line: {:?}", extra);

    // Unknown kinds are skipped and the connection keeps answering.
    write_half
        .write_all(b"{\"cmd\":77,\"Data\":{}}\n{\"cmd\":2,\"Data\":{\"t\":\"again\"}}\n")
        .await
        .unwrap();
    let pong = tokio::time::timeout(STEP, lines.next_line())
        .await
        .expect("no second pong")
        .unwrap()
        .expect("stream closed");
    assert_eq!(pong, r#"{"cmd":3,"Data":{"t":"again"}}"#);

    server.shutdown("test over").await;
    handle.abort();
}

#[tokio::test]
async fn lobby_answers_stats_and_game_list_before_joining() {
    let (addr, server, handle) = start_server(local_config(3, 4)).await;
    let addr = addr.expect("tcp listener");

    let player = join(addr, "alice").await;

    let (lobby, mut inbound) = connect(
        &Endpoint::Tcp(addr.to_string()),
        &DialConfig::default(),
        ConnectionConfig::default(),
    )
    .await
    .unwrap();

    lobby
        .send(Command::Stats(StatsPayload::default()))
        .await
        .unwrap();
    let reply = tokio::time::timeout(STEP, inbound.recv())
        .await
        .unwrap()
        .expect("lobby closed");
    assert_eq!(
        reply.command,
        Command::Stats(StatsPayload {
            players: 1,
            games: 1
        })
    );

    lobby
        .send(Command::ListGames(ListGamesPayload::default()))
        .await
        .unwrap();
    let reply = tokio::time::timeout(STEP, inbound.recv())
        .await
        .unwrap()
        .expect("lobby closed");
    let Command::ListGames(list) = reply.command else {
        panic!("expected a game list");
    };
    assert_eq!(list.games.len(), 1);
    assert_eq!(list.games[0].id, player.game());
    assert_eq!(list.games[0].name, format!("Game {}", player.game()));
    assert_eq!(list.games[0].players, 1);

    lobby.close().await;
    server.shutdown("test over").await;
    handle.abort();
}

#[tokio::test]
async fn chat_is_relayed_with_the_sender_id() {
    let (addr, server, handle) = start_server(local_config(5, 4)).await;
    let addr = addr.expect("tcp listener");

    let a = join(addr, "alice").await;
    let mut b = join(addr, "bob").await;

    a.controls().chat("  good luck ").await.unwrap();
    let alice = a.player();
    wait_until(&mut b, |s| !s.chat_log().is_empty()).await;
    assert_eq!(b.chat_log()[0].player, alice);
    assert_eq!(b.chat_log()[0].message, "good luck");

    server.shutdown("test over").await;
    handle.abort();
}

#[tokio::test]
async fn last_player_standing_wins_when_the_other_quits() {
    let (addr, server, handle) = start_server(local_config(6, 4)).await;
    let addr = addr.expect("tcp listener");

    let mut a = join(addr, "alice").await;
    let b = join(addr, "bob").await;
    let alice = a.player();

    b.quit().await;
    wait_until(&mut a, |s| s.winner().is_some()).await;
    assert_eq!(a.winner(), Some(alice));
    wait_until(&mut a, |s| s.roster().len() == 1).await;

    server.shutdown("test over").await;
    handle.abort();
}

#[tokio::test]
async fn shutdown_disconnects_players() {
    let (addr, server, handle) = start_server(local_config(8, 4)).await;
    let addr = addr.expect("tcp listener");

    let mut a = join(addr, "alice").await;
    server.shutdown("maintenance").await;

    wait_until(&mut a, |s| s.is_disconnected()).await;
    handle.abort();
}

#[tokio::test]
async fn stop_signal_disconnects_players_before_returning() {
    let (ready_tx, ready_rx) = oneshot::channel::<Ready>();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(serve_until(local_config(9, 4), Some(ready_tx), async {
        let _ = stop_rx.await;
    }));
    let ready = tokio::time::timeout(STEP, ready_rx)
        .await
        .expect("server did not signal ready")
        .expect("ready channel dropped");
    let addr = ready.tcp.expect("tcp listener");

    let mut a = join(addr, "alice").await;
    stop_tx.send(()).unwrap();

    let reply = wait_for(&mut a, |c| matches!(c, Command::Disconnect(_))).await;
    let Command::Disconnect(payload) = reply else {
        panic!("expected a disconnect");
    };
    assert_eq!(payload.message, SHUTDOWN_REASON);

    let result = tokio::time::timeout(STEP, handle)
        .await
        .expect("server did not stop")
        .expect("server task panicked");
    assert!(result.is_ok());
}

#[cfg(unix)]
#[tokio::test]
async fn local_socket_listener_hosts_games() {
    let path = std::env::temp_dir().join(format!("netris-e2e-{}.sock", std::process::id()));
    let config = ServerConfig {
        listen_tcp: None,
        listen_socket: Some(path.clone()),
        seed: Some(11),
        ..ServerConfig::default()
    };
    let (tcp, server, handle) = start_server(config).await;
    assert!(tcp.is_none());

    let session = join_endpoint(Endpoint::Unix(path.clone()), "local").await;
    assert_eq!(session.start_parameters().seed, 11);
    assert_eq!(session.start_parameters().width, 10);

    server.shutdown("test over").await;
    handle.abort();
    assert!(!path.exists());
}

#[cfg(unix)]
#[tokio::test]
async fn local_socket_bind_refuses_to_replace_a_regular_file() {
    let path = std::env::temp_dir().join(format!("netris-e2e-{}.txt", std::process::id()));
    std::fs::write(&path, b"keep me").unwrap();

    let err = Listener::bind(&Endpoint::Unix(path.clone()), ConnectionConfig::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::AlreadyExists);
    assert_eq!(std::fs::read(&path).unwrap(), b"keep me");

    std::fs::remove_file(&path).unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn local_socket_bind_replaces_a_stale_socket() {
    let path = std::env::temp_dir().join(format!("netris-e2e-stale-{}.sock", std::process::id()));
    let _ = std::fs::remove_file(&path);
    // Dropping a std listener leaves its socket file behind.
    drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
    assert!(path.exists());

    let listener = Listener::bind(&Endpoint::Unix(path.clone()), ConnectionConfig::default())
        .await
        .expect("stale socket should be replaced");
    listener.shutdown("test over");
    assert!(!path.exists());
}
