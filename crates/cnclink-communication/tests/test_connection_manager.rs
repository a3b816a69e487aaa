use async_trait::async_trait;
use cnclink_communication::{
    commands, ConnectionManager, IncomingStream, LoopbackFactory, LoopbackHandle, ManagerConfig,
    ProbeSettings, Transport, TransportFactory,
};
use cnclink_core::{
    CommunicatorState, ConnectionConfig, LinkEvent, LogDirection, MachineState, Position, Result,
    TransportKind,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn manager_with(poll_interval: Duration) -> (ConnectionManager, LoopbackHandle) {
    let (factory, handle) = LoopbackFactory::new();
    let config = ManagerConfig {
        poll_interval,
        ..Default::default()
    };
    (ConnectionManager::new(Arc::new(factory), config), handle)
}

/// Manager whose poll fires once at connect and then stays quiet
fn quiet_manager() -> (ConnectionManager, LoopbackHandle) {
    manager_with(Duration::from_secs(3600))
}

/// Transport whose open never completes, like a handshake with no answer
struct StalledTransport;

#[async_trait]
impl Transport for StalledTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    async fn open(&mut self, _config: &ConnectionConfig) -> Result<IncomingStream> {
        std::future::pending().await
    }

    async fn write_frame(&mut self, _frame: &[u8]) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_open(&self) -> bool {
        false
    }
}

/// Hands out one stalled transport, then loopback ones
struct StallOnceFactory {
    stalled: AtomicBool,
    loopback: LoopbackFactory,
}

impl TransportFactory for StallOnceFactory {
    fn create(&self, kind: TransportKind) -> Box<dyn Transport> {
        if self.stalled.swap(true, Ordering::SeqCst) {
            self.loopback.create(kind)
        } else {
            Box::new(StalledTransport)
        }
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[tokio::test]
async fn test_status_report_updates_snapshot() {
    let (manager, handle) = quiet_manager();
    manager
        .connect(ConnectionConfig::serial_auto(115_200))
        .await
        .unwrap();
    assert_eq!(manager.state(), CommunicatorState::Connected);
    assert_eq!(handle.opened_kind(), Some(TransportKind::Serial));

    assert!(handle.feed_line("<Idle|WPos:1.000,2.000,-0.500|FS:800,0>"));
    assert!(wait_until(|| manager.machine_state().feed_rate == 800.0).await);

    let state = manager.machine_state();
    assert_eq!(state.status, "Idle");
    assert_eq!(state.work_position, Position::new(1.0, 2.0, -0.5));
    assert_eq!(state.feed_rate, 800.0);
    assert_eq!(state.spindle_speed, 0.0);
    assert_eq!(state.machine_position, Position::default());

    // Status reports are not part of the I/O trace.
    assert!(manager.event_log().is_empty());
    manager.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_report_split_across_chunks() {
    let (manager, handle) = quiet_manager();
    manager.connect(ConnectionConfig::default()).await.unwrap();

    assert!(handle.feed("<Run|MPos:10.000,20.000,-5.000|FS:1500,12000|WC"));
    assert!(handle.feed("O:2.000,5.000,-1.000>\r\nok\r\n"));
    assert!(wait_until(|| manager.event_log().len() == 1).await);

    let state = manager.machine_state();
    assert_eq!(state.status, "Run");
    assert_eq!(state.machine_position, Position::new(10.0, 20.0, -5.0));
    assert_eq!(state.work_position, Position::new(8.0, 15.0, -4.0));
    assert_eq!(manager.event_log().last().unwrap().text, "ok");
}

#[tokio::test]
async fn test_send_command_frames_and_logs() {
    let (manager, handle) = quiet_manager();
    manager.connect(ConnectionConfig::default()).await.unwrap();

    manager.send_command("$H").await.unwrap();
    assert_eq!(handle.frames_without_polls(), vec![b"$H\n".to_vec()]);

    let last = manager.event_log().last().unwrap();
    assert_eq!(last.direction, LogDirection::Sent);
    assert_eq!(last.text, "$H");
    assert_eq!(last.to_string().split_once(' ').unwrap().1, "→ $H");
}

#[tokio::test]
async fn test_status_query_is_never_logged() {
    let (manager, handle) = manager_with(Duration::from_millis(10));
    manager.connect(ConnectionConfig::default()).await.unwrap();

    manager.send_command("?").await.unwrap();
    assert!(wait_until(|| handle.frames().len() >= 4).await);
    assert!(handle.frames().iter().all(|frame| frame == b"?"));
    assert!(manager.event_log().is_empty());
}

#[tokio::test]
async fn test_poll_timer_sends_status_queries() {
    let (manager, handle) = manager_with(Duration::from_millis(20));
    manager.connect(ConnectionConfig::default()).await.unwrap();
    assert!(wait_until(|| handle.frames().len() >= 3).await);
    manager.disconnect().await.unwrap();

    let polls = handle.frames().len();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(handle.frames().len(), polls);
}

#[tokio::test]
async fn test_reset_sends_single_byte() {
    let (manager, handle) = quiet_manager();
    manager.connect(ConnectionConfig::default()).await.unwrap();

    manager.reset().await.unwrap();
    assert_eq!(handle.frames_without_polls(), vec![vec![0x18]]);
    assert_eq!(manager.state(), CommunicatorState::Connected);

    let log = manager.event_log().snapshot();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].direction, LogDirection::Error);
    assert_eq!(log[0].text, "Soft reset sent");
}

#[tokio::test]
async fn test_disconnect_stops_updates() {
    let (manager, handle) = quiet_manager();
    manager.connect(ConnectionConfig::default()).await.unwrap();
    handle.feed_line("<Jog|WPos:5.000,5.000,5.000|FS:500,0>");
    assert!(wait_until(|| manager.machine_state().status == "Jog").await);

    manager.disconnect().await.unwrap();
    assert_eq!(manager.state(), CommunicatorState::Disconnected);
    assert_eq!(manager.machine_state(), MachineState::default());
    assert!(!handle.is_open());

    assert!(!handle.feed_line("<Run|WPos:9.000,9.000,9.000|FS:900,0>"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(manager.machine_state(), MachineState::default());
    assert!(manager.send_command("$H").await.unwrap_err().is_not_connected());
}

#[tokio::test]
async fn test_stream_end_is_implicit_disconnect() {
    let (manager, handle) = quiet_manager();
    let mut events = manager.subscribe();
    manager.connect(ConnectionConfig::default()).await.unwrap();
    handle.feed_line("<Idle|MPos:1.000,1.000,1.000>");
    assert!(wait_until(|| manager.machine_state().machine_position.x == 1.0).await);

    assert!(handle.hang_up("device unplugged"));
    assert!(wait_until(|| manager.state() == CommunicatorState::Disconnected).await);

    assert_eq!(manager.machine_state(), MachineState::default());
    let last = manager.event_log().last().unwrap();
    assert_eq!(last.direction, LogDirection::Error);
    assert!(last.text.contains("device unplugged"));

    let mut states = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let LinkEvent::StateChanged(state) = event {
            states.push(state);
        }
    }
    assert_eq!(
        states,
        vec![
            CommunicatorState::Connecting,
            CommunicatorState::Connected,
            CommunicatorState::Disconnected
        ]
    );

    // Manual reconnect works after a lost connection.
    manager.connect(ConnectionConfig::default()).await.unwrap();
    assert_eq!(handle.open_count(), 2);
}

#[tokio::test]
async fn test_connect_while_connected_is_rejected() {
    let (manager, handle) = quiet_manager();
    manager.connect(ConnectionConfig::default()).await.unwrap();

    let err = manager
        .connect(ConnectionConfig::websocket("ws://cnc.local/ws"))
        .await
        .unwrap_err();
    assert!(err.is_controller_error());
    assert_eq!(manager.state(), CommunicatorState::Connected);
    assert_eq!(handle.open_count(), 1);
    assert_eq!(
        manager.active_config().await,
        Some(ConnectionConfig::default())
    );
}

#[tokio::test]
async fn test_open_failure_has_no_side_effects() {
    let (manager, handle) = quiet_manager();
    handle.set_fail_open(true);

    assert!(manager.connect(ConnectionConfig::default()).await.is_err());
    assert_eq!(manager.state(), CommunicatorState::Disconnected);
    assert!(manager.event_log().is_empty());
    assert!(manager.active_config().await.is_none());

    handle.set_fail_open(false);
    manager.connect(ConnectionConfig::default()).await.unwrap();
    assert!(manager.is_connected());
}

#[tokio::test]
async fn test_write_failure_keeps_connection() {
    let (manager, handle) = quiet_manager();
    manager.connect(ConnectionConfig::default()).await.unwrap();
    handle.set_fail_writes(true);

    assert!(manager.send_command("G0 X10").await.is_err());
    assert!(manager.is_connected());
    let last = manager.event_log().last().unwrap();
    assert_eq!(last.direction, LogDirection::Error);
    assert_eq!(last.text, "Failed to send: G0 X10");
}

#[tokio::test]
async fn test_received_lines_logged_and_classified() {
    let (manager, handle) = quiet_manager();
    let mut events = manager.subscribe();
    manager.connect(ConnectionConfig::default()).await.unwrap();

    handle.feed("Grbl 1.1h ['$' for help]\r\nALARM:1\r\nerror:22\r\n");
    assert!(wait_until(|| manager.event_log().len() == 3).await);

    let texts: Vec<String> = manager
        .event_log()
        .snapshot()
        .into_iter()
        .map(|entry| entry.text)
        .collect();
    assert_eq!(texts, vec!["Grbl 1.1h ['$' for help]", "ALARM:1", "error:22"]);

    let mut alarm = None;
    let mut error = None;
    while let Ok(event) = events.try_recv() {
        match event {
            LinkEvent::ControllerAlarm { code, description } => alarm = Some((code, description)),
            LinkEvent::ControllerError { code, description } => error = Some((code, description)),
            _ => {}
        }
    }
    assert_eq!(alarm, Some((1, "Hard limit triggered".to_string())));
    assert_eq!(error, Some((22, "Undefined feed rate".to_string())));
}

#[tokio::test]
async fn test_malformed_status_does_not_corrupt_snapshot() {
    let (manager, handle) = quiet_manager();
    manager.connect(ConnectionConfig::default()).await.unwrap();

    handle.feed_line("<Idle|WPos:1.000,2.000,3.000|FS:100,0>");
    assert!(wait_until(|| manager.machine_state().feed_rate == 100.0).await);
    handle.feed_line("<Run|WPos:1.000,2.000,oops|FS:200,0>");
    assert!(wait_until(|| manager.machine_state().feed_rate == 200.0).await);

    let state = manager.machine_state();
    assert_eq!(state.status, "Run");
    assert_eq!(state.work_position, Position::new(1.0, 2.0, 3.0));
    assert!(manager.event_log().is_empty());
}

#[tokio::test]
async fn test_send_sequence_in_order() {
    let (manager, handle) = quiet_manager();
    manager.connect(ConnectionConfig::default()).await.unwrap();

    let probe = commands::probe_sequence(&ProbeSettings::default(), commands::Axis::Z, -1.0);
    manager
        .send_sequence(&probe, Duration::from_millis(1))
        .await
        .unwrap();

    let sent: Vec<String> = handle
        .frames_without_polls()
        .into_iter()
        .map(|frame| String::from_utf8(frame).unwrap())
        .collect();
    assert_eq!(
        sent,
        vec!["G91 G21\n", "G38.2 Z-10 F100\n", "G10 L20 P1 Z20\n", "G0 Z2\n", "G90\n"]
    );
    assert_eq!(manager.event_log().len(), 5);
}

#[tokio::test]
async fn test_send_sequence_stops_at_failure() {
    let (manager, handle) = quiet_manager();
    manager.connect(ConnectionConfig::default()).await.unwrap();
    handle.set_fail_writes(true);

    assert!(manager
        .send_sequence(["$X", "$H"], Duration::ZERO)
        .await
        .is_err());
    assert_eq!(manager.event_log().len(), 1);
}

#[tokio::test]
async fn test_event_log_survives_sessions() {
    let (manager, handle) = quiet_manager();
    manager.connect(ConnectionConfig::default()).await.unwrap();
    manager.send_command("$X").await.unwrap();
    manager.disconnect().await.unwrap();

    manager
        .connect(ConnectionConfig::websocket("ws://cnc.local/ws"))
        .await
        .unwrap();
    assert_eq!(handle.opened_kind(), Some(TransportKind::WebSocket));
    assert_eq!(manager.event_log().len(), 1);
}

#[tokio::test]
async fn test_cancelled_connect_returns_to_disconnected() {
    let (loopback, handle) = LoopbackFactory::new();
    let factory = StallOnceFactory {
        stalled: AtomicBool::new(false),
        loopback,
    };
    let manager = ConnectionManager::new(Arc::new(factory), ManagerConfig::default());
    let mut events = manager.subscribe();

    let attempt = tokio::time::timeout(
        Duration::from_millis(50),
        manager.connect(ConnectionConfig::websocket("ws://cnc.local/ws")),
    )
    .await;
    assert!(attempt.is_err());
    assert_eq!(manager.state(), CommunicatorState::Disconnected);

    let mut states = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let LinkEvent::StateChanged(state) = event {
            states.push(state);
        }
    }
    assert_eq!(
        states,
        vec![CommunicatorState::Connecting, CommunicatorState::Disconnected]
    );

    manager
        .connect(ConnectionConfig::websocket("ws://cnc.local/ws"))
        .await
        .unwrap();
    assert!(manager.is_connected());
    assert_eq!(handle.open_count(), 1);
}

#[tokio::test]
async fn test_dropping_manager_releases_transport() {
    let (manager, handle) = quiet_manager();
    manager.connect(ConnectionConfig::default()).await.unwrap();
    assert!(handle.is_open());

    drop(manager);
    assert!(wait_until(|| !handle.is_open()).await);
}

#[tokio::test]
async fn test_disconnect_after_stream_end_waits_for_teardown() {
    let (manager, handle) = quiet_manager();
    manager.connect(ConnectionConfig::default()).await.unwrap();

    assert!(handle.hang_up("cable pulled"));
    tokio::task::yield_now().await;
    manager.disconnect().await.unwrap();

    assert_eq!(manager.state(), CommunicatorState::Disconnected);
    assert_eq!(manager.machine_state(), MachineState::default());
    assert!(manager.active_config().await.is_none());
}
