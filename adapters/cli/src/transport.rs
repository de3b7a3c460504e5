//! JSON-lines transport over stdio.
//!
//! Observers read one `map_meta` line followed by `state` lines at the
//! broadcast cadence, and write control messages one per line.

use std::{
    io::{BufRead, Write},
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use crowd_sim_controller::CrowdService;
use crowd_sim_core::protocol::{self, InboundMessage, OutboundMessage};
use tracing::{debug, info, warn};

/// Applies one control line to the service. Malformed lines are logged and skipped.
pub(crate) fn dispatch(service: &dyn CrowdService, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    let message = match InboundMessage::parse(line) {
        Ok(message) => message,
        Err(error) => {
            warn!(%error, "ignoring malformed control message");
            return;
        }
    };

    match message {
        InboundMessage::MovePerson { id, x, y } => {
            if !service.move_agent(id, x, y) {
                warn!(id = id.get(), "move_person for unknown agent");
            }
        }
        InboundMessage::ToggleState { id, state } => {
            let desired = protocol::desired_state(state.as_deref());
            if !service.toggle_agent(id, desired) {
                warn!(id = id.get(), "toggle_state for unknown agent");
            }
        }
        InboundMessage::ResetMap => service.reset(),
    }
}

/// Reads control lines on a background thread until the input closes.
pub(crate) fn spawn_control_reader<R>(
    service: Arc<dyn CrowdService>,
    input: R,
) -> Result<JoinHandle<()>>
where
    R: BufRead + Send + 'static,
{
    thread::Builder::new()
        .name("control-reader".into())
        .spawn(move || {
            for line in input.lines() {
                match line {
                    Ok(line) => dispatch(service.as_ref(), &line),
                    Err(error) => {
                        warn!(%error, "control input failed");
                        break;
                    }
                }
            }
            debug!("control input closed");
        })
        .context("failed to spawn control reader thread")
}

/// Writes the session header announcing the field dimensions.
pub(crate) fn write_map_meta(service: &dyn CrowdService, out: &mut impl Write) -> Result<()> {
    let line = OutboundMessage::MapMeta(service.field_dimensions())
        .to_json()
        .context("failed to encode map_meta message")?;
    writeln!(out, "{line}").context("failed to write map_meta message")?;
    out.flush().context("failed to flush output")
}

/// Writes the latest snapshot as a `state` line.
pub(crate) fn write_state(service: &dyn CrowdService, out: &mut impl Write) -> Result<()> {
    let snapshot = service.snapshot();
    let line = OutboundMessage::State(&snapshot)
        .to_json()
        .context("failed to encode state message")?;
    writeln!(out, "{line}").context("failed to write state message")?;
    out.flush().context("failed to flush output")
}

/// Streams `state` lines every `interval`, stopping once `duration` elapsed if one is given.
pub(crate) fn broadcast(
    service: &dyn CrowdService,
    out: &mut impl Write,
    interval: Duration,
    duration: Option<Duration>,
) -> Result<()> {
    let started = Instant::now();
    write_map_meta(service, out)?;

    let mut sent: u64 = 0;
    loop {
        write_state(service, out)?;
        sent += 1;
        if duration.is_some_and(|limit| started.elapsed() >= limit) {
            break;
        }
        thread::sleep(interval);
    }

    info!(sent, "broadcast finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crowd_sim_core::{AgentId, AgentState, CrowdState, FieldDimensions};
    use std::sync::Mutex;

    #[derive(Debug, PartialEq)]
    enum Call {
        Move(AgentId, f32, f32),
        Toggle(AgentId, Option<AgentState>),
        Reset,
    }

    #[derive(Default)]
    struct RecordingService {
        calls: Mutex<Vec<Call>>,
    }

    impl RecordingService {
        fn calls(&self) -> Vec<Call> {
            std::mem::take(&mut *self.calls.lock().expect("calls"))
        }
    }

    impl CrowdService for RecordingService {
        fn snapshot(&self) -> Arc<CrowdState> {
            Arc::new(CrowdState {
                map: self.field_dimensions(),
                ..CrowdState::default()
            })
        }

        fn move_agent(&self, agent: AgentId, x: f32, y: f32) -> bool {
            self.calls.lock().expect("calls").push(Call::Move(agent, x, y));
            agent.get() < 10
        }

        fn toggle_agent(&self, agent: AgentId, desired: Option<AgentState>) -> bool {
            self.calls
                .lock()
                .expect("calls")
                .push(Call::Toggle(agent, desired));
            agent.get() < 10
        }

        fn reset(&self) {
            self.calls.lock().expect("calls").push(Call::Reset);
        }

        fn field_dimensions(&self) -> FieldDimensions {
            FieldDimensions::new(320, 240)
        }
    }

    #[test]
    fn control_lines_reach_the_service() {
        let service = RecordingService::default();

        dispatch(&service, r#"{"type":"move_person","id":5,"x":-10,"y":50}"#);
        dispatch(&service, r#"{"type":"toggle_state","id":2}"#);
        dispatch(&service, r#"{"type":"toggle_state","id":3,"state":"large"}"#);
        dispatch(&service, r#"{"type":"toggle_state","id":4,"state":"huge"}"#);
        dispatch(&service, r#"{"type":"reset_map"}"#);

        assert_eq!(
            service.calls(),
            vec![
                Call::Move(AgentId::new(5), -10.0, 50.0),
                Call::Toggle(AgentId::new(2), None),
                Call::Toggle(AgentId::new(3), Some(AgentState::Large)),
                Call::Toggle(AgentId::new(4), None),
                Call::Reset,
            ]
        );
    }

    #[test]
    fn malformed_and_blank_lines_are_ignored() {
        let service = RecordingService::default();

        dispatch(&service, "");
        dispatch(&service, "not json");
        dispatch(&service, r#"{"type":"teleport","id":1}"#);
        dispatch(&service, r#"{"type":"move_person","id":1}"#);

        assert!(service.calls().is_empty());
    }

    #[test]
    fn reader_thread_drains_input_until_closed() {
        let service = Arc::new(RecordingService::default());
        let input = "{\"type\":\"reset_map\"}\n\n{\"type\":\"toggle_state\",\"id\":1}\n";

        let handle = spawn_control_reader(
            Arc::clone(&service) as Arc<dyn CrowdService>,
            std::io::Cursor::new(input.as_bytes().to_vec()),
        )
        .expect("reader thread");
        handle.join().expect("reader finished");

        assert_eq!(
            service.calls(),
            vec![Call::Reset, Call::Toggle(AgentId::new(1), None)]
        );
    }

    #[test]
    fn broadcast_starts_with_map_meta_then_states() {
        let service = RecordingService::default();
        let mut out = Vec::new();

        broadcast(
            &service,
            &mut out,
            Duration::from_millis(1),
            Some(Duration::ZERO),
        )
        .expect("broadcast");

        let text = String::from_utf8(out).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], r#"{"type":"map_meta","width":320,"height":240}"#);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with(r#"{"type":"state","#));
        assert!(lines[1].contains(r#""map":{"width":320,"height":240}"#));
    }
}
