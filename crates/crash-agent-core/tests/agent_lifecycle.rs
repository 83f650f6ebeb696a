use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crash_agent_core::host::{DamageSource, KinematicsSource, RawPartReading};
use crash_agent_core::models::{DeliveryOutcome, Kinematics, Vec3, VehicleIdentity};
use crash_agent_core::transport::{Ack, DeliveryRequest, Transport, TransportError};
use crash_agent_core::wire::report_to_value;
use crash_agent_core::{AgentConfig, CrashAgent, DispatchMode};
use serde_json::Value;

#[derive(Debug, Clone, Default)]
struct FakeVehicle {
    readings: Vec<RawPartReading>,
    kinematics: Kinematics,
    panic_on_read: bool,
    panic_on_identity: bool,
}

impl FakeVehicle {
    fn set_uniform_damage(&mut self, ratio: f64) {
        self.readings = vec![
            RawPartReading::new("bumper_F", "Front Bumper", ratio),
            RawPartReading::new("hood", "Hood", ratio),
        ];
    }
}

impl DamageSource for FakeVehicle {
    fn read_part_damage(&self) -> Vec<RawPartReading> {
        assert!(!self.panic_on_read, "host damage table unavailable");
        self.readings.clone()
    }
}

impl KinematicsSource for FakeVehicle {
    fn identity(&self) -> VehicleIdentity {
        assert!(!self.panic_on_identity, "vehicle identity lookup failed");
        VehicleIdentity {
            id: "veh-42".to_string(),
            name: "T-Cross Highline".to_string(),
            model: "tcross".to_string(),
            brand: "Volkswagen".to_string(),
            year: Some(2024),
            plate: Some("VW-TCROSS".to_string()),
        }
    }

    fn kinematics(&self) -> Kinematics {
        self.kinematics
    }
}

#[derive(Default)]
struct RecordingTransport {
    responses: Mutex<VecDeque<Result<Ack, TransportError>>>,
    payloads: Mutex<Vec<Value>>,
}

impl RecordingTransport {
    fn failing(times: usize) -> Arc<Self> {
        let transport = Self::default();
        {
            let mut responses = transport.responses.lock().expect("responses");
            for _ in 0..times {
                responses.push_back(Err(TransportError::Status { status: 502 }));
            }
        }
        Arc::new(transport)
    }

    fn payloads(&self) -> Vec<Value> {
        self.payloads.lock().expect("payloads").clone()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, request: &DeliveryRequest) -> Result<Ack, TransportError> {
        let value = report_to_value(&request.report)
            .map_err(|err| TransportError::Encode(err.to_string()))?;
        self.payloads.lock().expect("payloads").push(value);
        self.responses
            .lock()
            .expect("responses")
            .pop_front()
            .unwrap_or(Ok(Ack { status: 201 }))
    }
}

fn inline_config() -> AgentConfig {
    AgentConfig {
        damage_threshold: 0.05,
        cooldown_ms: 2_000,
        retry_delay_ms: 500,
        max_attempts: 3,
        dispatch: DispatchMode::Inline,
        host_version: "0.34.2".to_string(),
        ..AgentConfig::default()
    }
}

fn agent_with(transport: Arc<RecordingTransport>) -> CrashAgent<FakeVehicle> {
    CrashAgent::with_transport(inline_config(), FakeVehicle::default(), transport)
        .expect("agent")
}

fn tick_with_damage(agent: &mut CrashAgent<FakeVehicle>, dt: f64, ratio: f64) -> bool {
    agent.host_mut().set_uniform_damage(ratio);
    agent.on_tick(dt).decision.is_crash()
}

fn as_f64(value: &Value) -> f64 {
    value.as_f64().expect("numeric field")
}

#[test]
fn reference_scenario_emits_a_single_crash_report() {
    let transport = Arc::new(RecordingTransport::default());
    let mut agent = agent_with(transport.clone());

    assert!(!tick_with_damage(&mut agent, 0.1, 0.10));
    assert!(!tick_with_damage(&mut agent, 0.1, 0.12));
    assert!(tick_with_damage(&mut agent, 0.3, 0.45));
    assert!(!tick_with_damage(&mut agent, 0.7, 0.60));
    assert!(!tick_with_damage(&mut agent, 1.5, 0.60));

    assert_eq!(agent.crashes_detected(), 1);
    let payloads = transport.payloads();
    assert_eq!(payloads.len(), 1);
    let payload = &payloads[0];
    assert_eq!(payload["event_type"], "crash_detected");
    assert!((as_f64(&payload["damage"]["damage_delta"]) - 0.33).abs() < 1e-9);
    assert!((as_f64(&payload["damage"]["total_damage"]) - 0.45).abs() < 1e-9);
    assert_eq!(payload["damage"]["damaged_parts_count"], 2);
    assert_eq!(payload["vehicle"]["id"], "veh-42");
    assert_eq!(payload["vehicle"]["year"], 2024);
    assert_eq!(payload["metadata"]["beamng_version"], "0.34.2");
    assert_eq!(agent.stats().delivered, 1);
    assert_eq!(agent.pending_deliveries(), 0);
}

#[test]
fn reset_clears_cooldown_and_rearms_detection() {
    let transport = Arc::new(RecordingTransport::default());
    let mut agent = agent_with(transport.clone());

    tick_with_damage(&mut agent, 0.1, 0.0);
    assert!(tick_with_damage(&mut agent, 0.1, 0.5));

    agent.on_reset();
    assert!(!tick_with_damage(&mut agent, 0.1, 0.0));
    assert!(tick_with_damage(&mut agent, 0.1, 0.5));

    assert_eq!(transport.payloads().len(), 2);
}

#[test]
fn terminal_event_flushes_destroyed_report_once() {
    let transport = Arc::new(RecordingTransport::default());
    let mut agent = agent_with(transport.clone());
    tick_with_damage(&mut agent, 0.1, 0.2);

    assert!(agent.on_terminal().is_some());
    assert!(agent.on_terminal().is_none());
    assert!(agent.is_terminated());

    let payloads = transport.payloads();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0]["event_type"], "vehicle_destroyed");
    assert_eq!(payloads[0]["damage"]["total_damage"], 1.0);
    assert_eq!(payloads[0]["damage"]["damage_delta"], 0.0);
    assert_eq!(payloads[0]["damage"]["parts"].as_array().map(Vec::len), Some(2));

    assert!(!tick_with_damage(&mut agent, 0.1, 1.0));
    assert_eq!(transport.payloads().len(), 1);
}

#[test]
fn exhausted_delivery_is_reported_to_listener() {
    let transport = RecordingTransport::failing(10);
    let mut agent = agent_with(transport.clone());
    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&outcomes);
    agent.set_delivery_listener(move |outcome| {
        sink.lock().expect("outcomes").push(outcome.clone());
    });

    tick_with_damage(&mut agent, 0.1, 0.0);
    assert!(tick_with_damage(&mut agent, 0.1, 0.4));
    for _ in 0..10 {
        tick_with_damage(&mut agent, 0.25, 0.4);
    }

    assert_eq!(transport.payloads().len(), 3);
    let outcomes = outcomes.lock().expect("outcomes");
    assert_eq!(outcomes.len(), 1);
    match &outcomes[0] {
        DeliveryOutcome::Exhausted {
            attempts,
            last_error,
            ..
        } => {
            assert_eq!(*attempts, 3);
            assert_eq!(last_error.status(), Some(502));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
    assert_eq!(agent.stats().exhausted, 1);
    assert_eq!(agent.pending_deliveries(), 0);
}

#[test]
fn non_finite_host_values_reach_the_wire_as_null() {
    let transport = Arc::new(RecordingTransport::default());
    let mut agent = agent_with(transport.clone());
    tick_with_damage(&mut agent, 0.1, 0.0);

    agent.host_mut().readings = vec![
        RawPartReading::new("bumper_F", "Front Bumper", 0.6),
        RawPartReading::new("hood", "Hood", f64::NAN),
        RawPartReading::new("engine", "Engine", f64::INFINITY),
    ];
    agent.host_mut().kinematics.velocity = Vec3::new(f64::NAN, 1.0, 0.0);
    let tick = agent.on_tick(0.1);
    assert!(tick.decision.is_crash());
    assert_eq!(tick.anomalies, 2);

    let payloads = transport.payloads();
    let payload = &payloads[0];
    let encoded = payload.to_string();
    assert!(!encoded.contains("NaN"));
    assert!(!encoded.contains("Infinity"));
    assert_eq!(payload["velocity"]["x"], Value::Null);
    assert_eq!(payload["velocity"]["speed_kmh"], Value::Null);
    assert_eq!(payload["damage"]["parts"][0]["partId"], "bumper_F");
    assert_eq!(payload["damage"]["parts"][1]["damage"], Value::Null);
    assert_eq!(payload["damage"]["parts"][2]["damage"], Value::Null);
}

#[test]
fn panicking_host_is_contained_and_queue_keeps_draining() {
    let transport = RecordingTransport::failing(1);
    let mut agent = agent_with(transport.clone());
    tick_with_damage(&mut agent, 0.1, 0.0);
    assert!(tick_with_damage(&mut agent, 0.1, 0.5));
    assert_eq!(agent.stats().requeued, 1);

    agent.host_mut().panic_on_read = true;
    let tick = agent.on_tick(1.0);
    assert!(!tick.decision.is_crash());
    assert_eq!(tick.drain.delivered, 1);
    assert_eq!(transport.payloads().len(), 2);
}

#[test]
fn crash_is_reported_when_identity_source_panics() {
    let transport = Arc::new(RecordingTransport::default());
    let mut agent = agent_with(transport.clone());
    tick_with_damage(&mut agent, 0.1, 0.0);

    agent.host_mut().panic_on_identity = true;
    agent.host_mut().set_uniform_damage(0.5);
    let tick = agent.on_tick(0.1);
    assert!(tick.decision.is_crash());
    assert!(tick.report_id.is_some());
    assert_eq!(agent.crashes_detected(), 1);

    agent.host_mut().panic_on_identity = false;
    assert!(!tick_with_damage(&mut agent, 2.5, 0.5));
    assert!(tick_with_damage(&mut agent, 0.1, 0.9));

    // Once a snapshot has been captured it stands in for a failing source.
    agent.host_mut().panic_on_identity = true;
    assert!(!tick_with_damage(&mut agent, 2.5, 0.9));
    assert!(tick_with_damage(&mut agent, 0.1, 1.0));

    assert_eq!(agent.crashes_detected(), 3);
    assert_eq!(agent.stats().delivered, 3);
    let ids: Vec<_> = transport
        .payloads()
        .iter()
        .map(|payload| payload["vehicle"]["id"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(ids, ["", "veh-42", "veh-42"]);
}

#[test]
fn invalid_config_is_rejected_at_construction() {
    let config = AgentConfig {
        endpoint: "not a url".to_string(),
        ..inline_config()
    };
    let transport: Arc<dyn Transport> = Arc::new(RecordingTransport::default());
    let err = CrashAgent::with_transport(config, FakeVehicle::default(), transport)
        .err()
        .expect("invalid endpoint");
    assert_eq!(err.code(), "INVALID_CONFIG");
}
