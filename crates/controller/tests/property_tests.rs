//! Property tests for the controller's pure rules and for the control loop
//! driven end to end through its public API.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use irrigation_controller::control::{ControlLoop, LoopSettings};
use irrigation_controller::decision::{decide, Reason};
use irrigation_controller::display::{StatusDisplay, StatusLines};
use irrigation_controller::relay::PumpPort;
use irrigation_controller::remote::{self, mailbox};
use irrigation_controller::safety::{is_water_available, SafetyGate};
use irrigation_controller::sensor::{calibrate, SensorPort, SensorSample, SoilCalibration};
use irrigation_controller::state::{PumpState, Threshold};
use irrigation_controller::telemetry::{self, Delivery, TelemetrySink, FIELD_COUNT};
use proptest::prelude::*;
use tokio::time::Instant;

fn threshold() -> impl Strategy<Value = Threshold> {
    (1i64..=99).prop_map(|v| Threshold::new(v).unwrap())
}

fn env_value() -> impl Strategy<Value = Option<f32>> {
    prop_oneof![
        Just(None),
        Just(Some(f32::NAN)),
        (-40.0f32..80.0).prop_map(Some),
    ]
}

// ── Calibration ──────────────────────────────────────────────

proptest! {
    #[test]
    fn soil_percent_always_in_range(
        dry in 0i32..=32767,
        wet in 0i32..=32767,
        raw in any::<i32>(),
    ) {
        let pct = SoilCalibration::new(dry, wet).percent(raw);
        prop_assert!(pct <= 100);
    }

    #[test]
    fn soil_percent_is_monotonic_toward_wet(
        a in 0i32..=5000,
        b in 0i32..=5000,
    ) {
        // Reference probe reads lower when wetter.
        let cal = SoilCalibration::new(4095, 1200);
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(cal.percent(lo) >= cal.percent(hi));
    }
}

// ── Reservoir gate ───────────────────────────────────────────

proptest! {
    #[test]
    fn inverting_negates_the_gate(raw in any::<i32>(), threshold in any::<i32>()) {
        prop_assert_eq!(
            is_water_available(raw, threshold, true),
            !is_water_available(raw, threshold, false)
        );
    }
}

// ── Decision ─────────────────────────────────────────────────

proptest! {
    #[test]
    fn empty_reservoir_always_wins(soil in 0u8..=100, t in threshold()) {
        prop_assert_eq!(decide(soil, t, false), (PumpState::Off, Reason::ReservoirEmpty));
    }

    #[test]
    fn waters_exactly_when_drier_than_threshold(soil in 0u8..=100, t in threshold()) {
        let (pump, _) = decide(soil, t, true);
        prop_assert_eq!(pump.is_on(), soil < t.percent());
    }
}

// ── Telemetry ────────────────────────────────────────────────

proptest! {
    #[test]
    fn telemetry_always_has_four_fields(
        soil_raw in 0i32..=32767,
        water_raw in 0i32..=32767,
        temp_c in env_value(),
        humidity_pct in env_value(),
    ) {
        let sample = SensorSample { soil_raw, water_raw, temp_c, humidity_pct };
        let reading = calibrate(
            &sample,
            &SoilCalibration::new(4095, 1200),
            &SafetyGate::new(1000, false),
        );
        let payload = telemetry::format(&reading);
        let fields: Vec<&str> = payload.split(',').collect();
        prop_assert_eq!(fields.len(), FIELD_COUNT);
        prop_assert!(fields[3] == "0" || fields[3] == "1");
        prop_assert_eq!(fields[0].parse::<u8>().unwrap(), reading.soil_pct);
    }
}

// ── Remote commands ──────────────────────────────────────────

proptest! {
    #[test]
    fn integer_commands_accepted_iff_in_open_range(v in -1000i64..1000) {
        let parsed = remote::parse_threshold(v.to_string().as_bytes());
        prop_assert_eq!(parsed.is_ok(), v > 0 && v < 100);
        if let Ok(t) = parsed {
            prop_assert_eq!(i64::from(t.percent()), v);
        }
    }

    #[test]
    fn arbitrary_bytes_never_panic(raw in proptest::collection::vec(any::<u8>(), 0..16)) {
        if let Ok(t) = remote::parse_threshold(&raw) {
            prop_assert!(t.percent() > 0 && t.percent() < 100);
        }
    }
}

// ── Control loop ─────────────────────────────────────────────

const PERIOD: Duration = Duration::from_millis(2000);
const MIN_ON: Duration = Duration::from_millis(500);

struct Playback(VecDeque<SensorSample>);

impl SensorPort for Playback {
    fn read(&mut self) -> SensorSample {
        self.0.pop_front().unwrap_or(SensorSample {
            soil_raw: 4095,
            water_raw: 0,
            temp_c: None,
            humidity_pct: None,
        })
    }
}

#[derive(Clone, Default)]
struct SharedPump(Rc<RefCell<Vec<PumpState>>>);

impl PumpPort for SharedPump {
    fn set(&mut self, state: PumpState) {
        self.0.borrow_mut().push(state);
    }
}

struct Blank;

impl StatusDisplay for Blank {
    fn render(&mut self, _lines: &StatusLines) {}
}

#[derive(Clone, Default)]
struct Collect(Rc<RefCell<Vec<String>>>);

impl TelemetrySink for Collect {
    fn publish(&mut self, payload: String) -> Delivery {
        self.0.borrow_mut().push(payload);
        Delivery::Sent
    }
}

fn step() -> impl Strategy<Value = (i32, i32, Option<i64>)> {
    (
        1000i32..=4200,
        0i32..=2000,
        prop_oneof![3 => Just(None), 1 => (-10i64..110).prop_map(Some)],
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn pump_never_runs_dry_or_over_threshold(steps in proptest::collection::vec(step(), 1..40)) {
        let settings = LoopSettings {
            period: PERIOD,
            pump_min_on: MIN_ON,
            default_threshold: Threshold::new(30).unwrap(),
            soil: SoilCalibration::new(4095, 1200),
            gate: SafetyGate::new(1000, false),
        };
        let samples = steps
            .iter()
            .map(|&(soil_raw, water_raw, _)| SensorSample {
                soil_raw,
                water_raw,
                temp_c: Some(20.0),
                humidity_pct: Some(50.0),
            })
            .collect();
        let pump = SharedPump::default();
        let sent = Collect::default();
        let (tx, rx) = mailbox();
        let mut control = ControlLoop::new(
            settings,
            Playback(samples),
            pump.clone(),
            Blank,
            sent.clone(),
            rx,
        );

        let t0 = Instant::now();
        let mut reports = Vec::new();
        for (i, &(_, _, command)) in steps.iter().enumerate() {
            if let Some(v) = command {
                tx.post(v.to_string().into_bytes());
            }
            let start = t0 + PERIOD * i as u32;
            reports.extend(control.tick(start));
            reports.extend(control.tick(start + MIN_ON));
        }

        prop_assert_eq!(reports.len(), steps.len());
        prop_assert_eq!(sent.0.borrow().len(), steps.len());
        for report in &reports {
            let d = &report.decision;
            if d.pump.is_on() {
                prop_assert!(report.reading.water_ok);
                prop_assert!(report.reading.soil_pct < d.threshold.percent());
            }
            if !report.reading.water_ok {
                prop_assert_eq!(d.reason, Reason::ReservoirEmpty);
            }
        }
        // Relay mirrors the last decision.
        let last = reports.last().map(|r| r.decision.pump);
        prop_assert_eq!(pump.0.borrow().last().copied(), last);
        prop_assert_eq!(control.state().pump(), last.unwrap_or_default());
    }
}
