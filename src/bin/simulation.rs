//! Greenhouse Telemetry Simulation
//!
//! Generates realistic reading events for testing myco-telemetry.
//! Simulates a fruiting room through scripted phases:
//! - Steady climate on setpoint
//! - CO₂ build-up (ventilation fault)
//! - Irrigation lapse (substrate and air drying out)
//! - Heater spikes (short temperature excursions)
//! - Recovery back to setpoint
//!
//! # Usage
//! ```bash
//! ./simulation --hours 48 --speed 0 | ./myco-telemetry --stdin --event-time
//! ./simulation --hours 24 --format csv --quiet > readings.csv
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, ValueEnum};
use rand::prelude::*;
use rand_distr::{Distribution, Normal};
use std::io::{self, Write};
use std::time::{Duration, Instant};

use myco_telemetry::analytics::round_to;
use myco_telemetry::{ReadingEvent, SensorType};

// ============================================================================
// Climate Baselines
// ============================================================================

const BASE_TEMPERATURE: f64 = 23.0;
const BASE_HUMIDITY: f64 = 88.0;
const BASE_CO2: f64 = 800.0;
/// Midpoint of the grow-light day cycle (lux)
const BASE_LIGHT: f64 = 550.0;
const LIGHT_SWING: f64 = 350.0;
const BASE_SOIL_MOISTURE: f64 = 65.0;

/// Fraction of the gap to target closed per sample
const RESPONSE: f64 = 0.08;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// Every phase in sequence
    Full,
    Steady,
    Co2Buildup,
    IrrigationLapse,
    HeaterSpike,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Json,
    Csv,
}

#[derive(Parser, Debug)]
#[command(name = "simulation")]
#[command(about = "Greenhouse sensor simulation for myco-telemetry testing")]
#[command(version)]
struct Args {
    /// Simulated duration in hours (1-720)
    #[arg(short = 'H', long, default_value = "24", value_parser = clap::value_parser!(u32).range(1..=720))]
    hours: u32,

    /// Simulated seconds between samples
    #[arg(long, default_value = "300", value_parser = clap::value_parser!(u64).range(1..=3600))]
    interval_secs: u64,

    /// Time compression factor (1 = real-time, 0 = no delay)
    #[arg(short, long, default_value = "0")]
    speed: u32,

    #[arg(short, long, value_enum, default_value = "json")]
    format: Format,

    /// Suppress mission log (only output readings)
    #[arg(short, long)]
    quiet: bool,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, value_enum, default_value = "full")]
    scenario: Scenario,

    /// First reading timestamp (RFC 3339, default: now)
    #[arg(long)]
    start: Option<DateTime<Utc>>,

    /// Source id stamped on every reading
    #[arg(long, default_value = "room-1")]
    source: String,
}

// ============================================================================
// Simulation Phases
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Steady,
    Co2Buildup,
    IrrigationLapse,
    HeaterSpike,
    Recovery,
}

impl Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::Steady => "Steady (On Setpoint)",
            Phase::Co2Buildup => "CO₂ Build-up (Ventilation Fault)",
            Phase::IrrigationLapse => "Irrigation Lapse (Substrate Drying)",
            Phase::HeaterSpike => "Heater Spikes (Short Excursions)",
            Phase::Recovery => "Recovery (Return to Setpoint)",
        }
    }

    fn expectation(&self) -> &'static str {
        match self {
            Phase::Steady => "Expected: all subsystems optimal",
            Phase::Co2Buildup => "Expected: CO₂ rising, ventilation score dropping",
            Phase::IrrigationLapse => "Expected: soil moisture falling, water score dropping",
            Phase::HeaterSpike => "Expected: temperature spikes counted, drift stays stable",
            Phase::Recovery => "Expected: scores climbing back",
        }
    }
}

impl Scenario {
    fn phase_at(&self, progress: f64) -> Phase {
        let single = |fault: Phase| match progress {
            p if p < 0.30 => Phase::Steady,
            p if p < 0.80 => fault,
            _ => Phase::Recovery,
        };
        match self {
            Scenario::Full => match progress {
                p if p < 0.30 => Phase::Steady,
                p if p < 0.50 => Phase::Co2Buildup,
                p if p < 0.70 => Phase::IrrigationLapse,
                p if p < 0.80 => Phase::HeaterSpike,
                _ => Phase::Recovery,
            },
            Scenario::Steady => Phase::Steady,
            Scenario::Co2Buildup => single(Phase::Co2Buildup),
            Scenario::IrrigationLapse => single(Phase::IrrigationLapse),
            Scenario::HeaterSpike => single(Phase::HeaterSpike),
        }
    }
}

// ============================================================================
// Simulation State
// ============================================================================

struct SimulationState {
    rng: StdRng,
    scenario: Scenario,
    current_phase: Phase,
    sim_time_seconds: f64,
    total_duration_seconds: f64,

    temperature: f64,
    humidity: f64,
    co2: f64,
    soil_moisture: f64,

    readings_generated: u64,
    spikes_injected: u64,

    temperature_noise: Normal<f64>,
    humidity_noise: Normal<f64>,
    co2_noise: Normal<f64>,
    light_noise: Normal<f64>,
}

impl SimulationState {
    fn new(args: &Args) -> Result<Self> {
        let rng = match args.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            rng,
            scenario: args.scenario,
            current_phase: args.scenario.phase_at(0.0),
            sim_time_seconds: 0.0,
            total_duration_seconds: f64::from(args.hours) * 3600.0,
            temperature: BASE_TEMPERATURE,
            humidity: BASE_HUMIDITY,
            co2: BASE_CO2,
            soil_moisture: BASE_SOIL_MOISTURE,
            readings_generated: 0,
            spikes_injected: 0,
            temperature_noise: Normal::new(0.0, 0.08).context("temperature noise")?,
            humidity_noise: Normal::new(0.0, 0.25).context("humidity noise")?,
            co2_noise: Normal::new(0.0, 6.0).context("co2 noise")?,
            light_noise: Normal::new(0.0, 20.0).context("light noise")?,
        })
    }

    fn progress(&self) -> f64 {
        self.sim_time_seconds / self.total_duration_seconds
    }

    fn update_phase(&mut self) -> bool {
        let new_phase = self.scenario.phase_at(self.progress());
        if new_phase != self.current_phase {
            self.current_phase = new_phase;
            true
        } else {
            false
        }
    }

    /// Climate targets the controllers are drifting towards in this phase.
    fn targets(&self) -> (f64, f64, f64, f64) {
        match self.current_phase {
            Phase::Steady | Phase::HeaterSpike | Phase::Recovery => {
                (BASE_TEMPERATURE, BASE_HUMIDITY, BASE_CO2, BASE_SOIL_MOISTURE)
            }
            Phase::Co2Buildup => (BASE_TEMPERATURE + 1.5, BASE_HUMIDITY, 1600.0, BASE_SOIL_MOISTURE),
            Phase::IrrigationLapse => (BASE_TEMPERATURE, 76.0, BASE_CO2, 42.0),
        }
    }

    /// Advance the climate one sample and emit a reading per sensor type.
    fn step(&mut self, start: DateTime<Utc>, source: &str) -> Vec<ReadingEvent> {
        let (t_temp, t_hum, t_co2, t_soil) = self.targets();

        // Slow CO₂ build-up: the ventilation fault ramps, it does not jump
        let response = if self.current_phase == Phase::Co2Buildup { RESPONSE / 4.0 } else { RESPONSE };

        self.temperature += (t_temp - self.temperature) * response
            + self.temperature_noise.sample(&mut self.rng);
        self.humidity += (t_hum - self.humidity) * response + self.humidity_noise.sample(&mut self.rng);
        self.co2 += (t_co2 - self.co2) * response + self.co2_noise.sample(&mut self.rng);
        self.soil_moisture += (t_soil - self.soil_moisture) * response
            + self.humidity_noise.sample(&mut self.rng) * 0.5;

        let mut temperature = self.temperature;
        if self.current_phase == Phase::HeaterSpike && self.rng.gen_bool(0.08) {
            temperature += self.rng.gen_range(6.0..8.0);
            self.spikes_injected += 1;
        }

        // Grow lights follow a 24h cycle
        let day_angle = self.sim_time_seconds / 86_400.0 * std::f64::consts::TAU;
        let light = (BASE_LIGHT + LIGHT_SWING * day_angle.sin() + self.light_noise.sample(&mut self.rng))
            .max(0.0);

        let timestamp = start
            + chrono::Duration::milliseconds((self.sim_time_seconds * 1000.0) as i64);
        let timestamp = timestamp.to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

        let readings = [
            (SensorType::Temperature, round_to(temperature, 1)),
            (SensorType::Humidity, round_to(self.humidity.clamp(0.0, 100.0), 1)),
            (SensorType::Co2, round_to(self.co2.max(0.0), 0)),
            (SensorType::Light, round_to(light, 0)),
            (SensorType::SoilMoisture, round_to(self.soil_moisture.clamp(0.0, 100.0), 1)),
        ];
        self.readings_generated += readings.len() as u64;

        readings
            .into_iter()
            .map(|(sensor_type, value)| ReadingEvent {
                sensor_type: sensor_type.id().to_string(),
                value,
                timestamp: timestamp.clone(),
                source_id: source.to_string(),
            })
            .collect()
    }
}

// ============================================================================
// Logging Utilities
// ============================================================================

fn format_time(seconds: f64) -> String {
    let hours = (seconds / 3600.0) as u32;
    let minutes = ((seconds % 3600.0) / 60.0) as u32;
    format!("{:03}h{:02}m", hours, minutes)
}

fn log_mission(time: f64, message: &str, quiet: bool) {
    if !quiet {
        eprintln!("[{}] {}", format_time(time), message);
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> Result<()> {
    let args = Args::parse();
    let mut state = SimulationState::new(&args)?;
    let start = args.start.unwrap_or_else(Utc::now);

    let sample_interval_sim = args.interval_secs as f64;
    let total_samples = (state.total_duration_seconds / sample_interval_sim) as u64;
    let sample_interval_real = (args.speed > 0)
        .then(|| Duration::from_secs_f64(sample_interval_sim / f64::from(args.speed)));

    log_mission(0.0, &"=".repeat(70), args.quiet);
    log_mission(0.0, "GREENHOUSE TELEMETRY SIMULATION", args.quiet);
    log_mission(0.0, &"=".repeat(70), args.quiet);
    log_mission(0.0, &format!("  Scenario: {:?}", args.scenario), args.quiet);
    log_mission(0.0, &format!("  Duration: {} hours ({} samples/sensor)", args.hours, total_samples), args.quiet);
    log_mission(0.0, &format!("  Interval: {}s", args.interval_secs), args.quiet);
    log_mission(0.0, &format!("  Start: {}", start.to_rfc3339()), args.quiet);
    if let Some(seed) = args.seed {
        log_mission(0.0, &format!("  Random seed: {}", seed), args.quiet);
    }
    log_mission(0.0, &format!(">>> PHASE: {}", state.current_phase.name()), args.quiet);
    log_mission(0.0, &format!("    {}", state.current_phase.expectation()), args.quiet);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if args.format == Format::Csv {
        writeln!(out, "timestamp,sensorType,value,sourceId")?;
    }

    let started = Instant::now();
    while state.sim_time_seconds < state.total_duration_seconds {
        let loop_start = Instant::now();

        if state.update_phase() {
            log_mission(state.sim_time_seconds, &format!(">>> PHASE: {}", state.current_phase.name()), args.quiet);
            log_mission(state.sim_time_seconds, &format!("    {}", state.current_phase.expectation()), args.quiet);
        }

        for event in state.step(start, &args.source) {
            match args.format {
                Format::Json => writeln!(out, "{}", serde_json::to_string(&event)?)?,
                Format::Csv => writeln!(
                    out,
                    "{},{},{},{}",
                    event.timestamp, event.sensor_type, event.value, event.source_id
                )?,
            }
        }
        out.flush()?;

        state.sim_time_seconds += sample_interval_sim;

        if let Some(interval) = sample_interval_real {
            let elapsed = loop_start.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
    }
    drop(out);

    log_mission(state.sim_time_seconds, &"=".repeat(70), args.quiet);
    log_mission(state.sim_time_seconds, "SIMULATION COMPLETE", args.quiet);
    log_mission(state.sim_time_seconds, &format!("Readings: {}", state.readings_generated), args.quiet);
    log_mission(state.sim_time_seconds, &format!("Heater spikes injected: {}", state.spikes_injected), args.quiet);
    log_mission(state.sim_time_seconds, &format!("Real time: {:.1}s", started.elapsed().as_secs_f64()), args.quiet);
    Ok(())
}
