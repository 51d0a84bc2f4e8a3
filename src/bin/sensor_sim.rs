//! Sensor simulator - streams synthetic profile frames over UDP
//!
//! Lets the gateway run end to end without the laser sensor. Each frame
//! advances the encoder by `--pulse-step`; the belt center can drift
//! sinusoidally to exercise the alignment alerts, and a fraction of frames
//! can be sent with an implausible distance or as duplicates.
//!
//! Usage:
//!   cargo run --bin sensor-sim -- --target 127.0.0.1:50000 --drift-mm 25

use clap::Parser;
use conveyor_gateway::domain::SensorFrame;
use conveyor_gateway::io::encode_frame;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sensor-sim")]
#[command(about = "Laser profile sensor simulator for local testing")]
struct Args {
    /// Gateway UDP address
    #[arg(short, long, default_value = "127.0.0.1:50000")]
    target: String,

    /// Milliseconds between frames
    #[arg(long, default_value = "100")]
    period_ms: u64,

    /// Encoder pulses per frame
    #[arg(long, default_value = "50")]
    pulse_step: u32,

    /// Starting encoder pulse count
    #[arg(long, default_value = "0")]
    start_pulse: u32,

    /// Material cross-section area (mm²)
    #[arg(long, default_value = "500.0")]
    area: f32,

    /// Sensor-to-belt distance (mm)
    #[arg(long, default_value = "50.0")]
    distance: f32,

    /// Static belt center offset (mm, positive = right)
    #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
    offset_mm: f32,

    /// Amplitude of a sinusoidal center drift (mm)
    #[arg(long, default_value = "0.0")]
    drift_mm: f32,

    /// Drift period (seconds)
    #[arg(long, default_value = "60.0")]
    drift_period_secs: f32,

    /// Send every Nth frame with an out-of-band distance (0 = never)
    #[arg(long, default_value = "0")]
    out_of_band_every: u64,

    /// Repeat every Nth frame's pulse count (0 = never)
    #[arg(long, default_value = "0")]
    duplicate_every: u64,

    /// Stop after this many frames (0 = run forever)
    #[arg(long, default_value = "0")]
    count: u64,
}

/// Edge offsets for a belt whose center sits `offset_mm` off the sensor axis
///
/// The gateway's center position is `(right + left) / 20`, so an offset of
/// ±5 mm is the edge of the centered zone and ±10 mm the edge of the far zones.
fn alignment_for_offset(offset_mm: f32) -> (f32, f32) {
    (offset_mm + 10.0, offset_mm - 10.0)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect(&args.target).await?;

    info!(
        target = %args.target,
        period_ms = args.period_ms,
        pulse_step = args.pulse_step,
        drift_mm = args.drift_mm,
        "sensor_sim_started"
    );

    let mut interval = tokio::time::interval(Duration::from_millis(args.period_ms.max(1)));
    let mut pulse = args.start_pulse;
    let mut sent: u64 = 0;
    let started = tokio::time::Instant::now();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!(frames = sent, "sensor_sim_stopped");
                return Ok(());
            }
            _ = interval.tick() => {}
        }

        sent += 1;
        let duplicate = args.duplicate_every > 0 && sent % args.duplicate_every == 0;
        if !duplicate {
            pulse = pulse.wrapping_add(args.pulse_step);
        }

        let elapsed = started.elapsed().as_secs_f32();
        let phase = elapsed / args.drift_period_secs.max(0.001) * std::f32::consts::TAU;
        let offset_mm = args.offset_mm + args.drift_mm * phase.sin();
        let (right_align, left_align) = alignment_for_offset(offset_mm);

        let distance = if args.out_of_band_every > 0 && sent % args.out_of_band_every == 0 {
            args.distance + 40.0
        } else {
            args.distance
        };

        let frame = SensorFrame {
            area: args.area,
            right_align,
            left_align,
            profile_count: sent as u32,
            pulse_count: pulse,
            distance,
        };
        socket.send(&encode_frame(&frame)).await?;
        debug!(pulse = pulse, right_align = right_align, left_align = left_align, "frame_sent");

        if args.count > 0 && sent >= args.count {
            info!(frames = sent, "sensor_sim_finished");
            return Ok(());
        }
    }
}
