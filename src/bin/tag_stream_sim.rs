use tag_pose_link::wire::{PosePacket, Transform};

use anyhow::Result;
use clap::Parser;
use log::*;
use nalgebra as na;
use simplelog::{Config, LevelFilter, TermLogger, TerminalMode};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

/// Streams a tag moving on a circle, in the location server's wire format.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    #[arg(long, default_value = "127.0.0.1:30002")]
    address: String,

    #[arg(long, default_value = "simple tag")]
    tag: String,

    /// Packets per second
    #[arg(long, default_value_t = 30.0, value_parser = parse_rate)]
    rate: f64,

    /// Circle radius in meters
    #[arg(long, default_value_t = 0.2)]
    radius: f64,

    #[arg(long, default_value = "info")]
    log_level: String,
}

fn parse_rate(value: &str) -> std::result::Result<f64, String> {
    let rate: f64 = value
        .parse()
        .map_err(|_| format!("\"{}\" is not a number", value))?;
    if rate.is_finite() && rate > 0.0 {
        Ok(rate)
    } else {
        Err(format!("rate must be a positive number of packets per second, got {}", rate))
    }
}

fn tag_pose(args: &Args, elapsed: f64) -> Transform {
    let angle = elapsed * 0.5;
    Transform::new(
        na::Vector3::new(
            args.radius * angle.cos(),
            args.radius * angle.sin(),
            0.5,
        ),
        na::UnitQuaternion::from_axis_angle(&na::Vector3::z_axis(), angle * 0.5),
    )
}

async fn stream_to(args: &Args, stream: &mut TcpStream) -> Result<()> {
    let period = Duration::from_secs_f64(1.0 / args.rate);
    let mut ticker = tokio::time::interval(period);
    let start = SystemTime::now();
    loop {
        ticker.tick().await;
        let now = SystemTime::now();
        let packet = PosePacket {
            time: Some(now.duration_since(UNIX_EPOCH)?.as_millis() as u64),
            name: args.tag.clone(),
            transform: tag_pose(args, now.duration_since(start)?.as_secs_f64()),
        };
        stream.write_all(packet.to_line()?.as_bytes()).await?;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let level = args.log_level.parse().unwrap_or(LevelFilter::Info);
    TermLogger::init(level, Config::default(), TerminalMode::Mixed)
        .map_err(|error| anyhow::anyhow!("Failed to set up logging: {:?}", error))?;

    let mut listener = TcpListener::bind(&args.address).await?;
    info!("Streaming tag \"{}\" on {}", args.tag, args.address);
    loop {
        let (mut stream, peer) = match listener.accept().await {
            Ok(connection) => connection,
            Err(error) => {
                error!("An error occurred at TCP server: {}", error);
                continue;
            }
        };
        info!("Accepted client {}", peer);
        if let Err(error) = stream_to(&args, &mut stream).await {
            warn!("Client {} dropped: {}", peer, error);
        }
    }
}
