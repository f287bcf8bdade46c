use tag_pose_link::scene::{Host, ReportLevel, SceneObject, SimpleObject, ViewState};
use tag_pose_link::{LinkConfig, SessionManager};

use anyhow::Result;
use clap::Parser;
use log::*;
use nalgebra as na;
use simplelog::{Config, LevelFilter, TermLogger, TerminalMode};
use std::path::PathBuf;
use std::thread::sleep;
use std::time::Instant;

/// Connects to the location server without a window and logs the bound object's pose.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    address: Option<String>,

    #[arg(long)]
    tag: Option<String>,

    /// Distance of the virtual camera from the origin
    #[arg(long, default_value_t = 5.0)]
    view_distance: f64,

    #[arg(long, default_value = "info")]
    log_level: String,
}

struct ProbeHost {
    view: ViewState,
    object: SimpleObject,
}

impl Host for ProbeHost {
    fn view_state(&self) -> Option<ViewState> {
        Some(self.view)
    }

    fn active_object(&self) -> Option<String> {
        Some("probe".to_owned())
    }

    fn object_mut(&mut self, id: &str) -> Option<&mut dyn SceneObject> {
        match id {
            "probe" => Some(&mut self.object),
            _ => None,
        }
    }

    fn report(&mut self, level: ReportLevel, message: &str) {
        match level {
            ReportLevel::Info => info!("{}", message),
            ReportLevel::Error => error!("{}", message),
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level = args.log_level.parse().unwrap_or(LevelFilter::Info);
    TermLogger::init(level, Config::default(), TerminalMode::Mixed)
        .map_err(|error| anyhow::anyhow!("Failed to set up logging: {:?}", error))?;

    let mut config = LinkConfig::load_or_default(args.config.as_ref())?;
    if let Some(address) = args.address {
        config.address = address;
    }
    if let Some(tag) = args.tag {
        config.bound_tag = tag;
    }
    let interval = config.poll_interval();
    let mut manager = SessionManager::tcp(config);
    let mut host = ProbeHost {
        view: ViewState::new(
            na::Point3::origin(),
            na::UnitQuaternion::identity(),
            args.view_distance,
        ),
        object: SimpleObject::default(),
    };

    manager.start(&mut host)?;
    let mut last = host.object.clone();
    while manager.is_active() {
        sleep(interval);
        manager.poll(&mut host, Instant::now());
        if host.object != last {
            let (roll, pitch, yaw) = host.object.orientation.euler_angles();
            info!(
                "position: [{:.3}, {:.3}, {:.3}] rpy: [{:.1}, {:.1}, {:.1}]",
                host.object.position.x,
                host.object.position.y,
                host.object.position.z,
                roll.to_degrees(),
                pitch.to_degrees(),
                yaw.to_degrees()
            );
            last = host.object.clone();
        }
    }
    Ok(())
}
