use tag_pose_link::scene::{Host, ReportLevel, SceneObject, ViewState};
use tag_pose_link::{EventDisposition, LinkConfig, ScrollDirection, SessionManager};

use anyhow::Result;
use clap::Parser;
use kiss3d::camera::{ArcBall, Camera};
use kiss3d::event::{Action, Key, Modifiers, WindowEvent};
use kiss3d::light::Light;
use kiss3d::scene::SceneNode;
use kiss3d::window::Window;
use log::*;
use nalgebra as na;
use simplelog::{Config, LevelFilter, TermLogger, TerminalMode};
use std::path::PathBuf;
use std::time::Instant;

const TARGET_ID: &str = "cube";

#[derive(Parser, Debug)]
#[command(version, about = "Moves a cube with the pose of a tracked tag")]
struct Args {
    /// TOML file with link settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the location server address
    #[arg(long)]
    address: Option<String>,

    /// Override the name of the tag that drives the cube
    #[arg(long)]
    tag: Option<String>,

    #[arg(long, default_value = "info")]
    log_level: String,
}

fn point_f64(p: na::Point3<f32>) -> na::Point3<f64> {
    na::Point3::new(p.x as f64, p.y as f64, p.z as f64)
}

fn quaternion_f64(q: na::UnitQuaternion<f32>) -> na::UnitQuaternion<f64> {
    let q = q.quaternion();
    na::UnitQuaternion::from_quaternion(na::Quaternion::new(
        q.w as f64, q.i as f64, q.j as f64, q.k as f64,
    ))
}

fn quaternion_f32(q: na::UnitQuaternion<f64>) -> na::UnitQuaternion<f32> {
    let q = q.quaternion();
    na::UnitQuaternion::from_quaternion(na::Quaternion::new(
        q.w as f32, q.i as f32, q.j as f32, q.k as f32,
    ))
}

struct CubeObject {
    node: SceneNode,
}

impl SceneObject for CubeObject {
    fn position(&self) -> na::Point3<f64> {
        let translation = self.node.data().local_translation();
        point_f64(na::Point3::from(translation.vector))
    }

    fn orientation(&self) -> na::UnitQuaternion<f64> {
        quaternion_f64(self.node.data().local_rotation())
    }

    fn set_position(&mut self, position: na::Point3<f64>) {
        self.node.set_local_translation(na::Translation3::new(
            position.x as f32,
            position.y as f32,
            position.z as f32,
        ));
    }

    fn set_orientation(&mut self, orientation: na::UnitQuaternion<f64>) {
        self.node.set_local_rotation(quaternion_f32(orientation));
    }
}

struct ViewerHost<'a> {
    camera: &'a ArcBall,
    cube: &'a mut CubeObject,
    status: &'a mut String,
}

impl Host for ViewerHost<'_> {
    fn view_state(&self) -> Option<ViewState> {
        Some(ViewState::look_at(
            point_f64(self.camera.eye()),
            point_f64(self.camera.at()),
            na::Vector3::y(),
        ))
    }

    fn active_object(&self) -> Option<String> {
        Some(TARGET_ID.to_owned())
    }

    fn object_mut(&mut self, id: &str) -> Option<&mut dyn SceneObject> {
        if id == TARGET_ID {
            Some(&mut *self.cube)
        } else {
            None
        }
    }

    fn report(&mut self, level: ReportLevel, message: &str) {
        match level {
            ReportLevel::Info => info!("{}", message),
            ReportLevel::Error => error!("{}", message),
        }
        *self.status = message.to_owned();
    }
}

fn add_floor(window: &mut Window) {
    let size = 0.5;
    for i in 0..6 {
        for j in 0..6 {
            let mut tile = window.add_cube(size, 0.001, size);
            if (i + j) % 2 == 0 {
                tile.set_color(0.8, 0.8, 0.8);
            } else {
                tile.set_color(0.3, 0.3, 0.35);
            }
            tile.set_local_translation(na::Translation3::new(
                size * (j as f32 - 2.5),
                -0.5,
                size * (i as f32 - 2.5),
            ));
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
    let mut manager = SessionManager::tcp(config);

    let mut window = Window::new("Tag pose link");
    window.set_background_color(0.5, 0.5, 0.5);
    window.set_light(Light::StickToCamera);
    add_floor(&mut window);

    let mut node = window.add_cube(0.3, 0.2, 0.05);
    node.set_color(0.2, 0.6, 1.0);
    let mut cube = CubeObject { node };
    let mut camera = ArcBall::new(na::Point3::new(0.0, 1.0, 4.0), na::Point3::origin());
    let mut status = String::from("Ctrl+Shift+D to connect");
    let white = na::Point3::new(1.0, 1.0, 1.0);

    while window.render_with_camera(&mut camera) {
        let mut host = ViewerHost {
            camera: &camera,
            cube: &mut cube,
            status: &mut status,
        };
        for mut event in window.events().iter() {
            match event.value {
                WindowEvent::Key(Key::D, Action::Press, modifiers)
                    if modifiers.contains(Modifiers::Control | Modifiers::Shift) =>
                {
                    manager.on_activate_toggle(&mut host);
                    event.inhibited = true;
                }
                WindowEvent::Scroll(_, y, _) if y != 0.0 => {
                    let direction = if y > 0.0 {
                        ScrollDirection::Up
                    } else {
                        ScrollDirection::Down
                    };
                    if manager.on_scroll(direction) == EventDisposition::Consumed {
                        event.inhibited = true;
                    }
                }
                _ => {}
            }
        }
        manager.poll(&mut host, Instant::now());

        let text = format!(
            "{}\nscale: {:.3}  {}",
            status,
            manager.scale(),
            if manager.is_active() { "connected" } else { "idle" }
        );
        window.draw_text(
            &text,
            &na::Point2::new(1.0, 1.0),
            40.0,
            &kiss3d::text::Font::default(),
            &white,
        );
    }
    manager.stop(&mut ViewerHost {
        camera: &camera,
        cube: &mut cube,
        status: &mut status,
    });
    Ok(())
}
