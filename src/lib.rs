pub mod config;
pub mod error;
pub mod integrator;
pub mod poller;
pub mod scene;
pub mod session;
pub mod wire;

pub use config::LinkConfig;
pub use error::{LinkError, Result};
pub use session::{EventDisposition, ScrollDirection, Session, SessionManager, SessionState};
