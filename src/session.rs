use crate::config::LinkConfig;
use crate::error::{LinkError, Result};
use crate::integrator::PoseIntegrator;
use crate::poller::{ByteSource, SocketPoller, TcpByteSource};
use crate::scene::{Host, ReportLevel};
use crate::wire::PosePacket;
use log::*;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Active,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
}

/// Whether the host should keep processing an input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventDisposition {
    Consumed,
    PassThrough,
}

/// Multiplier on tag translation deltas, adjusted with the scroll wheel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactor {
    value: f64,
    step: f64,
}

impl ScaleFactor {
    pub fn new(value: f64, step: f64) -> Self {
        Self { value, step }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Scrolling down grows the scale, scrolling up shrinks it by the same ratio.
    pub fn scroll(&mut self, direction: ScrollDirection) {
        match direction {
            ScrollDirection::Down => self.value *= self.step,
            ScrollDirection::Up => self.value /= self.step,
        }
        debug!("Tag location scale set to {:.4}", self.value);
    }
}

/// Opens the byte source a session reads from.
pub trait Connector {
    type Source: ByteSource;

    fn connect(&mut self, address: &str) -> Result<Self::Source>;
}

pub struct TcpConnector;

impl Connector for TcpConnector {
    type Source = TcpByteSource;

    fn connect(&mut self, address: &str) -> Result<TcpByteSource> {
        TcpByteSource::connect(address)
    }
}

struct PollTimer {
    interval: Duration,
    next: Instant,
}

impl PollTimer {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    fn due(&mut self, now: Instant) -> bool {
        if now < self.next {
            return false;
        }
        self.next = now + self.interval;
        true
    }
}

/// One connection to the tag location server driving one bound object.
pub struct Session<S> {
    state: SessionState,
    address: String,
    read_chunk: usize,
    poll_interval: Duration,
    poller: Option<SocketPoller<S>>,
    timer: Option<PollTimer>,
    integrator: PoseIntegrator,
}

impl<S: ByteSource> Session<S> {
    pub fn new(config: &LinkConfig) -> Self {
        Self {
            state: SessionState::Idle,
            address: config.address.clone(),
            read_chunk: config.read_chunk,
            poll_interval: config.poll_interval(),
            poller: None,
            timer: None,
            integrator: PoseIntegrator::new(config.bound_tag.clone()),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn integrator(&self) -> &PoseIntegrator {
        &self.integrator
    }

    pub fn start<C>(&mut self, connector: &mut C, host: &mut dyn Host) -> Result<()>
    where
        C: Connector<Source = S>,
    {
        if self.state != SessionState::Idle {
            return Ok(());
        }
        self.state = SessionState::Connecting;
        host.report(ReportLevel::Info, "Starting socket listener");
        match connector.connect(&self.address) {
            Ok(source) => {
                self.poller = Some(SocketPoller::new(source, self.read_chunk));
                self.timer = Some(PollTimer::new(self.poll_interval));
                self.state = SessionState::Active;
                info!(
                    "Listening for tag \"{}\" every {:?}",
                    self.integrator.bound_tag(),
                    self.poll_interval
                );
                Ok(())
            }
            Err(error) => {
                self.fail(host, &error);
                Err(error)
            }
        }
    }

    /// Starts an idle session, stops an active one.
    pub fn on_activate_toggle<C>(&mut self, connector: &mut C, host: &mut dyn Host) -> SessionState
    where
        C: Connector<Source = S>,
    {
        match self.state {
            SessionState::Idle => {
                // failures are already reported to the host
                let _ = self.start(connector, host);
            }
            SessionState::Active => {
                host.report(ReportLevel::Info, "Stopping socket listener");
                self.cancel();
            }
            SessionState::Connecting | SessionState::Cancelled => {}
        }
        self.state
    }

    /// True when the poll period has elapsed since the last tick.
    pub fn is_due(&mut self, now: Instant) -> bool {
        match self.timer.as_mut() {
            Some(timer) => timer.due(now),
            None => false,
        }
    }

    /// Drains the socket once and applies every complete packet.
    pub fn on_tick(&mut self, host: &mut dyn Host, scale: f64) -> EventDisposition {
        if self.state != SessionState::Active {
            return EventDisposition::PassThrough;
        }
        if let Err(error) = self.drain(host, scale) {
            self.fail(host, &error);
        }
        EventDisposition::Consumed
    }

    pub fn on_scroll(
        &mut self,
        direction: ScrollDirection,
        scale: &mut ScaleFactor,
    ) -> EventDisposition {
        if self.state != SessionState::Active {
            return EventDisposition::PassThrough;
        }
        scale.scroll(direction);
        EventDisposition::Consumed
    }

    /// Releases the socket and the timer. Safe to call any number of times.
    pub fn cancel(&mut self) {
        if self.poller.take().is_some() {
            debug!("Session for tag \"{}\" cancelled", self.integrator.bound_tag());
        }
        self.timer = None;
        self.state = SessionState::Cancelled;
    }

    fn drain(&mut self, host: &mut dyn Host, scale: f64) -> Result<()> {
        let poller = match self.poller.as_mut() {
            Some(poller) => poller,
            None => return Ok(()),
        };
        if !poller.fill()? {
            return Ok(());
        }
        while let Some(line) = poller.next_line() {
            let packet = PosePacket::deserialize(&line?)?;
            self.integrator.handle(&packet, host, scale)?;
        }
        Ok(())
    }

    fn fail(&mut self, host: &mut dyn Host, error: &LinkError) {
        if error.is_informational() {
            info!("{}", error);
            host.report(ReportLevel::Info, &error.to_string());
        } else {
            error!("{}", error);
            host.report(ReportLevel::Error, &error.to_string());
        }
        self.cancel();
    }
}

/// Owns the single live session of a host along with the scale that outlives it.
pub struct SessionManager<C: Connector> {
    connector: C,
    config: LinkConfig,
    scale: ScaleFactor,
    session: Option<Session<C::Source>>,
}

impl SessionManager<TcpConnector> {
    pub fn tcp(config: LinkConfig) -> Self {
        Self::new(TcpConnector, config)
    }
}

impl<C: Connector> SessionManager<C> {
    pub fn new(connector: C, config: LinkConfig) -> Self {
        let scale = ScaleFactor::new(config.initial_scale, config.scale_step());
        Self {
            connector,
            config,
            scale,
            session: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.session
            .as_ref()
            .map_or(false, |session| session.state() == SessionState::Active)
    }

    pub fn session(&self) -> Option<&Session<C::Source>> {
        self.session.as_ref()
    }

    pub fn scale(&self) -> f64 {
        self.scale.value()
    }

    /// Opens a session unless one is already running.
    pub fn start(&mut self, host: &mut dyn Host) -> Result<()> {
        if self.is_active() {
            return Ok(());
        }
        let mut session = Session::new(&self.config);
        session.start(&mut self.connector, host)?;
        self.session = Some(session);
        Ok(())
    }

    pub fn stop(&mut self, host: &mut dyn Host) {
        if let Some(mut session) = self.session.take() {
            if session.state() == SessionState::Active {
                session.on_activate_toggle(&mut self.connector, host);
            }
            session.cancel();
        }
    }

    pub fn on_activate_toggle(&mut self, host: &mut dyn Host) -> bool {
        if self.is_active() {
            self.stop(host);
        } else {
            // failures are already reported to the host
            let _ = self.start(host);
        }
        self.is_active()
    }

    pub fn on_tick(&mut self, host: &mut dyn Host) -> EventDisposition {
        let scale = self.scale.value();
        let disposition = match self.session.as_mut() {
            Some(session) => session.on_tick(host, scale),
            None => EventDisposition::PassThrough,
        };
        self.reap();
        disposition
    }

    /// Ticks the session if its poll period has elapsed.
    pub fn poll(&mut self, host: &mut dyn Host, now: Instant) -> EventDisposition {
        let due = match self.session.as_mut() {
            Some(session) => session.is_due(now),
            None => false,
        };
        if due {
            self.on_tick(host)
        } else {
            EventDisposition::PassThrough
        }
    }

    pub fn on_scroll(&mut self, direction: ScrollDirection) -> EventDisposition {
        match self.session.as_mut() {
            Some(session) => session.on_scroll(direction, &mut self.scale),
            None => EventDisposition::PassThrough,
        }
    }

    fn reap(&mut self) {
        if let Some(session) = &self.session {
            if session.state() == SessionState::Cancelled {
                self.session = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrator::tests::TestHost;
    use crate::scene::{SimpleObject, ViewState};
    use nalgebra as na;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::io;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct Wire {
        chunks: Rc<RefCell<VecDeque<io::Result<Vec<u8>>>>>,
        released: Rc<Cell<usize>>,
    }

    impl Wire {
        fn send(&self, data: &str) {
            self.chunks.borrow_mut().push_back(Ok(data.as_bytes().to_vec()));
        }

        fn close(&self) {
            self.chunks.borrow_mut().push_back(Ok(vec![]));
        }

        fn break_down(&self) {
            self.chunks
                .borrow_mut()
                .push_back(Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")));
        }
    }

    struct MockSource {
        wire: Wire,
    }

    impl ByteSource for MockSource {
        fn poll_read(&mut self, buf: &mut [u8]) -> io::Result<Option<usize>> {
            match self.wire.chunks.borrow_mut().pop_front() {
                Some(Ok(data)) => {
                    buf[..data.len()].copy_from_slice(&data);
                    Ok(Some(data.len()))
                }
                Some(Err(error)) => Err(error),
                None => Ok(None),
            }
        }
    }

    impl Drop for MockSource {
        fn drop(&mut self) {
            self.wire.released.set(self.wire.released.get() + 1);
        }
    }

    struct MockConnector {
        wire: Wire,
        refuse: bool,
        connects: usize,
    }

    impl MockConnector {
        fn new(wire: &Wire) -> Self {
            Self {
                wire: wire.clone(),
                refuse: false,
                connects: 0,
            }
        }
    }

    impl Connector for MockConnector {
        type Source = MockSource;

        fn connect(&mut self, address: &str) -> Result<MockSource> {
            if self.refuse {
                return Err(LinkError::Connect {
                    address: address.to_owned(),
                    source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
                });
            }
            self.connects += 1;
            Ok(MockSource {
                wire: self.wire.clone(),
            })
        }
    }

    fn host() -> TestHost {
        TestHost::new(ViewState::new(
            na::Point3::origin(),
            na::UnitQuaternion::identity(),
            10.0,
        ))
    }

    const FIRST: &str = "{\"name\":\"simple tag\",\"transform\":{\"t\":[1,0,0],\"rq\":[0,0,0,1]}}\n";
    const MOVED: &str = "{\"name\":\"simple tag\",\"transform\":{\"t\":[1,1,0],\"rq\":[0,0,0,1]}}\n";

    fn started(wire: &Wire, host: &mut TestHost) -> SessionManager<MockConnector> {
        let mut manager = SessionManager::new(MockConnector::new(wire), LinkConfig::default());
        manager.start(host).unwrap();
        assert!(manager.is_active());
        manager
    }

    #[test]
    fn test_scale_round_trip() {
        let mut scale = ScaleFactor::new(0.2, LinkConfig::default().scale_step());
        for _ in 0..25 {
            scale.scroll(ScrollDirection::Up);
        }
        assert!(scale.value() < 0.2);
        for _ in 0..25 {
            scale.scroll(ScrollDirection::Down);
        }
        assert!((scale.value() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_packets_move_object() {
        let wire = Wire::default();
        let mut host = host();
        let mut manager = started(&wire, &mut host);
        wire.send(FIRST);
        assert_eq!(manager.on_tick(&mut host), EventDisposition::Consumed);
        assert_eq!(host.cube(), &SimpleObject::default());
        wire.send(MOVED);
        manager.on_tick(&mut host);
        let expected = na::Point3::new(0.0, 0.2, 0.0);
        assert!((host.cube().position - expected).norm() < 1e-9);
        assert!(manager.is_active());
    }

    #[test]
    fn test_message_split_across_ticks() {
        let wire = Wire::default();
        let mut host = host();
        let mut manager = started(&wire, &mut host);
        let stream = format!("{}{}", FIRST, MOVED);
        for chunk in stream.as_bytes().chunks(7) {
            wire.send(std::str::from_utf8(chunk).unwrap());
            manager.on_tick(&mut host);
        }
        assert!((host.cube().position - na::Point3::new(0.0, 0.2, 0.0)).norm() < 1e-9);
        assert!(host.reports.iter().all(|(level, _)| *level == ReportLevel::Info));
    }

    #[test]
    fn test_idle_tick_does_nothing() {
        let wire = Wire::default();
        let mut host = host();
        let mut manager = started(&wire, &mut host);
        assert_eq!(manager.on_tick(&mut host), EventDisposition::Consumed);
        assert!(manager.is_active());
        assert_eq!(wire.released.get(), 0);
    }

    #[test]
    fn test_peer_close_cancels_once() {
        let wire = Wire::default();
        let mut host = host();
        let mut manager = started(&wire, &mut host);
        wire.close();
        manager.on_tick(&mut host);
        assert!(!manager.is_active());
        assert!(manager.session().is_none());
        assert_eq!(wire.released.get(), 1);
        assert_eq!(
            host.reports.last().unwrap(),
            &(ReportLevel::Info, "Socket closed by remote".to_owned())
        );
        manager.stop(&mut host);
        assert_eq!(wire.released.get(), 1);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let wire = Wire::default();
        let mut host = host();
        let mut connector = MockConnector::new(&wire);
        let mut session = Session::new(&LinkConfig::default());
        session.start(&mut connector, &mut host).unwrap();
        session.cancel();
        session.cancel();
        assert_eq!(session.state(), SessionState::Cancelled);
        assert_eq!(wire.released.get(), 1);
        assert_eq!(session.on_tick(&mut host, 1.0), EventDisposition::PassThrough);
        drop(session);
        assert_eq!(wire.released.get(), 1);
    }

    #[test]
    fn test_transport_error_is_reported() {
        let wire = Wire::default();
        let mut host = host();
        let mut manager = started(&wire, &mut host);
        wire.break_down();
        manager.on_tick(&mut host);
        assert!(!manager.is_active());
        let (level, message) = host.reports.last().unwrap();
        assert_eq!(*level, ReportLevel::Error);
        assert!(message.contains("ConnectionReset"));
    }

    #[test]
    fn test_invalid_json_cancels_without_mutation() {
        let wire = Wire::default();
        let mut host = host();
        let mut manager = started(&wire, &mut host);
        wire.send(FIRST);
        manager.on_tick(&mut host);
        wire.send("{\"name\": \"simple tag\", \"transform\": \n");
        manager.on_tick(&mut host);
        assert!(!manager.is_active());
        assert_eq!(host.cube(), &SimpleObject::default());
        assert_eq!(host.reports.last().unwrap().0, ReportLevel::Error);
        assert_eq!(wire.released.get(), 1);
    }

    #[test]
    fn test_packet_without_transform_cancels() {
        let wire = Wire::default();
        let mut host = host();
        let mut manager = started(&wire, &mut host);
        wire.send(FIRST);
        manager.on_tick(&mut host);
        assert!(manager.is_active());
        wire.send("{\"name\":\"simple tag\"}\n");
        manager.on_tick(&mut host);
        assert!(!manager.is_active());
        assert_eq!(host.cube(), &SimpleObject::default());
        assert_eq!(host.reports.last().unwrap().0, ReportLevel::Error);
        assert_eq!(wire.released.get(), 1);
    }

    #[test]
    fn test_toggle_stops_running_session() {
        let wire = Wire::default();
        let mut host = host();
        let mut manager = SessionManager::new(MockConnector::new(&wire), LinkConfig::default());
        assert!(manager.on_activate_toggle(&mut host));
        assert!(!manager.on_activate_toggle(&mut host));
        assert_eq!(wire.released.get(), 1);
        assert_eq!(
            host.reports.last().unwrap(),
            &(ReportLevel::Info, "Stopping socket listener".to_owned())
        );
        assert!(manager.on_activate_toggle(&mut host));
        assert_eq!(manager.connector.connects, 2);
    }

    #[test]
    fn test_second_start_keeps_single_session() {
        let wire = Wire::default();
        let mut host = host();
        let mut manager = started(&wire, &mut host);
        manager.start(&mut host).unwrap();
        assert_eq!(manager.connector.connects, 1);
    }

    #[test]
    fn test_refused_connection() {
        let wire = Wire::default();
        let mut host = host();
        let mut connector = MockConnector::new(&wire);
        connector.refuse = true;
        let mut manager = SessionManager::new(connector, LinkConfig::default());
        assert!(matches!(
            manager.start(&mut host),
            Err(LinkError::Connect { .. })
        ));
        assert!(!manager.is_active());
        assert_eq!(host.reports.last().unwrap().0, ReportLevel::Error);
    }

    #[test]
    fn test_scroll_only_while_active() {
        let wire = Wire::default();
        let mut host = host();
        let mut manager = SessionManager::new(MockConnector::new(&wire), LinkConfig::default());
        assert_eq!(
            manager.on_scroll(ScrollDirection::Down),
            EventDisposition::PassThrough
        );
        assert_eq!(manager.scale(), 0.2);
        manager.start(&mut host).unwrap();
        assert_eq!(
            manager.on_scroll(ScrollDirection::Down),
            EventDisposition::Consumed
        );
        assert!(manager.scale() > 0.2);
    }

    #[test]
    fn test_scale_outlives_session() {
        let wire = Wire::default();
        let mut host = host();
        let mut manager = started(&wire, &mut host);
        manager.on_scroll(ScrollDirection::Down);
        let scale = manager.scale();
        manager.stop(&mut host);
        manager.start(&mut host).unwrap();
        assert_eq!(manager.scale(), scale);
    }

    #[test]
    fn test_recalibrates_after_restart() {
        let wire = Wire::default();
        let mut host = host();
        let mut manager = started(&wire, &mut host);
        wire.send(FIRST);
        wire.send(MOVED);
        manager.on_tick(&mut host);
        manager.on_tick(&mut host);
        let moved = host.cube().clone();
        manager.stop(&mut host);
        manager.start(&mut host).unwrap();
        wire.send(MOVED);
        manager.on_tick(&mut host);
        assert_eq!(host.cube(), &moved);
        let snapshot = manager.session().unwrap().integrator().snapshot().unwrap();
        assert_eq!(snapshot.tag_translation, na::Vector3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn test_poll_respects_interval() {
        let wire = Wire::default();
        let mut host = host();
        let mut manager = started(&wire, &mut host);
        let now = Instant::now() + Duration::from_millis(1);
        assert_eq!(manager.poll(&mut host, now), EventDisposition::Consumed);
        assert_eq!(manager.poll(&mut host, now), EventDisposition::PassThrough);
        assert_eq!(
            manager.poll(&mut host, now + Duration::from_millis(25)),
            EventDisposition::Consumed
        );
    }
}
