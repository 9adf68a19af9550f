use crate::monitor::FlowMonitor;
use crate::trace::{SimulationReport, SinkReport};
use bytes::Bytes;
use flowlab_abstract::{
    Address, Application, EventId, FlowStats, NodeId, Packet, SegmentHeader, SimConfig,
    SimContext, SimTime, SocketId, TransportError, flags,
};
use flowlab_core::TraceCounters;
use rand::Rng;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info, warn};

const EPHEMERAL_PORT_BASE: u16 = 49152;

/// Convert seconds from configuration into simulated time. Negative and NaN
/// inputs clamp to zero, values beyond `Duration` saturate.
pub fn sim_time(secs: f64) -> SimTime {
    Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AppId(pub usize);

#[derive(Debug)]
pub enum EventType {
    AppStart {
        app: AppId,
    },
    AppStop {
        app: AppId,
    },
    Timer {
        app: AppId,
        timer_id: u32,
        event: EventId,
    },
    PacketArrival {
        packet: Packet,
    },
}

#[derive(Debug)]
struct Event {
    time: SimTime,
    event_type: EventType,
    id: u64, // Unique ID to differentiate events at same time
}

// Custom Ord for Min-Heap (smallest time pops first)
impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.id == other.id
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse comparison for time: smallest time is Greater in BinaryHeap
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// A compact textual summary of notable link and application events.
#[derive(Debug, Clone, Serialize)]
pub struct LinkEventSummary {
    pub time_secs: f64,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SocketState {
    Open,
    Bound,
    Connected,
    Closed,
}

#[derive(Debug)]
struct Socket {
    node: NodeId,
    local: Option<Address>,
    peer: Option<Address>,
    state: SocketState,
    next_seq: u32,
}

#[derive(Debug, Default)]
struct SocketTable {
    sockets: Vec<Socket>,
    next_port: HashMap<NodeId, u16>,
}

impl SocketTable {
    fn create(&mut self, node: NodeId) -> SocketId {
        self.sockets.push(Socket {
            node,
            local: None,
            peer: None,
            state: SocketState::Open,
            next_seq: 0,
        });
        SocketId::new(self.sockets.len() as u32 - 1)
    }

    fn lookup(&mut self, socket: &SocketId) -> Result<&mut Socket, TransportError> {
        self.sockets
            .get_mut(socket.raw() as usize)
            .ok_or(TransportError::UnknownSocket(socket.raw()))
    }

    fn bind(&mut self, socket: &SocketId) -> Result<Address, TransportError> {
        let entry = self
            .sockets
            .get_mut(socket.raw() as usize)
            .ok_or(TransportError::UnknownSocket(socket.raw()))?;
        match entry.state {
            SocketState::Closed => Err(TransportError::Closed(socket.raw())),
            SocketState::Bound | SocketState::Connected => {
                entry.local.ok_or(TransportError::NotBound(socket.raw()))
            }
            SocketState::Open => {
                let port = self
                    .next_port
                    .entry(entry.node)
                    .or_insert(EPHEMERAL_PORT_BASE);
                let local = Address::new(entry.node, *port);
                *port = port.wrapping_add(1);
                entry.local = Some(local);
                entry.state = SocketState::Bound;
                Ok(local)
            }
        }
    }

    fn connect(&mut self, socket: &SocketId, peer: Address) -> Result<(), TransportError> {
        let raw = socket.raw();
        let entry = self.lookup(socket)?;
        match entry.state {
            SocketState::Closed => Err(TransportError::Closed(raw)),
            SocketState::Open => Err(TransportError::NotBound(raw)),
            SocketState::Bound | SocketState::Connected => {
                entry.peer = Some(peer);
                entry.state = SocketState::Connected;
                Ok(())
            }
        }
    }

    /// Header for the next data segment on a connected socket.
    fn segment(&mut self, socket: &SocketId, now: SimTime) -> Result<SegmentHeader, TransportError> {
        let raw = socket.raw();
        let entry = self.lookup(socket)?;
        match (entry.state, entry.local, entry.peer) {
            (SocketState::Closed, _, _) => Err(TransportError::Closed(raw)),
            (SocketState::Connected, Some(src), Some(dst)) => {
                let seq_num = entry.next_seq;
                entry.next_seq = entry.next_seq.wrapping_add(1);
                Ok(SegmentHeader {
                    src,
                    dst,
                    seq_num,
                    ack_num: 0,
                    flags: flags::PSH,
                    sent_at: now,
                })
            }
            _ => Err(TransportError::NotConnected(raw)),
        }
    }

    fn close(&mut self, socket: &SocketId) {
        if let Ok(entry) = self.lookup(socket) {
            entry.state = SocketState::Closed;
        }
    }
}

/// Actions buffered during an application callback
#[derive(Default)]
struct ActionBuffer {
    outgoing_packets: Vec<Packet>,
    timers_start: Vec<(Duration, u32, EventId)>,
    timers_cancel: Vec<EventId>,
    metrics: Vec<(String, f64)>,
}

/// Context implementation passed to the application
struct ScopedContext<'a> {
    buffer: &'a mut ActionBuffer,
    sockets: &'a mut SocketTable,
    timer_id_counter: &'a mut u64,
    now: SimTime,
}

impl SimContext for ScopedContext<'_> {
    fn now(&self) -> SimTime {
        self.now
    }

    fn schedule_after(&mut self, delay: Duration, timer_id: u32) -> EventId {
        let event = EventId::new(*self.timer_id_counter);
        *self.timer_id_counter += 1;
        self.buffer.timers_start.push((delay, timer_id, event));
        event
    }

    fn cancel(&mut self, event: EventId) {
        self.buffer.timers_cancel.push(event);
    }

    fn bind(&mut self, socket: &SocketId) -> Result<Address, TransportError> {
        self.sockets.bind(socket)
    }

    fn connect(&mut self, socket: &SocketId, peer: Address) -> Result<(), TransportError> {
        self.sockets.connect(socket, peer)
    }

    fn send(&mut self, socket: &SocketId, payload: Bytes) -> Result<usize, TransportError> {
        let header = self.sockets.segment(socket, self.now)?;
        let len = payload.len();
        self.buffer.outgoing_packets.push(Packet::new(header, payload));
        Ok(len)
    }

    fn close(&mut self, socket: &SocketId) {
        self.sockets.close(socket);
    }

    fn record_metric(&mut self, name: &str, value: f64) {
        self.buffer.metrics.push((name.to_string(), value));
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct SinkStats {
    packets: u64,
    bytes: u64,
}

/// Single-threaded discrete-event engine: applications, sockets, one lossy
/// link between any two addresses, packet sinks and a flow monitor.
pub struct Simulator {
    time: SimTime,
    stop_time: SimTime,
    event_queue: BinaryHeap<Event>,
    event_id_counter: u64,
    timer_id_counter: u64,
    /// Timers that were scheduled and neither fired nor got cancelled.
    pending_timers: HashSet<EventId>,

    config: SimConfig,
    rng: rand::rngs::StdRng,

    applications: Vec<Box<dyn Application>>,
    sockets: SocketTable,
    sinks: HashMap<Address, SinkStats>,
    monitor: FlowMonitor,
    counters: TraceCounters,

    /// Samples recorded via `SimContext::record_metric`, keyed by
    /// `app<N>/<name>`. Values are `(time_secs, value)`.
    pub metrics: HashMap<String, Vec<(f64, f64)>>,

    /// Timeline of drops, application lifecycle and transport failures.
    pub link_events: Vec<LinkEventSummary>,

    pub transport_errors: u64,
}

impl Simulator {
    pub fn new(config: SimConfig) -> Self {
        use rand::SeedableRng;
        let rng = rand::rngs::StdRng::seed_from_u64(config.seed);
        let stop_time = sim_time(config.duration_secs);

        Self {
            time: Duration::ZERO,
            stop_time,
            event_queue: BinaryHeap::new(),
            event_id_counter: 0,
            timer_id_counter: 0,
            pending_timers: HashSet::new(),
            config,
            rng,
            applications: Vec::new(),
            sockets: SocketTable::default(),
            sinks: HashMap::new(),
            monitor: FlowMonitor::new(),
            counters: TraceCounters::default(),
            metrics: HashMap::new(),
            link_events: Vec::new(),
            transport_errors: 0,
        }
    }

    pub fn stop_time(&self) -> SimTime {
        self.stop_time
    }

    pub fn create_socket(&mut self, node: NodeId) -> SocketId {
        self.sockets.create(node)
    }

    /// Accept data segments addressed to `address`.
    pub fn install_sink(&mut self, address: Address) {
        self.sinks.entry(address).or_default();
    }

    /// Install an application that starts at `start` and stops at `stop`.
    pub fn add_application(
        &mut self,
        application: Box<dyn Application>,
        start: SimTime,
        stop: SimTime,
    ) -> AppId {
        let app = AppId(self.applications.len());
        self.applications.push(application);
        self.push_event(start, EventType::AppStart { app });
        self.push_event(stop, EventType::AppStop { app });
        app
    }

    /// Stop an application at `at` in addition to its configured stop time.
    pub fn schedule_app_stop(&mut self, app: AppId, at: SimTime) {
        self.push_event(at, EventType::AppStop { app });
    }

    fn push_event(&mut self, time: SimTime, event_type: EventType) {
        self.event_queue.push(Event {
            time,
            event_type,
            id: self.event_id_counter,
        });
        self.event_id_counter += 1;
    }

    pub fn peek_next_event_time(&self) -> Option<SimTime> {
        self.event_queue.peek().map(|e| e.time)
    }

    pub fn current_time(&self) -> SimTime {
        self.time
    }

    pub fn remaining_events(&self) -> usize {
        self.event_queue.len()
    }

    /// Process the next event. Returns false once the queue is empty or the
    /// next event lies beyond the stop time.
    pub fn step(&mut self) -> bool {
        match self.peek_next_event_time() {
            Some(time) if time <= self.stop_time => {}
            _ => return false,
        }
        let event = match self.event_queue.pop() {
            Some(e) => e,
            None => return false,
        };

        self.time = event.time;
        debug!("Processing event at {:?}: {:?}", self.time, event.event_type);

        match event.event_type {
            EventType::AppStart { app } => {
                self.record_link_event(format!("[app{}] START", app.0));
                self.dispatch(app, |application, ctx| application.start(ctx));
            }
            EventType::AppStop { app } => {
                self.record_link_event(format!("[app{}] STOP", app.0));
                self.dispatch(app, |application, ctx| {
                    application.stop(ctx);
                    Ok(())
                });
            }
            EventType::Timer {
                app,
                timer_id,
                event,
            } => {
                if !self.pending_timers.remove(&event) {
                    debug!("Skipping cancelled timer event for timer_id={}", timer_id);
                    return true; // Event processed (by being ignored)
                }
                self.dispatch(app, |application, ctx| application.on_timer(ctx, timer_id));
            }
            EventType::PacketArrival { packet } => self.deliver(packet),
        }
        true
    }

    /// Run until the queue drains or the stop time is reached.
    pub fn run_until_complete(&mut self) {
        while self.step() {}
        self.finish();
    }

    /// Advance the clock to the stop time if events were left beyond it.
    pub fn finish(&mut self) {
        if self.peek_next_event_time().is_some() && self.stop_time != Duration::MAX {
            self.time = self.time.max(self.stop_time);
        }
        info!(
            "Simulation finished at {:.6}s with {} flows, {} transport errors",
            self.time.as_secs_f64(),
            self.monitor.flows().len(),
            self.transport_errors
        );
    }

    /// Flow statistics in creation order.
    pub fn flow_stats(&self) -> &[FlowStats] {
        self.monitor.flows()
    }

    pub fn counters(&self) -> &TraceCounters {
        &self.counters
    }

    /// Run time used for whole-run averages: the stop time when one is set.
    pub fn run_time(&self) -> SimTime {
        if self.stop_time == Duration::MAX {
            self.time
        } else {
            self.stop_time
        }
    }

    /// Produce a serializable snapshot of the current simulation state.
    pub fn export_report(&self) -> SimulationReport {
        let mut sinks: Vec<SinkReport> = self
            .sinks
            .iter()
            .map(|(address, stats)| SinkReport {
                address: *address,
                packets: stats.packets,
                bytes: stats.bytes,
            })
            .collect();
        sinks.sort_by_key(|s| s.address);

        SimulationReport {
            config: self.config.clone(),
            duration_secs: self.time.as_secs_f64(),
            flows: self.monitor.flows().to_vec(),
            counters: self.counters.clone(),
            counter_summary: self.counters.summary(self.run_time()),
            sinks,
            transport_errors: self.transport_errors,
            metrics: self.metrics.clone(),
            link_events: self.link_events.clone(),
        }
    }

    fn dispatch<F>(&mut self, app: AppId, callback: F)
    where
        F: FnOnce(&mut dyn Application, &mut dyn SimContext) -> Result<(), TransportError>,
    {
        let Some(application) = self.applications.get_mut(app.0) else {
            warn!("Event for unknown application {}", app.0);
            return;
        };
        let mut buffer = ActionBuffer::default();
        let result = {
            let mut ctx = ScopedContext {
                buffer: &mut buffer,
                sockets: &mut self.sockets,
                timer_id_counter: &mut self.timer_id_counter,
                now: self.time,
            };
            callback(application.as_mut(), &mut ctx)
        };
        if let Err(err) = result {
            self.transport_errors += 1;
            warn!("[app{}] transport error: {}", app.0, err);
            self.record_link_event(format!("[app{}] TRANSPORT ERROR {}", app.0, err));
        }
        self.process_actions(app, buffer);
    }

    fn process_actions(&mut self, app: AppId, buffer: ActionBuffer) {
        let now_secs = self.time.as_secs_f64();
        for (name, value) in buffer.metrics {
            self.metrics
                .entry(format!("app{}/{}", app.0, name))
                .or_default()
                .push((now_secs, value));
        }

        for (delay, timer_id, event) in buffer.timers_start {
            self.pending_timers.insert(event);
            self.push_event(
                self.time.saturating_add(delay),
                EventType::Timer {
                    app,
                    timer_id,
                    event,
                },
            );
        }

        // Cancellations come after starts so a timer armed and cancelled in
        // the same callback never fires.
        for event in buffer.timers_cancel {
            self.pending_timers.remove(&event);
        }

        for packet in buffer.outgoing_packets {
            if packet.header.is_data() {
                self.counters.record_transport_tx();
            }
            self.transmit(packet);
        }
    }

    /// Put a packet on the link: random loss, then uniform random latency.
    fn transmit(&mut self, packet: Packet) {
        self.monitor.record_tx(&packet, self.time);
        self.counters.record_phy_tx();

        if self.rng.random::<f64>() < self.config.loss_rate {
            self.monitor.record_lost(&packet);
            self.counters.record_phy_drop();
            self.record_link_event(format!(
                "[{}->{}] DROP (random loss) seq={} ack={}",
                packet.header.src, packet.header.dst, packet.header.seq_num, packet.header.ack_num
            ));
            debug!("Packet lost in channel");
            return;
        }

        let lo = self.config.min_latency_ms.min(self.config.max_latency_ms);
        let hi = self.config.min_latency_ms.max(self.config.max_latency_ms);
        let latency = Duration::from_millis(self.rng.random_range(lo..=hi));
        self.push_event(
            self.time.saturating_add(latency),
            EventType::PacketArrival { packet },
        );
    }

    fn deliver(&mut self, packet: Packet) {
        self.counters.record_phy_rx();
        self.monitor.record_rx(&packet, self.time);
        if !packet.header.is_data() {
            return;
        }

        let dst = packet.header.dst;
        match self.sinks.get_mut(&dst) {
            Some(sink) => {
                sink.packets += 1;
                sink.bytes += packet.len() as u64;
                self.counters.record_transport_rx(packet.len());
                if self.config.acknowledge {
                    let ack = Packet::ack_for(&packet.header, self.time);
                    self.transmit(ack);
                }
            }
            None => {
                debug!("No listener at {}, discarding segment", dst);
                self.record_link_event(format!(
                    "[{}->{}] DISCARD (no listener) seq={}",
                    packet.header.src, dst, packet.header.seq_num
                ));
            }
        }
    }

    fn record_link_event(&mut self, description: String) {
        self.link_events.push(LinkEventSummary {
            time_secs: self.time.as_secs_f64(),
            description,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowlab_abstract::DataRate;
    use flowlab_core::{Deadline, TrafficSource};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn quiet_link() -> SimConfig {
        SimConfig {
            loss_rate: 0.0,
            min_latency_ms: 1,
            max_latency_ms: 1,
            seed: 0,
            duration_secs: 10.0,
            acknowledge: false,
        }
    }

    /// Arms the given timers on start and logs the order they fire in.
    struct TimerProbe {
        timers: Vec<(u64, u32)>,
        fired: Rc<RefCell<Vec<(u32, SimTime)>>>,
        cancel_on: Option<(u32, u32)>,
        armed: HashMap<u32, EventId>,
    }

    impl Application for TimerProbe {
        fn start(&mut self, ctx: &mut dyn SimContext) -> Result<(), TransportError> {
            for (delay_ms, timer_id) in self.timers.clone() {
                let event = ctx.schedule_after(Duration::from_millis(delay_ms), timer_id);
                self.armed.insert(timer_id, event);
            }
            Ok(())
        }

        fn stop(&mut self, _ctx: &mut dyn SimContext) {}

        fn on_timer(&mut self, ctx: &mut dyn SimContext, timer_id: u32) -> Result<(), TransportError> {
            self.fired.borrow_mut().push((timer_id, ctx.now()));
            let victim = match self.cancel_on {
                Some((trigger, victim)) if trigger == timer_id => victim,
                _ => return Ok(()),
            };
            if let Some(event) = self.armed.get(&victim) {
                ctx.cancel(*event);
            }
            Ok(())
        }
    }

    fn probe(timers: Vec<(u64, u32)>, cancel_on: Option<(u32, u32)>) -> (TimerProbe, Rc<RefCell<Vec<(u32, SimTime)>>>) {
        let fired = Rc::new(RefCell::new(Vec::new()));
        let app = TimerProbe {
            timers,
            fired: fired.clone(),
            cancel_on,
            armed: HashMap::new(),
        };
        (app, fired)
    }

    #[test]
    fn test_ties_fire_in_scheduling_order() {
        let (app, fired) = probe(vec![(10, 1), (5, 2), (10, 3)], None);
        let mut sim = Simulator::new(quiet_link());
        sim.add_application(Box::new(app), Duration::ZERO, Duration::from_secs(1));
        sim.run_until_complete();

        let order: Vec<u32> = fired.borrow().iter().map(|(id, _)| *id).collect();
        assert_eq!(order, vec![2, 1, 3]);
    }

    #[test]
    fn test_cancel_timer() {
        // Timer 1 at 5ms cancels timer 0 due at 10ms.
        let (app, fired) = probe(vec![(10, 0), (5, 1)], Some((1, 0)));
        let mut sim = Simulator::new(quiet_link());
        sim.add_application(Box::new(app), Duration::ZERO, Duration::from_secs(1));
        sim.run_until_complete();

        let order: Vec<u32> = fired.borrow().iter().map(|(id, _)| *id).collect();
        assert_eq!(order, vec![1], "Cancelled timer should not have fired");
    }

    #[test]
    fn test_events_beyond_stop_time_never_run() {
        let (app, fired) = probe(vec![(5, 1), (20, 2)], None);
        let mut sim = Simulator::new(SimConfig {
            duration_secs: 0.01,
            ..quiet_link()
        });
        sim.add_application(Box::new(app), Duration::ZERO, Duration::from_secs(1));
        sim.run_until_complete();

        assert_eq!(fired.borrow().len(), 1);
        assert_eq!(sim.current_time(), Duration::from_millis(10));
        assert!(sim.remaining_events() > 0);
    }

    fn source_flow(sim: &mut Simulator, unit_size: u32, bps: f64, deadline: &Deadline) -> (TrafficSource, Address) {
        let sink = Address::new(NodeId(1), 8080);
        sim.install_sink(sink);
        let socket = sim.create_socket(NodeId(0));
        let mut source = TrafficSource::new(deadline.clone());
        source
            .configure(socket, sink, unit_size, DataRate::from_bps(bps))
            .unwrap();
        (source, sink)
    }

    /// Logs the time of every callback the wrapped application receives.
    struct CallbackClock<A> {
        inner: A,
        times: Rc<RefCell<Vec<SimTime>>>,
    }

    impl<A: Application> Application for CallbackClock<A> {
        fn start(&mut self, ctx: &mut dyn SimContext) -> Result<(), TransportError> {
            self.times.borrow_mut().push(ctx.now());
            self.inner.start(ctx)
        }

        fn stop(&mut self, ctx: &mut dyn SimContext) {
            self.inner.stop(ctx);
        }

        fn on_timer(&mut self, ctx: &mut dyn SimContext, timer_id: u32) -> Result<(), TransportError> {
            self.times.borrow_mut().push(ctx.now());
            self.inner.on_timer(ctx, timer_id)
        }
    }

    #[test]
    fn test_source_paces_at_exact_interval() {
        let mut sim = Simulator::new(quiet_link());
        let deadline = Deadline::at(sim.stop_time());
        let (source, _) = source_flow(&mut sim, 1000, 1e6, &deadline);
        let times = Rc::new(RefCell::new(Vec::new()));
        let app = CallbackClock {
            inner: source,
            times: times.clone(),
        };
        sim.add_application(Box::new(app), Duration::from_secs(1), Duration::from_secs(2));
        sim.run_until_complete();

        let times = times.borrow();
        assert_eq!(times.len(), 125);
        for (i, at) in times.iter().enumerate() {
            assert_eq!(*at, Duration::from_secs(1) + Duration::from_millis(8) * i as u32);
        }

        // The sent count is sampled once, when the source stops.
        assert_eq!(sim.metrics["app0/units_sent"], vec![(2.0, 125.0)]);

        let flow = &sim.flow_stats()[0];
        assert_eq!(flow.tx_packets, 125);
        assert_eq!(flow.time_first_tx_packet, Duration::from_secs(1));
        assert_eq!(flow.time_last_tx_packet, Duration::from_millis(1992));
    }

    #[test]
    fn test_no_emission_after_stop() {
        let mut sim = Simulator::new(quiet_link());
        let deadline = Deadline::unbounded();
        let (source, _) = source_flow(&mut sim, 1000, 1e6, &deadline);
        let app = sim.add_application(Box::new(source), Duration::ZERO, Duration::from_secs(5));
        sim.schedule_app_stop(app, Duration::from_millis(20));
        sim.run_until_complete();

        let flow = &sim.flow_stats()[0];
        // Units at 0, 8 and 16 ms; the one due at 24 ms was cancelled.
        assert_eq!(flow.tx_packets, 3);
        assert!(flow.time_last_tx_packet < Duration::from_millis(20));
        assert_eq!(sim.transport_errors, 0);
    }

    #[test]
    fn test_acks_form_reverse_flow() {
        let mut sim = Simulator::new(SimConfig {
            acknowledge: true,
            duration_secs: 0.1,
            ..quiet_link()
        });
        let deadline = Deadline::at(sim.stop_time());
        let (source, sink) = source_flow(&mut sim, 1000, 1e6, &deadline);
        sim.add_application(Box::new(source), Duration::ZERO, sim.stop_time());
        sim.run_until_complete();

        let flows = sim.flow_stats();
        assert_eq!(flows.len(), 2);
        assert_eq!(flows[0].flow_id, 1);
        assert_eq!(flows[0].tx_packets, 13);
        assert_eq!(flows[0].rx_packets, 13);
        assert_eq!(flows[0].rx_bytes, 13_000);
        assert_eq!(flows[0].delay_sum, Duration::from_millis(13));
        assert_eq!(flows[1].flow_id, 2);
        assert_eq!(flows[1].rx_packets, 13);
        assert_eq!(flows[1].rx_bytes, 0);

        let report = sim.export_report();
        assert_eq!(report.sinks.len(), 1);
        assert_eq!(report.sinks[0].address, sink);
        assert_eq!(report.sinks[0].packets, 13);
        assert_eq!(report.counters.transport_sent, 13);
        assert_eq!(report.counters.transport_received, 13);
        assert_eq!(report.counters.phy_sent, 26);
    }

    #[test]
    fn test_lossy_link_accounts_every_packet() {
        let mut sim = Simulator::new(SimConfig {
            loss_rate: 0.5,
            seed: 42,
            duration_secs: 0.5,
            ..quiet_link()
        });
        let deadline = Deadline::at(sim.stop_time());
        let (source, _) = source_flow(&mut sim, 1000, 1e6, &deadline);
        sim.add_application(Box::new(source), Duration::ZERO, sim.stop_time());
        sim.run_until_complete();

        let flow = &sim.flow_stats()[0];
        let lost = flow.lost_packets.unwrap();
        assert!(lost > 0);
        assert_eq!(flow.rx_packets + lost, flow.tx_packets);
        assert_eq!(sim.counters().phy_dropped, lost);
    }

    #[test]
    fn test_send_without_connect_is_reported() {
        struct Eager(Option<SocketId>);

        impl Application for Eager {
            fn start(&mut self, ctx: &mut dyn SimContext) -> Result<(), TransportError> {
                let socket = self.0.as_ref().ok_or(TransportError::NoSocket)?;
                ctx.send(socket, Bytes::from_static(b"early")).map(|_| ())
            }

            fn stop(&mut self, _ctx: &mut dyn SimContext) {}

            fn on_timer(&mut self, _ctx: &mut dyn SimContext, _timer_id: u32) -> Result<(), TransportError> {
                Ok(())
            }
        }

        let mut sim = Simulator::new(quiet_link());
        let socket = sim.create_socket(NodeId(0));
        sim.add_application(Box::new(Eager(Some(socket))), Duration::ZERO, Duration::from_secs(1));
        sim.run_until_complete();

        assert_eq!(sim.transport_errors, 1);
        assert!(sim.flow_stats().is_empty());
    }

    #[test]
    fn test_socket_state_machine() {
        let mut table = SocketTable::default();
        let first = table.create(NodeId(3));
        let second = table.create(NodeId(3));
        let peer = Address::new(NodeId(9), 8080);

        assert_eq!(table.connect(&first, peer), Err(TransportError::NotBound(0)));
        assert_eq!(table.bind(&first), Ok(Address::new(NodeId(3), 49152)));
        assert_eq!(table.bind(&second), Ok(Address::new(NodeId(3), 49153)));
        assert_eq!(
            table.segment(&first, Duration::ZERO),
            Err(TransportError::NotConnected(0))
        );

        table.connect(&first, peer).unwrap();
        let header = table.segment(&first, Duration::ZERO).unwrap();
        assert_eq!(header.dst, peer);
        assert_eq!(header.seq_num, 0);
        assert_eq!(table.segment(&first, Duration::ZERO).unwrap().seq_num, 1);

        table.close(&first);
        assert_eq!(
            table.segment(&first, Duration::ZERO),
            Err(TransportError::Closed(0))
        );
        assert_eq!(table.bind(&SocketId::new(7)), Err(TransportError::UnknownSocket(7)));
    }
}
