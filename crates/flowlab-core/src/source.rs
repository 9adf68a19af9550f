//! Constant-bitrate traffic source.
//!
//! On start the source binds and connects its socket, sends one unit right
//! away and then re-arms a single timer every `unit_size * 8 / rate` seconds
//! until the shared [`Deadline`] passes or the source is stopped.

use crate::error::SourceError;
use bytes::BytesMut;
use flowlab_abstract::{
    Address, Application, DataRate, EventId, SimContext, SimTime, SocketId, TransportError,
};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info};

const SEND_TIMER: u32 = 1;

/// Emission deadline shared by all sources of one run.
///
/// Sources read it at every cycle, so moving it between cycles takes effect
/// on the next one.
#[derive(Debug, Clone)]
pub struct Deadline(Rc<Cell<SimTime>>);

impl Deadline {
    pub fn at(time: SimTime) -> Self {
        Self(Rc::new(Cell::new(time)))
    }

    pub fn unbounded() -> Self {
        Self::at(Duration::MAX)
    }

    pub fn get(&self) -> SimTime {
        self.0.get()
    }

    pub fn set(&self, time: SimTime) {
        self.0.set(time);
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::unbounded()
    }
}

struct Binding {
    socket: SocketId,
    peer: Address,
    unit_size: u32,
    rate: DataRate,
}

pub struct TrafficSource {
    binding: Option<Binding>,
    deadline: Deadline,
    running: bool,
    pending_event: Option<EventId>,
    units_sent: u64,
}

impl TrafficSource {
    /// Create an unconfigured source; call [`TrafficSource::configure`]
    /// before handing it to the engine.
    pub fn new(deadline: Deadline) -> Self {
        Self {
            binding: None,
            deadline,
            running: false,
            pending_event: None,
            units_sent: 0,
        }
    }

    pub fn configure(
        &mut self,
        socket: SocketId,
        peer: Address,
        unit_size: u32,
        rate: DataRate,
    ) -> Result<(), SourceError> {
        if self.binding.is_some() {
            return Err(SourceError::invalid("source is already configured"));
        }
        if unit_size == 0 {
            return Err(SourceError::invalid("unit size must be positive"));
        }
        // Written so that NaN is rejected too.
        if !(rate.bps() > 0.0) {
            return Err(SourceError::invalid(format!(
                "target rate must be positive, got {rate}"
            )));
        }
        self.binding = Some(Binding {
            socket,
            peer,
            unit_size,
            rate,
        });
        Ok(())
    }

    /// Gap between two consecutive units, or `None` before configuration.
    pub fn interval(&self) -> Option<Duration> {
        self.binding
            .as_ref()
            .map(|b| b.rate.transmission_time(b.unit_size))
    }

    pub fn units_sent(&self) -> u64 {
        self.units_sent
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn has_pending_event(&self) -> bool {
        self.pending_event.is_some()
    }

    fn send_unit(&mut self, ctx: &mut dyn SimContext) -> Result<(), TransportError> {
        let binding = self.binding.as_ref().ok_or(TransportError::NoSocket)?;
        let unit = BytesMut::zeroed(binding.unit_size as usize).freeze();
        self.units_sent += 1;
        ctx.send(&binding.socket, unit).map(|_| ())
    }

    fn schedule_next(&mut self, ctx: &mut dyn SimContext) {
        if !self.running {
            return;
        }
        let Some(interval) = self.interval() else {
            return;
        };
        debug_assert!(
            self.pending_event.is_none(),
            "traffic source already has a pending send"
        );
        self.pending_event = Some(ctx.schedule_after(interval, SEND_TIMER));
    }

    /// One cycle: send a unit, then re-arm unless the deadline has passed.
    /// A failed send is reported to the caller but does not stop pacing.
    fn emit(&mut self, ctx: &mut dyn SimContext) -> Result<(), TransportError> {
        let sent = self.send_unit(ctx);
        if ctx.now() < self.deadline.get() {
            self.schedule_next(ctx);
        }
        sent
    }
}

impl Application for TrafficSource {
    fn start(&mut self, ctx: &mut dyn SimContext) -> Result<(), TransportError> {
        let binding = self.binding.as_ref().ok_or(TransportError::NoSocket)?;
        let local = ctx.bind(&binding.socket)?;
        ctx.connect(&binding.socket, binding.peer)?;
        self.running = true;
        self.units_sent = 0;
        info!(
            %local,
            peer = %binding.peer,
            rate = %binding.rate,
            unit_size = binding.unit_size,
            "traffic source started"
        );
        self.emit(ctx)
    }

    fn stop(&mut self, ctx: &mut dyn SimContext) {
        self.running = false;
        if let Some(event) = self.pending_event.take() {
            ctx.cancel(event);
        }
        if let Some(binding) = &self.binding {
            ctx.close(&binding.socket);
            ctx.record_metric("units_sent", self.units_sent as f64);
        }
        debug!(units_sent = self.units_sent, "traffic source stopped");
    }

    fn on_timer(&mut self, ctx: &mut dyn SimContext, timer_id: u32) -> Result<(), TransportError> {
        if timer_id != SEND_TIMER {
            return Ok(());
        }
        self.pending_event = None;
        self.emit(ctx)
    }
}
