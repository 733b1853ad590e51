//! CSMA/CA medium access.
//!
//! The MAC owns a device's transmit queue and decides when the head of the
//! queue goes on the air. With [`MacType::Adhoc`] it follows the DCF
//! discipline:
//!
//! ```text
//! Idle -> Sensing --(DIFS idle)--> Transmitting -> Idle
//!   |        |
//!   |        +--(medium busy)--> Backoff --(idle again)--> Sensing
//!   +--(medium busy on arrival)--> Backoff
//! ```
//!
//! Backoff slots are drawn uniformly from `0..=cw` and only count down
//! after the medium has been idle for DIFS; a busy medium freezes the
//! countdown. Carrier sense is not instantaneous: a signal is only seen
//! once its first bit has propagated to the device, so two stations that
//! finish sensing at the same instant both transmit and collide.
//!
//! When the RTS/CTS threshold is non-zero, data frames of at least that
//! size are preceded by an RTS/CTS exchange. Overheard RTS and CTS frames
//! set the NAV. Unicast data is not acknowledged, so a collided data frame
//! is simply lost.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

use super::frame::{Frame, FrameKind, MacAddress, CTS_SIZE};
use super::phy::{Phy, RxOutcome, SignalId};
use super::rate::{airtime, RateControl};
use crate::flowmon::DropReason;
use crate::ip::Datagram;
use crate::sim::{EventId, SimTime};

/// MAC variants. Selected by configuration, never by name lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MacType {
    /// Ad-hoc station with carrier sense and binary exponential backoff.
    #[default]
    Adhoc,
    /// No carrier sense: transmit as soon as the queue has something.
    Aloha,
}

/// MAC timing and policy. Defaults follow 802.11a OFDM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacParameters {
    pub mac_type: MacType,
    #[serde(with = "humantime_serde")]
    pub slot: Duration,
    #[serde(with = "humantime_serde")]
    pub sifs: Duration,
    pub cw_min: u32,
    pub cw_max: u32,
    /// 0 disables RTS/CTS; otherwise data frames of at least this many
    /// bytes use the handshake.
    pub rts_cts_threshold: u32,
    /// RTS attempts before the frame is dropped.
    pub retry_limit: u32,
    /// Frames held in the transmit queue before tail drop.
    pub queue_limit: usize,
}

impl Default for MacParameters {
    fn default() -> Self {
        Self {
            mac_type: MacType::Adhoc,
            slot: Duration::from_micros(9),
            sifs: Duration::from_micros(16),
            cw_min: 15,
            cw_max: 1023,
            rts_cts_threshold: 0,
            retry_limit: 7,
            queue_limit: 100,
        }
    }
}

impl MacParameters {
    pub fn slot_time(&self) -> SimTime {
        self.slot.into()
    }

    pub fn sifs_time(&self) -> SimTime {
        self.sifs.into()
    }

    /// DIFS = SIFS + 2 slots.
    pub fn difs_time(&self) -> SimTime {
        self.sifs_time() + self.slot_time().mul(2)
    }

    fn uses_rts(&self, frame: &Frame) -> bool {
        self.rts_cts_threshold > 0 && frame.is_data() && frame.size() >= self.rts_cts_threshold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MacState {
    Idle,
    /// Waiting for the medium to stay idle for DIFS.
    Sensing,
    /// Holding backoff slots; counting down if a timer is armed, frozen
    /// otherwise.
    Backoff,
    /// Own RTS or data frame on the air.
    Transmitting,
    /// RTS sent, waiting for the CTS.
    WaitCts,
}

/// Timers the MAC arms through its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacTimer {
    Difs,
    BackoffDone,
    TxEnd,
    CtsTimeout,
    SendCts,
    SendData,
    NavEnd,
}

/// What the MAC asks of the world around it.
#[derive(Debug, Clone)]
pub enum MacOutput {
    /// Put `frame` on the channel for `duration`.
    Transmit { signal: SignalId, frame: Frame, duration: SimTime },
    /// An intact data frame for this device.
    Deliver(Datagram),
    /// A data frame that will never be delivered.
    Drop { datagram: Datagram, reason: DropReason },
}

/// Services a MAC needs from the simulation: the clock, timers, random
/// backoff draws and an outbox for its outputs.
pub trait MacContext {
    fn now(&self) -> SimTime;
    fn start_timer(&mut self, delay: SimTime, timer: MacTimer) -> EventId;
    fn cancel_timer(&mut self, id: EventId);
    /// Uniform draw from `0..=cw`.
    fn backoff_slots(&mut self, cw: u32) -> u32;
    fn next_signal(&mut self) -> SignalId;
    fn emit(&mut self, output: MacOutput);
}

/// Fixed capability set every MAC variant offers.
pub trait MacStrategy {
    fn configure(&mut self, params: MacParameters, rate: RateControl);
    /// Start channel access for the head of the queue. Only legal from
    /// [`MacState::Idle`]; returns whether access was started.
    fn attempt_transmit(&mut self, ctx: &mut dyn MacContext) -> bool;
    /// An intact frame finished arriving.
    fn on_frame_received(&mut self, frame: Frame, ctx: &mut dyn MacContext);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnAir {
    Rts,
    Data,
    Cts,
}

/// Per-device MAC and PHY state.
#[derive(Debug)]
pub struct Mac {
    address: MacAddress,
    params: MacParameters,
    rate: RateControl,
    phy: Phy,
    state: MacState,
    queue: VecDeque<Frame>,
    cw: u32,
    backoff_slots: Option<u32>,
    countdown_started: Option<SimTime>,
    access_timer: Option<EventId>,
    on_air: Option<OnAir>,
    retries: u32,
    nav_until: SimTime,
    pending_cts: Option<Frame>,
    queue_drops: u64,
}

impl Mac {
    pub fn new(address: MacAddress, params: MacParameters, rate: RateControl) -> Self {
        let cw = params.cw_min;
        Self {
            address,
            params,
            rate,
            phy: Phy::default(),
            state: MacState::Idle,
            queue: VecDeque::new(),
            cw,
            backoff_slots: None,
            countdown_started: None,
            access_timer: None,
            on_air: None,
            retries: 0,
            nav_until: SimTime::ZERO,
            pending_cts: None,
            queue_drops: 0,
        }
    }

    pub fn address(&self) -> MacAddress {
        self.address
    }

    pub fn state(&self) -> MacState {
        self.state
    }

    pub fn phy(&self) -> &Phy {
        &self.phy
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn queue_drops(&self) -> u64 {
        self.queue_drops
    }

    pub fn params(&self) -> &MacParameters {
        &self.params
    }

    /// Physical or virtual carrier sense reports activity.
    pub fn medium_busy(&self, now: SimTime) -> bool {
        self.phy.is_receiving() || self.phy.is_transmitting(now) || self.nav_until > now
    }

    /// Queue a frame and start channel access if the MAC is idle.
    pub fn enqueue(&mut self, frame: Frame, ctx: &mut dyn MacContext) {
        if self.queue.len() >= self.params.queue_limit {
            self.queue_drops += 1;
            log::debug!("{} transmit queue full, dropping frame", self.address);
            if let Some(datagram) = frame.into_datagram() {
                ctx.emit(MacOutput::Drop { datagram, reason: DropReason::QueueOverflow });
            }
            return;
        }
        self.queue.push_back(frame);
        if self.state == MacState::Idle {
            self.attempt_transmit(ctx);
        }
    }

    /// First bit of a signal reached this device.
    pub fn on_rx_start(&mut self, signal: SignalId, frame: Frame, damaged: bool, ctx: &mut dyn MacContext) {
        let now = ctx.now();
        let was_busy = self.medium_busy(now);
        self.phy.begin_rx(now, signal, frame, damaged);
        if !was_busy {
            self.on_medium_busy(ctx);
        }
    }

    /// Last bit of a signal reached this device.
    pub fn on_rx_end(&mut self, signal: SignalId, ctx: &mut dyn MacContext) {
        let Some(outcome) = self.phy.end_rx(signal) else {
            return;
        };
        self.handle_rx_outcome(outcome, ctx);
        if !self.medium_busy(ctx.now()) {
            self.on_medium_idle(ctx);
        }
    }

    pub fn on_timer(&mut self, timer: MacTimer, ctx: &mut dyn MacContext) {
        match timer {
            MacTimer::Difs => self.on_difs(ctx),
            MacTimer::BackoffDone => {
                if self.state == MacState::Backoff && self.access_timer.is_some() {
                    self.access_timer = None;
                    self.backoff_slots = None;
                    self.countdown_started = None;
                    self.start_transmission(ctx);
                }
            }
            MacTimer::TxEnd => self.on_tx_end(ctx),
            MacTimer::CtsTimeout => self.on_cts_timeout(ctx),
            MacTimer::SendCts => {
                let Some(cts) = self.pending_cts.take() else {
                    return;
                };
                // Own access won the race during SIFS.
                if self.on_air.is_none() && !matches!(self.state, MacState::Transmitting | MacState::WaitCts) {
                    self.put_on_air(cts, OnAir::Cts, ctx);
                }
            }
            MacTimer::SendData => {
                if self.state == MacState::WaitCts {
                    self.access_timer = None;
                    match self.queue.pop_front() {
                        Some(frame) => {
                            self.state = MacState::Transmitting;
                            self.put_on_air(frame, OnAir::Data, ctx);
                        }
                        None => self.finish_access(ctx),
                    }
                }
            }
            MacTimer::NavEnd => {
                if !self.medium_busy(ctx.now()) {
                    self.on_medium_idle(ctx);
                }
            }
        }
    }

    fn handle_rx_outcome(&mut self, outcome: RxOutcome, ctx: &mut dyn MacContext) {
        match outcome {
            Ok(frame) => self.on_frame_received(frame, ctx),
            Err((frame, reason)) => {
                if frame.dst == self.address {
                    if let Some(datagram) = frame.into_datagram() {
                        log::trace!("{} lost data frame ({})", self.address, reason);
                        ctx.emit(MacOutput::Drop { datagram, reason });
                    }
                }
            }
        }
    }

    fn carrier_sense(&self) -> bool {
        self.params.mac_type == MacType::Adhoc
    }

    fn draw_backoff(&mut self, ctx: &mut dyn MacContext) {
        if self.backoff_slots.is_none() {
            self.backoff_slots = Some(ctx.backoff_slots(self.cw));
        }
    }

    fn cancel_access_timer(&mut self, ctx: &mut dyn MacContext) {
        if let Some(id) = self.access_timer.take() {
            ctx.cancel_timer(id);
        }
    }

    fn on_medium_busy(&mut self, ctx: &mut dyn MacContext) {
        if !self.carrier_sense() {
            return;
        }
        match self.state {
            MacState::Sensing => {
                self.cancel_access_timer(ctx);
                self.draw_backoff(ctx);
                self.state = MacState::Backoff;
            }
            MacState::Backoff => {
                if self.access_timer.is_some() {
                    self.cancel_access_timer(ctx);
                    // Freeze: keep only the slots that have not elapsed.
                    if let (Some(slots), Some(started)) = (self.backoff_slots, self.countdown_started.take()) {
                        let slot = self.params.slot_time().as_nanos().max(1);
                        let elapsed = (ctx.now() - started).as_nanos() / slot;
                        let remaining = u64::from(slots).saturating_sub(elapsed);
                        self.backoff_slots = Some(remaining as u32);
                    }
                }
            }
            MacState::Idle | MacState::Transmitting | MacState::WaitCts => {}
        }
    }

    fn on_medium_idle(&mut self, ctx: &mut dyn MacContext) {
        if self.state == MacState::Backoff && self.access_timer.is_none() {
            self.state = MacState::Sensing;
            let id = ctx.start_timer(self.params.difs_time(), MacTimer::Difs);
            self.access_timer = Some(id);
        }
    }

    fn on_difs(&mut self, ctx: &mut dyn MacContext) {
        if self.state != MacState::Sensing {
            return;
        }
        self.access_timer = None;
        match self.backoff_slots {
            Some(slots) if slots > 0 => {
                self.state = MacState::Backoff;
                self.countdown_started = Some(ctx.now());
                let delay = self.params.slot_time().mul(u64::from(slots));
                self.access_timer = Some(ctx.start_timer(delay, MacTimer::BackoffDone));
            }
            _ => {
                self.backoff_slots = None;
                self.start_transmission(ctx);
            }
        }
    }

    /// Channel access won: send the head of the queue, or its RTS.
    fn start_transmission(&mut self, ctx: &mut dyn MacContext) {
        let Some(head) = self.queue.front() else {
            self.state = MacState::Idle;
            return;
        };
        self.state = MacState::Transmitting;
        if self.params.uses_rts(head) {
            let sifs = self.params.sifs_time();
            let cts_time = airtime(CTS_SIZE, self.rate.control_rate());
            let data_time = airtime(head.size(), self.rate.data_rate(head.size()));
            let nav = sifs + cts_time + sifs + data_time;
            let rts = Frame::rts(self.address, head.dst, nav);
            self.put_on_air(rts, OnAir::Rts, ctx);
        } else if let Some(frame) = self.queue.pop_front() {
            self.put_on_air(frame, OnAir::Data, ctx);
        }
    }

    fn put_on_air(&mut self, frame: Frame, kind: OnAir, ctx: &mut dyn MacContext) {
        let now = ctx.now();
        let was_busy = self.medium_busy(now);
        let duration = match kind {
            OnAir::Data => airtime(frame.size(), self.rate.data_rate(frame.size())),
            OnAir::Rts | OnAir::Cts => airtime(frame.size(), self.rate.control_rate()),
        };
        self.phy.begin_tx(now, duration);
        self.on_air = Some(kind);
        ctx.start_timer(duration, MacTimer::TxEnd);
        let signal = ctx.next_signal();
        ctx.emit(MacOutput::Transmit { signal, frame, duration });
        if !was_busy {
            self.on_medium_busy(ctx);
        }
    }

    fn on_tx_end(&mut self, ctx: &mut dyn MacContext) {
        match self.on_air.take() {
            Some(OnAir::Rts) => {
                self.state = MacState::WaitCts;
                let timeout = self.params.sifs_time()
                    + airtime(CTS_SIZE, self.rate.control_rate())
                    + self.params.slot_time();
                self.access_timer = Some(ctx.start_timer(timeout, MacTimer::CtsTimeout));
            }
            Some(OnAir::Data) => {
                self.rate.on_tx_success();
                self.finish_access(ctx);
            }
            Some(OnAir::Cts) | None => {}
        }
        if !self.medium_busy(ctx.now()) {
            self.on_medium_idle(ctx);
        }
    }

    fn on_cts_timeout(&mut self, ctx: &mut dyn MacContext) {
        if self.state != MacState::WaitCts {
            return;
        }
        self.access_timer = None;
        self.retries += 1;
        self.rate.on_tx_failure();
        self.cw = (self.cw * 2 + 1).min(self.params.cw_max);
        if self.retries >= self.params.retry_limit {
            log::debug!("{} giving up after {} RTS attempts", self.address, self.retries);
            if let Some(datagram) = self.queue.pop_front().and_then(Frame::into_datagram) {
                ctx.emit(MacOutput::Drop { datagram, reason: DropReason::RetryExhausted });
            }
            self.retries = 0;
            self.cw = self.params.cw_min;
        }
        self.state = MacState::Idle;
        if !self.queue.is_empty() {
            self.draw_backoff(ctx);
            self.attempt_transmit(ctx);
        }
    }

    /// Back to idle after a data frame went out, then serve the queue.
    fn finish_access(&mut self, ctx: &mut dyn MacContext) {
        self.state = MacState::Idle;
        self.retries = 0;
        self.cw = self.params.cw_min;
        if !self.queue.is_empty() {
            if self.carrier_sense() {
                self.draw_backoff(ctx);
            }
            self.attempt_transmit(ctx);
        }
    }

    fn can_answer_rts(&self, now: SimTime) -> bool {
        matches!(self.state, MacState::Idle | MacState::Sensing | MacState::Backoff)
            && !self.phy.is_transmitting(now)
            && self.nav_until <= now
            && self.pending_cts.is_none()
    }

    fn set_nav(&mut self, duration: SimTime, ctx: &mut dyn MacContext) {
        let until = ctx.now() + duration;
        if until > self.nav_until {
            let was_busy = self.medium_busy(ctx.now());
            self.nav_until = until;
            ctx.start_timer(duration, MacTimer::NavEnd);
            if !was_busy {
                self.on_medium_busy(ctx);
            }
        }
    }
}

impl MacStrategy for Mac {
    fn configure(&mut self, params: MacParameters, rate: RateControl) {
        self.cw = params.cw_min;
        self.params = params;
        self.rate = rate;
    }

    fn attempt_transmit(&mut self, ctx: &mut dyn MacContext) -> bool {
        if self.state != MacState::Idle || self.queue.is_empty() {
            return false;
        }
        if !self.carrier_sense() {
            self.start_transmission(ctx);
            return true;
        }
        if self.medium_busy(ctx.now()) {
            self.draw_backoff(ctx);
            self.state = MacState::Backoff;
        } else {
            self.state = MacState::Sensing;
            let id = ctx.start_timer(self.params.difs_time(), MacTimer::Difs);
            self.access_timer = Some(id);
        }
        true
    }

    fn on_frame_received(&mut self, frame: Frame, ctx: &mut dyn MacContext) {
        let now = ctx.now();
        if !frame.is_for(self.address) {
            if frame.nav > SimTime::ZERO {
                self.set_nav(frame.nav, ctx);
            }
            return;
        }
        match frame.kind {
            FrameKind::Data(datagram) => ctx.emit(MacOutput::Deliver(datagram)),
            FrameKind::Rts => {
                if self.can_answer_rts(now) {
                    let sifs = self.params.sifs_time();
                    let cts_time = airtime(CTS_SIZE, self.rate.control_rate());
                    let nav = frame.nav.saturating_sub(sifs + cts_time);
                    self.pending_cts = Some(Frame::cts(self.address, frame.src, nav));
                    ctx.start_timer(sifs, MacTimer::SendCts);
                }
            }
            FrameKind::Cts => {
                if self.state == MacState::WaitCts {
                    self.cancel_access_timer(ctx);
                    self.access_timer = Some(ctx.start_timer(self.params.sifs_time(), MacTimer::SendData));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddrV4};

    /// Records timers and outputs; timers fire only when the test says so.
    struct FakeCtx {
        now: SimTime,
        next_id: u64,
        timers: Vec<(EventId, MacTimer)>,
        outputs: Vec<MacOutput>,
        slots: u32,
        signals: u64,
    }

    impl FakeCtx {
        fn new(slots: u32) -> Self {
            Self { now: SimTime::ZERO, next_id: 0, timers: Vec::new(), outputs: Vec::new(), slots, signals: 0 }
        }

        /// Pop the earliest armed timer and advance the clock to it.
        fn fire_next(&mut self) -> Option<MacTimer> {
            self.timers.sort_by_key(|(id, _)| *id);
            if self.timers.is_empty() {
                return None;
            }
            let (id, timer) = self.timers.remove(0);
            self.now = id.time;
            Some(timer)
        }

        fn transmitted(&self) -> Vec<&Frame> {
            self.outputs
                .iter()
                .filter_map(|o| match o {
                    MacOutput::Transmit { frame, .. } => Some(frame),
                    _ => None,
                })
                .collect()
        }
    }

    impl MacContext for FakeCtx {
        fn now(&self) -> SimTime {
            self.now
        }

        fn start_timer(&mut self, delay: SimTime, timer: MacTimer) -> EventId {
            let id = EventId { time: self.now + delay, sequence: self.next_id };
            self.next_id += 1;
            self.timers.push((id, timer));
            id
        }

        fn cancel_timer(&mut self, id: EventId) {
            self.timers.retain(|(t, _)| *t != id);
        }

        fn backoff_slots(&mut self, _cw: u32) -> u32 {
            self.slots
        }

        fn next_signal(&mut self) -> SignalId {
            self.signals += 1;
            SignalId(self.signals)
        }

        fn emit(&mut self, output: MacOutput) {
            self.outputs.push(output);
        }
    }

    fn datagram() -> Datagram {
        Datagram {
            uid: 7,
            src: SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 2), 49153),
            dst: SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 1), 9),
            payload: vec![0; 100],
        }
    }

    fn data_frame() -> Frame {
        Frame::data(MacAddress::from_index(1), MacAddress::from_index(2), datagram())
    }

    fn mac(params: MacParameters) -> Mac {
        Mac::new(MacAddress::from_index(1), params, RateControl::default())
    }

    #[test]
    fn test_idle_medium_transmits_after_difs() {
        let mut mac = mac(MacParameters::default());
        let mut ctx = FakeCtx::new(0);
        mac.enqueue(data_frame(), &mut ctx);
        assert_eq!(mac.state(), MacState::Sensing);
        assert!(ctx.transmitted().is_empty());

        assert_eq!(ctx.fire_next(), Some(MacTimer::Difs));
        mac.on_timer(MacTimer::Difs, &mut ctx);
        assert_eq!(ctx.now, MacParameters::default().difs_time());
        assert_eq!(mac.state(), MacState::Transmitting);
        assert_eq!(ctx.transmitted().len(), 1);

        assert_eq!(ctx.fire_next(), Some(MacTimer::TxEnd));
        mac.on_timer(MacTimer::TxEnd, &mut ctx);
        assert_eq!(mac.state(), MacState::Idle);
        assert_eq!(mac.queue_len(), 0);
    }

    #[test]
    fn test_busy_medium_defers_into_backoff() {
        let mut mac = mac(MacParameters::default());
        let mut ctx = FakeCtx::new(3);
        mac.enqueue(data_frame(), &mut ctx);
        assert_eq!(mac.state(), MacState::Sensing);

        // Someone else starts transmitting during DIFS.
        let foreign = Frame::data(MacAddress::from_index(3), MacAddress::from_index(4), datagram());
        ctx.now = SimTime::from_micros(10);
        mac.on_rx_start(SignalId(100), foreign, false, &mut ctx);
        assert_eq!(mac.state(), MacState::Backoff);
        assert!(ctx.timers.is_empty(), "DIFS timer must be cancelled");

        ctx.now = SimTime::from_micros(200);
        mac.on_rx_end(SignalId(100), &mut ctx);
        assert_eq!(mac.state(), MacState::Sensing);

        assert_eq!(ctx.fire_next(), Some(MacTimer::Difs));
        mac.on_timer(MacTimer::Difs, &mut ctx);
        assert_eq!(mac.state(), MacState::Backoff);

        assert_eq!(ctx.fire_next(), Some(MacTimer::BackoffDone));
        let expected = SimTime::from_micros(200) + MacParameters::default().difs_time() + SimTime::from_micros(27);
        assert_eq!(ctx.now, expected);
        mac.on_timer(MacTimer::BackoffDone, &mut ctx);
        assert_eq!(mac.state(), MacState::Transmitting);
        assert_eq!(ctx.transmitted().len(), 1);
    }

    #[test]
    fn test_backoff_freezes_remaining_slots() {
        let mut mac = mac(MacParameters::default());
        let mut ctx = FakeCtx::new(10);
        let foreign = || Frame::data(MacAddress::from_index(3), MacAddress::from_index(4), datagram());

        mac.on_rx_start(SignalId(1), foreign(), false, &mut ctx);
        mac.enqueue(data_frame(), &mut ctx);
        assert_eq!(mac.state(), MacState::Backoff);
        ctx.now = SimTime::from_micros(100);
        mac.on_rx_end(SignalId(1), &mut ctx);
        ctx.fire_next();
        mac.on_timer(MacTimer::Difs, &mut ctx);

        // Four slots elapse, then the medium turns busy again.
        ctx.now = ctx.now + SimTime::from_micros(9 * 4 + 3);
        mac.on_rx_start(SignalId(2), foreign(), false, &mut ctx);
        assert_eq!(mac.backoff_slots, Some(6));
        assert!(ctx.timers.is_empty());
    }

    #[test]
    fn test_queue_overflow_drops() {
        let params = MacParameters { queue_limit: 1, ..MacParameters::default() };
        let mut mac = mac(params);
        let mut ctx = FakeCtx::new(0);
        mac.enqueue(data_frame(), &mut ctx);
        mac.enqueue(data_frame(), &mut ctx);
        assert_eq!(mac.queue_drops(), 1);
        assert!(ctx
            .outputs
            .iter()
            .any(|o| matches!(o, MacOutput::Drop { reason: DropReason::QueueOverflow, .. })));
    }

    #[test]
    fn test_aloha_skips_sensing() {
        let params = MacParameters { mac_type: MacType::Aloha, ..MacParameters::default() };
        let mut mac = mac(params);
        let mut ctx = FakeCtx::new(0);
        let foreign = Frame::data(MacAddress::from_index(3), MacAddress::from_index(4), datagram());
        mac.on_rx_start(SignalId(1), foreign, false, &mut ctx);
        mac.enqueue(data_frame(), &mut ctx);
        assert_eq!(mac.state(), MacState::Transmitting);
        assert_eq!(ctx.transmitted().len(), 1);
    }

    #[test]
    fn test_rts_cts_exchange() {
        let params = MacParameters { rts_cts_threshold: 100, ..MacParameters::default() };
        let mut sender = mac(params.clone());
        let mut ctx = FakeCtx::new(0);
        sender.enqueue(data_frame(), &mut ctx);
        ctx.fire_next();
        sender.on_timer(MacTimer::Difs, &mut ctx);
        assert!(matches!(ctx.transmitted()[0].kind, FrameKind::Rts));
        ctx.fire_next();
        sender.on_timer(MacTimer::TxEnd, &mut ctx);
        assert_eq!(sender.state(), MacState::WaitCts);

        // Receiver side answers with a CTS after SIFS.
        let mut receiver = Mac::new(MacAddress::from_index(2), params, RateControl::default());
        let mut rctx = FakeCtx::new(0);
        let rts = ctx.transmitted()[0].clone();
        receiver.on_rx_start(SignalId(1), rts, false, &mut rctx);
        rctx.now = SimTime::from_micros(50);
        receiver.on_rx_end(SignalId(1), &mut rctx);
        assert_eq!(rctx.fire_next(), Some(MacTimer::SendCts));
        receiver.on_timer(MacTimer::SendCts, &mut rctx);
        let cts = rctx.transmitted()[0].clone();
        assert!(matches!(cts.kind, FrameKind::Cts));
        assert_eq!(cts.dst, MacAddress::from_index(1));

        // CTS arrives before the timeout; data follows after SIFS.
        sender.on_frame_received(cts, &mut ctx);
        assert_eq!(ctx.fire_next(), Some(MacTimer::SendData));
        sender.on_timer(MacTimer::SendData, &mut ctx);
        let sent = ctx.transmitted();
        assert!(sent[1].is_data());
    }

    #[test]
    fn test_cts_timeout_exhausts_retries() {
        let params = MacParameters { rts_cts_threshold: 1, retry_limit: 2, ..MacParameters::default() };
        let mut mac = mac(params);
        let mut ctx = FakeCtx::new(0);
        mac.enqueue(data_frame(), &mut ctx);
        for _ in 0..20 {
            match ctx.fire_next() {
                Some(timer) => mac.on_timer(timer, &mut ctx),
                None => break,
            }
        }
        assert_eq!(mac.queue_len(), 0);
        assert_eq!(mac.state(), MacState::Idle);
        assert!(ctx
            .outputs
            .iter()
            .any(|o| matches!(o, MacOutput::Drop { reason: DropReason::RetryExhausted, .. })));
    }

    #[test]
    fn test_overheard_rts_sets_nav() {
        let mut mac = mac(MacParameters::default());
        let mut ctx = FakeCtx::new(0);
        let rts = Frame::rts(MacAddress::from_index(3), MacAddress::from_index(4), SimTime::from_micros(500));
        mac.on_rx_start(SignalId(1), rts, false, &mut ctx);
        ctx.now = SimTime::from_micros(40);
        mac.on_rx_end(SignalId(1), &mut ctx);
        assert!(mac.medium_busy(SimTime::from_micros(100)));
        assert!(!mac.medium_busy(SimTime::from_micros(541)));
    }
}
