//! UDP echo server and client.
//!
//! Applications never touch the stack or the scheduler directly. Each
//! hook returns the [`AppAction`]s the simulation should carry out on the
//! application's behalf.

use std::net::SocketAddrV4;

use crate::ip::Datagram;
use crate::sim::SimTime;

/// Log target for the echo client.
pub const CLIENT_LOG_TARGET: &str = "udp_echo_client";
/// Log target for the echo server.
pub const SERVER_LOG_TARGET: &str = "udp_echo_server";

/// Requests from an application to the simulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    /// Bind a fixed local port.
    Bind(u16),
    /// Bind the next free ephemeral port.
    BindEphemeral,
    /// Release the bound port.
    Unbind,
    /// Send `payload` from the bound port to `dst`.
    Send { dst: SocketAddrV4, payload: Vec<u8> },
    /// Call [`EchoClient::on_send_timer`] after the given delay.
    ScheduleSend(SimTime),
    /// Drop the pending send timer, if any.
    CancelSend,
}

/// Echoes every datagram back to where it came from.
#[derive(Debug, Clone)]
pub struct EchoServer {
    port: u16,
    received: u64,
}

impl EchoServer {
    pub fn new(port: u16) -> Self {
        Self { port, received: 0 }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn start(&mut self, _now: SimTime) -> Vec<AppAction> {
        vec![AppAction::Bind(self.port)]
    }

    pub fn stop(&mut self, _now: SimTime) -> Vec<AppAction> {
        vec![AppAction::Unbind]
    }

    pub fn on_receive(&mut self, now: SimTime, datagram: &Datagram) -> Vec<AppAction> {
        self.received += 1;
        let from = datagram.src;
        log::info!(
            target: SERVER_LOG_TARGET,
            "At time {} server received {} bytes from {} port {}",
            now,
            datagram.payload.len(),
            from.ip(),
            from.port()
        );
        log::info!(
            target: SERVER_LOG_TARGET,
            "At time {} server sent {} bytes to {} port {}",
            now,
            datagram.payload.len(),
            from.ip(),
            from.port()
        );
        vec![AppAction::Send { dst: from, payload: datagram.payload.clone() }]
    }
}

/// Sends fixed-size requests at a fixed interval and counts the echoes.
#[derive(Debug, Clone)]
pub struct EchoClient {
    remote: SocketAddrV4,
    /// 0 sends until stopped.
    max_packets: u32,
    interval: SimTime,
    packet_size: u32,
    sent: u32,
    received: u32,
}

impl EchoClient {
    pub fn new(remote: SocketAddrV4, max_packets: u32, interval: SimTime, packet_size: u32) -> Self {
        Self { remote, max_packets, interval, packet_size, sent: 0, received: 0 }
    }

    pub fn remote(&self) -> SocketAddrV4 {
        self.remote
    }

    pub fn sent(&self) -> u32 {
        self.sent
    }

    pub fn received(&self) -> u32 {
        self.received
    }

    fn exhausted(&self) -> bool {
        self.max_packets != 0 && self.sent >= self.max_packets
    }

    pub fn start(&mut self, _now: SimTime) -> Vec<AppAction> {
        vec![AppAction::BindEphemeral, AppAction::ScheduleSend(SimTime::ZERO)]
    }

    pub fn stop(&mut self, _now: SimTime) -> Vec<AppAction> {
        vec![AppAction::CancelSend, AppAction::Unbind]
    }

    pub fn on_send_timer(&mut self, now: SimTime) -> Vec<AppAction> {
        if self.exhausted() {
            return Vec::new();
        }
        self.sent += 1;
        log::info!(
            target: CLIENT_LOG_TARGET,
            "At time {} client sent {} bytes to {} port {}",
            now,
            self.packet_size,
            self.remote.ip(),
            self.remote.port()
        );
        let mut actions = vec![AppAction::Send { dst: self.remote, payload: vec![0; self.packet_size as usize] }];
        if !self.exhausted() {
            actions.push(AppAction::ScheduleSend(self.interval));
        }
        actions
    }

    pub fn on_receive(&mut self, now: SimTime, datagram: &Datagram) -> Vec<AppAction> {
        self.received += 1;
        log::info!(
            target: CLIENT_LOG_TARGET,
            "At time {} client received {} bytes from {} port {}",
            now,
            datagram.payload.len(),
            datagram.src.ip(),
            datagram.src.port()
        );
        Vec::new()
    }
}
