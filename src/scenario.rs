//! Scenario assembly and event dispatch.
//!
//! A [`Simulation`] owns one scheduler and one [`World`]. The world holds
//! every component (nodes, devices, channel, stack, applications, flow
//! monitor) and is the scheduler's event handler. Components never call
//! each other through registered callbacks: the MAC returns
//! [`MacOutput`]s, applications return [`AppAction`]s, and the world
//! carries them out.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::Path;

use crate::apps::{AppAction, AppId, Application, EchoClient, EchoServer};
use crate::config::{ScenarioConfig, ValidationError};
use crate::flowmon::{write_report, FlowMonitor, FlowMonitorReport, PacketTap, RunMetadata};
use crate::ip::{AddressError, AddressTable, Ipv4AddressAllocator, SendOutcome, StackError, UdpStack};
use crate::sim::{EventHandler, EventId, RunSummary, Scheduler, SchedulerError, SimTime};
use crate::topology::{DeviceId, NodeContainer, NodeId, Position};
use crate::wifi::{
    Channel, Frame, Mac, MacAllocator, MacContext, MacOutput, MacTimer, PhyStats, SignalId, WifiDevice,
};

/// Everything that can happen in a simulation.
#[derive(Debug, Clone)]
pub enum SimEvent {
    AppStart(AppId),
    AppStop(AppId),
    /// A client's periodic send timer.
    AppSend(AppId),
    MacTimer { device: DeviceId, timer: MacTimer },
    /// First bit of a signal reaches `device`.
    RxStart { device: DeviceId, signal: SignalId, frame: Frame, damaged: bool },
    /// Last bit of a signal reaches `device`.
    RxEnd { device: DeviceId, signal: SignalId },
}

/// Errors while building a simulation. All of them are fatal.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("address assignment failed: {0}")]
    Address(#[from] AddressError),
    #[error("socket setup failed: {0}")]
    Stack(#[from] StackError),
    #[error("event scheduling failed: {0}")]
    Scheduler(#[from] SchedulerError),
}

/// Per-client outcome, for quick checks without the flow monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientSummary {
    pub node: NodeId,
    pub address: Ipv4Addr,
    pub sent: u32,
    pub received: u32,
}

#[derive(Debug)]
struct InstalledApp {
    node: NodeId,
    device: DeviceId,
    app: Application,
    send_timer: Option<EventId>,
}

/// Scheduling failures inside a handler are defects in a component.
fn schedule_or_abort(scheduler: &mut Scheduler<SimEvent>, delay: SimTime, event: SimEvent) -> EventId {
    match scheduler.schedule(delay, event) {
        Ok(id) => id,
        Err(e) => panic!("scheduler contract violated at {}: {}", scheduler.now(), e),
    }
}

/// The MAC's view of the simulation while it handles one event.
struct DeviceContext<'a> {
    scheduler: &'a mut Scheduler<SimEvent>,
    device: DeviceId,
    rng: &'a mut StdRng,
    next_signal: &'a mut u64,
    outputs: &'a mut Vec<MacOutput>,
}

impl MacContext for DeviceContext<'_> {
    fn now(&self) -> SimTime {
        self.scheduler.now()
    }

    fn start_timer(&mut self, delay: SimTime, timer: MacTimer) -> EventId {
        schedule_or_abort(self.scheduler, delay, SimEvent::MacTimer { device: self.device, timer })
    }

    fn cancel_timer(&mut self, id: EventId) {
        self.scheduler.cancel(id);
    }

    fn backoff_slots(&mut self, cw: u32) -> u32 {
        self.rng.gen_range(0..=cw)
    }

    fn next_signal(&mut self) -> SignalId {
        *self.next_signal += 1;
        SignalId(*self.next_signal)
    }

    fn emit(&mut self, output: MacOutput) {
        self.outputs.push(output);
    }
}

/// All simulated state. Mutated only from event handlers.
#[derive(Debug)]
pub struct World {
    nodes: NodeContainer,
    devices: Vec<WifiDevice>,
    channel: Channel,
    stack: UdpStack,
    apps: Vec<InstalledApp>,
    monitor: FlowMonitor,
    rng: StdRng,
    next_signal: u64,
}

impl World {
    pub fn nodes(&self) -> &NodeContainer {
        &self.nodes
    }

    pub fn devices(&self) -> &[WifiDevice] {
        &self.devices
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn addresses(&self) -> &AddressTable {
        self.stack.table()
    }

    pub fn monitor(&self) -> &FlowMonitor {
        &self.monitor
    }

    pub fn application(&self, id: AppId) -> Option<&Application> {
        self.apps.get(id.0).map(|installed| &installed.app)
    }

    fn position_of(&self, device: DeviceId, now: SimTime) -> Position {
        self.devices
            .get(device.index())
            .and_then(|dev| self.nodes.get(dev.node()))
            .map(|node| node.position_at(now))
            .unwrap_or_default()
    }

    /// Run one MAC hook for `device`, then carry out what it asked for.
    fn drive_mac<F>(&mut self, scheduler: &mut Scheduler<SimEvent>, device: DeviceId, hook: F)
    where
        F: FnOnce(&mut Mac, &mut dyn MacContext),
    {
        let mut outputs = Vec::new();
        {
            let Some(dev) = self.devices.get_mut(device.index()) else {
                log::warn!("Event for unknown {}", device);
                return;
            };
            let mut ctx = DeviceContext {
                scheduler: &mut *scheduler,
                device,
                rng: &mut self.rng,
                next_signal: &mut self.next_signal,
                outputs: &mut outputs,
            };
            hook(dev.mac_mut(), &mut ctx);
        }
        for output in outputs {
            self.handle_mac_output(scheduler, device, output);
        }
    }

    fn handle_mac_output(&mut self, scheduler: &mut Scheduler<SimEvent>, device: DeviceId, output: MacOutput) {
        let now = scheduler.now();
        match output {
            MacOutput::Transmit { signal, frame, duration } => {
                let origin = self.position_of(device, now);
                let nodes = &self.nodes;
                let devices = &self.devices;
                let position_of = |d: DeviceId| {
                    devices
                        .get(d.index())
                        .and_then(|dev| nodes.get(dev.node()))
                        .map(|node| node.position_at(now))
                        .unwrap_or_default()
                };
                let arrivals = self.channel.propagate(device, origin, position_of, &mut self.rng);
                log::trace!("{} transmits {:?} for {} to {} receivers", device, signal, duration, arrivals.len());
                for arrival in arrivals {
                    let start = SimEvent::RxStart {
                        device: arrival.device,
                        signal,
                        frame: frame.clone(),
                        damaged: arrival.damaged,
                    };
                    schedule_or_abort(scheduler, arrival.delay, start);
                    schedule_or_abort(
                        scheduler,
                        arrival.delay + duration,
                        SimEvent::RxEnd { device: arrival.device, signal },
                    );
                }
            }
            MacOutput::Deliver(datagram) => {
                let Some(node) = self.devices.get(device.index()).map(WifiDevice::node) else {
                    return;
                };
                if let Some(app) = self.stack.receive(now, node, &datagram, &mut self.monitor) {
                    let actions = self.apps[app.0].app.on_receive(now, &datagram);
                    self.apply_actions(scheduler, app, actions);
                }
            }
            MacOutput::Drop { datagram, reason } => {
                self.monitor.on_drop(now, &datagram, reason);
            }
        }
    }

    fn apply_actions(&mut self, scheduler: &mut Scheduler<SimEvent>, app: AppId, actions: Vec<AppAction>) {
        let now = scheduler.now();
        let (node, device) = {
            let installed = &self.apps[app.0];
            (installed.node, installed.device)
        };
        for action in actions {
            match action {
                AppAction::Bind(port) => {
                    if let Err(e) = self.stack.bind(node, port, app) {
                        log::warn!("{} could not bind: {}", app, e);
                    }
                }
                AppAction::BindEphemeral => {
                    if let Err(e) = self.stack.bind_ephemeral(node, app) {
                        log::warn!("{} could not bind: {}", app, e);
                    }
                }
                AppAction::Unbind => self.stack.unbind(app),
                AppAction::Send { dst, payload } => {
                    let Some(port) = self.stack.local_port(app) else {
                        log::warn!("{} tried to send without a bound socket", app);
                        continue;
                    };
                    self.send(scheduler, device, port, dst, payload);
                }
                AppAction::ScheduleSend(delay) => {
                    let id = schedule_or_abort(scheduler, delay, SimEvent::AppSend(app));
                    self.apps[app.0].send_timer = Some(id);
                }
                AppAction::CancelSend => {
                    if let Some(id) = self.apps[app.0].send_timer.take() {
                        if scheduler.cancel(id) {
                            log::trace!("{} send timer cancelled at {}", app, now);
                        }
                    }
                }
            }
        }
    }

    fn send(&mut self, scheduler: &mut Scheduler<SimEvent>, device: DeviceId, port: u16, dst: SocketAddrV4, payload: Vec<u8>) {
        let now = scheduler.now();
        let outcome = match self.stack.send_datagram(now, device, port, dst, payload, &mut self.monitor) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!("Send from {} failed: {}", device, e);
                return;
            }
        };
        let SendOutcome::Routed { dst_device, datagram } = outcome else {
            return;
        };
        let (Some(from), Some(to)) = (self.devices.get(device.index()), self.devices.get(dst_device.index())) else {
            return;
        };
        let frame = Frame::data(from.address(), to.address(), datagram);
        self.drive_mac(scheduler, device, |mac, ctx| mac.enqueue(frame, ctx));
    }
}

impl EventHandler<SimEvent> for World {
    fn handle(&mut self, scheduler: &mut Scheduler<SimEvent>, event: SimEvent) {
        let now = scheduler.now();
        match event {
            SimEvent::AppStart(app) => {
                let actions = self.apps[app.0].app.start(now);
                self.apply_actions(scheduler, app, actions);
            }
            SimEvent::AppStop(app) => {
                let actions = self.apps[app.0].app.stop(now);
                self.apply_actions(scheduler, app, actions);
            }
            SimEvent::AppSend(app) => {
                self.apps[app.0].send_timer = None;
                let actions = self.apps[app.0].app.on_send_timer(now);
                self.apply_actions(scheduler, app, actions);
            }
            SimEvent::MacTimer { device, timer } => {
                self.drive_mac(scheduler, device, |mac, ctx| mac.on_timer(timer, ctx));
            }
            SimEvent::RxStart { device, signal, frame, damaged } => {
                self.drive_mac(scheduler, device, |mac, ctx| mac.on_rx_start(signal, frame, damaged, ctx));
            }
            SimEvent::RxEnd { device, signal } => {
                self.drive_mac(scheduler, device, |mac, ctx| mac.on_rx_end(signal, ctx));
            }
        }
    }
}

/// One independent simulation instance.
#[derive(Debug)]
pub struct Simulation {
    config: ScenarioConfig,
    scheduler: Scheduler<SimEvent>,
    world: World,
    summary: Option<RunSummary>,
}

impl Simulation {
    /// Build the scenario described by `config`: nodes on their positions,
    /// one Wi-Fi device each on a shared channel, addresses from the
    /// subnet, an echo server and echo clients with their start and stop
    /// events queued.
    pub fn new(config: ScenarioConfig) -> Result<Self, SetupError> {
        config.validate()?;
        let node_count = config.general.node_count;

        let mut nodes = NodeContainer::create(node_count);
        let positions = config.topology.placement.allocate(node_count as usize);
        nodes.install_positions(&positions);

        let mut channel = Channel::new(config.channel.clone());
        let mut macs = MacAllocator::default();
        let mut devices = Vec::with_capacity(node_count as usize);
        for node_id in 0..node_count {
            let node = NodeId(node_id);
            let id = DeviceId(node_id);
            devices.push(WifiDevice::new(id, node, macs.allocate(), config.mac.clone(), config.rate.clone()));
            if let Some(n) = nodes.get_mut(node) {
                n.attach_device(id);
            }
            channel.attach(id);
        }

        let mut table = AddressTable::default();
        let mut allocator = Ipv4AddressAllocator::new(config.addressing.base, config.addressing.mask)?;
        let device_ids: Vec<DeviceId> = devices.iter().map(WifiDevice::id).collect();
        allocator.assign(&mut table, &device_ids)?;

        let server_node = NodeId(config.server.node);
        let server_device = DeviceId(config.server.node);
        let server_ip = table.address_of(server_device).ok_or(StackError::NoAddress(server_device))?;
        let remote = SocketAddrV4::new(server_ip, config.server.port);

        let mut apps = vec![InstalledApp {
            node: server_node,
            device: server_device,
            app: Application::EchoServer(EchoServer::new(config.server.port)),
            send_timer: None,
        }];
        for device in &devices {
            if device.node() == server_node {
                continue;
            }
            let client = EchoClient::new(
                remote,
                config.client.max_packets,
                config.client.interval.into(),
                config.client.packet_size,
            );
            apps.push(InstalledApp {
                node: device.node(),
                device: device.id(),
                app: Application::EchoClient(client),
                send_timer: None,
            });
        }

        let mut scheduler = Scheduler::new();
        for (index, installed) in apps.iter().enumerate() {
            let (start, stop) = match installed.app {
                Application::EchoServer(_) => (config.server.start, config.server.stop),
                Application::EchoClient(_) => (config.client.start, config.client.stop),
            };
            scheduler.schedule_at(start.into(), SimEvent::AppStart(AppId(index)))?;
            scheduler.schedule_at(stop.into(), SimEvent::AppStop(AppId(index)))?;
        }

        log::info!(
            "Scenario ready: {} nodes, {} clients, server {} on {}",
            node_count,
            apps.len() - 1,
            remote,
            server_node
        );

        let world = World {
            nodes,
            devices,
            channel,
            stack: UdpStack::new(table),
            apps,
            monitor: FlowMonitor::with_config(config.flow_monitor.clone()),
            rng: StdRng::seed_from_u64(config.general.seed),
            next_signal: 0,
        };

        Ok(Self { config, scheduler, world, summary: None })
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn now(&self) -> SimTime {
        self.scheduler.now()
    }

    pub fn summary(&self) -> Option<RunSummary> {
        self.summary
    }

    /// Run to the configured stop time, settle the flow statistics and
    /// discard whatever is still queued.
    pub fn run(&mut self) -> RunSummary {
        let stop = SimTime::from(self.config.general.stop_time);
        log::info!("Running until {}", stop);
        let summary = self.scheduler.run(stop, &mut self.world);
        self.world.monitor.finalize(summary.final_time);
        self.scheduler.destroy();
        log::info!(
            "Simulation finished at {} after {} events, {} flows observed",
            summary.final_time,
            summary.events_executed,
            self.world.monitor.flow_count()
        );
        self.summary = Some(summary);
        summary
    }

    pub fn monitor(&self) -> &FlowMonitor {
        &self.world.monitor
    }

    /// Flow statistics with run metadata.
    pub fn report(&self) -> FlowMonitorReport {
        let metadata = RunMetadata {
            generated_at: Utc::now(),
            simulator_version: env!("CARGO_PKG_VERSION").to_string(),
            node_count: self.config.general.node_count,
            seed: self.config.general.seed,
            stop_time: self.config.general.stop_time.into(),
            events_executed: self.summary.map(|s| s.events_executed).unwrap_or(0),
        };
        self.world.monitor.report(metadata)
    }

    /// Write the statistics file once the run is over.
    pub fn serialize(&self, path: &Path) -> color_eyre::Result<()> {
        write_report(&self.report(), path)
    }

    pub fn clients(&self) -> Vec<ClientSummary> {
        self.world
            .apps
            .iter()
            .filter_map(|installed| {
                let client = installed.app.as_client()?;
                Some(ClientSummary {
                    node: installed.node,
                    address: self.world.stack.table().address_of(installed.device)?,
                    sent: client.sent(),
                    received: client.received(),
                })
            })
            .collect()
    }

    /// Requests the echo server received.
    pub fn server_received(&self) -> u64 {
        self.world.apps.iter().filter_map(|installed| installed.app.as_server()).map(EchoServer::received).sum()
    }

    /// Frame-level counters summed over every device.
    pub fn phy_totals(&self) -> PhyStats {
        self.world.devices.iter().map(|d| d.mac().phy().stats()).fold(PhyStats::default(), |mut acc, s| {
            acc.tx_frames += s.tx_frames;
            acc.rx_frames += s.rx_frames;
            acc.collisions += s.collisions;
            acc.half_duplex_drops += s.half_duplex_drops;
            acc.channel_losses += s.channel_losses;
            acc
        })
    }
}
