use super::Scenario;
use crate::engine::{Handler, Scheduler, SimTime};
use crate::error::ScenarioResult;
use crate::network::packet::IPV4_HEADER_LEN;
use crate::network::{InstalledNetwork, NodeId, Packet, PacketId};
use crate::routing::{DiscoveryState, Route, RouteDecision, RouteQuery};
use crate::trace::{DropReason, TraceEvent, TraceRecord, TraceSet};
use crate::traffic::{Destination, FlowId, FlowRole, OnOffSampler, TrafficFlow, TransportKind};
use indicatif::ProgressBar;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use tracing::{debug, warn};

const FIRST_EPHEMERAL_PORT: u16 = 49153;
const MAX_CONNECT_ATTEMPTS: u32 = 6;
const CONNECT_TIMEOUT: SimTime = SimTime::from_secs(1);
/// Per destination, while an on-demand discovery runs
const MAX_PENDING: usize = 64;
const TICK: SimTime = SimTime::from_secs(1);

#[derive(Debug)]
pub(crate) enum Event {
    AppStart(FlowId),
    AppStop(FlowId),
    /// End of an on or off period
    Toggle(FlowId),
    Send { flow: FlowId, generation: u64 },
    Connect { flow: FlowId, attempt: u32 },
    Connected(FlowId),
    /// The packet reaches `path[index]`
    Hop { packet: Box<Packet>, path: Vec<NodeId>, index: usize },
    BroadcastArrive { packet: Box<Packet>, node: NodeId },
    RouteReady { source: NodeId, destination: NodeId },
    Tick,
}

struct Sender<'a> {
    flow: &'a TrafficFlow,
    source: Ipv4Addr,
    source_port: u16,
    interval: SimTime,
    sampler: OnOffSampler,
    active: bool,
    connected: bool,
    on: bool,
    // bumped whenever a pending Send chain must die
    generation: u64,
    seq: u64,
}

impl Sender<'_> {
    fn destination_address(&self) -> Option<Ipv4Addr> {
        match self.flow.destination {
            Destination::Unicast { address, .. } | Destination::Broadcast { address } => Some(address),
            Destination::Any => None,
        }
    }

    fn packet(&mut self, uid: PacketId, now: SimTime, payload_size: u32) -> Option<Packet> {
        let packet = Packet {
            uid,
            flow: self.flow.id,
            origin: self.flow.node,
            source: self.source,
            destination: self.destination_address()?,
            source_port: self.source_port,
            destination_port: self.flow.port,
            transport: self.flow.transport,
            payload_size,
            seq: self.seq,
            created_at: now,
            source_route: None,
        };
        if payload_size > 0 {
            self.seq += 1;
        }
        Some(packet)
    }
}

enum App<'a> {
    Sender(Sender<'a>),
    Receiver { flow: &'a TrafficFlow, open: bool },
}

/// Runtime state of one run: applications, discoveries in flight, buffered packets.
pub(crate) struct World<'a> {
    network: &'a InstalledNetwork,
    traces: &'a mut TraceSet,
    apps: Vec<App<'a>>,
    listeners: HashMap<(NodeId, u16), Vec<FlowId>>,
    discovery: HashMap<(NodeId, NodeId), DiscoveryState>,
    pending: HashMap<(NodeId, NodeId), Vec<Packet>>,
    next_uid: u64,
    stop: SimTime,
    progress: Option<ProgressBar>,
}

impl<'a> World<'a> {
    pub(crate) fn new(
        scenario: &'a Scenario,
        traces: &'a mut TraceSet,
        progress: Option<ProgressBar>,
    ) -> ScenarioResult<Self> {
        let config = scenario.config();
        let mut apps = Vec::with_capacity(scenario.plan().len());
        let mut listeners: HashMap<(NodeId, u16), Vec<FlowId>> = HashMap::new();
        let mut next_port = FIRST_EPHEMERAL_PORT;

        for flow in scenario.plan().flows() {
            match flow.role {
                FlowRole::Sender => {
                    apps.push(App::Sender(Sender {
                        flow,
                        source: scenario.nodes().address_of(flow.node)?,
                        source_port: next_port,
                        interval: flow.data_rate.packet_interval(flow.packet_size),
                        sampler: OnOffSampler::new(config.on_off(), config.seed().wrapping_add(flow.id.0 as u64)),
                        active: false,
                        connected: flow.transport == TransportKind::Datagram,
                        on: false,
                        generation: 0,
                        seq: 0,
                    }));
                    next_port = next_port.checked_add(1).unwrap_or(FIRST_EPHEMERAL_PORT);
                }
                FlowRole::Receiver => {
                    listeners.entry((flow.node, flow.port)).or_default().push(flow.id);
                    apps.push(App::Receiver { flow, open: false });
                }
            }
        }

        Ok(Self {
            network: scenario.network(),
            traces,
            apps,
            listeners,
            discovery: HashMap::new(),
            pending: HashMap::new(),
            next_uid: 0,
            stop: config.stop_time(),
            progress,
        })
    }

    fn trace(&mut self, time: SimTime, node: NodeId, event: TraceEvent, packet: &Packet) {
        self.traces.record(TraceRecord { time, node, event, packet });
    }

    fn allocate_uid(&mut self) -> PacketId {
        let uid = PacketId::new(self.next_uid);
        self.next_uid += 1;
        uid
    }

    fn sender_mut(&mut self, flow: FlowId) -> Option<&mut Sender<'a>> {
        match self.apps.get_mut(flow.0 as usize)? {
            App::Sender(sender) => Some(sender),
            App::Receiver { .. } => None,
        }
    }

    fn start_app(&mut self, flow: FlowId, scheduler: &mut Scheduler<Event>) {
        match self.apps.get_mut(flow.0 as usize) {
            Some(App::Receiver { open, .. }) => *open = true,
            Some(App::Sender(sender)) => {
                sender.active = true;
                if sender.connected {
                    self.begin_on_period(flow, scheduler);
                } else {
                    scheduler.schedule_in(SimTime::ZERO, Event::Connect { flow, attempt: 1 });
                }
            }
            None => {}
        }
    }

    fn stop_app(&mut self, flow: FlowId) {
        match self.apps.get_mut(flow.0 as usize) {
            Some(App::Receiver { open, .. }) => *open = false,
            Some(App::Sender(sender)) => {
                sender.active = false;
                sender.on = false;
                sender.generation += 1;
            }
            None => {}
        }
    }

    fn begin_on_period(&mut self, flow: FlowId, scheduler: &mut Scheduler<Event>) {
        let Some(sender) = self.sender_mut(flow) else {
            return;
        };
        if !sender.active {
            return;
        }
        sender.on = true;
        sender.generation += 1;
        let generation = sender.generation;
        let interval = sender.interval;

        let on_for = sender.sampler.next_on();
        if on_for != SimTime::MAX {
            scheduler.schedule_in(on_for, Event::Toggle(flow));
        }
        scheduler.schedule_in(interval, Event::Send { flow, generation });
    }

    fn toggle(&mut self, flow: FlowId, scheduler: &mut Scheduler<Event>) {
        let Some(sender) = self.sender_mut(flow) else {
            return;
        };
        if !sender.active {
            return;
        }
        if sender.on {
            sender.on = false;
            sender.generation += 1;
            let off_for = sender.sampler.next_off();
            scheduler.schedule_in(off_for, Event::Toggle(flow));
        } else {
            self.begin_on_period(flow, scheduler);
        }
    }

    fn send(&mut self, flow: FlowId, generation: u64, scheduler: &mut Scheduler<Event>) {
        let now = scheduler.now();
        let uid = PacketId::new(self.next_uid);
        let Some(App::Sender(sender)) = self.apps.get_mut(flow.0 as usize) else {
            return;
        };
        if !sender.active || !sender.on || sender.generation != generation {
            return;
        }

        let destination = sender.flow.destination;
        let size = sender.flow.packet_size;
        let Some(packet) = sender.packet(uid, now, size) else {
            return;
        };
        self.next_uid += 1;
        scheduler.schedule_in(sender.interval, Event::Send { flow, generation });

        self.trace(now, packet.origin, TraceEvent::Send, &packet);
        match destination {
            Destination::Unicast { node, .. } => self.route_packet(packet, node, scheduler),
            Destination::Broadcast { .. } => self.broadcast(packet, scheduler),
            Destination::Any => {}
        }
    }

    fn query(&self, now: SimTime, source: NodeId, destination: NodeId) -> RouteDecision {
        let network = self.network;
        network.routing.route(&RouteQuery {
            now,
            source,
            destination,
            channel: &network.channel,
            discovery: self.discovery.get(&(source, destination)).copied(),
        })
    }

    fn start_discovery(&mut self, source: NodeId, destination: NodeId, ready_at: SimTime, scheduler: &mut Scheduler<Event>) {
        if self.discovery.contains_key(&(source, destination)) {
            return;
        }
        debug!(
            "Route discovery {} -> {} started, ready at {}s",
            source, destination, ready_at
        );
        self.discovery
            .insert((source, destination), DiscoveryState::InProgress { ready_at });
        scheduler.schedule_at(ready_at, Event::RouteReady { source, destination });
    }

    fn route_packet(&mut self, packet: Packet, destination: NodeId, scheduler: &mut Scheduler<Event>) {
        let now = scheduler.now();
        let origin = packet.origin;

        match self.query(now, origin, destination) {
            RouteDecision::Forward(route) => self.transmit_along(packet, route, scheduler),
            RouteDecision::Discover { ready_at } => {
                self.start_discovery(origin, destination, ready_at, scheduler);
                let queue = self.pending.entry((origin, destination)).or_default();
                if queue.len() < MAX_PENDING {
                    queue.push(packet);
                } else {
                    self.trace(now, origin, TraceEvent::Drop(DropReason::BufferFull), &packet);
                }
            }
            RouteDecision::NoRoute => {
                self.trace(now, origin, TraceEvent::Drop(DropReason::NoRoute), &packet);
            }
        }
    }

    fn route_ready(&mut self, source: NodeId, destination: NodeId, scheduler: &mut Scheduler<Event>) {
        self.discovery
            .insert((source, destination), DiscoveryState::Established);
        let buffered = self.pending.remove(&(source, destination)).unwrap_or_default();
        debug!(
            "Route {} -> {} established, releasing {} packets",
            source,
            destination,
            buffered.len()
        );
        for packet in buffered {
            self.route_packet(packet, destination, scheduler);
        }
    }

    fn transmit_along(&mut self, mut packet: Packet, route: Route, scheduler: &mut Scheduler<Event>) {
        if route.source_routed {
            packet.source_route = Some(route.path.clone());
        }
        if route.path.len() < 2 {
            let node = packet.origin;
            self.deliver(&packet, node, scheduler.now());
            return;
        }
        self.transmit_hop(Box::new(packet), route.path, 0, scheduler);
    }

    fn transmit_hop(&mut self, packet: Box<Packet>, path: Vec<NodeId>, index: usize, scheduler: &mut Scheduler<Event>) {
        self.trace(scheduler.now(), path[index], TraceEvent::Transmit, &packet);
        let delay = self.network.channel.transmission_delay(packet.wire_size());
        scheduler.schedule_in(delay, Event::Hop { packet, path, index: index + 1 });
    }

    fn hop(&mut self, packet: Box<Packet>, path: Vec<NodeId>, index: usize, scheduler: &mut Scheduler<Event>) {
        let Some(&node) = path.get(index) else {
            return;
        };
        let now = scheduler.now();
        self.trace(now, node, TraceEvent::Receive, &packet);

        if index + 1 == path.len() {
            self.deliver(&packet, node, now);
        } else {
            self.transmit_hop(packet, path, index, scheduler);
        }
    }

    fn broadcast(&mut self, packet: Packet, scheduler: &mut Scheduler<Event>) {
        let origin = packet.origin;
        self.trace(scheduler.now(), origin, TraceEvent::Transmit, &packet);

        let channel = &self.network.channel;
        let delay = channel.transmission_delay(packet.wire_size());
        for &node in channel.neighbors(origin) {
            scheduler.schedule_in(delay, Event::BroadcastArrive { packet: Box::new(packet.clone()), node });
        }
    }

    fn broadcast_arrive(&mut self, packet: &Packet, node: NodeId, now: SimTime) {
        self.trace(now, node, TraceEvent::Receive, packet);
        self.deliver(packet, node, now);
    }

    fn deliver(&mut self, packet: &Packet, node: NodeId, now: SimTime) {
        let outcome = match self.listeners.get(&(node, packet.destination_port)) {
            None => Err(DropReason::NoReceiver),
            Some(flows) => flows
                .iter()
                .copied()
                .find(|id| {
                    matches!(
                        self.apps.get(id.0 as usize),
                        Some(App::Receiver { flow, open: true }) if flow.transport == packet.transport
                    )
                })
                .ok_or(DropReason::ReceiverClosed),
        };

        match outcome {
            Ok(receiver) => self.trace(now, node, TraceEvent::Deliver { receiver }, packet),
            Err(reason) => self.trace(now, node, TraceEvent::Drop(reason), packet),
        }
    }

    fn connect(&mut self, flow: FlowId, attempt: u32, scheduler: &mut Scheduler<Event>) {
        let Some(App::Sender(sender)) = self.apps.get(flow.0 as usize) else {
            return;
        };
        if !sender.active || sender.connected {
            return;
        }
        let origin = sender.flow.node;
        let Destination::Unicast { node: server, .. } = sender.flow.destination else {
            return;
        };

        match self.query(scheduler.now(), origin, server) {
            RouteDecision::Forward(route) => {
                // SYN out, SYN/ACK back, header-only segments
                let segment = IPV4_HEADER_LEN + TransportKind::Connection.header_len();
                let one_way = self.network.channel.transmission_delay(segment) * route.hops() as u64;
                scheduler.schedule_in(one_way * 2, Event::Connected(flow));
            }
            RouteDecision::Discover { ready_at } => {
                self.start_discovery(origin, server, ready_at, scheduler);
                scheduler.schedule_at(ready_at, Event::Connect { flow, attempt });
            }
            RouteDecision::NoRoute if attempt < MAX_CONNECT_ATTEMPTS => {
                let backoff = CONNECT_TIMEOUT * (1u64 << (attempt - 1));
                debug!(
                    "Flow {} has no route to node {}, retrying connect in {}s",
                    flow, server, backoff
                );
                scheduler.schedule_in(backoff, Event::Connect { flow, attempt: attempt + 1 });
            }
            RouteDecision::NoRoute => {
                warn!(
                    "Flow {} gave up connecting from node {} to node {} after {} attempts",
                    flow, origin, server, attempt
                );
                let now = scheduler.now();
                let uid = self.allocate_uid();
                let syn = self.sender_mut(flow).and_then(|sender| sender.packet(uid, now, 0));
                if let Some(syn) = syn {
                    self.trace(now, origin, TraceEvent::Drop(DropReason::ConnectFailed), &syn);
                }
            }
        }
    }

    fn connected(&mut self, flow: FlowId, scheduler: &mut Scheduler<Event>) {
        let Some(sender) = self.sender_mut(flow) else {
            return;
        };
        sender.connected = true;
        debug!("Flow {} connected at {}s", flow, scheduler.now());
        self.begin_on_period(flow, scheduler);
    }

    fn tick(&mut self, scheduler: &mut Scheduler<Event>) {
        let now = scheduler.now();
        if let Some(pb) = &self.progress {
            let monitor = self.traces.monitor();
            pb.set_position(now.as_secs_f64() as u64);
            pb.set_message(format!(
                "Delivered: {} | Dropped: {}",
                monitor.packets_delivered(),
                monitor.packets_dropped()
            ));
        }
        if now + TICK <= self.stop {
            scheduler.schedule_in(TICK, Event::Tick);
        }
    }
}

impl Handler<Event> for World<'_> {
    fn handle(&mut self, event: Event, scheduler: &mut Scheduler<Event>) {
        match event {
            Event::AppStart(flow) => self.start_app(flow, scheduler),
            Event::AppStop(flow) => self.stop_app(flow),
            Event::Toggle(flow) => self.toggle(flow, scheduler),
            Event::Send { flow, generation } => self.send(flow, generation, scheduler),
            Event::Connect { flow, attempt } => self.connect(flow, attempt, scheduler),
            Event::Connected(flow) => self.connected(flow, scheduler),
            Event::Hop { packet, path, index } => self.hop(packet, path, index, scheduler),
            Event::BroadcastArrive { packet, node } => self.broadcast_arrive(&packet, node, scheduler.now()),
            Event::RouteReady { source, destination } => self.route_ready(source, destination, scheduler),
            Event::Tick => self.tick(scheduler),
        }
    }
}
