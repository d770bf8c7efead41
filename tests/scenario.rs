#![allow(clippy::unwrap_used)]

use adhocsim::network::NodeId;
use adhocsim::prelude::*;
use adhocsim::traffic::{Destination, FlowRole};
use std::path::PathBuf;

fn build(args: &ScenarioArgs) -> Scenario {
    Scenario::build(ScenarioConfig::resolve(args).unwrap()).unwrap()
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("adhocsim-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

#[test]
fn aodv_unicast_end_to_end() {
    let args = ScenarioArgs {
        nodes: 20,
        servers: 2,
        ..ScenarioArgs::default()
    }
    .with_routing(1)
    .with_distribution(0);
    let scenario = build(&args);

    let plan = scenario.plan();
    assert_eq!(plan.len(), 38);
    assert_eq!(plan.senders().count(), 36);
    let servers: Vec<NodeId> = plan.receivers().map(|f| f.node).collect();
    assert_eq!(servers, vec![NodeId(18), NodeId(19)]);
    for sender in plan.senders() {
        assert!(sender.node.0 < 18);
        assert!(matches!(sender.destination, Destination::Unicast { node, .. } if node.0 >= 18));
    }

    let report = Simulation::new(scenario).run().unwrap();
    assert_eq!(report.routing, RoutingKind::Aodv);
    assert_eq!(report.final_time_s, 10.0);
    assert_eq!(report.flows.len(), 38);
    assert!(report.packets_delivered > 0);
}

#[test]
fn broadcast_plan_uses_node_zero_as_the_only_sender() {
    let scenario = build(&ScenarioArgs::default().with_distribution(1));
    let plan = scenario.plan();
    let broadcast = scenario.network().addresses.broadcast();

    let senders: Vec<_> = plan.senders().collect();
    assert_eq!(senders.len(), 1);
    assert_eq!(senders[0].node, NodeId(0));
    assert_eq!(senders[0].destination, Destination::Broadcast { address: broadcast });

    let receivers: Vec<u32> = plan.receivers().map(|f| f.node.0).collect();
    assert_eq!(receivers, (1..20).collect::<Vec<_>>());
    for flow in plan.flows() {
        assert_eq!(flow.start, SimTime::from_secs(1));
        assert_eq!(flow.stop, SimTime::from_secs(10));
        assert_eq!(flow.port, 9);
    }
}

#[test]
fn stop_time_of_six_is_the_minimum() {
    let short = ScenarioArgs::default().with_stop_time(5.0);
    assert!(matches!(
        ScenarioConfig::resolve(&short),
        Err(ScenarioError::StopTimeTooShort { .. })
    ));

    let report = Simulation::new(build(&ScenarioArgs::default().with_stop_time(6.0)))
        .run()
        .unwrap();
    assert_eq!(report.final_time_s, 6.0);
}

#[test]
fn every_routing_selector_runs_to_completion() {
    for routing in 0..4 {
        let report = Simulation::new(build(&ScenarioArgs::default().with_routing(routing)))
            .run()
            .unwrap();
        assert!(report.packets_sent > 0, "routing {routing} sent nothing");
        assert_eq!(report.final_time_s, 10.0);
    }
}

#[test]
fn static_neighbours_deliver_before_olsr_converges() {
    // Node 17 sits next to both servers, so the on-link route carries its traffic from the start
    let report = Simulation::new(build(&ScenarioArgs::default().with_routing(0)))
        .run()
        .unwrap();
    let node17 = report
        .flows
        .iter()
        .find(|f| f.node == 17 && f.role == FlowRole::Sender)
        .unwrap();
    assert!(node17.first_tx_s.unwrap() < 2.0);
    assert!(node17.rx_packets > 0);
}

#[test]
fn writes_every_trace_file() {
    let dir = scratch_dir("traces");
    let mut args = ScenarioArgs::default().with_routing(3);
    args.output.dir = Some(dir.clone());
    args.output.prefix = "dsr".into();

    let report = Simulation::new(build(&args)).run().unwrap();

    let ascii = std::fs::read_to_string(dir.join("dsr.tr")).unwrap();
    assert!(ascii.lines().any(|l| l.starts_with("t ") && l.contains(" route=")));
    assert!(ascii.lines().any(|l| l.starts_with("r ")));

    for node in 0..20 {
        assert!(dir.join(format!("dsr-{node}-1.pcap")).exists());
    }

    let anim: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.join("dsr-anim.json")).unwrap()).unwrap();
    assert_eq!(anim["nodes"].as_array().unwrap().len(), 20);
    assert!(!anim["packets"].as_array().unwrap().is_empty());

    let mut flows = csv::Reader::from_path(dir.join("dsr-flows.csv")).unwrap();
    assert_eq!(flows.records().count(), 38);

    let saved: SimulationReport =
        serde_json::from_str(&std::fs::read_to_string(dir.join("dsr-report.json")).unwrap()).unwrap();
    assert_eq!(saved.packets_delivered, report.packets_delivered);
    assert_eq!(saved.routing, RoutingKind::Dsr);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn disabled_sinks_leave_no_files() {
    let dir = scratch_dir("quiet");
    let mut args = ScenarioArgs::default();
    args.output.dir = Some(dir.clone());
    args.output.pcap = false;
    args.output.ascii = false;
    args.output.animation = false;

    Simulation::new(build(&args)).run().unwrap();

    assert!(!dir.join("adhoc.tr").exists());
    assert!(!dir.join("adhoc-0-1.pcap").exists());
    assert!(!dir.join("adhoc-anim.json").exists());
    assert!(dir.join("adhoc-flows.csv").exists());
    assert!(dir.join("adhoc-report.json").exists());

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn isolated_tcp_senders_report_connect_failures() {
    // 1 m of range on a 20 m grid leaves every node alone
    let mut args = ScenarioArgs {
        nodes: 4,
        servers: 1,
        ..ScenarioArgs::default()
    }
    .with_traffic_type(1)
    .with_stop_time(40.0);
    args.wifi.radio_range_m = 1.0;

    let report = Simulation::new(build(&args)).run().unwrap();
    assert_eq!(report.packets_sent, 0);
    assert_eq!(report.packets_dropped, 0);
    assert_eq!(report.connect_failures, 3);
    assert!(report.flows.iter().filter(|f| f.role == FlowRole::Sender).all(|f| f.connect_failures == 1));
}

#[test]
fn invalid_routing_selector_exits_with_status_one() {
    let output = std::process::Command::new(env!("CARGO_BIN_EXE_adhocsim"))
        .args(["run", "--routing", "4", "--no-pcap", "--no-ascii", "--no-animation"])
        .current_dir(std::env::temp_dir())
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid routing selector: 4"));
}
