// Copyright 2025 Servus Altissimi (Pseudonym)

// Permission is hereby granted, free of charge, to any person obtaining a copy of this software and associated documentation files (the "Software"), to deal in the Software without restriction, including without limitation the rights to use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the Software is furnished to do so, subject to the following conditions:
// The above copyright notice and this permission notice shall be included in all copies or substantial portions of the Software.
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

use adhocsim::prelude::*;
use adhocsim::traffic::{FlowRole, OnOffModel};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_OUTPUT_DIR: &str = "results";

#[derive(Parser)]
#[command(author, version, about = "Wireless ad-hoc routing scenarios on a discrete-event clock", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one scenario
    Run {
        #[command(flatten)]
        scenario: ScenarioFlags,
    },

    /// Run every routing x distribution combination in parallel
    Compare {
        #[command(flatten)]
        scenario: ScenarioFlags,
        #[arg(long, default_value = "0,1,2,3", value_delimiter = ',')]
        routings: Vec<i64>,
        #[arg(long, default_value = "0,1", value_delimiter = ',')]
        distributions: Vec<i64>,
    },

    /// Show the registered routing protocols and traffic patterns
    List,
}

/// Scenario knobs. Unset flags fall back to `--config`, then to the built-in defaults.
#[derive(Args, Clone)]
struct ScenarioFlags {
    /// JSON scenario file with the same fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seconds, at least 6 [default: 10]
    #[arg(long, allow_negative_numbers = true)]
    stop_time: Option<f64>,

    /// Bytes per packet [default: 1024]
    #[arg(long)]
    packet_size: Option<u64>,

    /// e.g. 100kb/s, 2Mbps [default: 100kb/s]
    #[arg(long)]
    data_rate: Option<String>,

    /// 0 = UDP, 1 = TCP [default: 0]
    #[arg(long, allow_negative_numbers = true)]
    traffic_type: Option<i64>,

    /// 0 = unicast fan-out, 1 = broadcast flood [default: 0]
    #[arg(long, allow_negative_numbers = true)]
    distribution: Option<i64>,

    /// 0 = OLSR, 1 = AODV, 2 = DSDV, 3 = DSR [default: 0]
    #[arg(long, allow_negative_numbers = true)]
    routing: Option<i64>,

    /// [default: 20]
    #[arg(short = 'n', long)]
    nodes: Option<u32>,

    /// Unicast servers, the highest node ids [default: 2]
    #[arg(short = 'S', long)]
    servers: Option<u32>,

    #[arg(long)]
    seed: Option<u64>,

    /// Metres [default: 50]
    #[arg(long)]
    radio_range: Option<f64>,

    /// Exponential on/off periods, mean seconds on then off
    #[arg(long, num_args = 2, value_names = ["MEAN_ON", "MEAN_OFF"])]
    on_off: Option<Vec<f64>>,

    /// Directory for traces and reports [default: results]
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// File name prefix for traces [default: adhoc]
    #[arg(long)]
    prefix: Option<String>,

    #[arg(long)]
    no_pcap: bool,

    #[arg(long)]
    no_ascii: bool,

    #[arg(long)]
    no_animation: bool,
}

impl ScenarioFlags {
    fn to_args(&self) -> Result<ScenarioArgs> {
        let mut args = match &self.config {
            Some(path) => ScenarioArgs::from_json_file(path)?,
            None => ScenarioArgs::default(),
        };

        if let Some(v) = self.stop_time {
            args.stop_time = v;
        }
        if let Some(v) = self.packet_size {
            args.packet_size = v;
        }
        if let Some(v) = &self.data_rate {
            args.data_rate = v.clone();
        }
        if let Some(v) = self.traffic_type {
            args.traffic_type = v;
        }
        if let Some(v) = self.distribution {
            args.distribution = v;
        }
        if let Some(v) = self.routing {
            args.routing = v;
        }
        if let Some(v) = self.nodes {
            args.nodes = v;
        }
        if let Some(v) = self.servers {
            args.servers = v;
        }
        if let Some(v) = self.seed {
            args.seed = v;
        }
        if let Some(v) = self.radio_range {
            args.wifi.radio_range_m = v;
        }
        if let Some([on, off]) = self.on_off.as_deref() {
            args.on_off = OnOffModel::Exponential { mean_on_s: *on, mean_off_s: *off };
        }

        if let Some(dir) = &self.output {
            args.output.dir = Some(dir.clone());
        }
        if args.output.dir.is_none() {
            args.output.dir = Some(PathBuf::from(DEFAULT_OUTPUT_DIR));
        }
        if let Some(prefix) = &self.prefix {
            args.output.prefix = prefix.clone();
        }
        args.output.pcap &= !self.no_pcap;
        args.output.ascii &= !self.no_ascii;
        args.output.animation &= !self.no_animation;

        Ok(args)
    }
}

fn main() -> Result<()> {
    let program_start = Instant::now();

    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run { scenario } => run_single(&scenario)?,
        Commands::Compare { scenario, routings, distributions } => {
            compare(&scenario, &routings, &distributions)?;
        }
        Commands::List => list(),
    }

    info!("Total runtime: {:.2}s", program_start.elapsed().as_secs_f64());
    Ok(())
}

fn run_single(flags: &ScenarioFlags) -> Result<()> {
    let args = flags.to_args()?;
    let config = ScenarioConfig::resolve(&args)?;
    let scenario = Scenario::build(config)?;

    info!("adhocsim: Single Run");
    let report = Simulation::new(scenario).with_progress(true).run()?;

    comparison_table(&[report]);
    Ok(())
}

fn compare(flags: &ScenarioFlags, routings: &[i64], distributions: &[i64]) -> Result<()> {
    let base = flags.to_args()?;
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let dir = base
        .output
        .dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
        .join(format!("compare_{timestamp}"));

    let mut configs = Vec::new();
    for &routing in routings {
        for &distribution in distributions {
            let mut args = base.clone().with_routing(routing).with_distribution(distribution);
            args.name = None;
            match ScenarioConfig::resolve(&args) {
                Ok(config) => {
                    let mut args = args;
                    args.output.dir = Some(dir.clone());
                    args.output.prefix = config.name().to_string();
                    configs.push(ScenarioConfig::resolve(&args)?);
                }
                Err(e @ ScenarioError::IncompatibleSelectors { .. }) => {
                    warn!("Skipping routing {} / distribution {}: {}", routing, distribution, e);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    std::fs::create_dir_all(&dir)?;
    info!("adhocsim: Comparison");
    info!("Scenarios: {}", configs.len());
    info!("Output: {}", dir.display());

    let pb = ProgressBar::new(configs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.orange/yellow} {pos}/{len} {msg}")?
            .progress_chars("█▓░"),
    );

    let reports = configs
        .into_par_iter()
        .map(|config| -> Result<SimulationReport> {
            let report = Simulation::new(Scenario::build(config)?).run();
            pb.inc(1);
            report
        })
        .collect::<Result<Vec<_>>>()?;
    pb.finish_with_message("Comparison complete");

    comparison_table(&reports);

    let comparison_path = dir.join("comparison.json");
    std::fs::write(&comparison_path, serde_json::to_string_pretty(&reports)?)?;
    info!("Comparison saved to: {}", comparison_path.display());

    Ok(())
}

fn list() {
    println!("\nRouting protocols (--routing)");
    for (selector, kind) in RoutingRegistry::global().list() {
        println!("  {selector}  {kind}");
    }

    println!("\nTraffic distributions (--distribution)");
    for (selector, kind) in PatternRegistry::global().list() {
        println!("  {selector}  {kind}");
    }

    println!("\nTransports (--traffic-type)");
    for (selector, kind) in [(0, TransportKind::Datagram), (1, TransportKind::Connection)] {
        println!("  {selector}  {kind}");
    }

    println!("\nExample: adhocsim run --routing 1 --distribution 0 --stop-time 20\n");
}

// mean of the per-flow means, weighted by packets received
fn mean_delay_ms(report: &SimulationReport) -> Option<f64> {
    let (total, count) = report
        .flows
        .iter()
        .filter(|f| f.role == FlowRole::Receiver)
        .filter_map(|f| f.mean_delay_ms.map(|d| (d * f.rx_packets as f64, f.rx_packets)))
        .fold((0.0, 0u64), |(t, c), (d, n)| (t + d, c + n));
    (count > 0).then(|| total / count as f64)
}

fn comparison_table(reports: &[SimulationReport]) {
    println!("\n╔═════════════════════════════╦══════════╦═══════════╦══════════╦════════════╦════════════╗");
    println!("║ Scenario                    ║ Sent     ║ Delivered ║ Dropped  ║ Delivery   ║ Mean delay ║");
    println!("║                             ║ (pkts)   ║ (pkts)    ║ (pkts)   ║ (%)        ║ (ms)       ║");
    println!("╠═════════════════════════════╬══════════╬═══════════╬══════════╬════════════╬════════════╣");

    for report in reports {
        let delay = mean_delay_ms(report)
            .map(|d| format!("{d:.2}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "║ {:<27} ║ {:>8} ║ {:>9} ║ {:>8} ║ {:>9.2}% ║ {:>10} ║",
            report.scenario,
            report.packets_sent,
            report.packets_delivered,
            report.packets_dropped,
            report.delivery_ratio * 100.0,
            delay,
        );
    }

    println!("╚═════════════════════════════╩══════════╩═══════════╩══════════╩════════════╩════════════╝\n");

    if reports.len() > 1 {
        if let Some(best) = reports
            .iter()
            .max_by(|a, b| a.delivery_ratio.total_cmp(&b.delivery_ratio))
        {
            println!("Best delivery: {} ({:.2}%)", best.scenario, best.delivery_ratio * 100.0);
        }
        if let Some(fastest) = reports
            .iter()
            .filter_map(|r| mean_delay_ms(r).map(|d| (r, d)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
        {
            println!("Lowest delay: {} ({:.2} ms)", fastest.0.scenario, fastest.1);
        }
        println!();
    }
}
