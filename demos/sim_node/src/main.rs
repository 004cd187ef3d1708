use std::{io::BufRead as _, time::Duration};

use clap::Parser;
use igniter_node::{
    common::{
        config::LoadError, constants::object_ids, node_id::InvalidNodeIdError, NodeConfig, NodeId,
    },
    hal::{Monotonic, Peripherals},
    ActuationHook, FastCadence, Runtime, TaskQueue,
};
use igniter_sim::{
    Isr, Journal, MemoryDictionary, RealtimeBoard, SimOutput, SimProcessData, SimStack,
    SimSystem, SimTimer, StackControl, StdClock, ThreadTicker,
};
use snafu::{ResultExt, Snafu};

static QUEUE: TaskQueue = TaskQueue::new();
static HOOK: ActuationHook = ActuationHook::new(&QUEUE);

type Fast = FastCadence<SimProcessData<StdClock>, SimTimer<StdClock>>;

#[derive(Parser, Debug)]
struct Args {
    /// Node config TOML file. Defaults are used when omitted.
    #[clap(long, short)]
    config: Option<String>,
    /// Override the node ID (255 for unconfigured)
    #[clap(long, short)]
    node_id: Option<u8>,
    /// Override the CAN bit rate in kbit/s
    #[clap(long, short)]
    bitrate: Option<u16>,
}

#[derive(Debug, Snafu)]
enum ConfigError {
    #[snafu(display("{source}"), context(false))]
    Load { source: LoadError },
    #[snafu(display("Bad --node-id: {source}"))]
    NodeIdArg { source: InvalidNodeIdError },
    #[snafu(display("Invalid node config: {message}"))]
    Invalid { message: &'static str },
}

fn load_config(args: &Args) -> Result<NodeConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => NodeConfig::load_from_file(path)?,
        None => NodeConfig::DEFAULT,
    };
    if let Some(id) = args.node_id {
        config.node_id = NodeId::try_from(id).context(NodeIdArgSnafu)?;
    }
    if let Some(bitrate) = args.bitrate {
        config.bitrate_kbps = bitrate;
    }
    config
        .validate()
        .map_err(|message| InvalidSnafu { message }.build())?;
    Ok(config)
}

/// Read commands from stdin, and play them to the node as remote accesses
fn console(
    clock: StdClock,
    control: StackControl,
    od: &'static MemoryDictionary,
    output: SimOutput<StdClock>,
) {
    println!("Commands: ignite, cancel, write <value>, status, reset-comm, reset-app");
    for line in std::io::stdin().lock().lines() {
        let Ok(line) = line else {
            break;
        };
        let now = Duration::from_micros(clock.now_us());
        let mut words = line.split_whitespace();
        match (words.next(), words.next()) {
            (Some("ignite"), None) => {
                control.sdo_write(now, object_ids::IGNITE, object_ids::IGNITE_SUB, &[1])
            }
            (Some("cancel"), None) => {
                control.sdo_write(now, object_ids::IGNITE, object_ids::IGNITE_SUB, &[0])
            }
            (Some("write"), Some(value)) => match value.parse::<u8>() {
                Ok(v) => control.sdo_write(now, object_ids::IGNITE, object_ids::IGNITE_SUB, &[v]),
                Err(e) => println!("Invalid value {value}: {e}"),
            },
            (Some("status"), None) => {
                let mirror = od.stored_u8(object_ids::IGNITE, object_ids::IGNITE_SUB);
                println!(
                    "output: {}, 0x2111: {:?}, nmt: {}, counters: {:?}",
                    if output.is_active() { "on" } else { "off" },
                    mirror,
                    control.nmt_state(),
                    control.counters()
                );
            }
            (Some("reset-comm"), None) => control.reset_communication(now),
            (Some("reset-app"), None) => control.reset_application(now),
            (None, _) => (),
            _ => println!("Unknown command: {line}"),
        }
    }
}

fn main() {
    // Initialize the logger
    env_logger::init();
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    };
    log::info!("Starting node {} at {} kbit/s", config.node_id, config.bitrate_kbps);

    let clock = StdClock::new();
    let od = MemoryDictionary::with_defaults().leak();
    let stack = SimStack::new(clock, od, Journal::default());
    let control = stack.control();

    // The interrupt handler must be static, so use Box::leak to make static refs from the heap
    let fast: &'static Fast = Box::leak(Box::new(FastCadence::new(SimTimer::new(clock))));
    let isr: Isr = Box::leak(Box::new(move || fast.on_interrupt()));

    let output = SimOutput::new(clock);
    let peripherals = Peripherals::<RealtimeBoard> {
        clock,
        ticker: ThreadTicker::new(isr),
        full_timer: SimTimer::new(clock),
        output: output.clone(),
        system: SimSystem,
    };

    let runtime = match Runtime::new(config, stack, od, &HOOK, fast, peripherals) {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    };

    std::thread::spawn(move || console(clock, control, od, output));
    runtime.run()
}
