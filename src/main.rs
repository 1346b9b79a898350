//! Run the uncoordinated trial and the MESI trial side by side and print
//! what each did to `x`.

use std::process;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use env_logger::Env;
use log::{debug, error};

use coherence_sim::config::{DEFAULT_CORES, DEFAULT_ITERATIONS};
use coherence_sim::{
    BroadcastPolicy, ConsoleSink, Mode, RaceWindow, ReportSink, SimConfig, SimResult, Simulation,
    WritePattern,
};

#[derive(Parser, Debug)]
#[command(
    name = "coherence-sim",
    version,
    about = "Lost updates without a coherence protocol, and none with MESI"
)]
struct Cli {
    /// Number of simulated cores, one worker thread each.
    #[arg(long, default_value_t = DEFAULT_CORES)]
    cores: usize,

    /// Accesses each core performs.
    #[arg(long, default_value_t = DEFAULT_ITERATIONS)]
    iterations: usize,

    /// Chance that an access writes.
    #[arg(long, default_value_t = 0.5)]
    write_probability: f64,

    /// Seed for reproducible write decisions.
    #[arg(long)]
    seed: Option<u64>,

    /// What uncoordinated cores do between reading and writing `x`.
    #[arg(long, value_enum, default_value_t = WindowKind::Sleep)]
    race_window: WindowKind,

    /// Length of the sleep race window, in microseconds.
    #[arg(long, default_value_t = 1000)]
    race_window_us: u64,

    /// Let the owner of `x` write without re-broadcasting an invalidation.
    #[arg(long)]
    skip_owner_broadcast: bool,

    /// Which trials to run.
    #[arg(long, value_enum, default_value_t = Trials::Both)]
    mode: Trials,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum WindowKind {
    Sleep,
    Yield,
    Immediate,
    Lockstep,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Trials {
    Both,
    Uncoordinated,
    Coherent,
}

impl Cli {
    fn config(&self) -> SimConfig {
        let race_window = match self.race_window {
            WindowKind::Sleep => RaceWindow::Sleep(Duration::from_micros(self.race_window_us)),
            WindowKind::Yield => RaceWindow::Yield,
            WindowKind::Immediate => RaceWindow::Immediate,
            WindowKind::Lockstep => RaceWindow::Lockstep,
        };
        let broadcast = if self.skip_owner_broadcast {
            BroadcastPolicy::SkipWhenOwner
        } else {
            BroadcastPolicy::Always
        };

        SimConfig::default()
            .cores(self.cores)
            .iterations(self.iterations)
            .pattern(WritePattern::Random { probability: self.write_probability, seed: self.seed })
            .race_window(race_window)
            .broadcast(broadcast)
    }

    fn modes(&self) -> &'static [Mode] {
        match self.mode {
            Trials::Both => &[Mode::Uncoordinated, Mode::Coherent],
            Trials::Uncoordinated => &[Mode::Uncoordinated],
            Trials::Coherent => &[Mode::Coherent],
        }
    }
}

fn run(cli: &Cli) -> SimResult<()> {
    let sim = Simulation::new(cli.config())?;
    debug!("{:?}", sim.config());
    let mut sink = ConsoleSink::stdout();

    for &mode in cli.modes() {
        let report = sim.run(mode)?;
        sink.report(&report)?;
    }

    Ok(())
}

fn main() {
    let env = Env::default().filter_or("COHERENCE_SIM_LOG", "warn");
    env_logger::init_from_env(env);

    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        error!("{}", e);
        process::exit(1);
    }
}
