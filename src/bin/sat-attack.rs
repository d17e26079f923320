use std::fs::File;
use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::{bail, eyre};
use color_eyre::Result;
use log::info;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use locksmith::aiger::read_aig;
use locksmith::attack::{AttackOutcome, SatAttack};
use locksmith::config::AttackConfig;
use locksmith::design::{LockedDesign, Wiring};
use locksmith::utils::{key_to_hex, parse_hex_key};

#[derive(Parser)]
#[command(author, version, about = "Key recovery on logic-locked circuits")]
struct Cli {
    /// Locked circuit in ASCII AIGER format
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Correct key in hexadecimal, used as the oracle
    #[arg(short, long, value_name = "HEX")]
    key: String,

    /// Name of the key port
    #[arg(long, default_value = "moosic_key")]
    port_name: String,

    /// Random test vectors drawn before the first key search
    #[arg(long, default_value_t = 1024)]
    initial_vectors: usize,

    /// Error threshold of AppSAT; 0 runs the exact attack
    #[arg(long, default_value_t = 0.0)]
    error_threshold: f64,

    /// DI queries between two error measurements
    #[arg(long, default_value_t = 8)]
    di_queries: usize,

    /// Random vectors per error measurement
    #[arg(long, default_value_t = 1000)]
    random_vectors: usize,

    /// Consecutive measurements below the threshold needed to stop
    #[arg(long, default_value_t = 3)]
    settle_threshold: usize,

    /// Maximum failing vectors added per measurement
    #[arg(long, value_name = "INT")]
    max_constraints: Option<usize>,

    /// Time limit per solver call, in seconds
    #[arg(short, long, value_name = "SECONDS")]
    time_limit: Option<f64>,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Write the key-search CNF to this file
    #[arg(long, value_name = "FILE")]
    cnf: Option<PathBuf>,

    /// Enumerate every key instead of running the SAT attack
    #[arg(long)]
    brute_force: bool,

    /// Check the CNF encoding against simulation on random inputs first
    #[arg(long)]
    check_translation: bool,

    /// Print debug messages
    #[arg(short, long)]
    verbose: bool,

    /// Only print warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    fn config(&self) -> AttackConfig {
        AttackConfig {
            nb_initial_vectors: self.initial_vectors,
            error_threshold: self.error_threshold,
            nb_di_queries: self.di_queries,
            nb_random_vectors: self.random_vectors,
            settle_threshold: self.settle_threshold,
            max_constraints: self.max_constraints,
            time_limit: self.time_limit,
            seed: self.seed,
            cnf_file: self.cnf.clone(),
        }
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let level = if cli.verbose {
        simplelog::LevelFilter::Debug
    } else if cli.quiet {
        simplelog::LevelFilter::Warn
    } else {
        simplelog::LevelFilter::Info
    };
    simplelog::TermLogger::init(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let time_total = std::time::Instant::now();

    let file = File::open(&cli.input)?;
    let (aig, names) = read_aig(file)?;
    info!(
        "Read {} with {} inputs, {} gates and {} outputs",
        cli.input.display(),
        aig.num_inputs(),
        aig.num_nodes(),
        aig.num_outputs()
    );
    let wiring = Wiring::from_names(&names, &cli.port_name)?;
    let key = parse_hex_key(&cli.key)?;
    let design = LockedDesign::new(aig, wiring, key)?;

    let config = cli.config();
    config.validate()?;
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut attack = SatAttack::new(&design);
    attack.set_time_limit(config.time_limit);

    if cli.check_translation {
        for _ in 0..16 {
            let inputs: Vec<bool> = (0..design.nb_inputs()).map(|_| rng.gen()).collect();
            let key: Vec<bool> = (0..design.nb_key_bits()).map(|_| rng.gen()).collect();
            attack.check_sat_translation(&inputs, &key)?;
        }
        info!("SAT translation matches simulation");
    }

    let key = if cli.brute_force {
        for _ in 0..config.nb_initial_vectors {
            let inputs: Vec<bool> = (0..design.nb_inputs()).map(|_| rng.gen()).collect();
            attack.add_test_vector(inputs);
        }
        attack
            .run_brute_force()?
            .ok_or_else(|| eyre!("no key passes the test vectors"))?
    } else {
        match attack.run(&config, &mut rng)? {
            AttackOutcome::Unlocked { key } => key,
            AttackOutcome::ApproximatelyUnlocked { key, error } => {
                info!("Approximate key with {:.3}% measured error", 100.0 * error);
                key
            }
            AttackOutcome::NoValidKey => bail!("no key is consistent with the oracle"),
        }
    };

    let stats = attack.stats();
    info!(
        "{} DI rounds, {} solver calls, {} test vectors",
        stats.di_rounds,
        stats.solver_calls,
        attack.nb_test_vectors()
    );
    println!("{}", key_to_hex(&key));

    let time_total = time_total.elapsed();
    info!("Done in {:.3} s", time_total.as_secs_f64());

    Ok(())
}
