use std::time::Instant;

use anyhow::{Context, Result};
use itertools::Itertools;
use rand::SeedableRng;
use rand::rngs::StdRng;

use pn_engine::config::EngineConfig;
use pn_engine::net::{FireError, MarkingReport, Net, io};
use pn_engine::options::{Options, PnCommand};
use pn_engine::report::{FiringStep, SimulationReport};

fn main() -> Result<()> {
    if std::env::var("PN_LOG").is_ok() {
        let e = env_logger::Env::new()
            .filter("PN_LOG")
            .write_style("PN_LOG_STYLE");
        env_logger::init_from_env(e);
    }

    let options = match Options::parse_from_args(std::env::args_os().skip(1)) {
        Ok(options) => options,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };
    log::debug!("PN options: {:?}", options);

    let config = EngineConfig::load_from_file(&options.config)?;
    let document = io::read_document(&options.net)
        .with_context(|| format!("Failed to read net document: {:?}", options.net))?;
    let mut net = document
        .build(config.clone())
        .with_context(|| format!("Failed to build net from {:?}", options.net))?;

    match options.command {
        PnCommand::Enabled => {
            let enabled = net.enabled_transitions()?;
            println!("{}", names(&net, &enabled));
        }
        PnCommand::Simulate { steps } => {
            let seed = options.seed.or(config.seed);
            let report = simulate(&mut net, steps, seed)?;
            match &options.output {
                Some(path) => report
                    .save_to_file(path)
                    .with_context(|| format!("Failed to write report: {:?}", path))?,
                None => println!("{}", report.to_json()?),
            }
            log::info!("{}", report);
        }
    }
    Ok(())
}

fn names(net: &Net, transitions: &[pn_engine::net::TransitionId]) -> String {
    transitions
        .iter()
        .filter_map(|id| net.get_transition(*id))
        .map(|transition| transition.name.as_str())
        .join(", ")
}

fn simulate(net: &mut Net, steps: usize, seed: Option<u64>) -> Result<SimulationReport> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let start = Instant::now();
    let initial_marking = MarkingReport::from_net(net);
    let mut fired = Vec::new();
    let mut deadlocked = false;

    for step in 1..=steps {
        match net.fire_random_transition(&mut rng) {
            Ok(transition) => {
                let name = net
                    .get_transition(transition)
                    .map(|t| t.name.clone())
                    .unwrap_or_default();
                log::info!("step {}: fired {}", step, name);
                fired.push(FiringStep {
                    step,
                    transition: name,
                });
            }
            Err(FireError::NoEnabledTransitions) => {
                log::warn!("deadlock after {} firings", fired.len());
                deadlocked = true;
                break;
            }
            Err(err) => return Err(err).context(format!("firing failed at step {step}")),
        }
    }

    Ok(SimulationReport {
        net: net.name.clone(),
        seed,
        steps_requested: steps,
        fired,
        deadlocked,
        initial_marking,
        final_marking: MarkingReport::from_net(net),
        elapsed: start.elapsed(),
    })
}
