//! Parsing Options.
//! `pn enabled <NET>` or `pn simulate <NET> -s {steps} --seed {n}`

use clap::{Arg, ArgMatches, Command, value_parser};
use std::error::Error;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PnCommand {
    /// 打印初始标识下的使能集合。
    Enabled,
    /// 随机发射迁移，直到步数用完或网死锁。
    Simulate { steps: usize },
}

fn make_options_parser() -> clap::Command {
    let net = Arg::new("net")
        .value_name("NET")
        .help("Net document (.json or .ron)")
        .required(true)
        .value_parser(value_parser!(PathBuf));

    Command::new("pn")
        .no_binary_name(true)
        .version("v0.1.0")
        .about("Coloured Petri net marking and firing engine")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Engine configuration (TOML)")
                .default_value("pn.toml")
                .global(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .subcommand(
            Command::new("enabled")
                .about("Print the transitions enabled under the initial marking")
                .arg(net.clone()),
        )
        .subcommand(
            Command::new("simulate")
                .about("Fire randomly selected transitions")
                .arg(net)
                .arg(
                    Arg::new("steps")
                        .short('s')
                        .long("steps")
                        .help("Maximum number of firings")
                        .default_value("100")
                        .value_parser(value_parser!(usize)),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .help("RNG seed, overrides the configured one")
                        .value_parser(value_parser!(u64)),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("FILE")
                        .help("Path to file where the simulation report will be stored"),
                ),
        )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub command: PnCommand,
    pub net: PathBuf,
    pub config: PathBuf,
    pub seed: Option<u64>,
    pub output: Option<PathBuf>,
}

impl Options {
    pub fn parse_from_args<I, T>(flags: I) -> Result<Self, Box<dyn Error>>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let app = make_options_parser();
        let matches = app.try_get_matches_from(flags)?;
        let config = matches
            .get_one::<PathBuf>("config")
            .cloned()
            .unwrap_or_else(|| PathBuf::from("pn.toml"));

        let (command, sub) = match matches.subcommand() {
            Some(("enabled", sub)) => (PnCommand::Enabled, sub),
            Some(("simulate", sub)) => {
                let steps = sub.get_one::<usize>("steps").copied().unwrap_or(100);
                (PnCommand::Simulate { steps }, sub)
            }
            _ => return Err("UnsupportedCommand")?,
        };

        Ok(Options {
            command,
            net: required_path(sub, "net")?,
            config,
            seed: sub.try_get_one::<u64>("seed").ok().flatten().copied(),
            output: sub.try_get_one::<String>("output").ok().flatten().map(PathBuf::from),
        })
    }
}

fn required_path(matches: &ArgMatches, id: &str) -> Result<PathBuf, Box<dyn Error>> {
    match matches.get_one::<PathBuf>(id) {
        Some(path) => Ok(path.clone()),
        None => Err(format!("missing argument `{id}`").into()),
    }
}
