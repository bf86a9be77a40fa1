//! `born-again <run-config.json>`: builds the born-again tree of a random
//! forest and writes `<output_prefix>.out` and `<output_prefix>.tree`.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;

use born_again_trees::{BornAgainError, BornAgainTree, RandomForest, Result, RunConfig};

/// Stack of the build thread: the recursions go as deep as the total number of levels.
const BUILD_STACK_SIZE: usize = 256 * 1024 * 1024;

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(prefix.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn run(config_path: &str) -> Result<()> {
    let config = RunConfig::load(config_path)?;
    let mut forest = RandomForest::load(&config.forest_path)?;
    if let Some(nb_trees) = config.nb_trees {
        forest.truncate(nb_trees);
    }
    let mut params = config.to_params(&forest)?;
    let output_prefix = config.output_prefix.clone();

    let handle = thread::Builder::new().name(String::from("born-again-build")).stack_size(BUILD_STACK_SIZE).spawn(
        move || -> Result<()> {
            let mut born_again = BornAgainTree::new(&mut params, &forest);
            born_again.build()?;
            born_again.display_run_statistics();
            born_again.export_run_statistics(with_suffix(&output_prefix, ".out"));
            born_again.export_tree(with_suffix(&output_prefix, ".tree"));
            Ok(())
        },
    )?;

    handle.join().map_err(|_| BornAgainError::InternalInconsistency {
        stage: "building the born-again tree",
        detail: String::from("the build thread panicked"),
    })?
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <run-config.json>", args.first().map(String::as_str).unwrap_or("born-again"));
        return ExitCode::FAILURE;
    }

    match run(&args[1]) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
