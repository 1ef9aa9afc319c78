use std::path::PathBuf;
use std::process::exit;

use structopt::StructOpt;

use crate::loader::loader::load;
use crate::simulator::{load_sim_config, Simulator};

mod engine;
mod instructions;
mod loader;
mod simulator;
#[cfg(test)]
mod simulator_tests;

#[derive(StructOpt, Debug)]
#[structopt(name = "Tomasulo Simulator")]
struct Opt {
    /// Path of the instruction file to load
    #[structopt(short, long, parse(from_os_str))]
    file: PathBuf,

    /// Sets a custom config file
    #[structopt(short, long, parse(from_os_str), default_value = "sim.yaml")]
    config: PathBuf,
}

fn main() {
    let opt = Opt::from_args();

    let config_path = opt.config.to_str().unwrap();
    let config = match load_sim_config(config_path) {
        Ok(config) => config,
        Err(error) => {
            println!("Failed to load {}. Cause: {}", config_path, error);
            exit(1);
        }
    };

    let path = opt.file.to_str().unwrap();
    println!("Loading {}", path);
    let program = match load(&config, path) {
        Ok(program) => program,
        Err(error) => {
            println!("Loading program '{}' failed: {}", path, error);
            exit(1);
        }
    };

    let mut simulator = Simulator::new(&config);
    simulator.init(&program);
    simulator.run();

    let perf_counters = simulator.perf_counters();
    println!("Simulation complete [Cycles={}][Issued={}][Stalled={}][Executed={}][Writebacks={}]",
             perf_counters.cycle_cnt,
             perf_counters.issue_cnt,
             perf_counters.stall_cnt,
             perf_counters.execute_cnt,
             perf_counters.writeback_cnt);

    print!("Registers:");
    for reg in 0..config.reg_count {
        print!(" R{}={}", reg, simulator.reg_value(reg));
    }
    println!();
}
