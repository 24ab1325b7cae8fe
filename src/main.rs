//! The per-node process: parses the command line, loads the cluster configuration, boots the
//! node's transport, and then drives proposals either from `--propose`/`--delay` or from an
//! interactive stdin loop, one candidate id per line.
//!
//! Run as `paxos-council <MemberId> [--config PATH] [--propose CANDIDATE] [--delay MILLIS]`.
//! Set `RUST_LOG=paxos_council=info` for per-phase diagnostics.

#[macro_use]
extern crate text_io;

use std::io::{self, Write};
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use log::info;

use paxos_council::config::ClusterConfig;
use paxos_council::node::Node;
use paxos_council::transport::TcpTransport;

#[derive(Parser, Debug)]
#[command(name = "paxos-council")]
struct Cli {
    /// This node's member-id, e.g. M4. Must be present in the cluster configuration.
    member_id: String,

    #[arg(long, default_value = "Config")]
    config: String,

    /// Schedule one automatic proposal for this candidate after `--delay` milliseconds.
    #[arg(long)]
    propose: Option<String>,

    #[arg(long, default_value_t = 0)]
    delay: u64,
}

/// The known flags this binary supports. Any other `--flag` on the command line is dropped
/// before we ever hand the arguments to clap, per the "unknown flags are ignored" contract.
const KNOWN_FLAGS: [&str; 3] = ["--config", "--propose", "--delay"];

fn filter_known_args(raw: impl Iterator<Item = String>) -> Vec<String> {
    let mut out = Vec::new();
    let mut args = raw.peekable();

    if let Some(program) = args.next() {
        out.push(program);
    }

    while let Some(arg) = args.next() {
        if !arg.starts_with("--") {
            out.push(arg);
            continue;
        }

        let flag_name = arg.splitn(2, '=').next().unwrap_or(&arg).to_string();
        if !KNOWN_FLAGS.contains(&flag_name.as_str()) {
            continue;
        }

        out.push(arg.clone());
        if !arg.contains('=') {
            if let Some(value) = args.peek() {
                out.push(value.clone());
                args.next();
            }
        }
    }

    out
}

fn main() {
    env_logger::init();

    let cli = match Cli::try_parse_from(filter_known_args(std::env::args())) {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            process::exit(1);
        }
    };

    info!("{:?}", cli);

    let config = match ClusterConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    if !config.contains(&cli.member_id) {
        eprintln!("'{}' is not present in '{}'", cli.member_id, cli.config);
        process::exit(2);
    }

    let transport = Arc::new(TcpTransport::new(cli.member_id.clone(), config.addrs()));
    let node = Arc::new(Node::new(cli.member_id.clone(), config, transport));

    if let Err(e) = node.start() {
        eprintln!("{}", e);
        process::exit(1);
    }

    if let Some(candidate) = cli.propose {
        let scheduled = node.clone();
        let delay = cli.delay;
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(delay));
            if let Err(e) = scheduled.propose(&candidate) {
                eprintln!("{}", e);
            }
        });
    }

    run_interactive_loop(&node);
}

/// Reads one candidate id per line from stdin and starts phase 1 on it. Unknown ids are rejected
/// with a diagnostic; no state changes as a result.
fn run_interactive_loop(node: &Arc<Node>) {
    loop {
        print!("> ");
        if io::stdout().flush().is_err() {
            break;
        }

        let line: String = read!("{}\n");
        let candidate = line.trim();
        if candidate.is_empty() {
            continue;
        }

        if let Err(e) = node.propose(candidate) {
            eprintln!("{}", e);
        }
    }
}
