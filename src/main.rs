mod analyser;
mod ui;

use analyser::core::AnalysisOptions;
use analyser::scan::DEFAULT_TIME_THRESHOLD;
use clap::{ArgAction, Parser};
use std::{fs, path::Path, process};
use ui::output;

/// backlogsniff counts SYN/ACK retransmissions in scan captures to infer a server's backlog behaviour
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// pcap/pcapng file to analyze (or IPID list with --ipid)
    #[arg(value_parser)]
    file: String,

    /// Seconds after the first SYN that separate the backlog probe from the scan window
    #[arg(short = 't', long, default_value_t = DEFAULT_TIME_THRESHOLD, value_parser)]
    threshold: f64,

    /// Capture comes from a scan with injected RST segments (implied by "rst" in the file name)
    #[arg(short = 'r', long, action = ArgAction::SetTrue)]
    rst: bool,

    /// Directory to write retransmissions.json to
    #[arg(short = 'o', long, value_parser)]
    output_dir: Option<String>,

    /// Display output as formatted JSON
    #[arg(short = 'j', long, action = ArgAction::SetTrue)]
    json: bool,

    /// Treat FILE as one IPID per line and check if the sequence is global
    #[arg(short = 'i', long, action = ArgAction::SetTrue)]
    ipid: bool,
}

fn run_ipid(file: &str) -> i32 {
    let input = match fs::read_to_string(file) {
        Ok(input) => input,
        Err(err) => {
            log::error!("Could not read {file}: {err}");
            return 2;
        }
    };

    let ipids = analyser::ipid::parse_sequence(&input);
    log::info!("Read {} IPIDs.", ipids.len());
    let global = analyser::ipid::is_global_sequence(&ipids);
    output::print_ipid_result(global);

    if global { 0 } else { 1 }
}

fn run_retransmissions(args: &Args) -> i32 {
    if let Some(out_dir) = args.output_dir.as_deref() {
        log::info!("Output directory {out_dir}");
        if let Err(err) = fs::create_dir_all(out_dir) {
            log::error!("Could not create {out_dir}: {err}");
            return 2;
        }
    }

    let packets = match analyser::utils::load_file(&args.file) {
        Ok(packets) => packets,
        Err(_) => return 2,
    };

    let options = AnalysisOptions {
        time_threshold: args.threshold,
        reset_hint: args.rst || analyser::utils::reset_hint_from_path(&args.file),
    };
    log::debug!("{options:?}");

    let session = analyser::core::analyse(&packets, &options);

    // ---- Output ----
    if args.json {
        match output::data_as_json(&session) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                log::error!("Could not serialise session: {err}");
                return 2;
            }
        }
    } else {
        output::print_results(&session);
    }

    if let Some(out_dir) = args.output_dir.as_deref() {
        let written = output::data_as_json(&session)
            .map_err(std::io::Error::from)
            .and_then(|json| output::data_to_file(json, &Path::new(out_dir).join("retransmissions.json")));
        if let Err(err) = written {
            log::error!("Could not write session: {err}");
            return 2;
        }
    }

    0
}

fn main() {
    if let Err(err) = simple_logger::init_with_env() {
        eprintln!("Could not set up logging: {err}");
    }

    let args = Args::parse();

    let code = if args.ipid {
        run_ipid(&args.file)
    } else {
        run_retransmissions(&args)
    };

    process::exit(code);
}
