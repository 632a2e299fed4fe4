extern crate env_logger;
extern crate getopts;
extern crate txgraph;

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process;

use txgraph::config::{batch_size_for, Config};
use txgraph::label::{decimal_mapping, ordinal_mapping, width_for, Concatenate, Label, Labelling};
use txgraph::AddressResolver;

fn usage(opts: &getopts::Options) -> String {
    opts.usage("usage: txgraph [options] <inputs> <outputs> <basename>\n\
                writes <basename>.{offsets,targets,labeloffsets,labels,ids}")
}

fn main() {
    env_logger::init();

    let mut opts = getopts::Options::new();
    opts.optopt("s", "batch-size", "arcs per batch", "N");
    opts.optopt("T", "temp-dir", "directory for batch files", "DIR");
    opts.optopt("u", "universe", "number of distinct transactions; selects fixed-width labels", "N");
    opts.optflag("m", "merge", "label arcs with the list of all their transactions");
    opts.optflag("o", "ordinal", "number transactions in order of appearance instead of parsing them");
    opts.optflag("", "strict", "fail on unknown addresses and unmatched transactions");
    opts.optflag("h", "help", "print this help");

    let matches = match opts.parse(std::env::args().skip(1)) {
        Ok(matches) => matches,
        Err(error) => {
            eprintln!("{}\n{}", error, usage(&opts));
            process::exit(1);
        }
    };
    if matches.opt_present("h") || matches.free.len() != 3 {
        println!("{}", usage(&opts));
        process::exit(if matches.opt_present("h") { 0 } else { 1 });
    }

    let universe: Option<u64> = matches.opt_str("u").map(|x| x.parse().expect("malformed universe"));
    let width = universe.map(width_for).unwrap_or(64);

    let mut config = Config::default();
    config.strict = matches.opt_present("strict");
    config.temp_dir = matches.opt_str("T").map(PathBuf::from);
    config.batch_size = match (matches.opt_str("s"), universe) {
        (Some(size), _) => size.parse().expect("malformed batch size"),
        (None, Some(universe)) => std::cmp::min(config.batch_size, batch_size_for(universe)),
        (None, None) => config.batch_size,
    };

    let mapping = if matches.opt_present("o") { ordinal_mapping() } else { decimal_mapping() };
    let labelling = if matches.opt_present("m") {
        Labelling::new(Label::mergeable_list(width).expect("label width"), mapping).with_merge(Concatenate)
    }
    else {
        match universe {
            Some(universe) => Labelling::new(Label::for_universe(universe), mapping),
            None => Labelling::new(Label::scalar(), mapping),
        }
    };

    let open = |path: &str| match File::open(path) {
        Ok(file) => BufReader::with_capacity(1 << 20, file),
        Err(error) => {
            eprintln!("{}: {}", path, error);
            process::exit(1);
        }
    };
    let inputs = open(&matches.free[0]);
    let outputs = open(&matches.free[1]);

    match txgraph::build(inputs, outputs, AddressResolver::assign(), labelling, config, &matches.free[2]) {
        Ok(stats) => println!("{} nodes, {} arcs ({} transactions, {} without outputs)",
                              stats.nodes, stats.materialized, stats.transactions, stats.unmatched),
        Err(error) => {
            eprintln!("error: {}", error);
            process::exit(1);
        }
    }
}
