extern crate env_logger;
extern crate getopts;
extern crate txgraph;

use std::process;

use txgraph::graphmap::LabelledGraphMMap;
use txgraph::Label;

// prints `source -> target (label)` for every arc of a stored graph

fn main() {
    env_logger::init();

    let mut opts = getopts::Options::new();
    opts.optopt("l", "labels", "label kind: scalar, fixed:W, list or mergeable:W", "KIND");

    let matches = match opts.parse(std::env::args().skip(1)) {
        Ok(matches) if matches.free.len() == 1 => matches,
        _ => {
            println!("{}", opts.short_usage("txprint <basename>"));
            process::exit(1);
        }
    };

    let kind = matches.opt_str("l").unwrap_or_else(|| "scalar".to_owned());
    let width = |text: &str| text.parse::<u32>().expect("malformed label width");
    let prototype = match kind.split(':').collect::<Vec<_>>()[..] {
        ["scalar"] => Label::scalar(),
        ["fixed", w] => Label::fixed(width(w)).expect("label width"),
        ["list"] => Label::list(),
        ["mergeable", w] => Label::mergeable_list(width(w)).expect("label width"),
        _ => {
            eprintln!("unknown label kind {:?}", kind);
            process::exit(1);
        }
    };

    let graph = match LabelledGraphMMap::new(&matches.free[0]) {
        Ok(graph) => graph,
        Err(error) => {
            eprintln!("{}: {}", matches.free[0], error);
            process::exit(1);
        }
    };
    for node in 0..graph.nodes() {
        let labels = match graph.labels(node, &prototype) {
            Ok(labels) => labels,
            Err(error) => {
                eprintln!("node {}: {}", node, error);
                process::exit(1);
            }
        };
        for (target, label) in graph.edges(node).iter().zip(labels) {
            println!("{} -> {} ({:?})", node, target, label.values());
        }
    }
}
