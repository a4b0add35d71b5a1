use clap::{value_parser, Arg, ArgAction, Command, ValueEnum};
use csv::Writer;
use std::fmt;
use std::fs::{create_dir_all, File, OpenOptions};
use std::io::stdout;
use std::path::Path;
use std::time::Duration;

#[derive(PartialEq, Eq, Debug, ValueEnum, Clone, Copy)]
pub enum SetImpl {
    LockFree,
    Mutex,
    Rwlock,
}

impl SetImpl {
    pub fn name(&self) -> String {
        self.to_possible_value().unwrap().get_name().to_string()
    }
}

/// Per-kind success/failure tallies, aggregated over threads and
/// repetitions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OpCounts {
    pub insert_succ: u64,
    pub insert_fail: u64,
    pub delete_succ: u64,
    pub delete_fail: u64,
    pub search_succ: u64,
    pub search_fail: u64,
}

impl OpCounts {
    pub fn merge(&mut self, other: &OpCounts) {
        self.insert_succ += other.insert_succ;
        self.insert_fail += other.insert_fail;
        self.delete_succ += other.delete_succ;
        self.delete_fail += other.delete_fail;
        self.search_succ += other.search_succ;
        self.search_fail += other.search_fail;
    }

    pub fn total(&self) -> u64 {
        self.insert_succ
            + self.insert_fail
            + self.delete_succ
            + self.delete_fail
            + self.search_succ
            + self.search_fail
    }
}

impl fmt::Display for OpCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ins {}/{}, del {}/{}, search {}/{}",
            self.insert_succ,
            self.insert_fail,
            self.delete_succ,
            self.delete_fail,
            self.search_succ,
            self.search_fail
        )
    }
}

pub struct Config {
    pub set_impl: SetImpl,
    pub threads: usize,
    pub key_range: usize,
    pub inserts: usize,
    pub deletes: usize,
    pub searches: usize,
    pub reps: usize,
    pub seed: u64,
    pub warmup: Duration,
}

impl Config {
    pub fn ops_per_thread(&self) -> usize {
        self.inserts + self.deletes + self.searches
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} threads, r{}, i/d/s {}/{}/{}, {} reps, seed {}",
            self.set_impl.name(),
            self.threads,
            self.key_range,
            self.inserts,
            self.deletes,
            self.searches,
            self.reps,
            self.seed,
        )
    }
}

pub struct BenchWriter {
    output: Option<Writer<File>>,
}

impl BenchWriter {
    /// One record per benchmark cell; appended to the configured file, or
    /// printed to stdout when none is.
    pub fn write_record(self, config: &Config, counts: &OpCounts, elapsed_ns: u128) {
        let record = [
            config.set_impl.name(),
            config.threads.to_string(),
            config.key_range.to_string(),
            format!("{}/{}/{}", config.inserts, config.deletes, config.searches),
            counts.total().to_string(),
            counts.insert_succ.to_string(),
            counts.insert_fail.to_string(),
            counts.delete_succ.to_string(),
            counts.delete_fail.to_string(),
            counts.search_succ.to_string(),
            counts.search_fail.to_string(),
            elapsed_ns.to_string(),
        ];
        match self.output {
            Some(mut output) => {
                output.write_record(&record).unwrap();
                output.flush().unwrap();
            }
            None => {
                let mut output = csv::Writer::from_writer(stdout());
                output.write_record(&record).unwrap();
                output.flush().unwrap();
            }
        }
    }
}

const HEADER: [&str; 12] = [
    "impl",
    "threads",
    "range",
    "ops_per_kind",
    "total_ops",
    "insert_succ",
    "insert_fail",
    "delete_succ",
    "delete_fail",
    "search_succ",
    "search_fail",
    "elapsed_ns",
];

pub fn setup() -> (Config, BenchWriter) {
    let m = Command::new("lfset-benchmark")
        .arg(
            Arg::new("set implementation")
                .short('d')
                .value_parser(value_parser!(SetImpl))
                .required(true)
                .ignore_case(true)
                .help("Set implementation to benchmark"),
        )
        .arg(
            Arg::new("threads")
                .short('t')
                .value_parser(value_parser!(usize))
                .required(true)
                .help("Number of worker threads"),
        )
        .arg(
            Arg::new("range")
                .short('r')
                .value_parser(value_parser!(u64).range(1..))
                .help("Key range: [0..RANGE)")
                .default_value("259"),
        )
        .arg(
            Arg::new("inserts")
                .short('i')
                .long("inserts")
                .value_parser(value_parser!(usize))
                .help("Insert operations per thread")
                .default_value("33333"),
        )
        .arg(
            Arg::new("deletes")
                .short('e')
                .long("deletes")
                .value_parser(value_parser!(usize))
                .help("Delete operations per thread")
                .default_value("33333"),
        )
        .arg(
            Arg::new("searches")
                .short('s')
                .long("searches")
                .value_parser(value_parser!(usize))
                .help("Search operations per thread")
                .default_value("33333"),
        )
        .arg(
            Arg::new("repetitions")
                .short('n')
                .value_parser(value_parser!(u64).range(3..))
                .help("Repetitions per cell; elapsed time is the trimmed mean")
                .default_value("3"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_parser(value_parser!(u64))
                .help("Base seed for the pre-generated operation streams")
                .default_value("42"),
        )
        .arg(
            Arg::new("warmup")
                .short('w')
                .long("warmup-ms")
                .value_parser(value_parser!(u64))
                .help("Delay between thread start and the start flag (ms)")
                .default_value("10"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .help("Output CSV filename. Appends the data if the file already exists."),
        )
        .arg(
            Arg::new("dry run")
                .long("dry-run")
                .action(ArgAction::SetTrue)
                .help("Check whether the arguments are parsable, without running a benchmark"),
        )
        .get_matches();

    let config = Config {
        set_impl: m.get_one::<SetImpl>("set implementation").copied().unwrap(),
        threads: m.get_one::<usize>("threads").copied().unwrap(),
        key_range: m.get_one::<u64>("range").copied().unwrap() as usize,
        inserts: m.get_one::<usize>("inserts").copied().unwrap(),
        deletes: m.get_one::<usize>("deletes").copied().unwrap(),
        searches: m.get_one::<usize>("searches").copied().unwrap(),
        reps: m.get_one::<u64>("repetitions").copied().unwrap() as usize,
        seed: m.get_one::<u64>("seed").copied().unwrap(),
        warmup: Duration::from_millis(m.get_one::<u64>("warmup").copied().unwrap()),
    };

    let output = m.get_one::<String>("output").map(|output_name| {
        let output_path = Path::new(output_name);
        if let Some(dir) = output_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            create_dir_all(dir).unwrap();
        }
        match OpenOptions::new().read(true).append(true).open(output_path) {
            Ok(f) => csv::Writer::from_writer(f),
            Err(_) => {
                let f = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .open(output_path)
                    .unwrap();
                let mut output = csv::Writer::from_writer(f);
                output.write_record(HEADER).unwrap();
                output.flush().unwrap();
                output
            }
        }
    });

    if m.get_flag("dry run") {
        std::process::exit(0);
    }

    (config, BenchWriter { output })
}
