use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, Level};

use rambo_core::{
    consts::{DEFAULT_KMER_LEN, DEFAULT_PARTITION_SEED, DEFAULT_SEQ_THRESHOLD, META_FILE},
    ingest::{get_data, parse_line, read_lines},
    manifest::Manifest,
    meta::MetaRambo,
    segment::SegmentReader,
    PartitionStrategy, Rambo, RamboConfig, RarePolicy, SeqQuery, SetDescriptor,
};

#[derive(Parser)]
#[command(name = "rambo", about = "RAMBO CLI: multi-set k-mer membership index")]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    cmd: Cmd,
}

/// Shape of a new structure. Flags override values from `--config`.
#[derive(Args)]
struct ShapeArgs {
    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Number of reference sets
    #[arg(long)]
    sets: Option<u32>,
    #[arg(long)]
    repeats: Option<u32>,
    #[arg(long)]
    bins: Option<u32>,
    /// Expected elements per filter cell
    #[arg(long)]
    capacity: Option<u64>,
    /// Target false-positive rate of one cell
    #[arg(long)]
    fpr: Option<f64>,
    /// Override the derived hash count
    #[arg(long)]
    hashes: Option<u32>,
    /// Partition seed
    #[arg(long)]
    seed: Option<u64>,
    /// Seeded uniform draws instead of hashed bins
    #[arg(long, default_value_t = false)]
    random: bool,
    /// Sets with at most this many elements go to the rare bins
    #[arg(long, requires = "rare_bins")]
    rare_max: Option<usize>,
    /// Bins per repeat reserved for rare sets
    #[arg(long, requires = "rare_max")]
    rare_bins: Option<u32>,
}

impl ShapeArgs {
    fn resolve(&self) -> Result<RamboConfig> {
        let mut cfg = match &self.config {
            Some(p) => RamboConfig::load(p).with_context(|| format!("config {}", p.display()))?,
            None => RamboConfig::default(),
        };
        if let Some(v) = self.sets { cfg.sets = v; }
        if let Some(v) = self.repeats { cfg.repeats = v; }
        if let Some(v) = self.bins { cfg.bins = v; }
        if let Some(v) = self.capacity { cfg.capacity = v; }
        if let Some(v) = self.fpr { cfg.fpr = v; }
        if self.hashes.is_some() { cfg.hashes = self.hashes; }
        if self.seed.is_some() || self.random {
            let seed = self.seed.unwrap_or(match cfg.partition {
                PartitionStrategy::Hashed { seed } | PartitionStrategy::Random { seed } => seed,
            });
            cfg.partition = if self.random {
                PartitionStrategy::Random { seed }
            } else {
                PartitionStrategy::Hashed { seed }
            };
        }
        if let (Some(max_size), Some(reserved_bins)) = (self.rare_max, self.rare_bins) {
            cfg.rare = Some(RarePolicy { max_size, reserved_bins });
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

#[derive(Subcommand)]
enum Cmd {
    /// Build a structure and write it to a directory
    Build {
        #[arg(long)]
        out: PathBuf,
        #[command(flatten)]
        shape: ShapeArgs,
        /// Toy-format input: one `ELEMENT;id,id,...` per line
        #[arg(long, conflicts_with = "set")]
        input: Option<PathBuf>,
        /// One set per file, one element per line
        #[arg(long, value_name = "NAME=PATH")]
        set: Vec<String>,
        /// Write only these repeats (a fragment)
        #[arg(long, value_delimiter = ',')]
        repeats_only: Vec<u32>,
    },

    /// Sets that may contain one element
    Query {
        #[arg(long, required = true, num_args = 1.., value_delimiter = ',')]
        dir: Vec<PathBuf>,
        key: String,
    },

    /// Sets holding most k-mers of a sequence
    QuerySeq {
        #[arg(long, required = true, num_args = 1.., value_delimiter = ',')]
        dir: Vec<PathBuf>,
        #[arg(long, default_value_t = DEFAULT_KMER_LEN)]
        kmer: usize,
        #[arg(long, default_value_t = 1)]
        stride: usize,
        #[arg(long, default_value_t = DEFAULT_SEQ_THRESHOLD)]
        threshold: f64,
        /// Read the sequence from a file (header lines skipped, lines joined)
        #[arg(long, conflicts_with = "seq")]
        file: Option<PathBuf>,
        seq: Option<String>,
    },

    /// Measure false-positive rate and query time against a toy-format truth file
    Eval {
        #[arg(long, required = true, num_args = 1.., value_delimiter = ',')]
        dir: Vec<PathBuf>,
        #[arg(long)]
        input: PathBuf,
    },

    /// Parameter block, fragment contents and fill ratios
    Info {
        #[arg(long)]
        dir: PathBuf,
    },

    /// Re-read every segment of a fragment and check checksums
    Verify {
        #[arg(long)]
        dir: PathBuf,
    },

    /// Write an artificial toy-format k-mer dataset
    Synth {
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 5)]
        sets: u32,
        #[arg(long, default_value_t = 1000)]
        count: usize,
        #[arg(long, default_value_t = 21)]
        kmer: usize,
        /// Upper bound of sets per k-mer
        #[arg(long, default_value_t = 5)]
        max_sets: u32,
        #[arg(long, default_value_t = DEFAULT_PARTITION_SEED)]
        seed: u64,
    },
}

fn init_tracing(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_set_arg(s: &str) -> Result<(String, PathBuf)> {
    let (name, path) = s
        .split_once('=')
        .ok_or_else(|| anyhow!("--set expects NAME=PATH, got {s}"))?;
    if name.trim().is_empty() { bail!("--set has an empty name: {s}"); }
    Ok((name.trim().to_string(), PathBuf::from(path)))
}

/// Default slot names `0..n`, sized by how many toy lines list each id.
fn toy_descriptors(n: u32, lines: &[String]) -> Vec<SetDescriptor> {
    let mut sizes = vec![0usize; n as usize];
    for parsed in lines.iter().filter_map(|l| parse_line(l)) {
        for id in parsed.sets {
            if let Some(c) = id.parse::<usize>().ok().and_then(|i| sizes.get_mut(i)) {
                *c += 1;
            }
        }
    }
    sizes
        .into_iter()
        .enumerate()
        .map(|(i, size)| SetDescriptor::with_size(i.to_string(), size))
        .collect()
}

fn build(out: &Path, cfg: &RamboConfig, input: Option<&Path>, sets: &[String], repeats_only: &[u32]) -> Result<()> {
    let started = Instant::now();
    let mut rambo = Rambo::new(cfg)?;

    if let Some(input) = input {
        let lines = read_lines(input).with_context(|| format!("input {}", input.display()))?;
        if cfg.rare.is_some() {
            rambo.create_meta_rambo(&toy_descriptors(cfg.sets, &lines))?;
        } else {
            rambo.create_meta_rambo(&[])?;
        }
        let rep = rambo.insertion2(&lines)?;
        println!(
            "inserted: sets={} keys={} skipped_lines={} unknown_ids={}",
            rep.sets, rep.keys, rep.skipped_lines, rep.unknown_ids
        );
    } else if !sets.is_empty() {
        let mut data = Vec::with_capacity(sets.len());
        for s in sets {
            let (name, path) = parse_set_arg(s)?;
            let keys = get_data(&path).with_context(|| format!("set {name}: {}", path.display()))?;
            data.push((name, keys));
        }
        let descs: Vec<SetDescriptor> = data
            .iter()
            .map(|(name, keys)| SetDescriptor::with_size(name.clone(), keys.len()))
            .collect();
        rambo.create_meta_rambo(&descs)?;
        let (mut keys_total, mut skipped) = (0usize, 0usize);
        for (name, keys) in &data {
            let stats = rambo.insertion(name, keys)?;
            keys_total += stats.keys;
            if stats.keys == 0 { skipped += 1; }
        }
        println!("inserted: sets={} keys={} skipped_sets={}", data.len(), keys_total, skipped);
    } else {
        bail!("build needs --input or at least one --set");
    }

    if repeats_only.is_empty() {
        rambo.serialize_rambo(out)?;
    } else {
        rambo.serialize_repeats(out, repeats_only)?;
    }
    let p = rambo.params();
    println!(
        "built: {} (R={} B={} k={} range={} est_fpr={:.3e}) in {:.2?}",
        out.display(), p.r, p.b, p.k, p.range, p.fpr, started.elapsed()
    );
    Ok(())
}

fn load(dirs: &[PathBuf]) -> Result<Rambo> {
    let rambo = Rambo::deserialize_rambo(dirs)?;
    info!(fragments = dirs.len(), "structure loaded");
    Ok(rambo)
}

fn eval(dirs: &[PathBuf], input: &Path) -> Result<()> {
    let rambo = load(dirs)?;
    let meta = rambo.meta().ok_or_else(|| anyhow!("structure has no partition map"))?;
    let named = meta.num_sets();
    let lines = read_lines(input)?;

    let (mut queries, mut fp, mut negatives, mut fneg) = (0usize, 0usize, 0usize, 0usize);
    let mut elapsed = std::time::Duration::ZERO;
    for line in &lines {
        let Some(parsed) = parse_line(line) else { continue };
        let truth: Vec<u32> = parsed.sets.iter().filter_map(|id| meta.slot(id)).collect();
        let t0 = Instant::now();
        let res = rambo.query(parsed.element.as_bytes())?;
        elapsed += t0.elapsed();
        queries += 1;
        for slot in 0..named as u32 {
            let owned = truth.contains(&slot);
            let hit = res.test(slot as usize);
            if owned && !hit { fneg += 1; }
            if !owned {
                negatives += 1;
                if hit { fp += 1; }
            }
        }
    }
    if queries == 0 { bail!("no valid lines in {}", input.display()); }
    let rate = if negatives > 0 { fp as f64 / negatives as f64 } else { 0.0 };
    let per_key_ms = elapsed.as_secs_f64() * 1000.0 / queries as f64;
    println!("queries: {queries}  false_negatives: {fneg}");
    println!("fp rate is: {rate:.6}");
    println!("query time wall clock is: {per_key_ms:.6}, ms per key");
    Ok(())
}

fn info_cmd(dir: &Path) -> Result<()> {
    let man = Manifest::load(dir)?;
    println!("{}", serde_json::to_string_pretty(&man.params)?);
    println!("repeats here: {:?}", man.repeat_indices());
    let meta = MetaRambo::load(&dir.join(META_FILE))?;
    println!("named sets: {}", meta.num_sets());
    for rec in &man.repeats {
        let rdr = SegmentReader::open(dir.join(&rec.path))?;
        let fills: Vec<String> = rdr
            .cells()?
            .iter()
            .map(|c| format!("{:.3}", c.fill_ratio()))
            .collect();
        println!(
            "repeat {:>3}: sets/bin={:?} fill=[{}]",
            rec.repeat,
            meta.bin_loads(rec.repeat),
            fills.join(" ")
        );
    }
    Ok(())
}

fn verify(dir: &Path) -> Result<()> {
    let man = Manifest::load(dir)?;
    let meta_ok = MetaRambo::load(&dir.join(META_FILE)).is_ok();
    let (mut seg_ok, mut seg_fail, mut cells, mut bad_crc) = (0usize, 0usize, 0usize, 0usize);
    for rec in &man.repeats {
        let path = dir.join(&rec.path);
        match SegmentReader::open(&path) {
            Ok(r) => {
                if r.header.repeat != rec.repeat || r.header.range != man.params.range {
                    eprintln!("verify: {} does not match the manifest", path.display());
                    seg_fail += 1;
                    continue;
                }
                for bin in 0..r.header.bins {
                    cells += 1;
                    if !r.verify_crc(bin) { bad_crc += 1; }
                }
                seg_ok += 1;
            }
            Err(e) => {
                eprintln!("verify: failed to open {}: {e}", path.display());
                seg_fail += 1;
            }
        }
    }
    println!("verify: segments ok={seg_ok}, fail={seg_fail}");
    println!("         cells={cells}  bad_crc={bad_crc}  partition_map={}", if meta_ok { "ok" } else { "bad" });
    if seg_fail > 0 || bad_crc > 0 || !meta_ok { bail!("verification failed"); }
    Ok(())
}

fn synth(out: &Path, sets: u32, count: usize, kmer: usize, max_sets: u32, seed: u64) -> Result<()> {
    const GENE: &[u8; 4] = b"ATGC";
    if sets == 0 || max_sets == 0 || kmer == 0 { bail!("sets, max-sets and kmer must be > 0"); }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut w = BufWriter::new(File::create(out)?);
    for _ in 0..count {
        let element: String = (0..kmer).map(|_| GENE[rng.random_range(0..4usize)] as char).collect();
        let amount = rng.random_range(1..=max_sets.min(sets)) as usize;
        let mut ids = rand::seq::index::sample(&mut rng, sets as usize, amount).into_vec();
        ids.sort_unstable();
        let ids: Vec<String> = ids.iter().map(|i| i.to_string()).collect();
        writeln!(w, "{element};{}", ids.join(","))?;
    }
    w.flush()?;
    println!("synth: wrote {count} k-mers over {sets} sets to {}", out.display());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    match cli.cmd {
        Cmd::Build { out, shape, input, set, repeats_only } => {
            let cfg = shape.resolve()?;
            build(&out, &cfg, input.as_deref(), &set, &repeats_only)?;
        }
        Cmd::Query { dir, key } => {
            let rambo = load(&dir)?;
            let names = rambo.query_sets(key.as_bytes())?;
            if names.is_empty() {
                println!("no sets");
            } else {
                println!("{}", names.join(","));
            }
        }
        Cmd::QuerySeq { dir, kmer, stride, threshold, file, seq } => {
            let seq = match (file, seq) {
                (Some(f), _) => get_data(&f)?.concat(),
                (None, Some(s)) => s,
                (None, None) => bail!("query-seq needs a sequence or --file"),
            };
            let rambo = load(&dir)?;
            let hits = rambo.query_seq(seq.as_bytes(), &SeqQuery { kmer_len: kmer, stride, threshold })?;
            println!("kmers: {}", hits.total);
            let mut any = false;
            for slot in hits.matches.iter_ones() {
                any = true;
                let name = rambo.set_name(slot).unwrap_or("?");
                println!("{name}\t{:.3}", hits.score(slot));
            }
            if !any { println!("no sets"); }
        }
        Cmd::Eval { dir, input } => eval(&dir, &input)?,
        Cmd::Info { dir } => info_cmd(&dir)?,
        Cmd::Verify { dir } => verify(&dir)?,
        Cmd::Synth { out, sets, count, kmer, max_sets, seed } => {
            synth(&out, sets, count, kmer, max_sets, seed)?;
        }
    }
    Ok(())
}
