// rlin CLI - LINcode assignment for cgMLST schemes

use anyhow::Result;
use clap::{Parser, Subcommand};
use rlin_core::{load_loci, load_thresholds, Engine, EngineConfig, LockContention, ProfileFilter,
    ProfileStore, SchemePaths};
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "rlin")]
#[command(version, about = "Hierarchical LINcode assignment for cgMLST allelic profiles", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Assign LINcodes to all unlabeled profiles of a scheme
    Assign {
        /// Scheme directory
        #[arg(short, long)]
        dir: PathBuf,

        /// Integer scheme selector
        #[arg(short, long)]
        scheme_id: u32,

        /// Maximum profiles per inner iteration
        #[arg(long, default_value_t = 10_000)]
        batch_size: usize,

        /// Per-profile missing-allele budget; profiles above it are
        /// ignored until the budget is raised
        #[arg(long, default_value_t = 0)]
        missing: usize,

        /// Lowest profile id to consider (inclusive)
        #[arg(long)]
        min: Option<i64>,

        /// Highest profile id to consider (inclusive)
        #[arg(long)]
        max: Option<i64>,

        /// Use a disk-backed distance matrix instead of RAM
        #[arg(long)]
        mmap: bool,

        /// Append new profiles from this TSV before assignment begins;
        /// duplicate ids are skipped without error
        #[arg(long)]
        input_profiles: Option<PathBuf>,

        /// Write a per-assignment TSV debug log to this path
        #[arg(long)]
        log: Option<PathBuf>,

        /// Suppress normal output
        #[arg(short, long)]
        quiet: bool,

        /// Verbose per-assignment output
        #[arg(long)]
        debug: bool,
    },

    /// Write an example scheme directory and exit
    Create {
        /// Target directory (created if absent)
        #[arg(short, long)]
        dir: PathBuf,

        /// Scheme id for the example files
        #[arg(short, long, default_value_t = 1)]
        scheme_id: u32,
    },

    /// Print a summary of a scheme
    Info {
        /// Scheme directory
        #[arg(short, long)]
        dir: PathBuf,

        /// Integer scheme selector
        #[arg(short, long)]
        scheme_id: u32,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Assign {
            dir,
            scheme_id,
            batch_size,
            missing,
            min,
            max,
            mmap,
            input_profiles,
            log,
            quiet,
            debug,
        } => assign_command(
            dir,
            scheme_id,
            batch_size,
            missing,
            min,
            max,
            mmap,
            input_profiles,
            log,
            quiet,
            debug,
        ),

        Commands::Create { dir, scheme_id } => create_command(dir, scheme_id),

        Commands::Info { dir, scheme_id } => info_command(dir, scheme_id),
    };

    if let Err(err) = result {
        eprintln!("{err:#}");
        // A live lock holder is contention, not failure
        let code = if err.downcast_ref::<LockContention>().is_some() {
            1
        } else {
            2
        };
        std::process::exit(code);
    }
}

#[allow(clippy::too_many_arguments)]
fn assign_command(
    dir: PathBuf,
    scheme_id: u32,
    batch_size: usize,
    missing: usize,
    min: Option<i64>,
    max: Option<i64>,
    mmap: bool,
    input_profiles: Option<PathBuf>,
    log: Option<PathBuf>,
    quiet: bool,
    debug: bool,
) -> Result<()> {
    let verbosity = if quiet {
        0
    } else if debug {
        2
    } else {
        1
    };

    let config = EngineConfig {
        batch_size,
        max_missing: missing,
        min_id: min,
        max_id: max,
        mmap_matrix: mmap,
        log_path: log,
        verbosity,
    };

    let mut engine = Engine::open(&dir, scheme_id, config)?;
    if let Some(input) = input_profiles {
        engine.import_profiles(&input)?;
    }
    engine.run()?;
    Ok(())
}

fn create_command(dir: PathBuf, scheme_id: u32) -> Result<()> {
    let paths = SchemePaths::new(&dir, scheme_id);
    fs::create_dir_all(&dir)?;

    for path in [paths.profiles(), paths.loci(), paths.thresholds()] {
        if path.exists() {
            anyhow::bail!("refusing to overwrite existing file {}", path.display());
        }
    }

    let loci: Vec<String> = (1..=10).map(|i| format!("locus_{i:04}")).collect();
    let mut loci_text = String::from("# example core-genome loci\n");
    for locus in &loci {
        loci_text.push_str(locus);
        loci_text.push('\n');
    }
    fs::write(paths.loci(), loci_text)?;

    fs::write(paths.thresholds(), "1;2;4\n")?;

    let profiles = "id\tprofile\n\
                    1\t1,1,1,1,1,1,1,1,1,1\n\
                    2\t1,1,1,1,1,1,1,1,1,2\n\
                    3\t2,2,2,2,2,2,1,1,1,1\n\
                    4\t1,1,1,1,1,1,1,1,N,2\n";
    fs::write(paths.profiles(), profiles)?;

    eprintln!("Example scheme {scheme_id} written to {}", dir.display());
    eprintln!("Assign codes with: rlin assign --dir {} --scheme-id {scheme_id}", dir.display());
    Ok(())
}

fn info_command(dir: PathBuf, scheme_id: u32) -> Result<()> {
    let paths = SchemePaths::new(&dir, scheme_id);
    let loci = load_loci(&paths.loci())?;
    let thresholds = load_thresholds(&paths.thresholds(), loci.len())?;
    let store = ProfileStore::open(paths.clone(), loci.len())?;

    let mut total: usize = 0;
    let mut reader = store.iterate_profiles(ProfileFilter {
        max_missing: usize::MAX,
        ..ProfileFilter::default()
    })?;
    while reader.next_profile()?.is_some() {
        total += 1;
    }
    let labeled = store.load_labeled(thresholds.levels())?;

    println!("scheme:      {scheme_id}");
    println!("directory:   {}", dir.display());
    println!("loci:        {}", loci.len());
    println!(
        "thresholds:  {}",
        thresholds
            .diffs()
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(";")
    );
    println!(
        "identity:    {}",
        thresholds
            .identity()
            .iter()
            .map(|i| format!("{i:.2}"))
            .collect::<Vec<_>>()
            .join(";")
    );
    println!("profiles:    {total}");
    println!("labeled:     {}", labeled.len());
    println!("unlabeled:   {}", total.saturating_sub(labeled.len()));
    Ok(())
}
