//! AtlasTS CLI
//!
//! Load synthetic points through a processor, or inspect a closed file.

use std::path::PathBuf;
use std::process;
use std::time::Instant;

use atlasts::storage::{FileSchema, TsFileReader};
use atlasts::{BufferWriteProcessor, Config, DataType, StorageContext, TsRecord, Value};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// AtlasTS CLI
#[derive(Parser, Debug)]
#[command(name = "atlasts-cli")]
#[command(about = "Buffer-write engine for time-series points")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write generated points through one processor and close it
    Load {
        /// Data directory
        #[arg(short, long, default_value = "./atlasts_data")]
        data_dir: PathBuf,

        /// Processor (storage group) name
        #[arg(short, long, default_value = "root.load")]
        name: String,

        /// Number of devices
        #[arg(long, default_value = "4")]
        devices: usize,

        /// Measurements per device
        #[arg(long, default_value = "8")]
        measurements: usize,

        /// Points per series
        #[arg(long, default_value = "10000")]
        points: i64,

        /// Flush threshold in KB
        #[arg(long, default_value = "4096")]
        threshold_kb: u64,
    },

    /// Print the chunk index of a closed file
    Inspect {
        /// Path to the file
        file: PathBuf,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,atlasts=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();
    let result = match args.command {
        Commands::Load {
            data_dir,
            name,
            devices,
            measurements,
            points,
            threshold_kb,
        } => load(data_dir, &name, devices, measurements, points, threshold_kb),
        Commands::Inspect { file } => inspect(file),
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn load(
    data_dir: PathBuf,
    name: &str,
    devices: usize,
    measurements: usize,
    points: i64,
    threshold_kb: u64,
) -> atlasts::Result<()> {
    tracing::info!("AtlasTS v{}", atlasts::VERSION);

    let config = Config::builder()
        .data_dir(data_dir)
        .memtable_size_threshold(threshold_kb * 1024)
        .build();
    let ctx = StorageContext::new(config)?;

    let mut schema = FileSchema::new();
    for m in 0..measurements {
        schema.register(format!("s{}", m), DataType::Double);
    }
    let processor = BufferWriteProcessor::builder(&ctx, name)
        .schema(schema)
        .open()?;

    let start = Instant::now();
    let mut rejected = 0u64;
    for time in 0..points {
        for d in 0..devices {
            let mut record = TsRecord::new(format!("d{}", d), time);
            for m in 0..measurements {
                let value = (time as f64).sin() * (m + 1) as f64;
                record = record.with_point(format!("s{}", m), Value::Double(value));
            }
            if !processor.insert(&record)? {
                rejected += 1;
            }
        }
    }
    processor.close()?;

    let elapsed = start.elapsed();
    let total = points as u64 * devices as u64 * measurements as u64;
    println!("file:      {}", processor.insert_file_path().display());
    println!("points:    {}", total);
    println!("rejected:  {} records", rejected);
    println!("failed:    {} flushes", processor.failed_flush_count());
    println!(
        "elapsed:   {:.2?} ({:.0} points/s)",
        elapsed,
        total as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    Ok(())
}

fn inspect(file: PathBuf) -> atlasts::Result<()> {
    let reader = TsFileReader::open(&file)?;

    println!("file: {}", file.display());
    println!("schema:");
    for (measurement, data_type) in reader.schema().iter() {
        println!("  {:<24} {:?}", measurement, data_type);
    }
    println!("chunks: {}", reader.chunk_metadata().len());
    for meta in reader.chunk_metadata() {
        println!(
            "  {}.{} v{} {:?} points={} time=[{}, {}] offset={} size={}",
            meta.device,
            meta.measurement,
            meta.version,
            meta.data_type,
            meta.num_points,
            meta.start_time,
            meta.end_time,
            meta.offset,
            meta.size
        );
    }
    Ok(())
}
