//! hrufrac CLI - land cover and soil class fractions for hydrological response units

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use hrufrac_algorithms::classes::{
    count_per_class, fractions_from_counts, fractions_from_counts_grouped, ClassCountParams,
    ClassCountTable, CountSchema, FractionParams,
};
use hrufrac_algorithms::statistics::{append_statistic, mode_composite, PolygonStatistic};
use hrufrac_core::io::{read_geojson, read_geotiff, write_geojson, write_geotiff};
use hrufrac_core::{ControlFile, CoveragePolicy, PolygonLayer, Raster, ZonalConfig, CRS};

mod pipeline;

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "hrufrac")]
#[command(author, version, about = "Class counts and fractions of categorical rasters over response units", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Count raster cells of each class inside each polygon
    Count {
        /// Categorical raster (GeoTIFF)
        raster: PathBuf,
        /// Response-unit polygons (GeoJSON)
        polygons: PathBuf,
        /// Output GeoJSON with one count column per class
        output: PathBuf,
        /// Class codes to count, comma separated (default: every value in the raster)
        #[arg(short, long)]
        classes: Option<String>,
        /// Prefix for count column names
        #[arg(short, long, default_value = "")]
        prefix: String,
        /// Count every cell a polygon overlaps instead of cells whose center is inside
        #[arg(long)]
        all_touched: bool,
        /// Keep classes that are absent from every polygon
        #[arg(long)]
        keep_empty: bool,
        /// CRS for inputs that do not declare one, e.g. EPSG:3005
        #[arg(long)]
        assume_crs: Option<String>,
    },
    /// Convert class counts to fractions of each response unit
    Fractions {
        /// GeoJSON with class-count columns
        input: PathBuf,
        /// Output GeoJSON
        output: PathBuf,
        /// Prefix of the count columns
        #[arg(short, long, default_value = "")]
        prefix: String,
        /// Suffix appended to fraction column names
        #[arg(short, long, default_value = "_frac")]
        suffix: String,
        /// Response-unit identifier field
        #[arg(long, default_value = "HRU_ID")]
        id_field: String,
    },
    /// Sum class counts per parent basin and convert to fractions
    GruFractions {
        /// GeoJSON with class-count columns
        input: PathBuf,
        /// Output CSV, one row per parent basin
        output: PathBuf,
        /// Prefix of the count columns
        #[arg(short, long, default_value = "")]
        prefix: String,
        /// Parent basin identifier field
        #[arg(long, default_value = "GRU_ID")]
        parent_field: String,
    },
    /// Append a zonal statistic of a raster to each polygon
    Zonal {
        /// Input raster
        raster: PathBuf,
        /// Polygons (GeoJSON)
        polygons: PathBuf,
        /// Output GeoJSON
        output: PathBuf,
        /// Statistic: count, mean, majority, min, max
        #[arg(short, long, default_value = "mean")]
        stat: String,
        /// Output column name
        #[arg(short, long)]
        column: String,
        /// Count every cell a polygon overlaps
        #[arg(long)]
        all_touched: bool,
    },
    /// Per-cell most frequent class across several rasters
    Composite {
        /// Output raster
        output: PathBuf,
        /// Input rasters (same grid)
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Run count and fractions as configured in a control file
    Run {
        /// Control file (`key | value` lines)
        control: PathBuf,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn read_raster(path: &Path) -> Result<Raster<f64>> {
    let pb = spinner("Reading raster...");
    let raster: Raster<f64> = read_geotiff(path, None)
        .with_context(|| format!("Failed to read raster {}", path.display()))?;
    pb.finish_and_clear();
    Ok(raster)
}

fn read_layer(path: &Path) -> Result<PolygonLayer> {
    let pb = spinner("Reading polygons...");
    let layer = read_geojson(path)
        .with_context(|| format!("Failed to read polygons {}", path.display()))?;
    pb.finish_and_clear();
    Ok(layer)
}

fn write_layer(layer: &PolygonLayer, path: &Path) -> Result<()> {
    let pb = spinner("Writing output...");
    write_geojson(layer, path).with_context(|| format!("Failed to write {}", path.display()))?;
    pb.finish_and_clear();
    Ok(())
}

fn read_counts(path: &Path, prefix: &str) -> Result<ClassCountTable> {
    let layer = read_layer(path)?;
    ClassCountTable::from_layer(layer, &CountSchema::Prefix(prefix.to_string()))
        .with_context(|| format!("No usable '{}<code>' count columns in {}", prefix, path.display()))
}

fn coverage(all_touched: bool) -> CoveragePolicy {
    if all_touched {
        CoveragePolicy::AllTouched
    } else {
        CoveragePolicy::CenterPoint
    }
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Info { input } => {
            let raster = read_raster(&input)?;
            let (rows, cols) = raster.shape();
            let bounds = raster.bounds();
            let stats = raster.statistics();

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
            println!("Cell size: {}", raster.cell_size());
            println!(
                "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            match raster.crs() {
                Some(crs) => println!("CRS: {}", crs),
                None => println!("CRS: none"),
            }
            if let Some(nodata) = raster.nodata() {
                println!("NoData: {}", nodata);
            }
            println!(
                "Valid cells: {} ({:.1}%)",
                stats.valid_count,
                100.0 * stats.valid_count as f64 / raster.len() as f64
            );

            let histogram = raster.class_histogram();
            println!("\nClasses ({}):", histogram.len());
            for (code, count) in &histogram {
                println!("  {:>6}: {}", code, count);
            }
        }

        Commands::Count {
            raster,
            polygons,
            output,
            classes,
            prefix,
            all_touched,
            keep_empty,
            assume_crs,
        } => {
            let mut grid = read_raster(&raster)?;
            let mut layer = read_layer(&polygons)?;

            if let Some(text) = assume_crs {
                let crs = CRS::parse(&text).with_context(|| format!("Unrecognised CRS '{}'", text))?;
                if grid.crs().is_none() {
                    warn!("Raster declares no CRS, assuming {}", crs);
                    grid.set_crs(Some(crs.clone()));
                }
                if layer.crs().is_none() {
                    warn!("Polygons declare no CRS, assuming {}", crs);
                    layer.set_crs(Some(crs));
                }
            }

            let codes = match classes {
                Some(text) => pipeline::parse_class_list(&text)?,
                None => grid.unique_values(),
            };
            info!("Counting {} classes over {} polygons", codes.len(), layer.len());

            let params = ClassCountParams {
                prefix,
                coverage: coverage(all_touched),
                drop_empty: !keep_empty,
            };
            let start = Instant::now();
            let table = count_per_class(&grid, &layer, &codes, &params).context("Class counting failed")?;
            let elapsed = start.elapsed();

            println!("Class columns: {}", table.column_names().join(", "));
            write_layer(table.layer(), &output)?;
            done("Class counts", &output, elapsed);
        }

        Commands::Fractions {
            input,
            output,
            prefix,
            suffix,
            id_field,
        } => {
            let counts = read_counts(&input, &prefix)?;
            let start = Instant::now();
            let table = fractions_from_counts(&counts, &FractionParams { suffix, id_field })?;
            let elapsed = start.elapsed();

            let undefined: Vec<&str> = table
                .rows()
                .iter()
                .filter(|r| !r.is_defined())
                .map(|r| r.key.as_str())
                .collect();
            if !undefined.is_empty() {
                println!("Units with no counted cells (fractions null): {}", undefined.join(", "));
            }
            write_layer(table.layer(), &output)?;
            done("Unit fractions", &output, elapsed);
        }

        Commands::GruFractions {
            input,
            output,
            prefix,
            parent_field,
        } => {
            let counts = read_counts(&input, &prefix)?;
            let start = Instant::now();
            let table = fractions_from_counts_grouped(&counts, &parent_field)?;
            let elapsed = start.elapsed();

            let pb = spinner("Writing output...");
            table
                .write_csv(&output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            pb.finish_and_clear();
            println!("{} units in {} groups", counts.len(), table.len());
            done("Grouped fractions", &output, elapsed);
        }

        Commands::Zonal {
            raster,
            polygons,
            output,
            stat,
            column,
            all_touched,
        } => {
            let grid = read_raster(&raster)?;
            let layer = read_layer(&polygons)?;
            let statistic: PolygonStatistic = stat.parse()?;

            let start = Instant::now();
            let result = append_statistic(&grid, &layer, &column, statistic, coverage(all_touched))?;
            let elapsed = start.elapsed();

            write_layer(&result, &output)?;
            done(&format!("Zonal {}", statistic), &output, elapsed);
        }

        Commands::Composite { output, inputs } => {
            let mut stack = Vec::with_capacity(inputs.len());
            for path in &inputs {
                stack.push(read_raster(path)?);
            }

            let start = Instant::now();
            let result = mode_composite(&stack).context("Mode composite failed")?;
            let elapsed = start.elapsed();

            let pb = spinner("Writing output...");
            write_geotiff(&result, &output, None)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            pb.finish_and_clear();
            done("Mode composite", &output, elapsed);
        }

        Commands::Run { control } => {
            let control = ControlFile::load(&control)
                .with_context(|| format!("Failed to read control file {}", control.display()))?;
            let config = ZonalConfig::from_control(&control)?;
            info!("Coverage: {}, parent field: {}", config.coverage, config.parent_field);

            let start = Instant::now();
            let summary = pipeline::run(&control)?;
            let elapsed = start.elapsed();

            println!(
                "{} HRUs, {} GRUs, classes: {}",
                summary.hrus,
                summary.grus,
                summary.class_columns.join(", ")
            );
            if summary.undefined_hrus > 0 {
                println!("{} HRUs have no counted cells", summary.undefined_hrus);
            }
            println!("  Processing time: {:.2?}", elapsed);
        }
    }

    Ok(())
}
