//! Control-file driven run: count classes per HRU, then HRU and GRU fractions

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

use hrufrac_algorithms::classes::{
    count_per_class, fractions_from_counts, fractions_from_counts_grouped, ClassCountParams,
    FractionParams,
};
use hrufrac_core::io::{read_geojson, read_geotiff, write_geojson};
use hrufrac_core::{ControlFile, Raster, ZonalConfig};

/// Files a pipeline run reads and writes, resolved from the control file
#[derive(Debug, Clone)]
pub struct PipelinePaths {
    pub class_raster: PathBuf,
    pub hru_layer: PathBuf,
    pub hru_counts: PathBuf,
    pub hru_fractions: PathBuf,
    pub gru_fractions: PathBuf,
}

impl PipelinePaths {
    pub fn from_control(control: &ControlFile) -> Result<Self> {
        Ok(Self {
            class_raster: control.path("class_raster")?,
            hru_layer: control.path("hru_shapefile")?,
            hru_counts: control.path("hru_counts_output")?,
            hru_fractions: control.path("hru_fractions_output")?,
            gru_fractions: control.path("gru_fractions_output")?,
        })
    }
}

/// What a run produced
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub hrus: usize,
    pub grus: usize,
    pub class_columns: Vec<String>,
    /// HRUs whose class counts sum to zero
    pub undefined_hrus: usize,
}

/// Class codes from the optional `class_list` key (`1, 2, 5`)
pub fn class_list(control: &ControlFile) -> Result<Option<Vec<i64>>> {
    if !control.contains("class_list") {
        return Ok(None);
    }
    let codes = parse_class_list(control.get("class_list")?)
        .with_context(|| "Invalid class_list in control file")?;
    Ok(Some(codes))
}

/// Parse a comma separated list of class codes
pub fn parse_class_list(text: &str) -> Result<Vec<i64>> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .with_context(|| format!("'{}' is not an integer class code", s))
        })
        .collect()
}

/// Run count, per-HRU fractions and per-GRU fractions, writing each output
pub fn run(control: &ControlFile) -> Result<RunSummary> {
    let config = ZonalConfig::from_control(control)?;
    let paths = PipelinePaths::from_control(control)?;

    let raster: Raster<f64> = read_geotiff(&paths.class_raster, None)
        .with_context(|| format!("Failed to read {}", paths.class_raster.display()))?;
    let hrus = read_geojson(&paths.hru_layer)
        .with_context(|| format!("Failed to read {}", paths.hru_layer.display()))?;

    let classes = match class_list(control)? {
        Some(codes) => codes,
        None => raster.unique_values(),
    };
    info!("Counting {} classes over {} HRUs", classes.len(), hrus.len());

    let counts = count_per_class(&raster, &hrus, &classes, &ClassCountParams::from(&config))
        .context("Class counting failed")?;
    write_geojson(counts.layer(), &paths.hru_counts)
        .with_context(|| format!("Failed to write {}", paths.hru_counts.display()))?;

    let unit = fractions_from_counts(&counts, &FractionParams::from(&config))?;
    write_geojson(unit.layer(), &paths.hru_fractions)
        .with_context(|| format!("Failed to write {}", paths.hru_fractions.display()))?;

    let grouped = fractions_from_counts_grouped(&counts, &config.parent_field)?;
    grouped
        .write_csv(&paths.gru_fractions)
        .with_context(|| format!("Failed to write {}", paths.gru_fractions.display()))?;

    Ok(RunSummary {
        hrus: counts.len(),
        grus: grouped.len(),
        class_columns: counts.column_names().into_iter().map(String::from).collect(),
        undefined_hrus: unit.rows().iter().filter(|r| !r.is_defined()).count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hrufrac_core::geo_types::{polygon, Geometry};
    use hrufrac_core::io::write_geotiff;
    use hrufrac_core::vector::{Feature, PolygonLayer};
    use hrufrac_core::{GeoTransform, CRS};

    #[test]
    fn test_parse_class_list() {
        assert_eq!(parse_class_list(" 1, 2,17 ,").unwrap(), vec![1, 2, 17]);
        assert!(parse_class_list("1, forest").is_err());
    }

    #[test]
    fn test_missing_key() {
        let control = ControlFile::parse("class_raster | lc.tif\n");
        assert!(run(&control).is_err());
    }

    #[test]
    fn test_run_from_control_file() {
        let dir = tempfile::tempdir().unwrap();

        let mut raster: Raster<f64> =
            Raster::from_vec(vec![1.0, 1.0, 2.0, 4.0, 4.0, 4.0], 2, 3).unwrap();
        raster.set_transform(GeoTransform::new(0.0, 2.0, 1.0, -1.0));
        raster.set_crs(Some(CRS::from_epsg(3005)));
        write_geotiff(&raster, dir.path().join("landcover.tif"), None).unwrap();

        let mut hrus = PolygonLayer::new(Some(CRS::from_epsg(3005)));
        for (id, gru, y0) in [(1i64, "10", 1.0), (2, "10", 0.0)] {
            let g = Geometry::Polygon(polygon![
                (x: 0.0, y: y0), (x: 3.0, y: y0), (x: 3.0, y: y0 + 1.0), (x: 0.0, y: y0 + 1.0),
            ]);
            hrus.push(Feature::new(g).with_property("HRU_ID", id).with_property("GRU_ID", gru));
        }
        write_geojson(&hrus, dir.path().join("hrus.geojson")).unwrap();

        let control_path = dir.path().join("control_active.txt");
        std::fs::write(
            &control_path,
            "\
class_raster         | landcover.tif
hru_shapefile        | hrus.geojson   ! relative to this file
class_prefix         | IGBP_
class_list           | 1, 2, 3, 4
hru_counts_output    | hru_counts.geojson
hru_fractions_output | hru_fractions.geojson
gru_fractions_output | gru_fractions.csv
",
        )
        .unwrap();

        let control = ControlFile::load(&control_path).unwrap();
        let summary = run(&control).unwrap();
        assert_eq!(summary.hrus, 2);
        assert_eq!(summary.grus, 1);
        assert_eq!(summary.class_columns, vec!["IGBP_1", "IGBP_2", "IGBP_4"]);
        assert_eq!(summary.undefined_hrus, 0);

        let csv = std::fs::read_to_string(dir.path().join("gru_fractions.csv")).unwrap();
        assert_eq!(csv.lines().next(), Some("GRU_ID,IGBP_1,IGBP_2,IGBP_4"));
        assert_eq!(csv.lines().nth(1), Some("10,0.3333333333333333,0.16666666666666666,0.5"));

        let fractions = read_geojson(dir.path().join("hru_fractions.geojson")).unwrap();
        assert!(fractions.has_field("IGBP_4_frac"));
    }
}
