//! End-to-end checks of the count and fraction steps on small synthetic
//! basins, including a GeoTIFF / GeoJSON round trip through temporary files.

use approx::assert_relative_eq;
use geo::{polygon, Geometry};
use hrufrac_algorithms::classes::{
    count_per_class, fractions_from_counts, fractions_from_counts_grouped, ClassCountParams,
    ClassCountTable, CountSchema, FractionParams,
};
use hrufrac_core::io::{read_geojson, read_geotiff, write_geojson, write_geotiff};
use hrufrac_core::raster::{GeoTransform, Raster};
use hrufrac_core::vector::{AttributeValue, Feature, PolygonLayer};
use hrufrac_core::{CoveragePolicy, CRS};

const EPSG: u32 = 3005;

fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Geometry<f64> {
    Geometry::Polygon(polygon![
        (x: x0, y: y0), (x: x1, y: y0), (x: x1, y: y1), (x: x0, y: y1),
    ])
}

/// 6x6 land cover with 100 m cells, origin (1000, 2000):
/// ```text
/// 1 1 1 1 1 2
/// 1 1 1 1 1 2
/// 2 2 2 2 5 5
/// 5 5 5 5 5 5
/// 6 6 6 6 6 6
/// 6 6 6 6 6 6
/// ```
fn landcover() -> Raster<i16> {
    let values = vec![
        1, 1, 1, 1, 1, 2, //
        1, 1, 1, 1, 1, 2, //
        2, 2, 2, 2, 5, 5, //
        5, 5, 5, 5, 5, 5, //
        6, 6, 6, 6, 6, 6, //
        6, 6, 6, 6, 6, 6,
    ];
    let mut r = Raster::from_vec(values, 6, 6).unwrap();
    r.set_transform(GeoTransform::new(1000.0, 2000.0, 100.0, -100.0));
    r.set_crs(Some(CRS::from_epsg(EPSG)));
    r.set_nodata(Some(-1));
    r
}

/// Three HRUs in two GRUs:
/// HRU 1 (GRU A) rows 0-2, HRU 2 (GRU A) row 3, HRU 3 (GRU B) rows 4-5
fn hrus() -> PolygonLayer {
    let mut layer = PolygonLayer::new(Some(CRS::from_epsg(EPSG)));
    for field in ["HRU_ID", "GRU_ID", "area_m2"] {
        layer.add_field(field);
    }
    let units = [
        (1i64, "A", 1700.0, 2000.0),
        (2, "A", 1600.0, 1700.0),
        (3, "B", 1400.0, 1600.0),
    ];
    for (id, gru, y0, y1) in units {
        let geometry = rect(1000.0, y0, 1600.0, y1);
        layer.push(
            Feature::new(geometry)
                .with_property("HRU_ID", id)
                .with_property("GRU_ID", gru)
                .with_property("area_m2", (y1 - y0) * 600.0),
        );
    }
    layer
}

fn params(prefix: &str) -> ClassCountParams {
    ClassCountParams {
        prefix: prefix.to_string(),
        ..Default::default()
    }
}

#[test]
fn counts_match_covered_cells() {
    let raster = landcover();
    let table = count_per_class(&raster, &hrus(), &[1, 2, 3, 5, 6], &params("IGBP_")).unwrap();

    // class 3 never occurs
    assert_eq!(table.column_names(), vec!["IGBP_1", "IGBP_2", "IGBP_5", "IGBP_6"]);
    assert_eq!(table.counts(0).unwrap(), &[10, 6, 2, 0]);
    assert_eq!(table.counts(1).unwrap(), &[0, 0, 6, 0]);
    assert_eq!(table.counts(2).unwrap(), &[0, 0, 0, 12]);

    // the layer covers the whole raster, so column totals equal the histogram
    let histogram = raster.class_histogram();
    for (column, total) in table.columns().iter().zip(table.class_totals()) {
        let code = column.code.unwrap();
        assert_eq!(total as usize, histogram[&code]);
    }
}

#[test]
fn counting_is_idempotent() {
    let raster = landcover();
    let layer = hrus();
    let a = count_per_class(&raster, &layer, &[6, 5, 2, 1], &params("c")).unwrap();
    let b = count_per_class(&raster, &layer, &[6, 5, 2, 1], &params("c")).unwrap();

    assert_eq!(a.column_names(), b.column_names());
    assert_eq!(a.column_names(), vec!["c6", "c5", "c2", "c1"]);
    for i in 0..a.len() {
        assert_eq!(a.counts(i), b.counts(i));
    }
    let fields_a = a.layer().fields().to_vec();
    assert_eq!(fields_a, b.layer().fields());
}

#[test]
fn all_touched_counts_partial_cells() {
    let raster = landcover();
    let mut layer = PolygonLayer::new(Some(CRS::from_epsg(EPSG)));
    // top 40% of the cells in columns 0-1 of row 0, clear of their centers
    layer.push(Feature::new(rect(1000.0, 1960.0, 1200.0, 2000.0)));

    let center = count_per_class(&raster, &layer, &[1], &params("")).unwrap();
    assert!(center.columns().is_empty());

    let touched = ClassCountParams {
        coverage: CoveragePolicy::AllTouched,
        ..params("")
    };
    let table = count_per_class(&raster, &layer, &[1], &touched).unwrap();
    assert_eq!(table.counts(0).unwrap(), &[2]);
}

#[test]
fn unit_fractions_sum_to_one() {
    let counts = count_per_class(&landcover(), &hrus(), &[1, 2, 5, 6], &params("IGBP_")).unwrap();
    let fractions = fractions_from_counts(&counts, &FractionParams::default()).unwrap();

    assert_eq!(
        fractions.layer().fields(),
        &["HRU_ID", "GRU_ID", "area_m2", "IGBP_1_frac", "IGBP_2_frac", "IGBP_5_frac", "IGBP_6_frac"]
    );
    for row in fractions.rows() {
        assert_relative_eq!(row.sum().unwrap(), 1.0, epsilon = 1e-9);
    }
    assert_relative_eq!(fractions.rows()[0].get(0).unwrap(), 10.0 / 18.0);
    assert_eq!(
        fractions.layer().attribute(2, "area_m2"),
        Some(&AttributeValue::Float(120_000.0))
    );
}

#[test]
fn grouped_fractions_sum_counts() {
    let counts = count_per_class(&landcover(), &hrus(), &[1, 2, 5, 6], &params("IGBP_")).unwrap();
    let grouped = fractions_from_counts_grouped(&counts, "GRU_ID").unwrap();

    assert_eq!(grouped.len(), 2);
    assert_eq!(grouped.columns(), &["IGBP_1", "IGBP_2", "IGBP_5", "IGBP_6"]);

    let a = grouped.get("A").unwrap();
    assert_eq!(a.members, 2);
    assert_eq!(a.total, 24);
    assert_relative_eq!(a.get(0).unwrap(), 10.0 / 24.0);
    assert_relative_eq!(a.get(2).unwrap(), 8.0 / 24.0);
    assert_relative_eq!(a.sum().unwrap(), 1.0, epsilon = 1e-9);

    let b = grouped.get("B").unwrap();
    assert_eq!(b.fractions, Some(vec![0.0, 0.0, 0.0, 1.0]));
}

#[test]
fn grouped_scenario_quarter_three_quarters() {
    let mut layer = PolygonLayer::new(None);
    layer.push(
        Feature::new(rect(0.0, 0.0, 1.0, 1.0))
            .with_property("GRU_ID", "A")
            .with_property("classA", 4i64)
            .with_property("classB", 6i64),
    );
    layer.push(
        Feature::new(rect(1.0, 0.0, 2.0, 1.0))
            .with_property("GRU_ID", "A")
            .with_property("classA", 1i64)
            .with_property("classB", 9i64),
    );
    let counts = ClassCountTable::from_layer(
        layer,
        &CountSchema::Columns(vec!["classA".into(), "classB".into()]),
    )
    .unwrap();

    let grouped = fractions_from_counts_grouped(&counts, "GRU_ID").unwrap();
    assert_eq!(grouped.len(), 1);
    assert_relative_eq!(grouped.rows()[0].get(0).unwrap(), 0.25);
    assert_relative_eq!(grouped.rows()[0].get(1).unwrap(), 0.75);
}

#[test]
fn zero_total_gives_nan_sentinel() {
    let raster = landcover();
    let mut layer = hrus();
    // a fourth HRU off the raster
    layer.push(
        Feature::new(rect(5000.0, 5000.0, 5100.0, 5100.0))
            .with_property("HRU_ID", 4i64)
            .with_property("GRU_ID", "C")
            .with_property("area_m2", 10_000.0),
    );

    let counts = count_per_class(&raster, &layer, &[1, 6], &params("")).unwrap();
    assert_eq!(counts.counts(3).unwrap(), &[0, 0]);

    let unit = fractions_from_counts(&counts, &FractionParams::default()).unwrap();
    let row = &unit.rows()[3];
    assert!(row.fractions.is_none());
    assert!(row.values_or_nan(2).iter().all(|v| v.is_nan()));
    assert!(unit.layer().attribute(3, "1_frac").unwrap().is_null());

    let grouped = fractions_from_counts_grouped(&counts, "GRU_ID").unwrap();
    assert!(!grouped.get("C").unwrap().is_defined());
    assert!(grouped.get("A").unwrap().is_defined());
}

#[test]
fn file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let tif = dir.path().join("landcover.tif");
    let hru_path = dir.path().join("hrus.geojson");
    let count_path = dir.path().join("hru_counts.geojson");
    let csv_path = dir.path().join("gru_fractions.csv");

    write_geotiff(&landcover(), &tif, None).unwrap();
    write_geojson(&hrus(), &hru_path).unwrap();

    let raster = read_geotiff::<i16, _>(&tif, None).unwrap();
    let layer = read_geojson(&hru_path).unwrap();
    assert_eq!(raster.crs().and_then(CRS::epsg), Some(EPSG));
    assert_eq!(layer.crs().and_then(CRS::epsg), Some(EPSG));

    let counts = count_per_class(&raster, &layer, &raster.unique_values(), &params("IGBP_")).unwrap();
    write_geojson(counts.layer(), &count_path).unwrap();

    let persisted = read_geojson(&count_path).unwrap();
    assert_eq!(persisted.fields(), counts.layer().fields());
    let reloaded = ClassCountTable::from_layer(persisted, &CountSchema::Prefix("IGBP_".into())).unwrap();
    assert_eq!(reloaded.column_names(), counts.column_names());
    for i in 0..counts.len() {
        assert_eq!(reloaded.counts(i), counts.counts(i));
    }

    let grouped = fractions_from_counts_grouped(&reloaded, "GRU_ID").unwrap();
    grouped.write_csv(&csv_path).unwrap();
    let text = std::fs::read_to_string(&csv_path).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("GRU_ID,IGBP_1,IGBP_2,IGBP_5,IGBP_6"));
    assert_eq!(lines.next().map(|l| l.starts_with("A,")), Some(true));
    assert_eq!(lines.next(), Some("B,0,0,0,1"));
}
