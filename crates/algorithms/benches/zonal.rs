//! Benchmarks for class counting

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use geo::{polygon, Geometry};
use hrufrac_algorithms::classes::{count_per_class, ClassCountParams};
use hrufrac_core::vector::{Feature, PolygonLayer};
use hrufrac_core::{CoveragePolicy, GeoTransform, Raster, CRS};

fn create_landcover(size: usize) -> Raster<u8> {
    let mut raster = Raster::new(size, size);
    raster.set_transform(GeoTransform::new(0.0, size as f64, 1.0, -1.0));
    raster.set_crs(Some(CRS::from_epsg(3005)));

    // Patchy pattern over 17 classes
    for row in 0..size {
        for col in 0..size {
            let class = ((row / 7) * 3 + (col / 11) * 5) % 17 + 1;
            raster.set(row, col, class as u8).unwrap();
        }
    }
    raster
}

/// `n x n` grid of square units tiling the raster
fn create_units(size: usize, n: usize) -> PolygonLayer {
    let step = size as f64 / n as f64;
    let mut layer = PolygonLayer::new(Some(CRS::from_epsg(3005)));
    for i in 0..n {
        for j in 0..n {
            let (x0, y0) = (j as f64 * step, i as f64 * step);
            let (x1, y1) = (x0 + step, y0 + step);
            let geometry = Geometry::Polygon(polygon![
                (x: x0, y: y0), (x: x1, y: y0), (x: x1, y: y1), (x: x0, y: y1),
            ]);
            layer.push(Feature::new(geometry).with_property("GRU_ID", (i * n + j) as i64));
        }
    }
    layer
}

fn bench_count_per_class(c: &mut Criterion) {
    let mut group = c.benchmark_group("count_per_class");
    let classes: Vec<i64> = (1..=17).collect();

    for size in [256, 512, 1024].iter() {
        let raster = create_landcover(*size);
        let units = create_units(*size, 16);

        for coverage in [CoveragePolicy::CenterPoint, CoveragePolicy::AllTouched] {
            let params = ClassCountParams {
                prefix: "IGBP_".into(),
                coverage,
                drop_empty: true,
            };
            group.bench_with_input(BenchmarkId::new(coverage.to_string(), size), size, |b, _| {
                b.iter(|| count_per_class(black_box(&raster), black_box(&units), &classes, &params).unwrap())
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_count_per_class);
criterion_main!(benches);
