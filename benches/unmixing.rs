use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use nalgebra::DMatrix;
use ndarray::{Array2, Array3};
use spectral_unmix::unmixing_pipeline::calibration::OverlapMatrix;
use spectral_unmix::unmixing_pipeline::segmentation::SegmentationEngine;
use spectral_unmix::unmixing_pipeline::spectral::{
    build_solver, unmix, OpticalDensityCube, SolverStrategy,
};
use std::hint::black_box;

const WAVELENGTHS: [u32; 8] = [450, 500, 550, 600, 650, 700, 750, 800];

fn generate_mock_od(width: usize, height: usize) -> OpticalDensityCube {
    let data = Array3::from_shape_fn((WAVELENGTHS.len(), height, width), |(w, y, x)| {
        0.05 + ((w * 31 + y * 7 + x * 13) % 200) as f64 / 100.0
    });
    // Shape always matches the wavelength list.
    OpticalDensityCube::from_array(WAVELENGTHS.to_vec(), data).unwrap()
}

fn mock_overlap() -> OverlapMatrix {
    let matrix = DMatrix::from_fn(WAVELENGTHS.len(), 4, |i, j| {
        if i % 4 == j { 2.0 } else { 0.1 + 0.05 * (i + j) as f64 }
    });
    let symbols = ["HbO2", "Hb", "Melanin", "Bilirubin"].map(String::from).to_vec();
    OverlapMatrix::from_matrix(matrix, WAVELENGTHS.to_vec(), symbols).unwrap()
}

fn benchmark_unmix_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("unmix_by_size");
    let overlap = mock_overlap();

    let sizes = vec![
        (100, 100, "100x100"),
        (500, 500, "500x500"),
        (1000, 1000, "1000x1000"),
    ];

    for (width, height, label) in sizes {
        let od = generate_mock_od(width, height);

        group.bench_with_input(BenchmarkId::from_parameter(label), &od, |b, od| {
            let solver = build_solver(SolverStrategy::LeastSquares, &overlap).unwrap();
            b.iter(|| {
                let _ = unmix(solver.as_ref(), overlap.symbols(), black_box(od));
            });
        });
    }

    group.finish();
}

fn benchmark_solver_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("solver_strategies");
    let overlap = mock_overlap();
    let od = generate_mock_od(500, 500);

    let strategies = vec![
        (SolverStrategy::LeastSquares, "lstsq"),
        (SolverStrategy::Qr, "qr"),
    ];

    for (strategy, label) in strategies {
        group.bench_with_input(BenchmarkId::from_parameter(label), &od, |b, od| {
            let solver = build_solver(strategy, &overlap).unwrap();
            b.iter(|| {
                let _ = unmix(solver.as_ref(), overlap.symbols(), black_box(od));
            });
        });
    }

    group.finish();
}

fn benchmark_segmentation(c: &mut Criterion) {
    let mut group = c.benchmark_group("segmentation");
    let thb = Array2::from_shape_fn((500, 500), |(y, x)| {
        let (dy, dx) = (y as f64 - 250.0, x as f64 - 250.0);
        (-(dy * dy + dx * dx) / 5000.0).exp()
    });

    group.bench_function("sigma_2", |b| {
        let engine = SegmentationEngine::default();
        b.iter(|| {
            let _ = engine.segment(black_box(&thb));
        });
    });

    group.bench_function("no_blur", |b| {
        let engine = SegmentationEngine::new(0.0);
        b.iter(|| {
            let _ = engine.segment(black_box(&thb));
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_unmix_sizes,
    benchmark_solver_strategies,
    benchmark_segmentation
);
criterion_main!(benches);
