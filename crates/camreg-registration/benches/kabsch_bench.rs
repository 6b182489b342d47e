use camreg_registration::kabsch::{fit, DEFAULT_DEGENERACY_TOLERANCE};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nalgebra::{Rotation3, Unit, Vector3};

fn correspondences(n: usize) -> (Vec<Vector3<f64>>, Vec<Vector3<f64>>) {
    let axis = Unit::new_normalize(Vector3::new(0.2, 0.9, -0.4));
    let rotation = Rotation3::from_axis_angle(&axis, 0.6);
    let translation = Vector3::new(300.0, 150.0, -20.0);

    let camera: Vec<_> = (0..n)
        .map(|i| {
            let t = i as f64;
            Vector3::new(t.cos() * 50.0, t.sin() * 50.0, (t * 0.37).sin() * 10.0)
        })
        .collect();
    let machine = camera.iter().map(|p| rotation * p + translation).collect();
    (camera, machine)
}

fn bench_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("kabsch_fit");
    for n in [3usize, 10, 100, 1000] {
        let (camera, machine) = correspondences(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| fit(black_box(&camera), black_box(&machine), DEFAULT_DEGENERACY_TOLERANCE))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_fit);
criterion_main!(benches);
