//! Benchmarks for rigging stages.

use armature::algo::attachment::{FieldVisibility, VisibilityTester};
use armature::algo::distance::{construct_distance_field, DistanceFieldOptions};
use armature::algo::sparse::{CsrMatrix, SpdMatrix};
use armature::prelude::*;
use criterion::{criterion_group, criterion_main, Criterion};
use nalgebra::Point3;

/// Latitude-longitude sphere stretched by `stretch` along Y.
fn create_uv_sphere(rings: usize, segments: usize, stretch: f64) -> Mesh {
    let mut vertices = vec![Point3::new(0.0, stretch, 0.0)];
    for i in 1..=rings {
        let theta = std::f64::consts::PI * i as f64 / (rings + 1) as f64;
        for j in 0..segments {
            let phi = std::f64::consts::TAU * j as f64 / segments as f64;
            vertices.push(Point3::new(
                theta.sin() * phi.cos(),
                stretch * theta.cos(),
                theta.sin() * phi.sin(),
            ));
        }
    }
    vertices.push(Point3::new(0.0, -stretch, 0.0));
    let bottom = vertices.len() - 1;

    let ring = |i: usize, j: usize| 1 + i * segments + j % segments;
    let mut faces = Vec::new();
    for j in 0..segments {
        faces.push([0, ring(0, j + 1), ring(0, j)]);
        for i in 0..rings - 1 {
            let (a, b) = (ring(i, j), ring(i, j + 1));
            let (c, d) = (ring(i + 1, j), ring(i + 1, j + 1));
            faces.push([a, b, d]);
            faces.push([a, d, c]);
        }
        faces.push([ring(rings - 1, j), ring(rings - 1, j + 1), bottom]);
    }

    build_from_triangles(&vertices, &faces).unwrap()
}

fn create_grid_laplacian(n: usize) -> CsrMatrix {
    let mut triplets = Vec::new();
    for y in 0..n {
        for x in 0..n {
            let i = x + n * y;
            let nbrs = [
                (x > 0).then(|| i - 1),
                (x + 1 < n).then(|| i + 1),
                (y > 0).then(|| i - n),
                (y + 1 < n).then(|| i + n),
            ];
            let mut degree = 0.0;
            for j in nbrs.into_iter().flatten() {
                triplets.push((i, j, -1.0));
                degree += 1.0;
            }
            triplets.push((i, i, degree + 0.01));
        }
    }
    CsrMatrix::from_triplets(n * n, n * n, triplets)
}

fn stick() -> Skeleton {
    let mut s = Skeleton::new();
    s.make_joint("base", Point3::new(0.0, 0.0, 0.0), None).unwrap();
    s.make_joint("mid", Point3::new(0.0, 0.5, 0.0), Some("base")).unwrap();
    s.make_joint("tip", Point3::new(0.0, 1.0, 0.0), Some("mid")).unwrap();
    s.init_compressed().unwrap();
    s
}

fn coarse_field() -> DistanceFieldOptions {
    DistanceFieldOptions::default().with_tolerance(0.005).with_max_depth(7)
}

fn bench_distance_field(c: &mut Criterion) {
    let mesh = prepare_mesh(&create_uv_sphere(16, 32, 2.0)).unwrap();
    let options = coarse_field();

    let mut group = c.benchmark_group("distance_field");
    group.sample_size(10);
    group.bench_function("uv_sphere_16x32", |b| {
        b.iter(|| construct_distance_field(&mesh, &options, &Progress::none()).unwrap());
    });

    let field = construct_distance_field(&mesh, &options, &Progress::none()).unwrap();
    group.bench_function("evaluate_1000", |b| {
        b.iter(|| {
            let mut sum = 0.0;
            for i in 0..1000 {
                let t = i as f64 / 1000.0;
                sum += field.evaluate(&Point3::new(t, 0.5, 1.0 - t));
            }
            sum
        });
    });
    group.finish();
}

fn bench_cholesky(c: &mut Criterion) {
    let matrix = create_grid_laplacian(40);
    let spd = SpdMatrix::from_csr(&matrix).unwrap();

    c.bench_function("cholesky_factor_grid_40", |b| {
        b.iter(|| spd.factor().unwrap());
    });

    let llt = spd.factor().unwrap();
    c.bench_function("cholesky_solve_grid_40", |b| {
        b.iter(|| {
            let mut rhs = vec![1.0; llt.size()];
            llt.solve(&mut rhs).unwrap();
            rhs
        });
    });
}

fn bench_attachment(c: &mut Criterion) {
    let mesh = prepare_mesh(&create_uv_sphere(24, 48, 2.0)).unwrap();
    let field = construct_distance_field(&mesh, &coarse_field(), &Progress::none()).unwrap();
    let skeleton = stick();
    let joints = [
        Point3::new(0.5, 0.2, 0.5),
        Point3::new(0.5, 0.5, 0.5),
        Point3::new(0.5, 0.8, 0.5),
    ];
    let tester = FieldVisibility::new(&field);
    assert!(tester.can_see(&joints[0], &joints[2]));

    let mut group = c.benchmark_group("attachment");
    group.sample_size(10);
    group.bench_function("heat_weights_uv_sphere", |b| {
        b.iter(|| Attachment::new(&mesh, &skeleton, &joints, &tester, &AttachmentOptions::default()));
    });

    let attachment = Attachment::new(&mesh, &skeleton, &joints, &tester, &AttachmentOptions::default());
    let pose = vec![Transform::identity(); attachment.num_bones()];
    group.bench_function("deform_dual_quaternion", |b| {
        b.iter(|| attachment.deform(&mesh, &pose, SkinningMode::DualQuaternion));
    });
    group.finish();
}

fn bench_autorig(c: &mut Criterion) {
    let mesh = create_uv_sphere(16, 32, 3.0);
    let skeleton = stick();
    let options = RigOptions::default().with_distance(coarse_field());

    let mut group = c.benchmark_group("autorig");
    group.sample_size(10);
    group.bench_function("stick_in_ellipsoid", |b| {
        b.iter(|| autorig(&skeleton, &mesh, &options));
    });
    group.finish();
}

criterion_group!(benches, bench_distance_field, bench_cholesky, bench_attachment, bench_autorig);
criterion_main!(benches);
