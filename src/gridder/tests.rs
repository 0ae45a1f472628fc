use super::density::TailCoefficients;
use crate::{AtomTyping, CoordinateSet, Example, GridError, GridMaker, Pcg32, Tensor, Transform, Vec3};

const TOL: f32 = 1.0e-4;

fn single_atom(pos: [f32; 3], type_id: f32, radius: f32, ntypes: usize) -> CoordinateSet {
    let coords = Tensor::from_vec(pos.to_vec(), &[1, 3]).unwrap();
    let types = Tensor::from_vec(vec![type_id], &[1]).unwrap();
    let radii = Tensor::from_vec(vec![radius], &[1]).unwrap();
    CoordinateSet::indexed(coords, types, radii, ntypes).unwrap()
}

fn grid_at(grid: &Tensor, dim: usize, c: usize, i: usize, j: usize, k: usize) -> f32 {
    grid.host().unwrap()[((c * dim + i) * dim + j) * dim + k]
}

fn set_grid(grid: &mut Tensor, dim: usize, c: usize, i: usize, j: usize, k: usize, v: f32) {
    grid.host_mut().unwrap()[((c * dim + i) * dim + j) * dim + k] = v;
}

#[test]
fn test_dim_formula() {
    let maker = GridMaker::new(0.5, 23.5).unwrap();
    assert_eq!(maker.grid_dims(), (48, 48, 48));

    let maker = GridMaker::new(0.1, 6.0).unwrap();
    assert_eq!(maker.grid_dims(), (61, 61, 61));

    let mut maker = GridMaker::new(1.0, 2.0).unwrap();
    assert_eq!(maker.grid_dims(), (3, 3, 3));
    maker.set_resolution(0.5).unwrap();
    assert_eq!(maker.grid_dims(), (5, 5, 5));
    maker.set_dimension(4.0).unwrap();
    assert_eq!(maker.grid_dims(), (9, 9, 9));
}

#[test]
fn test_invalid_configuration() {
    assert!(matches!(
        GridMaker::new(0.0, 6.0),
        Err(GridError::InvalidConfiguration(_))
    ));
    assert!(matches!(
        GridMaker::new(0.5, -1.0),
        Err(GridError::InvalidConfiguration(_))
    ));
    assert!(matches!(
        GridMaker::with_options(0.5, 6.0, false, 0.0, 1.0),
        Err(GridError::InvalidConfiguration(_))
    ));
    assert!(matches!(
        GridMaker::with_options(0.5, 6.0, false, 1.0, 0.0),
        Err(GridError::InvalidConfiguration(_))
    ));
}

#[test]
fn test_radius_multiple_tracks_gaussian_extent() {
    let mut maker = GridMaker::new(0.5, 6.0).unwrap();
    assert!((maker.radius_multiple() - 1.5).abs() < 1.0e-6);

    // (1 + 2 G^2) / (2 G) with G = 2.
    maker.set_gaussian_radius_multiple(2.0).unwrap();
    assert!((maker.radius_multiple() - 2.25).abs() < 1.0e-6);

    maker.set_radius_scale(2.0).unwrap();
    assert!((maker.radius_multiple() - 4.5).abs() < 1.0e-6);
}

#[test]
fn test_tail_coefficients_continuity() {
    for &g in &[0.5f32, 1.0, 1.5, 2.0] {
        let coefs = TailCoefficients::for_multiple(g);
        let f = coefs.final_radius_multiple;
        let gauss = (-2.0 * g * g).exp();
        let gauss_slope = -4.0 * g * gauss;
        // Value and slope match the Gaussian at the crossover.
        let q = coefs.a * g * g + coefs.b * g + coefs.c;
        let q_slope = 2.0 * coefs.a * g + coefs.b;
        assert!((q - gauss).abs() < 1.0e-6, "value mismatch at G={g}");
        assert!((q_slope - gauss_slope).abs() < 1.0e-5, "slope mismatch at G={g}");
        // The tail touches zero tangentially at the final multiple.
        let qf = coefs.a * f * f + coefs.b * f + coefs.c;
        let qf_slope = 2.0 * coefs.a * f + coefs.b;
        assert!(qf.abs() < 1.0e-6, "tail end value at G={g}");
        assert!(qf_slope.abs() < 1.0e-5, "tail end slope at G={g}");
        // Backward tail coefficients are the forward tail's exact slope.
        assert_eq!(coefs.d, 2.0 * coefs.a);
        assert_eq!(coefs.e, coefs.b);
    }
}

#[test]
fn test_density_continuity_at_region_edges() {
    let maker = GridMaker::new(0.5, 6.0).unwrap();
    let atom = Vec3::ZERO;
    let r = 2.0;
    let inside = maker.calc_point(atom, r, Vec3::new(2.0 - 1.0e-4, 0.0, 0.0));
    let outside = maker.calc_point(atom, r, Vec3::new(2.0 + 1.0e-4, 0.0, 0.0));
    assert!((inside - outside).abs() < 1.0e-3);
    assert_eq!(maker.calc_point(atom, r, Vec3::new(3.0, 0.0, 0.0)), 0.0);
    assert_eq!(maker.calc_point(atom, r, Vec3::new(0.0, 3.5, 0.0)), 0.0);
}

#[test]
fn test_forward_single_atom_golden() {
    // Unit radius atom at the center of a 3^3 grid at unit resolution; every
    // voxel value follows from the closed-form density.
    let maker = GridMaker::new(1.0, 2.0).unwrap();
    let set = single_atom([0.0, 0.0, 0.0], 0.0, 1.0, 1);
    let mut out = Tensor::zeros(&[1, 3, 3, 3]);
    maker.forward(Vec3::ZERO, &set, &mut out).unwrap();

    let e2 = (-2.0f32).exp();
    let edge = e2 * (17.0 - 12.0 * 2.0f32.sqrt());
    assert!((grid_at(&out, 3, 0, 1, 1, 1) - 1.0).abs() < 1.0e-6);
    for &(i, j, k) in &[(0, 1, 1), (2, 1, 1), (1, 0, 1), (1, 2, 1), (1, 1, 0), (1, 1, 2)] {
        assert!((grid_at(&out, 3, 0, i, j, k) - e2).abs() < 1.0e-6);
    }
    for &(i, j, k) in &[(0, 0, 1), (0, 1, 0), (2, 0, 1), (1, 2, 2)] {
        assert!((grid_at(&out, 3, 0, i, j, k) - edge).abs() < 1.0e-6);
    }
    for &(i, j, k) in &[(0, 0, 0), (2, 2, 2), (0, 2, 0)] {
        assert_eq!(grid_at(&out, 3, 0, i, j, k), 0.0);
    }
}

#[test]
fn test_forward_zeroes_output() {
    let maker = GridMaker::new(1.0, 2.0).unwrap();
    let empty = CoordinateSet::indexed(
        Tensor::from_vec(Vec::new(), &[0, 3]).unwrap(),
        Tensor::from_vec(Vec::new(), &[0]).unwrap(),
        Tensor::from_vec(Vec::new(), &[0]).unwrap(),
        1,
    )
    .unwrap();
    let mut out = Tensor::from_vec(vec![7.0; 27], &[1, 3, 3, 3]).unwrap();
    maker.forward(Vec3::ZERO, &empty, &mut out).unwrap();
    assert!(out.host().unwrap().iter().all(|&v| v == 0.0));
}

#[test]
fn test_forward_skips_out_of_range_types_and_atoms() {
    let maker = GridMaker::new(1.0, 2.0).unwrap();
    let coords = Tensor::from_vec(
        vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 50.0, 0.0, 0.0],
        &[3, 3],
    )
    .unwrap();
    // Negative sentinel, out-of-range channel, and an atom far off the grid.
    let types = Tensor::from_vec(vec![-1.0, 5.0, 0.0], &[3]).unwrap();
    let radii = Tensor::from_vec(vec![1.0, 1.0, 1.0], &[3]).unwrap();
    let set = CoordinateSet::indexed(coords, types, radii, 2).unwrap();
    let mut out = Tensor::zeros(&[2, 3, 3, 3]);
    maker.forward(Vec3::ZERO, &set, &mut out).unwrap();
    assert!(out.host().unwrap().iter().all(|&v| v == 0.0));
}

#[test]
fn test_forward_voxel_sum_matches_radial_integral() {
    let maker = GridMaker::new(0.1, 4.0).unwrap();
    let set = single_atom([0.0, 0.0, 0.0], 0.0, 1.0, 1);
    let (dim, _, _) = maker.grid_dims();
    let mut out = Tensor::zeros(&[1, dim, dim, dim]);
    maker.forward(Vec3::ZERO, &set, &mut out).unwrap();

    let voxel_volume = 0.1f64.powi(3);
    let grid_mass: f64 = out.host().unwrap().iter().map(|&v| v as f64).sum::<f64>() * voxel_volume;

    // Midpoint quadrature of 4 pi d^2 f(d) over the density support.
    let steps = 30_000;
    let h = 1.5 / steps as f64;
    let mut integral = 0.0f64;
    for s in 0..steps {
        let d = (s as f64 + 0.5) * h;
        let f = maker.calc_point(Vec3::ZERO, 1.0, Vec3::new(d as f32, 0.0, 0.0)) as f64;
        integral += 4.0 * std::f64::consts::PI * d * d * f * h;
    }
    assert!(
        (grid_mass - integral).abs() < 0.02 * integral,
        "grid mass {grid_mass} vs integral {integral}"
    );
}

#[test]
fn test_forward_binary_occupancy() {
    let maker = GridMaker::with_options(1.0, 2.0, true, 1.0, 1.0).unwrap();
    // Two atoms of the same type; occupancy saturates at 1.
    let coords = Tensor::from_vec(vec![0.0; 6], &[2, 3]).unwrap();
    let types = Tensor::from_vec(vec![0.0, 0.0], &[2]).unwrap();
    let radii = Tensor::from_vec(vec![1.0, 1.0], &[2]).unwrap();
    let set = CoordinateSet::indexed(coords, types, radii, 1).unwrap();
    let mut out = Tensor::zeros(&[1, 3, 3, 3]);
    maker.forward(Vec3::ZERO, &set, &mut out).unwrap();

    // Density 1.0 at the center voxel; e^-2 < 0.5 at the face neighbors.
    assert_eq!(grid_at(&out, 3, 0, 1, 1, 1), 1.0);
    assert_eq!(grid_at(&out, 3, 0, 0, 1, 1), 0.0);
    assert!(out.host().unwrap().iter().all(|&v| v == 0.0 || v == 1.0));
}

#[test]
fn test_backward_zero_gradient_at_grid_center() {
    let maker = GridMaker::new(0.1, 6.0).unwrap();
    let set = single_atom([0.0, 0.0, 0.0], 0.0, 2.0, 1);
    let (dim, _, _) = maker.grid_dims();
    let mut diff = Tensor::zeros(&[1, dim, dim, dim]);
    set_grid(&mut diff, dim, 0, 30, 30, 30, 1.0);

    let mut grads = Tensor::zeros(&[1, 3]);
    maker.backward(Vec3::ZERO, &set, &diff, &mut grads).unwrap();
    for axis in 0..3 {
        assert!(grads.host().unwrap()[axis].abs() < TOL);
    }
}

#[test]
fn test_backward_gradient_antisymmetry() {
    let maker = GridMaker::new(0.1, 6.0).unwrap();
    let (dim, _, _) = maker.grid_dims();
    let mut diff = Tensor::zeros(&[1, dim, dim, dim]);
    set_grid(&mut diff, dim, 0, 30, 30, 30, 1.0);

    let set = single_atom([1.0, 0.0, 0.0], 0.0, 2.0, 1);
    let mut grads = Tensor::zeros(&[1, 3]);
    maker.backward(Vec3::ZERO, &set, &diff, &mut grads).unwrap();
    let gval = grads.host().unwrap()[0];
    assert!(gval < -TOL);
    assert!(grads.host().unwrap()[1].abs() < TOL);
    assert!(grads.host().unwrap()[2].abs() < TOL);

    // Mirrored placement produces the mirrored gradient.
    let set = single_atom([-1.0, 0.0, 0.0], 0.0, 2.0, 1);
    maker.backward(Vec3::ZERO, &set, &diff, &mut grads).unwrap();
    assert!(grads.host().unwrap()[0] > TOL);
    assert!((gval + grads.host().unwrap()[0]).abs() < TOL);
    assert!(grads.host().unwrap()[1].abs() < TOL);
    assert!(grads.host().unwrap()[2].abs() < TOL);
}

#[test]
fn test_backward_requires_indexed_types() {
    let maker = GridMaker::new(0.1, 6.0).unwrap();
    let (dim, _, _) = maker.grid_dims();
    let coords = Tensor::from_vec(vec![0.0; 3], &[1, 3]).unwrap();
    let vectors = Tensor::from_vec(vec![0.0, 1.0], &[1, 2]).unwrap();
    let radii = Tensor::from_vec(vec![2.0], &[1]).unwrap();
    let set = CoordinateSet::vector(coords, vectors, radii).unwrap();
    let diff = Tensor::zeros(&[2, dim, dim, dim]);
    let mut grads = Tensor::zeros(&[1, 3]);
    assert!(matches!(
        maker.backward(Vec3::ZERO, &set, &diff, &mut grads),
        Err(GridError::MissingTyping(_))
    ));
}

#[test]
fn test_backward_vector_type_gradients() {
    let maker = GridMaker::new(0.1, 6.0).unwrap();
    let (dim, _, _) = maker.grid_dims();
    let coords = Tensor::from_vec(vec![0.0; 3], &[1, 3]).unwrap();
    let vectors = Tensor::from_vec(vec![0.0, 1.0], &[1, 2]).unwrap();
    let radii = Tensor::from_vec(vec![2.0], &[1]).unwrap();
    let set = CoordinateSet::vector(coords, vectors, radii).unwrap();

    let mut diff = Tensor::zeros(&[2, dim, dim, dim]);
    set_grid(&mut diff, dim, 0, 30, 30, 30, 1.0);

    let mut grads = Tensor::zeros(&[1, 3]);
    let mut tgrads = Tensor::zeros(&[1, 2]);
    maker
        .backward_with_types(Vec3::ZERO, &set, &diff, &mut grads, &mut tgrads)
        .unwrap();

    // Channel 0 carries upstream gradient, so its weight gradient is the
    // plain density even though the forward weight was zero.
    assert!(tgrads.host().unwrap()[0] > 0.0);
    assert_eq!(tgrads.host().unwrap()[1], 0.0);
}

#[test]
fn test_backward_finite_difference_consistency() {
    let maker = GridMaker::new(0.5, 3.0).unwrap();
    let (dim, _, _) = maker.grid_dims();
    let nvox = dim * dim * dim;
    let pos = [0.3f32, -0.2, 0.1];
    let set = single_atom(pos, 0.0, 1.0, 1);

    let mut rng = Pcg32::new(0, 7);
    let diff_data: Vec<f32> = (0..nvox).map(|_| rng.next_f32()).collect();
    let diff = Tensor::from_vec(diff_data.clone(), &[1, dim, dim, dim]).unwrap();

    let mut grads = Tensor::zeros(&[1, 3]);
    maker.backward(Vec3::ZERO, &set, &diff, &mut grads).unwrap();

    let eps = 1.0e-2f32;
    for axis in 0..3 {
        let shifted = |delta: f32| {
            let mut p = pos;
            p[axis] += delta;
            let set = single_atom(p, 0.0, 1.0, 1);
            let mut out = Tensor::zeros(&[1, dim, dim, dim]);
            maker.forward(Vec3::ZERO, &set, &mut out).unwrap();
            out
        };
        let plus = shifted(eps);
        let minus = shifted(-eps);
        let mut fd = 0.0f64;
        for v in 0..nvox {
            let dv = (plus.host().unwrap()[v] - minus.host().unwrap()[v]) as f64;
            fd += diff_data[v] as f64 * dv;
        }
        fd /= 2.0 * eps as f64;
        let analytic = grads.host().unwrap()[axis] as f64;
        assert!(
            (fd - analytic).abs() < 0.02 * (1.0 + analytic.abs()),
            "axis {axis}: finite difference {fd} vs backward {analytic}"
        );
    }
}

#[test]
fn test_backward_binary_mode_runs_clean() {
    let maker = GridMaker::with_options(0.1, 6.0, true, 1.0, 1.0).unwrap();
    let set = single_atom([0.5, 0.0, 0.0], 0.0, 2.0, 1);
    let (dim, _, _) = maker.grid_dims();
    let mut diff = Tensor::zeros(&[1, dim, dim, dim]);
    set_grid(&mut diff, dim, 0, 30, 30, 30, 1.0);
    let mut grads = Tensor::zeros(&[1, 3]);
    maker.backward(Vec3::ZERO, &set, &diff, &mut grads).unwrap();
    assert!(grads.host().unwrap().iter().all(|v| v.is_finite()));
}

#[test]
fn test_backward_relevance_single_atom() {
    let maker = GridMaker::new(0.1, 6.0).unwrap();
    let set = single_atom([0.0, 0.0, 0.0], 0.0, 2.0, 1);
    let (dim, _, _) = maker.grid_dims();

    let mut density = Tensor::zeros(&[1, dim, dim, dim]);
    set_grid(&mut density, dim, 0, 31, 30, 30, 1.0);
    let mut diff = Tensor::zeros(&[1, dim, dim, dim]);
    set_grid(&mut diff, dim, 0, 31, 30, 30, 10.0);

    let mut relevance = Tensor::zeros(&[1]);
    maker
        .backward_relevance(Vec3::ZERO, &set, &density, &diff, &mut relevance)
        .unwrap();

    // The voxel sits 0.1 A off-center, so the atom's own contribution is
    // exp(-0.005) and the shared relevance is just below the full 10.
    let rel = relevance.host().unwrap()[0];
    assert!(rel > 1.0);
    assert!(rel < 10.0);
    let expected = 10.0 * (-0.005f32).exp();
    assert!((rel - expected).abs() < 1.0e-3);
}

#[test]
fn test_backward_relevance_rejects_vector_types() {
    let maker = GridMaker::new(0.1, 6.0).unwrap();
    let (dim, _, _) = maker.grid_dims();
    let coords = Tensor::from_vec(vec![0.0; 3], &[1, 3]).unwrap();
    let vectors = Tensor::from_vec(vec![0.0, 1.0], &[1, 2]).unwrap();
    let radii = Tensor::from_vec(vec![2.0], &[1]).unwrap();
    let set = CoordinateSet::vector(coords, vectors, radii).unwrap();
    let density = Tensor::zeros(&[2, dim, dim, dim]);
    let diff = Tensor::zeros(&[2, dim, dim, dim]);
    let mut relevance = Tensor::zeros(&[1]);
    assert!(matches!(
        maker.backward_relevance(Vec3::ZERO, &set, &density, &diff, &mut relevance),
        Err(GridError::MissingTyping(_))
    ));
}

#[test]
fn test_shape_mismatches_are_rejected() {
    let maker = GridMaker::new(1.0, 2.0).unwrap();
    let set = single_atom([0.0, 0.0, 0.0], 0.0, 1.0, 1);

    let mut wrong_channels = Tensor::zeros(&[2, 3, 3, 3]);
    assert!(matches!(
        maker.forward(Vec3::ZERO, &set, &mut wrong_channels),
        Err(GridError::ShapeMismatch(_))
    ));

    let mut wrong_dim = Tensor::zeros(&[1, 4, 4, 4]);
    assert!(matches!(
        maker.forward(Vec3::ZERO, &set, &mut wrong_dim),
        Err(GridError::ShapeMismatch(_))
    ));

    let diff = Tensor::zeros(&[1, 3, 3, 3]);
    let mut wrong_grads = Tensor::zeros(&[2, 3]);
    assert!(matches!(
        maker.backward(Vec3::ZERO, &set, &diff, &mut wrong_grads),
        Err(GridError::ShapeMismatch(_))
    ));
}

#[test]
fn test_negative_radii_are_rejected() {
    let maker = GridMaker::new(1.0, 2.0).unwrap();
    let coords = Tensor::from_vec(vec![0.0; 3], &[1, 3]).unwrap();
    let types = Tensor::from_vec(vec![0.0], &[1]).unwrap();
    let radii = Tensor::from_vec(vec![-1.0], &[1]).unwrap();
    let set = CoordinateSet::indexed(coords, types, radii, 1).unwrap();
    let mut out = Tensor::zeros(&[1, 3, 3, 3]);
    assert!(matches!(
        maker.forward(Vec3::ZERO, &set, &mut out),
        Err(GridError::InvalidConfiguration(_))
    ));
}

#[test]
fn test_merge_coordinates_offsets_channels() {
    let a = single_atom([0.0, 0.0, 0.0], 1.0, 1.0, 2);
    let coords = Tensor::from_vec(vec![1.0, 0.0, 0.0, 2.0, 0.0, 0.0], &[2, 3]).unwrap();
    let types = Tensor::from_vec(vec![0.0, -1.0], &[2]).unwrap();
    let radii = Tensor::from_vec(vec![1.0, 1.0], &[2]).unwrap();
    let b = CoordinateSet::indexed(coords, types, radii, 3).unwrap();

    let merged = Example::new(vec![a, b]).merge_coordinates().unwrap();
    assert_eq!(merged.len(), 3);
    assert_eq!(merged.num_types(), 5);
    let AtomTyping::Index(types) = &merged.typing else {
        panic!("expected indexed typing");
    };
    // Second set's channels shift past the first set's two; sentinels stay.
    assert_eq!(types.host().unwrap(), [1.0, 2.0, -1.0]);
}

#[test]
fn test_forward_transformed_identity_matches_forward() {
    let maker = GridMaker::new(0.5, 2.0).unwrap();
    let (dim, _, _) = maker.grid_dims();
    let set = single_atom([0.4, 0.0, -0.2], 0.0, 1.0, 1);
    let example = Example::new(vec![set.clone()]);
    let center = Vec3::new(0.4, 0.0, -0.2);

    let mut direct = Tensor::zeros(&[1, dim, dim, dim]);
    maker.forward(center, &set, &mut direct).unwrap();

    let mut transformed = Tensor::zeros(&[1, dim, dim, dim]);
    maker
        .forward_transformed(&example, &Transform::identity(center), &mut transformed)
        .unwrap();

    assert_eq!(direct.host().unwrap(), transformed.host().unwrap());
}

#[test]
fn test_forward_batch_is_seed_deterministic() {
    let maker = GridMaker::new(0.5, 2.0).unwrap();
    let (dim, _, _) = maker.grid_dims();
    let example = Example::new(vec![single_atom([0.0, 0.0, 0.0], 0.0, 1.0, 1)]);
    let examples = vec![example.clone(), example];

    let mut out_a = Tensor::zeros(&[2, 1, dim, dim, dim]);
    maker
        .forward_batch(&examples, &mut out_a, 0.5, true, 42)
        .unwrap();
    let mut out_b = Tensor::zeros(&[2, 1, dim, dim, dim]);
    maker
        .forward_batch(&examples, &mut out_b, 0.5, true, 42)
        .unwrap();
    assert_eq!(out_a.host().unwrap(), out_b.host().unwrap());

    // Each example draws its own augmentation stream.
    let grid_len = dim * dim * dim;
    let data = out_a.host().unwrap();
    assert_ne!(&data[..grid_len], &data[grid_len..]);

    let mut wrong = Tensor::zeros(&[3, 1, dim, dim, dim]);
    assert!(matches!(
        maker.forward_batch(&examples, &mut wrong, 0.0, false, 0),
        Err(GridError::ShapeMismatch(_))
    ));
}

#[test]
fn test_transform_inverse_recovers_points() {
    let mut rng = Pcg32::new(3, 11);
    let transform = Transform::random(Vec3::new(1.0, -2.0, 0.5), 2.0, true, &mut rng);
    let set = single_atom([0.7, 0.3, -1.1], 0.0, 1.0, 1);
    let moved = transform.forward(&set).unwrap();
    let mut coords = moved.coords.clone();
    transform.backward(&mut coords, true).unwrap();
    let orig = set.coords.host().unwrap();
    let back = coords.host().unwrap();
    for i in 0..3 {
        assert!((orig[i] - back[i]).abs() < TOL);
    }
}

#[test]
fn test_grid_dump_artifact_format() {
    use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

    let maker = GridMaker::new(1.0, 2.0).unwrap();
    let set = single_atom([0.0, 0.0, 0.0], 0.0, 1.0, 1);
    let mut out = Tensor::zeros(&[1, 3, 3, 3]);
    maker.forward(Vec3::ZERO, &set, &mut out).unwrap();

    // Channel-major, x-major, 4-byte little-endian floats.
    let mut dump = Vec::new();
    for &v in out.host().unwrap() {
        dump.write_f32::<LittleEndian>(v).unwrap();
    }
    assert_eq!(dump.len(), 27 * 4);
    let center_offset = 13; // voxel (1, 1, 1) in channel 0
    assert_eq!(
        &dump[center_offset * 4..center_offset * 4 + 4],
        &1.0f32.to_le_bytes()
    );

    let mut cursor = std::io::Cursor::new(&dump);
    let mut restored = Vec::with_capacity(27);
    while let Ok(v) = cursor.read_f32::<LittleEndian>() {
        restored.push(v);
    }
    assert_eq!(restored, out.host().unwrap());
}

mod device {
    //! Host/device parity checks; these need a WGPU adapter and are ignored
    //! by default.

    use super::*;
    use cubecl::wgpu::WgpuDevice;

    fn multi_atom_set() -> CoordinateSet {
        let coords = Tensor::from_vec(
            vec![0.0, 0.0, 0.0, 1.2, -0.4, 0.3, -0.9, 0.8, -0.5, 9.0, 0.0, 0.0],
            &[4, 3],
        )
        .unwrap();
        let types = Tensor::from_vec(vec![0.0, 1.0, 0.0, -1.0], &[4]).unwrap();
        let radii = Tensor::from_vec(vec![1.0, 1.4, 1.8, 1.0], &[4]).unwrap();
        CoordinateSet::indexed(coords, types, radii, 2).unwrap()
    }

    fn assert_close(a: &[f32], b: &[f32]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < TOL, "{x} vs {y}");
        }
    }

    #[test]
    #[ignore = "requires a WGPU adapter"]
    fn test_forward_host_device_parity() {
        let device = WgpuDevice::default();
        let maker = GridMaker::new(0.5, 6.0).unwrap();
        let (dim, _, _) = maker.grid_dims();
        let set = multi_atom_set();

        let mut host_out = Tensor::zeros(&[2, dim, dim, dim]);
        maker.forward(Vec3::ZERO, &set, &mut host_out).unwrap();

        let set_dev = set.to_device(&device);
        let mut dev_out = Tensor::zeros_on(&device, &[2, dim, dim, dim]);
        maker.forward(Vec3::ZERO, &set_dev, &mut dev_out).unwrap();

        assert_close(host_out.host().unwrap(), dev_out.to_host().host().unwrap());
    }

    #[test]
    #[ignore = "requires a WGPU adapter"]
    fn test_backward_host_device_parity() {
        let device = WgpuDevice::default();
        let maker = GridMaker::new(0.5, 6.0).unwrap();
        let (dim, _, _) = maker.grid_dims();
        let set = multi_atom_set();

        let mut rng = Pcg32::new(1, 5);
        let diff_data: Vec<f32> = (0..2 * dim * dim * dim).map(|_| rng.next_f32()).collect();
        let diff = Tensor::from_vec(diff_data, &[2, dim, dim, dim]).unwrap();

        let mut host_grads = Tensor::zeros(&[4, 3]);
        maker
            .backward(Vec3::ZERO, &set, &diff, &mut host_grads)
            .unwrap();

        let set_dev = set.to_device(&device);
        let diff_dev = diff.to_device(&device);
        let mut dev_grads = Tensor::zeros_on(&device, &[4, 3]);
        maker
            .backward(Vec3::ZERO, &set_dev, &diff_dev, &mut dev_grads)
            .unwrap();

        assert_close(
            host_grads.host().unwrap(),
            dev_grads.to_host().host().unwrap(),
        );
    }

    #[test]
    #[ignore = "requires a WGPU adapter"]
    fn test_relevance_host_device_parity() {
        let device = WgpuDevice::default();
        let maker = GridMaker::new(0.1, 6.0).unwrap();
        let (dim, _, _) = maker.grid_dims();
        let set = single_atom([0.0, 0.0, 0.0], 0.0, 2.0, 1);

        let mut density = Tensor::zeros(&[1, dim, dim, dim]);
        set_grid(&mut density, dim, 0, 31, 30, 30, 1.0);
        let mut diff = Tensor::zeros(&[1, dim, dim, dim]);
        set_grid(&mut diff, dim, 0, 31, 30, 30, 10.0);

        let mut host_rel = Tensor::zeros(&[1]);
        maker
            .backward_relevance(Vec3::ZERO, &set, &density, &diff, &mut host_rel)
            .unwrap();

        let set_dev = set.to_device(&device);
        let density_dev = density.to_device(&device);
        let diff_dev = diff.to_device(&device);
        let mut dev_rel = Tensor::zeros_on(&device, &[1]);
        maker
            .backward_relevance(Vec3::ZERO, &set_dev, &density_dev, &diff_dev, &mut dev_rel)
            .unwrap();

        assert_close(host_rel.host().unwrap(), dev_rel.to_host().host().unwrap());
    }

    #[test]
    #[ignore = "requires a WGPU adapter"]
    fn test_mixed_storage_is_rejected() {
        let device = WgpuDevice::default();
        let maker = GridMaker::new(0.5, 6.0).unwrap();
        let (dim, _, _) = maker.grid_dims();
        let set = multi_atom_set();
        let mut dev_out = Tensor::zeros_on(&device, &[2, dim, dim, dim]);
        assert!(matches!(
            maker.forward(Vec3::ZERO, &set, &mut dev_out),
            Err(GridError::StorageMismatch(_))
        ));
    }
}
