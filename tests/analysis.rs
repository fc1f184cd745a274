use std::sync::Arc;

use approx::assert_relative_eq;
use nalgebra::Vector3;

use quadfem::{
    element::ElementKind,
    mesher::{self, RectangleMesh},
    post_processor, Geometry, IntegrationOrder, LinearElastic, NodeId, QuadfemError, Runner,
    StressState,
};

const E: f64 = 1000.0;
const NU: f64 = 0.3;

fn unit_square() -> (Runner, Vec<NodeId>) {
    let mut runner = Runner::new();
    let n: Vec<NodeId> = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]
        .iter()
        .map(|(x, y)| runner.add_node(*x, *y))
        .collect();
    runner.add_element(&n).unwrap();
    runner.set_material_for_all(Arc::new(LinearElastic::new(E, NU).unwrap()));
    (runner, n)
}

/// Nodes on a line x = const
fn nodes_at_x(geometry: &Geometry, x: f64) -> Vec<NodeId> {
    geometry
        .nodes
        .iter()
        .filter(|n| (n.vertex.x - x).abs() < 1e-9)
        .map(|n| n.id)
        .collect()
}

#[test]
fn unit_square_under_tension() {
    let (mut runner, n) = unit_square();
    runner.constrain(n[0], true, true);
    runner.constrain(n[3], true, true);
    runner.apply_load(n[1], 1.0, 0.0);
    runner.apply_load(n[2], 1.0, 0.0);

    let u = runner
        .run_analysis(IntegrationOrder::Full, IntegrationOrder::Full)
        .unwrap();
    assert_eq!(u.len(), 8);

    let (ux1, uy1) = runner.displacement(n[1]);
    let (ux2, uy2) = runner.displacement(n[2]);
    assert!(ux1 > 0.0);
    assert_relative_eq!(ux1, ux2, epsilon = 1e-12);
    assert_relative_eq!(uy1, -uy2, epsilon = 1e-12);

    for id in [n[0], n[3]] {
        assert_eq!(runner.displacement(id), (0.0, 0.0));
    }
    assert_eq!(u[0], 0.0);
    assert_eq!(u[7], 0.0);
}

#[test]
fn single_element_matches_closed_form() {
    let (mut runner, n) = unit_square();
    runner.constrain(n[0], true, true);
    runner.constrain(n[1], true, true);
    runner.constrain(n[3], true, true);
    runner.apply_load(n[2], 1.0, 0.0);
    runner
        .run_analysis(IntegrationOrder::Full, IntegrationOrder::Full)
        .unwrap();

    let a = E * (3.0 - NU) / (6.0 * (1.0 - NU * NU));
    let b = E / (8.0 * (1.0 - NU));
    let det = a * a - b * b;

    let (u, v) = runner.displacement(n[2]);
    assert_relative_eq!(u, a / det, max_relative = 1e-10);
    assert_relative_eq!(v, -b / det, max_relative = 1e-10);

    let k = runner.global_stiffness_matrix().unwrap();
    assert_relative_eq!(k[(0, 0)], a, max_relative = 1e-12);
    assert_relative_eq!(k[(0, 1)], b, max_relative = 1e-12);
}

#[test]
fn thickness_scales_displacements() {
    let (mut thin, n) = unit_square();
    let (mut thick, _) = unit_square();
    thick.set_material_for_all(Arc::new(
        LinearElastic::new(E, NU).unwrap().with_thickness(2.0).unwrap(),
    ));
    for runner in [&mut thin, &mut thick] {
        runner.constrain(n[0], true, true);
        runner.constrain(n[3], true, true);
        runner.apply_load(n[2], 0.0, -1.0);
        runner
            .run_analysis(IntegrationOrder::Full, IntegrationOrder::Full)
            .unwrap();
    }

    assert_relative_eq!(
        thin.displacement(n[2]).1,
        2.0 * thick.displacement(n[2]).1,
        max_relative = 1e-10
    );
}

#[test]
fn bilinear_patch_test_recovers_uniform_stress() {
    let sigma = 10.0;
    let mut geometry = Geometry::new();
    mesher::generate_rectangle(
        &mut geometry,
        &RectangleMesh {
            element_type: ElementKind::Bilinear,
            width: 2.0,
            height: 1.0,
            divisions_x: 2,
            divisions_y: 1,
            x_origin: 0.0,
            y_origin: 0.0,
        },
    )
    .unwrap();
    geometry.set_material_for_all(Arc::new(LinearElastic::new(E, NU).unwrap()));

    for id in nodes_at_x(&geometry, 0.0) {
        let fix_y = geometry.node(id).vertex.y == 0.0;
        geometry.constrain(id, true, fix_y);
    }
    for id in nodes_at_x(&geometry, 2.0) {
        geometry.apply_load(id, sigma / 2.0, 0.0);
    }

    let mut runner = Runner::with_geometry(geometry);
    runner
        .run_analysis(IntegrationOrder::Full, IntegrationOrder::Full)
        .unwrap();

    let expected_stress = Vector3::new(sigma, 0.0, 0.0);
    let expected_strain = Vector3::new(sigma / E, -NU * sigma / E, 0.0);
    for node in &runner.geometry.nodes {
        assert_relative_eq!(node.stress_avg.unwrap(), expected_stress, epsilon = 1e-9);
        assert_relative_eq!(node.strain_avg.unwrap(), expected_strain, epsilon = 1e-12);
        assert_relative_eq!(node.ux, node.vertex.x * sigma / E, epsilon = 1e-12);
        assert_relative_eq!(node.uy, -NU * node.vertex.y * sigma / E, epsilon = 1e-12);
    }
}

#[test]
fn quadratic_patch_test_recovers_uniform_stress() {
    let sigma = 6.0;
    let mut geometry = Geometry::new();
    mesher::generate_rectangle(
        &mut geometry,
        &RectangleMesh {
            element_type: ElementKind::Quadratic,
            width: 2.0,
            height: 1.0,
            divisions_x: 2,
            divisions_y: 1,
            x_origin: 0.0,
            y_origin: 0.0,
        },
    )
    .unwrap();
    geometry.set_material_for_all(Arc::new(LinearElastic::new(E, NU).unwrap()));

    for id in nodes_at_x(&geometry, 0.0) {
        let fix_y = geometry.node(id).vertex.y == 0.0;
        geometry.constrain(id, true, fix_y);
    }
    // Consistent loads for a uniform traction on a quadratic edge
    for id in nodes_at_x(&geometry, 2.0) {
        let y = geometry.node(id).vertex.y;
        let share = if (y - 0.5).abs() < 1e-9 { 4.0 } else { 1.0 };
        geometry.apply_load(id, share * sigma / 6.0, 0.0);
    }

    let mut runner = Runner::with_geometry(geometry);
    runner
        .run_analysis(IntegrationOrder::Full, IntegrationOrder::Full)
        .unwrap();

    for node in &runner.geometry.nodes {
        assert_relative_eq!(
            node.stress_avg.unwrap(),
            Vector3::new(sigma, 0.0, 0.0),
            epsilon = 1e-8
        );
        assert_relative_eq!(node.ux, node.vertex.x * sigma / E, epsilon = 1e-12);
    }

    // Reduced recovery on the same displacement field gives the same stress
    runner
        .run_analysis(IntegrationOrder::Full, IntegrationOrder::Reduced)
        .unwrap();
    for node in &runner.geometry.nodes {
        assert_relative_eq!(
            node.stress_avg.unwrap(),
            Vector3::new(sigma, 0.0, 0.0),
            epsilon = 1e-8
        );
    }
}

#[test]
fn plane_strain_is_stiffer_than_plane_stress() {
    let run = |state: StressState| {
        let (mut runner, n) = unit_square();
        runner.constrain(n[0], true, true);
        runner.constrain(n[3], true, true);
        runner.apply_load(n[1], 1.0, 0.0);
        runner.apply_load(n[2], 1.0, 0.0);
        runner.set_stress_state(state);
        runner
            .run_analysis(IntegrationOrder::Full, IntegrationOrder::Full)
            .unwrap();
        runner.displacement(n[1]).0
    };

    assert!(run(StressState::PlaneStrain) < run(StressState::PlaneStress));
}

#[test]
fn reduced_stiffness_on_a_lone_bilinear_element_is_singular() {
    let (mut runner, n) = unit_square();
    runner.constrain(n[0], true, true);
    runner.constrain(n[3], true, true);
    runner.apply_load(n[1], 1.0, 0.0);

    assert!(matches!(
        runner.run_analysis(IntegrationOrder::Reduced, IntegrationOrder::Full),
        Err(QuadfemError::SingularSystem(_))
    ));
}

#[test]
fn element_without_material_is_reported() {
    let mut runner = Runner::new();
    let n: Vec<NodeId> = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]
        .iter()
        .map(|(x, y)| runner.add_node(*x, *y))
        .collect();
    runner.add_element(&n).unwrap();
    runner.constrain(n[0], true, true);

    assert!(matches!(
        runner.run_analysis(IntegrationOrder::Full, IntegrationOrder::Full),
        Err(QuadfemError::MissingMaterial(_))
    ));
}

#[test]
fn json_problem_runs_end_to_end() {
    let (geometry, metadata) = mesher::run_from_str(
        r#"{
            "metadata": {
                "material_elasticity": 1000.0,
                "poisson_ratio": 0.3,
                "stiffness_integration": "full",
                "stress_integration": "full"
            },
            "mesh": { "element_type": "quad8", "width": 4.0, "height": 1.0,
                      "divisions_x": 4, "divisions_y": 1 },
            "boundary_conditions": {
                "wall": { "region": { "x_target_max": 0.001 },
                          "targets": { "constrain_x": true, "constrain_y": true } },
                "tip": { "region": { "x_target_min": 3.999, "y_target_min": 0.999 },
                         "targets": { "fy": -1.0 } }
            }
        }"#,
    )
    .unwrap();

    let mut runner = Runner::with_geometry(geometry);
    runner.set_stress_state(metadata.stress_state);
    runner
        .run_analysis(metadata.stiffness_integration, metadata.stress_integration)
        .unwrap();

    let tip = runner
        .geometry
        .nodes
        .iter()
        .find(|n| n.vertex.x == 4.0 && n.vertex.y == 1.0)
        .unwrap();
    assert!(tip.uy < 0.0);

    let total_ry: f64 = runner.geometry.nodes.iter().map(|n| n.reaction.fy).sum();
    assert_relative_eq!(total_ry, 1.0, epsilon = 1e-9);

    let dir = std::env::temp_dir();
    let nodes_output = dir.join("quadfem_analysis_nodes.csv");
    let elements_output = dir.join("quadfem_analysis_elements.csv");
    post_processor::csv_output(
        &runner.geometry,
        nodes_output.to_str().unwrap(),
        elements_output.to_str().unwrap(),
    )
    .unwrap();

    let nodes_csv = std::fs::read_to_string(&nodes_output).unwrap();
    assert_eq!(nodes_csv.lines().count(), runner.geometry.nodes.len() + 1);
    let elements_csv = std::fs::read_to_string(&elements_output).unwrap();
    assert!(elements_csv.starts_with("id,type,n0,n1,n2,n3,n4,n5,n6,n7\n"));
    assert_eq!(elements_csv.lines().count(), 5);

    std::fs::remove_file(nodes_output).unwrap();
    std::fs::remove_file(elements_output).unwrap();
}
