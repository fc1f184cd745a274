use std::sync::Arc;

use json::JsonValue;
use tracing::{info, warn};

use crate::{
    datatypes::{
        BoundaryRegion, BoundaryRule, BoundaryTarget, IntegrationOrder, ModelMetadata, NodeId,
    },
    element::ElementKind,
    error::{QuadfemError, Result},
    geometry::Geometry,
    material::{LinearElastic, StressState},
};

/// Structured mesh of a rectangle
#[derive(Debug, Clone)]
pub struct RectangleMesh {
    pub element_type: ElementKind,
    pub width: f64,
    pub height: f64,
    pub divisions_x: usize,
    pub divisions_y: usize,
    pub x_origin: f64,
    pub y_origin: f64,
}

/// Meshes a rectangle into `divisions_x` by `divisions_y` quadrilaterals
///
/// Nodes are laid out column by column, bottom to top. Quadratic meshes
/// place a mid-side node on every element edge and share it between
/// neighbours.
///
/// # Arguments
/// * `geometry` - The geometry to add nodes and elements to
/// * `mesh` - The rectangle and its subdivision
///
/// # Returns
/// The handles of the created nodes
pub fn generate_rectangle(geometry: &mut Geometry, mesh: &RectangleMesh) -> Result<Vec<NodeId>> {
    if mesh.divisions_x == 0 || mesh.divisions_y == 0 {
        return Err(QuadfemError::Mesher(
            "rectangle needs at least one division in each direction".to_owned(),
        ));
    }
    if !(mesh.width > 0.0) || !(mesh.height > 0.0) {
        return Err(QuadfemError::Mesher(format!(
            "rectangle must have positive size, got {} x {}",
            mesh.width, mesh.height
        )));
    }

    // Grid steps: quadratic meshes work on a grid twice as fine
    let refinement = match mesh.element_type {
        ElementKind::Bilinear => 1,
        ElementKind::Quadratic => 2,
    };
    let columns = refinement * mesh.divisions_x;
    let rows = refinement * mesh.divisions_y;
    let x_spacing = mesh.width / columns as f64;
    let y_spacing = mesh.height / rows as f64;

    // Dense (columns + 1) x (rows + 1) lookup, column major
    let mut grid: Vec<Option<NodeId>> = vec![None; (columns + 1) * (rows + 1)];
    let grid_index = |i: usize, j: usize| i * (rows + 1) + j;
    let mut created = Vec::new();
    for i in 0..=columns {
        for j in 0..=rows {
            // Serendipity elements have no centre node
            if refinement == 2 && i % 2 == 1 && j % 2 == 1 {
                continue;
            }
            let x = mesh.x_origin + i as f64 * x_spacing;
            let y = mesh.y_origin + j as f64 * y_spacing;
            let id = geometry.add_node(x, y);
            grid[grid_index(i, j)] = Some(id);
            created.push(id);
        }
    }

    let at = |i: usize, j: usize| {
        grid[grid_index(i, j)].ok_or_else(|| {
            QuadfemError::Mesher(format!("no grid node at column {i}, row {j}"))
        })
    };

    for a in 0..mesh.divisions_x {
        for b in 0..mesh.divisions_y {
            let (i, j) = (refinement * a, refinement * b);
            let r = refinement;
            let mut connectivity = vec![at(i, j)?, at(i + r, j)?, at(i + r, j + r)?, at(i, j + r)?];
            if refinement == 2 {
                connectivity.extend([
                    at(i + 1, j)?,
                    at(i + 2, j + 1)?,
                    at(i + 1, j + 2)?,
                    at(i, j + 1)?,
                ]);
            }
            geometry.add_element(&connectivity)?;
        }
    }

    info!(
        "meshed rectangle into {} elements and {} nodes",
        mesh.divisions_x * mesh.divisions_y,
        created.len()
    );

    Ok(created)
}

/// Builds geometry from node coordinates and zero-based connectivity lists
pub fn from_arrays(
    geometry: &mut Geometry,
    nodes: &[(f64, f64)],
    connectivity: &[Vec<usize>],
) -> Result<Vec<NodeId>> {
    let offset = geometry.nodes.len();
    let created: Vec<NodeId> = nodes.iter().map(|(x, y)| geometry.add_node(*x, *y)).collect();

    for (e, element_nodes) in connectivity.iter().enumerate() {
        let mut ids = Vec::with_capacity(element_nodes.len());
        for index in element_nodes {
            if *index >= nodes.len() {
                return Err(QuadfemError::Mesher(format!(
                    "element {e} references node {index} but only {} nodes exist",
                    nodes.len()
                )));
            }
            ids.push(NodeId(offset + index));
        }
        geometry.add_element(&ids)?;
    }

    Ok(created)
}

/// Reads and validates the input file
///
/// # Arguments
/// * `input_file` - The path to the input file
///
/// # Returns
/// A JsonValue object
fn load_input_file(input_file: &str) -> Result<JsonValue> {
    let file_string = match std::fs::read_to_string(input_file) {
        Ok(f) => f,
        Err(err) => {
            return Err(QuadfemError::Input(format!(
                "Unable to open input file {input_file}: {err}"
            )))
        }
    };

    parse_input(&file_string)
}

fn parse_input(contents: &str) -> Result<JsonValue> {
    let input_file_json = match json::parse(contents) {
        Ok(f) => f,
        Err(err) => {
            return Err(QuadfemError::Input(format!(
                "Error in input file json: {err}"
            )))
        }
    };

    for section in ["metadata", "mesh", "boundary_conditions"] {
        if !input_file_json.has_key(section) {
            return Err(QuadfemError::Input(format!(
                "Input json missing {section} field"
            )));
        }
    }
    for field in ["material_elasticity", "poisson_ratio"] {
        if !input_file_json["metadata"].has_key(field) {
            return Err(QuadfemError::Input(format!(
                "Input json missing {field} field in metadata section"
            )));
        }
    }

    Ok(input_file_json)
}

fn required_f64(value: &JsonValue, name: &str) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| QuadfemError::Input(format!("Bad value for {name}")))
}

fn optional_f64(value: &JsonValue, name: &str, default: f64) -> Result<f64> {
    if value.is_null() {
        Ok(default)
    } else {
        required_f64(value, name)
    }
}

fn optional_bool(value: &JsonValue, name: &str) -> Result<Option<bool>> {
    if value.is_null() {
        Ok(None)
    } else {
        value
            .as_bool()
            .map(Some)
            .ok_or_else(|| QuadfemError::Input(format!("Bad value for {name}")))
    }
}

fn optional_load(value: &JsonValue, name: &str) -> Result<Option<f64>> {
    if value.is_null() {
        Ok(None)
    } else {
        required_f64(value, name).map(Some)
    }
}

fn parse_integration(value: &JsonValue) -> Result<IntegrationOrder> {
    match value.as_str() {
        Some(s) => s.parse(),
        None if value.is_null() => Ok(IntegrationOrder::Full),
        None => Err(QuadfemError::Input(
            "integration type must be a string".to_owned(),
        )),
    }
}

/// Parses Model Metadata from the input_json
///
/// # Arguments
/// * `input_json` - The input file as a JsonValue object
///
/// # Returns
/// A ModelMetadata instance
fn parse_input_metadata(input_json: &JsonValue) -> Result<ModelMetadata> {
    let metadata = &input_json["metadata"];

    let youngs_modulus = required_f64(&metadata["material_elasticity"], "material_elasticity")?;
    let poisson_ratio = required_f64(&metadata["poisson_ratio"], "poisson_ratio")?;
    let part_thickness = optional_f64(&metadata["part_thickness"], "part_thickness", 1.0)?;

    let stress_state = match metadata["stress_state"].as_str() {
        None | Some("plane_stress") => StressState::PlaneStress,
        Some("plane_strain") => StressState::PlaneStrain,
        Some(other) => {
            return Err(QuadfemError::Input(format!(
                "stress_state must be plane_stress or plane_strain, got {other}"
            )))
        }
    };

    Ok(ModelMetadata {
        youngs_modulus,
        poisson_ratio,
        part_thickness,
        stress_state,
        stiffness_integration: parse_integration(&metadata["stiffness_integration"])?,
        stress_integration: parse_integration(&metadata["stress_integration"])?,
    })
}

/// Builds the mesh described by the `mesh` section
fn build_mesh(input_json: &JsonValue, geometry: &mut Geometry) -> Result<()> {
    let mesh = &input_json["mesh"];

    if mesh.has_key("nodes") {
        let mut nodes = Vec::new();
        for (i, pair) in mesh["nodes"].members().enumerate() {
            let name = format!("nodes[{i}]");
            if pair.len() != 2 {
                return Err(QuadfemError::Input(format!("{name} must be an [x, y] pair")));
            }
            nodes.push((required_f64(&pair[0], &name)?, required_f64(&pair[1], &name)?));
        }

        let mut connectivity = Vec::new();
        for (e, element) in mesh["elements"].members().enumerate() {
            let indices = element
                .members()
                .map(|v| {
                    v.as_usize()
                        .ok_or_else(|| QuadfemError::Input(format!("Bad node index in elements[{e}]")))
                })
                .collect::<Result<Vec<usize>>>()?;
            connectivity.push(indices);
        }

        from_arrays(geometry, &nodes, &connectivity)?;
        return Ok(());
    }

    let element_type = match mesh["element_type"].as_str() {
        None | Some("quad4") => ElementKind::Bilinear,
        Some("quad8") => ElementKind::Quadratic,
        Some(other) => {
            return Err(QuadfemError::Input(format!(
                "element_type must be quad4 or quad8, got {other}"
            )))
        }
    };
    let divisions = |name: &str| {
        mesh[name]
            .as_usize()
            .ok_or_else(|| QuadfemError::Input(format!("Bad value for {name} in mesh section")))
    };

    let rectangle = RectangleMesh {
        element_type,
        width: required_f64(&mesh["width"], "width")?,
        height: required_f64(&mesh["height"], "height")?,
        divisions_x: divisions("divisions_x")?,
        divisions_y: divisions("divisions_y")?,
        x_origin: optional_f64(&mesh["x_origin"], "x_origin", 0.0)?,
        y_origin: optional_f64(&mesh["y_origin"], "y_origin", 0.0)?,
    };
    generate_rectangle(geometry, &rectangle)?;

    Ok(())
}

/// Loads boundary rules from the input json
///
/// # Arguments
/// * `input_json` - The input file as a JsonValue object
fn parse_boundary_rules(input_json: &JsonValue) -> Result<Vec<BoundaryRule>> {
    let mut rules: Vec<BoundaryRule> = Vec::new();

    for (name, rule_json) in input_json["boundary_conditions"].entries() {
        if !rule_json.has_key("region") {
            return Err(QuadfemError::Input(format!(
                "Boundary rule {name} is missing region field"
            )));
        }
        if !rule_json.has_key("targets") {
            return Err(QuadfemError::Input(format!(
                "Boundary rule {name} is missing targets field"
            )));
        }

        let region_json = &rule_json["region"];
        let unbounded = BoundaryRegion::default();
        let region = BoundaryRegion {
            x_min: optional_f64(&region_json["x_target_min"], "x_target_min", unbounded.x_min)?,
            x_max: optional_f64(&region_json["x_target_max"], "x_target_max", unbounded.x_max)?,
            y_min: optional_f64(&region_json["y_target_min"], "y_target_min", unbounded.y_min)?,
            y_max: optional_f64(&region_json["y_target_max"], "y_target_max", unbounded.y_max)?,
        };

        let targets = &rule_json["targets"];
        let target = BoundaryTarget {
            constrain_x: optional_bool(&targets["constrain_x"], "constrain_x")?,
            constrain_y: optional_bool(&targets["constrain_y"], "constrain_y")?,
            fx: optional_load(&targets["fx"], "fx")?,
            fy: optional_load(&targets["fy"], "fy")?,
        };

        if region.x_min > region.x_max {
            return Err(QuadfemError::Input(format!(
                "Boundary '{name}' has x_target_min greater than x_target_max"
            )));
        }
        if region.y_min > region.y_max {
            return Err(QuadfemError::Input(format!(
                "Boundary '{name}' has y_target_min greater than y_target_max"
            )));
        }
        if target.constrain_x == Some(true) && target.fx.is_some() {
            return Err(QuadfemError::Input(format!(
                "Boundary '{name}' is over-constrained in x-axis"
            )));
        }
        if target.constrain_y == Some(true) && target.fy.is_some() {
            return Err(QuadfemError::Input(format!(
                "Boundary '{name}' is over-constrained in y-axis"
            )));
        }

        rules.push(BoundaryRule {
            name: name.to_string(),
            region,
            target,
        })
    }
    info!("loaded {} boundary rules from input file", rules.len());

    Ok(rules)
}

/// Applies boundary rules to every node inside their regions. Later rules
/// override earlier ones field by field.
pub fn apply_boundary_conditions(geometry: &mut Geometry, rules: &[BoundaryRule]) {
    for rule in rules {
        let selected: Vec<NodeId> = geometry
            .nodes
            .iter()
            .filter(|node| rule.region.contains(&node.vertex))
            .map(|node| node.id)
            .collect();

        if selected.is_empty() {
            warn!("boundary rule '{}' selects no nodes", rule.name);
        }

        for id in selected {
            let node = geometry.node(id);
            let (constraint, load) = (node.constraint, node.load);
            geometry.constrain(
                id,
                rule.target.constrain_x.unwrap_or(constraint.x),
                rule.target.constrain_y.unwrap_or(constraint.y),
            );
            geometry.apply_load(
                id,
                rule.target.fx.unwrap_or(load.fx),
                rule.target.fy.unwrap_or(load.fy),
            );
        }
    }
}

/// Builds a complete model from a parsed problem definition
fn build_model(input_json: &JsonValue) -> Result<(Geometry, ModelMetadata)> {
    let model_metadata = parse_input_metadata(input_json)?;

    let mut geometry = Geometry::new();
    build_mesh(input_json, &mut geometry)?;

    let material = LinearElastic::new(model_metadata.youngs_modulus, model_metadata.poisson_ratio)?
        .with_thickness(model_metadata.part_thickness)?;
    geometry.set_material_for_all(Arc::new(material));

    let rules = parse_boundary_rules(input_json)?;
    apply_boundary_conditions(&mut geometry, &rules);

    Ok((geometry, model_metadata))
}

/// Runs the mesher
///
/// # Arguments
/// * `input_file` - The problem definition json
///
/// # Returns
/// The meshed, loaded and constrained geometry with the model metadata
pub fn run(input_file: &str) -> Result<(Geometry, ModelMetadata)> {
    let input_file_json = load_input_file(input_file)?;
    build_model(&input_file_json)
}

/// Same as [`run`] for a problem definition already in memory
pub fn run_from_str(contents: &str) -> Result<(Geometry, ModelMetadata)> {
    let input_json = parse_input(contents)?;
    build_model(&input_json)
}
