use std::io::Write;

use nalgebra::Vector3;
use tracing::info;

use crate::{element::ElementKind, error::QuadfemError, geometry::Geometry};

/// Plane von Mises equivalent of (σxx, σyy, τxy)
pub fn von_mises(stress: &Vector3<f64>) -> f64 {
    let (sx, sy, txy) = (stress[0], stress[1], stress[2]);
    f64::sqrt(sx * sx - sx * sy + sy * sy + 3.0 * txy * txy)
}

fn create(path: &str) -> Result<std::fs::File, QuadfemError> {
    std::fs::File::create(path)
        .map_err(|err| QuadfemError::PostProcessor(format!("Failed to create {path}: {err}")))
}

/// Writes nodal results as CSV
///
/// Columns: node id, position, displacement, averaged stress and strain,
/// von Mises stress and reaction. Nodes without averages get empty fields.
pub fn write_nodes_csv<W: Write>(geometry: &Geometry, out: &mut W) -> Result<(), QuadfemError> {
    writeln!(
        out,
        "id,x,y,ux,uy,stress_xx,stress_yy,stress_xy,strain_xx,strain_yy,strain_xy,von_mises,rx,ry"
    )?;

    for node in &geometry.nodes {
        let (stress, mises) = match &node.stress_avg {
            Some(s) => (format!("{},{},{}", s[0], s[1], s[2]), von_mises(s).to_string()),
            None => (",,".to_owned(), String::new()),
        };
        let strain = match &node.strain_avg {
            Some(e) => format!("{},{},{}", e[0], e[1], e[2]),
            None => ",,".to_owned(),
        };

        writeln!(
            out,
            "{id},{x},{y},{ux},{uy},{stress},{strain},{mises},{rx},{ry}",
            id = node.id.0,
            x = node.vertex.x,
            y = node.vertex.y,
            ux = node.ux,
            uy = node.uy,
            rx = node.reaction.fx,
            ry = node.reaction.fy,
        )?;
    }

    Ok(())
}

/// Writes element connectivity as CSV, one column per local node
pub fn write_elements_csv<W: Write>(geometry: &Geometry, out: &mut W) -> Result<(), QuadfemError> {
    let width = geometry
        .elements
        .iter()
        .map(|e| e.nodes().len())
        .max()
        .unwrap_or(0);

    let header: Vec<String> = (0..width).map(|i| format!("n{i}")).collect();
    writeln!(out, "id,type,{}", header.join(","))?;

    for element in &geometry.elements {
        let mut columns: Vec<String> = element.nodes().iter().map(|n| n.0.to_string()).collect();
        columns.resize(width, String::new());
        let kind = match element.kind {
            ElementKind::Bilinear => "quad4",
            ElementKind::Quadratic => "quad8",
        };
        writeln!(out, "{},{},{}", element.id.0, kind, columns.join(","))?;
    }

    Ok(())
}

/// Writes simulation results to two CSV files
///
/// # Arguments
/// * `geometry` - The post-solve geometry
/// * `nodes_output` - The filename of the output nodes csv
/// * `elements_output` - The filename of the output elements csv
pub fn csv_output(
    geometry: &Geometry,
    nodes_output: &str,
    elements_output: &str,
) -> Result<(), QuadfemError> {
    let mut nodes_file = create(nodes_output)?;
    let mut elements_file = create(elements_output)?;

    write_nodes_csv(geometry, &mut nodes_file)?;
    write_elements_csv(geometry, &mut elements_file)?;

    info!("wrote output to {} and {}", nodes_output, elements_output);

    Ok(())
}
