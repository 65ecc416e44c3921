use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};

use log::{info, warn};

use crate::{
    NetErr, Result,
    arch::{Sequential, Topology},
};

/// One line of a weight file.
#[derive(Debug, Clone, PartialEq)]
enum Record {
    Header(Topology),
    Bias {
        layer: usize,
        node: usize,
        value: f64,
        velocity: f64,
    },
    Weight {
        layer: usize,
        node: usize,
        input: usize,
        value: f64,
        velocity: f64,
    },
}

/// Writes every parameter of the network and its velocity to `path`, creating the file if it
/// doesn't exist yet.
///
/// The first line is the topology header, then each node's bias line is followed by its weight
/// lines. Values are written in their shortest exact representation.
///
/// # Arguments
/// * `network` - The network to persist.
/// * `path` - Where to write it.
///
/// # Returns
/// An io error if the file couldn't be written.
pub fn save<P: AsRef<Path>>(network: &Sequential, path: P) -> Result<()> {
    let path = path.as_ref();

    let mut writer = BufWriter::new(File::create(path)?);
    write_records(network, &mut writer)?;
    writer.flush()?;

    info!(layers = network.layers().len(); "saved weights to {}", path.display());
    Ok(())
}

/// Reads a weight file written for a network of the same topology into `network`.
///
/// The whole file is parsed and checked before any parameter is touched, so on error the
/// network is left as it was. Lines may come in any order.
///
/// # Arguments
/// * `network` - The network to load the parameters into.
/// * `path` - The weight file.
///
/// # Returns
/// An error if the file can't be read, any line is malformed or out of range, or the header
/// doesn't describe `network`.
pub fn load<P: AsRef<Path>>(network: &mut Sequential, path: P) -> Result<()> {
    let path = path.as_ref();

    let content = fs::read_to_string(path).inspect_err(|e| {
        warn!("couldn't read weights from {}: {e}", path.display());
    })?;

    let records = parse(&content).and_then(|records| check(network, records));
    let records = records.inspect_err(|e| {
        warn!("rejected weights from {}: {e}", path.display());
    })?;

    let count = records.len();
    let layers = network.layers_mut();

    for record in records {
        match record {
            Record::Header(_) => {}
            Record::Bias {
                layer,
                node,
                value,
                velocity,
            } => layers[layer].set_bias(node, value, velocity),
            Record::Weight {
                layer,
                node,
                input,
                value,
                velocity,
            } => layers[layer].set_weight((node, input), value, velocity),
        }
    }

    info!(records = count; "loaded weights from {}", path.display());
    Ok(())
}

fn write_records<W: Write>(network: &Sequential, writer: &mut W) -> Result<()> {
    writeln!(writer, "{}", network.topology().header())?;

    for (l, layer) in network.layers().iter().enumerate() {
        let (w, w_velocity) = (layer.weights(), layer.weight_velocities());
        let (b, b_velocity) = (layer.biases(), layer.bias_velocities());

        for i in 0..layer.nodes_out() {
            writeln!(writer, "b_{l}_{i}_{}_{}", b[i], b_velocity[i])?;

            for j in 0..layer.nodes_in() {
                writeln!(writer, "{l}_{i}_{j}_{}_{}", w[[i, j]], w_velocity[[i, j]])?;
            }
        }
    }

    Ok(())
}

/// Parses every non blank line of the file.
fn parse(content: &str) -> Result<Vec<(usize, Record)>> {
    content
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim_end()))
        .filter(|(_, line)| !line.is_empty())
        .map(|(line_no, line)| {
            parse_record(line)
                .map(|record| (line_no, record))
                .map_err(|reason| NetErr::MalformedRecord {
                    line: line_no,
                    reason,
                })
        })
        .collect()
}

fn parse_record(line: &str) -> std::result::Result<Record, String> {
    let fields: Vec<&str> = line.split('_').collect();

    match fields.as_slice() {
        ["I", ..] => Topology::parse_header(line).map(Record::Header),
        ["b", layer, node, value, velocity] => Ok(Record::Bias {
            layer: index(layer)?,
            node: index(node)?,
            value: number(value)?,
            velocity: number(velocity)?,
        }),
        [layer, node, input, value, velocity] => Ok(Record::Weight {
            layer: index(layer)?,
            node: index(node)?,
            input: index(input)?,
            value: number(value)?,
            velocity: number(velocity)?,
        }),
        _ => Err(format!("expected 5 fields, found {}", fields.len())),
    }
}

fn index(field: &str) -> std::result::Result<usize, String> {
    field
        .parse()
        .map_err(|e| format!("bad index {field:?}: {e}"))
}

fn number(field: &str) -> std::result::Result<f64, String> {
    field
        .parse()
        .map_err(|e| format!("bad number {field:?}: {e}"))
}

/// Checks the records describe `network`: the header must match its topology and every index
/// must be in range.
fn check(network: &Sequential, records: Vec<(usize, Record)>) -> Result<Vec<Record>> {
    let topology = network.topology();
    let layers = network.layers();
    let mut has_header = false;

    for (line, record) in &records {
        let (layer, node, input) = match record {
            Record::Header(found) => {
                if *found != topology {
                    return Err(NetErr::TopologyMismatch {
                        expected: topology.header(),
                        found: found.header(),
                    });
                }

                has_header = true;
                continue;
            }
            Record::Bias { layer, node, .. } => (*layer, *node, None),
            Record::Weight {
                layer, node, input, ..
            } => (*layer, *node, Some(*input)),
        };

        let out_of_range = |reason: String| NetErr::MalformedRecord {
            line: *line,
            reason,
        };

        let dense = layers
            .get(layer)
            .ok_or_else(|| out_of_range(format!("layer {layer} doesn't exist")))?;

        if node >= dense.nodes_out() {
            return Err(out_of_range(format!("layer {layer} has no node {node}")));
        }

        if let Some(input) = input.filter(|&input| input >= dense.nodes_in()) {
            return Err(out_of_range(format!("layer {layer} has no input {input}")));
        }
    }

    if !has_header {
        return Err(NetErr::MalformedRecord {
            line: 1,
            reason: "the file has no topology header".into(),
        });
    }

    Ok(records.into_iter().map(|(_, record)| record).collect())
}
