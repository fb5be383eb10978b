// Copyright 2024 RSUET contributors
//
// Licensed under the GNU General Public License v3.0 or later
// https://www.gnu.org/licenses/gpl-3.0.html

//! Reader for TNTP network triplets, as distributed at
//! <https://github.com/bstabler/TransportationNetworks>.
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use hashbrown::{HashMap, HashSet};
use log::warn;

use crate::network::{Edge, Network, Node, OdPair};
use crate::parameters::Parameters;
use crate::progress_bar::Spinner;

const END_OF_METADATA: &str = "<END OF METADATA>";
/// Metadata blocks longer than this are considered malformed.
const MAX_METADATA_LINES: usize = 100;

/// The three files of a TNTP triplet, identified by filename suffix.
#[derive(Debug)]
struct TntpFiles {
    net: PathBuf,
    node: Option<PathBuf>,
    trips: PathBuf,
}

impl TntpFiles {
    fn discover(directory: &Path) -> Result<Self> {
        let mut net = None;
        let mut node = None;
        let mut trips = None;
        for entry in std::fs::read_dir(directory)
            .with_context(|| format!("Cannot read network directory {directory:?}"))?
        {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.ends_with("_net.tntp") {
                net = Some(path);
            } else if name.ends_with("_node.tntp") {
                node = Some(path);
            } else if name.ends_with("_trips.tntp") {
                trips = Some(path);
            }
        }
        Ok(TntpFiles {
            net: net.ok_or_else(|| anyhow!("No `_net.tntp` file in {directory:?}"))?,
            node,
            trips: trips.ok_or_else(|| anyhow!("No `_trips.tntp` file in {directory:?}"))?,
        })
    }
}

/// Reads the network named by `parameters.network_directory`.
///
/// The directory must contain a `*_net.tntp` and a `*_trips.tntp` file; when the
/// `*_node.tntp` file is absent, nodes are synthesised at `(0, 0)`. Demand values are
/// scaled by `parameters.demand_scale`; non-positive demand is silently dropped.
pub fn read_network(parameters: &Parameters) -> Result<Network> {
    let directory = &parameters.network_directory;
    let name = directory
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("network")
        .to_owned();
    let mut spinner = Spinner::new("Reading network...");

    let files = TntpFiles::discover(directory)?;
    let (num_nodes, mut edges) = parse_net(open(&files.net)?)
        .with_context(|| format!("Malformed network file {:?}", files.net))?;
    if parameters.is_network_bidirectional {
        materialise_reverse_edges(&mut edges);
    }

    let nodes = match &files.node {
        Some(path) => {
            let nodes = parse_nodes(open(path)?)
                .with_context(|| format!("Malformed node file {path:?}"))?;
            if nodes.is_empty() {
                synthesise_nodes(num_nodes)
            } else {
                nodes
            }
        }
        None => {
            warn!("No node file provided; proceeding with artificial node data");
            synthesise_nodes(num_nodes)
        }
    };

    let ods = parse_trips(open(&files.trips)?, parameters.demand_scale)
        .with_context(|| format!("Malformed trips file {:?}", files.trips))?;

    let network = Network::new(&name, nodes, edges, ods)?;
    spinner.finish();
    Ok(network)
}

fn open(path: &Path) -> Result<BufReader<File>> {
    Ok(BufReader::new(
        File::open(path).with_context(|| format!("Cannot open {path:?}"))?,
    ))
}

fn synthesise_nodes(num_nodes: usize) -> Vec<Node> {
    (1..=num_nodes).map(|id| Node::new(id, 0.0, 0.0)).collect()
}

/// Adds the reverse of every edge that has no explicit reverse in the file.
fn materialise_reverse_edges(edges: &mut Vec<Edge>) {
    let present: HashSet<(usize, usize)> = edges.iter().map(|e| (e.tail, e.head)).collect();
    let mut reversed = Vec::new();
    for edge in edges.iter() {
        if !present.contains(&(edge.head, edge.tail)) {
            reversed.push(Edge::new(
                edge.head,
                edge.tail,
                edge.capacity,
                edge.length,
                edge.free_flow_time,
                edge.b,
                edge.power,
            ));
        }
    }
    edges.append(&mut reversed);
}

/// Parses a `*_net.tntp` file: a metadata block, a `~` header row, then one row per
/// edge with `tail head capacity length free_flow_time b power`.
fn parse_net(reader: impl BufRead) -> Result<(usize, Vec<Edge>)> {
    let mut lines = reader.lines();

    let mut num_nodes = None;
    let mut num_links = None;
    let mut metadata_lines = 0;
    for line in lines.by_ref() {
        let line = line?.trim().to_uppercase();
        if line.starts_with(END_OF_METADATA) {
            break;
        }
        if let Some(rest) = line.strip_prefix("<NUMBER OF NODES>") {
            num_nodes = Some(rest.trim().parse().context("Invalid <NUMBER OF NODES>")?);
        } else if let Some(rest) = line.strip_prefix("<NUMBER OF LINKS>") {
            num_links = Some(rest.trim().parse().context("Invalid <NUMBER OF LINKS>")?);
        }
        metadata_lines += 1;
        if metadata_lines > MAX_METADATA_LINES {
            bail!("Metadata block not terminated by {END_OF_METADATA}");
        }
    }
    let num_nodes: usize = num_nodes.ok_or_else(|| anyhow!("Missing <NUMBER OF NODES>"))?;
    let num_links: usize = num_links.ok_or_else(|| anyhow!("Missing <NUMBER OF LINKS>"))?;

    // The column-header row is the first row containing a `~`.
    let mut found_header = false;
    for line in lines.by_ref() {
        if line?.contains('~') {
            found_header = true;
            break;
        }
    }
    if !found_header {
        bail!("No column-header row (did not encounter the header token `~`)");
    }

    let mut edges = Vec::with_capacity(num_links);
    for line in lines {
        let line = line?;
        let row = line.trim().trim_end_matches(';').trim();
        if row.is_empty() {
            continue;
        }
        let fields: Vec<&str> = row.split_whitespace().collect();
        if fields.len() < 7 {
            bail!("Edge row {} has {} fields, expected 7", edges.len() + 1, fields.len());
        }
        let row_number = edges.len() + 1;
        let parse_field = |i: usize| -> Result<f64> {
            fields[i]
                .parse()
                .with_context(|| format!("Invalid value `{}` in edge row {}", fields[i], row_number))
        };
        let tail: usize = fields[0].parse().context("Invalid tail node id")?;
        let head: usize = fields[1].parse().context("Invalid head node id")?;
        let capacity = parse_field(2)?;
        let length = parse_field(3)?;
        let free_flow_time = parse_field(4)?;
        let b = parse_field(5)?;
        let power = parse_field(6)?;
        edges.push(Edge::new(tail, head, capacity, length, free_flow_time, b, power));
    }
    if edges.len() != num_links {
        warn!(
            "Network file declares {} links but contains {}",
            num_links,
            edges.len()
        );
    }
    Ok((num_nodes, edges))
}

/// Parses a `*_node.tntp` file: one `id x y` row per node. Returns the nodes sorted by
/// id; an empty or header-only file yields an empty vector.
fn parse_nodes(reader: impl BufRead) -> Result<Vec<Node>> {
    let mut nodes = Vec::new();
    for line in reader.lines() {
        let line = line?.to_lowercase();
        let row = line.trim().trim_end_matches(';').trim();
        if row.is_empty() || row.starts_with("node") {
            continue;
        }
        let mut fields = row.split_whitespace();
        let id = fields
            .next()
            .ok_or_else(|| anyhow!("Empty node row"))?
            .parse()
            .context("Invalid node id")?;
        let x = fields
            .next()
            .map(|v| v.parse::<f64>())
            .transpose()
            .context("Invalid x coordinate")?;
        let y = fields
            .next()
            .map(|v| v.parse::<f64>())
            .transpose()
            .context("Invalid y coordinate")?;
        nodes.push(Node::new(id, x.unwrap_or(0.0), y.unwrap_or(0.0)));
    }
    nodes.sort_by_key(|n| n.id);
    Ok(nodes)
}

/// Parses a `*_trips.tntp` file: `Origin <o>` blocks with semicolon-separated
/// `d : demand` entries. Demand is scaled; non-positive entries and intrazonal trips
/// are dropped.
fn parse_trips(reader: impl BufRead, demand_scale: f64) -> Result<Vec<OdPair>> {
    let mut demands: HashMap<(usize, usize), f64> = HashMap::new();
    let mut origin = None;
    let mut in_metadata = true;
    for line in reader.lines() {
        let line = line?.to_lowercase();
        let row = line.trim();
        if in_metadata {
            if row.starts_with("<end of metadata>") {
                in_metadata = false;
            }
            continue;
        }
        if row.is_empty() {
            continue;
        }
        if let Some(rest) = row.strip_prefix("origin") {
            origin = Some(rest.trim().parse::<usize>().context("Invalid origin id")?);
            continue;
        }
        let o = origin.ok_or_else(|| anyhow!("Demand row before the first `Origin` line"))?;
        for entry in row.split(';') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let (destination, demand) = entry
                .split_once(':')
                .ok_or_else(|| anyhow!("Malformed demand entry `{entry}`"))?;
            let destination: usize = destination
                .trim()
                .parse()
                .with_context(|| format!("Invalid destination in `{entry}`"))?;
            let demand: f64 = demand
                .trim()
                .parse()
                .with_context(|| format!("Invalid demand in `{entry}`"))?;
            let demand = demand * demand_scale;
            if demand > 0.0 && destination != o {
                demands.insert((o, destination), demand);
            }
        }
    }
    demands
        .into_iter()
        .map(|((o, d), demand)| OdPair::new(o, d, demand))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    const NET: &str = "\
<NUMBER OF ZONES> 2
<NUMBER OF NODES> 3
<NUMBER OF LINKS> 3
<END OF METADATA>

~ \tInit node \tTerm node \tCapacity \tLength \tFree Flow Time \tB \tPower
\t1\t2\t100.0\t1.0\t10.0\t0.15\t4\t;
\t1\t3\t100.0\t0.5\t7.5\t0.15\t4\t;
\t3\t2\t100.0\t0.5\t7.5\t0.15\t4\t;
";

    const TRIPS: &str = "\
<NUMBER OF ZONES> 2
<TOTAL OD FLOW> 100.0
<END OF METADATA>

Origin  1
    2 :    100.0;    3 :    0.0;
";

    #[test]
    fn parse_net_test() {
        let (num_nodes, edges) = parse_net(Cursor::new(NET)).unwrap();
        assert_eq!(num_nodes, 3);
        assert_eq!(edges.len(), 3);
        assert_eq!(edges[0].tail, 1);
        assert_eq!(edges[0].head, 2);
        assert_eq!(edges[0].capacity, 100.0);
        assert_eq!(edges[2].free_flow_time, 7.5);
        assert_eq!(edges[2].power, 4.0);
    }

    #[test]
    fn parse_net_rejects_missing_header_test() {
        let malformed = "<NUMBER OF NODES> 3\n<NUMBER OF LINKS> 1\n<END OF METADATA>\n1 2 1 1 1 0.15 4\n";
        assert!(parse_net(Cursor::new(malformed)).is_err());
    }

    #[test]
    fn parse_net_rejects_short_row_test() {
        let malformed =
            "<NUMBER OF NODES> 3\n<NUMBER OF LINKS> 1\n<END OF METADATA>\n~ header\n1 2 1\n";
        assert!(parse_net(Cursor::new(malformed)).is_err());
    }

    #[test]
    fn parse_trips_test() {
        let ods = parse_trips(Cursor::new(TRIPS), 1.0).unwrap();
        // The zero-demand entry is dropped.
        assert_eq!(ods.len(), 1);
        assert_eq!(ods[0].origin, 1);
        assert_eq!(ods[0].destination, 2);
        assert_eq!(ods[0].demand, 100.0);
    }

    #[test]
    fn demand_scale_test() {
        let ods = parse_trips(Cursor::new(TRIPS), 0.5).unwrap();
        assert_eq!(ods[0].demand, 50.0);
    }

    #[test]
    fn parse_nodes_test() {
        let nodes = parse_nodes(Cursor::new("Node X Y\n2 4.0 5.0 ;\n1 0.0 1.0 ;\n")).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].id, 1);
        assert_eq!(nodes[1].x, 4.0);
    }

    #[test]
    fn reverse_edges_test() {
        let (_, mut edges) = parse_net(Cursor::new(NET)).unwrap();
        materialise_reverse_edges(&mut edges);
        // All three edges are one-way in the file, so each gains a reverse twin.
        assert_eq!(edges.len(), 6);
        assert!(edges.iter().any(|e| e.tail == 2 && e.head == 1));
        // Running it again must not duplicate anything.
        materialise_reverse_edges(&mut edges);
        assert_eq!(edges.len(), 6);
    }
}
