// Copyright 2024 RSUET contributors
//
// Licensed under the GNU General Public License v3.0 or later
// https://www.gnu.org/licenses/gpl-3.0.html

//! Threshold enforcement on a four-route OD pair.
use rsuet::network::{Edge, Network, OdPair, Path};
use rsuet::{RefCost, Rsuet, Rum};

/// Four parallel routes from 1 to 2 with free-flow times 10, 11, 12 and 20.
fn four_route_network() -> Network {
    let edges = vec![
        Edge::new(1, 2, 100.0, 1.0, 10.0, 0.15, 4.0),
        Edge::new(1, 3, 100.0, 0.5, 5.5, 0.15, 4.0),
        Edge::new(3, 2, 100.0, 0.5, 5.5, 0.15, 4.0),
        Edge::new(1, 4, 100.0, 0.5, 6.0, 0.15, 4.0),
        Edge::new(4, 2, 100.0, 0.5, 6.0, 0.15, 4.0),
        Edge::new(1, 5, 100.0, 0.5, 10.0, 0.15, 4.0),
        Edge::new(5, 2, 100.0, 0.5, 10.0, 0.15, 4.0),
    ];
    let ods = vec![OdPair::new(1, 2, 100.0).unwrap()];
    let mut network = Network::from_parts("four-route", 5, edges, ods).unwrap();
    network.update_edge_costs(1.0, 0.0);
    let routes = [vec![0], vec![1, 2], vec![3, 4], vec![5, 6]];
    for route in routes {
        let path = Path::new(route, network.edges());
        network.od_mut(1, 2).unwrap().add_path(path);
    }
    network
}

#[test]
fn route_above_threshold_is_pruned_and_demand_is_preserved() {
    let mut network = four_route_network();
    let rum = Rum::from_values("MNL", 0.5, 1.0, 0.0, None, RefCost::TauMin(1.3)).unwrap();
    let solver = Rsuet::new(rum, RefCost::TauMin(1.3), RefCost::TauMin(1.3), 1e-4)
        .unwrap()
        .with_iteration_limits(50, 200_000);
    let outcome = solver.solve(&mut network).unwrap();
    assert!(outcome.is_converged());

    let od = network.od(1, 2).unwrap();
    // The route with free-flow time 20 costs more than 1.3 times the minimum and must
    // have been removed; the three others survive.
    assert_eq!(od.restricted_choice_set.len(), 3);
    assert!(od
        .restricted_choice_set
        .iter()
        .all(|p| !p.edges.contains(&5)));
    let total: f64 = od.restricted_choice_set.iter().map(|p| p.flow()).sum();
    assert!((total - 100.0).abs() / 100.0 <= 1e-9);
    for path in &od.restricted_choice_set {
        assert!(path.flow() > 0.0);
    }
}
