// Copyright 2024 RSUET contributors
//
// Licensed under the GNU General Public License v3.0 or later
// https://www.gnu.org/licenses/gpl-3.0.html

//! Stochastic loading on two parallel routes.
use rsuet::network::{Edge, Network, OdPair, Path};
use rsuet::{RefCost, Rsuet, Rum};

/// Two routes from node 1 to node 2: a direct edge (free-flow time 10) and a detour
/// through node 3 (free-flow time 15), per-edge capacity 100.
fn parallel_network(demand: f64) -> Network {
    let edges = vec![
        Edge::new(1, 2, 100.0, 1.0, 10.0, 0.15, 4.0),
        Edge::new(1, 3, 100.0, 0.5, 7.5, 0.15, 4.0),
        Edge::new(3, 2, 100.0, 0.5, 7.5, 0.15, 4.0),
    ];
    let ods = vec![OdPair::new(1, 2, demand).unwrap()];
    let mut network = Network::from_parts("parallel", 3, edges, ods).unwrap();
    network.update_edge_costs(1.0, 0.0);
    // Column generation can only discover routes that become shortest, which the detour
    // never does here; seed it so the stochastic loading can split the demand.
    let direct = Path::new(vec![0], network.edges());
    let detour = Path::new(vec![1, 2], network.edges());
    let od = network.od_mut(1, 2).unwrap();
    od.add_path(direct);
    od.add_path(detour);
    network
}

fn route_flows(network: &Network) -> (f64, f64) {
    let od = network.od(1, 2).unwrap();
    let direct = od
        .restricted_choice_set
        .iter()
        .find(|p| p.edges == vec![0])
        .map(|p| p.flow())
        .unwrap_or(0.0);
    let detour = od
        .restricted_choice_set
        .iter()
        .find(|p| p.edges == vec![1, 2])
        .map(|p| p.flow())
        .unwrap_or(0.0);
    (direct, detour)
}

#[test]
fn mnl_splits_flow_over_both_routes() {
    let mut network = parallel_network(100.0);
    let rum = Rum::from_values("MNL", 0.5, 1.0, 0.0, None, RefCost::TauMin(2.0)).unwrap();
    let solver = Rsuet::new(rum, RefCost::TauMin(2.0), RefCost::TauMin(2.0), 1e-4)
        .unwrap()
        .with_iteration_limits(50, 200_000);
    let outcome = solver.solve(&mut network).unwrap();

    assert!(outcome.is_converged());
    assert!(outcome.pattern().num_outer_iterations() <= 50);
    assert!(outcome.pattern().last_gap().unwrap() <= 1e-4);

    let (direct, detour) = route_flows(&network);
    // Both routes carry positive flow; the cheaper one carries the majority.
    assert!(direct > 0.0 && detour > 0.0);
    assert!(direct > detour);
    assert!((direct + detour - 100.0).abs() / 100.0 <= 1e-9);

    // Edge flows match the path flows after the final loading.
    assert!((network.edge(1, 2).unwrap().flow - direct).abs() <= 1e-9);
    assert!((network.edge(1, 3).unwrap().flow - detour).abs() <= 1e-9);
    assert!((network.edge(3, 2).unwrap().flow - detour).abs() <= 1e-9);
}

#[test]
fn tight_truncation_leaves_one_used_route() {
    let mut network = parallel_network(100.0);
    // TMNL with omega just above the minimum cost: the detour is always truncated.
    let rum =
        Rum::from_values("TMNL", 0.5, 1.0, 0.0, None, RefCost::TauMin(1.01)).unwrap();
    let solver = Rsuet::new(rum, RefCost::TauMin(2.0), RefCost::TauMin(2.0), 1e-4)
        .unwrap()
        .with_iteration_limits(50, 200_000);
    let outcome = solver.solve(&mut network).unwrap();

    assert!(outcome.is_converged());
    let (direct, detour) = route_flows(&network);
    assert!((direct - 100.0).abs() / 100.0 <= 1e-9);
    assert_eq!(detour, 0.0);
    assert_eq!(network.od(1, 2).unwrap().num_used_routes(), 1);
}

#[test]
fn large_theta_approaches_deterministic_equilibrium() {
    // With a large logit scale the split degenerates: the direct route is cheaper even
    // fully loaded (11.5 < 15), so it takes essentially everything.
    let mut network = parallel_network(100.0);
    let rum = Rum::from_values("MNL", 5.0, 1.0, 0.0, None, RefCost::TauMin(2.0)).unwrap();
    let solver = Rsuet::new(rum, RefCost::TauMin(2.0), RefCost::TauMin(2.0), 1e-4)
        .unwrap()
        .with_iteration_limits(50, 200_000);
    solver.solve(&mut network).unwrap();

    let (direct, _) = route_flows(&network);
    assert!(direct > 99.9);
}

#[test]
fn doubling_demand_never_decreases_edge_times() {
    let rum = Rum::from_values("MNL", 0.5, 1.0, 0.0, None, RefCost::TauMin(2.0)).unwrap();
    let solver = Rsuet::new(rum, RefCost::TauMin(2.0), RefCost::TauMin(2.0), 1e-4)
        .unwrap()
        .with_iteration_limits(50, 200_000);

    let mut base = parallel_network(100.0);
    solver.solve(&mut base).unwrap();
    let mut doubled = parallel_network(200.0);
    solver.solve(&mut doubled).unwrap();

    for (before, after) in base.edges().iter().zip(doubled.edges()) {
        assert!(
            after.time >= before.time - 1e-9,
            "edge {} time decreased from {} to {}",
            before.id,
            before.time,
            after.time
        );
    }
}
