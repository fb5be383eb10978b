// Copyright 2024 RSUET contributors
//
// Licensed under the GNU General Public License v3.0 or later
// https://www.gnu.org/licenses/gpl-3.0.html

//! Positive demand without a connecting path is fatal.
use rsuet::network::{Edge, Network, OdPair};
use rsuet::{RefCost, Rsuet, Rum, SolveError};

#[test]
fn disconnected_demand_is_reported() {
    // Node 3 is not reachable from node 1.
    let edges = vec![Edge::new(1, 2, 100.0, 1.0, 10.0, 0.15, 4.0)];
    let ods = vec![OdPair::new(1, 3, 10.0).unwrap()];
    let mut network = Network::from_parts("disconnected", 3, edges, ods).unwrap();

    let rum = Rum::from_values("MNL", 0.5, 1.0, 0.0, None, RefCost::TauMin(1.3)).unwrap();
    let solver = Rsuet::new(rum, RefCost::TauMin(1.3), RefCost::TauMin(1.3), 1e-4).unwrap();
    let error = solver.solve(&mut network).unwrap_err();
    assert_eq!(
        error.downcast_ref::<SolveError>(),
        Some(&SolveError::DisconnectedDemand {
            origin: 1,
            destination: 3
        })
    );
}
