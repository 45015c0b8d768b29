//! # CRD Generator
//!
//! Prints the CustomResourceDefinitions for `Grafana`, `GrafanaDashboard` and
//! `GrafanaPlaylist` as a multi-document YAML stream.
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/grafana-operator.yaml
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use kube::core::CustomResourceExt;

use grafana_operator::crd::{Grafana, GrafanaDashboard, GrafanaPlaylist};

fn main() {
    let crds = [Grafana::crd(), GrafanaDashboard::crd(), GrafanaPlaylist::crd()];

    println!("# This file is auto-generated by crdgen");
    println!("# DO NOT EDIT THIS FILE MANUALLY");
    println!("# Change the types under src/crd/ and regenerate");
    for crd in &crds {
        match serde_yaml::to_string(crd) {
            Ok(yaml) => {
                println!("---");
                print!("{yaml}");
            }
            Err(e) => {
                eprintln!("Failed to serialize CRD to YAML: {e}");
                std::process::exit(1);
            }
        }
    }
}
