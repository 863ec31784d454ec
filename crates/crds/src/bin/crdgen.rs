//! Prints the Workload and Service CustomResourceDefinitions as a YAML stream.
//!
//! Usage: `cargo run -p crds --bin crdgen > deploy/crds.yaml`

use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    for crd in [crds::Workload::crd(), crds::Service::crd()] {
        print!("---\n{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
