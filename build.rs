//! Build script for kvbridge.
//!
//! The etcd v3 wire types are declared with prost derives in
//! src/adapters/etcd/proto.rs, so nothing is generated here.

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
}
