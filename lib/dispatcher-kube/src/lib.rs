//! Kubernetes-backed dispatcher sets
pub mod client;
pub mod endpoints;

pub use client::KubeClient;
pub use endpoints::{EndpointsSet, EndpointsSetFactory};
