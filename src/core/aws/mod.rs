//! Minimal AWS plumbing: static credentials, SigV4 signing and a JSON 1.1
//! client shared by the Cost Explorer and Budgets collectors.

pub mod client;
pub mod credentials;
pub mod sigv4;

pub use client::AwsJsonClient;
pub use credentials::Credentials;
