pub mod ansible;
pub mod cloud;
pub mod digitalocean;
pub mod error;
pub mod render;
pub mod terraform;
pub mod workspace;

pub use ansible::{Ansible, AnsibleConfig};
pub use cloud::IP_ADDRESS_OUTPUT;
pub use error::DriverError;
pub use terraform::{Terraform, TerraformConfig};
pub use workspace::Workspace;
