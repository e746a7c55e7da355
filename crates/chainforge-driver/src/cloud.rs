//! Dispatch from a server's provider type to the resources it needs.
//!
//! The set of supported providers is closed, so this is a plain match
//! instead of a runtime registry.

use chainforge_domain::{ProviderSettings, ProviderType, Server};

use crate::digitalocean::{
    droplet_size, volume_size_gb, DoProvider, DoSshKey, Droplet, VolumeAttachment, Volume, IMAGE,
    REGION,
};
use crate::error::DriverError;
use crate::render::{attribute, Output};
use crate::workspace::Workspace;

/// Name of the declared output carrying the provisioned server's address.
pub const IP_ADDRESS_OUTPUT: &str = "ip-address";

/// Register the cloud provider in the workspace, authenticated with the
/// (decrypted) credentials from the tenant's provider settings.
pub fn register_provider(
    workspace: &mut Workspace,
    settings: &ProviderSettings,
) -> Result<(), DriverError> {
    match settings.provider_type {
        ProviderType::DigitalOcean => {
            workspace.add(&DoProvider::new(settings.credentials.clone()));
        }
    }

    Ok(())
}

/// Add the server's resources to the workspace: an SSH key, the machine
/// itself, the address output, and for production sizes a volume with its
/// attachment.
pub fn add_server(workspace: &mut Workspace, server: &Server) -> Result<(), DriverError> {
    match server.provider {
        ProviderType::DigitalOcean => add_digitalocean_server(workspace, server),
    }
}

fn add_digitalocean_server(workspace: &mut Workspace, server: &Server) -> Result<(), DriverError> {
    let ssh_key = DoSshKey::new(&server.ssh_key.name, server.ssh_key.public_key_openssh());

    let droplet = Droplet::new(
        &server.name,
        IMAGE,
        REGION,
        droplet_size(server.size),
        vec![ssh_key.clone()],
    );

    workspace.add_resource(&ssh_key);
    workspace.add_resource(&droplet);
    workspace.add(&Output::new(
        IP_ADDRESS_OUTPUT,
        attribute(&droplet, "ipv4_address"),
    ));

    let volume_size = volume_size_gb(server.size);
    if volume_size > 0 {
        let volume = Volume::new(&server.name, REGION, volume_size);
        let attachment = VolumeAttachment::new(&server.name, &droplet, &volume);

        workspace.add_resource(&volume);
        workspace.add_resource(&attachment);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainforge_domain::{AccountId, ServerBuilder, ServerSize, SshKey};

    fn test_server(size: ServerSize) -> Server {
        ServerBuilder::new(AccountId::generate())
            .name("node")
            .provider(ProviderType::DigitalOcean)
            .size(size)
            .ssh_key(SshKey::generate_with_bits("access", 1024).unwrap())
            .build()
            .unwrap()
    }

    fn flushed_definitions(server: &Server) -> String {
        let mut workspace = Workspace::create().unwrap();
        let settings = ProviderSettings::new(
            server.account_id.clone(),
            "personal",
            ProviderType::DigitalOcean,
            "do-token",
        );

        register_provider(&mut workspace, &settings).unwrap();
        add_server(&mut workspace, server).unwrap();
        workspace.flush().unwrap();

        let content = std::fs::read_to_string(
            workspace.work_dir().join(crate::workspace::DEFINITIONS_FILE),
        )
        .unwrap();
        workspace.close().unwrap();
        content
    }

    #[test]
    fn test_size_servers_get_no_volume() {
        let definitions = flushed_definitions(&test_server(ServerSize::Test));

        assert!(definitions.contains("provider \"digitalocean\""));
        assert!(definitions.contains("token=\"do-token\""));
        assert!(definitions.contains("resource \"digitalocean_droplet\" \"node\""));
        assert!(definitions.contains("output \"ip-address\""));
        assert!(definitions.contains("value=digitalocean_droplet.node.ipv4_address"));
        assert!(!definitions.contains("digitalocean_volume"));
    }

    #[test]
    fn prod_size_servers_get_a_volume_and_attachment() {
        let definitions = flushed_definitions(&test_server(ServerSize::Prod));

        assert!(definitions.contains("resource \"digitalocean_volume\" \"node\""));
        assert!(definitions.contains("size=500"));
        assert!(definitions.contains("resource \"digitalocean_volume_attachment\" \"node\""));
    }
}
