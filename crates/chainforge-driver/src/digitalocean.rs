//! DigitalOcean definitions for the infrastructure tool.

use chainforge_domain::ServerSize;

use crate::render::{reference, render_resource, Properties, Property, Render, Resource};

/// Base image used for all provisioned droplets.
pub const IMAGE: &str = "ubuntu-18-04-x64";
/// Region all resources are provisioned into.
pub const REGION: &str = "fra1";

/// Droplet size slug for a given server size.
pub fn droplet_size(size: ServerSize) -> &'static str {
    match size {
        ServerSize::Test => "s-1vcpu-1gb",
        ServerSize::Prod => "s-4vcpu-8gb",
    }
}

/// Block-storage volume size in GB; zero means no volume.
pub fn volume_size_gb(size: ServerSize) -> i64 {
    match size {
        ServerSize::Test => 0,
        ServerSize::Prod => 500,
    }
}

// ── Provider ──────────────────────────────────────────────────────────────────

/// Configures the tool to authenticate DigitalOcean requests.
#[derive(Debug, Clone)]
pub struct DoProvider {
    token: String,
}

impl DoProvider {
    pub fn new(token: impl Into<String>) -> Self {
        DoProvider { token: token.into() }
    }
}

impl Render for DoProvider {
    fn render(&self) -> String {
        let props = Properties::new().prop("token", Property::str(&self.token));
        format!("provider \"digitalocean\" {{\n{}}}\n", props.indent(2).render())
    }
}

// ── SSH key ───────────────────────────────────────────────────────────────────

/// A managed DigitalOcean SSH key, referenced from a droplet to gain access
/// to the provisioned machine.
///
/// The key must not already be registered with DigitalOcean.
#[derive(Debug, Clone)]
pub struct DoSshKey {
    name: String,
    public_key: String,
}

impl DoSshKey {
    pub fn new(name: impl Into<String>, public_key: impl Into<String>) -> Self {
        DoSshKey {
            name: name.into(),
            public_key: public_key.into(),
        }
    }
}

impl Resource for DoSshKey {
    fn kind(&self) -> &'static str {
        "digitalocean_ssh_key"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn properties(&self) -> Properties {
        Properties::new()
            .prop("name", Property::str(&self.name))
            .prop("public_key", Property::str(&self.public_key))
    }
}

// ── Droplet ───────────────────────────────────────────────────────────────────

/// A DigitalOcean server definition.
#[derive(Debug, Clone)]
pub struct Droplet {
    name: String,
    image: String,
    region: String,
    size: String,
    ssh_keys: Vec<DoSshKey>,
}

impl Droplet {
    pub fn new(
        name: impl Into<String>,
        image: impl Into<String>,
        region: impl Into<String>,
        size: impl Into<String>,
        ssh_keys: Vec<DoSshKey>,
    ) -> Self {
        Droplet {
            name: name.into(),
            image: image.into(),
            region: region.into(),
            size: size.into(),
            ssh_keys,
        }
    }
}

impl Resource for Droplet {
    fn kind(&self) -> &'static str {
        "digitalocean_droplet"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn properties(&self) -> Properties {
        let key_ids = self.ssh_keys.iter().map(|key| reference(key));

        Properties::new()
            .prop("name", Property::str(&self.name))
            .prop("image", Property::str(&self.image))
            .prop("region", Property::str(&self.region))
            .prop("size", Property::str(&self.size))
            .prop("ssh_keys", Property::list(key_ids))
    }
}

// ── Volume ────────────────────────────────────────────────────────────────────

/// Block storage that can be attached to a droplet.
#[derive(Debug, Clone)]
pub struct Volume {
    name: String,
    region: String,
    size_gb: i64,
}

impl Volume {
    pub fn new(name: impl Into<String>, region: impl Into<String>, size_gb: i64) -> Self {
        Volume {
            name: name.into(),
            region: region.into(),
            size_gb,
        }
    }
}

impl Resource for Volume {
    fn kind(&self) -> &'static str {
        "digitalocean_volume"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn properties(&self) -> Properties {
        Properties::new()
            .prop("name", Property::str("volume"))
            .prop("region", Property::str(&self.region))
            .prop("size", Property::int(self.size_gb))
            .prop("initial_filesystem_type", Property::str("ext4"))
    }
}

/// Connects a [`Volume`] with a [`Droplet`].
#[derive(Debug, Clone)]
pub struct VolumeAttachment {
    name: String,
    droplet_id: Property,
    volume_id: Property,
}

impl VolumeAttachment {
    pub fn new(name: impl Into<String>, droplet: &Droplet, volume: &Volume) -> Self {
        VolumeAttachment {
            name: name.into(),
            droplet_id: reference(droplet),
            volume_id: reference(volume),
        }
    }
}

impl Resource for VolumeAttachment {
    fn kind(&self) -> &'static str {
        "digitalocean_volume_attachment"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn properties(&self) -> Properties {
        Properties::new()
            .prop("droplet_id", self.droplet_id.clone())
            .prop("volume_id", self.volume_id.clone())
    }
}
