//! Rendering of declarative infrastructure definitions.
//!
//! Resources are assembled as ordered property lists and rendered into the
//! tool's textual syntax. Property order is preserved so the generated files
//! are stable and testable.

// ── Render ────────────────────────────────────────────────────────────────────

/// Anything that can be written into a workspace definitions file: providers,
/// resources, outputs.
pub trait Render {
    fn render(&self) -> String;
}

// ── Property ──────────────────────────────────────────────────────────────────

/// A single value inside a resource body.
///
/// `Raw` values are emitted verbatim and are used for references into other
/// parts of the plan (`digitalocean_ssh_key.default.id`); `Str` values are
/// quoted.
#[derive(Debug, Clone)]
pub enum Property {
    Raw(String),
    Str(String),
    Int(i64),
    List(Vec<Property>),
}

impl Property {
    pub fn raw(value: impl Into<String>) -> Self {
        Property::Raw(value.into())
    }

    pub fn str(value: impl Into<String>) -> Self {
        Property::Str(value.into())
    }

    pub fn int(value: i64) -> Self {
        Property::Int(value)
    }

    pub fn list(values: impl IntoIterator<Item = Property>) -> Self {
        Property::List(values.into_iter().collect())
    }

    pub fn render(&self) -> String {
        match self {
            Property::Raw(value) => value.clone(),
            Property::Str(value) => format!("\"{value}\""),
            Property::Int(value) => value.to_string(),
            Property::List(values) => {
                let rendered: Vec<String> = values.iter().map(Property::render).collect();
                format!("[ {} ]", rendered.join(", "))
            }
        }
    }
}

// ── Properties ────────────────────────────────────────────────────────────────

/// The ordered body of a resource or provider block.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    indent: usize,
    props: Vec<(String, Property)>,
}

impl Properties {
    pub fn new() -> Self {
        Properties::default()
    }

    pub fn prop(mut self, name: impl Into<String>, prop: Property) -> Self {
        self.props.push((name.into(), prop));
        self
    }

    pub fn indent(mut self, indent: usize) -> Self {
        self.indent = indent;
        self
    }

    pub fn render(&self) -> String {
        let pad = " ".repeat(self.indent);
        let mut out = String::new();
        for (name, prop) in &self.props {
            out.push_str(&format!("{pad}{name}={}\n", prop.render()));
        }
        out
    }
}

// ── Resource ──────────────────────────────────────────────────────────────────

/// A provisionable resource. Implementations live in per-provider modules and
/// are responsible for producing syntactically valid definitions.
pub trait Resource {
    /// Type identifier of the resource, e.g. `digitalocean_droplet`.
    fn kind(&self) -> &'static str;
    fn name(&self) -> &str;
    fn properties(&self) -> Properties;
}

/// Strip characters that are not valid in resource names.
pub fn format_name(name: &str) -> String {
    name.replace(' ', "")
}

/// A reference to the id of another resource in the same plan.
pub fn reference(res: &dyn Resource) -> Property {
    Property::raw(format!("{}.{}.id", res.kind(), format_name(res.name())))
}

/// A reference to an arbitrary attribute of another resource.
pub fn attribute(res: &dyn Resource, attr: &str) -> Property {
    Property::raw(format!("{}.{}.{}", res.kind(), format_name(res.name()), attr))
}

/// Render a resource into its textual block definition.
pub fn render_resource(res: &dyn Resource) -> String {
    format!(
        "resource \"{}\" \"{}\" {{\n{}}}\n",
        res.kind(),
        format_name(res.name()),
        res.properties().indent(2).render(),
    )
}

// ── Output ────────────────────────────────────────────────────────────────────

/// A named output used to read information back out of the provisioned
/// infrastructure.
#[derive(Debug, Clone)]
pub struct Output {
    pub name: String,
    pub value: Property,
}

impl Output {
    pub fn new(name: impl Into<String>, value: Property) -> Self {
        Output { name: name.into(), value }
    }
}

impl Render for Output {
    fn render(&self) -> String {
        let props = Properties::new().prop("value", self.value.clone());
        format!(
            "output \"{}\" {{\n{}}}\n",
            format_name(&self.name),
            props.indent(2).render(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture;

    impl Resource for Fixture {
        fn kind(&self) -> &'static str {
            "test_resource"
        }

        fn name(&self) -> &str {
            "my fixture"
        }

        fn properties(&self) -> Properties {
            Properties::new()
                .prop("name", Property::str("my fixture"))
                .prop("count", Property::int(3))
                .prop("tags", Property::list([Property::str("a"), Property::int(1)]))
        }
    }

    #[test]
    fn property_rendering() {
        assert_eq!(Property::raw("a.b.id").render(), "a.b.id");
        assert_eq!(Property::str("value").render(), "\"value\"");
        assert_eq!(Property::int(1000).render(), "1000");
        assert_eq!(
            Property::list([Property::int(1), Property::str("2")]).render(),
            "[ 1, \"2\" ]"
        );
    }

    #[test]
    fn properties_preserve_declaration_order() {
        let rendered = Properties::new()
            .prop("b", Property::int(2))
            .prop("a", Property::int(1))
            .indent(2)
            .render();

        assert_eq!(rendered, "  b=2\n  a=1\n");
    }

    #[test]
    fn resource_block_rendering() {
        let want = "resource \"test_resource\" \"myfixture\" {\n  name=\"my fixture\"\n  count=3\n  tags=[ \"a\", 1 ]\n}\n";
        assert_eq!(render_resource(&Fixture), want);
    }

    #[test]
    fn references_point_at_resource_attributes() {
        assert_eq!(reference(&Fixture).render(), "test_resource.myfixture.id");
        assert_eq!(
            attribute(&Fixture, "ipv4_address").render(),
            "test_resource.myfixture.ipv4_address"
        );
    }

    #[test]
    fn output_block_rendering() {
        let output = Output::new("ip-address", Property::raw("test_resource.myfixture.ipv4_address"));
        assert_eq!(
            output.render(),
            "output \"ip-address\" {\n  value=test_resource.myfixture.ipv4_address\n}\n"
        );
    }
}
