//! Capturable types shared by the test suites.

use aijson_core::{AijsonError, Result};
use aijson_graph::{
    register_reconstructor, Arg, Arguments, Capturable, Captured, NodeHandle, Payload,
    ReconstructorRegistry,
};

pub const LEAF_TAG: &str = "test_support.Leaf";
pub const MID_TAG: &str = "test_support.Mid";
pub const TOP_TAG: &str = "test_support.Top";
pub const WEIGHTS_TAG: &str = "test_support.Weights";
pub const SCALE_TAG: &str = "test_support.Scale";
pub const COMPOSE_TAG: &str = "test_support.Compose";
pub const LOOSE_TAG: &str = "test_support.Loose";

#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    pub value: i64,
}

impl Capturable for Leaf {
    fn type_tag(&self) -> &str {
        LEAF_TAG
    }

    fn snapshot_arguments(&self) -> Arguments {
        Arguments::new().with("value", self.value)
    }
}

#[derive(Debug, Clone)]
pub struct Mid {
    pub child: Captured<Leaf>,
}

impl Capturable for Mid {
    fn type_tag(&self) -> &str {
        MID_TAG
    }

    fn snapshot_arguments(&self) -> Arguments {
        Arguments::new().with("child", &self.child)
    }
}

/// Holds capturable children of any type.
#[derive(Debug, Clone)]
pub struct Top {
    pub children: Vec<NodeHandle>,
}

impl Capturable for Top {
    fn type_tag(&self) -> &str {
        TOP_TAG
    }

    fn snapshot_arguments(&self) -> Arguments {
        Arguments::new().with("children", self.children.clone())
    }
}

/// Dense `f32` weights stored as a `.pt` payload of little-endian floats.
#[derive(Debug, Clone, PartialEq)]
pub struct Weights {
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

impl Weights {
    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self { shape, values: vec![0.0; len] }
    }

    pub fn from_values(shape: Vec<usize>, values: Vec<f32>) -> Self {
        Self { shape, values }
    }
}

impl Capturable for Weights {
    fn type_tag(&self) -> &str {
        WEIGHTS_TAG
    }

    fn snapshot_arguments(&self) -> Arguments {
        Arguments::new().with("shape", self.shape.clone())
    }

    fn payload(&self) -> Option<&dyn Payload> {
        Some(self)
    }

    fn payload_mut(&mut self) -> Option<&mut dyn Payload> {
        Some(self)
    }
}

impl Payload for Weights {
    fn extension(&self) -> &str {
        ".pt"
    }

    fn export_payload(&self) -> Result<Vec<u8>> {
        Ok(self.values.iter().flat_map(|value| value.to_le_bytes()).collect())
    }

    fn import_payload(&mut self, bytes: &[u8]) -> Result<()> {
        let expected = self.shape.iter().product::<usize>() * 4;
        if bytes.len() != expected {
            return Err(AijsonError::Payload {
                node: WEIGHTS_TAG.to_string(),
                message: format!("expected {} bytes, got {}", expected, bytes.len()),
            });
        }
        self.values = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scale {
    pub factor: f64,
}

impl Scale {
    pub fn apply(&self, input: f64) -> f64 {
        input * self.factor
    }
}

impl Capturable for Scale {
    fn type_tag(&self) -> &str {
        SCALE_TAG
    }

    fn snapshot_arguments(&self) -> Arguments {
        Arguments::new().with("factor", self.factor)
    }
}

/// Applies its `Scale` stages in order.
#[derive(Debug, Clone)]
pub struct Compose {
    pub name: String,
    pub stages: Vec<Captured<Scale>>,
}

impl Compose {
    pub fn apply(&self, input: f64) -> f64 {
        self.stages
            .iter()
            .fold(input, |value, stage| stage.read().apply(value))
    }
}

impl Capturable for Compose {
    fn type_tag(&self) -> &str {
        COMPOSE_TAG
    }

    fn snapshot_arguments(&self) -> Arguments {
        Arguments::new()
            .with("name", self.name.as_str())
            .with("stages", self.stages.clone())
    }
}

/// Carries an arbitrary argument, for exercising capture failures.
#[derive(Debug, Clone)]
pub struct Loose {
    pub extra: Arg,
}

impl Capturable for Loose {
    fn type_tag(&self) -> &str {
        LOOSE_TAG
    }

    fn snapshot_arguments(&self) -> Arguments {
        Arguments::new().with("extra", self.extra.clone())
    }
}

/// Registers a reconstructor for every fixture type except [`Loose`].
pub fn register_fixtures(registry: &mut ReconstructorRegistry) {
    registry
        .register(LEAF_TAG, |args| Ok(Leaf { value: args.literal("value")? }))
        .register(MID_TAG, |args| Ok(Mid { child: args.node::<Leaf>("child")? }))
        .register(TOP_TAG, |args| Ok(Top { children: args.handles("children")? }))
        .register(WEIGHTS_TAG, |args| Ok(Weights::zeros(args.literal("shape")?)))
        .register(SCALE_TAG, |args| Ok(Scale { factor: args.literal("factor")? }))
        .register(COMPOSE_TAG, |args| {
            Ok(Compose { name: args.literal("name")?, stages: args.nodes::<Scale>("stages")? })
        });
}

register_reconstructor!(register_fixtures);

pub fn reconstructors() -> ReconstructorRegistry {
    let mut registry = ReconstructorRegistry::new();
    register_fixtures(&mut registry);
    registry
}
