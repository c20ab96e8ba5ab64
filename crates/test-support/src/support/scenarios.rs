use crate::common::{Compose, Leaf, Mid, Scale, Top, Weights};
use aijson_core::Result;
use aijson_graph::{CaptureScope, Captured};

/// `leaf = Leaf(3)`, `mid = Mid(leaf)`, `top = Top([mid, leaf])`.
pub struct LayeredGraph {
    pub leaf: Captured<Leaf>,
    pub mid: Captured<Mid>,
    pub top: Captured<Top>,
}

pub fn build_layered(scope: &CaptureScope<'_>) -> Result<LayeredGraph> {
    let leaf = scope.construct(|| Leaf { value: 3 })?;
    let mid = scope.construct(|| Mid { child: leaf.clone() })?;
    let top = scope.construct(|| Top { children: vec![mid.handle(), leaf.handle()] })?;
    tracing::debug!(nodes = scope.node_count(), "built layered fixture graph");
    Ok(LayeredGraph { leaf, mid, top })
}

/// Three `Scale` stages (x2, x0.5, x3) composed into one pipeline.
pub fn build_pipeline(scope: &CaptureScope<'_>) -> Result<Captured<Compose>> {
    let double = scope.construct(|| Scale { factor: 2.0 })?;
    let shrink = scope.construct(|| Scale { factor: 0.5 })?;
    let triple = scope.construct(|| Scale { factor: 3.0 })?;
    scope.construct(|| Compose {
        name: "pipeline".to_string(),
        stages: vec![double, shrink, triple],
    })
}

/// Weights with values that are not exactly representable in decimal.
pub fn sample_weights() -> Weights {
    Weights::from_values(
        vec![2, 3],
        vec![0.1, -2.5, f32::MIN_POSITIVE, 1.0e-7, f32::MAX, -0.0],
    )
}
