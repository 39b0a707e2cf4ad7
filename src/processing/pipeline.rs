use std::fmt;
use image::DynamicImage;
use tracing::debug;
use crate::core::Resolution;
use crate::processing::{Phase, Step, StepKind};
use crate::utils::{TransformError, ValidationError};

/// Ordered list of steps applied one after another.
///
/// Step names need not be unique; [`remove_step`](Self::remove_step) removes
/// every step with the given name.
#[derive(Clone, Default)]
pub struct Pipeline {
    steps: Vec<Step>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_steps(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn add_step(&mut self, step: Step) -> &mut Self {
        self.steps.push(step);
        self
    }

    /// Remove every step named `name`; returns how many were removed.
    pub fn remove_step(&mut self, name: &str) -> usize {
        let before = self.steps.len();
        self.steps.retain(|step| step.name() != name);
        before - self.steps.len()
    }

    pub fn clear(&mut self) {
        self.steps.clear();
    }

    /// Run every applicable step in order. An empty pipeline returns its input.
    pub fn process(&self, image: DynamicImage) -> Result<DynamicImage, TransformError> {
        let mut image = image;
        for step in &self.steps {
            if !step.applies_to(&image) {
                debug!("Skipping step '{}': nothing to do", step.name());
                continue;
            }
            image = step.process(image)?;
        }
        Ok(image)
    }

    /// Step names in execution order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn has_resize(&self) -> bool {
        self.steps.iter().any(|s| matches!(s.kind(), StepKind::Resize(_)))
    }

    /// Copy of this pipeline with a resize to `resolution` placed after the
    /// full-resolution steps. Returned unchanged if it already resizes.
    pub fn with_resize(&self, resolution: Resolution) -> Result<Pipeline, ValidationError> {
        if self.has_resize() {
            return Ok(self.clone());
        }
        let mut steps = self.steps.clone();
        let at = steps
            .iter()
            .position(|s| s.phase() == Phase::PostResize)
            .unwrap_or(steps.len());
        steps.insert(at, Step::resize(resolution)?);
        Ok(Pipeline { steps })
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.steps.is_empty() {
            write!(f, "Pipeline(empty)")
        } else {
            write!(f, "Pipeline({})", self.step_names().join(" -> "))
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.steps).finish()
    }
}
