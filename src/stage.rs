//! The single contract shared by every pipeline component.

/// A pure transformation step.
///
/// Implementors hold only immutable configuration. Calling [`Stage::apply`]
/// twice with equal input yields equal output; stages are composed with
/// ordinary function calls rather than a generic runner.
pub trait Stage<I> {
    /// What the stage produces.
    type Output;

    /// Transforms `input` into the stage output.
    fn apply(&self, input: I) -> Self::Output;
}
