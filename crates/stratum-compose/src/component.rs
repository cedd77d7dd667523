//! The contract shared by every component.

use stratum_common::types::ComponentPath;

use crate::args::Input;

/// A named composite of resource nodes with derived attributes.
///
/// Components are immutable once constructed; their accessors are
/// read-only views over concrete or deferred values.
pub trait Component {
    /// Returns the component type token (e.g. `stratum:aws:Postgres`).
    fn type_token(&self) -> &'static str;

    /// Returns the component's position in the ownership tree.
    fn path(&self) -> &ComponentPath;

    /// Returns the component name.
    fn name(&self) -> &str {
        self.path().name().unwrap_or_default()
    }

    /// Returns the component's named attributes in a stable order.
    fn outputs(&self) -> Vec<(&'static str, Input)>;
}
