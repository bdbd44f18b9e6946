//! Propagation policies for compensable methods

use serde::{Deserialize, Serialize};

/// How an intercepted call relates to an ambient transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Propagation {
    /// Join the ambient transaction; open a new one when there is none
    #[default]
    Required,
    /// Always open a new root transaction
    RequiresNew,
    /// Join the ambient transaction; fail when there is none
    Mandatory,
}
