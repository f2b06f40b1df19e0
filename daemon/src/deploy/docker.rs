//! Docker housekeeping

use crate::deploy::runner::CommandSpec;

/// Remove dangling images left behind by rebuilds
pub fn prune_dangling_images() -> CommandSpec {
    CommandSpec::new("docker").args(["image", "prune", "-f"])
}
