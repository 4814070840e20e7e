//! Self-recursion detection for copy and move.

use ferry_core::{FileSystem, Location};

/// Whether `child` is `root` or lies somewhere below it.
///
/// When `child` is a symbolic link its target is checked as well, following
/// at most `max_depth` links so a cycle of links terminates.
pub fn dir_is_parent(fs: &dyn FileSystem, child: &Location, root: &Location, max_depth: usize) -> bool {
    let mut current = child.clone();
    for _ in 0..=max_depth {
        if current == *root || root.is_ancestor_of(&current) {
            return true;
        }

        let target = match fs.stat(&current, false) {
            Ok(md) if md.is_symlink() => md.symlink_target,
            _ => None,
        };
        let Some(target) = target else {
            return false;
        };
        current = match current.parent() {
            // Relative targets are resolved against the link's directory.
            Some(parent) => parent.resolve(&target),
            None => Location::new(current.scheme(), &target),
        };
    }

    tracing::debug!(
        target: "ferry::guard",
        child = %child,
        depth = max_depth,
        "symlink chain too deep, assuming no recursion"
    );
    false
}
